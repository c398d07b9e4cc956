use std::collections::HashMap;

use derive_more::Display;

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display)]
pub enum VarKind {
    #[display(fmt = "static")]
    Static,
    #[display(fmt = "field")]
    Field,
    #[display(fmt = "argument")]
    Arg,
    #[display(fmt = "local")]
    Var,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Variable {
    pub kind: VarKind,
    pub type_name: String,
    pub name: String,
    pub ordinal: u16,
}

/// One scope of declarations: the class scope holds statics and fields,
/// the subroutine scope holds arguments and locals.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: HashMap<String, Variable>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            table: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Declares `name`; its ordinal is the number of earlier entries of the same kind.
    pub fn add(&mut self, kind: VarKind, type_name: &str, name: &str) -> CompileResult<&Variable> {
        if self.table.contains_key(name) {
            return Err(CompileError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        let ordinal = self.count(kind);
        let var = self.table.entry(name.to_string()).or_insert(Variable {
            kind,
            type_name: type_name.to_string(),
            name: name.to_string(),
            ordinal,
        });
        Ok(var)
    }

    pub fn count(&self, kind: VarKind) -> u16 {
        self.table.values().filter(|v| v.kind == kind).count() as u16
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.table.get(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Subroutine scope shadows class scope.
pub fn lookup<'a>(
    subroutine: &'a SymbolTable,
    class: &'a SymbolTable,
    name: &str,
) -> Option<&'a Variable> {
    subroutine.get(name).or_else(|| class.get(name))
}
