use std::{mem, str::FromStr};

use derive_more::Display;
use log::debug;

use crate::{
    code_generator::{Command, Instruction, Segment},
    compilation_engine::CompilationEngine,
    compiler::CompilerConfig,
    error::{CompileError, CompileResult},
    sym_table::{lookup, SymbolTable, VarKind, Variable},
    tree::{NodeId, NodeKind, Tree},
};

type Code = Vec<Instruction>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SubroutineKind {
    #[display(fmt = "constructor")]
    Constructor,
    #[display(fmt = "function")]
    Function,
    #[display(fmt = "method")]
    Method,
}

impl FromStr for SubroutineKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constructor" => Ok(SubroutineKind::Constructor),
            "function" => Ok(SubroutineKind::Function),
            "method" => Ok(SubroutineKind::Method),
            other => CompileError::invariant(format!("unknown subroutine kind '{other}'")),
        }
    }
}

struct Subroutine {
    kind: SubroutineKind,
    return_type: String,
    name: String,
}

/// Code generator: a post-order visitor turning the syntax tree of one class
/// into VM instructions. One instance per compilation unit.
pub struct VmCompilationEngine {
    config: CompilerConfig,
    class_name: Option<String>,
    subroutine: Option<Subroutine>,
    class_table: SymbolTable,
    sub_routine_table: SymbolTable,
}

fn concat(children: Vec<Code>) -> Code {
    children.into_iter().flatten().collect()
}

fn take(children: &mut [Code], idx: usize) -> CompileResult<Code> {
    match children.get_mut(idx) {
        Some(code) => Ok(mem::take(code)),
        None => CompileError::invariant(format!("missing child fragment {idx}")),
    }
}

fn child(tree: &Tree, id: NodeId, idx: usize) -> CompileResult<NodeId> {
    match tree.children(id).get(idx) {
        Some(c) => Ok(*c),
        None => CompileError::invariant(format!("{} node has no child {idx}", tree.kind(id))),
    }
}

fn value_of(tree: &Tree, id: NodeId) -> CompileResult<&str> {
    match tree.value(id) {
        Some(v) => Ok(v),
        None => CompileError::invariant(format!("{} node carries no value", tree.kind(id))),
    }
}

fn child_value(tree: &Tree, id: NodeId, idx: usize) -> CompileResult<&str> {
    value_of(tree, child(tree, id, idx)?)
}

/// Identifier children of a declaration, i.e. the declared names.
fn declared_names(tree: &Tree, id: NodeId, skip: usize) -> Vec<&str> {
    tree.children(id)
        .iter()
        .skip(skip)
        .filter(|c| tree.kind(**c) == NodeKind::Identifier)
        .filter_map(|c| tree.value(*c))
        .collect()
}

fn binary_op(op: &str) -> CompileResult<Instruction> {
    let ins = match op {
        "+" => Instruction::Arithmetic(Command::Add),
        "-" => Instruction::Arithmetic(Command::Sub),
        "*" => Instruction::Call("Math.multiply".to_string(), 2),
        "/" => Instruction::Call("Math.divide".to_string(), 2),
        "&" => Instruction::Arithmetic(Command::And),
        "|" => Instruction::Arithmetic(Command::Or),
        "<" => Instruction::Arithmetic(Command::Lt),
        ">" => Instruction::Arithmetic(Command::Gt),
        "=" => Instruction::Arithmetic(Command::Eq),
        other => return CompileError::invariant(format!("unknown binary operator '{other}'")),
    };
    Ok(ins)
}

fn unary_op(op: &str) -> CompileResult<Instruction> {
    match op {
        "-" => Ok(Instruction::Arithmetic(Command::Neg)),
        "~" => Ok(Instruction::Arithmetic(Command::Not)),
        other => CompileError::invariant(format!("unknown unary operator '{other}'")),
    }
}

/// Number of arguments of a call. The expression count must agree with the
/// separators around it.
fn count_call_args(tree: &Tree, list: NodeId) -> CompileResult<u16> {
    let children = tree.children(list);
    let expressions = children
        .iter()
        .filter(|c| tree.kind(**c) == NodeKind::Expression)
        .count();
    let commas = children
        .iter()
        .filter(|c| tree.kind(**c) == NodeKind::Symbol && tree.value(**c) == Some(","))
        .count();
    let consistent = if expressions == 0 {
        commas == 0
    } else {
        commas + 1 == expressions
    };
    if !consistent || expressions != children.len() - commas {
        return CompileError::invariant(format!(
            "inconsistent call arguments: {expressions} expressions, {commas} separators"
        ));
    }
    Ok(expressions as u16)
}

/// Finds the kind of a subroutine declared anywhere in the tree by name.
/// Declarations in other classes or compilation units are not visible.
struct SubroutineKindFinder<'n> {
    name: &'n str,
}

impl CompilationEngine for SubroutineKindFinder<'_> {
    type Output = Option<SubroutineKind>;

    fn leave(
        &mut self,
        tree: &Tree,
        id: NodeId,
        children: Vec<Self::Output>,
    ) -> CompileResult<Self::Output> {
        if tree.kind(id) == NodeKind::SubroutineDec {
            if child_value(tree, id, 2)? == self.name {
                return child_value(tree, id, 0)?.parse().map(Some);
            }
            return Ok(None);
        }
        Ok(children.into_iter().flatten().next())
    }
}

impl VmCompilationEngine {
    pub fn new(config: CompilerConfig) -> Self {
        VmCompilationEngine {
            config,
            class_name: None,
            subroutine: None,
            class_table: SymbolTable::new(),
            sub_routine_table: SymbolTable::new(),
        }
    }

    /// Generates code for the tree under `root`. Consumes the engine: its
    /// symbol tables belong to this one unit.
    pub fn generate(mut self, tree: &Tree, root: NodeId) -> CompileResult<Vec<Instruction>> {
        self.visit(tree, root)
    }

    fn comment(&self, code: &mut Code, text: impl Into<String>) {
        if self.config.emit_comments {
            code.push(Instruction::Comment(text.into()));
        }
    }

    fn class_name(&self) -> CompileResult<&str> {
        match &self.class_name {
            Some(c) => Ok(c),
            None => CompileError::invariant("code generated outside of a class"),
        }
    }

    fn subroutine(&self) -> CompileResult<&Subroutine> {
        match &self.subroutine {
            Some(s) => Ok(s),
            None => CompileError::invariant("code generated outside of a subroutine"),
        }
    }

    fn variable(&self, tree: &Tree, id: NodeId) -> CompileResult<&Variable> {
        let name = value_of(tree, id)?;
        lookup(&self.sub_routine_table, &self.class_table, name).ok_or_else(|| {
            CompileError::UndeclaredSymbol {
                line: tree.node(id).token.as_ref().map_or(0, |t| t.line),
                name: name.to_string(),
            }
        })
    }

    fn push_var(&self, tree: &Tree, id: NodeId) -> CompileResult<Instruction> {
        let var = self.variable(tree, id)?;
        Ok(Instruction::Push(var.kind.into(), var.ordinal))
    }

    fn label(&self, tag: &str, id: NodeId) -> CompileResult<String> {
        Ok(format!("{}.{tag}${}", self.class_name()?, id.0))
    }

    fn enter_class(&mut self, tree: &Tree, id: NodeId) -> CompileResult<()> {
        if self.class_name.is_some() {
            return CompileError::invariant("nested class declaration");
        }
        self.class_table.clear();
        self.class_name = Some(child_value(tree, id, 1)?.to_string());
        Ok(())
    }

    fn enter_subroutine(&mut self, tree: &Tree, id: NodeId) -> CompileResult<()> {
        if self.subroutine.is_some() {
            return CompileError::invariant("nested subroutine declaration");
        }
        let kind: SubroutineKind = child_value(tree, id, 0)?.parse()?;
        let return_type = child_value(tree, id, 1)?.to_string();
        let name = child_value(tree, id, 2)?.to_string();

        self.sub_routine_table.clear();
        if kind == SubroutineKind::Method {
            let class_name = self.class_name()?.to_string();
            self.sub_routine_table
                .add(VarKind::Arg, &class_name, "this")?;
        }
        self.subroutine = Some(Subroutine {
            kind,
            return_type,
            name,
        });
        Ok(())
    }

    fn class_var_dec(&mut self, tree: &Tree, id: NodeId) -> CompileResult<Code> {
        let kind = match child_value(tree, id, 0)? {
            "static" => VarKind::Static,
            "field" => VarKind::Field,
            other => return CompileError::invariant(format!("unknown class variable kind '{other}'")),
        };
        let type_name = child_value(tree, id, 1)?;
        for name in declared_names(tree, id, 2) {
            self.class_table.add(kind, type_name, name)?;
        }
        Ok(vec![])
    }

    fn parameter_list(&mut self, tree: &Tree, id: NodeId) -> CompileResult<Code> {
        let params: Vec<NodeId> = tree
            .children(id)
            .iter()
            .copied()
            .filter(|c| tree.kind(*c) != NodeKind::Symbol)
            .collect();
        for pair in params.chunks(2) {
            match pair {
                [tp, name] => {
                    self.sub_routine_table
                        .add(VarKind::Arg, value_of(tree, *tp)?, value_of(tree, *name)?)?;
                }
                _ => return CompileError::invariant("parameter without a name"),
            }
        }
        Ok(vec![])
    }

    fn var_dec(&mut self, tree: &Tree, id: NodeId) -> CompileResult<Code> {
        let type_name = child_value(tree, id, 1)?;
        for name in declared_names(tree, id, 2) {
            self.sub_routine_table.add(VarKind::Var, type_name, name)?;
        }
        Ok(vec![])
    }

    fn subroutine_body(&self, tree: &Tree, id: NodeId, children: Vec<Code>) -> CompileResult<Code> {
        let class_name = self.class_name()?;
        let sub = self.subroutine()?;
        let n_locals = self.sub_routine_table.count(VarKind::Var);
        let mut code = Vec::new();
        self.comment(&mut code, sub.kind.to_string());
        code.push(Instruction::Function(
            format!("{class_name}.{}", sub.name),
            n_locals,
        ));
        match sub.kind {
            SubroutineKind::Constructor => {
                let n_fields = self.class_table.count(VarKind::Field).max(1);
                code.push(Instruction::Push(Segment::Const, n_fields));
                code.push(Instruction::Call("Memory.alloc".to_string(), 1));
                code.push(Instruction::Pop(Segment::Pointer, 0));
            }
            SubroutineKind::Method => {
                code.push(Instruction::Push(Segment::Arg, 0));
                code.push(Instruction::Pop(Segment::Pointer, 0));
            }
            SubroutineKind::Function => {}
        }
        code.extend(concat(children));

        if sub.return_type == "void" && !self.ends_with_return(tree, id) {
            code.push(Instruction::Push(Segment::Const, 0));
            code.push(Instruction::Return);
        }
        debug!(
            "generated {class_name}.{} ({}, {n_locals} locals)",
            sub.name, sub.kind
        );
        Ok(code)
    }

    fn ends_with_return(&self, tree: &Tree, body: NodeId) -> bool {
        tree.children(body)
            .iter()
            .rev()
            .find(|c| tree.kind(**c) == NodeKind::Statements)
            .and_then(|s| tree.children(*s).last())
            .map_or(false, |last| tree.kind(*last) == NodeKind::ReturnStatement)
    }

    fn assignment(&self, tree: &Tree, id: NodeId, mut children: Vec<Code>) -> CompileResult<Code> {
        let var = self.variable(tree, child(tree, id, 0)?)?;
        let mut code = take(&mut children, 2)?;
        code.push(Instruction::Pop(var.kind.into(), var.ordinal));
        Ok(code)
    }

    fn array_assignment(
        &self,
        tree: &Tree,
        id: NodeId,
        mut children: Vec<Code>,
    ) -> CompileResult<Code> {
        let mut code = vec![self.push_var(tree, child(tree, id, 0)?)?];
        code.extend(take(&mut children, 2)?);
        code.push(Instruction::Arithmetic(Command::Add));
        code.extend(take(&mut children, 5)?);
        code.extend([
            Instruction::Pop(Segment::Temp, 0),
            Instruction::Pop(Segment::Pointer, 1),
            Instruction::Push(Segment::Temp, 0),
            Instruction::Pop(Segment::That, 0),
        ]);
        Ok(code)
    }

    fn if_statement(&self, tree: &Tree, id: NodeId, mut children: Vec<Code>) -> CompileResult<Code> {
        let if_false = self.label("IF_FALSE", id)?;
        let if_end = self.label("IF_END", id)?;
        let blocks: Vec<usize> = tree
            .children(id)
            .iter()
            .enumerate()
            .filter(|(_, c)| tree.kind(**c) == NodeKind::Statements)
            .map(|(i, _)| i)
            .collect();

        let mut code = Vec::new();
        self.comment(&mut code, "if");
        code.extend(take(&mut children, 2)?);
        code.push(Instruction::Arithmetic(Command::Not));
        code.push(Instruction::IfGoto(if_false.clone()));
        match blocks.first() {
            Some(then) => code.extend(take(&mut children, *then)?),
            None => return CompileError::invariant("if statement without a body"),
        }
        code.push(Instruction::Goto(if_end.clone()));
        code.push(Instruction::Label(if_false));
        if let Some(otherwise) = blocks.get(1) {
            code.extend(take(&mut children, *otherwise)?);
            code.push(Instruction::Goto(if_end.clone()));
        }
        code.push(Instruction::Label(if_end));
        Ok(code)
    }

    fn while_statement(
        &self,
        _tree: &Tree,
        id: NodeId,
        mut children: Vec<Code>,
    ) -> CompileResult<Code> {
        let start = self.label("WHILE_START", id)?;
        let end = self.label("WHILE_END", id)?;
        let mut code = Vec::new();
        self.comment(&mut code, "while");
        code.push(Instruction::Label(start.clone()));
        code.extend(take(&mut children, 2)?);
        code.push(Instruction::Arithmetic(Command::Not));
        code.push(Instruction::IfGoto(end.clone()));
        code.extend(take(&mut children, 5)?);
        code.push(Instruction::Goto(start));
        code.push(Instruction::Label(end));
        Ok(code)
    }

    fn return_statement(
        &self,
        tree: &Tree,
        id: NodeId,
        mut children: Vec<Code>,
    ) -> CompileResult<Code> {
        let sub = self.subroutine()?;
        let has_value = tree
            .children(id)
            .iter()
            .any(|c| tree.kind(*c) == NodeKind::Expression);
        let is_void = sub.return_type == "void";
        let mut code = Vec::new();
        self.comment(&mut code, "return");
        match (is_void, has_value) {
            (true, false) => code.push(Instruction::Push(Segment::Const, 0)),
            (false, true) => code.extend(take(&mut children, 1)?),
            (true, true) => {
                return CompileError::invariant(format!(
                    "void subroutine {} returns a value",
                    sub.name
                ));
            }
            (false, false) => {
                return CompileError::invariant(format!(
                    "subroutine {} must return a {}",
                    sub.name, sub.return_type
                ));
            }
        }
        code.push(Instruction::Return);
        Ok(code)
    }

    fn term(&self, tree: &Tree, id: NodeId, mut children: Vec<Code>) -> CompileResult<Code> {
        let first = child(tree, id, 0)?;
        let code = match tree.kind(first) {
            NodeKind::IntConst => {
                let raw = value_of(tree, first)?;
                let v: i32 = match raw.parse() {
                    Ok(v) => v,
                    Err(_) => return CompileError::invariant(format!("bad integer constant {raw}")),
                };
                let magnitude = match u16::try_from(v.unsigned_abs()) {
                    Ok(m) => m,
                    Err(_) => return CompileError::invariant(format!("integer constant {v} out of range")),
                };
                let mut code = vec![Instruction::Push(Segment::Const, magnitude)];
                if v < 0 {
                    code.push(Instruction::Arithmetic(Command::Neg));
                }
                code
            }
            NodeKind::StringConst => {
                let s = match &tree.node(first).token {
                    Some(t) => t.unquoted(),
                    None => return CompileError::invariant("string constant without token"),
                };
                let len = s.chars().count() as u16;
                let mut code = vec![
                    Instruction::Push(Segment::Const, len),
                    Instruction::Call("String.new".to_string(), 1),
                ];
                for c in s.chars() {
                    let code_point = match u16::try_from(c as u32) {
                        Ok(p) => p,
                        Err(_) => return CompileError::invariant(format!("unsupported character {c:?}")),
                    };
                    code.push(Instruction::Push(Segment::Const, code_point));
                    code.push(Instruction::Call("String.appendChar".to_string(), 2));
                }
                code
            }
            NodeKind::Keyword => match value_of(tree, first)? {
                "true" => vec![
                    Instruction::Push(Segment::Const, 1),
                    Instruction::Arithmetic(Command::Neg),
                ],
                "false" | "null" => vec![Instruction::Push(Segment::Const, 0)],
                "this" => vec![Instruction::Push(Segment::Pointer, 0)],
                other => return CompileError::invariant(format!("keyword '{other}' is not a term")),
            },
            NodeKind::Identifier => vec![self.push_var(tree, first)?],
            NodeKind::Symbol => take(&mut children, 1)?,
            _ => concat(children),
        };
        Ok(code)
    }

    fn subroutine_call(&self, tree: &Tree, id: NodeId, mut children: Vec<Code>) -> CompileResult<Code> {
        let qualified = tree.kind(child(tree, id, 1)?) == NodeKind::Symbol
            && child_value(tree, id, 1)? == ".";
        let (name_idx, list_idx) = if qualified { (2, 4) } else { (0, 2) };
        let name = child_value(tree, id, name_idx)?;
        let n_args = count_call_args(tree, child(tree, id, list_idx)?)?;
        let args = take(&mut children, list_idx)?;

        let mut code = Vec::new();
        if !qualified {
            code.push(Instruction::Push(Segment::Pointer, 0));
            code.extend(args);
            code.push(Instruction::Call(
                format!("{}.{name}", self.class_name()?),
                n_args + 1,
            ));
            return Ok(code);
        }

        let qualifier_id = child(tree, id, 0)?;
        let qualifier = value_of(tree, qualifier_id)?;
        if let Some(var) = lookup(&self.sub_routine_table, &self.class_table, qualifier) {
            code.push(Instruction::Push(var.kind.into(), var.ordinal));
            code.extend(args);
            code.push(Instruction::Call(
                format!("{}.{name}", var.type_name),
                n_args + 1,
            ));
            return Ok(code);
        }

        let mut finder = SubroutineKindFinder { name };
        let target_kind = finder.visit(tree, tree.root(id))?;
        let mut n = n_args;
        if target_kind == Some(SubroutineKind::Method) {
            code.push(Instruction::Push(Segment::Pointer, 0));
            n += 1;
        }
        code.extend(args);
        code.push(Instruction::Call(format!("{qualifier}.{name}"), n));
        Ok(code)
    }

    fn array_access(&self, tree: &Tree, id: NodeId, mut children: Vec<Code>) -> CompileResult<Code> {
        let mut code = vec![self.push_var(tree, child(tree, id, 0)?)?];
        code.extend(take(&mut children, 2)?);
        code.extend([
            Instruction::Arithmetic(Command::Add),
            Instruction::Pop(Segment::Pointer, 1),
            Instruction::Push(Segment::That, 0),
        ]);
        Ok(code)
    }
}

impl CompilationEngine for VmCompilationEngine {
    type Output = Code;

    fn enter(&mut self, tree: &Tree, id: NodeId) -> CompileResult<()> {
        match tree.kind(id) {
            NodeKind::Class => self.enter_class(tree, id),
            NodeKind::SubroutineDec => self.enter_subroutine(tree, id),
            _ => Ok(()),
        }
    }

    fn leave(&mut self, tree: &Tree, id: NodeId, mut children: Vec<Code>) -> CompileResult<Code> {
        match tree.kind(id) {
            NodeKind::Start
            | NodeKind::Statements
            | NodeKind::Expression
            | NodeKind::ExpressionList => Ok(concat(children)),
            NodeKind::Class => {
                let class_name = self.class_name()?.to_string();
                let mut code = Vec::new();
                self.comment(&mut code, class_name.clone());
                code.extend(concat(children));
                self.comment(&mut code, format!("~{class_name}"));
                self.class_name = None;
                self.class_table.clear();
                Ok(code)
            }
            NodeKind::ClassVarDec => self.class_var_dec(tree, id),
            NodeKind::SubroutineDec => {
                self.subroutine = None;
                self.sub_routine_table.clear();
                Ok(concat(children))
            }
            NodeKind::ParameterList => self.parameter_list(tree, id),
            NodeKind::VarDec => self.var_dec(tree, id),
            NodeKind::SubroutineBody => self.subroutine_body(tree, id, children),
            NodeKind::LetStatement => {
                let mut code = Vec::new();
                self.comment(&mut code, "let");
                code.extend(concat(children));
                Ok(code)
            }
            NodeKind::Assignment => self.assignment(tree, id, children),
            NodeKind::ArrayAssignment => self.array_assignment(tree, id, children),
            NodeKind::IfStatement => self.if_statement(tree, id, children),
            NodeKind::WhileStatement => self.while_statement(tree, id, children),
            NodeKind::DoStatement => {
                let mut code = Vec::new();
                self.comment(&mut code, "do");
                code.extend(take(&mut children, 1)?);
                code.push(Instruction::Pop(Segment::Temp, 0));
                Ok(code)
            }
            NodeKind::ReturnStatement => self.return_statement(tree, id, children),
            NodeKind::Term => self.term(tree, id, children),
            NodeKind::BinaryOp => {
                let op = binary_op(value_of(tree, id)?)?;
                let mut code = take(&mut children, 0)?;
                code.extend(take(&mut children, 1)?);
                code.push(op);
                Ok(code)
            }
            NodeKind::UnaryOp => {
                let op = unary_op(value_of(tree, id)?)?;
                let mut code = take(&mut children, 0)?;
                code.push(op);
                Ok(code)
            }
            NodeKind::SubroutineCall => self.subroutine_call(tree, id, children),
            NodeKind::ArrayAccess => self.array_access(tree, id, children),
            NodeKind::Keyword
            | NodeKind::Symbol
            | NodeKind::Identifier
            | NodeKind::IntConst
            | NodeKind::StringConst => Ok(vec![]),
        }
    }
}
