use std::{error::Error, io::Write};

use log::debug;

use crate::{
    analyzer::Analyzer,
    code_generator::{Instruction, VmWriter},
    error::CompileResult,
    tokenizer::Tokenizer,
    vm_compilation_engine::VmCompilationEngine,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Emit `//` marker lines around classes, subroutines and statements.
    pub emit_comments: bool,
}

/// Runs tokenizer, analyzer and code generator over one compilation unit.
/// Every call builds fresh stages, so one `Compiler` can serve many units.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Compiler { config }
    }

    pub fn compile_str(&self, source: &str) -> CompileResult<Vec<Instruction>> {
        let tokenizer = Tokenizer::new();
        let (tree, root) = Analyzer::start(tokenizer.tokenize(source))?;
        debug!("syntax tree has {} nodes", tree.len());
        VmCompilationEngine::new(self.config).generate(&tree, root)
    }

    /// Compiles `source` and writes the VM code to `sink`. Nothing is written
    /// when compilation fails.
    pub fn compile_to<W: Write>(
        &self,
        source: &str,
        sink: W,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let code = self.compile_str(source)?;
        VmWriter::new(sink).write_all(&code)?;
        Ok(())
    }
}
