//! Compiler for the Jack language: source text is split into tokens, parsed
//! into a syntax tree and lowered to stack VM instructions.

pub mod analyzer;
pub mod code_generator;
pub mod compilation_engine;
pub mod compiler;
pub mod error;
pub mod sym_table;
pub mod tokenizer;
pub mod tokens;
pub mod tree;
pub mod vm_compilation_engine;

pub use analyzer::{Analyzer, EntryPoint};
pub use code_generator::{Command, Instruction, Segment, VmWriter};
pub use compiler::{Compiler, CompilerConfig};
pub use error::{CompileError, CompileResult};
pub use tokenizer::Tokenizer;
pub use tokens::{Token, TokenKind};
pub use tree::{NodeId, NodeKind, Tree};
