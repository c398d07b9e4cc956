use std::error::Error;

use derive_more::Display;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum CompileError {
    /// Malformed literal, unterminated string or comment.
    #[display(fmt = "tokenization error at line {}: {}", line, message)]
    Tokenization { line: usize, message: String },
    /// Token mismatch, premature end of input or trailing tokens.
    #[display(fmt = "syntax error at line {}: {}", line, message)]
    Syntax { line: usize, message: String },
    #[display(fmt = "symbol error: '{}' is already declared in this scope", name)]
    DuplicateSymbol { name: String },
    #[display(fmt = "symbol error at line {}: '{}' is not declared", line, name)]
    UndeclaredSymbol { line: usize, name: String },
    /// Violated code generation invariant, e.g. a value returned from a void subroutine.
    #[display(fmt = "code generation error: {}", message)]
    Invariant { message: String },
}

impl CompileError {
    pub fn tokenization<T>(line: usize, message: impl Into<String>) -> CompileResult<T> {
        Err(CompileError::Tokenization {
            line,
            message: message.into(),
        })
    }

    pub fn syntax<T>(line: usize, message: impl Into<String>) -> CompileResult<T> {
        Err(CompileError::Syntax {
            line,
            message: message.into(),
        })
    }

    pub fn invariant<T>(message: impl Into<String>) -> CompileResult<T> {
        Err(CompileError::Invariant {
            message: message.into(),
        })
    }

    /// Source line of the error, when the failing stage knows one.
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Tokenization { line, .. }
            | CompileError::Syntax { line, .. }
            | CompileError::UndeclaredSymbol { line, .. } => Some(*line),
            CompileError::DuplicateSymbol { .. } | CompileError::Invariant { .. } => None,
        }
    }
}

impl Error for CompileError {}
