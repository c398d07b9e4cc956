use derive_more::Display;

pub const KEYWORDS: [&str; 21] = [
    "class",
    "constructor",
    "function",
    "method",
    "field",
    "static",
    "var",
    "int",
    "char",
    "boolean",
    "void",
    "true",
    "false",
    "null",
    "this",
    "let",
    "do",
    "if",
    "else",
    "while",
    "return",
];

pub const SYMBOLS: &str = "{}()[].,;+-*/&|<>=~";

pub const TYPE_NAMES: [&str; 3] = ["int", "char", "boolean"];
pub const STATEMENTS: [&str; 5] = ["let", "do", "if", "while", "return"];
pub const CONSTANTS: [&str; 4] = ["true", "false", "null", "this"];
pub const UNARY_OPS: [&str; 2] = ["-", "~"];
pub const BINARY_OPS: [&str; 9] = ["+", "-", "*", "/", "&", "|", "<", ">", "="];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TokenKind {
    #[display(fmt = "keyword")]
    Keyword,
    #[display(fmt = "symbol")]
    Symbol,
    #[display(fmt = "identifier")]
    Identifier,
    #[display(fmt = "integerConstant")]
    IntConst,
    #[display(fmt = "stringConstant")]
    StringConst,
    #[display(fmt = "EOF")]
    Eof,
}

/// A lexeme with its source line. String constants keep their surrounding quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub line: usize,
    pub kind: TokenKind,
    pub value: String,
}

impl Token {
    pub fn new(line: usize, kind: TokenKind, value: impl Into<String>) -> Self {
        Token {
            line,
            kind,
            value: value.into(),
        }
    }

    pub fn eof(line: usize) -> Self {
        Token::new(line, TokenKind::Eof, "EOF")
    }

    pub fn is(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value == value
    }

    pub fn is_one_of(&self, values: &[&str]) -> bool {
        matches!(self.kind, TokenKind::Keyword | TokenKind::Symbol)
            && values.contains(&self.value.as_str())
    }

    /// String constant contents without the quotes.
    pub fn unquoted(&self) -> &str {
        let v = self.value.as_str();
        if self.kind == TokenKind::StringConst && v.len() >= 2 {
            &v[1..v.len() - 1]
        } else {
            v
        }
    }
}
