use log::trace;
use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::tokens::{Token, TokenKind, KEYWORDS};

const WHITESPACE: usize = 1;
const LINE_COMMENT: usize = 2;
const BLOCK_COMMENT: usize = 3;
const STRING: usize = 4;
const SYMBOL: usize = 5;
const WORD: usize = 6;

/// Largest value the VM accepts as `push constant`.
pub const MAX_INT_CONST: u32 = 32767;

pub struct Tokenizer {
    re: Regex,
    id_re: Regex,
}

impl Tokenizer {
    pub fn new() -> Self {
        let whitespace = r"\s+";
        let comment = "//[^\n]*";
        let comments = r"/\*(?s:.*?)(?:\*/|\z)";
        let str_pattern = "\"[^\"\n]*\"?";
        let symbols = r"[{}()\[\].,;+\-*/&|<>=~]";
        let word = r#"[^\s{}()\[\].,;+\-*/&|<>=~"]+"#;
        let pattern = format!(
            "({whitespace})|({comment})|({comments})|({str_pattern})|({symbols})|({word})"
        );
        return Tokenizer {
            re: Regex::new(&pattern).expect("regex syntax error."),
            id_re: Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]*$").expect("regex syntax error."),
        };
    }

    /// Lazily splits `text` into tokens. The sequence ends with an EOF token,
    /// or with the first error, after which it yields nothing.
    pub fn tokenize<'a>(&'a self, text: &'a str) -> Tokens<'a> {
        Tokens {
            tokenizer: self,
            text,
            pos: 0,
            line: 1,
            done: false,
        }
    }

    fn classify_word(&self, line: usize, word: &str) -> CompileResult<Token> {
        if word.starts_with(|c: char| c.is_ascii_digit()) {
            if !word.chars().all(|c| c.is_ascii_digit()) {
                return CompileError::tokenization(line, format!("not an integer: '{word}'"));
            }
            return match str::parse::<u32>(word) {
                Ok(v) if v <= MAX_INT_CONST => Ok(Token::new(line, TokenKind::IntConst, word)),
                _ => CompileError::tokenization(
                    line,
                    format!("integer constant out of range 0..={MAX_INT_CONST}: {word}"),
                ),
            };
        }
        if KEYWORDS.contains(&word) {
            return Ok(Token::new(line, TokenKind::Keyword, word));
        }
        if self.id_re.is_match(word) {
            return Ok(Token::new(line, TokenKind::Identifier, word));
        }
        CompileError::tokenization(line, format!("invalid identifier: '{word}'"))
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Tokens<'a> {
    tokenizer: &'a Tokenizer,
    text: &'a str,
    pos: usize,
    line: usize,
    done: bool,
}

impl<'a> Tokens<'a> {
    fn scan(&mut self) -> CompileResult<Token> {
        loop {
            if self.pos >= self.text.len() {
                self.done = true;
                return Ok(Token::eof(self.line));
            }
            let line = self.line;
            let caps = match self.tokenizer.re.captures_at(self.text, self.pos) {
                Some(caps) => caps,
                None => return CompileError::tokenization(line, "unrecognized input"),
            };
            let whole = caps.get(0).map_or("", |m| m.as_str());
            if caps.get(0).map(|m| m.start()) != Some(self.pos) {
                return CompileError::tokenization(line, "unrecognized input");
            }
            self.pos += whole.len();
            self.line += whole.matches('\n').count();

            if caps.get(WHITESPACE).is_some() || caps.get(LINE_COMMENT).is_some() {
                continue;
            }
            if caps.get(BLOCK_COMMENT).is_some() {
                if whole.len() < 4 || !whole.ends_with("*/") {
                    return CompileError::tokenization(line, "unterminated block comment");
                }
                continue;
            }
            if let Some(s) = caps.get(STRING) {
                let s = s.as_str();
                if s.len() < 2 || !s.ends_with('"') {
                    return CompileError::tokenization(line, format!("malformed string: {s}"));
                }
                return Ok(Token::new(line, TokenKind::StringConst, s));
            }
            if let Some(sm) = caps.get(SYMBOL) {
                return Ok(Token::new(line, TokenKind::Symbol, sm.as_str()));
            }
            if let Some(w) = caps.get(WORD) {
                return self.tokenizer.classify_word(line, w.as_str());
            }
            return CompileError::tokenization(line, "unrecognized input");
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let r = self.scan();
        match &r {
            Ok(t) => trace!("line {}: {} {}", t.line, t.kind, t.value),
            Err(_) => self.done = true,
        }
        Some(r)
    }
}
