//! Expression Lexer
//!
//! Turns an expression string into a flat token stream. Keywords
//! (`AND`, `OR`, `NOT`, `true`, `false`, `null`) are case-insensitive.

use std::fmt;

use crate::error::ExpressionError;

use super::{is_ident_char, VariableRef};

/// A token with its byte-independent character position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Var(VariableRef),

    And,
    Or,
    Not,

    Plus,
    Minus,
    Star,
    Slash,

    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,

    Question,
    Colon,
    LParen,
    RParen,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "'{}'", s),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Null => write!(f, "null"),
            Self::Var(v) => write!(f, "{}", v),
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Gt => write!(f, ">"),
            Self::Lt => write!(f, "<"),
            Self::Ge => write!(f, ">="),
            Self::Le => write!(f, "<="),
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
            Self::Question => write!(f, "?"),
            Self::Colon => write!(f, ":"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::Eof => write!(f, "end of expression"),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    /// Tokenizes the whole input, always ending with [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens = Vec::new();

        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }

            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos: self.pos,
                });
                return Ok(tokens);
            };

            let pos = self.pos;
            let kind = match ch {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '?' => self.single(TokenKind::Question),
                ':' => self.single(TokenKind::Colon),
                '>' => self.one_or_two('=', TokenKind::Gt, TokenKind::Ge),
                '<' => self.one_or_two('=', TokenKind::Lt, TokenKind::Le),
                '!' => self.one_or_two('=', TokenKind::Not, TokenKind::Ne),
                '=' if self.peek_at(1) == Some('=') => {
                    self.pos += 2;
                    TokenKind::Eq
                }
                '&' if self.peek_at(1) == Some('&') => {
                    self.pos += 2;
                    TokenKind::And
                }
                '|' if self.peek_at(1) == Some('|') => {
                    self.pos += 2;
                    TokenKind::Or
                }
                '"' | '\'' => self.read_string(ch)?,
                '$' => self.read_variable()?,
                c if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) => {
                    self.read_number()?
                }
                c if c.is_ascii_alphabetic() || c == '_' => self.read_keyword()?,
                other => return Err(ExpressionError::UnexpectedChar { ch: other, pos }),
            };

            tokens.push(Token { kind, pos });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn one_or_two(&mut self, next: char, one: TokenKind, two: TokenKind) -> TokenKind {
        if self.peek_at(1) == Some(next) {
            self.pos += 2;
            two
        } else {
            self.pos += 1;
            one
        }
    }

    fn read_string(&mut self, quote: char) -> Result<TokenKind, ExpressionError> {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();

        loop {
            match self.peek() {
                None => return Err(ExpressionError::UnterminatedString(start)),
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(TokenKind::Str(text));
                }
                Some('\\') => {
                    match self.peek_at(1) {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(c) => text.push(c),
                        None => return Err(ExpressionError::UnterminatedString(start)),
                    }
                    self.pos += 2;
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<TokenKind, ExpressionError> {
        let start = self.pos;
        let mut seen_dot = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !seen_dot && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                seen_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }

        let text: String = self.input[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ExpressionError::InvalidNumber(text))
    }

    fn read_variable(&mut self) -> Result<TokenKind, ExpressionError> {
        let start = self.pos;
        self.pos += 1;

        while let Some(c) = self.peek() {
            if is_ident_char(c) || (c == '.' && self.peek_at(1).is_some_and(is_ident_char)) {
                self.pos += 1;
            } else {
                break;
            }
        }

        let raw: String = self.input[start..self.pos].iter().collect();
        VariableRef::parse(&raw)
            .map(TokenKind::Var)
            .ok_or(ExpressionError::InvalidReference(raw))
    }

    fn read_keyword(&mut self) -> Result<TokenKind, ExpressionError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }

        let word: String = self.input[start..self.pos].iter().collect();
        match word.to_ascii_lowercase().as_str() {
            "and" => Ok(TokenKind::And),
            "or" => Ok(TokenKind::Or),
            "not" => Ok(TokenKind::Not),
            "true" => Ok(TokenKind::Bool(true)),
            "false" => Ok(TokenKind::Bool(false)),
            "null" | "none" => Ok(TokenKind::Null),
            _ => Err(ExpressionError::UnexpectedToken {
                found: word,
                expected: "a literal, variable or operator".to_string(),
                pos: start,
            }),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }
}
