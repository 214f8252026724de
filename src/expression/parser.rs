//! Expression Parser
//!
//! Recursive-descent parser. Precedence, lowest first:
//!
//! | Level | Operators                 |
//! |-------|---------------------------|
//! | 1     | `c ? a : b`               |
//! | 2     | `OR`, `\|\|`              |
//! | 3     | `AND`, `&&`               |
//! | 4     | `NOT`, `!`                |
//! | 5     | `> < >= <= == !=`         |
//! | 6     | `+ -`                     |
//! | 7     | `* /`                     |
//! | 8     | unary `-`                 |
//!
//! The ternary form also covers the counting idiom used by rules, e.g.
//! `($step1.flag ? 1 : 0) + ($step2.flag ? 1 : 0) >= 2`.

use serde_json::Value;

use crate::error::ExpressionError;

use super::lexer::{Lexer, Token, TokenKind};
use super::VariableRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(VariableRef),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Collects every variable reference in the tree, in source order.
    pub fn variables(&self) -> Vec<&VariableRef> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a VariableRef>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var(var) => out.push(var),
            Expr::Not(inner) | Expr::Neg(inner) => inner.collect_variables(out),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_variables(out);
                then.collect_variables(out);
                otherwise.collect_variables(out);
            }
        }
    }
}

/// Parses a complete expression. Trailing tokens are an error.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn ternary(&mut self) -> Result<Expr, ExpressionError> {
        let cond = self.or()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }

        let then = self.ternary()?;
        self.expect(&TokenKind::Colon, "':' in conditional expression")?;
        let otherwise = self.ternary()?;

        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not()?;
        while self.eat(&TokenKind::And) {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&TokenKind::Not) {
            let inner = self.not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        // `!` binds tighter than comparison when written inside arithmetic
        if self.eat(&TokenKind::Not) {
            let inner = self.unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(number_literal(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Var(var) => Ok(Expr::Var(var)),
            TokenKind::LParen => {
                let inner = self.ternary()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Eof => Err(ExpressionError::UnexpectedEnd(
                "a literal, variable or '('".to_string(),
            )),
            other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                expected: "a literal, variable or '('".to_string(),
                pos: token.pos,
            }),
        }
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ExpressionError> {
        if self.eat(kind) {
            return Ok(());
        }
        let token = &self.tokens[self.pos];
        match token.kind {
            TokenKind::Eof => Err(ExpressionError::UnexpectedEnd(what.to_string())),
            ref other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                expected: what.to_string(),
                pos: token.pos,
            }),
        }
    }

    fn expect_eof(&self) -> Result<(), ExpressionError> {
        let token = &self.tokens[self.pos];
        match token.kind {
            TokenKind::Eof => Ok(()),
            ref other => Err(ExpressionError::UnexpectedToken {
                found: other.to_string(),
                expected: "end of expression".to_string(),
                pos: token.pos,
            }),
        }
    }
}

/// Integral literals become JSON integers so `1` and `1.0` print naturally.
fn number_literal(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
