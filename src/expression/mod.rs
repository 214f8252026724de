//! Expression Language
//!
//! A small condition/formula language used by step conditions, rule
//! conditions and input mappings.
//!
//! # Structure
//!
//! - [`lexer`]: Tokenizer
//! - [`parser`]: Recursive-descent parser producing an [`Expr`] tree
//! - [`evaluator`]: Cached evaluation against a [`Resolve`] context
//!
//! # Variable references
//!
//! References take the form `$source.path...` where `source` is one of
//! `input`, `context`, `assessment` or `stepN`. Path segments are object
//! keys or array indices:
//!
//! ```text
//! $input.applicant.income
//! $step2.scores.0
//! $assessment.weighted_total
//! ```

pub mod evaluator;
pub mod lexer;
pub mod parser;

use std::fmt;

use serde_json::Value;

pub use evaluator::{Evaluator, ParseReport};
pub use parser::{BinaryOp, Expr};

/// Namespace a variable reference reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarSource {
    Input,
    Context,
    Assessment,
    Step(u32),
}

impl VarSource {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "input" => Some(Self::Input),
            "context" => Some(Self::Context),
            "assessment" => Some(Self::Assessment),
            other => other
                .strip_prefix("step")
                .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse().ok())
                .map(Self::Step),
        }
    }
}

impl fmt::Display for VarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Context => write!(f, "context"),
            Self::Assessment => write!(f, "assessment"),
            Self::Step(n) => write!(f, "step{}", n),
        }
    }
}

/// A parsed `$source.path...` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableRef {
    pub source: VarSource,
    pub path: Vec<String>,
}

impl VariableRef {
    /// Parses a complete reference token such as `$step1.total.value`.
    ///
    /// Returns `None` when the text is not exactly one well-formed reference.
    pub fn parse(raw: &str) -> Option<Self> {
        let body = raw.strip_prefix('$')?;
        let mut parts = body.split('.');
        let source = VarSource::parse(parts.next()?)?;

        let mut path = Vec::new();
        for segment in parts {
            if segment.is_empty() || !segment.chars().all(is_ident_char) {
                return None;
            }
            path.push(segment.to_string());
        }

        Some(Self { source, path })
    }

    /// Returns the referenced step number for `$stepN` references.
    pub fn step(&self) -> Option<u32> {
        match self.source {
            VarSource::Step(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.source)?;
        for segment in &self.path {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

/// Supplies values for variable references during evaluation.
///
/// Implementations return `None` for anything that cannot be resolved;
/// the evaluator turns that into `null`.
pub trait Resolve {
    fn resolve(&self, var: &VariableRef) -> Option<Value>;
}

/// Walks `path` into `root`, treating numeric segments as array indices.
pub fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Identifier characters allowed in reference sources and path segments.
pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Returns every `$...` token in `text`, in order of first occurrence,
/// without duplicates. Quoted string literals are skipped.
///
/// This is a lexical scan: it works on text that does not parse.
pub fn scan_references(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut found: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            quote @ ('"' | '\'') => {
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            '$' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (is_ident_char(chars[i])
                        || (chars[i] == '.' && chars.get(i + 1).is_some_and(|c| is_ident_char(*c))))
                {
                    i += 1;
                }
                if i > start + 1 {
                    let token: String = chars[start..i].iter().collect();
                    if !found.contains(&token) {
                        found.push(token);
                    }
                }
            }
            _ => i += 1,
        }
    }

    found
}

/// A run of an input-mapping string: literal text or a reference token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Reference(&'a str),
}

/// Splits an input-mapping string into literal text and well-formed
/// reference tokens.
///
/// Unlike [`scan_references`], quotes are ordinary text here and tokens
/// that do not parse as a [`VariableRef`] (such as `$100`) stay literal.
pub fn split_template(text: &str) -> Vec<Segment<'_>> {
    let bytes = text.as_bytes();
    let is_ident = |b: u8| is_ident_char(b as char);
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        let start = i;
        let mut end = i + 1;
        while end < bytes.len()
            && (is_ident(bytes[end]) || (bytes[end] == b'.' && bytes.get(end + 1).is_some_and(|b| is_ident(*b))))
        {
            end += 1;
        }

        if VariableRef::parse(&text[start..end]).is_some() {
            if literal_start < start {
                segments.push(Segment::Text(&text[literal_start..start]));
            }
            segments.push(Segment::Reference(&text[start..end]));
            literal_start = end;
        }
        i = end;
    }

    if literal_start < text.len() {
        segments.push(Segment::Text(&text[literal_start..]));
    }
    segments
}
