//! Error Types
//!
//! One error enum per concern, aggregated into [`FlowError`] at the
//! orchestrator boundary.

use thiserror::Error;

/// A single structural problem found while validating a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("Workflow has no steps")]
    EmptyWorkflow,

    #[error("Step number {0} appears more than once")]
    DuplicateStepNumber(u32),

    #[error("Step numbers must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousNumbering { expected: u32, found: u32 },

    #[error("Step {step}: output variable '{variable}' is already produced by step {other}")]
    DuplicateOutputVariable { step: u32, other: u32, variable: String },

    #[error("Step {step} has an empty output variable")]
    EmptyOutputVariable { step: u32 },

    #[error("Step {step} references unknown step {reference}")]
    DanglingReference { step: u32, reference: u32 },

    #[error("Step {step} references step {reference}, which does not run before it")]
    ForwardReference { step: u32, reference: u32 },

    #[error("Step {step} references its own output")]
    SelfReference { step: u32 },

    #[error("Step {step}: reference '{reference}' must start with '{expected}', the output of step {target}")]
    OutputMismatch {
        step: u32,
        target: u32,
        reference: String,
        expected: String,
    },

    #[error("Step {step}: condition does not parse: {message}")]
    InvalidCondition { step: u32, message: String },

    #[error("Step {step}: no calculation engine registered for '{tool}.{function}'")]
    UnknownTarget {
        step: u32,
        tool: String,
        function: String,
    },

    #[error("Dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<u32>),
}

fn format_cycle(cycle: &[u32]) -> String {
    cycle
        .iter()
        .map(|n| format!("step{}", n))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Fatal definition error raised before any step runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Workflow validation failed:\n{}", join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Returns the cycles contained in this error, if any.
    pub fn cycles(&self) -> Vec<Vec<u32>> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                ValidationIssue::Cycle(cycle) => Some(cycle.clone()),
                _ => None,
            })
            .collect()
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("  - {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid variable reference '{0}'")]
    InvalidReference(String),

    #[error("unexpected token '{found}' at position {pos}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        pos: usize,
    },

    #[error("unexpected end of expression, expected {0}")]
    UnexpectedEnd(String),

    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    #[error("cannot negate {0}")]
    InvalidNegation(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic produced a non-finite number")]
    NonFinite,
}

/// Failure reported by a calculation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Worth retrying: backend hiccups, timeouts.
    #[error("transient engine error: {0}")]
    Transient(String),

    /// Never retried.
    #[error("engine error: {0}")]
    Permanent(String),

    #[error("unknown function '{function}' on engine '{tool}'")]
    UnknownFunction { tool: String, function: String },

    #[error("step timed out after {0} ms")]
    Timeout(u64),
}

impl EngineError {
    /// Returns true if the failure may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Configuration and definition-load errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("inconsistent risk thresholds: {0}")]
    RoutingInconsistency(String),

    #[error("rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    #[error("duplicate rule id '{0}'")]
    DuplicateRule(String),

    #[error("duplicate engine registration '{0}'")]
    DuplicateEngine(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors from the workflow definition store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow definition '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Errors writing to the audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error for a workflow run.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("execution context error: {0}")]
    Context(String),

    #[error("worker task failed: {0}")]
    Worker(String),
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;
