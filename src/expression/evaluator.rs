//! Expression Evaluation
//!
//! [`Evaluator`] parses each distinct expression string once and caches
//! the tree. Evaluation itself is pure: the same expression against the
//! same context always yields the same value.
//!
//! # Semantics
//!
//! - A blank expression evaluates to `true`.
//! - Unresolvable references evaluate to `null`; they never raise.
//! - Truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
//! - Comparisons are numeric when both sides are numbers or numeric
//!   strings. Otherwise `==`/`!=` compare structurally, ordering between
//!   two strings is lexicographic, and any other ordering is `false`.
//! - `+` concatenates when either side is a string.
//! - Arithmetic on non-numbers, and division by zero, are errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::error::ExpressionError;

use super::parser::{self, BinaryOp, Expr};
use super::{scan_references, Resolve, VarSource};

/// Result of a syntax check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseReport {
    pub valid: bool,
    /// Distinct `$...` tokens, in order of first occurrence
    pub variables: Vec<String>,
    pub referenced_steps: Vec<u32>,
    pub error: Option<String>,
}

type CacheEntry = Result<Arc<Expr>, ExpressionError>;

/// Parses, caches and evaluates expressions.
#[derive(Debug, Default)]
pub struct Evaluator {
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parsed tree for `expr`, parsing at most once per string.
    pub fn compile(&self, expr: &str) -> Result<Arc<Expr>, ExpressionError> {
        let key = expr.trim();
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(entry) = cache.get(key) {
            return entry.clone();
        }

        let entry = parser::parse(key).map(Arc::new);
        cache.insert(key.to_string(), entry.clone());
        entry
    }

    /// Number of distinct expressions parsed so far.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Checks the syntax of `expr` and lists what it references.
    pub fn parse(&self, expr: &str) -> ParseReport {
        let variables = scan_references(expr);
        let mut referenced_steps: Vec<u32> = variables
            .iter()
            .filter_map(|raw| super::VariableRef::parse(raw))
            .filter_map(|var| var.step())
            .collect();
        referenced_steps.sort_unstable();
        referenced_steps.dedup();

        let error = if expr.trim().is_empty() {
            None
        } else {
            self.compile(expr).err().map(|e| e.to_string())
        };

        ParseReport {
            valid: error.is_none(),
            variables,
            referenced_steps,
            error,
        }
    }

    /// Returns exactly the `$...` tokens occurring in `expr`.
    pub fn get_required_variables(&self, expr: &str) -> Vec<String> {
        scan_references(expr)
    }

    /// Evaluates `expr` to a value.
    pub fn evaluate(&self, expr: &str, ctx: &dyn Resolve) -> Result<Value, ExpressionError> {
        if expr.trim().is_empty() {
            return Ok(Value::Bool(true));
        }
        let tree = self.compile(expr)?;
        eval(&tree, ctx)
    }

    /// Evaluates `expr` and reduces the result to its truthiness.
    pub fn evaluate_condition(&self, expr: &str, ctx: &dyn Resolve) -> Result<bool, ExpressionError> {
        self.evaluate(expr, ctx).map(|v| truthy(&v))
    }
}

/// Evaluates a parsed tree against `ctx`.
pub fn eval(expr: &Expr, ctx: &dyn Resolve) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(var) => Ok(ctx.resolve(var).unwrap_or_else(|| {
            if var.source != VarSource::Assessment {
                debug!("Unresolved reference {} evaluates to null", var);
            }
            Value::Null
        })),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, ctx)?))),
        Expr::Neg(inner) => {
            let value = eval(inner, ctx)?;
            match value.as_f64() {
                Some(n) => number(-n),
                None => Err(ExpressionError::InvalidNegation(type_name(&value).to_string())),
            }
        }
        Expr::And(left, right) => {
            if !truthy(&eval(left, ctx)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, ctx)?)))
        }
        Expr::Or(left, right) => {
            if truthy(&eval(left, ctx)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, ctx)?)))
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => {
            if truthy(&eval(cond, ctx)?) {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            binary(*op, &l, &r)
        }
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(l, r))),
        BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => Ok(Value::Bool(compare(op, l, r))),
        BinaryOp::Add => {
            if l.is_string() || r.is_string() {
                return Ok(Value::String(format!("{}{}", display(l), display(r))));
            }
            arithmetic(op, l, r, |a, b| Ok(a + b))
        }
        BinaryOp::Sub => arithmetic(op, l, r, |a, b| Ok(a - b)),
        BinaryOp::Mul => arithmetic(op, l, r, |a, b| Ok(a * b)),
        BinaryOp::Div => arithmetic(op, l, r, |a, b| {
            if b == 0.0 {
                Err(ExpressionError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }),
    }
}

fn arithmetic(
    op: BinaryOp,
    l: &Value,
    r: &Value,
    f: impl Fn(f64, f64) -> Result<f64, ExpressionError>,
) -> Result<Value, ExpressionError> {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => number(f(a, b)?),
        _ => Err(ExpressionError::TypeMismatch {
            op: op.symbol().to_string(),
            left: type_name(l).to_string(),
            right: type_name(r).to_string(),
        }),
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> bool {
    let ordering = match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (l, r) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };

    let Some(ordering) = ordering else {
        return false;
    };

    match op {
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Ge => ordering.is_ge(),
        BinaryOp::Le => ordering.is_le(),
        _ => false,
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (as_number(l), as_number(r)) {
        (Some(a), Some(b)) if l.is_number() || r.is_number() => a == b,
        _ => l == r,
    }
}

/// Numbers, and strings that parse as numbers.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn number(n: f64) -> Result<Value, ExpressionError> {
    if !n.is_finite() {
        return Err(ExpressionError::NonFinite);
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or(ExpressionError::NonFinite)
}

/// Truthiness used by conditions and boolean operators.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Renders a value for string concatenation and message templates.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{lookup, VariableRef};
    use serde_json::json;

    /// Resolves `$source.path` against a JSON object keyed by source name.
    struct JsonScope(Value);

    impl Resolve for JsonScope {
        fn resolve(&self, var: &VariableRef) -> Option<Value> {
            let root = self.0.get(var.source.to_string())?;
            lookup(root, &var.path).cloned()
        }
    }

    fn scope() -> JsonScope {
        JsonScope(json!({
            "input": {
                "amount": 1200,
                "ratio": "0.4",
                "name": "acme",
                "tags": ["a", "b"],
                "applicant": {"profile": {"score": 710, "flags": {"pep": false, "sanctioned": true}}}
            },
            "step1": {"total": {"value": 50, "items": [1, 2, 3]}},
            "step2": {"approved": true},
            "context": {"user_id": "u-1"}
        }))
    }

    fn eval_str(expr: &str) -> Value {
        Evaluator::new().evaluate(expr, &scope()).unwrap()
    }

    #[test]
    fn test_blank_is_true() {
        let evaluator = Evaluator::new();
        for blank in ["", "   ", "\n\t"] {
            assert_eq!(evaluator.evaluate(blank, &scope()).unwrap(), json!(true));
            assert!(evaluator.evaluate_condition(blank, &JsonScope(json!({}))).unwrap());
        }
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval_str("$input.amount > 1000"), json!(true));
        assert_eq!(eval_str("$input.amount <= 1000"), json!(false));
        assert_eq!(eval_str("$input.ratio >= 0.4"), json!(true));
        assert_eq!(eval_str("$input.name == 'acme'"), json!(true));
        assert_eq!(eval_str("$input.name != \"acme\""), json!(false));
        assert_eq!(eval_str("$input.name < 'b'"), json!(true));
        assert_eq!(eval_str("1 == 1.0"), json!(true));
    }

    #[test]
    fn test_deep_paths_with_boolean_combinators() {
        let expr = "$input.applicant.profile.score > 700 AND ($input.applicant.profile.flags.pep OR $input.applicant.profile.flags.sanctioned) AND NOT $step2.approved == false";
        assert_eq!(eval_str(expr), json!(true));

        let expr = "$input.applicant.profile.flags.pep AND $input.applicant.profile.score > 0 OR $step1.total.items.2 == 3";
        assert_eq!(eval_str(expr), json!(true));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_str("$step1.total.value * 2 + 1"), json!(101));
        assert_eq!(eval_str("$step1.total.value / 4"), json!(12.5));
        assert_eq!(eval_str("-$step1.total.value"), json!(-50));
        assert_eq!(eval_str("'id-' + $input.amount"), json!("id-1200"));
    }

    #[test]
    fn test_counting_idiom() {
        let expr = "($step2.approved ? 1 : 0) + ($input.applicant.profile.flags.pep ? 1 : 0) + ($input.applicant.profile.flags.sanctioned ? 1 : 0)";
        assert_eq!(eval_str(expr), json!(2));
        assert_eq!(eval_str(&format!("{} >= 2", expr)), json!(true));
    }

    #[test]
    fn test_missing_variable_is_null() {
        assert_eq!(eval_str("$input.nope.deeper"), Value::Null);
        assert_eq!(eval_str("$input.nope > 3"), json!(false));
        assert_eq!(eval_str("$input.nope == null"), json!(true));
        assert_eq!(eval_str("$step9.anything"), Value::Null);
        assert_eq!(eval_str("NOT $assessment.weighted_total"), json!(true));
    }

    #[test]
    fn test_errors() {
        let evaluator = Evaluator::new();
        assert_eq!(
            evaluator.evaluate("1 / 0", &scope()),
            Err(ExpressionError::DivisionByZero)
        );
        assert!(matches!(
            evaluator.evaluate("$input.tags * 2", &scope()),
            Err(ExpressionError::TypeMismatch { .. })
        ));
        assert!(evaluator.evaluate("$input.amount >", &scope()).is_err());
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert_eq!(eval_str("false AND 1 / 0"), json!(false));
        assert_eq!(eval_str("true OR 1 / 0"), json!(true));
    }

    #[test]
    fn test_repeated_evaluation_is_stable_and_cached() {
        let evaluator = Evaluator::new();
        let ctx = scope();
        let expr = "$input.amount * 2 > $step1.total.value";
        let first = evaluator.evaluate(expr, &ctx).unwrap();
        for _ in 0..5 {
            assert_eq!(evaluator.evaluate(expr, &ctx).unwrap(), first);
        }
        assert_eq!(evaluator.cached_count(), 1);
    }

    #[test]
    fn test_parse_report() {
        let evaluator = Evaluator::new();
        let report = evaluator.parse("$step3.x.y > 1 AND $step1.z == $input.a AND $step3.x.y < 9");
        assert!(report.valid);
        assert_eq!(report.variables, vec!["$step3.x.y", "$step1.z", "$input.a"]);
        assert_eq!(report.referenced_steps, vec![1, 3]);

        let bad = evaluator.parse("$step1.x >> 2");
        assert!(!bad.valid);
        assert!(bad.error.is_some());
        assert_eq!(bad.referenced_steps, vec![1]);
    }

    #[test]
    fn test_get_required_variables() {
        let evaluator = Evaluator::new();
        assert_eq!(
            evaluator.get_required_variables("$context.user_id == 'u-1' OR $assessment.safety > 0.5"),
            vec!["$context.user_id", "$assessment.safety"]
        );
        assert!(evaluator.get_required_variables("").is_empty());
    }

    #[test]
    fn test_truthiness() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(truthy(&json!({"a": 1})));
        assert!(truthy(&json!(-1)));
    }
}
