//! Built-in Engines
//!
//! `math`: small arithmetic engine used by the CLI and tests. Every
//! function returns `{"result": <number>}`.
//!
//! | Function   | Arguments             |
//! |------------|-----------------------|
//! | `add`      | `a`, `b`              |
//! | `subtract` | `a`, `b`              |
//! | `multiply` | `a`, `b`              |
//! | `divide`   | `a`, `b` (b != 0)     |
//! | `sum`      | `values` (array)      |
//! | `identity` | `value` (any)         |

use serde_json::{json, Value};

use crate::error::EngineError;

use super::registry::CalculationEngine;

const FUNCTIONS: &[&str] = &["add", "subtract", "multiply", "divide", "sum", "identity"];

#[derive(Debug, Clone, Copy, Default)]
pub struct MathEngine;

impl CalculationEngine for MathEngine {
    fn name(&self) -> &str {
        "math"
    }

    fn functions(&self) -> Vec<String> {
        FUNCTIONS.iter().map(|f| f.to_string()).collect()
    }

    fn invoke(&self, function: &str, args: &Value) -> Result<Value, EngineError> {
        let result = match function {
            "add" => number(args, "a")? + number(args, "b")?,
            "subtract" => number(args, "a")? - number(args, "b")?,
            "multiply" => number(args, "a")? * number(args, "b")?,
            "divide" => {
                let divisor = number(args, "b")?;
                if divisor == 0.0 {
                    return Err(EngineError::Permanent("division by zero".to_string()));
                }
                number(args, "a")? / divisor
            }
            "sum" => {
                let values = args
                    .get("values")
                    .and_then(Value::as_array)
                    .ok_or_else(|| EngineError::Permanent("'values' must be an array".to_string()))?;
                values.iter().try_fold(0.0, |acc, v| {
                    v.as_f64()
                        .map(|n| acc + n)
                        .ok_or_else(|| EngineError::Permanent(format!("'{}' is not a number", v)))
                })?
            }
            "identity" => return Ok(json!({"result": args.get("value").cloned().unwrap_or(Value::Null)})),
            other => {
                return Err(EngineError::UnknownFunction {
                    tool: self.name().to_string(),
                    function: other.to_string(),
                })
            }
        };

        Ok(json!({ "result": to_json_number(result)? }))
    }
}

fn number(args: &Value, name: &str) -> Result<f64, EngineError> {
    args.get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| EngineError::Permanent(format!("argument '{}' must be a number", name)))
}

fn to_json_number(n: f64) -> Result<Value, EngineError> {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Ok(Value::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| EngineError::Permanent(format!("result {} is not a finite number", n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let engine = MathEngine;
        assert_eq!(engine.invoke("add", &json!({"a": 2, "b": 3})).unwrap(), json!({"result": 5}));
        assert_eq!(engine.invoke("subtract", &json!({"a": 2, "b": 3})).unwrap(), json!({"result": -1}));
        assert_eq!(engine.invoke("multiply", &json!({"a": 1.5, "b": 3})).unwrap(), json!({"result": 4.5}));
        assert_eq!(engine.invoke("divide", &json!({"a": 1, "b": 4})).unwrap(), json!({"result": 0.25}));
        assert_eq!(engine.invoke("sum", &json!({"values": [1, 2, 3.5]})).unwrap(), json!({"result": 6.5}));
        assert_eq!(engine.invoke("identity", &json!({"value": "x"})).unwrap(), json!({"result": "x"}));
    }

    #[test]
    fn test_errors_are_permanent() {
        let engine = MathEngine;
        let err = engine.invoke("divide", &json!({"a": 1, "b": 0})).unwrap_err();
        assert!(!err.is_transient());

        let err = engine.invoke("add", &json!({"a": "x", "b": 1})).unwrap_err();
        assert!(matches!(err, EngineError::Permanent(_)));

        assert!(matches!(
            engine.invoke("pow", &json!({})),
            Err(EngineError::UnknownFunction { .. })
        ));
    }
}
