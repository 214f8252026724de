//! Risk Assessment
//!
//! Multi-factor assessment of a run, exposed to rule conditions as
//! `$assessment.*` and blended into the final risk score.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::step::{StepResult, StepStatus};

/// Per-dimension scores in `[0, 1]` and their weighted total.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct RiskAssessment {
    pub technical: f64,
    pub safety: f64,
    pub financial: f64,
    pub compliance: f64,
    pub execution: f64,
    pub anomaly: f64,
    pub weighted_total: f64,
}

impl RiskAssessment {
    /// JSON form used for `$assessment.*` lookups.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Produces a [`RiskAssessment`] for a run.
pub trait RiskAssessor: Send + Sync {
    fn assess(&self, input: &Value, steps: &[StepResult], final_output: Option<&Value>) -> RiskAssessment;
}

/// Default assessor.
///
/// - `technical`, `safety`, `financial`, `compliance`: read from
///   `input.risk_profile.<name>`, 0 when absent
/// - `execution`: share of executed steps that failed or fell back
/// - `anomaly`: share of produced outputs that are `null` or carry a
///   `null` result; the final output joins them only if no step
///   already produced it
///
/// Weights: 0.25, 0.25, 0.15, 0.15, 0.10, 0.10.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedRiskAssessor;

const WEIGHTS: [f64; 6] = [0.25, 0.25, 0.15, 0.15, 0.10, 0.10];

fn profile_score(input: &Value, name: &str) -> f64 {
    input
        .get("risk_profile")
        .and_then(|p| p.get(name))
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .map_or(0.0, |n| n.clamp(0.0, 1.0))
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn is_anomalous(output: &Value) -> bool {
    output.is_null() || output.get("result").is_some_and(Value::is_null)
}

impl RiskAssessor for WeightedRiskAssessor {
    fn assess(&self, input: &Value, steps: &[StepResult], final_output: Option<&Value>) -> RiskAssessment {
        let executed = steps
            .iter()
            .filter(|s| s.status != StepStatus::Skipped || s.error.is_some())
            .count();
        let troubled = steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed || s.status == StepStatus::CompletedWithFallback)
            .count();

        let mut outputs: Vec<&Value> = steps.iter().filter_map(|s| s.output.as_ref()).collect();
        if let Some(output) = final_output.filter(|o| !outputs.contains(o)) {
            outputs.push(output);
        }
        let anomalous = outputs.iter().filter(|o| is_anomalous(o)).count();

        let scores = [
            profile_score(input, "technical"),
            profile_score(input, "safety"),
            profile_score(input, "financial"),
            profile_score(input, "compliance"),
            ratio(troubled, executed),
            ratio(anomalous, outputs.len()),
        ];
        let weighted_total = scores
            .iter()
            .zip(WEIGHTS)
            .map(|(score, weight)| score * weight)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        RiskAssessment {
            technical: scores[0],
            safety: scores[1],
            financial: scores[2],
            compliance: scores[3],
            execution: scores[4],
            anomaly: scores[5],
            weighted_total,
        }
    }
}
