//! Workflow Data Model
//!
//! Core data structures describing a workflow definition: its steps, the
//! error policy of each step, and the risk thresholds and rules attached
//! to the workflow.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: credit-check
//! version: "3"
//! thresholds:
//!   auto_approve: 0.2
//!   require_review: 0.5
//!   require_hitl: 0.8
//! steps:
//!   - step_number: 1
//!     name: Exposure
//!     tool: math
//!     function: multiply
//!     inputs:
//!       a: $input.amount
//!       b: 1.25
//!     output: exposure
//!
//!   - step_number: 2
//!     name: Headroom
//!     tool: math
//!     function: subtract
//!     inputs:
//!       a: $input.limit
//!       b: $step1.exposure.result
//!     output: headroom
//!     condition: $step1.exposure.result > 0
//!     retry_count: 2
//!     on_error: continue
//!     fallback: {result: 0}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::expression::{scan_references, split_template, Segment};
use crate::risk::rules::RiskRule;

/// What to do when a step fails for good.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Abort the run once the current level finishes
    #[default]
    Fail,
    /// Record the failure, write the fallback if any, keep going
    Continue,
    /// Record the step as skipped and keep going
    Skip,
}

/// A single step in a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    /// Position in the workflow; numbers form the contiguous range 1..=N
    pub step_number: u32,

    /// Human-readable label
    #[serde(default)]
    pub name: String,

    /// Registered calculation engine
    pub tool: String,

    /// Function on that engine
    pub function: String,

    /// Parameter name -> `$reference` string or JSON literal
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// Variable the result is stored under in the `steps` namespace
    pub output: String,

    /// Expression gating execution; a blank or absent condition always runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Retries allowed for transient failures
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub on_error: OnError,

    /// Substituted when the step cannot produce a result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,

    /// Per-attempt timeout; falls back to the engine default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl WorkflowStep {
    /// Creates a step invoking `tool.function`.
    ///
    /// # Example
    ///
    /// ```
    /// use flowguard::workflow::WorkflowStep;
    /// use serde_json::json;
    ///
    /// let step = WorkflowStep::new(2, "math", "add")
    ///     .named("Total")
    ///     .with_input("a", json!("$step1.base.result"))
    ///     .with_input("b", json!(10))
    ///     .with_output("total")
    ///     .with_retries(3);
    /// assert_eq!(step.references(), vec!["$step1.base.result"]);
    /// ```
    pub fn new(step_number: u32, tool: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            step_number,
            name: format!("Step {}", step_number),
            tool: tool.into().trim().to_string(),
            function: function.into().trim().to_string(),
            inputs: Map::new(),
            output: format!("step{}_output", step_number),
            condition: None,
            retry_count: 0,
            on_error: OnError::Fail,
            fallback: None,
            timeout_seconds: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds one input parameter.
    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into().trim().to_string();
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// `tool.function`, for logs and error messages.
    pub fn target(&self) -> String {
        format!("{}.{}", self.tool, self.function)
    }

    /// Returns the condition if it is present and not blank.
    pub fn active_condition(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Every `$...` token in the inputs and condition, without duplicates.
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        for value in self.inputs.values() {
            collect_value_references(value, &mut refs);
        }
        if let Some(condition) = self.active_condition() {
            for token in scan_references(condition) {
                if !refs.contains(&token) {
                    refs.push(token);
                }
            }
        }
        refs
    }
}

/// Walks a literal/reference tree collecting references held in strings.
fn collect_value_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            for segment in split_template(s) {
                if let Segment::Reference(token) = segment {
                    if !out.iter().any(|r| r == token) {
                        out.push(token.to_string());
                    }
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_value_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_value_references(v, out)),
        _ => {}
    }
}

/// Ordered risk thresholds: `auto_approve < require_review < require_hitl`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    #[serde(default = "default_auto_approve")]
    pub auto_approve: f64,
    #[serde(default = "default_require_review")]
    pub require_review: f64,
    #[serde(default = "default_require_hitl")]
    pub require_hitl: f64,
}

fn default_auto_approve() -> f64 {
    0.3
}

fn default_require_review() -> f64 {
    0.5
}

fn default_require_hitl() -> f64 {
    0.8
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            auto_approve: default_auto_approve(),
            require_review: default_require_review(),
            require_hitl: default_require_hitl(),
        }
    }
}

impl RiskThresholds {
    pub fn new(auto_approve: f64, require_review: f64, require_hitl: f64) -> Self {
        Self {
            auto_approve,
            require_review,
            require_hitl,
        }
    }

    /// Rejects thresholds that would make routing contradictory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.auto_approve, self.require_review, self.require_hitl];
        if all.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigError::RoutingInconsistency(format!(
                "thresholds must be finite and non-negative, got {:?}",
                all
            )));
        }
        if !(self.auto_approve < self.require_review && self.require_review < self.require_hitl) {
            return Err(ConfigError::RoutingInconsistency(format!(
                "expected auto_approve < require_review < require_hitl, got {} / {} / {}",
                self.auto_approve, self.require_review, self.require_hitl
            )));
        }
        Ok(())
    }
}

fn default_version() -> String {
    "1".to_string()
}

/// A complete workflow definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub thresholds: RiskThresholds,

    /// Steps, conventionally listed in step-number order
    pub steps: Vec<WorkflowStep>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RiskRule>,
}

impl WorkflowDefinition {
    /// Creates an empty definition.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: default_version(),
            description: None,
            thresholds: RiskThresholds::default(),
            steps: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Creates a definition from a list of steps.
    pub fn from_steps(id: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        let mut definition = Self::new(id);
        definition.steps = steps;
        definition
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_rule(mut self, rule: RiskRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Adds a step, rejecting duplicate step numbers.
    pub fn add_step(&mut self, step: WorkflowStep) -> Result<(), String> {
        if self.get_step(step.step_number).is_some() {
            return Err(format!("Step {} already exists", step.step_number));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Gets a step by number.
    pub fn get_step(&self, step_number: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// Distinct `tool.function` targets, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.steps.iter().map(|s| s.target()).collect();
        targets.sort();
        targets.dedup();
        targets
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_creation() {
        let step = WorkflowStep::new(1, " math ", "add")
            .named("Sum")
            .with_input("a", json!(1))
            .with_output(" sum ")
            .with_retries(2)
            .with_timeout(5);

        assert_eq!(step.tool, "math");
        assert_eq!(step.output, "sum");
        assert_eq!(step.retry_count, 2);
        assert_eq!(step.timeout_seconds, Some(5));
        assert_eq!(step.target(), "math.add");
        assert_eq!(step.on_error, OnError::Fail);
    }

    #[test]
    fn test_step_references_inputs_and_condition() {
        let step = WorkflowStep::new(3, "math", "add")
            .with_input("a", json!("$step1.x.result"))
            .with_input("nested", json!({"list": ["$step2.y", 4], "lit": "plain"}))
            .with_condition("$step1.x.result > 0 AND $input.flag");

        let refs = step.references();
        assert_eq!(refs, vec!["$step1.x.result", "$step2.y", "$input.flag"]);
    }

    #[test]
    fn test_embedded_input_references() {
        let step = WorkflowStep::new(3, "math", "identity")
            .with_input("value", json!("'$step1.x.result' of $100 for $input.name"));
        assert_eq!(step.references(), vec!["$step1.x.result", "$input.name"]);
    }

    #[test]
    fn test_blank_condition_inactive() {
        let step = WorkflowStep::new(1, "math", "add").with_condition("   ");
        assert!(step.active_condition().is_none());
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(RiskThresholds::default().validate().is_ok());
        assert!(RiskThresholds::new(0.5, 0.5, 0.8).validate().is_err());
        assert!(RiskThresholds::new(0.9, 0.5, 0.8).validate().is_err());
        assert!(RiskThresholds::new(-0.1, 0.5, 0.8).validate().is_err());
        assert!(RiskThresholds::new(0.1, 0.5, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_definition_add_step_duplicate() {
        let mut definition = WorkflowDefinition::new("wf");
        assert!(definition.add_step(WorkflowStep::new(1, "math", "add")).is_ok());
        assert!(definition.add_step(WorkflowStep::new(1, "math", "sum")).is_err());
        assert_eq!(definition.len(), 1);
    }

    #[test]
    fn test_definition_targets_dedup() {
        let definition = WorkflowDefinition::from_steps(
            "wf",
            vec![
                WorkflowStep::new(1, "math", "add"),
                WorkflowStep::new(2, "math", "add"),
                WorkflowStep::new(3, "math", "multiply"),
            ],
        );
        assert_eq!(definition.targets(), vec!["math.add", "math.multiply"]);
    }

    #[test]
    fn test_on_error_deserialize() {
        let step: WorkflowStep = serde_json::from_value(json!({
            "step_number": 1,
            "tool": "math",
            "function": "add",
            "output": "sum",
            "on_error": "continue"
        }))
        .unwrap();
        assert_eq!(step.on_error, OnError::Continue);
        assert!(step.inputs.is_empty());
        assert_eq!(step.name, "");
    }
}
