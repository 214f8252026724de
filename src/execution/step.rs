//! Individual Step Execution
//!
//! Handles the execution of a single workflow step:
//! - Condition gating against the context so far
//! - Input resolution into a concrete argument object
//! - Invocation through the retry/timeout controller
//! - Applying the step's `on_error` policy to a final failure

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;

use crate::expression::Evaluator;
use crate::workflow::{OnError, WorkflowStep};

use super::context::ExecutionContext;
use super::registry::CalculationEngine;
use super::retry::{self, RetryPolicy};

/// Final state of a step within a run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    CompletedWithFallback,
    Skipped,
    Failed,
}

impl StepStatus {
    /// True when the step produced a value to commit.
    pub fn has_output(self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithFallback)
    }
}

/// Outcome of one step.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StepResult {
    pub step_number: u32,
    pub name: String,
    /// `tool.function`
    pub target: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Engine invocations made; 0 when the step never reached its engine
    pub attempts: u32,
    pub retries: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backoff_ms: Vec<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Set for failures under `on_error: fail`
    pub aborts_run: bool,
}

impl StepResult {
    fn new(step: &WorkflowStep, status: StepStatus, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        Self {
            step_number: step.step_number,
            name: step.name.clone(),
            target: step.target(),
            status,
            output: None,
            error: None,
            attempts: 0,
            retries: 0,
            backoff_ms: Vec::new(),
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            aborts_run: false,
        }
    }

    pub fn skipped(step: &WorkflowStep, reason: Option<String>) -> Self {
        let mut result = Self::new(step, StepStatus::Skipped, Utc::now());
        result.error = reason;
        result
    }

    /// A final failure, shaped by the step's `on_error` policy.
    pub fn failure(step: &WorkflowStep, message: String, started_at: DateTime<Utc>) -> Self {
        let message = format!("step {} ({}): {}", step.step_number, step.target(), message);

        match step.on_error {
            OnError::Fail => {
                error!("{}", message);
                let mut result = Self::new(step, StepStatus::Failed, started_at);
                result.error = Some(message);
                result.aborts_run = true;
                result
            }
            OnError::Continue => {
                warn!("{} (continuing)", message);
                let status = if step.fallback.is_some() {
                    StepStatus::CompletedWithFallback
                } else {
                    StepStatus::Failed
                };
                let mut result = Self::new(step, status, started_at);
                result.output = step.fallback.clone();
                result.error = Some(message);
                result
            }
            OnError::Skip => {
                warn!("{} (skipping)", message);
                let mut result = Self::new(step, StepStatus::Skipped, started_at);
                result.error = Some(message);
                result
            }
        }
    }
}

/// What to do with a step once its gate has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Preparation {
    /// Condition false or unevaluable; no invocation.
    Skip(StepResult),
    /// Run with this argument object.
    Run(Value),
}

/// Checks the step's condition and resolves its inputs.
///
/// A condition that fails to evaluate gates the step off, with the error
/// recorded on the skipped result.
pub fn prepare(step: &WorkflowStep, ctx: &ExecutionContext, evaluator: &Evaluator) -> Preparation {
    if let Some(condition) = step.active_condition() {
        match evaluator.evaluate_condition(condition, ctx) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Step {} skipped: condition '{}' is false", step.step_number, condition);
                return Preparation::Skip(StepResult::skipped(step, None));
            }
            Err(e) => {
                warn!("Step {} skipped: condition '{}' failed: {}", step.step_number, condition, e);
                return Preparation::Skip(StepResult::skipped(
                    step,
                    Some(format!("condition error: {}", e)),
                ));
            }
        }
    }

    Preparation::Run(ctx.resolve_inputs(&step.inputs))
}

/// Invokes the step's engine and folds the outcome into a [`StepResult`].
pub async fn execute_step(
    step: &WorkflowStep,
    engine: Arc<dyn CalculationEngine>,
    args: Value,
    policy: &RetryPolicy,
) -> StepResult {
    let started_at = Utc::now();
    debug!("Step {} ({}) args: {}", step.step_number, step.target(), args);

    let outcome = retry::invoke(engine, &step.function, &args, policy, step.fallback.as_ref()).await;

    let mut result = match outcome.result {
        Ok(value) => {
            let status = if outcome.used_fallback {
                StepStatus::CompletedWithFallback
            } else {
                StepStatus::Completed
            };
            let mut result = StepResult::new(step, status, started_at);
            result.output = Some(value);
            result
        }
        Err(e) => StepResult::failure(step, e.to_string(), started_at),
    };

    result.attempts = outcome.attempts;
    result.retries = outcome.retries;
    result.backoff_ms = outcome.backoff_ms;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::execution::builtin::MathEngine;
    use crate::workflow::WorkflowDefinition;
    use serde_json::json;
    use std::time::Duration;

    struct Broken;

    impl CalculationEngine for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn functions(&self) -> Vec<String> {
            vec!["run".into()]
        }

        fn invoke(&self, _function: &str, _args: &Value) -> Result<Value, EngineError> {
            Err(EngineError::Permanent("no".into()))
        }
    }

    fn ctx(steps: &[WorkflowStep]) -> ExecutionContext {
        let definition = WorkflowDefinition::from_steps("wf", steps.to_vec());
        ExecutionContext::new(&definition, json!({"x": 4, "name": "n"}))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_prepare_resolves_inputs() {
        let step = WorkflowStep::new(1, "math", "add")
            .with_input("a", json!("$input.x"))
            .with_input("b", json!(1));
        let prep = prepare(&step, &ctx(&[step.clone()]), &Evaluator::new());
        assert_eq!(prep, Preparation::Run(json!({"a": 4, "b": 1})));
    }

    #[test]
    fn test_prepare_false_condition_skips() {
        let step = WorkflowStep::new(1, "math", "add").with_condition("$input.x > 10");
        match prepare(&step, &ctx(&[step.clone()]), &Evaluator::new()) {
            Preparation::Skip(result) => {
                assert_eq!(result.status, StepStatus::Skipped);
                assert!(result.error.is_none());
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_condition_error_skips_with_error() {
        let step = WorkflowStep::new(1, "math", "add").with_condition("$input.name * 2 > 1");
        match prepare(&step, &ctx(&[step.clone()]), &Evaluator::new()) {
            Preparation::Skip(result) => {
                assert!(result.error.unwrap().contains("condition error"));
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_success() {
        let step = WorkflowStep::new(1, "math", "multiply");
        let result = execute_step(&step, Arc::new(MathEngine), json!({"a": 3, "b": 4}), &policy()).await;
        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.output, Some(json!({"result": 12})));
        assert_eq!(result.attempts, 1);
        assert!(!result.aborts_run);
    }

    #[tokio::test]
    async fn test_on_error_policies() {
        let fail = WorkflowStep::new(1, "broken", "run");
        let result = execute_step(&fail, Arc::new(Broken), json!({}), &policy()).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.aborts_run);
        assert!(result.error.unwrap().starts_with("step 1 (broken.run)"));

        let with_fallback = WorkflowStep::new(2, "broken", "run")
            .with_on_error(OnError::Continue)
            .with_fallback(json!({"result": 0}));
        let result = execute_step(&with_fallback, Arc::new(Broken), json!({}), &policy()).await;
        assert_eq!(result.status, StepStatus::CompletedWithFallback);
        assert_eq!(result.output, Some(json!({"result": 0})));
        assert!(!result.aborts_run);

        let bare_continue = WorkflowStep::new(3, "broken", "run").with_on_error(OnError::Continue);
        let result = execute_step(&bare_continue, Arc::new(Broken), json!({}), &policy()).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.output.is_none());
        assert!(!result.aborts_run);

        let skip = WorkflowStep::new(4, "broken", "run").with_on_error(OnError::Skip);
        let result = execute_step(&skip, Arc::new(Broken), json!({}), &policy()).await;
        assert_eq!(result.status, StepStatus::Skipped);
        assert!(result.error.is_some());
        assert!(!result.aborts_run);
    }
}
