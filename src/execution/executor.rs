//! Parallel Step Executor
//!
//! Runs every step of one graph level concurrently, bounded by a
//! semaphore of `max_parallel` permits. Conditions and inputs are resolved
//! against the context as it stood when the level began; outputs are
//! committed only after every member of the level has finished.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::expression::Evaluator;
use crate::workflow::WorkflowDefinition;

use super::context::ExecutionContext;
use super::registry::EngineRegistry;
use super::retry::RetryPolicy;
use super::step::{execute_step, prepare, Preparation, StepResult};

/// Runs levels of a workflow.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    registry: Arc<EngineRegistry>,
    evaluator: Arc<Evaluator>,
    config: Arc<EngineConfig>,
    permits: Arc<Semaphore>,
}

impl ParallelExecutor {
    pub fn new(registry: Arc<EngineRegistry>, evaluator: Arc<Evaluator>, config: Arc<EngineConfig>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self {
            registry,
            evaluator,
            config,
            permits,
        }
    }

    /// Runs the steps of `level` and commits their outputs to `ctx`.
    ///
    /// Results are returned ordered by step number.
    pub async fn run_level(
        &self,
        definition: &WorkflowDefinition,
        level: &[u32],
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<StepResult>, FlowError> {
        let mut results = Vec::with_capacity(level.len());
        let mut tasks = JoinSet::new();

        for number in level {
            let Some(step) = definition.get_step(*number) else {
                return Err(FlowError::Context(format!("step {} is not in the definition", number)));
            };

            let args = match prepare(step, ctx, &self.evaluator) {
                Preparation::Skip(result) => {
                    results.push(result);
                    continue;
                }
                Preparation::Run(args) => args,
            };

            let engine = match self.registry.resolve(&step.tool, &step.function) {
                Ok(engine) => engine,
                Err(e) => {
                    results.push(StepResult::failure(step, e.to_string(), chrono::Utc::now()));
                    continue;
                }
            };

            let step = step.clone();
            let policy = RetryPolicy::for_step(&self.config, step.retry_count, step.timeout_seconds);
            let permits = Arc::clone(&self.permits);

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| FlowError::Worker(e.to_string()))?;
                debug!("Step {} ({}) started", step.step_number, step.target());
                Ok::<_, FlowError>(execute_step(&step, engine, args, &policy).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| FlowError::Worker(e.to_string()))??;
            results.push(result);
        }

        results.sort_by_key(|r| r.step_number);

        for result in &results {
            if let (true, Some(output)) = (result.status.has_output(), &result.output) {
                ctx.commit(result.step_number, output.clone())?;
            }
        }

        info!(
            "Level {:?} finished: {}",
            level,
            results
                .iter()
                .map(|r| format!("{}={:?}", r.step_number, r.status))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::execution::builtin::MathEngine;
    use crate::execution::registry::CalculationEngine;
    use crate::execution::step::StepStatus;
    use crate::workflow::WorkflowStep;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps and records the highest number of concurrent calls seen.
    #[derive(Default)]
    struct Gauge {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CalculationEngine for Gauge {
        fn name(&self) -> &str {
            "gauge"
        }

        fn functions(&self) -> Vec<String> {
            vec!["wait".into()]
        }

        fn invoke(&self, _function: &str, args: &Value) -> Result<Value, EngineError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(40));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"result": args.get("n").cloned().unwrap_or(Value::Null)}))
        }
    }

    fn executor(registry: EngineRegistry, max_parallel: usize) -> ParallelExecutor {
        let config = EngineConfig {
            max_parallel,
            ..EngineConfig::default()
        };
        ParallelExecutor::new(Arc::new(registry), Arc::new(Evaluator::new()), Arc::new(config))
    }

    #[tokio::test]
    async fn test_level_commits_in_step_order() {
        let definition = WorkflowDefinition::from_steps(
            "wf",
            vec![
                WorkflowStep::new(1, "math", "add")
                    .with_output("a")
                    .with_input("a", json!(1))
                    .with_input("b", json!(2)),
                WorkflowStep::new(2, "math", "multiply")
                    .with_output("b")
                    .with_input("a", json!("$input.x"))
                    .with_input("b", json!(10)),
                WorkflowStep::new(3, "math", "add")
                    .with_output("c")
                    .with_condition("$input.x > 100"),
            ],
        );
        let registry = EngineRegistry::new().with_engine(Arc::new(MathEngine)).unwrap();
        let mut ctx = ExecutionContext::new(&definition, json!({"x": 5}));

        let results = executor(registry, 4)
            .run_level(&definition, &[1, 2, 3], &mut ctx)
            .await
            .unwrap();

        let numbers: Vec<u32> = results.iter().map(|r| r.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(results[2].status, StepStatus::Skipped);
        assert_eq!(ctx.step_output(1), Some(&json!({"result": 3})));
        assert_eq!(ctx.step_output(2), Some(&json!({"result": 50})));
        assert_eq!(ctx.step_output(3), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_semaphore_bounds_concurrency() {
        let steps: Vec<WorkflowStep> = (1..=4)
            .map(|n| {
                WorkflowStep::new(n, "gauge", "wait")
                    .with_output(format!("o{}", n))
                    .with_input("n", json!(n))
            })
            .collect();
        let definition = WorkflowDefinition::from_steps("wf", steps);
        let gauge = Arc::new(Gauge::default());
        let registry = EngineRegistry::new().with_engine(gauge.clone()).unwrap();
        let mut ctx = ExecutionContext::new(&definition, json!({}));

        let results = executor(registry, 2)
            .run_level(&definition, &[1, 2, 3, 4], &mut ctx)
            .await
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.status == StepStatus::Completed));
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unregistered_engine_fails_step() {
        let definition = WorkflowDefinition::from_steps("wf", vec![WorkflowStep::new(1, "stats", "mean")]);
        let mut ctx = ExecutionContext::new(&definition, json!({}));

        let results = executor(EngineRegistry::new(), 1)
            .run_level(&definition, &[1], &mut ctx)
            .await
            .unwrap();
        assert_eq!(results[0].status, StepStatus::Failed);
        assert!(results[0].aborts_run);
    }
}
