//! Retry and Timeout Control
//!
//! Wraps a single engine invocation:
//!
//! - Each attempt runs on the blocking pool, bounded by the step timeout.
//!   A timed-out attempt is abandoned, not killed.
//! - Transient failures (timeouts, [`EngineError::Transient`]) are retried
//!   up to `max_retries` times with exponential backoff
//!   `base_delay * multiplier^attempt`, capped at `max_delay`.
//! - Permanent failures are never retried.
//! - When transient retries run out and a fallback is configured, the
//!   fallback becomes the result.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::EngineError;

use super::registry::CalculationEngine;

/// Retry, backoff and timeout settings for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy for a step: backoff settings from `config`, retries and
    /// timeout from the step (falling back to the configured default).
    pub fn for_step(config: &EngineConfig, retry_count: u32, timeout_seconds: Option<u64>) -> Self {
        Self {
            max_retries: retry_count,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            timeout: Duration::from_secs(timeout_seconds.unwrap_or(config.default_timeout_seconds)),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// What happened across all attempts of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub result: Result<Value, EngineError>,
    pub attempts: u32,
    pub retries: u32,
    /// Delay slept before each retry, in order
    pub backoff_ms: Vec<u64>,
    pub used_fallback: bool,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs one attempt on the blocking pool under `timeout`.
async fn attempt(
    engine: &Arc<dyn CalculationEngine>,
    function: &str,
    args: &Value,
    timeout: Duration,
) -> Result<Value, EngineError> {
    let engine = Arc::clone(engine);
    let function = function.to_string();
    let args = args.clone();
    let handle = tokio::task::spawn_blocking(move || engine.invoke(&function, &args));

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(EngineError::Permanent(format!("engine task failed: {}", join_error))),
        Err(_) => Err(EngineError::Timeout(timeout.as_millis() as u64)),
    }
}

/// Invokes `function` on `engine` under `policy`.
pub async fn invoke(
    engine: Arc<dyn CalculationEngine>,
    function: &str,
    args: &Value,
    policy: &RetryPolicy,
    fallback: Option<&Value>,
) -> InvocationOutcome {
    let mut backoff_ms = Vec::new();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let error = match attempt(&engine, function, args, policy.timeout).await {
            Ok(value) => {
                return InvocationOutcome {
                    result: Ok(value),
                    attempts,
                    retries: attempts - 1,
                    backoff_ms,
                    used_fallback: false,
                }
            }
            Err(e) => e,
        };

        let retries = attempts - 1;
        if !error.is_transient() {
            debug!("{}.{} failed permanently: {}", engine.name(), function, error);
            return InvocationOutcome {
                result: Err(error),
                attempts,
                retries,
                backoff_ms,
                used_fallback: false,
            };
        }

        if retries >= policy.max_retries {
            warn!(
                "{}.{} still failing after {} retries: {}",
                engine.name(),
                function,
                retries,
                error
            );
            let (result, used_fallback) = match fallback {
                Some(value) => (Ok(value.clone()), true),
                None => (Err(error), false),
            };
            return InvocationOutcome {
                result,
                attempts,
                retries,
                backoff_ms,
                used_fallback,
            };
        }

        let delay = policy.backoff(retries);
        warn!(
            "{}.{} attempt {} failed ({}), retrying in {} ms",
            engine.name(),
            function,
            attempts,
            error,
            delay.as_millis()
        );
        backoff_ms.push(delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
    }
}
