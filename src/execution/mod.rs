//! Workflow Execution Module
//!
//! Runs definitions level by level against registered calculation
//! engines, with risk checkpoints between steps.
//!
//! # Architecture
//!
//! - [`orchestrator`]: Drives a run from lookup to terminal status
//! - [`executor`]: Runs one dependency level with bounded parallelism
//! - [`step`]: Condition gating, input resolution and `on_error` policy
//! - [`retry`]: Retry, backoff, timeout and fallback around one invocation
//! - [`context`]: Per-run accumulated state and variable resolution
//! - [`registry`]: Calculation engine lookup
//! - [`builtin`]: Engines shipped with the crate

pub mod builtin;
pub mod context;
pub mod executor;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod step;

pub use builtin::MathEngine;
pub use context::ExecutionContext;
pub use executor::ParallelExecutor;
pub use orchestrator::{ApprovalRequest, Orchestrator, RunStatus, WorkflowExecution};
pub use registry::{CalculationEngine, EngineRegistry};
pub use retry::{InvocationOutcome, RetryPolicy};
pub use step::{StepResult, StepStatus};
