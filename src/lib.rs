//! FlowGuard - Risk-Aware Workflow Execution Engine
//!
//! Executes declarative multi-step workflows of calculation-engine calls,
//! scheduling independent steps in parallel and checking configurable
//! risk rules between steps. Runs either continue autonomously or halt
//! with an approval request for a human reviewer.
//!
//! # Architecture
//!
//! The library is organized into six main modules:
//!
//! - [`workflow`]: Definitions, YAML parsing, validation and dependency graphs
//! - [`expression`]: Condition language used by steps and rules
//! - [`execution`]: Orchestrator, parallel executor and engine registry
//! - [`risk`]: Rule engine, multi-factor assessment and routing
//! - [`monitoring`]: Audit trail and execution timeline
//! - [`config`]: Engine tuning loaded from YAML
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use flowguard::execution::{EngineRegistry, MathEngine, Orchestrator};
//! use flowguard::workflow::InMemoryDefinitionStore;
//! use flowguard::{load_definition, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryDefinitionStore::new();
//!     store.insert(load_definition("credit.yaml")?)?;
//!
//!     let registry = EngineRegistry::new().with_engine(Arc::new(MathEngine))?;
//!     let orchestrator = Orchestrator::new(Arc::new(store), registry, EngineConfig::default());
//!
//!     let run = orchestrator
//!         .execute("credit", serde_json::json!({"amount": 100}), "analyst")
//!         .await?;
//!     println!("{:?}: {}", run.status, run.message);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod expression;
pub mod monitoring;
pub mod risk;
pub mod workflow;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{FlowError, Result};
pub use execution::{Orchestrator, RunStatus, WorkflowExecution};
pub use workflow::parser::load_definition;
pub use workflow::{WorkflowDefinition, WorkflowStep};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowGuard";
