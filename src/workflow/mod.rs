//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing,
//! validating and planning data-driven workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (WorkflowStep, WorkflowDefinition)
//! - [`parser`]: YAML loading and saving
//! - [`validator`]: Structural and load-time configuration checks
//! - [`graph`]: Dependency graph, execution levels and critical path
//! - [`store`]: Definition store seam and in-memory implementation

pub mod graph;
pub mod model;
pub mod parser;
pub mod store;
pub mod validator;

pub use graph::{DependencyGraph, GraphAnalysis, GraphBuilder};
pub use model::{OnError, RiskThresholds, WorkflowDefinition, WorkflowStep};
pub use parser::{load_definition, parse_definition, save_definition};
pub use store::{DefinitionStore, InMemoryDefinitionStore};
pub use validator::{validate_definition_config, validate_steps};
