//! Engine Registry
//!
//! Calculation engines are the opaque routines a step invokes. Each engine
//! is registered once under its name and advertises the functions it
//! serves; a step's `tool.function` target resolves through this table.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::info;
use serde_json::Value;

use crate::error::{ConfigError, EngineError, ValidationError, ValidationIssue};
use crate::workflow::WorkflowDefinition;

/// A calculation engine.
///
/// `invoke` is synchronous and may block; the executor runs it on the
/// blocking pool under the step's timeout.
pub trait CalculationEngine: Send + Sync {
    /// Name steps use in their `tool` field.
    fn name(&self) -> &str;

    /// Functions this engine can run.
    fn functions(&self) -> Vec<String>;

    /// Runs `function` with the resolved argument object.
    fn invoke(&self, function: &str, args: &Value) -> Result<Value, EngineError>;
}

/// Validated registration table of calculation engines.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn CalculationEngine>>,
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `engine`, rejecting empty names, duplicate names and
    /// engines that serve no functions.
    pub fn register(&mut self, engine: Arc<dyn CalculationEngine>) -> Result<(), ConfigError> {
        let name = engine.name().trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Invalid("engine name must not be empty".to_string()));
        }
        if self.engines.contains_key(&name) {
            return Err(ConfigError::DuplicateEngine(name));
        }
        let functions = engine.functions();
        if functions.is_empty() {
            return Err(ConfigError::Invalid(format!("engine '{}' serves no functions", name)));
        }

        info!("Registered engine '{}' ({})", name, functions.join(", "));
        self.engines.insert(name, engine);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_engine(mut self, engine: Arc<dyn CalculationEngine>) -> Result<Self, ConfigError> {
        self.register(engine)?;
        Ok(self)
    }

    /// Looks up the engine serving `tool.function`.
    pub fn resolve(&self, tool: &str, function: &str) -> Result<Arc<dyn CalculationEngine>, EngineError> {
        let unknown = || EngineError::UnknownFunction {
            tool: tool.to_string(),
            function: function.to_string(),
        };
        let engine = self.engines.get(tool).ok_or_else(unknown)?;
        if !engine.functions().iter().any(|f| f == function) {
            return Err(unknown());
        }
        Ok(Arc::clone(engine))
    }

    pub fn supports(&self, tool: &str, function: &str) -> bool {
        self.resolve(tool, function).is_ok()
    }

    pub fn names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    /// Checks every step target of `definition` is registered.
    pub fn verify(&self, definition: &WorkflowDefinition) -> Result<(), ValidationError> {
        let issues: Vec<ValidationIssue> = definition
            .steps
            .iter()
            .filter(|s| !self.supports(&s.tool, &s.function))
            .map(|s| ValidationIssue::UnknownTarget {
                step: s.step_number,
                tool: s.tool.clone(),
                function: s.function.clone(),
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}
