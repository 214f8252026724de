//! Definition Store
//!
//! [`DefinitionStore`] is the seam to wherever definitions live. The
//! in-memory implementation validates every definition on insert, so
//! anything it hands out has already passed the load-time checks.

use std::collections::HashMap;
use std::sync::RwLock;

use log::info;

use crate::error::StoreError;

use super::graph::GraphBuilder;
use super::model::WorkflowDefinition;
use super::validator::validate_definition_config;

/// Read access to workflow definitions.
pub trait DefinitionStore: Send + Sync {
    /// Returns the current version of definition `id`.
    fn get_definition(&self, id: &str) -> Result<WorkflowDefinition, StoreError>;
}

/// Definitions kept in process memory, keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores `definition`, replacing any earlier version.
    pub fn insert(&self, definition: WorkflowDefinition) -> Result<(), StoreError> {
        validate_definition_config(&definition)?;
        GraphBuilder::new().build(&definition.steps)?;

        info!("Stored definition '{}' v{}", definition.id, definition.version);
        let mut definitions = match self.definitions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .definitions
            .read()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

impl DefinitionStore for InMemoryDefinitionStore {
    fn get_definition(&self, id: &str) -> Result<WorkflowDefinition, StoreError> {
        let definitions = match self.definitions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        definitions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}
