//! Execution Context
//!
//! Per-run variable store with three namespaces:
//!
//! - `input`: the run input, immutable
//! - `steps`: output variable -> step result, each written exactly once
//! - `context`: ambient metadata (`user_id`, `run_id`, `project_id`)
//!
//! `$stepN.<output>.path` references resolve through the step-number ->
//! output-variable table built from the definition. `$assessment.*` is
//! only visible through [`AssessmentScope`] during rule evaluation.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::FlowError;
use crate::expression::evaluator::display;
use crate::expression::{lookup, split_template, Resolve, Segment, VarSource, VariableRef};
use crate::workflow::WorkflowDefinition;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    input: Value,
    steps: Map<String, Value>,
    context: Map<String, Value>,
    outputs: HashMap<u32, String>,
}

impl ExecutionContext {
    /// Creates the context for one run of `definition`.
    pub fn new(definition: &WorkflowDefinition, input: Value) -> Self {
        Self {
            input,
            steps: Map::new(),
            context: Map::new(),
            outputs: definition
                .steps
                .iter()
                .map(|s| (s.step_number, s.output.clone()))
                .collect(),
        }
    }

    /// Sets an ambient metadata value such as `user_id`.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn steps(&self) -> &Map<String, Value> {
        &self.steps
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Result of step `step_number`, if it has been committed.
    pub fn step_output(&self, step_number: u32) -> Option<&Value> {
        self.outputs
            .get(&step_number)
            .and_then(|var| self.steps.get(var))
    }

    /// Writes the result of `step_number` into `steps`.
    ///
    /// Each output variable is write-once; a second commit is an error.
    pub fn commit(&mut self, step_number: u32, value: Value) -> Result<(), FlowError> {
        let Some(var) = self.outputs.get(&step_number) else {
            return Err(FlowError::Context(format!("step {} is not part of this workflow", step_number)));
        };
        if self.steps.contains_key(var) {
            return Err(FlowError::Context(format!(
                "output '{}' of step {} was already written",
                var, step_number
            )));
        }
        self.steps.insert(var.clone(), value);
        Ok(())
    }

    /// Replaces every reference in `value` with what it resolves to.
    ///
    /// A string that is exactly one reference takes the referenced value
    /// as-is, `null` when unresolvable. References embedded in longer text
    /// are interpolated as their display form, empty when unresolvable.
    /// Arrays and objects are walked recursively.
    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                if let Some(var) = VariableRef::parse(s.trim()) {
                    return self.resolve(&var).unwrap_or(Value::Null);
                }
                let segments = split_template(s);
                if !segments.iter().any(|seg| matches!(seg, Segment::Reference(_))) {
                    return value.clone();
                }
                Value::String(
                    segments
                        .into_iter()
                        .map(|seg| match seg {
                            Segment::Text(text) => text.to_string(),
                            Segment::Reference(raw) => VariableRef::parse(raw)
                                .and_then(|var| self.resolve(&var))
                                .map(|v| display(&v))
                                .unwrap_or_default(),
                        })
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Resolves a step's input mapping into a concrete argument object.
    pub fn resolve_inputs(&self, inputs: &Map<String, Value>) -> Value {
        Value::Object(
            inputs
                .iter()
                .map(|(name, v)| (name.clone(), self.resolve_value(v)))
                .collect(),
        )
    }

    /// Extends this context with `$assessment.*` for rule evaluation.
    pub fn with_assessment<'a>(&'a self, assessment: Option<&'a Value>) -> AssessmentScope<'a> {
        AssessmentScope {
            base: self,
            assessment,
        }
    }

    /// All three namespaces as one JSON document.
    pub fn snapshot(&self) -> Value {
        json!({
            "input": self.input,
            "steps": self.steps,
            "context": self.context,
        })
    }
}

impl Resolve for ExecutionContext {
    fn resolve(&self, var: &VariableRef) -> Option<Value> {
        match var.source {
            VarSource::Input => lookup(&self.input, &var.path).cloned(),
            VarSource::Context => {
                let (first, rest) = var.path.split_first()?;
                lookup(self.context.get(first)?, rest).cloned()
            }
            VarSource::Step(n) => {
                let (first, rest) = var.path.split_first()?;
                if self.outputs.get(&n) != Some(first) {
                    return None;
                }
                lookup(self.steps.get(first)?, rest).cloned()
            }
            VarSource::Assessment => None,
        }
    }
}

/// An [`ExecutionContext`] plus the current risk assessment.
pub struct AssessmentScope<'a> {
    base: &'a ExecutionContext,
    assessment: Option<&'a Value>,
}

impl Resolve for AssessmentScope<'_> {
    fn resolve(&self, var: &VariableRef) -> Option<Value> {
        match var.source {
            VarSource::Assessment => lookup(self.assessment?, &var.path).cloned(),
            _ => self.base.resolve(var),
        }
    }
}
