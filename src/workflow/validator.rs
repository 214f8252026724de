//! Workflow Validation
//!
//! Provides validation for workflow definitions including:
//! - Step numbering (contiguous from 1, no duplicates)
//! - Output variable uniqueness
//! - Reference integrity (no dangling, forward or self references)
//! - Condition syntax
//! - Load-time configuration checks for thresholds and rules

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::error::{ConfigError, ValidationIssue};
use crate::expression::{parser, VariableRef};
use crate::risk::rules::RuleKind;

use super::model::{WorkflowDefinition, WorkflowStep};

/// Validates numbering of the step list.
fn validate_numbering(steps: &[WorkflowStep]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut numbers: Vec<u32> = steps.iter().map(|s| s.step_number).collect();
    numbers.sort_unstable();

    let mut seen = HashSet::new();
    for n in &numbers {
        if !seen.insert(*n) {
            issues.push(ValidationIssue::DuplicateStepNumber(*n));
        }
    }

    numbers.dedup();
    if let Some((index, found)) = numbers
        .iter()
        .enumerate()
        .find(|(i, n)| **n != *i as u32 + 1)
    {
        issues.push(ValidationIssue::NonContiguousNumbering {
            expected: index as u32 + 1,
            found: *found,
        });
    }

    issues
}

/// Validates output variables are present and unique.
fn validate_outputs(steps: &[WorkflowStep]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut producers: HashMap<&str, u32> = HashMap::new();

    for step in steps {
        if step.output.trim().is_empty() {
            issues.push(ValidationIssue::EmptyOutputVariable {
                step: step.step_number,
            });
            continue;
        }
        if let Some(other) = producers.insert(step.output.as_str(), step.step_number) {
            issues.push(ValidationIssue::DuplicateOutputVariable {
                step: step.step_number,
                other,
                variable: step.output.clone(),
            });
        }
    }

    issues
}

/// Validates every `$stepK` reference a step makes.
fn validate_references(step: &WorkflowStep, outputs: &HashMap<u32, &str>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for raw in step.references() {
        let Some(var) = VariableRef::parse(&raw) else {
            continue;
        };
        let Some(target) = var.step() else {
            continue;
        };

        let Some(expected) = outputs.get(&target) else {
            issues.push(ValidationIssue::DanglingReference {
                step: step.step_number,
                reference: target,
            });
            continue;
        };

        if target == step.step_number {
            issues.push(ValidationIssue::SelfReference {
                step: step.step_number,
            });
        } else if target > step.step_number {
            issues.push(ValidationIssue::ForwardReference {
                step: step.step_number,
                reference: target,
            });
        }

        if var.path.first().map(String::as_str) != Some(*expected) {
            issues.push(ValidationIssue::OutputMismatch {
                step: step.step_number,
                target,
                reference: raw.clone(),
                expected: format!("$step{}.{}", target, expected),
            });
        }
    }

    if let Some(condition) = step.active_condition() {
        if let Err(e) = parser::parse(condition) {
            issues.push(ValidationIssue::InvalidCondition {
                step: step.step_number,
                message: e.to_string(),
            });
        }
    }

    issues
}

/// Validates the step list of a workflow.
///
/// Performs the following checks:
/// 1. Workflow is not empty
/// 2. Step numbers are unique and contiguous from 1
/// 3. Output variables are present and unique
/// 4. Every step reference names an existing, strictly earlier step and
///    starts with that step's output variable
/// 5. Conditions parse
///
/// Cycles are detected separately by the graph builder.
pub fn validate_steps(steps: &[WorkflowStep]) -> Vec<ValidationIssue> {
    if steps.is_empty() {
        return vec![ValidationIssue::EmptyWorkflow];
    }

    let mut issues = validate_numbering(steps);
    issues.extend(validate_outputs(steps));

    let outputs: HashMap<u32, &str> = steps
        .iter()
        .map(|s| (s.step_number, s.output.as_str()))
        .collect();

    for step in steps {
        let step_issues = validate_references(step, &outputs);
        if step_issues.is_empty() {
            debug!("Step {} ('{}') references are valid", step.step_number, step.name);
        }
        issues.extend(step_issues);
    }

    issues
}

/// Load-time configuration checks: thresholds and rule definitions.
///
/// These are configuration errors rather than run-time conditions, so a
/// definition failing here never reaches execution.
pub fn validate_definition_config(definition: &WorkflowDefinition) -> Result<(), ConfigError> {
    definition.thresholds.validate()?;

    let mut ids = HashSet::new();
    for rule in &definition.rules {
        if rule.id.trim().is_empty() {
            return Err(ConfigError::InvalidRule {
                rule: rule.id.clone(),
                message: "rule id must not be empty".to_string(),
            });
        }
        if !ids.insert(rule.id.as_str()) {
            return Err(ConfigError::DuplicateRule(rule.id.clone()));
        }
        if !rule.risk_factor.is_finite() || rule.risk_factor < 0.0 {
            return Err(ConfigError::InvalidRule {
                rule: rule.id.clone(),
                message: format!("risk_factor must be a non-negative number, got {}", rule.risk_factor),
            });
        }
        if rule.kind == RuleKind::Escalation && rule.escalation_level.is_none() {
            return Err(ConfigError::InvalidRule {
                rule: rule.id.clone(),
                message: "escalation rules need an escalation_level".to_string(),
            });
        }
        if let Some(step) = rule.scope.step() {
            if definition.get_step(step).is_none() {
                return Err(ConfigError::InvalidRule {
                    rule: rule.id.clone(),
                    message: format!("scope names unknown step {}", step),
                });
            }
        }
        if !rule.condition.trim().is_empty() {
            parser::parse(&rule.condition).map_err(|e| ConfigError::InvalidRule {
                rule: rule.id.clone(),
                message: format!("condition does not parse: {}", e),
            })?;
        }
    }

    info!(
        "Definition '{}' v{}: {} rules, thresholds {}/{}/{}",
        definition.id,
        definition.version,
        definition.rules.len(),
        definition.thresholds.auto_approve,
        definition.thresholds.require_review,
        definition.thresholds.require_hitl
    );
    Ok(())
}
