//! Workflow Parser
//!
//! Handles loading and saving workflow definitions as YAML. Load-time
//! configuration checks (threshold ordering, rule ids, rule conditions)
//! run here so a malformed definition never reaches execution.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::ConfigError;

use super::model::WorkflowDefinition;
use super::validator::validate_definition_config;

/// Parses a definition from YAML text and runs the configuration checks.
pub fn parse_definition(yaml: &str) -> Result<WorkflowDefinition, ConfigError> {
    let mut definition: WorkflowDefinition = serde_yaml::from_str(yaml)?;
    definition.steps.sort_by_key(|s| s.step_number);

    info!(
        "Parsed definition '{}' v{}: {} steps, {} rules",
        definition.id,
        definition.version,
        definition.steps.len(),
        definition.rules.len()
    );

    validate_definition_config(&definition)?;
    Ok(definition)
}

/// Loads a workflow definition from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use flowguard::workflow::load_definition;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let definition = load_definition("credit-check.yaml")?;
///     println!("Loaded {} steps", definition.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_definition(path: impl AsRef<Path>) -> Result<WorkflowDefinition, ConfigError> {
    let path = path.as_ref();
    info!("Loading workflow definition from: {}", path.display());

    let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!("YAML content loaded ({} bytes)", yaml.len());

    parse_definition(&yaml)
}

/// Writes a definition back out as YAML.
pub fn save_definition(definition: &WorkflowDefinition, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(definition)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!("Saved definition '{}' to {}", definition.id, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::rules::{RoutingDecision, RuleKind, RuleScope};
    use crate::workflow::model::OnError;
    use serde_json::json;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
id: credit-check
version: "3"
name: Credit check
thresholds:
  auto_approve: 0.2
  require_review: 0.5
  require_hitl: 0.8
steps:
  - step_number: 2
    name: Headroom
    tool: math
    function: subtract
    inputs:
      a: $input.limit
      b: $step1.exposure.result
    output: headroom
    condition: $step1.exposure.result > 0
    retry_count: 2
    on_error: continue
    fallback: {result: 0}
  - step_number: 1
    name: Exposure
    tool: math
    function: multiply
    inputs:
      a: $input.amount
      b: 1.25
    output: exposure
rules:
  - id: large-amount
    kind: global
    condition: $input.amount > 100000
    risk_factor: 0.4
    action: warn
  - id: negative-headroom
    kind: step
    scope: 2
    condition: $step2.headroom.result < 0
    risk_factor: 0.5
    action: pause
    message: "{rule_id}: headroom {$step2.headroom.result}"
"#;

    #[test]
    fn test_parse_definition() {
        let definition = parse_definition(YAML).unwrap();

        assert_eq!(definition.id, "credit-check");
        assert_eq!(definition.version, "3");
        assert_eq!(definition.thresholds.auto_approve, 0.2);
        assert_eq!(definition.steps[0].step_number, 1);

        let headroom = definition.get_step(2).unwrap();
        assert_eq!(headroom.on_error, OnError::Continue);
        assert_eq!(headroom.fallback, Some(json!({"result": 0})));
        assert_eq!(headroom.inputs["b"], json!("$step1.exposure.result"));

        assert_eq!(definition.rules.len(), 2);
        assert_eq!(definition.rules[1].kind, RuleKind::Step);
        assert_eq!(definition.rules[1].scope, RuleScope::Step(2));
        assert_eq!(definition.rules[1].action, RoutingDecision::Pause);
    }

    #[test]
    fn test_defaults_applied() {
        let definition = parse_definition(
            "id: wf\nsteps:\n  - step_number: 1\n    tool: math\n    function: add\n    output: sum\n",
        )
        .unwrap();
        assert_eq!(definition.version, "1");
        assert_eq!(definition.thresholds.require_hitl, 0.8);
        assert!(definition.rules.is_empty());
    }

    #[test]
    fn test_bad_thresholds_rejected_at_load() {
        let yaml = "id: wf\nthresholds: {auto_approve: 0.6, require_review: 0.5, require_hitl: 0.8}\nsteps: []\n";
        assert!(matches!(
            parse_definition(yaml),
            Err(ConfigError::RoutingInconsistency(_))
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(parse_definition("id: [unclosed"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_load_and_save_roundtrip_file() {
        let definition = parse_definition(YAML).unwrap();
        let file = NamedTempFile::new().unwrap();

        save_definition(&definition, file.path()).unwrap();
        let loaded = load_definition(file.path()).unwrap();
        assert_eq!(loaded, definition);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_definition("/nonexistent/flowguard.yaml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
