//! Risk Rules
//!
//! Declarative rules attached to a workflow definition and the engine that
//! evaluates them at each decision point.
//!
//! # Rule kinds and phases
//!
//! | Phase            | Rules considered                                              |
//! |------------------|---------------------------------------------------------------|
//! | global           | `global`                                                      |
//! | step *n*         | `step` scoped to *n* or `*`, `exception`/`escalation` scoped to *n* |
//! | final            | `exception`/`escalation` scoped to `*`                        |
//!
//! # Example YAML Format
//!
//! ```yaml
//! rules:
//!   - id: large-amount
//!     kind: global
//!     condition: $input.amount > 100000
//!     risk_factor: 0.4
//!     action: warn
//!     message: "{rule_id}: amount {$input.amount} above limit"
//!
//!   - id: negative-headroom
//!     kind: step
//!     scope: 2
//!     condition: $step2.headroom.result < 0
//!     risk_factor: 0.5
//!     action: pause
//! ```

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::expression::evaluator::display;
use crate::expression::{Evaluator, Resolve, VariableRef};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Global,
    Step,
    Exception,
    Escalation,
}

/// Which step a rule applies to: a single step or every step (`*`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "RawScope", into = "RawScope")]
pub enum RuleScope {
    #[default]
    Any,
    Step(u32),
}

impl RuleScope {
    pub fn step(self) -> Option<u32> {
        match self {
            Self::Any => None,
            Self::Step(n) => Some(n),
        }
    }

    fn matches(self, step_number: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Step(n) => n == step_number,
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Step(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawScope {
    Number(u32),
    Text(String),
}

impl TryFrom<RawScope> for RuleScope {
    type Error = String;

    fn try_from(raw: RawScope) -> Result<Self, Self::Error> {
        match raw {
            RawScope::Number(n) => Ok(Self::Step(n)),
            RawScope::Text(text) => {
                let text = text.trim();
                if text == "*" {
                    return Ok(Self::Any);
                }
                text.parse()
                    .map(Self::Step)
                    .map_err(|_| format!("rule scope must be a step number or '*', got '{}'", text))
            }
        }
    }
}

impl From<RuleScope> for RawScope {
    fn from(scope: RuleScope) -> Self {
        match scope {
            RuleScope::Any => Self::Text("*".to_string()),
            RuleScope::Step(n) => Self::Number(n),
        }
    }
}

/// Action requested by a triggered rule.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    #[default]
    Continue,
    Warn,
    Pause,
    Block,
    Escalate,
}

impl RoutingDecision {
    /// Ranking used to pick the most severe action:
    /// `Block > Escalate > Pause > Warn > Continue`.
    pub fn severity(self) -> u8 {
        match self {
            Self::Continue => 0,
            Self::Warn => 1,
            Self::Pause => 2,
            Self::Escalate => 3,
            Self::Block => 4,
        }
    }

    pub fn most_severe(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// True for actions that stop the run pending approval.
    pub fn is_stop(self) -> bool {
        matches!(self, Self::Pause | Self::Block | Self::Escalate)
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Continue => "CONTINUE",
            Self::Warn => "WARN",
            Self::Pause => "PAUSE",
            Self::Block => "BLOCK",
            Self::Escalate => "ESCALATE",
        };
        write!(f, "{}", s)
    }
}

fn default_enabled() -> bool {
    true
}

/// A declarative risk rule.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RiskRule {
    pub id: String,

    pub kind: RuleKind,

    #[serde(default)]
    pub scope: RuleScope,

    /// Expression; blank always triggers
    #[serde(default)]
    pub condition: String,

    /// Contribution to the aggregate risk when triggered
    #[serde(default)]
    pub risk_factor: f64,

    #[serde(default)]
    pub action: RoutingDecision,

    /// Template with `{rule_id}`, `{step}` and `{$source.path}` placeholders
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<u8>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RiskRule {
    fn base(id: impl Into<String>, kind: RuleKind, scope: RuleScope, condition: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            scope,
            condition: condition.into(),
            risk_factor: 0.0,
            action: RoutingDecision::Continue,
            message: String::new(),
            escalation_level: None,
            enabled: true,
        }
    }

    pub fn global(
        id: impl Into<String>,
        condition: impl Into<String>,
        risk_factor: f64,
        action: RoutingDecision,
    ) -> Self {
        Self {
            risk_factor,
            action,
            ..Self::base(id, RuleKind::Global, RuleScope::Any, condition)
        }
    }

    pub fn step(
        id: impl Into<String>,
        step_number: u32,
        condition: impl Into<String>,
        risk_factor: f64,
        action: RoutingDecision,
    ) -> Self {
        Self {
            risk_factor,
            action,
            ..Self::base(id, RuleKind::Step, RuleScope::Step(step_number), condition)
        }
    }

    /// Exception rule; `None` scope means the final phase.
    pub fn exception(
        id: impl Into<String>,
        step_number: Option<u32>,
        condition: impl Into<String>,
        action: RoutingDecision,
    ) -> Self {
        let scope = step_number.map_or(RuleScope::Any, RuleScope::Step);
        Self {
            action,
            ..Self::base(id, RuleKind::Exception, scope, condition)
        }
    }

    /// Escalation rule; `None` scope means the final phase.
    pub fn escalation(
        id: impl Into<String>,
        step_number: Option<u32>,
        condition: impl Into<String>,
        risk_factor: f64,
        level: u8,
    ) -> Self {
        let scope = step_number.map_or(RuleScope::Any, RuleScope::Step);
        Self {
            risk_factor,
            action: RoutingDecision::Escalate,
            escalation_level: Some(level),
            ..Self::base(id, RuleKind::Escalation, scope, condition)
        }
    }

    pub fn with_scope(mut self, scope: RuleScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this rule takes part in `phase`.
    pub fn applies_to(&self, phase: EvaluationPhase) -> bool {
        if !self.enabled {
            return false;
        }
        match (phase, self.kind) {
            (EvaluationPhase::Global, RuleKind::Global) => true,
            (EvaluationPhase::Step(n), RuleKind::Step) => self.scope.matches(n),
            (EvaluationPhase::Step(n), RuleKind::Exception | RuleKind::Escalation) => {
                self.scope == RuleScope::Step(n)
            }
            (EvaluationPhase::Final, RuleKind::Exception | RuleKind::Escalation) => {
                self.scope == RuleScope::Any
            }
            _ => false,
        }
    }
}

/// Decision point a rule evaluation belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationPhase {
    Global,
    Step(u32),
    Final,
}

impl fmt::Display for EvaluationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Step(n) => write!(f, "step_{}", n),
            Self::Final => write!(f, "final"),
        }
    }
}

/// A rule that fired during an evaluation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TriggeredRule {
    pub id: String,
    pub kind: RuleKind,
    pub action: RoutingDecision,
    pub risk_factor: f64,
    pub message: String,
}

/// A rule whose condition could not be evaluated; it counts as not triggered.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuleError {
    pub rule_id: String,
    pub message: String,
}

/// Outcome of evaluating the rules of one phase.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RuleEvaluationResult {
    pub phase: EvaluationPhase,
    pub triggered: Vec<TriggeredRule>,
    pub aggregate_risk_factor: f64,
    pub routing_decision: RoutingDecision,
    pub escalation_level: Option<u8>,
    pub applied_exception: Option<String>,
    pub errors: Vec<RuleError>,
}

impl RuleEvaluationResult {
    pub fn empty(phase: EvaluationPhase) -> Self {
        Self {
            phase,
            triggered: Vec::new(),
            aggregate_risk_factor: 0.0,
            routing_decision: RoutingDecision::Continue,
            escalation_level: None,
            applied_exception: None,
            errors: Vec::new(),
        }
    }

    pub fn triggered_ids(&self) -> Vec<String> {
        self.triggered.iter().map(|r| r.id.clone()).collect()
    }

    /// Rendered messages of all triggered rules joined into one line.
    pub fn summary(&self) -> String {
        self.triggered
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Evaluates rule sets against a resolution scope.
#[derive(Debug, Clone, Default)]
pub struct RiskRuleEngine {
    evaluator: Arc<Evaluator>,
}

impl RiskRuleEngine {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator }
    }

    /// Pre-execution check over `global` rules.
    pub fn evaluate_global(&self, rules: &[RiskRule], scope: &dyn Resolve) -> RuleEvaluationResult {
        self.evaluate(EvaluationPhase::Global, rules, scope)
    }

    /// Post-step check for step `step_number`.
    pub fn evaluate_step(&self, rules: &[RiskRule], step_number: u32, scope: &dyn Resolve) -> RuleEvaluationResult {
        self.evaluate(EvaluationPhase::Step(step_number), rules, scope)
    }

    /// Final comprehensive check after all levels.
    pub fn evaluate_workflow(&self, rules: &[RiskRule], scope: &dyn Resolve) -> RuleEvaluationResult {
        self.evaluate(EvaluationPhase::Final, rules, scope)
    }

    fn evaluate(&self, phase: EvaluationPhase, rules: &[RiskRule], scope: &dyn Resolve) -> RuleEvaluationResult {
        let mut result = RuleEvaluationResult::empty(phase);
        let mut ranked = RoutingDecision::Continue;

        for rule in rules.iter().filter(|r| r.applies_to(phase)) {
            let fired = match self.evaluator.evaluate_condition(&rule.condition, scope) {
                Ok(fired) => fired,
                Err(e) => {
                    warn!("Rule '{}' ({}) could not be evaluated: {}", rule.id, phase, e);
                    result.errors.push(RuleError {
                        rule_id: rule.id.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            if !fired {
                continue;
            }

            debug!("Rule '{}' triggered at {} ({})", rule.id, phase, rule.action);
            result.aggregate_risk_factor += rule.risk_factor;

            if rule.kind == RuleKind::Exception && result.applied_exception.is_none() {
                result.applied_exception = Some(rule.id.clone());
            }
            if rule.kind == RuleKind::Escalation {
                result.escalation_level = result.escalation_level.max(rule.escalation_level);
            }
            ranked = ranked.most_severe(rule.action);

            result.triggered.push(TriggeredRule {
                id: rule.id.clone(),
                kind: rule.kind,
                action: rule.action,
                risk_factor: rule.risk_factor,
                message: render_message(rule, phase, scope),
            });
        }

        result.routing_decision = match &result.applied_exception {
            Some(id) => result
                .triggered
                .iter()
                .find(|r| &r.id == id)
                .map_or(ranked, |r| r.action),
            None => ranked,
        };
        result
    }
}

/// Renders `{rule_id}`, `{step}` and `{$source.path}` placeholders.
/// Unknown placeholders are left untouched.
pub fn render_message(rule: &RiskRule, phase: EvaluationPhase, scope: &dyn Resolve) -> String {
    if rule.message.trim().is_empty() {
        return format!("Rule {} triggered ({})", rule.id, rule.action);
    }

    let mut out = String::with_capacity(rule.message.len());
    let mut rest = rule.message.as_str();

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let key = after[..close].trim();
        match key {
            "rule_id" => out.push_str(&rule.id),
            "step" => match phase {
                EvaluationPhase::Step(n) => out.push_str(&n.to_string()),
                other => out.push_str(&other.to_string()),
            },
            _ => match VariableRef::parse(key) {
                Some(var) => {
                    match scope.resolve(&var) {
                        Some(value) if !value.is_null() => out.push_str(&display(&value)),
                        _ => out.push_str("null"),
                    }
                }
                None => out.push_str(&rest[open..open + close + 2]),
            },
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::VarSource;
    use serde_json::{json, Value};

    struct Scope(Value);

    impl Resolve for Scope {
        fn resolve(&self, var: &VariableRef) -> Option<Value> {
            let root = match var.source {
                VarSource::Input => self.0.get("input")?,
                VarSource::Assessment => self.0.get("assessment")?,
                VarSource::Step(n) => self.0.get(format!("step{}", n))?,
                VarSource::Context => self.0.get("context")?,
            };
            crate::expression::lookup(root, &var.path).cloned()
        }
    }

    fn engine() -> RiskRuleEngine {
        RiskRuleEngine::new(Arc::new(Evaluator::new()))
    }

    #[test]
    fn test_phase_filters() {
        let rules = vec![
            RiskRule::global("g", "true", 0.1, RoutingDecision::Warn),
            RiskRule::step("s2", 2, "true", 0.1, RoutingDecision::Warn),
            RiskRule::step("s-any", 1, "true", 0.1, RoutingDecision::Warn).with_scope(RuleScope::Any),
            RiskRule::exception("e2", Some(2), "true", RoutingDecision::Continue),
            RiskRule::exception("e-any", None, "true", RoutingDecision::Continue),
            RiskRule::escalation("x-any", None, "true", 0.1, 2),
        ];

        assert!(rules[0].applies_to(EvaluationPhase::Global));
        assert!(!rules[1].applies_to(EvaluationPhase::Global));

        let step2: Vec<&str> = rules
            .iter()
            .filter(|r| r.applies_to(EvaluationPhase::Step(2)))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(step2, vec!["s2", "s-any", "e2"]);

        let step3: Vec<&str> = rules
            .iter()
            .filter(|r| r.applies_to(EvaluationPhase::Step(3)))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(step3, vec!["s-any"]);

        let last: Vec<&str> = rules
            .iter()
            .filter(|r| r.applies_to(EvaluationPhase::Final))
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(last, vec!["e-any", "x-any"]);
    }

    #[test]
    fn test_disabled_rule_ignored() {
        let rule = RiskRule::global("g", "true", 0.1, RoutingDecision::Block).disabled();
        let result = engine().evaluate_global(&[rule], &Scope(json!({})));
        assert!(result.triggered.is_empty());
        assert_eq!(result.routing_decision, RoutingDecision::Continue);
    }

    #[test]
    fn test_aggregate_and_ranking() {
        let rules = vec![
            RiskRule::global("warn", "$input.amount > 10", 0.2, RoutingDecision::Warn),
            RiskRule::global("pause", "$input.amount > 100", 0.3, RoutingDecision::Pause),
            RiskRule::global("block", "$input.amount > 1000", 0.9, RoutingDecision::Block),
        ];
        let result = engine().evaluate_global(&rules, &Scope(json!({"input": {"amount": 500}})));

        assert_eq!(result.triggered_ids(), vec!["warn", "pause"]);
        assert!((result.aggregate_risk_factor - 0.5).abs() < 1e-9);
        assert_eq!(result.routing_decision, RoutingDecision::Pause);
    }

    #[test]
    fn test_block_outranks_escalate() {
        assert_eq!(
            RoutingDecision::Escalate.most_severe(RoutingDecision::Block),
            RoutingDecision::Block
        );
        assert_eq!(
            RoutingDecision::Escalate.most_severe(RoutingDecision::Pause),
            RoutingDecision::Escalate
        );
    }

    #[test]
    fn test_exception_short_circuits_ranking() {
        let rules = vec![
            RiskRule::step("big", 1, "true", 0.6, RoutingDecision::Block),
            RiskRule::exception("vip", Some(1), "$context.tier == 'vip'", RoutingDecision::Warn),
            RiskRule::exception("later", Some(1), "true", RoutingDecision::Continue),
        ];
        let result = engine().evaluate_step(&rules, 1, &Scope(json!({"context": {"tier": "vip"}})));

        assert_eq!(result.applied_exception.as_deref(), Some("vip"));
        assert_eq!(result.routing_decision, RoutingDecision::Warn);
        assert!((result.aggregate_risk_factor - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_escalation_level_is_max() {
        let rules = vec![
            RiskRule::escalation("low", None, "true", 0.1, 1),
            RiskRule::escalation("high", None, "$assessment.weighted_total > 0.5", 0.1, 3),
        ];
        let result = engine().evaluate_workflow(&rules, &Scope(json!({"assessment": {"weighted_total": 0.7}})));
        assert_eq!(result.escalation_level, Some(3));
        assert_eq!(result.routing_decision, RoutingDecision::Escalate);
    }

    #[test]
    fn test_condition_error_is_not_triggered() {
        let rules = vec![RiskRule::global("bad", "$input.name * 2 > 1", 0.5, RoutingDecision::Block)];
        let result = engine().evaluate_global(&rules, &Scope(json!({"input": {"name": "x"}})));
        assert!(result.triggered.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].rule_id, "bad");
    }

    #[test]
    fn test_message_rendering() {
        let rule = RiskRule::step("limit", 2, "true", 0.1, RoutingDecision::Warn)
            .with_message("{rule_id} at step {step}: value {$step2.out.result} ({missing}) {$input.none}");
        let scope = Scope(json!({"step2": {"out": {"result": 42}}}));
        assert_eq!(
            render_message(&rule, EvaluationPhase::Step(2), &scope),
            "limit at step 2: value 42 ({missing}) null"
        );
    }

    #[test]
    fn test_scope_serde() {
        let rule: RiskRule = serde_yaml::from_str(
            "id: r\nkind: step\nscope: '*'\ncondition: 'true'\naction: pause\n",
        )
        .unwrap();
        assert_eq!(rule.scope, RuleScope::Any);
        assert!(rule.enabled);

        let rule: RiskRule = serde_yaml::from_str("id: r\nkind: step\nscope: 3\n").unwrap();
        assert_eq!(rule.scope, RuleScope::Step(3));

        assert!(serde_yaml::from_str::<RiskRule>("id: r\nkind: step\nscope: abc\n").is_err());
    }
}
