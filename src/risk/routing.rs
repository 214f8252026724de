//! Routing Engine
//!
//! Turns a rule evaluation plus the cumulative run risk into an
//! intervention decision.
//!
//! # Interventions (increasing severity)
//!
//! `None -> Warning -> SoftStop -> HardStop -> Escalation`
//!
//! | Condition                                          | Intervention |
//! |----------------------------------------------------|--------------|
//! | decision `block`                                   | HardStop     |
//! | any escalation level                               | Escalation   |
//! | risk >= `require_hitl`                             | HardStop     |
//! | decision `pause` / `escalate`                      | SoftStop     |
//! | decision `warn`, or risk >= `require_review`       | Warning      |
//! | otherwise                                          | None         |
//!
//! # Approval priority
//!
//! | Risk    | Priority | Expires after |
//! |---------|----------|---------------|
//! | >= 0.9  | urgent   | 4 h           |
//! | >= 0.7  | high     | 24 h          |
//! | else    | normal   | 72 h          |

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::workflow::RiskThresholds;

use super::rules::{RoutingDecision, RuleEvaluationResult};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    None,
    Warning,
    SoftStop,
    HardStop,
    Escalation,
}

impl InterventionType {
    /// True for interventions that halt the run.
    pub fn is_stop(self) -> bool {
        matches!(self, Self::SoftStop | Self::HardStop | Self::Escalation)
    }
}

impl fmt::Display for InterventionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Warning => "WARNING",
            Self::SoftStop => "SOFT_STOP",
            Self::HardStop => "HARD_STOP",
            Self::Escalation => "ESCALATION",
        };
        write!(f, "{}", s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn from_risk(risk: f64) -> Self {
        if risk >= 0.9 {
            Self::Urgent
        } else if risk >= 0.7 {
            Self::High
        } else {
            Self::Normal
        }
    }

    /// How long an approval request at this priority stays open.
    pub fn expiry(self) -> Duration {
        match self {
            Self::Urgent => Duration::hours(4),
            Self::High => Duration::hours(24),
            Self::Normal => Duration::hours(72),
        }
    }
}

/// Minimum approver tier for `risk`, raised to `escalation_level`.
pub fn min_approver_seniority(risk: f64, escalation_level: Option<u8>) -> u8 {
    let base = if risk >= 0.9 {
        4
    } else if risk >= 0.7 {
        3
    } else if risk >= 0.5 {
        2
    } else if risk >= 0.3 {
        1
    } else {
        0
    };
    base.max(escalation_level.unwrap_or(0))
}

/// True when a decision point must produce an approval request.
pub fn should_create_approval_request(intervention: InterventionType, result: &RuleEvaluationResult) -> bool {
    intervention == InterventionType::HardStop
        || intervention == InterventionType::Escalation
        || result.escalation_level.is_some()
        || result.routing_decision.is_stop()
}

/// Intervention decision for one decision point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoutingResult {
    pub can_continue: bool,
    pub intervention_type: InterventionType,
    pub routing_decision: RoutingDecision,
    pub requires_approval: bool,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub triggered_rule_ids: Vec<String>,
    pub min_approver_seniority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<u8>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingEngine;

impl RoutingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Routes `result` given the cumulative risk after this decision point.
    pub fn route(&self, result: &RuleEvaluationResult, cumulative_risk: f64, thresholds: &RiskThresholds) -> RoutingResult {
        self.route_at(result, cumulative_risk, thresholds, Utc::now())
    }

    /// [`route`](Self::route) with an explicit clock, for expiry computation.
    pub fn route_at(
        &self,
        result: &RuleEvaluationResult,
        cumulative_risk: f64,
        thresholds: &RiskThresholds,
        now: DateTime<Utc>,
    ) -> RoutingResult {
        let decision = result.routing_decision;
        let over_hitl = cumulative_risk >= thresholds.require_hitl;
        let stop_decision = matches!(decision, RoutingDecision::Pause | RoutingDecision::Escalate);

        let intervention = match decision {
            RoutingDecision::Block => InterventionType::HardStop,
            _ if result.escalation_level.is_some() => InterventionType::Escalation,
            _ if over_hitl => InterventionType::HardStop,
            _ if stop_decision => InterventionType::SoftStop,
            RoutingDecision::Warn => InterventionType::Warning,
            _ if cumulative_risk >= thresholds.require_review => InterventionType::Warning,
            _ => InterventionType::None,
        };

        let priority = if decision == RoutingDecision::Block {
            Priority::Urgent
        } else {
            Priority::from_risk(cumulative_risk)
        };

        let requires_approval = should_create_approval_request(intervention, result);
        let expires_at = requires_approval.then(|| now + priority.expiry());

        let message = if result.triggered.is_empty() {
            match intervention {
                InterventionType::None => String::new(),
                other => format!(
                    "{} at {}: cumulative risk {:.2} (review {}, hitl {})",
                    other, result.phase, cumulative_risk, thresholds.require_review, thresholds.require_hitl
                ),
            }
        } else {
            result.summary()
        };

        debug!(
            "Routing at {}: decision {}, risk {:.3} -> {}",
            result.phase, decision, cumulative_risk, intervention
        );

        RoutingResult {
            can_continue: !intervention.is_stop(),
            intervention_type: intervention,
            routing_decision: decision,
            requires_approval,
            priority,
            expires_at,
            triggered_rule_ids: result.triggered_ids(),
            min_approver_seniority: min_approver_seniority(cumulative_risk, result.escalation_level),
            escalation_level: result.escalation_level,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::rules::{EvaluationPhase, RuleKind, TriggeredRule};

    fn result(decision: RoutingDecision) -> RuleEvaluationResult {
        let mut result = RuleEvaluationResult::empty(EvaluationPhase::Step(1));
        if decision != RoutingDecision::Continue {
            result.triggered.push(TriggeredRule {
                id: "r1".into(),
                kind: RuleKind::Step,
                action: decision,
                risk_factor: 0.1,
                message: "r1 fired".into(),
            });
        }
        result.routing_decision = decision;
        result
    }

    fn thresholds() -> RiskThresholds {
        RiskThresholds::new(0.3, 0.5, 0.8)
    }

    #[test]
    fn test_block_is_hard_stop_regardless_of_risk() {
        let routing = RoutingEngine::new().route(&result(RoutingDecision::Block), 0.0, &thresholds());
        assert!(!routing.can_continue);
        assert_eq!(routing.intervention_type, InterventionType::HardStop);
        assert_eq!(routing.priority, Priority::Urgent);
        assert!(routing.requires_approval);
        assert_eq!(routing.triggered_rule_ids, vec!["r1"]);
    }

    #[test]
    fn test_pause_soft_then_hard_at_hitl() {
        let engine = RoutingEngine::new();
        let soft = engine.route(&result(RoutingDecision::Pause), 0.6, &thresholds());
        assert_eq!(soft.intervention_type, InterventionType::SoftStop);

        let hard = engine.route(&result(RoutingDecision::Pause), 0.8, &thresholds());
        assert_eq!(hard.intervention_type, InterventionType::HardStop);
        assert!(!hard.can_continue);
    }

    #[test]
    fn test_cumulative_risk_at_hitl_is_hard_stop() {
        let routing = RoutingEngine::new().route(&result(RoutingDecision::Continue), 0.8, &thresholds());
        assert_eq!(routing.intervention_type, InterventionType::HardStop);
        assert!(routing.requires_approval);
        assert!(!routing.message.is_empty());
    }

    #[test]
    fn test_escalation_level_upgrades_stop() {
        let mut escalated = result(RoutingDecision::Escalate);
        escalated.escalation_level = Some(3);
        let routing = RoutingEngine::new().route(&escalated, 0.4, &thresholds());

        assert_eq!(routing.intervention_type, InterventionType::Escalation);
        assert_eq!(routing.min_approver_seniority, 3);
        assert_eq!(routing.escalation_level, Some(3));
    }

    #[test]
    fn test_escalation_level_stops_non_stop_decisions() {
        let engine = RoutingEngine::new();
        for decision in [RoutingDecision::Warn, RoutingDecision::Continue] {
            let mut escalated = result(decision);
            escalated.escalation_level = Some(2);
            let routing = engine.route(&escalated, 0.1, &thresholds());

            assert_eq!(routing.intervention_type, InterventionType::Escalation);
            assert!(routing.requires_approval);
            assert!(!routing.can_continue);
            assert!(routing.expires_at.is_some());
        }
    }

    #[test]
    fn test_warning_paths() {
        let engine = RoutingEngine::new();
        let warned = engine.route(&result(RoutingDecision::Warn), 0.0, &thresholds());
        assert_eq!(warned.intervention_type, InterventionType::Warning);
        assert!(warned.can_continue);
        assert!(!warned.requires_approval);
        assert!(warned.expires_at.is_none());

        let review = engine.route(&result(RoutingDecision::Continue), 0.5, &thresholds());
        assert_eq!(review.intervention_type, InterventionType::Warning);

        let quiet = engine.route(&result(RoutingDecision::Continue), 0.49, &thresholds());
        assert_eq!(quiet.intervention_type, InterventionType::None);
        assert!(quiet.message.is_empty());
    }

    #[test]
    fn test_priority_and_expiry() {
        let now = Utc::now();
        let engine = RoutingEngine::new();

        let routing = engine.route_at(&result(RoutingDecision::Pause), 0.75, &thresholds(), now);
        assert_eq!(routing.priority, Priority::High);
        assert_eq!(routing.expires_at, Some(now + Duration::hours(24)));

        let routing = engine.route_at(&result(RoutingDecision::Pause), 0.1, &thresholds(), now);
        assert_eq!(routing.priority, Priority::Normal);
        assert_eq!(routing.expires_at, Some(now + Duration::hours(72)));
    }

    #[test]
    fn test_seniority_tiers() {
        assert_eq!(min_approver_seniority(0.29, None), 0);
        assert_eq!(min_approver_seniority(0.3, None), 1);
        assert_eq!(min_approver_seniority(0.5, None), 2);
        assert_eq!(min_approver_seniority(0.7, None), 3);
        assert_eq!(min_approver_seniority(0.95, None), 4);
        assert_eq!(min_approver_seniority(0.1, Some(2)), 2);
    }

    #[test]
    fn test_intervention_ordering() {
        assert!(InterventionType::None < InterventionType::Warning);
        assert!(InterventionType::HardStop < InterventionType::Escalation);
        assert_eq!(InterventionType::SoftStop.to_string(), "SOFT_STOP");
    }
}
