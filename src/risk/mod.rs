//! Risk Module
//!
//! Rule evaluation, multi-factor assessment and routing of runs toward
//! autonomous continuation or human review.
//!
//! # Structure
//!
//! - [`rules`]: Rule definitions and the rule engine
//! - [`assessment`]: Multi-factor risk assessment
//! - [`routing`]: Intervention decisions, approval priority and seniority

pub mod assessment;
pub mod routing;
pub mod rules;

pub use assessment::{RiskAssessment, RiskAssessor, WeightedRiskAssessor};
pub use routing::{InterventionType, Priority, RoutingEngine, RoutingResult};
pub use rules::{
    EvaluationPhase, RiskRule, RiskRuleEngine, RoutingDecision, RuleEvaluationResult, RuleKind, RuleScope,
};
