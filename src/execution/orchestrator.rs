//! Workflow Orchestrator
//!
//! Drives a run from definition lookup to terminal status:
//!
//! 1. Fetch the definition, build (or reuse) its dependency graph and
//!    check every step target is registered
//! 2. Pre-execution check over global rules
//! 3. Level by level: run the level, commit it, then evaluate step rules
//!    for each step in step order, stopping at the first decision that
//!    halts the run
//! 4. Final evaluation blending rule-derived risk with the standalone
//!    assessment: `max(cumulative + final contribution, weighted_total)`
//!
//! Every decision point writes an audit entry before the run proceeds.
//! The orchestrator is the only component with audit side effects.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::expression::Evaluator;
use crate::monitoring::{AuditEntry, AuditSink, ExecutionTimeline, MemoryAuditSink};
use crate::risk::{
    InterventionType, Priority, RiskAssessment, RiskAssessor, RiskRuleEngine, RoutingEngine, RoutingResult,
    RuleEvaluationResult, WeightedRiskAssessor,
};
use crate::workflow::{DefinitionStore, GraphAnalysis, GraphBuilder, WorkflowDefinition};

use super::context::ExecutionContext;
use super::executor::ParallelExecutor;
use super::registry::EngineRegistry;
use super::step::StepResult;

/// Status of a run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    AwaitingApproval,
    Failed,
}

/// Request for a human decision on a halted run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub run_id: String,
    pub decision_point: String,
    pub intervention_type: InterventionType,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub min_approver_seniority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<u8>,
    pub cumulative_risk: f64,
    pub message: String,
    pub triggered_rule_ids: Vec<String>,
}

/// Record of one run.
#[derive(Serialize, Debug, Clone)]
pub struct WorkflowExecution {
    pub run_id: String,
    pub workflow_id: String,
    pub workflow_version: String,
    pub user_id: String,
    pub status: RunStatus,
    /// Results in execution order
    pub step_results: Vec<StepResult>,
    /// Non-decreasing across decision points; the final risk once completed
    pub cumulative_risk: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_request: Option<ApprovalRequest>,
    pub audit_entries: Vec<AuditEntry>,
    pub message: String,
    pub auto_approved: bool,
    /// Committed step outputs keyed by output variable
    pub outputs: Value,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub timeline: ExecutionTimeline,
}

impl WorkflowExecution {
    fn new(run_id: String, definition: &WorkflowDefinition, user_id: &str) -> Self {
        let started_at = Utc::now();
        Self {
            run_id,
            workflow_id: definition.id.clone(),
            workflow_version: definition.version.clone(),
            user_id: user_id.to_string(),
            status: RunStatus::Running,
            step_results: Vec::new(),
            cumulative_risk: 0.0,
            assessment: None,
            routing: None,
            approval_request: None,
            audit_entries: Vec::new(),
            message: String::new(),
            auto_approved: false,
            outputs: Value::Null,
            started_at,
            finished_at: None,
            timeline: ExecutionTimeline::starting_at(started_at),
        }
    }

    /// Result of step `step_number`, if it ran in this execution.
    pub fn step_result(&self, step_number: u32) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_number == step_number)
    }

    fn finish(mut self, status: RunStatus, message: String, ctx: &ExecutionContext) -> Self {
        self.status = status;
        self.message = message;
        self.outputs = Value::Object(ctx.steps().clone());
        self.finished_at = Some(Utc::now());
        self
    }
}

/// Runs workflows end to end.
pub struct Orchestrator {
    store: Arc<dyn DefinitionStore>,
    registry: Arc<EngineRegistry>,
    graphs: GraphBuilder,
    evaluator: Arc<Evaluator>,
    rules: RiskRuleEngine,
    routing: RoutingEngine,
    assessor: Arc<dyn RiskAssessor>,
    audit: Arc<dyn AuditSink>,
    executor: ParallelExecutor,
}

impl Orchestrator {
    /// Creates an orchestrator with the weighted assessor and an
    /// in-memory audit sink.
    pub fn new(store: Arc<dyn DefinitionStore>, registry: EngineRegistry, config: EngineConfig) -> Self {
        let registry = Arc::new(registry);
        let evaluator = Arc::new(Evaluator::new());
        let executor = ParallelExecutor::new(Arc::clone(&registry), Arc::clone(&evaluator), Arc::new(config));

        Self {
            store,
            registry,
            graphs: GraphBuilder::new(),
            rules: RiskRuleEngine::new(Arc::clone(&evaluator)),
            evaluator,
            routing: RoutingEngine::new(),
            assessor: Arc::new(WeightedRiskAssessor),
            audit: Arc::new(MemoryAuditSink::new()),
            executor,
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_assessor(mut self, assessor: Arc<dyn RiskAssessor>) -> Self {
        self.assessor = assessor;
        self
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Reports on a definition without running it.
    pub fn analyze(&self, definition: &WorkflowDefinition) -> GraphAnalysis {
        self.graphs.analyze(definition)
    }

    /// Runs definition `definition_id` against `input` on behalf of `user_id`.
    ///
    /// Validation, store and audit failures are errors; everything that
    /// happens inside the run is reported through the returned execution.
    pub async fn execute(&self, definition_id: &str, input: Value, user_id: &str) -> Result<WorkflowExecution, FlowError> {
        self.execute_with_cancel(definition_id, input, user_id, &AtomicBool::new(false))
            .await
    }

    /// [`execute`](Self::execute) with a cancellation flag owned by the
    /// caller. Setting it stops this run at its next level boundary;
    /// dispatched steps finish or time out first.
    pub async fn execute_with_cancel(
        &self,
        definition_id: &str,
        input: Value,
        user_id: &str,
        cancel: &AtomicBool,
    ) -> Result<WorkflowExecution, FlowError> {
        let definition = self.store.get_definition(definition_id)?;
        let graph = self.graphs.build_for(&definition)?;
        self.registry.verify(&definition)?;

        let run_id = Uuid::new_v4().to_string();
        let project_id = input.get("project_id").cloned().unwrap_or(Value::Null);
        let mut ctx = ExecutionContext::new(&definition, input)
            .with_meta("user_id", user_id)
            .with_meta("run_id", run_id.clone())
            .with_meta("project_id", project_id);
        let mut execution = WorkflowExecution::new(run_id, &definition, user_id);

        info!(
            "Run {} of '{}' v{}: {} steps in {} levels",
            execution.run_id,
            definition.id,
            definition.version,
            definition.len(),
            graph.execution_order().len()
        );

        // Pre-execution check
        let assessment = self.assessor.assess(ctx.input(), &[], None);
        let started = Instant::now();
        let result = {
            let value = assessment.to_value();
            self.rules
                .evaluate_global(&definition.rules, &ctx.with_assessment(Some(&value)))
        };
        let routing = self.decision_point(&mut execution, &definition, &result, None, started)?;
        if !routing.can_continue {
            return Ok(self.halt(execution, routing, &ctx));
        }

        for level in graph.execution_order() {
            if cancel.load(Ordering::SeqCst) {
                warn!("Run {} cancelled before level {:?}", execution.run_id, level);
                return Ok(execution.finish(RunStatus::Failed, "Run cancelled".to_string(), &ctx));
            }

            let results = self.executor.run_level(&definition, level, &mut ctx).await?;
            for result in &results {
                execution.timeline.record(result);
            }
            execution.step_results.extend(results.iter().cloned());

            if let Some(failed) = results.iter().find(|r| r.aborts_run) {
                let message = failed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("step {} failed", failed.step_number));
                error!("Run {} failed: {}", execution.run_id, message);
                return Ok(execution.finish(RunStatus::Failed, message, &ctx));
            }

            for result in &results {
                let started = Instant::now();
                let assessment = self.assessor.assess(ctx.input(), &execution.step_results, None);
                let value = assessment.to_value();
                let rule_result =
                    self.rules
                        .evaluate_step(&definition.rules, result.step_number, &ctx.with_assessment(Some(&value)));
                let routing = self.decision_point(&mut execution, &definition, &rule_result, None, started)?;
                if !routing.can_continue {
                    return Ok(self.halt(execution, routing, &ctx));
                }
            }
        }

        // Final evaluation
        let started = Instant::now();
        let final_output = execution
            .step_results
            .iter()
            .rev()
            .find_map(|r| r.output.clone());
        let assessment = self
            .assessor
            .assess(ctx.input(), &execution.step_results, final_output.as_ref());
        let value = assessment.to_value();
        let result = self
            .rules
            .evaluate_workflow(&definition.rules, &ctx.with_assessment(Some(&value)));
        execution.assessment = Some(assessment);
        let routing =
            self.decision_point(&mut execution, &definition, &result, Some(assessment.weighted_total), started)?;
        if !routing.can_continue {
            return Ok(self.halt(execution, routing, &ctx));
        }

        execution.auto_approved = execution.cumulative_risk <= definition.thresholds.auto_approve;
        let message = format!(
            "Workflow completed with risk {:.2}{}",
            execution.cumulative_risk,
            if execution.auto_approved { " (auto-approved)" } else { "" }
        );
        info!("Run {}: {}", execution.run_id, message);
        Ok(execution.finish(RunStatus::Completed, message, &ctx))
    }

    /// Accumulates risk, routes, and writes the audit entry for one
    /// decision point. `assessed_floor` is the standalone assessment used
    /// by the final blend.
    fn decision_point(
        &self,
        execution: &mut WorkflowExecution,
        definition: &WorkflowDefinition,
        result: &RuleEvaluationResult,
        assessed_floor: Option<f64>,
        started: Instant,
    ) -> Result<RoutingResult, FlowError> {
        let risk_before = execution.cumulative_risk;
        let mut risk_after = risk_before + result.aggregate_risk_factor;
        if let Some(floor) = assessed_floor {
            risk_after = risk_after.max(floor);
        }
        execution.cumulative_risk = risk_after;

        let routing = self.routing.route(result, risk_after, &definition.thresholds);

        let entry = AuditEntry {
            run_id: execution.run_id.clone(),
            workflow_id: definition.id.clone(),
            decision_point: result.phase.to_string(),
            triggered_rule_ids: routing.triggered_rule_ids.clone(),
            routing_decision: routing.routing_decision,
            intervention_type: routing.intervention_type,
            risk_before,
            risk_contribution: risk_after - risk_before,
            risk_after,
            processing_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        };
        self.audit.record(&entry)?;
        execution.audit_entries.push(entry);

        if routing.intervention_type == InterventionType::Warning {
            warn!("Run {} at {}: {}", execution.run_id, result.phase, routing.message);
        }
        for rule_error in &result.errors {
            warn!("Rule '{}' not evaluated: {}", rule_error.rule_id, rule_error.message);
        }

        execution.routing = Some(routing.clone());
        Ok(routing)
    }

    /// Ends the run awaiting approval.
    fn halt(&self, mut execution: WorkflowExecution, routing: RoutingResult, ctx: &ExecutionContext) -> WorkflowExecution {
        let decision_point = execution
            .audit_entries
            .last()
            .map(|e| e.decision_point.clone())
            .unwrap_or_default();

        info!(
            "Run {} halted at {} ({}): {}",
            execution.run_id, decision_point, routing.intervention_type, routing.message
        );

        execution.approval_request = Some(ApprovalRequest {
            run_id: execution.run_id.clone(),
            decision_point,
            intervention_type: routing.intervention_type,
            priority: routing.priority,
            expires_at: routing.expires_at,
            min_approver_seniority: routing.min_approver_seniority,
            escalation_level: routing.escalation_level,
            cumulative_risk: execution.cumulative_risk,
            message: routing.message.clone(),
            triggered_rule_ids: routing.triggered_rule_ids.clone(),
        });
        let message = routing.message.clone();
        execution.finish(RunStatus::AwaitingApproval, message, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuditError, StoreError};
    use crate::execution::builtin::MathEngine;
    use crate::execution::step::StepStatus;
    use crate::risk::{RiskRule, RoutingDecision, RuleScope};
    use crate::workflow::{InMemoryDefinitionStore, OnError, RiskThresholds, WorkflowStep};
    use serde_json::json;

    struct RejectingSink;

    impl AuditSink for RejectingSink {
        fn record(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("down".into()))
        }
    }

    fn credit_check() -> WorkflowDefinition {
        WorkflowDefinition::from_steps(
            "credit",
            vec![
                WorkflowStep::new(1, "math", "multiply")
                    .with_output("exposure")
                    .with_input("a", json!("$input.amount"))
                    .with_input("b", json!(2)),
                WorkflowStep::new(2, "math", "subtract")
                    .with_output("headroom")
                    .with_input("a", json!("$input.limit"))
                    .with_input("b", json!("$step1.exposure.result")),
                WorkflowStep::new(3, "math", "identity")
                    .with_output("flag")
                    .with_input("value", json!("$input.flag")),
            ],
        )
        .with_thresholds(RiskThresholds::new(0.3, 0.5, 0.8))
    }

    fn orchestrator(definition: WorkflowDefinition) -> (Orchestrator, Arc<MemoryAuditSink>) {
        let store = InMemoryDefinitionStore::new();
        store.insert(definition).unwrap();
        let registry = EngineRegistry::new().with_engine(Arc::new(MathEngine)).unwrap();
        let config = EngineConfig {
            max_parallel: 2,
            base_delay_ms: 1,
            ..EngineConfig::default()
        };
        let sink = Arc::new(MemoryAuditSink::new());
        let orchestrator = Orchestrator::new(Arc::new(store), registry, config).with_audit_sink(sink.clone());
        (orchestrator, sink)
    }

    #[tokio::test]
    async fn test_clean_run_completes_and_auto_approves() {
        let (orchestrator, sink) = orchestrator(credit_check());
        let execution = orchestrator
            .execute("credit", json!({"amount": 100, "limit": 500, "flag": true}), "u-1")
            .await
            .unwrap();

        assert_eq!(execution.status, RunStatus::Completed);
        assert!(execution.auto_approved);
        assert_eq!(execution.outputs["headroom"], json!({"result": 300}));
        assert_eq!(execution.step_results.len(), 3);
        assert!(execution.finished_at.is_some());

        let points: Vec<String> = execution.audit_entries.iter().map(|e| e.decision_point.clone()).collect();
        assert_eq!(points, vec!["global", "step_1", "step_3", "step_2", "final"]);
        assert_eq!(sink.entries().len(), 5);
        assert!(Uuid::parse_str(&execution.run_id).is_ok());
    }

    #[tokio::test]
    async fn test_global_block_short_circuits() {
        let definition = credit_check().with_rule(
            RiskRule::global("too-big", "$input.amount > 1000", 0.2, RoutingDecision::Block)
                .with_message("{rule_id}: amount {$input.amount}"),
        );
        let (orchestrator, _) = orchestrator(definition);
        let execution = orchestrator
            .execute("credit", json!({"amount": 5000, "limit": 500}), "u-1")
            .await
            .unwrap();

        assert_eq!(execution.status, RunStatus::AwaitingApproval);
        assert!(execution.step_results.is_empty());
        let request = execution.approval_request.unwrap();
        assert_eq!(request.intervention_type, InterventionType::HardStop);
        assert_eq!(request.priority, Priority::Urgent);
        assert_eq!(request.triggered_rule_ids, vec!["too-big"]);
        assert_eq!(request.message, "too-big: amount 5000");
        assert_eq!(request.decision_point, "global");
        assert!(request.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_step_rule_pauses_run() {
        let definition = credit_check().with_rule(RiskRule::step(
            "negative-headroom",
            2,
            "$step2.headroom.result < 0",
            0.4,
            RoutingDecision::Pause,
        ));
        let (orchestrator, _) = orchestrator(definition);
        let execution = orchestrator
            .execute("credit", json!({"amount": 400, "limit": 500}), "u-1")
            .await
            .unwrap();

        assert_eq!(execution.status, RunStatus::AwaitingApproval);
        let request = execution.approval_request.as_ref().unwrap();
        assert_eq!(request.decision_point, "step_2");
        assert_eq!(request.intervention_type, InterventionType::SoftStop);
        assert!((execution.cumulative_risk - 0.4).abs() < 1e-9);
        assert_eq!(execution.audit_entries.last().unwrap().risk_after, execution.cumulative_risk);
    }

    #[tokio::test]
    async fn test_final_blend_uses_assessment_floor() {
        let (orchestrator, _) = orchestrator(credit_check());
        let input = json!({
            "amount": 1, "limit": 5, "flag": 1,
            "risk_profile": {"technical": 1.0, "safety": 1.0}
        });
        let execution = orchestrator.execute("credit", input, "u-1").await.unwrap();

        assert_eq!(execution.status, RunStatus::Completed);
        assert!((execution.cumulative_risk - 0.5).abs() < 1e-9);
        assert!(!execution.auto_approved);
        let last = execution.audit_entries.last().unwrap();
        assert_eq!(last.decision_point, "final");
        assert!((last.risk_contribution - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cumulative_risk_non_decreasing() {
        let definition = credit_check()
            .with_rule(RiskRule::global("g", "true", 0.1, RoutingDecision::Warn))
            .with_rule(RiskRule::step("s", 1, "true", 0.3, RoutingDecision::Continue).with_scope(RuleScope::Any));
        let (orchestrator, _) = orchestrator(definition);
        let execution = orchestrator
            .execute("credit", json!({"amount": 1, "limit": 5}), "u-1")
            .await
            .unwrap();

        let risks: Vec<f64> = execution.audit_entries.iter().map(|e| e.risk_after).collect();
        assert!(risks.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(execution.status, RunStatus::AwaitingApproval);
        assert_eq!(execution.approval_request.unwrap().decision_point, "step_2");
        assert_eq!(execution.routing.unwrap().intervention_type, InterventionType::HardStop);
    }

    #[tokio::test]
    async fn test_failing_step_fails_run() {
        let mut definition = credit_check();
        definition.steps[0] = definition.steps[0].clone().with_input("b", json!("x"));
        let (orchestrator, _) = orchestrator(definition);

        let execution = orchestrator
            .execute("credit", json!({"amount": 1, "limit": 5}), "u-1")
            .await
            .unwrap();
        assert_eq!(execution.status, RunStatus::Failed);
        assert!(execution.message.contains("step 1"));
        assert!(execution.step_result(2).is_none());
    }

    #[tokio::test]
    async fn test_continue_with_fallback_keeps_going() {
        let mut definition = credit_check();
        definition.steps[0] = definition.steps[0]
            .clone()
            .with_input("b", json!("x"))
            .with_on_error(OnError::Continue)
            .with_fallback(json!({"result": 0}));
        let (orchestrator, _) = orchestrator(definition);

        let execution = orchestrator
            .execute("credit", json!({"amount": 1, "limit": 5}), "u-1")
            .await
            .unwrap();
        assert_eq!(execution.status, RunStatus::Completed);
        assert_eq!(execution.step_result(1).unwrap().status, StepStatus::CompletedWithFallback);
        assert_eq!(execution.outputs["headroom"], json!({"result": 5}));
    }

    #[tokio::test]
    async fn test_unknown_definition_and_target() {
        let (orchestrator, _) = orchestrator(credit_check());
        assert!(matches!(
            orchestrator.execute("missing", json!({}), "u-1").await,
            Err(FlowError::Store(StoreError::NotFound(_)))
        ));

        let store = InMemoryDefinitionStore::new();
        store
            .insert(WorkflowDefinition::from_steps("wf", vec![WorkflowStep::new(1, "stats", "mean")]))
            .unwrap();
        let orchestrator = Orchestrator::new(Arc::new(store), EngineRegistry::new(), EngineConfig::default());
        assert!(matches!(
            orchestrator.execute("wf", json!({}), "u-1").await,
            Err(FlowError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_is_fatal() {
        let (orchestrator, _) = orchestrator(credit_check());
        let orchestrator = orchestrator.with_audit_sink(Arc::new(RejectingSink));
        assert!(matches!(
            orchestrator.execute("credit", json!({"amount": 1, "limit": 5}), "u-1").await,
            Err(FlowError::Audit(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_at_level_boundary() {
        let (orchestrator, _) = orchestrator(credit_check());
        let cancel = AtomicBool::new(true);
        let execution = orchestrator
            .execute_with_cancel("credit", json!({"amount": 1, "limit": 5}), "u-1", &cancel)
            .await
            .unwrap();
        assert_eq!(execution.status, RunStatus::Failed);
        assert_eq!(execution.message, "Run cancelled");
        assert!(execution.step_results.is_empty());

        let next = orchestrator
            .execute("credit", json!({"amount": 1, "limit": 5}), "u-1")
            .await
            .unwrap();
        assert_eq!(next.status, RunStatus::Completed);
        assert_eq!(next.step_results.len(), 3);
    }

    #[tokio::test]
    async fn test_escalation_level_halts_warn_rule() {
        let mut rule = RiskRule::escalation("large-exposure", Some(1), "$step1.exposure.result > 100", 0.1, 2);
        rule.action = RoutingDecision::Warn;
        let (orchestrator, _) = orchestrator(credit_check().with_rule(rule));

        let execution = orchestrator
            .execute("credit", json!({"amount": 100, "limit": 500}), "u-1")
            .await
            .unwrap();

        assert_eq!(execution.status, RunStatus::AwaitingApproval);
        let request = execution.approval_request.unwrap();
        assert_eq!(request.decision_point, "step_1");
        assert_eq!(request.intervention_type, InterventionType::Escalation);
        assert_eq!(request.escalation_level, Some(2));
        assert_eq!(request.min_approver_seniority, 2);
        assert_eq!(request.triggered_rule_ids, vec!["large-exposure"]);
    }

    #[tokio::test]
    async fn test_replaced_definition_runs_new_steps() {
        let store = Arc::new(InMemoryDefinitionStore::new());
        let mut short = credit_check();
        short.steps.truncate(1);
        store.insert(short).unwrap();

        let registry = EngineRegistry::new().with_engine(Arc::new(MathEngine)).unwrap();
        let orchestrator = Orchestrator::new(store.clone(), registry, EngineConfig::default());
        let input = json!({"amount": 1, "limit": 5, "flag": true});

        let first = orchestrator.execute("credit", input.clone(), "u-1").await.unwrap();
        assert_eq!(first.step_results.len(), 1);

        store.insert(credit_check()).unwrap();
        let second = orchestrator.execute("credit", input, "u-1").await.unwrap();
        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.step_results.len(), 3);
        assert_eq!(second.outputs["headroom"], json!({"result": 3}));
    }

    #[test]
    fn test_analyze_delegates_to_graph_builder() {
        let (orchestrator, _) = orchestrator(credit_check());
        let analysis = orchestrator.analyze(&credit_check());
        assert_eq!(analysis.execution_order, vec![vec![1, 3], vec![2]]);
        assert!(!analysis.has_cycles);
    }
}
