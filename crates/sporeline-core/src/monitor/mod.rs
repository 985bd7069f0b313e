//! Execution Monitor
//!
//! Gates step transitions against live telemetry and pauses the owning plan
//! on violations.
//!
//! - A transition into `running` or `completed` runs the gate first.
//! - `block` pauses the plan and leaves the step unchanged.
//! - `warn` pauses only when the target is `running`; recording completion
//!   under a soft warning is tolerated.
//! - An operator override is the only way past a gate decision, and is
//!   recorded on the plan.

use crate::error::{NotFound, PipelineError, PipelineResult};
use crate::gate::{GateOptions, SafetyGate};
use crate::logging::{ExecutionLog, LogCategory, LogContext};
use crate::state_machine::{validate_plan_transition, validate_step_transition};
use crate::types::{
    ExecutionPlan, GateDecision, ManualOverride, PlanId, PlanStatus, SafetyGateResult, StepId,
    StepStatus, TelemetrySnapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Action reported when a tick pauses the plan
pub const ACTION_PAUSED: &str = "Paused execution, awaiting operator review";
/// Action reported when a tick finds nothing
pub const ACTION_CONTINUE: &str = "Monitoring continues";

/// Result of a step status request
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    /// Plan after the request
    pub plan: ExecutionPlan,
    /// Gate evaluation, when the target status is gated
    pub gate: Option<SafetyGateResult>,
    /// Whether the step actually moved
    pub applied: bool,
}

/// Severity of a telemetry deviation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviationSeverity {
    /// From a `block`
    Critical,
    /// From a `warn`
    Warning,
}

/// One non-allow gate result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryDeviation {
    /// Step evaluated
    pub step_id: StepId,
    /// Severity
    pub severity: DeviationSeverity,
    /// Gate decision
    pub decision: GateDecision,
    /// Gate rationale
    pub rationale: Vec<String>,
}

/// Per-step status line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// Step id
    pub step_id: StepId,
    /// Current status
    pub status: StepStatus,
    /// Last status change
    pub last_updated: DateTime<Utc>,
}

/// Report built on every monitor tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatusReport {
    /// Plan monitored
    pub plan_id: PlanId,
    /// Plan status after the tick
    pub plan_status: PlanStatus,
    /// Report time
    pub generated_at: DateTime<Utc>,
    /// Step status snapshot
    pub steps: Vec<StepSnapshot>,
    /// Non-allow gate results
    pub telemetry_deviations: Vec<TelemetryDeviation>,
    /// What the monitor did
    pub actions_taken: Vec<String>,
    /// Why the plan is paused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_reason: Option<String>,
}

/// Result of a monitor tick
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorOutcome {
    /// Plan after the tick
    pub plan: ExecutionPlan,
    /// Status report
    pub report: ExecutionStatusReport,
}

/// Execution monitor
#[derive(Debug, Clone)]
pub struct ExecutionMonitor {
    gate: SafetyGate,
    options: GateOptions,
    log: Arc<ExecutionLog>,
}

impl ExecutionMonitor {
    /// Create monitor using the gate's default options
    #[must_use]
    pub fn new(gate: SafetyGate, log: Arc<ExecutionLog>) -> Self {
        Self {
            options: gate.default_options(),
            gate,
            log,
        }
    }

    /// With gate options (e.g. emergency stop engaged)
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: GateOptions) -> Self {
        self.options = options;
        self
    }

    /// Gate options in effect
    #[inline]
    #[must_use]
    pub fn options(&self) -> GateOptions {
        self.options
    }

    /// Request a step status change
    ///
    /// # Errors
    /// - `NotFound::Step` for an unknown step id
    /// - `IllegalTransition` when the plan is rejected or completed, or the
    ///   step cannot move from its current status to `new_status`
    /// - `PlanNotActive` when starting a step on a plan that is not approved,
    ///   or completing one on a plan that was never approved
    pub fn update_step_status(
        &self,
        plan: &ExecutionPlan,
        step_id: &StepId,
        new_status: StepStatus,
        telemetry: Option<&TelemetrySnapshot>,
    ) -> PipelineResult<StepUpdate> {
        let index = check_step_request(plan, step_id, new_status)?;
        validate_step_transition(plan.steps[index].status, new_status)?;

        let gate = new_status
            .is_gated()
            .then(|| self.gate.evaluate_step(&plan.steps[index], telemetry, &self.options));

        let halts = gate.as_ref().is_some_and(|g| match g.decision {
            GateDecision::Block => true,
            GateDecision::Warn => new_status == StepStatus::Running,
            GateDecision::Allow => false,
        });

        if let Some(result) = gate.as_ref().filter(|_| halts) {
            let reason = format!(
                "Safety gate {} while moving {step_id} to {new_status}",
                result.decision
            );
            let next = self.pause(plan, reason)?;
            return Ok(StepUpdate {
                plan: next,
                gate,
                applied: false,
            });
        }

        let next = self.apply(plan, index, new_status);
        Ok(StepUpdate {
            plan: next,
            gate,
            applied: true,
        })
    }

    /// Evaluate every step and pause on any warn or block
    ///
    /// Only approved or already paused plans are paused; for other statuses
    /// the report still lists deviations but the plan is returned as is.
    ///
    /// # Errors
    /// `IllegalTransition` if the pause is rejected by the plan state machine.
    pub fn monitor_plan(
        &self,
        plan: &ExecutionPlan,
        telemetry: Option<&TelemetrySnapshot>,
    ) -> PipelineResult<MonitorOutcome> {
        let results = self.gate.evaluate_plan(&plan.steps, telemetry, &self.options);

        let deviations: Vec<TelemetryDeviation> = results
            .iter()
            .filter_map(|r| {
                let severity = match r.decision {
                    GateDecision::Block => DeviationSeverity::Critical,
                    GateDecision::Warn => DeviationSeverity::Warning,
                    GateDecision::Allow => return None,
                };
                Some(TelemetryDeviation {
                    step_id: r.step_id.clone(),
                    severity,
                    decision: r.decision,
                    rationale: r.rationale.clone(),
                })
            })
            .collect();

        let pausable = matches!(plan.status, PlanStatus::Approved | PlanStatus::Paused);
        let (next, action) = if !deviations.is_empty() && pausable {
            let worst = deviations
                .iter()
                .map(|d| d.decision)
                .fold(GateDecision::Allow, GateDecision::join);
            let flagged: Vec<&str> = deviations.iter().map(|d| d.step_id.as_str()).collect();
            let reason = format!("Safety gate {worst} on {}", flagged.join(", "));
            (self.pause(plan, reason)?, ACTION_PAUSED)
        } else {
            (plan.clone(), ACTION_CONTINUE)
        };

        let report = ExecutionStatusReport {
            plan_id: next.id,
            plan_status: next.status,
            generated_at: Utc::now(),
            steps: next
                .steps
                .iter()
                .map(|s| StepSnapshot {
                    step_id: s.id.clone(),
                    status: s.status,
                    last_updated: s.last_updated,
                })
                .collect(),
            telemetry_deviations: deviations,
            actions_taken: vec![action.to_string()],
            paused_reason: (next.status == PlanStatus::Paused)
                .then(|| next.paused_reason.clone())
                .flatten(),
        };

        self.log.record(
            LogCategory::Monitor,
            format!(
                "Monitor tick: {} deviations, {}",
                report.telemetry_deviations.len(),
                action
            ),
            LogContext::plan(next.id),
            Some(serde_json::json!({ "plan_status": next.status })),
        );

        Ok(MonitorOutcome { plan: next, report })
    }

    /// Force a step transition past the gate
    ///
    /// The gate still runs for gated targets so the bypassed decision is
    /// recorded with the override. The step transition table is not
    /// consulted, so an operator can reopen completed work.
    ///
    /// # Errors
    /// - `MissingReason` when `reason` is blank
    /// - otherwise as [`Self::update_step_status`]
    pub fn override_step_status(
        &self,
        plan: &ExecutionPlan,
        step_id: &StepId,
        new_status: StepStatus,
        operator: &str,
        reason: &str,
        telemetry: Option<&TelemetrySnapshot>,
    ) -> PipelineResult<StepUpdate> {
        if reason.trim().is_empty() {
            return Err(PipelineError::MissingReason {
                action: "override a step",
            });
        }
        let index = check_step_request(plan, step_id, new_status)?;

        let gate = new_status
            .is_gated()
            .then(|| self.gate.evaluate_step(&plan.steps[index], telemetry, &self.options));
        let bypassed = gate.as_ref().filter(|g| g.is_flagged()).map(|g| g.decision);

        let mut next = self.apply(plan, index, new_status);
        next.manual_overrides.push(ManualOverride {
            step_id: Some(step_id.clone()),
            operator: operator.to_string(),
            reason: reason.to_string(),
            bypassed_decision: bypassed,
            recorded_at: Utc::now(),
        });

        tracing::warn!(plan = %plan.id, step = %step_id, operator, "manual override");
        self.log.record(
            LogCategory::Monitor,
            format!("Manual override by {operator}: {step_id} -> {new_status}"),
            LogContext::step(Some(plan.id), step_id.clone()),
            Some(serde_json::json!({
                "reason": reason,
                "bypassed_decision": bypassed,
            })),
        );

        Ok(StepUpdate {
            plan: next,
            gate,
            applied: true,
        })
    }

    /// Move a paused plan back to approved
    ///
    /// A plan whose steps all completed while it was paused goes straight
    /// on to completed.
    ///
    /// # Errors
    /// - `MissingReason` when `reason` is blank
    /// - `IllegalTransition` unless the plan is paused
    pub fn resume_plan(
        &self,
        plan: &ExecutionPlan,
        operator: &str,
        reason: &str,
    ) -> PipelineResult<ExecutionPlan> {
        if reason.trim().is_empty() {
            return Err(PipelineError::MissingReason {
                action: "resume a plan",
            });
        }
        if plan.status != PlanStatus::Paused {
            return Err(PipelineError::illegal_transition(
                "plan",
                plan.status,
                PlanStatus::Approved,
            ));
        }

        let mut next = plan.next_version();
        next.status = PlanStatus::Approved;
        next.paused_reason = None;
        next.manual_overrides.push(ManualOverride {
            step_id: None,
            operator: operator.to_string(),
            reason: reason.to_string(),
            bypassed_decision: None,
            recorded_at: Utc::now(),
        });

        tracing::info!(plan = %next.id, operator, "plan resumed");
        self.log.record(
            LogCategory::Approval,
            format!("Plan resumed by {operator}: {reason}"),
            LogContext::plan(next.id),
            None,
        );
        self.complete_if_done(&mut next);
        Ok(next)
    }

    fn pause(&self, plan: &ExecutionPlan, reason: String) -> PipelineResult<ExecutionPlan> {
        validate_plan_transition(plan.status, PlanStatus::Paused)?;

        let mut next = plan.next_version();
        next.status = PlanStatus::Paused;
        next.paused_reason = Some(reason.clone());

        tracing::warn!(plan = %next.id, %reason, "plan paused");
        self.log.record(
            LogCategory::Monitor,
            format!("Plan paused: {reason}"),
            LogContext::plan(next.id),
            None,
        );
        Ok(next)
    }

    fn apply(&self, plan: &ExecutionPlan, index: usize, new_status: StepStatus) -> ExecutionPlan {
        let mut next = plan.next_version();
        let step = &mut next.steps[index];
        let previous = step.status;
        step.status = new_status;
        step.last_updated = Utc::now();
        let step_id = step.id.clone();

        self.log.record(
            LogCategory::Monitor,
            format!("Step {step_id}: {previous} -> {new_status}"),
            LogContext::step(Some(next.id), step_id),
            None,
        );

        self.complete_if_done(&mut next);
        next
    }

    fn complete_if_done(&self, plan: &mut ExecutionPlan) {
        if plan.status != PlanStatus::Approved || !plan.all_steps_completed() {
            return;
        }
        plan.status = PlanStatus::Completed;
        tracing::info!(plan = %plan.id, "plan completed");
        self.log.record(
            LogCategory::Monitor,
            "All steps completed",
            LogContext::plan(plan.id),
            None,
        );
    }
}

/// Resolve the step and check the plan can accept the request
fn check_step_request(
    plan: &ExecutionPlan,
    step_id: &StepId,
    new_status: StepStatus,
) -> PipelineResult<usize> {
    let index = plan
        .step_index(step_id)
        .ok_or_else(|| NotFound::Step(step_id.clone()))?;

    if plan.status.is_terminal() {
        return Err(PipelineError::illegal_transition(
            "step",
            plan.steps[index].status,
            new_status,
        ));
    }

    let active = match new_status {
        StepStatus::Running => plan.status == PlanStatus::Approved,
        StepStatus::Completed => matches!(plan.status, PlanStatus::Approved | PlanStatus::Paused),
        _ => true,
    };
    if !active {
        return Err(PipelineError::PlanNotActive {
            plan_id: plan.id,
            status: plan.status.to_string(),
        });
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApprovalConfig, GateConfig};
    use crate::planner::ExecutionPlanner;
    use crate::types::{ExecutionStep, StepSource, TelemetryWatch};

    struct Fixture {
        monitor: ExecutionMonitor,
        plan: ExecutionPlan,
        log: Arc<ExecutionLog>,
    }

    fn fixture() -> Fixture {
        let log = Arc::new(ExecutionLog::default());
        let planner = ExecutionPlanner::new(ApprovalConfig::default(), Arc::clone(&log));
        let steps = vec![
            ExecutionStep::new("a", StepSource::WorkflowPlan, "a")
                .with_watch(TelemetryWatch::standard()),
            ExecutionStep::new("b", StepSource::WorkflowPlan, "b")
                .with_watch(TelemetryWatch::standard()),
        ];
        let plan = planner.sequence_steps(steps);
        let plan = planner.approve_plan(&plan, "alice").unwrap();
        let gate = SafetyGate::new(&GateConfig::default(), Arc::clone(&log));
        Fixture {
            monitor: ExecutionMonitor::new(gate, Arc::clone(&log)),
            plan,
            log,
        }
    }

    fn nominal() -> TelemetrySnapshot {
        TelemetrySnapshot::new().with_temperature(20.0).with_contamination_risk(10.0)
    }

    #[test]
    fn allow_applies_transition() {
        let f = fixture();
        let update = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("a"), StepStatus::Running, Some(&nominal()))
            .unwrap();
        assert!(update.applied);
        assert_eq!(update.gate.unwrap().decision, GateDecision::Allow);
        assert_eq!(update.plan.step(&StepId::new("a")).unwrap().status, StepStatus::Running);
        assert_eq!(update.plan.status, PlanStatus::Approved);
        assert_eq!(update.plan.version, f.plan.version + 1);
    }

    #[test]
    fn block_pauses_plan_and_keeps_step() {
        let f = fixture();
        let hot = TelemetrySnapshot::new().with_temperature(35.0);
        let update = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("a"), StepStatus::Completed, Some(&hot))
            .unwrap();
        assert!(!update.applied);
        assert_eq!(update.plan.status, PlanStatus::Paused);
        assert_eq!(update.plan.step(&StepId::new("a")).unwrap().status, StepStatus::Pending);
        assert!(update.plan.paused_reason.is_some());
    }

    #[test]
    fn warn_pauses_running_but_not_completed() {
        let f = fixture();
        let busy = TelemetrySnapshot::new().with_equipment_load(95.0);

        let start = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("a"), StepStatus::Running, Some(&busy))
            .unwrap();
        assert!(!start.applied);
        assert_eq!(start.plan.status, PlanStatus::Paused);

        let finish = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("a"), StepStatus::Completed, Some(&busy))
            .unwrap();
        assert!(finish.applied);
        assert_eq!(finish.plan.status, PlanStatus::Approved);
    }

    #[test]
    fn ungated_targets_skip_gate() {
        let f = fixture();
        let update = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("b"), StepStatus::Failed, None)
            .unwrap();
        assert!(update.gate.is_none());
        assert_eq!(update.plan.step(&StepId::new("b")).unwrap().status, StepStatus::Failed);
    }

    #[test]
    fn unknown_step_is_not_found() {
        let f = fixture();
        let err = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("nope"), StepStatus::Running, None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn running_requires_approved_plan() {
        let mut f = fixture();
        f.plan.status = PlanStatus::PendingApproval;
        let err = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("a"), StepStatus::Running, None)
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn completing_all_steps_completes_plan() {
        let f = fixture();
        let mut plan = f.plan.clone();
        for id in ["a", "b"] {
            plan = f
                .monitor
                .update_step_status(&plan, &StepId::new(id), StepStatus::Completed, None)
                .unwrap()
                .plan;
        }
        assert_eq!(plan.status, PlanStatus::Completed);

        let err = f
            .monitor
            .update_step_status(&plan, &StepId::new("a"), StepStatus::Running, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::IllegalTransition { entity: "step", .. }));
    }

    #[test]
    fn completed_step_cannot_be_reopened() {
        let f = fixture();
        let plan = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("a"), StepStatus::Completed, None)
            .unwrap()
            .plan;

        for target in [StepStatus::AwaitingApproval, StepStatus::Pending, StepStatus::Running] {
            let err = f
                .monitor
                .update_step_status(&plan, &StepId::new("a"), target, None)
                .unwrap_err();
            assert!(matches!(err, PipelineError::IllegalTransition { entity: "step", .. }));
        }

        let reopened = f
            .monitor
            .override_step_status(
                &plan,
                &StepId::new("a"),
                StepStatus::Pending,
                "dana",
                "redo",
                None,
            )
            .unwrap();
        assert_eq!(reopened.plan.step(&StepId::new("a")).unwrap().status, StepStatus::Pending);
    }

    #[test]
    fn approved_steps_cannot_return_to_awaiting_approval() {
        let f = fixture();
        let err = f
            .monitor
            .update_step_status(&f.plan, &StepId::new("b"), StepStatus::AwaitingApproval, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::IllegalTransition { entity: "step", .. }));
    }

    #[test]
    fn monitor_pauses_on_deviation() {
        let f = fixture();
        let dirty = TelemetrySnapshot::new().with_contamination_risk(90.0);
        let outcome = f.monitor.monitor_plan(&f.plan, Some(&dirty)).unwrap();

        assert_eq!(outcome.plan.status, PlanStatus::Paused);
        assert_eq!(outcome.report.telemetry_deviations.len(), 2);
        assert!(outcome
            .report
            .telemetry_deviations
            .iter()
            .all(|d| d.severity == DeviationSeverity::Critical));
        assert_eq!(outcome.report.actions_taken, vec![ACTION_PAUSED]);
        assert_eq!(
            outcome.report.paused_reason.as_deref(),
            Some("Safety gate block on a, b")
        );
    }

    #[test]
    fn quiet_tick_leaves_plan_untouched() {
        let f = fixture();
        let outcome = f.monitor.monitor_plan(&f.plan, Some(&nominal())).unwrap();
        assert_eq!(outcome.plan, f.plan);
        assert_eq!(outcome.report.actions_taken, vec![ACTION_CONTINUE]);
        assert!(outcome.report.paused_reason.is_none());
        assert_eq!(outcome.report.steps.len(), 2);
    }

    #[test]
    fn emergency_stop_pauses_everything() {
        let f = fixture();
        let monitor = f.monitor.clone().with_options(f.monitor.options().emergency());
        let outcome = monitor.monitor_plan(&f.plan, None).unwrap();
        assert_eq!(outcome.plan.status, PlanStatus::Paused);
    }

    #[test]
    fn override_records_bypassed_decision() {
        let f = fixture();
        let hot = TelemetrySnapshot::new().with_temperature(35.0);
        let update = f
            .monitor
            .override_step_status(
                &f.plan,
                &StepId::new("a"),
                StepStatus::Running,
                "dana",
                "sensor miscalibrated",
                Some(&hot),
            )
            .unwrap();

        assert!(update.applied);
        assert_eq!(update.plan.step(&StepId::new("a")).unwrap().status, StepStatus::Running);
        let record = &update.plan.manual_overrides[0];
        assert_eq!(record.operator, "dana");
        assert_eq!(record.bypassed_decision, Some(GateDecision::Block));
    }

    #[test]
    fn override_requires_reason() {
        let f = fixture();
        let err = f
            .monitor
            .override_step_status(&f.plan, &StepId::new("a"), StepStatus::Running, "dana", "", None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingReason { .. }));
    }

    #[test]
    fn resume_returns_to_approved() {
        let f = fixture();
        let dirty = TelemetrySnapshot::new().with_contamination_risk(90.0);
        let paused = f.monitor.monitor_plan(&f.plan, Some(&dirty)).unwrap().plan;

        let resumed = f.monitor.resume_plan(&paused, "dana", "room sanitized").unwrap();
        assert_eq!(resumed.status, PlanStatus::Approved);
        assert!(resumed.paused_reason.is_none());
        assert_eq!(resumed.manual_overrides.len(), 1);
        assert!(resumed.manual_overrides[0].step_id.is_none());

        assert!(f.monitor.resume_plan(&resumed, "dana", "again").is_err());
        assert!(!f.log.list(Some(LogCategory::Approval)).is_empty());
    }
}
