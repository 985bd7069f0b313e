//! Rollback Engine
//!
//! Plans compensating actions for a paused or failed execution. It does not
//! carry them out; reversal is an operational action outside the pipeline.

use crate::config::RollbackConfig;
use crate::error::{NotFound, PipelineResult};
use crate::logging::{ExecutionLog, LogCategory, LogContext};
use crate::state_machine::validate_rollback_transition;
use crate::types::{
    ExecutionPlan, ExecutionStep, RollbackId, RollbackPlan, RollbackStatus, RollbackStep, StepId,
    StepStatus,
};
use chrono::Utc;
use std::sync::Arc;

/// Rollback engine
#[derive(Debug, Clone)]
pub struct RollbackEngine {
    config: RollbackConfig,
    log: Arc<ExecutionLog>,
}

impl RollbackEngine {
    /// Create rollback engine
    #[must_use]
    pub fn new(config: RollbackConfig, log: Arc<ExecutionLog>) -> Self {
        Self { config, log }
    }

    /// Plan the reversal of every completed step plus the failing one
    ///
    /// Entries run newest-first (reverse plan order) so later work is
    /// unwound before the work it built on.
    ///
    /// # Errors
    /// `NotFound::Step` when `failed_step_id` is not in the plan.
    pub fn generate(
        &self,
        plan: &ExecutionPlan,
        failed_step_id: &StepId,
        reason: &str,
    ) -> PipelineResult<RollbackPlan> {
        if plan.step(failed_step_id).is_none() {
            return Err(NotFound::Step(failed_step_id.clone()).into());
        }

        let steps: Vec<RollbackStep> = plan
            .steps
            .iter()
            .rev()
            .filter(|s| s.status == StepStatus::Completed || &s.id == failed_step_id)
            .map(|s| self.compensate(s))
            .collect();

        let rollback = RollbackPlan {
            id: RollbackId::new(),
            plan_id: plan.id,
            failed_step_id: failed_step_id.clone(),
            reason: reason.to_string(),
            steps,
            status: RollbackStatus::PendingApproval,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            completed_at: None,
        };

        tracing::info!(
            plan = %plan.id,
            rollback = %rollback.id,
            entries = rollback.steps.len(),
            "rollback generated"
        );
        self.log.record(
            LogCategory::Rollback,
            format!(
                "Generated rollback with {} entries for failed step {failed_step_id}",
                rollback.steps.len()
            ),
            LogContext::step(Some(plan.id), failed_step_id.clone()).with_rollback(rollback.id),
            Some(serde_json::json!({ "reason": reason })),
        );

        Ok(rollback)
    }

    /// Approve a pending rollback
    ///
    /// # Errors
    /// `IllegalTransition` unless the rollback is pending approval.
    pub fn approve(&self, rollback: &RollbackPlan, approver: &str) -> PipelineResult<RollbackPlan> {
        validate_rollback_transition(rollback.status, RollbackStatus::Approved)?;

        let mut next = rollback.clone();
        next.status = RollbackStatus::Approved;
        next.approved_by = Some(approver.to_string());
        next.approved_at = Some(Utc::now());

        self.log.record(
            LogCategory::Rollback,
            format!("Rollback approved by {approver}"),
            context(&next),
            None,
        );
        Ok(next)
    }

    /// Mark an approved rollback as carried out
    ///
    /// # Errors
    /// `IllegalTransition` unless the rollback is approved.
    pub fn complete(&self, rollback: &RollbackPlan) -> PipelineResult<RollbackPlan> {
        validate_rollback_transition(rollback.status, RollbackStatus::Completed)?;

        let mut next = rollback.clone();
        next.status = RollbackStatus::Completed;
        next.completed_at = Some(Utc::now());

        self.log.record(
            LogCategory::Rollback,
            "Rollback completed",
            context(&next),
            None,
        );
        Ok(next)
    }

    fn compensate(&self, step: &ExecutionStep) -> RollbackStep {
        let action = step
            .rollback_steps
            .first()
            .cloned()
            .unwrap_or_else(|| format!("Manually revert changes from step {}", step.id));
        RollbackStep {
            target_step_id: step.id.clone(),
            action,
            expected_duration_minutes: step
                .estimated_duration_minutes
                .div_ceil(2)
                .max(self.config.min_duration_minutes),
        }
    }
}

fn context(rollback: &RollbackPlan) -> LogContext {
    LogContext::step(Some(rollback.plan_id), rollback.failed_step_id.clone())
        .with_rollback(rollback.id)
}
