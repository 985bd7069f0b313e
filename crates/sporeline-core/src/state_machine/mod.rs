//! Lifecycle transition tables for plans, steps and rollback plans

use crate::error::{PipelineError, PipelineResult};
use crate::types::{PlanStatus, RollbackStatus, StepStatus};

/// Validate a plan status transition
///
/// # Errors
/// Returns `PipelineError::IllegalTransition` when `to` is not reachable from `from`.
pub fn validate_plan_transition(from: PlanStatus, to: PlanStatus) -> PipelineResult<()> {
    if allowed_plan_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::illegal_transition("plan", from, to))
    }
}

/// Statuses reachable from `from` in one step
#[must_use]
pub fn allowed_plan_transitions(from: PlanStatus) -> Vec<PlanStatus> {
    use PlanStatus::*;
    match from {
        Draft => vec![PendingApproval],
        // re-sequencing keeps the plan pending
        PendingApproval => vec![Approved, Rejected, PendingApproval],
        Approved => vec![Paused, Completed],
        // repeated monitor ticks may re-pause
        Paused => vec![Approved, Paused],
        Rejected | Completed => vec![],
    }
}

/// Validate a rollback status transition
///
/// # Errors
/// Returns `PipelineError::IllegalTransition` when `to` is not the next status.
pub fn validate_rollback_transition(
    from: RollbackStatus,
    to: RollbackStatus,
) -> PipelineResult<()> {
    if allowed_rollback_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::illegal_transition("rollback", from, to))
    }
}

/// Rollback statuses reachable from `from` in one step
#[must_use]
pub fn allowed_rollback_transitions(from: RollbackStatus) -> Vec<RollbackStatus> {
    use RollbackStatus::*;
    match from {
        PendingApproval => vec![Approved],
        Approved => vec![Completed],
        Completed => vec![],
    }
}

/// Validate a step status change requested through the monitor
///
/// Plan approval and manual overrides move steps outside this table.
///
/// # Errors
/// Returns `PipelineError::IllegalTransition` when `to` is not reachable from `from`.
pub fn validate_step_transition(from: StepStatus, to: StepStatus) -> PipelineResult<()> {
    if allowed_step_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PipelineError::illegal_transition("step", from, to))
    }
}

/// Step statuses a monitor request may reach from `from`
#[must_use]
pub fn allowed_step_transitions(from: StepStatus) -> Vec<StepStatus> {
    use StepStatus::*;
    match from {
        // left only through plan approval
        AwaitingApproval => vec![],
        Pending => vec![Running, Completed, Failed],
        Running => vec![Completed, Failed],
        // retry
        Failed => vec![Pending, Running],
        Completed => vec![],
    }
}
