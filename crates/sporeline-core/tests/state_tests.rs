use proptest::prelude::*;
use sporeline_core::state_machine::{
    allowed_plan_transitions, allowed_rollback_transitions, allowed_step_transitions,
    validate_plan_transition, validate_rollback_transition, validate_step_transition,
};
use sporeline_core::{PipelineError, PlanStatus, RollbackStatus, StepStatus};
use sporeline_test_utils::{arb_plan_status, arb_step_status};

#[test]
fn test_draft_transitions() {
    assert!(validate_plan_transition(PlanStatus::Draft, PlanStatus::PendingApproval).is_ok());

    // Invalid
    assert!(validate_plan_transition(PlanStatus::Draft, PlanStatus::Approved).is_err());
    assert!(validate_plan_transition(PlanStatus::Draft, PlanStatus::Paused).is_err());
}

#[test]
fn test_paused_only_resumes_or_repauses() {
    assert!(validate_plan_transition(PlanStatus::Paused, PlanStatus::Approved).is_ok());
    assert!(validate_plan_transition(PlanStatus::Paused, PlanStatus::Paused).is_ok());
    assert!(validate_plan_transition(PlanStatus::Paused, PlanStatus::Completed).is_err());
    assert!(validate_plan_transition(PlanStatus::Paused, PlanStatus::Rejected).is_err());
}

#[test]
fn test_rollback_chain() {
    assert_eq!(
        allowed_rollback_transitions(RollbackStatus::PendingApproval),
        vec![RollbackStatus::Approved]
    );
    assert!(
        validate_rollback_transition(RollbackStatus::Approved, RollbackStatus::PendingApproval)
            .is_err()
    );
}

#[test]
fn test_step_forward_edges() {
    assert!(validate_step_transition(StepStatus::Pending, StepStatus::Running).is_ok());
    assert!(validate_step_transition(StepStatus::Pending, StepStatus::Completed).is_ok());
    assert!(validate_step_transition(StepStatus::Running, StepStatus::Completed).is_ok());
    assert!(validate_step_transition(StepStatus::Running, StepStatus::Failed).is_ok());
    assert!(validate_step_transition(StepStatus::Failed, StepStatus::Running).is_ok());

    // Invalid
    assert!(validate_step_transition(StepStatus::Running, StepStatus::Pending).is_err());
    assert!(validate_step_transition(StepStatus::Completed, StepStatus::Running).is_err());
}

#[test]
fn test_step_error_names_entity() {
    let err = validate_step_transition(StepStatus::Completed, StepStatus::AwaitingApproval)
        .unwrap_err();
    assert!(matches!(err, PipelineError::IllegalTransition { entity: "step", .. }));
}

proptest! {
    #[test]
    fn prop_validation_matches_table(from in arb_plan_status(), to in arb_plan_status()) {
        let res = validate_plan_transition(from, to);
        let allowed = allowed_plan_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_terminal_states_are_closed(to in arb_plan_status()) {
        prop_assert!(validate_plan_transition(PlanStatus::Rejected, to).is_err());
        prop_assert!(validate_plan_transition(PlanStatus::Completed, to).is_err());
    }

    #[test]
    fn prop_nothing_returns_to_draft(from in arb_plan_status()) {
        prop_assert!(validate_plan_transition(from, PlanStatus::Draft).is_err());
    }

    #[test]
    fn prop_step_validation_matches_table(from in arb_step_status(), to in arb_step_status()) {
        let allowed = allowed_step_transitions(from);
        prop_assert_eq!(validate_step_transition(from, to).is_ok(), allowed.contains(&to));
    }

    #[test]
    fn prop_completed_and_awaiting_steps_are_closed(to in arb_step_status()) {
        prop_assert!(validate_step_transition(StepStatus::Completed, to).is_err());
        prop_assert!(validate_step_transition(StepStatus::AwaitingApproval, to).is_err());
    }

    #[test]
    fn prop_nothing_returns_to_awaiting_approval(from in arb_step_status()) {
        prop_assert!(validate_step_transition(from, StepStatus::AwaitingApproval).is_err());
    }
}
