use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sporeline_core::planner::{dependency_order, detect_resource_conflicts};
use sporeline_core::{
    ApprovalConfig, ExecutionLog, ExecutionPlanner, PipelineError, PlanStatus, StepId, StepStatus,
};
use sporeline_test_utils::{arb_steps, at, equipment, step};
use std::collections::HashSet;
use std::sync::Arc;

fn planner() -> ExecutionPlanner {
    ExecutionPlanner::new(ApprovalConfig::default(), Arc::new(ExecutionLog::default()))
}

#[test]
fn test_shared_autoclave_reported_once() {
    let steps = vec![
        step("sterilize-a").with_resource(equipment("autoclave-1", 1.0)),
        step("sterilize-b").with_resource(equipment("autoclave-1", 1.0)),
    ];
    let plan = planner().sequence_steps(steps);
    assert_eq!(
        plan.resource_conflicts,
        vec!["equipment:autoclave-1 requested 2 across 2 steps".to_string()]
    );
}

#[test]
fn test_distinct_equipment_has_no_conflict() {
    let steps = vec![
        step("a").with_resource(equipment("autoclave-1", 1.0)),
        step("b").with_resource(equipment("autoclave-2", 1.0)),
    ];
    assert!(detect_resource_conflicts(&steps).is_empty());
}

#[test]
fn test_timing_conflicts_in_sequenced_order() {
    let steps = vec![
        step("late").with_window(at(1), at(3)),
        step("early").with_window(at(0), at(2)),
    ];
    let plan = planner().sequence_steps(steps);
    assert_eq!(plan.timing_conflicts, vec!["early overlaps late".to_string()]);
}

#[test]
fn test_approval_stamps_every_step() {
    let planner = planner();
    let plan = planner.sequence_steps(vec![step("a"), step("b"), step("c")]);
    let approved = planner.approve_plan(&plan, "alice").unwrap();

    for s in &approved.steps {
        assert!(s.approved);
        assert_eq!(s.approved_by.as_deref(), Some("alice"));
        assert_eq!(s.status, StepStatus::Pending);
        assert!(s.approved_at.is_some());
    }
    assert_eq!(approved.status, PlanStatus::Approved);
}

#[test]
fn test_cycle_error_names_steps() {
    let plan = planner().sequence_steps(vec![
        step("x").depends_on("y"),
        step("y").depends_on("x"),
    ]);
    let err = dependency_order(&plan).unwrap_err();
    assert!(matches!(err, PipelineError::DependencyCycle(ref ids) if ids.len() == 2));
    assert!(!err.is_retryable());
}

proptest! {
    #[test]
    fn prop_sequencing_is_deterministic(
        (steps, shuffled) in arb_steps(10)
            .prop_flat_map(|s| (Just(s.clone()), Just(s).prop_shuffle()))
    ) {
        let planner = planner();
        let a = planner.sequence_steps(steps);
        let b = planner.sequence_steps(shuffled);

        let ids_a: Vec<&StepId> = a.step_ids().collect();
        let ids_b: Vec<&StepId> = b.step_ids().collect();
        prop_assert_eq!(ids_a, ids_b);
        prop_assert_eq!(a.resource_conflicts, b.resource_conflicts);
    }

    #[test]
    fn prop_order_is_by_dependency_count_then_id(steps in arb_steps(10)) {
        let plan = planner().sequence_steps(steps);
        for pair in plan.steps.windows(2) {
            let key = |s: &sporeline_core::ExecutionStep| (s.dependencies.len(), s.id.clone());
            prop_assert!(key(&pair[0]) <= key(&pair[1]));
        }
    }

    #[test]
    fn prop_one_conflict_per_contended_key(steps in arb_steps(10)) {
        let conflicts = detect_resource_conflicts(&steps);
        let keys: HashSet<&str> = conflicts
            .iter()
            .filter_map(|c| c.split(' ').next())
            .collect();
        prop_assert_eq!(keys.len(), conflicts.len());
    }

    #[test]
    fn prop_topological_order_respects_dependencies(steps in arb_steps(10)) {
        let plan = planner().sequence_steps(steps);
        if let Ok(order) = dependency_order(&plan) {
            prop_assert_eq!(order.len(), plan.steps.len());
            let pos = |id: &StepId| order.iter().position(|o| o == id);
            for s in &plan.steps {
                for dep in &s.dependencies {
                    if let Some(p) = pos(dep) {
                        prop_assert!(p < pos(&s.id).unwrap());
                    }
                }
            }
        }
    }
}
