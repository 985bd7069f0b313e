use proptest::prelude::*;
use sporeline_core::gate::{decide, GateOptions};
use sporeline_core::{ExecutionStep, GateDecision, StepSource, TelemetrySnapshot};
use sporeline_test_utils::{arb_telemetry, arb_watch, nominal_telemetry, step};

fn unbounded_step() -> ExecutionStep {
    ExecutionStep::new("sim-check-x", StepSource::SimulationInsight, "review")
}

fn decision_at(step: &ExecutionStep, score: f64) -> GateDecision {
    let telemetry = TelemetrySnapshot::new().with_contamination_risk(score);
    decide(step, Some(&telemetry), &GateOptions::default()).decision
}

#[test]
fn test_default_thresholds_on_global_path() {
    let s = unbounded_step();
    assert_eq!(decision_at(&s, 0.0), GateDecision::Allow);
    assert_eq!(decision_at(&s, 69.99), GateDecision::Allow);
    assert_eq!(decision_at(&s, 70.0), GateDecision::Warn);
    assert_eq!(decision_at(&s, 84.99), GateDecision::Warn);
    assert_eq!(decision_at(&s, 85.0), GateDecision::Block);
    assert_eq!(decision_at(&s, 100.0), GateDecision::Block);
}

#[test]
fn test_step_ceiling_path() {
    // standard ceiling is 80, strict
    let s = step("wf-t1");
    assert_eq!(decision_at(&s, 80.0), GateDecision::Allow);
    assert_eq!(decision_at(&s, 80.5), GateDecision::Warn);
    assert_eq!(decision_at(&s, 90.0), GateDecision::Block);
}

#[test]
fn test_nominal_telemetry_allows_standard_step() {
    let result = decide(&step("wf-t1"), Some(&nominal_telemetry()), &GateOptions::default());
    assert_eq!(result.decision, GateDecision::Allow);
    assert!(result.alternatives.is_empty());
}

proptest! {
    #[test]
    fn prop_emergency_stop_always_blocks(
        watch in arb_watch(),
        telemetry in proptest::option::of(arb_telemetry()),
    ) {
        let s = unbounded_step().with_watch(watch);
        let result = decide(&s, telemetry.as_ref(), &GateOptions::default().emergency());
        prop_assert_eq!(result.decision, GateDecision::Block);
        prop_assert!(result.checks.emergency_stop);
        prop_assert_eq!(result.rationale.len(), 1);
    }

    #[test]
    fn prop_severity_monotonic_in_contamination(
        a in 0.0f64..100.0,
        b in 0.0f64..100.0,
        bounded in any::<bool>(),
    ) {
        let s = if bounded { step("wf-t1") } else { unbounded_step() };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(decision_at(&s, lo) <= decision_at(&s, hi));
    }

    #[test]
    fn prop_flags_match_decision(
        watch in arb_watch(),
        telemetry in arb_telemetry(),
    ) {
        let s = unbounded_step().with_watch(watch);
        let result = decide(&s, Some(&telemetry), &GateOptions::default());
        let c = result.checks;

        if c.environmental_limit {
            prop_assert_eq!(result.decision, GateDecision::Block);
        }
        if c.labor_mismatch || c.equipment_overload || c.regression_detected {
            prop_assert!(result.decision >= GateDecision::Warn);
        }
        if result.decision == GateDecision::Allow {
            prop_assert!(!c.environmental_limit && !c.labor_mismatch && !c.equipment_overload);
        }
        prop_assert!(!c.emergency_stop);
    }
}
