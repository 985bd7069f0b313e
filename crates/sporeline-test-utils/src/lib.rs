//! Testing utilities for the Sporeline workspace
//!
//! Shared fixtures, ready-made plans and proptest strategies.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use sporeline_core::{
    EngineInput, EnvironmentBounds, ExecutionPlan, ExecutionService, ExecutionStep,
    LaborAssignment, PipelineConfig, PlanStatus, ResourceCategory, ResourceNeed, ScheduledTask,
    StepSource, StepStatus, TelemetrySnapshot, TelemetryWatch, WorkflowGroup, WorkflowPlan,
};

/// Fixed reference time (2026-03-02 06:00 UTC) plus `hours`
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn scheduled_task(id: &str, order: u32, equipment: &[&str]) -> ScheduledTask {
    ScheduledTask {
        id: id.to_string(),
        name: format!("Task {id}"),
        species: "oyster".to_string(),
        room: "room-a".to_string(),
        assigned_labor: Some(LaborAssignment {
            role: "grower".to_string(),
            headcount: 1.0,
        }),
        assigned_equipment: equipment.iter().map(ToString::to_string).collect(),
        sequence_order: order,
        scheduled_start: None,
        scheduled_end: None,
    }
}

pub fn workflow_plan(tasks: Vec<ScheduledTask>, groups: &[(&str, &[&str])]) -> WorkflowPlan {
    WorkflowPlan {
        id: "wp-test".to_string(),
        schedule: tasks,
        workflows: groups
            .iter()
            .map(|(name, ids)| WorkflowGroup {
                name: (*name).to_string(),
                task_ids: ids.iter().map(ToString::to_string).collect(),
            })
            .collect(),
    }
}

/// Two sequential tasks in one group, each on its own equipment
pub fn two_task_workflow() -> WorkflowPlan {
    workflow_plan(
        vec![
            scheduled_task("t1", 1, &["mixer-1"]),
            scheduled_task("t2", 2, &["autoclave-1"]),
        ],
        &[("oyster-fruiting", &["t1", "t2"])],
    )
}

pub fn two_task_input() -> EngineInput {
    EngineInput::new().with_workflow(two_task_workflow())
}

/// Step with the standard cultivation watch record
pub fn step(id: &str) -> ExecutionStep {
    ExecutionStep::new(id, StepSource::WorkflowPlan, format!("Step {id}"))
        .with_watch(TelemetryWatch::standard())
}

pub fn equipment(name: &str, quantity: f64) -> ResourceNeed {
    ResourceNeed::new(name, ResourceCategory::Equipment, quantity, "unit")
}

pub fn nominal_telemetry() -> TelemetrySnapshot {
    TelemetrySnapshot::new()
        .with_temperature(20.0)
        .with_humidity(85.0)
        .with_co2(1200.0)
        .with_contamination_risk(10.0)
        .with_equipment_load(40.0)
        .with_labor_utilization(50.0)
}

pub fn contaminated(score: f64) -> TelemetrySnapshot {
    nominal_telemetry().with_contamination_risk(score)
}

pub fn service() -> ExecutionService {
    ExecutionService::new(PipelineConfig::default()).unwrap()
}

/// Sequence and approve `steps` inside `service`
pub fn approved_plan(service: &ExecutionService, steps: Vec<ExecutionStep>) -> ExecutionPlan {
    let plan = service.sequence(steps);
    service.approve(plan.id, "alice").unwrap()
}

pub fn arb_step_status() -> impl Strategy<Value = StepStatus> {
    prop_oneof![
        Just(StepStatus::AwaitingApproval),
        Just(StepStatus::Pending),
        Just(StepStatus::Running),
        Just(StepStatus::Completed),
        Just(StepStatus::Failed),
    ]
}

pub fn arb_plan_status() -> impl Strategy<Value = PlanStatus> {
    prop_oneof![
        Just(PlanStatus::Draft),
        Just(PlanStatus::PendingApproval),
        Just(PlanStatus::Approved),
        Just(PlanStatus::Rejected),
        Just(PlanStatus::Paused),
        Just(PlanStatus::Completed),
    ]
}

pub fn arb_telemetry() -> impl Strategy<Value = TelemetrySnapshot> {
    (
        proptest::option::of(-5.0f64..45.0),
        proptest::option::of(0.0f64..100.0),
        proptest::option::of(0.0f64..120.0),
        proptest::option::of(0.0f64..120.0),
        proptest::collection::vec("[a-z-]{3,12}", 0..3),
    )
        .prop_map(|(temp, contamination, equipment, labor, regressions)| TelemetrySnapshot {
            temperature_c: temp,
            contamination_risk_score: contamination,
            equipment_load_pct: equipment,
            labor_utilization_pct: labor,
            regression_signals: regressions,
            ..TelemetrySnapshot::default()
        })
}

pub fn arb_watch() -> impl Strategy<Value = TelemetryWatch> {
    (
        proptest::option::of(40.0f64..100.0),
        proptest::option::of(50.0f64..100.0),
        proptest::option::of(50.0f64..100.0),
        proptest::option::of((0.0f64..15.0, 20.0f64..35.0)),
    )
        .prop_map(|(contamination, equipment, labor, temps)| TelemetryWatch {
            contamination_risk_max: contamination,
            equipment_load_max: equipment,
            labor_utilization_max: labor,
            environment: temps.map(|(min, max)| EnvironmentBounds {
                temp_min: Some(min),
                temp_max: Some(max),
                ..EnvironmentBounds::default()
            }),
        })
}

/// Steps with unique ids, random dependencies and random resource demand
pub fn arb_steps(max: usize) -> impl Strategy<Value = Vec<ExecutionStep>> {
    proptest::collection::btree_set("[a-z]{1,6}", 0..max).prop_flat_map(|ids| {
        let ids: Vec<String> = ids.into_iter().collect();
        let n = ids.len();
        (
            Just(ids),
            proptest::collection::vec(
                (
                    proptest::collection::vec(0..n.max(1), 0..3),
                    proptest::option::of(0usize..3),
                ),
                n,
            ),
        )
            .prop_map(|(ids, shapes)| {
                ids.iter()
                    .zip(shapes)
                    .map(|(id, (deps, resource))| {
                        let mut s = step(id);
                        for d in deps.into_iter().filter(|d| *d < ids.len()) {
                            s = s.depends_on(ids[d].as_str());
                        }
                        if let Some(r) = resource {
                            s = s.with_resource(equipment(&format!("rig-{r}"), 1.0));
                        }
                        s
                    })
                    .collect()
            })
    })
}
