//! Scripted pipeline runs
//!
//! A scenario ingests one engine input, sequences and approves the plan,
//! then replays a list of operator and monitor events against it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sporeline_core::{
    EngineInput, ExecutionPlan, ExecutionService, ExecutionStatusReport, GateDecision, LogExport,
    PlanStatus, RollbackPlan, StepId, StepStatus, TelemetrySnapshot,
};

fn default_approver() -> String {
    "operations".to_string()
}

/// Scenario file
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Scenario {
    /// Upstream artifacts
    pub(crate) input: EngineInput,
    /// Who approves the plan
    #[serde(default = "default_approver")]
    pub(crate) approver: String,
    /// Events replayed in order
    #[serde(default)]
    pub(crate) events: Vec<ScenarioEvent>,
    /// Generate a rollback if the plan ends paused
    #[serde(default)]
    pub(crate) rollback_on_pause: bool,
}

/// One replayed event
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub(crate) enum ScenarioEvent {
    /// Monitor tick
    Monitor {
        #[serde(default)]
        telemetry: Option<TelemetrySnapshot>,
    },
    /// Step status request
    UpdateStep {
        step: StepId,
        status: StepStatus,
        #[serde(default)]
        telemetry: Option<TelemetrySnapshot>,
    },
    /// Resume a paused plan
    Resume { operator: String, reason: String },
}

/// Outcome of one step request
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StepOutcome {
    step: StepId,
    requested: StepStatus,
    applied: bool,
    decision: Option<GateDecision>,
    plan_status: PlanStatus,
}

/// Everything a scenario produced
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScenarioReport {
    plan: ExecutionPlan,
    reports: Vec<ExecutionStatusReport>,
    step_updates: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback: Option<RollbackPlan>,
    log: LogExport,
}

impl ScenarioReport {
    pub(crate) fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }
}

/// Replay a scenario against a fresh service
pub(crate) fn run(service: &ExecutionService, scenario: &Scenario) -> Result<ScenarioReport> {
    let steps = service.ingest(&scenario.input);
    let plan = service.sequence(steps);
    let plan_id = plan.id;
    service
        .approve(plan_id, &scenario.approver)
        .context("approving scenario plan")?;

    let mut reports = Vec::new();
    let mut step_updates = Vec::new();

    for (index, event) in scenario.events.iter().enumerate() {
        match event {
            ScenarioEvent::Monitor { telemetry } => {
                let outcome = service
                    .monitor_tick(plan_id, telemetry.as_ref())
                    .with_context(|| format!("event {index}: monitor tick"))?;
                reports.push(outcome.report);
            }
            ScenarioEvent::UpdateStep {
                step,
                status,
                telemetry,
            } => {
                let update = service
                    .update_step(plan_id, step, *status, telemetry.as_ref())
                    .with_context(|| format!("event {index}: update {step} to {status}"))?;
                step_updates.push(StepOutcome {
                    step: step.clone(),
                    requested: *status,
                    applied: update.applied,
                    decision: update.gate.map(|g| g.decision),
                    plan_status: update.plan.status,
                });
            }
            ScenarioEvent::Resume { operator, reason } => {
                service
                    .resume(plan_id, operator, reason)
                    .with_context(|| format!("event {index}: resume"))?;
            }
        }
    }

    let plan = service.plan(plan_id)?;
    let rollback = match plan.steps.iter().find(|s| s.status != StepStatus::Completed) {
        Some(failing) if scenario.rollback_on_pause && plan.status == PlanStatus::Paused => {
            let reason = plan
                .paused_reason
                .clone()
                .unwrap_or_else(|| "plan paused".to_string());
            Some(service.generate_rollback(plan_id, &failing.id, &reason)?)
        }
        _ => None,
    };

    tracing::info!(plan = %plan.id, status = %plan.status, "scenario finished");
    Ok(ScenarioReport {
        plan,
        reports,
        step_updates,
        rollback,
        log: service.export_log(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sporeline_core::PipelineConfig;

    const SCENARIO: &str = r#"{
        "input": {
            "workflow_plan": {
                "id": "wp-1",
                "schedule": [
                    {"id": "t1", "name": "Inoculate", "species": "oyster", "room": "room-a",
                     "assigned_labor": null, "assigned_equipment": ["mixer-1"], "sequence_order": 1,
                     "scheduled_start": null, "scheduled_end": null},
                    {"id": "t2", "name": "Incubate", "species": "oyster", "room": "room-a",
                     "assigned_labor": null, "assigned_equipment": ["rack-2"], "sequence_order": 2,
                     "scheduled_start": null, "scheduled_end": null}
                ],
                "workflows": [{"name": "oyster", "task_ids": ["t1", "t2"]}]
            }
        },
        "approver": "alice",
        "rollback_on_pause": true,
        "events": [
            {"action": "update-step", "step": "wf-t1", "status": "running",
             "telemetry": {"temperature_c": 20.0}},
            {"action": "update-step", "step": "wf-t1", "status": "completed"},
            {"action": "monitor", "telemetry": {"contamination_risk_score": 92.0}}
        ]
    }"#;

    #[test]
    fn scenario_pauses_and_rolls_back() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let service = ExecutionService::new(PipelineConfig::default()).unwrap();
        let report = run(&service, &scenario).unwrap();

        assert_eq!(report.plan().status, PlanStatus::Paused);
        assert_eq!(report.step_updates.len(), 2);
        assert!(report.step_updates.iter().all(|u| u.applied));

        let rollback = report.rollback.as_ref().unwrap();
        let targets: Vec<&str> = rollback.steps.iter().map(|s| s.target_step_id.as_str()).collect();
        assert_eq!(targets, vec!["wf-t2", "wf-t1"]);
    }

    #[test]
    fn bad_step_reports_event_index() {
        let mut scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        scenario.events = vec![ScenarioEvent::UpdateStep {
            step: StepId::new("wf-missing"),
            status: StepStatus::Running,
            telemetry: None,
        }];
        let service = ExecutionService::new(PipelineConfig::default()).unwrap();
        let err = run(&service, &scenario).unwrap_err();
        assert!(format!("{err:#}").contains("event 0"));
    }
}
