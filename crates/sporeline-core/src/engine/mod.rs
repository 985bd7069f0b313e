//! Execution Engine
//!
//! Compiles heterogeneous upstream artifacts into a normalized, id-sorted
//! list of step proposals. Step ids are derived from the upstream record
//! they came from, so ingesting the same input twice yields equal lists.
//!
//! Workflow tasks in the same group depend on every other member of the
//! group. That full mesh conservatively serializes same-workflow work; it is
//! not a precedence graph, and [`crate::planner::dependency_order`] reports
//! it as a cycle.

use crate::config::ApprovalConfig;
use crate::logging::{ExecutionLog, LogCategory, LogContext};
use crate::types::{
    ExecutionPlan, ExecutionStep, PlanId, PlanStatus, ResourceCategory, ResourceNeed,
    RiskLevel, SafetyCheck, StepId, StepSource, TelemetryWatch,
};
use crate::upstream::{
    AllocationCategory, AllocationPlan, EngineInput, InsightSignal, ResourceAllocation,
    ScheduledTask, StrategyPlan, StrategyProposal, WorkflowPlan,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

const STRATEGY_DURATION_MINUTES: u32 = 60;
const ALLOCATION_DURATION_MINUTES: u32 = 30;
const STRATEGY_FALLBACK_ROLLBACK: &str = "Restore previous configuration";

/// Synthetic review checkpoint kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checkpoint {
    Simulation,
    Refinement,
    Orchestrator,
    Baseline,
}

impl Checkpoint {
    fn prefix(self) -> &'static str {
        match self {
            Self::Simulation => "sim-check",
            Self::Refinement => "refine-check",
            Self::Orchestrator => "orchestrator-check",
            Self::Baseline => "baseline-check",
        }
    }

    fn source(self) -> StepSource {
        match self {
            Self::Simulation => StepSource::SimulationInsight,
            Self::Refinement => StepSource::RefinementInsight,
            Self::Orchestrator | Self::Baseline => StepSource::FacilityOrchestrator,
        }
    }

    fn duration(self) -> u32 {
        match self {
            Self::Simulation | Self::Refinement => 20,
            Self::Orchestrator | Self::Baseline => 15,
        }
    }

    fn checks(self) -> [SafetyCheck; 2] {
        match self {
            Self::Simulation => [SafetyCheck::RegressionReview, SafetyCheck::TelemetryDeviation],
            Self::Refinement => [SafetyCheck::RegressionReview, SafetyCheck::ContaminationRisk],
            Self::Orchestrator => [SafetyCheck::StabilityReview, SafetyCheck::EquipmentOverload],
            Self::Baseline => [SafetyCheck::TelemetryDeviation, SafetyCheck::EnvironmentalLimit],
        }
    }

    fn title(self, summary: &str) -> String {
        match self {
            Self::Simulation => format!("Validate simulation insight: {summary}"),
            Self::Refinement => format!("Validate refinement insight: {summary}"),
            Self::Orchestrator => format!("Facility stability check: {summary}"),
            Self::Baseline => format!("Telemetry baseline check: {summary}"),
        }
    }
}

/// Execution engine
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    log: Arc<ExecutionLog>,
    approval: ApprovalConfig,
}

impl ExecutionEngine {
    /// Create engine
    #[must_use]
    pub fn new(approval: ApprovalConfig, log: Arc<ExecutionLog>) -> Self {
        Self { log, approval }
    }

    /// Compile every present upstream artifact into step proposals
    ///
    /// Output is sorted by step id. One `ingest` entry is logged with the
    /// total and per-source counts.
    pub fn ingest(&self, input: &EngineInput) -> Vec<ExecutionStep> {
        let mut steps = Vec::new();

        if let Some(plan) = &input.workflow_plan {
            steps.extend(workflow_steps(plan));
        }
        if let Some(plan) = &input.strategy_plan {
            steps.extend(strategy_steps(plan));
        }
        if let Some(plan) = &input.allocation_plan {
            steps.extend(allocation_steps(plan));
        }

        let checkpoints = [
            (Checkpoint::Simulation, &input.simulation_insight),
            (Checkpoint::Refinement, &input.refinement_insight),
            (Checkpoint::Orchestrator, &input.orchestrator_signal),
            (Checkpoint::Baseline, &input.telemetry_baseline),
        ];
        for (kind, signal) in checkpoints {
            if let Some(signal) = signal {
                steps.push(checkpoint_step(kind, signal));
            }
        }

        steps.sort_by(|a, b| a.id.cmp(&b.id));

        let mut by_source: BTreeMap<&'static str, usize> = BTreeMap::new();
        for step in &steps {
            *by_source.entry(step.source.as_str()).or_default() += 1;
        }

        tracing::info!(total = steps.len(), "ingested upstream plans");
        self.log.record(
            LogCategory::Ingest,
            format!("Ingested {} step proposals", steps.len()),
            LogContext::empty(),
            Some(serde_json::json!({
                "total": steps.len(),
                "by_source": by_source,
            })),
        );

        steps
    }

    /// Wrap raw steps into a draft plan
    ///
    /// No conflict detection happens here; that is the planner's job.
    pub fn build_draft_plan(&self, steps: Vec<ExecutionStep>) -> ExecutionPlan {
        let now = Utc::now();
        let plan = ExecutionPlan {
            id: PlanId::new(),
            dependencies: dependency_map(&steps),
            approval_required: approval_roles(&steps, &self.approval),
            steps,
            resource_conflicts: Vec::new(),
            timing_conflicts: Vec::new(),
            status: PlanStatus::Draft,
            version: 1,
            manual_overrides: Vec::new(),
            created_at: now,
            updated_at: now,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            paused_reason: None,
        };

        self.log.record(
            LogCategory::Planning,
            format!("Built draft plan with {} steps", plan.steps.len()),
            LogContext::plan(plan.id),
            None,
        );

        plan
    }
}

/// Step id → declared dependencies
#[must_use]
pub fn dependency_map(steps: &[ExecutionStep]) -> BTreeMap<StepId, Vec<StepId>> {
    steps
        .iter()
        .map(|s| (s.id.clone(), s.dependencies.clone()))
        .collect()
}

/// Roles that must sign off on a set of steps
///
/// Operations always; quality when any step checks contamination risk;
/// strategy when any step came from a strategy plan.
#[must_use]
pub fn approval_roles(steps: &[ExecutionStep], config: &ApprovalConfig) -> Vec<String> {
    let mut roles = vec![config.operations_role.clone()];

    let checks_contamination = steps
        .iter()
        .any(|s| s.safety_checks.contains(&SafetyCheck::ContaminationRisk));
    if checks_contamination {
        roles.push(config.quality_role.clone());
    }
    if steps.iter().any(|s| s.source == StepSource::StrategyPlan) {
        roles.push(config.strategy_role.clone());
    }

    let mut seen = HashSet::new();
    roles.retain(|r| seen.insert(r.clone()));
    roles
}

fn workflow_steps(plan: &WorkflowPlan) -> impl Iterator<Item = ExecutionStep> + '_ {
    plan.schedule.iter().map(|task| workflow_step(plan, task))
}

fn workflow_step(plan: &WorkflowPlan, task: &ScheduledTask) -> ExecutionStep {
    let mut step = ExecutionStep::new(
        workflow_step_id(&task.id),
        StepSource::WorkflowPlan,
        format!("{} ({})", task.name, task.room),
    )
    .with_source_ref(task.id.clone())
    .with_duration(task.sequence_order.saturating_mul(15).max(30))
    .with_checks([
        SafetyCheck::TelemetryDeviation,
        SafetyCheck::ContaminationRisk,
        SafetyCheck::EquipmentOverload,
        SafetyCheck::LaborMismatch,
    ])
    .with_watch(TelemetryWatch::standard())
    .with_rollback(format!(
        "Return {} to previous {} stage",
        task.room, task.species
    ))
    .with_rollback("Release assigned equipment");

    step.scheduled_start = task.scheduled_start;
    step.scheduled_end = task.scheduled_end;

    if let Some(labor) = &task.assigned_labor {
        step = step.with_resource(ResourceNeed::new(
            labor.role.clone(),
            ResourceCategory::Labor,
            labor.headcount,
            "crew",
        ));
    }
    for equipment in &task.assigned_equipment {
        step = step.with_resource(ResourceNeed::new(
            equipment.clone(),
            ResourceCategory::Equipment,
            1.0,
            "unit",
        ));
    }

    if let Some(group) = plan.group_of(&task.id) {
        for other in group.task_ids.iter().filter(|t| *t != &task.id) {
            step = step.depends_on(workflow_step_id(other));
        }
    }

    step
}

fn workflow_step_id(task_id: &str) -> StepId {
    StepId::new(format!("wf-{task_id}"))
}

fn strategy_steps(plan: &StrategyPlan) -> impl Iterator<Item = ExecutionStep> + '_ {
    plan.proposals.iter().map(strategy_step)
}

fn strategy_step(proposal: &StrategyProposal) -> ExecutionStep {
    let ceiling = match proposal.risk_level {
        RiskLevel::High => 85.0,
        RiskLevel::Medium => 80.0,
        RiskLevel::Low => 70.0,
    };
    let rollback = proposal
        .implementation_steps
        .first()
        .map_or(STRATEGY_FALLBACK_ROLLBACK, String::as_str);

    ExecutionStep::new(
        format!("strategy-{}", proposal.id),
        StepSource::StrategyPlan,
        proposal.title.clone(),
    )
    .with_source_ref(proposal.id.clone())
    .with_duration(STRATEGY_DURATION_MINUTES)
    .with_checks([SafetyCheck::TelemetryDeviation, SafetyCheck::ContaminationRisk])
    .with_watch(TelemetryWatch::default().with_contamination_max(ceiling))
    .with_rollback(rollback)
}

fn allocation_steps(plan: &AllocationPlan) -> impl Iterator<Item = ExecutionStep> + '_ {
    plan.allocations.iter().map(allocation_step)
}

fn allocation_step(allocation: &ResourceAllocation) -> ExecutionStep {
    let (category, check) = match allocation.category {
        AllocationCategory::Labor => (ResourceCategory::Labor, SafetyCheck::LaborMismatch),
        _ => (ResourceCategory::Material, SafetyCheck::EquipmentOverload),
    };
    let quantity = allocation.allocated_quantity;

    ExecutionStep::new(
        format!("alloc-{}", allocation.id),
        StepSource::ResourceAllocation,
        format!(
            "Allocate {quantity} {} of {}",
            allocation.unit, allocation.resource_name
        ),
    )
    .with_source_ref(allocation.id.clone())
    .with_duration(ALLOCATION_DURATION_MINUTES)
    .depends_on(format!("req-{}", allocation.requirement_id))
    .with_resource(ResourceNeed::new(
        allocation.resource_name.clone(),
        category,
        quantity,
        allocation.unit.clone(),
    ))
    .with_checks([check])
    .with_watch(TelemetryWatch::standard())
    .with_rollback(format!(
        "Release {quantity} {} of {}",
        allocation.unit, allocation.resource_name
    ))
}

fn checkpoint_step(kind: Checkpoint, signal: &InsightSignal) -> ExecutionStep {
    ExecutionStep::new(
        format!("{}-{}", kind.prefix(), signal.id),
        kind.source(),
        kind.title(&signal.summary),
    )
    .with_source_ref(signal.id.clone())
    .with_duration(kind.duration())
    .with_checks(kind.checks())
    .with_watch(TelemetryWatch::standard())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepStatus;
    use crate::upstream::{LaborAssignment, WorkflowGroup};

    fn engine() -> (ExecutionEngine, Arc<ExecutionLog>) {
        let log = Arc::new(ExecutionLog::default());
        (ExecutionEngine::new(ApprovalConfig::default(), Arc::clone(&log)), log)
    }

    fn task(id: &str, order: u32, equipment: &[&str]) -> ScheduledTask {
        ScheduledTask {
            id: id.to_string(),
            name: format!("Task {id}"),
            species: "oyster".to_string(),
            room: "room-a".to_string(),
            assigned_labor: Some(LaborAssignment {
                role: "grower".to_string(),
                headcount: 2.0,
            }),
            assigned_equipment: equipment.iter().map(ToString::to_string).collect(),
            sequence_order: order,
            scheduled_start: None,
            scheduled_end: None,
        }
    }

    fn workflow() -> WorkflowPlan {
        WorkflowPlan {
            id: "wp-1".to_string(),
            schedule: vec![
                task("t1", 1, &["mixer-1"]),
                task("t2", 2, &["autoclave-1"]),
                task("t3", 4, &[]),
            ],
            workflows: vec![WorkflowGroup {
                name: "fruiting".to_string(),
                task_ids: vec!["t1".to_string(), "t2".to_string(), "t3".to_string()],
            }],
        }
    }

    #[test]
    fn workflow_tasks_become_steps() {
        let (engine, _) = engine();
        let steps = engine.ingest(&EngineInput::new().with_workflow(workflow()));

        assert_eq!(steps.len(), 3);
        let t1 = &steps[0];
        assert_eq!(t1.id.as_str(), "wf-t1");
        assert_eq!(t1.estimated_duration_minutes, 30);
        assert_eq!(steps[2].estimated_duration_minutes, 60);
        assert_eq!(t1.dependencies, vec![StepId::new("wf-t2"), StepId::new("wf-t3")]);
        assert_eq!(t1.resources.len(), 2);
        assert_eq!(t1.resources[0].category, ResourceCategory::Labor);
        assert_eq!(t1.resources[0].quantity, 2.0);
        assert_eq!(t1.rollback_steps[0], "Return room-a to previous oyster stage");
        assert_eq!(t1.telemetry_watch, TelemetryWatch::standard());
        assert_eq!(t1.status, StepStatus::AwaitingApproval);
        assert!(t1.requires_approval);
    }

    #[test]
    fn strategy_ceiling_follows_risk() {
        let (engine, _) = engine();
        let plan = StrategyPlan {
            id: "sp-1".to_string(),
            proposals: vec![
                StrategyProposal {
                    id: "p-low".to_string(),
                    proposal_type: "species-mix".to_string(),
                    title: "Add lion's mane".to_string(),
                    description: String::new(),
                    risk_level: RiskLevel::Low,
                    implementation_steps: vec![],
                },
                StrategyProposal {
                    id: "p-high".to_string(),
                    proposal_type: "capacity-expansion".to_string(),
                    title: "Open room C".to_string(),
                    description: String::new(),
                    risk_level: RiskLevel::High,
                    implementation_steps: vec!["Close room C".to_string()],
                },
            ],
        };
        let steps = engine.ingest(&EngineInput::new().with_strategy(plan));

        assert_eq!(steps[0].id.as_str(), "strategy-p-high");
        assert_eq!(steps[0].telemetry_watch.contamination_risk_max, Some(85.0));
        assert_eq!(steps[0].rollback_steps, vec!["Close room C"]);
        assert_eq!(steps[1].telemetry_watch.contamination_risk_max, Some(70.0));
        assert_eq!(steps[1].rollback_steps, vec![STRATEGY_FALLBACK_ROLLBACK]);
        assert_eq!(steps[1].estimated_duration_minutes, 60);
    }

    #[test]
    fn allocations_map_category_and_marker() {
        let (engine, _) = engine();
        let plan = AllocationPlan {
            id: "ap-1".to_string(),
            allocations: vec![
                ResourceAllocation {
                    id: "a1".to_string(),
                    requirement_id: "r1".to_string(),
                    category: AllocationCategory::Energy,
                    resource_name: "boiler".to_string(),
                    requested_quantity: 5.0,
                    allocated_quantity: 4.0,
                    unit: "kwh".to_string(),
                },
                ResourceAllocation {
                    id: "a2".to_string(),
                    requirement_id: "r2".to_string(),
                    category: AllocationCategory::Labor,
                    resource_name: "harvester".to_string(),
                    requested_quantity: 3.0,
                    allocated_quantity: 3.0,
                    unit: "crew".to_string(),
                },
            ],
        };
        let steps = engine.ingest(&EngineInput::new().with_allocations(plan));

        assert_eq!(steps[0].resources[0].category, ResourceCategory::Material);
        assert_eq!(steps[0].resources[0].quantity, 4.0);
        assert_eq!(steps[0].dependencies, vec![StepId::new("req-r1")]);
        assert_eq!(steps[0].safety_checks, vec![SafetyCheck::EquipmentOverload]);
        assert_eq!(steps[0].rollback_steps, vec!["Release 4 kwh of boiler"]);
        assert_eq!(steps[1].resources[0].category, ResourceCategory::Labor);
        assert_eq!(steps[1].safety_checks, vec![SafetyCheck::LaborMismatch]);
    }

    #[test]
    fn signals_become_checkpoints() {
        let (engine, log) = engine();
        let input = EngineInput::new()
            .with_simulation_insight(InsightSignal::new("s1", "yield dip"))
            .with_refinement_insight(InsightSignal::new("r1", "substrate tweak"))
            .with_orchestrator_signal(InsightSignal::new("o1", "hvac cycling"))
            .with_telemetry_baseline(InsightSignal::new("b1", "weekly baseline"));
        let steps = engine.ingest(&input);

        let ids: Vec<&str> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["baseline-check-b1", "orchestrator-check-o1", "refine-check-r1", "sim-check-s1"]
        );
        assert_eq!(steps[0].estimated_duration_minutes, 15);
        assert_eq!(steps[3].estimated_duration_minutes, 20);
        assert_eq!(steps[1].source, StepSource::FacilityOrchestrator);

        let entries = log.list(Some(LogCategory::Ingest));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details.as_ref().unwrap()["total"], 4);
    }

    #[test]
    fn empty_input_yields_no_steps() {
        let (engine, _) = engine();
        let steps = engine.ingest(&EngineInput::new());
        assert!(steps.is_empty());
        let plan = engine.build_draft_plan(steps);
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.approval_required, vec!["operations"]);
    }

    #[test]
    fn draft_plan_precomputes_dependencies_and_roles() {
        let (engine, _) = engine();
        let steps = engine.ingest(&EngineInput::new().with_workflow(workflow()));
        let plan = engine.build_draft_plan(steps);

        assert_eq!(plan.version, 1);
        assert_eq!(plan.dependencies.len(), 3);
        assert_eq!(plan.dependencies[&StepId::new("wf-t2")].len(), 2);
        assert!(plan.resource_conflicts.is_empty());
        assert_eq!(plan.approval_required, vec!["operations", "quality-assurance"]);
    }

    #[test]
    fn roles_deduplicated() {
        let config = ApprovalConfig {
            operations_role: "ops".to_string(),
            quality_role: "ops".to_string(),
            strategy_role: "fm".to_string(),
        };
        let steps = vec![ExecutionStep::new("strategy-x", StepSource::StrategyPlan, "x")
            .with_checks([SafetyCheck::ContaminationRisk])];
        assert_eq!(approval_roles(&steps, &config), vec!["ops", "fm"]);
    }
}
