//! Upstream collaborator shapes
//!
//! Read-only records produced by the workflow scheduler, strategy planner,
//! resource allocator and insight sources. The engine compiles these into
//! step proposals; nothing here is mutated by the pipeline.

use crate::types::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Crew assigned to a scheduled task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborAssignment {
    /// Role name (e.g. "grower", "sanitation")
    pub role: String,
    /// Crew size
    pub headcount: f64,
}

/// One task in a workflow schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Task id
    pub id: String,
    /// Task name
    pub name: String,
    /// Species being cultivated
    pub species: String,
    /// Grow room
    pub room: String,
    /// Assigned crew
    pub assigned_labor: Option<LaborAssignment>,
    /// Assigned equipment ids
    #[serde(default)]
    pub assigned_equipment: Vec<String>,
    /// Position in the schedule (1-based)
    pub sequence_order: u32,
    /// Scheduled start
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Scheduled end
    pub scheduled_end: Option<DateTime<Utc>>,
}

/// Tasks grouped under a named workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowGroup {
    /// Workflow name
    pub name: String,
    /// Member task ids
    pub task_ids: Vec<String>,
}

/// Workflow schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    /// Plan id
    pub id: String,
    /// Scheduled tasks
    pub schedule: Vec<ScheduledTask>,
    /// Grouping by workflow name
    #[serde(default)]
    pub workflows: Vec<WorkflowGroup>,
}

impl WorkflowPlan {
    /// Group containing a task
    #[must_use]
    pub fn group_of(&self, task_id: &str) -> Option<&WorkflowGroup> {
        self.workflows
            .iter()
            .find(|g| g.task_ids.iter().any(|t| t == task_id))
    }
}

/// Strategic proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyProposal {
    /// Proposal id
    pub id: String,
    /// Proposal type (e.g. "capacity-expansion", "species-mix")
    pub proposal_type: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Declared risk level
    pub risk_level: RiskLevel,
    /// Implementation steps, in order
    #[serde(default)]
    pub implementation_steps: Vec<String>,
}

/// Set of strategic proposals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPlan {
    /// Plan id
    pub id: String,
    /// Proposals
    pub proposals: Vec<StrategyProposal>,
}

/// Category used by the resource allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationCategory {
    /// Crew time
    Labor,
    /// Machinery
    Equipment,
    /// Consumables
    Material,
    /// Power/heating budget
    Energy,
    /// Rack or room space
    Space,
}

/// One allocation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    /// Allocation id
    pub id: String,
    /// Requirement this allocation satisfies
    pub requirement_id: String,
    /// Allocator category
    pub category: AllocationCategory,
    /// Resource name
    pub resource_name: String,
    /// Quantity requested
    pub requested_quantity: f64,
    /// Quantity granted
    pub allocated_quantity: f64,
    /// Unit of measure
    pub unit: String,
}

/// Resource allocation plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Plan id
    pub id: String,
    /// Allocation records
    pub allocations: Vec<ResourceAllocation>,
}

/// Insight or stability signal that forces a review checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightSignal {
    /// Signal id
    pub id: String,
    /// One-line summary
    pub summary: String,
    /// Named signals carried by the insight
    #[serde(default)]
    pub signals: Vec<String>,
}

impl InsightSignal {
    /// Create new insight signal
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            signals: Vec::new(),
        }
    }
}

/// Everything the engine can ingest in one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineInput {
    /// Workflow schedule
    pub workflow_plan: Option<WorkflowPlan>,
    /// Strategic proposals
    pub strategy_plan: Option<StrategyPlan>,
    /// Resource allocations
    pub allocation_plan: Option<AllocationPlan>,
    /// Simulation insight
    pub simulation_insight: Option<InsightSignal>,
    /// Refinement insight
    pub refinement_insight: Option<InsightSignal>,
    /// Facility orchestrator signal
    pub orchestrator_signal: Option<InsightSignal>,
    /// Telemetry baseline signal
    pub telemetry_baseline: Option<InsightSignal>,
}

impl EngineInput {
    /// Create empty input
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With workflow plan
    #[inline]
    #[must_use]
    pub fn with_workflow(mut self, plan: WorkflowPlan) -> Self {
        self.workflow_plan = Some(plan);
        self
    }

    /// With strategy plan
    #[inline]
    #[must_use]
    pub fn with_strategy(mut self, plan: StrategyPlan) -> Self {
        self.strategy_plan = Some(plan);
        self
    }

    /// With allocation plan
    #[inline]
    #[must_use]
    pub fn with_allocations(mut self, plan: AllocationPlan) -> Self {
        self.allocation_plan = Some(plan);
        self
    }

    /// With simulation insight
    #[inline]
    #[must_use]
    pub fn with_simulation_insight(mut self, insight: InsightSignal) -> Self {
        self.simulation_insight = Some(insight);
        self
    }

    /// With refinement insight
    #[inline]
    #[must_use]
    pub fn with_refinement_insight(mut self, insight: InsightSignal) -> Self {
        self.refinement_insight = Some(insight);
        self
    }

    /// With orchestrator signal
    #[inline]
    #[must_use]
    pub fn with_orchestrator_signal(mut self, signal: InsightSignal) -> Self {
        self.orchestrator_signal = Some(signal);
        self
    }

    /// With telemetry baseline
    #[inline]
    #[must_use]
    pub fn with_telemetry_baseline(mut self, signal: InsightSignal) -> Self {
        self.telemetry_baseline = Some(signal);
        self
    }
}
