//! Core types for Sporeline
//!
//! Defines the value types that flow through the pipeline:
//! - Identifiers (ULID-backed for generated entities, opaque strings for steps)
//! - Step proposals and their safety contracts
//! - Execution plans and their lifecycle status
//! - Telemetry snapshots and safety gate results
//! - Rollback plans
//!
//! Plans, steps and rollback plans are immutable values. Every transition
//! builds a new value; nothing here is shared mutably between components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate new identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

ulid_id!(
    /// Execution plan identifier
    PlanId
);
ulid_id!(
    /// Rollback plan identifier
    RollbackId
);
ulid_id!(
    /// Identifier of a single safety gate evaluation
    GateId
);
ulid_id!(
    /// Execution log entry identifier
    LogEntryId
);
ulid_id!(
    /// Proposal plan identifier (optimization/strategy/refinement pipelines)
    ProposalPlanId
);

/// Opaque step identifier
///
/// Ordered lexicographically; the planner and engine rely on that ordering
/// for deterministic output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Create step id from any string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Upstream artifact a step was compiled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepSource {
    /// Scheduled workflow task
    WorkflowPlan,
    /// Strategic proposal
    StrategyPlan,
    /// Resource allocation record
    ResourceAllocation,
    /// Simulation insight checkpoint
    SimulationInsight,
    /// Refinement insight checkpoint
    RefinementInsight,
    /// Facility orchestrator or telemetry baseline checkpoint
    FacilityOrchestrator,
}

impl StepSource {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowPlan => "workflow-plan",
            Self::StrategyPlan => "strategy-plan",
            Self::ResourceAllocation => "resource-allocation",
            Self::SimulationInsight => "simulation-insight",
            Self::RefinementInsight => "refinement-insight",
            Self::FacilityOrchestrator => "facility-orchestrator",
        }
    }
}

impl fmt::Display for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a resource demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceCategory {
    /// Crew time
    Labor,
    /// Shared machinery (autoclaves, mixers, fruiting chambers)
    Equipment,
    /// Consumables (substrate, spawn, packaging)
    Material,
}

impl ResourceCategory {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Labor => "labor",
            Self::Equipment => "equipment",
            Self::Material => "material",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named safety check a step asks the gate to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafetyCheck {
    /// Telemetry drift against the step's watch record
    TelemetryDeviation,
    /// Contamination risk score
    ContaminationRisk,
    /// Equipment load
    EquipmentOverload,
    /// Labor utilization
    LaborMismatch,
    /// Environmental envelope
    EnvironmentalLimit,
    /// Regression signals from simulation/refinement
    RegressionReview,
    /// Facility stability checkpoint
    StabilityReview,
}

/// Lifecycle status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Compiled, plan not yet approved
    AwaitingApproval,
    /// Approved, not started
    Pending,
    /// In progress
    Running,
    /// Done
    Completed,
    /// Failed during execution
    Failed,
}

impl StepStatus {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingApproval => "awaiting-approval",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Transitions into this status must clear the safety gate
    #[inline]
    #[must_use]
    pub fn is_gated(self) -> bool {
        matches!(self, Self::Running | Self::Completed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an execution plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanStatus {
    /// Built, not sequenced
    Draft,
    /// Sequenced, awaiting sign-off
    PendingApproval,
    /// Signed off, steps may run
    Approved,
    /// Rejected by a reviewer (terminal)
    Rejected,
    /// Halted by the safety gate, awaiting operator review
    Paused,
    /// All steps completed (terminal)
    Completed,
}

impl PlanStatus {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingApproval => "pending-approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// No further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource a step needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNeed {
    /// Resource name (role, equipment id, material name)
    pub name: String,
    /// Resource category
    pub category: ResourceCategory,
    /// Requested quantity
    pub quantity: f64,
    /// Unit of measure
    pub unit: String,
}

impl ResourceNeed {
    /// Create new resource need
    #[inline]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        category: ResourceCategory,
        quantity: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            quantity,
            unit: unit.into(),
        }
    }

    /// Conflict key `<category>:<name>`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.category, self.name)
    }
}

/// Environmental envelope a step must stay inside
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentBounds {
    /// Minimum temperature (°C)
    pub temp_min: Option<f64>,
    /// Maximum temperature (°C)
    pub temp_max: Option<f64>,
    /// Minimum relative humidity (%)
    pub humidity_min: Option<f64>,
    /// Maximum relative humidity (%)
    pub humidity_max: Option<f64>,
    /// Maximum CO₂ (ppm)
    pub co2_max: Option<f64>,
}

/// Numeric thresholds the gate checks for a step
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryWatch {
    /// Contamination risk ceiling (0-100)
    pub contamination_risk_max: Option<f64>,
    /// Equipment load ceiling (%)
    pub equipment_load_max: Option<f64>,
    /// Labor utilization ceiling (%)
    pub labor_utilization_max: Option<f64>,
    /// Environmental envelope
    pub environment: Option<EnvironmentBounds>,
}

impl TelemetryWatch {
    /// Watch record used for cultivation-floor work
    #[must_use]
    pub fn standard() -> Self {
        Self {
            contamination_risk_max: Some(80.0),
            equipment_load_max: Some(90.0),
            labor_utilization_max: Some(90.0),
            environment: Some(EnvironmentBounds {
                temp_min: Some(12.0),
                temp_max: Some(28.0),
                humidity_min: Some(50.0),
                humidity_max: Some(98.0),
                co2_max: Some(7000.0),
            }),
        }
    }

    /// With contamination ceiling
    #[inline]
    #[must_use]
    pub fn with_contamination_max(mut self, max: f64) -> Self {
        self.contamination_risk_max = Some(max);
        self
    }
}

/// Point-in-time reading of facility metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Temperature (°C)
    pub temperature_c: Option<f64>,
    /// Relative humidity (%)
    pub humidity_pct: Option<f64>,
    /// CO₂ concentration (ppm)
    pub co2_ppm: Option<f64>,
    /// Contamination risk score (0-100)
    pub contamination_risk_score: Option<f64>,
    /// Equipment load (%)
    pub equipment_load_pct: Option<f64>,
    /// Labor utilization (%)
    pub labor_utilization_pct: Option<f64>,
    /// Names of detected regression signals
    #[serde(default)]
    pub regression_signals: Vec<String>,
    /// When the reading was taken
    pub captured_at: Option<DateTime<Utc>>,
}

impl TelemetrySnapshot {
    /// Create empty snapshot
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature_c = Some(celsius);
        self
    }

    /// With humidity
    #[inline]
    #[must_use]
    pub fn with_humidity(mut self, pct: f64) -> Self {
        self.humidity_pct = Some(pct);
        self
    }

    /// With CO₂
    #[inline]
    #[must_use]
    pub fn with_co2(mut self, ppm: f64) -> Self {
        self.co2_ppm = Some(ppm);
        self
    }

    /// With contamination risk score
    #[inline]
    #[must_use]
    pub fn with_contamination_risk(mut self, score: f64) -> Self {
        self.contamination_risk_score = Some(score);
        self
    }

    /// With equipment load
    #[inline]
    #[must_use]
    pub fn with_equipment_load(mut self, pct: f64) -> Self {
        self.equipment_load_pct = Some(pct);
        self
    }

    /// With labor utilization
    #[inline]
    #[must_use]
    pub fn with_labor_utilization(mut self, pct: f64) -> Self {
        self.labor_utilization_pct = Some(pct);
        self
    }

    /// With regression signal
    #[inline]
    #[must_use]
    pub fn with_regression(mut self, signal: impl Into<String>) -> Self {
        self.regression_signals.push(signal.into());
        self
    }
}

/// One unit of proposed work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Step identifier
    pub id: StepId,
    /// Upstream artifact kind
    pub source: StepSource,
    /// Id of the originating upstream record
    pub source_ref: Option<String>,
    /// Human-readable title
    pub title: String,
    /// Scheduled start
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Scheduled end
    pub scheduled_end: Option<DateTime<Utc>>,
    /// Estimated duration in minutes
    pub estimated_duration_minutes: u32,
    /// Steps that must complete first
    pub dependencies: Vec<StepId>,
    /// Resource demand
    pub resources: Vec<ResourceNeed>,
    /// Safety checks to run
    pub safety_checks: Vec<SafetyCheck>,
    /// Gate thresholds
    pub telemetry_watch: TelemetryWatch,
    /// Reversal actions, preferred first
    pub rollback_steps: Vec<String>,
    /// Lifecycle status
    pub status: StepStatus,
    /// Step needs explicit sign-off
    pub requires_approval: bool,
    /// Sign-off recorded
    pub approved: bool,
    /// Who signed off
    pub approved_by: Option<String>,
    /// When sign-off happened
    pub approved_at: Option<DateTime<Utc>>,
    /// Last status change
    pub last_updated: DateTime<Utc>,
}

impl ExecutionStep {
    /// Create new step awaiting approval
    #[must_use]
    pub fn new(id: impl Into<StepId>, source: StepSource, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            source_ref: None,
            title: title.into(),
            scheduled_start: None,
            scheduled_end: None,
            estimated_duration_minutes: 30,
            dependencies: Vec::new(),
            resources: Vec::new(),
            safety_checks: Vec::new(),
            telemetry_watch: TelemetryWatch::default(),
            rollback_steps: Vec::new(),
            status: StepStatus::AwaitingApproval,
            requires_approval: true,
            approved: false,
            approved_by: None,
            approved_at: None,
            last_updated: Utc::now(),
        }
    }

    /// With source reference
    #[inline]
    #[must_use]
    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    /// With scheduled window
    #[inline]
    #[must_use]
    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.scheduled_start = Some(start);
        self.scheduled_end = Some(end);
        self
    }

    /// With duration
    #[inline]
    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration_minutes = minutes;
        self
    }

    /// With dependency
    #[inline]
    #[must_use]
    pub fn depends_on(mut self, step_id: impl Into<StepId>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    /// With resource need
    #[inline]
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceNeed) -> Self {
        self.resources.push(resource);
        self
    }

    /// With safety checks
    #[inline]
    #[must_use]
    pub fn with_checks(mut self, checks: impl IntoIterator<Item = SafetyCheck>) -> Self {
        self.safety_checks.extend(checks);
        self
    }

    /// With watch record
    #[inline]
    #[must_use]
    pub fn with_watch(mut self, watch: TelemetryWatch) -> Self {
        self.telemetry_watch = watch;
        self
    }

    /// With rollback action
    #[inline]
    #[must_use]
    pub fn with_rollback(mut self, action: impl Into<String>) -> Self {
        self.rollback_steps.push(action.into());
        self
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }
}

/// Audit record of an operator bypassing a gate decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    /// Step the override applied to (none for plan-level resume)
    pub step_id: Option<StepId>,
    /// Operator who issued it
    pub operator: String,
    /// Stated reason
    pub reason: String,
    /// Gate decision that was bypassed
    pub bypassed_decision: Option<GateDecision>,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Unit of approval and monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Plan identifier
    pub id: PlanId,
    /// Steps in sequenced order
    pub steps: Vec<ExecutionStep>,
    /// Step id → its dependency list
    pub dependencies: BTreeMap<StepId, Vec<StepId>>,
    /// Resource contention findings
    pub resource_conflicts: Vec<String>,
    /// Schedule overlap findings
    pub timing_conflicts: Vec<String>,
    /// Roles that must sign off
    pub approval_required: Vec<String>,
    /// Lifecycle status
    pub status: PlanStatus,
    /// Monotonic version, bumped on every transition
    pub version: u32,
    /// Operator overrides
    pub manual_overrides: Vec<ManualOverride>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Approver
    pub approved_by: Option<String>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
    /// Rejection reason
    pub rejection_reason: Option<String>,
    /// Why the plan is paused
    pub paused_reason: Option<String>,
}

impl ExecutionPlan {
    /// Look up a step
    #[must_use]
    pub fn step(&self, step_id: &StepId) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| &s.id == step_id)
    }

    /// Position of a step in sequenced order
    #[must_use]
    pub fn step_index(&self, step_id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == step_id)
    }

    /// Step ids in sequenced order
    pub fn step_ids(&self) -> impl Iterator<Item = &StepId> + '_ {
        self.steps.iter().map(|s| &s.id)
    }

    /// Every step has completed (false for an empty plan)
    #[must_use]
    pub fn all_steps_completed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// Copy of this plan with the next version number
    #[must_use]
    pub(crate) fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        next
    }
}

/// Gate decision, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateDecision {
    /// Proceed
    Allow,
    /// Proceed only with manual approval
    Warn,
    /// Do not proceed
    Block,
}

impl GateDecision {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }

    /// Worst of two decisions
    #[inline]
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named boolean sub-checks of one gate evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateChecks {
    /// Emergency stop was engaged
    pub emergency_stop: bool,
    /// Contamination risk above ceiling
    pub contamination_spike: bool,
    /// Equipment load above ceiling
    pub equipment_overload: bool,
    /// Labor utilization above ceiling
    pub labor_mismatch: bool,
    /// Temperature outside envelope
    pub environmental_limit: bool,
    /// Regression signals present
    pub regression_detected: bool,
}

/// Outcome of gating one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyGateResult {
    /// Evaluation id
    pub gate_id: GateId,
    /// Step evaluated
    pub step_id: StepId,
    /// Decision
    pub decision: GateDecision,
    /// Why, in evaluation order
    pub rationale: Vec<String>,
    /// Suggested alternatives
    pub alternatives: Vec<String>,
    /// Sub-check flags
    pub checks: GateChecks,
    /// Evaluation time
    pub evaluated_at: DateTime<Utc>,
}

impl SafetyGateResult {
    /// Decision is not `allow`
    #[inline]
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.decision != GateDecision::Allow
    }
}

/// Lifecycle status of a rollback plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RollbackStatus {
    /// Generated, awaiting sign-off
    PendingApproval,
    /// Signed off
    Approved,
    /// Carried out (terminal)
    Completed,
}

impl RollbackStatus {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingApproval => "pending-approval",
            Self::Approved => "approved",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compensating action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackStep {
    /// Forward step being reversed
    pub target_step_id: StepId,
    /// Reversal action
    pub action: String,
    /// Expected duration in minutes
    pub expected_duration_minutes: u32,
}

/// Compensating-action plan for a paused or failed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    /// Rollback identifier
    pub id: RollbackId,
    /// Triggering execution plan
    pub plan_id: PlanId,
    /// Failing step
    pub failed_step_id: StepId,
    /// Free-text reason
    pub reason: String,
    /// Compensating actions, in execution order
    pub steps: Vec<RollbackStep>,
    /// Lifecycle status
    pub status: RollbackStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Approver
    pub approved_by: Option<String>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
}

/// Proposal risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl RiskLevel {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
