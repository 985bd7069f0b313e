//! Sporeline Core - execution planning and safety gating
//!
//! Turns upstream cultivation plans into approval-gated, conflict-checked
//! execution plans, gates every step against live telemetry, and plans
//! compensating actions when execution has to stop:
//! - Engine compiles workflow, strategy, allocation and insight inputs into steps
//! - Planner orders steps, annotates conflicts and runs approval
//! - Safety gate decides allow / warn / block per step
//! - Monitor applies step transitions and pauses plans on violations
//! - Rollback engine plans reversals of completed work
//!
//! Every transition is recorded in a shared, bounded [`ExecutionLog`].
//!
//! # Example
//!
//! ```rust
//! use sporeline_core::prelude::*;
//!
//! let service = ExecutionService::new(PipelineConfig::default())?;
//! let input = EngineInput::new()
//!     .with_simulation_insight(InsightSignal::new("sim-1", "yield dip in room B"));
//!
//! let steps = service.ingest(&input);
//! let plan = service.sequence(steps);
//! let plan = service.approve(plan.id, "alice")?;
//!
//! let dirty = TelemetrySnapshot::new().with_contamination_risk(92.0);
//! let outcome = service.monitor_tick(plan.id, Some(&dirty))?;
//! assert_eq!(outcome.plan.status, PlanStatus::Paused);
//! # Ok::<(), sporeline_core::PipelineError>(())
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod logging;
pub mod monitor;
pub mod planner;
pub mod proposals;
pub mod rollback;
pub mod service;
pub mod state_machine;
pub mod types;
pub mod upstream;

pub use config::{ApprovalConfig, GateConfig, PipelineConfig, RollbackConfig};
pub use engine::ExecutionEngine;
pub use error::{ConfigError, NotFound, PipelineError, PipelineResult};
pub use gate::{GateOptions, SafetyGate};
pub use logging::{ExecutionLog, ExecutionLogEntry, LogCategory, LogContext, LogExport};
pub use monitor::{
    DeviationSeverity, ExecutionMonitor, ExecutionStatusReport, MonitorOutcome, StepSnapshot,
    StepUpdate, TelemetryDeviation,
};
pub use planner::{dependency_order, ExecutionPlanner};
pub use proposals::{
    AuditFinding, AuditRule, AuditedProposal, OptimizationProposal, Proposal, ProposalPipeline,
    ProposalPlan, RefinementProposal,
};
pub use rollback::RollbackEngine;
pub use service::ExecutionService;
pub use types::{
    EnvironmentBounds, ExecutionPlan, ExecutionStep, GateChecks, GateDecision, GateId,
    LogEntryId, ManualOverride, PlanId, PlanStatus, ProposalPlanId, ResourceCategory,
    ResourceNeed, RiskLevel, RollbackId, RollbackPlan, RollbackStatus, RollbackStep, SafetyCheck,
    SafetyGateResult, StepId, StepSource, StepStatus, TelemetrySnapshot, TelemetryWatch,
};
pub use upstream::{
    AllocationCategory, AllocationPlan, EngineInput, InsightSignal, LaborAssignment,
    ResourceAllocation, ScheduledTask, StrategyPlan, StrategyProposal, WorkflowGroup,
    WorkflowPlan,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Sporeline Core
    pub use crate::{
        EngineInput, ExecutionPlan, ExecutionService, ExecutionStep, GateDecision, GateOptions,
        InsightSignal, PipelineConfig, PipelineError, PipelineResult, PlanStatus, StepId,
        StepStatus, TelemetrySnapshot,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
