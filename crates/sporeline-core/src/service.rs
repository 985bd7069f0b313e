//! Execution service
//!
//! In-process, synchronous surface over the pipeline components. Plans and
//! rollback plans are stored by id. Each plan sits behind its own mutex so
//! operator actions and monitor ticks on one plan are serialized, while
//! distinct plans proceed independently.

use crate::config::PipelineConfig;
use crate::engine::ExecutionEngine;
use crate::error::{NotFound, PipelineResult};
use crate::gate::SafetyGate;
use crate::logging::{ExecutionLog, LogExport};
use crate::monitor::{ExecutionMonitor, MonitorOutcome, StepUpdate};
use crate::planner::{self, ExecutionPlanner};
use crate::rollback::RollbackEngine;
use crate::types::{
    ExecutionPlan, ExecutionStep, PlanId, RollbackId, RollbackPlan, StepId, StepStatus,
    TelemetrySnapshot,
};
use crate::upstream::EngineInput;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Shared<T> = Arc<Mutex<T>>;

/// Pipeline service
#[derive(Debug)]
pub struct ExecutionService {
    config: PipelineConfig,
    log: Arc<ExecutionLog>,
    engine: ExecutionEngine,
    planner: ExecutionPlanner,
    monitor: ExecutionMonitor,
    rollback: RollbackEngine,
    emergency_stop: AtomicBool,
    plans: RwLock<HashMap<PlanId, Shared<ExecutionPlan>>>,
    rollbacks: RwLock<HashMap<RollbackId, Shared<RollbackPlan>>>,
}

impl ExecutionService {
    /// Create service from validated configuration
    ///
    /// # Errors
    /// `PipelineError::Config` when the configuration is invalid.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;

        let log = Arc::new(ExecutionLog::new(config.log_capacity));
        let gate = SafetyGate::new(&config.gate, Arc::clone(&log));
        Ok(Self {
            engine: ExecutionEngine::new(config.approval.clone(), Arc::clone(&log)),
            planner: ExecutionPlanner::new(config.approval.clone(), Arc::clone(&log)),
            monitor: ExecutionMonitor::new(gate, Arc::clone(&log)),
            rollback: RollbackEngine::new(config.rollback.clone(), Arc::clone(&log)),
            emergency_stop: AtomicBool::new(false),
            plans: RwLock::new(HashMap::new()),
            rollbacks: RwLock::new(HashMap::new()),
            log,
            config,
        })
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared execution log
    #[must_use]
    pub fn log(&self) -> Arc<ExecutionLog> {
        Arc::clone(&self.log)
    }

    /// Engage or release the emergency stop for all later gate evaluations
    pub fn set_emergency_stop(&self, engaged: bool) {
        self.emergency_stop.store(engaged, Ordering::SeqCst);
        if engaged {
            tracing::warn!("emergency stop engaged");
        } else {
            tracing::info!("emergency stop released");
        }
    }

    /// Compile upstream artifacts into steps
    pub fn ingest(&self, input: &EngineInput) -> Vec<ExecutionStep> {
        self.engine.ingest(input)
    }

    /// Store a draft plan built from raw steps
    pub fn draft(&self, steps: Vec<ExecutionStep>) -> ExecutionPlan {
        self.store(self.engine.build_draft_plan(steps))
    }

    /// Sequence raw steps into a new stored plan
    pub fn sequence(&self, steps: Vec<ExecutionStep>) -> ExecutionPlan {
        self.store(self.planner.sequence_steps(steps))
    }

    /// Re-sequence a stored draft or pending plan
    ///
    /// # Errors
    /// `NotFound::Plan` or any planner error.
    pub fn resequence(&self, plan_id: PlanId) -> PipelineResult<ExecutionPlan> {
        self.transition(plan_id, |plan| self.planner.sequence_plan(plan))
    }

    /// Move a stored draft to pending approval
    ///
    /// # Errors
    /// `NotFound::Plan` or any planner error.
    pub fn request_approval(&self, plan_id: PlanId) -> PipelineResult<ExecutionPlan> {
        self.transition(plan_id, |plan| self.planner.request_approval(plan))
    }

    /// Approve a stored plan
    ///
    /// # Errors
    /// `NotFound::Plan` or any planner error.
    pub fn approve(&self, plan_id: PlanId, approver: &str) -> PipelineResult<ExecutionPlan> {
        self.transition(plan_id, |plan| self.planner.approve_plan(plan, approver))
    }

    /// Reject a stored plan
    ///
    /// # Errors
    /// `NotFound::Plan` or any planner error.
    pub fn reject(
        &self,
        plan_id: PlanId,
        reviewer: &str,
        reason: &str,
    ) -> PipelineResult<ExecutionPlan> {
        self.transition(plan_id, |plan| self.planner.reject_plan(plan, reviewer, reason))
    }

    /// Request a step status change
    ///
    /// # Errors
    /// `NotFound::Plan` or any monitor error.
    pub fn update_step(
        &self,
        plan_id: PlanId,
        step_id: &StepId,
        status: StepStatus,
        telemetry: Option<&TelemetrySnapshot>,
    ) -> PipelineResult<StepUpdate> {
        let monitor = self.monitor();
        self.with_plan(plan_id, |plan| {
            let update = monitor.update_step_status(plan, step_id, status, telemetry)?;
            Ok((update.plan.clone(), update))
        })
    }

    /// Force a step status change past the gate
    ///
    /// # Errors
    /// `NotFound::Plan` or any monitor error.
    pub fn override_step(
        &self,
        plan_id: PlanId,
        step_id: &StepId,
        status: StepStatus,
        operator: &str,
        reason: &str,
        telemetry: Option<&TelemetrySnapshot>,
    ) -> PipelineResult<StepUpdate> {
        let monitor = self.monitor();
        self.with_plan(plan_id, |plan| {
            let update =
                monitor.override_step_status(plan, step_id, status, operator, reason, telemetry)?;
            Ok((update.plan.clone(), update))
        })
    }

    /// Run one monitor tick over a stored plan
    ///
    /// # Errors
    /// `NotFound::Plan` or any monitor error.
    pub fn monitor_tick(
        &self,
        plan_id: PlanId,
        telemetry: Option<&TelemetrySnapshot>,
    ) -> PipelineResult<MonitorOutcome> {
        let monitor = self.monitor();
        self.with_plan(plan_id, |plan| {
            let outcome = monitor.monitor_plan(plan, telemetry)?;
            Ok((outcome.plan.clone(), outcome))
        })
    }

    /// Resume a paused plan
    ///
    /// # Errors
    /// `NotFound::Plan` or any monitor error.
    pub fn resume(
        &self,
        plan_id: PlanId,
        operator: &str,
        reason: &str,
    ) -> PipelineResult<ExecutionPlan> {
        self.transition(plan_id, |plan| self.monitor.resume_plan(plan, operator, reason))
    }

    /// Generate and store a rollback plan
    ///
    /// # Errors
    /// `NotFound::Plan` or `NotFound::Step`.
    pub fn generate_rollback(
        &self,
        plan_id: PlanId,
        failed_step_id: &StepId,
        reason: &str,
    ) -> PipelineResult<RollbackPlan> {
        let handle = self.plan_handle(plan_id)?;
        let rollback = {
            let plan = handle.lock();
            self.rollback.generate(&plan, failed_step_id, reason)?
        };
        self.rollbacks
            .write()
            .insert(rollback.id, Arc::new(Mutex::new(rollback.clone())));
        Ok(rollback)
    }

    /// Approve a stored rollback plan
    ///
    /// # Errors
    /// `NotFound::Rollback` or an illegal transition.
    pub fn approve_rollback(
        &self,
        rollback_id: RollbackId,
        approver: &str,
    ) -> PipelineResult<RollbackPlan> {
        self.with_rollback(rollback_id, |r| self.rollback.approve(r, approver))
    }

    /// Complete a stored rollback plan
    ///
    /// # Errors
    /// `NotFound::Rollback` or an illegal transition.
    pub fn complete_rollback(&self, rollback_id: RollbackId) -> PipelineResult<RollbackPlan> {
        self.with_rollback(rollback_id, |r| self.rollback.complete(r))
    }

    /// Current value of a stored plan
    ///
    /// # Errors
    /// `NotFound::Plan`.
    pub fn plan(&self, plan_id: PlanId) -> PipelineResult<ExecutionPlan> {
        Ok(self.plan_handle(plan_id)?.lock().clone())
    }

    /// Every stored plan, oldest id first
    #[must_use]
    pub fn plans(&self) -> Vec<ExecutionPlan> {
        let handles: Vec<Shared<ExecutionPlan>> = self.plans.read().values().cloned().collect();
        let mut plans: Vec<ExecutionPlan> = handles.iter().map(|h| h.lock().clone()).collect();
        plans.sort_by_key(|p| p.id);
        plans
    }

    /// Current value of a stored rollback plan
    ///
    /// # Errors
    /// `NotFound::Rollback`.
    pub fn rollback(&self, rollback_id: RollbackId) -> PipelineResult<RollbackPlan> {
        let handle = self
            .rollbacks
            .read()
            .get(&rollback_id)
            .cloned()
            .ok_or(NotFound::Rollback(rollback_id))?;
        let rollback = handle.lock().clone();
        Ok(rollback)
    }

    /// Strict dependency order of a stored plan
    ///
    /// # Errors
    /// `NotFound::Plan` or `DependencyCycle`.
    pub fn dependency_order(&self, plan_id: PlanId) -> PipelineResult<Vec<StepId>> {
        planner::dependency_order(&self.plan(plan_id)?)
    }

    /// Snapshot of the execution log
    #[must_use]
    pub fn export_log(&self) -> LogExport {
        self.log.export()
    }

    fn monitor(&self) -> ExecutionMonitor {
        if self.emergency_stop.load(Ordering::SeqCst) {
            let options = self.monitor.options().emergency();
            self.monitor.clone().with_options(options)
        } else {
            self.monitor.clone()
        }
    }

    fn store(&self, plan: ExecutionPlan) -> ExecutionPlan {
        self.plans
            .write()
            .insert(plan.id, Arc::new(Mutex::new(plan.clone())));
        plan
    }

    fn plan_handle(&self, plan_id: PlanId) -> PipelineResult<Shared<ExecutionPlan>> {
        let handle = self
            .plans
            .read()
            .get(&plan_id)
            .cloned()
            .ok_or(NotFound::Plan(plan_id))?;
        Ok(handle)
    }

    /// Run `f` against the stored plan under its lock and store the new value
    fn with_plan<T>(
        &self,
        plan_id: PlanId,
        f: impl FnOnce(&ExecutionPlan) -> PipelineResult<(ExecutionPlan, T)>,
    ) -> PipelineResult<T> {
        let handle = self.plan_handle(plan_id)?;
        let mut guard = handle.lock();
        let (next, out) = f(&guard)?;
        *guard = next;
        Ok(out)
    }

    fn transition(
        &self,
        plan_id: PlanId,
        f: impl FnOnce(&ExecutionPlan) -> PipelineResult<ExecutionPlan>,
    ) -> PipelineResult<ExecutionPlan> {
        self.with_plan(plan_id, |plan| {
            let next = f(plan)?;
            Ok((next.clone(), next))
        })
    }

    fn with_rollback(
        &self,
        rollback_id: RollbackId,
        f: impl FnOnce(&RollbackPlan) -> PipelineResult<RollbackPlan>,
    ) -> PipelineResult<RollbackPlan> {
        let handle = self
            .rollbacks
            .read()
            .get(&rollback_id)
            .cloned()
            .ok_or(NotFound::Rollback(rollback_id))?;
        let mut guard = handle.lock();
        let next = f(&guard)?;
        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::types::{PlanStatus, RollbackStatus, StepSource, TelemetryWatch};

    fn service() -> ExecutionService {
        ExecutionService::new(PipelineConfig::default()).unwrap()
    }

    fn steps(n: usize) -> Vec<ExecutionStep> {
        (0..n)
            .map(|i| {
                ExecutionStep::new(format!("step-{i:02}"), StepSource::WorkflowPlan, "work")
                    .with_watch(TelemetryWatch::standard())
            })
            .collect()
    }

    #[test]
    fn invalid_config_rejected() {
        let config = PipelineConfig::default().with_log_capacity(0);
        let err = ExecutionService::new(config).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let svc = service();
        assert!(svc.plan(PlanId::new()).unwrap_err().is_not_found());
        assert!(svc.approve(PlanId::new(), "alice").unwrap_err().is_not_found());
        assert!(svc.rollback(RollbackId::new()).unwrap_err().is_not_found());
        assert!(svc.complete_rollback(RollbackId::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn stored_plan_tracks_transitions() {
        let svc = service();
        let plan = svc.sequence(steps(2));
        svc.approve(plan.id, "alice").unwrap();
        let update = svc
            .update_step(plan.id, &StepId::new("step-00"), StepStatus::Running, None)
            .unwrap();

        let stored = svc.plan(plan.id).unwrap();
        assert_eq!(stored, update.plan);
        assert_eq!(stored.version, 3);
        assert_eq!(svc.plans().len(), 1);
    }

    #[test]
    fn failed_transition_leaves_plan_untouched() {
        let svc = service();
        let plan = svc.sequence(steps(1));
        assert!(svc.reject(plan.id, "bob", "").is_err());
        assert_eq!(svc.plan(plan.id).unwrap(), plan);
    }

    #[test]
    fn emergency_stop_pauses_on_tick() {
        let svc = service();
        let plan = svc.sequence(steps(1));
        svc.approve(plan.id, "alice").unwrap();
        svc.set_emergency_stop(true);

        let outcome = svc.monitor_tick(plan.id, None).unwrap();
        assert_eq!(outcome.plan.status, PlanStatus::Paused);

        svc.set_emergency_stop(false);
        let resumed = svc.resume(plan.id, "dana", "inspected").unwrap();
        assert_eq!(resumed.status, PlanStatus::Approved);
    }

    #[test]
    fn rollback_lifecycle_is_stored() {
        let svc = service();
        let plan = svc.sequence(steps(1));
        let rollback = svc
            .generate_rollback(plan.id, &StepId::new("step-00"), "halt")
            .unwrap();
        svc.approve_rollback(rollback.id, "alice").unwrap();
        svc.complete_rollback(rollback.id).unwrap();
        assert_eq!(svc.rollback(rollback.id).unwrap().status, RollbackStatus::Completed);
    }

    #[test]
    fn concurrent_updates_are_serialized() {
        let svc = service();
        let plan = svc.sequence(steps(8));
        svc.approve(plan.id, "alice").unwrap();
        let before = svc.plan(plan.id).unwrap().version;

        std::thread::scope(|scope| {
            for i in 0..8 {
                let svc = &svc;
                scope.spawn(move || {
                    let id = StepId::new(format!("step-{i:02}"));
                    svc.update_step(plan.id, &id, StepStatus::Running, None).unwrap();
                    svc.monitor_tick(plan.id, None).unwrap();
                });
            }
        });

        let after = svc.plan(plan.id).unwrap();
        assert_eq!(after.version, before + 8);
        assert!(after.steps.iter().all(|s| s.status == StepStatus::Running));
    }

    #[test]
    fn export_includes_activity() {
        let svc = service();
        let input = EngineInput::new();
        let steps = svc.ingest(&input);
        svc.draft(steps);
        let export = svc.export_log();
        assert_eq!(export.total, 2);
    }
}
