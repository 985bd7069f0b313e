//! Execution Planner
//!
//! Orders steps, annotates resource and timing conflicts, and drives the
//! approval transitions of a plan.
//!
//! The plan order is a heuristic: fewer declared dependencies first, ties
//! broken by step id. It is stable and deterministic but does not respect
//! precedence. [`dependency_order`] is the strict alternative; it builds the
//! intra-plan dependency graph and fails on cycles.
//!
//! Conflicts are informational. They never change plan status.

use crate::config::ApprovalConfig;
use crate::engine::{approval_roles, dependency_map};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::{ExecutionLog, LogCategory, LogContext};
use crate::state_machine::validate_plan_transition;
use crate::types::{
    ExecutionPlan, ExecutionStep, PlanId, PlanStatus, ResourceCategory, StepId, StepStatus,
};
use chrono::Utc;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Execution planner
#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    log: Arc<ExecutionLog>,
    approval: ApprovalConfig,
}

impl ExecutionPlanner {
    /// Create planner
    #[must_use]
    pub fn new(approval: ApprovalConfig, log: Arc<ExecutionLog>) -> Self {
        Self { log, approval }
    }

    /// Sequence raw steps into a new plan awaiting approval
    pub fn sequence_steps(&self, steps: Vec<ExecutionStep>) -> ExecutionPlan {
        let now = Utc::now();
        let steps = order_steps(steps);
        let plan = ExecutionPlan {
            id: PlanId::new(),
            dependencies: dependency_map(&steps),
            resource_conflicts: detect_resource_conflicts(&steps),
            timing_conflicts: detect_timing_conflicts(&steps),
            approval_required: approval_roles(&steps, &self.approval),
            steps,
            status: PlanStatus::PendingApproval,
            version: 1,
            manual_overrides: Vec::new(),
            created_at: now,
            updated_at: now,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            paused_reason: None,
        };
        self.log_sequenced(&plan);
        plan
    }

    /// Re-sequence an existing draft or pending plan
    ///
    /// # Errors
    /// `IllegalTransition` unless the plan is draft or pending approval.
    pub fn sequence_plan(&self, plan: &ExecutionPlan) -> PipelineResult<ExecutionPlan> {
        validate_plan_transition(plan.status, PlanStatus::PendingApproval)?;

        let mut next = plan.next_version();
        next.steps = order_steps(std::mem::take(&mut next.steps));
        next.dependencies = dependency_map(&next.steps);
        next.resource_conflicts = detect_resource_conflicts(&next.steps);
        next.timing_conflicts = detect_timing_conflicts(&next.steps);
        next.approval_required = approval_roles(&next.steps, &self.approval);
        next.status = PlanStatus::PendingApproval;

        self.log_sequenced(&next);
        Ok(next)
    }

    /// Move a draft plan to pending approval without re-ordering
    ///
    /// # Errors
    /// `IllegalTransition` unless the plan is a draft.
    pub fn request_approval(&self, plan: &ExecutionPlan) -> PipelineResult<ExecutionPlan> {
        if plan.status != PlanStatus::Draft {
            return Err(PipelineError::illegal_transition(
                "plan",
                plan.status,
                PlanStatus::PendingApproval,
            ));
        }
        let mut next = plan.next_version();
        next.status = PlanStatus::PendingApproval;

        self.log.record(
            LogCategory::Approval,
            format!("Approval requested from {}", next.approval_required.join(", ")),
            LogContext::plan(next.id),
            None,
        );
        Ok(next)
    }

    /// Approve a pending plan, stamping every step
    ///
    /// Steps still awaiting approval move to pending.
    ///
    /// # Errors
    /// `IllegalTransition` unless the plan is pending approval.
    pub fn approve_plan(
        &self,
        plan: &ExecutionPlan,
        approver: &str,
    ) -> PipelineResult<ExecutionPlan> {
        // paused -> approved is a resume, handled by the monitor
        if plan.status != PlanStatus::PendingApproval {
            return Err(PipelineError::illegal_transition(
                "plan",
                plan.status,
                PlanStatus::Approved,
            ));
        }

        let now = Utc::now();
        let mut next = plan.next_version();
        next.status = PlanStatus::Approved;
        next.approved_by = Some(approver.to_string());
        next.approved_at = Some(now);
        for step in &mut next.steps {
            step.approved = true;
            step.approved_by = Some(approver.to_string());
            step.approved_at = Some(now);
            if step.status == StepStatus::AwaitingApproval {
                step.status = StepStatus::Pending;
                step.last_updated = now;
            }
        }

        tracing::info!(plan = %next.id, approver, "plan approved");
        self.log.record(
            LogCategory::Approval,
            format!("Plan approved by {approver}"),
            LogContext::plan(next.id),
            Some(serde_json::json!({ "version": next.version })),
        );
        Ok(next)
    }

    /// Reject a pending plan
    ///
    /// # Errors
    /// - `MissingReason` when `reason` is blank
    /// - `IllegalTransition` unless the plan is pending approval
    pub fn reject_plan(
        &self,
        plan: &ExecutionPlan,
        reviewer: &str,
        reason: &str,
    ) -> PipelineResult<ExecutionPlan> {
        if reason.trim().is_empty() {
            return Err(PipelineError::MissingReason {
                action: "reject a plan",
            });
        }
        validate_plan_transition(plan.status, PlanStatus::Rejected)?;

        let mut next = plan.next_version();
        next.status = PlanStatus::Rejected;
        next.rejection_reason = Some(reason.to_string());

        tracing::info!(plan = %next.id, reviewer, "plan rejected");
        self.log.record(
            LogCategory::Approval,
            format!("Plan rejected by {reviewer}: {reason}"),
            LogContext::plan(next.id),
            None,
        );
        Ok(next)
    }

    fn log_sequenced(&self, plan: &ExecutionPlan) {
        if !plan.resource_conflicts.is_empty() || !plan.timing_conflicts.is_empty() {
            tracing::warn!(
                plan = %plan.id,
                resource = plan.resource_conflicts.len(),
                timing = plan.timing_conflicts.len(),
                "plan has conflicts"
            );
        }
        self.log.record(
            LogCategory::Planning,
            format!("Sequenced {} steps", plan.steps.len()),
            LogContext::plan(plan.id),
            Some(serde_json::json!({
                "order": plan.steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                "resource_conflicts": plan.resource_conflicts,
                "timing_conflicts": plan.timing_conflicts,
            })),
        );
    }
}

/// Heuristic order: dependency count ascending, then step id
#[must_use]
pub fn order_steps(mut steps: Vec<ExecutionStep>) -> Vec<ExecutionStep> {
    steps.sort_by(|a, b| {
        a.dependencies
            .len()
            .cmp(&b.dependencies.len())
            .then_with(|| a.id.cmp(&b.id))
    });
    steps
}

/// Non-labor resources whose total requested quantity exceeds one unit
///
/// One entry per `<category>:<name>` key, in key order.
#[must_use]
pub fn detect_resource_conflicts(steps: &[ExecutionStep]) -> Vec<String> {
    let mut totals: BTreeMap<String, (f64, BTreeSet<&StepId>)> = BTreeMap::new();
    for step in steps {
        for need in step
            .resources
            .iter()
            .filter(|r| r.category != ResourceCategory::Labor)
        {
            let (total, requesters) = totals.entry(need.key()).or_default();
            *total += need.quantity;
            requesters.insert(&step.id);
        }
    }

    totals
        .into_iter()
        .filter(|(_, (total, _))| *total > 1.0)
        .map(|(key, (total, requesters))| {
            format!("{key} requested {total} across {} steps", requesters.len())
        })
        .collect()
}

/// Pairs of scheduled steps whose windows overlap
#[must_use]
pub fn detect_timing_conflicts(steps: &[ExecutionStep]) -> Vec<String> {
    let windows: Vec<_> = steps
        .iter()
        .filter_map(|s| Some((&s.id, s.scheduled_start?, s.scheduled_end?)))
        .collect();

    let mut conflicts = Vec::new();
    for (i, (a, a_start, a_end)) in windows.iter().enumerate() {
        for (b, b_start, b_end) in &windows[i + 1..] {
            if a_end > b_start && a_start < b_end {
                conflicts.push(format!("{a} overlaps {b}"));
            }
        }
    }
    conflicts
}

/// Strict topological order of the plan's steps
///
/// Dependencies on ids outside the plan (allocation requirement markers)
/// are ignored.
///
/// # Errors
/// `DependencyCycle` naming every step that sits on a cycle, sorted.
pub fn dependency_order(plan: &ExecutionPlan) -> PipelineResult<Vec<StepId>> {
    let mut graph: DiGraphMap<&StepId, ()> = DiGraphMap::new();
    for step in &plan.steps {
        graph.add_node(&step.id);
    }
    for step in &plan.steps {
        for dep in &step.dependencies {
            if graph.contains_node(dep) {
                graph.add_edge(dep, &step.id, ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().cloned().collect()),
        Err(_) => {
            let mut cyclic: Vec<StepId> = tarjan_scc(&graph)
                .into_iter()
                .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
                .flatten()
                .cloned()
                .collect();
            cyclic.sort();
            Err(PipelineError::DependencyCycle(cyclic))
        }
    }
}
