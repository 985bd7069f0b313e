//! Proposal pipelines
//!
//! Optimization, strategy and refinement proposals share one shape:
//! audit each proposal against a rule table, drop the blocked ones, order
//! the rest, then take the plan through approval. [`ProposalPipeline`]
//! implements that once, parameterized by proposal type, rule table and log
//! category. The concrete rule tables live in [`rules`].

pub mod rules;

pub use rules::{
    optimization_pipeline, refinement_pipeline, strategy_pipeline, OptimizationProposal,
    RefinementProposal,
};

use crate::error::{PipelineError, PipelineResult};
use crate::logging::{ExecutionLog, LogCategory, LogContext};
use crate::state_machine::validate_plan_transition;
use crate::types::{GateDecision, PlanStatus, ProposalPlanId, RiskLevel};
use crate::upstream::{StrategyPlan, StrategyProposal};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Anything a proposal pipeline can audit and plan
pub trait Proposal: Clone + fmt::Debug {
    /// Proposal id
    fn id(&self) -> &str;

    /// Title
    fn title(&self) -> &str;

    /// Declared risk
    fn risk_level(&self) -> RiskLevel;

    /// Implementation steps, in order
    fn implementation_steps(&self) -> &[String];
}

/// One audit rule
pub struct AuditRule<P> {
    /// Stable rule id
    pub id: &'static str,
    /// What the rule guards against
    pub description: &'static str,
    /// Decision when the rule fires (warn or block)
    pub severity: GateDecision,
    /// Returns a finding message when the rule fires
    pub check: fn(&P) -> Option<String>,
}

impl<P> fmt::Debug for AuditRule<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditRule")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

/// A fired rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFinding {
    /// Rule id
    pub rule_id: String,
    /// Rule severity
    pub severity: GateDecision,
    /// Finding message
    pub message: String,
}

/// Proposal with its audit outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditedProposal<P> {
    /// The proposal
    pub proposal: P,
    /// Worst severity among fired rules (allow if none fired)
    pub decision: GateDecision,
    /// Fired rules, in table order
    pub findings: Vec<AuditFinding>,
}

/// Ordered, approval-gated set of proposals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalPlan<P> {
    /// Plan id
    pub id: ProposalPlanId,
    /// Accepted proposals, lowest risk first
    pub proposals: Vec<AuditedProposal<P>>,
    /// Ids of proposals excluded by a blocking rule
    pub blocked: Vec<String>,
    /// Lifecycle status
    pub status: PlanStatus,
    /// Monotonic version
    pub version: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Approver
    pub approved_by: Option<String>,
    /// Approval time
    pub approved_at: Option<DateTime<Utc>>,
    /// Rejection reason
    pub rejection_reason: Option<String>,
}

impl ProposalPlan<StrategyProposal> {
    /// Hand an approved strategy plan to the execution engine
    ///
    /// Returns `None` until the plan is approved.
    #[must_use]
    pub fn to_strategy_plan(&self) -> Option<StrategyPlan> {
        (self.status == PlanStatus::Approved).then(|| StrategyPlan {
            id: self.id.to_string(),
            proposals: self.proposals.iter().map(|a| a.proposal.clone()).collect(),
        })
    }
}

/// Generic audit → plan → approve pipeline
#[derive(Debug)]
pub struct ProposalPipeline<P: Proposal> {
    category: LogCategory,
    rules: Vec<AuditRule<P>>,
    log: Arc<ExecutionLog>,
}

impl<P: Proposal> ProposalPipeline<P> {
    /// Create pipeline
    #[must_use]
    pub fn new(category: LogCategory, rules: Vec<AuditRule<P>>, log: Arc<ExecutionLog>) -> Self {
        Self {
            category,
            rules,
            log,
        }
    }

    /// Rule table in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[AuditRule<P>] {
        &self.rules
    }

    /// Run every rule against every proposal
    pub fn audit(&self, proposals: &[P]) -> Vec<AuditedProposal<P>> {
        let audited: Vec<AuditedProposal<P>> = proposals
            .iter()
            .map(|proposal| {
                let findings: Vec<AuditFinding> = self
                    .rules
                    .iter()
                    .filter_map(|rule| {
                        (rule.check)(proposal).map(|message| AuditFinding {
                            rule_id: rule.id.to_string(),
                            severity: rule.severity,
                            message,
                        })
                    })
                    .collect();
                let decision = findings
                    .iter()
                    .map(|f| f.severity)
                    .fold(GateDecision::Allow, GateDecision::join);
                AuditedProposal {
                    proposal: proposal.clone(),
                    decision,
                    findings,
                }
            })
            .collect();

        let mut blocked = 0;
        for a in audited.iter().filter(|a| a.decision == GateDecision::Block) {
            blocked += 1;
            tracing::warn!(
                proposal = a.proposal.id(),
                title = a.proposal.title(),
                findings = a.findings.len(),
                "proposal blocked by audit"
            );
        }
        self.log.record(
            self.category,
            format!("Audited {} proposals, {blocked} blocked", audited.len()),
            LogContext::empty(),
            None,
        );
        audited
    }

    /// Build a plan from audited proposals
    ///
    /// Blocked proposals are excluded and listed; the rest are ordered by
    /// risk ascending, then id.
    pub fn plan(&self, audited: Vec<AuditedProposal<P>>) -> ProposalPlan<P> {
        let (blocked, mut accepted): (Vec<_>, Vec<_>) = audited
            .into_iter()
            .partition(|a| a.decision == GateDecision::Block);
        accepted.sort_by(|a, b| {
            a.proposal
                .risk_level()
                .cmp(&b.proposal.risk_level())
                .then_with(|| a.proposal.id().cmp(b.proposal.id()))
        });

        let plan = ProposalPlan {
            id: ProposalPlanId::new(),
            proposals: accepted,
            blocked: blocked.iter().map(|a| a.proposal.id().to_string()).collect(),
            status: PlanStatus::PendingApproval,
            version: 1,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
        };

        self.log.record(
            self.category,
            format!(
                "Planned {} proposals ({} blocked)",
                plan.proposals.len(),
                plan.blocked.len()
            ),
            LogContext::proposal_plan(plan.id),
            Some(serde_json::json!({
                "order": plan.proposals.iter().map(|a| a.proposal.id()).collect::<Vec<_>>(),
                "blocked": plan.blocked,
            })),
        );
        plan
    }

    /// Audit then plan
    pub fn run(&self, proposals: &[P]) -> ProposalPlan<P> {
        let audited = self.audit(proposals);
        self.plan(audited)
    }

    /// Approve a pending plan
    ///
    /// # Errors
    /// `IllegalTransition` unless the plan is pending approval.
    pub fn approve(
        &self,
        plan: &ProposalPlan<P>,
        approver: &str,
    ) -> PipelineResult<ProposalPlan<P>> {
        validate_plan_transition(plan.status, PlanStatus::Approved)?;

        let mut next = plan.clone();
        next.status = PlanStatus::Approved;
        next.version += 1;
        next.approved_by = Some(approver.to_string());
        next.approved_at = Some(Utc::now());

        self.log.record(
            self.category,
            format!("Proposal plan approved by {approver}"),
            LogContext::proposal_plan(next.id),
            None,
        );
        Ok(next)
    }

    /// Reject a pending plan
    ///
    /// # Errors
    /// - `MissingReason` when `reason` is blank
    /// - `IllegalTransition` unless the plan is pending approval
    pub fn reject(
        &self,
        plan: &ProposalPlan<P>,
        reviewer: &str,
        reason: &str,
    ) -> PipelineResult<ProposalPlan<P>> {
        if reason.trim().is_empty() {
            return Err(PipelineError::MissingReason {
                action: "reject a proposal plan",
            });
        }
        validate_plan_transition(plan.status, PlanStatus::Rejected)?;

        let mut next = plan.clone();
        next.status = PlanStatus::Rejected;
        next.version += 1;
        next.rejection_reason = Some(reason.to_string());

        self.log.record(
            self.category,
            format!("Proposal plan rejected by {reviewer}: {reason}"),
            LogContext::proposal_plan(next.id),
            None,
        );
        Ok(next)
    }
}
