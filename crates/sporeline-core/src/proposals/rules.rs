//! Proposal types and their audit rule tables

use super::{AuditRule, Proposal, ProposalPipeline};
use crate::logging::{ExecutionLog, LogCategory};
use crate::types::{GateDecision, RiskLevel};
use crate::upstream::StrategyProposal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Claimed improvements above this are treated as implausible
const MAX_PLAUSIBLE_IMPROVEMENT_PCT: f64 = 50.0;

/// Operational tuning proposal (yield, energy, labor efficiency)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationProposal {
    /// Proposal id
    pub id: String,
    /// Title
    pub title: String,
    /// Metric being optimized (e.g. "yield-kg-per-m2")
    pub target_metric: String,
    /// Expected improvement (%)
    pub expected_improvement_pct: f64,
    /// Declared risk
    pub risk_level: RiskLevel,
    /// Changes grow-room environment setpoints
    #[serde(default)]
    pub affects_environment: bool,
    /// Implementation steps
    #[serde(default)]
    pub implementation_steps: Vec<String>,
}

impl Proposal for OptimizationProposal {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    fn implementation_steps(&self) -> &[String] {
        &self.implementation_steps
    }
}

/// Parameter refinement proposal (substrate mix, humidity setpoint, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementProposal {
    /// Proposal id
    pub id: String,
    /// Title
    pub title: String,
    /// Parameter being refined
    pub parameter: String,
    /// Value in effect
    pub current_value: f64,
    /// Proposed value
    pub proposed_value: f64,
    /// Largest acceptable relative change (%)
    pub max_change_pct: f64,
    /// Declared risk
    pub risk_level: RiskLevel,
    /// Implementation steps
    #[serde(default)]
    pub implementation_steps: Vec<String>,
}

impl RefinementProposal {
    /// Relative change from current to proposed value (%)
    ///
    /// A change away from zero is reported as infinite.
    #[must_use]
    pub fn change_pct(&self) -> f64 {
        let delta = (self.proposed_value - self.current_value).abs();
        if self.current_value == 0.0 {
            if delta == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            delta / self.current_value.abs() * 100.0
        }
    }
}

impl Proposal for RefinementProposal {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    fn implementation_steps(&self) -> &[String] {
        &self.implementation_steps
    }
}

impl Proposal for StrategyProposal {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    fn implementation_steps(&self) -> &[String] {
        &self.implementation_steps
    }
}

fn no_steps<P: Proposal>(proposal: &P) -> Option<String> {
    proposal
        .implementation_steps()
        .is_empty()
        .then(|| format!("{} has no implementation steps", proposal.id()))
}

fn high_risk<P: Proposal>(proposal: &P) -> Option<String> {
    (proposal.risk_level() == RiskLevel::High)
        .then(|| format!("{} is high risk and needs review", proposal.id()))
}

/// Rule table for optimization proposals
#[must_use]
pub fn optimization_rules() -> Vec<AuditRule<OptimizationProposal>> {
    vec![
        AuditRule {
            id: "missing-implementation",
            description: "A proposal must say how it will be carried out",
            severity: GateDecision::Block,
            check: no_steps,
        },
        AuditRule {
            id: "high-risk-environment-change",
            description: "High-risk setpoint changes are not accepted automatically",
            severity: GateDecision::Block,
            check: |p| {
                (p.affects_environment && p.risk_level == RiskLevel::High).then(|| {
                    format!("{} changes environment setpoints at high risk", p.id)
                })
            },
        },
        AuditRule {
            id: "implausible-improvement",
            description: "Large improvement claims need evidence",
            severity: GateDecision::Warn,
            check: |p| {
                (p.expected_improvement_pct > MAX_PLAUSIBLE_IMPROVEMENT_PCT).then(|| {
                    format!(
                        "{} claims {}% improvement on {}",
                        p.id, p.expected_improvement_pct, p.target_metric
                    )
                })
            },
        },
        AuditRule {
            id: "high-risk",
            description: "High-risk proposals need reviewer attention",
            severity: GateDecision::Warn,
            check: high_risk,
        },
    ]
}

/// Rule table for strategy proposals
#[must_use]
pub fn strategy_rules() -> Vec<AuditRule<StrategyProposal>> {
    vec![
        AuditRule {
            id: "missing-description",
            description: "Strategic changes must be described",
            severity: GateDecision::Block,
            check: |p| {
                p.description
                    .trim()
                    .is_empty()
                    .then(|| format!("{} has no description", p.id))
            },
        },
        AuditRule {
            id: "missing-implementation",
            description: "Without steps the rollback falls back to a generic restore",
            severity: GateDecision::Warn,
            check: no_steps,
        },
        AuditRule {
            id: "high-risk",
            description: "High-risk proposals need reviewer attention",
            severity: GateDecision::Warn,
            check: high_risk,
        },
    ]
}

/// Rule table for refinement proposals
#[must_use]
pub fn refinement_rules() -> Vec<AuditRule<RefinementProposal>> {
    vec![
        AuditRule {
            id: "change-exceeds-limit",
            description: "Refinements must stay within their declared change budget",
            severity: GateDecision::Block,
            check: |p| {
                let change = p.change_pct();
                (change > p.max_change_pct).then(|| {
                    format!(
                        "{} changes {} by {change:.1}% (limit {}%)",
                        p.id, p.parameter, p.max_change_pct
                    )
                })
            },
        },
        AuditRule {
            id: "no-op",
            description: "A refinement should change something",
            severity: GateDecision::Warn,
            check: |p| {
                #[allow(clippy::float_cmp)]
                let unchanged = p.proposed_value == p.current_value;
                unchanged.then(|| format!("{} leaves {} unchanged", p.id, p.parameter))
            },
        },
        AuditRule {
            id: "high-risk",
            description: "High-risk proposals need reviewer attention",
            severity: GateDecision::Warn,
            check: high_risk,
        },
    ]
}

/// Optimization pipeline
#[must_use]
pub fn optimization_pipeline(log: Arc<ExecutionLog>) -> ProposalPipeline<OptimizationProposal> {
    ProposalPipeline::new(LogCategory::Optimization, optimization_rules(), log)
}

/// Strategy pipeline
#[must_use]
pub fn strategy_pipeline(log: Arc<ExecutionLog>) -> ProposalPipeline<StrategyProposal> {
    ProposalPipeline::new(LogCategory::Strategy, strategy_rules(), log)
}

/// Refinement pipeline
#[must_use]
pub fn refinement_pipeline(log: Arc<ExecutionLog>) -> ProposalPipeline<RefinementProposal> {
    ProposalPipeline::new(LogCategory::Refinement, refinement_rules(), log)
}
