//! Error types for Sporeline Core
//!
//! The pipeline itself is total over its typed inputs: gate decisions,
//! rejections and pauses are values, not errors. What remains here:
//! - Invalid references (unknown plan, step or rollback ids)
//! - Illegal lifecycle transitions
//! - Missing operator input (rejection reasons)
//! - Dependency cycles found by the strict topological order
//! - Configuration loading failures

use crate::types::{PlanId, RollbackId, StepId};
use std::path::PathBuf;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Referenced entity does not exist
    #[error("not found: {0}")]
    NotFound(#[from] NotFound),

    /// Lifecycle transition not permitted by the state machine
    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        /// Entity kind ("plan", "rollback", "step")
        entity: &'static str,
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// A rejection or override was submitted without a reason
    #[error("a non-empty reason is required to {action}")]
    MissingReason {
        /// Action that needed the reason
        action: &'static str,
    },

    /// Step work requested while the plan is not approved
    #[error("plan {plan_id} is {status}; steps can only start on an approved plan")]
    PlanNotActive {
        /// Plan the step belongs to
        plan_id: PlanId,
        /// Plan status at the time of the request
        status: String,
    },

    /// Intra-plan dependencies do not form a DAG
    #[error("dependency cycle among steps: {0:?}")]
    DependencyCycle(Vec<StepId>),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Check if error is an invalid reference
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the same request could succeed after other operator actions
    ///
    /// A plan that is paused or still pending approval can become active
    /// again; unknown ids and cycles cannot fix themselves.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PlanNotActive { .. })
    }

    /// Create illegal transition error
    pub fn illegal_transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Invalid references
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    /// Unknown execution plan
    #[error("plan {0}")]
    Plan(PlanId),

    /// Unknown step within a plan
    #[error("step {0}")]
    Step(StepId),

    /// Unknown rollback plan
    #[error("rollback {0}")]
    Rollback(RollbackId),
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error while reading a config file
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but violate constraints
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
