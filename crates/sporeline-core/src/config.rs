//! Pipeline configuration
//!
//! Defaults match the facility's standing thresholds. A TOML file may
//! override any subset:
//!
//! ```toml
//! log_capacity = 10000
//!
//! [gate]
//! contamination_warn = 65.0
//! contamination_block = 80.0
//!
//! [approval]
//! operations_role = "shift-lead"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default execution log capacity
pub const DEFAULT_LOG_CAPACITY: usize = 5000;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum retained log entries
    pub log_capacity: usize,
    /// Safety gate defaults
    pub gate: GateConfig,
    /// Approval roles
    pub approval: ApprovalConfig,
    /// Rollback generation
    pub rollback: RollbackConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With log capacity
    #[inline]
    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// With contamination thresholds
    #[inline]
    #[must_use]
    pub fn with_contamination_thresholds(mut self, warn: f64, block: f64) -> Self {
        self.gate.contamination_warn = warn;
        self.gate.contamination_block = block;
        self
    }

    /// With operations role
    #[inline]
    #[must_use]
    pub fn with_operations_role(mut self, role: impl Into<String>) -> Self {
        self.approval.operations_role = role.into();
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on malformed TOML
    /// - `ConfigError::Invalid` when values violate constraints
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` / `ConfigError::Invalid` as for [`Self::from_toml_str`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loading pipeline config");
        Self::from_toml_str(&source)
    }

    /// Check value constraints
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_capacity == 0 {
            return Err(ConfigError::Invalid("log_capacity must be positive".to_string()));
        }
        let GateConfig {
            contamination_warn: warn,
            contamination_block: block,
        } = self.gate;
        if !(0.0..=100.0).contains(&warn) || !(0.0..=100.0).contains(&block) {
            return Err(ConfigError::Invalid(
                "contamination thresholds must lie within 0..=100".to_string(),
            ));
        }
        if warn > block {
            return Err(ConfigError::Invalid(format!(
                "contamination_warn ({warn}) exceeds contamination_block ({block})"
            )));
        }
        if self.approval.operations_role.trim().is_empty() {
            return Err(ConfigError::Invalid("operations_role must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            gate: GateConfig::default(),
            approval: ApprovalConfig::default(),
            rollback: RollbackConfig::default(),
        }
    }
}

/// Global contamination thresholds used when a step declares no ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Warn at or above this score
    pub contamination_warn: f64,
    /// Block at or above this score
    pub contamination_block: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            contamination_warn: 70.0,
            contamination_block: 85.0,
        }
    }
}

/// Sign-off roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Always required
    pub operations_role: String,
    /// Required when any step checks contamination risk
    pub quality_role: String,
    /// Required when any step comes from a strategy plan
    pub strategy_role: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            operations_role: "operations".to_string(),
            quality_role: "quality-assurance".to_string(),
            strategy_role: "facility-manager".to_string(),
        }
    }
}

/// Rollback generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Floor for each rollback step's expected duration
    pub min_duration_minutes: u32,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            min_duration_minutes: 15,
        }
    }
}
