//! Safety Gate
//!
//! Pure decision function mapping a step and a telemetry snapshot to
//! allow / warn / block. The only side effect is an audit entry per
//! evaluation. Cross-step contention is the planner's job, not the gate's.
//!
//! # Contamination thresholds
//!
//! Two paths exist and are kept deliberately distinct:
//! - When the step declares `contamination_risk_max`, any reading above it
//!   flags a spike, with no warn/block split at that point.
//! - Otherwise the global warn threshold flags the spike.
//!
//! In both cases severity is resolved afterwards by comparing the reading
//! against the global warn and block thresholds. A spike below the global
//! warn threshold is recorded but does not change the decision.

use crate::config::GateConfig;
use crate::logging::{ExecutionLog, LogCategory, LogContext};
use crate::types::{
    ExecutionStep, GateChecks, GateDecision, GateId, SafetyGateResult, TelemetrySnapshot,
};
use chrono::Utc;
use std::sync::Arc;

/// Rationale for an emergency stop
pub const EMERGENCY_STOP_RATIONALE: &str = "Emergency stop engaged";
/// Sole alternative offered on emergency stop
pub const EMERGENCY_STOP_ALTERNATIVE: &str = "Hold execution and inspect onsite";
/// Alternative appended to every block
pub const BLOCK_ALTERNATIVE: &str = "Pause execution and re-run safety checks after remediation";
/// Alternative appended to every warn
pub const WARN_ALTERNATIVE: &str = "Require manual approval before proceeding.";

/// Per-evaluation options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOptions {
    /// Short-circuit everything to block
    pub emergency_stop: bool,
    /// Global warn threshold for contamination risk
    pub contamination_threshold: f64,
    /// Global block threshold for contamination risk
    pub contamination_block_threshold: f64,
}

impl GateOptions {
    /// With emergency stop engaged
    #[inline]
    #[must_use]
    pub fn emergency(mut self) -> Self {
        self.emergency_stop = true;
        self
    }

    /// With contamination thresholds
    #[inline]
    #[must_use]
    pub fn with_thresholds(mut self, warn: f64, block: f64) -> Self {
        self.contamination_threshold = warn;
        self.contamination_block_threshold = block;
        self
    }
}

impl Default for GateOptions {
    fn default() -> Self {
        Self::from(&GateConfig::default())
    }
}

impl From<&GateConfig> for GateOptions {
    fn from(config: &GateConfig) -> Self {
        Self {
            emergency_stop: false,
            contamination_threshold: config.contamination_warn,
            contamination_block_threshold: config.contamination_block,
        }
    }
}

/// Safety gate
#[derive(Debug, Clone)]
pub struct SafetyGate {
    log: Arc<ExecutionLog>,
    defaults: GateOptions,
}

impl SafetyGate {
    /// Create gate with configured default thresholds
    #[must_use]
    pub fn new(config: &GateConfig, log: Arc<ExecutionLog>) -> Self {
        Self {
            log,
            defaults: GateOptions::from(config),
        }
    }

    /// Options built from configuration, emergency stop off
    #[inline]
    #[must_use]
    pub fn default_options(&self) -> GateOptions {
        self.defaults
    }

    /// Evaluate one step
    pub fn evaluate_step(
        &self,
        step: &ExecutionStep,
        telemetry: Option<&TelemetrySnapshot>,
        options: &GateOptions,
    ) -> SafetyGateResult {
        let result = decide(step, telemetry, options);

        if result.is_flagged() {
            tracing::warn!(
                step = %result.step_id,
                decision = %result.decision,
                "safety gate flagged step"
            );
        }

        self.log.record(
            LogCategory::SafetyGate,
            format!("Gate {} for step {}", result.decision, result.step_id),
            LogContext::step(None, result.step_id.clone()),
            Some(serde_json::json!({
                "gate_id": result.gate_id,
                "decision": result.decision,
                "checks": result.checks,
                "rationale": result.rationale,
            })),
        );

        result
    }

    /// Evaluate every step independently
    pub fn evaluate_plan(
        &self,
        steps: &[ExecutionStep],
        telemetry: Option<&TelemetrySnapshot>,
        options: &GateOptions,
    ) -> Vec<SafetyGateResult> {
        steps
            .iter()
            .map(|step| self.evaluate_step(step, telemetry, options))
            .collect()
    }
}

/// The decision itself, free of logging
#[must_use]
pub fn decide(
    step: &ExecutionStep,
    telemetry: Option<&TelemetrySnapshot>,
    options: &GateOptions,
) -> SafetyGateResult {
    let mut result = SafetyGateResult {
        gate_id: GateId::new(),
        step_id: step.id.clone(),
        decision: GateDecision::Allow,
        rationale: Vec::new(),
        alternatives: Vec::new(),
        checks: GateChecks::default(),
        evaluated_at: Utc::now(),
    };

    if options.emergency_stop {
        result.decision = GateDecision::Block;
        result.checks.emergency_stop = true;
        result.rationale.push(EMERGENCY_STOP_RATIONALE.to_string());
        result.alternatives.push(EMERGENCY_STOP_ALTERNATIVE.to_string());
        return result;
    }

    let Some(telemetry) = telemetry else {
        result
            .rationale
            .push("No telemetry supplied; nothing to check".to_string());
        return result;
    };

    let watch = &step.telemetry_watch;
    let mut checks = GateChecks::default();
    let mut rationale = Vec::new();

    let contamination = telemetry.contamination_risk_score;
    if let Some(score) = contamination {
        match watch.contamination_risk_max {
            Some(max) if score > max => {
                checks.contamination_spike = true;
                rationale.push(format!(
                    "Contamination risk {score} exceeds step ceiling {max}"
                ));
            }
            Some(_) => {}
            None if score >= options.contamination_threshold => {
                checks.contamination_spike = true;
                rationale.push(format!(
                    "Contamination risk {score} at or above threshold {}",
                    options.contamination_threshold
                ));
            }
            None => {}
        }
    }

    if let (Some(load), Some(max)) = (telemetry.equipment_load_pct, watch.equipment_load_max) {
        if load > max {
            checks.equipment_overload = true;
            rationale.push(format!("Equipment load {load}% exceeds ceiling {max}%"));
        }
    }

    if let (Some(labor), Some(max)) = (telemetry.labor_utilization_pct, watch.labor_utilization_max)
    {
        if labor > max {
            checks.labor_mismatch = true;
            rationale.push(format!("Labor utilization {labor}% exceeds ceiling {max}%"));
        }
    }

    if let (Some(temp), Some(bounds)) = (telemetry.temperature_c, watch.environment) {
        if let Some(max) = bounds.temp_max.filter(|max| temp > *max) {
            checks.environmental_limit = true;
            rationale.push(format!("Temperature {temp}°C above maximum {max}°C"));
        }
        if let Some(min) = bounds.temp_min.filter(|min| temp < *min) {
            checks.environmental_limit = true;
            rationale.push(format!("Temperature {temp}°C below minimum {min}°C"));
        }
    }

    if !telemetry.regression_signals.is_empty() {
        checks.regression_detected = true;
        rationale.push(format!(
            "Regression signals detected: {}",
            telemetry.regression_signals.join(", ")
        ));
    }

    let spike_at = |threshold: f64| {
        checks.contamination_spike && contamination.is_some_and(|score| score >= threshold)
    };

    let decision = if checks.environmental_limit || spike_at(options.contamination_block_threshold)
    {
        GateDecision::Block
    } else if checks.labor_mismatch
        || checks.equipment_overload
        || checks.regression_detected
        || spike_at(options.contamination_threshold)
    {
        GateDecision::Warn
    } else {
        GateDecision::Allow
    };

    match decision {
        GateDecision::Block => result.alternatives.push(BLOCK_ALTERNATIVE.to_string()),
        GateDecision::Warn => result.alternatives.push(WARN_ALTERNATIVE.to_string()),
        GateDecision::Allow => {
            if rationale.is_empty() {
                rationale.push("All safety checks passed".to_string());
            }
        }
    }

    result.decision = decision;
    result.checks = checks;
    result.rationale = rationale;
    result
}
