//! Execution Log
//!
//! Append-only, bounded audit trail shared by every pipeline component.
//! Once the configured capacity is exceeded the oldest entries are dropped.
//! `add` is serialized through a single mutex so append order and eviction
//! stay consistent under concurrent writers.

use crate::config::DEFAULT_LOG_CAPACITY;
use crate::types::{LogEntryId, PlanId, ProposalPlanId, RollbackId, StepId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Category of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogCategory {
    /// Upstream plans compiled into steps
    Ingest,
    /// Sequencing and conflict detection
    Planning,
    /// Approve/reject/resume decisions
    Approval,
    /// Gate evaluations
    SafetyGate,
    /// Step transitions and monitor ticks
    Monitor,
    /// Rollback generation and transitions
    Rollback,
    /// Log exports
    Export,
    /// Optimization proposal pipeline
    Optimization,
    /// Strategy proposal pipeline
    Strategy,
    /// Refinement proposal pipeline
    Refinement,
}

impl LogCategory {
    /// Stable kebab-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Planning => "planning",
            Self::Approval => "approval",
            Self::SafetyGate => "safety-gate",
            Self::Monitor => "monitor",
            Self::Rollback => "rollback",
            Self::Export => "export",
            Self::Optimization => "optimization",
            Self::Strategy => "strategy",
            Self::Refinement => "refinement",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entities an entry refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    /// Execution plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    /// Step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// Rollback plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_id: Option<RollbackId>,
    /// Proposal plan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_plan_id: Option<ProposalPlanId>,
}

impl LogContext {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Context for a plan
    #[inline]
    #[must_use]
    pub fn plan(plan_id: PlanId) -> Self {
        Self {
            plan_id: Some(plan_id),
            ..Self::default()
        }
    }

    /// Context for a step, optionally within a plan
    #[inline]
    #[must_use]
    pub fn step(plan_id: Option<PlanId>, step_id: StepId) -> Self {
        Self {
            plan_id,
            step_id: Some(step_id),
            ..Self::default()
        }
    }

    /// Add rollback id
    #[inline]
    #[must_use]
    pub fn with_rollback(mut self, rollback_id: RollbackId) -> Self {
        self.rollback_id = Some(rollback_id);
        self
    }

    /// Context for a proposal plan
    #[inline]
    #[must_use]
    pub fn proposal_plan(proposal_plan_id: ProposalPlanId) -> Self {
        Self {
            proposal_plan_id: Some(proposal_plan_id),
            ..Self::default()
        }
    }
}

/// Immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// Entry id
    pub id: LogEntryId,
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
    /// Category
    pub category: LogCategory,
    /// Message
    pub message: String,
    /// Referenced entities
    pub context: LogContext,
    /// Structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ExecutionLogEntry {
    /// Create new entry stamped now
    #[must_use]
    pub fn new(category: LogCategory, message: impl Into<String>, context: LogContext) -> Self {
        Self {
            id: LogEntryId::new(),
            timestamp: Utc::now(),
            category,
            message: message.into(),
            context,
            details: None,
        }
    }

    /// With structured details
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Full snapshot of the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogExport {
    /// Snapshot time
    pub exported_at: DateTime<Utc>,
    /// Number of entries in the snapshot
    pub total: usize,
    /// Entries, oldest first
    pub entries: Vec<ExecutionLogEntry>,
}

/// Bounded append-only log
#[derive(Debug)]
pub struct ExecutionLog {
    capacity: usize,
    inner: Mutex<VecDeque<ExecutionLogEntry>>,
}

impl ExecutionLog {
    /// Create log with the given capacity (at least 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// Append an entry, evicting the oldest ones past capacity
    pub fn add(&self, entry: ExecutionLogEntry) -> LogEntryId {
        let id = entry.id;
        let mut guard = self.inner.lock();
        guard.push_back(entry);
        while guard.len() > self.capacity {
            guard.pop_front();
        }
        id
    }

    /// Build, mirror to tracing, and append an entry
    pub fn record(
        &self,
        category: LogCategory,
        message: impl Into<String>,
        context: LogContext,
        details: Option<serde_json::Value>,
    ) -> LogEntryId {
        let mut entry = ExecutionLogEntry::new(category, message, context);
        entry.details = details;
        tracing::debug!(category = %entry.category, message = %entry.message, "execution log");
        self.add(entry)
    }

    /// Entries, oldest first, optionally filtered by category
    #[must_use]
    pub fn list(&self, category: Option<LogCategory>) -> Vec<ExecutionLogEntry> {
        let guard = self.inner.lock();
        guard
            .iter()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .cloned()
            .collect()
    }

    /// The `n` most recent entries, oldest first
    #[must_use]
    pub fn get_recent(&self, n: usize) -> Vec<ExecutionLogEntry> {
        let guard = self.inner.lock();
        let skip = guard.len().saturating_sub(n);
        guard.iter().skip(skip).cloned().collect()
    }

    /// Snapshot of every retained entry
    ///
    /// The export itself is recorded after the snapshot is taken.
    #[must_use]
    pub fn export(&self) -> LogExport {
        let entries: Vec<ExecutionLogEntry> = self.inner.lock().iter().cloned().collect();
        let snapshot = LogExport {
            exported_at: Utc::now(),
            total: entries.len(),
            entries,
        };
        self.record(
            LogCategory::Export,
            format!("Exported {} log entries", snapshot.total),
            LogContext::empty(),
            None,
        );
        snapshot
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.lock().clear();
        tracing::info!("execution log cleared");
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// No entries retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Maximum retained entries
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(category: LogCategory, message: &str) -> ExecutionLogEntry {
        ExecutionLogEntry::new(category, message, LogContext::empty())
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let log = ExecutionLog::new(3);
        for i in 0..5 {
            log.add(entry(LogCategory::Monitor, &format!("tick {i}")));
        }
        let messages: Vec<String> = log.list(None).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["tick 2", "tick 3", "tick 4"]);
    }

    #[test]
    fn list_filters_by_category() {
        let log = ExecutionLog::default();
        log.add(entry(LogCategory::Ingest, "ingested"));
        log.add(entry(LogCategory::Approval, "approved"));
        log.add(entry(LogCategory::Ingest, "ingested again"));

        assert_eq!(log.list(Some(LogCategory::Ingest)).len(), 2);
        assert_eq!(log.list(Some(LogCategory::Rollback)).len(), 0);
        assert_eq!(log.list(None).len(), 3);
    }

    #[test]
    fn recent_returns_tail_oldest_first() {
        let log = ExecutionLog::default();
        for i in 0..4 {
            log.add(entry(LogCategory::Monitor, &format!("m{i}")));
        }
        let recent: Vec<String> = log.get_recent(2).into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["m2", "m3"]);
        assert_eq!(log.get_recent(10).len(), 4);
    }

    #[test]
    fn export_snapshot_excludes_its_own_entry() {
        let log = ExecutionLog::default();
        log.add(entry(LogCategory::Planning, "sequenced"));

        let export = log.export();
        assert_eq!(export.total, 1);
        assert_eq!(export.entries.len(), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.list(Some(LogCategory::Export)).len(), 1);
    }

    #[test]
    fn clear_empties_log() {
        let log = ExecutionLog::new(10);
        log.add(entry(LogCategory::Rollback, "generated"));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.capacity(), 10);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let log = ExecutionLog::new(0);
        log.add(entry(LogCategory::Monitor, "a"));
        log.add(entry(LogCategory::Monitor, "b"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.list(None)[0].message, "b");
    }
}
