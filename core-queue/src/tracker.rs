//! # Execution State Tracking
//!
//! Runtime-only bookkeeping for approved items that have been handed to the
//! execution service. Nothing here is persisted: the store is owned solely by
//! the orchestrator, created when an item is submitted and cleared a short
//! settle delay after completion (or immediately on cancellation).
//!
//! Updates for ids the tracker no longer knows are reported back to the
//! caller rather than erred: a cancelled-then-still-completing remote
//! operation is an expected race, not a fault.

use crate::item::UploadId;
use gateway_traits::ExecutionStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Live execution lifecycle of one approved item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadExecutionState {
    /// Progress percentage, monotonically non-decreasing while uploading
    pub progress: u8,
    /// Current lifecycle status
    pub status: ExecutionStatus,
    /// Error message; populated iff status is `Failed`
    pub error: Option<String>,
    /// Unix timestamp of submission
    pub started_at: i64,
}

impl UploadExecutionState {
    /// Fresh state for a newly submitted item
    pub fn new() -> Self {
        Self {
            progress: 0,
            status: ExecutionStatus::Uploading,
            error: None,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Apply a progress update.
    ///
    /// Returns `false` when the update is ignored: progress never decreases,
    /// and terminal states no longer move.
    pub fn update_progress(&mut self, progress: u8) -> bool {
        if self.status != ExecutionStatus::Uploading {
            return false;
        }
        let clamped = progress.min(100);
        if clamped < self.progress {
            return false;
        }
        self.progress = clamped;
        true
    }

    /// Mark the upload completed
    pub fn mark_completed(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.progress = 100;
        self.error = None;
    }

    /// Mark the upload failed with an optional error message
    pub fn mark_failed(&mut self, error: Option<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = error;
    }
}

impl Default for UploadExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed store of live execution states.
///
/// Plain map semantics; all synchronization lives with the orchestrator that
/// owns it.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    states: HashMap<UploadId, UploadExecutionState>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a newly submitted item, replacing any prior state
    pub fn start(&mut self, id: UploadId) {
        self.states.insert(id, UploadExecutionState::new());
    }

    pub fn get(&self, id: &UploadId) -> Option<&UploadExecutionState> {
        self.states.get(id)
    }

    pub fn get_mut(&mut self, id: &UploadId) -> Option<&mut UploadExecutionState> {
        self.states.get_mut(id)
    }

    /// Stop tracking an item, returning its final state if it was tracked
    pub fn remove(&mut self, id: &UploadId) -> Option<UploadExecutionState> {
        self.states.remove(id)
    }

    /// Whether the item is currently tracked in any state
    pub fn contains(&self, id: &UploadId) -> bool {
        self.states.contains_key(id)
    }

    /// Number of items currently in flight (not yet terminal)
    pub fn active_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| s.status == ExecutionStatus::Uploading)
            .count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Clone out the current states, for UI snapshots
    pub fn snapshot(&self) -> Vec<(UploadId, UploadExecutionState)> {
        self.states.iter().map(|(k, v)| (*k, v.clone())).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
