//! # Conflict Classification & Resolution
//!
//! Decides how a locally detected change relates to the known remote state,
//! and models the operator decisions that resolve disagreements.
//!
//! ## Overview
//!
//! Publishing is irreversible, so any ambiguity between local and remote
//! state must be settled by an explicit operator decision before the item can
//! pass the approval gate:
//!
//! - **Duplicate**: identical content already published (matched by hash)
//! - **FilenameConflict**: same name under different parent semantics
//! - **ContentConflict**: same path, divergent content hash
//!
//! Each class admits a fixed set of resolutions; [`Resolution::is_valid_for`]
//! encodes the table. Resolutions are write-once per item — changing a
//! decision means withdrawing the item and re-enqueueing it.

use crate::error::Result;
use crate::item::{ConflictType, LocalChange, UploadId};
use gateway_traits::{RemoteDescriptor, RemoteStateLookup};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::QueueError;

// ============================================================================
// Resolution Types
// ============================================================================

/// An operator decision resolving one conflicted item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Publish the local version at its estimated cost
    KeepLocal,
    /// Reconcile the local file to match remote; nothing published, free
    UseRemote,
    /// Rename the local file to avoid the collision and publish it as a new
    /// item, at cost
    KeepBoth,
    /// Permanently exclude the item from this queue cycle; no cost
    Skip,
}

impl Resolution {
    /// Whether this resolution is permitted for the given conflict class.
    ///
    /// `UseRemote` makes no sense for a duplicate (local already matches
    /// remote content), and nothing resolves a conflict-free item.
    pub fn is_valid_for(&self, conflict: ConflictType) -> bool {
        match conflict {
            ConflictType::None => false,
            ConflictType::Duplicate => {
                matches!(self, Resolution::Skip | Resolution::KeepBoth | Resolution::KeepLocal)
            }
            ConflictType::FilenameConflict | ConflictType::ContentConflict => true,
        }
    }

    /// Whether applying this resolution publishes content (and thus incurs
    /// the item's estimated cost).
    pub fn incurs_publish(&self) -> bool {
        matches!(self, Resolution::KeepLocal | Resolution::KeepBoth)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::KeepLocal => "keep_local",
            Resolution::UseRemote => "use_remote",
            Resolution::KeepBoth => "keep_both",
            Resolution::Skip => "skip",
        }
    }
}

impl FromStr for Resolution {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "keep_local" => Ok(Resolution::KeepLocal),
            "use_remote" => Ok(Resolution::UseRemote),
            "keep_both" => Ok(Resolution::KeepBoth),
            "skip" => Ok(Resolution::Skip),
            _ => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded decision for one conflicted item. Write-once per upload id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// The pending upload this decision applies to
    pub upload_id: UploadId,
    /// The decision
    pub resolution: Resolution,
    /// Optional audit note
    pub reasoning: Option<String>,
    /// Unix timestamp of the decision
    pub resolved_at: i64,
}

impl ConflictResolution {
    pub fn new(upload_id: UploadId, resolution: Resolution) -> Self {
        Self {
            upload_id,
            resolution,
            reasoning: None,
            resolved_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifies candidate changes against the crawled remote state.
///
/// Stateless; never retains references to queue items or lookup results
/// beyond the call.
pub struct ConflictClassifier {
    remote: Arc<dyn RemoteStateLookup>,
}

impl ConflictClassifier {
    /// Create a new classifier over the given remote lookup
    pub fn new(remote: Arc<dyn RemoteStateLookup>) -> Self {
        Self { remote }
    }

    /// Classify one candidate change.
    ///
    /// Returns the conflict class plus a human-readable explanation for any
    /// non-`None` class. A lookup failure degrades to `None` with a logged
    /// warning — the approval gate remains the last line of defense, and
    /// blocking detection on a flaky crawler would stall the whole queue.
    pub async fn classify(&self, change: &LocalChange) -> (ConflictType, Option<String>) {
        let remote = match self
            .remote
            .find(&change.local_path, change.content_hash.as_deref())
            .await
        {
            Ok(found) => found,
            Err(e) => {
                warn!(
                    file = %change.file_name,
                    "Remote state lookup failed, classifying as conflict-free: {e}"
                );
                return (ConflictType::None, None);
            }
        };

        let Some(remote) = remote else {
            debug!(file = %change.file_name, "No remote counterpart");
            return (ConflictType::None, None);
        };

        Self::classify_against(change, &remote)
    }

    /// Pure classification against one known remote descriptor.
    fn classify_against(
        change: &LocalChange,
        remote: &RemoteDescriptor,
    ) -> (ConflictType, Option<String>) {
        let hashes_match = match (&change.content_hash, &remote.content_hash) {
            (Some(local), Some(published)) => local == published,
            _ => false,
        };

        if hashes_match {
            return (
                ConflictType::Duplicate,
                Some(format!(
                    "Identical content is already published as \"{}\"",
                    remote.file_name
                )),
            );
        }

        if remote.path == change.local_path {
            return (
                ConflictType::ContentConflict,
                Some(format!(
                    "\"{}\" exists remotely with different content",
                    remote.file_name
                )),
            );
        }

        if remote.file_name == change.file_name {
            return (
                ConflictType::FilenameConflict,
                Some(format!(
                    "A different \"{}\" already exists at {}",
                    remote.file_name,
                    remote.path.display()
                )),
            );
        }

        // Remote counterpart found but nothing collides (e.g., matched by a
        // stale hash entry); treat as new content.
        (ConflictType::None, None)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Produce the `n`-th collision-avoiding variant of a file name, preserving
/// the extension: `"photo.jpg"` → `"photo (1).jpg"`.
pub fn collision_free_name(file_name: &str, attempt: u32) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({attempt}).{ext}"),
        _ => format!("{file_name} ({attempt})"),
    }
}

// ============================================================================
// Tests
// ============================================================================
