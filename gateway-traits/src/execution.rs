//! Execution Service Contract
//!
//! Defines the boundary between the reconciliation engine and the host
//! component that actually signs and broadcasts publishing transactions
//! (typically a background sync daemon). The engine never touches the wire:
//! it hands priced, approved work to the execution service and consumes the
//! progress events the host pushes back.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{GatewayError, Result};

/// The kind of remote mutation a queued change requires.
///
/// Only `Upload` carries file content to the network; every other kind is a
/// metadata-only mutation whose published footprint is minuscule, which is
/// why the pricing layer treats them as free regardless of local file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// New or changed file content to publish
    Upload,
    /// File moved to a different parent
    Move,
    /// File renamed in place
    Rename,
    /// File hidden from the drive listing
    Hide,
    /// Previously hidden file restored to the listing
    Unhide,
    /// File removed from the drive listing (content stays on the network)
    Delete,
}

impl OperationKind {
    /// Whether this operation publishes only metadata, never file content.
    pub fn is_metadata_only(&self) -> bool {
        !matches!(self, OperationKind::Upload)
    }

    /// Human-readable description of the remote mutation.
    ///
    /// Exhaustively matched so a new operation kind fails to compile until a
    /// description is provided for it.
    pub fn description(&self) -> &'static str {
        match self {
            OperationKind::Upload => "Publish file content",
            OperationKind::Move => "Move to a new folder",
            OperationKind::Rename => "Rename file",
            OperationKind::Hide => "Hide from drive",
            OperationKind::Unhide => "Restore to drive",
            OperationKind::Delete => "Remove from drive",
        }
    }

    /// String representation used at the gateway boundary
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Upload => "upload",
            OperationKind::Move => "move",
            OperationKind::Rename => "rename",
            OperationKind::Hide => "hide",
            OperationKind::Unhide => "unhide",
            OperationKind::Delete => "delete",
        }
    }
}

impl FromStr for OperationKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(OperationKind::Upload),
            "move" => Ok(OperationKind::Move),
            "rename" => Ok(OperationKind::Rename),
            "hide" => Ok(OperationKind::Hide),
            "unhide" => Ok(OperationKind::Unhide),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(GatewayError::Rejected(format!(
                "unknown operation kind: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The payment mechanism chosen for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRail {
    /// Under the free-tier threshold or metadata-only; nothing is charged
    Free,
    /// Settled against the prepaid credit balance
    Credit,
    /// Settled in the network's native token
    Token,
}

impl PaymentRail {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRail::Free => "free",
            PaymentRail::Credit => "credit",
            PaymentRail::Token => "token",
        }
    }
}

impl std::fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the execution service needs to perform one remote mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPayload {
    /// Local path of the candidate file
    pub local_path: PathBuf,
    /// Name to publish under (may differ from the on-disk name after a
    /// keep-both conflict resolution)
    pub file_name: String,
    /// Size in bytes
    pub file_size: u64,
    /// The remote mutation required
    pub operation: OperationKind,
    /// Prior location/name, present for move and rename operations
    pub previous_path: Option<PathBuf>,
    /// Hex digest of the local content, when the watcher computed one
    pub content_hash: Option<String>,
    /// Small payloads may be passed inline; the execution service reads from
    /// `local_path` otherwise
    #[serde(skip)]
    pub content: Option<Bytes>,
}

/// Acknowledgement returned by a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    /// Echo of the submitted upload id
    pub upload_id: String,
    /// Unix timestamp at which the execution service accepted the work
    pub accepted_at: i64,
}

/// Execution lifecycle status reported back by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Work is in flight
    Uploading,
    /// Remote mutation confirmed
    Completed,
    /// Remote mutation failed; retryable
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Uploading => "uploading",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One progress tuple pushed by the execution service.
///
/// Events for a given `upload_id` arrive in non-decreasing progress order up
/// to a terminal status; no ordering holds across different ids. A late
/// event for an id the engine no longer tracks is expected after a
/// cancellation and must be discarded, not treated as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// The upload the event belongs to
    pub upload_id: String,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Lifecycle status at the time of the event
    pub status: ExecutionStatus,
    /// Error message, populated iff status is `Failed`
    pub error: Option<String>,
}

/// Host component that signs and broadcasts remote mutations.
///
/// Submission is fire-and-forget from the engine's perspective: the ack only
/// confirms the work was accepted, and all further lifecycle information
/// arrives through [`ExecutionEvent`]s pushed into the orchestrator.
/// Cancellation is advisory; the host may complete an already-broadcast
/// mutation regardless.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Submit one approved unit of work on the given payment rail.
    async fn submit(
        &self,
        upload_id: &str,
        payload: UploadPayload,
        rail: PaymentRail,
    ) -> Result<SubmitAck>;

    /// Request cancellation of in-flight work. Best-effort.
    async fn cancel(&self, upload_id: &str) -> Result<()>;
}
