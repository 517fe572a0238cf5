//! # Pending Upload Model
//!
//! The unit of work flowing through the reconciliation engine: one detected
//! local change awaiting a publishing decision.
//!
//! ## Overview
//!
//! A [`LocalChange`] is the raw descriptor the file-system watcher emits. The
//! orchestrator prices and conflict-classifies it into a [`PendingUpload`],
//! which then moves through the approval gate:
//!
//! ```text
//! AwaitingApproval → Approved
//!        ↓
//!        └────────→ Rejected
//! ```
//!
//! The approval gate is deliberately separate from the execution lifecycle
//! (see `tracker`): publishing to a write-once network is irreversible, so an
//! item only ever leaves the gate through an explicit operator decision.

use crate::cost::CostEstimate;
use crate::error::{QueueError, Result};
use gateway_traits::OperationKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Type
// ============================================================================

/// Unique identifier for a pending upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Create a new random upload ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an upload ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| QueueError::InvalidUploadId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UploadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UploadId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The approval-gate state of a pending upload.
///
/// Distinct from the execution lifecycle: an `Approved` item may be idle,
/// uploading, or failed at the execution layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for an operator decision
    AwaitingApproval,
    /// Cleared for execution
    Approved,
    /// Permanently excluded from this queue cycle
    Rejected,
}

impl ApprovalStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::AwaitingApproval => "awaiting_approval",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApprovalStatus::Rejected)
    }
}

impl FromStr for ApprovalStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "awaiting_approval" => Ok(ApprovalStatus::AwaitingApproval),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a candidate change relates to the known remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// No remote counterpart or unambiguous new content
    None,
    /// Identical content already present remotely
    Duplicate,
    /// Same name under different parent semantics; ambiguous target
    FilenameConflict,
    /// Same path, divergent content hash
    ContentConflict,
}

impl ConflictType {
    pub fn is_none(&self) -> bool {
        matches!(self, ConflictType::None)
    }

    /// Whether an operator decision is required before approval
    pub fn requires_resolution(&self) -> bool {
        !self.is_none()
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::None => "none",
            ConflictType::Duplicate => "duplicate",
            ConflictType::FilenameConflict => "filename_conflict",
            ConflictType::ContentConflict => "content_conflict",
        }
    }
}

impl FromStr for ConflictType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ConflictType::None),
            "duplicate" => Ok(ConflictType::Duplicate),
            "filename_conflict" => Ok(ConflictType::FilenameConflict),
            "content_conflict" => Ok(ConflictType::ContentConflict),
            _ => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Local Change Descriptor
// ============================================================================

/// Raw change descriptor emitted by the file-system watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalChange {
    /// Local path of the candidate file
    pub local_path: PathBuf,
    /// File name of the candidate
    pub file_name: String,
    /// Size in bytes
    pub file_size: u64,
    /// The remote mutation required
    pub operation: OperationKind,
    /// Prior location/name; required for move and rename
    pub previous_path: Option<PathBuf>,
    /// Hex digest of local content, when the watcher computed one
    pub content_hash: Option<String>,
}

impl LocalChange {
    /// Validate internal consistency of the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if a move/rename is missing its previous path.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.operation, OperationKind::Move | OperationKind::Rename)
            && self.previous_path.is_none()
        {
            return Err(QueueError::InvalidChange {
                field: "previous_path".to_string(),
                message: format!("{} requires the prior location", self.operation),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Pending Upload Entity
// ============================================================================

/// One detected local change awaiting a publishing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Unique identifier, immutable for the item's lifetime
    pub id: UploadId,
    /// Local path of the candidate file
    pub local_path: PathBuf,
    /// File name of the candidate
    pub file_name: String,
    /// Size in bytes
    pub file_size: u64,
    /// The kind of remote mutation required
    pub operation: OperationKind,
    /// Prior location/name, present for move and rename
    pub previous_path: Option<PathBuf>,
    /// Hex digest of local content, when known
    pub content_hash: Option<String>,
    /// Advisory cost estimate; the rail is decided at submission time
    pub cost: CostEstimate,
    /// Advisory flag: whether the credit rail could fully cover this item at
    /// the last known balance. `None` when no balance has been observed yet.
    pub has_sufficient_credit_balance: Option<bool>,
    /// Conflict classification against known remote state
    pub conflict: ConflictType,
    /// Human-readable explanation; present iff `conflict` is not `None`
    pub conflict_details: Option<String>,
    /// Approval-gate state
    pub status: ApprovalStatus,
    /// Unix timestamp of detection
    pub created_at: i64,
}

impl PendingUpload {
    /// Build a pending upload from a validated change descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the change is inconsistent, or if a conflict is
    /// reported without its explanatory details.
    pub fn from_change(
        change: LocalChange,
        cost: CostEstimate,
        conflict: ConflictType,
        conflict_details: Option<String>,
    ) -> Result<Self> {
        change.validate()?;

        if conflict.requires_resolution() && conflict_details.is_none() {
            return Err(QueueError::InvalidChange {
                field: "conflict_details".to_string(),
                message: format!("{conflict} conflict requires details"),
            });
        }

        Ok(Self {
            id: UploadId::new(),
            local_path: change.local_path,
            file_name: change.file_name,
            file_size: change.file_size,
            operation: change.operation,
            previous_path: change.previous_path,
            content_hash: change.content_hash,
            cost,
            has_sufficient_credit_balance: None,
            conflict,
            conflict_details,
            status: ApprovalStatus::AwaitingApproval,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Transition to `Approved`.
    ///
    /// The conflict-resolution requirement is enforced by the orchestrator,
    /// which owns the resolution records; this method only validates the
    /// gate transition itself.
    ///
    /// # Errors
    ///
    /// Returns an error unless the item is awaiting approval.
    pub fn mark_approved(&mut self) -> Result<()> {
        self.validate_transition(ApprovalStatus::Approved)?;
        self.status = ApprovalStatus::Approved;
        Ok(())
    }

    /// Transition to `Rejected`. Terminal.
    ///
    /// # Errors
    ///
    /// Returns an error unless the item is awaiting approval.
    pub fn mark_rejected(&mut self) -> Result<()> {
        self.validate_transition(ApprovalStatus::Rejected)?;
        self.status = ApprovalStatus::Rejected;
        Ok(())
    }

    /// Validate a gate transition
    fn validate_transition(&self, to: ApprovalStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (ApprovalStatus::AwaitingApproval, ApprovalStatus::Approved)
                | (ApprovalStatus::AwaitingApproval, ApprovalStatus::Rejected)
        );

        if !valid {
            return Err(QueueError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!("Cannot transition from {} to {}", self.status, to),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostEstimate;

    fn change(operation: OperationKind) -> LocalChange {
        LocalChange {
            local_path: PathBuf::from("/drive/docs/report.pdf"),
            file_name: "report.pdf".to_string(),
            file_size: 4096,
            operation,
            previous_path: None,
            content_hash: Some("abc123".to_string()),
        }
    }

    #[test]
    fn test_upload_id_new() {
        let id1 = UploadId::new();
        let id2 = UploadId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_upload_id_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = UploadId::from_string(uuid_str).unwrap();
        assert_eq!(id.as_str(), uuid_str);

        assert!(UploadId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_approval_status_round_trip() {
        for status in [
            ApprovalStatus::AwaitingApproval,
            ApprovalStatus::Approved,
            ApprovalStatus::Rejected,
        ] {
            assert_eq!(
                status.as_str().parse::<ApprovalStatus>().unwrap(),
                status
            );
        }
        assert!("pending".parse::<ApprovalStatus>().is_err());
    }

    #[test]
    fn test_conflict_type_requires_resolution() {
        assert!(!ConflictType::None.requires_resolution());
        assert!(ConflictType::Duplicate.requires_resolution());
        assert!(ConflictType::FilenameConflict.requires_resolution());
        assert!(ConflictType::ContentConflict.requires_resolution());
    }

    #[test]
    fn test_move_without_previous_path_rejected() {
        let result = PendingUpload::from_change(
            change(OperationKind::Move),
            CostEstimate::free_tier(),
            ConflictType::None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_conflict_without_details_rejected() {
        let result = PendingUpload::from_change(
            change(OperationKind::Upload),
            CostEstimate::free_tier(),
            ConflictType::Duplicate,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_from_change_defaults() {
        let item = PendingUpload::from_change(
            change(OperationKind::Upload),
            CostEstimate::free_tier(),
            ConflictType::None,
            None,
        )
        .unwrap();

        assert_eq!(item.status, ApprovalStatus::AwaitingApproval);
        assert_eq!(item.conflict, ConflictType::None);
        assert!(item.has_sufficient_credit_balance.is_none());
        assert!(item.created_at > 0);
    }

    #[test]
    fn test_approve_transition() {
        let mut item = PendingUpload::from_change(
            change(OperationKind::Upload),
            CostEstimate::free_tier(),
            ConflictType::None,
            None,
        )
        .unwrap();

        item.mark_approved().unwrap();
        assert_eq!(item.status, ApprovalStatus::Approved);

        // Approving twice is invalid
        assert!(item.mark_approved().is_err());
    }

    #[test]
    fn test_item_serialization() {
        let item = PendingUpload::from_change(
            change(OperationKind::Upload),
            CostEstimate::free_tier(),
            ConflictType::None,
            None,
        )
        .unwrap();

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("awaiting_approval"));

        let back: PendingUpload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, item.id);
        assert_eq!(back.status, ApprovalStatus::AwaitingApproval);
    }

    #[test]
    fn test_reject_is_terminal() {
        let mut item = PendingUpload::from_change(
            change(OperationKind::Upload),
            CostEstimate::free_tier(),
            ConflictType::None,
            None,
        )
        .unwrap();

        item.mark_rejected().unwrap();
        assert_eq!(item.status, ApprovalStatus::Rejected);

        assert!(item.mark_approved().is_err());
        assert!(item.mark_rejected().is_err());
    }
}
