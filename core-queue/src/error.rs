use gateway_traits::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Pending upload {upload_id} not found")]
    ItemNotFound { upload_id: String },

    #[error("Invalid upload ID: {0}")]
    InvalidUploadId(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid change descriptor: {field} - {message}")]
    InvalidChange { field: String, message: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Upload {upload_id} has an unresolved {conflict} conflict")]
    UnresolvedConflict { upload_id: String, conflict: String },

    #[error("Resolution {resolution} is not valid for a {conflict} conflict")]
    InvalidResolution { resolution: String, conflict: String },

    #[error("Upload {upload_id} already has a recorded resolution")]
    ResolutionExists { upload_id: String },

    #[error("Upload {upload_id} is being executed and cannot be withdrawn")]
    ItemInFlight { upload_id: String },

    #[error(
        "Insufficient {rail} balance for upload {upload_id}: need {required}, have {available}"
    )]
    InsufficientBalance {
        upload_id: String,
        rail: String,
        required: u64,
        available: u64,
    },

    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl From<GatewayError> for QueueError {
    fn from(err: GatewayError) -> Self {
        QueueError::Gateway(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
