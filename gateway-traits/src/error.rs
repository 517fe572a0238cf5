use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway capability not available: {0}")]
    NotAvailable(String),

    #[error("Gateway operation failed: {0}")]
    OperationFailed(String),

    #[error("Gateway request rejected: {0}")]
    Rejected(String),

    #[error("Gateway request timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
