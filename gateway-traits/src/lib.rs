//! # Host Gateway Traits
//!
//! Service contracts between the upload reconciliation core and its external
//! collaborators.
//!
//! ## Overview
//!
//! This crate defines the boundary the core coordinates over. Each trait
//! represents a capability owned by an external component (a backend sync
//! daemon, a metadata crawler, a payment processor integration) that the core
//! consumes but never implements:
//!
//! - [`ExecutionService`](execution::ExecutionService) - Submits and cancels
//!   remote mutations; pushes [`ExecutionEvent`](execution::ExecutionEvent)s back
//! - [`BalanceOracle`](oracle::BalanceOracle) - Wallet balances in both payment
//!   currencies, plus credit top-up sessions
//! - [`PriceOracle`](oracle::PriceOracle) - Advisory publishing price quotes
//! - [`RemoteStateLookup`](remote::RemoteStateLookup) - Crawled remote drive
//!   metadata, consulted for conflict classification
//!
//! ## Error Handling
//!
//! All gateway traits use the [`GatewayError`](error::GatewayError) type.
//! Host implementations should convert their platform-specific errors into it
//! and include enough context to be actionable (paths, ids, upstream status).
//!
//! ## Thread Safety
//!
//! All gateway traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod error;
pub mod execution;
pub mod oracle;
pub mod remote;

pub use error::GatewayError;

// Re-export commonly used types
pub use execution::{
    ExecutionEvent, ExecutionService, ExecutionStatus, OperationKind, PaymentRail, SubmitAck,
    UploadPayload,
};
pub use oracle::{BalanceOracle, PriceOracle, TopUpSession};
pub use remote::{RemoteDescriptor, RemoteStateLookup};
