//! # Upload Queue Reconciliation Engine
//!
//! Turns raw locally detected changes into priced, conflict-classified,
//! operator-approvable units of work, and drives their execution against a
//! write-once, pay-to-publish storage network.
//!
//! ## Overview
//!
//! Publishing is irreversible and metered in two competing currencies, so
//! every change passes through an approval and cost-estimation gate before it
//! is transmitted. This crate manages that gate:
//! - Pricing candidate changes against the network's oracles
//! - Classifying them against known remote state (duplicates, collisions,
//!   divergent content)
//! - Selecting the payment rail per item from live balances
//! - Driving the execution lifecycle with progress, retry, and cancellation
//!
//! ## Components
//!
//! - **Pending Upload Model** (`item`): Approval-gate state machine with
//!   validated transitions
//! - **Cost Estimator** (`cost`): Free-tier classification, dual-rail quotes,
//!   queue-level breakdown
//! - **Conflict Classifier** (`conflict`): Conflict taxonomy and write-once
//!   operator resolutions
//! - **Balance Gate** (`balance`): Pure rail selection with sufficiency
//!   reporting
//! - **Execution Tracker** (`tracker`): Runtime-only lifecycle bookkeeping
//! - **Upload Orchestrator** (`orchestrator`): The scheduler owning the queue
//!   and the execution-state store

pub mod balance;
pub mod conflict;
pub mod cost;
pub mod error;
pub mod item;
pub mod orchestrator;
pub mod tracker;

pub use error::{QueueError, Result};
pub use item::{
    ApprovalStatus, ConflictType, LocalChange, PendingUpload, UploadId,
};
pub use balance::{BalanceGate, BalanceSnapshot, PaymentPreference, RailSelection};
pub use conflict::{collision_free_name, ConflictClassifier, ConflictResolution, Resolution};
pub use cost::{
    estimated_conversion_fee, CostBreakdown, CostEstimate, CostEstimator, EstimatorConfig,
    PriceSource,
};
pub use orchestrator::{BatchOutcome, OrchestratorConfig, UploadOrchestrator};
pub use tracker::{ExecutionTracker, UploadExecutionState};
