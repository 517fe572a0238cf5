//! # Core Configuration Module
//!
//! Provides configuration management for the permanent storage core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance holding the gateway implementations and pricing settings the
//! reconciliation engine needs. It enforces fail-fast validation so a missing
//! gateway surfaces at startup as an actionable error, not as a panic deep in
//! the approval flow.
//!
//! ## Required Dependencies
//!
//! - `ExecutionService` - submits and cancels remote mutations
//! - `BalanceOracle` - wallet balances and credit top-up sessions
//! - `PriceOracle` - publishing price quotes
//! - `RemoteStateLookup` - crawled remote drive metadata
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .execution_service(Arc::new(MyExecutionService))
//!     .balance_oracle(Arc::new(MyBalanceOracle))
//!     .price_oracle(Arc::new(MyPriceOracle))
//!     .remote_lookup(Arc::new(MyRemoteLookup))
//!     .free_threshold_bytes(100 * 1024)
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use gateway_traits::{BalanceOracle, ExecutionService, PriceOracle, RemoteStateLookup};
use std::sync::Arc;

/// Byte-size cutoff under which an item publishes at zero cost.
pub const DEFAULT_FREE_THRESHOLD_BYTES: u64 = 100 * 1024;

/// Client-side estimate of the credit-to-token conversion fee.
///
/// Display-advisory only; the settlement rate is owned by the execution
/// service. Kept configurable until confirmed against the actual settlement
/// behavior.
pub const DEFAULT_CONVERSION_FEE_RATE: f64 = 0.23;

/// Conservative fallback token price per byte used before the price oracle
/// has ever answered.
pub const DEFAULT_TOKEN_RATE: f64 = 1.0;

/// Conservative fallback credit cost per byte used before the price oracle
/// has ever answered.
pub const DEFAULT_CREDIT_RATE: f64 = 1.0;

/// Default buffer size for the core event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Core configuration for the permanent storage core.
///
/// Holds the gateway implementations plus engine-level pricing settings.
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Submits and cancels remote mutations (required)
    pub execution_service: Arc<dyn ExecutionService>,

    /// Wallet balances in both payment currencies (required)
    pub balance_oracle: Arc<dyn BalanceOracle>,

    /// Publishing price quotes (required)
    pub price_oracle: Arc<dyn PriceOracle>,

    /// Crawled remote drive metadata (required)
    pub remote_lookup: Arc<dyn RemoteStateLookup>,

    /// Byte-size cutoff under which an item publishes for free
    pub free_threshold_bytes: u64,

    /// Advisory credit-to-token conversion fee rate, in [0, 1)
    pub conversion_fee_rate: f64,

    /// Fallback token price per byte, used until the oracle answers once
    pub default_token_rate: f64,

    /// Fallback credit cost per byte, used until the oracle answers once
    pub default_credit_rate: f64,

    /// Event bus buffer size
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("execution_service", &"ExecutionService { ... }")
            .field("balance_oracle", &"BalanceOracle { ... }")
            .field("price_oracle", &"PriceOracle { ... }")
            .field("remote_lookup", &"RemoteStateLookup { ... }")
            .field("free_threshold_bytes", &self.free_threshold_bytes)
            .field("conversion_fee_rate", &self.conversion_fee_rate)
            .field("default_token_rate", &self.default_token_rate)
            .field("default_credit_rate", &self.default_credit_rate)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Create a new configuration builder
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::new()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    execution_service: Option<Arc<dyn ExecutionService>>,
    balance_oracle: Option<Arc<dyn BalanceOracle>>,
    price_oracle: Option<Arc<dyn PriceOracle>>,
    remote_lookup: Option<Arc<dyn RemoteStateLookup>>,
    free_threshold_bytes: Option<u64>,
    conversion_fee_rate: Option<f64>,
    default_token_rate: Option<f64>,
    default_credit_rate: Option<f64>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution_service(mut self, service: Arc<dyn ExecutionService>) -> Self {
        self.execution_service = Some(service);
        self
    }

    pub fn balance_oracle(mut self, oracle: Arc<dyn BalanceOracle>) -> Self {
        self.balance_oracle = Some(oracle);
        self
    }

    pub fn price_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.price_oracle = Some(oracle);
        self
    }

    pub fn remote_lookup(mut self, lookup: Arc<dyn RemoteStateLookup>) -> Self {
        self.remote_lookup = Some(lookup);
        self
    }

    pub fn free_threshold_bytes(mut self, bytes: u64) -> Self {
        self.free_threshold_bytes = Some(bytes);
        self
    }

    pub fn conversion_fee_rate(mut self, rate: f64) -> Self {
        self.conversion_fee_rate = Some(rate);
        self
    }

    pub fn default_token_rate(mut self, rate: f64) -> Self {
        self.default_token_rate = Some(rate);
        self
    }

    pub fn default_credit_rate(mut self, rate: f64) -> Self {
        self.default_credit_rate = Some(rate);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Build the configuration, validating that all required gateways were
    /// provided.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] naming the first missing gateway,
    /// or [`Error::Config`] for out-of-range settings.
    pub fn build(self) -> Result<CoreConfig> {
        let execution_service = self.execution_service.ok_or_else(|| missing(
            "ExecutionService",
            "No execution service provided. Inject the host sync daemon adapter.",
        ))?;
        let balance_oracle = self.balance_oracle.ok_or_else(|| missing(
            "BalanceOracle",
            "No balance oracle provided. Inject the wallet/payment adapter.",
        ))?;
        let price_oracle = self.price_oracle.ok_or_else(|| missing(
            "PriceOracle",
            "No price oracle provided. Inject the network pricing adapter.",
        ))?;
        let remote_lookup = self.remote_lookup.ok_or_else(|| missing(
            "RemoteStateLookup",
            "No remote state lookup provided. Inject the metadata crawler adapter.",
        ))?;

        let conversion_fee_rate = self
            .conversion_fee_rate
            .unwrap_or(DEFAULT_CONVERSION_FEE_RATE);
        if !(0.0..1.0).contains(&conversion_fee_rate) {
            return Err(Error::Config(format!(
                "conversion_fee_rate must be in [0, 1), got {conversion_fee_rate}"
            )));
        }

        let event_buffer_size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        if event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be greater than zero".to_string(),
            ));
        }

        Ok(CoreConfig {
            execution_service,
            balance_oracle,
            price_oracle,
            remote_lookup,
            free_threshold_bytes: self
                .free_threshold_bytes
                .unwrap_or(DEFAULT_FREE_THRESHOLD_BYTES),
            conversion_fee_rate,
            default_token_rate: self.default_token_rate.unwrap_or(DEFAULT_TOKEN_RATE),
            default_credit_rate: self.default_credit_rate.unwrap_or(DEFAULT_CREDIT_RATE),
            event_buffer_size,
        })
    }
}

fn missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}
