//! # Cost Estimation
//!
//! Pure pricing layer: classifies each candidate change as free or paid and
//! produces advisory costs on both payment rails, plus the queue-level
//! aggregate breakdown.
//!
//! ## Overview
//!
//! Publishing is metered in two competing currencies. The estimator quotes
//! both and deliberately decides neither: the rail actually charged is chosen
//! by the balance gate at submission time.
//!
//! An item is free when its size is under the free-tier threshold or when its
//! operation is metadata-only (moves, renames, hides, deletes publish a
//! minuscule metadata mutation, never content).
//!
//! Oracle unavailability never blocks approval: the estimator falls back to
//! the last observed per-byte rate, or to the configured conservative default
//! if the oracle has never answered, and tags the estimate with its
//! [`PriceSource`] so the degradation is visible downstream.

use crate::balance::{BalanceGate, BalanceSnapshot, PaymentPreference, RailSelection};
use crate::item::PendingUpload;
use gateway_traits::{OperationKind, PriceOracle};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Where the numbers in a [`CostEstimate`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Free classification; no oracle consulted
    FreeTier,
    /// Live oracle quote
    Oracle,
    /// Oracle unreachable; last observed rate used
    Cached,
    /// Oracle never answered; configured conservative default used
    Default,
}

/// Advisory cost for one candidate change.
///
/// A cost of exactly zero for a non-free item is a valid edge case
/// (promotional pricing), not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Native-token cost, smallest units
    pub token_cost: u64,
    /// Prepaid-credit cost, smallest units; `None` when the credit rail
    /// could not be priced at all
    pub credit_cost: Option<u64>,
    /// Free-tier classification
    pub free: bool,
    /// Provenance of the quoted numbers
    pub source: PriceSource,
}

impl CostEstimate {
    /// An estimate for an item under the free-tier threshold or with a
    /// metadata-only operation.
    pub fn free_tier() -> Self {
        Self {
            token_cost: 0,
            credit_cost: Some(0),
            free: true,
            source: PriceSource::FreeTier,
        }
    }
}

/// Estimator settings, typically derived from the core configuration.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    /// Byte-size cutoff under which an item publishes for free
    pub free_threshold_bytes: u64,
    /// Conservative fallback token price per byte
    pub default_token_rate: f64,
    /// Conservative fallback credit cost per byte
    pub default_credit_rate: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            free_threshold_bytes: core_runtime::config::DEFAULT_FREE_THRESHOLD_BYTES,
            default_token_rate: core_runtime::config::DEFAULT_TOKEN_RATE,
            default_credit_rate: core_runtime::config::DEFAULT_CREDIT_RATE,
        }
    }
}

impl From<&core_runtime::config::CoreConfig> for EstimatorConfig {
    fn from(config: &core_runtime::config::CoreConfig) -> Self {
        Self {
            free_threshold_bytes: config.free_threshold_bytes,
            default_token_rate: config.default_token_rate,
            default_credit_rate: config.default_credit_rate,
        }
    }
}

/// Last observed per-byte rates, used when the oracle is unreachable.
#[derive(Debug, Default)]
struct PriceCache {
    token_rate: Option<f64>,
    credit_rate: Option<f64>,
}

/// Prices candidate changes against the network's oracles.
///
/// Stateless apart from the fallback price cache; safe to call repeatedly
/// and concurrently. Never retains references to queue items.
pub struct CostEstimator {
    oracle: Arc<dyn PriceOracle>,
    config: EstimatorConfig,
    cache: Mutex<PriceCache>,
}

impl CostEstimator {
    /// Create a new estimator over the given price oracle
    pub fn new(oracle: Arc<dyn PriceOracle>, config: EstimatorConfig) -> Self {
        Self {
            oracle,
            config,
            cache: Mutex::new(PriceCache::default()),
        }
    }

    /// Estimate the publishing cost of one candidate change.
    ///
    /// Infallible by design: oracle failures degrade to cached or default
    /// rates rather than blocking the approval flow.
    pub async fn estimate(&self, operation: OperationKind, file_size: u64) -> CostEstimate {
        if operation.is_metadata_only() || file_size <= self.config.free_threshold_bytes {
            return CostEstimate::free_tier();
        }

        let (token_cost, token_source) = match self.oracle.token_price_for_bytes(file_size).await {
            Ok(price) => {
                self.remember_token_rate(price, file_size);
                (price, PriceSource::Oracle)
            }
            Err(e) => {
                warn!("Token price oracle unavailable, using fallback: {e}");
                self.fallback_token_cost(file_size)
            }
        };

        let (credit_cost, credit_source) = match self.oracle.credit_cost_for_bytes(file_size).await
        {
            Ok(price) => {
                self.remember_credit_rate(price, file_size);
                (Some(price), PriceSource::Oracle)
            }
            Err(e) => {
                warn!("Credit price oracle unavailable, using fallback: {e}");
                let (cost, source) = self.fallback_credit_cost(file_size);
                (cost, source)
            }
        };

        CostEstimate {
            token_cost,
            credit_cost,
            free: false,
            source: worse_source(token_source, credit_source),
        }
    }

    fn remember_token_rate(&self, price: u64, bytes: u64) {
        if bytes > 0 {
            let mut cache = self.cache.lock().expect("price cache poisoned");
            cache.token_rate = Some(price as f64 / bytes as f64);
        }
    }

    fn remember_credit_rate(&self, price: u64, bytes: u64) {
        if bytes > 0 {
            let mut cache = self.cache.lock().expect("price cache poisoned");
            cache.credit_rate = Some(price as f64 / bytes as f64);
        }
    }

    fn fallback_token_cost(&self, bytes: u64) -> (u64, PriceSource) {
        let cache = self.cache.lock().expect("price cache poisoned");
        match cache.token_rate {
            Some(rate) => (apply_rate(bytes, rate), PriceSource::Cached),
            None => (
                apply_rate(bytes, self.config.default_token_rate),
                PriceSource::Default,
            ),
        }
    }

    fn fallback_credit_cost(&self, bytes: u64) -> (Option<u64>, PriceSource) {
        let cache = self.cache.lock().expect("price cache poisoned");
        match cache.credit_rate {
            Some(rate) => (Some(apply_rate(bytes, rate)), PriceSource::Cached),
            None => (
                Some(apply_rate(bytes, self.config.default_credit_rate)),
                PriceSource::Default,
            ),
        }
    }
}

fn apply_rate(bytes: u64, rate: f64) -> u64 {
    (bytes as f64 * rate).ceil() as u64
}

/// Display-advisory estimate of the fee charged when credits are converted
/// to native token at settlement.
///
/// The settlement rate is owned by the execution service; this mirrors the
/// configured `conversion_fee_rate` purely so hosts can annotate quotes.
pub fn estimated_conversion_fee(credit_amount: u64, fee_rate: f64) -> u64 {
    (credit_amount as f64 * fee_rate).ceil() as u64
}

/// Pick the more degraded of two price sources for the combined estimate.
fn worse_source(a: PriceSource, b: PriceSource) -> PriceSource {
    fn rank(s: PriceSource) -> u8 {
        match s {
            PriceSource::FreeTier | PriceSource::Oracle => 0,
            PriceSource::Cached => 1,
            PriceSource::Default => 2,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

// ============================================================================
// Queue-Level Breakdown
// ============================================================================

/// Aggregate cost over the conflict-free portion of the queue.
///
/// Unresolved conflicted items are excluded entirely: they are neither free
/// nor ready, and counting them would misstate what approval will cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Items publishing at zero cost
    pub free_files: u64,
    /// Items that would settle on the credit rail
    pub credit_files: u64,
    /// Items that would settle on the token rail
    pub token_files: u64,
    /// Summed credit cost, smallest units
    pub credit_cost: u64,
    /// Summed token cost, smallest units
    pub token_cost: u64,
    /// Metadata-only operations (a subset of the free items)
    pub metadata_ops: u64,
}

impl CostBreakdown {
    /// Compute the aggregate over the given queue snapshot.
    ///
    /// Items with any conflict classification are skipped; for the rest the
    /// rail is projected with the same gate logic used at submission time.
    pub fn compute(
        items: &[PendingUpload],
        balances: &BalanceSnapshot,
        preference: PaymentPreference,
    ) -> Self {
        let mut breakdown = CostBreakdown::default();

        for item in items.iter().filter(|i| i.conflict.is_none()) {
            if item.operation.is_metadata_only() {
                breakdown.metadata_ops += 1;
            }

            match BalanceGate::select_rail(&item.cost, balances, preference) {
                RailSelection::Free => breakdown.free_files += 1,
                RailSelection::Credit { cost, .. } => {
                    breakdown.credit_files += 1;
                    breakdown.credit_cost += cost;
                }
                RailSelection::Token { cost, .. } => {
                    breakdown.token_files += 1;
                    breakdown.token_cost += cost;
                }
            }
        }

        breakdown
    }

    /// Total items counted in the breakdown
    pub fn total_files(&self) -> u64 {
        self.free_files + self.credit_files + self.token_files
    }
}

// ============================================================================
// Tests
// ============================================================================
