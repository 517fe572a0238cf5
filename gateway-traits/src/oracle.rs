//! Balance and Price Oracles
//!
//! Poll-style host traits for wallet balances and publishing prices. Both are
//! network-bound on real hosts; the engine treats every call as fallible and
//! recovers with cached values rather than blocking the approval flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A prepaid-credit top-up session created with the payment processor.
///
/// The engine only brokers the session; checkout happens in the host UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUpSession {
    /// Processor session identifier
    pub session_id: String,
    /// URL the host should open to complete checkout
    pub checkout_url: String,
    /// Unix timestamp after which the session is no longer valid
    pub expires_at: i64,
}

/// Live wallet balances in both payment currencies.
///
/// Amounts are in each currency's smallest indivisible unit.
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Current native-token balance
    async fn token_balance(&self) -> Result<u64>;

    /// Current prepaid-credit balance
    async fn credit_balance(&self) -> Result<u64>;

    /// Create a payment session to purchase `credit_amount` of prepaid
    /// credits.
    async fn create_top_up_session(&self, credit_amount: u64) -> Result<TopUpSession>;
}

/// Publishing price quotes for a given byte count.
///
/// Quotes are advisory: the settlement amount is decided by the execution
/// service at broadcast time. Amounts are in smallest indivisible units.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Native-token price to publish `bytes` of content
    async fn token_price_for_bytes(&self, bytes: u64) -> Result<u64>;

    /// Prepaid-credit cost to publish `bytes` of content
    async fn credit_cost_for_bytes(&self, bytes: u64) -> Result<u64>;
}
