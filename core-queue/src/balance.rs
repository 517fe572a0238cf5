//! # Balance Gate
//!
//! Decides, per item, which payment rail a submission will actually settle
//! on, given live balances and the operator's payment preference.
//!
//! The gate is a pure function: the cost estimate quotes both rails, the gate
//! picks one and reports whether it is covered. An insufficient rail under a
//! pinned preference is reported as insufficient, never silently downgraded
//! to the other rail.

use crate::cost::CostEstimate;
use gateway_traits::PaymentRail;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{QueueError, Result};

/// Operator-selectable payment-method preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPreference {
    /// Prefer credits when they cover the item, fall back to token
    #[default]
    Auto,
    /// Only ever settle on the credit rail
    CreditOnly,
    /// Only ever settle on the token rail
    TokenOnly,
}

impl PaymentPreference {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPreference::Auto => "auto",
            PaymentPreference::CreditOnly => "credit_only",
            PaymentPreference::TokenOnly => "token_only",
        }
    }
}

impl FromStr for PaymentPreference {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(PaymentPreference::Auto),
            "credit_only" => Ok(PaymentPreference::CreditOnly),
            "token_only" => Ok(PaymentPreference::TokenOnly),
            _ => Err(QueueError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for PaymentPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wallet balances observed at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Native-token balance, smallest units
    pub token_balance: u64,
    /// Prepaid-credit balance, smallest units
    pub credit_balance: u64,
    /// Unix timestamp of the observation
    pub fetched_at: i64,
}

impl BalanceSnapshot {
    pub fn new(token_balance: u64, credit_balance: u64) -> Self {
        Self {
            token_balance,
            credit_balance,
            fetched_at: chrono::Utc::now().timestamp(),
        }
    }

    /// A conservative zero snapshot, used when no balance has ever been
    /// observed. Everything paid reads as insufficient.
    pub fn empty() -> Self {
        Self::new(0, 0)
    }
}

/// The gate's decision for one item.
///
/// A single discriminated result: the rail and its coverage travel together,
/// so callers never infer the rail from which optional cost field happens to
/// be populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rail", rename_all = "snake_case")]
pub enum RailSelection {
    /// Nothing is charged
    Free,
    /// Settle on the prepaid-credit rail
    Credit {
        /// Credit cost, smallest units
        cost: u64,
        /// Whether the credit balance covers the cost
        sufficient: bool,
    },
    /// Settle on the native-token rail
    Token {
        /// Token cost, smallest units
        cost: u64,
        /// Whether the token balance covers the cost
        sufficient: bool,
    },
}

impl RailSelection {
    /// The gateway-level rail this selection maps to
    pub fn rail(&self) -> PaymentRail {
        match self {
            RailSelection::Free => PaymentRail::Free,
            RailSelection::Credit { .. } => PaymentRail::Credit,
            RailSelection::Token { .. } => PaymentRail::Token,
        }
    }

    /// Whether the selected rail can cover the item
    pub fn is_sufficient(&self) -> bool {
        match self {
            RailSelection::Free => true,
            RailSelection::Credit { sufficient, .. } => *sufficient,
            RailSelection::Token { sufficient, .. } => *sufficient,
        }
    }

    /// The cost on the selected rail, smallest units
    pub fn cost(&self) -> u64 {
        match self {
            RailSelection::Free => 0,
            RailSelection::Credit { cost, .. } => *cost,
            RailSelection::Token { cost, .. } => *cost,
        }
    }
}

/// Pure rail-selection logic.
pub struct BalanceGate;

impl BalanceGate {
    /// Select the payment rail for one estimated item.
    ///
    /// Decision order: free classification wins outright; otherwise the
    /// credit rail is used when the preference permits it and the balance
    /// covers the quoted credit cost; otherwise the token rail, with its
    /// coverage reported.
    ///
    /// Under `CreditOnly`, an uncovered (or unpriced) credit rail is
    /// reported insufficient rather than falling back to token.
    pub fn select_rail(
        estimate: &CostEstimate,
        balances: &BalanceSnapshot,
        preference: PaymentPreference,
    ) -> RailSelection {
        if estimate.free {
            return RailSelection::Free;
        }

        match preference {
            PaymentPreference::CreditOnly => {
                // An unpriced credit rail cannot be verified as covered.
                let cost = estimate.credit_cost.unwrap_or(0);
                let sufficient = estimate
                    .credit_cost
                    .map(|c| balances.credit_balance >= c)
                    .unwrap_or(false);
                RailSelection::Credit { cost, sufficient }
            }
            PaymentPreference::TokenOnly => RailSelection::Token {
                cost: estimate.token_cost,
                sufficient: balances.token_balance >= estimate.token_cost,
            },
            PaymentPreference::Auto => match estimate.credit_cost {
                Some(credit_cost) if balances.credit_balance >= credit_cost => {
                    RailSelection::Credit {
                        cost: credit_cost,
                        sufficient: true,
                    }
                }
                _ => RailSelection::Token {
                    cost: estimate.token_cost,
                    sufficient: balances.token_balance >= estimate.token_cost,
                },
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
