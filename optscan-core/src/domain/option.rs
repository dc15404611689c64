//! Option chain levels as returned by the options provider.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Put,
    Call,
}

/// Greeks computed by the provider (when the chain was requested with greeks).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderGreeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
    pub mid_iv: f64,
}

/// A single contract in an option chain.
///
/// `root_symbol` differs from the requested symbol for adjusted contracts
/// (post-split, special dividends); analyzers usually ignore those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLevel {
    pub description: String,
    pub root_symbol: String,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub last: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open_interest: u64,
    pub volume: u64,
    pub greeks: Option<ProviderGreeks>,
}

impl OptionLevel {
    pub fn is_put(&self) -> bool {
        self.option_type == OptionType::Put
    }

    /// Bid/ask midpoint, if both sides are quoted.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }
}

/// Calendar days from `as_of` to `expiration` (negative once expired).
pub fn days_to_expiration(as_of: NaiveDate, expiration: NaiveDate) -> i64 {
    (expiration - as_of).num_days()
}
