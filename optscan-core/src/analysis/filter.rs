//! Chain-level and expiration filters shared by the put analyzers.

use crate::domain::{days_to_expiration, OptionLevel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Liquidity floors for out-of-the-money puts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelFilter {
    pub option_price_floor: f64,
    pub open_interest_floor: u64,
    pub volume_floor: u64,
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self {
            option_price_floor: 0.10,
            open_interest_floor: 5,
            volume_floor: 5,
        }
    }
}

impl LevelFilter {
    /// Keep OTM puts on the unadjusted root with live, liquid quotes.
    pub fn accepts(&self, symbol: &str, underlying: f64, level: &OptionLevel) -> bool {
        let above_floor = |p: Option<f64>| p.map_or(false, |p| p > self.option_price_floor);

        level.is_put()
            && level.strike < underlying
            && level.root_symbol == symbol
            && above_floor(level.last)
            && above_floor(level.bid)
            && above_floor(level.ask)
            && level.open_interest > self.open_interest_floor
            && level.volume > self.volume_floor
    }
}

/// Inclusive days-to-expiration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DteWindow {
    pub min: i64,
    pub max: i64,
}

impl DteWindow {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, as_of: NaiveDate, expiration: NaiveDate) -> bool {
        let dte = days_to_expiration(as_of, expiration);
        dte >= self.min && dte <= self.max
    }
}

/// Toronto listings have no US option chains.
pub fn is_us_listing(symbol: &str) -> bool {
    !symbol.ends_with(".TO")
}
