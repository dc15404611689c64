//! Daily price history for an underlying.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyQuote {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyQuote {
    /// Basic OHLC sanity check.
    pub fn is_sane(&self) -> bool {
        self.close.is_finite()
            && self.close > 0.0
            && self.high >= self.low
            && self.high >= self.close
            && self.low <= self.close
    }
}

/// Closing prices in date order.
pub fn closes(quotes: &[DailyQuote]) -> Vec<f64> {
    quotes.iter().map(|q| q.close).collect()
}
