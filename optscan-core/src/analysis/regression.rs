//! Equity trend analyzer: recent trend quality, market correlation and
//! where current volatility sits in its one-year range.

use super::stats::{fraction_below, pearson, regress_range, round_to, simple_returns, vol_windows};
use super::{AnalysisError, EquityAnalyzer, ResultRow};
use crate::domain::{closes, DailyQuote};
use serde::{Deserialize, Serialize};

const COLUMNS: &[&str] = &[
    "period_return",
    "r_squared",
    "market_corr",
    "hist_vol",
    "hv_percentile",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionConfig {
    pub regression_range: usize,
    pub volatility_period: usize,
    pub max_return: f64,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            regression_range: 30,
            volatility_period: 30,
            max_return: 1.0,
        }
    }
}

pub struct RegressionAnalyzer {
    config: RegressionConfig,
    index_len: usize,
    index_returns: Vec<f64>,
}

impl RegressionAnalyzer {
    pub fn new(config: RegressionConfig, index_quotes: &[DailyQuote]) -> Self {
        Self {
            config,
            index_len: index_quotes.len(),
            index_returns: simple_returns(&closes(index_quotes)),
        }
    }
}

impl EquityAnalyzer for RegressionAnalyzer {
    fn name(&self) -> &str {
        "reg"
    }

    fn columns(&self) -> &[&'static str] {
        COLUMNS
    }

    fn validate_quotes(&self, _symbol: &str, quotes: &[DailyQuote]) -> bool {
        quotes.len() == self.index_len
    }

    fn run(&self, symbol: &str, quotes: &[DailyQuote]) -> Result<ResultRow, AnalysisError> {
        let closes = closes(quotes);
        let trend = regress_range(&closes, self.config.regression_range, self.config.max_return)
            .ok_or_else(|| AnalysisError::InsufficientData(format!("{symbol}: too few quotes")))?;

        let returns = simple_returns(&closes);
        let corr = pearson(&returns, &self.index_returns).ok_or_else(|| {
            AnalysisError::InsufficientData(format!("{symbol}: returns do not align with index"))
        })?;
        let vols = vol_windows(&returns, self.config.volatility_period).ok_or_else(|| {
            AnalysisError::InsufficientData(format!("{symbol}: too few returns for volatility"))
        })?;

        Ok(ResultRow::new(
            symbol,
            vec![
                round_to(trend.period_return, 3),
                round_to(trend.r_squared, 3),
                round_to(corr, 3),
                round_to(vols.current, 3),
                round_to(fraction_below(&vols.history, vols.current), 3),
            ],
        ))
    }
}
