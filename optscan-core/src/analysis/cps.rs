//! Credit put spread analyzer.
//!
//! For every pair of filtered puts (long the lower strike, short the
//! higher) the analyzer prices the spread's outcomes with a probability
//! model built from Black-Scholes-Merton deltas:
//!
//! - max loss below the long strike, weighted by |Δ long|
//! - max profit above the short strike, weighted by 1 - |Δ short|
//! - the in-between region integrated over a fitted |Δ|(price) curve
//!
//! Spreads with a non-positive expected profit, or whose outcome
//! probabilities do not sum to roughly one, are dropped.

use super::curve::DeltaCurve;
use super::filter::{is_us_listing, DteWindow, LevelFilter};
use super::pricing::{BsmInputs, Greeks};
use super::stats::round_to;
use super::{AnalysisError, DataNeeds, OptionAnalyzer, OptionInput, ResultRow};
use crate::domain::{OptionLevel, OptionType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const COLUMNS: &[&str] = &[
    "width",
    "premium",
    "max_loss",
    "break_even",
    "risk_reward",
    "prob_max_loss",
    "prob_max_profit",
    "expected_profit",
    "net_delta",
    "net_theta",
    "net_vega",
    "net_gamma",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpsConfig {
    pub min_filtered_levels: usize,
    pub levels: LevelFilter,
    pub max_spread_width: f64,
    pub dte: DteWindow,
    /// Price step used when integrating over the spread's strike range.
    pub resolution: f64,
    /// Allowed deviation of the total outcome probability from 1.
    pub probability_tolerance: f64,
}

impl Default for CpsConfig {
    fn default() -> Self {
        Self {
            min_filtered_levels: 5,
            levels: LevelFilter::default(),
            max_spread_width: 20.0,
            dte: DteWindow::new(21, 91),
            resolution: 0.1,
            probability_tolerance: 0.1,
        }
    }
}

pub struct CreditPutSpreadAnalyzer {
    config: CpsConfig,
}

impl CreditPutSpreadAnalyzer {
    pub fn new(config: CpsConfig) -> Self {
        Self { config }
    }

    fn priced_levels<'a>(
        &self,
        input: &OptionInput<'a>,
        dte: i64,
    ) -> Vec<(&'a OptionLevel, Greeks)> {
        let mut priced: Vec<(&OptionLevel, Greeks)> = input
            .chain
            .iter()
            .filter(|level| self.config.levels.accepts(input.symbol, input.underlying, level))
            .filter_map(|level| {
                let bsm = BsmInputs::from_dte(
                    input.underlying,
                    level.strike,
                    dte,
                    input.risk_free_rate,
                    input.dividend,
                );
                // Filtered levels always carry a last price.
                let greeks = bsm.greeks_from_price(OptionType::Put, level.last?).ok()?;
                Some((level, greeks))
            })
            .collect();
        priced.sort_by(|a, b| a.0.strike.total_cmp(&b.0.strike));
        priced
    }

    /// Expected P/L and probability mass between the two strikes.
    fn between_strikes(
        &self,
        curve: &DeltaCurve,
        buy_strike: f64,
        sell_strike: f64,
        premium: f64,
    ) -> (f64, f64) {
        let step = self.config.resolution;
        let intervals = ((sell_strike - buy_strike) / step) as usize;
        let (mut expected, mut total_prob) = (0.0, 0.0);

        for i in 0..intervals {
            let lo = round_to(buy_strike + step * i as f64, 2);
            let hi = round_to(lo + step, 2);
            let future_price = round_to((lo + hi) / 2.0, 2);

            let prob = (curve.eval(hi) - curve.eval(lo)).max(0.0);
            expected += prob * ((future_price - sell_strike) + premium);
            total_prob += prob;
        }
        (expected, total_prob)
    }
}

impl OptionAnalyzer for CreditPutSpreadAnalyzer {
    fn name(&self) -> &str {
        "cps"
    }

    fn columns(&self) -> &[&'static str] {
        COLUMNS
    }

    fn needs(&self) -> DataNeeds {
        DataNeeds {
            dividend: true,
            year_quotes: false,
            risk_free_rate: true,
        }
    }

    fn validate_symbol(&self, symbol: &str) -> bool {
        is_us_listing(symbol)
    }

    fn validate_expiration(&self, _symbol: &str, expiration: NaiveDate, as_of: NaiveDate) -> bool {
        self.config.dte.contains(as_of, expiration)
    }

    fn run(&self, input: &OptionInput<'_>) -> Result<Vec<ResultRow>, AnalysisError> {
        let dte = input.dte();
        if dte <= 0 {
            return Err(AnalysisError::InsufficientData(format!(
                "expiration {} is not in the future",
                input.expiration
            )));
        }

        let priced = self.priced_levels(input, dte);
        if priced.len() < self.config.min_filtered_levels {
            return Ok(Vec::new());
        }
        let points: Vec<(f64, f64)> = priced.iter().map(|(l, g)| (l.strike, g.delta)).collect();
        let Some(curve) = DeltaCurve::fit(&points) else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for (i, (buy, buy_g)) in priced.iter().enumerate() {
            for (sell, sell_g) in &priced[i + 1..] {
                if buy.strike >= sell.strike {
                    continue;
                }
                let (Some(sell_bid), Some(buy_ask)) = (sell.bid, buy.ask) else {
                    continue;
                };

                let width = sell.strike - buy.strike;
                let premium = sell_bid - buy_ask;
                let max_loss = premium - width;
                let be = sell.strike - premium;
                if width > self.config.max_spread_width
                    || premium <= 0.0
                    || be <= buy.strike
                    || be >= sell.strike
                {
                    continue;
                }

                let prob_max_loss = buy_g.delta.abs();
                let prob_max_profit = 1.0 - sell_g.delta.abs();
                let (spread_profit, spread_prob) =
                    self.between_strikes(&curve, buy.strike, sell.strike, premium);

                let expected_profit =
                    prob_max_loss * max_loss + prob_max_profit * premium + spread_profit;
                if expected_profit <= 0.0 {
                    continue;
                }
                let total_prob = prob_max_loss + spread_prob + prob_max_profit;
                if (1.0 - total_prob).abs() >= self.config.probability_tolerance {
                    continue;
                }

                rows.push(ResultRow::new(
                    format!(
                        "{} {} +{}/-{}",
                        input.symbol, input.expiration, buy.strike, sell.strike
                    ),
                    vec![
                        round_to(width, 2),
                        round_to(premium * 100.0, 2),
                        round_to(max_loss * 100.0, 2),
                        round_to(be, 2),
                        round_to((premium / max_loss).abs(), 2),
                        round_to(prob_max_loss, 2),
                        round_to(prob_max_profit, 2),
                        round_to(expected_profit * 100.0, 2),
                        round_to(buy_g.delta - sell_g.delta, 2),
                        round_to(buy_g.theta - sell_g.theta, 2),
                        round_to(buy_g.vega - sell_g.vega, 2),
                        round_to(buy_g.gamma - sell_g.gamma, 2),
                    ],
                ));
            }
        }
        Ok(rows)
    }
}
