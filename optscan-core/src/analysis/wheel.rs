//! Cash-secured put ("wheel") analyzer.
//!
//! Scores each liquid out-of-the-money put by what selling it pays and how
//! likely it is to finish below break-even, and enriches every contract
//! with the underlying's trend, market correlation and volatility regime.

use super::curve::DeltaCurve;
use super::filter::{is_us_listing, DteWindow, LevelFilter};
use super::pricing::{norm_cdf, BsmInputs, Greeks};
use super::stats::{
    fraction_at_or_above, fraction_below, pearson, regress_range, round_to, simple_returns,
    vol_windows,
};
use super::{AnalysisError, DataNeeds, OptionAnalyzer, OptionInput, ResultRow};
use crate::domain::{closes, DailyQuote, OptionLevel, OptionType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const COLUMNS: &[&str] = &[
    "underlying",
    "premium",
    "dte",
    "roc",
    "capital",
    "break_even",
    "moneyness",
    "prob_itm_delta",
    "prob_be_delta",
    "prob_be_iv",
    "iv",
    "iv_skew",
    "drop_per_day",
    "period_return",
    "r_squared",
    "market_corr",
    "hist_vol",
    "hv_percentile",
    "iv_percentile",
    "above_be_percentile",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelConfig {
    pub min_filtered_levels: usize,
    pub levels: LevelFilter,
    pub dte: DteWindow,
    /// Compute Greeks from last prices instead of using the provider's.
    pub manual_greeks: bool,
    pub regression_range: usize,
    pub volatility_period: usize,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            min_filtered_levels: 5,
            levels: LevelFilter::default(),
            dte: DteWindow::new(36, 59),
            manual_greeks: false,
            regression_range: 30,
            volatility_period: 30,
        }
    }
}

/// Statistics of the underlying's price history, independent of the contract.
struct QuoteProfile {
    closes: Vec<f64>,
    period_return: f64,
    r_squared: f64,
    market_corr: f64,
    vol_history: Vec<f64>,
    current_vol: f64,
}

pub struct WheelPutAnalyzer {
    config: WheelConfig,
    index_len: usize,
    index_returns: Vec<f64>,
}

impl WheelPutAnalyzer {
    /// `index_quotes` is the benchmark's year of daily quotes; symbols whose
    /// history does not line up with it are skipped.
    pub fn new(config: WheelConfig, index_quotes: &[DailyQuote]) -> Self {
        Self {
            config,
            index_len: index_quotes.len(),
            index_returns: simple_returns(&closes(index_quotes)),
        }
    }

    fn greeks_for(&self, input: &OptionInput<'_>, level: &OptionLevel, dte: i64) -> Option<Greeks> {
        if !self.config.manual_greeks {
            let g = level.greeks?;
            return Some(Greeks {
                iv: g.mid_iv,
                delta: g.delta,
                gamma: g.gamma,
                theta: g.theta,
                vega: g.vega,
                rho: g.rho,
            });
        }
        let bsm = BsmInputs::new(
            input.underlying,
            level.strike,
            dte as f64 / 365.0,
            input.risk_free_rate,
            input.dividend,
        );
        bsm.greeks_from_price(level.option_type, level.last?).ok()
    }

    /// 25-delta put/call IV spread over ATM IV, plus ATM IV itself.
    fn iv_skew(priced: &[(&OptionLevel, Greeks)]) -> Result<(f64, f64), AnalysisError> {
        let closest = |opt: OptionType, target: f64| {
            priced
                .iter()
                .filter(|(l, _)| l.option_type == opt)
                .min_by(|a, b| {
                    let da = (a.1.delta.abs() - target).abs();
                    let db = (b.1.delta.abs() - target).abs();
                    da.total_cmp(&db)
                })
                .map(|(_, g)| g.iv)
                .ok_or_else(|| {
                    AnalysisError::InsufficientData(format!("no {opt:?} levels to measure skew"))
                })
        };

        let put_25 = closest(OptionType::Put, 0.25)?;
        let call_25 = closest(OptionType::Call, 0.25)?;
        let atm_iv = (closest(OptionType::Put, 0.50)? + closest(OptionType::Call, 0.50)?) / 2.0;
        if atm_iv <= 0.0 {
            return Err(AnalysisError::InsufficientData("zero ATM implied volatility".into()));
        }
        Ok(((put_25 - call_25) / atm_iv, atm_iv))
    }

    fn quote_profile(&self, quotes: &[DailyQuote]) -> Result<QuoteProfile, AnalysisError> {
        let closes = closes(quotes);
        let trend = regress_range(&closes, self.config.regression_range, 1.0)
            .ok_or_else(|| AnalysisError::InsufficientData("too few quotes for trend".into()))?;
        let returns = simple_returns(&closes);
        let market_corr = pearson(&returns, &self.index_returns).ok_or_else(|| {
            AnalysisError::InsufficientData("returns do not align with the index".into())
        })?;
        let vols = vol_windows(&returns, self.config.volatility_period)
            .ok_or_else(|| AnalysisError::InsufficientData("too few returns for volatility".into()))?;

        Ok(QuoteProfile {
            closes,
            period_return: trend.period_return,
            r_squared: trend.r_squared,
            market_corr,
            vol_history: vols.history,
            current_vol: vols.current,
        })
    }
}

impl OptionAnalyzer for WheelPutAnalyzer {
    fn name(&self) -> &str {
        "wheel"
    }

    fn columns(&self) -> &[&'static str] {
        COLUMNS
    }

    fn needs(&self) -> DataNeeds {
        DataNeeds {
            dividend: self.config.manual_greeks,
            year_quotes: true,
            risk_free_rate: self.config.manual_greeks,
        }
    }

    fn validate_symbol(&self, symbol: &str) -> bool {
        is_us_listing(symbol)
    }

    fn validate_quotes(&self, _symbol: &str, quotes: &[DailyQuote]) -> bool {
        quotes.len() == self.index_len
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
        let quotes = input
            .quotes
            .ok_or_else(|| AnalysisError::InsufficientData("year quotes missing".into()))?;

        let priced: Vec<(&OptionLevel, Greeks)> = input
            .chain
            .iter()
            .filter_map(|l| self.greeks_for(input, l, dte).map(|g| (l, g)))
            .collect();
        if priced.len() < self.config.min_filtered_levels {
            return Ok(Vec::new());
        }
        let (iv_skew, atm_iv) = Self::iv_skew(&priced)?;

        let candidates: Vec<&(&OptionLevel, Greeks)> = priced
            .iter()
            .filter(|(l, _)| self.config.levels.accepts(input.symbol, input.underlying, l))
            .collect();
        if candidates.len() < self.config.min_filtered_levels {
            return Ok(Vec::new());
        }
        let points: Vec<(f64, f64)> = candidates.iter().map(|(l, g)| (l.strike, g.delta)).collect();
        let Some(curve) = DeltaCurve::fit(&points) else {
            return Ok(Vec::new());
        };

        let profile = self.quote_profile(quotes)?;
        let hv_percentile = fraction_below(&profile.vol_history, profile.current_vol);
        let iv_percentile = fraction_below(&profile.vol_history, atm_iv);

        let u = input.underlying;
        let std = u * atm_iv * (dte as f64 / 365.0).sqrt();
        let mut rows = Vec::with_capacity(candidates.len());

        for (level, greeks) in candidates {
            let Some(premium) = level.bid else { continue };
            let be = level.strike - premium;
            if be <= 0.0 {
                continue;
            }
            let prob_be_delta = 1.0 - curve.eval(be);
            let prob_be_iv = 1.0 - norm_cdf((be - u) / std);
            let roc = premium / be;
            let drop_per_day = ((be - u) / u).abs() / dte as f64;

            rows.push(ResultRow::new(
                level.description.clone(),
                vec![
                    round_to(u, 2),
                    round_to(premium * 100.0, 2),
                    dte as f64,
                    round_to(roc, 5),
                    round_to(be * 100.0, 2),
                    round_to(be, 2),
                    round_to(be / u, 5),
                    round_to(greeks.delta.abs(), 5),
                    round_to(prob_be_delta, 5),
                    round_to(prob_be_iv, 5),
                    round_to(greeks.iv, 5),
                    round_to(iv_skew, 5),
                    round_to(drop_per_day, 5),
                    round_to(profile.period_return, 5),
                    round_to(profile.r_squared, 5),
                    round_to(profile.market_corr, 5),
                    round_to(profile.current_vol, 5),
                    round_to(hv_percentile, 5),
                    round_to(iv_percentile, 5),
                    round_to(fraction_at_or_above(&profile.closes, be), 5),
                ],
            ));
        }
        Ok(rows)
    }
}
