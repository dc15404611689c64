//! Wheel-put ranking: annualise, filter, score and keep the best contract
//! per symbol.
//!
//! With `L` the annualised-return floor and `P` the ITM-probability cap:
//!
//! ```text
//! a_roc     = (1 + roc)^(365.2425 / dte) - 1
//! keep      a_roc >= L and prob_itm < P
//! t         = P + L
//! min_score = L × (t - P)
//! max_score = 0.5 × (t - 0.1)
//! score     = 100 × (a_roc × (t - prob_itm) - min_score) / (max_score - min_score)
//! ```

use crate::config::ConfigError;
use optscan_core::analysis::ResultRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

const DAYS_PER_YEAR: f64 = 365.2425;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("scan has no '{0}' column")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub aroc_limit: f64,
    pub prob_itm_limit: f64,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            aroc_limit: 0.3,
            prob_itm_limit: 0.25,
        }
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.aroc_limit > 0.0 && self.aroc_limit.is_finite()) {
            return Err(ConfigError::Invalid("rank.aroc_limit must be positive".into()));
        }
        if !(self.prob_itm_limit > 0.0 && self.prob_itm_limit < 1.0) {
            return Err(ConfigError::Invalid(
                "rank.prob_itm_limit must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }

    pub fn score(&self, a_roc: f64, prob_itm: f64) -> f64 {
        let thresh = self.prob_itm_limit + self.aroc_limit;
        let min_score = self.aroc_limit * (thresh - self.prob_itm_limit);
        let max_score = 0.5 * (thresh - 0.1);
        100.0 * (a_roc * (thresh - prob_itm) - min_score) / (max_score - min_score)
    }
}

pub fn annualized_roc(roc: f64, dte: f64) -> f64 {
    (1.0 + roc).powf(DAYS_PER_YEAR / dte) - 1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedContract {
    pub contract: String,
    pub symbol: String,
    pub underlying: f64,
    /// Per-share premium (the scan stores it per contract).
    pub target_ask: f64,
    pub score: f64,
    pub dte: f64,
    pub moneyness: f64,
    pub a_roc: f64,
    pub prob_itm: f64,
}

struct Columns {
    roc: usize,
    dte: usize,
    prob_itm: usize,
    underlying: Option<usize>,
    premium: Option<usize>,
    moneyness: Option<usize>,
}

impl Columns {
    fn locate<S: AsRef<str>>(columns: &[S]) -> Result<Self, RankError> {
        let find = |name: &str| columns.iter().position(|c| c.as_ref() == name);
        Ok(Self {
            roc: find("roc").ok_or(RankError::MissingColumn("roc"))?,
            dte: find("dte").ok_or(RankError::MissingColumn("dte"))?,
            prob_itm: find("prob_itm_delta").ok_or(RankError::MissingColumn("prob_itm_delta"))?,
            underlying: find("underlying"),
            premium: find("premium"),
            moneyness: find("moneyness"),
        })
    }
}

/// Rank wheel-put rows. `columns` names the numeric values of each row (no
/// label column). Output is one contract per symbol, lowest ITM
/// probability first.
pub fn rank_contracts<'a, S: AsRef<str>>(
    columns: &[S],
    rows: impl IntoIterator<Item = &'a ResultRow>,
    config: &RankConfig,
) -> Result<Vec<RankedContract>, RankError> {
    let cols = Columns::locate(columns)?;
    let value = |row: &ResultRow, idx: usize| row.values.get(idx).copied();
    let optional = |row: &ResultRow, idx: Option<usize>| idx.and_then(|i| value(row, i)).unwrap_or(0.0);

    let mut best: BTreeMap<String, RankedContract> = BTreeMap::new();
    for row in rows {
        let (Some(roc), Some(dte), Some(prob_itm)) = (
            value(row, cols.roc),
            value(row, cols.dte),
            value(row, cols.prob_itm),
        ) else {
            continue;
        };
        if dte <= 0.0 {
            continue;
        }
        let prob_itm = prob_itm.abs();
        let a_roc = annualized_roc(roc, dte);
        if !(a_roc >= config.aroc_limit && prob_itm < config.prob_itm_limit) {
            continue;
        }

        let symbol = row.label.split_whitespace().next().unwrap_or_default().to_string();
        let candidate = RankedContract {
            contract: row.label.clone(),
            symbol: symbol.clone(),
            underlying: optional(row, cols.underlying),
            target_ask: optional(row, cols.premium) / 100.0,
            score: config.score(a_roc, prob_itm),
            dte,
            moneyness: optional(row, cols.moneyness),
            a_roc,
            prob_itm,
        };
        match best.get(&symbol) {
            Some(current) if current.prob_itm <= candidate.prob_itm => {}
            _ => {
                best.insert(symbol, candidate);
            }
        }
    }

    let mut ranked: Vec<RankedContract> = best.into_values().collect();
    ranked.sort_by(|a, b| a.prob_itm.total_cmp(&b.prob_itm));
    Ok(ranked)
}

/// Plain aligned text table of ranked contracts.
pub fn format_ranking(ranked: &[RankedContract]) -> String {
    let width = ranked
        .iter()
        .map(|r| r.contract.len())
        .max()
        .unwrap_or(0)
        .max("contract".len());
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>10}  {:>10}  {:>9}  {:>5}  {:>10}  {:>8}  {:>9}",
        "contract", "underlying", "target_ask", "score", "dte", "moneyness", "a_roc", "prob_itm"
    );
    for r in ranked {
        let _ = writeln!(
            out,
            "{:<width$}  {:>10.2}  {:>10.2}  {:>9.3}  {:>5.0}  {:>10.3}  {:>8.3}  {:>8.3}%",
            r.contract,
            r.underlying,
            r.target_ask,
            r.score,
            r.dte,
            r.moneyness,
            r.a_roc,
            r.prob_itm * 100.0
        );
    }
    out
}
