//! Pluggable analyzers.
//!
//! An analyzer decides which symbols, expirations and chains are worth
//! looking at (the `validate_*` hooks, all permissive by default) and turns
//! the surviving data into result rows. Two variants exist with explicit
//! signatures: option analyzers see one (symbol, expiration) chain at a
//! time; equity analyzers see a symbol's year of daily quotes.
//!
//! `run` failures (including panics, which the engine catches) are counted
//! as analysis failures for that unit of work only.

pub mod cps;
pub mod curve;
pub mod filter;
pub mod pricing;
pub mod regression;
pub mod stats;
pub mod wheel;

pub use cps::{CpsConfig, CreditPutSpreadAnalyzer};
pub use curve::DeltaCurve;
pub use filter::{DteWindow, LevelFilter};
pub use pricing::{BsmInputs, Greeks, PricingError};
pub use regression::{RegressionAnalyzer, RegressionConfig};
pub use wheel::{WheelConfig, WheelPutAnalyzer};

use crate::domain::{DailyQuote, OptionLevel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("pricing failed: {0}")]
    Pricing(#[from] PricingError),

    #[error("analysis error: {0}")]
    Other(String),
}

/// One output row: a human-readable label plus the numeric columns named
/// by the analyzer's `columns()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub label: String,
    pub values: Vec<f64>,
}

impl ResultRow {
    pub fn new(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values,
        }
    }

    /// Value of a named column, given the analyzer's column list.
    pub fn get(&self, columns: &[&str], name: &str) -> Option<f64> {
        let idx = columns.iter().position(|c| *c == name)?;
        self.values.get(idx).copied()
    }
}

/// Auxiliary per-symbol data an option analyzer wants fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNeeds {
    pub dividend: bool,
    pub year_quotes: bool,
    pub risk_free_rate: bool,
}

/// Everything an option analyzer sees for one (symbol, expiration).
#[derive(Debug, Clone, Copy)]
pub struct OptionInput<'a> {
    pub symbol: &'a str,
    pub underlying: f64,
    pub dividend: f64,
    pub expiration: NaiveDate,
    /// Scan date that DTE is measured from.
    pub as_of: NaiveDate,
    pub chain: &'a [OptionLevel],
    pub risk_free_rate: f64,
    /// Present when `needs().year_quotes` is set.
    pub quotes: Option<&'a [DailyQuote]>,
}

impl OptionInput<'_> {
    pub fn dte(&self) -> i64 {
        crate::domain::days_to_expiration(self.as_of, self.expiration)
    }
}

pub trait OptionAnalyzer: Send + Sync {
    /// Short name used in scan names and log lines.
    fn name(&self) -> &str;

    /// Names of the numeric columns of every row `run` produces.
    fn columns(&self) -> &[&'static str];

    fn needs(&self) -> DataNeeds {
        DataNeeds::default()
    }

    fn validate_symbol(&self, _symbol: &str) -> bool {
        true
    }

    fn validate_underlying(&self, _symbol: &str, _underlying: f64) -> bool {
        true
    }

    fn validate_dividend(&self, _symbol: &str, _dividend: f64) -> bool {
        true
    }

    fn validate_quotes(&self, _symbol: &str, _quotes: &[DailyQuote]) -> bool {
        true
    }

    fn validate_expiration(&self, _symbol: &str, _expiration: NaiveDate, _as_of: NaiveDate) -> bool {
        true
    }

    fn validate_chain(&self, _symbol: &str, _expiration: NaiveDate, _chain: &[OptionLevel]) -> bool {
        true
    }

    fn run(&self, input: &OptionInput<'_>) -> Result<Vec<ResultRow>, AnalysisError>;
}

pub trait EquityAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    fn columns(&self) -> &[&'static str];

    fn validate_symbol(&self, _symbol: &str) -> bool {
        true
    }

    fn validate_quotes(&self, _symbol: &str, _quotes: &[DailyQuote]) -> bool {
        true
    }

    fn run(&self, symbol: &str, quotes: &[DailyQuote]) -> Result<ResultRow, AnalysisError>;
}

/// The analyzer a scan is parameterised by.
#[derive(Clone)]
pub enum Analyzer {
    Option(Arc<dyn OptionAnalyzer>),
    Equity(Arc<dyn EquityAnalyzer>),
}

impl Analyzer {
    pub fn option(analyzer: impl OptionAnalyzer + 'static) -> Self {
        Analyzer::Option(Arc::new(analyzer))
    }

    pub fn equity(analyzer: impl EquityAnalyzer + 'static) -> Self {
        Analyzer::Equity(Arc::new(analyzer))
    }

    pub fn name(&self) -> &str {
        match self {
            Analyzer::Option(a) => a.name(),
            Analyzer::Equity(a) => a.name(),
        }
    }

    /// Scan kind prefix: `option` or `equity`.
    pub fn kind(&self) -> &'static str {
        match self {
            Analyzer::Option(_) => "option",
            Analyzer::Equity(_) => "equity",
        }
    }

    pub fn columns(&self) -> &[&'static str] {
        match self {
            Analyzer::Option(a) => a.columns(),
            Analyzer::Equity(a) => a.columns(),
        }
    }

    /// CSV header: the row label followed by the numeric columns.
    pub fn header(&self) -> Vec<String> {
        std::iter::once("description".to_string())
            .chain(self.columns().iter().map(|c| c.to_string()))
            .collect()
    }

    pub fn needs(&self) -> DataNeeds {
        match self {
            Analyzer::Option(a) => a.needs(),
            Analyzer::Equity(_) => DataNeeds {
                year_quotes: true,
                ..DataNeeds::default()
            },
        }
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Analyzer::{}({})", self.kind(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl OptionAnalyzer for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn columns(&self) -> &[&'static str] {
            &["a", "b"]
        }
        fn run(&self, _input: &OptionInput<'_>) -> Result<Vec<ResultRow>, AnalysisError> {
            Ok(vec![])
        }
    }

    #[test]
    fn validation_hooks_default_to_accept() {
        let a = Noop;
        let d = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
        assert!(a.validate_symbol("X"));
        assert!(a.validate_underlying("X", 0.0));
        assert!(a.validate_dividend("X", 0.0));
        assert!(a.validate_quotes("X", &[]));
        assert!(a.validate_expiration("X", d, d));
        assert!(a.validate_chain("X", d, &[]));
        assert_eq!(a.needs(), DataNeeds::default());
    }

    #[test]
    fn header_prefixes_description() {
        let analyzer = Analyzer::option(Noop);
        assert_eq!(analyzer.header(), vec!["description", "a", "b"]);
        assert_eq!(analyzer.kind(), "option");
        assert_eq!(format!("{analyzer:?}"), "Analyzer::option(noop)");
    }

    #[test]
    fn row_lookup_by_column_name() {
        let row = ResultRow::new("X", vec![1.0, 2.0]);
        assert_eq!(row.get(&["a", "b"], "b"), Some(2.0));
        assert_eq!(row.get(&["a", "b"], "c"), None);
    }
}
