//! Result and failure aggregation shared by all workers.

use chrono::NaiveDate;
use optscan_core::analysis::ResultRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One unit of analyzer output: a symbol, plus the expiration for option
/// analyzers. Ordering is by symbol then expiration, which is the order
/// rows are exported in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub symbol: String,
    pub expiration: Option<NaiveDate>,
}

impl ResultKey {
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            expiration: None,
        }
    }

    pub fn option(symbol: impl Into<String>, expiration: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            expiration: Some(expiration),
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expiration {
            Some(exp) => write!(f, "{} {}", self.symbol, exp),
            None => f.write_str(&self.symbol),
        }
    }
}

/// Returned when a key is written twice in one scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("result for {0} already recorded")]
pub struct DuplicateKey(pub ResultKey);

/// Insert-once map of per-key results.
#[derive(Debug)]
pub struct ResultMap<V> {
    inner: Mutex<BTreeMap<ResultKey, V>>,
}

impl<V> Default for ResultMap<V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<V> ResultMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first write for a key wins; later writes are rejected.
    pub fn insert(&self, key: ResultKey, value: V) -> Result<(), DuplicateKey> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&key) {
            return Err(DuplicateKey(key));
        }
        map.insert(key, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ResultKey) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }

    /// Move everything out, leaving the map empty.
    pub fn take(&self) -> BTreeMap<ResultKey, V> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }
}

/// Increment-only failure counters. The two counts are independent.
#[derive(Debug, Default)]
pub struct FailureCounters {
    fetch: AtomicU64,
    analysis: AtomicU64,
}

impl FailureCounters {
    pub fn record_fetch(&self) {
        self.fetch.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis(&self) {
        self.analysis.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch(&self) -> u64 {
        self.fetch.load(Ordering::Relaxed)
    }

    pub fn analysis(&self) -> u64 {
        self.analysis.load(Ordering::Relaxed)
    }
}

/// Everything a finished scan hands back to its caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub scan_name: String,
    /// `description` followed by the analyzer's columns.
    pub header: Vec<String>,
    pub results: BTreeMap<ResultKey, Vec<ResultRow>>,
    pub fetch_failure_count: u64,
    pub analysis_failure_count: u64,
    /// Symbols dequeued after cancellation and never processed.
    pub skipped_count: u64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl ScanReport {
    /// All rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.results.values().flatten()
    }

    pub fn row_count(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    /// Analyzer column names (the header without its label column).
    pub fn columns(&self) -> &[String] {
        self.header.get(1..).unwrap_or(&[])
    }
}
