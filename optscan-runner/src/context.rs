//! Per-scan shared state, handed to every worker behind one `Arc`.

use crate::aggregate::{FailureCounters, ResultMap};
use crate::budget::{AdmissionGate, RateBudget};
use crate::log_channel::LogSender;
use crate::queue::TaskQueue;
use crate::retry::FetchRetrier;
use chrono::NaiveDate;
use optscan_core::analysis::{Analyzer, ResultRow};
use optscan_core::data::ClientSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub struct ScanContext {
    pub queue: TaskQueue<String>,
    pub budget: Arc<RateBudget>,
    pub gate: Arc<AdmissionGate>,
    pub retrier: FetchRetrier,
    pub results: ResultMap<Vec<ResultRow>>,
    pub counters: FailureCounters,
    pub skipped: AtomicU64,
    pub log: LogSender,
    pub cancel: Arc<AtomicBool>,
    pub clients: ClientSet,
    pub analyzer: Analyzer,
    /// Date DTE is measured from.
    pub as_of: NaiveDate,
    /// Fetched once per scan when the analyzer asks for it, else 0.
    pub risk_free_rate: f64,
}

impl ScanContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
