//! Scan orchestration: build the per-scan context, start the director and
//! the worker pool, watch progress, collect the report.
//!
//! Teardown order matters: workers drain the queue, the sink sees `join`
//! return, the director is stopped (which closes the admission gate), the
//! CSV is written, and the log channel gets its final drain.

use crate::aggregate::{FailureCounters, ResultMap, ScanReport};
use crate::budget::{AdmissionGate, RateBudget};
use crate::config::{ConfigError, ScanConfig};
use crate::context::ScanContext;
use crate::director::RateDirector;
use crate::export::{save_scan, scan_name, ExportError};
use crate::log_channel::log_channel;
use crate::progress::ProgressSink;
use crate::queue::TaskQueue;
use crate::retry::FetchRetrier;
use crate::worker::{worker_loop, WorkerStats};
use chrono::{Local, NaiveDate};
use optscan_core::analysis::{Analyzer, WheelConfig, WheelPutAnalyzer};
use optscan_core::data::{ClientSet, FetchError, Universe};
use optscan_core::domain::DailyQuote;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use thiserror::Error;

const SOURCE: &str = "scanner";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot open scan log {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to save scan: {0}")]
    Export(#[from] ExportError),

    #[error("failed to fetch {symbol} index quotes: {source}")]
    Index { symbol: String, source: FetchError },
}

/// One year of daily quotes for the benchmark index.
pub fn fetch_index(clients: &ClientSet, symbol: &str) -> Result<Vec<DailyQuote>, ScanError> {
    clients
        .quotes
        .fetch_year_quotes(symbol)
        .map_err(|source| ScanError::Index {
            symbol: symbol.to_string(),
            source,
        })
}

pub struct Scanner {
    config: ScanConfig,
    clients: ClientSet,
    analyzer: Analyzer,
    cancel: Arc<AtomicBool>,
    as_of: NaiveDate,
}

impl Scanner {
    pub fn new(config: ScanConfig, clients: ClientSet, analyzer: Analyzer) -> Self {
        Self {
            config,
            clients,
            analyzer,
            cancel: Arc::new(AtomicBool::new(false)),
            as_of: Local::now().date_naive(),
        }
    }

    /// Wheel-put scanner correlated against a freshly fetched index window.
    /// Build one per scan: symbols whose history no longer lines up with
    /// the index are skipped.
    pub fn wheel_put(
        config: ScanConfig,
        clients: ClientSet,
        wheel: WheelConfig,
        index_symbol: &str,
    ) -> Result<Self, ScanError> {
        let index = fetch_index(&clients, index_symbol)?;
        let analyzer = Analyzer::option(WheelPutAnalyzer::new(wheel, &index));
        Ok(Self::new(config, clients, analyzer))
    }

    /// Share a cancel flag with the caller (Ctrl-C handler, loop monitor).
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Measure DTE from `as_of` instead of today.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn run(&self, universe: &Universe) -> Result<ScanReport, ScanError> {
        self.config.validate()?;
        if universe.is_empty() {
            return Err(ConfigError::Invalid("universe is empty".into()).into());
        }

        let started_at = Local::now();
        let started = Instant::now();
        let name = scan_name(self.analyzer.kind(), self.analyzer.name(), started_at);
        let (log, logs) = log_channel();

        let mut sink = ProgressSink::new(
            universe.len(),
            Duration::from_millis(self.config.poll_interval_ms),
        );
        if self.config.show_progress {
            sink = sink.with_bar(&name);
        }
        if self.config.log_changes {
            let path = self.config.log_dir.join(format!("{name}.log"));
            sink = sink
                .with_log_file(&path)
                .map_err(|source| ScanError::LogFile { path, source })?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("optscan-worker-{i}"))
            .build()?;

        log.info(
            SOURCE,
            format!(
                "starting {name}: {} symbols, {} workers, config {}",
                universe.len(),
                self.config.workers,
                &self.config.fingerprint()[..12]
            ),
        );

        let risk_free_rate = if self.analyzer.needs().risk_free_rate {
            match self.clients.rates.fetch_risk_free_rate() {
                Ok(rate) => rate,
                Err(e) => {
                    log.warn(SOURCE, format!("risk-free rate unavailable, using 0: {e}"));
                    0.0
                }
            }
        } else {
            0.0
        };

        let budget = Arc::new(RateBudget::new(self.config.initial_budget));
        let gate = Arc::new(AdmissionGate::new());
        let ctx = Arc::new(ScanContext {
            queue: TaskQueue::new(),
            budget: budget.clone(),
            gate: gate.clone(),
            retrier: FetchRetrier::new(self.config.retry_policy(), budget.clone(), gate.clone()),
            results: ResultMap::new(),
            counters: FailureCounters::default(),
            skipped: AtomicU64::new(0),
            log: log.clone(),
            cancel: self.cancel.clone(),
            clients: self.clients.clone(),
            analyzer: self.analyzer.clone(),
            as_of: self.as_of,
            risk_free_rate,
        });
        ctx.queue.extend(universe.symbols().iter().cloned());

        let director =
            RateDirector::new(self.config.throttle, budget, gate, log.clone()).spawn();

        let (done_tx, done_rx) = mpsc::channel::<WorkerStats>();
        for worker_id in 0..self.config.workers {
            let ctx = ctx.clone();
            let done_tx = done_tx.clone();
            pool.spawn(move || {
                let _ = done_tx.send(worker_loop(&ctx, worker_id));
            });
        }
        drop(done_tx);

        sink.watch(&ctx.queue, &logs);
        let processed: u64 = done_rx.iter().map(|s| s.processed).sum();
        let director_stats = director.stop();

        let report = ScanReport {
            scan_name: name,
            header: self.analyzer.header(),
            results: ctx.results.take(),
            fetch_failure_count: ctx.counters.fetch(),
            analysis_failure_count: ctx.counters.analysis(),
            skipped_count: ctx.skipped(),
            cancelled: ctx.is_cancelled(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };

        let saved = if self.config.save_scan {
            Some(save_scan(&self.config.scan_dir, &report))
        } else {
            None
        };
        match &saved {
            Some(Ok(path)) => log.info(SOURCE, format!("saved {}", path.display())),
            Some(Err(e)) => log.error(SOURCE, format!("could not save scan: {e}")),
            None => {}
        }
        log.info(
            SOURCE,
            format!(
                "finished in {:.1}s: {} symbols processed, {} result keys, {} rows, {} fetch failures, {} analysis failures, {} skipped, {} gated calls",
                report.elapsed_secs,
                processed,
                report.results.len(),
                report.row_count(),
                report.fetch_failure_count,
                report.analysis_failure_count,
                report.skipped_count,
                director_stats.releases,
            ),
        );
        drop(log);
        sink.finish(&logs);

        if let Some(Err(e)) = saved {
            return Err(e.into());
        }
        Ok(report)
    }
}
