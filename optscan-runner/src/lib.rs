//! optscan runner: the concurrent scanning engine and what sits on top of it.
//!
//! This crate builds on `optscan-core` to provide:
//! - Task queue, rate budget and admission gate, rate director
//! - Fetch retrier and the worker pipeline with failure isolation
//! - Result/failure aggregation, scan log channel and progress sink
//! - Scan orchestration (`Scanner::run` → `ScanReport`) and CSV export
//! - Wheel-put ranking, the loop monitor and alert notifiers

pub mod aggregate;
pub mod budget;
pub mod config;
pub mod context;
pub mod director;
pub mod export;
pub mod log_channel;
pub mod monitor;
pub mod notify;
pub mod progress;
pub mod queue;
pub mod ranking;
pub mod retry;
pub mod scanner;
pub mod worker;

pub use aggregate::{DuplicateKey, FailureCounters, ResultKey, ResultMap, ScanReport};
pub use budget::{Admission, AdmissionGate, RateBudget};
pub use config::{ConfigError, Credentials, ScanConfig, Settings, SlackCredentials};
pub use director::{DirectorHandle, DirectorStats, RateDirector, RateState, ThrottlePolicy};
pub use export::{latest_scan, load_scan, save_scan, ExportError, SavedScan};
pub use log_channel::{log_channel, LogLevel, LogReceiver, LogRecord, LogSender};
pub use monitor::{Alert, LoopMonitor, MonitorConfig, MonitorSummary};
pub use notify::{LogNotifier, Notifier, NotifyError, SlackNotifier};
pub use progress::{ProgressSink, SinkSummary};
pub use queue::TaskQueue;
pub use ranking::{format_ranking, rank_contracts, RankConfig, RankError, RankedContract};
pub use retry::{FetchFailure, FetchKind, FetchRetrier, RetryPolicy};
pub use scanner::{fetch_index, ScanError, Scanner};
