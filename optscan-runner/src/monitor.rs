//! Loop monitor: re-run a wheel scan on a timer and alert on contracts
//! that score above a threshold.
//!
//! A contract alerts at most once per `repeat_window_secs`. The loop stops
//! when the shared cancel flag is set (also mid-sleep) or after
//! `max_iterations` scans.

use crate::aggregate::ScanReport;
use crate::config::ConfigError;
use crate::notify::Notifier;
use crate::ranking::{rank_contracts, RankConfig, RankError, RankedContract};
use crate::scanner::ScanError;
use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub delay_secs: u64,
    pub repeat_window_secs: u64,
    pub score_threshold: f64,
    /// Send alerts; when false they are only logged.
    pub notify_activity: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delay_secs: 900,
            repeat_window_secs: 3600,
            score_threshold: 50.0,
            notify_activity: true,
            max_iterations: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_secs == 0 {
            return Err(ConfigError::Invalid("monitor.delay_secs must be positive".into()));
        }
        if !self.score_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "monitor.score_threshold must be finite".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub contract: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub iterations: u64,
    pub failed_scans: u64,
    pub alerts_sent: u64,
}

pub struct LoopMonitor {
    config: MonitorConfig,
    rank: RankConfig,
    notifier: Arc<dyn Notifier>,
    last_alerted: HashMap<String, DateTime<Local>>,
}

impl LoopMonitor {
    pub fn new(config: MonitorConfig, rank: RankConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            rank,
            notifier,
            last_alerted: HashMap::new(),
        }
    }

    /// Contracts at or above the threshold, best score first, minus those
    /// alerted within the repeat window. Selected contracts are recorded
    /// as alerted at `now`.
    pub fn select_alerts(&mut self, ranked: &[RankedContract], now: DateTime<Local>) -> Vec<Alert> {
        let window = ChronoDuration::seconds(self.config.repeat_window_secs as i64);
        let mut candidates: Vec<&RankedContract> = ranked
            .iter()
            .filter(|r| r.score >= self.config.score_threshold)
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut alerts = Vec::new();
        for r in candidates {
            if let Some(last) = self.last_alerted.get(&r.contract) {
                if now.signed_duration_since(*last) < window {
                    continue;
                }
            }
            alerts.push(Alert {
                contract: r.contract.clone(),
                subject: format!("ALERT: {} High Score", r.symbol),
                text: format!(
                    "Put scan at {} revealed a score of {:.2}% for the contract {}.",
                    now.format("%I:%M %p"),
                    r.score,
                    r.contract
                ),
            });
            self.last_alerted.insert(r.contract.clone(), now);
        }
        alerts
    }

    /// Rank a finished scan and deliver its alerts. Returns alerts sent.
    pub fn process(&mut self, report: &ScanReport, now: DateTime<Local>) -> Result<u64, RankError> {
        let ranked = rank_contracts(report.columns(), report.rows(), &self.rank)?;
        let alerts = self.select_alerts(&ranked, now);
        tracing::info!(
            scan = %report.scan_name,
            ranked = ranked.len(),
            alerts = alerts.len(),
            "monitor pass complete"
        );

        let mut sent = 0;
        for alert in &alerts {
            if !self.config.notify_activity {
                tracing::info!(contract = %alert.contract, "{}", alert.subject);
                continue;
            }
            match self.notifier.send(&alert.subject, &alert.text) {
                Ok(()) => sent += 1,
                Err(e) => tracing::error!(
                    notifier = self.notifier.name(),
                    contract = %alert.contract,
                    "alert not delivered: {e}"
                ),
            }
        }
        Ok(sent)
    }

    /// Scan, alert, sleep; until cancelled or out of iterations. Failed
    /// scans are logged and retried on the next tick.
    pub fn run<F>(&mut self, cancel: &AtomicBool, mut scan: F) -> Result<MonitorSummary, RankError>
    where
        F: FnMut() -> Result<ScanReport, ScanError>,
    {
        let mut summary = MonitorSummary::default();
        let delay = Duration::from_secs(self.config.delay_secs);

        while !cancel.load(Ordering::Relaxed) {
            let started = Instant::now();
            match scan() {
                Ok(report) => {
                    summary.alerts_sent += self.process(&report, Local::now())?;
                }
                Err(e) => {
                    summary.failed_scans += 1;
                    tracing::error!("monitor scan failed: {e}");
                }
            }
            summary.iterations += 1;

            if self
                .config
                .max_iterations
                .is_some_and(|max| summary.iterations >= max)
            {
                break;
            }
            let remaining = delay.saturating_sub(started.elapsed());
            tracing::info!("next scan in {}s", remaining.as_secs());
            sleep_unless_cancelled(cancel, remaining);
        }
        Ok(summary)
    }
}

fn sleep_unless_cancelled(cancel: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !cancel.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(Duration::from_millis(200)));
    }
}
