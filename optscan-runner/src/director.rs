//! Rate director: paces metered fetches from the shared budget.
//!
//! One dedicated thread reads the budget, maps it to a call rate, sleeps
//! one interval and releases exactly one waiter at the admission gate.
//!
//! | Budget                     | State     | Calls per period       |
//! |----------------------------|-----------|------------------------|
//! | `> warm_threshold`         | Warm      | `warm_rate`            |
//! | `<= throttle_threshold`    | Throttled | `throttle_rate`        |
//! | otherwise                  | Scaled    | `scale_factor × budget`|

use crate::budget::{AdmissionGate, RateBudget};
use crate::log_channel::LogSender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const SOURCE: &str = "director";

/// Longest uninterrupted sleep, so a stop request is noticed promptly even
/// at the throttled pace.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateState {
    Warm,
    Scaled,
    Throttled,
}

impl fmt::Display for RateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateState::Warm => "warm",
            RateState::Scaled => "scaled",
            RateState::Throttled => "throttled",
        };
        f.write_str(s)
    }
}

/// Thresholds and rates the director paces by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlePolicy {
    /// Budget strictly above this runs at `warm_rate`.
    pub warm_threshold: i64,
    pub warm_rate: u32,
    /// Budget at or below this runs at `throttle_rate`.
    pub throttle_threshold: i64,
    pub throttle_rate: u32,
    /// Between the thresholds the rate is `scale_factor × budget`.
    pub scale_factor: u32,
    /// Length of the period rates are expressed over (60 = calls/minute).
    pub period_secs: f64,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            warm_threshold: 100,
            warm_rate: 500,
            throttle_threshold: 30,
            throttle_rate: 30,
            scale_factor: 2,
            period_secs: 60.0,
        }
    }
}

impl ThrottlePolicy {
    pub fn rate_for(&self, available: i64) -> (RateState, u32) {
        if available > self.warm_threshold {
            (RateState::Warm, self.warm_rate)
        } else if available <= self.throttle_threshold {
            (RateState::Throttled, self.throttle_rate)
        } else {
            let scaled = (self.scale_factor as i64 * available).clamp(1, u32::MAX as i64);
            (RateState::Scaled, scaled as u32)
        }
    }

    /// Time between releases at `rate` calls per period.
    pub fn interval(&self, rate: u32) -> Duration {
        Duration::from_secs_f64(self.period_secs / rate.max(1) as f64)
    }

    /// Rates at or below this many calls per period are logged as warnings.
    fn is_slow(&self, state: RateState, rate: u32) -> bool {
        state == RateState::Throttled || (rate as f64) <= 100.0 * self.period_secs / 60.0
    }
}

pub struct RateDirector {
    policy: ThrottlePolicy,
    budget: Arc<RateBudget>,
    gate: Arc<AdmissionGate>,
    log: LogSender,
}

/// A running director. Dropping it without [`stop`](Self::stop) leaves the
/// thread running until its exit flag is set.
pub struct DirectorHandle {
    exit: Arc<AtomicBool>,
    gate: Arc<AdmissionGate>,
    handle: JoinHandle<DirectorStats>,
}

/// What the director did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorStats {
    pub ticks: u64,
    pub releases: u64,
    pub transitions: u64,
}

impl RateDirector {
    pub fn new(
        policy: ThrottlePolicy,
        budget: Arc<RateBudget>,
        gate: Arc<AdmissionGate>,
        log: LogSender,
    ) -> Self {
        Self {
            policy,
            budget,
            gate,
            log,
        }
    }

    pub fn spawn(self) -> DirectorHandle {
        let exit = Arc::new(AtomicBool::new(false));
        let gate = self.gate.clone();
        let flag = exit.clone();
        let handle = thread::Builder::new()
            .name("optscan-director".into())
            .spawn(move || self.run(&flag))
            .expect("failed to spawn director thread");
        DirectorHandle { exit, gate, handle }
    }

    fn run(self, exit: &AtomicBool) -> DirectorStats {
        let mut stats = DirectorStats::default();
        let mut applied: Option<u32> = None;

        while !exit.load(Ordering::Acquire) {
            let available = self.budget.available();
            let (state, rate) = self.policy.rate_for(available);

            if applied != Some(rate) {
                let message = format!("rate set to {rate} calls/period ({state}, {available} available)");
                if self.policy.is_slow(state, rate) {
                    self.log.warn(SOURCE, message);
                } else {
                    self.log.info(SOURCE, message);
                }
                applied = Some(rate);
                stats.transitions += 1;
            }

            if !sleep_unless(exit, self.policy.interval(rate)) {
                break;
            }
            stats.ticks += 1;
            if self.gate.release_one() {
                stats.releases += 1;
            }
        }

        self.log.info(
            SOURCE,
            format!(
                "stopped after {} ticks, {} releases",
                stats.ticks, stats.releases
            ),
        );
        stats
    }
}

/// Sleep for `total`, waking early if `exit` is set. Returns `false` when
/// interrupted.
fn sleep_unless(exit: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if exit.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MAX_SLEEP_SLICE));
    }
}

impl DirectorHandle {
    /// Set the exit flag, wait for the thread, then close the gate so no
    /// caller is left blocked.
    pub fn stop(self) -> DirectorStats {
        self.exit.store(true, Ordering::Release);
        let stats = self.handle.join().unwrap_or_default();
        self.gate.close();
        stats
    }
}
