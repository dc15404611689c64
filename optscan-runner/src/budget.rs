//! Shared rate budget and the admission gate metered fetches wait on.
//!
//! The budget is a single atomic integer: workers store the provider's
//! latest `available` figure after every metered response, the director
//! reads it to pick a pace. Last write wins; only eventual consistency is
//! needed.
//!
//! The gate hands out one permit per director tick. A permit is only
//! granted when somebody is waiting, so idle ticks do not bank capacity.

use optscan_core::domain::RateLimitInfo;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};

pub const DEFAULT_INITIAL_BUDGET: i64 = 200;

#[derive(Debug)]
pub struct RateBudget {
    available: AtomicI64,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_BUDGET)
    }
}

impl RateBudget {
    pub fn new(initial: i64) -> Self {
        Self {
            available: AtomicI64::new(initial),
        }
    }

    pub fn available(&self) -> i64 {
        self.available.load(Ordering::Relaxed)
    }

    pub fn set(&self, available: i64) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn update_from(&self, info: &RateLimitInfo) {
        self.set(info.available);
    }
}

/// Outcome of waiting at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    /// The scan is tearing down; the caller must not issue the request.
    Closed,
}

#[derive(Debug, Default)]
struct GateState {
    permits: usize,
    waiters: usize,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct AdmissionGate {
    state: Mutex<GateState>,
    admitted: Condvar,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the director releases this caller or the gate closes.
    pub fn wait(&self) -> Admission {
        let mut state = self.state.lock().unwrap();
        state.waiters += 1;
        state = self
            .admitted
            .wait_while(state, |s| s.permits == 0 && !s.closed)
            .unwrap();
        state.waiters -= 1;
        if state.permits > 0 {
            state.permits -= 1;
            Admission::Granted
        } else {
            Admission::Closed
        }
    }

    /// Release exactly one waiter, if any. Returns whether one was released.
    pub fn release_one(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed || state.waiters <= state.permits {
            return false;
        }
        state.permits += 1;
        self.admitted.notify_one();
        true
    }

    /// Wake every waiter with [`Admission::Closed`]. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.admitted.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Callers currently blocked in [`wait`](Self::wait).
    pub fn waiting(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.waiters.saturating_sub(state.permits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn wait_for_waiters(gate: &AdmissionGate, n: usize) {
        for _ in 0..200 {
            if gate.waiting() == n {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("expected {n} waiters, saw {}", gate.waiting());
    }

    #[test]
    fn budget_tracks_last_update() {
        let b = RateBudget::default();
        assert_eq!(b.available(), 200);
        b.update_from(&RateLimitInfo {
            available: 42,
            allowed: 120,
            expiry: 0,
        });
        assert_eq!(b.available(), 42);
    }

    #[test]
    fn release_without_waiters_banks_nothing() {
        let gate = AdmissionGate::new();
        assert!(!gate.release_one());
        assert!(!gate.release_one());
        assert_eq!(gate.waiting(), 0);
    }

    #[test]
    fn one_release_admits_one_waiter() {
        let gate = Arc::new(AdmissionGate::new());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait())
            })
            .collect();
        wait_for_waiters(&gate, 2);

        assert!(gate.release_one());
        wait_for_waiters(&gate, 1);
        assert!(gate.release_one());

        let outcomes: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes, vec![Admission::Granted, Admission::Granted]);
    }

    #[test]
    fn close_releases_everyone() {
        let gate = Arc::new(AdmissionGate::new());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || gate.wait())
            })
            .collect();
        wait_for_waiters(&gate, 3);

        gate.close();
        for h in handles {
            assert_eq!(h.join().unwrap(), Admission::Closed);
        }
        assert!(gate.is_closed());
        assert_eq!(gate.wait(), Admission::Closed);
        assert!(!gate.release_one());
    }
}
