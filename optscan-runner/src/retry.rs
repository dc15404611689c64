//! Bounded retries around a single fetch.
//!
//! Metered calls wait at the admission gate before every attempt; the gate
//! is the only pacing, there is no extra backoff. Successful metered
//! responses feed their rate-limit metadata back into the shared budget.

use crate::budget::{Admission, AdmissionGate, RateBudget};
use optscan_core::data::FetchError;
use optscan_core::domain::Metered;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Counts against the provider's rate limit; admission-gated.
    Metered,
    Unmetered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Give up on the first permanent error (bad credentials, unknown
    /// symbol, other 4xx) instead of spending the remaining attempts.
    pub fail_fast_on_permanent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            fail_fast_on_permanent: true,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("gave up after {attempts} attempt(s): {last_error}")]
pub struct FetchFailure {
    pub attempts: u32,
    pub last_error: FetchError,
}

pub struct FetchRetrier {
    policy: RetryPolicy,
    budget: Arc<RateBudget>,
    gate: Arc<AdmissionGate>,
}

impl FetchRetrier {
    pub fn new(policy: RetryPolicy, budget: Arc<RateBudget>, gate: Arc<AdmissionGate>) -> Self {
        Self {
            policy,
            budget,
            gate,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn fetch_with_retry<T, F>(&self, kind: FetchKind, mut fetch: F) -> Result<T, FetchFailure>
    where
        F: FnMut() -> Result<Metered<T>, FetchError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_error = FetchError::Other("no attempt made".into());

        while attempts < max_attempts {
            if kind == FetchKind::Metered && self.gate.wait() == Admission::Closed {
                return Err(FetchFailure {
                    attempts,
                    last_error: FetchError::Other("scan shutting down".into()),
                });
            }

            attempts += 1;
            match fetch() {
                Ok(response) => {
                    if let Some(info) = &response.rate {
                        self.budget.update_from(info);
                    }
                    return Ok(response.value);
                }
                Err(err) => {
                    let give_up = self.policy.fail_fast_on_permanent && err.is_permanent();
                    last_error = err;
                    if give_up {
                        break;
                    }
                }
            }
        }

        Err(FetchFailure {
            attempts,
            last_error,
        })
    }

    /// Retry a call whose response carries no rate-limit metadata.
    pub fn fetch_unmetered<T, F>(&self, mut fetch: F) -> Result<T, FetchFailure>
    where
        F: FnMut() -> Result<T, FetchError>,
    {
        self.fetch_with_retry(FetchKind::Unmetered, || fetch().map(Metered::unmetered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optscan_core::domain::RateLimitInfo;
    use std::cell::Cell;
    use std::thread;

    fn retrier(max_attempts: u32) -> FetchRetrier {
        FetchRetrier::new(
            RetryPolicy {
                max_attempts,
                fail_fast_on_permanent: true,
            },
            Arc::new(RateBudget::default()),
            Arc::new(AdmissionGate::new()),
        )
    }

    #[test]
    fn always_failing_fetch_uses_every_attempt() {
        let r = retrier(3);
        let calls = Cell::new(0);
        let out: Result<u32, _> = r.fetch_unmetered(|| {
            calls.set(calls.get() + 1);
            Err(FetchError::Timeout("slow".into()))
        });
        let failure = out.unwrap_err();
        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.get(), 3);
        assert!(matches!(failure.last_error, FetchError::Timeout(_)));
    }

    #[test]
    fn success_on_second_attempt() {
        let r = retrier(3);
        let calls = Cell::new(0);
        let out = r.fetch_unmetered(|| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(FetchError::Http {
                    status: 503,
                    message: "busy".into(),
                })
            } else {
                Ok(7)
            }
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_error_fails_fast() {
        let r = retrier(5);
        let calls = Cell::new(0);
        let out: Result<u32, _> = r.fetch_unmetered(|| {
            calls.set(calls.get() + 1);
            Err(FetchError::SymbolNotFound {
                symbol: "ZZZZ".into(),
            })
        });
        assert_eq!(out.unwrap_err().attempts, 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn permanent_error_retried_when_fail_fast_disabled() {
        let r = FetchRetrier::new(
            RetryPolicy {
                max_attempts: 4,
                fail_fast_on_permanent: false,
            },
            Arc::new(RateBudget::default()),
            Arc::new(AdmissionGate::new()),
        );
        let out: Result<u32, _> =
            r.fetch_unmetered(|| Err(FetchError::AuthenticationRequired("401".into())));
        assert_eq!(out.unwrap_err().attempts, 4);
    }

    #[test]
    fn metered_success_updates_budget() {
        let budget = Arc::new(RateBudget::new(200));
        let gate = Arc::new(AdmissionGate::new());
        let r = FetchRetrier::new(RetryPolicy::default(), budget.clone(), gate.clone());

        let releaser = {
            let gate = gate.clone();
            thread::spawn(move || {
                while !gate.release_one() {
                    thread::sleep(std::time::Duration::from_millis(2));
                }
            })
        };
        let out = r.fetch_with_retry(FetchKind::Metered, || {
            Ok(Metered::new(
                "chain",
                Some(RateLimitInfo {
                    available: 17,
                    allowed: 120,
                    expiry: 0,
                }),
            ))
        });
        releaser.join().unwrap();
        assert_eq!(out.unwrap(), "chain");
        assert_eq!(budget.available(), 17);
    }

    #[test]
    fn closed_gate_aborts_metered_fetch() {
        let gate = Arc::new(AdmissionGate::new());
        gate.close();
        let r = FetchRetrier::new(RetryPolicy::default(), Arc::new(RateBudget::default()), gate);
        let calls = Cell::new(0);
        let out: Result<u32, _> = r.fetch_with_retry(FetchKind::Metered, || {
            calls.set(calls.get() + 1);
            Ok(Metered::unmetered(1))
        });
        let failure = out.unwrap_err();
        assert_eq!(failure.attempts, 0);
        assert_eq!(calls.get(), 0);
    }
}
