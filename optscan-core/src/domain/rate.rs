//! Provider rate-limit metadata attached to metered responses.

use serde::{Deserialize, Serialize};

/// Snapshot of the provider's per-window call allowance.
///
/// Parsed from the `X-Ratelimit-Available`, `X-Ratelimit-Allowed` and
/// `X-Ratelimit-Expiry` response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub available: i64,
    pub allowed: i64,
    /// Window reset, epoch milliseconds.
    pub expiry: i64,
}

/// A fetched value plus the rate-limit state reported alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    pub value: T,
    pub rate: Option<RateLimitInfo>,
}

impl<T> Metered<T> {
    pub fn new(value: T, rate: Option<RateLimitInfo>) -> Self {
        Self { value, rate }
    }

    pub fn unmetered(value: T) -> Self {
        Self { value, rate: None }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metered<U> {
        Metered {
            value: f(self.value),
            rate: self.rate,
        }
    }
}
