//! Fetch-client traits and structured error types.
//!
//! The scan engine consumes market data only through these traits, so the
//! HTTP clients, the synthetic client and test mocks are interchangeable.
//! Clients never panic past their boundary: every failure comes back as a
//! [`FetchError`].

use crate::domain::{DailyQuote, Metered, OptionLevel};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

/// Structured error types for fetch operations.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("fetch error: {0}")]
    Other(String),
}

impl FetchError {
    /// Errors that will not go away by asking again.
    ///
    /// 408 and 429 are treated as transient, as are all 5xx and parse
    /// failures (providers occasionally return truncated bodies).
    pub fn is_permanent(&self) -> bool {
        match self {
            FetchError::AuthenticationRequired(_) | FetchError::SymbolNotFound { .. } => true,
            FetchError::Http { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }

    /// Map a transport-level reqwest error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_decode() {
            FetchError::ResponseFormatChanged(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            FetchError::NetworkUnreachable(err.to_string())
        }
    }
}

/// Options provider: expirations and chains. Responses carry rate-limit
/// metadata, so calls are admission-gated by the engine.
pub trait OptionsClient: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_expirations(&self, symbol: &str) -> Result<Metered<Vec<NaiveDate>>, FetchError>;

    fn fetch_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<Metered<Vec<OptionLevel>>, FetchError>;
}

/// Equity quote provider: last price and one year of daily history.
pub trait QuoteClient: Send + Sync {
    fn name(&self) -> &str;

    /// Current underlying price.
    fn fetch_underlying(&self, symbol: &str) -> Result<f64, FetchError>;

    /// Daily quotes covering the trailing year, oldest first.
    fn fetch_year_quotes(&self, symbol: &str) -> Result<Vec<DailyQuote>, FetchError>;
}

pub trait DividendClient: Send + Sync {
    fn name(&self) -> &str;

    /// Annual dividend yield as a fraction (0.0123 = 1.23%).
    fn fetch_annual_yield(&self, symbol: &str) -> Result<f64, FetchError>;
}

pub trait RateClient: Send + Sync {
    fn name(&self) -> &str;

    /// Risk-free rate as a fraction.
    fn fetch_risk_free_rate(&self) -> Result<f64, FetchError>;
}

/// The full set of clients a scan draws from.
#[derive(Clone)]
pub struct ClientSet {
    pub options: Arc<dyn OptionsClient>,
    pub quotes: Arc<dyn QuoteClient>,
    pub dividends: Arc<dyn DividendClient>,
    pub rates: Arc<dyn RateClient>,
}

impl ClientSet {
    /// One client serving every role (the synthetic market, test mocks).
    pub fn single<C>(client: Arc<C>) -> Self
    where
        C: OptionsClient + QuoteClient + DividendClient + RateClient + 'static,
    {
        Self {
            options: client.clone(),
            quotes: client.clone(),
            dividends: client.clone(),
            rates: client,
        }
    }
}

impl std::fmt::Debug for ClientSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSet")
            .field("options", &self.options.name())
            .field("quotes", &self.quotes.name())
            .field("dividends", &self.dividends.name())
            .field("rates", &self.rates.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_missing_symbol_are_permanent() {
        assert!(FetchError::AuthenticationRequired("bad key".into()).is_permanent());
        assert!(FetchError::SymbolNotFound {
            symbol: "ZZZZ".into()
        }
        .is_permanent());
    }

    #[test]
    fn client_errors_are_permanent_except_throttle_and_timeout() {
        let http = |status| FetchError::Http {
            status,
            message: String::new(),
        };
        assert!(http(404).is_permanent());
        assert!(http(400).is_permanent());
        assert!(!http(429).is_permanent());
        assert!(!http(408).is_permanent());
        assert!(!http(503).is_permanent());
    }

    #[test]
    fn transport_and_parse_errors_are_transient() {
        assert!(!FetchError::Timeout("30s".into()).is_permanent());
        assert!(!FetchError::NetworkUnreachable("dns".into()).is_permanent());
        assert!(!FetchError::ResponseFormatChanged("missing field".into()).is_permanent());
        assert!(!FetchError::RateLimited {
            retry_after_secs: 60
        }
        .is_permanent());
    }
}
