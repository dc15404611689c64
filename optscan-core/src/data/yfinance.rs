//! Dividend yields scraped from Yahoo Finance quote pages.
//!
//! Equities publish a "Forward Dividend & Yield" line; ETFs only a "Yield"
//! figure. Symbols with neither pay no dividend and yield 0.0.

use super::cache::DailyCache;
use super::provider::{DividendClient, FetchError};
use super::scrape::{percent_to_fraction, visible_text};
use std::sync::Arc;
use std::time::Duration;

pub struct YahooDividendClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    cache: Option<Arc<DailyCache>>,
}

impl YahooDividendClient {
    /// `endpoint` is the quote-page prefix the symbol is appended to.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            endpoint: endpoint.into(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<DailyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn equity_yield(text: &str) -> Option<f64> {
        let key = "Forward Dividend & Yield";
        let tail = &text[text.find(key)? + key.len()..];
        let open = tail.find('(')?;
        let close = tail[open..].find('%')? + open;
        percent_to_fraction(&tail[open + 1..close])
    }

    fn etf_yield(text: &str) -> Option<f64> {
        let key = "Yield";
        let tail = &text[text.find(key)? + key.len()..];
        percent_to_fraction(&tail[..tail.find('%')?])
    }

    fn parse_yield(html: &str) -> f64 {
        let text = visible_text(html);
        Self::equity_yield(&text)
            .or_else(|| Self::etf_yield(&text))
            .unwrap_or(0.0)
    }
}

impl DividendClient for YahooDividendClient {
    fn name(&self) -> &str {
        "yfinance"
    }

    fn fetch_annual_yield(&self, symbol: &str) -> Result<f64, FetchError> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(symbol)) {
            return Ok(cached);
        }

        let url = format!("{}{symbol}", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(FetchError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: format!("quote page for {symbol}"),
            });
        }
        let html = resp.text().map_err(FetchError::from_reqwest)?;

        let div_yield = Self::parse_yield(&html);
        tracing::debug!(symbol, div_yield, "scraped dividend yield");
        if let Some(cache) = &self.cache {
            cache.insert(symbol, div_yield);
        }
        Ok(div_yield)
    }
}
