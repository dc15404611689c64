//! Ten-year treasury rate scraped from YCharts, used as the risk-free rate.

use super::cache::DailyCache;
use super::provider::{FetchError, RateClient};
use super::scrape::{percent_to_fraction, visible_text};
use std::sync::Arc;
use std::time::Duration;

const CACHE_KEY: &str = "risk_free_rate";
const INDICATOR: &str = "10_year_treasury_rate";

pub struct YChartsRateClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    cache: Option<Arc<DailyCache>>,
}

impl YChartsRateClient {
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

    fn parse_rate(html: &str) -> Result<f64, FetchError> {
        let text = visible_text(html);
        let key = "10 Year Treasury Rate is at ";
        let tail = text
            .find(key)
            .map(|pos| &text[pos + key.len()..])
            .ok_or_else(|| FetchError::ResponseFormatChanged("treasury rate sentence missing".into()))?;
        let end = tail
            .find('%')
            .ok_or_else(|| FetchError::ResponseFormatChanged("treasury rate has no percent".into()))?;
        percent_to_fraction(&tail[..end]).ok_or_else(|| {
            FetchError::ResponseFormatChanged(format!("unparseable rate '{}'", &tail[..end]))
        })
    }
}

impl RateClient for YChartsRateClient {
    fn name(&self) -> &str {
        "ycharts"
    }

    fn fetch_risk_free_rate(&self) -> Result<f64, FetchError> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(CACHE_KEY)) {
            return Ok(cached);
        }

        let url = format!("{}{INDICATOR}", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(FetchError::from_reqwest)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: "treasury rate page".into(),
            });
        }
        let html = resp.text().map_err(FetchError::from_reqwest)?;

        let rate = Self::parse_rate(&html)?;
        tracing::debug!(rate, "scraped 10-year treasury rate");
        if let Some(cache) = &self.cache {
            cache.insert(CACHE_KEY, rate);
        }
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rate_sentence() {
        let html = "<div><p>10 Year Treasury Rate is at 4.27%, compared to 4.25% the previous market day.</p></div>";
        assert_eq!(YChartsRateClient::parse_rate(html).unwrap(), 0.0427);
    }

    #[test]
    fn missing_sentence_is_format_error() {
        let err = YChartsRateClient::parse_rate("<p>maintenance</p>").unwrap_err();
        assert!(matches!(err, FetchError::ResponseFormatChanged(_)));
    }
}
