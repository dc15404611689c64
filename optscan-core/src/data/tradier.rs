//! Tradier options provider.
//!
//! Expirations and chains come from the brokerage market-data API. Every
//! response carries `X-Ratelimit-*` headers, which are surfaced as
//! [`RateLimitInfo`] so the engine can adapt its admission rate.

use super::provider::{FetchError, OptionsClient};
use crate::domain::{Metered, OptionLevel, OptionType, ProviderGreeks, RateLimitInfo};
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Tradier wraps single-element arrays as bare objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpirationsResponse {
    expirations: Option<ExpirationDates>,
}

#[derive(Debug, Deserialize)]
struct ExpirationDates {
    date: OneOrMany<String>,
}

#[derive(Debug, Deserialize)]
struct ChainResponse {
    options: Option<ChainOptions>,
}

#[derive(Debug, Deserialize)]
struct ChainOptions {
    option: OneOrMany<ChainLevel>,
}

#[derive(Debug, Deserialize)]
struct ChainLevel {
    description: String,
    root_symbol: String,
    expiration_date: String,
    strike: f64,
    option_type: String,
    last: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    #[serde(default)]
    open_interest: Option<u64>,
    #[serde(default)]
    volume: Option<u64>,
    greeks: Option<ChainGreeks>,
}

#[derive(Debug, Deserialize)]
struct ChainGreeks {
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
    rho: Option<f64>,
    mid_iv: Option<f64>,
}

pub struct TradierClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    greeks: bool,
}

impl TradierClient {
    /// `endpoint` is the API root including the version segment, e.g.
    /// `https://api.tradier.com/v1/`.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        let mut endpoint = endpoint.into();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        Self {
            client,
            endpoint,
            api_key: api_key.into(),
            greeks: true,
        }
    }

    /// Request chains without provider greeks.
    pub fn without_greeks(mut self) -> Self {
        self.greeks = false;
        self
    }

    /// Tradier uses `/` for share classes (`BRK/B`), the universe files use `.`.
    fn provider_symbol(symbol: &str) -> String {
        symbol.replace('.', "/")
    }

    fn get(&self, url: &str, symbol: &str) -> Result<reqwest::blocking::Response, FetchError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FetchError::AuthenticationRequired(
                "Tradier rejected the API key".into(),
            ));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: format!("Tradier request for {symbol} failed"),
            });
        }
        Ok(resp)
    }

    fn parse_rate_headers(headers: &reqwest::header::HeaderMap) -> Option<RateLimitInfo> {
        let read = |name: &str| -> Option<i64> {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i64>().ok())
        };
        Some(RateLimitInfo {
            available: read("x-ratelimit-available")?,
            allowed: read("x-ratelimit-allowed")?,
            expiry: read("x-ratelimit-expiry")?,
        })
    }

    fn parse_expirations(
        symbol: &str,
        resp: ExpirationsResponse,
    ) -> Result<Vec<NaiveDate>, FetchError> {
        let dates = resp.expirations.ok_or_else(|| FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;

        dates
            .date
            .into_vec()
            .iter()
            .map(|d| {
                NaiveDate::parse_from_str(d, "%Y-%m-%d").map_err(|e| {
                    FetchError::ResponseFormatChanged(format!("invalid expiration '{d}': {e}"))
                })
            })
            .collect()
    }

    fn parse_chain(symbol: &str, resp: ChainResponse) -> Result<Vec<OptionLevel>, FetchError> {
        let options = resp.options.ok_or_else(|| {
            FetchError::ResponseFormatChanged(format!("no option chain returned for {symbol}"))
        })?;

        options
            .option
            .into_vec()
            .into_iter()
            .map(|level| {
                let option_type = match level.option_type.as_str() {
                    "put" => OptionType::Put,
                    "call" => OptionType::Call,
                    other => {
                        return Err(FetchError::ResponseFormatChanged(format!(
                            "unknown option type '{other}'"
                        )))
                    }
                };
                let expiration = NaiveDate::parse_from_str(&level.expiration_date, "%Y-%m-%d")
                    .map_err(|e| {
                        FetchError::ResponseFormatChanged(format!(
                            "invalid expiration '{}': {e}",
                            level.expiration_date
                        ))
                    })?;
                let greeks = level.greeks.and_then(|g| {
                    Some(ProviderGreeks {
                        delta: g.delta?,
                        gamma: g.gamma?,
                        theta: g.theta?,
                        vega: g.vega?,
                        rho: g.rho?,
                        mid_iv: g.mid_iv?,
                    })
                });

                Ok(OptionLevel {
                    description: level.description,
                    root_symbol: level.root_symbol,
                    expiration,
                    strike: level.strike,
                    option_type,
                    last: level.last,
                    bid: level.bid,
                    ask: level.ask,
                    open_interest: level.open_interest.unwrap_or(0),
                    volume: level.volume.unwrap_or(0),
                    greeks,
                })
            })
            .collect()
    }
}

impl OptionsClient for TradierClient {
    fn name(&self) -> &str {
        "tradier"
    }

    fn fetch_expirations(&self, symbol: &str) -> Result<Metered<Vec<NaiveDate>>, FetchError> {
        let url = format!(
            "{}markets/options/expirations?symbol={}",
            self.endpoint,
            Self::provider_symbol(symbol)
        );
        let resp = self.get(&url, symbol)?;
        let rate = Self::parse_rate_headers(resp.headers());
        let body: ExpirationsResponse = resp.json().map_err(|e| {
            FetchError::ResponseFormatChanged(format!("expirations for {symbol}: {e}"))
        })?;
        Ok(Metered::new(Self::parse_expirations(symbol, body)?, rate))
    }

    fn fetch_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<Metered<Vec<OptionLevel>>, FetchError> {
        let url = format!(
            "{}markets/options/chains?symbol={}&expiration={}&greeks={}",
            self.endpoint,
            Self::provider_symbol(symbol),
            expiration.format("%Y-%m-%d"),
            self.greeks
        );
        let resp = self.get(&url, symbol)?;
        let rate = Self::parse_rate_headers(resp.headers());
        let body: ChainResponse = resp
            .json()
            .map_err(|e| FetchError::ResponseFormatChanged(format!("chain for {symbol}: {e}")))?;
        Ok(Metered::new(Self::parse_chain(symbol, body)?, rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_class_symbols_use_slash() {
        assert_eq!(TradierClient::provider_symbol("BRK.B"), "BRK/B");
        assert_eq!(TradierClient::provider_symbol("AAPL"), "AAPL");
    }

    #[test]
    fn parses_expiration_list() {
        let json = r#"{"expirations":{"date":["2024-02-16","2024-03-15"]}}"#;
        let resp: ExpirationsResponse = serde_json::from_str(json).unwrap();
        let dates = TradierClient::parse_expirations("AAPL", resp).unwrap();
        assert_eq!(dates.len(), 2);
        assert_eq!(dates[1], NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn single_expiration_is_not_an_array() {
        let json = r#"{"expirations":{"date":"2024-02-16"}}"#;
        let resp: ExpirationsResponse = serde_json::from_str(json).unwrap();
        let dates = TradierClient::parse_expirations("AAPL", resp).unwrap();
        assert_eq!(dates, vec![NaiveDate::from_ymd_opt(2024, 2, 16).unwrap()]);
    }

    #[test]
    fn null_expirations_means_unknown_symbol() {
        let resp: ExpirationsResponse = serde_json::from_str(r#"{"expirations":null}"#).unwrap();
        let err = TradierClient::parse_expirations("ZZZZ", resp).unwrap_err();
        assert!(err.is_permanent());
    }

    #[test]
    fn parses_chain_with_greeks() {
        let json = r#"{"options":{"option":[{
            "symbol":"AAPL240216P00180000",
            "description":"AAPL Feb 16 2024 $180.00 Put",
            "root_symbol":"AAPL",
            "expiration_date":"2024-02-16",
            "strike":180.0,
            "option_type":"put",
            "last":2.15,"bid":2.1,"ask":2.2,
            "open_interest":1200,"volume":340,
            "greeks":{"delta":-0.31,"gamma":0.02,"theta":-0.05,"vega":0.2,"rho":-0.04,"mid_iv":0.27}
        }]}}"#;
        let resp: ChainResponse = serde_json::from_str(json).unwrap();
        let chain = TradierClient::parse_chain("AAPL", resp).unwrap();
        assert_eq!(chain.len(), 1);
        let level = &chain[0];
        assert!(level.is_put());
        assert_eq!(level.open_interest, 1200);
        assert!((level.greeks.unwrap().mid_iv - 0.27).abs() < 1e-12);
    }

    #[test]
    fn partial_greeks_are_dropped() {
        let json = r#"{"options":{"option":{
            "description":"X","root_symbol":"X","expiration_date":"2024-02-16",
            "strike":10.0,"option_type":"call","last":null,"bid":null,"ask":null,
            "greeks":{"delta":0.5,"gamma":null,"theta":null,"vega":null,"rho":null,"mid_iv":null}
        }}}"#;
        let resp: ChainResponse = serde_json::from_str(json).unwrap();
        let chain = TradierClient::parse_chain("X", resp).unwrap();
        assert!(chain[0].greeks.is_none());
        assert_eq!(chain[0].volume, 0);
    }

    #[test]
    fn rate_headers_parse() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-available", "57".parse().unwrap());
        headers.insert("x-ratelimit-allowed", "120".parse().unwrap());
        headers.insert("x-ratelimit-expiry", "1700000000000".parse().unwrap());
        let info = TradierClient::parse_rate_headers(&headers).unwrap();
        assert_eq!(info.available, 57);
        assert_eq!(info.allowed, 120);
    }

    #[test]
    fn missing_rate_header_yields_none() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-available", "57".parse().unwrap());
        assert!(TradierClient::parse_rate_headers(&headers).is_none());
    }
}
