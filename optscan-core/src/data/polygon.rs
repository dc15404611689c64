//! Polygon equity quote provider.
//!
//! The underlying price is the size-weighted midpoint of the last NBBO quote;
//! history comes from the daily aggregates endpoint. Neither endpoint reports
//! rate-limit headers, so these calls are not admission-gated.

use super::provider::{FetchError, QuoteClient};
use crate::domain::DailyQuote;
use chrono::{Local, Months, NaiveDate};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct LastQuoteResponse {
    last: Option<LastQuote>,
}

#[derive(Debug, Deserialize)]
struct LastQuote {
    askprice: f64,
    asksize: f64,
    bidprice: f64,
    bidsize: f64,
}

#[derive(Debug, Deserialize)]
struct AggsResponse {
    results: Option<Vec<Agg>>,
}

#[derive(Debug, Deserialize)]
struct Agg {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    /// Bar start, epoch milliseconds.
    t: i64,
}

pub struct PolygonClient {
    client: reqwest::blocking::Client,
    v1_endpoint: String,
    v2_endpoint: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(
        v1_endpoint: impl Into<String>,
        v2_endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            v1_endpoint: with_trailing_slash(v1_endpoint.into()),
            v2_endpoint: with_trailing_slash(v2_endpoint.into()),
            api_key: api_key.into(),
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        symbol: &str,
    ) -> Result<T, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(&[("apiKey", self.api_key.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::AuthenticationRequired(
                "Polygon rejected the API key".into(),
            ));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                message: format!("Polygon request for {symbol} failed"),
            });
        }

        resp.json()
            .map_err(|e| FetchError::ResponseFormatChanged(format!("{symbol}: {e}")))
    }

    fn weighted_mid(symbol: &str, resp: LastQuoteResponse) -> Result<f64, FetchError> {
        let q = resp
            .last
            .ok_or_else(|| FetchError::ResponseFormatChanged(format!("no last quote for {symbol}")))?;

        let total = q.asksize + q.bidsize;
        if total <= 0.0 {
            return Err(FetchError::ResponseFormatChanged(format!(
                "empty book for {symbol}"
            )));
        }
        let mid = (q.askprice * q.asksize + q.bidprice * q.bidsize) / total;
        Ok((mid * 100.0).round() / 100.0)
    }

    fn parse_aggs(symbol: &str, resp: AggsResponse) -> Result<Vec<DailyQuote>, FetchError> {
        let results = resp.results.ok_or_else(|| FetchError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;

        results
            .into_iter()
            .map(|a| {
                let date = chrono::DateTime::from_timestamp_millis(a.t)
                    .map(|dt| dt.naive_utc().date())
                    .ok_or_else(|| {
                        FetchError::ResponseFormatChanged(format!("invalid timestamp: {}", a.t))
                    })?;
                Ok(DailyQuote {
                    date,
                    open: a.o,
                    high: a.h,
                    low: a.l,
                    close: a.c,
                    volume: a.v,
                })
            })
            .collect()
    }

    fn year_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        (start, today)
    }
}

fn with_trailing_slash(mut s: String) -> String {
    if !s.ends_with('/') {
        s.push('/');
    }
    s
}

impl QuoteClient for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }

    fn fetch_underlying(&self, symbol: &str) -> Result<f64, FetchError> {
        let url = format!("{}last_quote/stocks/{symbol}", self.v1_endpoint);
        let resp: LastQuoteResponse = self.get_json(&url, symbol)?;
        Self::weighted_mid(symbol, resp)
    }

    fn fetch_year_quotes(&self, symbol: &str) -> Result<Vec<DailyQuote>, FetchError> {
        let (start, end) = Self::year_range(Local::now().date_naive());
        let url = format!(
            "{}aggs/ticker/{symbol}/range/1/day/{}/{}",
            self.v2_endpoint,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        );
        let resp: AggsResponse = self.get_json(&url, symbol)?;
        Self::parse_aggs(symbol, resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_is_weighted_by_size() {
        let resp: LastQuoteResponse = serde_json::from_str(
            r#"{"last":{"askprice":101.0,"asksize":1,"bidprice":100.0,"bidsize":3}}"#,
        )
        .unwrap();
        let mid = PolygonClient::weighted_mid("X", resp).unwrap();
        assert!((mid - 100.25).abs() < 1e-9);
    }

    #[test]
    fn empty_book_is_an_error() {
        let resp: LastQuoteResponse = serde_json::from_str(
            r#"{"last":{"askprice":0.0,"asksize":0,"bidprice":0.0,"bidsize":0}}"#,
        )
        .unwrap();
        assert!(PolygonClient::weighted_mid("X", resp).is_err());
    }

    #[test]
    fn parses_daily_aggregates() {
        let resp: AggsResponse = serde_json::from_str(
            r#"{"results":[
                {"o":10.0,"h":11.0,"l":9.5,"c":10.5,"v":1000,"t":1704153600000},
                {"o":10.5,"h":12.0,"l":10.0,"c":11.5,"v":1500,"t":1704240000000}
            ]}"#,
        )
        .unwrap();
        let quotes = PolygonClient::parse_aggs("X", resp).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(quotes[1].close, 11.5);
    }

    #[test]
    fn missing_results_means_unknown_symbol() {
        let resp: AggsResponse = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        let err = PolygonClient::parse_aggs("ZZZZ", resp).unwrap_err();
        assert!(matches!(err, FetchError::SymbolNotFound { .. }));
    }

    #[test]
    fn year_range_spans_twelve_months() {
        let today = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let (start, end) = PolygonClient::year_range(today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(end, today);
    }
}
