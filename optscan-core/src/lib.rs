//! optscan core: market domain types, data clients and analyzers.
//!
//! This crate holds everything a scan needs short of the concurrency:
//! - Domain types (daily quotes, option levels, rate-limit metadata)
//! - Fetch-client traits with Tradier, Polygon, Yahoo Finance and YCharts
//!   implementations, plus a deterministic synthetic market
//! - Same-day JSON caching and universe loading
//! - The analyzer contract and the bundled credit-put-spread, wheel-put and
//!   regression analyzers with their pricing and statistics helpers

pub mod analysis;
pub mod data;
pub mod domain;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the scan engine shares across worker
    /// threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::DailyQuote>();
        require_sync::<domain::DailyQuote>();
        require_send::<domain::OptionLevel>();
        require_sync::<domain::OptionLevel>();
        require_send::<domain::RateLimitInfo>();
        require_sync::<domain::RateLimitInfo>();

        require_send::<data::FetchError>();
        require_sync::<data::FetchError>();
        require_send::<data::ClientSet>();
        require_sync::<data::ClientSet>();
        require_send::<data::SyntheticMarket>();
        require_sync::<data::SyntheticMarket>();
        require_send::<data::DailyCache>();
        require_sync::<data::DailyCache>();

        require_send::<analysis::Analyzer>();
        require_sync::<analysis::Analyzer>();
        require_send::<analysis::ResultRow>();
        require_sync::<analysis::ResultRow>();
        require_send::<analysis::AnalysisError>();
        require_sync::<analysis::AnalysisError>();
    }

    /// Analyzers are usable as trait objects.
    #[test]
    fn analyzer_traits_are_object_safe() {
        fn _option(a: &dyn analysis::OptionAnalyzer) -> &str {
            a.name()
        }
        fn _equity(a: &dyn analysis::EquityAnalyzer) -> &str {
            a.name()
        }
    }
}
