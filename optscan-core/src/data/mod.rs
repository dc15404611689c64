//! Market-data clients, caching and universe loading

pub mod cache;
pub mod polygon;
pub mod provider;
pub mod scrape;
pub mod synthetic;
pub mod tradier;
pub mod universe;
pub mod ycharts;
pub mod yfinance;

pub use cache::{CacheError, DailyCache};
pub use polygon::PolygonClient;
pub use provider::{ClientSet, DividendClient, FetchError, OptionsClient, QuoteClient, RateClient};
pub use synthetic::SyntheticMarket;
pub use tradier::TradierClient;
pub use universe::{Universe, UniverseError};
pub use ycharts::YChartsRateClient;
pub use yfinance::YahooDividendClient;
