//! Market domain types shared by clients, analyzers and the scan engine.

pub mod option;
pub mod quote;
pub mod rate;

pub use option::{days_to_expiration, OptionLevel, OptionType, ProviderGreeks};
pub use quote::{closes, DailyQuote};
pub use rate::{Metered, RateLimitInfo};

/// Symbol type alias
pub type Symbol = String;
