//! Deterministic offline market for dry runs and tests.
//!
//! Every symbol gets its own seeded random walk (seed = BLAKE3 of the
//! symbol), so repeated runs see identical prices. Chains are priced with
//! Black-Scholes-Merton over a mildly skewed volatility surface and carry
//! provider-style Greeks. Metered responses report a shrinking rate budget
//! that resets once exhausted, which exercises the engine's throttling.

use super::provider::{DividendClient, FetchError, OptionsClient, QuoteClient, RateClient};
use crate::analysis::pricing::BsmInputs;
use crate::domain::{
    days_to_expiration, DailyQuote, Metered, OptionLevel, OptionType, ProviderGreeks,
    RateLimitInfo,
};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

const RISK_FREE_RATE: f64 = 0.04;

pub struct SyntheticMarket {
    as_of: NaiveDate,
    allowed: i64,
    metered_calls: AtomicI64,
    failure_rate: f64,
    failures: Mutex<StdRng>,
}

impl SyntheticMarket {
    pub fn new(as_of: NaiveDate) -> Self {
        Self {
            as_of,
            allowed: 120,
            metered_calls: AtomicI64::new(0),
            failure_rate: 0.0,
            failures: Mutex::new(StdRng::seed_from_u64(7)),
        }
    }

    /// Calls allowed per synthetic rate window.
    pub fn with_allowance(mut self, allowed: i64) -> Self {
        self.allowed = allowed.max(1);
        self
    }

    /// Fail this fraction of calls with a transient timeout.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn symbol_rng(symbol: &str, salt: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(salt.as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    fn maybe_fail(&self, what: &str) -> Result<(), FetchError> {
        if self.failure_rate <= 0.0 {
            return Ok(());
        }
        let roll: f64 = self.failures.lock().unwrap().gen();
        if roll < self.failure_rate {
            return Err(FetchError::Timeout(format!("synthetic {what}")));
        }
        Ok(())
    }

    fn next_rate(&self) -> RateLimitInfo {
        let n = self.metered_calls.fetch_add(1, Ordering::Relaxed);
        RateLimitInfo {
            available: self.allowed - 1 - (n % self.allowed),
            allowed: self.allowed,
            expiry: 0,
        }
    }

    fn quotes_for(&self, symbol: &str) -> Vec<DailyQuote> {
        let mut rng = Self::symbol_rng(symbol, "quotes");
        let mut price: f64 = rng.gen_range(20.0..400.0);
        let drift: f64 = rng.gen_range(-0.0005..0.0015);
        let vol: f64 = rng.gen_range(0.008..0.03);

        let mut quotes = Vec::new();
        let mut current = self.as_of - Duration::days(365);
        while current <= self.as_of {
            if matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                current += Duration::days(1);
                continue;
            }
            let ret = drift + vol * rng.gen_range(-1.7..1.7);
            let open = price;
            let close = (price * (1.0 + ret)).max(1.0);
            quotes.push(DailyQuote {
                date: current,
                open,
                high: open.max(close) * (1.0 + rng.gen_range(0.0..0.01)),
                low: open.min(close) * (1.0 - rng.gen_range(0.0..0.01)),
                close,
                volume: rng.gen_range(200_000.0..8_000_000.0),
            });
            price = close;
            current += Duration::days(1);
        }
        quotes
    }

    fn last_price(&self, symbol: &str) -> f64 {
        self.quotes_for(symbol)
            .last()
            .map(|q| (q.close * 100.0).round() / 100.0)
            .unwrap_or(100.0)
    }

    fn strike_step(price: f64) -> f64 {
        if price < 25.0 {
            0.5
        } else if price < 100.0 {
            1.0
        } else if price < 250.0 {
            2.5
        } else {
            5.0
        }
    }

    fn chain_for(&self, symbol: &str, expiration: NaiveDate) -> Vec<OptionLevel> {
        let spot = self.last_price(symbol);
        let dte = days_to_expiration(self.as_of, expiration).max(1);
        let mut rng = Self::symbol_rng(symbol, &expiration.to_string());
        let base_vol: f64 = rng.gen_range(0.18..0.55);
        let dividend = self.yield_for(symbol);

        let step = Self::strike_step(spot);
        let lo = ((spot * 0.75) / step).floor() * step;
        let hi = ((spot * 1.25) / step).ceil() * step;
        let mut levels = Vec::new();

        let mut strike = lo;
        while strike <= hi + 1e-9 {
            let moneyness = strike / spot - 1.0;
            let vol = base_vol * (1.0 - 0.4 * moneyness + 0.8 * moneyness * moneyness);
            let bsm = BsmInputs::from_dte(spot, strike, dte, RISK_FREE_RATE, dividend);

            for opt in [OptionType::Put, OptionType::Call] {
                let price = bsm.price(opt, vol).max(0.01);
                let g = bsm.greeks(opt, vol);
                let half_spread = (price * 0.03).max(0.01);
                let liquidity = (-(moneyness * 8.0).powi(2)).exp();
                let suffix = match opt {
                    OptionType::Put => "Put",
                    OptionType::Call => "Call",
                };
                levels.push(OptionLevel {
                    description: format!(
                        "{symbol} {} ${strike:.2} {suffix}",
                        expiration.format("%b %d %Y")
                    ),
                    root_symbol: symbol.to_string(),
                    expiration,
                    strike,
                    option_type: opt,
                    last: Some((price * 100.0).round() / 100.0),
                    bid: Some(((price - half_spread).max(0.0) * 100.0).round() / 100.0),
                    ask: Some(((price + half_spread) * 100.0).round() / 100.0),
                    open_interest: (rng.gen_range(50.0..5_000.0) * liquidity) as u64,
                    volume: (rng.gen_range(10.0..1_500.0) * liquidity) as u64,
                    greeks: Some(ProviderGreeks {
                        delta: g.delta,
                        gamma: g.gamma,
                        theta: g.theta,
                        vega: g.vega,
                        rho: g.rho,
                        mid_iv: vol,
                    }),
                });
            }
            strike += step;
        }
        levels
    }

    fn yield_for(&self, symbol: &str) -> f64 {
        let mut rng = Self::symbol_rng(symbol, "dividend");
        if rng.gen_bool(0.35) {
            0.0
        } else {
            (rng.gen_range(0.002..0.045) * 1e5_f64).round() / 1e5
        }
    }
}

impl OptionsClient for SyntheticMarket {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_expirations(&self, _symbol: &str) -> Result<Metered<Vec<NaiveDate>>, FetchError> {
        self.maybe_fail("expirations")?;
        let mut dates = Vec::new();
        let mut d = self.as_of + Duration::days(1);
        while d <= self.as_of + Duration::days(100) {
            if d.weekday() == Weekday::Fri {
                dates.push(d);
            }
            d += Duration::days(1);
        }
        Ok(Metered::new(dates, Some(self.next_rate())))
    }

    fn fetch_chain(
        &self,
        symbol: &str,
        expiration: NaiveDate,
    ) -> Result<Metered<Vec<OptionLevel>>, FetchError> {
        self.maybe_fail("chain")?;
        Ok(Metered::new(
            self.chain_for(symbol, expiration),
            Some(self.next_rate()),
        ))
    }
}

impl QuoteClient for SyntheticMarket {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_underlying(&self, symbol: &str) -> Result<f64, FetchError> {
        self.maybe_fail("underlying")?;
        Ok(self.last_price(symbol))
    }

    fn fetch_year_quotes(&self, symbol: &str) -> Result<Vec<DailyQuote>, FetchError> {
        self.maybe_fail("quotes")?;
        Ok(self.quotes_for(symbol))
    }
}

impl DividendClient for SyntheticMarket {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_annual_yield(&self, symbol: &str) -> Result<f64, FetchError> {
        Ok(self.yield_for(symbol))
    }
}

impl RateClient for SyntheticMarket {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_risk_free_rate(&self) -> Result<f64, FetchError> {
        Ok(RISK_FREE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> SyntheticMarket {
        SyntheticMarket::new(NaiveDate::from_ymd_opt(2024, 4, 15).unwrap())
    }

    #[test]
    fn quotes_are_deterministic_per_symbol() {
        let m = market();
        let a = m.fetch_year_quotes("AAA").unwrap();
        let b = m.fetch_year_quotes("AAA").unwrap();
        let c = m.fetch_year_quotes("BBB").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.last().unwrap().close, c.last().unwrap().close);
        assert_eq!(a.len(), c.len());
        assert!(a.iter().all(|q| q.is_sane()));
    }

    #[test]
    fn expirations_are_future_fridays() {
        let m = market();
        let exps = m.fetch_expirations("AAA").unwrap();
        assert!(!exps.value.is_empty());
        assert!(exps.value.iter().all(|d| d.weekday() == Weekday::Fri));
        assert!(exps.rate.is_some());
    }

    #[test]
    fn chain_has_puts_and_calls_with_greeks() {
        let m = market();
        let exp = m.fetch_expirations("AAA").unwrap().value[5];
        let chain = m.fetch_chain("AAA", exp).unwrap().value;
        assert!(chain.iter().any(|l| l.is_put()));
        assert!(chain.iter().any(|l| !l.is_put()));
        assert!(chain.iter().all(|l| l.greeks.is_some()));
        assert!(chain.iter().all(|l| l.bid <= l.ask));
    }

    #[test]
    fn rate_budget_counts_down_and_resets() {
        let m = market().with_allowance(3);
        let avail: Vec<i64> = (0..4)
            .map(|_| m.fetch_expirations("AAA").unwrap().rate.unwrap().available)
            .collect();
        assert_eq!(avail, vec![2, 1, 0, 2]);
    }

    #[test]
    fn full_failure_rate_always_fails() {
        let m = market().with_failure_rate(1.0);
        assert!(m.fetch_underlying("AAA").is_err());
        assert!(m.fetch_chain("AAA", m.as_of).is_err());
        // Scraped values never fail.
        assert!(m.fetch_annual_yield("AAA").is_ok());
    }
}
