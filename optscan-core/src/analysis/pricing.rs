//! Black-Scholes-Merton pricing, Greeks and implied volatility.
//!
//! Conventions follow the usual listed-option quoting: theta is per calendar
//! day, vega and rho per one volatility/rate point.

use crate::domain::OptionType;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use thiserror::Error;

/// Days per year used to convert DTE into a year fraction.
pub const DAYS_PER_YEAR: f64 = 365.2422;

const IV_LOWER: f64 = 1e-4;
const IV_UPPER: f64 = 5.0;
const IV_TOLERANCE: f64 = 1e-8;
const IV_MAX_ITERATIONS: usize = 200;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("price {price} is below intrinsic value {intrinsic}")]
    BelowIntrinsic { price: f64, intrinsic: f64 },

    #[error("price {price} is above the maximum model price {max}")]
    AboveMaximum { price: f64, max: f64 },

    #[error("invalid pricing input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Greeks {
    pub iv: f64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Market inputs for a single contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BsmInputs {
    pub spot: f64,
    pub strike: f64,
    /// Time to expiration in years.
    pub years: f64,
    pub rate: f64,
    /// Continuous dividend yield.
    pub dividend: f64,
}

impl BsmInputs {
    pub fn new(spot: f64, strike: f64, years: f64, rate: f64, dividend: f64) -> Self {
        Self {
            spot,
            strike,
            years,
            rate,
            dividend,
        }
    }

    /// Inputs for a contract `dte` calendar days out.
    pub fn from_dte(spot: f64, strike: f64, dte: i64, rate: f64, dividend: f64) -> Self {
        Self::new(spot, strike, dte as f64 / DAYS_PER_YEAR, rate, dividend)
    }

    fn validate(&self) -> Result<(), PricingError> {
        if !(self.spot > 0.0 && self.strike > 0.0 && self.years > 0.0) {
            return Err(PricingError::InvalidInput(format!(
                "spot={}, strike={}, years={}",
                self.spot, self.strike, self.years
            )));
        }
        Ok(())
    }

    fn d1_d2(&self, vol: f64) -> (f64, f64) {
        let sqrt_t = self.years.sqrt();
        let d1 = ((self.spot / self.strike).ln()
            + (self.rate - self.dividend + 0.5 * vol * vol) * self.years)
            / (vol * sqrt_t);
        (d1, d1 - vol * sqrt_t)
    }

    fn spot_discount(&self) -> f64 {
        (-self.dividend * self.years).exp()
    }

    fn strike_discount(&self) -> f64 {
        (-self.rate * self.years).exp()
    }

    pub fn intrinsic(&self, opt: OptionType) -> f64 {
        match opt {
            OptionType::Call => (self.spot - self.strike).max(0.0),
            OptionType::Put => (self.strike - self.spot).max(0.0),
        }
    }

    pub fn price(&self, opt: OptionType, vol: f64) -> f64 {
        let n = Normal::standard();
        let (d1, d2) = self.d1_d2(vol);
        let s = self.spot * self.spot_discount();
        let k = self.strike * self.strike_discount();
        match opt {
            OptionType::Call => s * n.cdf(d1) - k * n.cdf(d2),
            OptionType::Put => k * n.cdf(-d2) - s * n.cdf(-d1),
        }
    }

    pub fn greeks(&self, opt: OptionType, vol: f64) -> Greeks {
        let n = Normal::standard();
        let (d1, d2) = self.d1_d2(vol);
        let sqrt_t = self.years.sqrt();
        let qd = self.spot_discount();
        let rd = self.strike_discount();
        let pdf_d1 = n.pdf(d1);

        let gamma = qd * pdf_d1 / (self.spot * vol * sqrt_t);
        let vega = self.spot * qd * pdf_d1 * sqrt_t / 100.0;
        let decay = -self.spot * qd * pdf_d1 * vol / (2.0 * sqrt_t);

        let (delta, theta_year, rho) = match opt {
            OptionType::Call => (
                qd * n.cdf(d1),
                decay - self.rate * self.strike * rd * n.cdf(d2)
                    + self.dividend * self.spot * qd * n.cdf(d1),
                self.strike * self.years * rd * n.cdf(d2) / 100.0,
            ),
            OptionType::Put => (
                -qd * n.cdf(-d1),
                decay + self.rate * self.strike * rd * n.cdf(-d2)
                    - self.dividend * self.spot * qd * n.cdf(-d1),
                -self.strike * self.years * rd * n.cdf(-d2) / 100.0,
            ),
        };

        Greeks {
            iv: vol,
            delta,
            gamma,
            theta: theta_year / 365.0,
            vega,
            rho,
        }
    }

    /// Solve for the volatility that reproduces `price`, by bisection.
    ///
    /// Price is monotone increasing in volatility, so bisection always
    /// converges when the price is inside the model's attainable range.
    pub fn implied_vol(&self, opt: OptionType, price: f64) -> Result<f64, PricingError> {
        self.validate()?;
        if !price.is_finite() || price <= 0.0 {
            return Err(PricingError::InvalidInput(format!("price={price}")));
        }

        // Zero-vol price is the discounted intrinsic, the floor of the range.
        let intrinsic = self.price(opt, IV_LOWER);
        if price < intrinsic - IV_TOLERANCE {
            return Err(PricingError::BelowIntrinsic { price, intrinsic });
        }
        let max = self.price(opt, IV_UPPER);
        if price > max {
            return Err(PricingError::AboveMaximum { price, max });
        }

        let (mut lo, mut hi) = (IV_LOWER, IV_UPPER);
        for _ in 0..IV_MAX_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            let diff = self.price(opt, mid) - price;
            if diff.abs() < IV_TOLERANCE || (hi - lo) < IV_TOLERANCE {
                return Ok(mid);
            }
            if diff > 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(0.5 * (lo + hi))
    }

    /// Implied volatility plus Greeks at that volatility.
    pub fn greeks_from_price(&self, opt: OptionType, price: f64) -> Result<Greeks, PricingError> {
        let iv = self.implied_vol(opt, price)?;
        Ok(self.greeks(opt, iv))
    }
}

/// Standard normal CDF.
pub fn norm_cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atm() -> BsmInputs {
        BsmInputs::new(100.0, 100.0, 0.5, 0.03, 0.01)
    }

    #[test]
    fn put_call_parity() {
        let i = atm();
        let vol = 0.25;
        let call = i.price(OptionType::Call, vol);
        let put = i.price(OptionType::Put, vol);
        let parity = i.spot * i.spot_discount() - i.strike * i.strike_discount();
        assert!((call - put - parity).abs() < 1e-10);
    }

    #[test]
    fn implied_vol_recovers_input() {
        let i = BsmInputs::new(50.0, 45.0, 40.0 / DAYS_PER_YEAR, 0.04, 0.0);
        let price = i.price(OptionType::Put, 0.37);
        let iv = i.implied_vol(OptionType::Put, price).unwrap();
        assert!((iv - 0.37).abs() < 1e-5, "iv = {iv}");
    }

    #[test]
    fn put_delta_is_negative_and_bounded() {
        let g = atm().greeks(OptionType::Put, 0.3);
        assert!(g.delta < 0.0 && g.delta > -1.0);
        assert!(g.gamma > 0.0);
        assert!(g.vega > 0.0);
        assert!(g.theta < 0.0);
        assert!(g.rho < 0.0);
    }

    #[test]
    fn call_and_put_delta_differ_by_dividend_discount() {
        let i = atm();
        let c = i.greeks(OptionType::Call, 0.2).delta;
        let p = i.greeks(OptionType::Put, 0.2).delta;
        assert!((c - p - i.spot_discount()).abs() < 1e-10);
    }

    #[test]
    fn price_below_intrinsic_is_rejected() {
        let i = BsmInputs::new(80.0, 100.0, 0.25, 0.0, 0.0);
        let err = i.implied_vol(OptionType::Put, 15.0).unwrap_err();
        assert!(matches!(err, PricingError::BelowIntrinsic { .. }));
    }

    #[test]
    fn expired_contract_is_invalid_input() {
        let i = BsmInputs::new(100.0, 100.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            i.implied_vol(OptionType::Put, 1.0),
            Err(PricingError::InvalidInput(_))
        ));
    }

    #[test]
    fn norm_cdf_symmetry() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((norm_cdf(1.3) + norm_cdf(-1.3) - 1.0).abs() < 1e-12);
    }
}
