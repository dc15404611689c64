//! Price-history statistics shared by the equity and wheel analyzers.

/// Simple returns between consecutive prices.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Trend over the trailing `range` prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFit {
    /// Period return, clipped to ±`max_ret`.
    pub period_return: f64,
    /// Coefficient of determination of a straight-line fit.
    pub r_squared: f64,
}

/// Fit a line through the last `range` prices (all of them if fewer).
pub fn regress_range(prices: &[f64], range: usize, max_ret: f64) -> Option<TrendFit> {
    if prices.len() < 2 {
        return None;
    }
    let y = if range >= prices.len() {
        prices
    } else {
        &prices[prices.len() - range..]
    };
    if y.len() < 2 || y[0] == 0.0 {
        return None;
    }

    let period_return = ((y[y.len() - 1] - y[0]) / y[0]).clamp(-max_ret, max_ret);

    let n = y.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, yi) in y.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (yi - mean_y);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (i, yi) in y.iter().enumerate() {
        let fit = intercept + slope * i as f64;
        ss_res += (yi - fit).powi(2);
        ss_tot += (yi - mean_y).powi(2);
    }
    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    Some(TrendFit {
        period_return,
        r_squared,
    })
}

/// Pearson correlation of two equally long series.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn population_std(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    (xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Rolling volatility over `period`-return windows.
#[derive(Debug, Clone, PartialEq)]
pub struct VolWindows {
    /// All windows except the latest, oldest first.
    pub history: Vec<f64>,
    /// The latest window.
    pub current: f64,
}

/// Rolling volatility, annualised by the length of the return series
/// (one year of daily returns).
pub fn vol_windows(returns: &[f64], period: usize) -> Option<VolWindows> {
    if period == 0 || returns.len() <= period + 1 {
        return None;
    }
    let scale = (returns.len() as f64).sqrt();
    let mut vols: Vec<f64> = (0..returns.len() - period)
        .map(|i| population_std(&returns[i..i + period]) * scale)
        .collect();
    let current = vols.pop()?;
    Some(VolWindows {
        history: vols,
        current,
    })
}

/// Fraction of `values` strictly below `x`.
pub fn fraction_below(values: &[f64], x: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| **v < x).count() as f64 / values.len() as f64
}

/// Fraction of `values` at or above `x`.
pub fn fraction_at_or_above(values: &[f64], x: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| **v >= x).count() as f64 / values.len() as f64
}

/// Round to `places` decimals.
pub fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn returns_of_doubling() {
        assert_eq!(simple_returns(&[1.0, 2.0, 4.0]), vec![1.0, 1.0]);
    }

    #[test]
    fn perfect_line_has_unit_r_squared() {
        let prices: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let fit = regress_range(&prices, 30, 2.0).unwrap();
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        // last 30 prices run 20..=49
        assert!((fit.period_return - 1.45).abs() < 1e-12);
    }

    #[test]
    fn period_return_is_clipped() {
        let fit = regress_range(&[10.0, 5.0, 1.0], 30, 0.5).unwrap();
        assert_eq!(fit.period_return, -0.5);
    }

    #[test]
    fn flat_series_fits_exactly() {
        let fit = regress_range(&[5.0; 10], 5, 1.0).unwrap();
        assert_eq!(fit.r_squared, 1.0);
        assert_eq!(fit.period_return, 0.0);
    }

    #[test]
    fn pearson_of_scaled_series_is_one() {
        let a = [1.0, 2.0, 3.0, 5.0];
        let b: Vec<f64> = a.iter().map(|x| 3.0 * x + 1.0).collect();
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        let c: Vec<f64> = a.iter().map(|x| -x).collect();
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_rejects_mismatched_lengths() {
        assert!(pearson(&[1.0, 2.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(pearson(&[1.0, 1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn vol_windows_split_history_and_current() {
        let rets: Vec<f64> = (0..50).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let v = vol_windows(&rets, 10).unwrap();
        assert_eq!(v.history.len(), 39);
        assert!((v.current - 0.01 * 50f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn fractions() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(fraction_below(&xs, 3.0), 0.5);
        assert_eq!(fraction_at_or_above(&xs, 3.0), 0.5);
        assert_eq!(fraction_below(&[], 3.0), 0.0);
    }

    proptest! {
        #[test]
        fn r_squared_is_a_fraction(prices in prop::collection::vec(1.0f64..500.0, 3..80)) {
            let fit = regress_range(&prices, 30, 1.0).unwrap();
            prop_assert!(fit.r_squared >= -1e-9 && fit.r_squared <= 1.0 + 1e-9);
            prop_assert!(fit.period_return.abs() <= 1.0);
        }

        #[test]
        fn correlation_is_bounded(
            pairs in prop::collection::vec((-1.0f64..1.0, -1.0f64..1.0), 3..60)
        ) {
            let (a, b): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            if let Some(r) = pearson(&a, &b) {
                prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&r));
            }
        }
    }
}
