//! Least-squares polynomial fit of |delta| against strike.
//!
//! The fitted curve approximates the probability that the underlying
//! finishes below a price, which lets analyzers integrate expected P/L
//! across a spread's strike range. The fit starts at a high order and
//! drops one degree at a time while the design matrix is rank deficient.

/// Highest polynomial order attempted.
pub const MAX_ORDER: usize = 11;

/// Relative pivot size below which the system counts as rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct DeltaCurve {
    /// Coefficients in ascending order, over the normalized abscissa.
    coefs: Vec<f64>,
    center: f64,
    half_range: f64,
}

impl DeltaCurve {
    /// Fit `points` (strike, delta) with |delta| as the target.
    ///
    /// Returns `None` when fewer than two distinct strikes are available.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        Self::fit_with_order(points, MAX_ORDER)
    }

    pub fn fit_with_order(points: &[(f64, f64)], max_order: usize) -> Option<Self> {
        let finite: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if finite.len() < 2 {
            return None;
        }

        let (min_x, max_x) = finite
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (x, _)| {
                (lo.min(*x), hi.max(*x))
            });
        if max_x - min_x <= f64::EPSILON {
            return None;
        }
        let center = 0.5 * (max_x + min_x);
        let half_range = 0.5 * (max_x - min_x);

        let xs: Vec<f64> = finite.iter().map(|(x, _)| (x - center) / half_range).collect();
        let ys: Vec<f64> = finite.iter().map(|(_, y)| y.abs()).collect();

        let mut order = max_order.min(finite.len() - 1);
        loop {
            if let Some(coefs) = least_squares(&xs, &ys, order) {
                return Some(Self {
                    coefs,
                    center,
                    half_range,
                });
            }
            if order == 0 {
                return None;
            }
            order -= 1;
        }
    }

    pub fn order(&self) -> usize {
        self.coefs.len() - 1
    }

    /// Evaluate the curve at an underlying price (Horner's rule).
    pub fn eval(&self, price: f64) -> f64 {
        let x = (price - self.center) / self.half_range;
        self.coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Solve min ||V c - y|| for a Vandermonde `V` of the given order using
/// Householder QR. `None` if `V` is numerically rank deficient.
fn least_squares(xs: &[f64], ys: &[f64], order: usize) -> Option<Vec<f64>> {
    let m = xs.len();
    let n = order + 1;
    if m < n {
        return None;
    }

    // Column-major design matrix.
    let mut a: Vec<Vec<f64>> = (0..n)
        .map(|j| xs.iter().map(|x| x.powi(j as i32)).collect())
        .collect();
    let mut b = ys.to_vec();

    let mut max_pivot: f64 = 0.0;
    for k in 0..n {
        let norm = a[k][k..].iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm == 0.0 {
            return None;
        }
        let alpha = if a[k][k] > 0.0 { -norm } else { norm };

        let mut v: Vec<f64> = a[k][k..].to_vec();
        v[0] -= alpha;
        let v_norm_sq: f64 = v.iter().map(|x| x * x).sum();
        if v_norm_sq > 0.0 {
            for col in a.iter_mut().skip(k) {
                let dot: f64 = v.iter().zip(&col[k..]).map(|(vi, ci)| vi * ci).sum();
                let f = 2.0 * dot / v_norm_sq;
                for (ci, vi) in col[k..].iter_mut().zip(&v) {
                    *ci -= f * vi;
                }
            }
            let dot: f64 = v.iter().zip(&b[k..]).map(|(vi, bi)| vi * bi).sum();
            let f = 2.0 * dot / v_norm_sq;
            for (bi, vi) in b[k..].iter_mut().zip(&v) {
                *bi -= f * vi;
            }
        }

        let pivot = a[k][k].abs();
        max_pivot = max_pivot.max(pivot);
        if pivot <= RANK_TOLERANCE * max_pivot.max(1.0) {
            return None;
        }
    }

    // Back substitution on the upper-triangular R.
    let mut coefs = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = ((i + 1)..n).map(|j| a[j][i] * coefs[j]).sum();
        coefs[i] = (b[i] - tail) / a[i][i];
    }
    if coefs.iter().all(|c| c.is_finite()) {
        Some(coefs)
    } else {
        None
    }
}
