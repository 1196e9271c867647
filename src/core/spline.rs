//! Natural cubic spline used to upsample circular curves

/// Natural cubic spline through strictly increasing knots
#[derive(Debug, Clone)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots
    second: Vec<f64>,
}

impl CubicSpline {
    /// Fit the spline. Fewer than three knots give a piecewise-linear curve.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Self {
        let second = natural_second_derivatives(&xs, &ys);
        Self { xs, ys, second }
    }

    /// Evaluate the spline, holding the end values outside the knot range
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 0 {
            return 0.0;
        }
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }

        let mut lo = 0;
        let mut hi = n - 1;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if self.xs[mid] <= x {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let h = self.xs[hi] - self.xs[lo];
        let a = (self.xs[hi] - x) / h;
        let b = (x - self.xs[lo]) / h;
        a * self.ys[lo]
            + b * self.ys[hi]
            + ((a * a * a - a) * self.second[lo] + (b * b * b - b) * self.second[hi]) * h * h / 6.0
    }
}

/// Solve the tridiagonal system for the knot second derivatives with
/// zero curvature at both ends (Thomas algorithm).
fn natural_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    if n < 3 {
        return vec![0.0; n];
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m = n - 2;
    let mut sub = vec![0.0; m];
    let mut diag = vec![0.0; m];
    let mut sup = vec![0.0; m];
    let mut rhs = vec![0.0; m];

    for i in 0..m {
        let k = i + 1;
        if i > 0 {
            sub[i] = h[k - 1];
        }
        diag[i] = 2.0 * (h[k - 1] + h[k]);
        if i + 1 < m {
            sup[i] = h[k];
        }
        rhs[i] = 6.0 * ((ys[k + 1] - ys[k]) / h[k] - (ys[k] - ys[k - 1]) / h[k - 1]);
    }

    let mut c_prime = vec![0.0; m];
    let mut d_prime = vec![0.0; m];
    c_prime[0] = sup[0] / diag[0];
    d_prime[0] = rhs[0] / diag[0];
    for i in 1..m {
        let w = diag[i] - sub[i] * c_prime[i - 1];
        c_prime[i] = sup[i] / w;
        d_prime[i] = (rhs[i] - sub[i] * d_prime[i - 1]) / w;
    }

    let mut second = vec![0.0; n];
    second[m] = d_prime[m - 1];
    for i in (0..m - 1).rev() {
        second[i + 1] = d_prime[i] - c_prime[i] * second[i + 2];
    }
    second
}
