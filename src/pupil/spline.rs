//! Not-a-knot cubic spline interpolation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplineError {
    #[error("need at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("knot {0} does not increase strictly")]
    NonIncreasing(usize),
    #[error("{knots} knots but {values} values")]
    LengthMismatch { knots: usize, values: usize },
    #[error("{knots} knots but {derivatives} second derivatives")]
    DerivativeMismatch { knots: usize, derivatives: usize },
    #[error("non-finite coefficient at knot {0}")]
    NonFinite(usize),
}

/// Piecewise cubic through every knot, stored as knot values plus second
/// derivatives. Outside the knot range the first/last piece is extended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CubicSpline {
    knots: Vec<f64>,
    values: Vec<f64>,
    second_derivatives: Vec<f64>,
}

impl CubicSpline {
    /// Fits with not-a-knot end conditions. Two points give a line and three
    /// a parabola.
    pub fn fit(knots: &[f64], values: &[f64]) -> Result<Self, SplineError> {
        check_points(knots, values)?;
        let n = knots.len();

        let second_derivatives = match n {
            2 => vec![0.0; 2],
            3 => {
                let slope0 = (values[1] - values[0]) / (knots[1] - knots[0]);
                let slope1 = (values[2] - values[1]) / (knots[2] - knots[1]);
                let curvature = 2.0 * (slope1 - slope0) / (knots[2] - knots[0]);
                vec![curvature; 3]
            }
            _ => not_a_knot(knots, values),
        };

        Ok(Self {
            knots: knots.to_vec(),
            values: values.to_vec(),
            second_derivatives,
        })
    }

    /// Rebuilds a spline from stored coefficients, applying the same checks
    /// as [`CubicSpline::fit`] so evaluation never indexes out of range.
    pub fn from_parts(
        knots: Vec<f64>,
        values: Vec<f64>,
        second_derivatives: Vec<f64>,
    ) -> Result<Self, SplineError> {
        check_points(&knots, &values)?;
        if second_derivatives.len() != knots.len() {
            return Err(SplineError::DerivativeMismatch {
                knots: knots.len(),
                derivatives: second_derivatives.len(),
            });
        }
        let bad = values
            .iter()
            .zip(&second_derivatives)
            .position(|(value, m)| !value.is_finite() || !m.is_finite());
        if let Some(i) = bad {
            return Err(SplineError::NonFinite(i));
        }
        Ok(Self {
            knots,
            values,
            second_derivatives,
        })
    }

    /// Fitted domain as `(first knot, last knot)`.
    pub fn domain(&self) -> (f64, f64) {
        (self.knots[0], self.knots[self.knots.len() - 1])
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let i = self.interval(x);
        let (x0, x1) = (self.knots[i], self.knots[i + 1]);
        let (y0, y1) = (self.values[i], self.values[i + 1]);
        let (m0, m1) = (self.second_derivatives[i], self.second_derivatives[i + 1]);
        let h = x1 - x0;
        let left = x1 - x;
        let right = x - x0;
        m0 * left.powi(3) / (6.0 * h)
            + m1 * right.powi(3) / (6.0 * h)
            + (y0 / h - m0 * h / 6.0) * left
            + (y1 / h - m1 * h / 6.0) * right
    }

    fn interval(&self, x: f64) -> usize {
        let last = self.knots.len() - 2;
        self.knots
            .partition_point(|&knot| knot <= x)
            .saturating_sub(1)
            .min(last)
    }
}

impl<'de> Deserialize<'de> for CubicSpline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawSpline {
            knots: Vec<f64>,
            values: Vec<f64>,
            second_derivatives: Vec<f64>,
        }

        let raw = RawSpline::deserialize(deserializer)?;
        CubicSpline::from_parts(raw.knots, raw.values, raw.second_derivatives)
            .map_err(serde::de::Error::custom)
    }
}

fn check_points(knots: &[f64], values: &[f64]) -> Result<(), SplineError> {
    if knots.len() != values.len() {
        return Err(SplineError::LengthMismatch {
            knots: knots.len(),
            values: values.len(),
        });
    }
    if knots.len() < 2 {
        return Err(SplineError::TooFewPoints(knots.len()));
    }
    if let Some(i) = knots.iter().position(|knot| !knot.is_finite()) {
        return Err(SplineError::NonFinite(i));
    }
    if let Some(i) = knots.windows(2).position(|pair| !(pair[1] > pair[0])) {
        return Err(SplineError::NonIncreasing(i + 1));
    }
    Ok(())
}

/// Second derivatives for `n >= 4` knots. The end conditions (third
/// derivative continuous across the second and penultimate knots) are folded
/// into the first and last rows, leaving a tridiagonal system in M1..M(n-2).
fn not_a_knot(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let slopes: Vec<f64> = (0..n - 1).map(|i| (y[i + 1] - y[i]) / h[i]).collect();

    let size = n - 2;
    let mut sub = vec![0.0; size];
    let mut diag = vec![0.0; size];
    let mut sup = vec![0.0; size];
    let mut rhs = vec![0.0; size];
    for row in 0..size {
        let i = row + 1;
        sub[row] = h[i - 1];
        diag[row] = 2.0 * (h[i - 1] + h[i]);
        sup[row] = h[i];
        rhs[row] = 6.0 * (slopes[i] - slopes[i - 1]);
    }

    let (h0, h1) = (h[0], h[1]);
    diag[0] += h0 * (1.0 + h0 / h1);
    sup[0] -= h0 * h0 / h1;
    sub[0] = 0.0;

    let (ha, hb) = (h[n - 3], h[n - 2]);
    diag[size - 1] += hb * (1.0 + hb / ha);
    sub[size - 1] -= hb * hb / ha;
    sup[size - 1] = 0.0;

    let interior = solve_tridiagonal(&sub, &diag, &sup, &rhs);

    let mut m = Vec::with_capacity(n);
    m.push(interior[0] * (1.0 + h0 / h1) - interior[1] * h0 / h1);
    m.extend_from_slice(&interior);
    m.push(interior[size - 1] * (1.0 + hb / ha) - interior[size - 2] * hb / ha);
    m
}

/// Thomas algorithm; `sub[0]` and `sup[last]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let size = diag.len();
    let mut c = vec![0.0; size];
    let mut d = vec![0.0; size];
    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..size {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = sup[i] / denom;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }
    let mut solution = vec![0.0; size];
    solution[size - 1] = d[size - 1];
    for i in (0..size - 1).rev() {
        solution[i] = d[i] - c[i] * solution[i + 1];
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cubic(x: f64) -> f64 {
        0.5 * x.powi(3) - 2.0 * x * x + x + 3.0
    }

    #[test]
    fn reproduces_cubic_polynomial_exactly() {
        let knots = [0.0, 0.7, 1.5, 2.0, 3.1, 4.0, 5.5];
        let values: Vec<f64> = knots.iter().map(|&x| cubic(x)).collect();
        let spline = CubicSpline::fit(&knots, &values).unwrap();
        for x in [0.0, 0.35, 1.0, 2.5, 3.9, 5.5, -1.0, 7.0] {
            assert_abs_diff_eq!(spline.evaluate(x), cubic(x), epsilon = 1e-8);
        }
    }

    #[test]
    fn passes_through_knots() {
        let knots = [0.0, 10.0, 20.0, 35.0, 50.0];
        let values = [3.1, 3.4, 3.2, 3.9, 3.7];
        let spline = CubicSpline::fit(&knots, &values).unwrap();
        for (&x, &y) in knots.iter().zip(values.iter()) {
            assert_abs_diff_eq!(spline.evaluate(x), y, epsilon = 1e-10);
        }
    }

    #[test]
    fn two_points_interpolate_linearly() {
        let spline = CubicSpline::fit(&[100.0, 900.0], &[3.1, 3.2]).unwrap();
        assert_abs_diff_eq!(spline.evaluate(500.0), 3.15, epsilon = 1e-12);
        assert_abs_diff_eq!(spline.evaluate(1300.0), 3.25, epsilon = 1e-12);
    }

    #[test]
    fn three_points_fit_parabola() {
        let parabola = |x: f64| 2.0 * x * x - x + 1.0;
        let knots = [0.0, 1.0, 3.0];
        let values: Vec<f64> = knots.iter().map(|&x| parabola(x)).collect();
        let spline = CubicSpline::fit(&knots, &values).unwrap();
        assert_abs_diff_eq!(spline.evaluate(2.0), parabola(2.0), epsilon = 1e-10);
        assert_abs_diff_eq!(spline.evaluate(4.0), parabola(4.0), epsilon = 1e-10);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert_eq!(CubicSpline::fit(&[1.0], &[2.0]), Err(SplineError::TooFewPoints(1)));
        assert_eq!(
            CubicSpline::fit(&[0.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(SplineError::NonIncreasing(2))
        );
        assert!(matches!(
            CubicSpline::fit(&[0.0, 1.0], &[1.0]),
            Err(SplineError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_stored_coefficients_that_cannot_be_evaluated() {
        let empty = r#"{"knots":[],"values":[],"second_derivatives":[]}"#;
        let err = serde_json::from_str::<CubicSpline>(empty).unwrap_err();
        assert!(err.to_string().contains("at least 2 points"), "{err}");

        let short = r#"{"knots":[0.0,1.0,2.0],"values":[1.0,2.0,3.0],"second_derivatives":[0.0]}"#;
        assert!(serde_json::from_str::<CubicSpline>(short).is_err());

        let unordered = r#"{"knots":[1.0,0.0],"values":[1.0,2.0],"second_derivatives":[0.0,0.0]}"#;
        assert!(serde_json::from_str::<CubicSpline>(unordered).is_err());

        assert_eq!(
            CubicSpline::from_parts(vec![0.0, 1.0], vec![1.0, f64::NAN], vec![0.0, 0.0]),
            Err(SplineError::NonFinite(1))
        );
    }

    #[test]
    fn survives_serialization() {
        let spline = CubicSpline::fit(&[0.0, 1.0, 2.0, 4.0], &[1.0, 0.5, 2.0, 1.5]).unwrap();
        let json = serde_json::to_string(&spline).unwrap();
        let restored: CubicSpline = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.evaluate(3.3), spline.evaluate(3.3));
        assert_eq!(restored.domain(), (0.0, 4.0));
    }
}
