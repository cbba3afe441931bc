//! Evaluation of a fully materialized bracket schedule.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PiecewiseError {
    #[error("piecewise spec '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },

    #[error("value {x} lies outside the domain [{lower}, {upper}] of schedule '{name}'")]
    OutOfDomain {
        name: String,
        x: f64,
        lower: f64,
        upper: f64,
    },
}

/// A piecewise polynomial over `n` intervals delimited by `n + 1` strictly
/// increasing thresholds.
///
/// `rates[d]` holds the coefficients of degree `d + 1`, one per interval;
/// `intercepts[k]` is the function value at the lower threshold of interval
/// `k`. Intervals are right-open `[low, high)`, except the last, which is
/// closed on the right. The extreme thresholds may be infinite, the normal
/// case for tax tariffs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiecewiseSchedule {
    name: String,
    thresholds: Vec<f64>,
    rates: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl PiecewiseSchedule {
    pub fn new(
        name: impl Into<String>,
        thresholds: Vec<f64>,
        rates: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    ) -> Result<Self, PiecewiseError> {
        let name = name.into();
        let invalid = |reason: String| PiecewiseError::InvalidSpec {
            name: name.clone(),
            reason,
        };

        let n = intercepts.len();
        if n == 0 {
            return Err(invalid("schedule has no intervals".into()));
        }
        if thresholds.len() != n + 1 {
            return Err(invalid(format!(
                "{} intervals require {} thresholds, got {}",
                n,
                n + 1,
                thresholds.len()
            )));
        }
        for pair in thresholds.windows(2) {
            if !(pair[0] < pair[1]) {
                return Err(invalid(format!(
                    "thresholds must be strictly increasing, got {} before {}",
                    pair[0], pair[1]
                )));
            }
        }
        for (d, row) in rates.iter().enumerate() {
            if row.len() != n {
                return Err(invalid(format!(
                    "rate row of degree {} has {} entries, expected {}",
                    d + 1,
                    row.len(),
                    n
                )));
            }
        }

        Ok(Self {
            name,
            thresholds,
            rates,
            intercepts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_intervals(&self) -> usize {
        self.intercepts.len()
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Evaluates the schedule at `x`.
    ///
    /// A value exactly on a lower boundary belongs to the interval that
    /// boundary opens. Values outside finite extreme boundaries are an
    /// error, never silently clipped.
    pub fn evaluate(&self, x: f64) -> Result<f64, PiecewiseError> {
        let k = self.interval_of(x)?;
        Ok(self.evaluate_in_interval(x, k))
    }

    /// Index of the interval containing `x`.
    fn interval_of(&self, x: f64) -> Result<usize, PiecewiseError> {
        let lower = self.thresholds[0];
        let upper = *self.thresholds.last().expect("BUG: thresholds non-empty");
        if x.is_nan() || x < lower || x > upper {
            return Err(PiecewiseError::OutOfDomain {
                name: self.name.clone(),
                x,
                lower,
                upper,
            });
        }
        // Largest k with thresholds[k] <= x; x == upper lands in the last
        // interval (closed on the right).
        let k = self.thresholds.partition_point(|&t| t <= x);
        Ok(k.saturating_sub(1).min(self.n_intervals() - 1))
    }

    /// Evaluates the polynomial of interval `k` at `x` without domain
    /// checks. The builder chains this across brackets to derive missing
    /// intercepts.
    pub(crate) fn evaluate_in_interval(&self, x: f64, k: usize) -> f64 {
        let rate_column: Vec<f64> = self.rates.iter().map(|row| row[k]).collect();
        polynomial_value(x, self.thresholds[k], self.intercepts[k], &rate_column)
    }
}

/// `intercept + Σ_d rates[d] · (x − lower)^(d+1)`.
///
/// An unbounded-below interval has no finite anchor point; it is constant at
/// its intercept.
pub(crate) fn polynomial_value(x: f64, lower: f64, intercept: f64, rates: &[f64]) -> f64 {
    if !lower.is_finite() {
        return intercept;
    }
    let increment = x - lower;
    let mut acc = intercept;
    let mut power = 1.0;
    for &rate in rates {
        power *= increment;
        acc += rate * power;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tariff() -> PiecewiseSchedule {
        // Scenario: no tax below 1000, 20% marginal rate up to 2000, flat
        // 200 above.
        PiecewiseSchedule::new(
            "tariff",
            vec![f64::NEG_INFINITY, 1000.0, 2000.0, f64::INFINITY],
            vec![vec![0.0, 0.2, 0.0]],
            vec![0.0, 0.0, 200.0],
        )
        .unwrap()
    }

    #[rstest]
    #[case(500.0, 0.0)]
    #[case(1000.0, 0.0)] // Lower boundary opens the second interval
    #[case(1500.0, 100.0)]
    #[case(2500.0, 200.0)]
    fn test_tariff_evaluation(#[case] x: f64, #[case] expected: f64) {
        assert_eq!(tariff().evaluate(x).unwrap(), expected);
    }

    #[test]
    fn test_out_of_domain_with_finite_bounds() {
        let schedule = PiecewiseSchedule::new(
            "bounded",
            vec![0.0, 10.0],
            vec![vec![1.0]],
            vec![0.0],
        )
        .unwrap();
        assert_eq!(schedule.evaluate(10.0).unwrap(), 10.0); // Last interval is closed
        let err = schedule.evaluate(-0.5).unwrap_err();
        assert!(matches!(err, PiecewiseError::OutOfDomain { .. }));
        assert!(schedule.evaluate(10.5).is_err());
        assert!(schedule.evaluate(f64::NAN).is_err());
    }

    #[test]
    fn test_quadratic_interval() {
        // y = 2 + 0.1*(x - 1) + 0.5*(x - 1)^2 on [1, inf)
        let schedule = PiecewiseSchedule::new(
            "quadratic",
            vec![1.0, f64::INFINITY],
            vec![vec![0.1], vec![0.5]],
            vec![2.0],
        )
        .unwrap();
        assert!((schedule.evaluate(3.0).unwrap() - (2.0 + 0.2 + 2.0)).abs() < 1e-12);
    }

    #[rstest]
    #[case(vec![0.0, 0.0, 1.0], "strictly increasing")]
    #[case(vec![0.0, 1.0], "thresholds")]
    fn test_rejects_malformed_thresholds(#[case] thresholds: Vec<f64>, #[case] needle: &str) {
        let err = PiecewiseSchedule::new("bad", thresholds, vec![vec![0.0, 0.0]], vec![0.0, 0.0])
            .unwrap_err();
        assert!(err.to_string().contains(needle), "got: {err}");
    }
}
