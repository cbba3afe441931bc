//! Builds a `PiecewiseSchedule` from the author-facing interval spec.
//!
//! Parameter files state brackets redundantly (each interval names both of
//! its boundaries) and often give the intercept only for the lowest
//! interval. The builder reconciles the redundancy, then derives the missing
//! intercepts bracket by bracket in ascending order: interval `k`'s
//! intercept is interval `k - 1`'s polynomial evaluated at the shared
//! threshold, which makes the resulting function continuous by construction.

use super::schedule::{polynomial_value, PiecewiseError, PiecewiseSchedule};
use serde::Deserialize;
use std::collections::BTreeMap;

/// One interval as written by a parameter author. Boundaries may be stated
/// on either side of a bracket border; where both sides state one, they must
/// agree.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawInterval {
    pub lower_threshold: Option<f64>,
    pub upper_threshold: Option<f64>,
    pub rate_linear: Option<f64>,
    pub rate_quadratic: Option<f64>,
    pub intercept_at_lower_threshold: Option<f64>,
}

/// How quadratic coefficients are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionMode {
    /// Use the quadratic rates as stated (absent means zero).
    #[default]
    Stated,
    /// Derive each missing quadratic rate from the jump between the
    /// interval's linear rate and the next one, preserving continuity of
    /// the marginal rate across the bracket border.
    Progressionsfaktor,
}

/// Builds the full threshold/rate/intercept arrays from an interval map
/// keyed `0..n`.
pub fn derive_schedule(
    name: &str,
    intervals: &BTreeMap<usize, RawInterval>,
    mode: ProgressionMode,
) -> Result<PiecewiseSchedule, PiecewiseError> {
    let invalid = |reason: String| PiecewiseError::InvalidSpec {
        name: name.to_string(),
        reason,
    };

    let n = intervals.len();
    if n == 0 {
        return Err(invalid("no intervals given".into()));
    }
    for (expected, &key) in intervals.keys().enumerate() {
        if key != expected {
            return Err(invalid(format!(
                "interval keys must be contiguous from 0, missing interval {expected}"
            )));
        }
    }
    let by_index: Vec<&RawInterval> = intervals.values().collect();

    // --- Thresholds ---
    let mut thresholds = Vec::with_capacity(n + 1);
    thresholds.push(
        by_index[0]
            .lower_threshold
            .ok_or_else(|| invalid("interval 0 must state its lower threshold".into()))?,
    );
    for k in 1..n {
        let from_below = by_index[k - 1].upper_threshold;
        let from_above = by_index[k].lower_threshold;
        let boundary = match (from_below, from_above) {
            (Some(u), Some(l)) if u != l => {
                return Err(invalid(format!(
                    "interval {} ends at {} but interval {} starts at {}",
                    k - 1,
                    u,
                    k,
                    l
                )));
            }
            (Some(u), _) => u,
            (None, Some(l)) => l,
            (None, None) => {
                return Err(invalid(format!(
                    "the boundary between intervals {} and {} is stated by neither",
                    k - 1,
                    k
                )));
            }
        };
        thresholds.push(boundary);
    }
    thresholds.push(
        by_index[n - 1]
            .upper_threshold
            .ok_or_else(|| invalid(format!("interval {} must state its upper threshold", n - 1)))?,
    );

    // --- Rates ---
    let mut linear = Vec::with_capacity(n);
    for (k, interval) in by_index.iter().enumerate() {
        linear.push(
            interval
                .rate_linear
                .ok_or_else(|| invalid(format!("interval {k} states no linear rate")))?,
        );
    }

    let any_quadratic = by_index.iter().any(|i| i.rate_quadratic.is_some())
        || mode == ProgressionMode::Progressionsfaktor;
    let mut rates = vec![linear.clone()];
    if any_quadratic {
        let mut quadratic = Vec::with_capacity(n);
        for (k, interval) in by_index.iter().enumerate() {
            let stated = interval.rate_quadratic;
            let rate = match (stated, mode) {
                (Some(q), _) => q,
                (None, ProgressionMode::Progressionsfaktor)
                    if k + 1 < n && thresholds[k].is_finite() && thresholds[k + 1].is_finite() =>
                {
                    (linear[k + 1] - linear[k]) / (2.0 * (thresholds[k + 1] - thresholds[k]))
                }
                (None, _) => 0.0,
            };
            quadratic.push(rate);
        }
        rates.push(quadratic);
    }

    // --- Intercepts ---
    // Derived in ascending order: interval k depends on interval k - 1 being
    // fully resolved.
    let mut intercepts = Vec::with_capacity(n);
    intercepts.push(by_index[0].intercept_at_lower_threshold.ok_or_else(|| {
        invalid("interval 0 must state its intercept at the lower threshold".into())
    })?);
    for k in 1..n {
        let value = match by_index[k].intercept_at_lower_threshold {
            Some(stated) => stated,
            None => {
                let rate_column: Vec<f64> = rates.iter().map(|row| row[k - 1]).collect();
                polynomial_value(
                    thresholds[k],
                    thresholds[k - 1],
                    intercepts[k - 1],
                    &rate_column,
                )
            }
        };
        intercepts.push(value);
    }

    PiecewiseSchedule::new(name, thresholds, rates, intercepts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn interval(
        lower: Option<f64>,
        upper: Option<f64>,
        rate: f64,
        intercept: Option<f64>,
    ) -> RawInterval {
        RawInterval {
            lower_threshold: lower,
            upper_threshold: upper,
            rate_linear: Some(rate),
            rate_quadratic: None,
            intercept_at_lower_threshold: intercept,
        }
    }

    fn three_bracket_spec() -> BTreeMap<usize, RawInterval> {
        BTreeMap::from([
            (0, interval(Some(f64::NEG_INFINITY), Some(1000.0), 0.0, Some(0.0))),
            (1, interval(None, Some(2000.0), 0.2, None)),
            (2, interval(None, Some(f64::INFINITY), 0.0, None)),
        ])
    }

    #[test]
    fn test_intercepts_derived_by_chaining() {
        let schedule = derive_schedule("tariff", &three_bracket_spec(), ProgressionMode::Stated)
            .unwrap();
        // Interval 1 contributes 0.2 * 1000 = 200, carried into interval 2.
        assert_eq!(schedule.evaluate(2500.0).unwrap(), 200.0);
        assert_eq!(schedule.evaluate(1500.0).unwrap(), 100.0);
    }

    #[test]
    fn test_continuity_at_every_boundary() {
        let schedule = derive_schedule("tariff", &three_bracket_spec(), ProgressionMode::Stated)
            .unwrap();
        for k in 0..schedule.n_intervals() - 1 {
            let boundary = schedule.thresholds()[k + 1];
            let from_below = schedule.evaluate_in_interval(boundary, k);
            let from_above = schedule.evaluate_in_interval(boundary, k + 1);
            assert!(
                (from_below - from_above).abs() < 1e-9,
                "discontinuity at threshold {boundary}: {from_below} vs {from_above}"
            );
        }
    }

    #[test]
    fn test_progressionsfaktor_derives_quadratic_rate() {
        // Marginal rate climbs from 0.14 to 0.24 over [1000, 2000].
        let spec = BTreeMap::from([
            (0, interval(Some(1000.0), Some(2000.0), 0.14, Some(0.0))),
            (1, interval(None, Some(f64::INFINITY), 0.24, None)),
        ]);
        let schedule =
            derive_schedule("progressive", &spec, ProgressionMode::Progressionsfaktor).unwrap();
        // rate_quadratic = (0.24 - 0.14) / (2 * 1000) = 5e-5, so
        // f(2000) = 0.14 * 1000 + 5e-5 * 1000^2 = 190.
        assert!((schedule.evaluate(2000.0).unwrap() - 190.0).abs() < 1e-9);
    }

    #[rstest]
    #[case(0, "lower threshold")]
    #[case(2, "upper threshold")]
    fn test_missing_extreme_boundary(#[case] index: usize, #[case] needle: &str) {
        let mut spec = three_bracket_spec();
        if index == 0 {
            spec.get_mut(&0).unwrap().lower_threshold = None;
        } else {
            spec.get_mut(&2).unwrap().upper_threshold = None;
        }
        let err = derive_schedule("tariff", &spec, ProgressionMode::Stated).unwrap_err();
        assert!(err.to_string().contains(needle), "got: {err}");
    }

    #[test]
    fn test_mismatched_adjacent_thresholds() {
        let mut spec = three_bracket_spec();
        spec.get_mut(&1).unwrap().lower_threshold = Some(900.0);
        let err = derive_schedule("tariff", &spec, ProgressionMode::Stated).unwrap_err();
        assert!(err.to_string().contains("ends at"), "got: {err}");
    }

    #[test]
    fn test_non_contiguous_interval_keys() {
        let spec = BTreeMap::from([
            (0, interval(Some(0.0), Some(1.0), 0.0, Some(0.0))),
            (2, interval(None, Some(2.0), 0.0, None)),
        ]);
        let err = derive_schedule("gappy", &spec, ProgressionMode::Stated).unwrap_err();
        assert!(err.to_string().contains("contiguous"), "got: {err}");
    }
}
