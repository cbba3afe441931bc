//! Statutory rounding.
//!
//! Several benefit amounts are rounded by law, e.g. "to the nearest full
//! euro" or "down to a multiple of ten cents, then plus one cent". The spec
//! lives in the parameter files; this wrapper applies it to a computed
//! column.

use crate::data::Column;
use crate::error::SpecificationError;
use crate::params::{RoundingDirection, RoundingSpec};

/// Rounds every value to a multiple of `base` in the stated direction, then
/// adds the constant.
pub fn apply_rounding(
    column: &Column,
    spec: &RoundingSpec,
    function: &str,
) -> Result<Column, SpecificationError> {
    if !(spec.base > 0.0 && spec.base.is_finite()) {
        return Err(SpecificationError::InvalidRoundingBase {
            function: function.to_string(),
            base: spec.base,
        });
    }

    let rounded = column
        .to_floats()
        .into_iter()
        .map(|value| {
            let quotient = value / spec.base;
            let snapped = match spec.direction {
                RoundingDirection::Up => quotient.ceil(),
                RoundingDirection::Down => quotient.floor(),
                RoundingDirection::Nearest => quotient.round(),
            };
            snapped * spec.base + spec.to_add_after
        })
        .collect();
    Ok(Column::from_floats(rounded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec(base: f64, direction: RoundingDirection, to_add_after: f64) -> RoundingSpec {
        RoundingSpec {
            base,
            direction,
            to_add_after,
        }
    }

    #[rstest]
    #[case(RoundingDirection::Up, vec![123.5, -2.5], vec![124.0, -2.0])]
    #[case(RoundingDirection::Down, vec![123.5, -2.5], vec![123.0, -3.0])]
    #[case(RoundingDirection::Nearest, vec![123.4, 123.5], vec![123.0, 124.0])]
    fn test_directions(
        #[case] direction: RoundingDirection,
        #[case] input: Vec<f64>,
        #[case] expected: Vec<f64>,
    ) {
        let column = Column::from_floats(input);
        let out = apply_rounding(&column, &spec(1.0, direction, 0.0), "f").unwrap();
        assert_eq!(out.floats().unwrap(), expected.as_slice());
    }

    #[test]
    fn test_base_and_additive_constant() {
        // Down to ten cents, then add a cent: the Wohngeld pattern.
        let column = Column::from_floats(vec![107.37]);
        let out = apply_rounding(
            &column,
            &spec(0.1, RoundingDirection::Down, 0.01),
            "wohngeld_m",
        )
        .unwrap();
        assert!((out.floats().unwrap()[0] - 107.31).abs() < 1e-9);
    }

    #[test]
    fn test_non_positive_base_is_a_configuration_error() {
        let column = Column::from_floats(vec![1.0]);
        let err = apply_rounding(
            &column,
            &spec(0.0, RoundingDirection::Nearest, 0.0),
            "kindergeld_m",
        )
        .unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidRoundingBase { .. }));
    }
}
