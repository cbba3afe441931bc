//! Typed per-individual value arrays.
//!
//! Columns are `Arc`-shared so override substitution and fan-out consumption
//! never copy row data. The dtype conversion contract lives here: anything
//! lossless converts silently, anything unsafe raises with the column name,
//! the offending row, and the offending value.

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Bool,
    Int,
    Float,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "column '{column}': cannot convert {from:?} to {to:?}: value {value} at row {row} \
     has no safe {to:?} representation"
)]
pub struct ConversionError {
    pub column: String,
    pub from: DType,
    pub to: DType,
    pub row: usize,
    pub value: f64,
}

/// A column of per-individual values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Bool(Arc<Vec<bool>>),
    Int(Arc<Vec<i64>>),
    Float(Arc<Vec<f64>>),
}

impl Column {
    pub fn from_bools(values: Vec<bool>) -> Self {
        Column::Bool(Arc::new(values))
    }

    pub fn from_ints(values: Vec<i64>) -> Self {
        Column::Int(Arc::new(values))
    }

    pub fn from_floats(values: Vec<f64>) -> Self {
        Column::Float(Arc::new(values))
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Column::Bool(_) => DType::Bool,
            Column::Int(_) => DType::Int,
            Column::Float(_) => DType::Float,
        }
    }

    pub fn bools(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn ints(&self) -> Option<&[i64]> {
        match self {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn floats(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric view regardless of dtype. Allocates for non-float columns;
    /// the boundary where a formula genuinely needs floats is the right
    /// place to pay that.
    pub fn to_floats(&self) -> Vec<f64> {
        match self {
            Column::Bool(v) => v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            Column::Int(v) => v.iter().map(|&i| i as f64).collect(),
            Column::Float(v) => v.to_vec(),
        }
    }

    /// Converts to `want` under the safety contract. Lossless conversions
    /// succeed; anything else names the first offending value.
    pub fn coerce(&self, want: DType, column_name: &str) -> Result<Column, ConversionError> {
        let fail = |row: usize, value: f64| ConversionError {
            column: column_name.to_string(),
            from: self.dtype(),
            to: want,
            row,
            value,
        };

        match (self, want) {
            (Column::Bool(_), DType::Bool)
            | (Column::Int(_), DType::Int)
            | (Column::Float(_), DType::Float) => Ok(self.clone()),

            (Column::Bool(v), DType::Int) => {
                Ok(Column::from_ints(v.iter().map(|&b| b as i64).collect()))
            }
            (Column::Bool(v), DType::Float) => Ok(Column::from_floats(
                v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect(),
            )),
            (Column::Int(v), DType::Float) => {
                Ok(Column::from_floats(v.iter().map(|&i| i as f64).collect()))
            }

            (Column::Int(v), DType::Bool) => {
                let mut out = Vec::with_capacity(v.len());
                for (row, &value) in v.iter().enumerate() {
                    match value {
                        0 => out.push(false),
                        1 => out.push(true),
                        other => return Err(fail(row, other as f64)),
                    }
                }
                Ok(Column::from_bools(out))
            }
            (Column::Float(v), DType::Bool) => {
                let mut out = Vec::with_capacity(v.len());
                for (row, &value) in v.iter().enumerate() {
                    if value == 0.0 {
                        out.push(false);
                    } else if value == 1.0 {
                        out.push(true);
                    } else {
                        return Err(fail(row, value));
                    }
                }
                Ok(Column::from_bools(out))
            }
            (Column::Float(v), DType::Int) => {
                let mut out = Vec::with_capacity(v.len());
                for (row, &value) in v.iter().enumerate() {
                    if value.is_finite() && value.fract() == 0.0 {
                        out.push(value as i64);
                    } else {
                        return Err(fail(row, value));
                    }
                }
                Ok(Column::from_ints(out))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_float_of_zeros_and_ones_coerces_to_bool() {
        let column = Column::from_floats(vec![0.0, 1.0, 0.0]);
        let coerced = column.coerce(DType::Bool, "arbeitslos").unwrap();
        assert_eq!(coerced.bools().unwrap(), &[false, true, false]);
    }

    #[test]
    fn test_non_binary_float_to_bool_names_the_value() {
        let column = Column::from_floats(vec![0.0, 0.5]);
        let err = column.coerce(DType::Bool, "arbeitslos").unwrap_err();
        assert_eq!(err.row, 1);
        assert!(err.to_string().contains("arbeitslos"));
        assert!(err.to_string().contains("0.5"));
    }

    #[test]
    fn test_integral_float_to_int() {
        let column = Column::from_floats(vec![3.0, -2.0]);
        let coerced = column.coerce(DType::Int, "alter").unwrap();
        assert_eq!(coerced.ints().unwrap(), &[3, -2]);
    }

    #[rstest]
    #[case(vec![2.5])]
    #[case(vec![f64::NAN])]
    #[case(vec![f64::INFINITY])]
    fn test_unsafe_float_to_int_rejected(#[case] values: Vec<f64>) {
        let column = Column::from_floats(values);
        assert!(column.coerce(DType::Int, "alter").is_err());
    }

    #[test]
    fn test_widening_conversions_are_silent() {
        let bools = Column::from_bools(vec![true, false]);
        assert_eq!(bools.coerce(DType::Int, "x").unwrap().ints().unwrap(), &[1, 0]);
        let ints = Column::from_ints(vec![2, 3]);
        assert_eq!(
            ints.coerce(DType::Float, "x").unwrap().floats().unwrap(),
            &[2.0, 3.0]
        );
    }

    #[test]
    fn test_int_to_bool_only_for_binary_values() {
        let ok = Column::from_ints(vec![0, 1, 1]);
        assert!(ok.coerce(DType::Bool, "x").is_ok());
        let bad = Column::from_ints(vec![0, 2]);
        assert_eq!(bad.coerce(DType::Bool, "x").unwrap_err().row, 1);
    }
}
