//! Partition reducers with broadcast-back semantics.

use crate::data::{Column, DType};
use crate::groups::index::GroupIndex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("aggregation input has {len} rows but the group index covers {expected}")]
    LengthMismatch { len: usize, expected: usize },

    #[error("reducer '{reducer}' needs a source column")]
    MissingSource { reducer: String },

    #[error("reducer '{reducer}' does not accept {dtype:?} input")]
    WrongDType { reducer: String, dtype: DType },

    #[error("reducer '{reducer}' cannot aggregate by p_id link")]
    UnsupportedLinkReducer { reducer: String },

    #[error("link column points at p_id {target}, which is not in the data")]
    DanglingLink { target: i64 },
}

/// The supported reduction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupReducer {
    Sum,
    Mean,
    Min,
    Max,
    Any,
    All,
    Count,
    /// Running total within the group in row order. The only reducer whose
    /// result is not constant within a group.
    CumSum,
}

impl GroupReducer {
    pub fn name(self) -> &'static str {
        match self {
            GroupReducer::Sum => "sum",
            GroupReducer::Mean => "mean",
            GroupReducer::Min => "min",
            GroupReducer::Max => "max",
            GroupReducer::Any => "any",
            GroupReducer::All => "all",
            GroupReducer::Count => "count",
            GroupReducer::CumSum => "cumsum",
        }
    }

    pub fn needs_source(self) -> bool {
        !matches!(self, GroupReducer::Count)
    }
}

/// Reduce per group, then broadcast the aggregate back to every row of the
/// group (except `CumSum`, which stays per-row by construction).
///
/// The dtype contract is part of the interface: summing booleans yields
/// integer counts, `any`/`all` over integers yields booleans, `mean` always
/// yields floats.
pub fn aggregate_by_group(
    values: Option<&Column>,
    index: &GroupIndex,
    reducer: GroupReducer,
) -> Result<Column, AggregationError> {
    if let Some(column) = values {
        if column.len() != index.n_rows() {
            return Err(AggregationError::LengthMismatch {
                len: column.len(),
                expected: index.n_rows(),
            });
        }
    }
    let codes = index.codes();
    let n = index.n_groups();

    let source = |reducer: GroupReducer| {
        values.ok_or(AggregationError::MissingSource {
            reducer: reducer.name().to_string(),
        })
    };

    match reducer {
        GroupReducer::Count => {
            let mut counts = vec![0i64; n];
            for &code in codes {
                counts[code as usize] += 1;
            }
            Ok(Column::from_ints(gather(&counts, codes)))
        }

        GroupReducer::Sum => match source(reducer)? {
            Column::Float(v) => {
                let mut sums = vec![0.0f64; n];
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    sums[code as usize] += value;
                }
                Ok(Column::from_floats(gather(&sums, codes)))
            }
            Column::Int(v) => {
                let mut sums = vec![0i64; n];
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    sums[code as usize] += value;
                }
                Ok(Column::from_ints(gather(&sums, codes)))
            }
            // Booleans sum to counts of true.
            Column::Bool(v) => {
                let mut sums = vec![0i64; n];
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    sums[code as usize] += value as i64;
                }
                Ok(Column::from_ints(gather(&sums, codes)))
            }
        },

        GroupReducer::Mean => {
            let column = source(reducer)?;
            let floats = column.to_floats();
            let mut sums = vec![0.0f64; n];
            let mut counts = vec![0usize; n];
            for (&code, &value) in codes.iter().zip(floats.iter()) {
                sums[code as usize] += value;
                counts[code as usize] += 1;
            }
            let means: Vec<f64> = sums
                .iter()
                .zip(&counts)
                .map(|(&sum, &count)| sum / count as f64)
                .collect();
            Ok(Column::from_floats(gather(&means, codes)))
        }

        GroupReducer::Min | GroupReducer::Max => match source(reducer)? {
            Column::Float(v) => {
                let mut acc = vec![
                    if reducer == GroupReducer::Min {
                        f64::INFINITY
                    } else {
                        f64::NEG_INFINITY
                    };
                    n
                ];
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    let slot = &mut acc[code as usize];
                    *slot = if reducer == GroupReducer::Min {
                        slot.min(value)
                    } else {
                        slot.max(value)
                    };
                }
                Ok(Column::from_floats(gather(&acc, codes)))
            }
            Column::Int(v) => {
                let mut acc = vec![
                    if reducer == GroupReducer::Min {
                        i64::MAX
                    } else {
                        i64::MIN
                    };
                    n
                ];
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    let slot = &mut acc[code as usize];
                    *slot = if reducer == GroupReducer::Min {
                        (*slot).min(value)
                    } else {
                        (*slot).max(value)
                    };
                }
                Ok(Column::from_ints(gather(&acc, codes)))
            }
            Column::Bool(_) => Err(AggregationError::WrongDType {
                reducer: reducer.name().to_string(),
                dtype: DType::Bool,
            }),
        },

        GroupReducer::Any | GroupReducer::All => {
            let column = source(reducer)?;
            let truths: Vec<bool> = match column {
                Column::Bool(v) => v.to_vec(),
                // Integers participate as zero/nonzero.
                Column::Int(v) => v.iter().map(|&i| i != 0).collect(),
                Column::Float(_) => {
                    return Err(AggregationError::WrongDType {
                        reducer: reducer.name().to_string(),
                        dtype: DType::Float,
                    })
                }
            };
            let neutral = reducer == GroupReducer::All;
            let mut acc = vec![neutral; n];
            for (&code, &value) in codes.iter().zip(truths.iter()) {
                let slot = &mut acc[code as usize];
                *slot = if reducer == GroupReducer::Any {
                    *slot || value
                } else {
                    *slot && value
                };
            }
            Ok(Column::from_bools(gather(&acc, codes)))
        }

        GroupReducer::CumSum => match source(reducer)? {
            Column::Float(v) => {
                let mut running = vec![0.0f64; n];
                let mut out = Vec::with_capacity(v.len());
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    running[code as usize] += value;
                    out.push(running[code as usize]);
                }
                Ok(Column::from_floats(out))
            }
            Column::Int(v) => {
                let mut running = vec![0i64; n];
                let mut out = Vec::with_capacity(v.len());
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    running[code as usize] += value;
                    out.push(running[code as usize]);
                }
                Ok(Column::from_ints(out))
            }
            Column::Bool(v) => {
                let mut running = vec![0i64; n];
                let mut out = Vec::with_capacity(v.len());
                for (&code, &value) in codes.iter().zip(v.iter()) {
                    running[code as usize] += value as i64;
                    out.push(running[code as usize]);
                }
                Ok(Column::from_ints(out))
            }
        },
    }
}

/// Broadcast one aggregate per group back to per-row shape.
fn gather<T: Copy>(per_group: &[T], codes: &[u32]) -> Vec<T> {
    codes.iter().map(|&code| per_group[code as usize]).collect()
}
