//! Foreign-key aggregation: reduce linked rows onto their anchor row.
//!
//! Unlike the partition reducers, this is a join-and-aggregate: for each row
//! `i`, the result collects the values of all rows `j` whose link column
//! points at `p_id[i]` (e.g. aggregating children's values onto a parent's
//! row). Rows nobody points at receive the reducer's neutral element.

use crate::data::Column;
use crate::data::table::MISSING_P_ID;
use crate::groups::reduce::{AggregationError, GroupReducer};
use std::collections::HashMap;

pub fn aggregate_by_p_id(
    values: Option<&Column>,
    link: &[i64],
    p_id: &[i64],
    reducer: GroupReducer,
) -> Result<Column, AggregationError> {
    let n = p_id.len();
    if link.len() != n {
        return Err(AggregationError::LengthMismatch {
            len: link.len(),
            expected: n,
        });
    }
    if let Some(column) = values {
        if column.len() != n {
            return Err(AggregationError::LengthMismatch {
                len: column.len(),
                expected: n,
            });
        }
    }

    let row_of: HashMap<i64, usize> = p_id
        .iter()
        .enumerate()
        .map(|(row, &id)| (id, row))
        .collect();

    // Rows whose link points at a p_id outside the data were rejected by
    // input validation; silently skipping them here would hide bugs.
    let anchors = |link: &[i64]| -> Result<Vec<Option<usize>>, AggregationError> {
        link.iter()
            .map(|&target| {
                if target == MISSING_P_ID {
                    return Ok(None);
                }
                row_of
                    .get(&target)
                    .copied()
                    .map(Some)
                    .ok_or(AggregationError::DanglingLink { target })
            })
            .collect()
    };
    let anchors = anchors(link)?;

    let source = |reducer: GroupReducer| {
        values.ok_or(AggregationError::MissingSource {
            reducer: reducer.name().to_string(),
        })
    };

    match reducer {
        GroupReducer::Count => {
            let mut counts = vec![0i64; n];
            for anchor in anchors.iter().flatten() {
                counts[*anchor] += 1;
            }
            Ok(Column::from_ints(counts))
        }

        GroupReducer::Sum => match source(reducer)? {
            Column::Float(v) => {
                let mut out = vec![0.0f64; n];
                for (row, anchor) in anchors.iter().enumerate() {
                    if let Some(anchor) = anchor {
                        out[*anchor] += v[row];
                    }
                }
                Ok(Column::from_floats(out))
            }
            Column::Int(v) => {
                let mut out = vec![0i64; n];
                for (row, anchor) in anchors.iter().enumerate() {
                    if let Some(anchor) = anchor {
                        out[*anchor] += v[row];
                    }
                }
                Ok(Column::from_ints(out))
            }
            Column::Bool(v) => {
                let mut out = vec![0i64; n];
                for (row, anchor) in anchors.iter().enumerate() {
                    if let Some(anchor) = anchor {
                        out[*anchor] += v[row] as i64;
                    }
                }
                Ok(Column::from_ints(out))
            }
        },

        GroupReducer::Any | GroupReducer::All => {
            let column = source(reducer)?;
            let truths: Vec<bool> = match column {
                Column::Bool(v) => v.to_vec(),
                Column::Int(v) => v.iter().map(|&i| i != 0).collect(),
                Column::Float(_) => {
                    return Err(AggregationError::WrongDType {
                        reducer: reducer.name().to_string(),
                        dtype: crate::data::DType::Float,
                    })
                }
            };
            let neutral = reducer == GroupReducer::All;
            let mut out = vec![neutral; n];
            for (row, anchor) in anchors.iter().enumerate() {
                if let Some(anchor) = anchor {
                    out[*anchor] = if reducer == GroupReducer::Any {
                        out[*anchor] || truths[row]
                    } else {
                        out[*anchor] && truths[row]
                    };
                }
            }
            Ok(Column::from_bools(out))
        }

        other => Err(AggregationError::UnsupportedLinkReducer {
            reducer: other.name().to_string(),
        }),
    }
}
