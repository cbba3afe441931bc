//! Temporal variant selection.
//!
//! Several functions may share a logical output name with different
//! validity windows (the law changed). For one policy date exactly one
//! variant must be in force; anything else is an authoring error in the
//! formula library and raises.

use crate::error::SpecificationError;
use crate::registry::descriptor::PolicyFunction;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// An inclusive validity interval; `None` means open-ended on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start)
            && self.end.map_or(true, |end| date <= end)
    }

    pub fn overlaps(&self, other: &DateWindow) -> bool {
        let starts_before_other_ends = match (self.start, other.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        let other_starts_before_self_ends = match (other.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_self_ends
    }
}

/// Collapses temporal variants to one function per logical name.
///
/// Exhaustiveness over the supported date range is an authoring invariant
/// checked lazily: a name whose variants leave `date` uncovered raises
/// here, as does any pair of overlapping windows for the same name.
pub fn select_for_date<'a>(
    functions: impl IntoIterator<Item = &'a PolicyFunction>,
    date: NaiveDate,
) -> Result<BTreeMap<String, PolicyFunction>, SpecificationError> {
    let mut by_name: BTreeMap<&str, Vec<&PolicyFunction>> = BTreeMap::new();
    for function in functions {
        by_name.entry(function.name()).or_default().push(function);
    }

    let mut selected = BTreeMap::new();
    for (name, variants) in by_name {
        let active: Vec<&PolicyFunction> = variants
            .iter()
            .copied()
            .filter(|f| f.window().contains(date))
            .collect();

        if active.len() > 1 {
            return Err(SpecificationError::AmbiguousVariant {
                name: name.to_string(),
                date,
            });
        }
        for (i, a) in variants.iter().enumerate() {
            for b in &variants[i + 1..] {
                if a.window().overlaps(&b.window()) {
                    return Err(SpecificationError::OverlappingWindows {
                        name: name.to_string(),
                    });
                }
            }
        }
        match active.first() {
            Some(&function) => {
                debug!(name, ?date, "selected temporal variant");
                selected.insert(name.to_string(), function.clone());
            }
            None => {
                return Err(SpecificationError::NoActiveVariant {
                    name: name.to_string(),
                    date,
                })
            }
        }
    }
    Ok(selected)
}
