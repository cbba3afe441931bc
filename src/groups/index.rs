//! Dense group index: raw group keys to contiguous codes.

use std::collections::HashMap;

/// Maps each row's raw group key to a code in `0..n_groups`, in first-seen
/// order. Reductions write into a dense buffer sized by `n_groups` and
/// gather back through `codes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex {
    codes: Vec<u32>,
    n_groups: usize,
}

impl GroupIndex {
    pub fn from_ids(ids: &[i64]) -> Self {
        let mut code_of: HashMap<i64, u32> = HashMap::new();
        let mut codes = Vec::with_capacity(ids.len());
        for &id in ids {
            let next = code_of.len() as u32;
            let code = *code_of.entry(id).or_insert(next);
            codes.push(code);
        }
        Self {
            n_groups: code_of.len(),
            codes,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.codes.len()
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn codes(&self) -> &[u32] {
        &self.codes
    }
}
