//! The mutable collection side of the function pool.

use crate::error::SpecificationError;
use crate::registry::descriptor::PolicyFunction;
use crate::registry::temporal::select_for_date;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// All registered functions, temporal variants included. Collapsed to one
/// function per name by `select_for_date` when a policy environment is set
/// up.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    functions: Vec<PolicyFunction>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: PolicyFunction) -> &mut Self {
        self.functions.push(function);
        self
    }

    /// Registers a function under an explicit name, overriding the one it
    /// declares.
    pub fn register_as(&mut self, name: impl Into<String>, function: PolicyFunction) -> &mut Self {
        self.functions.push(function.renamed(name));
        self
    }

    /// Folds another catalog into this one.
    pub fn extend(&mut self, other: FunctionCatalog) -> &mut Self {
        self.functions.extend(other.functions);
        self
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyFunction> {
        self.functions.iter()
    }

    /// One function per logical name, as in force on `date`.
    pub fn select_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, PolicyFunction>, SpecificationError> {
        select_for_date(self.functions.iter(), date)
    }
}

impl FromIterator<PolicyFunction> for FunctionCatalog {
    fn from_iter<I: IntoIterator<Item = PolicyFunction>>(iter: I) -> Self {
        Self {
            functions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn stub(name: &str) -> PolicyFunction {
        PolicyFunction::new(name, &[], |_| Ok(Column::from_floats(vec![])))
    }

    #[test]
    fn test_register_as_renames() {
        let mut catalog = FunctionCatalog::new();
        catalog.register_as("wohngeld_m", stub("wohngeld_formel_2009"));
        let selected = catalog
            .select_for_date("2020-01-01".parse().unwrap())
            .unwrap();
        assert!(selected.contains_key("wohngeld_m"));
        assert!(!selected.contains_key("wohngeld_formel_2009"));
    }

    #[test]
    fn test_extend_merges_catalogs() {
        let mut base = FunctionCatalog::new();
        base.register(stub("a"));
        let mut extra = FunctionCatalog::new();
        extra.register(stub("b"));
        base.extend(extra);
        assert_eq!(base.len(), 2);
    }
}
