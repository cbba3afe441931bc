//! Explicit engine configuration.
//!
//! Grouping levels and default targets are call-site configuration, not
//! module-level constants, so several policy configurations can coexist in
//! one process without interference.

/// The grouping levels of the input data, in canonical output order
/// (outermost first). Level `hh` implies the id column `hh_id` and the
/// variable suffix `_hh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingConfig {
    levels: Vec<String>,
}

impl GroupingConfig {
    pub fn new<L, I>(levels: I) -> Self
    where
        L: Into<String>,
        I: IntoIterator<Item = L>,
    {
        Self {
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(String::as_str)
    }

    pub fn id_column(&self, level: &str) -> String {
        format!("{level}_id")
    }

    pub fn suffix(&self, level: &str) -> String {
        format!("_{level}")
    }

    /// The grouping level a variable name is aggregated to, if any.
    pub fn level_of(&self, variable: &str) -> Option<&str> {
        self.levels
            .iter()
            .find(|level| variable.ends_with(&self.suffix(level)))
            .map(|level| level.as_str())
    }

    /// Strips the grouping suffix, yielding the person-level base variable.
    pub fn base_variable<'a>(&self, variable: &'a str, level: &str) -> &'a str {
        variable
            .strip_suffix(&self.suffix(level))
            .unwrap_or(variable)
    }

    /// Id columns in canonical leading order (outermost group first, person
    /// id last).
    pub fn canonical_id_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.levels.iter().map(|l| self.id_column(l)).collect();
        columns.push("p_id".to_string());
        columns
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self::new(["hh", "tu"])
    }
}

/// How strictly redundancies in the call specification (unused overrides,
/// unused input columns) are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    #[default]
    Ignore,
    Warn,
    Raise,
}

/// Per-environment engine configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub groupings: GroupingConfig,
    /// Targets used when a caller requests none.
    pub default_targets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_detection() {
        let config = GroupingConfig::default();
        assert_eq!(config.level_of("bruttolohn_m_hh"), Some("hh"));
        assert_eq!(config.level_of("kindergeld_m_tu"), Some("tu"));
        assert_eq!(config.level_of("bruttolohn_m"), None);
        assert_eq!(config.base_variable("bruttolohn_m_hh", "hh"), "bruttolohn_m");
    }

    #[test]
    fn test_canonical_order_puts_person_id_last() {
        let config = GroupingConfig::default();
        assert_eq!(
            config.canonical_id_columns(),
            vec!["hh_id".to_string(), "tu_id".into(), "p_id".into()]
        );
    }
}
