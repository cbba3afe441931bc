//! Date-indexed parameter histories as written in declarative sources.
//!
//! One `GroupHistory` is the full legislative record of one parameter group:
//! every parameter maps law-change dates to `VersionEntry` payloads. A
//! version may deviate from its predecessor or from a parameter in another
//! group instead of restating everything.

use crate::piecewise::{ProgressionMode, RawInterval};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// A raw value as it appears in a parameter file: scalar leaves or nested
/// maps. Piecewise interval tables arrive as maps keyed `"0"`, `"1"`, ...
/// and are materialized later by the loader.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Scalar(f64),
    Map(BTreeMap<String, RawValue>),
}

/// A deviation directive: either "same as the previous version, except for
/// the stated keys" or "same as `<group>.<parameter>`, except for the
/// stated keys".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deviation {
    Previous,
    Reference { group: String, parameter: String },
}

impl<'de> Deserialize<'de> for Deviation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "previous" {
            return Ok(Deviation::Previous);
        }
        match raw.split_once('.') {
            Some((group, parameter)) if !group.is_empty() && !parameter.is_empty() => {
                Ok(Deviation::Reference {
                    group: group.to_string(),
                    parameter: parameter.to_string(),
                })
            }
            _ => Err(D::Error::custom(format!(
                "deviates_from must be 'previous' or '<group>.<parameter>', got '{raw}'"
            ))),
        }
    }
}

/// One law version of one parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionEntry {
    #[serde(default)]
    pub deviates_from: Option<Deviation>,
    /// The payload. May be absent only when the entry deviates from a
    /// reference wholesale.
    #[serde(default)]
    pub value: Option<RawValue>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
}

/// Additional views of a parameter requested by the formula layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDifferentDate {
    /// Expose the value of exactly one calendar year earlier under
    /// `<name>_vorjahr`.
    LastYear,
}

/// Marks a parameter as a bracket-schedule spec to be materialized through
/// the piecewise builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiecewiseTag {
    Piecewise,
    PiecewiseProgressionsfaktor,
}

impl PiecewiseTag {
    pub(crate) fn mode(self) -> ProgressionMode {
        match self {
            PiecewiseTag::Piecewise => ProgressionMode::Stated,
            PiecewiseTag::PiecewiseProgressionsfaktor => ProgressionMode::Progressionsfaktor,
        }
    }
}

/// The full history of one parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterHistory {
    /// Law versions keyed by their effective start date (inclusive).
    pub history: BTreeMap<NaiveDate, VersionEntry>,
    #[serde(default)]
    pub access_different_date: Option<AccessDifferentDate>,
    #[serde(default)]
    pub kind: Option<PiecewiseTag>,
}

impl ParameterHistory {
    /// The most recent version effective on or before `date`, together with
    /// its effective start date. Last applicable wins; no interpolation.
    pub(crate) fn version_at(&self, date: NaiveDate) -> Option<(NaiveDate, &VersionEntry)> {
        self.history
            .range(..=date)
            .next_back()
            .map(|(d, e)| (*d, e))
    }
}

/// The full history of one parameter group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupHistory {
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterHistory>,
    /// Date-keyed rounding directives per function name.
    #[serde(default)]
    pub rounding: BTreeMap<String, BTreeMap<NaiveDate, crate::params::RoundingSpec>>,
}

/// Every parameter group the policy system knows about, in declarative
/// (unresolved) form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParamHistories {
    #[serde(flatten)]
    pub groups: BTreeMap<String, GroupHistory>,
}

impl ParamHistories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_group(&mut self, name: impl Into<String>, group: GroupHistory) -> &mut Self {
        self.groups.insert(name.into(), group);
        self
    }

    /// Parses a YAML document mapping group names to group histories.
    pub fn from_yaml_str(source: &str) -> Result<Self, crate::params::ParamError> {
        serde_yaml::from_str(source).map_err(crate::params::ParamError::from)
    }

    /// Reads and parses a parameter file.
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, crate::params::ParamError> {
        let source =
            std::fs::read_to_string(path).map_err(|source| crate::params::ParamError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml_str(&source)
    }
}

/// Interprets a raw map as a piecewise interval table.
pub(crate) fn intervals_from_raw(
    group: &str,
    parameter: &str,
    raw: &RawValue,
) -> Result<BTreeMap<usize, RawInterval>, crate::params::ParamError> {
    let malformed = |reason: String| crate::params::ParamError::MalformedPiecewise {
        group: group.to_string(),
        parameter: parameter.to_string(),
        reason,
    };

    let map = match raw {
        RawValue::Map(m) => m,
        _ => return Err(malformed("expected a map of numbered intervals".into())),
    };

    let mut intervals = BTreeMap::new();
    for (key, entry) in map {
        let index: usize = key
            .parse()
            .map_err(|_| malformed(format!("interval key '{key}' is not a number")))?;
        let fields = match entry {
            RawValue::Map(m) => m,
            _ => return Err(malformed(format!("interval {index} is not a map"))),
        };
        let mut interval = RawInterval::default();
        for (field, value) in fields {
            let number = value
                .as_scalar()
                .ok_or_else(|| malformed(format!("interval {index}: '{field}' is not numeric")))?;
            match field.as_str() {
                "lower_threshold" => interval.lower_threshold = Some(number),
                "upper_threshold" => interval.upper_threshold = Some(number),
                "rate_linear" => interval.rate_linear = Some(number),
                "rate_quadratic" => interval.rate_quadratic = Some(number),
                "intercept_at_lower_threshold" => {
                    interval.intercept_at_lower_threshold = Some(number)
                }
                other => {
                    return Err(malformed(format!(
                        "interval {index}: unknown field '{other}'"
                    )))
                }
            }
        }
        intervals.insert(index, interval);
    }
    Ok(intervals)
}

impl RawValue {
    pub(crate) fn as_scalar(&self) -> Option<f64> {
        match self {
            RawValue::Int(v) => Some(*v as f64),
            RawValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_parsing() {
        let previous: Deviation = serde_yaml::from_str("previous").unwrap();
        assert_eq!(previous, Deviation::Previous);

        let reference: Deviation = serde_yaml::from_str("kindergeld.satz").unwrap();
        assert_eq!(
            reference,
            Deviation::Reference {
                group: "kindergeld".into(),
                parameter: "satz".into()
            }
        );

        assert!(serde_yaml::from_str::<Deviation>("nonsense").is_err());
    }

    #[test]
    fn test_version_at_picks_last_applicable() {
        let yaml = "
history:
  2002-01-01:
    value: 154
  2009-01-01:
    value: 164
";
        let history: ParameterHistory = serde_yaml::from_str(yaml).unwrap();
        let at = |d: &str| {
            history
                .version_at(d.parse().unwrap())
                .map(|(date, entry)| (date, entry.value.clone()))
        };
        assert_eq!(
            at("2005-06-15"),
            Some(("2002-01-01".parse().unwrap(), Some(RawValue::Int(154))))
        );
        assert_eq!(
            at("2009-01-01"),
            Some(("2009-01-01".parse().unwrap(), Some(RawValue::Int(164))))
        );
        assert_eq!(at("2001-12-31"), None);
    }

    #[test]
    fn test_group_history_from_yaml() {
        let yaml = "
kindergeld:
  parameters:
    satz:
      history:
        1996-01-01:
          value:
            first_child: 102
            second_child: 102
  rounding:
    kindergeld_m:
      2001-01-01:
        base: 1.0
        direction: nearest
";
        let histories = ParamHistories::from_yaml_str(yaml).unwrap();
        let group = &histories.groups["kindergeld"];
        assert!(group.parameters.contains_key("satz"));
        assert!(group.rounding.contains_key("kindergeld_m"));
    }
}
