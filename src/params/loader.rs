//! Resolves parameter histories for a concrete policy date.
//!
//! Resolution is last-applicable-wins per parameter: among all recorded law
//! versions, the most recent one effective on or before the policy date is
//! selected. Deviation directives are chased recursively, with a depth guard
//! so an authoring mistake (two parameters deviating from each other) fails
//! loudly instead of looping.

use crate::dates::{day_before, one_year_before};
use crate::params::history::{intervals_from_raw, Deviation, ParamHistories, RawValue};
use crate::params::value::{ParamGroup, ParamValue, Params, RoundingSpec};
use crate::piecewise::{derive_schedule, PiecewiseError};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Deviation chains longer than this indicate a reference cycle in the
/// parameter files.
const MAX_DEVIATION_DEPTH: usize = 32;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("parameter group '{group}' does not exist")]
    MissingGroup { group: String },

    #[error("parameter '{group}.{parameter}' has no version applicable on {date}")]
    MissingParameter {
        group: String,
        parameter: String,
        date: NaiveDate,
    },

    #[error("parameter '{group}.{parameter}': the version of {date} states no value")]
    MissingValue {
        group: String,
        parameter: String,
        date: NaiveDate,
    },

    #[error(
        "parameter '{group}.{parameter}': the deviation recorded for {date} cannot be \
         resolved (nothing to deviate from)"
    )]
    UnresolvableDeviation {
        group: String,
        parameter: String,
        date: NaiveDate,
    },

    #[error("parameter '{group}.{parameter}': deviation chain exceeds {MAX_DEVIATION_DEPTH} steps (reference cycle?)")]
    DeviationChainTooDeep { group: String, parameter: String },

    #[error("parameter '{group}.{parameter}': {reason}")]
    MalformedPiecewise {
        group: String,
        parameter: String,
        reason: String,
    },

    #[error("parameter '{group}.{parameter}' is a {got}, expected a {expected}")]
    WrongType {
        group: String,
        parameter: String,
        expected: String,
        got: String,
    },

    #[error("cannot read parameter file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed parameter document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Piecewise(#[from] PiecewiseError),
}

impl ParamHistories {
    /// Resolves every group for `date`.
    pub fn resolve(&self, date: NaiveDate) -> Result<Params, ParamError> {
        let mut groups = BTreeMap::new();
        for name in self.groups.keys() {
            groups.insert(name.clone(), self.resolve_group(name, date)?);
        }
        Ok(Params::new(groups))
    }

    /// Resolves one group for `date`. Parameters without any applicable
    /// version are absent from the result.
    pub fn resolve_group(&self, name: &str, date: NaiveDate) -> Result<ParamGroup, ParamError> {
        let group = self.groups.get(name).ok_or_else(|| ParamError::MissingGroup {
            group: name.to_string(),
        })?;
        debug!(group = name, %date, "resolving parameter group");

        let mut values = BTreeMap::new();
        for (parameter, history) in &group.parameters {
            if let Some(raw) = self.resolve_parameter(name, parameter, date, 0)? {
                values.insert(
                    parameter.clone(),
                    self.materialize(name, parameter, &raw)?,
                );
            }
            if history.access_different_date.is_some() {
                let earlier = one_year_before(date);
                if let Some(raw) = self.resolve_parameter(name, parameter, earlier, 0)? {
                    values.insert(
                        format!("{parameter}_vorjahr"),
                        self.materialize(name, parameter, &raw)?,
                    );
                }
            }
        }

        let mut rounding = BTreeMap::new();
        for (function, specs) in &group.rounding {
            if let Some((_, spec)) = specs.range(..=date).next_back() {
                rounding.insert(function.clone(), *spec);
            }
        }

        Ok(ParamGroup::new(name.to_string(), date, values, rounding))
    }

    /// The raw value of `group.parameter` in force on `date`, with all
    /// deviation directives resolved.
    fn resolve_parameter(
        &self,
        group: &str,
        parameter: &str,
        date: NaiveDate,
        depth: usize,
    ) -> Result<Option<RawValue>, ParamError> {
        if depth > MAX_DEVIATION_DEPTH {
            return Err(ParamError::DeviationChainTooDeep {
                group: group.to_string(),
                parameter: parameter.to_string(),
            });
        }
        let history = self
            .groups
            .get(group)
            .ok_or_else(|| ParamError::MissingGroup {
                group: group.to_string(),
            })?
            .parameters
            .get(parameter)
            .ok_or_else(|| ParamError::MissingParameter {
                group: group.to_string(),
                parameter: parameter.to_string(),
                date,
            })?;

        let Some((effective, entry)) = history.version_at(date) else {
            return Ok(None);
        };

        let unresolvable = || ParamError::UnresolvableDeviation {
            group: group.to_string(),
            parameter: parameter.to_string(),
            date: effective,
        };

        match &entry.deviates_from {
            None => {
                let value = entry.value.clone().ok_or_else(|| ParamError::MissingValue {
                    group: group.to_string(),
                    parameter: parameter.to_string(),
                    date: effective,
                })?;
                Ok(Some(value))
            }
            Some(Deviation::Previous) => {
                // The predecessor is whatever was in force the day before
                // this version took effect.
                let base = self
                    .resolve_parameter(group, parameter, day_before(effective), depth + 1)?
                    .ok_or_else(unresolvable)?;
                Ok(Some(merge(base, entry.value.as_ref())))
            }
            Some(Deviation::Reference {
                group: ref_group,
                parameter: ref_parameter,
            }) => {
                let base = self
                    .resolve_parameter(ref_group, ref_parameter, date, depth + 1)?
                    .ok_or_else(unresolvable)?;
                Ok(Some(merge(base, entry.value.as_ref())))
            }
        }
    }

    fn materialize(
        &self,
        group: &str,
        parameter: &str,
        raw: &RawValue,
    ) -> Result<ParamValue, ParamError> {
        let tag = self.groups[group].parameters[parameter].kind;
        match tag {
            Some(tag) => {
                let intervals = intervals_from_raw(group, parameter, raw)?;
                let schedule =
                    derive_schedule(&format!("{group}.{parameter}"), &intervals, tag.mode())?;
                Ok(ParamValue::Schedule(schedule))
            }
            None => Ok(convert(raw)),
        }
    }
}

/// Leaf-by-leaf overlay of `patch` onto `base`: maps merge recursively,
/// anything else replaces. A missing patch means "unchanged".
fn merge(base: RawValue, patch: Option<&RawValue>) -> RawValue {
    match (base, patch) {
        (base, None) => base,
        (RawValue::Map(mut base_map), Some(RawValue::Map(patch_map))) => {
            for (key, patch_value) in patch_map {
                let merged = match base_map.remove(key) {
                    Some(base_value) => merge(base_value, Some(patch_value)),
                    None => patch_value.clone(),
                };
                base_map.insert(key.clone(), merged);
            }
            RawValue::Map(base_map)
        }
        (_, Some(patch)) => patch.clone(),
    }
}

fn convert(raw: &RawValue) -> ParamValue {
    match raw {
        RawValue::Bool(v) => ParamValue::Bool(*v),
        RawValue::Int(v) => ParamValue::Int(*v),
        RawValue::Scalar(v) => ParamValue::Scalar(*v),
        RawValue::Map(map) => ParamValue::Map(
            map.iter()
                .map(|(key, value)| (key.clone(), convert(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RoundingDirection;
    use std::io::Write;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    const KINDERGELD_YAML: &str = "
kindergeld:
  parameters:
    satz:
      history:
        2002-01-01:
          value: 154
        2009-01-01:
          value: 164
    altersgrenze:
      access_different_date: last_year
      history:
        2002-01-01:
          value: 27
        2007-01-01:
          value: 25
  rounding:
    kindergeld_m:
      2002-01-01:
        base: 1.0
        direction: down
";

    #[test]
    fn test_last_applicable_wins() {
        let histories = ParamHistories::from_yaml_str(KINDERGELD_YAML).unwrap();
        let group = histories.resolve_group("kindergeld", date("2005-06-15")).unwrap();
        assert_eq!(group.int("satz").unwrap(), 154);
        let group = histories.resolve_group("kindergeld", date("2009-01-01")).unwrap();
        assert_eq!(group.int("satz").unwrap(), 164);
    }

    #[test]
    fn test_parameter_without_applicable_version_is_absent() {
        let histories = ParamHistories::from_yaml_str(KINDERGELD_YAML).unwrap();
        let group = histories.resolve_group("kindergeld", date("2001-01-01")).unwrap();
        assert!(!group.contains("satz"));
    }

    #[test]
    fn test_last_year_access() {
        let histories = ParamHistories::from_yaml_str(KINDERGELD_YAML).unwrap();
        // On Jan 1st 2007 the new limit applies, but last year's value is
        // still the 2002 one.
        let group = histories.resolve_group("kindergeld", date("2007-01-01")).unwrap();
        assert_eq!(group.int("altersgrenze").unwrap(), 25);
        assert_eq!(group.int("altersgrenze_vorjahr").unwrap(), 27);
    }

    #[test]
    fn test_rounding_resolution() {
        let histories = ParamHistories::from_yaml_str(KINDERGELD_YAML).unwrap();
        let group = histories.resolve_group("kindergeld", date("2010-01-01")).unwrap();
        let spec = group.rounding_for("kindergeld_m").unwrap();
        assert_eq!(spec.base, 1.0);
        assert_eq!(spec.direction, RoundingDirection::Down);
        assert!(group.rounding_for("unrelated_fn").is_none());
    }

    #[test]
    fn test_deviates_from_previous_merges_leafwise() {
        let yaml = "
arbeitsl_geld:
  parameters:
    satz:
      history:
        2000-01-01:
          value:
            allein: 100
            paar: 180
        2005-01-01:
          deviates_from: previous
          value:
            paar: 190
";
        let histories = ParamHistories::from_yaml_str(yaml).unwrap();
        let group = histories.resolve_group("arbeitsl_geld", date("2006-01-01")).unwrap();
        let satz = group.map("satz").unwrap();
        assert_eq!(satz["allein"].as_int(), Some(100)); // Carried over
        assert_eq!(satz["paar"].as_int(), Some(190)); // Overridden
    }

    #[test]
    fn test_deviates_from_reference_redirects() {
        let yaml = "
kindergeld:
  parameters:
    satz:
      history:
        2002-01-01:
          value: 154
kinderzuschl:
  parameters:
    grundbetrag:
      history:
        2005-01-01:
          deviates_from: kindergeld.satz
";
        let histories = ParamHistories::from_yaml_str(yaml).unwrap();
        let group = histories.resolve_group("kinderzuschl", date("2006-01-01")).unwrap();
        assert_eq!(group.int("grundbetrag").unwrap(), 154);
    }

    #[test]
    fn test_unresolvable_deviation_names_the_parameter() {
        let yaml = "
grunds:
  parameters:
    regelsatz:
      history:
        2005-01-01:
          deviates_from: previous
          value: 10
";
        let histories = ParamHistories::from_yaml_str(yaml).unwrap();
        let err = histories.resolve_group("grunds", date("2006-01-01")).unwrap_err();
        assert!(err.to_string().contains("grunds.regelsatz"), "got: {err}");
    }

    #[test]
    fn test_reference_cycle_detected() {
        let yaml = "
a:
  parameters:
    x:
      history:
        2000-01-01:
          deviates_from: b.y
b:
  parameters:
    y:
      history:
        2000-01-01:
          deviates_from: a.x
";
        let histories = ParamHistories::from_yaml_str(yaml).unwrap();
        let err = histories.resolve_group("a", date("2001-01-01")).unwrap_err();
        assert!(matches!(err, ParamError::DeviationChainTooDeep { .. }));
    }

    #[test]
    fn test_piecewise_parameter_materializes() {
        let yaml = "
eink_st:
  parameters:
    tarif:
      kind: piecewise
      history:
        2005-01-01:
          value:
            '0':
              lower_threshold: -.inf
              upper_threshold: 1000
              rate_linear: 0
              intercept_at_lower_threshold: 0
            '1':
              upper_threshold: 2000
              rate_linear: 0.2
            '2':
              upper_threshold: .inf
              rate_linear: 0
";
        let histories = ParamHistories::from_yaml_str(yaml).unwrap();
        let group = histories.resolve_group("eink_st", date("2006-01-01")).unwrap();
        let tarif = group.schedule("tarif").unwrap();
        assert_eq!(tarif.evaluate(1500.0).unwrap(), 100.0);
        assert_eq!(tarif.evaluate(2500.0).unwrap(), 200.0);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KINDERGELD_YAML.as_bytes()).unwrap();
        let histories = ParamHistories::from_yaml_file(file.path()).unwrap();
        let group = histories.resolve_group("kindergeld", date("2010-01-01")).unwrap();
        assert_eq!(group.int("satz").unwrap(), 164);
    }

    #[test]
    fn test_resolved_group_serializes_for_diagnostics() {
        let histories = ParamHistories::from_yaml_str(KINDERGELD_YAML).unwrap();
        let group = histories.resolve_group("kindergeld", date("2010-01-01")).unwrap();
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["values"]["satz"], serde_json::json!(164));
    }
}
