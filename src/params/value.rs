//! The typed configuration tree a resolved policy date produces.

use crate::params::loader::ParamError;
use crate::piecewise::PiecewiseSchedule;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One resolved parameter value. After resolution no date-keyed entries
/// remain; every leaf is concrete.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Scalar(f64),
    Map(BTreeMap<String, ParamValue>),
    Schedule(PiecewiseSchedule),
}

impl ParamValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ParamValue::Scalar(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ParamValue>> {
        match self {
            ParamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_schedule(&self) -> Option<&PiecewiseSchedule> {
        match self {
            ParamValue::Schedule(s) => Some(s),
            _ => None,
        }
    }
}

/// Rounding directive for one function, as recorded in parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingDirection {
    Up,
    Down,
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundingSpec {
    /// The multiple to round to.
    pub base: f64,
    pub direction: RoundingDirection,
    /// Added after rounding (some statutes round down, then add a cent).
    #[serde(default)]
    pub to_add_after: f64,
}

/// One legally coherent bundle of constants, resolved as of `date`.
/// Immutable once built; bound into functions at call time, never a graph
/// node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamGroup {
    name: String,
    date: NaiveDate,
    values: BTreeMap<String, ParamValue>,
    rounding: BTreeMap<String, RoundingSpec>,
}

impl ParamGroup {
    pub(crate) fn new(
        name: String,
        date: NaiveDate,
        values: BTreeMap<String, ParamValue>,
        rounding: BTreeMap<String, RoundingSpec>,
    ) -> Self {
        Self {
            name,
            date,
            values,
            rounding,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn contains(&self, parameter: &str) -> bool {
        self.values.contains_key(parameter)
    }

    pub fn get(&self, parameter: &str) -> Result<&ParamValue, ParamError> {
        self.values
            .get(parameter)
            .ok_or_else(|| ParamError::MissingParameter {
                group: self.name.clone(),
                parameter: parameter.to_string(),
                date: self.date,
            })
    }

    pub fn scalar(&self, parameter: &str) -> Result<f64, ParamError> {
        let value = self.get(parameter)?;
        value.as_scalar().ok_or_else(|| self.wrong_type(parameter, "scalar", value))
    }

    pub fn int(&self, parameter: &str) -> Result<i64, ParamError> {
        let value = self.get(parameter)?;
        value.as_int().ok_or_else(|| self.wrong_type(parameter, "int", value))
    }

    pub fn bool(&self, parameter: &str) -> Result<bool, ParamError> {
        let value = self.get(parameter)?;
        value.as_bool().ok_or_else(|| self.wrong_type(parameter, "bool", value))
    }

    pub fn map(&self, parameter: &str) -> Result<&BTreeMap<String, ParamValue>, ParamError> {
        let value = self.get(parameter)?;
        match value {
            ParamValue::Map(m) => Ok(m),
            other => Err(self.wrong_type(parameter, "map", other)),
        }
    }

    pub fn schedule(&self, parameter: &str) -> Result<&PiecewiseSchedule, ParamError> {
        let value = self.get(parameter)?;
        match value {
            ParamValue::Schedule(s) => Ok(s),
            other => Err(self.wrong_type(parameter, "piecewise schedule", other)),
        }
    }

    pub fn rounding_for(&self, function: &str) -> Option<&RoundingSpec> {
        self.rounding.get(function)
    }

    fn wrong_type(&self, parameter: &str, expected: &str, got: &ParamValue) -> ParamError {
        ParamError::WrongType {
            group: self.name.clone(),
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            got: match got {
                ParamValue::Bool(_) => "bool",
                ParamValue::Int(_) => "int",
                ParamValue::Scalar(_) => "scalar",
                ParamValue::Map(_) => "map",
                ParamValue::Schedule(_) => "piecewise schedule",
            }
            .to_string(),
        }
    }
}

/// All parameter groups resolved for one policy date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Params {
    groups: BTreeMap<String, ParamGroup>,
}

impl Params {
    pub(crate) fn new(groups: BTreeMap<String, ParamGroup>) -> Self {
        Self { groups }
    }

    pub fn group(&self, name: &str) -> Result<&ParamGroup, ParamError> {
        self.groups
            .get(name)
            .ok_or_else(|| ParamError::MissingGroup {
                group: name.to_string(),
            })
    }

    pub fn contains_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}
