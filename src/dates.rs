//! Policy-date handling.
//!
//! A policy date selects both the parameter versions and the function
//! variants in force. Callers may pass a bare year, an ISO date string, or a
//! concrete date; everything downstream works on `chrono::NaiveDate`.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("'{input}' is not a valid policy date (expected a year, an ISO date, or a date value)")]
    Unparseable { input: String },

    #[error("year {year} is outside the representable calendar range")]
    YearOutOfRange { year: i32 },
}

/// A caller-facing policy date. A bare year resolves to January 1st of that
/// year, matching the convention that annual law changes take effect at the
/// turn of the year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateInput {
    Year(i32),
    Iso(String),
    Date(NaiveDate),
}

impl From<i32> for DateInput {
    fn from(year: i32) -> Self {
        Self::Year(year)
    }
}

impl From<&str> for DateInput {
    fn from(iso: &str) -> Self {
        Self::Iso(iso.to_string())
    }
}

impl From<NaiveDate> for DateInput {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl DateInput {
    /// Normalizes the input to a concrete calendar date.
    pub fn resolve(&self) -> Result<NaiveDate, DateError> {
        match self {
            DateInput::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1)
                .ok_or(DateError::YearOutOfRange { year: *year }),
            DateInput::Iso(s) => s
                .parse::<NaiveDate>()
                .map_err(|_| DateError::Unparseable { input: s.clone() }),
            DateInput::Date(date) => Ok(*date),
        }
    }
}

/// The same calendar date exactly one year earlier. Feb 29 rolls back to
/// Feb 28, the only day without a counterpart in the preceding year.
pub fn one_year_before(date: NaiveDate) -> NaiveDate {
    let year = date.year() - 1;
    NaiveDate::from_ymd_opt(year, date.month(), date.day()).unwrap_or_else(|| {
        NaiveDate::from_ymd_opt(year, 2, 28).expect("BUG: Feb 28 exists in every year")
    })
}

/// The day before `date`. A parameter version that deviates from its
/// predecessor resolves the predecessor as of this date.
pub fn day_before(date: NaiveDate) -> NaiveDate {
    date.pred_opt()
        .expect("BUG: no policy date exists at the calendar origin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DateInput::Year(2012), "2012-01-01")]
    #[case(DateInput::Iso("2011-06-01".into()), "2011-06-01")]
    #[case(DateInput::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()), "1999-12-31")]
    fn test_resolution(#[case] input: DateInput, #[case] expected: &str) {
        let expected: NaiveDate = expected.parse().unwrap();
        assert_eq!(input.resolve().unwrap(), expected);
    }

    #[test]
    fn test_unparseable_iso() {
        let err = DateInput::Iso("not-a-date".into()).resolve().unwrap_err();
        assert!(err.to_string().contains("not-a-date"));
    }

    #[rstest]
    #[case("2020-02-29", "2019-02-28")] // Leap day rolls back to Feb 28
    #[case("2020-03-01", "2019-03-01")]
    #[case("2021-02-28", "2020-02-28")]
    fn test_one_year_before(#[case] date: &str, #[case] expected: &str) {
        let date: NaiveDate = date.parse().unwrap();
        let expected: NaiveDate = expected.parse().unwrap();
        assert_eq!(one_year_before(date), expected);
    }

    #[test]
    fn test_day_before() {
        let date: NaiveDate = "2012-01-01".parse().unwrap();
        assert_eq!(day_before(date), "2011-12-31".parse().unwrap());
    }
}
