//! Household member helpers: date-of-birth parsing and age derivation.

use chrono::{Datelike, NaiveDate};

use crate::error::ValidationError;

/// Parse a `YYYY-MM-DD` date of birth that must lie strictly before `today`.
pub fn parse_date_of_birth(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let dob = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))?;
    if dob >= today {
        return Err(ValidationError::InvalidDate(raw.to_string()));
    }
    Ok(dob)
}

/// Age in whole years on `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn age_counts_whole_years() {
        assert_eq!(age_on(d(1990, 6, 15), d(2025, 6, 14)), 34);
        assert_eq!(age_on(d(1990, 6, 15), d(2025, 6, 15)), 35);
        assert_eq!(age_on(d(2020, 1, 1), d(2020, 12, 31)), 0);
    }

    #[test]
    fn leap_day_birthday() {
        assert_eq!(age_on(d(2000, 2, 29), d(2025, 2, 28)), 24);
        assert_eq!(age_on(d(2000, 2, 29), d(2025, 3, 1)), 25);
    }

    #[test]
    fn date_of_birth_must_be_past_and_real() {
        let today = d(2025, 6, 1);
        assert_eq!(parse_date_of_birth("1990-06-15", today).unwrap(), d(1990, 6, 15));
        assert!(parse_date_of_birth("2025-06-01", today).is_err());
        assert!(parse_date_of_birth("2030-01-01", today).is_err());
        assert!(parse_date_of_birth("1990-02-30", today).is_err());
        assert!(parse_date_of_birth("15/06/1990", today).is_err());
    }
}
