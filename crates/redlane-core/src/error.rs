//! # Error Hierarchy
//!
//! Structured error types for Red Lane, built with `thiserror`.
//!
//! Each subsystem has its own enum so callers can map failures precisely:
//! the API turns [`FlagError`] into 404, [`PrimaryError::HasDependents`] into
//! 409, and [`CalculationError`] into a logged 500.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for Red Lane domain operations.
#[derive(Error, Debug)]
pub enum RedlaneError {
    /// Field-level validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Duty calculation aborted.
    #[error("calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Exchange-rate lookup or conversion failure.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Feature-flag lookup failure.
    #[error("feature flag error: {0}")]
    Flag(#[from] FlagError),

    /// Primary-record invariant violation.
    #[error("primary record error: {0}")]
    Primary(#[from] PrimaryError),
}

/// Validation errors for domain values.
///
/// Each variant names the offending value so operators can diagnose bad
/// input without reproducing the request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Country code is not two uppercase ASCII letters.
    #[error("invalid country code: \"{0}\" (expected ISO 3166-1 alpha-2, e.g. US)")]
    InvalidCountryCode(String),

    /// Currency code is not three uppercase ASCII letters.
    #[error("invalid currency code: \"{0}\" (expected ISO 4217, e.g. USD)")]
    InvalidCurrencyCode(String),

    /// Effective date range is inverted.
    #[error("effective_to ({to}) must be on or after effective_from ({from})")]
    InvertedEffectiveRange {
        /// Start of the range.
        from: chrono::NaiveDate,
        /// End of the range.
        to: chrono::NaiveDate,
    },

    /// A numeric value falls outside its permitted bounds.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
        /// Rejected value.
        value: f64,
    },

    /// Date string is not `YYYY-MM-DD` or is not a real calendar date.
    #[error("invalid date: \"{0}\" (expected YYYY-MM-DD)")]
    InvalidDate(String),

    /// Email address is malformed.
    #[error("invalid email address: \"{0}\"")]
    InvalidEmail(String),
}

/// Errors raised while computing duty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculationError {
    /// The category references a calculation method code this build does not know.
    #[error("invalid calculation method: \"{0}\"")]
    UnknownMethod(String),
}

/// Errors raised by the exchange-rate resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// No applicable rate exists for the ordered pair.
    #[error("no exchange rate found from {from} to {to}")]
    RateNotFound {
        /// Source currency.
        from: Uuid,
        /// Target currency.
        to: Uuid,
    },

    /// A stored rate must convert between two distinct currencies.
    #[error("exchange rate must convert between two different currencies (got {0} on both sides)")]
    SameCurrencyPair(Uuid),
}

/// Errors raised by the feature-flag resolver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// The flag name is not in the catalogue.
    #[error("feature flag not found: \"{0}\"")]
    UnknownFlag(String),
}

/// Errors raised while maintaining the one-primary-per-scope invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimaryError {
    /// The target record does not exist (or is soft-deleted).
    #[error("record {0} not found")]
    NotFound(Uuid),

    /// The record is primary and still has live dependents.
    #[error("cannot delete primary record {id}: {dependents} dependent record(s) still reference it")]
    HasDependents {
        /// The primary record.
        id: Uuid,
        /// Number of live dependents.
        dependents: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculation_error_names_method() {
        let err = CalculationError::UnknownMethod("per_gallon".into());
        assert_eq!(err.to_string(), "invalid calculation method: \"per_gallon\"");
    }

    #[test]
    fn redlane_error_wraps_flag_error() {
        let err: RedlaneError = FlagError::UnknownFlag("warp_drive".into()).into();
        let msg = err.to_string();
        assert!(msg.contains("feature flag error"));
        assert!(msg.contains("warp_drive"));
    }

    #[test]
    fn has_dependents_display() {
        let id = Uuid::nil();
        let err = PrimaryError::HasDependents { id, dependents: 2 };
        assert!(err.to_string().contains("2 dependent record(s)"));
    }

    #[test]
    fn inverted_range_display() {
        let from = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let to = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let err = ValidationError::InvertedEffectiveRange { from, to };
        assert!(err.to_string().contains("2025-01-01"));
    }
}
