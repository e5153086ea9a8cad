//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers to extract
//! and validate JSON bodies in handlers. Validation collects every failing
//! field before answering, so clients see all problems in one 422.

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::{AppError, FieldErrors};

/// Trait for request types that check business rules beyond what serde
/// deserialization enforces.
pub trait Validate {
    /// Record every failing field in `errors`.
    fn validate(&self, errors: &mut FieldErrors);
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    let mut errors = FieldErrors::new();
    value.validate(&mut errors);
    errors.into_result()?;
    Ok(value)
}

/// Shared field rule: a required string no longer than `max` characters.
pub fn require_text(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, format!("The {field} field is required."));
    } else if value.chars().count() > max {
        errors.add(field, format!("The {field} may not be greater than {max} characters."));
    }
}

/// Shared field rule: an optional string no longer than `max` characters.
pub fn optional_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value {
        if value.chars().count() > max {
            errors.add(field, format!("The {field} may not be greater than {max} characters."));
        }
    }
}
