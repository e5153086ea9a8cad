//! Field-format checks shared by request validators.

use crate::error::ValidationError;

/// Accept a plausible email address: one `@`, non-empty local part, and a
/// dotted domain without whitespace.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidEmail(email.to_string());
    if email.len() > 255 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

/// Accept an ISO 3166-1 alpha-2 code (two uppercase ASCII letters).
pub fn validate_country_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCountryCode(code.to_string()))
    }
}

/// Accept an ISO 4217 code (three uppercase ASCII letters).
pub fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCurrencyCode(code.to_string()))
    }
}

/// Accept `value` within `min ..= max`.
pub fn validate_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(validate_email("traveller@example.com").is_ok());
        assert!(validate_email("a.b+c@mail.example.bm").is_ok());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b..com").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("a@b@example.com").is_err());
    }

    #[test]
    fn country_codes() {
        assert!(validate_country_code("BM").is_ok());
        assert!(validate_country_code("bm").is_err());
        assert!(validate_country_code("BMU").is_err());
    }

    #[test]
    fn currency_codes() {
        assert!(validate_currency_code("USD").is_ok());
        assert!(validate_currency_code("usd").is_err());
        assert!(validate_currency_code("US").is_err());
    }

    #[test]
    fn ranges() {
        assert!(validate_range("rate", 0.0, 0.0, 10.0).is_ok());
        assert!(validate_range("rate", 10.0, 0.0, 10.0).is_ok());
        assert!(validate_range("rate", 10.01, 0.0, 10.0).is_err());
        assert!(validate_range("rate", f64::NAN, 0.0, 10.0).is_err());
    }
}
