//! # Duty Calculation
//!
//! Duty categories and the formulas that turn a declared quantity (or value)
//! into an amount owed.
//!
//! | Method         | Formula                                           |
//! |----------------|---------------------------------------------------|
//! | `percentage`   | `round(value × rate / 100, 2)`                    |
//! | `per_liter`    | `round(max(0, qty − exemption) × rate, 2)`        |
//! | `per_kilogram` | `round(max(0, qty) × rate, 2)`                    |
//! | `per_unit`     | `round(max(0, qty) × rate, 2)`                    |
//!
//! Only `per_liter` honours the category's exemption quantity. Method codes
//! are stored as strings, so a record written by a newer build may name a
//! method this build does not understand. That case aborts with
//! [`CalculationError::UnknownMethod`] instead of guessing a formula.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CalculationError, ValidationError};
use crate::money::round2;

/// Upper bound for a category's duty rate.
pub const MAX_DUTY_RATE: f64 = 9999.9999;

/// How a duty category converts a declared quantity into an amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    /// Percentage of declared value.
    Percentage,
    /// Fixed amount per liter above the exemption.
    PerLiter,
    /// Fixed amount per kilogram.
    PerKilogram,
    /// Fixed amount per item.
    PerUnit,
}

impl CalculationMethod {
    /// Every supported method, in catalogue order.
    pub const ALL: [CalculationMethod; 4] = [
        Self::Percentage,
        Self::PerLiter,
        Self::PerKilogram,
        Self::PerUnit,
    ];

    /// Parse a stored method code.
    pub fn from_code(code: &str) -> Result<Self, CalculationError> {
        match code {
            "percentage" => Ok(Self::Percentage),
            "per_liter" => Ok(Self::PerLiter),
            "per_kilogram" => Ok(Self::PerKilogram),
            "per_unit" => Ok(Self::PerUnit),
            other => Err(CalculationError::UnknownMethod(other.to_string())),
        }
    }

    /// The stored code for this method.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::PerLiter => "per_liter",
            Self::PerKilogram => "per_kilogram",
            Self::PerUnit => "per_unit",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Percentage => "Percentage",
            Self::PerLiter => "Per Liter",
            Self::PerKilogram => "Per Kilogram",
            Self::PerUnit => "Per Unit",
        }
    }
}

impl std::fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// The inputs of a duty formula, detached from any stored category.
#[derive(Debug, Clone, PartialEq)]
pub struct DutyRule {
    /// Stored calculation method code.
    pub method_code: String,
    /// Rate: a percentage for `percentage`, an amount per unit otherwise.
    pub rate: f64,
    /// Quantity exempt from duty (`per_liter` only).
    pub exemption: Option<f64>,
}

impl DutyRule {
    /// Compute duty for `quantity` (a declared value for `percentage`).
    ///
    /// Returns `0.0` for non-positive input and for quantities that fall
    /// entirely within the exemption.
    pub fn calculate(&self, quantity: f64) -> Result<f64, CalculationError> {
        let method = CalculationMethod::from_code(&self.method_code)?;
        if quantity <= 0.0 {
            return Ok(0.0);
        }
        let duty = match method {
            CalculationMethod::Percentage => quantity * self.rate / 100.0,
            CalculationMethod::PerLiter => {
                let taxable = quantity - self.exemption.unwrap_or(0.0);
                if taxable <= 0.0 {
                    return Ok(0.0);
                }
                taxable * self.rate
            }
            CalculationMethod::PerKilogram | CalculationMethod::PerUnit => quantity * self.rate,
        };
        Ok(round2(duty))
    }
}

/// A duty category as stored and served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DutyCategory {
    /// Category identifier.
    pub id: Uuid,
    /// Unique machine code, e.g. `alcohol`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional icon identifier for clients.
    pub icon_name: Option<String>,
    /// Calculation method code.
    pub calculation_method: String,
    /// Duty rate, `0 ..= 9999.9999`.
    pub duty_rate: f64,
    /// Unit the rate is expressed in (unit type code).
    pub duty_unit: Option<String>,
    /// Exempt quantity, `>= 0`.
    pub exemption_quantity: Option<f64>,
    /// Unit of the exemption (unit type code).
    pub exemption_unit: Option<String>,
    /// Inactive categories cannot be used for calculation.
    pub is_active: bool,
    /// First day the category applies.
    pub effective_from: Option<NaiveDate>,
    /// Last day the category applies.
    pub effective_to: Option<NaiveDate>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl DutyCategory {
    /// The formula inputs for this category.
    pub fn rule(&self) -> DutyRule {
        DutyRule {
            method_code: self.calculation_method.clone(),
            rate: self.duty_rate,
            exemption: self.exemption_quantity,
        }
    }

    /// Compute duty for `quantity` under this category.
    pub fn calculate(&self, quantity: f64) -> Result<f64, CalculationError> {
        self.rule().calculate(quantity)
    }

    /// Whether the category's effective window contains `date`.
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from.map_or(true, |from| from <= date)
            && self.effective_to.map_or(true, |to| to >= date)
    }
}

/// Result of a duty calculation against a stored category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DutyCalculation {
    /// Category code.
    pub category: String,
    /// Method code applied.
    pub method: String,
    /// Quantity (or value) supplied.
    pub quantity: f64,
    /// Duty owed, rounded to two decimal places.
    pub duty: f64,
}

/// Reject an inverted effective window.
pub fn validate_effective_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    match (from, to) {
        (Some(from), Some(to)) if to < from => {
            Err(ValidationError::InvertedEffectiveRange { from, to })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(method: &str, rate: f64, exemption: Option<f64>) -> DutyRule {
        DutyRule {
            method_code: method.to_string(),
            rate,
            exemption,
        }
    }

    #[test]
    fn percentage_of_value() {
        let standard = rule("percentage", 25.0, None);
        assert_eq!(standard.calculate(100.0).unwrap(), 25.0);
        assert_eq!(standard.calculate(0.0).unwrap(), 0.0);
        assert_eq!(standard.calculate(-5.0).unwrap(), 0.0);
    }

    #[test]
    fn per_liter_applies_exemption() {
        let alcohol = rule("per_liter", 15.0, Some(1.0));
        assert_eq!(alcohol.calculate(1.0).unwrap(), 0.0);
        assert_eq!(alcohol.calculate(0.5).unwrap(), 0.0);
        assert_eq!(alcohol.calculate(3.0).unwrap(), 30.0);
    }

    #[test]
    fn per_liter_without_exemption() {
        let beer = rule("per_liter", 2.0, None);
        assert_eq!(beer.calculate(1.5).unwrap(), 3.0);
    }

    #[test]
    fn per_unit_ignores_exemption() {
        let cigars = rule("per_unit", 2.5, Some(10.0));
        assert_eq!(cigars.calculate(4.0).unwrap(), 10.0);
    }

    #[test]
    fn per_kilogram() {
        let tobacco = rule("per_kilogram", 50.0, None);
        assert_eq!(tobacco.calculate(0.25).unwrap(), 12.5);
    }

    #[test]
    fn result_is_rounded() {
        let standard = rule("percentage", 25.0, None);
        // 33.33 * 25 / 100 = 8.3325
        assert_eq!(standard.calculate(33.33).unwrap(), 8.33);
    }

    #[test]
    fn unknown_method_aborts() {
        let bogus = rule("per_gallon", 1.0, None);
        assert_eq!(
            bogus.calculate(10.0),
            Err(CalculationError::UnknownMethod("per_gallon".into()))
        );
        // Even a zero quantity must not mask a corrupt category.
        assert!(bogus.calculate(0.0).is_err());
    }

    #[test]
    fn method_codes_round_trip() {
        for method in CalculationMethod::ALL {
            assert_eq!(CalculationMethod::from_code(method.code()).unwrap(), method);
        }
    }

    #[test]
    fn effective_window() {
        let now = Utc::now();
        let mut cat = DutyCategory {
            id: Uuid::new_v4(),
            code: "seasonal".into(),
            name: "Seasonal".into(),
            description: None,
            icon_name: None,
            calculation_method: "percentage".into(),
            duty_rate: 10.0,
            duty_unit: None,
            exemption_quantity: None,
            exemption_unit: None,
            is_active: true,
            effective_from: NaiveDate::from_ymd_opt(2025, 1, 1),
            effective_to: NaiveDate::from_ymd_opt(2025, 12, 31),
            created_at: now,
            updated_at: now,
        };
        let mid = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let after = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(cat.is_effective_on(mid));
        assert!(!cat.is_effective_on(after));
        cat.effective_to = None;
        assert!(cat.is_effective_on(after));
    }

    #[test]
    fn inverted_range_rejected() {
        let a = NaiveDate::from_ymd_opt(2025, 6, 1);
        let b = NaiveDate::from_ymd_opt(2025, 1, 1);
        assert!(validate_effective_range(a, b).is_err());
        assert!(validate_effective_range(b, a).is_ok());
        assert!(validate_effective_range(a, a).is_ok());
        assert!(validate_effective_range(None, b).is_ok());
    }
}
