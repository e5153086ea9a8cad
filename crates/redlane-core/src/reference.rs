//! # Reference Data
//!
//! Static lookup tables (relationship types, unit types, calculation
//! methods) and the seed sets for the dynamic reference stores (currencies,
//! exchange rates, duty categories).
//!
//! Static tables use small integer ids that never change. Seed records get
//! fresh UUIDs; callers seed only into empty stores.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::duty::{CalculationMethod, DutyCategory};
use crate::exchange::{Currency, ExchangeRate, RateSource};

/// Relationship of a household member to the account holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelationshipType {
    /// Stable identifier.
    pub id: i32,
    /// Machine code.
    pub code: &'static str,
    /// Display label.
    pub description: &'static str,
}

/// A unit a duty rate or exemption is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitType {
    /// Stable identifier.
    pub id: i32,
    /// Machine code.
    pub code: &'static str,
    /// Short form.
    pub abbreviation: &'static str,
    /// Display label.
    pub description: &'static str,
}

/// Relationship types offered for household members.
pub const RELATIONSHIP_TYPES: [RelationshipType; 5] = [
    RelationshipType { id: 1, code: "spouse", description: "Spouse" },
    RelationshipType { id: 2, code: "child", description: "Child" },
    RelationshipType { id: 3, code: "parent", description: "Parent" },
    RelationshipType { id: 4, code: "sibling", description: "Sibling" },
    RelationshipType { id: 5, code: "other", description: "Other" },
];

/// Units for duty rates and exemptions.
pub const UNIT_TYPES: [UnitType; 5] = [
    UnitType { id: 1, code: "liters", abbreviation: "L", description: "Liters" },
    UnitType { id: 2, code: "kilograms", abbreviation: "kg", description: "Kilograms" },
    UnitType { id: 3, code: "units", abbreviation: "unit", description: "Units" },
    UnitType { id: 4, code: "cigars", abbreviation: "cigar", description: "Cigars" },
    UnitType { id: 5, code: "cigarettes", abbreviation: "cigarette", description: "Cigarettes" },
];

/// Look up a relationship type by id.
pub fn relationship_type(id: i32) -> Option<&'static RelationshipType> {
    RELATIONSHIP_TYPES.iter().find(|t| t.id == id)
}

/// Look up a unit type by code.
pub fn unit_type(code: &str) -> Option<&'static UnitType> {
    UNIT_TYPES.iter().find(|t| t.code == code)
}

/// The seed currency set.
pub fn seed_currencies() -> Vec<Currency> {
    [
        ("USD", "US Dollar", "$"),
        ("BMD", "Bermudian Dollar", "BD$"),
        ("EUR", "Euro", "€"),
        ("GBP", "British Pound", "£"),
        ("CAD", "Canadian Dollar", "CA$"),
        ("JPY", "Japanese Yen", "¥"),
    ]
    .into_iter()
    .map(|(code, name, symbol)| Currency {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        is_active: true,
    })
    .collect()
}

const SEED_RATES: [(&str, &str, f64); 14] = [
    ("USD", "BMD", 1.0),
    ("USD", "EUR", 0.92),
    ("USD", "GBP", 0.79),
    ("USD", "CAD", 1.35),
    ("USD", "JPY", 149.5),
    ("BMD", "USD", 1.0),
    ("BMD", "EUR", 0.92),
    ("BMD", "GBP", 0.79),
    ("BMD", "CAD", 1.35),
    ("BMD", "JPY", 149.5),
    ("EUR", "USD", 1.086957),
    ("GBP", "USD", 1.265823),
    ("CAD", "USD", 0.740741),
    ("JPY", "USD", 0.006689),
];

/// Seed rates between `currencies`, effective on `effective_date`.
///
/// Pairs whose codes are missing from `currencies` are skipped.
pub fn seed_rates(
    currencies: &[Currency],
    effective_date: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<ExchangeRate> {
    let id_of = |code: &str| currencies.iter().find(|c| c.code == code).map(|c| c.id);
    SEED_RATES
        .iter()
        .filter_map(|&(from, to, rate)| {
            Some(ExchangeRate {
                id: Uuid::new_v4(),
                from_currency_id: id_of(from)?,
                to_currency_id: id_of(to)?,
                rate,
                effective_date,
                source: RateSource::Manual,
                created_at: now,
            })
        })
        .collect()
}

/// The seed duty categories.
pub fn seed_duty_categories(now: DateTime<Utc>) -> Vec<DutyCategory> {
    struct Seed {
        code: &'static str,
        name: &'static str,
        description: &'static str,
        icon: &'static str,
        method: CalculationMethod,
        rate: f64,
        unit: Option<&'static str>,
        exemption: Option<(f64, &'static str)>,
    }

    let seeds = [
        Seed {
            code: "standard",
            name: "Standard",
            description: "Standard duty rate applied to most goods",
            icon: "package",
            method: CalculationMethod::Percentage,
            rate: 25.0,
            unit: None,
            exemption: None,
        },
        Seed {
            code: "alcohol",
            name: "Alcohol",
            description: "Duty on alcoholic beverages per liter with exemption",
            icon: "wine",
            method: CalculationMethod::PerLiter,
            rate: 15.0,
            unit: Some("liters"),
            exemption: Some((1.0, "liters")),
        },
        Seed {
            code: "tobacco",
            name: "Tobacco",
            description: "Duty on tobacco products per kilogram",
            icon: "smoking",
            method: CalculationMethod::PerKilogram,
            rate: 50.0,
            unit: Some("kilograms"),
            exemption: None,
        },
        Seed {
            code: "cigars",
            name: "Cigars",
            description: "Duty on cigars per unit",
            icon: "cigar",
            method: CalculationMethod::PerUnit,
            rate: 2.5,
            unit: Some("cigars"),
            exemption: None,
        },
        Seed {
            code: "cigarettes",
            name: "Cigarettes",
            description: "Duty on cigarettes per unit",
            icon: "cigarette",
            method: CalculationMethod::PerUnit,
            rate: 0.5,
            unit: Some("cigarettes"),
            exemption: None,
        },
    ];

    seeds
        .into_iter()
        .map(|seed| DutyCategory {
            id: Uuid::new_v4(),
            code: seed.code.to_string(),
            name: seed.name.to_string(),
            description: Some(seed.description.to_string()),
            icon_name: Some(seed.icon.to_string()),
            calculation_method: seed.method.code().to_string(),
            duty_rate: seed.rate,
            duty_unit: seed.unit.map(str::to_string),
            exemption_quantity: seed.exemption.map(|(qty, _)| qty),
            exemption_unit: seed.exemption.map(|(_, unit)| unit.to_string()),
            is_active: true,
            effective_from: None,
            effective_to: None,
            created_at: now,
            updated_at: now,
        })
        .collect()
}
