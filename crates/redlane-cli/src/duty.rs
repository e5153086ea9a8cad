//! # Duty Subcommand
//!
//! Lists the seed duty categories and calculates duty against them.

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use redlane_core::reference::seed_duty_categories;
use redlane_core::{DutyCalculation, DutyCategory};
use serde_json::{json, Value};

/// Arguments for the duty subcommand.
#[derive(Args, Debug)]
pub struct DutyArgs {
    #[command(subcommand)]
    pub command: DutyCommand,
}

#[derive(Subcommand, Debug)]
pub enum DutyCommand {
    /// List the seed duty categories.
    List,
    /// Calculate duty owed for a quantity (or value) under one category.
    Calc {
        /// Category code, e.g. `alcohol`.
        code: String,
        /// Quantity in the category's unit, or the declared value for
        /// percentage categories.
        quantity: f64,
        /// Evaluate the effective window on this date instead of today.
        #[arg(long)]
        on: Option<NaiveDate>,
    },
}

pub fn run(args: &DutyArgs) -> anyhow::Result<Value> {
    let categories = seed_duty_categories(Utc::now());
    match &args.command {
        DutyCommand::List => Ok(list(&categories)),
        DutyCommand::Calc { code, quantity, on } => {
            let on = on.unwrap_or_else(|| Utc::now().date_naive());
            let result = calculate(&categories, code, *quantity, on)?;
            Ok(serde_json::to_value(result)?)
        }
    }
}

fn list(categories: &[DutyCategory]) -> Value {
    let mut rows: Vec<Value> = categories
        .iter()
        .map(|c| {
            json!({
                "code": c.code,
                "name": c.name,
                "method": c.calculation_method,
                "rate": c.duty_rate,
                "unit": c.duty_unit,
                "exemption": c.exemption_quantity,
            })
        })
        .collect();
    rows.sort_by(|a, b| a["code"].as_str().cmp(&b["code"].as_str()));
    Value::Array(rows)
}

/// Duty owed for `quantity` under the category named `code` on `on`.
pub fn calculate(
    categories: &[DutyCategory],
    code: &str,
    quantity: f64,
    on: NaiveDate,
) -> anyhow::Result<DutyCalculation> {
    let category = categories
        .iter()
        .find(|c| c.code == code)
        .with_context(|| format!("unknown duty category '{code}'"))?;
    if !category.is_active {
        bail!("duty category '{code}' is inactive");
    }
    if !category.is_effective_on(on) {
        bail!("duty category '{code}' is not effective on {on}");
    }
    let duty = category.calculate(quantity)?;
    tracing::debug!(code, quantity, duty, "duty calculated");
    Ok(DutyCalculation {
        category: category.code.clone(),
        method: category.calculation_method.clone(),
        quantity,
        duty,
    })
}
