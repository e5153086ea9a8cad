//! # Currency Subcommand
//!
//! Converts amounts with the seed exchange rates.

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Subcommand};
use redlane_core::reference::{seed_currencies, seed_rates};
use redlane_core::{Currency, ExchangeRateResolver};
use serde_json::{json, Value};
use uuid::Uuid;

/// Arguments for the currency subcommand.
#[derive(Args, Debug)]
pub struct CurrencyArgs {
    #[command(subcommand)]
    pub command: CurrencyCommand,
}

#[derive(Subcommand, Debug)]
pub enum CurrencyCommand {
    /// List the latest rate for every seeded pair.
    Rates,
    /// Convert an amount between two currency codes.
    Convert {
        amount: f64,
        /// Source currency code, e.g. `USD`.
        from: String,
        /// Target currency code, e.g. `BMD`.
        to: String,
    },
}

/// Seed currencies plus a resolver loaded with the seed rates, effective today.
pub struct RateTable {
    currencies: Vec<Currency>,
    resolver: ExchangeRateResolver,
}

impl RateTable {
    pub fn seeded() -> anyhow::Result<Self> {
        let now = Utc::now();
        let currencies = seed_currencies();
        let resolver = ExchangeRateResolver::default();
        for rate in seed_rates(&currencies, now.date_naive(), now) {
            resolver.record_rate(rate)?;
        }
        Ok(Self {
            currencies,
            resolver,
        })
    }

    fn currency(&self, code: &str) -> anyhow::Result<&Currency> {
        let code = code.to_ascii_uppercase();
        self.currencies
            .iter()
            .find(|c| c.code == code)
            .with_context(|| format!("unknown currency '{code}'"))
    }

    fn code_of(&self, id: Uuid) -> &str {
        self.currencies
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.code.as_str())
            .unwrap_or("?")
    }

    /// Convert `amount` from `from` to `to`, rounded to two places.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> anyhow::Result<Value> {
        let source = self.currency(from)?;
        let target = self.currency(to)?;
        let (converted, quote) = self.resolver.convert_quoted(amount, source.id, target.id)?;
        Ok(json!({
            "amount": amount,
            "from": source.code,
            "to": target.code,
            "rate": quote.map(|q| q.rate),
            "converted": converted,
        }))
    }

    /// Every latest rate, ordered by pair codes.
    pub fn rates(&self) -> Value {
        let mut rows: Vec<Value> = self
            .resolver
            .all_latest_rates()
            .iter()
            .map(|r| {
                json!({
                    "from": self.code_of(r.from_currency_id),
                    "to": self.code_of(r.to_currency_id),
                    "rate": r.rate,
                    "effective_date": r.effective_date,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            (a["from"].as_str(), a["to"].as_str()).cmp(&(b["from"].as_str(), b["to"].as_str()))
        });
        Value::Array(rows)
    }
}

pub fn run(args: &CurrencyArgs) -> anyhow::Result<Value> {
    let table = RateTable::seeded()?;
    match &args.command {
        CurrencyCommand::Rates => Ok(table.rates()),
        CurrencyCommand::Convert { amount, from, to } => table.convert(*amount, from, to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_with_seed_rate() {
        let table = RateTable::seeded().unwrap();
        let out = table.convert(100.0, "usd", "JPY").unwrap();
        assert_eq!(out["converted"], 14950.0);
        assert_eq!(out["from"], "USD");
    }

    #[test]
    fn same_currency_is_identity() {
        let table = RateTable::seeded().unwrap();
        let out = table.convert(12.345, "EUR", "EUR").unwrap();
        assert_eq!(out["rate"], 1.0);
        assert_eq!(out["converted"], 12.35);
    }

    #[test]
    fn unknown_currency_is_an_error() {
        let table = RateTable::seeded().unwrap();
        let err = table.convert(1.0, "USD", "XYZ").unwrap_err();
        assert!(err.to_string().contains("XYZ"));
    }

    #[test]
    fn missing_pair_is_an_error() {
        let table = RateTable::seeded().unwrap();
        assert!(table.convert(1.0, "EUR", "JPY").is_err());
    }

    #[test]
    fn zero_amount_skips_rate_lookup() {
        let table = RateTable::seeded().unwrap();
        let out = table.convert(0.0, "EUR", "JPY").unwrap();
        assert_eq!(out["converted"], 0.0);
        assert!(out["rate"].is_null());
    }

    #[test]
    fn lists_every_seed_pair() {
        let table = RateTable::seeded().unwrap();
        assert_eq!(table.rates().as_array().unwrap().len(), 14);
    }
}
