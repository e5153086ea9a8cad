//! # redlane-cli: Red Lane Command-Line Interface
//!
//! Offline tooling over the built-in reference data. Useful for checking
//! what a traveller would owe, or how a conversion would come out, without
//! running the API.
//!
//! ## Subcommands
//!
//! - `duty`: list seed duty categories, calculate duty for a quantity
//! - `currency`: list seed rates, convert an amount
//! - `flags`: list the flag catalogue with resolved defaults
//!
//! ## Crate Policy
//!
//! - Argument parsing lives here; every rule is delegated to `redlane-core`.
//! - Handlers return a `serde_json::Value` so output stays machine-readable.

pub mod currency;
pub mod duty;
pub mod flags;

/// Render a handler result for the terminal.
pub fn render(value: &serde_json::Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
