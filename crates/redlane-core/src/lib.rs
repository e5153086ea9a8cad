#![deny(missing_docs)]

//! # redlane-core: Foundational Types for Red Lane
//!
//! Domain logic for the Red Lane customs/travel-declaration backend. This
//! crate performs no I/O: the API layer owns persistence and transport and
//! calls into these types for every decision that carries business rules.
//!
//! ## Modules
//!
//! - [`flags`]: feature-flag catalogue, flag store, and the ordered
//!   override chain (user override → global → static default).
//! - [`duty`]: duty categories and the calculation-method dispatch.
//! - [`exchange`]: currencies, append-only exchange rates, and the cached
//!   latest-rate resolver.
//! - [`primary`]: the "exactly one primary per owning scope" invariant
//!   shared by addresses and household members.
//! - [`access`]: roles and the static role → permission table.
//! - [`reference`]: static lookup tables and seed data.
//! - [`validation`]: field-format checks shared by request validators.
//! - [`money`]: half-up rounding for monetary amounts.
//!
//! ## Crate Policy
//!
//! - Structured errors with `thiserror`, no `.unwrap()` outside tests.
//! - Stores reached through traits ([`flags::FlagStore`],
//!   [`exchange::RateLookup`]) so the API can layer persistence on top.

pub mod access;
pub mod duty;
pub mod error;
pub mod exchange;
pub mod flags;
pub mod household;
pub mod money;
pub mod primary;
pub mod reference;
pub mod validation;

pub use access::{Permission, Role};
pub use duty::{CalculationMethod, DutyCalculation, DutyCategory, DutyRule};
pub use error::{
    CalculationError, ExchangeError, FlagError, PrimaryError, RedlaneError, ValidationError,
};
pub use exchange::{
    Currency, ExchangeRate, ExchangeRateResolver, RateBook, RateLookup, RateQuote, RateSource,
};
pub use flags::{
    FlagDefinition, FlagResolver, FlagRow, FlagScope, FlagStats, FlagStore, MemoryFlagStore,
    ResolvedFlag,
};
pub use money::round2;
pub use primary::PrimaryScoped;
