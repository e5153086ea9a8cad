//! # Exchange Rates
//!
//! Currencies, the append-only exchange-rate book, and the resolver that
//! answers "what is the rate from X to Y today".
//!
//! The effective rate for an ordered pair is the row with the greatest
//! `effective_date` that is not in the future. Same-currency pairs resolve
//! to an implicit 1:1 rate without touching the book.
//!
//! Resolved rates are cached per ordered pair for 24 hours. The cache is
//! advisory: recording a new rate for a pair evicts that pair, and a miss
//! always falls through to the book.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use moka::sync::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::money::round2;

/// How long a resolved rate stays cached.
pub const RATE_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const RATE_CACHE_CAPACITY: u64 = 10_000;

/// Upper bound for a stored rate.
pub const MAX_RATE: f64 = 9999.999999;

/// A currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Currency {
    /// Currency identifier.
    pub id: Uuid,
    /// ISO 4217 code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Display symbol.
    pub symbol: String,
    /// Whether the currency is offered to clients.
    pub is_active: bool,
}

/// Where a rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Entered by an operator.
    Manual,
    /// Pulled from an external provider.
    ApiFetched,
}

impl RateSource {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::ApiFetched => "api_fetched",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "api_fetched" => Some(Self::ApiFetched),
            _ => None,
        }
    }
}

/// A recorded exchange rate. Rows are never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ExchangeRate {
    /// Rate identifier.
    pub id: Uuid,
    /// Source currency.
    pub from_currency_id: Uuid,
    /// Target currency.
    pub to_currency_id: Uuid,
    /// Units of target per unit of source.
    pub rate: f64,
    /// First day the rate applies.
    pub effective_date: NaiveDate,
    /// Origin of the rate.
    pub source: RateSource,
    /// Recording time.
    pub created_at: DateTime<Utc>,
}

/// A resolved rate for an ordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RateQuote {
    /// Source currency.
    pub from_currency_id: Uuid,
    /// Target currency.
    pub to_currency_id: Uuid,
    /// Units of target per unit of source.
    pub rate: f64,
    /// Effective date of the underlying row; `None` for the implicit 1:1 rate.
    pub effective_date: Option<NaiveDate>,
}

impl RateQuote {
    fn identity(currency: Uuid) -> Self {
        Self {
            from_currency_id: currency,
            to_currency_id: currency,
            rate: 1.0,
            effective_date: None,
        }
    }
}

impl From<&ExchangeRate> for RateQuote {
    fn from(rate: &ExchangeRate) -> Self {
        Self {
            from_currency_id: rate.from_currency_id,
            to_currency_id: rate.to_currency_id,
            rate: rate.rate,
            effective_date: Some(rate.effective_date),
        }
    }
}

/// Read access to recorded rates.
pub trait RateLookup: Send + Sync {
    /// The row for `(from, to)` with the greatest effective date `<= on`.
    fn latest_on(&self, from: Uuid, to: Uuid, on: NaiveDate) -> Option<ExchangeRate>;

    /// Every ordered pair with at least one row.
    fn pairs(&self) -> Vec<(Uuid, Uuid)>;
}

/// In-memory, append-only rate book.
#[derive(Debug, Default)]
pub struct RateBook {
    rates: RwLock<Vec<ExchangeRate>>,
}

impl RateBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rate. Same-currency pairs are rejected.
    pub fn insert(&self, rate: ExchangeRate) -> Result<(), ExchangeError> {
        if rate.from_currency_id == rate.to_currency_id {
            return Err(ExchangeError::SameCurrencyPair(rate.from_currency_id));
        }
        self.rates.write().push(rate);
        Ok(())
    }

    /// Every recorded rate, in recording order.
    pub fn all(&self) -> Vec<ExchangeRate> {
        self.rates.read().clone()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.rates.read().is_empty()
    }
}

impl RateLookup for RateBook {
    fn latest_on(&self, from: Uuid, to: Uuid, on: NaiveDate) -> Option<ExchangeRate> {
        self.rates
            .read()
            .iter()
            .filter(|r| r.from_currency_id == from && r.to_currency_id == to)
            .filter(|r| r.effective_date <= on)
            .max_by(|a, b| {
                a.effective_date
                    .cmp(&b.effective_date)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .cloned()
    }

    fn pairs(&self) -> Vec<(Uuid, Uuid)> {
        let mut pairs: Vec<(Uuid, Uuid)> = Vec::new();
        for rate in self.rates.read().iter() {
            let pair = (rate.from_currency_id, rate.to_currency_id);
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs
    }
}

/// Cached latest-rate resolution over a [`RateLookup`].
pub struct ExchangeRateResolver<L = RateBook> {
    book: L,
    cache: Cache<(Uuid, Uuid), RateQuote>,
}

impl<L: RateLookup> ExchangeRateResolver<L> {
    /// Build a resolver with the standard 24-hour cache.
    pub fn new(book: L) -> Self {
        Self::with_ttl(book, RATE_CACHE_TTL)
    }

    /// Build a resolver with a custom cache lifetime.
    pub fn with_ttl(book: L, ttl: Duration) -> Self {
        Self {
            book,
            cache: Cache::builder()
                .max_capacity(RATE_CACHE_CAPACITY)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// The underlying book.
    pub fn book(&self) -> &L {
        &self.book
    }

    /// The effective rate from `from` to `to` as of today.
    pub fn get_latest_rate(&self, from: Uuid, to: Uuid) -> Result<RateQuote, ExchangeError> {
        if from == to {
            return Ok(RateQuote::identity(from));
        }
        if let Some(quote) = self.cache.get(&(from, to)) {
            return Ok(quote);
        }
        let today = Utc::now().date_naive();
        let rate = self
            .book
            .latest_on(from, to, today)
            .ok_or(ExchangeError::RateNotFound { from, to })?;
        let quote = RateQuote::from(&rate);
        self.cache.insert((from, to), quote);
        tracing::debug!(%from, %to, rate = quote.rate, "exchange rate cached");
        Ok(quote)
    }

    /// Convert `amount` from one currency to another, rounded to 2 places.
    pub fn convert(&self, amount: f64, from: Uuid, to: Uuid) -> Result<f64, ExchangeError> {
        self.convert_quoted(amount, from, to).map(|(converted, _)| converted)
    }

    /// Like [`convert`](Self::convert), also returning the quote applied.
    /// The quote is `None` when no lookup was needed (`amount <= 0`).
    pub fn convert_quoted(
        &self,
        amount: f64,
        from: Uuid,
        to: Uuid,
    ) -> Result<(f64, Option<RateQuote>), ExchangeError> {
        if amount <= 0.0 {
            return Ok((0.0, None));
        }
        if from == to {
            return Ok((round2(amount), Some(RateQuote::identity(from))));
        }
        let quote = self.get_latest_rate(from, to)?;
        Ok((round2(amount * quote.rate), Some(quote)))
    }

    /// The effective rate row for every pair that has one today.
    pub fn all_latest_rates(&self) -> Vec<ExchangeRate> {
        let today = Utc::now().date_naive();
        self.book
            .pairs()
            .into_iter()
            .filter_map(|(from, to)| self.book.latest_on(from, to, today))
            .collect()
    }

    /// Drop the cached rate for one ordered pair.
    pub fn invalidate(&self, from: Uuid, to: Uuid) {
        self.cache.invalidate(&(from, to));
    }
}

impl ExchangeRateResolver<RateBook> {
    /// Append a rate to the book and evict its pair from the cache.
    pub fn record_rate(&self, rate: ExchangeRate) -> Result<(), ExchangeError> {
        let pair = (rate.from_currency_id, rate.to_currency_id);
        self.book.insert(rate)?;
        self.invalidate(pair.0, pair.1);
        Ok(())
    }
}

impl Default for ExchangeRateResolver<RateBook> {
    fn default() -> Self {
        Self::new(RateBook::new())
    }
}

impl<L> std::fmt::Debug for ExchangeRateResolver<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRateResolver")
            .field("cached_pairs", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn rate(from: Uuid, to: Uuid, value: f64, effective_date: NaiveDate) -> ExchangeRate {
        ExchangeRate {
            id: Uuid::new_v4(),
            from_currency_id: from,
            to_currency_id: to,
            rate: value,
            effective_date,
            source: RateSource::Manual,
            created_at: Utc::now(),
        }
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn converts_with_latest_rate() {
        let (usd, jpy) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        fx.record_rate(rate(usd, jpy, 149.5, today())).unwrap();
        assert_eq!(fx.convert(100.0, usd, jpy).unwrap(), 14950.0);
    }

    #[test]
    fn same_currency_is_identity() {
        let usd = Uuid::new_v4();
        let fx = ExchangeRateResolver::default();
        assert_eq!(fx.convert(12.345, usd, usd).unwrap(), 12.35);
        assert_eq!(fx.get_latest_rate(usd, usd).unwrap().rate, 1.0);
    }

    #[test]
    fn non_positive_amount_is_zero() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        // No rate exists, yet zero converts without a lookup.
        assert_eq!(fx.convert(0.0, a, b).unwrap(), 0.0);
        assert_eq!(fx.convert(-3.0, a, b).unwrap(), 0.0);
    }

    #[test]
    fn quoted_conversion_reports_rate_used() {
        let (usd, jpy) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        fx.record_rate(rate(usd, jpy, 149.5, today())).unwrap();
        let (converted, quote) = fx.convert_quoted(2.0, usd, jpy).unwrap();
        assert_eq!(converted, 299.0);
        assert_eq!(quote.map(|q| q.rate), Some(149.5));
        assert_eq!(fx.convert_quoted(0.0, jpy, usd).unwrap(), (0.0, None));
    }

    #[test]
    fn missing_pair_is_not_found() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        fx.record_rate(rate(b, a, 2.0, today())).unwrap();
        assert_eq!(
            fx.convert(10.0, a, b),
            Err(ExchangeError::RateNotFound { from: a, to: b })
        );
    }

    #[test]
    fn future_rates_are_ignored() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        let yesterday = today().checked_sub_days(Days::new(1)).unwrap();
        let tomorrow = today().checked_add_days(Days::new(1)).unwrap();
        fx.record_rate(rate(a, b, 1.5, yesterday)).unwrap();
        fx.record_rate(rate(a, b, 9.0, tomorrow)).unwrap();
        assert_eq!(fx.get_latest_rate(a, b).unwrap().rate, 1.5);
    }

    #[test]
    fn newest_effective_date_wins() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        let last_week = today().checked_sub_days(Days::new(7)).unwrap();
        fx.record_rate(rate(a, b, 1.1, today())).unwrap();
        fx.record_rate(rate(a, b, 1.0, last_week)).unwrap();
        assert_eq!(fx.get_latest_rate(a, b).unwrap().rate, 1.1);
    }

    #[test]
    fn recording_invalidates_cached_pair() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        let yesterday = today().checked_sub_days(Days::new(1)).unwrap();
        fx.record_rate(rate(a, b, 2.0, yesterday)).unwrap();
        assert_eq!(fx.get_latest_rate(a, b).unwrap().rate, 2.0);
        fx.record_rate(rate(a, b, 3.0, today())).unwrap();
        assert_eq!(fx.get_latest_rate(a, b).unwrap().rate, 3.0);
    }

    #[test]
    fn same_currency_row_rejected() {
        let a = Uuid::new_v4();
        let fx = ExchangeRateResolver::default();
        assert_eq!(
            fx.record_rate(rate(a, a, 1.0, today())),
            Err(ExchangeError::SameCurrencyPair(a))
        );
    }

    #[test]
    fn all_latest_rates_one_per_pair() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let fx = ExchangeRateResolver::default();
        let last_week = today().checked_sub_days(Days::new(7)).unwrap();
        fx.record_rate(rate(a, b, 1.0, last_week)).unwrap();
        fx.record_rate(rate(a, b, 1.2, today())).unwrap();
        fx.record_rate(rate(b, c, 0.5, today())).unwrap();
        let latest = fx.all_latest_rates();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().any(|r| r.from_currency_id == a && r.rate == 1.2));
    }
}
