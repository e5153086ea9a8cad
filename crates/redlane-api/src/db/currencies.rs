//! Currency and exchange-rate persistence.
//!
//! Exchange rates are append-only: there is no update or delete.

use chrono::{DateTime, NaiveDate, Utc};
use redlane_core::{Currency, ExchangeRate, RateSource};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a new currency.
pub async fn insert(pool: &PgPool, currency: &Currency) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO currencies (id, code, name, symbol, is_active) VALUES ($1, $2, $3, $4, $5)")
        .bind(currency.id)
        .bind(&currency.code)
        .bind(&currency.name)
        .bind(&currency.symbol)
        .bind(currency.is_active)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load all currencies on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Currency>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CurrencyRow>(
        "SELECT id, code, name, symbol, is_active FROM currencies ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Currency {
            id: row.id,
            code: row.code,
            name: row.name,
            symbol: row.symbol,
            is_active: row.is_active,
        })
        .collect())
}

/// Append an exchange rate.
pub async fn insert_rate(pool: &PgPool, rate: &ExchangeRate) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO exchange_rates (id, from_currency_id, to_currency_id, rate,
         effective_date, source, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(rate.id)
    .bind(rate.from_currency_id)
    .bind(rate.to_currency_id)
    .bind(rate.rate)
    .bind(rate.effective_date)
    .bind(rate.source.as_str())
    .bind(rate.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load every recorded rate on startup, oldest first.
pub async fn load_rates(pool: &PgPool) -> Result<Vec<ExchangeRate>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RateRow>(
        "SELECT id, from_currency_id, to_currency_id, rate::float8 AS rate,
         effective_date, source, created_at
         FROM exchange_rates ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(RateRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct CurrencyRow {
    id: Uuid,
    code: String,
    name: String,
    symbol: String,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct RateRow {
    id: Uuid,
    from_currency_id: Uuid,
    to_currency_id: Uuid,
    rate: f64,
    effective_date: NaiveDate,
    source: String,
    created_at: DateTime<Utc>,
}

impl RateRow {
    fn into_record(self) -> ExchangeRate {
        let source = RateSource::parse(&self.source).unwrap_or_else(|| {
            tracing::error!(
                rate_id = %self.id,
                source = %self.source,
                "unknown exchange rate source in database; treating as manual"
            );
            RateSource::Manual
        });
        ExchangeRate {
            id: self.id,
            from_currency_id: self.from_currency_id,
            to_currency_id: self.to_currency_id,
            rate: self.rate,
            effective_date: self.effective_date,
            source,
            created_at: self.created_at,
        }
    }
}
