//! Address persistence operations on the `addresses` table.
//!
//! Deletes are soft: `deleted_at` is set and the row stays. The partial
//! unique index `addresses_one_primary` backs the one-primary-per-user rule,
//! so multi-row changes go through [`save_all`], which writes cleared rows
//! before the row that gains the flag. Removing an address writes the
//! address and the members cascaded with it in a single transaction
//! ([`save_removal`]).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::state::{AddressRecord, HouseholdMemberRecord};

/// Insert a new address.
pub async fn insert(pool: &PgPool, record: &AddressRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO addresses (id, user_id, street_line_1, street_line_2, city,
         state_province, postal_code, country_code, is_primary, created_at, updated_at, deleted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.street_line_1)
    .bind(&record.street_line_2)
    .bind(&record.city)
    .bind(&record.state_province)
    .bind(&record.postal_code)
    .bind(&record.country_code)
    .bind(record.is_primary)
    .bind(record.created_at)
    .bind(record.updated_at)
    .bind(record.deleted_at)
    .execute(pool)
    .await?;

    Ok(())
}

async fn update_in(tx: &mut Transaction<'_, Postgres>, record: &AddressRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE addresses SET street_line_1 = $2, street_line_2 = $3, city = $4,
         state_province = $5, postal_code = $6, country_code = $7, is_primary = $8,
         updated_at = $9, deleted_at = $10
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&record.street_line_1)
    .bind(&record.street_line_2)
    .bind(&record.city)
    .bind(&record.state_province)
    .bind(&record.postal_code)
    .bind(&record.country_code)
    .bind(record.is_primary)
    .bind(record.updated_at)
    .bind(record.deleted_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Write several changed addresses in one transaction.
pub async fn save_all(pool: &PgPool, records: &[AddressRecord]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    save_all_in(&mut tx, records).await?;
    tx.commit().await
}

/// Write a removed address, its promoted successor and the members
/// cascaded with it in one transaction.
pub async fn save_removal(
    pool: &PgPool,
    addresses: &[AddressRecord],
    members: &[HouseholdMemberRecord],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    super::household_members::save_all_in(&mut tx, members).await?;
    save_all_in(&mut tx, addresses).await?;
    tx.commit().await
}

async fn save_all_in(
    tx: &mut Transaction<'_, Postgres>,
    records: &[AddressRecord],
) -> Result<(), sqlx::Error> {
    let mut ordered: Vec<&AddressRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.is_primary && r.deleted_at.is_none());
    for record in ordered {
        update_in(tx, record).await?;
    }
    Ok(())
}

/// Load all addresses, including soft-deleted ones, on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<AddressRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AddressRow>(
        "SELECT id, user_id, street_line_1, street_line_2, city, state_province,
         postal_code, country_code, is_primary, created_at, updated_at, deleted_at
         FROM addresses ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AddressRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    user_id: Uuid,
    street_line_1: String,
    street_line_2: Option<String>,
    city: String,
    state_province: String,
    postal_code: String,
    country_code: String,
    is_primary: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl AddressRow {
    fn into_record(self) -> AddressRecord {
        AddressRecord {
            id: self.id,
            user_id: self.user_id,
            street_line_1: self.street_line_1,
            street_line_2: self.street_line_2,
            city: self.city,
            state_province: self.state_province,
            postal_code: self.postal_code,
            country_code: self.country_code,
            is_primary: self.is_primary,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}
