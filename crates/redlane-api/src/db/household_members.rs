//! Household member persistence operations on the `household_members` table.
//!
//! Same soft-delete and ordered multi-row write rules as
//! [`super::addresses`], keyed on the primary declarant.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::state::HouseholdMemberRecord;

/// Insert a new household member.
pub async fn insert(pool: &PgPool, record: &HouseholdMemberRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO household_members (id, address_id, first_name, last_name, date_of_birth,
         relationship_type_id, is_primary_declarant, created_at, updated_at, deleted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(record.id)
    .bind(record.address_id)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(record.date_of_birth)
    .bind(record.relationship_type_id)
    .bind(record.is_primary_declarant)
    .bind(record.created_at)
    .bind(record.updated_at)
    .bind(record.deleted_at)
    .execute(pool)
    .await?;

    Ok(())
}

async fn update_in(
    tx: &mut Transaction<'_, Postgres>,
    record: &HouseholdMemberRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE household_members SET address_id = $2, first_name = $3, last_name = $4,
         date_of_birth = $5, relationship_type_id = $6, is_primary_declarant = $7,
         updated_at = $8, deleted_at = $9
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(record.address_id)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(record.date_of_birth)
    .bind(record.relationship_type_id)
    .bind(record.is_primary_declarant)
    .bind(record.updated_at)
    .bind(record.deleted_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Write several changed members in one transaction, cleared rows first.
pub async fn save_all(pool: &PgPool, records: &[HouseholdMemberRecord]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    save_all_in(&mut tx, records).await?;
    tx.commit().await
}

/// [`save_all`] inside a caller's transaction.
pub(super) async fn save_all_in(
    tx: &mut Transaction<'_, Postgres>,
    records: &[HouseholdMemberRecord],
) -> Result<(), sqlx::Error> {
    let mut ordered: Vec<&HouseholdMemberRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.is_primary_declarant && r.deleted_at.is_none());
    for record in ordered {
        update_in(tx, record).await?;
    }
    Ok(())
}

/// Load all members, including soft-deleted ones, on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<HouseholdMemberRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MemberRow>(
        "SELECT id, address_id, first_name, last_name, date_of_birth, relationship_type_id,
         is_primary_declarant, created_at, updated_at, deleted_at
         FROM household_members ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MemberRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    id: Uuid,
    address_id: Uuid,
    first_name: String,
    last_name: String,
    date_of_birth: NaiveDate,
    relationship_type_id: i32,
    is_primary_declarant: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl MemberRow {
    fn into_record(self) -> HouseholdMemberRecord {
        HouseholdMemberRecord {
            id: self.id,
            address_id: self.address_id,
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth: self.date_of_birth,
            relationship_type_id: self.relationship_type_id,
            is_primary_declarant: self.is_primary_declarant,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }
}
