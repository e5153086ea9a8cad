//! Duty category persistence on the `duty_categories` table.

use chrono::{DateTime, NaiveDate, Utc};
use redlane_core::DutyCategory;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a new category.
pub async fn insert(pool: &PgPool, record: &DutyCategory) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO duty_categories (id, code, name, description, icon_name,
         calculation_method, duty_rate, duty_unit, exemption_quantity, exemption_unit,
         is_active, effective_from, effective_to, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(record.id)
    .bind(&record.code)
    .bind(&record.name)
    .bind(&record.description)
    .bind(&record.icon_name)
    .bind(&record.calculation_method)
    .bind(record.duty_rate)
    .bind(&record.duty_unit)
    .bind(record.exemption_quantity)
    .bind(&record.exemption_unit)
    .bind(record.is_active)
    .bind(record.effective_from)
    .bind(record.effective_to)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite every mutable column of a category.
pub async fn update(pool: &PgPool, record: &DutyCategory) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE duty_categories SET code = $2, name = $3, description = $4, icon_name = $5,
         calculation_method = $6, duty_rate = $7, duty_unit = $8, exemption_quantity = $9,
         exemption_unit = $10, is_active = $11, effective_from = $12, effective_to = $13,
         updated_at = $14
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&record.code)
    .bind(&record.name)
    .bind(&record.description)
    .bind(&record.icon_name)
    .bind(&record.calculation_method)
    .bind(record.duty_rate)
    .bind(&record.duty_unit)
    .bind(record.exemption_quantity)
    .bind(&record.exemption_unit)
    .bind(record.is_active)
    .bind(record.effective_from)
    .bind(record.effective_to)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Hard-delete a category.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM duty_categories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all categories on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<DutyCategory>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, code, name, description, icon_name, calculation_method,
         duty_rate::float8 AS duty_rate, duty_unit,
         exemption_quantity::float8 AS exemption_quantity, exemption_unit,
         is_active, effective_from, effective_to, created_at, updated_at
         FROM duty_categories ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CategoryRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    code: String,
    name: String,
    description: Option<String>,
    icon_name: Option<String>,
    calculation_method: String,
    duty_rate: f64,
    duty_unit: Option<String>,
    exemption_quantity: Option<f64>,
    exemption_unit: Option<String>,
    is_active: bool,
    effective_from: Option<NaiveDate>,
    effective_to: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CategoryRow {
    fn into_record(self) -> DutyCategory {
        DutyCategory {
            id: self.id,
            code: self.code,
            name: self.name,
            description: self.description,
            icon_name: self.icon_name,
            calculation_method: self.calculation_method,
            duty_rate: self.duty_rate,
            duty_unit: self.duty_unit,
            exemption_quantity: self.exemption_quantity,
            exemption_unit: self.exemption_unit,
            is_active: self.is_active,
            effective_from: self.effective_from,
            effective_to: self.effective_to,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
