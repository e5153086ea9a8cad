//! User persistence operations on the `users` table.

use chrono::{DateTime, Utc};
use redlane_core::Role;
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::UserRecord;

/// Insert a new user.
pub async fn insert(pool: &PgPool, record: &UserRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email, first_name, last_name, phone, password_hash,
         role, email_verified_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(record.id)
    .bind(&record.email)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.phone)
    .bind(&record.password_hash)
    .bind(record.role.as_str())
    .bind(record.email_verified_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite every mutable column of a user.
pub async fn update(pool: &PgPool, record: &UserRecord) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET email = $2, first_name = $3, last_name = $4, phone = $5,
         password_hash = $6, role = $7, email_verified_at = $8, updated_at = $9
         WHERE id = $1",
    )
    .bind(record.id)
    .bind(&record.email)
    .bind(&record.first_name)
    .bind(&record.last_name)
    .bind(&record.phone)
    .bind(&record.password_hash)
    .bind(record.role.as_str())
    .bind(record.email_verified_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load all users on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<UserRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, first_name, last_name, phone, password_hash, role,
         email_verified_at, created_at, updated_at
         FROM users ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    password_hash: String,
    role: String,
    email_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_record(self) -> UserRecord {
        let role = Role::parse(&self.role).unwrap_or_else(|| {
            tracing::error!(
                user_id = %self.id,
                role = %self.role,
                "unknown role in database; treating account as a plain user"
            );
            Role::User
        });
        UserRecord {
            id: self.id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            password_hash: self.password_hash,
            role,
            email_verified_at: self.email_verified_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
