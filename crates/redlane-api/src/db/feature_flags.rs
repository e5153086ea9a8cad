//! Feature flag persistence on the `feature_flags` table.
//!
//! One row per `(name, scope)`; writes are upserts.

use redlane_core::FlagRow;
use sqlx::PgPool;

/// Insert or overwrite one flag row.
pub async fn upsert(pool: &PgPool, row: &FlagRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO feature_flags (name, scope, value, updated_at) VALUES ($1, $2, $3, NOW())
         ON CONFLICT (name, scope) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
    )
    .bind(&row.name)
    .bind(&row.scope)
    .bind(row.value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load every flag row on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<FlagRow>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String, bool)>(
        "SELECT name, scope, value FROM feature_flags ORDER BY name, scope",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(name, scope, value)| FlagRow { name, scope, value })
        .collect())
}
