//! Access-token, password-reset and email-verification persistence.
//!
//! Only SHA-256 digests are stored; plaintext tokens never reach the
//! database.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{AccessToken, EmailVerification, PasswordReset};

/// Record an issued token.
pub async fn insert(pool: &PgPool, token: &AccessToken) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO access_tokens (digest, user_id, created_at) VALUES ($1, $2, $3)")
        .bind(&token.digest)
        .bind(token.user_id)
        .bind(token.created_at)
        .execute(pool)
        .await?;

    Ok(())
}

/// Revoke one token.
pub async fn delete(pool: &PgPool, digest: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM access_tokens WHERE digest = $1")
        .bind(digest)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Revoke every token of a user.
pub async fn delete_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM access_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Load all issued tokens on startup.
pub async fn load_all(pool: &PgPool) -> Result<Vec<AccessToken>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TokenRow>(
        "SELECT digest, user_id, created_at FROM access_tokens",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AccessToken {
            digest: row.digest,
            user_id: row.user_id,
            created_at: row.created_at,
        })
        .collect())
}

/// Store a pending reset, replacing any earlier one for the same email.
pub async fn upsert_reset(pool: &PgPool, reset: &PasswordReset) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO password_resets (email, token_digest, expires_at) VALUES ($1, $2, $3)
         ON CONFLICT (email) DO UPDATE SET token_digest = EXCLUDED.token_digest,
         expires_at = EXCLUDED.expires_at",
    )
    .bind(&reset.email)
    .bind(&reset.token_digest)
    .bind(reset.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_reset(pool: &PgPool, email: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM password_resets WHERE email = $1")
        .bind(email)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load unexpired resets on startup.
pub async fn load_resets(pool: &PgPool) -> Result<Vec<PasswordReset>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResetRow>(
        "SELECT email, token_digest, expires_at FROM password_resets WHERE expires_at > NOW()",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PasswordReset {
            email: row.email,
            token_digest: row.token_digest,
            expires_at: row.expires_at,
        })
        .collect())
}

/// Store a pending verification, replacing any earlier one for the user.
pub async fn upsert_verification(
    pool: &PgPool,
    verification: &EmailVerification,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO email_verifications (user_id, token_digest, expires_at) VALUES ($1, $2, $3)
         ON CONFLICT (user_id) DO UPDATE SET token_digest = EXCLUDED.token_digest,
         expires_at = EXCLUDED.expires_at",
    )
    .bind(verification.user_id)
    .bind(&verification.token_digest)
    .bind(verification.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_verification(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM email_verifications WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load unexpired verifications on startup.
pub async fn load_verifications(pool: &PgPool) -> Result<Vec<EmailVerification>, sqlx::Error> {
    let rows = sqlx::query_as::<_, VerificationRow>(
        "SELECT user_id, token_digest, expires_at FROM email_verifications WHERE expires_at > NOW()",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| EmailVerification {
            user_id: row.user_id,
            token_digest: row.token_digest,
            expires_at: row.expires_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    digest: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ResetRow {
    email: String,
    token_digest: String,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    user_id: Uuid,
    token_digest: String,
    expires_at: DateTime<Utc>,
}
