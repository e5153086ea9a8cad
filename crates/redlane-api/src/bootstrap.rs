//! # Startup Bootstrap
//!
//! Brings a fresh process to a serving state:
//!
//! 1. **Hydrate** every store from Postgres (when configured).
//! 2. **Seed reference data** (flags, currencies, exchange rates, duty
//!    categories) into any store still empty, writing the seeds through.
//! 3. **Ensure the admin account** named by `ADMIN_EMAIL`/`ADMIN_PASSWORD`.
//! 4. **Log a startup banner.**
//!
//! Seeding only fills empty stores, so restarts never duplicate rows or
//! overwrite operator changes.

use chrono::Utc;
use redlane_core::reference::{seed_currencies, seed_duty_categories, seed_rates};
use redlane_core::{Currency, DutyCategory, ExchangeRate, FlagRow, Role};

use crate::auth::hash_password;
use crate::state::{AppState, UserRecord};

/// Errors during startup.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Loading persisted state failed.
    #[error("hydration failed: {0}")]
    Hydration(String),

    /// Writing seed data to the database failed.
    #[error("failed to persist seed {what}: {source}")]
    Seed {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The admin account could not be created.
    #[error("admin account: {0}")]
    Admin(String),
}

/// Reference rows written by [`AppState::seed_reference_data`].
#[derive(Debug, Default)]
pub struct SeededData {
    pub flags: Vec<FlagRow>,
    pub currencies: Vec<Currency>,
    pub rates: Vec<ExchangeRate>,
    pub duty_categories: Vec<DutyCategory>,
}

impl SeededData {
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
            && self.currencies.is_empty()
            && self.rates.is_empty()
            && self.duty_categories.is_empty()
    }
}

impl AppState {
    /// Seed reference data into whichever in-memory stores are empty.
    /// Returns what was seeded so callers can persist it.
    pub fn seed_reference_data(&self) -> SeededData {
        let now = Utc::now();
        let mut seeded = SeededData::default();

        if self.flags.store().is_empty() {
            seeded.flags = self.flags.seed_defaults();
        }

        if self.currencies.is_empty() {
            seeded.currencies = seed_currencies();
            for currency in &seeded.currencies {
                self.currencies.insert(currency.id, currency.clone());
            }
        }

        if self.exchange.book().is_empty() {
            let currencies = self.currencies.list();
            for rate in seed_rates(&currencies, now.date_naive(), now) {
                match self.exchange.record_rate(rate.clone()) {
                    Ok(()) => seeded.rates.push(rate),
                    Err(e) => tracing::warn!(error = %e, "skipping seed exchange rate"),
                }
            }
        }

        if self.duty_categories.is_empty() {
            seeded.duty_categories = seed_duty_categories(now);
            for category in &seeded.duty_categories {
                self.duty_categories.insert(category.id, category.clone());
            }
        }

        seeded
    }

    async fn persist_seeds(&self, seeded: &SeededData) -> Result<(), BootstrapError> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };
        for row in &seeded.flags {
            crate::db::feature_flags::upsert(pool, row)
                .await
                .map_err(|source| BootstrapError::Seed { what: "feature flags", source })?;
        }
        for currency in &seeded.currencies {
            crate::db::currencies::insert(pool, currency)
                .await
                .map_err(|source| BootstrapError::Seed { what: "currencies", source })?;
        }
        for rate in &seeded.rates {
            crate::db::currencies::insert_rate(pool, rate)
                .await
                .map_err(|source| BootstrapError::Seed { what: "exchange rates", source })?;
        }
        for category in &seeded.duty_categories {
            crate::db::duty_categories::insert(pool, category)
                .await
                .map_err(|source| BootstrapError::Seed { what: "duty categories", source })?;
        }
        Ok(())
    }

    /// Create the configured admin account if it does not exist yet.
    /// Returns whether an account was created.
    pub async fn ensure_admin(&self) -> Result<bool, BootstrapError> {
        let (Some(email), Some(password)) = (
            self.config.admin_email.as_deref(),
            self.config.admin_password.as_deref(),
        ) else {
            return Ok(false);
        };
        if self.user_by_email(email).is_some() {
            return Ok(false);
        }

        let hash = hash_password(password).map_err(|e| BootstrapError::Admin(e.to_string()))?;
        let mut admin = UserRecord::new("Red Lane", "Administrator", email, &hash, Role::Admin);
        admin.email_verified_at = Some(admin.created_at);
        self.users.insert(admin.id, admin.clone());

        if let Some(pool) = &self.db_pool {
            crate::db::users::insert(pool, &admin)
                .await
                .map_err(|e| BootstrapError::Admin(format!("persist failed: {e}")))?;
        }
        tracing::info!(user_id = %admin.id, email = %admin.email, "admin account created");
        Ok(true)
    }
}

/// Run the full startup sequence against `state`.
pub async fn bootstrap(state: &AppState) -> Result<(), BootstrapError> {
    state
        .hydrate_from_db()
        .await
        .map_err(BootstrapError::Hydration)?;

    let seeded = state.seed_reference_data();
    if !seeded.is_empty() {
        state.persist_seeds(&seeded).await?;
        tracing::info!(
            flags = seeded.flags.len(),
            currencies = seeded.currencies.len(),
            exchange_rates = seeded.rates.len(),
            duty_categories = seeded.duty_categories.len(),
            "seeded reference data"
        );
    }

    state.ensure_admin().await?;
    log_banner(state);
    Ok(())
}

fn log_banner(state: &AppState) {
    tracing::info!(
        port = state.config.port,
        persistence = if state.db_pool.is_some() { "postgres" } else { "memory" },
        users = state.users.len(),
        duty_categories = state.duty_categories.len(),
        currencies = state.currencies.len(),
        "Red Lane API ready"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::state::AppConfig;

    #[test]
    fn seeding_fills_empty_stores_once() {
        let state = AppState::with_config(AppConfig::default(), None);
        let first = state.seed_reference_data();
        assert_eq!(first.flags.len(), 5);
        assert_eq!(first.currencies.len(), 6);
        assert_eq!(first.rates.len(), 14);
        assert_eq!(first.duty_categories.len(), 5);

        let second = state.seed_reference_data();
        assert!(second.is_empty());
        assert_eq!(state.currencies.len(), 6);
    }

    #[test]
    fn seeding_keeps_operator_flag_changes() {
        let state = AppState::with_config(AppConfig::default(), None);
        state.flags.global_enable("ocr_processing").unwrap();
        let seeded = state.seed_reference_data();
        assert!(seeded.flags.is_empty());
        assert!(state.flags.is_active("ocr_processing", None).unwrap());
    }

    #[tokio::test]
    async fn bootstrap_creates_verified_admin() {
        let config = AppConfig {
            admin_email: Some("admin@redlane.test".into()),
            admin_password: Some("s3cret-admin".into()),
            ..AppConfig::default()
        };
        let state = AppState::with_config(config, None);
        bootstrap(&state).await.unwrap();

        let admin = state.user_by_email("admin@redlane.test").unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_verified());
        assert!(verify_password("s3cret-admin", &admin.password_hash));

        assert!(!state.ensure_admin().await.unwrap());
        assert_eq!(state.users.len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_without_admin_config_creates_no_users() {
        let state = AppState::with_config(AppConfig::default(), None);
        bootstrap(&state).await.unwrap();
        assert!(state.users.is_empty());
        assert_eq!(state.duty_categories.len(), 5);
    }
}
