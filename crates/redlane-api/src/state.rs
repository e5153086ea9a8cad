//! # Application State
//!
//! Shared state for the Axum application: in-memory stores for every
//! resource, the flag and exchange-rate resolvers, auth token stores, the
//! login throttle, the optional database pool, and configuration.
//!
//! The in-memory stores are the read path. When a database pool is
//! configured, handlers write through to Postgres after mutating memory and
//! [`AppState::hydrate_from_db`] reloads everything on startup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use redlane_core::primary::PrimaryScoped;
use redlane_core::{Currency, DutyCategory, ExchangeRateResolver, FlagResolver, Role};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{EmailVerifications, PasswordResets, TokenStore};
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

// -- Store ---------------------------------------------------------------------

/// Thread-safe in-memory store keyed by UUID.
///
/// Locks are never held across `.await`: every method takes the lock,
/// finishes, and releases before returning.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Records matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.data
            .read()
            .values()
            .filter(|v| predicate(v))
            .cloned()
            .collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        if let Some(entry) = guard.get_mut(id) {
            f(entry);
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Atomically read-validate-update a record.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Run `f` over the whole map under one write lock. Used for changes that
    /// touch several records at once and must not interleave with other
    /// writers.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<Uuid, T>) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Records -------------------------------------------------------------------

/// A registered account.
#[derive(Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub role: Role,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// A fresh, unverified account.
    pub fn new(
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone: None,
            password_hash: password_hash.to_string(),
            role,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password_hash", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            role: user.role,
            email_verified_at: user.email_verified_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// A postal address owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub street_line_1: String,
    pub street_line_2: Option<String>,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    /// ISO-3166 alpha-2, uppercase.
    pub country_code: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PrimaryScoped for AddressRecord {
    fn id(&self) -> Uuid {
        self.id
    }
    fn scope_id(&self) -> Uuid {
        self.user_id
    }
    fn is_primary(&self) -> bool {
        self.is_primary
    }
    fn set_primary_flag(&mut self, primary: bool) {
        self.is_primary = primary;
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// A member of the household living at one address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HouseholdMemberRecord {
    pub id: Uuid,
    pub address_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub relationship_type_id: i32,
    pub is_primary_declarant: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PrimaryScoped for HouseholdMemberRecord {
    fn id(&self) -> Uuid {
        self.id
    }
    fn scope_id(&self) -> Uuid {
        self.address_id
    }
    fn is_primary(&self) -> bool {
        self.is_primary_declarant
    }
    fn set_primary_flag(&mut self, primary: bool) {
        self.is_primary_declarant = primary;
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// -- Configuration -------------------------------------------------------------

/// Application configuration, read from flags with environment fallbacks.
///
/// Custom `Debug` redacts the admin password and database URL.
#[derive(Clone, clap::Parser)]
#[command(name = "redlane-api", version, about = "Red Lane API server")]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Postgres connection string. In-memory only when absent.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Email of the admin account created at startup.
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// Password of the admin account created at startup.
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Login attempts allowed per client per window.
    #[arg(long, env = "LOGIN_MAX_ATTEMPTS", default_value_t = 5)]
    pub login_max_attempts: u64,

    /// Length of the login throttle window in seconds.
    #[arg(long, env = "LOGIN_WINDOW_SECS", default_value_t = 60)]
    pub login_window_secs: u64,

    /// Trust `X-Forwarded-For` for the client IP. Enable only behind a
    /// reverse proxy that overwrites the header.
    #[arg(long, env = "TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Public base URL, used in verification and reset links.
    #[arg(long, env = "APP_URL", default_value = "http://localhost:8080")]
    pub app_url: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_email", &self.admin_email)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("login_max_attempts", &self.login_max_attempts)
            .field("login_window_secs", &self.login_window_secs)
            .field("trust_proxy", &self.trust_proxy)
            .field("log_json", &self.log_json)
            .field("app_url", &self.app_url)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: None,
            admin_email: None,
            admin_password: None,
            login_max_attempts: 5,
            login_window_secs: 60,
            trust_proxy: false,
            log_json: false,
            app_url: "http://localhost:8080".to_string(),
        }
    }
}

// -- AppState ------------------------------------------------------------------

/// Shared application state passed to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub users: Store<UserRecord>,
    pub addresses: Store<AddressRecord>,
    pub household_members: Store<HouseholdMemberRecord>,
    pub duty_categories: Store<DutyCategory>,
    pub currencies: Store<Currency>,
    pub flags: Arc<FlagResolver>,
    pub exchange: Arc<ExchangeRateResolver>,
    pub tokens: TokenStore,
    pub password_resets: PasswordResets,
    pub email_verifications: EmailVerifications,
    pub login_limiter: RateLimiter,
    /// `None` means in-memory only.
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration and seeded reference data.
    pub fn new() -> Self {
        let state = Self::with_config(AppConfig::default(), None);
        state.seed_reference_data();
        state
    }

    /// Empty state for the given configuration and optional database pool.
    /// Reference data is seeded by [`crate::bootstrap::bootstrap`].
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        let login_limiter = RateLimiter::new(RateLimitConfig {
            max_attempts: config.login_max_attempts,
            window_secs: config.login_window_secs,
            trust_forwarded: config.trust_proxy,
        });
        Self {
            users: Store::new(),
            addresses: Store::new(),
            household_members: Store::new(),
            duty_categories: Store::new(),
            currencies: Store::new(),
            flags: Arc::new(FlagResolver::default()),
            exchange: Arc::new(ExchangeRateResolver::default()),
            tokens: TokenStore::new(),
            password_resets: PasswordResets::new(),
            email_verifications: EmailVerifications::new(),
            login_limiter,
            db_pool,
            config,
        }
    }

    /// Find a user by email, case-insensitively.
    pub fn user_by_email(&self, email: &str) -> Option<UserRecord> {
        self.users
            .filter(|u| u.email.eq_ignore_ascii_case(email))
            .into_iter()
            .next()
    }

    /// Find a currency by ISO code.
    pub fn currency_by_code(&self, code: &str) -> Option<Currency> {
        self.currencies
            .filter(|c| c.code.eq_ignore_ascii_case(code))
            .into_iter()
            .next()
    }

    /// Run `f` holding the address lock and then the member lock.
    ///
    /// Anything that reads one map to decide a write to the other goes
    /// through here, so the two are always locked in the same order.
    pub fn with_household<R>(
        &self,
        f: impl FnOnce(&mut HashMap<Uuid, AddressRecord>, &mut HashMap<Uuid, HouseholdMemberRecord>) -> R,
    ) -> R {
        self.addresses
            .mutate(|addresses| self.household_members.mutate(|members| f(addresses, members)))
    }

    /// Reload every store from the database. No-op without a pool.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let users = crate::db::users::load_all(pool)
            .await
            .map_err(|e| format!("failed to load users: {e}"))?;
        let user_count = users.len();
        for record in users {
            self.users.insert(record.id, record);
        }

        let tokens = crate::db::tokens::load_all(pool)
            .await
            .map_err(|e| format!("failed to load access tokens: {e}"))?;
        let token_count = tokens.len();
        self.tokens.load(tokens);

        let resets = crate::db::tokens::load_resets(pool)
            .await
            .map_err(|e| format!("failed to load password resets: {e}"))?;
        self.password_resets.load(resets);

        let verifications = crate::db::tokens::load_verifications(pool)
            .await
            .map_err(|e| format!("failed to load email verifications: {e}"))?;
        self.email_verifications.load(verifications);

        let addresses = crate::db::addresses::load_all(pool)
            .await
            .map_err(|e| format!("failed to load addresses: {e}"))?;
        let address_count = addresses.len();
        for record in addresses {
            self.addresses.insert(record.id, record);
        }

        let members = crate::db::household_members::load_all(pool)
            .await
            .map_err(|e| format!("failed to load household members: {e}"))?;
        let member_count = members.len();
        for record in members {
            self.household_members.insert(record.id, record);
        }

        let flags = crate::db::feature_flags::load_all(pool)
            .await
            .map_err(|e| format!("failed to load feature flags: {e}"))?;
        let flag_count = flags.len();
        self.flags.store().load(flags);

        let currencies = crate::db::currencies::load_all(pool)
            .await
            .map_err(|e| format!("failed to load currencies: {e}"))?;
        let currency_count = currencies.len();
        for record in currencies {
            self.currencies.insert(record.id, record);
        }

        let rates = crate::db::currencies::load_rates(pool)
            .await
            .map_err(|e| format!("failed to load exchange rates: {e}"))?;
        let rate_count = rates.len();
        for rate in rates {
            self.exchange
                .record_rate(rate)
                .map_err(|e| format!("corrupt exchange rate row: {e}"))?;
        }

        let categories = crate::db::duty_categories::load_all(pool)
            .await
            .map_err(|e| format!("failed to load duty categories: {e}"))?;
        let category_count = categories.len();
        for record in categories {
            self.duty_categories.insert(record.id, record);
        }

        tracing::info!(
            users = user_count,
            tokens = token_count,
            addresses = address_count,
            household_members = member_count,
            feature_flags = flag_count,
            currencies = currency_count,
            exchange_rates = rate_count,
            duty_categories = category_count,
            "hydrated in-memory stores from database"
        );
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
