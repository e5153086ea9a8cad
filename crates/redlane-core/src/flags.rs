//! # Feature Flags
//!
//! The flag catalogue, the flag store, and the resolver that decides whether
//! a flag is on for a given caller.
//!
//! ## Scopes
//!
//! A stored flag value is keyed by `(name, scope)`. The scope is either the
//! global sentinel `"null"` or `"user:{uuid}"`. Writing a value for a pair
//! that already has one replaces it, so each pair has at most one row.
//!
//! ## Resolution
//!
//! [`FlagResolver::is_active`] walks an ordered chain of lookups and returns
//! the first hit:
//!
//! 1. the caller's user-scoped row (only when a caller is given),
//! 2. the global row,
//! 3. the flag's static default from the catalogue.
//!
//! The last link always answers, so resolution is total for catalogued
//! flags. Names outside the catalogue yield [`FlagError::UnknownFlag`].

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FlagError;

/// Stored scope key for global flag rows.
pub const GLOBAL_SCOPE: &str = "null";

const USER_SCOPE_PREFIX: &str = "user:";

/// A catalogued feature flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagDefinition {
    /// Flag name as used in URLs and storage.
    pub name: &'static str,
    /// What the flag gates.
    pub description: &'static str,
    /// Value used when no row exists for any applicable scope.
    pub default: bool,
}

/// OCR processing of receipts.
pub const OCR_PROCESSING: &str = "ocr_processing";
/// Trips with more than one leg.
pub const MULTI_LEG_TRIPS: &str = "multi_leg_trips";
/// The admin dashboard.
pub const ADMIN_DASHBOARD: &str = "admin_dashboard";
/// Declaration export.
pub const DECLARATION_EXPORT: &str = "declaration_export";
/// Live exchange-rate fetching.
pub const CURRENCY_API_INTEGRATION: &str = "currency_api_integration";

/// Every flag the system knows about.
pub const CATALOGUE: [FlagDefinition; 5] = [
    FlagDefinition {
        name: OCR_PROCESSING,
        description: "Enable OCR processing for receipt uploads",
        default: false,
    },
    FlagDefinition {
        name: MULTI_LEG_TRIPS,
        description: "Enable multi-leg trip declarations",
        default: false,
    },
    FlagDefinition {
        name: ADMIN_DASHBOARD,
        description: "Enable the admin dashboard",
        default: true,
    },
    FlagDefinition {
        name: DECLARATION_EXPORT,
        description: "Enable declaration export",
        default: false,
    },
    FlagDefinition {
        name: CURRENCY_API_INTEGRATION,
        description: "Enable live exchange-rate fetching",
        default: false,
    },
];

/// Look up a flag in the catalogue.
pub fn definition(name: &str) -> Result<&'static FlagDefinition, FlagError> {
    CATALOGUE
        .iter()
        .find(|def| def.name == name)
        .ok_or_else(|| FlagError::UnknownFlag(name.to_string()))
}

/// The axis a flag value is stored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagScope {
    /// Applies to every caller without an override.
    Global,
    /// Applies to one user.
    User(Uuid),
}

impl FlagScope {
    /// The stored scope key.
    pub fn key(&self) -> String {
        match self {
            Self::Global => GLOBAL_SCOPE.to_string(),
            Self::User(id) => format!("{USER_SCOPE_PREFIX}{id}"),
        }
    }

    /// Parse a stored scope key. Unrecognised keys yield `None`.
    pub fn parse(key: &str) -> Option<Self> {
        if key == GLOBAL_SCOPE {
            return Some(Self::Global);
        }
        key.strip_prefix(USER_SCOPE_PREFIX)
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(Self::User)
    }
}

/// One stored flag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRow {
    /// Flag name.
    pub name: String,
    /// Stored scope key.
    pub scope: String,
    /// Stored value.
    pub value: bool,
}

/// Backing storage for flag rows.
pub trait FlagStore: Send + Sync {
    /// The stored value for `(name, scope)`, if any.
    fn get(&self, name: &str, scope: &FlagScope) -> Option<bool>;

    /// Upsert the value for `(name, scope)`.
    fn set(&self, name: &str, scope: &FlagScope, value: bool);

    /// Every stored row.
    fn rows(&self) -> Vec<FlagRow>;
}

/// In-memory flag store.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    rows: RwLock<HashMap<(String, String), bool>>,
}

impl MemoryFlagStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows read from persistent storage, replacing existing values.
    pub fn load(&self, rows: impl IntoIterator<Item = FlagRow>) {
        let mut guard = self.rows.write();
        for row in rows {
            guard.insert((row.name, row.scope), row.value);
        }
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, name: &str, scope: &FlagScope) -> Option<bool> {
        self.rows
            .read()
            .get(&(name.to_string(), scope.key()))
            .copied()
    }

    fn set(&self, name: &str, scope: &FlagScope, value: bool) {
        self.rows
            .write()
            .insert((name.to_string(), scope.key()), value);
    }

    fn rows(&self) -> Vec<FlagRow> {
        let mut rows: Vec<FlagRow> = self
            .rows
            .read()
            .iter()
            .map(|((name, scope), value)| FlagRow {
                name: name.clone(),
                scope: scope.clone(),
                value: *value,
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.scope.cmp(&b.scope)));
        rows
    }
}

/// One link in the resolution chain.
trait FlagLookup: Send + Sync {
    fn lookup(&self, store: &dyn FlagStore, flag: &FlagDefinition, user: Option<Uuid>)
        -> Option<bool>;
}

struct UserOverride;

impl FlagLookup for UserOverride {
    fn lookup(
        &self,
        store: &dyn FlagStore,
        flag: &FlagDefinition,
        user: Option<Uuid>,
    ) -> Option<bool> {
        user.and_then(|id| store.get(flag.name, &FlagScope::User(id)))
    }
}

struct GlobalValue;

impl FlagLookup for GlobalValue {
    fn lookup(&self, store: &dyn FlagStore, flag: &FlagDefinition, _: Option<Uuid>) -> Option<bool> {
        store.get(flag.name, &FlagScope::Global)
    }
}

struct StaticDefault;

impl FlagLookup for StaticDefault {
    fn lookup(&self, _: &dyn FlagStore, flag: &FlagDefinition, _: Option<Uuid>) -> Option<bool> {
        Some(flag.default)
    }
}

/// Per-flag admin statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct FlagStats {
    /// Flag name.
    pub name: String,
    /// Flag description.
    pub description: String,
    /// Resolved global value.
    pub global_enabled: bool,
    /// Number of stored rows outside the global scope.
    pub user_overrides: usize,
}

/// A flag resolved for one caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ResolvedFlag {
    /// Flag name.
    pub name: String,
    /// Flag description.
    pub description: String,
    /// Whether the flag is on for the caller.
    pub enabled: bool,
}

/// Resolves and mutates feature flags over a [`FlagStore`].
pub struct FlagResolver<S = MemoryFlagStore> {
    store: S,
    chain: Vec<Box<dyn FlagLookup>>,
}

impl<S: FlagStore> FlagResolver<S> {
    /// Build a resolver with the standard chain: user override, global, default.
    pub fn new(store: S) -> Self {
        Self {
            store,
            chain: vec![
                Box::new(UserOverride),
                Box::new(GlobalValue),
                Box::new(StaticDefault),
            ],
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `name` is on for `user` (or globally when `user` is `None`).
    pub fn is_active(&self, name: &str, user: Option<Uuid>) -> Result<bool, FlagError> {
        let flag = definition(name)?;
        Ok(self.resolve(flag, user))
    }

    fn resolve(&self, flag: &FlagDefinition, user: Option<Uuid>) -> bool {
        self.chain
            .iter()
            .find_map(|link| link.lookup(&self.store, flag, user))
            .unwrap_or(flag.default)
    }

    fn write(&self, name: &str, scope: FlagScope, value: bool) -> Result<FlagRow, FlagError> {
        let flag = definition(name)?;
        self.store.set(flag.name, &scope, value);
        tracing::info!(flag = flag.name, scope = %scope.key(), value, "feature flag updated");
        Ok(FlagRow {
            name: flag.name.to_string(),
            scope: scope.key(),
            value,
        })
    }

    /// Force `name` on for one user.
    pub fn enable_for_user(&self, name: &str, user: Uuid) -> Result<FlagRow, FlagError> {
        self.write(name, FlagScope::User(user), true)
    }

    /// Force `name` off for one user.
    pub fn disable_for_user(&self, name: &str, user: Uuid) -> Result<FlagRow, FlagError> {
        self.write(name, FlagScope::User(user), false)
    }

    /// Turn `name` on globally.
    pub fn global_enable(&self, name: &str) -> Result<FlagRow, FlagError> {
        self.write(name, FlagScope::Global, true)
    }

    /// Turn `name` off globally.
    pub fn global_disable(&self, name: &str) -> Result<FlagRow, FlagError> {
        self.write(name, FlagScope::Global, false)
    }

    /// Flip the resolved global value of `name`. The returned row carries
    /// the new state.
    pub fn toggle_global(&self, name: &str) -> Result<FlagRow, FlagError> {
        let current = self.is_active(name, None)?;
        self.write(name, FlagScope::Global, !current)
    }

    /// Every catalogued flag resolved for `user`.
    pub fn all_flags(&self, user: Option<Uuid>) -> Vec<ResolvedFlag> {
        CATALOGUE
            .iter()
            .map(|flag| ResolvedFlag {
                name: flag.name.to_string(),
                description: flag.description.to_string(),
                enabled: self.resolve(flag, user),
            })
            .collect()
    }

    /// Global state and override counts for every catalogued flag.
    pub fn get_flag_stats(&self) -> Vec<FlagStats> {
        let rows = self.store.rows();
        CATALOGUE
            .iter()
            .map(|flag| FlagStats {
                name: flag.name.to_string(),
                description: flag.description.to_string(),
                global_enabled: self.resolve(flag, None),
                user_overrides: rows
                    .iter()
                    .filter(|row| row.name == flag.name && row.scope != GLOBAL_SCOPE)
                    .count(),
            })
            .collect()
    }

    /// Write each flag's declared default as its global row. Returns the
    /// rows written.
    pub fn seed_defaults(&self) -> Vec<FlagRow> {
        CATALOGUE
            .iter()
            .map(|flag| {
                self.store.set(flag.name, &FlagScope::Global, flag.default);
                FlagRow {
                    name: flag.name.to_string(),
                    scope: GLOBAL_SCOPE.to_string(),
                    value: flag.default,
                }
            })
            .collect()
    }
}

impl Default for FlagResolver<MemoryFlagStore> {
    fn default() -> Self {
        Self::new(MemoryFlagStore::new())
    }
}

impl<S> std::fmt::Debug for FlagResolver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagResolver")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_rows() {
        let flags = FlagResolver::default();
        assert!(!flags.is_active(OCR_PROCESSING, None).unwrap());
        assert!(flags.is_active(ADMIN_DASHBOARD, None).unwrap());
        assert!(flags.is_active(ADMIN_DASHBOARD, Some(Uuid::new_v4())).unwrap());
    }

    #[test]
    fn unknown_flag_is_not_a_boolean() {
        let flags = FlagResolver::default();
        assert_eq!(
            flags.is_active("warp_drive", None),
            Err(FlagError::UnknownFlag("warp_drive".into()))
        );
        assert!(flags.global_enable("warp_drive").is_err());
        assert!(flags.toggle_global("warp_drive").is_err());
    }

    #[test]
    fn global_beats_default() {
        let flags = FlagResolver::default();
        flags.global_enable(DECLARATION_EXPORT).unwrap();
        assert!(flags.is_active(DECLARATION_EXPORT, None).unwrap());
        assert!(flags.is_active(DECLARATION_EXPORT, Some(Uuid::new_v4())).unwrap());
    }

    #[test]
    fn user_override_beats_global() {
        let flags = FlagResolver::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        flags.global_enable(OCR_PROCESSING).unwrap();
        flags.disable_for_user(OCR_PROCESSING, alice).unwrap();

        assert!(!flags.is_active(OCR_PROCESSING, Some(alice)).unwrap());
        assert!(flags.is_active(OCR_PROCESSING, Some(bob)).unwrap());
        assert!(flags.is_active(OCR_PROCESSING, None).unwrap());

        flags.global_disable(OCR_PROCESSING).unwrap();
        flags.enable_for_user(OCR_PROCESSING, bob).unwrap();
        assert!(flags.is_active(OCR_PROCESSING, Some(bob)).unwrap());
        assert!(!flags.is_active(OCR_PROCESSING, None).unwrap());
    }

    #[test]
    fn writes_are_upserts() {
        let flags = FlagResolver::default();
        let user = Uuid::new_v4();
        flags.enable_for_user(MULTI_LEG_TRIPS, user).unwrap();
        flags.disable_for_user(MULTI_LEG_TRIPS, user).unwrap();
        flags.enable_for_user(MULTI_LEG_TRIPS, user).unwrap();
        assert_eq!(flags.store().rows().len(), 1);
    }

    #[test]
    fn toggle_flips_resolved_global() {
        let flags = FlagResolver::default();
        let row = flags.toggle_global(ADMIN_DASHBOARD).unwrap();
        assert!(!row.value);
        assert_eq!(row.scope, GLOBAL_SCOPE);
        assert!(!flags.is_active(ADMIN_DASHBOARD, None).unwrap());
        let row = flags.toggle_global(ADMIN_DASHBOARD).unwrap();
        assert!(row.value);
    }

    #[test]
    fn stats_count_only_user_rows() {
        let flags = FlagResolver::default();
        flags.seed_defaults();
        flags.enable_for_user(OCR_PROCESSING, Uuid::new_v4()).unwrap();
        flags.disable_for_user(OCR_PROCESSING, Uuid::new_v4()).unwrap();

        let stats = flags.get_flag_stats();
        assert_eq!(stats.len(), CATALOGUE.len());
        let ocr = stats.iter().find(|s| s.name == OCR_PROCESSING).unwrap();
        assert_eq!(ocr.user_overrides, 2);
        assert!(!ocr.global_enabled);
        let dash = stats.iter().find(|s| s.name == ADMIN_DASHBOARD).unwrap();
        assert_eq!(dash.user_overrides, 0);
        assert!(dash.global_enabled);
    }

    #[test]
    fn seed_writes_declared_defaults() {
        let flags = FlagResolver::default();
        let rows = flags.seed_defaults();
        assert_eq!(rows.len(), 5);
        for flag in CATALOGUE {
            assert_eq!(
                flags.store().get(flag.name, &FlagScope::Global),
                Some(flag.default)
            );
        }
    }

    #[test]
    fn all_flags_resolves_for_caller() {
        let flags = FlagResolver::default();
        let user = Uuid::new_v4();
        flags.enable_for_user(OCR_PROCESSING, user).unwrap();
        let resolved = flags.all_flags(Some(user));
        assert_eq!(resolved.len(), 5);
        assert!(resolved.iter().any(|f| f.name == OCR_PROCESSING && f.enabled));
        let anonymous = flags.all_flags(None);
        assert!(anonymous.iter().any(|f| f.name == OCR_PROCESSING && !f.enabled));
    }

    #[test]
    fn scope_keys_parse_back() {
        let id = Uuid::new_v4();
        assert_eq!(FlagScope::Global.key(), "null");
        assert_eq!(FlagScope::parse(&FlagScope::User(id).key()), Some(FlagScope::User(id)));
        assert_eq!(FlagScope::parse("null"), Some(FlagScope::Global));
        assert_eq!(FlagScope::parse("team:42"), None);
    }
}
