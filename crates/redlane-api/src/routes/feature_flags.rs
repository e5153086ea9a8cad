//! # Feature Flag API
//!
//! Callers read their resolved flags. Admins toggle the global value, set
//! per-user overrides, and read override statistics. Every write is
//! upserted to the `feature_flags` table when a database is configured.
//!
//! The admin dashboard lives here too, behind the `admin_dashboard` gate.

use axum::extract::{Path, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use redlane_core::flags::ADMIN_DASHBOARD;
use redlane_core::{FlagRow, FlagStats, Permission, ResolvedFlag};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{data, data_with_message, Envelope};
use crate::auth::{require_permission, CallerIdentity};
use crate::error::AppError;
use crate::middleware::feature_gate::{require_feature, FeatureGate};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct FlagList {
    pub flags: Vec<ResolvedFlag>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlagStatsList {
    pub flags: Vec<FlagStats>,
}

/// State of one flag after a write.
#[derive(Debug, Serialize, ToSchema)]
pub struct FlagState {
    pub flag: String,
    pub enabled: bool,
    /// Present for per-user overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

/// Record counts shown on the admin dashboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub users: usize,
    pub verified_users: usize,
    pub addresses: usize,
    pub household_members: usize,
    pub duty_categories: usize,
    pub currencies: usize,
    pub exchange_rates: usize,
    pub flags: Vec<FlagStats>,
}

/// Build the feature flag router. The dashboard route carries its own gate.
pub fn router(state: &AppState) -> Router<AppState> {
    let dashboard = Router::new()
        .route("/v1/admin/dashboard", get(admin_dashboard))
        .route_layer(from_fn_with_state(
            FeatureGate::new(state.flags.clone(), ADMIN_DASHBOARD),
            require_feature,
        ));

    Router::new()
        .route("/v1/feature-flags", get(list_flags))
        .route("/v1/admin/feature-flags", get(flag_stats))
        .route("/v1/admin/feature-flags/{key}/toggle", post(toggle_flag))
        .route(
            "/v1/admin/feature-flags/{key}/users/{user_id}",
            post(enable_for_user).delete(disable_for_user),
        )
        .merge(dashboard)
}

async fn persist(state: &AppState, row: &FlagRow) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        crate::db::feature_flags::upsert(pool, row)
            .await
            .map_err(|e| AppError::persist_failed("feature flag", e))?;
    }
    Ok(())
}

fn known_user(state: &AppState, user_id: Uuid) -> Result<(), AppError> {
    state
        .users
        .get(&user_id)
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("user {user_id} not found")))
}

/// GET /v1/feature-flags: Every flag resolved for the caller.
#[utoipa::path(
    get,
    path = "/v1/feature-flags",
    responses((status = 200, description = "Resolved flags; body is {data: FlagList}", body = FlagList)),
    security(("bearer_auth" = [])),
    tag = "feature-flags"
)]
pub(crate) async fn list_flags(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Json<Envelope<FlagList>> {
    data(FlagList {
        flags: state.flags.all_flags(Some(caller.user_id)),
    })
}

/// GET /v1/admin/feature-flags: Global state and override counts.
#[utoipa::path(
    get,
    path = "/v1/admin/feature-flags",
    responses(
        (status = 200, description = "Flag statistics; body is {data: FlagStatsList}", body = FlagStatsList),
        (status = 403, description = "Missing manage_feature_flags", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "feature-flags"
)]
pub(crate) async fn flag_stats(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Envelope<FlagStatsList>>, AppError> {
    require_permission(&caller, Permission::ManageFeatureFlags)?;
    Ok(data(FlagStatsList {
        flags: state.flags.get_flag_stats(),
    }))
}

/// POST /v1/admin/feature-flags/{key}/toggle: Flip the global value.
#[utoipa::path(
    post,
    path = "/v1/admin/feature-flags/{key}/toggle",
    params(("key" = String, Path, description = "Flag name")),
    responses(
        (status = 200, description = "New global state; body is {data: FlagState, message}", body = FlagState),
        (status = 403, description = "Missing manage_feature_flags", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown flag", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "feature-flags"
)]
pub(crate) async fn toggle_flag(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(key): Path<String>,
) -> Result<Json<Envelope<FlagState>>, AppError> {
    require_permission(&caller, Permission::ManageFeatureFlags)?;
    let row = state.flags.toggle_global(&key)?;
    persist(&state, &row).await?;

    tracing::info!(flag = %row.name, enabled = row.value, admin = %caller.user_id, "feature flag toggled");
    Ok(data_with_message(
        FlagState {
            flag: row.name,
            enabled: row.value,
            user_id: None,
        },
        "Feature flag toggled successfully",
    ))
}

/// POST /v1/admin/feature-flags/{key}/users/{user_id}: Force a flag on for one user.
#[utoipa::path(
    post,
    path = "/v1/admin/feature-flags/{key}/users/{user_id}",
    params(
        ("key" = String, Path, description = "Flag name"),
        ("user_id" = Uuid, Path, description = "Target user"),
    ),
    responses(
        (status = 200, description = "Override stored; body is {data: FlagState, message}", body = FlagState),
        (status = 403, description = "Missing manage_feature_flags", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown flag or user", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "feature-flags"
)]
pub(crate) async fn enable_for_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((key, user_id)): Path<(String, Uuid)>,
) -> Result<Json<Envelope<FlagState>>, AppError> {
    require_permission(&caller, Permission::ManageFeatureFlags)?;
    known_user(&state, user_id)?;
    let row = state.flags.enable_for_user(&key, user_id)?;
    persist(&state, &row).await?;

    Ok(data_with_message(
        FlagState {
            flag: row.name,
            enabled: true,
            user_id: Some(user_id),
        },
        "Feature flag enabled for user",
    ))
}

/// DELETE /v1/admin/feature-flags/{key}/users/{user_id}: Force a flag off
/// for one user. The override row stays, so the global value no longer
/// applies to them.
#[utoipa::path(
    delete,
    path = "/v1/admin/feature-flags/{key}/users/{user_id}",
    params(
        ("key" = String, Path, description = "Flag name"),
        ("user_id" = Uuid, Path, description = "Target user"),
    ),
    responses(
        (status = 200, description = "Override stored; body is {data: FlagState, message}", body = FlagState),
        (status = 403, description = "Missing manage_feature_flags", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown flag or user", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "feature-flags"
)]
pub(crate) async fn disable_for_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((key, user_id)): Path<(String, Uuid)>,
) -> Result<Json<Envelope<FlagState>>, AppError> {
    require_permission(&caller, Permission::ManageFeatureFlags)?;
    known_user(&state, user_id)?;
    let row = state.flags.disable_for_user(&key, user_id)?;
    persist(&state, &row).await?;

    Ok(data_with_message(
        FlagState {
            flag: row.name,
            enabled: false,
            user_id: Some(user_id),
        },
        "Feature flag disabled for user",
    ))
}

/// GET /v1/admin/dashboard: Record counts for administrators.
#[utoipa::path(
    get,
    path = "/v1/admin/dashboard",
    responses(
        (status = 200, description = "Summary; body is {data: DashboardSummary}", body = DashboardSummary),
        (status = 403, description = "Feature unavailable or missing manage_users", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "feature-flags"
)]
pub(crate) async fn admin_dashboard(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Envelope<DashboardSummary>>, AppError> {
    require_permission(&caller, Permission::ManageUsers)?;
    let live_addresses = state.addresses.filter(|a| a.deleted_at.is_none()).len();
    let live_members = state
        .household_members
        .filter(|m| m.deleted_at.is_none())
        .len();

    Ok(data(DashboardSummary {
        users: state.users.len(),
        verified_users: state.users.filter(|u| u.is_verified()).len(),
        addresses: live_addresses,
        household_members: live_members,
        duty_categories: state.duty_categories.len(),
        currencies: state.currencies.len(),
        exchange_rates: state.exchange.book().all().len(),
        flags: state.flags.get_flag_stats(),
    }))
}
