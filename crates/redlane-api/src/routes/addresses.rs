//! # Address API
//!
//! CRUD over the caller's addresses plus primary selection. Every live
//! address set of a user has exactly one primary once it is non-empty:
//! the first address is primary automatically, setting a new primary
//! clears the old one under the same lock, and deleting the primary
//! promotes the oldest remaining address. A primary address that still has
//! household members cannot be deleted.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use redlane_core::primary::{claims_primary, ensure_removable, promote_successor, set_primary};
use redlane_core::validation::validate_country_code;
use redlane_core::PrimaryError;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{data, data_with_message, message, Envelope, MessageResponse};
use crate::auth::CallerIdentity;
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_validated_json, optional_text, require_text, Validate};
use crate::state::{AddressRecord, AppState, HouseholdMemberRecord};

/// Body of create and update requests.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddressRequest {
    pub street_line_1: String,
    #[serde(default)]
    pub street_line_2: Option<String>,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    /// ISO-3166 alpha-2; lowercase input is uppercased.
    pub country_code: String,
    /// Make this the primary address.
    #[serde(default)]
    pub is_primary: Option<bool>,
}

impl AddressRequest {
    fn country_code(&self) -> String {
        self.country_code.trim().to_ascii_uppercase()
    }
}

impl Validate for AddressRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        require_text(errors, "street_line_1", &self.street_line_1, 255);
        optional_text(errors, "street_line_2", self.street_line_2.as_deref(), 255);
        require_text(errors, "city", &self.city, 100);
        require_text(errors, "state_province", &self.state_province, 100);
        require_text(errors, "postal_code", &self.postal_code, 20);
        if self.country_code.trim().is_empty() {
            errors.add("country_code", "The country_code field is required.");
        } else if validate_country_code(&self.country_code()).is_err() {
            errors.add(
                "country_code",
                "The country_code must be a two-letter ISO 3166 code.",
            );
        }
    }
}

/// Build the addresses router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/addresses", get(list_addresses).post(create_address))
        .route(
            "/v1/addresses/{id}",
            get(get_address).put(update_address).delete(delete_address),
        )
        .route("/v1/addresses/{id}/set-primary", post(set_primary_address))
}

/// Load a live address the caller owns: 404 when missing or deleted,
/// 403 when it belongs to someone else.
pub(crate) fn owned_address(
    state: &AppState,
    caller: &CallerIdentity,
    id: Uuid,
) -> Result<AddressRecord, AppError> {
    let address = state
        .addresses
        .get(&id)
        .filter(|a| a.deleted_at.is_none())
        .ok_or_else(|| AppError::NotFound(format!("address {id} not found")))?;
    if address.user_id != caller.user_id {
        tracing::warn!(address_id = %id, user_id = %caller.user_id, "address access denied");
        return Err(AppError::Forbidden("This address belongs to another user.".into()));
    }
    Ok(address)
}

async fn persist(state: &AppState, changed: &[AddressRecord]) -> Result<(), AppError> {
    if changed.is_empty() {
        return Ok(());
    }
    if let Some(pool) = &state.db_pool {
        crate::db::addresses::save_all(pool, changed)
            .await
            .map_err(|e| AppError::persist_failed("addresses", e))?;
    }
    Ok(())
}

fn sorted(mut addresses: Vec<AddressRecord>) -> Vec<AddressRecord> {
    addresses.sort_by(|a, b| {
        b.is_primary
            .cmp(&a.is_primary)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    addresses
}

/// GET /v1/addresses: List the caller's addresses, primary first.
#[utoipa::path(
    get,
    path = "/v1/addresses",
    responses((status = 200, description = "Addresses; body is {data: [AddressRecord]}", body = Vec<AddressRecord>)),
    security(("bearer_auth" = [])),
    tag = "addresses"
)]
pub(crate) async fn list_addresses(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Json<Envelope<Vec<AddressRecord>>> {
    let addresses = state
        .addresses
        .filter(|a| a.user_id == caller.user_id && a.deleted_at.is_none());
    data(sorted(addresses))
}

/// POST /v1/addresses: Add an address. The first one becomes primary.
#[utoipa::path(
    post,
    path = "/v1/addresses",
    request_body = AddressRequest,
    responses(
        (status = 201, description = "Address created; body is {data: AddressRecord, message}", body = AddressRecord),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "addresses"
)]
pub(crate) async fn create_address(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<AddressRecord>>), AppError> {
    let req = extract_validated_json(body)?;
    let now = Utc::now();
    let mut record = AddressRecord {
        id: Uuid::new_v4(),
        user_id: caller.user_id,
        street_line_1: req.street_line_1.trim().to_string(),
        street_line_2: req.street_line_2.clone(),
        city: req.city.trim().to_string(),
        state_province: req.state_province.trim().to_string(),
        postal_code: req.postal_code.trim().to_string(),
        country_code: req.country_code(),
        is_primary: false,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    let (record, cleared) = state.addresses.mutate(|map| {
        record.is_primary = claims_primary(map.values(), caller.user_id);
        let id = record.id;
        map.insert(id, record);

        let mut cleared = Vec::new();
        if req.is_primary == Some(true) {
            cleared = set_primary(map.values_mut(), id)?
                .into_iter()
                .filter(|changed_id| *changed_id != id)
                .filter_map(|changed_id| map.get(&changed_id).cloned())
                .collect();
        }
        let record = map.get(&id).cloned().ok_or(PrimaryError::NotFound(id))?;
        Ok::<_, PrimaryError>((record, cleared))
    })?;

    persist(&state, &cleared).await?;
    if let Some(pool) = &state.db_pool {
        crate::db::addresses::insert(pool, &record)
            .await
            .map_err(|e| AppError::persist_failed("address", e))?;
    }

    tracing::info!(address_id = %record.id, user_id = %caller.user_id, is_primary = record.is_primary, "address created");
    Ok((
        StatusCode::CREATED,
        data_with_message(record, "Address created successfully"),
    ))
}

/// GET /v1/addresses/{id}: One of the caller's addresses.
#[utoipa::path(
    get,
    path = "/v1/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Address; body is {data: AddressRecord}", body = AddressRecord),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "addresses"
)]
pub(crate) async fn get_address(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<AddressRecord>>, AppError> {
    Ok(data(owned_address(&state, &caller, id)?))
}

/// PUT /v1/addresses/{id}: Replace an address's fields.
///
/// `is_primary: true` makes it primary. `false` is ignored: the primary can
/// only move by choosing another address.
#[utoipa::path(
    put,
    path = "/v1/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address ID")),
    request_body = AddressRequest,
    responses(
        (status = 200, description = "Address updated; body is {data: AddressRecord, message}", body = AddressRecord),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "addresses"
)]
pub(crate) async fn update_address(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<Json<Envelope<AddressRecord>>, AppError> {
    let req = extract_validated_json(body)?;
    owned_address(&state, &caller, id)?;

    let changed = state
        .addresses
        .mutate(|map| revise_address(map, id, &req, Utc::now()))?;

    persist(&state, &changed).await?;
    let record = changed
        .into_iter()
        .find(|a| a.id == id)
        .ok_or_else(|| AppError::NotFound(format!("address {id} not found")))?;
    Ok(data_with_message(record, "Address updated successfully"))
}

/// Apply `req` to live address `id`. Returns every record whose stored
/// state changed, the target first.
fn revise_address(
    map: &mut HashMap<Uuid, AddressRecord>,
    id: Uuid,
    req: &AddressRequest,
    now: DateTime<Utc>,
) -> Result<Vec<AddressRecord>, PrimaryError> {
    let address = map
        .get_mut(&id)
        .filter(|a| a.deleted_at.is_none())
        .ok_or(PrimaryError::NotFound(id))?;
    address.street_line_1 = req.street_line_1.trim().to_string();
    address.street_line_2 = req.street_line_2.clone();
    address.city = req.city.trim().to_string();
    address.state_province = req.state_province.trim().to_string();
    address.postal_code = req.postal_code.trim().to_string();
    address.country_code = req.country_code();
    address.updated_at = now;

    let mut changed = vec![id];
    if req.is_primary == Some(true) {
        let ids = set_primary(map.values_mut(), id)?;
        changed.extend(ids.into_iter().filter(|changed_id| *changed_id != id));
    }
    Ok(changed
        .into_iter()
        .filter_map(|changed_id| map.get(&changed_id).cloned())
        .collect())
}

/// DELETE /v1/addresses/{id}: Soft-delete an address.
///
/// Rejected with 409 when the address is primary and has household members.
/// Deleting a non-primary address also removes the members living there.
#[utoipa::path(
    delete,
    path = "/v1/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Address deleted", body = MessageResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Primary address still has household members", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "addresses"
)]
pub(crate) async fn delete_address(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    owned_address(&state, &caller, id)?;

    let (changed, orphans) = state.with_household(|addresses, members| {
        remove_address(addresses, members, id, Utc::now())
    })?;
    if let Some(pool) = &state.db_pool {
        crate::db::addresses::save_removal(pool, &changed, &orphans)
            .await
            .map_err(|e| AppError::persist_failed("address removal", e))?;
    }

    tracing::info!(address_id = %id, user_id = %caller.user_id, members = orphans.len(), "address deleted");
    Ok(message("Address deleted successfully"))
}

/// Soft-delete address `id`, promote a successor primary, and soft-delete
/// the members living there. Both maps must be held for the whole call so
/// no member can be placed at the address between the dependents check and
/// the cascade.
pub(crate) fn remove_address(
    addresses: &mut HashMap<Uuid, AddressRecord>,
    members: &mut HashMap<Uuid, HouseholdMemberRecord>,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<(Vec<AddressRecord>, Vec<HouseholdMemberRecord>), AppError> {
    let address = addresses
        .get(&id)
        .filter(|a| a.deleted_at.is_none())
        .ok_or_else(|| AppError::NotFound(format!("address {id} not found")))?;
    let owner = address.user_id;
    let dependents = members
        .values()
        .filter(|m| m.address_id == id && m.deleted_at.is_none())
        .count();
    ensure_removable(address, dependents).map_err(|e| {
        tracing::info!(address_id = %id, dependents, "refusing to delete primary address with household members");
        AppError::from(e)
    })?;

    let mut changed = vec![id];
    if let Some(address) = addresses.get_mut(&id) {
        address.deleted_at = Some(now);
        address.is_primary = false;
        address.updated_at = now;
    }
    if let Some(promoted) = promote_successor(addresses.values_mut(), owner) {
        tracing::info!(address_id = %promoted, user_id = %owner, "promoted successor primary address");
        changed.push(promoted);
    }
    let changed = changed
        .into_iter()
        .filter_map(|changed_id| addresses.get(&changed_id).cloned())
        .collect();

    let orphans = members
        .values_mut()
        .filter(|m| m.address_id == id && m.deleted_at.is_none())
        .map(|m| {
            m.deleted_at = Some(now);
            m.is_primary_declarant = false;
            m.updated_at = now;
            m.clone()
        })
        .collect();
    Ok((changed, orphans))
}

/// POST /v1/addresses/{id}/set-primary: Make this the caller's primary address.
#[utoipa::path(
    post,
    path = "/v1/addresses/{id}/set-primary",
    params(("id" = Uuid, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Primary set; body is {data: AddressRecord, message}", body = AddressRecord),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "addresses"
)]
pub(crate) async fn set_primary_address(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<AddressRecord>>, AppError> {
    owned_address(&state, &caller, id)?;

    let (record, changed) = state.addresses.mutate(|map| {
        let ids = set_primary(map.values_mut(), id)?;
        let changed: Vec<AddressRecord> = ids
            .into_iter()
            .filter_map(|changed_id| map.get(&changed_id).cloned())
            .collect();
        let record = map
            .get(&id)
            .cloned()
            .ok_or(PrimaryError::NotFound(id))?;
        Ok::<_, PrimaryError>((record, changed))
    })?;
    persist(&state, &changed).await?;

    tracing::info!(address_id = %id, user_id = %caller.user_id, "primary address set");
    Ok(data_with_message(record, "Primary address set successfully"))
}
