//! # Household Member API
//!
//! Members live at one of the caller's addresses. Each address with live
//! members has exactly one primary declarant. Moving a member to another
//! address re-establishes that rule at both addresses.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use redlane_core::household::{age_on, parse_date_of_birth};
use redlane_core::primary::{claims_primary, promote_successor, set_primary};
use redlane_core::reference::{relationship_type, RelationshipType};
use redlane_core::PrimaryError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::addresses::owned_address;
use super::{data, data_with_message, message, Envelope, MessageResponse};
use crate::auth::CallerIdentity;
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::state::{AddressRecord, AppState, HouseholdMemberRecord};

/// Body of create and update requests.
#[derive(Debug, Deserialize, ToSchema)]
pub struct MemberRequest {
    pub address_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`, before today.
    pub date_of_birth: String,
    pub relationship_type_id: i32,
    /// Make this member the address's primary declarant.
    #[serde(default)]
    pub is_primary_declarant: Option<bool>,
}

impl MemberRequest {
    fn date_of_birth(&self, today: NaiveDate) -> Result<NaiveDate, AppError> {
        parse_date_of_birth(self.date_of_birth.trim(), today).map_err(AppError::from)
    }
}

impl Validate for MemberRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        require_text(errors, "first_name", &self.first_name, 255);
        require_text(errors, "last_name", &self.last_name, 255);
        if self.date_of_birth.trim().is_empty() {
            errors.add("date_of_birth", "The date_of_birth field is required.");
        } else if parse_date_of_birth(self.date_of_birth.trim(), Utc::now().date_naive()).is_err() {
            errors.add(
                "date_of_birth",
                "The date_of_birth must be a date before today in YYYY-MM-DD format.",
            );
        }
        errors.check(
            relationship_type(self.relationship_type_id).is_none(),
            "relationship_type_id",
            "The selected relationship_type_id is invalid.",
        );
    }
}

/// `?address_id=` filter for the list endpoint.
#[derive(Debug, Deserialize)]
pub struct MemberFilter {
    pub address_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RelationshipTypeView {
    pub id: i32,
    pub code: String,
    pub description: String,
}

impl From<&RelationshipType> for RelationshipTypeView {
    fn from(r: &RelationshipType) -> Self {
        Self {
            id: r.id,
            code: r.code.to_string(),
            description: r.description.to_string(),
        }
    }
}

/// A member as served, with derived age and expanded relationship.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    pub id: Uuid,
    pub address_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub age: u32,
    pub relationship_type: Option<RelationshipTypeView>,
    pub is_primary_declarant: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberResponse {
    fn new(member: &HouseholdMemberRecord, today: NaiveDate) -> Self {
        Self {
            id: member.id,
            address_id: member.address_id,
            first_name: member.first_name.clone(),
            last_name: member.last_name.clone(),
            date_of_birth: member.date_of_birth,
            age: age_on(member.date_of_birth, today),
            relationship_type: relationship_type(member.relationship_type_id)
                .map(RelationshipTypeView::from),
            is_primary_declarant: member.is_primary_declarant,
            created_at: member.created_at,
            updated_at: member.updated_at,
        }
    }
}

impl From<&HouseholdMemberRecord> for MemberResponse {
    fn from(member: &HouseholdMemberRecord) -> Self {
        Self::new(member, Utc::now().date_naive())
    }
}

/// Build the household members router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/household-members", get(list_members).post(create_member))
        .route(
            "/v1/household-members/{id}",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route(
            "/v1/household-members/{id}/set-primary-declarant",
            post(set_primary_declarant),
        )
}

/// A live member whose address the caller owns.
fn owned_member(
    state: &AppState,
    caller: &CallerIdentity,
    id: Uuid,
) -> Result<HouseholdMemberRecord, AppError> {
    let member = state
        .household_members
        .get(&id)
        .filter(|m| m.deleted_at.is_none())
        .ok_or_else(|| AppError::NotFound(format!("household member {id} not found")))?;
    owned_address(state, caller, member.address_id)?;
    Ok(member)
}

async fn persist(state: &AppState, changed: &[HouseholdMemberRecord]) -> Result<(), AppError> {
    if changed.is_empty() {
        return Ok(());
    }
    if let Some(pool) = &state.db_pool {
        crate::db::household_members::save_all(pool, changed)
            .await
            .map_err(|e| AppError::persist_failed("household members", e))?;
    }
    Ok(())
}

fn collect(
    map: &HashMap<Uuid, HouseholdMemberRecord>,
    mut ids: Vec<Uuid>,
) -> Vec<HouseholdMemberRecord> {
    ids.sort();
    ids.dedup();
    ids.iter().filter_map(|id| map.get(id).cloned()).collect()
}

/// GET /v1/household-members: Members at the caller's addresses.
#[utoipa::path(
    get,
    path = "/v1/household-members",
    params(("address_id" = Option<Uuid>, Query, description = "Only members at this address")),
    responses((status = 200, description = "Members; body is {data: [MemberResponse]}", body = Vec<MemberResponse>)),
    security(("bearer_auth" = [])),
    tag = "household-members"
)]
pub(crate) async fn list_members(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(filter): Query<MemberFilter>,
) -> Result<Json<Envelope<Vec<MemberResponse>>>, AppError> {
    let addresses: Vec<Uuid> = match filter.address_id {
        Some(address_id) => vec![owned_address(&state, &caller, address_id)?.id],
        None => state
            .addresses
            .filter(|a| a.user_id == caller.user_id && a.deleted_at.is_none())
            .into_iter()
            .map(|a| a.id)
            .collect(),
    };

    let mut members = state
        .household_members
        .filter(|m| m.deleted_at.is_none() && addresses.contains(&m.address_id));
    members.sort_by(|a, b| {
        a.address_id
            .cmp(&b.address_id)
            .then_with(|| b.is_primary_declarant.cmp(&a.is_primary_declarant))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    let today = Utc::now().date_naive();
    Ok(data(
        members
            .iter()
            .map(|m| MemberResponse::new(m, today))
            .collect(),
    ))
}

/// POST /v1/household-members: Add a member to one of the caller's addresses.
#[utoipa::path(
    post,
    path = "/v1/household-members",
    request_body = MemberRequest,
    responses(
        (status = 201, description = "Member created; body is {data: MemberResponse, message}", body = MemberResponse),
        (status = 403, description = "Address belongs to another user", body = crate::error::ErrorBody),
        (status = 404, description = "Address not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "household-members"
)]
pub(crate) async fn create_member(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<MemberRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<MemberResponse>>), AppError> {
    let req = extract_validated_json(body)?;
    owned_address(&state, &caller, req.address_id)?;
    let now = Utc::now();
    let record = HouseholdMemberRecord {
        id: Uuid::new_v4(),
        address_id: req.address_id,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        date_of_birth: req.date_of_birth(now.date_naive())?,
        relationship_type_id: req.relationship_type_id,
        is_primary_declarant: false,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };

    let (record, cleared) = state.with_household(|addresses, members| {
        place_member(addresses, members, record, req.is_primary_declarant == Some(true))
    })?;

    persist(&state, &cleared).await?;
    if let Some(pool) = &state.db_pool {
        crate::db::household_members::insert(pool, &record)
            .await
            .map_err(|e| AppError::persist_failed("household member", e))?;
    }

    tracing::info!(member_id = %record.id, address_id = %record.address_id, primary = record.is_primary_declarant, "household member created");
    Ok((
        StatusCode::CREATED,
        data_with_message(
            MemberResponse::from(&record),
            "Household member created successfully",
        ),
    ))
}

/// Insert `record` at its address, which must still be live. Returns the
/// stored record and the members whose primary flag was cleared.
fn place_member(
    addresses: &HashMap<Uuid, AddressRecord>,
    members: &mut HashMap<Uuid, HouseholdMemberRecord>,
    mut record: HouseholdMemberRecord,
    make_primary: bool,
) -> Result<(HouseholdMemberRecord, Vec<HouseholdMemberRecord>), PrimaryError> {
    ensure_live_address(addresses, record.address_id)?;
    record.is_primary_declarant = claims_primary(members.values(), record.address_id);
    let id = record.id;
    members.insert(id, record);

    let mut cleared = Vec::new();
    if make_primary {
        cleared = set_primary(members.values_mut(), id)?
            .into_iter()
            .filter(|c| *c != id)
            .collect();
    }
    let record = members.get(&id).cloned().ok_or(PrimaryError::NotFound(id))?;
    Ok((record, collect(members, cleared)))
}

/// Apply `req` to live member `id`, moving them when the address differs.
/// Returns every member whose stored state changed.
fn revise_member(
    addresses: &HashMap<Uuid, AddressRecord>,
    members: &mut HashMap<Uuid, HouseholdMemberRecord>,
    id: Uuid,
    req: &MemberRequest,
    date_of_birth: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<HouseholdMemberRecord>, PrimaryError> {
    let member = members
        .get_mut(&id)
        .filter(|m| m.deleted_at.is_none())
        .ok_or(PrimaryError::NotFound(id))?;
    let moved_from = (member.address_id != req.address_id).then_some(member.address_id);
    if moved_from.is_some() {
        ensure_live_address(addresses, req.address_id)?;
        member.address_id = req.address_id;
        member.is_primary_declarant = false;
    }
    member.first_name = req.first_name.trim().to_string();
    member.last_name = req.last_name.trim().to_string();
    member.date_of_birth = date_of_birth;
    member.relationship_type_id = req.relationship_type_id;
    member.updated_at = now;

    let mut changed = vec![id];
    if let Some(old_address) = moved_from {
        if claims_primary(members.values(), req.address_id) {
            if let Some(member) = members.get_mut(&id) {
                member.is_primary_declarant = true;
            }
        }
        if let Some(promoted) = promote_successor(members.values_mut(), old_address) {
            changed.push(promoted);
        }
    }
    if req.is_primary_declarant == Some(true) {
        changed.extend(set_primary(members.values_mut(), id)?);
    }
    Ok(collect(members, changed))
}

fn ensure_live_address(addresses: &HashMap<Uuid, AddressRecord>, id: Uuid) -> Result<(), PrimaryError> {
    match addresses.get(&id) {
        Some(address) if address.deleted_at.is_none() => Ok(()),
        _ => Err(PrimaryError::NotFound(id)),
    }
}

/// GET /v1/household-members/{id}
#[utoipa::path(
    get,
    path = "/v1/household-members/{id}",
    params(("id" = Uuid, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Member; body is {data: MemberResponse}", body = MemberResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "household-members"
)]
pub(crate) async fn get_member(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<MemberResponse>>, AppError> {
    let member = owned_member(&state, &caller, id)?;
    Ok(data(MemberResponse::from(&member)))
}

/// PUT /v1/household-members/{id}: Replace a member's fields, possibly
/// moving them to another of the caller's addresses.
#[utoipa::path(
    put,
    path = "/v1/household-members/{id}",
    params(("id" = Uuid, Path, description = "Member ID")),
    request_body = MemberRequest,
    responses(
        (status = 200, description = "Member updated; body is {data: MemberResponse, message}", body = MemberResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "household-members"
)]
pub(crate) async fn update_member(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<MemberRequest>, JsonRejection>,
) -> Result<Json<Envelope<MemberResponse>>, AppError> {
    let req = extract_validated_json(body)?;
    let existing = owned_member(&state, &caller, id)?;
    if req.address_id != existing.address_id {
        owned_address(&state, &caller, req.address_id)?;
    }
    let now = Utc::now();
    let date_of_birth = req.date_of_birth(now.date_naive())?;

    let changed = state.with_household(|addresses, members| {
        revise_member(addresses, members, id, &req, date_of_birth, now)
    })?;

    persist(&state, &changed).await?;
    let record = changed
        .iter()
        .find(|m| m.id == id)
        .ok_or_else(|| AppError::NotFound(format!("household member {id} not found")))?;
    Ok(data_with_message(
        MemberResponse::from(record),
        "Household member updated successfully",
    ))
}

/// DELETE /v1/household-members/{id}: Soft-delete a member. If they were
/// the primary declarant the oldest remaining member takes over.
#[utoipa::path(
    delete,
    path = "/v1/household-members/{id}",
    params(("id" = Uuid, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Member deleted", body = MessageResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "household-members"
)]
pub(crate) async fn delete_member(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let member = owned_member(&state, &caller, id)?;
    let now = Utc::now();

    let changed = state.household_members.mutate(|map| {
        let mut changed = Vec::new();
        if let Some(record) = map.get_mut(&id) {
            record.deleted_at = Some(now);
            record.is_primary_declarant = false;
            record.updated_at = now;
            changed.push(id);
        }
        if let Some(promoted) = promote_successor(map.values_mut(), member.address_id) {
            tracing::info!(member_id = %promoted, address_id = %member.address_id, "promoted successor primary declarant");
            changed.push(promoted);
        }
        collect(map, changed)
    });
    persist(&state, &changed).await?;

    tracing::info!(member_id = %id, "household member deleted");
    Ok(message("Household member deleted successfully"))
}

/// POST /v1/household-members/{id}/set-primary-declarant
#[utoipa::path(
    post,
    path = "/v1/household-members/{id}/set-primary-declarant",
    params(("id" = Uuid, Path, description = "Member ID")),
    responses(
        (status = 200, description = "Primary declarant set; body is {data: MemberResponse, message}", body = MemberResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "household-members"
)]
pub(crate) async fn set_primary_declarant(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<MemberResponse>>, AppError> {
    owned_member(&state, &caller, id)?;

    let (record, changed) = state.household_members.mutate(|map| {
        let ids = set_primary(map.values_mut(), id)?;
        let record = map
            .get(&id)
            .cloned()
            .ok_or(PrimaryError::NotFound(id))?;
        Ok::<_, PrimaryError>((record, collect(map, ids)))
    })?;
    persist(&state, &changed).await?;

    tracing::info!(member_id = %id, address_id = %record.address_id, "primary declarant set");
    Ok(data_with_message(
        MemberResponse::from(&record),
        "Primary declarant set successfully",
    ))
}
