//! # Duty Category API
//!
//! Anyone signed in can read categories and run a calculation. Writes need
//! `manage_duty_categories`. Calculation refuses categories that are
//! inactive or outside their effective window.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use redlane_core::duty::{validate_effective_range, MAX_DUTY_RATE};
use redlane_core::reference::unit_type;
use redlane_core::validation::validate_range;
use redlane_core::{CalculationMethod, DutyCalculation, DutyCategory, Permission};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{data, data_with_message, message, Envelope, MessageResponse};
use crate::auth::{require_permission, CallerIdentity};
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_validated_json, optional_text, require_text, Validate};
use crate::state::AppState;

/// Largest exemption the schema can hold.
const MAX_EXEMPTION: f64 = 99_999_999.99;

/// Body of create and update requests. Updates replace every field.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DutyCategoryRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon_name: Option<String>,
    /// `percentage`, `per_liter`, `per_kilogram` or `per_unit`.
    pub calculation_method: String,
    pub duty_rate: f64,
    #[serde(default)]
    pub duty_unit: Option<String>,
    #[serde(default)]
    pub exemption_quantity: Option<f64>,
    #[serde(default)]
    pub exemption_unit: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

fn check_unit(errors: &mut FieldErrors, field: &str, unit: Option<&str>) {
    if let Some(unit) = unit {
        errors.check(
            unit_type(unit).is_none(),
            field,
            format!("The selected {field} is invalid."),
        );
    }
}

impl Validate for DutyCategoryRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        require_text(errors, "code", &self.code, 50);
        require_text(errors, "name", &self.name, 255);
        optional_text(errors, "icon_name", self.icon_name.as_deref(), 255);
        if let Err(e) = CalculationMethod::from_code(&self.calculation_method) {
            errors.add("calculation_method", e.to_string());
        }
        if let Err(e) = validate_range("duty_rate", self.duty_rate, 0.0, MAX_DUTY_RATE) {
            errors.add("duty_rate", e.to_string());
        }
        if let Some(exemption) = self.exemption_quantity {
            if let Err(e) = validate_range("exemption_quantity", exemption, 0.0, MAX_EXEMPTION) {
                errors.add("exemption_quantity", e.to_string());
            }
        }
        check_unit(errors, "duty_unit", self.duty_unit.as_deref());
        check_unit(errors, "exemption_unit", self.exemption_unit.as_deref());
        if let Err(e) = validate_effective_range(self.effective_from, self.effective_to) {
            errors.add("effective_to", e.to_string());
        }
    }
}

impl DutyCategoryRequest {
    fn apply(self, category: &mut DutyCategory) {
        category.code = self.code.trim().to_string();
        category.name = self.name.trim().to_string();
        category.description = self.description;
        category.icon_name = self.icon_name;
        category.calculation_method = self.calculation_method;
        category.duty_rate = self.duty_rate;
        category.duty_unit = self.duty_unit;
        category.exemption_quantity = self.exemption_quantity;
        category.exemption_unit = self.exemption_unit;
        category.is_active = self.is_active;
        category.effective_from = self.effective_from;
        category.effective_to = self.effective_to;
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryFilter {
    /// Only active categories when `true`.
    #[serde(default)]
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CalculateRequest {
    /// Quantity in the category's unit, or declared value for `percentage`.
    pub quantity: f64,
}

/// Build the duty categories router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/duty-categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/v1/duty-categories/{id}",
            get(get_category)
                .put(update_category)
                .delete(delete_category),
        )
        .route("/v1/duty-categories/{id}/calculate", post(calculate_duty))
}

fn find(state: &AppState, id: Uuid) -> Result<DutyCategory, AppError> {
    state
        .duty_categories
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("duty category {id} not found")))
}

fn code_taken_error() -> AppError {
    let mut errors = FieldErrors::new();
    errors.add("code", "The code has already been taken.");
    AppError::InvalidFields(errors)
}

/// GET /v1/duty-categories: All categories ordered by name.
#[utoipa::path(
    get,
    path = "/v1/duty-categories",
    params(("active" = Option<bool>, Query, description = "Only active categories")),
    responses((status = 200, description = "Categories; body is {data: [DutyCategory]}", body = Vec<DutyCategory>)),
    security(("bearer_auth" = [])),
    tag = "duty-categories"
)]
pub(crate) async fn list_categories(
    State(state): State<AppState>,
    Query(filter): Query<CategoryFilter>,
) -> Json<Envelope<Vec<DutyCategory>>> {
    let mut categories = match filter.active {
        Some(true) => state.duty_categories.filter(|c| c.is_active),
        _ => state.duty_categories.list(),
    };
    categories.sort_by(|a, b| a.name.cmp(&b.name));
    data(categories)
}

/// POST /v1/duty-categories
#[utoipa::path(
    post,
    path = "/v1/duty-categories",
    request_body = DutyCategoryRequest,
    responses(
        (status = 201, description = "Category created; body is {data: DutyCategory, message}", body = DutyCategory),
        (status = 403, description = "Missing manage_duty_categories", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "duty-categories"
)]
pub(crate) async fn create_category(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<DutyCategoryRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<DutyCategory>>), AppError> {
    require_permission(&caller, Permission::ManageDutyCategories)?;
    let req = extract_validated_json(body)?;
    let now = Utc::now();
    let mut category = DutyCategory {
        id: Uuid::new_v4(),
        code: String::new(),
        name: String::new(),
        description: None,
        icon_name: None,
        calculation_method: String::new(),
        duty_rate: 0.0,
        duty_unit: None,
        exemption_quantity: None,
        exemption_unit: None,
        is_active: true,
        effective_from: None,
        effective_to: None,
        created_at: now,
        updated_at: now,
    };
    req.apply(&mut category);

    let category = state.duty_categories.mutate(|map| {
        if map.values().any(|c| c.code == category.code) {
            return Err(code_taken_error());
        }
        map.insert(category.id, category.clone());
        Ok(category)
    })?;

    if let Some(pool) = &state.db_pool {
        crate::db::duty_categories::insert(pool, &category)
            .await
            .map_err(|e| AppError::persist_failed("duty category", e))?;
    }

    tracing::info!(category_id = %category.id, code = %category.code, "duty category created");
    Ok((
        StatusCode::CREATED,
        data_with_message(category, "Duty category created successfully"),
    ))
}

/// GET /v1/duty-categories/{id}
#[utoipa::path(
    get,
    path = "/v1/duty-categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category; body is {data: DutyCategory}", body = DutyCategory),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "duty-categories"
)]
pub(crate) async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<DutyCategory>>, AppError> {
    Ok(data(find(&state, id)?))
}

/// PUT /v1/duty-categories/{id}
#[utoipa::path(
    put,
    path = "/v1/duty-categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = DutyCategoryRequest,
    responses(
        (status = 200, description = "Category updated; body is {data: DutyCategory, message}", body = DutyCategory),
        (status = 403, description = "Missing manage_duty_categories", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "duty-categories"
)]
pub(crate) async fn update_category(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<DutyCategoryRequest>, JsonRejection>,
) -> Result<Json<Envelope<DutyCategory>>, AppError> {
    require_permission(&caller, Permission::ManageDutyCategories)?;
    let req = extract_validated_json(body)?;

    let category = state.duty_categories.mutate(|map| {
        let code = req.code.trim();
        if map.values().any(|c| c.id != id && c.code == code) {
            return Err(code_taken_error());
        }
        let category = map
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("duty category {id} not found")))?;
        req.apply(category);
        category.updated_at = Utc::now();
        Ok(category.clone())
    })?;

    if let Some(pool) = &state.db_pool {
        crate::db::duty_categories::update(pool, &category)
            .await
            .map_err(|e| AppError::persist_failed("duty category", e))?;
    }

    tracing::info!(category_id = %id, "duty category updated");
    Ok(data_with_message(category, "Duty category updated successfully"))
}

/// DELETE /v1/duty-categories/{id}
#[utoipa::path(
    delete,
    path = "/v1/duty-categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category deleted", body = MessageResponse),
        (status = 403, description = "Missing manage_duty_categories", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "duty-categories"
)]
pub(crate) async fn delete_category(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    require_permission(&caller, Permission::ManageDutyCategories)?;
    state
        .duty_categories
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("duty category {id} not found")))?;

    if let Some(pool) = &state.db_pool {
        crate::db::duty_categories::delete(pool, id)
            .await
            .map_err(|e| AppError::persist_failed("duty category", e))?;
    }

    tracing::info!(category_id = %id, "duty category deleted");
    Ok(message("Duty category deleted successfully"))
}

/// POST /v1/duty-categories/{id}/calculate: Duty owed on a quantity.
#[utoipa::path(
    post,
    path = "/v1/duty-categories/{id}/calculate",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = CalculateRequest,
    responses(
        (status = 200, description = "Calculated duty; body is {data: DutyCalculation}", body = DutyCalculation),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Category inactive or not in effect", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "duty-categories"
)]
pub(crate) async fn calculate_duty(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<CalculateRequest>, JsonRejection>,
) -> Result<Json<Envelope<DutyCalculation>>, AppError> {
    let req = crate::extractors::extract_json(body)?;
    if !req.quantity.is_finite() {
        return Err(AppError::Validation("quantity must be a finite number".into()));
    }
    let category = find(&state, id)?;
    if !category.is_active {
        return Err(AppError::Conflict(format!(
            "duty category '{}' is not active",
            category.code
        )));
    }
    let today = Utc::now().date_naive();
    if !category.is_effective_on(today) {
        return Err(AppError::Conflict(format!(
            "duty category '{}' is not in effect on {today}",
            category.code
        )));
    }

    let duty = category.calculate(req.quantity)?;
    tracing::debug!(category = %category.code, quantity = req.quantity, duty, "duty calculated");
    Ok(data(DutyCalculation {
        category: category.code,
        method: category.calculation_method,
        quantity: req.quantity,
        duty,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app_as, caller, send};
    use redlane_core::Role;
    use serde_json::{json, Value};

    fn category_id(state: &AppState, code: &str) -> Uuid {
        state
            .duty_categories
            .filter(|c| c.code == code)
            .first()
            .map(|c| c.id)
            .unwrap()
    }

    fn new_category() -> Value {
        json!({
            "code": "perfume",
            "name": "Perfume",
            "calculation_method": "percentage",
            "duty_rate": 10.0
        })
    }

    async fn calculate(app: Router, id: Uuid, quantity: f64) -> (StatusCode, Value) {
        send(
            app,
            "POST",
            &format!("/v1/duty-categories/{id}/calculate"),
            Some(json!({ "quantity": quantity })),
        )
        .await
    }

    #[tokio::test]
    async fn seeded_categories_calculate() {
        let state = AppState::new();
        let app = app_as(router(), &state, caller(&state, Role::User));

        let (status, body) = calculate(app.clone(), category_id(&state, "standard"), 100.0).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["duty"], 25.0);
        assert_eq!(body["data"]["method"], "percentage");

        let alcohol = category_id(&state, "alcohol");
        let (_, body) = calculate(app.clone(), alcohol, 1.0).await;
        assert_eq!(body["data"]["duty"], 0.0);
        let (_, body) = calculate(app, alcohol, 3.0).await;
        assert_eq!(body["data"]["duty"], 30.0);
    }

    #[tokio::test]
    async fn inactive_category_conflicts() {
        let state = AppState::new();
        let id = category_id(&state, "tobacco");
        state.duty_categories.update(&id, |c| c.is_active = false);
        let app = app_as(router(), &state, caller(&state, Role::User));
        let (status, _) = calculate(app, id, 2.0).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn future_category_conflicts() {
        let state = AppState::new();
        let id = category_id(&state, "cigars");
        let next_year = Utc::now().date_naive() + chrono::Duration::days(365);
        state.duty_categories.update(&id, |c| c.effective_from = Some(next_year));
        let app = app_as(router(), &state, caller(&state, Role::User));
        let (status, _) = calculate(app, id, 2.0).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn corrupt_method_is_internal_error() {
        let state = AppState::new();
        let id = category_id(&state, "cigars");
        state
            .duty_categories
            .update(&id, |c| c.calculation_method = "per_parsec".into());
        let app = app_as(router(), &state, caller(&state, Role::User));
        let (status, body) = calculate(app, id, 2.0).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn writes_need_permission() {
        let state = AppState::new();
        let app = app_as(router(), &state, caller(&state, Role::CustomsOfficer));
        let (status, _) = send(app, "POST", "/v1/duty-categories", Some(new_category())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_crud_cycle() {
        let state = AppState::new();
        let app = app_as(router(), &state, caller(&state, Role::Admin));

        let (status, created) = send(app.clone(), "POST", "/v1/duty-categories", Some(new_category())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["message"], "Duty category created successfully");
        let uri = format!("/v1/duty-categories/{}", created["data"]["id"].as_str().unwrap());

        let mut body = new_category();
        body["duty_rate"] = json!(12.5);
        body["is_active"] = json!(false);
        let (status, updated) = send(app.clone(), "PUT", &uri, Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["data"]["duty_rate"], 12.5);
        assert_eq!(updated["data"]["is_active"], false);

        let (_, active) = send(app.clone(), "GET", "/v1/duty-categories?active=true", None).await;
        assert!(active["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|c| c["code"] != "perfume"));

        let (status, _) = send(app.clone(), "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validation_reports_every_field() {
        let state = AppState::new();
        let app = app_as(router(), &state, caller(&state, Role::Admin));
        let body = json!({
            "code": "alcohol",
            "name": "Spirits",
            "calculation_method": "per_barrel",
            "duty_rate": -1.0,
            "exemption_quantity": -2.0,
            "duty_unit": "gallons",
            "effective_from": "2025-06-01",
            "effective_to": "2025-01-01"
        });
        let (status, body) = send(app.clone(), "POST", "/v1/duty-categories", Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let details = &body["error"]["details"];
        for field in ["calculation_method", "duty_rate", "exemption_quantity", "duty_unit", "effective_to"] {
            assert!(details[field].is_array(), "missing {field}");
        }

        let mut duplicate = new_category();
        duplicate["code"] = json!("alcohol");
        let (status, body) = send(app, "POST", "/v1/duty-categories", Some(duplicate)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"]["code"][0], "The code has already been taken.");
    }
}
