//! # Currency & Exchange Rate API
//!
//! Currencies and rates are readable by any caller. Creating either needs
//! `manage_currencies`. Rates are append-only: recording a new rate for a
//! pair evicts that pair from the resolver's cache so the next lookup sees
//! it. Requests name currencies by ISO code; storage uses ids.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use redlane_core::exchange::MAX_RATE;
use redlane_core::validation::validate_currency_code;
use redlane_core::{Currency, ExchangeRate, Permission, RateSource};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{data, data_with_message, Envelope};
use crate::auth::{require_permission, CallerIdentity};
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_validated_json, require_text, Validate};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CurrencyRequest {
    /// ISO 4217 code; lowercase input is uppercased.
    pub code: String,
    pub name: String,
    pub symbol: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn check_code(errors: &mut FieldErrors, field: &str, code: &str) {
    if code.trim().is_empty() {
        errors.add(field, format!("The {field} field is required."));
    } else if let Err(e) = validate_currency_code(&normalize(code)) {
        errors.add(field, e.to_string());
    }
}

impl Validate for CurrencyRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        check_code(errors, "code", &self.code);
        require_text(errors, "name", &self.name, 255);
        require_text(errors, "symbol", &self.symbol, 10);
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExchangeRateRequest {
    /// Source currency code.
    pub from: String,
    /// Target currency code.
    pub to: String,
    /// Units of `to` per unit of `from`.
    pub rate: f64,
    /// Defaults to today.
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    /// Defaults to `manual`.
    #[serde(default)]
    pub source: Option<RateSource>,
}

impl Validate for ExchangeRateRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        check_code(errors, "from", &self.from);
        check_code(errors, "to", &self.to);
        if normalize(&self.from) == normalize(&self.to) {
            errors.add("to", "The to and from currencies must be different.");
        }
        errors.check(
            !(self.rate.is_finite() && self.rate > 0.0 && self.rate <= MAX_RATE),
            "rate",
            format!("The rate must be greater than 0 and at most {MAX_RATE}."),
        );
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConvertRequest {
    pub amount: f64,
    pub from: String,
    pub to: String,
}

impl Validate for ConvertRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        check_code(errors, "from", &self.from);
        check_code(errors, "to", &self.to);
        errors.check(!self.amount.is_finite(), "amount", "The amount must be a number.");
    }
}

/// A latest rate with both currency codes resolved.
#[derive(Debug, Serialize, ToSchema)]
pub struct RateView {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub from_currency_id: Uuid,
    pub to_currency_id: Uuid,
    pub rate: f64,
    pub effective_date: NaiveDate,
    pub source: RateSource,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Conversion {
    pub amount: f64,
    pub from: String,
    pub to: String,
    /// Rate applied; `null` when the amount needed no lookup.
    pub rate: Option<f64>,
    pub converted: f64,
}

/// Build the currencies router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/currencies", get(list_currencies).post(create_currency))
        .route("/v1/currencies/convert", post(convert))
        .route("/v1/exchange-rates", get(list_rates).post(create_rate))
}

/// Resolve a currency code, recording a field error when it is unknown.
fn lookup(state: &AppState, errors: &mut FieldErrors, field: &str, code: &str) -> Option<Currency> {
    let currency = state.currency_by_code(&normalize(code));
    if currency.is_none() {
        errors.add(field, format!("The selected {field} currency is invalid."));
    }
    currency
}

fn view(state: &AppState, rate: ExchangeRate) -> RateView {
    let code = |id: Uuid| {
        state
            .currencies
            .get(&id)
            .map(|c| c.code)
            .unwrap_or_default()
    };
    RateView {
        id: rate.id,
        from: code(rate.from_currency_id),
        to: code(rate.to_currency_id),
        from_currency_id: rate.from_currency_id,
        to_currency_id: rate.to_currency_id,
        rate: rate.rate,
        effective_date: rate.effective_date,
        source: rate.source,
    }
}

/// GET /v1/currencies: Every currency ordered by code.
#[utoipa::path(
    get,
    path = "/v1/currencies",
    responses((status = 200, description = "Currencies; body is {data: [Currency]}", body = Vec<Currency>)),
    security(("bearer_auth" = [])),
    tag = "currencies"
)]
pub(crate) async fn list_currencies(State(state): State<AppState>) -> Json<Envelope<Vec<Currency>>> {
    let mut currencies = state.currencies.list();
    currencies.sort_by(|a, b| a.code.cmp(&b.code));
    data(currencies)
}

/// POST /v1/currencies
#[utoipa::path(
    post,
    path = "/v1/currencies",
    request_body = CurrencyRequest,
    responses(
        (status = 201, description = "Currency created; body is {data: Currency, message}", body = Currency),
        (status = 403, description = "Missing manage_currencies", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "currencies"
)]
pub(crate) async fn create_currency(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CurrencyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Currency>>), AppError> {
    require_permission(&caller, Permission::ManageCurrencies)?;
    let req = extract_validated_json(body)?;
    let currency = Currency {
        id: Uuid::new_v4(),
        code: normalize(&req.code),
        name: req.name.trim().to_string(),
        symbol: req.symbol.trim().to_string(),
        is_active: req.is_active,
    };

    let currency = state.currencies.mutate(|map| {
        if map.values().any(|c| c.code == currency.code) {
            let mut errors = FieldErrors::new();
            errors.add("code", "The code has already been taken.");
            return Err(AppError::InvalidFields(errors));
        }
        map.insert(currency.id, currency.clone());
        Ok(currency)
    })?;

    if let Some(pool) = &state.db_pool {
        crate::db::currencies::insert(pool, &currency)
            .await
            .map_err(|e| AppError::persist_failed("currency", e))?;
    }

    tracing::info!(currency = %currency.code, "currency created");
    Ok((
        StatusCode::CREATED,
        data_with_message(currency, "Currency created successfully"),
    ))
}

/// GET /v1/exchange-rates: The rate in effect today for every pair.
#[utoipa::path(
    get,
    path = "/v1/exchange-rates",
    responses((status = 200, description = "Latest rates; body is {data: [RateView]}", body = Vec<RateView>)),
    security(("bearer_auth" = [])),
    tag = "currencies"
)]
pub(crate) async fn list_rates(State(state): State<AppState>) -> Json<Envelope<Vec<RateView>>> {
    let mut rates: Vec<RateView> = state
        .exchange
        .all_latest_rates()
        .into_iter()
        .map(|rate| view(&state, rate))
        .collect();
    rates.sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.to.cmp(&b.to)));
    data(rates)
}

/// POST /v1/exchange-rates: Record a rate for an ordered pair.
#[utoipa::path(
    post,
    path = "/v1/exchange-rates",
    request_body = ExchangeRateRequest,
    responses(
        (status = 201, description = "Rate recorded; body is {data: RateView, message}", body = RateView),
        (status = 403, description = "Missing manage_currencies", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "currencies"
)]
pub(crate) async fn create_rate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ExchangeRateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<RateView>>), AppError> {
    require_permission(&caller, Permission::ManageCurrencies)?;
    let req = extract_validated_json(body)?;

    let mut errors = FieldErrors::new();
    let from = lookup(&state, &mut errors, "from", &req.from);
    let to = lookup(&state, &mut errors, "to", &req.to);
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(AppError::InvalidFields(errors)),
    };

    let now = Utc::now();
    let rate = ExchangeRate {
        id: Uuid::new_v4(),
        from_currency_id: from.id,
        to_currency_id: to.id,
        rate: req.rate,
        effective_date: req.effective_date.unwrap_or_else(|| now.date_naive()),
        source: req.source.unwrap_or(RateSource::Manual),
        created_at: now,
    };
    if let Some(pool) = &state.db_pool {
        crate::db::currencies::insert_rate(pool, &rate)
            .await
            .map_err(|e| AppError::persist_failed("exchange rate", e))?;
    }
    state.exchange.record_rate(rate.clone())?;

    tracing::info!(from = %from.code, to = %to.code, rate = rate.rate, effective_date = %rate.effective_date, "exchange rate recorded");
    Ok((
        StatusCode::CREATED,
        data_with_message(view(&state, rate), "Exchange rate created successfully"),
    ))
}

/// POST /v1/currencies/convert: Convert an amount at today's rate.
#[utoipa::path(
    post,
    path = "/v1/currencies/convert",
    request_body = ConvertRequest,
    responses(
        (status = 200, description = "Converted amount; body is {data: Conversion}", body = Conversion),
        (status = 404, description = "No rate for the pair", body = crate::error::ErrorBody),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "currencies"
)]
pub(crate) async fn convert(
    State(state): State<AppState>,
    body: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<Envelope<Conversion>>, AppError> {
    let req = extract_validated_json(body)?;

    let mut errors = FieldErrors::new();
    let from = lookup(&state, &mut errors, "from", &req.from);
    let to = lookup(&state, &mut errors, "to", &req.to);
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) => (from, to),
        _ => return Err(AppError::InvalidFields(errors)),
    };

    let (converted, quote) = state.exchange.convert_quoted(req.amount, from.id, to.id)?;
    Ok(data(Conversion {
        amount: req.amount,
        from: from.code,
        to: to.code,
        rate: quote.map(|q| q.rate),
        converted,
    }))
}
