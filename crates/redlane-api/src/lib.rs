//! # redlane-api: Axum API Service
//!
//! HTTP surface for Red Lane, built on Axum/Tower/Tokio. Assembles the
//! resource routers into one application with shared middleware for
//! authentication, login throttling, feature gating and tracing.
//!
//! ## Routers
//!
//! - `/v1/auth/*`: registration, sessions, password reset, email verification
//! - `/v1/profile`: the caller's account
//! - `/v1/addresses/*`, `/v1/household-members/*`: households
//! - `/v1/feature-flags`, `/v1/admin/*`: flags and the gated dashboard
//! - `/v1/duty-categories/*`: duty categories and calculation
//! - `/v1/currencies/*`, `/v1/exchange-rates`: currencies and rates
//! - `/v1/reference/*`: static lookup tables
//! - `/health/*`, `/openapi.json`: unauthenticated
//!
//! ## Middleware Stack (Tower)
//!
//! TraceLayer → AuthLayer (protected routes only) → per-route layers
//! (login throttle, feature gate)
//!
//! ## Crate Policy
//!
//! - Business rules live in `redlane-core`; handlers validate, delegate,
//!   and write through.
//! - All errors map to structured HTTP responses via `AppError`.

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let protected = Router::new()
        .merge(routes::auth::router())
        .merge(routes::profile::router())
        .merge(routes::addresses::router())
        .merge(routes::household_members::router())
        .merge(routes::feature_flags::router(&state))
        .merge(routes::duty_categories::router())
        .merge(routes::currencies::router())
        .merge(routes::reference::router())
        .route_layer(from_fn_with_state(state.clone(), auth::auth_middleware));

    let public = Router::new()
        .route("/health", get(health))
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .merge(openapi::router())
        .merge(routes::auth::public_router(state.clone()));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "redlane-api" }))
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::ping(pool).await {
            tracing::error!(error = %e, "readiness check failed: database unreachable");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}
