//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Opaque access token from /v1/auth/login or /v1/auth/register.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Red Lane API",
        version = "0.1.0",
        description = "Customs and travel-declaration backend.\n\nProvides:\n- **Accounts**: registration, login, password reset, email verification, profile\n- **Households**: addresses and household members with a single primary address and primary declarant\n- **Feature flags**: per-user and global resolution, admin overrides and statistics\n- **Duty**: duty categories and duty calculation\n- **Currencies**: currencies, append-only exchange rates, conversion\n\nAuthentication: `Authorization: Bearer <token>`. Registration, login, password reset, email verification and health probes are public.",
        license(name = "AGPL-3.0-or-later"),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Auth ────────────────────────────────────────────────────────
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::refresh,
        crate::routes::auth::me,
        crate::routes::auth::forgot_password,
        crate::routes::auth::reset_password,
        crate::routes::auth::verify_email,
        crate::routes::auth::resend_verification,
        // ── Profile ─────────────────────────────────────────────────────
        crate::routes::profile::show_profile,
        crate::routes::profile::update_profile,
        crate::routes::profile::change_password,
        // ── Addresses ───────────────────────────────────────────────────
        crate::routes::addresses::list_addresses,
        crate::routes::addresses::create_address,
        crate::routes::addresses::get_address,
        crate::routes::addresses::update_address,
        crate::routes::addresses::delete_address,
        crate::routes::addresses::set_primary_address,
        // ── Household members ───────────────────────────────────────────
        crate::routes::household_members::list_members,
        crate::routes::household_members::create_member,
        crate::routes::household_members::get_member,
        crate::routes::household_members::update_member,
        crate::routes::household_members::delete_member,
        crate::routes::household_members::set_primary_declarant,
        // ── Feature flags ───────────────────────────────────────────────
        crate::routes::feature_flags::list_flags,
        crate::routes::feature_flags::flag_stats,
        crate::routes::feature_flags::toggle_flag,
        crate::routes::feature_flags::enable_for_user,
        crate::routes::feature_flags::disable_for_user,
        crate::routes::feature_flags::admin_dashboard,
        // ── Duty categories ─────────────────────────────────────────────
        crate::routes::duty_categories::list_categories,
        crate::routes::duty_categories::create_category,
        crate::routes::duty_categories::get_category,
        crate::routes::duty_categories::update_category,
        crate::routes::duty_categories::delete_category,
        crate::routes::duty_categories::calculate_duty,
        // ── Currencies ──────────────────────────────────────────────────
        crate::routes::currencies::list_currencies,
        crate::routes::currencies::create_currency,
        crate::routes::currencies::list_rates,
        crate::routes::currencies::create_rate,
        crate::routes::currencies::convert,
        // ── Reference ───────────────────────────────────────────────────
        crate::routes::reference::relationship_types,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::MessageResponse,
            crate::state::UserResponse,
            crate::state::AddressRecord,
            crate::routes::auth::RegisterRequest,
            crate::routes::auth::LoginRequest,
            crate::routes::auth::ForgotPasswordRequest,
            crate::routes::auth::ResetPasswordRequest,
            crate::routes::auth::SessionResponse,
            crate::routes::auth::TokenResponse,
            crate::routes::profile::UpdateProfileRequest,
            crate::routes::profile::ChangePasswordRequest,
            crate::routes::addresses::AddressRequest,
            crate::routes::household_members::MemberRequest,
            crate::routes::household_members::MemberResponse,
            crate::routes::household_members::RelationshipTypeView,
            crate::routes::feature_flags::FlagList,
            crate::routes::feature_flags::FlagStatsList,
            crate::routes::feature_flags::FlagState,
            crate::routes::feature_flags::DashboardSummary,
            crate::routes::duty_categories::DutyCategoryRequest,
            crate::routes::duty_categories::CalculateRequest,
            crate::routes::currencies::CurrencyRequest,
            crate::routes::currencies::ExchangeRateRequest,
            crate::routes::currencies::ConvertRequest,
            crate::routes::currencies::RateView,
            crate::routes::currencies::Conversion,
            redlane_core::Role,
            redlane_core::ResolvedFlag,
            redlane_core::FlagStats,
            redlane_core::DutyCategory,
            redlane_core::DutyCalculation,
            redlane_core::Currency,
            redlane_core::RateSource,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, sessions, password reset, email verification"),
        (name = "profile", description = "The caller's own account"),
        (name = "addresses", description = "Addresses and the primary address"),
        (name = "household-members", description = "Household members and the primary declarant"),
        (name = "feature-flags", description = "Flag resolution, admin overrides and the gated dashboard"),
        (name = "duty-categories", description = "Duty categories and duty calculation"),
        (name = "currencies", description = "Currencies, exchange rates and conversion"),
        (name = "reference", description = "Static lookup tables"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
