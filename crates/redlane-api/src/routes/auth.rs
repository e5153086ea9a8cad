//! # Account & Session API
//!
//! Registration, login, logout, token refresh, password reset and email
//! verification. Mail delivery is out of scope: verification and reset
//! links are written to the log at `info`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use redlane_core::validation::validate_email;
use redlane_core::Role;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{data, data_with_message, message, Envelope, MessageResponse};
use crate::auth::{hash_password, verify_password, CallerIdentity};
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_validated_json, optional_text, require_text, Validate};
use crate::middleware::rate_limit::login_throttle;
use crate::state::{AppState, UserRecord, UserResponse};

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 8;

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Validate for RegisterRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        require_text(errors, "first_name", &self.first_name, 255);
        require_text(errors, "last_name", &self.last_name, 255);
        check_email(errors, &self.email);
        check_new_password(errors, "password", &self.password, &self.password_confirmation);
        optional_text(errors, "phone", self.phone.as_deref(), 20);
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        check_email(errors, &self.email);
        errors.check(self.password.is_empty(), "password", "The password field is required.");
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

impl Validate for ForgotPasswordRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        check_email(errors, &self.email);
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub password: String,
    pub password_confirmation: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        check_email(errors, &self.email);
        errors.check(self.token.trim().is_empty(), "token", "The token field is required.");
        check_new_password(errors, "password", &self.password, &self.password_confirmation);
    }
}

pub(crate) fn check_email(errors: &mut FieldErrors, email: &str) {
    if email.trim().is_empty() {
        errors.add("email", "The email field is required.");
    } else if validate_email(email).is_err() {
        errors.add("email", "The email must be a valid email address.");
    } else if email.len() > 255 {
        errors.add("email", "The email may not be greater than 255 characters.");
    }
}

pub(crate) fn check_new_password(
    errors: &mut FieldErrors,
    field: &str,
    password: &str,
    confirmation: &str,
) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            field,
            format!("The {field} must be at least {MIN_PASSWORD_LEN} characters."),
        );
    }
    if password != confirmation {
        errors.add(field, format!("The {field} confirmation does not match."));
    }
}

// ── Responses ───────────────────────────────────────────────────────────────

/// A user together with a freshly issued bearer token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Routes reachable without a token. Login is throttled per client.
pub fn public_router(state: AppState) -> Router<AppState> {
    let login = Router::new()
        .route("/v1/auth/login", post(login))
        .route_layer(from_fn_with_state(state, login_throttle));

    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/forgot-password", post(forgot_password))
        .route("/v1/auth/reset-password", post(reset_password))
        .route("/v1/auth/email/verify/{id}/{token}", get(verify_email))
        .merge(login)
}

/// Routes that need a token.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/logout", post(logout))
        .route("/v1/auth/refresh", post(refresh))
        .route("/v1/auth/me", get(me))
        .route("/v1/auth/email/resend", post(resend_verification))
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Issue a token for `user_id`, writing it through.
async fn issue_token(state: &AppState, user_id: Uuid) -> Result<String, AppError> {
    let (plaintext, token) = state.tokens.issue(user_id);
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::insert(pool, &token)
            .await
            .map_err(|e| AppError::persist_failed("access token", e))?;
    }
    Ok(plaintext)
}

async fn save_user(state: &AppState, user: &UserRecord) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        crate::db::users::update(pool, user)
            .await
            .map_err(|e| AppError::persist_failed("user", e))?;
    }
    Ok(())
}

/// Issue a fresh verification token for `user`, replacing any pending one,
/// and log the link.
pub(crate) async fn send_verification_link(
    state: &AppState,
    user: &UserRecord,
) -> Result<(), AppError> {
    let (plaintext, verification) = state.email_verifications.start(user.id);
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::upsert_verification(pool, &verification)
            .await
            .map_err(|e| AppError::persist_failed("email verification", e))?;
    }
    let link = format!(
        "{}/v1/auth/email/verify/{}/{}",
        state.config.app_url.trim_end_matches('/'),
        user.id,
        plaintext
    );
    tracing::info!(user_id = %user.id, email = %user.email, %link, "email verification link");
    Ok(())
}

fn session(user: &UserRecord, token: String) -> SessionResponse {
    SessionResponse {
        user: UserResponse::from(user),
        token,
        token_type: "Bearer".to_string(),
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/auth/register
///
/// Create an account and sign in.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; body is {data: SessionResponse, message}", body = SessionResponse),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<SessionResponse>>), AppError> {
    let req = extract_validated_json(body)?;
    let hash = hash_password(&req.password)?;

    let mut user = UserRecord::new(
        req.first_name.trim(),
        req.last_name.trim(),
        req.email.trim(),
        &hash,
        Role::User,
    );
    user.phone = req.phone;

    let inserted = state.users.mutate(|users| {
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            false
        } else {
            users.insert(user.id, user.clone());
            true
        }
    });
    if !inserted {
        let mut errors = FieldErrors::new();
        errors.add("email", "The email has already been taken.");
        return Err(AppError::InvalidFields(errors));
    }

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::insert(pool, &user).await {
            state.users.remove(&user.id);
            return Err(AppError::persist_failed("user", e));
        }
    }

    tracing::info!(user_id = %user.id, "user registered");
    send_verification_link(&state, &user).await?;
    let token = issue_token(&state, user.id).await?;

    Ok((
        StatusCode::CREATED,
        data_with_message(
            session(&user, token),
            "Registration successful. Please verify your email address.",
        ),
    ))
}

/// POST /v1/auth/login
///
/// Exchange credentials for a token.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; body is {data: SessionResponse, message}", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
        (status = 403, description = "Email not verified", body = crate::error::ErrorBody),
        (status = 429, description = "Too many attempts", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Envelope<SessionResponse>>, AppError> {
    let req = extract_validated_json(body)?;

    let user = state
        .user_by_email(req.email.trim())
        .filter(|user| verify_password(&req.password, &user.password_hash));
    let Some(user) = user else {
        tracing::warn!(email = %req.email, "login failed: invalid credentials");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !user.is_verified() {
        tracing::warn!(user_id = %user.id, "login refused: email not verified");
        return Err(AppError::Forbidden(
            "Please verify your email address before logging in.".into(),
        ));
    }

    let token = issue_token(&state, user.id).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(data_with_message(session(&user, token), "Login successful"))
}

/// POST /v1/auth/logout
///
/// Revoke the token used for this request.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses((status = 200, description = "Token revoked", body = MessageResponse)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<MessageResponse>, AppError> {
    state.tokens.revoke(&caller.token_digest);
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::delete(pool, &caller.token_digest)
            .await
            .map_err(|e| AppError::persist_failed("token revocation", e))?;
    }
    tracing::info!(user_id = %caller.user_id, "user logged out");
    Ok(message("Logged out successfully"))
}

/// POST /v1/auth/refresh
///
/// Replace the current token with a new one.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses((status = 200, description = "New token; body is {data: TokenResponse, message}", body = TokenResponse)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub(crate) async fn refresh(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Envelope<TokenResponse>>, AppError> {
    state.tokens.revoke(&caller.token_digest);
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::delete(pool, &caller.token_digest)
            .await
            .map_err(|e| AppError::persist_failed("token revocation", e))?;
    }
    let token = issue_token(&state, caller.user_id).await?;
    Ok(data_with_message(
        TokenResponse {
            token,
            token_type: "Bearer".to_string(),
        },
        "Token refreshed successfully",
    ))
}

/// GET /v1/auth/me
///
/// The authenticated user.
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses((status = 200, description = "Current user; body is {data: UserResponse}", body = UserResponse)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub(crate) async fn me(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Envelope<UserResponse>>, AppError> {
    let user = state
        .users
        .get(&caller.user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", caller.user_id)))?;
    Ok(data(UserResponse::from(&user)))
}

/// POST /v1/auth/forgot-password
///
/// Start a password reset.
///
/// Always answers 200 so the endpoint cannot be used to probe for accounts.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 200, description = "Reset link sent if the account exists", body = MessageResponse)),
    tag = "auth"
)]
pub(crate) async fn forgot_password(
    State(state): State<AppState>,
    body: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = extract_validated_json(body)?;

    if let Some(user) = state.user_by_email(req.email.trim()) {
        let (plaintext, reset) = state.password_resets.start(&user.email);
        if let Some(pool) = &state.db_pool {
            crate::db::tokens::upsert_reset(pool, &reset)
                .await
                .map_err(|e| AppError::persist_failed("password reset", e))?;
        }
        let link = format!(
            "{}/reset-password?token={}&email={}",
            state.config.app_url.trim_end_matches('/'),
            plaintext,
            user.email
        );
        tracing::info!(user_id = %user.id, %link, "password reset link");
    } else {
        tracing::info!(email = %req.email, "password reset requested for unknown email");
    }

    Ok(message(
        "If that email address is registered, a password reset link has been sent.",
    ))
}

/// POST /v1/auth/reset-password
///
/// Complete a password reset.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn reset_password(
    State(state): State<AppState>,
    body: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let invalid = || AppError::BadRequest("This password reset token is invalid or has expired.".into());

    let user = state.user_by_email(req.email.trim()).ok_or_else(invalid)?;
    let reset = state.password_resets.get(&user.email).ok_or_else(invalid)?;
    if !reset.accepts(&req.token, Utc::now()) {
        tracing::warn!(user_id = %user.id, "password reset rejected: bad or expired token");
        return Err(invalid());
    }

    let hash = hash_password(&req.password)?;
    let user = state
        .users
        .update(&user.id, |u| {
            u.password_hash = hash;
            u.updated_at = Utc::now();
        })
        .ok_or_else(invalid)?;
    state.password_resets.remove(&user.email);
    state.tokens.revoke_all(user.id);

    if let Some(pool) = &state.db_pool {
        crate::db::users::update(pool, &user)
            .await
            .map_err(|e| AppError::persist_failed("user", e))?;
        crate::db::tokens::delete_reset(pool, &user.email)
            .await
            .map_err(|e| AppError::persist_failed("password reset", e))?;
        crate::db::tokens::delete_for_user(pool, user.id)
            .await
            .map_err(|e| AppError::persist_failed("token revocation", e))?;
    }

    tracing::info!(user_id = %user.id, "password reset completed");
    Ok(message("Password has been reset successfully."))
}

/// GET /v1/auth/email/verify/{id}/{token}
///
/// Confirm an email address with the single-use token from the link.
#[utoipa::path(
    get,
    path = "/v1/auth/email/verify/{id}/{token}",
    params(
        ("id" = Uuid, Path, description = "User ID"),
        ("token" = String, Path, description = "Verification token from the link"),
    ),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 403, description = "Invalid verification link", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown user", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub(crate) async fn verify_email(
    State(state): State<AppState>,
    Path((id, token)): Path<(Uuid, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    if user.is_verified() {
        return Ok(message("Email already verified"));
    }

    let accepted = state
        .email_verifications
        .get(&id)
        .is_some_and(|pending| pending.accepts(&token, Utc::now()));
    if !accepted {
        tracing::warn!(user_id = %id, "email verification rejected: bad or expired token");
        return Err(AppError::Forbidden("Invalid or expired verification link".into()));
    }

    let now = Utc::now();
    let user = state
        .users
        .update(&id, |u| {
            u.email_verified_at = Some(now);
            u.updated_at = now;
        })
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
    state.email_verifications.remove(&id);
    save_user(&state, &user).await?;
    if let Some(pool) = &state.db_pool {
        crate::db::tokens::delete_verification(pool, id)
            .await
            .map_err(|e| AppError::persist_failed("email verification", e))?;
    }

    tracing::info!(user_id = %id, "email verified");
    Ok(message("Email verified successfully"))
}

/// POST /v1/auth/email/resend
///
/// Send the verification link again.
#[utoipa::path(
    post,
    path = "/v1/auth/email/resend",
    responses((status = 200, description = "Link sent, or already verified", body = MessageResponse)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub(crate) async fn resend_verification(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state
        .users
        .get(&caller.user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", caller.user_id)))?;
    if user.is_verified() {
        return Ok(message("Email already verified"));
    }
    send_verification_link(&state, &user).await?;
    Ok(message("Verification link sent"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app_as, caller, send};
    use serde_json::json;

    fn public_app(state: &AppState) -> Router {
        public_router(state.clone()).with_state(state.clone())
    }

    fn registration(email: &str) -> serde_json::Value {
        json!({
            "first_name": "Grace",
            "last_name": "Hopper",
            "email": email,
            "password": "cobol-1959",
            "password_confirmation": "cobol-1959"
        })
    }

    #[test]
    fn register_validation_collects_fields() {
        let req = RegisterRequest {
            first_name: "".into(),
            last_name: "Hopper".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            password_confirmation: "different".into(),
            phone: None,
        };
        let mut errors = FieldErrors::new();
        req.validate(&mut errors);
        assert!(errors.get("first_name").is_some());
        assert!(errors.get("email").is_some());
        assert_eq!(errors.get("password").unwrap().len(), 2);
        assert!(errors.get("last_name").is_none());
    }

    #[tokio::test]
    async fn register_returns_session() {
        let state = AppState::new();
        let (status, body) = send(
            public_app(&state),
            "POST",
            "/v1/auth/register",
            Some(registration("grace@example.com")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user"]["email"], "grace@example.com");
        assert_eq!(body["data"]["user"]["role"], "user");
        assert!(body["data"]["user"].get("password_hash").is_none());
        assert_eq!(body["data"]["token_type"], "Bearer");
        assert_eq!(state.tokens.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let state = AppState::new();
        let app = public_app(&state);
        send(app.clone(), "POST", "/v1/auth/register", Some(registration("dup@example.com"))).await;
        let (status, body) = send(
            app,
            "POST",
            "/v1/auth/register",
            Some(registration("DUP@example.com")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["error"]["details"]["email"][0],
            "The email has already been taken."
        );
        assert_eq!(state.users.len(), 1);
    }

    #[tokio::test]
    async fn unverified_login_forbidden_then_allowed() {
        let state = AppState::new();
        let app = public_app(&state);
        send(app.clone(), "POST", "/v1/auth/register", Some(registration("ada@example.com"))).await;
        let credentials = json!({"email": "ada@example.com", "password": "cobol-1959"});

        let (status, _) = send(app.clone(), "POST", "/v1/auth/login", Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let user = state.user_by_email("ada@example.com").unwrap();
        let (token, _) = state.email_verifications.start(user.id);
        let uri = format!("/v1/auth/email/verify/{}/{token}", user.id);
        let (status, body) = send(app.clone(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Email verified successfully");
        assert!(state.email_verifications.get(&user.id).is_none());

        let (status, body) = send(app, "POST", "/v1/auth/login", Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");
    }

    #[tokio::test]
    async fn wrong_password_unauthorized() {
        let state = AppState::new();
        let app = public_app(&state);
        send(app.clone(), "POST", "/v1/auth/register", Some(registration("bob@example.com"))).await;
        let (status, body) = send(
            app,
            "POST",
            "/v1/auth/login",
            Some(json!({"email": "bob@example.com", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"]["message"].as_str().unwrap().contains("Invalid credentials"));
    }

    #[tokio::test]
    async fn link_derived_from_email_is_rejected() {
        let state = AppState::new();
        let app = public_app(&state);
        send(app.clone(), "POST", "/v1/auth/register", Some(registration("victim@bank.example"))).await;
        let user = state.user_by_email("victim@bank.example").unwrap();
        assert!(state.email_verifications.get(&user.id).is_some());

        let forged = crate::auth::sha256_hex(&user.email);
        let uri = format!("/v1/auth/email/verify/{}/{forged}", user.id);
        let (status, _) = send(app.clone(), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!state.users.get(&user.id).unwrap().is_verified());

        let credentials = json!({"email": "victim@bank.example", "password": "cobol-1959"});
        let (status, _) = send(app, "POST", "/v1/auth/login", Some(credentials)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn resend_replaces_pending_link() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        state.users.update(&identity.user_id, |u| u.email_verified_at = None);
        let (old, _) = state.email_verifications.start(identity.user_id);

        let (status, body) = send(
            app_as(router(), &state, identity.clone()),
            "POST",
            "/v1/auth/email/resend",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Verification link sent");

        let pending = state.email_verifications.get(&identity.user_id).unwrap();
        assert!(!pending.accepts(&old, Utc::now()));
        let uri = format!("/v1/auth/email/verify/{}/{old}", identity.user_id);
        let (status, _) = send(public_app(&state), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn bad_verification_token_forbidden() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        state.users.update(&identity.user_id, |u| u.email_verified_at = None);
        state.email_verifications.start(identity.user_id);
        let uri = format!("/v1/auth/email/verify/{}/deadbeef", identity.user_id);
        let (status, _) = send(public_app(&state), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let uri = format!("/v1/auth/email/verify/{}/deadbeef", Uuid::new_v4());
        let (status, _) = send(public_app(&state), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forgot_password_never_reveals_accounts() {
        let state = AppState::new();
        let (status, body) = send(
            public_app(&state),
            "POST",
            "/v1/auth/forgot-password",
            Some(json!({"email": "nobody@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("If that email"));
    }

    #[tokio::test]
    async fn reset_with_bad_token_is_bad_request() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let email = state.users.get(&identity.user_id).unwrap().email;
        state.password_resets.start(&email);

        let (status, _) = send(
            public_app(&state),
            "POST",
            "/v1/auth/reset-password",
            Some(json!({
                "email": email,
                "token": "not-the-token",
                "password": "new-password",
                "password_confirmation": "new-password"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reset_with_valid_token_rotates_credentials() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let email = state.users.get(&identity.user_id).unwrap().email;
        state.tokens.issue(identity.user_id);
        let (token, _) = state.password_resets.start(&email);

        let (status, _) = send(
            public_app(&state),
            "POST",
            "/v1/auth/reset-password",
            Some(json!({
                "email": email,
                "token": token,
                "password": "new-password",
                "password_confirmation": "new-password"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let user = state.users.get(&identity.user_id).unwrap();
        assert!(verify_password("new-password", &user.password_hash));
        assert!(state.tokens.is_empty());
        assert!(state.password_resets.get(&email).is_none());
    }

    #[tokio::test]
    async fn refresh_rotates_token() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let (old, record) = state.tokens.issue(identity.user_id);
        let identity = CallerIdentity {
            token_digest: record.digest,
            ..identity
        };

        let (status, body) = send(app_as(router(), &state, identity), "POST", "/v1/auth/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        let new = body["data"]["token"].as_str().unwrap();
        assert_ne!(new, old);
        assert!(state.tokens.resolve(&old).is_none());
        assert!(state.tokens.resolve(new).is_some());
    }

    #[tokio::test]
    async fn logout_revokes_current_token() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let (token, record) = state.tokens.issue(identity.user_id);
        let identity = CallerIdentity {
            token_digest: record.digest,
            ..identity
        };
        let (status, _) = send(app_as(router(), &state, identity), "POST", "/v1/auth/logout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.tokens.resolve(&token).is_none());
    }

    #[tokio::test]
    async fn me_returns_caller() {
        let state = AppState::new();
        let identity = caller(&state, Role::CustomsOfficer);
        let id = identity.user_id;
        let (status, body) = send(app_as(router(), &state, identity), "GET", "/v1/auth/me", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id.to_string());
        assert_eq!(body["data"]["role"], "customs_officer");
    }

    #[tokio::test]
    async fn login_is_throttled() {
        let config = crate::state::AppConfig {
            login_max_attempts: 2,
            ..crate::state::AppConfig::default()
        };
        let state = AppState::with_config(config, None);
        let app = public_app(&state);
        let credentials = json!({"email": "x@example.com", "password": "whatever"});
        for _ in 0..2 {
            let (status, _) = send(app.clone(), "POST", "/v1/auth/login", Some(credentials.clone())).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let (status, body) = send(app, "POST", "/v1/auth/login", Some(credentials)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "TOO_MANY_ATTEMPTS");
    }
}
