//! # Profile API
//!
//! The caller's own account: read, update, change password. Changing the
//! email clears its verification and sends a new link.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use super::auth::{check_email, check_new_password, send_verification_link};
use super::{data, data_with_message, message, Envelope, MessageResponse};
use crate::auth::{hash_password, verify_password, CallerIdentity};
use crate::error::{AppError, FieldErrors};
use crate::extractors::{extract_validated_json, optional_text, require_text, Validate};
use crate::state::{AppState, UserRecord, UserResponse};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        if let Some(first_name) = &self.first_name {
            require_text(errors, "first_name", first_name, 255);
        }
        if let Some(last_name) = &self.last_name {
            require_text(errors, "last_name", last_name, 255);
        }
        if let Some(email) = &self.email {
            check_email(errors, email);
        }
        optional_text(errors, "phone", self.phone.as_deref(), 20);
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self, errors: &mut FieldErrors) {
        errors.check(
            self.current_password.is_empty(),
            "current_password",
            "The current password field is required.",
        );
        check_new_password(
            errors,
            "new_password",
            &self.new_password,
            &self.new_password_confirmation,
        );
    }
}

/// Build the profile router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/profile", get(show_profile).put(update_profile))
        .route("/v1/profile/change-password", post(change_password))
}

fn current_user(state: &AppState, caller: &CallerIdentity) -> Result<UserRecord, AppError> {
    state
        .users
        .get(&caller.user_id)
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", caller.user_id)))
}

async fn persist(state: &AppState, user: &UserRecord) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        crate::db::users::update(pool, user)
            .await
            .map_err(|e| AppError::persist_failed("user", e))?;
    }
    Ok(())
}

/// GET /v1/profile
///
/// The caller's profile.
#[utoipa::path(
    get,
    path = "/v1/profile",
    responses((status = 200, description = "Profile; body is {data: UserResponse}", body = UserResponse)),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub(crate) async fn show_profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Envelope<UserResponse>>, AppError> {
    let user = current_user(&state, &caller)?;
    Ok(data(UserResponse::from(&user)))
}

/// PUT /v1/profile
///
/// Update names, email or phone.
#[utoipa::path(
    put,
    path = "/v1/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile; body is {data: UserResponse, message}", body = UserResponse),
        (status = 422, description = "Validation failed", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub(crate) async fn update_profile(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<Envelope<UserResponse>>, AppError> {
    let req = extract_validated_json(body)?;
    let new_email = req.email.as_deref().map(str::trim).map(str::to_string);

    let outcome = state.users.mutate(|users| -> Result<(UserRecord, bool), AppError> {
        if let Some(email) = &new_email {
            let taken = users
                .values()
                .any(|u| u.id != caller.user_id && u.email.eq_ignore_ascii_case(email));
            if taken {
                let mut errors = FieldErrors::new();
                errors.add("email", "The email has already been taken.");
                return Err(AppError::InvalidFields(errors));
            }
        }
        let user = users
            .get_mut(&caller.user_id)
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", caller.user_id)))?;

        let mut email_changed = false;
        if let Some(first_name) = req.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(email) = new_email {
            if !email.eq_ignore_ascii_case(&user.email) {
                user.email = email;
                user.email_verified_at = None;
                email_changed = true;
            }
        }
        if req.phone.is_some() {
            user.phone = req.phone;
        }
        user.updated_at = Utc::now();
        Ok((user.clone(), email_changed))
    });
    let (user, email_changed) = outcome?;

    persist(&state, &user).await?;
    if email_changed {
        tracing::info!(user_id = %user.id, "email changed; verification reset");
        send_verification_link(&state, &user).await?;
    }
    Ok(data_with_message(
        UserResponse::from(&user),
        "Profile updated successfully",
    ))
}

/// POST /v1/profile/change-password
///
/// Change the caller's password.
#[utoipa::path(
    post,
    path = "/v1/profile/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 422, description = "Wrong current password or invalid new password", body = crate::error::ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub(crate) async fn change_password(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let user = current_user(&state, &caller)?;

    if !verify_password(&req.current_password, &user.password_hash) {
        tracing::warn!(user_id = %user.id, "password change rejected: wrong current password");
        let mut errors = FieldErrors::new();
        errors.add("current_password", "The current password is incorrect.");
        return Err(AppError::InvalidFields(errors));
    }

    let hash = hash_password(&req.new_password)?;
    let user = state
        .users
        .update(&user.id, |u| {
            u.password_hash = hash;
            u.updated_at = Utc::now();
        })
        .ok_or_else(|| AppError::NotFound(format!("user {} not found", caller.user_id)))?;
    persist(&state, &user).await?;

    tracing::info!(user_id = %user.id, "password changed");
    Ok(message("Password changed successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app_as, caller, send};
    use axum::http::StatusCode;
    use redlane_core::Role;
    use serde_json::json;

    #[tokio::test]
    async fn show_returns_caller() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let (status, body) = send(app_as(router(), &state, identity), "GET", "/v1/profile", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["first_name"], "Test");
    }

    #[tokio::test]
    async fn email_change_clears_verification() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let id = identity.user_id;
        let (status, body) = send(
            app_as(router(), &state, identity),
            "PUT",
            "/v1/profile",
            Some(json!({"email": "fresh@example.com", "first_name": "Renamed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "fresh@example.com");
        assert_eq!(body["data"]["first_name"], "Renamed");
        assert!(body["data"]["email_verified_at"].is_null());
        assert!(!state.users.get(&id).unwrap().is_verified());
    }

    #[tokio::test]
    async fn email_taken_by_other_user_rejected() {
        let state = AppState::new();
        let other = caller(&state, Role::User);
        let other_email = state.users.get(&other.user_id).unwrap().email;
        let identity = caller(&state, Role::User);
        let (status, body) = send(
            app_as(router(), &state, identity),
            "PUT",
            "/v1/profile",
            Some(json!({"email": other_email})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["details"]["email"].is_array());
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let id = identity.user_id;
        let hash = hash_password("old-password").unwrap();
        state.users.update(&id, |u| u.password_hash = hash);
        let app = app_as(router(), &state, identity);

        let (status, _) = send(
            app.clone(),
            "POST",
            "/v1/profile/change-password",
            Some(json!({
                "current_password": "guess",
                "new_password": "new-password",
                "new_password_confirmation": "new-password"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            app,
            "POST",
            "/v1/profile/change-password",
            Some(json!({
                "current_password": "old-password",
                "new_password": "new-password",
                "new_password_confirmation": "new-password"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(verify_password("new-password", &state.users.get(&id).unwrap().password_hash));
    }

    #[tokio::test]
    async fn short_new_password_rejected() {
        let state = AppState::new();
        let identity = caller(&state, Role::User);
        let (status, body) = send(
            app_as(router(), &state, identity),
            "POST",
            "/v1/profile/change-password",
            Some(json!({
                "current_password": "x",
                "new_password": "short",
                "new_password_confirmation": "short"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["details"]["new_password"][0]
            .as_str()
            .unwrap()
            .contains("at least 8"));
    }
}
