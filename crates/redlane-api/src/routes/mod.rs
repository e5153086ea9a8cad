//! # API Route Modules
//!
//! - `auth`: registration, login/logout/refresh, password reset, email verification.
//! - `profile`: the caller's own account.
//! - `addresses`: the caller's addresses and the primary address.
//! - `household_members`: members at the caller's addresses and the primary declarant.
//! - `feature_flags`: resolved flags for the caller, admin flag management, the gated dashboard.
//! - `duty_categories`: duty category CRUD and duty calculation.
//! - `currencies`: currencies, exchange rates, conversion.
//! - `reference`: static lookup tables.
//!
//! Successful bodies share one envelope: `{"data": ..., "message"?: ...}`.

pub mod addresses;
pub mod auth;
pub mod currencies;
pub mod duty_categories;
pub mod feature_flags;
pub mod household_members;
pub mod profile;
pub mod reference;

use axum::Json;
use serde::{Deserialize, Serialize};

/// Response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `{"data": data}`
pub fn data<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        data,
        message: None,
    })
}

/// `{"data": data, "message": message}`
pub fn data_with_message<T: Serialize>(data: T, message: &str) -> Json<Envelope<T>> {
    Json(Envelope {
        data,
        message: Some(message.to_string()),
    })
}

/// Body of responses that carry only a message.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// `{"message": message}`
pub fn message(message: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: message.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared helpers for handler tests.

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use redlane_core::Role;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::CallerIdentity;
    use crate::state::{AppState, UserRecord};

    /// Register a verified user with `role` and return its identity.
    pub fn caller(state: &AppState, role: Role) -> CallerIdentity {
        let mut user = UserRecord::new(
            "Test",
            "User",
            &format!("{}@example.com", Uuid::new_v4()),
            "unused",
            role,
        );
        user.email_verified_at = Some(user.created_at);
        let id = user.id;
        state.users.insert(id, user);
        CallerIdentity {
            user_id: id,
            role,
            token_digest: String::new(),
        }
    }

    /// Mount `router` with `identity` injected the way the auth layer would.
    pub fn app_as(router: Router<AppState>, state: &AppState, identity: CallerIdentity) -> Router {
        router
            .layer(axum::Extension(identity))
            .with_state(state.clone())
    }

    /// Send a request and decode the JSON body (`Null` when empty).
    pub async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
