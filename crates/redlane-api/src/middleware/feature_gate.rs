//! # Feature Gating
//!
//! Wraps a router so its handlers only run when a feature flag resolves
//! true for the authenticated caller. Mount it *inside* the auth layer so
//! the caller identity is already in the request extensions:
//!
//! ```ignore
//! Router::new()
//!     .route("/v1/admin/dashboard", get(dashboard))
//!     .route_layer(from_fn_with_state(
//!         FeatureGate::new(state.flags.clone(), flags::ADMIN_DASHBOARD),
//!         require_feature,
//!     ))
//! ```
//!
//! Without an identity the flag resolves against its global value.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use redlane_core::FlagResolver;

use crate::auth::CallerIdentity;
use crate::error::AppError;

/// The flag a router is gated on.
#[derive(Debug, Clone)]
pub struct FeatureGate {
    flags: Arc<FlagResolver>,
    flag: &'static str,
}

impl FeatureGate {
    pub fn new(flags: Arc<FlagResolver>, flag: &'static str) -> Self {
        Self { flags, flag }
    }
}

/// Reject with 403 `FEATURE_UNAVAILABLE` unless the gate's flag is on.
pub async fn require_feature(State(gate): State<FeatureGate>, request: Request, next: Next) -> Response {
    let user = request
        .extensions()
        .get::<CallerIdentity>()
        .map(|caller| caller.user_id);

    match gate.flags.is_active(gate.flag, user) {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            tracing::info!(flag = gate.flag, user_id = ?user, "feature unavailable for caller");
            AppError::FeatureUnavailable.into_response()
        }
        Err(e) => AppError::Internal(format!("feature gate misconfigured: {e}")).into_response(),
    }
}
