//! # Authentication & Authorization
//!
//! Opaque bearer tokens with a static role → permission table.
//!
//! ## Tokens
//!
//! A token is 32 random bytes, hex-encoded, handed to the client once.
//! Only its SHA-256 digest is kept (in memory and, when configured, in
//! Postgres), so a leaked token table cannot be replayed.
//!
//! ## CallerIdentity
//!
//! [`auth_middleware`] resolves the bearer token and injects a
//! [`CallerIdentity`] into the request extensions. Handlers extract it via
//! the `FromRequestParts` impl.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand_core::{OsRng, RngCore};
use redlane_core::{Permission, Role};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Lifetime of a password-reset token.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

/// Lifetime of an email-verification link.
pub const VERIFICATION_TOKEN_TTL_MINUTES: i64 = 60;

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub role: Role,
    /// Digest of the token used for this request, for logout/refresh.
    pub token_digest: String,
}

impl CallerIdentity {
    pub fn can(&self, permission: Permission) -> bool {
        self.role.has(permission)
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Return 403 unless the caller's role grants `permission`.
pub fn require_permission(caller: &CallerIdentity, permission: Permission) -> Result<(), AppError> {
    if caller.can(permission) {
        Ok(())
    } else {
        tracing::warn!(
            user_id = %caller.user_id,
            role = caller.role.as_str(),
            permission = permission.as_str(),
            "permission denied"
        );
        Err(AppError::Forbidden(format!(
            "permission '{}' required",
            permission.as_str()
        )))
    }
}

// ── Secrets ─────────────────────────────────────────────────────────────────

/// Generate a fresh opaque token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest of `value`.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

/// Check `password` against a stored PHC hash string.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

// ── Token Store ─────────────────────────────────────────────────────────────

/// An issued bearer token, identified by its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub digest: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Issued tokens keyed by digest.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for `user_id`. Returns the plaintext (shown once) and the
    /// stored record.
    pub fn issue(&self, user_id: Uuid) -> (String, AccessToken) {
        let plaintext = generate_token();
        let token = AccessToken {
            digest: sha256_hex(&plaintext),
            user_id,
            created_at: Utc::now(),
        };
        self.tokens.write().insert(token.digest.clone(), token.clone());
        (plaintext, token)
    }

    /// Look up a presented plaintext token.
    pub fn resolve(&self, plaintext: &str) -> Option<AccessToken> {
        self.tokens.read().get(&sha256_hex(plaintext)).cloned()
    }

    pub fn revoke(&self, digest: &str) -> Option<AccessToken> {
        self.tokens.write().remove(digest)
    }

    /// Revoke every token belonging to `user_id`, returning their digests.
    pub fn revoke_all(&self, user_id: Uuid) -> Vec<String> {
        let mut tokens = self.tokens.write();
        let digests: Vec<String> = tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.digest.clone())
            .collect();
        for digest in &digests {
            tokens.remove(digest);
        }
        digests
    }

    pub fn load(&self, tokens: impl IntoIterator<Item = AccessToken>) {
        let mut guard = self.tokens.write();
        for token in tokens {
            guard.insert(token.digest.clone(), token);
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Password Resets ─────────────────────────────────────────────────────────

/// A pending password reset. At most one per email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub email: String,
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    /// Whether `plaintext` matches and the reset has not expired at `now`.
    pub fn accepts(&self, plaintext: &str, now: DateTime<Utc>) -> bool {
        self.expires_at > now && self.token_digest == sha256_hex(plaintext)
    }
}

/// Pending resets keyed by email.
#[derive(Debug, Clone, Default)]
pub struct PasswordResets {
    resets: Arc<RwLock<HashMap<String, PasswordReset>>>,
}

impl PasswordResets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a reset for `email`, replacing any pending one. Returns the
    /// plaintext token and the stored record.
    pub fn start(&self, email: &str) -> (String, PasswordReset) {
        let plaintext = generate_token();
        let reset = PasswordReset {
            email: email.to_string(),
            token_digest: sha256_hex(&plaintext),
            expires_at: Utc::now() + chrono::Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        };
        self.resets.write().insert(email.to_string(), reset.clone());
        (plaintext, reset)
    }

    pub fn get(&self, email: &str) -> Option<PasswordReset> {
        self.resets.read().get(email).cloned()
    }

    pub fn remove(&self, email: &str) -> Option<PasswordReset> {
        self.resets.write().remove(email)
    }

    pub fn load(&self, resets: impl IntoIterator<Item = PasswordReset>) {
        let mut guard = self.resets.write();
        for reset in resets {
            guard.insert(reset.email.clone(), reset);
        }
    }
}

// ── Email Verifications ─────────────────────────────────────────────────────

/// A pending email verification. At most one per user; a new link
/// replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailVerification {
    pub user_id: Uuid,
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
}

impl EmailVerification {
    /// Whether `plaintext` matches and the link has not expired at `now`.
    pub fn accepts(&self, plaintext: &str, now: DateTime<Utc>) -> bool {
        self.expires_at > now && self.token_digest == sha256_hex(plaintext)
    }
}

/// Pending verifications keyed by user.
#[derive(Debug, Clone, Default)]
pub struct EmailVerifications {
    pending: Arc<RwLock<HashMap<Uuid, EmailVerification>>>,
}

impl EmailVerifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a link token for `user_id`. Returns the plaintext token and
    /// the stored record.
    pub fn start(&self, user_id: Uuid) -> (String, EmailVerification) {
        let plaintext = generate_token();
        let verification = EmailVerification {
            user_id,
            token_digest: sha256_hex(&plaintext),
            expires_at: Utc::now() + chrono::Duration::minutes(VERIFICATION_TOKEN_TTL_MINUTES),
        };
        self.pending.write().insert(user_id, verification.clone());
        (plaintext, verification)
    }

    pub fn get(&self, user_id: &Uuid) -> Option<EmailVerification> {
        self.pending.read().get(user_id).cloned()
    }

    pub fn remove(&self, user_id: &Uuid) -> Option<EmailVerification> {
        self.pending.write().remove(user_id)
    }

    pub fn load(&self, verifications: impl IntoIterator<Item = EmailVerification>) {
        let mut guard = self.pending.write();
        for verification in verifications {
            guard.insert(verification.user_id, verification);
        }
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the bearer token and inject [`CallerIdentity`] for downstream
/// handlers. Rejects with 401 when the header is missing, malformed, or
/// names an unknown token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let provided = match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(token) => token.trim().to_string(),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return AppError::Unauthorized(
                    "authorization header must use Bearer scheme".into(),
                )
                .into_response();
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            return AppError::Unauthorized("missing authorization header".into()).into_response();
        }
    };

    let Some(token) = state.tokens.resolve(&provided) else {
        tracing::warn!("authentication failed: unknown bearer token");
        return AppError::Unauthorized("invalid bearer token".into()).into_response();
    };

    let Some(user) = state.users.get(&token.user_id) else {
        tracing::warn!(user_id = %token.user_id, "authentication failed: token owner no longer exists");
        return AppError::Unauthorized("invalid bearer token".into()).into_response();
    };

    request.extensions_mut().insert(CallerIdentity {
        user_id: user.id,
        role: user.role,
        token_digest: token.digest,
    });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UserRecord;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.role.as_str().to_string() }),
            )
            .route_layer(from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    fn seeded_user(state: &AppState, role: Role) -> Uuid {
        let user = UserRecord::new("Ada", "Lovelace", "ada@example.com", "x", role);
        let id = user.id;
        state.users.insert(id, user);
        id
    }

    async fn get_with(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_injects_identity() {
        let state = AppState::new();
        let user_id = seeded_user(&state, Role::CustomsOfficer);
        let (token, _) = state.tokens.issue(user_id);
        let (status, body) = get_with(test_app(state), Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "customs_officer");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let (status, body) = get_with(test_app(AppState::new()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("missing authorization header"));
    }

    #[tokio::test]
    async fn unknown_token_rejected() {
        let (status, body) =
            get_with(test_app(AppState::new()), Some("Bearer not-a-real-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid bearer token"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) =
            get_with(test_app(AppState::new()), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn revoked_token_rejected() {
        let state = AppState::new();
        let user_id = seeded_user(&state, Role::User);
        let (token, record) = state.tokens.issue(user_id);
        state.tokens.revoke(&record.digest);
        let (status, _) = get_with(test_app(state), Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn only_digest_is_stored() {
        let store = TokenStore::new();
        let (plaintext, record) = store.issue(Uuid::new_v4());
        assert_eq!(plaintext.len(), 64);
        assert_ne!(record.digest, plaintext);
        assert_eq!(store.resolve(&plaintext), Some(record));
    }

    #[test]
    fn revoke_all_only_touches_owner() {
        let store = TokenStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        store.issue(alice);
        store.issue(alice);
        let (bob_token, _) = store.issue(bob);
        assert_eq!(store.revoke_all(alice).len(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.resolve(&bob_token).is_some());
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
        assert!(!verify_password("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn reset_tokens_expire() {
        let resets = PasswordResets::new();
        let (plaintext, reset) = resets.start("ada@example.com");
        let now = Utc::now();
        assert!(reset.accepts(&plaintext, now));
        assert!(!reset.accepts("wrong", now));
        assert!(!reset.accepts(&plaintext, now + chrono::Duration::minutes(61)));
    }

    #[test]
    fn verification_tokens_are_random_and_expire() {
        let verifications = EmailVerifications::new();
        let user = Uuid::new_v4();
        let (first, _) = verifications.start(user);
        let (second, pending) = verifications.start(user);
        let now = Utc::now();
        assert!(!pending.accepts(&first, now));
        assert!(pending.accepts(&second, now));
        assert!(!pending.accepts(&sha256_hex("ada@example.com"), now));
        assert!(!pending.accepts(&second, now + chrono::Duration::minutes(61)));
        assert_eq!(verifications.get(&user), Some(pending));
    }

    #[test]
    fn permissions_follow_role() {
        let caller = CallerIdentity {
            user_id: Uuid::new_v4(),
            role: Role::User,
            token_digest: String::new(),
        };
        assert!(require_permission(&caller, Permission::ManageFeatureFlags).is_err());
        let admin = CallerIdentity {
            role: Role::Admin,
            ..caller
        };
        assert!(require_permission(&admin, Permission::ManageFeatureFlags).is_ok());
    }
}
