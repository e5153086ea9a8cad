//! # Login Throttling
//!
//! Fixed-window attempt counter keyed by client IP. Mounted on the login
//! route only. In-memory, so each process counts on its own.
//!
//! The client IP is the socket peer address. `X-Forwarded-For` is honoured
//! only when the service is configured to sit behind a trusted proxy;
//! otherwise any client could pick its own bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

use crate::error::AppError;
use crate::state::AppState;

/// Bucket for requests whose peer address is unknown (no connect info).
const UNKNOWN_CLIENT: &str = "unknown";

/// Throttle configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Attempts allowed per window.
    pub max_attempts: u64,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Take the client IP from the first `X-Forwarded-For` hop.
    pub trust_forwarded: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_secs: 60,
            trust_forwarded: false,
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    count: u64,
    started: Instant,
}

/// Shared attempt counters.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count an attempt for `key`. Returns `Err(seconds until the window
    /// resets)` once the limit is exhausted.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    /// Number of live windows.
    pub fn tracked(&self) -> usize {
        self.windows.lock().len()
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), u64> {
        let window_len = Duration::from_secs(self.config.window_secs);
        let mut windows = self.windows.lock();
        windows.retain(|_, w| now.duration_since(w.started) < window_len);

        let window = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });

        if window.count >= self.config.max_attempts {
            let elapsed = now.duration_since(window.started);
            let remaining = window_len.saturating_sub(elapsed).as_secs().max(1);
            Err(remaining)
        } else {
            window.count += 1;
            Ok(())
        }
    }

    /// Client key for `request`: the peer IP, or the first forwarded hop
    /// when forwarded headers are trusted.
    fn client_key(&self, request: &Request) -> String {
        if self.config.trust_forwarded {
            let forwarded = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(hop) = forwarded {
                return hop.to_string();
            }
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Reject with 429 once a client exceeds its login attempts.
pub async fn login_throttle(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = state.login_limiter.client_key(&request);
    if let Err(retry_after_secs) = state.login_limiter.check(&key) {
        tracing::warn!(client = %key, retry_after_secs, "login throttled");
        return AppError::TooManyAttempts { retry_after_secs }.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn limiter(max_attempts: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_attempts,
            ..RateLimitConfig::default()
        })
    }

    fn from_peer(peer: &str, forwarded: Option<&str>) -> Request {
        let mut builder = Request::builder();
        if let Some(hop) = forwarded {
            builder = builder.header("x-forwarded-for", hop);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn allows_up_to_limit() {
        let limiter = limiter(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", now).is_ok());
        }
        let retry = limiter.check_at("10.0.0.1", now).unwrap_err();
        assert_eq!(retry, 60);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_ok());
        assert!(limiter.check_at("a", now).is_err());
        assert!(limiter.check_at("b", now).is_ok());
    }

    #[test]
    fn window_resets() {
        let limiter = limiter(1);
        let start = Instant::now();
        assert!(limiter.check_at("a", start).is_ok());
        assert!(limiter.check_at("a", start + Duration::from_secs(30)).is_err());
        assert!(limiter.check_at("a", start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn expired_windows_are_pruned() {
        let limiter = limiter(5);
        let start = Instant::now();
        for i in 0..10 {
            limiter.check_at(&format!("10.0.0.{i}"), start).unwrap();
        }
        assert_eq!(limiter.tracked(), 10);
        limiter.check_at("10.0.1.1", start + Duration::from_secs(61)).unwrap();
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn forwarded_header_ignored_by_default() {
        let limiter = limiter(2);
        for i in 0..10 {
            let request = from_peer("198.51.100.4:5000", Some(&format!("10.0.0.{i}")));
            assert_eq!(limiter.client_key(&request), "198.51.100.4");
        }
        let outcomes: Vec<bool> = (0..3)
            .map(|i| {
                let request = from_peer("198.51.100.4:5000", Some(&format!("10.0.0.{i}")));
                limiter.check(&limiter.client_key(&request)).is_ok()
            })
            .collect();
        assert_eq!(outcomes, [true, true, false]);
    }

    #[test]
    fn peers_get_separate_buckets() {
        let limiter = limiter(1);
        let a = limiter.client_key(&from_peer("192.0.2.1:1000", None));
        let b = limiter.client_key(&from_peer("192.0.2.2:1000", None));
        assert!(limiter.check(&a).is_ok());
        assert!(limiter.check(&a).is_err());
        assert!(limiter.check(&b).is_ok());
    }

    #[test]
    fn trusted_proxy_uses_first_forwarded_hop() {
        let limiter = RateLimiter::new(RateLimitConfig {
            trust_forwarded: true,
            ..RateLimitConfig::default()
        });
        let request = from_peer("10.0.0.1:443", Some("203.0.113.7, 10.0.0.1"));
        assert_eq!(limiter.client_key(&request), "203.0.113.7");
        let direct = from_peer("10.0.0.1:443", None);
        assert_eq!(limiter.client_key(&direct), "10.0.0.1");
    }

    #[test]
    fn missing_connect_info_is_unknown() {
        let limiter = limiter(1);
        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(limiter.client_key(&bare), UNKNOWN_CLIENT);
    }
}
