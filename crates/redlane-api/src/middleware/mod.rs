//! # Middleware
//!
//! - [`feature_gate`]: per-caller feature flag checks in front of handlers.
//! - [`rate_limit`]: login attempt throttling.

pub mod feature_gate;
pub mod rate_limit;
