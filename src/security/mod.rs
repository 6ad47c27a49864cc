//! Security Module
//!
//! Request admission control. Every inbound request is checked against the
//! per-IP sliding window before it reaches a handler.

pub mod rate_limiter;

pub use rate_limiter::{Admission, RateLimitConfig, RateLimiter, RateLimiterStats};
