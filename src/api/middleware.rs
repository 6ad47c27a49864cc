//! API Middleware
//!
//! Rate limiting runs on every route; bearer authentication only on the
//! protected ones.

use super::handlers::AppState;
use crate::auth::User;
use crate::error::AuthError;
use crate::security::Admission;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, error};

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The user resolved from a valid bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Admission control keyed by client IP
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    if !limiter.config().enabled {
        return next.run(request).await;
    }

    let Some(ConnectInfo(peer)) = request.extensions().get::<ConnectInfo<SocketAddr>>().cloned()
    else {
        error!("Peer address missing from request; serve with connect info enabled");
        return AuthError::internal("client address unavailable").into_response();
    };

    let forwarded_for = request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let client_ip = limiter.client_ip(peer.ip(), forwarded_for);
    let limit = limiter.config().max_requests;

    match limiter.check(client_ip) {
        Admission::Allowed { remaining } => {
            let mut response = next.run(request).await;
            set_rate_limit_headers(response.headers_mut(), limit, remaining);
            response
        }
        Admission::Rejected { retry_after } => {
            state.metrics.record_rate_limited();
            let mut response = AuthError::RateLimitExceeded { retry_after }.into_response();
            set_rate_limit_headers(response.headers_mut(), limit, 0);
            response
        }
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
}

/// Reject requests without a valid bearer token for a live, non-banned user
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers()).ok_or(AuthError::Unauthenticated);

    let user = token
        .and_then(|token| state.auth.authenticate(token))
        .map_err(|e| {
            state.metrics.record_token_rejection(rejection_reason(&e));
            debug!(reason = rejection_reason(&e), "Bearer authentication failed");
            e
        })?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Extract the token from `Authorization: Bearer <token>`
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn rejection_reason(error: &AuthError) -> &'static str {
    match error {
        AuthError::InvalidSignature => "invalid_signature",
        AuthError::Expired => "expired",
        AuthError::Malformed => "malformed",
        AuthError::AccountBanned => "banned",
        AuthError::Unauthenticated => "unauthenticated",
        _ => "other",
    }
}
