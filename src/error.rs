//! Error Types
//!
//! Domain errors raised by the credential, token and admission layers, and
//! their mapping onto HTTP responses.

use crate::api::types::ErrorResponse;
use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Message returned for every token failure so callers cannot tell them apart
pub const UNAUTHENTICATED_MESSAGE: &str = "Could not validate credentials";

/// Message returned when the rate limiter rejects a request
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Input policy rules checked before a password is ever hashed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Username must be between 3 and 50 characters")]
    UsernameLength,

    #[error("Username can only contain letters, numbers, and underscores")]
    UsernameCharacters,

    #[error("Password must be at least 8 characters long")]
    PasswordTooShort,

    #[error("Password must contain at least one uppercase letter")]
    PasswordMissingUppercase,

    #[error("Password must contain at least one lowercase letter")]
    PasswordMissingLowercase,

    #[error("Password must contain at least one number")]
    PasswordMissingDigit,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Full name cannot exceed 100 characters")]
    FullNameTooLong,
}

impl PolicyViolation {
    /// Request field the rule applies to
    pub fn field(&self) -> &'static str {
        match self {
            PolicyViolation::UsernameLength | PolicyViolation::UsernameCharacters => "username",
            PolicyViolation::PasswordTooShort
            | PolicyViolation::PasswordMissingUppercase
            | PolicyViolation::PasswordMissingLowercase
            | PolicyViolation::PasswordMissingDigit => "password",
            PolicyViolation::InvalidEmail => "email",
            PolicyViolation::FullNameTooLong => "full_name",
        }
    }
}

/// Unique identity columns of a user record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Email,
    Username,
}

impl IdentityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::Email => "email",
            IdentityField::Username => "username",
        }
    }

    fn conflict_message(&self) -> &'static str {
        match self {
            IdentityField::Email => "Email already registered",
            IdentityField::Username => "Username already taken",
        }
    }
}

/// Errors raised while authenticating, registering or admitting a request
#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad username/password/email shape
    #[error("{0}")]
    Validation(#[from] PolicyViolation),

    /// Request body could not be decoded
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Username or email collision at registration
    #[error("{}", .field.conflict_message())]
    DuplicateIdentity { field: IdentityField },

    /// Unknown email or wrong password; deliberately does not say which
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("Account is banned")]
    AccountBanned,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is malformed")]
    Malformed,

    /// Missing bearer token, or the subject no longer exists
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Build an internal error from any displayable cause
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        AuthError::Internal(cause.to_string())
    }

    /// True for the token failures that all surface as "unauthenticated"
    pub fn is_token_failure(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidSignature
                | AuthError::Expired
                | AuthError::Malformed
                | AuthError::Unauthenticated
        )
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::InvalidBody(_)
            | AuthError::DuplicateIdentity { .. } => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::Malformed
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::AccountBanned => StatusCode::FORBIDDEN,
            AuthError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AuthError::Validation(violation) => {
                ErrorResponse::for_field(violation.field(), violation.to_string())
            }
            AuthError::DuplicateIdentity { field } => {
                ErrorResponse::for_field(field.as_str(), self.to_string())
            }
            AuthError::RateLimitExceeded { .. } => {
                ErrorResponse::new(RATE_LIMITED_MESSAGE)
            }
            AuthError::Internal(message) => {
                error!(error = %message, "Internal error while handling request");
                ErrorResponse::new("Internal server error")
            }
            e if e.is_token_failure() => {
                ErrorResponse::new(UNAUTHENTICATED_MESSAGE)
            }
            other => ErrorResponse::new(other.to_string()),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();

        match &self {
            e if e.is_token_failure() => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            AuthError::RateLimitExceeded { retry_after } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(*retry_after)));
            }
            _ => {}
        }

        response
    }
}

/// Whole seconds a client should wait, never less than one
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}
