//! Authentication Manager

use super::{
    validation, LoginRequest, PasswordHasher, RegisterRequest, TokenManager, TokenResponse, User,
    UserResponse, UserStore,
};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::Result;
use anyhow::Context;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives registration, login and per-request authentication
pub struct AuthManager {
    users: Arc<UserStore>,
    passwords: PasswordHasher,
    tokens: TokenManager,
    /// Verified against when the email is unknown so that both login
    /// failure paths do the same bcrypt work
    dummy_hash: String,
}

impl AuthManager {
    /// Create a new authentication manager
    pub fn new(config: &AuthConfig, users: Arc<UserStore>) -> Result<Self> {
        let algorithm = jsonwebtoken::Algorithm::from_str(&config.jwt_algorithm)
            .with_context(|| format!("Invalid jwt_algorithm: {}", config.jwt_algorithm))?;

        let tokens = TokenManager::new(&config.jwt_secret, algorithm, config.token_ttl)
            .context("Failed to create token manager")?;

        let passwords = PasswordHasher::new(config.bcrypt_cost);
        let dummy_hash = passwords
            .hash(&Uuid::new_v4().to_string())
            .context("Failed to prepare password hasher")?;

        Ok(Self {
            users,
            passwords,
            tokens,
            dummy_hash,
        })
    }

    pub fn users(&self) -> &Arc<UserStore> {
        &self.users
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Register a new account
    pub async fn register(
        &self,
        mut request: RegisterRequest,
    ) -> std::result::Result<UserResponse, AuthError> {
        validation::validate_registration(&request)?;
        request.email = validation::normalize_email(&request.email);

        if let Some(field) = self.users.find_conflict(&request.username, &request.email) {
            warn!(field = field.as_str(), "Registration rejected: identity already in use");
            return Err(AuthError::DuplicateIdentity { field });
        }

        let RegisterRequest {
            username,
            email,
            password,
            full_name,
        } = request;

        let password_hash = self.passwords.hash_blocking(password).await?;
        let user = User::new(username, email, password_hash, full_name);

        // A concurrent registration may have claimed the name while hashing
        self.users.insert(user.clone())?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(UserResponse::from(&user))
    }

    /// Exchange email and password for a session token
    pub async fn login(
        &self,
        request: LoginRequest,
    ) -> std::result::Result<TokenResponse, AuthError> {
        validation::validate_email(&request.email)?;
        let email = validation::normalize_email(&request.email);
        let user = self.users.find_by_email(&email);

        let hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash.clone(),
        };
        let password_ok = self.passwords.verify_blocking(request.password, hash).await?;

        let user = match user {
            Some(user) if password_ok => user,
            _ => {
                warn!("Failed login attempt");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if user.is_banned {
            warn!(user_id = %user.id, "Login attempt on banned account");
            return Err(AuthError::AccountBanned);
        }

        let access_token = self.tokens.issue(user.id)?;
        info!(user_id = %user.id, "User logged in");

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.tokens.default_ttl().as_secs(),
        })
    }

    /// Resolve a bearer token to a live, non-banned user.
    ///
    /// A valid signature only establishes identity; the account is looked
    /// up and its ban flag checked on every call.
    pub fn authenticate(&self, token: &str) -> std::result::Result<User, AuthError> {
        let user_id = self.tokens.verify(token).map_err(|e| {
            debug!(reason = %e, "Token rejected");
            e
        })?;

        let user = self.users.get(&user_id).ok_or_else(|| {
            debug!(user_id = %user_id, "Token subject no longer exists");
            AuthError::Unauthenticated
        })?;

        if user.is_banned {
            warn!(user_id = %user.id, "Banned account presented a valid token");
            return Err(AuthError::AccountBanned);
        }

        Ok(user)
    }
}
