//! Session Tokens
//!
//! HMAC-signed JWTs carrying the user id as subject. Expiry is checked here
//! rather than by `jsonwebtoken` so that the boundary is exact (`exp <= now`
//! is expired, no leeway) and so tests can supply their own clock.

use crate::error::AuthError;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, get_current_timestamp, Algorithm, DecodingKey,
    EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Claims embedded in every session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
}

impl Claims {
    /// Parse the subject as a user id
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::Malformed)
    }
}

/// Issues and verifies session tokens with a server-wide secret
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    validation: Validation,
    default_ttl: Duration,
}

impl TokenManager {
    /// Create a token manager. Only the HMAC family is accepted since the
    /// secret is symmetric.
    pub fn new(secret: &str, algorithm: Algorithm, default_ttl: Duration) -> Result<Self, AuthError> {
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(AuthError::internal(format!(
                "unsupported token algorithm {algorithm:?}"
            )));
        }

        // Pin the accepted algorithm; expiry is checked by verify_at
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            validation,
            default_ttl,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issue a token for a user with the default ttl
    pub fn issue(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.issue_at(user_id, self.default_ttl, get_current_timestamp())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(&self, user_id: Uuid, ttl: Duration, now: u64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: now.saturating_add(ttl.as_secs()),
            iat: now,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("failed to sign token: {e}")))
    }

    /// Verify a token and return the user id it was issued to
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        self.verify_at(token, get_current_timestamp())?.user_id()
    }

    /// Verify signature, algorithm and expiry as if the current time were `now`
    pub fn verify_at(&self, token: &str, now: u64) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::Malformed,
            })?;

        if data.claims.exp <= now {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

    const SECRET: &str = "test-secret-with-enough-entropy-0123456789";
    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    const NOW: u64 = 1_700_000_000;

    fn manager() -> TokenManager {
        TokenManager::new(SECRET, Algorithm::HS256, WEEK).unwrap()
    }

    #[test]
    fn test_token_has_three_segments() {
        let token = manager().issue(Uuid::new_v4()).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = manager();
        let user_id = Uuid::new_v4();

        let token = tokens.issue(user_id).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn test_claims_carry_subject_and_expiry() {
        let tokens = manager();
        let user_id = Uuid::new_v4();
        let token = tokens.issue_at(user_id, WEEK, NOW).unwrap();

        let claims = tokens.verify_at(&token, NOW).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 604_800);
    }

    #[test]
    fn test_expiry_boundary() {
        let tokens = manager();
        let ttl = Duration::from_secs(60);
        let token = tokens.issue_at(Uuid::new_v4(), ttl, NOW).unwrap();

        assert!(tokens.verify_at(&token, NOW + 59).is_ok());
        assert!(matches!(tokens.verify_at(&token, NOW + 60), Err(AuthError::Expired)));
        assert!(matches!(tokens.verify_at(&token, NOW + 3600), Err(AuthError::Expired)));
    }

    #[test]
    fn test_foreign_secret_is_invalid_signature() {
        let ours = manager();
        let theirs = TokenManager::new("another-secret-entirely", Algorithm::HS256, WEEK).unwrap();

        let token = theirs.issue_at(Uuid::new_v4(), WEEK, NOW).unwrap();
        assert!(matches!(ours.verify_at(&token, NOW), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_algorithm_substitution_rejected() {
        let ours = manager();
        // Same secret, different HMAC algorithm in the header
        let other_alg = TokenManager::new(SECRET, Algorithm::HS512, WEEK).unwrap();

        let token = other_alg.issue_at(Uuid::new_v4(), WEEK, NOW).unwrap();
        assert!(matches!(ours.verify_at(&token, NOW), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let tokens = manager();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":"{}","exp":{},"iat":{}}}"#,
            Uuid::new_v4(),
            NOW + 100,
            NOW
        ));
        let token = format!("{header}.{payload}.");

        assert!(tokens.verify_at(&token, NOW).is_err());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let tokens = manager();
        let token = tokens.issue_at(Uuid::new_v4(), WEEK, NOW).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_payload = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sub":"{}","exp":{},"iat":{}}}"#,
            Uuid::new_v4(),
            NOW + 100,
            NOW
        ));
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(tokens.verify_at(&forged, NOW), Err(AuthError::InvalidSignature)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = manager();
        for token in ["", "abc", "a.b", "a.b.c", "not.a.token.at.all"] {
            assert!(
                matches!(tokens.verify_at(token, NOW), Err(AuthError::Malformed)),
                "expected Malformed for {token:?}"
            );
        }
    }

    #[test]
    fn test_non_uuid_subject_is_malformed() {
        let claims = Claims {
            sub: "42".to_string(),
            exp: NOW + 10,
            iat: NOW,
        };
        assert!(matches!(claims.user_id(), Err(AuthError::Malformed)));
    }

    #[test]
    fn test_asymmetric_algorithm_refused() {
        assert!(TokenManager::new(SECRET, Algorithm::RS256, WEEK).is_err());
    }
}
