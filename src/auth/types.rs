//! Authentication Types

use crate::error::{AuthError, IdentityField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Stored user account
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub is_admin: bool,
    pub is_moderator: bool,
    pub is_banned: bool,
    pub reputation: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new account around an already hashed password
    pub fn new(
        username: String,
        email: String,
        password_hash: String,
        full_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            full_name,
            bio: None,
            avatar_url: None,
            is_verified: false,
            is_admin: false,
            is_moderator: false,
            is_banned: false,
            reputation: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public projection of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub reputation: i32,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            is_verified: user.is_verified,
            reputation: user.reputation,
            created_at: user.created_at,
        }
    }
}

/// Registration request body
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Login request body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Issued session token as returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// In-process user store keyed by id with unique username and email
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl UserStore {
    /// Create a new empty user store
    pub fn new() -> Self {
        Self::default()
    }

    /// Report which unique field, if any, is already taken. Email wins ties.
    pub fn find_conflict(&self, username: &str, email: &str) -> Option<IdentityField> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        Self::conflict_in(&users, username, email)
    }

    /// Insert a user, re-checking uniqueness under the write lock
    pub fn insert(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());

        if let Some(field) = Self::conflict_in(&users, &user.username, &user.email) {
            return Err(AuthError::DuplicateIdentity { field });
        }

        users.insert(user.id, user);
        Ok(())
    }

    /// Get a user by id
    pub fn get(&self, id: &Uuid) -> Option<User> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.get(id).cloned()
    }

    /// Get a user by email
    pub fn find_by_email(&self, email: &str) -> Option<User> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.values().find(|u| u.email == email).cloned()
    }

    /// Set or clear the banned flag. Returns false for unknown ids.
    pub fn set_banned(&self, id: &Uuid, banned: bool) -> bool {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        match users.get_mut(id) {
            Some(user) => {
                user.is_banned = banned;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove a user. Tokens already issued to it stop authenticating.
    pub fn remove(&self, id: &Uuid) -> Option<User> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        users.remove(id)
    }

    pub fn len(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn conflict_in(
        users: &HashMap<Uuid, User>,
        username: &str,
        email: &str,
    ) -> Option<IdentityField> {
        let mut conflict = None;
        for user in users.values() {
            if user.email == email {
                return Some(IdentityField::Email);
            }
            if user.username == username {
                conflict = Some(IdentityField::Username);
            }
        }
        conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(username: &str, email: &str) -> User {
        User::new(username.to_string(), email.to_string(), "hash".to_string(), None)
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = UserStore::new();
        let alice = user("alice_01", "alice@example.com");
        let id = alice.id;

        store.insert(alice).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&id).unwrap().username, "alice_01");
        assert_eq!(store.find_by_email("alice@example.com").unwrap().id, id);
        assert!(store.find_by_email("bob@example.com").is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let store = UserStore::new();
        store.insert(user("alice_01", "alice@example.com")).unwrap();

        let err = store.insert(user("alice_01", "other@example.com")).unwrap_err();
        assert!(matches!(
            err,
            AuthError::DuplicateIdentity { field: IdentityField::Username }
        ));
    }

    #[test]
    fn test_email_conflict_reported_first() {
        let store = UserStore::new();
        store.insert(user("alice_01", "alice@example.com")).unwrap();
        store.insert(user("bob_02", "bob@example.com")).unwrap();

        // Username collides with alice, email with bob
        assert_eq!(
            store.find_conflict("alice_01", "bob@example.com"),
            Some(IdentityField::Email)
        );
        assert_eq!(store.find_conflict("carol", "carol@example.com"), None);
    }

    #[test]
    fn test_ban_and_remove() {
        let store = UserStore::new();
        let alice = user("alice_01", "alice@example.com");
        let id = alice.id;
        store.insert(alice).unwrap();

        assert!(store.set_banned(&id, true));
        assert!(store.get(&id).unwrap().is_banned);
        assert!(!store.set_banned(&Uuid::new_v4(), true));

        assert!(store.remove(&id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_user_response_hides_secrets() {
        let alice = user("alice_01", "alice@example.com");
        let json = serde_json::to_value(UserResponse::from(&alice)).unwrap();

        assert_eq!(json["username"], "alice_01");
        assert!(json.get("password_hash").is_none());
        assert!(json.get("password").is_none());
        assert!(json.get("is_banned").is_none());
    }
}
