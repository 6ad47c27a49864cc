//! Authentication Module
//!
//! Password hashing, session tokens, registration policy and the user store.

pub mod manager;
pub mod password;
pub mod token;
pub mod types;
pub mod validation;

pub use manager::AuthManager;
pub use password::PasswordHasher;
pub use token::{Claims, TokenManager};
pub use types::{LoginRequest, RegisterRequest, TokenResponse, User, UserResponse, UserStore};
