//! Registration input policy.
//!
//! These checks run before any hashing so that bad input fails fast with the
//! specific rule that was violated.

use crate::auth::types::RegisterRequest;
use crate::error::PolicyViolation;
use regex::Regex;
use std::sync::OnceLock;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_FULL_NAME_LENGTH: usize = 100;
const MAX_EMAIL_LENGTH: usize = 255;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .expect("email pattern is a valid regex")
    })
}

/// Validate a username.
///
/// Rules:
/// - 3 to 50 characters
/// - ASCII letters, digits and underscores only
pub fn validate_username(username: &str) -> Result<(), PolicyViolation> {
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(PolicyViolation::UsernameLength);
    }

    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PolicyViolation::UsernameCharacters);
    }

    Ok(())
}

/// Validate a password.
///
/// Rules:
/// - at least 8 characters
/// - at least one lower-case letter, one upper-case letter and one digit
pub fn validate_password(password: &str) -> Result<(), PolicyViolation> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PolicyViolation::PasswordTooShort);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PolicyViolation::PasswordMissingLowercase);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(PolicyViolation::PasswordMissingUppercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PolicyViolation::PasswordMissingDigit);
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), PolicyViolation> {
    if email.len() > MAX_EMAIL_LENGTH || !email_regex().is_match(email) {
        return Err(PolicyViolation::InvalidEmail);
    }
    Ok(())
}

/// Canonical form of a validated email: the domain is case-insensitive and
/// is lower-cased, the local part is kept as given
pub fn normalize_email(email: &str) -> String {
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_ascii_lowercase()),
        None => email.to_string(),
    }
}

pub fn validate_full_name(full_name: Option<&str>) -> Result<(), PolicyViolation> {
    match full_name {
        Some(name) if name.chars().count() > MAX_FULL_NAME_LENGTH => {
            Err(PolicyViolation::FullNameTooLong)
        }
        _ => Ok(()),
    }
}

/// Validate every field of a registration request, username first
pub fn validate_registration(request: &RegisterRequest) -> Result<(), PolicyViolation> {
    validate_username(&request.username)?;
    validate_email(&request.email)?;
    validate_password(&request.password)?;
    validate_full_name(request.full_name.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("A_B_C_123").is_ok());
        assert!(validate_username(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_username_length() {
        assert_eq!(validate_username(""), Err(PolicyViolation::UsernameLength));
        assert_eq!(validate_username("ab"), Err(PolicyViolation::UsernameLength));
        assert_eq!(
            validate_username(&"a".repeat(51)),
            Err(PolicyViolation::UsernameLength)
        );
    }

    #[test]
    fn test_username_characters() {
        for name in ["alice-01", "alice 01", "alice.01", "élise", "bob!"] {
            assert_eq!(
                validate_username(name),
                Err(PolicyViolation::UsernameCharacters),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_valid_passwords() {
        assert!(validate_password("Password1").is_ok());
        assert!(validate_password("aB3aB3aB").is_ok());
        assert!(validate_password("Longer Pass phrase 9!").is_ok());
    }

    #[test]
    fn test_password_rules_identify_violation() {
        assert_eq!(validate_password("Pass1"), Err(PolicyViolation::PasswordTooShort));
        assert_eq!(
            validate_password("PASSWORD1"),
            Err(PolicyViolation::PasswordMissingLowercase)
        );
        assert_eq!(
            validate_password("password1"),
            Err(PolicyViolation::PasswordMissingUppercase)
        );
        assert_eq!(
            validate_password("Passwordx"),
            Err(PolicyViolation::PasswordMissingDigit)
        );
    }

    #[test]
    fn test_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());

        for email in ["", "alice", "alice@", "@example.com", "alice@example", "a b@example.com"] {
            assert_eq!(
                validate_email(email),
                Err(PolicyViolation::InvalidEmail),
                "{email} should be rejected"
            );
        }
    }

    #[test]
    fn test_full_name() {
        assert!(validate_full_name(None).is_ok());
        assert!(validate_full_name(Some("Alice Liddell")).is_ok());
        assert_eq!(
            validate_full_name(Some(&"x".repeat(101))),
            Err(PolicyViolation::FullNameTooLong)
        );
    }

    #[test]
    fn test_registration_checks_username_first() {
        let request = RegisterRequest {
            username: "a".to_string(),
            email: "bad".to_string(),
            password: "short".to_string(),
            full_name: None,
        };
        assert_eq!(
            validate_registration(&request),
            Err(PolicyViolation::UsernameLength)
        );
    }

    #[test]
    fn test_normalize_email_lowercases_domain_only() {
        assert_eq!(normalize_email("alice@Example.COM"), "alice@example.com");
        assert_eq!(normalize_email("Alice.Smith@EXAMPLE.com"), "Alice.Smith@example.com");
        assert_eq!(normalize_email("bob@example.com"), "bob@example.com");
    }
}
