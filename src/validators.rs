/// Input validators for the authentication endpoints
///
/// Length limits mirror the persisted column sizes:
/// - username: 3..=40 characters
/// - email: valid address, 3..=80 characters
/// - password: 3..=80 characters

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 40;
const MIN_EMAIL_LENGTH: usize = 3;
const MAX_EMAIL_LENGTH: usize = 80;
const MIN_PASSWORD_LENGTH: usize = 3;
const MAX_PASSWORD_LENGTH: usize = 80;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).expect("email regex is valid");
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(ValidationError::EmptyField(field.to_string()));
    }
    if len < min {
        return Err(ValidationError::TooShort(field.to_string(), min));
    }
    if len > max {
        return Err(ValidationError::TooLong(field.to_string(), max));
    }
    Ok(())
}

/// Validates and trims a username.
pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();
    check_length("username", trimmed, MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH)?;

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates and trims an email address.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();
    check_length("email", trimmed, MIN_EMAIL_LENGTH, MAX_EMAIL_LENGTH)?;

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a plaintext password. Never trimmed: whitespace is significant.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    check_length("password", password, MIN_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("alice@x.com").is_ok());
        assert!(validate_email("test.email@domain.co.uk").is_ok());
        assert!(validate_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@@example.com").is_err());
    }

    #[test]
    fn test_email_length_limit() {
        let too_long = format!("{}@example.com", "a".repeat(70));
        assert!(matches!(
            validate_email(&too_long),
            Err(ValidationError::TooLong(_, 80))
        ));
    }

    #[test]
    fn test_username_bounds() {
        assert!(validate_username("al").is_err());
        assert!(validate_username("ali").is_ok());
        assert!(validate_username(&"a".repeat(40)).is_ok());
        assert!(validate_username(&"a".repeat(41)).is_err());
        assert!(matches!(
            validate_username("   "),
            Err(ValidationError::EmptyField(_))
        ));
    }

    #[test]
    fn test_username_is_trimmed() {
        assert_eq!(validate_username("  alice ").unwrap(), "alice");
    }

    #[test]
    fn test_password_bounds() {
        assert!(validate_password("pw").is_err());
        assert!(validate_password("pw1").is_ok());
        assert!(validate_password(&"p".repeat(80)).is_ok());
        assert!(validate_password(&"p".repeat(81)).is_err());
    }
}
