//! Field validation for account inputs.
//!
//! Every check here runs before the store is touched. Failures for several
//! fields are collected with [`ValidationErrorBuilder`] and reported together.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use super::{AuthError, Role};

lazy_static! {
    /// Letters, digits and underscore only
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();

    /// Pragmatic email syntax: local@domain.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$"
    ).unwrap();
}

/// Validate a username against length bounds and `[A-Za-z0-9_]`
pub fn validate_username(username: &str, min: usize, max: usize) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }

    let len = username.chars().count();
    if len < min || len > max {
        return Err(format!(
            "Username must be {}-{} characters long",
            min, max
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err("Username may only contain letters, digits and underscores".to_string());
    }

    Ok(())
}

/// Validate email syntax
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Minimum-length password rule; `WeakPassword` on failure
pub fn validate_password(password: &str, min: usize) -> Result<(), AuthError> {
    if password.chars().count() < min {
        return Err(AuthError::WeakPassword { min });
    }
    Ok(())
}

/// Validate a role name against the fixed set
pub fn validate_role(role: &str) -> Result<Role, String> {
    role.parse::<Role>().map_err(|_| {
        let names: Vec<&str> = Role::ALL.iter().map(|r| r.as_str()).collect();
        format!("Invalid role. Must be one of: {}", names.join(", "))
    })
}

/// Validate an optional avatar URL
pub fn validate_avatar_url(url: &str) -> Result<(), String> {
    if url.len() > 2048 {
        return Err("Avatar URL is too long (max 2048 characters)".to_string());
    }
    if !(url.starts_with("https://") || url.starts_with("http://") || url.starts_with('/')) {
        return Err("Avatar URL must be an http(s) URL or an absolute path".to_string());
    }
    Ok(())
}

/// Validate an optional display name
pub fn validate_display_name(name: &str) -> Result<(), String> {
    if name.chars().count() > 100 {
        return Err("Display name is too long (max 100 characters)".to_string());
    }
    Ok(())
}

/// Trim an optional text field, mapping blank input to `None`
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Builder for collecting multiple validation errors
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation error for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the outcome of a validator for `field`
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Return Ok(()) if no errors, or `InvalidInput` if there are errors
    pub fn finish(self) -> Result<(), AuthError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::InvalidInput(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice", 3, 50).is_ok());
        assert!(validate_username("Bob_42", 3, 50).is_ok());
        assert!(validate_username("abc", 3, 50).is_ok());
        assert!(validate_username(&"a".repeat(50), 3, 50).is_ok());

        assert!(validate_username("", 3, 50).is_err());
        assert!(validate_username("ab", 3, 50).is_err());
        assert!(validate_username(&"a".repeat(51), 3, 50).is_err());
        assert!(validate_username("alice smith", 3, 50).is_err());
        assert!(validate_username("alice-smith", 3, 50).is_err());
        assert!(validate_username("álice", 3, 50).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.co").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@").is_err());
        assert!(validate_email("alice@localhost").is_err());
        assert!(validate_email("al ice@example.com").is_err());
        assert!(validate_email("alice@-example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123", 8).is_ok());
        assert!(validate_password("12345678", 8).is_ok());
        assert!(matches!(
            validate_password("short", 8),
            Err(AuthError::WeakPassword { min: 8 })
        ));
    }

    #[test]
    fn test_validate_role() {
        assert_eq!(validate_role("moderator").unwrap(), Role::Moderator);
        let err = validate_role("root").unwrap_err();
        assert!(err.contains("user, moderator, admin"));
    }

    #[test]
    fn test_validate_avatar_url() {
        assert!(validate_avatar_url("https://cdn.example.com/a.png").is_ok());
        assert!(validate_avatar_url("/static/avatars/1.png").is_ok());
        assert!(validate_avatar_url("javascript:alert(1)").is_err());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  Alice ")), Some("Alice".to_string()));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_builder_collects_fields() {
        let mut builder = ValidationErrorBuilder::new();
        builder.check("username", validate_username("x", 3, 50));
        builder.check("email", validate_email("nope"));
        builder.check("email", Ok(()));
        builder.add("username", "Username is reserved");

        assert!(!builder.is_empty());
        match builder.finish() {
            Err(AuthError::InvalidInput(errors)) => {
                assert_eq!(errors["username"].len(), 2);
                assert_eq!(errors["email"].len(), 1);
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_builder_empty_is_ok() {
        assert!(ValidationErrorBuilder::new().finish().is_ok());
    }
}
