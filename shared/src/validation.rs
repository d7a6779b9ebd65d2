//! Input validation functions
//!
//! This module provides validation utilities for user input.
//! Uses both custom validators and the `validator` crate for email checks.

use regex_lite::Regex;
use std::sync::OnceLock;
use validator::ValidateEmail;

/// Minimum password length
pub const PASSWORD_MIN_LEN: usize = 8;

/// Maximum password length (bcrypt ignores bytes past 72)
pub const PASSWORD_MAX_LEN: usize = 72;

/// Display name length bounds (in characters)
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z\s]+$").unwrap())
}

/// Normalize an email for lookup and storage
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate email format
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 255 {
        return Err("Email too long".to_string());
    }
    if !email.validate_email() {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

/// Validate password strength
///
/// Collects every failed rule so the client sees them all at once.
pub fn validate_password(password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if password.chars().count() < PASSWORD_MIN_LEN {
        errors.push(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        ));
    }
    if password.len() > PASSWORD_MAX_LEN {
        errors.push(format!(
            "Password must be at most {} bytes",
            PASSWORD_MAX_LEN
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        errors.push("Password must contain at least one letter".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate display name
pub fn validate_name(name: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    let len = name.chars().count();

    if len < NAME_MIN_LEN {
        errors.push(format!("Name must be at least {} characters", NAME_MIN_LEN));
    }
    if len > NAME_MAX_LEN {
        errors.push(format!("Name must be less than {} characters", NAME_MAX_LEN));
    }
    if !name_pattern().is_match(name) {
        errors.push("Name can only contain letters and spaces".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a registration payload
///
/// Returns the failed rules in field order: name, email, password.
pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_name(name) {
        errors.extend(e);
    }
    if let Err(e) = validate_email(email) {
        errors.push(e);
    }
    if let Err(e) = validate_password(password) {
        errors.extend(e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a login payload
///
/// Only presence is checked: strength rules may have changed since the
/// account was created.
pub fn validate_login(email: &str, password: &str) -> Result<(), String> {
    if email.trim().is_empty() || password.is_empty() {
        return Err("Email and password are required".to_string());
    }
    Ok(())
}

/// Derive the default avatar from a display name
pub fn initial_avatar(name: &str) -> Option<String> {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("abc12345")]
    #[case("password1")]
    #[case("12345678a")]
    #[case("Zz0Zz0Zz0Zz0")]
    fn test_valid_passwords(#[case] password: &str) {
        assert!(validate_password(password).is_ok());
    }

    #[rstest]
    #[case("abc123", "at least 8 characters")]
    #[case("abcdefgh", "at least one number")]
    #[case("12345678", "at least one letter")]
    fn test_invalid_passwords(#[case] password: &str, #[case] expected: &str) {
        let errors = validate_password(password).unwrap_err();
        assert!(
            errors.iter().any(|e| e.contains(expected)),
            "expected {:?} in {:?}",
            expected,
            errors
        );
    }

    #[test]
    fn test_short_password_without_digit_reports_both_rules() {
        let errors = validate_password("abc").unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_overlong_password_rejected() {
        let password = format!("a1{}", "x".repeat(PASSWORD_MAX_LEN));
        assert!(validate_password(&password).is_err());
    }

    #[rstest]
    #[case("Ann")]
    #[case("Mary Jane")]
    #[case("Al")]
    fn test_valid_names(#[case] name: &str) {
        assert!(validate_name(name).is_ok());
    }

    #[rstest]
    #[case("A")]
    #[case("R2D2")]
    #[case("<script>")]
    #[case("")]
    fn test_invalid_names(#[case] name: &str) {
        assert!(validate_name(name).is_err());
    }

    #[test]
    fn test_name_too_long() {
        let name = "a".repeat(NAME_MAX_LEN + 1);
        let errors = validate_name(&name).unwrap_err();
        assert!(errors[0].contains("less than 50"));
    }

    #[rstest]
    #[case("ann@x.com", true)]
    #[case("not-an-email", false)]
    #[case("", false)]
    #[case("a@", false)]
    fn test_email_validation(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(validate_email(email).is_ok(), valid);
    }

    #[test]
    fn test_generated_emails_are_valid() {
        for _ in 0..20 {
            let email: String = SafeEmail().fake();
            assert!(validate_email(&email).is_ok(), "{} should be valid", email);
        }
    }

    #[test]
    fn test_registration_collects_errors_in_field_order() {
        let errors = validate_registration("1", "bad", "short").unwrap_err();
        assert!(errors.first().unwrap().starts_with("Name"));
        assert!(errors.last().unwrap().starts_with("Password"));
        assert!(errors.iter().any(|e| e == "Invalid email address"));
    }

    #[test]
    fn test_registration_accepts_valid_payload() {
        assert!(validate_registration("Ann", "ann@x.com", "abc12345").is_ok());
    }

    #[test]
    fn test_login_requires_both_fields() {
        assert!(validate_login("", "pw").is_err());
        assert!(validate_login("ann@x.com", "").is_err());
        assert!(validate_login("ann@x.com", "x").is_ok());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Ann@X.com "), "ann@x.com");
    }

    #[test]
    fn test_initial_avatar() {
        assert_eq!(initial_avatar("ann"), Some("A".to_string()));
        assert_eq!(initial_avatar("  "), None);
    }

    proptest! {
        #[test]
        fn prop_letter_digit_passwords_of_valid_length_pass(
            letters in "[a-zA-Z]{4,30}",
            digits in "[0-9]{4,30}"
        ) {
            let password = format!("{}{}", letters, digits);
            prop_assert!(validate_password(&password).is_ok());
        }
    }
}
