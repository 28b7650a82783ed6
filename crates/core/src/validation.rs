//! Input validation for accounts, patients and AI-model settings.
//!
//! Each function returns `CoreError::Validation` naming the offending field.

use validator::ValidateEmail;

use crate::error::CoreError;

/// Minimum password length for new and reset passwords.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Designation value that requires a free-text `custom_designation`.
pub const DESIGNATION_OTHER: &str = "Other";

pub const MIN_TEMPERATURE: f64 = 0.0;
pub const MAX_TEMPERATURE: f64 = 2.0;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const MIN_MAX_TOKENS: i32 = 100;
pub const MAX_MAX_TOKENS: i32 = 4000;
pub const DEFAULT_MAX_TOKENS: i32 = 1000;

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(trimmed)
}

/// Normalize and validate an email address (trimmed, lower-cased).
pub fn normalize_email(email: &str) -> Result<String, CoreError> {
    let email = required(email, "email")?.to_lowercase();
    if !email.validate_email() {
        return Err(CoreError::Validation(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(email)
}

/// Check a new password and its confirmation.
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), CoreError> {
    if password != confirm {
        return Err(CoreError::Validation("Passwords do not match".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }
    Ok(())
}

/// Resolve the stored `custom_designation` for a signup.
///
/// `designation` is required; the custom text is kept only for `Other`.
pub fn validate_designation(
    designation: &str,
    custom: Option<&str>,
) -> Result<Option<String>, CoreError> {
    let designation = required(designation, "designation")?;
    if designation != DESIGNATION_OTHER {
        return Ok(None);
    }
    let custom = custom.map(str::trim).filter(|c| !c.is_empty()).ok_or_else(|| {
        CoreError::Validation("custom_designation is required when designation is Other".into())
    })?;
    Ok(Some(custom.to_string()))
}

pub fn validate_first_name(first_name: &str) -> Result<(), CoreError> {
    required(first_name, "first_name").map(|_| ())
}

/// Patient fields every create/update must satisfy.
pub fn validate_patient(
    first_name: &str,
    medical_id: &str,
    age: Option<i32>,
) -> Result<(), CoreError> {
    required(first_name, "first_name")?;
    required(medical_id, "medical_id")?;
    validate_age(age)
}

pub fn validate_age(age: Option<i32>) -> Result<(), CoreError> {
    match age {
        Some(a) if a <= 0 => Err(CoreError::Validation(format!(
            "age must be a positive number, got {a}"
        ))),
        _ => Ok(()),
    }
}

/// Validate AI-model settings.
///
/// `provider` must already be a known provider name; custom providers need
/// an explicit `base_url`.
pub fn validate_model_settings(
    provider: &str,
    base_url: Option<&str>,
    model_name: &str,
    temperature: f64,
    max_tokens: i32,
) -> Result<(), CoreError> {
    required(model_name, "model_name")?;
    if provider == "custom" && base_url.map_or(true, |u| u.trim().is_empty()) {
        return Err(CoreError::Validation(
            "base_url is required for custom providers".into(),
        ));
    }
    if !temperature.is_finite() || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(CoreError::Validation(format!(
            "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}, got {temperature}"
        )));
    }
    if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
        return Err(CoreError::Validation(format!(
            "max_tokens must be between {MIN_MAX_TOKENS} and {MAX_MAX_TOKENS}, got {max_tokens}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn email_is_normalized() {
        assert_eq!(
            normalize_email("  Dr.Rao@Clinic.ORG ").unwrap(),
            "dr.rao@clinic.org"
        );
        assert_matches!(normalize_email("not-an-email"), Err(CoreError::Validation(_)));
        assert_matches!(normalize_email("   "), Err(CoreError::Validation(_)));
    }

    #[test]
    fn password_rules() {
        assert!(validate_new_password("longenough", "longenough").is_ok());
        assert_matches!(
            validate_new_password("longenough", "different1"),
            Err(CoreError::Validation(msg)) if msg.contains("match")
        );
        assert_matches!(
            validate_new_password("short", "short"),
            Err(CoreError::Validation(msg)) if msg.contains("at least 8")
        );
    }

    #[test]
    fn designation_other_needs_custom_text() {
        assert_eq!(validate_designation("Doctor", Some("ignored")).unwrap(), None);
        assert_eq!(
            validate_designation("Other", Some(" Optometrist ")).unwrap(),
            Some("Optometrist".to_string())
        );
        assert_matches!(validate_designation("Other", None), Err(CoreError::Validation(_)));
        assert_matches!(validate_designation("", None), Err(CoreError::Validation(_)));
    }

    #[test]
    fn patient_rules() {
        assert!(validate_patient("Asha", "MRN-1", Some(54)).is_ok());
        assert!(validate_patient("Asha", "MRN-1", None).is_ok());
        assert_matches!(validate_patient("", "MRN-1", None), Err(CoreError::Validation(_)));
        assert_matches!(validate_patient("Asha", " ", None), Err(CoreError::Validation(_)));
        assert_matches!(validate_patient("Asha", "MRN-1", Some(0)), Err(CoreError::Validation(_)));
    }

    #[test]
    fn model_settings_ranges() {
        assert!(validate_model_settings("openai", None, "gpt-4", 0.7, 1000).is_ok());
        assert!(validate_model_settings("openai", None, "gpt-4", 2.0, 4000).is_ok());
        assert_matches!(
            validate_model_settings("custom", None, "m", 0.7, 1000),
            Err(CoreError::Validation(msg)) if msg.contains("base_url")
        );
        assert_matches!(
            validate_model_settings("openai", None, "gpt-4", 2.1, 1000),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_model_settings("openai", None, "gpt-4", 0.7, 99),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            validate_model_settings("openai", None, "", 0.7, 1000),
            Err(CoreError::Validation(_))
        );
    }
}
