//! Field validation for the verification API.
//!
//! Every check runs before the handler touches the store: a failed check
//! maps straight to a 400 response and the attempt is never logged.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// A single failed field check.
#[derive(Debug, Clone, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
        )
        .expect("uuid pattern compiles")
    })
}

/// Require the canonical hyphenated UUID shape.
pub fn validate_uuid(value: &str, field: &str) -> ValidationResult<()> {
    if uuid_pattern().is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(field, "expected a UUID"))
    }
}

/// UUID check for an identifier the caller may omit.
pub fn validate_optional_uuid(value: Option<&str>, field: &str) -> ValidationResult<()> {
    match value {
        Some(v) => validate_uuid(v, field),
        None => Ok(()),
    }
}

/// Reject empty and whitespace-only values.
pub fn validate_not_empty(value: &str, field: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be blank"));
    }
    Ok(())
}

/// Bound a value's length to `min..=max` bytes.
pub fn validate_length(value: &str, min: usize, max: usize, field: &str) -> ValidationResult<()> {
    if value.len() < min {
        return Err(ValidationError::new(
            field,
            format!("shorter than {min} characters"),
        ));
    }
    if value.len() > max {
        return Err(ValidationError::new(
            field,
            format!("longer than {max} characters"),
        ));
    }
    Ok(())
}

/// Non-blank plus length bounds, for a field the caller may omit.
pub fn validate_optional_field(
    value: Option<&str>,
    min: usize,
    max: usize,
    field: &str,
) -> ValidationResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    validate_not_empty(value, field)?;
    validate_length(value, min, max, field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_uuids() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "id").is_ok());
        assert!(validate_uuid("FFFFFFFF-FFFF-FFFF-FFFF-FFFFFFFFFFFF", "id").is_ok());
    }

    #[test]
    fn rejects_malformed_uuids() {
        for bad in ["", "plainly-wrong", "550e8400-e29b-41d4-a716",
            "550e8400e29b41d4a716446655440000"]
        {
            assert!(validate_uuid(bad, "id").is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn optional_uuid_only_checks_present_values() {
        assert!(validate_optional_uuid(None, "id").is_ok());
        assert!(validate_optional_uuid(Some("550e8400-e29b-41d4-a716-446655440000"), "id").is_ok());
        assert!(validate_optional_uuid(Some("nope"), "id").is_err());
    }

    #[test]
    fn blank_values_are_rejected() {
        assert!(validate_not_empty("key", "field").is_ok());
        assert!(validate_not_empty("", "field").is_err());
        assert!(validate_not_empty("  \t\n", "field").is_err());
    }

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(validate_length("abcde", 5, 5, "field").is_ok());
        assert!(validate_length("abcd", 5, 10, "field").is_err());
        assert!(validate_length("abcdefghijk", 5, 10, "field").is_err());
    }

    #[test]
    fn optional_fields_combine_both_checks() {
        assert!(validate_optional_field(None, 1, 10, "field").is_ok());
        assert!(validate_optional_field(Some("ok"), 1, 10, "field").is_ok());
        assert!(validate_optional_field(Some("   "), 1, 10, "field").is_err());
        assert!(validate_optional_field(Some("far too long"), 1, 10, "field").is_err());
    }

    #[test]
    fn error_names_the_field() {
        let err = validate_uuid("bad", "customerId").unwrap_err();
        assert_eq!(err.field, "customerId");
        assert!(err.to_string().starts_with("customerId:"));
    }
}
