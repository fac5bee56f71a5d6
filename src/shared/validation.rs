//! Validation Utilities

use validator::{Validate, ValidationError, ValidationErrors};

use super::error::{AppError, FieldError};
use crate::domain::SYSTEM_IDENTITY_ID;

/// Convert validation errors to AppError
pub fn validation_error(errors: ValidationErrors) -> AppError {
    let mut field_errors: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldError {
                field: field.to_string(),
                message: e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    field_errors.sort_by(|a, b| a.field.cmp(&b.field));

    let message = field_errors
        .first()
        .map(|e| format!("{}: {}", e.field, e.message))
        .unwrap_or_else(|| "Validation failed".into());

    AppError::Validation(message)
}

/// Validate a request DTO, mapping failures to `AppError::Validation`.
pub fn validate<T: Validate>(value: &T) -> Result<(), AppError> {
    value.validate().map_err(validation_error)
}

/// Room id slugs: lowercase ascii letters, digits, `-` and `_`.
pub fn validate_slug(value: &str) -> Result<(), ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("slug");
        err.message = Some("must match [a-z0-9_-]{1,64}".into());
        Err(err)
    }
}

/// Identity ids supplied by callers: non-blank and not the reserved
/// system id.
pub fn validate_identity_id(value: &str) -> Result<(), ValidationError> {
    let id = value.trim();
    let message = if id.is_empty() {
        "is required"
    } else if id.eq_ignore_ascii_case(SYSTEM_IDENTITY_ID) {
        "is reserved"
    } else {
        return Ok(());
    };
    let mut err = ValidationError::new("identity_id");
    err.message = Some(message.into());
    Err(err)
}

/// Rejects strings that are empty once trimmed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        Err(err)
    } else {
        Ok(())
    }
}
