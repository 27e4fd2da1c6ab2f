//! Field rules shared by the request types in [`crate::models`].
//!
//! Every rule is a pure function usable from `#[validate(custom(...))]`.

use std::borrow::Cow;

use validator::ValidationError;

/// Domain every student and lecturer email address must belong to.
pub const EMAIL_DOMAIN: &str = "@gmail.com";

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// Rejects empty and whitespace-only strings.
///
/// # Errors
/// Returns a `blank` violation.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(violation("blank", "must not be empty or whitespace"));
    }
    Ok(())
}

/// Rejects the empty string; whitespace is allowed.
///
/// # Errors
/// Returns an `empty` violation.
pub fn not_empty(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(violation("empty", "must not be empty"));
    }
    Ok(())
}

/// Requires a non-empty local part followed by [`EMAIL_DOMAIN`].
///
/// # Errors
/// Returns `empty`, `domain` or `local_part` depending on which check fails.
pub fn campus_email(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(violation("empty", "email must not be empty"));
    }
    match value.strip_suffix(EMAIL_DOMAIN) {
        None => Err(violation("domain", "email must end with @gmail.com")),
        Some("") => Err(violation(
            "local_part",
            "email must have a name before @gmail.com",
        )),
        Some(_) => Ok(()),
    }
}
