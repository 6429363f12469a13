//! Credential policy
//!
//! Pure validation rules for the fields that identify and protect an
//! account. Every rule reports into a field-scoped [`ValidationErrors`] so
//! callers can render one message per form field; nothing here touches
//! storage.

use std::borrow::Cow;

use regex::Regex;
use validator::{ValidationError, ValidationErrors};

/// Minimum password length, in characters
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Maximum password length, in characters
pub const PASSWORD_MAX_LENGTH: usize = 72;

/// Maximum display name length, in characters
pub const NAME_MAX_LENGTH: usize = 100;

/// Outcome of a validation pass
pub type ValidationResult = Result<(), ValidationErrors>;

lazy_static::lazy_static! {
    /// Conservative address grammar: word characters, `+`, `-` and `.` in
    /// the local part; dot-separated alphanumeric/hyphen labels in the domain
    /// ending in an alphabetic TLD.
    pub static ref EMAIL_REGEX: Regex =
        Regex::new(r"(?i)^[a-z0-9_+\-.]+@[a-z0-9\-]+(\.[a-z0-9\-]+)*\.[a-z]+$").unwrap();
}

/// Validate an email/password pair.
///
/// `password_required` is set for registration and explicit password
/// changes; on other updates an absent password is fine, but a supplied one
/// must still satisfy the length bounds.
pub fn validate_credentials(
    email: &str,
    password: Option<&str>,
    password_required: bool,
) -> ValidationResult {
    let mut errors = ValidationErrors::new();
    check_email(&mut errors, email);
    check_password(&mut errors, password, password_required);
    finish(errors)
}

/// Validate a single email address
pub fn validate_email(email: &str) -> ValidationResult {
    let mut errors = ValidationErrors::new();
    check_email(&mut errors, email);
    finish(errors)
}

/// Validate a single password
pub fn validate_password(password: Option<&str>, required: bool) -> ValidationResult {
    let mut errors = ValidationErrors::new();
    check_password(&mut errors, password, required);
    finish(errors)
}

/// Validate that a supplied confirmation repeats the password
pub fn validate_password_confirmation(
    password: Option<&str>,
    confirmation: Option<&str>,
) -> ValidationResult {
    let mut errors = ValidationErrors::new();
    check_password_confirmation(&mut errors, password, confirmation);
    finish(errors)
}

/// Validate a display name
pub fn validate_display_name(name: &str) -> ValidationResult {
    let mut errors = ValidationErrors::new();
    check_name(&mut errors, name);
    finish(errors)
}

/// Case-folded form of an address, used only for uniqueness comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn check_email(errors: &mut ValidationErrors, email: &str) {
    if email.trim().is_empty() {
        errors.add("email", field_error("blank", "Email can't be blank"));
    } else if !EMAIL_REGEX.is_match(email) {
        errors.add("email", field_error("format", "Email is invalid"));
    }
}

pub(crate) fn check_password(
    errors: &mut ValidationErrors,
    password: Option<&str>,
    required: bool,
) {
    match password {
        None | Some("") if required => {
            errors.add("password", field_error("blank", "Password can't be blank"));
        }
        None | Some("") => {}
        Some(password) => {
            let length = password.chars().count();
            if length < PASSWORD_MIN_LENGTH {
                errors.add(
                    "password",
                    field_error_owned(
                        "too_short",
                        format!(
                            "Password is too short (minimum is {} characters)",
                            PASSWORD_MIN_LENGTH
                        ),
                    ),
                );
            } else if length > PASSWORD_MAX_LENGTH {
                errors.add(
                    "password",
                    field_error_owned(
                        "too_long",
                        format!(
                            "Password is too long (maximum is {} characters)",
                            PASSWORD_MAX_LENGTH
                        ),
                    ),
                );
            }
        }
    }
}

/// A supplied confirmation must repeat the password exactly.
pub(crate) fn check_password_confirmation(
    errors: &mut ValidationErrors,
    password: Option<&str>,
    confirmation: Option<&str>,
) {
    if let Some(confirmation) = confirmation {
        if password != Some(confirmation) {
            errors.add(
                "password_confirmation",
                field_error("confirmation", "Password confirmation doesn't match Password"),
            );
        }
    }
}

pub(crate) fn check_name(errors: &mut ValidationErrors, name: &str) {
    if name.trim().is_empty() {
        errors.add("name", field_error("blank", "Name can't be blank"));
    } else if name.chars().count() > NAME_MAX_LENGTH {
        errors.add(
            "name",
            field_error_owned(
                "too_long",
                format!("Name is too long (maximum is {} characters)", NAME_MAX_LENGTH),
            ),
        );
    }
}

pub(crate) fn finish(errors: ValidationErrors) -> ValidationResult {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

fn field_error_owned(code: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Owned(message));
    error
}
