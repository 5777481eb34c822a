//! Input validation for counter and color fields.
//!
//! The server rejects invalid input with a 400, and the client runs the same
//! checks before queueing anything, so a malformed change is never replayed.

use std::fmt;

use crate::counter::{CounterPatch, NewCounter};

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty value where one is required.
    Empty(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Daily goal below zero.
    NegativeGoal(i64),
    /// Delta of zero, which would be a no-op mutation.
    ZeroDelta,
    /// Delta that would push the value out of the `i64` range.
    Overflow(i64),
    /// Color is not a 6-hex-digit string.
    InvalidColor(String),
    /// Content type is not an image.
    InvalidImageType(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::NegativeGoal(goal) => {
                write!(f, "daily goal must not be negative (got {})", goal)
            }
            ValidationError::ZeroDelta => write!(f, "delta must not be zero"),
            ValidationError::Overflow(delta) => {
                write!(f, "delta {} would overflow the counter value", delta)
            }
            ValidationError::InvalidColor(msg) => write!(f, "Invalid color: {}", msg),
            ValidationError::InvalidImageType(ty) => {
                write!(f, "Invalid image content type: {}", ty)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for counter names.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum allowed length for usernames.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Validate a counter name (trimmed, non-empty, bounded).
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Empty("name".to_string()));
    }

    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LENGTH,
            actual: len,
        });
    }

    Ok(())
}

/// Validate a daily goal. Zero is allowed and means "no goal".
pub fn validate_daily_goal(goal: i64) -> Result<(), ValidationError> {
    if goal < 0 {
        return Err(ValidationError::NegativeGoal(goal));
    }
    Ok(())
}

pub fn validate_delta(delta: i64) -> Result<(), ValidationError> {
    if delta == 0 {
        return Err(ValidationError::ZeroDelta);
    }
    Ok(())
}

/// Validate a creation request.
pub fn validate_new_counter(input: &NewCounter) -> Result<(), ValidationError> {
    validate_name(&input.name)?;
    if let Some(id) = &input.id {
        if id.trim().is_empty() {
            return Err(ValidationError::Empty("id".to_string()));
        }
    }
    if let Some(goal) = input.daily_goal {
        validate_daily_goal(goal)?;
    }
    Ok(())
}

/// Validate an edit. Only the fields present are checked.
pub fn validate_patch(patch: &CounterPatch) -> Result<(), ValidationError> {
    if let Some(name) = &patch.name {
        validate_name(name)?;
    }
    if let Some(goal) = patch.daily_goal {
        validate_daily_goal(goal)?;
    }
    Ok(())
}

/// Validate a username used as a color key.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();

    if username.is_empty() {
        return Err(ValidationError::Empty("username".to_string()));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_USERNAME_LENGTH,
            actual: username.len(),
        });
    }

    Ok(())
}

/// Validate and normalize a color to lowercase `#rrggbb`.
///
/// Accepts the value with or without the leading `#`.
pub fn normalize_color(color: &str) -> Result<String, ValidationError> {
    let color = color.trim();
    let hex = color.strip_prefix('#').unwrap_or(color);

    if hex.len() != 6 {
        return Err(ValidationError::InvalidColor(format!(
            "expected 6 hex digits, got '{}'",
            color
        )));
    }

    if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidColor(format!(
            "invalid character '{}'",
            c
        )));
    }

    Ok(format!("#{}", hex.to_ascii_lowercase()))
}

/// Validate an uploaded image content type (`image/*`).
pub fn validate_image_type(content_type: &str) -> Result<(), ValidationError> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.split_once('/') {
        Some(("image", subtype)) if !subtype.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidImageType(content_type.to_string())),
    }
}
