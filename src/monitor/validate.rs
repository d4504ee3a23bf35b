//! Field validators for monitor configuration
//!
//! Each validator returns `Result<(), FieldError>`; [`many`] runs a batch of
//! them and collects every failure so callers can report all bad fields at
//! once.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Maximum length of an identifier-style name
pub const MAX_NAME_LEN: usize = 64;

/// A single invalid field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value for '{field}': {reason}")]
pub struct FieldError {
    /// Public field name (e.g. `Timeout`)
    pub field: String,
    /// What was wrong with the value
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// One or more invalid fields, in the order they were checked
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", join_field_errors(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// Whether the given field failed validation
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Failure for a field, if any
    pub fn field(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == field)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<FieldError> for ValidationError {
    fn from(error: FieldError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Run every check and combine the failures
pub fn many<I>(checks: I) -> Result<(), ValidationError>
where
    I: IntoIterator<Item = Result<(), FieldError>>,
{
    let errors: Vec<FieldError> = checks.into_iter().filter_map(Result::err).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { errors })
    }
}

/// Value must be a hyphenated UUID
pub fn uuid(field: &str, value: &str) -> Result<(), FieldError> {
    // Reject simple/urn/braced forms; only the canonical 36-char form is stored.
    if value.len() != 36 {
        return Err(FieldError::new(field, "must be a valid UUID"));
    }
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| FieldError::new(field, "must be a valid UUID"))
}

fn id_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\p{L}(?:[- _'\p{L}\p{N}]*[\p{L}\p{N}])?$")
            .expect("Invalid identifier-name pattern")
    })
}

/// Value must be a short identifier-style name
///
/// Starts with a letter, ends with a letter or digit, and otherwise contains
/// only letters, digits, spaces, hyphens, underscores and apostrophes.
pub fn id_name(field: &str, value: &str) -> Result<(), FieldError> {
    if value.is_empty() {
        return Err(FieldError::new(field, "must not be empty"));
    }

    let len = value.chars().count();
    if len > MAX_NAME_LEN {
        return Err(FieldError::new(
            field,
            format!("must be at most {} characters (got {})", MAX_NAME_LEN, len),
        ));
    }

    if !id_name_regex().is_match(value) {
        return Err(FieldError::new(
            field,
            "must begin with a letter and contain only letters, digits, spaces, hyphens, underscores or apostrophes",
        ));
    }

    if value.contains("  ") {
        return Err(FieldError::new(field, "must not contain consecutive spaces"));
    }

    Ok(())
}

/// Value must lie within `[min, max]`
pub fn duration(field: &str, value: Duration, min: Duration, max: Duration) -> Result<(), FieldError> {
    if value < min {
        return Err(FieldError::new(
            field,
            format!("must be at least {}", format_minutes(min)),
        ));
    }
    if value > max {
        return Err(FieldError::new(
            field,
            format!("must not be more than {}", format_minutes(max)),
        ));
    }
    Ok(())
}

fn format_minutes(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}m{}s", secs / 60, secs % 60)
    }
}
