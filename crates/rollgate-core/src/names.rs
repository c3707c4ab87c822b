//! Object name validation.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// DNS-1123 label: lowercase alphanumerics and `-`, alphanumeric at both ends.
static DNS1123_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} {value:?} is longer than 63 characters")]
    TooLong { field: &'static str, value: String },
    #[error("{field} {value:?} is not a valid DNS-1123 label")]
    Invalid { field: &'static str, value: String },
}

/// Check that `value` can be used as a namespace or object name.
pub fn validate_label(field: &'static str, value: &str) -> Result<(), NameError> {
    if value.is_empty() {
        return Err(NameError::Empty { field });
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(NameError::TooLong {
            field,
            value: value.to_string(),
        });
    }
    if !DNS1123_LABEL.is_match(value) {
        return Err(NameError::Invalid {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Split a `namespace/name` key, validating both halves.
pub fn parse_key(key: &str) -> Result<(&str, &str), NameError> {
    let (namespace, name) = key.split_once('/').ok_or_else(|| NameError::Invalid {
        field: "key",
        value: key.to_string(),
    })?;
    validate_label("namespace", namespace)?;
    validate_label("name", name)?;
    Ok((namespace, name))
}
