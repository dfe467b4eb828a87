//! Shared decode/encode helpers for remote string values.

use crmsync_core::{CoreError, CoreResult};
use std::collections::BTreeSet;

/// Absent or empty reads as `None`.
pub(crate) fn opt_string(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

/// Trimmed; absent, empty or whitespace-only reads as `None`.
pub(crate) fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Encodes an optional value, absent as the empty string.
pub(crate) fn opt_encode(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Decodes a semicolon-joined set; absent or empty reads as empty.
pub(crate) fn split_set(value: Option<&str>) -> BTreeSet<String> {
    value
        .filter(|s| !s.is_empty())
        .map(|s| s.split(';').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Encodes a set as a semicolon-joined string, in set order, so
/// re-encoding a decoded value is stable regardless of the element
/// order the remote store persisted.
pub(crate) fn join_set(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(";")
}

/// Decodes an integer; absent or empty reads as `None`.
pub(crate) fn opt_i64(property: &str, value: Option<&str>) -> CoreResult<Option<i64>> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| CoreError::invalid_property(property, format!("{s:?} is not an integer"))),
        None => Ok(None),
    }
}

/// Decodes a number; absent or empty reads as `None`.
pub(crate) fn opt_f64(property: &str, value: Option<&str>) -> CoreResult<Option<f64>> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| CoreError::invalid_property(property, format!("{s:?} is not a number"))),
        None => Ok(None),
    }
}

/// Non-blank remote string value.
pub(crate) fn is_non_blank(value: Option<&String>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

/// Remote string value parsing to a non-zero number.
pub(crate) fn is_non_zero_number(value: Option<&String>) -> bool {
    value
        .and_then(|s| s.trim().parse::<f64>().ok())
        .is_some_and(|n| n != 0.0)
}
