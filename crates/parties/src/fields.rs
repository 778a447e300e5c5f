//! Field-level validation shared by companies and customers.

use invoicedesk_core::{DomainError, DomainResult};

/// A trimmed, non-empty value no longer than `max` characters.
pub(crate) fn required(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    bounded(field, value, max)
}

pub(crate) fn optional(field: &str, value: Option<&str>, max: usize) -> DomainResult<()> {
    match value {
        Some(v) => bounded(field, v, max),
        None => Ok(()),
    }
}

fn bounded(field: &str, value: &str, max: usize) -> DomainResult<()> {
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// National company registry id (EIK/BULSTAT): 9 digits for legal entities,
/// 13 for branches.
pub(crate) fn registry_id(field: &str, value: Option<&str>) -> DomainResult<()> {
    let Some(v) = value else {
        return Ok(());
    };
    if !v.chars().all(|c| c.is_ascii_digit()) || !(v.len() == 9 || v.len() == 13) {
        return Err(DomainError::validation(format!(
            "{field} must be 9 or 13 digits"
        )));
    }
    Ok(())
}

/// Trim an optional value; blank becomes `None`.
pub(crate) fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
