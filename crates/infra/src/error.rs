//! Typed failures of the invoicing operations.

use thiserror::Error;

use invoicedesk_core::DomainError;

use crate::render::RenderError;
use crate::store::StoreError;

pub type InvoiceResult<T> = Result<T, InvoiceError>;

/// Failure of an exposed invoicing operation.
///
/// Domain, store and renderer errors all fold into this enum so callers only
/// ever match on one taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    /// Company, customer or invoice missing, or outside the active company.
    #[error("not found: {0}")]
    NotFound(String),

    /// Wrong lifecycle state, or a required relation is missing.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The store rejected a concurrent write. Safe to retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The document renderer failed or timed out.
    #[error("render failed: {0}")]
    RenderFailed(String),

    /// The store or file system is unavailable.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl InvoiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Only concurrency conflicts may succeed when retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InvoiceError::ConcurrencyConflict(_))
    }
}

impl From<DomainError> for InvoiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => InvoiceError::ValidationFailed(msg),
            DomainError::InvalidState(msg) => InvoiceError::InvalidState(msg),
            DomainError::NotFound(msg) => InvoiceError::NotFound(msg),
        }
    }
}

impl From<StoreError> for InvoiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => InvoiceError::ConcurrencyConflict(msg),
            StoreError::Constraint(msg) => InvoiceError::InvalidState(msg),
            StoreError::Backend(msg) => InvoiceError::Storage(msg),
        }
    }
}

impl From<RenderError> for InvoiceError {
    fn from(value: RenderError) -> Self {
        InvoiceError::RenderFailed(value.to_string())
    }
}

impl From<std::io::Error> for InvoiceError {
    fn from(value: std::io::Error) -> Self {
        InvoiceError::Storage(format!("file system: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrency_conflicts_are_retryable() {
        assert!(InvoiceError::from(StoreError::Conflict("40001".into())).is_retryable());
        for err in [
            InvoiceError::not_found("invoice"),
            InvoiceError::InvalidState("issued".into()),
            InvoiceError::ValidationFailed("currency".into()),
            InvoiceError::RenderFailed("boom".into()),
            InvoiceError::Storage("down".into()),
        ] {
            assert!(!err.is_retryable(), "{err} must not be retryable");
        }
    }

    #[test]
    fn domain_errors_keep_their_kind() {
        assert_eq!(
            InvoiceError::from(DomainError::not_found("customer")),
            InvoiceError::NotFound("customer".into())
        );
        assert_eq!(
            InvoiceError::from(DomainError::validation("bad")),
            InvoiceError::ValidationFailed("bad".into())
        );
    }

    #[test]
    fn restrict_violations_surface_as_invalid_state() {
        let err = InvoiceError::from(StoreError::Constraint("customer has invoices".into()));
        assert!(matches!(err, InvoiceError::InvalidState(_)));
    }
}
