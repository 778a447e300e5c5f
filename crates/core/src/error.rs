//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Only deterministic business failures live here. Storage and rendering
/// failures are modelled by the infrastructure crate and folded into its own
/// error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A field failed validation (length, format, scale).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not allowed in the entity's current lifecycle state,
    /// or a relation it requires is missing.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A referenced record does not exist or belongs to another company.
    #[error("not found: {0}")]
    NotFound(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
