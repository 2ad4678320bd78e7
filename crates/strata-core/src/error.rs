//! Error types for Strata services
//!
//! Precondition failures (missing entity, illegal transition, bad input)
//! are returned as [`StrataError`]. Execution-time failures of a patch-op
//! batch are reported through the executor's outcome instead and only
//! surface here as [`StrataError::MergeRejected`] when a lifecycle
//! transition is refused because of them.

use crate::types::SchemaError;
use strata_graph::GraphValidationError;

/// Coarse classification of an error, used by callers mapping to a
/// transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    NotFound,
    Conflict,
    BadRequest,
    Unprocessable,
    Internal,
}

/// Main Strata error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum StrataError {
    /// Entity does not exist in the caller's tenant
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation not permitted in the entity's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Caller input rejected
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Graph invariants violated
    #[error("graph validation failed with {} error(s)", .0.len())]
    ValidationFailure(Vec<GraphValidationError>),

    /// Merge refused because the patch-op batch failed
    #[error("merge rejected: {message}")]
    MergeRejected {
        message: String,
        errors: Vec<GraphValidationError>,
    },

    /// Stored data is inconsistent with what an operation requires
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage backend failure
    #[error("repository error: {0}")]
    Repository(String),
}

impl StrataError {
    /// Create a not-found error
    #[inline]
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an invalid-state error
    #[inline]
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    #[inline]
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    #[must_use]
    pub fn status(&self) -> ErrorStatus {
        match self {
            Self::NotFound { .. } => ErrorStatus::NotFound,
            Self::InvalidState(_) => ErrorStatus::Conflict,
            Self::BadRequest(_) => ErrorStatus::BadRequest,
            Self::ValidationFailure(_) | Self::MergeRejected { .. } => ErrorStatus::Unprocessable,
            Self::Configuration(_) | Self::Repository(_) => ErrorStatus::Internal,
        }
    }

    /// Structured validation errors carried by this error, if any
    #[must_use]
    pub fn validation_errors(&self) -> &[GraphValidationError] {
        match self {
            Self::ValidationFailure(errors) | Self::MergeRejected { errors, .. } => errors,
            _ => &[],
        }
    }
}

impl From<SchemaError> for StrataError {
    fn from(err: SchemaError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result alias for Strata operations
pub type StrataResult<T> = Result<T, StrataError>;
