//! Error type at the service boundary.

use std::fmt::Display;

/// Errors returned by graph, versioning and history operations.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// Referenced area, version or entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of the missing entity.
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// Blank required field, out-of-range pagination, corrupt snapshot.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Persistence failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KernelError {
    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Wrap a storage backend error.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// Whether this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is an invalid-argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
