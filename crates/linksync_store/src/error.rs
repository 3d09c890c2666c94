//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A document with the same primary key already exists.
    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey {
        /// The collection written to.
        collection: String,
        /// The conflicting key.
        key: String,
    },

    /// The update expression cannot be applied to the stored document.
    #[error("cannot apply {operator} to field {field}: {reason}")]
    InvalidUpdate {
        /// Field the operator targeted.
        field: String,
        /// Operator name, e.g. `$push`.
        operator: &'static str,
        /// Why the update was rejected.
        reason: String,
    },

    /// The store is temporarily unable to serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
