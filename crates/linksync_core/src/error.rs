//! Error types for link synchronization.

use crate::propagate::InverseWrite;
use linksync_store::{Key, ParseError, StoreError};
use thiserror::Error;

/// Result type for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Errors that can occur while defining schemas or running mutations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// An entity type with this name is already defined.
    #[error("entity type already defined: {name}")]
    DuplicateType {
        /// Name of the entity type.
        name: String,
    },

    /// The schema failed eager validation.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// The entity type is not defined.
    #[error("unknown entity type: {name}")]
    UnknownType {
        /// Name of the entity type.
        name: String,
    },

    /// An update operator cannot be applied to a reference field.
    #[error("unsupported operation {operator} on {entity}.{field}")]
    UnsupportedOperation {
        /// Entity type owning the field.
        entity: String,
        /// Reference field name.
        field: String,
        /// Operator as spelled in update documents.
        operator: String,
    },

    /// Caller input is malformed.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// The primary or a target document does not exist.
    #[error("document not found: {entity}/{key}")]
    NotFound {
        /// Entity type searched.
        entity: String,
        /// The missing key.
        key: Key,
    },

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The primary write committed but some inverse writes failed.
    #[error(transparent)]
    Propagation(Box<PropagationError>),
}

impl LinkError {
    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(entity: impl Into<String>, key: Key) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key,
        }
    }

    /// Returns the propagation details if this is a propagation failure.
    #[must_use]
    pub fn as_propagation(&self) -> Option<&PropagationError> {
        match self {
            LinkError::Propagation(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<PropagationError> for LinkError {
    fn from(err: PropagationError) -> Self {
        Self::Propagation(Box::new(err))
    }
}

/// Maps a JSON update parse failure for the entity being updated.
pub(crate) fn from_parse_error(entity: &str, err: ParseError) -> LinkError {
    match err {
        ParseError::UnsupportedOperator { operator, field } => LinkError::UnsupportedOperation {
            entity: entity.to_string(),
            field,
            operator,
        },
        ParseError::Malformed(message) => LinkError::InvalidInput { message },
    }
}

/// One inverse write that could not be applied.
#[derive(Debug)]
pub struct PropagationFailure {
    /// The write that failed; re-issuing it is a valid retry.
    pub write: InverseWrite,
    /// Why it failed.
    pub cause: LinkError,
}

impl PropagationFailure {
    /// Entity type of the document that was not updated.
    #[must_use]
    pub fn target_type(&self) -> &str {
        &self.write.target_type
    }

    /// Key of the document that was not updated.
    #[must_use]
    pub fn target_id(&self) -> &Key {
        &self.write.target_id
    }
}

/// Inverse propagation finished with at least one failed write.
///
/// The primary mutation is committed (or, for deletes, not yet performed).
/// `applied` and `failures` together describe the exact partial state; nothing
/// was rolled back.
#[derive(Debug, Error)]
#[error(
    "{} of {} inverse writes failed while propagating {source_type}/{source_id}",
    .failures.len(),
    .failures.len() + .applied.len()
)]
pub struct PropagationError {
    /// Entity type of the mutated document.
    pub source_type: String,
    /// Key of the mutated document.
    pub source_id: Key,
    /// Inverse writes that were applied.
    pub applied: Vec<InverseWrite>,
    /// Inverse writes that failed.
    pub failures: Vec<PropagationFailure>,
}

impl PropagationError {
    /// Returns the writes a caller would re-issue to finish propagation.
    #[must_use]
    pub fn pending_writes(&self) -> Vec<InverseWrite> {
        self.failures.iter().map(|f| f.write.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linksync_store::UpdateExpression;

    #[test]
    fn error_display() {
        let err = LinkError::DuplicateType {
            name: "person".into(),
        };
        assert_eq!(err.to_string(), "entity type already defined: person");

        let err = LinkError::not_found("house", Key::new("h1"));
        assert_eq!(err.to_string(), "document not found: house/h1");
    }

    #[test]
    fn parse_errors_map_to_link_errors() {
        let err = from_parse_error(
            "person",
            ParseError::UnsupportedOperator {
                operator: "$inc".into(),
                field: "appearances".into(),
            },
        );
        assert!(matches!(err, LinkError::UnsupportedOperation { ref operator, .. } if operator == "$inc"));

        let err = from_parse_error("person", ParseError::Malformed("bad".into()));
        assert!(matches!(err, LinkError::InvalidInput { .. }));
    }

    #[test]
    fn propagation_error_reports_counts() {
        let write = InverseWrite {
            target_type: "house".into(),
            target_id: Key::new("h1"),
            update: UpdateExpression::new(),
        };
        let err = PropagationError {
            source_type: "person".into(),
            source_id: Key::new("a@example.com"),
            applied: vec![write.clone()],
            failures: vec![PropagationFailure {
                write: write.clone(),
                cause: LinkError::Store(StoreError::unavailable("down")),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 of 2 inverse writes failed while propagating person/a@example.com"
        );
        assert_eq!(err.pending_writes(), vec![write]);
        assert_eq!(err.failures[0].target_type(), "house");

        let link_err: LinkError = err.into();
        assert!(link_err.as_propagation().is_some());
    }
}
