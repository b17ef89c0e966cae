//! Error types for the field-tree engine.
//!
//! Every failure in the engine is node-local or operation-local. Resolution
//! collects recoverable errors as [`Problem`](crate::engine::walk::Problem)s
//! and keeps walking siblings; structural and persistence errors are returned
//! to the caller of the single operation that caused them.

use thiserror::Error;

use crate::address::Address;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, FieldError>;

/// Errors raised by the field-tree engine.
#[derive(Debug, Error)]
pub enum FieldError {
    /// A schema node references a tag with no registry entry.
    #[error("unknown field type `{tag}` at {address}")]
    UnknownFieldType { tag: String, address: Address },

    /// An address (or a `pull` group) cannot be resolved in the document.
    #[error("cannot resolve {address}: {reason}")]
    AddressResolution { address: Address, reason: String },

    /// A list operation referenced an index outside `0..len`.
    #[error("index {index} out of range for list {address} of length {len}")]
    StructuralIndex {
        address: Address,
        index: usize,
        len: usize,
    },

    /// Swap is only defined between neighbouring items.
    #[error("cannot swap items {from} and {to} of list {address}: not adjacent")]
    NonAdjacentSwap {
        address: Address,
        from: usize,
        to: usize,
    },

    /// Leaf value does not fit the field type.
    #[error("type mismatch at {address}: expected {expected}, got {actual}")]
    TypeMismatch {
        address: Address,
        expected: String,
        actual: String,
    },

    /// Schema JSON that cannot be turned into a field tree.
    #[error("invalid schema at `{path}`: {reason}")]
    InvalidSchema { path: String, reason: String },

    /// The navigator was asked to enter a node that is not a `nest`.
    #[error("field `{key}` of type `{tag}` cannot be entered")]
    NotANest { key: String, tag: String },

    /// The persistence collaborator failed to save or load.
    #[error("persistence failure for `{id}`: {source}")]
    Persistence {
        id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FieldError {
    pub(crate) fn resolution(address: &Address, reason: impl Into<String>) -> Self {
        FieldError::AddressResolution {
            address: address.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(
        address: &Address,
        expected: impl Into<String>,
        actual: impl std::fmt::Display,
    ) -> Self {
        FieldError::TypeMismatch {
            address: address.clone(),
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn persistence(id: &str, err: anyhow::Error) -> Self {
        FieldError::Persistence {
            id: id.to_string(),
            source: err.into(),
        }
    }

    /// Whether the editing session can carry on past this error with only the
    /// offending node skipped or the offending operation rejected.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FieldError::InvalidSchema { .. })
    }
}
