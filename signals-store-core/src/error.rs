//! Error types shared by the store and the injection container.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors raised by store operations and store resolution.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A dynamic patch named a field the state does not declare.
    #[error("unknown field `{field}`: the key is not part of the store state")]
    UnknownField { field: String },

    /// A dynamic patch carried a value that does not fit the field's type.
    #[error("invalid value for field `{field}`: {source}")]
    InvalidField {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    /// The state could not be encoded as a JSON object.
    #[error("failed to serialize store state: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A type was requested again while it was still being constructed.
    #[error("circular dependency detected: {chain}")]
    CircularDependency { chain: String },

    /// A type's constructor reported a failure.
    #[error("failed to construct `{type_name}`: {reason}")]
    Injection {
        type_name: &'static str,
        reason: String,
    },
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
