//! Error types for the rollgate state store.

use rollgate_core::names::NameError;
use rollgate_core::{ListError, UpdateError};
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict on {key}: stored version {current}, written version {attempted}")]
    Conflict {
        key: String,
        current: u64,
        attempted: u64,
    },

    #[error(transparent)]
    InvalidName(#[from] NameError),
}

impl From<StateError> for UpdateError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Conflict {
                key,
                current,
                attempted,
            } => UpdateError::Conflict {
                key,
                current,
                attempted,
            },
            StateError::NotFound(key) => UpdateError::NotFound(key),
            other => UpdateError::Store(other.to_string()),
        }
    }
}

impl StateError {
    pub(crate) fn into_list_error(self, namespace: &str) -> ListError {
        ListError {
            namespace: namespace.to_string(),
            reason: self.to_string(),
        }
    }
}
