//! Error types for the key-value engine and its transport.

use crate::types::Revision;
use thiserror::Error;

/// Main error type for engine and transport operations.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    #[error("invalid path/key: {0:?}")]
    InvalidPath(String),

    #[error("no such key: {0}")]
    NotFound(String),

    #[error("revision conflict on {key}: expected {expected}")]
    RevisionConflict { key: String, expected: i64 },

    #[error("invalid JSON: {0}")]
    InvalidPayload(String),

    #[error("missing revision")]
    MissingRevision,

    #[error("invalid revision: {0:?}")]
    InvalidRevision(String),

    #[error("engine closed")]
    Closed,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvError {
    /// Conflict for a CAS attempt that carried a valid revision.
    pub fn conflict(key: impl Into<String>, expected: Revision) -> Self {
        KvError::RevisionConflict {
            key: key.into(),
            expected: expected.0 as i64,
        }
    }
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::InvalidPayload(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, KvError>;
