//! Error types for relgate-state

use thiserror::Error;

/// Errors raised by artifact stores and package registries.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Nothing stored under the given retention key
    #[error("retention key not found: {key}")]
    KeyNotFound { key: String },

    /// Retention key is empty or escapes the store root
    #[error("invalid retention key: {key}")]
    InvalidKey { key: String },

    /// Digest string is not 64 hex characters
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Registry rejected the supplied credentials
    #[error("registry authentication failed: {reason}")]
    Unauthorized { reason: String },

    /// Network or remote-service failure
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Registry holds a file with the same name but different content
    #[error("registry conflict for {filename}: {reason}")]
    Conflict { filename: String, reason: String },

    /// Manifest or payload could not be (de)serialized
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
