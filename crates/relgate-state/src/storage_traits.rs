//! Storage trait definitions for relgate
//!
//! These traits define the two external destinations of a pipeline run:
//! - `ArtifactStore`: transient CI artifact retention, keyed per run
//! - `PackageRegistry`: the public package index
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::artifact::{ArtifactFile, ArtifactKind};
use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore: transient CI retention
// ---------------------------------------------------------------------------

/// One file as recorded by an artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedArtifact {
    pub filename: String,
    pub kind: ArtifactKind,
    pub digest: ContentDigest,
    pub size_bytes: u64,
}

impl From<&ArtifactFile> for RetainedArtifact {
    fn from(file: &ArtifactFile) -> Self {
        Self {
            filename: file.filename.clone(),
            kind: file.kind,
            digest: file.digest.clone(),
            size_bytes: file.size_bytes,
        }
    }
}

/// Receipt returned by [`ArtifactStore::upload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionReceipt {
    /// Retention key (e.g. `<package>-<commit sha>`).
    pub key: String,
    /// Files now held under `key`, in upload order.
    pub artifacts: Vec<RetainedArtifact>,
    /// True when an identical set was already stored under `key`.
    pub reused: bool,
    pub stored_at: DateTime<Utc>,
}

/// Transient artifact store for CI runs.
///
/// Guarantees:
/// - `upload` is idempotent per key: uploading an identical set again is a
///   no-op that reports `reused = true`.
/// - Uploading a different set under an existing key replaces it.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `artifacts` under `key`.
    async fn upload(&self, key: &str, artifacts: &[ArtifactFile])
        -> StorageResult<RetentionReceipt>;

    /// List what is stored under `key`.
    async fn list(&self, key: &str) -> StorageResult<Vec<RetainedArtifact>>;
}

// ---------------------------------------------------------------------------
// PackageRegistry: public package index
// ---------------------------------------------------------------------------

/// Opaque registry token.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// What the registry already holds for a given artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLookup {
    /// No file with this name for this version.
    Absent,
    /// Same name, same content.
    Identical,
    /// Same name, different content.
    Mismatch { existing: Option<ContentDigest> },
}

/// Package registry with create-if-absent semantics.
///
/// Callers are expected to `lookup` before `upload`; `upload` of a file that
/// already exists is allowed to fail with `StorageError::Conflict`.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Check whether `artifact` (by name and version) is already published.
    async fn lookup(&self, artifact: &ArtifactFile) -> StorageResult<RegistryLookup>;

    /// Upload `artifact` using `credentials`.
    async fn upload(&self, artifact: &ArtifactFile, credentials: &Credentials)
        -> StorageResult<()>;
}
