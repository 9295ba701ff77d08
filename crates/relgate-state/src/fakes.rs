//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryArtifactStore` and `MemoryPackageRegistry` that satisfy the
//! trait contracts without touching the network or the filesystem.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::artifact::ArtifactFile;
use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryArtifactStore
// ---------------------------------------------------------------------------

/// In-memory artifact store backed by a `HashMap<key, Vec<RetainedArtifact>>`.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    retained: Mutex<HashMap<String, Vec<RetainedArtifact>>>,
    uploads: Mutex<Vec<String>>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail with a transport error.
    pub fn fail_uploads(&self, reason: &str) {
        *self.fail_with.lock().unwrap() = Some(reason.to_string());
    }

    /// Keys passed to `upload`, in call order.
    pub fn upload_calls(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(
        &self,
        key: &str,
        artifacts: &[ArtifactFile],
    ) -> StorageResult<RetentionReceipt> {
        self.uploads.lock().unwrap().push(key.to_string());
        if let Some(reason) = self.fail_with.lock().unwrap().clone() {
            return Err(StorageError::Transport { reason });
        }

        let entries: Vec<RetainedArtifact> = artifacts.iter().map(RetainedArtifact::from).collect();
        let mut retained = self.retained.lock().unwrap();
        let reused = retained.get(key) == Some(&entries);
        retained.insert(key.to_string(), entries.clone());
        Ok(RetentionReceipt {
            key: key.to_string(),
            artifacts: entries,
            reused,
            stored_at: Utc::now(),
        })
    }

    async fn list(&self, key: &str) -> StorageResult<Vec<RetainedArtifact>> {
        let retained = self.retained.lock().unwrap();
        retained
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound {
                key: key.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryPackageRegistry
// ---------------------------------------------------------------------------

/// In-memory registry backed by a `HashMap<filename, digest>`.
///
/// Mirrors a real index: filenames are unique, re-uploading an existing
/// filename is a conflict, and uploads require the configured token.
#[derive(Debug, Default)]
pub struct MemoryPackageRegistry {
    files: Mutex<HashMap<String, ContentDigest>>,
    required_token: Option<String>,
    failing: Mutex<HashSet<String>>,
    uploads: Mutex<Vec<String>>,
    stale_lookups: Mutex<usize>,
}

impl MemoryPackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept uploads carrying this token.
    pub fn with_required_token(mut self, token: &str) -> Self {
        self.required_token = Some(token.to_string());
        self
    }

    /// Pre-populate a published file.
    pub fn seed(&self, filename: &str, digest: ContentDigest) {
        self.files
            .lock()
            .unwrap()
            .insert(filename.to_string(), digest);
    }

    /// Answer the next `count` lookups with `Absent`, like an index page
    /// served from a cache that predates the latest upload.
    pub fn with_stale_lookups(self, count: usize) -> Self {
        *self.stale_lookups.lock().unwrap() = count;
        self
    }

    /// Make uploads of `filename` fail with a transport error.
    pub fn fail_upload_of(&self, filename: &str) {
        self.failing.lock().unwrap().insert(filename.to_string());
    }

    /// Whether `filename` is published.
    pub fn contains(&self, filename: &str) -> bool {
        self.files.lock().unwrap().contains_key(filename)
    }

    /// Filenames passed to `upload`, in call order (including failed calls).
    pub fn upload_calls(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageRegistry for MemoryPackageRegistry {
    async fn lookup(&self, artifact: &ArtifactFile) -> StorageResult<RegistryLookup> {
        {
            let mut stale = self.stale_lookups.lock().unwrap();
            if *stale > 0 {
                *stale -= 1;
                return Ok(RegistryLookup::Absent);
            }
        }
        let files = self.files.lock().unwrap();
        Ok(match files.get(&artifact.filename) {
            None => RegistryLookup::Absent,
            Some(d) if *d == artifact.digest => RegistryLookup::Identical,
            Some(d) => RegistryLookup::Mismatch {
                existing: Some(d.clone()),
            },
        })
    }

    async fn upload(
        &self,
        artifact: &ArtifactFile,
        credentials: &Credentials,
    ) -> StorageResult<()> {
        self.uploads.lock().unwrap().push(artifact.filename.clone());

        if let Some(required) = &self.required_token {
            if credentials.token() != required {
                return Err(StorageError::Unauthorized {
                    reason: "invalid or non-existent authentication information".to_string(),
                });
            }
        }
        if self.failing.lock().unwrap().contains(&artifact.filename) {
            return Err(StorageError::Transport {
                reason: format!("connection reset while uploading {}", artifact.filename),
            });
        }

        let mut files = self.files.lock().unwrap();
        if files.contains_key(&artifact.filename) {
            return Err(StorageError::Conflict {
                filename: artifact.filename.clone(),
                reason: "file already exists".to_string(),
            });
        }
        files.insert(artifact.filename.clone(), artifact.digest.clone());
        Ok(())
    }
}
