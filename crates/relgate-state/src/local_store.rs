//! Filesystem-backed artifact store.
//!
//! Layout: `<root>/<key>/<filename>` plus `<root>/<key>/manifest.json`.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::artifact::ArtifactFile;
use crate::error::StorageError;
use crate::storage_traits::{ArtifactStore, RetainedArtifact, RetentionReceipt, StorageResult};

/// Name of the manifest written next to retained files.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Artifact store that copies files under a local root directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\'])
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(key))
    }

    async fn read_manifest(dir: &Path) -> StorageResult<Option<Vec<RetainedArtifact>>> {
        match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(
        &self,
        key: &str,
        artifacts: &[ArtifactFile],
    ) -> StorageResult<RetentionReceipt> {
        let dir = self.key_dir(key)?;
        let entries: Vec<RetainedArtifact> = artifacts.iter().map(RetainedArtifact::from).collect();

        if let Some(existing) = Self::read_manifest(&dir).await? {
            if existing == entries {
                debug!(key = %key, "identical artifact set already retained");
                return Ok(RetentionReceipt {
                    key: key.to_string(),
                    artifacts: existing,
                    reused: true,
                    stored_at: Utc::now(),
                });
            }
            tokio::fs::remove_dir_all(&dir).await?;
        }

        tokio::fs::create_dir_all(&dir).await?;
        for artifact in artifacts {
            tokio::fs::copy(&artifact.path, dir.join(&artifact.filename)).await?;
        }
        let manifest = serde_json::to_vec_pretty(&entries)?;
        tokio::fs::write(dir.join(MANIFEST_FILE), manifest).await?;

        info!(key = %key, count = entries.len(), dir = %dir.display(), "retained artifacts");
        Ok(RetentionReceipt {
            key: key.to_string(),
            artifacts: entries,
            reused: false,
            stored_at: Utc::now(),
        })
    }

    async fn list(&self, key: &str) -> StorageResult<Vec<RetainedArtifact>> {
        let dir = self.key_dir(key)?;
        Self::read_manifest(&dir)
            .await?
            .ok_or_else(|| StorageError::KeyNotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::scan_dist_dir;

    async fn dist_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Vec<ArtifactFile>) {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }
        let artifacts = scan_dist_dir(dir.path()).await.unwrap();
        (dir, artifacts)
    }

    #[tokio::test]
    async fn test_upload_copies_files_and_manifest() {
        let (_dist, artifacts) =
            dist_with(&[("pkg-1.0.0.tar.gz", "s"), ("pkg-1.0.0-py3-none-any.whl", "w")]).await;
        let root = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(root.path());

        let receipt = store.upload("pkg-abc123", &artifacts).await.unwrap();
        assert!(!receipt.reused);
        assert_eq!(receipt.artifacts.len(), 2);
        assert!(root.path().join("pkg-abc123/pkg-1.0.0.tar.gz").exists());
        assert!(root.path().join("pkg-abc123").join(MANIFEST_FILE).exists());

        let listed = store.list("pkg-abc123").await.unwrap();
        assert_eq!(listed, receipt.artifacts);
    }

    #[tokio::test]
    async fn test_upload_same_key_twice_is_reused() {
        let (_dist, artifacts) = dist_with(&[("pkg-1.0.0.tar.gz", "s")]).await;
        let root = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(root.path());

        store.upload("pkg-abc123", &artifacts).await.unwrap();
        let second = store.upload("pkg-abc123", &artifacts).await.unwrap();
        assert!(second.reused);
    }

    #[tokio::test]
    async fn test_upload_rejects_path_escape() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(root.path());
        let err = store.upload("../escape", &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_list_unknown_key() {
        let root = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(root.path());
        let err = store.list("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::KeyNotFound { .. }));
    }
}
