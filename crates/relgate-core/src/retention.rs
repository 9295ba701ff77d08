//! Artifact retention.
//!
//! Every run that reaches this stage uploads its full artifact set to the
//! transient store, whatever the verification outcome.

use relgate_state::{ArtifactFile, ArtifactStore, RetentionReceipt};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::domain::{PipelineError, Result};
use crate::obs;

/// Uploads build output to an [`ArtifactStore`] under a per-run key.
#[derive(Clone)]
pub struct ArtifactRetention {
    store: Arc<dyn ArtifactStore>,
    timeout: Duration,
}

impl ArtifactRetention {
    pub fn new(store: Arc<dyn ArtifactStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Upload `artifacts` under `key`.
    ///
    /// An empty set is `ArtifactMissing`; a store error or timeout is
    /// `RetentionUploadFailure`.
    pub async fn retain(&self, key: &str, artifacts: &[ArtifactFile]) -> Result<RetentionReceipt> {
        if artifacts.is_empty() {
            return Err(PipelineError::ArtifactMissing {
                detail: format!("nothing to retain under '{}'", key),
            });
        }

        let receipt = match tokio::time::timeout(self.timeout, self.store.upload(key, artifacts)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "retention upload failed");
                return Err(PipelineError::RetentionUploadFailure {
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                return Err(PipelineError::RetentionUploadFailure {
                    detail: format!("timed out after {}s", self.timeout.as_secs()),
                })
            }
        };

        obs::emit_retention_uploaded(key, receipt.artifacts.len(), receipt.reused);
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_state::fakes::MemoryArtifactStore;

    fn artifacts() -> Vec<ArtifactFile> {
        vec![
            ArtifactFile::from_bytes("dist/pkg-1.0.0.tar.gz", b"s").unwrap(),
            ArtifactFile::from_bytes("dist/pkg-1.0.0-py3-none-any.whl", b"w").unwrap(),
        ]
    }

    #[tokio::test]
    async fn test_retain_uploads_everything_once() {
        let store = Arc::new(MemoryArtifactStore::new());
        let retention = ArtifactRetention::new(store.clone(), Duration::from_secs(5));

        let receipt = retention.retain("pkg-abc123", &artifacts()).await.unwrap();
        assert_eq!(receipt.artifacts.len(), 2);
        assert_eq!(store.upload_calls(), vec!["pkg-abc123".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_set_is_artifact_missing() {
        let store = Arc::new(MemoryArtifactStore::new());
        let retention = ArtifactRetention::new(store.clone(), Duration::from_secs(5));

        let err = retention.retain("pkg-abc123", &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMissing { .. }));
        assert!(store.upload_calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_is_retention_failure() {
        let store = Arc::new(MemoryArtifactStore::new());
        store.fail_uploads("bucket unreachable");
        let retention = ArtifactRetention::new(store, Duration::from_secs(5));

        let err = retention.retain("pkg-abc123", &artifacts()).await.unwrap_err();
        match err {
            PipelineError::RetentionUploadFailure { detail } => {
                assert!(detail.contains("bucket unreachable"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
