//! Domain-level error taxonomy for relgate.

use serde::{Deserialize, Serialize};

use super::state::PipelineStage;

/// Why a pipeline run stopped early.
///
/// Every variant aborts the rest of the run. Details are kept verbatim so the
/// run report shows exactly what the collaborator said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("build failed: {detail}")]
    BuildFailure { detail: String },

    #[error("check '{check_name}' failed: {detail}")]
    CheckFailure { check_name: String, detail: String },

    #[error("no artifacts produced: {detail}")]
    ArtifactMissing { detail: String },

    #[error("artifact retention upload failed: {detail}")]
    RetentionUploadFailure { detail: String },

    #[error("publishing {artifact_name} failed: {detail}")]
    PublishFailure {
        artifact_name: String,
        detail: String,
    },

    #[error("run cancelled before {stage} stage")]
    Cancelled { stage: PipelineStage },
}

impl PipelineError {
    /// Stage this error belongs to.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::BuildFailure { .. } => PipelineStage::Build,
            PipelineError::CheckFailure { .. } => PipelineStage::Verify,
            PipelineError::ArtifactMissing { .. } | PipelineError::RetentionUploadFailure { .. } => {
                PipelineStage::Retain
            }
            PipelineError::PublishFailure { .. } => PipelineStage::Publish,
            PipelineError::Cancelled { stage } => *stage,
        }
    }

    /// Stable snake_case name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::BuildFailure { .. } => "build_failure",
            PipelineError::CheckFailure { .. } => "check_failure",
            PipelineError::ArtifactMissing { .. } => "artifact_missing",
            PipelineError::RetentionUploadFailure { .. } => "retention_upload_failure",
            PipelineError::PublishFailure { .. } => "publish_failure",
            PipelineError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Result type for relgate domain operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_failure_display() {
        let err = PipelineError::CheckFailure {
            check_name: "installed_data_files".to_string(),
            detail: "missing data file X".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("installed_data_files"));
        assert!(msg.contains("missing data file X"));
        assert_eq!(err.stage(), PipelineStage::Verify);
    }

    #[test]
    fn test_serde_tagged_by_kind() {
        let err = PipelineError::PublishFailure {
            artifact_name: "pkg-1.0.0.tar.gz".to_string(),
            detail: "403".to_string(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "publish_failure");
        assert_eq!(json["artifact_name"], "pkg-1.0.0.tar.gz");
        assert_eq!(err.kind(), "publish_failure");
    }

    #[test]
    fn test_cancelled_reports_its_stage() {
        let err = PipelineError::Cancelled {
            stage: PipelineStage::Publish,
        };
        assert_eq!(err.stage(), PipelineStage::Publish);
        assert!(err.to_string().contains("publish"));
    }
}
