//! Publish gate.
//!
//! Uploads verified artifacts to the package registry for tag refs only.
//! Publishing is idempotent: a file that the registry already holds with the
//! same content is skipped. The first upload error aborts the rest, so a run
//! may end with part of its artifacts published.

use relgate_state::{
    ArtifactFile, ContentDigest, Credentials, PackageRegistry, RegistryLookup, StorageError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use tokio_util::sync::CancellationToken;
use crate::domain::{
    all_checks_passed, ArtifactPublishRecord, ArtifactPublishStatus, CheckResult, PipelineError,
    PipelineStage, PublishOutcome,
};
use crate::obs;

// ---------------------------------------------------------------------------
// Precondition
// ---------------------------------------------------------------------------

/// Whether a run may publish at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishPrecondition {
    Eligible,
    NotTag,
    ChecksNotPassed,
}

/// Pure publish precondition: a tag ref and every check passed.
pub fn publish_precondition(is_tag: bool, check_results: &[CheckResult]) -> PublishPrecondition {
    if !is_tag {
        PublishPrecondition::NotTag
    } else if !all_checks_passed(check_results) {
        PublishPrecondition::ChecksNotPassed
    } else {
        PublishPrecondition::Eligible
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one publish pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    /// One record per artifact considered, in upload order.
    pub records: Vec<ArtifactPublishRecord>,
    pub failure: Option<PipelineError>,
    pub cancelled: bool,
}

impl PublishReport {
    fn not_attempted() -> Self {
        Self {
            outcome: PublishOutcome::NotAttempted,
            records: Vec::new(),
            failure: None,
            cancelled: false,
        }
    }
}

/// Aggregate per-artifact statuses into the run-level outcome.
///
/// Any failure wins, then any upload. A set made only of skipped files is
/// `SkippedExisting`. Nothing attempted stays `NotAttempted`.
pub fn aggregate_outcome(records: &[ArtifactPublishRecord]) -> PublishOutcome {
    let any = |f: fn(&ArtifactPublishStatus) -> bool| records.iter().any(|r| f(&r.status));

    if any(|s| matches!(s, ArtifactPublishStatus::Failed { .. })) {
        PublishOutcome::Failed
    } else if any(|s| matches!(s, ArtifactPublishStatus::Published)) {
        PublishOutcome::Published
    } else if any(|s| matches!(s, ArtifactPublishStatus::SkippedExisting)) {
        PublishOutcome::SkippedExisting
    } else {
        PublishOutcome::NotAttempted
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Registry uploader with skip-if-identical semantics.
#[derive(Clone)]
pub struct PublishGate {
    registry: Arc<dyn PackageRegistry>,
    credentials: Option<Credentials>,
    timeout: Duration,
}

enum Step {
    Uploaded,
    Skipped,
}

impl PublishGate {
    pub fn new(
        registry: Arc<dyn PackageRegistry>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            credentials,
            timeout,
        }
    }

    /// Publish `artifacts` if the precondition holds.
    ///
    /// Uploads go sources first, then binaries. Cancellation is honored
    /// between artifacts only.
    pub async fn publish(
        &self,
        is_tag: bool,
        check_results: &[CheckResult],
        artifacts: &[ArtifactFile],
        cancel: &CancellationToken,
    ) -> PublishReport {
        match publish_precondition(is_tag, check_results) {
            PublishPrecondition::Eligible => {}
            other => {
                debug!(precondition = ?other, "publish not attempted");
                return PublishReport::not_attempted();
            }
        }

        if artifacts.is_empty() {
            return PublishReport {
                outcome: PublishOutcome::Failed,
                records: Vec::new(),
                failure: Some(PipelineError::ArtifactMissing {
                    detail: "no artifacts to publish".to_string(),
                }),
                cancelled: false,
            };
        }

        let mut ordered: Vec<&ArtifactFile> = artifacts.iter().collect();
        ordered.sort_by(|a, b| (a.kind, &a.filename).cmp(&(b.kind, &b.filename)));

        let mut records = Vec::with_capacity(ordered.len());
        let mut failure = None;
        let mut cancelled = false;

        for artifact in ordered {
            if failure.is_some() || cancelled {
                records.push(record(artifact, ArtifactPublishStatus::NotAttempted));
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                records.push(record(artifact, ArtifactPublishStatus::NotAttempted));
                continue;
            }

            let status = match self.publish_one(artifact).await {
                Ok(Step::Uploaded) => ArtifactPublishStatus::Published,
                Ok(Step::Skipped) => ArtifactPublishStatus::SkippedExisting,
                Err(detail) => {
                    warn!(filename = %artifact.filename, detail = %detail, "publish failed");
                    failure = Some(PipelineError::PublishFailure {
                        artifact_name: artifact.filename.clone(),
                        detail: detail.clone(),
                    });
                    ArtifactPublishStatus::Failed { detail }
                }
            };
            obs::emit_publish_artifact(&artifact.filename, status_name(&status));
            records.push(record(artifact, status));
        }

        let mut outcome = aggregate_outcome(&records);
        if cancelled {
            // A partially published cancelled run is never reported as published.
            outcome = if records
                .iter()
                .all(|r| r.status == ArtifactPublishStatus::NotAttempted)
            {
                PublishOutcome::NotAttempted
            } else {
                PublishOutcome::Failed
            };
            failure.get_or_insert(PipelineError::Cancelled {
                stage: PipelineStage::Publish,
            });
        }

        PublishReport {
            outcome,
            records,
            failure,
            cancelled,
        }
    }

    async fn publish_one(&self, artifact: &ArtifactFile) -> Result<Step, String> {
        match self.lookup(artifact).await? {
            RegistryLookup::Identical => return Ok(Step::Skipped),
            RegistryLookup::Mismatch { existing } => {
                return Err(mismatch_detail(artifact, existing.as_ref()))
            }
            RegistryLookup::Absent => {}
        }

        let Some(credentials) = &self.credentials else {
            return Err(StorageError::Unauthorized {
                reason: "no registry token configured".to_string(),
            }
            .to_string());
        };

        let uploaded = tokio::time::timeout(self.timeout, self.registry.upload(artifact, credentials))
            .await
            .map_err(|_| format!("upload timed out after {}s", self.timeout.as_secs()))?;
        match uploaded {
            Ok(()) => Ok(Step::Uploaded),
            // The index page lagged behind the registry, or another run won the race.
            Err(conflict @ StorageError::Conflict { .. }) => {
                match self.lookup(artifact).await {
                    Ok(RegistryLookup::Mismatch { existing }) => {
                        Err(mismatch_detail(artifact, existing.as_ref()))
                    }
                    Ok(RegistryLookup::Identical) => Ok(Step::Skipped),
                    Ok(RegistryLookup::Absent) => {
                        warn!(
                            filename = %artifact.filename,
                            "registry reports the file as existing but the index does not list it yet"
                        );
                        Ok(Step::Skipped)
                    }
                    Err(e) => Err(format!("{} ({})", conflict, e)),
                }
            }
            Err(e) => Err(e.to_string()),
        }
    }

    async fn lookup(&self, artifact: &ArtifactFile) -> Result<RegistryLookup, String> {
        tokio::time::timeout(self.timeout, self.registry.lookup(artifact))
            .await
            .map_err(|_| format!("registry lookup timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| e.to_string())
    }
}

fn mismatch_detail(artifact: &ArtifactFile, existing: Option<&ContentDigest>) -> String {
    match existing {
        Some(digest) => format!(
            "registry already holds {} with different content (sha256 {})",
            artifact.filename,
            digest.short()
        ),
        None => format!(
            "registry already holds {} and its digest cannot be compared",
            artifact.filename
        ),
    }
}

fn record(artifact: &ArtifactFile, status: ArtifactPublishStatus) -> ArtifactPublishRecord {
    ArtifactPublishRecord {
        filename: artifact.filename.clone(),
        status,
    }
}

fn status_name(status: &ArtifactPublishStatus) -> &'static str {
    match status {
        ArtifactPublishStatus::Published => "published",
        ArtifactPublishStatus::SkippedExisting => "skipped_existing",
        ArtifactPublishStatus::Failed { .. } => "failed",
        ArtifactPublishStatus::NotAttempted => "not_attempted",
    }
}
