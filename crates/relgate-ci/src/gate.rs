//! Terminal verdict and exit codes.

use relgate_core::{CheckOutcome, PipelineError, PipelineRun, PipelineState, PublishOutcome};
use serde::{Deserialize, Serialize};

/// How a run ended, as reported to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RunVerdict {
    /// The trigger evaluator declined the event.
    Skipped,
    PassedPublished,
    PassedNotPublished,
    CheckFailed { check_name: String },
    BuildFailed,
    RetentionFailed,
    PublishFailed { artifact_name: Option<String> },
    Cancelled,
}

impl RunVerdict {
    /// Derive the verdict of a finished run.
    ///
    /// Check and publish outcomes come from `check_results` and
    /// `publish_outcome`; build and retention failures leave those looking
    /// untouched and are told apart by the recorded failure.
    pub fn from_run(run: &PipelineRun) -> Self {
        if matches!(run.state, PipelineState::Cancelled { .. }) {
            return RunVerdict::Cancelled;
        }

        if let Some(failed) = run
            .check_results
            .iter()
            .find(|c| c.outcome == CheckOutcome::Failed)
        {
            return RunVerdict::CheckFailed {
                check_name: failed.check_name.clone(),
            };
        }

        if run.publish_outcome == PublishOutcome::Failed {
            let artifact_name = match &run.failure {
                Some(PipelineError::PublishFailure { artifact_name, .. }) => {
                    Some(artifact_name.clone())
                }
                _ => None,
            };
            return RunVerdict::PublishFailed { artifact_name };
        }

        match &run.failure {
            Some(PipelineError::BuildFailure { .. }) => return RunVerdict::BuildFailed,
            Some(PipelineError::ArtifactMissing { .. }) => {
                // An empty build is a build failure, wherever it was noticed.
                return RunVerdict::BuildFailed;
            }
            Some(PipelineError::RetentionUploadFailure { .. }) => {
                return RunVerdict::RetentionFailed
            }
            Some(PipelineError::Cancelled { .. }) => return RunVerdict::Cancelled,
            Some(PipelineError::CheckFailure { check_name, .. }) => {
                return RunVerdict::CheckFailed {
                    check_name: check_name.clone(),
                }
            }
            Some(PipelineError::PublishFailure { artifact_name, .. }) => {
                return RunVerdict::PublishFailed {
                    artifact_name: Some(artifact_name.clone()),
                }
            }
            None => {}
        }

        match run.publish_outcome {
            PublishOutcome::Published | PublishOutcome::SkippedExisting => {
                RunVerdict::PassedPublished
            }
            _ => RunVerdict::PassedNotPublished,
        }
    }

    /// Process exit code.
    ///
    /// 0 passed or skipped, 1 check failed, 2 build failed, 3 publish failed,
    /// 4 retention failed, 5 cancelled.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunVerdict::Skipped | RunVerdict::PassedPublished | RunVerdict::PassedNotPublished => 0,
            RunVerdict::CheckFailed { .. } => 1,
            RunVerdict::BuildFailed => 2,
            RunVerdict::PublishFailed { .. } => 3,
            RunVerdict::RetentionFailed => 4,
            RunVerdict::Cancelled => 5,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}

impl std::fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunVerdict::Skipped => write!(f, "skipped"),
            RunVerdict::PassedPublished => write!(f, "passed, published"),
            RunVerdict::PassedNotPublished => write!(f, "passed, not published"),
            RunVerdict::CheckFailed { check_name } => write!(f, "check {} failed", check_name),
            RunVerdict::BuildFailed => write!(f, "build failed"),
            RunVerdict::RetentionFailed => write!(f, "artifact retention failed"),
            RunVerdict::PublishFailed {
                artifact_name: Some(name),
            } => write!(f, "publishing {} failed", name),
            RunVerdict::PublishFailed {
                artifact_name: None,
            } => write!(f, "publish failed"),
            RunVerdict::Cancelled => write!(f, "cancelled"),
        }
    }
}
