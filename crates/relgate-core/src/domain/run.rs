//! Pipeline runs and their recorded outcomes.

use chrono::{DateTime, Utc};
use relgate_state::ArtifactFile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use uuid::Uuid;

use super::error::PipelineError;
use super::state::{PipelineStage, PipelineState, TransitionError};

/// Event that triggered the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    PullRequest,
    Push,
    ManualDispatch,
}

impl TriggerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::PullRequest => "pull_request",
            TriggerEvent::Push => "push",
            TriggerEvent::ManualDispatch => "manual_dispatch",
        }
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pull_request" | "pr" => Ok(TriggerEvent::PullRequest),
            "push" => Ok(TriggerEvent::Push),
            "manual_dispatch" | "workflow_dispatch" | "manual" => Ok(TriggerEvent::ManualDispatch),
            other => Err(format!(
                "unknown trigger event '{}' (expected pull_request, push or manual_dispatch)",
                other
            )),
        }
    }
}

/// A source-control reference such as `refs/heads/main` or `refs/tags/v1.0.0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct GitRef(String);

impl GitRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this ref names a tag.
    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    /// Tag name without the `refs/tags/` prefix.
    pub fn tag_name(&self) -> Option<&str> {
        self.0.strip_prefix("refs/tags/")
    }

    /// Branch name without the `refs/heads/` prefix.
    pub fn branch_name(&self) -> Option<&str> {
        self.0.strip_prefix("refs/heads/")
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the trigger evaluator looks at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerContext {
    pub event: TriggerEvent,
    #[serde(rename = "ref")]
    pub git_ref: GitRef,
    /// Branch name, when the event carries one.
    pub branch: Option<String>,
    /// Paths touched by the change; empty means unknown.
    pub changed_paths: BTreeSet<String>,
}

impl TriggerContext {
    pub fn new(event: TriggerEvent, git_ref: impl Into<String>) -> Self {
        Self {
            event,
            git_ref: GitRef::new(git_ref),
            branch: None,
            changed_paths: BTreeSet::new(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_changed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Explicit branch, falling back to the one encoded in the ref.
    pub fn effective_branch(&self) -> Option<&str> {
        self.branch.as_deref().or_else(|| self.git_ref.branch_name())
    }
}

/// Outcome of one verification check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Passed,
    Failed,
    Skipped,
}

/// A `(check_name, outcome)` entry in the run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub check_name: String,
    pub outcome: CheckOutcome,
    /// Failure reason, verbatim from the check.
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn passed(check_name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            check_name: check_name.into(),
            outcome: CheckOutcome::Passed,
            detail: None,
            duration_ms,
        }
    }

    pub fn failed(check_name: impl Into<String>, detail: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            check_name: check_name.into(),
            outcome: CheckOutcome::Failed,
            detail: Some(detail.into()),
            duration_ms,
        }
    }

    pub fn skipped(check_name: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            outcome: CheckOutcome::Skipped,
            detail: None,
            duration_ms: 0,
        }
    }
}

/// Aggregate outcome of the publish stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    #[default]
    NotAttempted,
    Published,
    SkippedExisting,
    Failed,
}

impl PublishOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishOutcome::NotAttempted => "not_attempted",
            PublishOutcome::Published => "published",
            PublishOutcome::SkippedExisting => "skipped_existing",
            PublishOutcome::Failed => "failed",
        }
    }
}

/// Publish outcome of a single artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactPublishStatus {
    Published,
    SkippedExisting,
    Failed { detail: String },
    NotAttempted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactPublishRecord {
    pub filename: String,
    #[serde(flatten)]
    pub status: ArtifactPublishStatus,
}

/// One execution of the release pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub trigger_event: TriggerEvent,
    #[serde(rename = "ref")]
    pub git_ref: GitRef,
    pub branch: Option<String>,
    pub changed_paths: BTreeSet<String>,
    /// Derived from `git_ref` at creation.
    pub is_tag: bool,
    pub commit_sha: String,
    /// Non-empty only once the build stage completed.
    pub artifacts: Vec<ArtifactFile>,
    /// Fixed order; nothing after a `Failed` entry ever ran.
    pub check_results: Vec<CheckResult>,
    pub publish_outcome: PublishOutcome,
    pub publish_records: Vec<ArtifactPublishRecord>,
    pub state: PipelineState,
    pub failure: Option<PipelineError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run for an admitted trigger.
    pub fn new(trigger: TriggerContext, commit_sha: impl Into<String>) -> Self {
        let is_tag = trigger.git_ref.is_tag();
        Self {
            run_id: Uuid::new_v4(),
            trigger_event: trigger.event,
            git_ref: trigger.git_ref,
            branch: trigger.branch,
            changed_paths: trigger.changed_paths,
            is_tag,
            commit_sha: commit_sha.into(),
            artifacts: Vec::new(),
            check_results: Vec::new(),
            publish_outcome: PublishOutcome::NotAttempted,
            publish_records: Vec::new(),
            state: PipelineState::Triggered,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Advance the state machine.
    pub fn transition(&mut self, next: PipelineState) -> Result<(), TransitionError> {
        self.state = self.state.advance(next)?;
        if self.state.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record a successful build and its artifacts.
    pub fn record_build(&mut self, artifacts: Vec<ArtifactFile>) -> Result<(), TransitionError> {
        self.transition(PipelineState::Built)?;
        self.artifacts = artifacts;
        Ok(())
    }

    /// Terminate the run with `error`.
    ///
    /// A run that is already terminal keeps its first failure.
    pub fn fail(&mut self, error: PipelineError) {
        let next = match &error {
            PipelineError::Cancelled { stage } => PipelineState::Cancelled { stage: *stage },
            other => PipelineState::Failed {
                stage: other.stage(),
            },
        };
        if self.transition(next).is_ok() {
            self.failure = Some(error);
        }
    }

    /// Every check ran and passed. An empty log does not count as passed.
    pub fn all_checks_passed(&self) -> bool {
        all_checks_passed(&self.check_results)
    }

    /// First failed check, if any.
    pub fn first_failed_check(&self) -> Option<&CheckResult> {
        self.check_results
            .iter()
            .find(|c| c.outcome == CheckOutcome::Failed)
    }

    /// Wall-clock duration so far (or total, once finished).
    pub fn duration_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The stage a failed or cancelled run stopped at.
    pub fn stopped_at(&self) -> Option<PipelineStage> {
        match self.state {
            PipelineState::Failed { stage } | PipelineState::Cancelled { stage } => Some(stage),
            _ => None,
        }
    }
}

/// Every entry passed and there is at least one entry.
pub fn all_checks_passed(results: &[CheckResult]) -> bool {
    !results.is_empty() && results.iter().all(|c| c.outcome == CheckOutcome::Passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_trigger() -> TriggerContext {
        TriggerContext::new(TriggerEvent::Push, "refs/tags/v2.0.0")
    }

    #[test]
    fn test_trigger_event_from_str() {
        assert_eq!(
            "pull_request".parse::<TriggerEvent>().unwrap(),
            TriggerEvent::PullRequest
        );
        assert_eq!(
            "workflow_dispatch".parse::<TriggerEvent>().unwrap(),
            TriggerEvent::ManualDispatch
        );
        assert!("schedule".parse::<TriggerEvent>().is_err());
    }

    #[test]
    fn test_git_ref_kinds() {
        let tag = GitRef::new("refs/tags/v2.0.1");
        assert!(tag.is_tag());
        assert_eq!(tag.tag_name(), Some("v2.0.1"));
        assert_eq!(tag.branch_name(), None);

        let branch = GitRef::new("refs/heads/main");
        assert!(!branch.is_tag());
        assert_eq!(branch.branch_name(), Some("main"));
    }

    #[test]
    fn test_effective_branch_prefers_explicit() {
        let ctx = TriggerContext::new(TriggerEvent::Push, "refs/heads/main");
        assert_eq!(ctx.effective_branch(), Some("main"));
        let ctx = ctx.with_branch("dependabot/pip/foo");
        assert_eq!(ctx.effective_branch(), Some("dependabot/pip/foo"));
    }

    #[test]
    fn test_new_run_derives_is_tag() {
        let run = PipelineRun::new(tag_trigger(), "abc123");
        assert!(run.is_tag);
        assert_eq!(run.state, PipelineState::Triggered);
        assert_eq!(run.publish_outcome, PublishOutcome::NotAttempted);
        assert!(run.artifacts.is_empty());
    }

    #[test]
    fn test_fail_keeps_first_failure() {
        let mut run = PipelineRun::new(tag_trigger(), "abc123");
        run.fail(PipelineError::BuildFailure {
            detail: "exit 1".to_string(),
        });
        run.fail(PipelineError::RetentionUploadFailure {
            detail: "later".to_string(),
        });
        assert_eq!(
            run.state,
            PipelineState::Failed {
                stage: PipelineStage::Build
            }
        );
        assert!(matches!(
            run.failure,
            Some(PipelineError::BuildFailure { .. })
        ));
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_all_checks_passed_requires_entries() {
        assert!(!all_checks_passed(&[]));
        assert!(all_checks_passed(&[CheckResult::passed("a", 1)]));
        assert!(!all_checks_passed(&[
            CheckResult::passed("a", 1),
            CheckResult::skipped("b"),
        ]));
    }

    #[test]
    fn test_run_serializes_ref_field() {
        let run = PipelineRun::new(tag_trigger(), "abc123");
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["ref"], "refs/tags/v2.0.0");
        assert_eq!(json["trigger_event"], "push");
        assert_eq!(json["publish_outcome"], "not_attempted");
        assert_eq!(json["state"]["state"], "triggered");
    }
}
