//! Verification gate.
//!
//! Runs a fixed, ordered list of checks against the built artifacts. The first
//! failure stops the gate; every later check is recorded as skipped.

use async_trait::async_trait;
use relgate_state::{ArtifactFile, ArtifactKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use crate::domain::{CheckOutcome, CheckResult, PipelineError};
use crate::obs;

/// Input handed to a check.
#[derive(Debug, Clone)]
pub struct CheckContext {
    /// Expected distribution name.
    pub package: String,
    pub dist_dir: PathBuf,
    /// Artifact resolved from `required_artifact`, if the check declared one.
    pub artifact: Option<ArtifactFile>,
}

/// What a check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    Pass,
    Fail { reason: String },
}

impl CheckVerdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        CheckVerdict::Fail {
            reason: reason.into(),
        }
    }
}

/// A single named verification step.
#[async_trait]
pub trait VerificationCheck: Send + Sync {
    /// Stable name recorded in the run log.
    fn name(&self) -> &str;

    /// Kind of distribution the check operates on, if any.
    fn required_artifact(&self) -> Option<ArtifactKind>;

    /// Run the check. An `Err` counts as a failure of this check.
    async fn run(&self, ctx: CheckContext) -> anyhow::Result<CheckVerdict>;
}

struct GateEntry {
    check: Arc<dyn VerificationCheck>,
    timeout: Duration,
}

/// Result of one gate pass.
#[derive(Debug, Clone, PartialEq)]
pub struct GateReport {
    /// One entry per configured check, in declaration order.
    pub results: Vec<CheckResult>,
    /// Set when a check failed.
    pub failure: Option<PipelineError>,
    /// Set when the gate stopped because the run was cancelled.
    pub cancelled: bool,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }
}

/// Ordered list of checks for one package.
pub struct VerificationGate {
    package: String,
    checks: Vec<GateEntry>,
}

impl VerificationGate {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            checks: Vec::new(),
        }
    }

    /// Append a check; checks run in the order they were added.
    pub fn with_check(mut self, check: Arc<dyn VerificationCheck>, timeout: Duration) -> Self {
        self.checks.push(GateEntry { check, timeout });
        self
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn check_names(&self) -> Vec<String> {
        self.checks
            .iter()
            .map(|e| e.check.name().to_string())
            .collect()
    }

    /// Every configured check marked skipped; used when verification never ran.
    pub fn skipped_results(&self) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|e| CheckResult::skipped(e.check.name()))
            .collect()
    }

    fn resolve_artifact(&self, kind: ArtifactKind, artifacts: &[ArtifactFile]) -> Option<ArtifactFile> {
        artifacts
            .iter()
            .find(|a| a.kind == kind && a.matches_package(&self.package))
            .cloned()
    }

    /// Run every check in order against `artifacts` found in `dist_dir`.
    pub async fn run(
        &self,
        dist_dir: &Path,
        artifacts: &[ArtifactFile],
        cancel: &CancellationToken,
    ) -> GateReport {
        let mut results = Vec::with_capacity(self.checks.len());
        let mut failure = None;
        let mut cancelled = false;

        for entry in &self.checks {
            let name = entry.check.name();
            if failure.is_some() || cancelled {
                results.push(CheckResult::skipped(name));
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                results.push(CheckResult::skipped(name));
                continue;
            }

            let result = self.run_one(entry, dist_dir, artifacts).await;
            if result.outcome == CheckOutcome::Failed {
                failure = Some(PipelineError::CheckFailure {
                    check_name: result.check_name.clone(),
                    detail: result.detail.clone().unwrap_or_default(),
                });
            }
            results.push(result);
        }

        GateReport {
            results,
            failure,
            cancelled,
        }
    }

    async fn run_one(&self, entry: &GateEntry, dist_dir: &Path, artifacts: &[ArtifactFile]) -> CheckResult {
        let name = entry.check.name();
        let started = Instant::now();

        let artifact = match entry.check.required_artifact() {
            Some(kind) => match self.resolve_artifact(kind, artifacts) {
                Some(artifact) => Some(artifact),
                None => {
                    let detail = format!(
                        "no {} distribution matching '{}' in {}",
                        kind,
                        self.package,
                        dist_dir.display()
                    );
                    obs::emit_check_finished(name, "failed", 0, Some(&detail));
                    return CheckResult::failed(name, detail, 0);
                }
            },
            None => None,
        };

        obs::emit_check_started(name, artifact.as_ref().map(|a| a.filename.as_str()));
        let ctx = CheckContext {
            package: self.package.clone(),
            dist_dir: dist_dir.to_path_buf(),
            artifact,
        };

        let verdict = tokio::time::timeout(entry.timeout, entry.check.run(ctx)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match verdict {
            Ok(Ok(CheckVerdict::Pass)) => CheckResult::passed(name, duration_ms),
            Ok(Ok(CheckVerdict::Fail { reason })) => CheckResult::failed(name, reason, duration_ms),
            Ok(Err(e)) => CheckResult::failed(name, format!("{:#}", e), duration_ms),
            Err(_) => CheckResult::failed(
                name,
                format!("timed out after {}s", entry.timeout.as_secs()),
                duration_ms,
            ),
        };
        let outcome = match result.outcome {
            CheckOutcome::Passed => "passed",
            CheckOutcome::Failed => "failed",
            CheckOutcome::Skipped => "skipped",
        };
        obs::emit_check_finished(name, outcome, duration_ms, result.detail.as_deref());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCheck {
        name: &'static str,
        kind: Option<ArtifactKind>,
        verdict: CheckVerdict,
        calls: AtomicUsize,
    }

    impl FixedCheck {
        fn new(name: &'static str, kind: Option<ArtifactKind>, verdict: CheckVerdict) -> Arc<Self> {
            Arc::new(Self {
                name,
                kind,
                verdict,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VerificationCheck for FixedCheck {
        fn name(&self) -> &str {
            self.name
        }

        fn required_artifact(&self) -> Option<ArtifactKind> {
            self.kind
        }

        async fn run(&self, _ctx: CheckContext) -> anyhow::Result<CheckVerdict> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.verdict.clone())
        }
    }

    struct SlowCheck;

    #[async_trait]
    impl VerificationCheck for SlowCheck {
        fn name(&self) -> &str {
            "slow"
        }

        fn required_artifact(&self) -> Option<ArtifactKind> {
            None
        }

        async fn run(&self, _ctx: CheckContext) -> anyhow::Result<CheckVerdict> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CheckVerdict::Pass)
        }
    }

    fn artifacts() -> Vec<ArtifactFile> {
        vec![
            ArtifactFile::from_bytes("dist/pkg-2.0.0.tar.gz", b"sdist").unwrap(),
            ArtifactFile::from_bytes("dist/pkg-2.0.0-py3-none-any.whl", b"wheel").unwrap(),
        ]
    }

    const T: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_all_checks_pass_in_order() {
        let gate = VerificationGate::new("pkg")
            .with_check(FixedCheck::new("a", Some(ArtifactKind::Source), CheckVerdict::Pass), T)
            .with_check(FixedCheck::new("b", Some(ArtifactKind::Binary), CheckVerdict::Pass), T);

        let report = gate
            .run(Path::new("dist"), &artifacts(), &CancellationToken::new())
            .await;
        assert!(report.passed());
        let names: Vec<_> = report.results.iter().map(|r| r.check_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failure_skips_later_checks() {
        let third = FixedCheck::new("third", None, CheckVerdict::Pass);
        let gate = VerificationGate::new("pkg")
            .with_check(FixedCheck::new("first", None, CheckVerdict::Pass), T)
            .with_check(
                FixedCheck::new("second", None, CheckVerdict::fail("missing data file X")),
                T,
            )
            .with_check(third.clone(), T);

        let report = gate
            .run(Path::new("dist"), &artifacts(), &CancellationToken::new())
            .await;
        let outcomes: Vec<_> = report.results.iter().map(|r| r.outcome).collect();
        assert_eq!(
            outcomes,
            vec![CheckOutcome::Passed, CheckOutcome::Failed, CheckOutcome::Skipped]
        );
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            report.failure,
            Some(PipelineError::CheckFailure {
                check_name: "second".to_string(),
                detail: "missing data file X".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_the_check() {
        let check = FixedCheck::new("needs_wheel", Some(ArtifactKind::Binary), CheckVerdict::Pass);
        let gate = VerificationGate::new("pkg").with_check(check.clone(), T);
        let only_sdist = vec![ArtifactFile::from_bytes("dist/pkg-2.0.0.tar.gz", b"s").unwrap()];

        let report = gate
            .run(Path::new("dist"), &only_sdist, &CancellationToken::new())
            .await;
        assert_eq!(report.results[0].outcome, CheckOutcome::Failed);
        assert!(report.results[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("no binary distribution matching 'pkg'"));
        assert_eq!(check.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_package_artifacts_do_not_match() {
        let gate = VerificationGate::new("other-pkg").with_check(
            FixedCheck::new("sdist", Some(ArtifactKind::Source), CheckVerdict::Pass),
            T,
        );
        let report = gate
            .run(Path::new("dist"), &artifacts(), &CancellationToken::new())
            .await;
        assert!(!report.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_failure() {
        let gate = VerificationGate::new("pkg").with_check(Arc::new(SlowCheck), Duration::from_secs(2));
        let report = gate
            .run(Path::new("dist"), &artifacts(), &CancellationToken::new())
            .await;
        assert_eq!(report.results[0].outcome, CheckOutcome::Failed);
        assert_eq!(report.results[0].detail.as_deref(), Some("timed out after 2s"));
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let gate = VerificationGate::new("pkg")
            .with_check(FixedCheck::new("a", None, CheckVerdict::Pass), T);
        let report = gate.run(Path::new("dist"), &artifacts(), &cancel).await;
        assert!(report.cancelled);
        assert!(report.failure.is_none());
        assert_eq!(report.results[0].outcome, CheckOutcome::Skipped);
    }

    #[test]
    fn test_skipped_results_cover_every_check() {
        let gate = VerificationGate::new("pkg")
            .with_check(FixedCheck::new("a", None, CheckVerdict::Pass), T)
            .with_check(FixedCheck::new("b", None, CheckVerdict::Pass), T);
        let skipped = gate.skipped_results();
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().all(|r| r.outcome == CheckOutcome::Skipped));
    }
}
