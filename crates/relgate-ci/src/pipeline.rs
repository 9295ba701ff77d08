//! Release pipeline orchestration.

use crate::collaborators::{CommandBuilder, CommandCheck};
use crate::gate::RunVerdict;
use crate::spec::RunSpec;
use crate::stage::{BuiltinCheck, StageConfig};
use anyhow::Context;
use relgate_core::{
    evaluate_trigger, obs, ArtifactBuilder, ArtifactRetention, CancellationToken, PipelineConfig,
    PipelineError, PipelineRun, PipelineStage, PipelineState, PublishGate, TriggerContext,
    TriggerDecision, TriggerPolicy, VerificationGate,
};
use relgate_registry::{IndexClient, IndexConfig};
use relgate_state::{scan_dist_dir, Credentials, LocalArtifactStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

/// Input of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub trigger: TriggerContext,
    pub commit_sha: String,
    /// Checkout to build.
    pub workspace: PathBuf,
}

/// What happened to a request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The trigger evaluator declined the event; no run was created.
    Skipped(TriggerDecision),
    Ran(Box<PipelineRun>),
}

impl PipelineOutcome {
    pub fn verdict(&self) -> RunVerdict {
        match self {
            PipelineOutcome::Skipped(_) => RunVerdict::Skipped,
            PipelineOutcome::Ran(run) => RunVerdict::from_run(run),
        }
    }

    pub fn run(&self) -> Option<&PipelineRun> {
        match self {
            PipelineOutcome::Skipped(_) => None,
            PipelineOutcome::Ran(run) => Some(run),
        }
    }
}

/// Release pipeline: trigger, build, verify, retain, publish.
pub struct ReleasePipeline {
    pub package: String,
    pub policy: TriggerPolicy,
    /// Build output directory, relative paths resolve against the workspace.
    pub dist_dir: PathBuf,
    pub build_timeout: Duration,
    pub builder: Arc<dyn ArtifactBuilder>,
    pub gate: VerificationGate,
    pub retention: ArtifactRetention,
    pub publisher: PublishGate,
}

impl ReleasePipeline {
    /// Wire the command-backed builder and checks, the local artifact store
    /// and the package index client from `config`.
    pub fn from_config(
        config: &PipelineConfig,
        workspace: &Path,
        credentials: Option<Credentials>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let builder = CommandBuilder::new(StageConfig::build(config));

        let mut gate = VerificationGate::new(config.package.name.clone());
        for check in BuiltinCheck::ALL {
            let stage = StageConfig::check(check, config);
            gate = gate.with_check(
                Arc::new(CommandCheck::builtin(check, stage, workspace)),
                config.check_timeout(check.name()),
            );
        }

        let store = LocalArtifactStore::new(resolve(workspace, &config.retention.root));
        let retention = ArtifactRetention::new(Arc::new(store), config.retention_timeout());

        let index = IndexClient::new(IndexConfig {
            index_url: config.publish.index_url.clone(),
            upload_url: config.publish.upload_url.clone(),
            upload_command: config.publish.upload_command.clone(),
            username: "__token__".to_string(),
        })
        .context("Failed to create package index client")?;
        let publisher = PublishGate::new(Arc::new(index), credentials, config.publish_timeout());

        Ok(Self {
            package: config.package.name.clone(),
            policy: config.trigger.clone(),
            dist_dir: config.build.dist_dir.clone(),
            build_timeout: config.build_timeout(),
            builder: Arc::new(builder),
            gate,
            retention,
            publisher,
        })
    }

    /// Evaluate the trigger and, if admitted, execute the run to a terminal state.
    ///
    /// Stage failures are recorded on the returned run; `Err` is reserved for
    /// orchestration faults such as an illegal state transition.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> anyhow::Result<PipelineOutcome> {
        let decision = evaluate_trigger(&request.trigger, &self.policy);
        obs::emit_trigger_evaluated(
            request.trigger.event.as_str(),
            request.trigger.git_ref.as_str(),
            &decision,
            decision.should_run(),
        );
        if !decision.should_run() {
            return Ok(PipelineOutcome::Skipped(decision));
        }

        let spec = RunSpec::new(request.workspace.clone(), &self.package, &request.commit_sha);
        let mut run = PipelineRun::new(request.trigger, request.commit_sha);
        let run_id = run.run_id.to_string();
        let span = obs::run_span(&run_id, run.git_ref.as_str());

        async {
            obs::emit_run_started(
                &run_id,
                run.trigger_event.as_str(),
                run.git_ref.as_str(),
                run.is_tag,
            );
            info!(
                package = %self.package,
                retention_key = %spec.retention_key(),
                "starting release pipeline"
            );

            self.execute(&mut run, &spec, cancel).await?;

            obs::emit_run_finished(
                &run_id,
                run.state.as_str(),
                run.publish_outcome.as_str(),
                run.duration_ms(),
                RunVerdict::from_run(&run).success(),
            );
            anyhow::Ok(())
        }
        .instrument(span)
        .await?;

        Ok(PipelineOutcome::Ran(Box::new(run)))
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        spec: &RunSpec,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        // Build
        if cancel.is_cancelled() {
            fail(run, PipelineError::Cancelled {
                stage: PipelineStage::Build,
            });
            return Ok(());
        }
        let dist_dir = resolve(&spec.workspace_path, &self.dist_dir);
        let artifacts = match self.build(&spec.workspace_path, &dist_dir).await {
            Ok(artifacts) => artifacts,
            Err(detail) => {
                run.check_results = self.gate.skipped_results();
                fail(run, PipelineError::BuildFailure { detail });
                return Ok(());
            }
        };
        transition(run, PipelineState::Built)?;
        run.artifacts = artifacts;

        // Verify
        if cancel.is_cancelled() {
            run.check_results = self.gate.skipped_results();
            fail(run, PipelineError::Cancelled {
                stage: PipelineStage::Verify,
            });
            return Ok(());
        }
        transition(run, PipelineState::Verifying)?;
        let report = if run.artifacts.is_empty() {
            warn!(dist_dir = %dist_dir.display(), "build produced no distributions");
            None
        } else {
            Some(self.gate.run(&dist_dir, &run.artifacts, cancel).await)
        };
        run.check_results = match &report {
            Some(report) => report.results.clone(),
            None => self.gate.skipped_results(),
        };
        if report.as_ref().is_some_and(|r| r.cancelled) {
            fail(run, PipelineError::Cancelled {
                stage: PipelineStage::Verify,
            });
            return Ok(());
        }
        if let Some(failure) = report.and_then(|r| r.failure) {
            fail(run, failure);
            return Ok(());
        }

        // Retain
        if let Err(e) = self
            .retention
            .retain(&spec.retention_key(), &run.artifacts)
            .await
        {
            fail(run, e);
            return Ok(());
        }
        transition(run, PipelineState::Retained)?;

        // Publish
        if cancel.is_cancelled() {
            fail(run, PipelineError::Cancelled {
                stage: PipelineStage::Publish,
            });
            return Ok(());
        }
        transition(run, PipelineState::Publishing)?;
        let published = self
            .publisher
            .publish(run.is_tag, &run.check_results, &run.artifacts, cancel)
            .await;
        run.publish_outcome = published.outcome;
        run.publish_records = published.records;
        match published.failure {
            Some(failure) => fail(run, failure),
            None => transition(run, PipelineState::Done)?,
        }
        Ok(())
    }

    /// Run the builder into a clean `dist_dir` and scan what it produced.
    async fn build(&self, workspace: &Path, dist_dir: &Path) -> Result<Vec<relgate_core::ArtifactFile>, String> {
        if tokio::fs::metadata(dist_dir).await.is_ok() {
            tokio::fs::remove_dir_all(dist_dir)
                .await
                .map_err(|e| format!("cannot clear {}: {}", dist_dir.display(), e))?;
        }

        match tokio::time::timeout(self.build_timeout, self.builder.build(workspace, dist_dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(format!("{:#}", e)),
            Err(_) => {
                return Err(format!(
                    "timed out after {}s",
                    self.build_timeout.as_secs()
                ))
            }
        }

        let artifacts = scan_dist_dir(dist_dir)
            .await
            .map_err(|e| format!("cannot read {}: {}", dist_dir.display(), e))?;
        info!(
            count = artifacts.len(),
            dist_dir = %dist_dir.display(),
            "build finished"
        );
        Ok(artifacts)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn transition(run: &mut PipelineRun, next: PipelineState) -> anyhow::Result<()> {
    let from = run.state.as_str();
    run.transition(next)?;
    obs::emit_stage_transition(&run.run_id.to_string(), from, next.as_str());
    Ok(())
}

fn fail(run: &mut PipelineRun, error: PipelineError) {
    let from = run.state.as_str();
    warn!(kind = error.kind(), error = %error, "run stopped");
    run.fail(error);
    obs::emit_stage_transition(&run.run_id.to_string(), from, run.state.as_str());
}
