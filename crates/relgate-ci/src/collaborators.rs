//! Command-backed builder and checks.

use crate::runner::CiRunner;
use crate::stage::{BuiltinCheck, CommandVars, StageConfig};
use async_trait::async_trait;
use relgate_core::{ArtifactBuilder, ArtifactKind, CheckContext, CheckVerdict, VerificationCheck};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runs the configured build command with `{dist_dir}` substituted.
pub struct CommandBuilder {
    stage: StageConfig,
}

impl CommandBuilder {
    pub fn new(stage: StageConfig) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl ArtifactBuilder for CommandBuilder {
    async fn build(&self, workspace: &Path, dist_dir: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(dist_dir).await?;
        let vars = CommandVars::new().set("dist_dir", dist_dir.to_string_lossy());
        let result = CiRunner::execute_stage(&self.stage, &vars, workspace).await?;
        if !result.passed() {
            anyhow::bail!(result.failure_detail());
        }
        Ok(())
    }
}

/// A verification check backed by a command template.
///
/// Each run gets a fresh temporary `{env_dir}` that is removed afterwards.
pub struct CommandCheck {
    stage: StageConfig,
    required: Option<ArtifactKind>,
    workspace: PathBuf,
}

impl CommandCheck {
    pub fn new(stage: StageConfig, required: Option<ArtifactKind>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            stage,
            required,
            workspace: workspace.into(),
        }
    }

    /// The builtin `check`, with config overrides already folded into `stage`.
    pub fn builtin(check: BuiltinCheck, stage: StageConfig, workspace: impl Into<PathBuf>) -> Self {
        Self::new(stage, Some(check.required_artifact()), workspace)
    }
}

#[async_trait]
impl VerificationCheck for CommandCheck {
    fn name(&self) -> &str {
        &self.stage.name
    }

    fn required_artifact(&self) -> Option<ArtifactKind> {
        self.required
    }

    async fn run(&self, ctx: CheckContext) -> anyhow::Result<CheckVerdict> {
        let env_dir = tempfile::Builder::new()
            .prefix(&format!("relgate-{}-", self.stage.name))
            .tempdir()?;

        let mut vars = CommandVars::new()
            .set("dist_dir", ctx.dist_dir.to_string_lossy())
            .set("package", ctx.package.as_str())
            .set("env_dir", env_dir.path().to_string_lossy());
        if let Some(artifact) = &ctx.artifact {
            vars = vars
                .set("artifact", artifact.path.to_string_lossy())
                .set("artifact_name", artifact.filename.as_str());
        }

        let result = CiRunner::execute_stage(&self.stage, &vars, &self.workspace).await?;
        debug!(check = %self.stage.name, exit_code = result.exit_code, "check command finished");
        if result.passed() {
            Ok(CheckVerdict::Pass)
        } else {
            Ok(CheckVerdict::fail(result.failure_detail()))
        }
    }
}
