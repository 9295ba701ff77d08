//! Stage execution.

use crate::stage::{CommandVars, StageConfig};
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Result of a stage execution.
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,

    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last non-empty output line, preferring stderr.
    pub fn failure_detail(&self) -> String {
        last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} exited with code {}", self.stage_name, self.exit_code))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

/// Runs stage commands as child processes.
pub struct CiRunner;

impl CiRunner {
    /// Render `config.command` with `vars` and run it in `cwd`.
    ///
    /// A non-zero exit is returned as a failed [`StageResult`]; spawn errors
    /// and timeouts are returned as `Err`. The child is killed when the
    /// timeout fires.
    pub async fn execute_stage(
        config: &StageConfig,
        vars: &CommandVars,
        cwd: &Path,
    ) -> anyhow::Result<StageResult> {
        let start = Instant::now();

        if config.command.is_empty() {
            anyhow::bail!("Stage {} has empty command", config.name);
        }

        let command = vars.render(&config.command);
        let exe = &command[0];
        let args = &command[1..];
        debug!(stage = %config.name, command = ?command, "spawning stage");

        let child = Command::new(exe)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("Stage {} could not start {}: {}", config.name, exe, e))?;

        let output = if config.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Stage {} timed out after {} seconds",
                    config.name,
                    config.timeout_secs
                )
            })??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let success = output.status.success();

        Ok(StageResult {
            stage_name: config.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }
}
