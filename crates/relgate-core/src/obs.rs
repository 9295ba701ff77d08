//! Structured observability hooks for pipeline run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: start, trigger decision,
//!   stage transitions, checks, retention, publish, finish
//!
//! Every event carries a stable `event` field so log pipelines can filter on it.

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("4f0c...");
/// // all tracing calls are now associated with run_id = "4f0c..."
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id and ref.
    pub fn enter(run_id: &str, git_ref: &str) -> Self {
        Self {
            _span: run_span(run_id, git_ref).entered(),
        }
    }
}

/// The run-scoped span, for instrumenting futures that cross await points.
pub fn run_span(run_id: &str, git_ref: &str) -> tracing::Span {
    tracing::info_span!("relgate.run", run_id = %run_id, git_ref = %git_ref)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, trigger_event: &str, git_ref: &str, is_tag: bool) {
    info!(
        event = "run.started",
        run_id = %run_id,
        trigger_event = %trigger_event,
        git_ref = %git_ref,
        is_tag = is_tag,
    );
}

/// Emit event: trigger evaluated.
pub fn emit_trigger_evaluated(trigger_event: &str, git_ref: &str, decision: &dyn std::fmt::Display, run: bool) {
    info!(
        event = "trigger.evaluated",
        trigger_event = %trigger_event,
        git_ref = %git_ref,
        decision = %decision,
        run = run,
    );
}

/// Emit event: the run moved between states.
pub fn emit_stage_transition(run_id: &str, from: &str, to: &str) {
    info!(event = "stage.transition", run_id = %run_id, from = %from, to = %to);
}

pub fn emit_check_started(check_name: &str, artifact: Option<&str>) {
    info!(event = "check.started", check = %check_name, artifact = artifact.unwrap_or("-"));
}

pub fn emit_check_finished(check_name: &str, outcome: &str, duration_ms: u64, detail: Option<&str>) {
    if outcome == "failed" {
        warn!(
            event = "check.finished",
            check = %check_name,
            outcome = %outcome,
            duration_ms = duration_ms,
            detail = detail.unwrap_or(""),
        );
    } else {
        info!(
            event = "check.finished",
            check = %check_name,
            outcome = %outcome,
            duration_ms = duration_ms,
        );
    }
}

/// Emit event: artifacts stored under the retention key.
pub fn emit_retention_uploaded(key: &str, artifact_count: usize, reused: bool) {
    info!(
        event = "retention.uploaded",
        key = %key,
        artifact_count = artifact_count,
        reused = reused,
    );
}

/// Emit event: publish status of one artifact.
pub fn emit_publish_artifact(filename: &str, status: &str) {
    info!(event = "publish.artifact", filename = %filename, status = %status);
}

/// Emit event: run finished with its terminal state.
pub fn emit_run_finished(run_id: &str, state: &str, publish_outcome: &str, duration_ms: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        state = %state,
        publish_outcome = %publish_outcome,
        duration_ms = duration_ms,
        success = success,
    );
}
