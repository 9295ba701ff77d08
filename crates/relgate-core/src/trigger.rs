//! Trigger evaluation.
//!
//! Decides whether an incoming event starts a pipeline run. The decision is a
//! pure function of the [`TriggerContext`] and the [`TriggerPolicy`]; it never
//! errors.

use serde::{Deserialize, Serialize};

use crate::domain::{TriggerContext, TriggerEvent};

/// Path and branch filters applied to incoming events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TriggerPolicy {
    /// Documentation-only patterns. A change set made only of these is skipped.
    pub ignore_paths: Vec<String>,
    /// Paths that always force a run, even alongside ignored paths.
    pub override_paths: Vec<String>,
    /// Automated-maintenance branches skipped on push.
    pub ignore_branches: Vec<String>,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            ignore_paths: vec![
                "docs/**".to_string(),
                "**/*.md".to_string(),
                "**/*.rst".to_string(),
                ".github/workflows/*".to_string(),
            ],
            override_paths: vec![".github/workflows/release.yml".to_string()],
            ignore_branches: vec![
                "dependabot/**".to_string(),
                "pre-commit-ci-update-config".to_string(),
            ],
        }
    }
}

/// Why an event was admitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", content = "path", rename_all = "snake_case")]
pub enum RunReason {
    ManualDispatch,
    OverridePath(String),
    CodeChange(String),
    /// No changed paths were reported.
    UnknownChanges,
}

/// Why an event was rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", content = "pattern", rename_all = "snake_case")]
pub enum SkipReason {
    DocumentationOnly,
    IgnoredBranch(String),
}

/// Outcome of [`evaluate_trigger`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", content = "because", rename_all = "snake_case")]
pub enum TriggerDecision {
    Run(RunReason),
    Skip(SkipReason),
}

impl TriggerDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, TriggerDecision::Run(_))
    }
}

impl std::fmt::Display for TriggerDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerDecision::Run(RunReason::ManualDispatch) => write!(f, "run (manual dispatch)"),
            TriggerDecision::Run(RunReason::OverridePath(p)) => {
                write!(f, "run (override path {})", p)
            }
            TriggerDecision::Run(RunReason::CodeChange(p)) => write!(f, "run (change to {})", p),
            TriggerDecision::Run(RunReason::UnknownChanges) => {
                write!(f, "run (changed paths unknown)")
            }
            TriggerDecision::Skip(SkipReason::DocumentationOnly) => {
                write!(f, "skip (documentation-only change)")
            }
            TriggerDecision::Skip(SkipReason::IgnoredBranch(p)) => {
                write!(f, "skip (branch matches {})", p)
            }
        }
    }
}

fn normalize_path(path: &str) -> &str {
    let mut path = path;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path
}

/// Glob match where a leading `**/` also matches at the repository root.
fn path_matches(pattern: &str, path: &str) -> bool {
    if glob_match::glob_match(pattern, path) {
        return true;
    }
    match pattern.strip_prefix("**/") {
        Some(rest) => !path.contains('/') && glob_match::glob_match(rest, path),
        None => false,
    }
}

fn first_match<'a>(patterns: &'a [String], value: &str) -> Option<&'a str> {
    patterns
        .iter()
        .map(String::as_str)
        .find(|p| path_matches(p, value))
}

/// Decide whether `ctx` starts a run.
///
/// Order of evaluation:
/// 1. manual dispatch always runs
/// 2. pushes from a denylisted branch are skipped
/// 3. an unknown change set runs
/// 4. an override path forces a run
/// 5. a change set made only of ignored paths is skipped
///
/// Tag pushes follow the same path rules as any other event.
pub fn evaluate_trigger(ctx: &TriggerContext, policy: &TriggerPolicy) -> TriggerDecision {
    if ctx.event == TriggerEvent::ManualDispatch {
        return TriggerDecision::Run(RunReason::ManualDispatch);
    }

    if ctx.event == TriggerEvent::Push {
        if let Some(branch) = ctx.effective_branch() {
            if let Some(pattern) = first_match(&policy.ignore_branches, branch) {
                return TriggerDecision::Skip(SkipReason::IgnoredBranch(pattern.to_string()));
            }
        }
    }

    if ctx.changed_paths.is_empty() {
        return TriggerDecision::Run(RunReason::UnknownChanges);
    }

    let paths = || ctx.changed_paths.iter().map(|p| normalize_path(p));

    if let Some(path) = paths().find(|p| first_match(&policy.override_paths, p).is_some()) {
        return TriggerDecision::Run(RunReason::OverridePath(path.to_string()));
    }

    match paths().find(|p| first_match(&policy.ignore_paths, p).is_none()) {
        Some(path) => TriggerDecision::Run(RunReason::CodeChange(path.to_string())),
        None => TriggerDecision::Skip(SkipReason::DocumentationOnly),
    }
}
