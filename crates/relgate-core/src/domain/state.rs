//! Pipeline stage state machine.

use serde::{Deserialize, Serialize};

/// The fixed stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Build,
    Verify,
    Retain,
    Publish,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Build => "build",
            PipelineStage::Verify => "verify",
            PipelineStage::Retain => "retain",
            PipelineStage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a pipeline run.
///
/// Forward path: `Triggered -> Built -> Verifying -> Retained -> Publishing -> Done`.
/// Any non-terminal state may move to `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Triggered,
    Built,
    Verifying,
    Retained,
    Publishing,
    Done,
    Failed { stage: PipelineStage },
    Cancelled { stage: PipelineStage },
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pipeline transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: PipelineState,
    pub to: PipelineState,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Triggered => "triggered",
            PipelineState::Built => "built",
            PipelineState::Verifying => "verifying",
            PipelineState::Retained => "retained",
            PipelineState::Publishing => "publishing",
            PipelineState::Done => "done",
            PipelineState::Failed { .. } => "failed",
            PipelineState::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Failed { .. } | PipelineState::Cancelled { .. }
        )
    }

    /// Move to `next`, rejecting anything off the forward path.
    pub fn advance(self, next: PipelineState) -> Result<PipelineState, TransitionError> {
        use PipelineState::*;
        let allowed = match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Failed { .. }) | (_, Cancelled { .. }) => true,
            (Triggered, Built)
            | (Built, Verifying)
            | (Verifying, Retained)
            | (Retained, Publishing)
            | (Publishing, Done) => true,
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}
