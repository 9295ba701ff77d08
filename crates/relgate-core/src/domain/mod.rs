//! Domain models for relgate.
//!
//! Canonical definitions for the core entities:
//! - `PipelineRun`: one execution of the release pipeline
//! - `PipelineState`: ordered stage state machine
//! - `PipelineError`: failure taxonomy recorded on a run

pub mod error;
pub mod run;
pub mod state;

pub use error::{PipelineError, Result};
pub use run::{
    all_checks_passed, ArtifactPublishRecord, ArtifactPublishStatus, CheckOutcome, CheckResult,
    GitRef, PipelineRun, PublishOutcome, TriggerContext, TriggerEvent,
};
pub use state::{PipelineStage, PipelineState, TransitionError};
