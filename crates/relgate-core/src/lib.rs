//! relgate core library
//!
//! Domain model and stage logic of the release pipeline: trigger evaluation,
//! the ordered verification gate, artifact retention and the publish gate.
//! Process-backed collaborators and the orchestrator live in `relgate-ci`.

pub mod builder;
pub mod config;
pub mod domain;
pub mod obs;
pub mod publish_gate;
pub mod retention;
pub mod telemetry;
pub mod trigger;
pub mod verification;

pub use builder::ArtifactBuilder;
pub use config::{ConfigError, PipelineConfig, CHECK_NAMES, CONFIG_FILE};
pub use domain::{
    all_checks_passed, ArtifactPublishRecord, ArtifactPublishStatus, CheckOutcome, CheckResult,
    GitRef, PipelineError, PipelineRun, PipelineStage, PipelineState, PublishOutcome, Result,
    TransitionError, TriggerContext, TriggerEvent,
};
pub use publish_gate::{
    aggregate_outcome, publish_precondition, PublishGate, PublishPrecondition, PublishReport,
};
pub use retention::ArtifactRetention;
pub use telemetry::init_tracing;
pub use trigger::{evaluate_trigger, RunReason, SkipReason, TriggerDecision, TriggerPolicy};
pub use verification::{CheckContext, CheckVerdict, GateReport, VerificationCheck, VerificationGate};

pub use relgate_state::{ArtifactFile, ArtifactKind, Credentials};
pub use tokio_util::sync::CancellationToken;
