//! relgate CI - release pipeline execution
//!
//! Provides the release pipeline orchestrator that:
//! - Builds distributions with the configured build command
//! - Runs the ordered verification checks as child processes
//! - Retains artifacts and publishes tag builds
//! - Maps the finished run to a verdict and exit code

pub mod collaborators;
pub mod gate;
pub mod pipeline;
pub mod runner;
pub mod spec;
pub mod stage;

// Re-export key types
pub use collaborators::{CommandBuilder, CommandCheck};
pub use gate::RunVerdict;
pub use pipeline::{PipelineOutcome, ReleasePipeline, RunRequest};
pub use runner::{CiRunner, StageResult};
pub use spec::RunSpec;
pub use stage::{BuiltinCheck, CommandVars, StageConfig};
