//! relgate-state: storage seams for the release pipeline
//!
//! This crate owns everything the pipeline persists or sends somewhere else:
//! distribution files on disk, the transient CI artifact store, and the
//! public package registry.
//!
//! ## Key Components
//!
//! - `ArtifactFile`: a classified distribution file (source or binary) with its digest
//! - `ArtifactStore`: transient per-run artifact retention
//! - `PackageRegistry`: create-if-absent / skip-if-identical registry uploads
//! - `LocalArtifactStore`: filesystem-backed `ArtifactStore`
//! - `fakes`: in-memory implementations for tests

mod artifact;
mod error;
pub mod fakes;
mod local_store;
pub mod storage_traits;

pub use artifact::{normalize_name, scan_dist_dir, ArtifactFile, ArtifactKind};
pub use error::StorageError;
pub use local_store::{LocalArtifactStore, MANIFEST_FILE};
pub use storage_traits::{
    ArtifactStore, ContentDigest, Credentials, PackageRegistry, RegistryLookup, RetainedArtifact,
    RetentionReceipt, StorageResult,
};
