//! Artifact builder seam.

use async_trait::async_trait;
use std::path::Path;

/// External build step turning a checkout into distribution files.
///
/// Implementations write into `dist_dir`; the pipeline scans it afterwards
/// and classifies files by name.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Build the project at `workspace` into `dist_dir`.
    async fn build(&self, workspace: &Path, dist_dir: &Path) -> anyhow::Result<()>;
}
