//! Run identity.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity of a pipeline run. Ties the retention key to the package and commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSpec {
    /// Workspace root path.
    pub workspace_path: PathBuf,

    /// Distribution name being released.
    pub package: String,

    /// Git commit SHA being built.
    pub git_sha: String,
}

impl RunSpec {
    /// Create a new run specification.
    pub fn new(workspace_path: PathBuf, package: &str, git_sha: &str) -> Self {
        Self {
            workspace_path,
            package: package.to_string(),
            git_sha: git_sha.to_string(),
        }
    }

    /// Artifact store key: `<package>-<sha>`, with path-unsafe characters
    /// replaced.
    pub fn retention_key(&self) -> String {
        let raw = format!("{}-{}", self.package, self.git_sha);
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>()
            .trim_start_matches('.')
            .to_string()
    }
}
