//! Distribution files and their classification.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::storage_traits::{ContentDigest, StorageResult};

/// Kind of distribution file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Source distribution (`.tar.gz`, `.zip`).
    Source,
    /// Binary distribution (`.whl`).
    Binary,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "source",
            ArtifactKind::Binary => "binary",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A distribution file produced by the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Bare filename, e.g. `pkg-2.0.1-py3-none-any.whl`.
    pub filename: String,
    pub kind: ArtifactKind,
    /// Distribution name as written in the filename.
    pub name: String,
    /// Version as written in the filename.
    pub version: String,
    /// Absolute or workspace-relative location on disk.
    pub path: PathBuf,
    pub digest: ContentDigest,
    pub size_bytes: u64,
}

impl ArtifactFile {
    /// Classify a filename into `(kind, name, version)`.
    ///
    /// Returns `None` for files that are not distributions.
    pub fn classify(filename: &str) -> Option<(ArtifactKind, String, String)> {
        if let Some(stem) = filename.strip_suffix(".whl") {
            // name-version(-build)?-python-abi-platform
            let parts: Vec<&str> = stem.split('-').collect();
            if parts.len() < 5 || parts[0].is_empty() || parts[1].is_empty() {
                return None;
            }
            return Some((
                ArtifactKind::Binary,
                parts[0].to_string(),
                parts[1].to_string(),
            ));
        }

        let stem = filename
            .strip_suffix(".tar.gz")
            .or_else(|| filename.strip_suffix(".zip"))?;
        let (name, version) = stem.rsplit_once('-')?;
        if name.is_empty() || !version.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Some((ArtifactKind::Source, name.to_string(), version.to_string()))
    }

    /// Build an in-memory artifact from raw content.
    pub fn from_bytes(path: impl Into<PathBuf>, data: &[u8]) -> Option<Self> {
        let path = path.into();
        let filename = path.file_name()?.to_string_lossy().to_string();
        let (kind, name, version) = Self::classify(&filename)?;
        Some(Self {
            filename,
            kind,
            name,
            version,
            path,
            digest: ContentDigest::from_bytes(data),
            size_bytes: data.len() as u64,
        })
    }

    /// Read and classify a file on disk. Non-distribution files yield `None`.
    pub async fn from_path(path: &Path) -> StorageResult<Option<Self>> {
        let Some(filename) = path.file_name().map(|f| f.to_string_lossy().to_string()) else {
            return Ok(None);
        };
        if Self::classify(&filename).is_none() {
            return Ok(None);
        }
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(path, &data))
    }

    /// Whether this artifact belongs to `package` (compared normalized).
    pub fn matches_package(&self, package: &str) -> bool {
        normalize_name(&self.name) == normalize_name(package)
    }
}

/// Normalize a distribution name: lowercase, with runs of `-`, `_` and `.`
/// collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Scan a build output directory for distribution files.
///
/// Result order is deterministic: source distributions first, then binary,
/// each sorted by filename. A missing directory yields an empty list.
pub async fn scan_dist_dir(dir: &Path) -> StorageResult<Vec<ArtifactFile>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dist_dir = %dir.display(), "dist directory does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut artifacts = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        match ArtifactFile::from_path(&entry.path()).await? {
            Some(artifact) => artifacts.push(artifact),
            None => debug!(path = %entry.path().display(), "ignoring non-distribution file"),
        }
    }

    artifacts.sort_by(|a, b| (a.kind, &a.filename).cmp(&(b.kind, &b.filename)));
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wheel() {
        let (kind, name, version) =
            ArtifactFile::classify("pkg-2.0.1-py3-none-any.whl").expect("wheel");
        assert_eq!(kind, ArtifactKind::Binary);
        assert_eq!(name, "pkg");
        assert_eq!(version, "2.0.1");
    }

    #[test]
    fn test_classify_sdist() {
        let (kind, name, version) = ArtifactFile::classify("my-pkg-2.0.1.tar.gz").expect("sdist");
        assert_eq!(kind, ArtifactKind::Source);
        assert_eq!(name, "my-pkg");
        assert_eq!(version, "2.0.1");
    }

    #[test]
    fn test_classify_rejects_other_files() {
        assert!(ArtifactFile::classify("README.md").is_none());
        assert!(ArtifactFile::classify("pkg.whl").is_none());
        assert!(ArtifactFile::classify("pkg-latest.tar.gz").is_none());
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("JupyterHub"), "jupyterhub");
        assert_eq!(normalize_name("my_pkg"), "my-pkg");
        assert_eq!(normalize_name("My.._Pkg"), "my-pkg");
    }

    #[test]
    fn test_matches_package_across_separators() {
        let wheel = ArtifactFile::from_bytes("dist/my_pkg-1.0.0-py3-none-any.whl", b"w").unwrap();
        assert!(wheel.matches_package("my-pkg"));
        assert!(!wheel.matches_package("other"));
    }

    #[tokio::test]
    async fn test_scan_dist_dir_orders_source_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pkg-1.0.0-py3-none-any.whl"), b"wheel").unwrap();
        std::fs::write(dir.path().join("pkg-1.0.0.tar.gz"), b"sdist").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let artifacts = scan_dist_dir(dir.path()).await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].kind, ArtifactKind::Source);
        assert_eq!(artifacts[1].kind, ArtifactKind::Binary);
        assert_eq!(artifacts[0].digest, ContentDigest::from_bytes(b"sdist"));
    }

    #[tokio::test]
    async fn test_scan_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = scan_dist_dir(&dir.path().join("dist")).await.unwrap();
        assert!(artifacts.is_empty());
    }
}
