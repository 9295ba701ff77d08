//! PyPI-compatible index client
//!
//! Lookups use the JSON API (`<index>/pypi/<name>/<version>/json`), which
//! lists every file of a release with its sha256. Uploads shell out to the
//! configured upload command with the token passed through the environment.

use crate::error::RegistryError;
use crate::Result;
use async_trait::async_trait;
use relgate_state::{
    ArtifactFile, ContentDigest, Credentials, PackageRegistry, RegistryLookup, StorageError,
    StorageResult,
};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Package index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index base URL used for JSON API lookups
    pub index_url: String,
    /// Upload endpoint; `None` lets the upload command use its default
    pub upload_url: Option<String>,
    /// Upload command, `{artifact}` is replaced by the file path
    pub upload_command: Vec<String>,
    /// Username sent with the token
    pub username: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            index_url: "https://pypi.org".to_string(),
            upload_url: None,
            upload_command: vec![
                "twine".to_string(),
                "upload".to_string(),
                "--non-interactive".to_string(),
                "--skip-existing".to_string(),
                "{artifact}".to_string(),
            ],
            username: "__token__".to_string(),
        }
    }
}

impl IndexConfig {
    /// Create config for a specific index
    pub fn new(index_url: &str) -> Self {
        IndexConfig {
            index_url: index_url.to_string(),
            upload_url: None,
            ..Self::default()
        }
    }

    /// Override the upload command
    pub fn with_upload_command(mut self, command: Vec<String>) -> Self {
        self.upload_command = command;
        self
    }

    fn release_url(&self, name: &str, version: &str) -> String {
        format!(
            "{}/pypi/{}/{}/json",
            self.index_url.trim_end_matches('/'),
            name,
            version
        )
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseFiles {
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    #[serde(default)]
    digests: FileDigests,
}

#[derive(Debug, Default, Deserialize)]
struct FileDigests {
    sha256: Option<String>,
}

/// Package index client
pub struct IndexClient {
    config: IndexConfig,
    http_client: reqwest::Client,
}

impl IndexClient {
    /// Create a new index client
    pub fn new(config: IndexConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("relgate-registry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(IndexClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Fetch the file list of a release; `None` when the release does not exist.
    async fn release_files(&self, name: &str, version: &str) -> Result<Option<ReleaseFiles>> {
        let url = self.config.release_url(name, version);
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(url = %url, "release not on index");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RegistryError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn run_upload(&self, artifact: &ArtifactFile, credentials: &Credentials) -> Result<()> {
        let Some((exe, args)) = self.config.upload_command.split_first() else {
            return Err(RegistryError::CommandFailed(
                "upload command is empty".to_string(),
            ));
        };
        let path = artifact.path.to_string_lossy();
        let args: Vec<String> = args.iter().map(|a| a.replace("{artifact}", &path)).collect();

        let mut command = Command::new(exe);
        command
            .args(&args)
            .env("TWINE_USERNAME", &self.config.username)
            .env("TWINE_PASSWORD", credentials.token())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(url) = &self.config.upload_url {
            command.env("TWINE_REPOSITORY_URL", url);
        }

        let output = command
            .spawn()
            .map_err(|e| RegistryError::CommandFailed(format!("cannot start {}: {}", exe, e)))?
            .wait_with_output()
            .await?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        Err(RegistryError::CommandFailed(format!("{}{}", stdout, stderr)))
    }
}

/// Map the output of a failed upload command to a storage error.
///
/// Auth rejections become `Unauthorized`, "already exists" becomes
/// `Conflict`, everything else is a transport failure.
pub fn classify_upload_failure(filename: &str, output: &str) -> StorageError {
    let lower = output.to_ascii_lowercase();
    let reason = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("upload failed")
        .to_string();

    if let Some(line) = output.lines().map(str::trim).find(|l| is_auth_rejection(l)) {
        StorageError::Unauthorized {
            reason: line.to_string(),
        }
    } else if lower.contains("already exists") {
        StorageError::Conflict {
            filename: filename.to_string(),
            reason,
        }
    } else {
        StorageError::Transport { reason }
    }
}

/// An `HTTPError: 401`/`403` status line, or the index's own wording for a
/// bad token.
fn is_auth_rejection(line: &str) -> bool {
    let status = line
        .find("HTTPError:")
        .map(|at| line[at + "HTTPError:".len()..].trim_start());
    if status.is_some_and(|s| s.starts_with("401") || s.starts_with("403")) {
        return true;
    }
    line.to_ascii_lowercase()
        .contains("invalid or non-existent authentication")
}

#[async_trait]
impl PackageRegistry for IndexClient {
    async fn lookup(&self, artifact: &ArtifactFile) -> StorageResult<RegistryLookup> {
        let Some(release) = self
            .release_files(&artifact.name, &artifact.version)
            .await?
        else {
            return Ok(RegistryLookup::Absent);
        };

        let Some(file) = release
            .urls
            .into_iter()
            .find(|f| f.filename == artifact.filename)
        else {
            return Ok(RegistryLookup::Absent);
        };

        let existing = file
            .digests
            .sha256
            .and_then(|d| ContentDigest::try_from(d).ok());
        match existing {
            Some(digest) if digest == artifact.digest => Ok(RegistryLookup::Identical),
            existing => {
                warn!(filename = %artifact.filename, "index holds a different file under this name");
                Ok(RegistryLookup::Mismatch { existing })
            }
        }
    }

    async fn upload(
        &self,
        artifact: &ArtifactFile,
        credentials: &Credentials,
    ) -> StorageResult<()> {
        info!(filename = %artifact.filename, index = %self.config.index_url, "uploading to index");
        match self.run_upload(artifact, credentials).await {
            Ok(()) => Ok(()),
            Err(RegistryError::CommandFailed(output)) => {
                Err(classify_upload_failure(&artifact.filename, &output))
            }
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_config_default() {
        let config = IndexConfig::default();
        assert!(!config.index_url.is_empty());
        assert_eq!(config.username, "__token__");
        assert!(config.upload_command.contains(&"{artifact}".to_string()));
        assert!(config.upload_command.contains(&"--skip-existing".to_string()));
    }

    #[test]
    fn test_release_url_trims_slash() {
        let config = IndexConfig::new("https://test.pypi.org/");
        assert_eq!(
            config.release_url("pkg", "2.0.1"),
            "https://test.pypi.org/pypi/pkg/2.0.1/json"
        );
    }

    #[test]
    fn test_classify_auth_failure() {
        let err = classify_upload_failure(
            "pkg-1.0.0.tar.gz",
            "Uploading pkg-1.0.0.tar.gz\nHTTPError: 403 Forbidden from https://upload.pypi.org/legacy/\n",
        );
        assert!(matches!(err, StorageError::Unauthorized { .. }));
    }

    #[test]
    fn test_status_digits_elsewhere_are_not_auth_failures() {
        let err = classify_upload_failure(
            "pkg-4.0.3.tar.gz",
            "Uploading pkg-4.0.3.tar.gz\n100% 401.3/401.3 kB\nHTTPError: 500 Internal Server Error\n",
        );
        assert!(matches!(err, StorageError::Transport { .. }));
    }

    #[test]
    fn test_classify_bad_token_wording() {
        let err = classify_upload_failure(
            "pkg-1.0.0.tar.gz",
            "HTTPError: 400 Bad Request\nInvalid or non-existent authentication information.",
        );
        assert!(matches!(err, StorageError::Unauthorized { .. }));
    }

    #[test]
    fn test_classify_conflict() {
        let err = classify_upload_failure(
            "pkg-1.0.0.tar.gz",
            "HTTPError: 400 Bad Request\nFile already exists.",
        );
        match err {
            StorageError::Conflict { filename, reason } => {
                assert_eq!(filename, "pkg-1.0.0.tar.gz");
                assert_eq!(reason, "File already exists.");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_transport_failure() {
        let err = classify_upload_failure("pkg-1.0.0.tar.gz", "ConnectionError: reset by peer");
        assert!(matches!(err, StorageError::Transport { .. }));
    }

    #[test]
    fn test_release_files_parse() {
        let body = r#"{"info": {}, "urls": [
            {"filename": "pkg-2.0.1-py3-none-any.whl", "digests": {"sha256": "ab"}},
            {"filename": "pkg-2.0.1.tar.gz"}
        ]}"#;
        let parsed: ReleaseFiles = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.urls.len(), 2);
        assert!(parsed.urls[1].digests.sha256.is_none());
    }

    #[tokio::test]
    async fn test_upload_command_failure_is_classified() {
        let config = IndexConfig::new("http://127.0.0.1:9").with_upload_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'HTTPError: 403 Forbidden' >&2; exit 1".to_string(),
        ]);
        let client = IndexClient::new(config).unwrap();
        let artifact =
            ArtifactFile::from_bytes("dist/pkg-1.0.0-py3-none-any.whl", b"wheel").unwrap();

        let err = client
            .upload(&artifact, &Credentials::new("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_upload_passes_token_in_env() {
        let config = IndexConfig::new("http://127.0.0.1:9").with_upload_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            "test \"$TWINE_PASSWORD\" = secret && test \"$TWINE_USERNAME\" = __token__".to_string(),
        ]);
        let client = IndexClient::new(config).unwrap();
        let artifact = ArtifactFile::from_bytes("dist/pkg-1.0.0.tar.gz", b"sdist").unwrap();

        client
            .upload(&artifact, &Credentials::new("secret"))
            .await
            .expect("upload should succeed");
    }
}
