//! `relgate.toml` configuration.
//!
//! Every section has defaults, so a missing file or section means "use the
//! defaults". Check commands left unset fall back to the builtin command for
//! that check name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::trigger::TriggerPolicy;

/// Default config file name looked up in the workspace root.
pub const CONFIG_FILE: &str = "relgate.toml";

/// Names of the verification checks, in execution order.
pub const CHECK_NAMES: [&str; 3] = ["sdist_structure", "installed_data_files", "minimal_env_install"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackageSection {
    /// Distribution name the artifacts must carry.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSection {
    /// Build command; `{dist_dir}` is replaced by the output directory.
    pub command: Vec<String>,
    /// Output directory, relative to the workspace.
    pub dist_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            command: ["python", "-m", "build", "--sdist", "--wheel", "--outdir", "{dist_dir}", "."]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            dist_dir: PathBuf::from("dist"),
            timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CheckSection {
    /// Command template; `None` uses the builtin command.
    pub command: Option<Vec<String>>,
    /// Per-check timeout; `None` uses `check_timeout_secs`.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionSection {
    /// Root directory of the local artifact store.
    pub root: PathBuf,
    pub timeout_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".relgate/artifacts"),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PublishSection {
    /// Index base URL used for existence lookups.
    pub index_url: String,
    /// Upload endpoint; unset lets the upload command pick its default.
    pub upload_url: Option<String>,
    /// Upload command; `{artifact}` is replaced by the file path.
    pub upload_command: Vec<String>,
    /// Environment variable holding the registry token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            index_url: "https://pypi.org".to_string(),
            upload_url: None,
            upload_command: [
                "twine",
                "upload",
                "--non-interactive",
                "--skip-existing",
                "{artifact}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            token_env: "RELGATE_REGISTRY_TOKEN".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Whole-pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub package: PackageSection,
    pub trigger: TriggerPolicy,
    pub build: BuildSection,
    /// Overrides keyed by check name.
    pub checks: BTreeMap<String, CheckSection>,
    /// Timeout applied to checks without their own.
    pub check_timeout_secs: u64,
    pub retention: RetentionSection,
    pub publish: PublishSection,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            package: PackageSection::default(),
            trigger: TriggerPolicy::default(),
            build: BuildSection::default(),
            checks: BTreeMap::new(),
            check_timeout_secs: 900,
            retention: RetentionSection::default(),
            publish: PublishSection::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    pub fn from_toml(source: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`; the file must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&source, path)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "package.name must be set".to_string(),
            ));
        }
        if self.build.command.is_empty() {
            return Err(ConfigError::Invalid("build.command is empty".to_string()));
        }
        if self.publish.upload_command.is_empty() {
            return Err(ConfigError::Invalid(
                "publish.upload_command is empty".to_string(),
            ));
        }
        if self.publish.token_env.is_empty() {
            return Err(ConfigError::Invalid("publish.token_env is empty".to_string()));
        }
        for (name, section) in &self.checks {
            if !CHECK_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown check '{}' (expected one of {})",
                    name,
                    CHECK_NAMES.join(", ")
                )));
            }
            if matches!(&section.command, Some(c) if c.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "checks.{}.command is empty",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Timeout for the named check.
    pub fn check_timeout(&self, name: &str) -> Duration {
        let secs = self
            .checks
            .get(name)
            .and_then(|c| c.timeout_secs)
            .unwrap_or(self.check_timeout_secs);
        Duration::from_secs(secs)
    }

    /// Command override for the named check, if any.
    pub fn check_command(&self, name: &str) -> Option<&[String]> {
        self.checks.get(name).and_then(|c| c.command.as_deref())
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build.timeout_secs)
    }

    pub fn retention_timeout(&self) -> Duration {
        Duration::from_secs(self.retention.timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish.timeout_secs)
    }
}
