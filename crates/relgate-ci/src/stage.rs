//! Build and check stage definitions.

use relgate_core::{ArtifactKind, PipelineConfig};
use serde::{Deserialize, Serialize};

/// Builtin verification checks, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCheck {
    /// Structural check of the source distribution.
    SdistStructure,

    /// Install the wheel into a throwaway venv and look for its data files.
    InstalledDataFiles,

    /// Install the sdist in a bare container without optional toolchains.
    MinimalEnvInstall,
}

impl BuiltinCheck {
    pub const ALL: [BuiltinCheck; 3] = [
        BuiltinCheck::SdistStructure,
        BuiltinCheck::InstalledDataFiles,
        BuiltinCheck::MinimalEnvInstall,
    ];

    /// Get the check name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinCheck::SdistStructure => "sdist_structure",
            BuiltinCheck::InstalledDataFiles => "installed_data_files",
            BuiltinCheck::MinimalEnvInstall => "minimal_env_install",
        }
    }

    /// Distribution the check operates on.
    pub fn required_artifact(&self) -> ArtifactKind {
        match self {
            BuiltinCheck::InstalledDataFiles => ArtifactKind::Binary,
            BuiltinCheck::SdistStructure | BuiltinCheck::MinimalEnvInstall => ArtifactKind::Source,
        }
    }

    /// Default command template.
    pub fn command(&self) -> Vec<String> {
        let parts: &[&str] = match self {
            BuiltinCheck::SdistStructure => &["python", "ci/check_sdist.py", "{artifact}"],
            // Paths reach the script as positional parameters, never as script text.
            BuiltinCheck::InstalledDataFiles => &[
                "sh",
                "-c",
                "python -m venv \"$1/venv\" \
                 && \"$1/venv/bin/pip\" install \"$2\" \
                 && \"$1/venv/bin/python\" ci/check_installed_data.py",
                "installed_data_files",
                "{env_dir}",
                "{artifact}",
            ],
            BuiltinCheck::MinimalEnvInstall => &[
                "docker",
                "run",
                "--rm",
                "-v",
                "{dist_dir}:/dist:ro",
                "docker.io/library/python:3.12-slim",
                "pip",
                "install",
                "/dist/{artifact_name}",
            ],
        };
        parts.iter().map(|s| s.to_string()).collect()
    }
}

/// Configuration for one command-backed stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageConfig {
    /// Stage name.
    pub name: String,

    /// Command template (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds; 0 disables the timeout.
    pub timeout_secs: u64,
}

impl StageConfig {
    /// Create a custom stage configuration.
    pub fn custom(name: String, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name,
            command,
            timeout_secs,
        }
    }

    /// The build stage described by `config`.
    pub fn build(config: &PipelineConfig) -> Self {
        Self::custom(
            "build".to_string(),
            config.build.command.clone(),
            config.build.timeout_secs,
        )
    }

    /// Stage for `check`, with any overrides from `config` applied.
    pub fn check(check: BuiltinCheck, config: &PipelineConfig) -> Self {
        let name = check.name();
        Self {
            name: name.to_string(),
            command: config
                .check_command(name)
                .map(<[String]>::to_vec)
                .unwrap_or_else(|| check.command()),
            timeout_secs: config.check_timeout(name).as_secs(),
        }
    }
}

/// Placeholder values substituted into command templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandVars {
    vars: Vec<(&'static str, String)>,
}

impl CommandVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `{key}` to `value`, replacing an earlier value.
    pub fn set(mut self, key: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.vars.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Substitute every known placeholder in `template` in a single pass.
    /// Substituted values are not scanned again; unknown placeholders are
    /// left as written.
    pub fn render(&self, template: &[String]) -> Vec<String> {
        template.iter().map(|arg| self.render_arg(arg)).collect()
    }

    fn render_arg(&self, arg: &str) -> String {
        let mut out = String::with_capacity(arg.len());
        let mut rest = arg;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];
            match tail.find('}') {
                Some(close) => {
                    let key = &tail[1..close];
                    match self.get(key) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&tail[..=close]),
                    }
                    rest = &tail[close + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_check_names_follow_config_order() {
        let names: Vec<_> = BuiltinCheck::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names, relgate_core::CHECK_NAMES.to_vec());
    }

    #[test]
    fn test_required_artifacts() {
        assert_eq!(BuiltinCheck::SdistStructure.required_artifact(), ArtifactKind::Source);
        assert_eq!(BuiltinCheck::InstalledDataFiles.required_artifact(), ArtifactKind::Binary);
        assert_eq!(BuiltinCheck::MinimalEnvInstall.required_artifact(), ArtifactKind::Source);
    }

    #[test]
    fn test_builtin_commands_use_placeholders() {
        assert!(BuiltinCheck::SdistStructure
            .command()
            .contains(&"{artifact}".to_string()));
        let data = BuiltinCheck::InstalledDataFiles.command();
        assert!(!data[2].contains('{'));
        assert_eq!(data[4..], ["{env_dir}".to_string(), "{artifact}".to_string()]);
        assert_eq!(BuiltinCheck::MinimalEnvInstall.command()[0], "docker");
    }

    #[test]
    fn test_check_stage_applies_overrides() {
        let config = PipelineConfig::from_toml(
            r#"
            [checks.minimal_env_install]
            command = ["true"]
            timeout_secs = 30
            "#,
            std::path::Path::new("relgate.toml"),
        )
        .unwrap();

        let stage = StageConfig::check(BuiltinCheck::MinimalEnvInstall, &config);
        assert_eq!(stage.command, vec!["true".to_string()]);
        assert_eq!(stage.timeout_secs, 30);

        let stage = StageConfig::check(BuiltinCheck::SdistStructure, &config);
        assert_eq!(stage.command, BuiltinCheck::SdistStructure.command());
        assert_eq!(stage.timeout_secs, config.check_timeout_secs);
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let vars = CommandVars::new()
            .set("dist_dir", "/w/dist")
            .set("artifact_name", "pkg-1.0.0.tar.gz");
        let rendered = vars.render(&BuiltinCheck::MinimalEnvInstall.command());
        assert!(rendered.contains(&"/w/dist:/dist:ro".to_string()));
        assert!(rendered.contains(&"/dist/pkg-1.0.0.tar.gz".to_string()));
    }

    #[test]
    fn test_render_keeps_unknown_placeholders() {
        let vars = CommandVars::new().set("package", "pkg");
        let rendered = vars.render(&["{package}-{unknown}".to_string()]);
        assert_eq!(rendered, vec!["pkg-{unknown}".to_string()]);
    }

    #[test]
    fn test_render_does_not_rescan_values() {
        let vars = CommandVars::new()
            .set("artifact", "/tmp/{env_dir}/pkg-1.0.0.tar.gz")
            .set("env_dir", "/tmp/env");
        let rendered = vars.render(&["{artifact} {env_dir}".to_string()]);
        assert_eq!(
            rendered,
            vec!["/tmp/{env_dir}/pkg-1.0.0.tar.gz /tmp/env".to_string()]
        );
    }

    #[test]
    fn test_render_handles_unbalanced_braces() {
        let vars = CommandVars::new().set("package", "pkg");
        let rendered = vars.render(&["}{package}{".to_string()]);
        assert_eq!(rendered, vec!["}pkg{".to_string()]);
    }

    #[test]
    fn test_set_replaces_value() {
        let vars = CommandVars::new().set("package", "a").set("package", "b");
        assert_eq!(vars.get("package"), Some("b"));
    }
}
