use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::plugin::DECOMPILE;
use crate::types::{Artifact, MandatoryFailurePolicy};

pub const SETTINGS_FILE: &str = ".secscan.toml";

/// Public Exodus tracker catalogue.
pub const EXODUS_TRACKERS_URL: &str = "https://reports.exodus-privacy.eu.org/api/trackers";

/// Top-level configuration from `.secscan.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub decompile: DecompileSettings,
    #[serde(default)]
    pub plugins: Vec<PluginSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub on_mandatory_failure: MandatoryFailurePolicy,
    /// Exit non-zero when any plugin recorded a failure.
    #[serde(default)]
    pub strict: bool,
}

fn default_tools_dir() -> PathBuf {
    PathBuf::from("tools")
}

fn default_parallelism() -> usize {
    1
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            tools_dir: default_tools_dir(),
            parallelism: default_parallelism(),
            on_mandatory_failure: MandatoryFailurePolicy::default(),
            strict: false,
        }
    }
}

/// An external program invocation with placeholder arguments.
///
/// Recognised placeholders: `{artifact}`, `{report_dir}`, `{decompiled}`,
/// `{tools}` and `{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// The two decompilers run by the mandatory `decompile` plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompileSettings {
    #[serde(default = "default_apktool")]
    pub apktool: CommandSpec,
    #[serde(default = "default_jadx")]
    pub jadx: CommandSpec,
}

fn default_apktool() -> CommandSpec {
    CommandSpec::new(
        "java",
        &[
            "-jar",
            "{tools}/apktool.jar",
            "d",
            "-f",
            "-o",
            "{decompiled}/apktool",
            "{artifact}",
        ],
    )
}

fn default_jadx() -> CommandSpec {
    CommandSpec::new(
        "{tools}/jadx/bin/jadx",
        &["-d", "{decompiled}/jadx", "{artifact}"],
    )
}

impl Default for DecompileSettings {
    fn default() -> Self {
        Self {
            apktool: default_apktool(),
            jadx: default_jadx(),
        }
    }
}

/// One `[[plugins]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: PluginKind,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PluginKind {
    /// Run an external tool; success is exit status zero.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        /// Path relative to the report dir that must exist afterwards.
        #[serde(default)]
        output: Option<String>,
        /// Report success whatever the tool returns.
        #[serde(default)]
        side_effect_only: bool,
    },
    /// Match the tracker signature catalogue against decompiled sources.
    Trackers {
        #[serde(default = "default_trackers_url")]
        url: String,
    },
    /// Upload to an asynchronous audit server and poll until it finishes.
    Audit {
        url: String,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        token_env: Option<String>,
        #[serde(default = "default_app_id")]
        app_id: u64,
        #[serde(default = "default_interval_secs")]
        interval_secs: u64,
        /// Zero waits forever.
        #[serde(default)]
        max_wait_secs: u64,
        #[serde(default)]
        poll_retries: u32,
    },
    /// Upload to a MobSF instance and store its JSON report.
    Mobsf {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

fn default_trackers_url() -> String {
    EXODUS_TRACKERS_URL.to_string()
}

fn default_app_id() -> u64 {
    1
}

fn default_interval_secs() -> u64 {
    5
}

impl Settings {
    /// Load configuration from a `.secscan.toml` file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            toml::from_str(&content).map_err(|source| ConfigError::SettingsParse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `.secscan.toml` in `dir` or any ancestor, or return defaults.
    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut current = start.as_path();
        loop {
            let candidate = current.join(SETTINGS_FILE);
            if candidate.exists() {
                return Self::load(&candidate);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.parallelism == 0 {
            return Err(ConfigError::Invalid(
                "run.parallelism must be at least 1".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        seen.insert(DECOMPILE);
        for plugin in &self.plugins {
            if plugin.name.trim().is_empty() {
                return Err(ConfigError::Invalid("plugin name must not be empty".to_string()));
            }
            if !seen.insert(plugin.name.as_str()) {
                return Err(ConfigError::DuplicatePlugin(plugin.name.clone()));
            }
            if let PluginKind::Audit { interval_secs: 0, .. } = plugin.kind {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}': interval_secs must be at least 1",
                    plugin.name
                )));
            }
        }
        Ok(())
    }

    /// Generate default TOML content for `secscan init`.
    pub fn default_toml() -> String {
        r#"# secscan configuration

[run]
tools_dir = "tools"
# Artifacts processed at once; plugins of one artifact always run in order.
parallelism = 1
# "continue" or "skip-remaining" once decompilation fails for an artifact
on_mandatory_failure = "continue"
# Exit with status 1 when any plugin fails
strict = false

[decompile]
apktool = { program = "java", args = ["-jar", "{tools}/apktool.jar", "d", "-f", "-o", "{decompiled}/apktool", "{artifact}"] }
jadx = { program = "{tools}/jadx/bin/jadx", args = ["-d", "{decompiled}/jadx", "{artifact}"] }

[[plugins]]
name = "apkid"
kind = "command"
program = "apkid"
args = ["-j", "-o", "{report_dir}/apkid.json", "{artifact}"]
output = "apkid.json"

[[plugins]]
name = "leaks"
kind = "command"
program = "apkleaks"
args = ["-f", "{artifact}", "-o", "{report_dir}/leaks.txt"]
side_effect_only = true

[[plugins]]
name = "exodus"
kind = "trackers"
url = "https://reports.exodus-privacy.eu.org/api/trackers"

# [[plugins]]
# name = "audit"
# kind = "audit"
# url = "http://localhost:8888"
# token_env = "SECSCAN_AUDIT_TOKEN"
# app_id = 1
# interval_secs = 5
# max_wait_secs = 0
# poll_retries = 0

# [[plugins]]
# name = "mobsf"
# kind = "mobsf"
# url = "http://localhost:8000"
# api_key_env = "SECSCAN_MOBSF_KEY"
"#
        .to_string()
    }
}

/// Resolve a credential from an inline value or an environment variable.
///
/// Called while building plugins, so a missing secret stops the run before
/// any artifact is touched.
pub fn resolve_secret(
    plugin: &str,
    value: Option<&str>,
    env: Option<&str>,
) -> Result<String, ConfigError> {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        return Ok(v.to_string());
    }
    if let Some(var) = env {
        if let Ok(v) = std::env::var(var) {
            if !v.is_empty() {
                return Ok(v);
            }
        }
        return Err(ConfigError::MissingCredential {
            plugin: plugin.to_string(),
            hint: format!("environment variable {var} is not set"),
        });
    }
    Err(ConfigError::MissingCredential {
        plugin: plugin.to_string(),
        hint: "set it inline or name an environment variable".to_string(),
    })
}

/// Parse an artifact list: one path per line, surrounding whitespace trimmed,
/// blank lines skipped. A repeated path is kept at its first position only.
pub fn parse_artifacts(content: &str) -> Vec<Artifact> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let first = seen.insert(*line);
            if !first {
                debug!(path = line, "ignoring repeated artifact");
            }
            first
        })
        .map(Artifact::new)
        .collect()
}

pub fn load_artifacts(path: &Path) -> Result<Vec<Artifact>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ArtifactList {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_artifacts(&content))
}
