use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the per-artifact directory that holds plugin diagnostics.
pub const REPORT_DIR_NAME: &str = "SecScan";

/// One input to be scanned: a package file or a source tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact(PathBuf);

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Directory that collects per-plugin output for this artifact.
    ///
    /// Source trees keep it inside the tree; package files (and paths that
    /// do not exist) get it as a sibling.
    pub fn report_dir(&self) -> PathBuf {
        if self.0.is_dir() {
            self.0.join(REPORT_DIR_NAME)
        } else {
            self.parent().join(REPORT_DIR_NAME)
        }
    }

    /// Create the report directory if absent. Existing contents are kept.
    pub fn ensure_report_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self.report_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Where the decompile plugin writes and later plugins read.
    pub fn decompiled_dir(&self) -> PathBuf {
        let stem = self
            .0
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".to_string());
        self.parent().join(stem)
    }

    fn parent(&self) -> PathBuf {
        match self.0.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&str> for Artifact {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Result of one plugin invocation on one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum PluginOutcome {
    Success,
    Failure(String),
}

impl PluginOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        PluginOutcome::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PluginOutcome::Success)
    }
}

impl fmt::Display for PluginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginOutcome::Success => write!(f, "success"),
            PluginOutcome::Failure(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Which list an artifact landed in for a given plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
}

impl From<&PluginOutcome> for OutcomeKind {
    fn from(outcome: &PluginOutcome) -> Self {
        match outcome {
            PluginOutcome::Success => OutcomeKind::Succeeded,
            PluginOutcome::Failure(_) => OutcomeKind::Failed,
        }
    }
}

/// What to do with the rest of an artifact's plugins once a mandatory one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MandatoryFailurePolicy {
    #[default]
    Continue,
    SkipRemaining,
}
