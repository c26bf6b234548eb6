//! Error types for secscan.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal problem raised by a plugin for one artifact.
///
/// The orchestrator records it as a failure for that (plugin, artifact) pair
/// and moves on; it never aborts the run.
#[derive(Error, Debug)]
pub enum PluginError {
    /// External tool could not be started
    #[error("tool not found: {0}")]
    MissingTool(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote scan backend or API rejected a request
    #[error("backend error: {0}")]
    Backend(String),

    /// Shared resource could not be fetched
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Plugin is misconfigured
    #[error("configuration error: {0}")]
    Config(String),
}

/// Problems detected before any artifact is processed.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read artifact list '{path}': {source}")]
    ArtifactList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read settings '{path}': {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings '{path}': {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("plugin '{0}' is registered more than once")]
    DuplicatePlugin(String),

    #[error("plugin '{plugin}' requires a credential: {hint}")]
    MissingCredential { plugin: String, hint: String },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Violations of the outcome ledger invariants.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LedgerError {
    #[error("plugin '{0}' is not part of this run")]
    UnknownPlugin(String),

    #[error("artifact '{artifact}' already has an outcome for plugin '{plugin}'")]
    Duplicate { plugin: String, artifact: String },
}
