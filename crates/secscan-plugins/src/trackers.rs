//! Tracker detection against the Exodus signature catalogue.
//!
//! The catalogue is fetched once per run through a [`FetchCache`] owned by the
//! plugin, compiled into one alternation regex, and matched against the class
//! names found in each artifact's decompiled output.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use secscan_core::{Artifact, FetchCache, Plugin, PluginError, PluginOutcome, RunContext};

use crate::http;

/// Directories that hold one class per file in apktool and jadx output.
const CLASS_ROOTS: &[&str] = &["smali", "sources"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tracker {
    pub name: String,
    #[serde(default)]
    pub code_signature: String,
    #[serde(default)]
    pub network_signature: String,
    #[serde(default)]
    pub website: String,
}

#[derive(Debug, Deserialize)]
struct TrackersResponse {
    trackers: BTreeMap<String, Tracker>,
}

/// The catalogue plus its compiled form.
#[derive(Debug)]
pub struct TrackerSignatures {
    pub trackers: Vec<Tracker>,
    /// All usable code signatures joined with `|`.
    pub signature: String,
    pub compiled: Regex,
    per_tracker: Vec<Regex>,
}

impl TrackerSignatures {
    /// Compile the catalogue. Trackers without a usable code signature are dropped.
    pub fn compile(trackers: Vec<Tracker>) -> Result<Self, PluginError> {
        let mut kept = Vec::new();
        let mut per_tracker = Vec::new();

        for tracker in trackers {
            if tracker.code_signature.is_empty() {
                continue;
            }
            match Regex::new(&tracker.code_signature) {
                Ok(re) => {
                    per_tracker.push(re);
                    kept.push(tracker);
                }
                Err(e) => {
                    warn!(tracker = %tracker.name, error = %e, "skipping unusable code signature");
                }
            }
        }

        let signature = kept
            .iter()
            .map(|t| t.code_signature.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let pattern = if kept.is_empty() {
            // Matches nothing.
            r"[^\s\S]".to_string()
        } else {
            kept.iter()
                .map(|t| format!("(?:{})", t.code_signature))
                .collect::<Vec<_>>()
                .join("|")
        };
        let compiled = Regex::new(&pattern)
            .map_err(|e| PluginError::Fetch(format!("failed to compile tracker signatures: {e}")))?;

        Ok(Self {
            trackers: kept,
            signature,
            compiled,
            per_tracker,
        })
    }

    /// Trackers whose signature matches any of `classes`.
    pub fn detect<'a, I>(&self, classes: I) -> Vec<&Tracker>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut hits = BTreeSet::new();
        for class in classes {
            if !self.compiled.is_match(class) {
                continue;
            }
            for (i, re) in self.per_tracker.iter().enumerate() {
                if re.is_match(class) {
                    hits.insert(i);
                }
            }
        }
        hits.into_iter().map(|i| &self.trackers[i]).collect()
    }
}

/// Fetch the tracker catalogue from an Exodus-compatible endpoint.
pub fn fetch_trackers(url: &str) -> Result<Vec<Tracker>, PluginError> {
    let client = http::client(Duration::from_secs(60))
        .map_err(|e| PluginError::Fetch(format!("failed to build HTTP client: {e}")))?;
    info!(%url, "fetching tracker signatures");
    let response = client
        .get(url)
        .send()
        .map_err(|e| PluginError::Fetch(format!("failed to fetch {url}: {e}")))?;
    let response = http::check_status("tracker catalogue", response)
        .map_err(|e| PluginError::Fetch(e.to_string()))?;
    let body: TrackersResponse = response
        .json()
        .map_err(|e| PluginError::Fetch(format!("failed to parse tracker catalogue: {e}")))?;
    Ok(body.trackers.into_values().collect())
}

/// Dotted class names for the smali/java files under `dir`.
pub fn class_names(dir: &Path) -> Vec<String> {
    let mut classes = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_class = path
            .extension()
            .is_some_and(|ext| ext == "smali" || ext == "java");
        if !is_class {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        let parts: Vec<String> = rel
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        let Some(root) = parts
            .iter()
            .position(|p| CLASS_ROOTS.iter().any(|r| p.starts_with(r)))
        else {
            continue;
        };
        if root + 1 < parts.len() {
            classes.push(parts[root + 1..].join("."));
        }
    }
    classes
}

#[derive(Debug, Serialize)]
struct TrackerReport<'a> {
    classes_scanned: usize,
    trackers: Vec<&'a Tracker>,
}

/// Side-effect-only plugin: writes `<report_dir>/<name>.json` and succeeds.
pub struct TrackerPlugin {
    name: String,
    signatures: Arc<FetchCache<TrackerSignatures>>,
}

impl TrackerPlugin {
    pub fn new(name: impl Into<String>, signatures: Arc<FetchCache<TrackerSignatures>>) -> Self {
        Self {
            name: name.into(),
            signatures,
        }
    }

    /// Plugin whose catalogue is fetched from `url` on first use.
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let cache = FetchCache::new(move || TrackerSignatures::compile(fetch_trackers(&url)?));
        Self::new(name, Arc::new(cache))
    }
}

impl Plugin for TrackerPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, artifact: &Artifact, _ctx: &RunContext) -> Result<PluginOutcome, PluginError> {
        let signatures = self.signatures.get()?;

        let decompiled = artifact.decompiled_dir();
        if !decompiled.is_dir() {
            warn!(%artifact, dir = %decompiled.display(), "no decompiled output to scan");
        }
        let classes = class_names(&decompiled);
        let found = signatures.detect(classes.iter().map(|c| c.as_str()));
        debug!(%artifact, classes = classes.len(), trackers = found.len(), "tracker scan done");

        let report = TrackerReport {
            classes_scanned: classes.len(),
            trackers: found,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| PluginError::Io(std::io::Error::other(e)))?;
        std::fs::write(artifact.report_dir().join(format!("{}.json", self.name)), json)?;

        Ok(PluginOutcome::Success)
    }
}
