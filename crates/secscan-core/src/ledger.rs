use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::LedgerError;
use crate::types::{Artifact, OutcomeKind, PluginOutcome};

/// Outcomes of one plugin across the run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginRecord {
    pub succeeded: Vec<Artifact>,
    pub failed: Vec<Artifact>,
    #[serde(skip)]
    index: HashMap<Artifact, OutcomeKind>,
}

impl PluginRecord {
    pub fn outcome_of(&self, artifact: &Artifact) -> Option<OutcomeKind> {
        self.index.get(artifact).copied()
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-plugin success/failure record for a whole run.
///
/// Keys are fixed at creation; each (plugin, artifact) pair is recorded at
/// most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeLedger {
    pub plugins: IndexMap<String, PluginRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OutcomeLedger {
    pub fn new<I, S>(plugin_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plugins: plugin_names
                .into_iter()
                .map(|n| (n.into(), PluginRecord::default()))
                .collect(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(
        &mut self,
        plugin: &str,
        artifact: &Artifact,
        outcome: &PluginOutcome,
    ) -> Result<(), LedgerError> {
        let record = self
            .plugins
            .get_mut(plugin)
            .ok_or_else(|| LedgerError::UnknownPlugin(plugin.to_string()))?;

        if record.index.contains_key(artifact) {
            return Err(LedgerError::Duplicate {
                plugin: plugin.to_string(),
                artifact: artifact.to_string(),
            });
        }

        let kind = OutcomeKind::from(outcome);
        match kind {
            OutcomeKind::Succeeded => record.succeeded.push(artifact.clone()),
            OutcomeKind::Failed => record.failed.push(artifact.clone()),
        }
        record.index.insert(artifact.clone(), kind);
        Ok(())
    }

    /// Was `artifact` processed by `plugin`, and with what outcome?
    pub fn outcome_of(&self, plugin: &str, artifact: &Artifact) -> Option<OutcomeKind> {
        self.plugins.get(plugin)?.outcome_of(artifact)
    }

    pub fn get(&self, plugin: &str) -> Option<&PluginRecord> {
        self.plugins.get(plugin)
    }

    pub fn has_failures(&self) -> bool {
        self.plugins.values().any(|r| !r.failed.is_empty())
    }

    pub fn total_succeeded(&self) -> usize {
        self.plugins.values().map(|r| r.succeeded.len()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.plugins.values().map(|r| r.failed.len()).sum()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
