use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::ledger::OutcomeLedger;
use crate::plugin::{PluginDescriptor, PluginRegistry, RunContext};
use crate::types::{Artifact, MandatoryFailurePolicy, PluginOutcome};

/// Receives live progress while a run is in flight.
///
/// With `parallelism > 1` callbacks for different artifacts interleave.
pub trait RunObserver: Send + Sync {
    fn artifact_started(&self, _artifact: &Artifact) {}

    fn plugin_finished(&self, _plugin: &str, _artifact: &Artifact, _outcome: &PluginOutcome) {}

    fn plugin_skipped(&self, _plugin: &str, _artifact: &Artifact) {}
}

pub struct NoopObserver;

impl RunObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Artifacts processed at once. Plugins of one artifact always run in order.
    pub parallelism: usize,
    pub on_mandatory_failure: MandatoryFailurePolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            on_mandatory_failure: MandatoryFailurePolicy::Continue,
        }
    }
}

/// Outcomes produced for one artifact, in plugin order.
type ArtifactResults = Vec<(String, PluginOutcome)>;

/// Runs every enabled plugin over every artifact and collects the outcomes.
pub struct Orchestrator {
    registry: PluginRegistry,
    ctx: RunContext,
    options: OrchestratorOptions,
    observer: Arc<dyn RunObserver>,
}

impl Orchestrator {
    pub fn new(registry: PluginRegistry, ctx: RunContext) -> Self {
        Self {
            registry,
            ctx,
            options: OrchestratorOptions::default(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Process `artifacts` in order and return the completed ledger.
    ///
    /// Failures of any kind stay local to their (plugin, artifact) pair.
    pub fn run(&self, artifacts: &[Artifact]) -> OutcomeLedger {
        let mut ledger = OutcomeLedger::new(self.registry.enabled_names());
        info!(
            artifacts = artifacts.len(),
            plugins = ledger.plugins.len(),
            parallelism = self.options.parallelism,
            "starting run"
        );

        if self.options.parallelism <= 1 || artifacts.len() <= 1 {
            for artifact in artifacts {
                let results = self.process_artifact(artifact);
                merge(&mut ledger, artifact, results);
            }
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.parallelism)
                .build()
            {
                Ok(pool) => {
                    let per_artifact: Vec<ArtifactResults> = pool.install(|| {
                        artifacts
                            .par_iter()
                            .map(|artifact| self.process_artifact(artifact))
                            .collect()
                    });
                    for (artifact, results) in artifacts.iter().zip(per_artifact) {
                        merge(&mut ledger, artifact, results);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to build worker pool, running sequentially");
                    for artifact in artifacts {
                        let results = self.process_artifact(artifact);
                        merge(&mut ledger, artifact, results);
                    }
                }
            }
        }

        ledger.finish();
        info!(
            succeeded = ledger.total_succeeded(),
            failed = ledger.total_failed(),
            "run finished"
        );
        ledger
    }

    fn process_artifact(&self, artifact: &Artifact) -> ArtifactResults {
        if self.ctx.cancel.is_cancelled() {
            debug!(%artifact, "run cancelled, artifact not started");
            return Vec::new();
        }

        self.observer.artifact_started(artifact);

        // Plugins still run and fail on their own if this does not work.
        if let Err(e) = artifact.ensure_report_dir() {
            warn!(%artifact, error = %e, "failed to create report directory");
        }

        let mut results = Vec::new();
        let mut skipping = false;

        for descriptor in self.registry.enabled() {
            if skipping {
                self.observer.plugin_skipped(&descriptor.name, artifact);
                continue;
            }

            let outcome = invoke(descriptor, artifact, &self.ctx);
            self.observer
                .plugin_finished(&descriptor.name, artifact, &outcome);

            if descriptor.mandatory
                && !outcome.is_success()
                && self.options.on_mandatory_failure == MandatoryFailurePolicy::SkipRemaining
            {
                debug!(plugin = %descriptor.name, %artifact, "mandatory plugin failed, skipping the rest");
                skipping = true;
            }

            results.push((descriptor.name.clone(), outcome));
        }

        results
    }
}

fn invoke(descriptor: &PluginDescriptor, artifact: &Artifact, ctx: &RunContext) -> PluginOutcome {
    debug!(plugin = %descriptor.name, %artifact, "invoking plugin");
    let result = panic::catch_unwind(AssertUnwindSafe(|| descriptor.plugin.run(artifact, ctx)));
    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(plugin = %descriptor.name, %artifact, error = %e, "plugin raised a fatal error");
            PluginOutcome::failure(e.to_string())
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(plugin = %descriptor.name, %artifact, %message, "plugin panicked");
            PluginOutcome::failure(format!("plugin panicked: {message}"))
        }
    }
}

fn merge(ledger: &mut OutcomeLedger, artifact: &Artifact, results: ArtifactResults) {
    for (plugin, outcome) in results {
        if let Err(e) = ledger.record(&plugin, artifact, &outcome) {
            warn!(error = %e, "dropping outcome");
        }
    }
}
