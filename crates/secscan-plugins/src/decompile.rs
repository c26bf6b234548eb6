use tracing::warn;

use secscan_core::config::DecompileSettings;
use secscan_core::plugin::DECOMPILE;
use secscan_core::{Artifact, Plugin, PluginError, PluginOutcome, RunContext};

use crate::command::{execute, write_diagnostic};

/// Runs apktool and jadx so later plugins can read decompiled sources.
///
/// Both decompilers always run; the artifact fails if either one does.
pub struct DecompilePlugin {
    settings: DecompileSettings,
}

impl DecompilePlugin {
    pub fn new(settings: DecompileSettings) -> Self {
        Self { settings }
    }
}

impl Plugin for DecompilePlugin {
    fn name(&self) -> &str {
        DECOMPILE
    }

    fn run(&self, artifact: &Artifact, ctx: &RunContext) -> Result<PluginOutcome, PluginError> {
        let mut failures = Vec::new();

        for (tool, spec) in [
            ("apktool", &self.settings.apktool),
            ("jadx", &self.settings.jadx),
        ] {
            match execute(tool, spec, artifact, ctx) {
                Ok(out) if out.success() => {}
                Ok(out) => {
                    write_diagnostic(artifact, tool, &out.log);
                    failures.push(format!("{tool} {}", out.describe()));
                }
                Err(e) => {
                    warn!(%artifact, tool, error = %e, "decompiler could not be started");
                    write_diagnostic(artifact, tool, &e.to_string());
                    failures.push(format!("{tool}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(PluginOutcome::Success)
        } else {
            Ok(PluginOutcome::failure(failures.join("; ")))
        }
    }
}
