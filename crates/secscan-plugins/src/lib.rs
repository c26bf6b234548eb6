//! Concrete secscan plugins and the registry builder that wires them from settings.

pub mod audit;
pub mod command;
pub mod decompile;
mod http;
pub mod mobsf;
pub mod trackers;

use std::time::Duration;

use tracing::debug;

use secscan_core::config::{resolve_secret, PluginKind, PluginSettings, Settings};
use secscan_core::poll::{PollSettings, PollingScanClient};
use secscan_core::{ConfigError, Plugin, PluginDescriptor, PluginRegistry};

pub use audit::{AuditPlugin, HttpAuditBackend};
pub use command::CommandPlugin;
pub use decompile::DecompilePlugin;
pub use mobsf::MobsfPlugin;
pub use trackers::TrackerPlugin;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the plugin set for one run.
///
/// `decompile` is always registered first and marked mandatory; it only runs
/// when `decompile` is true. Disabled `[[plugins]]` entries are left out, so
/// their credentials are never resolved.
pub fn build_registry(settings: &Settings, decompile: bool) -> Result<PluginRegistry, ConfigError> {
    settings.validate()?;

    let mut registry = PluginRegistry::new();
    registry.register(
        PluginDescriptor::new(Box::new(DecompilePlugin::new(settings.decompile.clone())))
            .mandatory()
            .enabled(decompile),
    )?;

    for entry in &settings.plugins {
        if !entry.enabled {
            debug!(plugin = %entry.name, "plugin disabled in settings");
            continue;
        }
        registry.register(PluginDescriptor::new(build_plugin(entry)?))?;
    }

    Ok(registry)
}

fn build_plugin(entry: &PluginSettings) -> Result<Box<dyn Plugin>, ConfigError> {
    let name = entry.name.clone();
    let plugin: Box<dyn Plugin> = match &entry.kind {
        PluginKind::Command {
            program,
            args,
            output,
            side_effect_only,
        } => Box::new(
            CommandPlugin::new(
                name,
                secscan_core::config::CommandSpec {
                    program: program.clone(),
                    args: args.clone(),
                },
            )
            .expect_output(output.clone())
            .side_effect_only(*side_effect_only),
        ),
        PluginKind::Trackers { url } => Box::new(TrackerPlugin::from_url(name, url.clone())),
        PluginKind::Audit {
            url,
            token,
            token_env,
            app_id,
            interval_secs,
            max_wait_secs,
            poll_retries,
        } => {
            let token = resolve_secret(&entry.name, token.as_deref(), token_env.as_deref())?;
            let backend = HttpAuditBackend::new(url, token, *app_id)
                .map_err(|e| ConfigError::Invalid(format!("{}: {e}", entry.name)))?;
            let poll = PollSettings {
                interval: Duration::from_secs(*interval_secs),
                max_wait: (*max_wait_secs > 0).then(|| Duration::from_secs(*max_wait_secs)),
                poll_retries: *poll_retries,
            };
            Box::new(AuditPlugin::new(name, PollingScanClient::new(backend, poll)))
        }
        PluginKind::Mobsf {
            url,
            api_key,
            api_key_env,
        } => {
            let key = resolve_secret(&entry.name, api_key.as_deref(), api_key_env.as_deref())?;
            Box::new(
                MobsfPlugin::new(name, url, key)
                    .map_err(|e| ConfigError::Invalid(format!("{}: {e}", entry.name)))?,
            )
        }
    };
    Ok(plugin)
}
