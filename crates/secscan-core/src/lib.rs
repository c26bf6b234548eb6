pub mod config;
pub mod error;
pub mod fetch_cache;
pub mod ledger;
pub mod orchestrator;
pub mod plugin;
pub mod poll;
pub mod types;

pub use config::Settings;
pub use error::{ConfigError, LedgerError, PluginError};
pub use fetch_cache::FetchCache;
pub use ledger::{OutcomeLedger, PluginRecord};
pub use orchestrator::{Orchestrator, OrchestratorOptions, RunObserver};
pub use plugin::{CancelToken, Plugin, PluginDescriptor, PluginRegistry, RunContext};
pub use types::*;
