use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{ConfigError, PluginError};
use crate::types::{Artifact, PluginOutcome};

/// Name of the plugin that decompiles packages before anything else runs.
pub const DECOMPILE: &str = "decompile";

/// Cooperative cancellation flag shared by the orchestrator and long-running plugins.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only context handed to every plugin invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Directory containing bundled third-party tools (apktool, jadx, ...).
    pub tools_dir: PathBuf,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            cancel: CancelToken::new(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new("tools")
    }
}

/// Trait that each analysis step must implement.
pub trait Plugin: Send + Sync {
    /// Plugin name (e.g., "decompile", "exodus")
    fn name(&self) -> &str;

    /// Analyze one artifact.
    ///
    /// `Ok(Failure)` means the tool ran and reported a problem; `Err` is
    /// reserved for configuration problems such as a missing binary.
    fn run(&self, artifact: &Artifact, ctx: &RunContext) -> Result<PluginOutcome, PluginError>;
}

/// A registered plugin with its run flags.
pub struct PluginDescriptor {
    pub name: String,
    pub enabled: bool,
    pub mandatory: bool,
    pub plugin: Box<dyn Plugin>,
}

impl PluginDescriptor {
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        Self {
            name: plugin.name().to_string(),
            enabled: true,
            mandatory: false,
            plugin,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("mandatory", &self.mandatory)
            .finish()
    }
}

/// Ordered set of plugins for one run. Names are unique.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    descriptors: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), ConfigError> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(ConfigError::DuplicatePlugin(descriptor.name));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Enabled descriptors in configured order.
    pub fn enabled(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.iter().filter(|d| d.enabled)
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.enabled().map(|d| d.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, _: &Artifact, _: &RunContext) -> Result<PluginOutcome, PluginError> {
            Ok(PluginOutcome::Success)
        }
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDescriptor::new(Box::new(Named("leaks"))))
            .unwrap();
        let err = registry
            .register(PluginDescriptor::new(Box::new(Named("leaks"))))
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePlugin(ref n) if n == "leaks"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_enabled_preserves_order_and_skips_disabled() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDescriptor::new(Box::new(Named(DECOMPILE))).mandatory())
            .unwrap();
        registry
            .register(PluginDescriptor::new(Box::new(Named("qark"))).enabled(false))
            .unwrap();
        registry
            .register(PluginDescriptor::new(Box::new(Named("apkid"))))
            .unwrap();

        assert_eq!(registry.enabled_names(), vec!["decompile", "apkid"]);
        assert!(registry.get(DECOMPILE).unwrap().mandatory);
        assert!(!registry.get("qark").unwrap().enabled);
    }

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
