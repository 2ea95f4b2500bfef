//! Plugin loading.
//!
//! A [`PluginSource`] yields plugins; each plugin registers its commands into
//! a staging [`PluginRegistrar`]. Only plugins that register cleanly reach
//! the registry, so a broken plugin never leaves half its commands behind.
//! Failures are logged and loading continues with the next plugin.

mod builtin;
mod manifest;

pub use builtin::{BuiltinPlugins, CorePlugin, GroupSettingsPlugin};
use herald_core::CommandDescriptor;
pub use manifest::{ManifestDir, ManifestPlugin};

use crate::{
    error::PluginError,
    handler::{DynHandler, HandlerRegistry},
};

/// Staging area for one plugin's commands.
#[derive(Default)]
pub struct PluginRegistrar {
    entries: Vec<(CommandDescriptor, DynHandler)>,
}

impl PluginRegistrar {
    /// Stage a handler.
    pub fn add(&mut self, descriptor: CommandDescriptor, handler: DynHandler) -> &mut Self {
        self.entries.push((descriptor, handler));
        self
    }

    /// Number of staged handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A named bundle of handlers.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Stage this plugin's handlers.
    ///
    /// # Errors
    ///
    /// Any error discards everything staged by this plugin.
    fn register(&self, registrar: &mut PluginRegistrar) -> Result<(), PluginError>;
}

/// Where plugins come from.
pub trait PluginSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Discover plugins. Each item fails independently.
    fn plugins(&self) -> Vec<Result<Box<dyn Plugin>, PluginError>>;
}

/// Build a registry from every plugin of every source, in order.
///
/// Later registrations of an existing pattern replace earlier ones.
pub fn load_plugins(sources: &[Box<dyn PluginSource>]) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let mut loaded = 0usize;
    let mut failed = 0usize;

    for source in sources {
        for plugin in source.plugins() {
            let plugin = match plugin {
                Ok(plugin) => plugin,
                Err(e) => {
                    tracing::warn!("Error loading plugin from {}: {}", source.name(), e);
                    failed += 1;
                    continue;
                },
            };

            let mut registrar = PluginRegistrar::default();
            if let Err(e) = plugin.register(&mut registrar) {
                tracing::warn!("Error registering plugin {}: {}", plugin.name(), e);
                failed += 1;
                continue;
            }

            for (descriptor, handler) in registrar.entries {
                if let Err(e) = registry.register(descriptor, handler) {
                    tracing::warn!("Skipping command in plugin {}: {}", plugin.name(), e);
                }
            }
            tracing::debug!("Loaded plugin {}", plugin.name());
            loaded += 1;
        }
    }

    tracing::info!(
        "Plugins loaded: {} ({} failed), {} handlers registered",
        loaded,
        failed,
        registry.len()
    );
    registry
}
