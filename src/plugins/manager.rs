//! Plugin manager: loads, validates and publishes the configured plugins.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::{PluginRef, ProxyConfig};
use crate::document::DocumentKind;
use crate::plugins::{secure_open, LoadedPlugin, PluginError, PluginId, PluginLoader, PluginRegistry};

/// Owns the live plugin registry.
pub struct PluginManager {
    loader: Arc<dyn PluginLoader>,
    registry: RwLock<Arc<PluginRegistry>>,
    load_lock: Mutex<()>,
}

impl PluginManager {
    pub fn new(loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            loader,
            registry: RwLock::new(Arc::new(PluginRegistry::default())),
            load_lock: Mutex::new(()),
        }
    }

    /// Load every plugin referenced by `config` and publish the new registry.
    ///
    /// All-or-nothing: on error the current registry is left untouched.
    /// Blocking (filesystem and dynamic loader work); call from a blocking
    /// context when running inside the async runtime.
    pub fn load_all(&self, config: &ProxyConfig) -> Result<Arc<PluginRegistry>, PluginError> {
        let _guard = self.load_lock.lock();
        let current = self.registry();

        let mut next: HashMap<PluginId, Arc<LoadedPlugin>> = HashMap::new();
        let mut opened = 0usize;

        for (mime_type, plugin_ref) in config.plugin_refs() {
            let id = PluginId::from(plugin_ref);

            let plugin = if let Some(existing) = next.get(&id) {
                existing.clone()
            } else if let Some(existing) = current.get_by_id(&id) {
                tracing::debug!(plugin = %id, "Reusing loaded plugin");
                existing.clone()
            } else {
                opened += 1;
                self.open(plugin_ref, config)?
            };

            validate(&plugin, mime_type)?;
            next.insert(id, plugin);
        }

        let registry = Arc::new(PluginRegistry::from_map(next));
        *self.registry.write() = registry.clone();

        tracing::info!(
            plugins = registry.len(),
            newly_loaded = opened,
            "Plugin registry published"
        );
        Ok(registry)
    }

    fn open(&self, plugin_ref: &PluginRef, config: &ProxyConfig) -> Result<Arc<LoadedPlugin>, PluginError> {
        let resolved = secure_open(Path::new(&plugin_ref.path), &config.plugins.allowed_dirs)?;
        let module = self.loader.load(&resolved, &plugin_ref.name)?;
        let plugin = LoadedPlugin::from_module(PluginId::from(plugin_ref), module);

        tracing::info!(
            plugin = %plugin.id(),
            resolved = %resolved.display(),
            markup = plugin.capabilities().markup,
            element = plugin.capabilities().element,
            "Plugin loaded"
        );
        Ok(Arc::new(plugin))
    }

    /// Look up a loaded plugin in the current registry.
    pub fn get_plugin(&self, path: &str, name: &str) -> Option<Arc<LoadedPlugin>> {
        self.registry.read().get(path, name)
    }

    /// The currently published registry.
    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.registry.read().clone()
    }
}

/// Check that `plugin` can transform documents of `mime_type`.
pub fn validate(plugin: &LoadedPlugin, mime_type: &str) -> Result<(), PluginError> {
    let interface_error = |required| PluginError::Interface {
        plugin: plugin.id().clone(),
        mime_type: mime_type.to_string(),
        required,
    };

    match DocumentKind::for_mime(mime_type) {
        Some(kind) if plugin.supports(kind) => Ok(()),
        Some(kind) => Err(interface_error(kind.as_str())),
        None => Err(interface_error("document")),
    }
}
