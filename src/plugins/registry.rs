//! Immutable lookup table of loaded plugins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::plugins::{LoadedPlugin, PluginId};

/// Plugins keyed by (path, name). Built once per configuration, then shared.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<PluginId, Arc<LoadedPlugin>>,
}

impl PluginRegistry {
    pub(crate) fn from_map(plugins: HashMap<PluginId, Arc<LoadedPlugin>>) -> Self {
        Self { plugins }
    }

    pub fn get(&self, path: &str, name: &str) -> Option<Arc<LoadedPlugin>> {
        self.plugins.get(&PluginId::new(path, name)).cloned()
    }

    pub(crate) fn get_by_id(&self, id: &PluginId) -> Option<&Arc<LoadedPlugin>> {
        self.plugins.get(id)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
