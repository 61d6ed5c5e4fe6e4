//! A plugin instance paired with the library that backs it.

use std::fmt;

use libloading::Library;
use url::Url;

use crate::document::{DocumentKind, ElementTree, MarkupTree};
use crate::plugin::{BoxError, Capabilities, Plugin, PluginContext};
use crate::plugins::loader::{LoadedModule, PluginInstance};
use crate::plugins::PluginId;

/// A loaded, validated plugin.
///
/// Field order matters: `instance` may point into the library's static data,
/// so `_library` is declared last and dropped last.
pub struct LoadedPlugin {
    id: PluginId,
    capabilities: Capabilities,
    instance: PluginInstance,
    _library: Option<Library>,
}

impl LoadedPlugin {
    pub(crate) fn from_module(id: PluginId, module: LoadedModule) -> Self {
        let capabilities = module.instance.capabilities();
        Self {
            id,
            capabilities,
            instance: module.instance,
            _library: module.library,
        }
    }

    /// Wrap a plugin compiled into the host.
    pub fn in_process(id: PluginId, plugin: Box<dyn Plugin>) -> Self {
        Self::from_module(
            id,
            LoadedModule {
                instance: PluginInstance::Shared(plugin.into()),
                library: None,
            },
        )
    }

    pub fn id(&self) -> &PluginId {
        &self.id
    }

    /// Capabilities as reported when the plugin was loaded.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn supports(&self, kind: DocumentKind) -> bool {
        match kind {
            DocumentKind::Markup => self.capabilities.markup,
            DocumentKind::Element => self.capabilities.element,
        }
    }

    pub fn process_markup_tree(
        &self,
        ctx: &PluginContext,
        url: &Url,
        tree: &mut MarkupTree,
    ) -> Result<(), BoxError> {
        self.instance.process_markup_tree(ctx, url, tree)
    }

    pub fn process_element_tree(
        &self,
        ctx: &PluginContext,
        url: &Url,
        tree: &mut ElementTree,
    ) -> Result<(), BoxError> {
        self.instance.process_element_tree(ctx, url, tree)
    }
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("native", &self._library.is_some())
            .finish()
    }
}
