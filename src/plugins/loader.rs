//! Turning a verified library path and a symbol name into a plugin instance.

use std::collections::HashMap;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use libloading::Library;
use parking_lot::RwLock;

use crate::plugin::{Plugin, PluginDeclaration, PluginExport, ABI_VERSION, CORE_VERSION};
use crate::plugins::{PluginError, PluginId};

/// A plugin instance, either borrowed from a library's static data or owned.
pub enum PluginInstance {
    Static(&'static dyn Plugin),
    Shared(Arc<dyn Plugin>),
}

impl Deref for PluginInstance {
    type Target = dyn Plugin;

    fn deref(&self) -> &Self::Target {
        match self {
            PluginInstance::Static(plugin) => *plugin,
            PluginInstance::Shared(plugin) => plugin.as_ref(),
        }
    }
}

/// What a loader hands back: the instance plus whatever keeps it valid.
pub struct LoadedModule {
    pub instance: PluginInstance,
    pub library: Option<Library>,
}

/// Strategy for opening plugin code.
pub trait PluginLoader: Send + Sync {
    /// Open `path` (already security-checked) and resolve `symbol`.
    fn load(&self, path: &Path, symbol: &str) -> Result<LoadedModule, PluginError>;
}

/// Loads plugins from native shared libraries.
#[derive(Debug, Default)]
pub struct DylibLoader;

impl PluginLoader for DylibLoader {
    fn load(&self, path: &Path, symbol: &str) -> Result<LoadedModule, PluginError> {
        // SAFETY: loading a library runs its initializers. The path has passed
        // the symlink/permission/directory checks, which is the trust boundary.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // SAFETY: the symbol is expected to be a `PluginDeclaration` static
        // produced by `export_plugin!`; the ABI/core version fields are
        // checked before the export is touched.
        let declaration: &PluginDeclaration = unsafe {
            let sym = library
                .get::<*const PluginDeclaration>(symbol.as_bytes())
                .map_err(|e| PluginError::MissingExport {
                    path: path.to_path_buf(),
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                })?;
            &**sym
        };

        if declaration.abi_version != ABI_VERSION || declaration.core_version != CORE_VERSION {
            return Err(PluginError::AbiMismatch {
                plugin: PluginId::new(path.to_string_lossy(), symbol),
                expected_abi: ABI_VERSION,
                actual_abi: declaration.abi_version,
                expected_core: CORE_VERSION,
                actual_core: declaration.core_version.to_string(),
            });
        }

        let instance = match declaration.export {
            PluginExport::Instance(plugin) => PluginInstance::Static(plugin),
            PluginExport::Factory(factory) => {
                let plugin = instantiate(path, symbol, || Arc::from(factory()))?;
                PluginInstance::Shared(plugin)
            }
        };

        Ok(LoadedModule {
            instance,
            library: Some(library),
        })
    }
}

/// Run a plugin factory, turning a panic into a load error.
fn instantiate<F>(path: &Path, symbol: &str, factory: F) -> Result<Arc<dyn Plugin>, PluginError>
where
    F: FnOnce() -> Arc<dyn Plugin>,
{
    panic::catch_unwind(AssertUnwindSafe(factory)).map_err(|_| PluginError::Instantiate {
        plugin: PluginId::new(path.to_string_lossy(), symbol),
        reason: "factory panicked".to_string(),
    })
}

type Factory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Resolves symbols against plugins registered in the host process.
///
/// Useful for embedding the proxy with compiled-in transformations and for
/// exercising the loading path without native libraries. The file at the
/// configured path still has to pass the security checks.
#[derive(Default)]
pub struct InProcessLoader {
    factories: RwLock<HashMap<String, Factory>>,
    loads: RwLock<HashMap<String, Arc<AtomicUsize>>>,
}

impl InProcessLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `symbol`.
    pub fn register<F>(&self, symbol: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.write().insert(symbol.into(), Arc::new(factory));
    }

    /// Register one shared instance under `symbol`.
    pub fn register_instance(&self, symbol: impl Into<String>, plugin: Arc<dyn Plugin>) {
        self.register(symbol, move || plugin.clone());
    }

    /// How many times `symbol` has been loaded.
    pub fn load_count(&self, symbol: &str) -> usize {
        self.loads
            .read()
            .get(symbol)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl PluginLoader for InProcessLoader {
    fn load(&self, path: &Path, symbol: &str) -> Result<LoadedModule, PluginError> {
        let factory = self
            .factories
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| PluginError::MissingExport {
                path: path.to_path_buf(),
                symbol: symbol.to_string(),
                reason: "no plugin registered under this symbol".to_string(),
            })?;

        self.loads
            .write()
            .entry(symbol.to_string())
            .or_default()
            .fetch_add(1, Ordering::SeqCst);

        Ok(LoadedModule {
            instance: PluginInstance::Shared(instantiate(path, symbol, || factory())?),
            library: None,
        })
    }
}
