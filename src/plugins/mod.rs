//! Plugin manager subsystem.
//!
//! # Responsibilities
//! - Check every referenced plugin file before it is opened
//! - Load plugin code through a [`PluginLoader`] and resolve the named export
//! - Verify each plugin supports the document kind its content type needs
//! - Publish the resulting set as an immutable [`PluginRegistry`]
//!
//! # Design Decisions
//! - Fail-closed: one bad reference rejects the whole set and the previous
//!   registry stays in service
//! - Plugins already loaded for the same (path, name) are reused on reload;
//!   libraries are never unloaded while a registry holding them is alive
//! - The next registry is built outside the lock; only the swap is guarded

pub mod error;
pub mod loaded;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod security;

use std::fmt;

use crate::config::PluginRef;

pub use error::PluginError;
pub use loaded::LoadedPlugin;
pub use loader::{DylibLoader, InProcessLoader, LoadedModule, PluginInstance, PluginLoader};
pub use manager::PluginManager;
pub use registry::PluginRegistry;
pub use security::secure_open;

/// Identity of a loaded plugin: the library path as configured plus the
/// exported symbol name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginId {
    pub path: String,
    pub name: String,
}

impl PluginId {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

impl From<&PluginRef> for PluginId {
    fn from(r: &PluginRef) -> Self {
        Self::new(r.path.clone(), r.name.clone())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path, self.name)
    }
}
