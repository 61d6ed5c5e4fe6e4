//! Error types for plugin loading.

use std::path::PathBuf;

use thiserror::Error;

use crate::plugins::PluginId;

/// Errors that abort a plugin load (and with it the whole configuration load).
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("security check failed for {path}: {reason}")]
    Security { path: PathBuf, reason: String },

    #[error("plugin {plugin} lacks the {required} capability required by '{mime_type}'")]
    Interface {
        plugin: PluginId,
        mime_type: String,
        required: &'static str,
    },

    #[error("failed to open plugin library {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("symbol '{symbol}' not found in {path}: {reason}")]
    MissingExport {
        path: PathBuf,
        symbol: String,
        reason: String,
    },

    #[error(
        "plugin {plugin} was built for ABI {actual_abi} (core {actual_core}), host expects ABI {expected_abi} (core {expected_core})"
    )]
    AbiMismatch {
        plugin: PluginId,
        expected_abi: u32,
        actual_abi: u32,
        expected_core: &'static str,
        actual_core: String,
    },

    #[error("plugin {plugin} could not be instantiated: {reason}")]
    Instantiate { plugin: PluginId, reason: String },
}

impl PluginError {
    pub(crate) fn security(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Security {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for failures of the path/permission checks.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security { .. })
    }

    /// True when a plugin lacks a capability its content type needs.
    pub fn is_interface(&self) -> bool {
        matches!(self, Self::Interface { .. })
    }
}
