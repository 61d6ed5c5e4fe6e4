//! Filesystem checks applied before a plugin library is opened.
//!
//! # Checks
//! - The path itself must not be a symlink (blocks swapping the target
//!   between validation and load)
//! - The file must not be world-writable
//! - The fully resolved path must sit inside one of the allowed directories
//!
//! The resolved path is returned and is what gets opened afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::PluginError;

/// Validate `path` and return its canonical form.
pub fn secure_open(path: &Path, allowed_dirs: &[PathBuf]) -> Result<PathBuf, PluginError> {
    let meta = fs::symlink_metadata(path)
        .map_err(|e| PluginError::security(path, format!("cannot stat plugin file: {}", e)))?;

    if meta.file_type().is_symlink() {
        return Err(PluginError::security(path, "plugin file cannot be a symlink"));
    }

    if !meta.is_file() {
        return Err(PluginError::security(path, "plugin path is not a regular file"));
    }

    if is_world_writable(&meta) {
        return Err(PluginError::security(path, "plugin file is world-writable"));
    }

    let resolved = fs::canonicalize(path)
        .map_err(|e| PluginError::security(path, format!("cannot resolve plugin path: {}", e)))?;

    let allowed = resolved_allowed_dirs(allowed_dirs)
        .iter()
        .any(|dir| resolved.starts_with(dir));

    if !allowed {
        return Err(PluginError::security(
            path,
            format!("resolved path {} is not in an allowed directory", resolved.display()),
        ));
    }

    Ok(resolved)
}

/// Canonical forms of the configured directories; missing ones are skipped.
fn resolved_allowed_dirs(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter().filter_map(|dir| fs::canonicalize(dir).ok()).collect()
}

#[cfg(unix)]
fn is_world_writable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o002 != 0
}

#[cfg(not(unix))]
fn is_world_writable(_meta: &fs::Metadata) -> bool {
    false
}
