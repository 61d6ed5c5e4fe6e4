//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Enforce the content-type allow-list and plugin reference rules
//! - Check the backend URL and cache connection parameters
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{CacheBackendKind, ProxyConfig, PROCESSABLE_MIME_TYPES};

/// Shared-library extensions accepted for plugin paths.
const PLUGIN_EXTENSIONS: &[&str] = &["so", "dylib", "dll"];

/// A single semantic problem, tagged with the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: String },

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    fn missing(field: impl Into<String>) -> Self {
        Self::Missing { field: field.into() }
    }

    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Dotted path of the offending field.
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_backend(config, &mut errors);

    if config.cache.backend == CacheBackendKind::Redis && config.cache.redis.address.is_empty() {
        errors.push(ValidationError::missing("cache.redis.address"));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::invalid(
            "listener.max_connections",
            "must be greater than zero",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::invalid(
            "timeouts.request_secs",
            "must be greater than zero",
        ));
    }

    let mut seen = HashSet::new();
    for (i, rule) in config.mime_types.iter().enumerate() {
        let field = format!("mime_types[{}]", i);

        if !PROCESSABLE_MIME_TYPES.contains(&rule.mime_type.as_str()) {
            errors.push(ValidationError::invalid(
                format!("{}.mime_type", field),
                format!(
                    "invalid MIME type '{}', must be one of: {}",
                    rule.mime_type,
                    PROCESSABLE_MIME_TYPES.join(", ")
                ),
            ));
        }

        if !seen.insert(rule.mime_type.as_str()) {
            errors.push(ValidationError::invalid(
                format!("{}.mime_type", field),
                format!("duplicate rule for '{}'", rule.mime_type),
            ));
        }

        if rule.plugins.is_empty() {
            errors.push(ValidationError::invalid(
                format!("{}.plugins", field),
                "at least one plugin must be specified",
            ));
        }

        for (j, plugin) in rule.plugins.iter().enumerate() {
            let field = format!("{}.plugins[{}]", field, j);

            if plugin.path.is_empty() {
                errors.push(ValidationError::missing(format!("{}.path", field)));
            } else if !has_plugin_extension(&plugin.path) {
                errors.push(ValidationError::invalid(
                    format!("{}.path", field),
                    format!(
                        "plugin path '{}' must end with one of: {}",
                        plugin.path,
                        PLUGIN_EXTENSIONS.join(", ")
                    ),
                ));
            }

            if plugin.name.is_empty() {
                errors.push(ValidationError::missing(format!("{}.name", field)));
            } else if !plugin.name.ends_with("Plugin") {
                errors.push(ValidationError::invalid(
                    format!("{}.name", field),
                    format!("plugin name '{}' should end with 'Plugin'", plugin.name),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_backend(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if config.backend_url.is_empty() {
        errors.push(ValidationError::missing("backend_url"));
        return;
    }

    match Url::parse(&config.backend_url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::invalid(
            "backend_url",
            format!("unsupported scheme '{}', expected http", url.scheme()),
        )),
        Ok(url) if url.host_str().is_none() => {
            errors.push(ValidationError::invalid("backend_url", "missing host"))
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::invalid(
            "backend_url",
            format!("not a valid URL: {}", e),
        )),
    }
}

fn has_plugin_extension(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| PLUGIN_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
