//! Document pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! buffered response body
//!     → DocumentKind::for_mime (markup or element)
//!     → Document::parse
//!     → Document::invoke (each configured plugin, in order, mutating in place)
//!     → Document::render
//!     → processed body bytes
//! ```
//!
//! # Design Decisions
//! - The two document kinds are a closed enum; each variant supplies its own
//!   parse / invoke / render and the orchestrator sees a single entry point
//! - The first failing plugin aborts the chain and is named in the error
//! - Plugin panics are caught and reported like any other plugin failure

pub mod element;
pub mod markup;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::config::PluginRef;
use crate::plugin::{BoxError, PluginContext};
use crate::plugins::{LoadedPlugin, PluginId, PluginRegistry};

pub use element::ElementTree;
pub use markup::MarkupTree;

/// Errors raised while turning a body into a processed body.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("failed to render document: {0}")]
    Render(String),

    #[error("plugin not found: {0}")]
    PluginNotFound(PluginId),

    #[error("plugin {plugin} failed: {source}")]
    Plugin {
        plugin: PluginId,
        #[source]
        source: BoxError,
    },

    #[error("request cancelled before plugin {0} ran")]
    Cancelled(PluginId),
}

/// Which tree a content type is parsed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markup,
    Element,
}

impl DocumentKind {
    /// Classify a content type. Returns `None` for anything outside the
    /// HTML/XML family.
    pub fn for_mime(mime_type: &str) -> Option<Self> {
        match mime_type {
            "text/html" | "application/xhtml+xml" => Some(Self::Markup),
            "text/xml" | "application/xml" | "application/rss+xml" | "application/atom+xml" => {
                Some(Self::Element)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Element => "element",
        }
    }
}

/// A parsed document of either kind.
#[derive(Debug)]
pub enum Document {
    Markup(MarkupTree),
    Element(ElementTree),
}

impl Document {
    pub fn parse(kind: DocumentKind, bytes: &[u8]) -> Result<Self, DocumentError> {
        match kind {
            DocumentKind::Markup => MarkupTree::parse(bytes).map(Self::Markup),
            DocumentKind::Element => ElementTree::parse(bytes).map(Self::Element),
        }
    }

    /// Run `plugins` over the tree, strictly in order.
    pub fn invoke(
        &mut self,
        plugins: &[Arc<LoadedPlugin>],
        ctx: &PluginContext,
        url: &Url,
    ) -> Result<(), DocumentError> {
        for plugin in plugins {
            if ctx.is_cancelled() {
                return Err(DocumentError::Cancelled(plugin.id().clone()));
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match self {
                Self::Markup(tree) => plugin.process_markup_tree(ctx, url, tree),
                Self::Element(tree) => plugin.process_element_tree(ctx, url, tree),
            }));

            let result = match outcome {
                Ok(result) => result,
                Err(payload) => Err(panic_message(payload).into()),
            };

            result.map_err(|source| DocumentError::Plugin {
                plugin: plugin.id().clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn render(&self) -> Result<Vec<u8>, DocumentError> {
        match self {
            Self::Markup(tree) => tree.render(),
            Self::Element(tree) => tree.render(),
        }
    }
}

/// Resolve plugin references against a registry, preserving order.
pub fn resolve_plugins(
    refs: &[PluginRef],
    registry: &PluginRegistry,
) -> Result<Vec<Arc<LoadedPlugin>>, DocumentError> {
    refs.iter()
        .map(|r| {
            registry
                .get(&r.path, &r.name)
                .ok_or_else(|| DocumentError::PluginNotFound(PluginId::from(r)))
        })
        .collect()
}

/// Parse, transform and render `body` in one go.
pub fn process(
    kind: DocumentKind,
    body: &[u8],
    plugins: &[Arc<LoadedPlugin>],
    ctx: &PluginContext,
    url: &Url,
) -> Result<Vec<u8>, DocumentError> {
    let mut document = Document::parse(kind, body)?;
    document.invoke(plugins, ctx, url)?;
    document.render()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}
