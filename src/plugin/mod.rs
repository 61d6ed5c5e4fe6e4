//! Plugin interface contract.
//!
//! A plugin is a shared library built against this crate that exports a
//! [`PluginDeclaration`] under the symbol name referenced in the
//! configuration. The declaration carries either a ready instance or a
//! zero-argument factory; both yield a [`Plugin`] implementation.
//!
//! ```ignore
//! use markup_proxy::plugin::{BoxError, Capabilities, Plugin, PluginContext};
//! use markup_proxy::document::MarkupTree;
//!
//! struct Banner;
//!
//! impl Plugin for Banner {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::MARKUP
//!     }
//!
//!     fn process_markup_tree(
//!         &self,
//!         _ctx: &PluginContext,
//!         _url: &url::Url,
//!         tree: &mut MarkupTree,
//!     ) -> Result<(), BoxError> {
//!         // mutate tree.document() in place
//!         Ok(())
//!     }
//! }
//!
//! markup_proxy::export_plugin!(BannerPlugin, instance = Banner);
//! ```
//!
//! Plugins and the host must be compiled with the same toolchain and the same
//! version of this crate; the declaration records both the ABI revision and
//! the crate version so mismatches are rejected at load time.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use url::Url;

pub use crate::document::{ElementTree, MarkupTree};

/// Revision of the declaration layout. Bumped on any breaking change.
pub const ABI_VERSION: u32 = 1;

/// Version of this crate a plugin was built against.
pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error type plugins report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which document kinds a plugin can transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub markup: bool,
    pub element: bool,
}

impl Capabilities {
    pub const MARKUP: Self = Self {
        markup: true,
        element: false,
    };
    pub const ELEMENT: Self = Self {
        markup: false,
        element: true,
    };
    pub const BOTH: Self = Self {
        markup: true,
        element: true,
    };
}

/// Per-request information handed to every plugin call.
#[derive(Debug, Clone)]
pub struct PluginContext {
    request_id: String,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl PluginContext {
    pub fn new(request_id: impl Into<String>, deadline: Option<Instant>, cancel: CancellationToken) -> Self {
        Self {
            request_id: request_id.into(),
            deadline,
            cancel,
        }
    }

    /// Context with no deadline, for tooling and tests.
    pub fn detached(request_id: impl Into<String>) -> Self {
        Self::new(request_id, None, CancellationToken::new())
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the request deadline, if one is set.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once the client request was abandoned or the deadline passed.
    ///
    /// Plugins doing long work should poll this; the host never preempts them.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
            || self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Transformation logic exported by a plugin.
///
/// One instance is shared by every concurrent request that references it, so
/// implementations must be internally thread-safe.
pub trait Plugin: Send + Sync {
    /// Document kinds this plugin handles. Read once at load time.
    fn capabilities(&self) -> Capabilities;

    /// Mutate a parsed HTML document in place.
    fn process_markup_tree(
        &self,
        _ctx: &PluginContext,
        _url: &Url,
        _tree: &mut MarkupTree,
    ) -> Result<(), BoxError> {
        Err("markup trees are not supported by this plugin".into())
    }

    /// Mutate a parsed XML document in place.
    fn process_element_tree(
        &self,
        _ctx: &PluginContext,
        _url: &Url,
        _tree: &mut ElementTree,
    ) -> Result<(), BoxError> {
        Err("element trees are not supported by this plugin".into())
    }
}

/// The two accepted export shapes.
pub enum PluginExport {
    /// A value living in the library's static data.
    Instance(&'static dyn Plugin),
    /// A constructor called once per load.
    Factory(fn() -> Box<dyn Plugin>),
}

/// Static a plugin library exports under its configured symbol name.
pub struct PluginDeclaration {
    pub abi_version: u32,
    pub core_version: &'static str,
    pub export: PluginExport,
}

/// Export a plugin declaration under `$symbol`.
///
/// ```ignore
/// export_plugin!(HtmlModifierPlugin, instance = HtmlModifier);
/// export_plugin!(FeedRewriterPlugin, factory = FeedRewriter::boxed);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($symbol:ident, instance = $value:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::plugin::PluginDeclaration = $crate::plugin::PluginDeclaration {
            abi_version: $crate::plugin::ABI_VERSION,
            core_version: $crate::plugin::CORE_VERSION,
            export: $crate::plugin::PluginExport::Instance(&$value),
        };
    };
    ($symbol:ident, factory = $factory:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static $symbol: $crate::plugin::PluginDeclaration = $crate::plugin::PluginDeclaration {
            abi_version: $crate::plugin::ABI_VERSION,
            core_version: $crate::plugin::CORE_VERSION,
            export: $crate::plugin::PluginExport::Factory($factory),
        };
    };
}
