//! HTML documents as mutable node trees.

use kuchikiki::traits::TendrilSink;
use kuchikiki::NodeRef;

use crate::document::DocumentError;

/// A parsed HTML document.
///
/// Nodes use shared interior mutability, so plugins edit the tree through
/// [`MarkupTree::document`] and the changes are visible at render time.
pub struct MarkupTree {
    document: NodeRef,
}

impl MarkupTree {
    /// Parse bytes as an HTML5 document. Invalid UTF-8 is replaced lossily.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let mut input = bytes;
        let document = kuchikiki::parse_html()
            .from_utf8()
            .read_from(&mut input)
            .map_err(|e| DocumentError::Parse(e.to_string()))?;
        Ok(Self { document })
    }

    /// Root document node.
    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    /// Serialize the (possibly modified) tree back to HTML.
    pub fn render(&self) -> Result<Vec<u8>, DocumentError> {
        let mut out = Vec::new();
        self.document
            .serialize(&mut out)
            .map_err(|e| DocumentError::Render(e.to_string()))?;
        Ok(out)
    }
}

impl std::fmt::Debug for MarkupTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupTree").finish_non_exhaustive()
    }
}
