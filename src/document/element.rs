//! XML documents as owned element trees.

use xmltree::{Element, EmitterConfig};

use crate::document::DocumentError;

/// A parsed XML document rooted at a single element.
#[derive(Debug, Clone)]
pub struct ElementTree {
    root: Element,
}

impl ElementTree {
    /// Parse bytes as a well-formed XML document.
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let root = Element::parse(bytes).map_err(|e| DocumentError::Parse(e.to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Serialize the tree, including the XML declaration.
    pub fn render(&self) -> Result<Vec<u8>, DocumentError> {
        let mut out = Vec::new();
        let config = EmitterConfig::new().write_document_declaration(true);
        self.root
            .write_with_config(&mut out, config)
            .map_err(|e| DocumentError::Render(e.to_string()))?;
        Ok(out)
    }
}
