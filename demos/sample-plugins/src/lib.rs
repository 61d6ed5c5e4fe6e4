//! Example plugins for markup-proxy.
//!
//! Exports two symbols:
//! - `HtmlModifierPlugin`: adds a `processed-by` meta tag and tags every `<p>`
//! - `XmlTransformerPlugin`: stamps the root element and appends a metadata block
//!
//! ```toml
//! [[mime_types]]
//! mime_type = "text/html"
//! plugins = [{ path = "plugins/libsample_plugins.so", name = "HtmlModifierPlugin" }]
//!
//! [[mime_types]]
//! mime_type = "application/xml"
//! plugins = [{ path = "plugins/libsample_plugins.so", name = "XmlTransformerPlugin" }]
//! ```

use markup_proxy::document::{ElementTree, MarkupTree};
use markup_proxy::export_plugin;
use markup_proxy::plugin::{BoxError, Capabilities, Plugin, PluginContext};
use url::Url;
use xmltree::{Element, XMLNode};

const PARAGRAPH_CLASS: &str = "markup-proxy-processed";

/// Adds a `<meta name="processed-by">` to `<head>` and a class to each paragraph.
pub struct HtmlModifier;

impl Plugin for HtmlModifier {
    fn capabilities(&self) -> Capabilities {
        Capabilities::MARKUP
    }

    fn process_markup_tree(&self, _ctx: &PluginContext, _url: &Url, tree: &mut MarkupTree) -> Result<(), BoxError> {
        use kuchikiki::traits::TendrilSink;

        let document = tree.document();
        let head = document.select_first("head").map_err(|_| "no head element found")?;

        let fragment = kuchikiki::parse_html()
            .one(r#"<meta name="processed-by" content="markup-proxy-html-modifier">"#);
        let meta = fragment
            .select_first("meta")
            .map_err(|_| "could not build meta element")?
            .as_node()
            .clone();
        meta.detach();
        head.as_node().append(meta);

        let paragraphs = document.select("p").map_err(|_| "invalid selector")?;
        for p in paragraphs {
            let mut attrs = p.attributes.borrow_mut();
            let class = match attrs.get("class") {
                Some(existing) if existing.split_whitespace().any(|c| c == PARAGRAPH_CLASS) => continue,
                Some(existing) => format!("{} {}", existing, PARAGRAPH_CLASS),
                None => PARAGRAPH_CLASS.to_string(),
            };
            attrs.insert("class", class);
        }
        Ok(())
    }
}

/// Stamps the root element and appends a `<metadata>` child.
pub struct XmlTransformer;

impl XmlTransformer {
    fn boxed() -> Box<dyn Plugin> {
        Box::new(XmlTransformer)
    }
}

fn text_element(name: &str, text: &str) -> XMLNode {
    let mut element = Element::new(name);
    element.children.push(XMLNode::Text(text.to_string()));
    XMLNode::Element(element)
}

impl Plugin for XmlTransformer {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ELEMENT
    }

    fn process_element_tree(&self, ctx: &PluginContext, url: &Url, tree: &mut ElementTree) -> Result<(), BoxError> {
        if ctx.is_cancelled() {
            return Err("request cancelled".into());
        }

        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let root = tree.root_mut();
        root.attributes.insert("processed-at".to_string(), now.clone());
        root.attributes
            .insert("processed-by".to_string(), "markup-proxy-xml-transformer".to_string());

        let mut metadata = Element::new("metadata");
        metadata.children.push(text_element("processor", "markup-proxy XML transformer"));
        metadata.children.push(text_element("source", url.path()));
        metadata.children.push(text_element("timestamp", &now));
        root.children.push(XMLNode::Element(metadata));
        Ok(())
    }
}

export_plugin!(HtmlModifierPlugin, instance = HtmlModifier);
export_plugin!(XmlTransformerPlugin, factory = XmlTransformer::boxed);
