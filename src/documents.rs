//! XML document trees
//!
//! [`Document`] is the in-memory XML tree produced by the encoder and
//! consumed by the validator. Names are stored as expanded [`QName`]s;
//! prefixes are attached only when the tree is written, from the document's
//! [`PrefixTable`].

use std::collections::HashSet;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::{PrefixTable, QName};
use crate::names::split_qname;
use crate::{XML_NAMESPACE, XSI_NAMESPACE};

/// XML element in the document tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Element qualified name
    pub name: QName,
    /// Attributes in document order
    pub attributes: Vec<(QName, String)>,
    /// Character data (for mixed content, all text children joined)
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
    /// Namespace declarations made on this element in a parsed document
    pub namespaces: Vec<(String, String)>,
}

impl Element {
    /// Create a new element
    pub fn new(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    /// Set text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.attributes.push((name, value.into()));
        self
    }

    /// Add a child element
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.name.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace()
    }

    /// Get an attribute value by qualified name
    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Find child elements by local name
    pub fn find_children(&self, local_name: &str) -> Vec<&Element> {
        self.children
            .iter()
            .filter(|e| e.local_name() == local_name)
            .collect()
    }

    /// Number of elements in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Element::count).sum::<usize>()
    }
}

/// Serialisation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Emit `<?xml version="1.0" encoding="UTF-8"?>`
    pub xml_declaration: bool,
    /// Indentation width, None for compact output
    pub indent: Option<usize>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            xml_declaration: true,
            indent: None,
        }
    }
}

impl WriteOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the XML declaration
    pub fn with_xml_declaration(mut self, enabled: bool) -> Self {
        self.xml_declaration = enabled;
        self
    }

    /// Indent nested elements
    pub fn with_indent(mut self, width: usize) -> Self {
        self.indent = Some(width);
        self
    }
}

/// XML document: a root element and the prefixes to write it with
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element
    pub root: Element,
    /// Prefix bindings used when writing and when reporting paths
    pub prefixes: PrefixTable,
    /// Namespaces declared on the root even when no name uses them
    pub root_namespaces: Vec<String>,
    /// Prefixes used inside QName-valued text and attribute values
    pub value_prefixes: Vec<String>,
}

impl Document {
    /// Create a document from a root element and a prefix table
    pub fn new(root: Element, prefixes: PrefixTable) -> Self {
        Self {
            root,
            prefixes,
            root_namespaces: Vec::new(),
            value_prefixes: Vec::new(),
        }
    }

    /// Parse an XML document from a string with default limits
    pub fn from_str(xml: &str) -> Result<Self> {
        Self::parse_with_limits(xml, &Limits::default())
    }

    /// Parse an XML document from a string.
    ///
    /// DTDs are rejected. The prefix table holds every namespace declaration
    /// of the document; when a prefix is declared twice the first binding wins.
    pub fn parse_with_limits(xml: &str, limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;
        let doc = roxmltree::Document::parse(xml)?;
        let mut prefixes = PrefixTable::new();
        let root = convert_node(doc.root_element(), None, &mut prefixes, limits, 1)?;
        Ok(Self::new(root, prefixes))
    }

    /// Get the root element
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Serialise the document.
    ///
    /// The root declares exactly the namespaces the tree uses, in prefix
    /// table order. Prefixes inside `xsi:type` values and the document's
    /// `value_prefixes` count as used. An element or attribute whose
    /// namespace has no binding cannot be written and is an error.
    pub fn to_xml_string(&self, options: &WriteOptions) -> Result<String> {
        let mut writer = match options.indent {
            Some(width) => Writer::new_with_indent(Vec::new(), b' ', width),
            None => Writer::new(Vec::new()),
        };
        if options.xml_declaration {
            writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        }

        let mut used = HashSet::new();
        let mut value_prefixes: HashSet<String> = self.value_prefixes.iter().cloned().collect();
        collect_namespaces(&self.root, &mut used, &mut value_prefixes);
        used.extend(self.root_namespaces.iter().cloned());
        for prefix in &value_prefixes {
            if !prefix.is_empty() && self.prefixes.namespace_for(prefix).is_none() {
                return Err(Error::Xml(format!(
                    "cannot write QName value: prefix '{}' has no binding",
                    prefix
                )));
            }
        }
        let declarations: Vec<(String, String)> = self
            .prefixes
            .iter()
            .filter(|(prefix, uri)| {
                value_prefixes.contains(*prefix)
                    || (used.contains(*uri)
                        && (self.prefixes.prefix_for(uri) == Some(*prefix)
                            || self.prefixes.attribute_prefix_for(uri) == Some(*prefix)))
            })
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect();

        let default_ns = declarations
            .iter()
            .find(|(prefix, _)| prefix.is_empty())
            .map(|(_, uri)| uri.clone());
        self.write_element(&mut writer, &self.root, default_ns.as_deref(), Some(&declarations))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| Error::Xml(format!("serialised document is not UTF-8: {}", e)))
    }

    fn write_element(
        &self,
        writer: &mut Writer<Vec<u8>>,
        element: &Element,
        default_ns: Option<&str>,
        declarations: Option<&[(String, String)]>,
    ) -> Result<()> {
        let tag = self
            .prefixes
            .render(&element.name)
            .ok_or_else(|| unbound(&element.name))?;
        let mut start = BytesStart::new(tag.as_str());

        if let Some(declarations) = declarations {
            for (prefix, uri) in declarations {
                if prefix.is_empty() {
                    start.push_attribute(("xmlns", uri.as_str()));
                } else {
                    start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
                }
            }
        }

        // an element rendered without prefix must sit in the matching default scope
        let mut scope = default_ns;
        let unprefixed = !tag.contains(':');
        if unprefixed && element.namespace() != default_ns {
            start.push_attribute(("xmlns", element.namespace().unwrap_or("")));
            scope = element.namespace();
        }

        for (name, value) in &element.attributes {
            let key = self.prefixes.render_attribute(name).ok_or_else(|| unbound(name))?;
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = element.text.as_deref().filter(|t| !t.is_empty());
        if text.is_none() && element.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if let Some(text) = text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &element.children {
            self.write_element(writer, child, scope, None)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }
}

fn unbound(name: &QName) -> Error {
    Error::Xml(format!(
        "cannot write '{}': namespace '{}' has no prefix binding",
        name.local_name,
        name.namespace().unwrap_or("")
    ))
}

fn collect_namespaces(
    element: &Element,
    used: &mut HashSet<String>,
    value_prefixes: &mut HashSet<String>,
) {
    if let Some(ns) = element.namespace() {
        used.insert(ns.to_string());
    }
    for (name, value) in &element.attributes {
        if let Some(ns) = name.namespace() {
            if ns != XML_NAMESPACE {
                used.insert(ns.to_string());
            }
            if ns == XSI_NAMESPACE && name.local_name == "type" {
                let (prefix, _) = split_qname(value.trim());
                value_prefixes.insert(prefix.unwrap_or("").to_string());
            }
        }
    }
    for child in &element.children {
        collect_namespaces(child, used, value_prefixes);
    }
}

fn convert_node(
    node: roxmltree::Node<'_, '_>,
    parent: Option<roxmltree::Node<'_, '_>>,
    prefixes: &mut PrefixTable,
    limits: &Limits,
    depth: usize,
) -> Result<Element> {
    limits.check_xml_depth(depth)?;
    let tag = node.tag_name();
    let mut element = Element::new(QName::new(tag.namespace(), tag.name()));

    for ns in node.namespaces() {
        let prefix = ns.name().unwrap_or("");
        if prefix == "xml" {
            continue;
        }
        let inherited = parent
            .map(|p| p.namespaces().any(|pn| pn.name() == ns.name() && pn.uri() == ns.uri()))
            .unwrap_or(false);
        if !inherited {
            element.namespaces.push((prefix.to_string(), ns.uri().to_string()));
            if prefixes.namespace_for(prefix).is_none() {
                prefixes.bind(prefix, ns.uri())?;
            }
        }
    }

    let attributes: Vec<_> = node.attributes().collect();
    limits.check_attributes(attributes.len())?;
    for attr in attributes {
        element
            .attributes
            .push((QName::new(attr.namespace(), attr.name()), attr.value().to_string()));
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            element
                .children
                .push(convert_node(child, Some(node), prefixes, limits, depth + 1)?);
        } else if child.is_text() {
            text.push_str(child.text().unwrap_or(""));
        }
    }
    if !text.is_empty() && (element.children.is_empty() || !text.trim().is_empty()) {
        element.text = Some(text);
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_str(xml).unwrap();

        assert_eq!(doc.root.local_name(), "root");
        assert_eq!(doc.root.children.len(), 1);
        assert_eq!(doc.root.children[0].local_name(), "child");
        assert_eq!(doc.root.children[0].text.as_deref(), Some("text"));
        assert_eq!(doc.root.text, None);
    }

    #[test]
    fn test_parse_with_namespaces() {
        let xml = r#"<a:root xmlns:a="urn:a" xmlns="urn:d" a:id="1"><child/></a:root>"#;
        let doc = Document::from_str(xml).unwrap();

        assert_eq!(doc.root.name, QName::namespaced("urn:a", "root"));
        assert_eq!(doc.root.children[0].name, QName::namespaced("urn:d", "child"));
        assert_eq!(doc.root.attribute(&QName::namespaced("urn:a", "id")), Some("1"));
        assert_eq!(doc.prefixes.namespace_for("a"), Some("urn:a"));
        assert_eq!(doc.prefixes.default_namespace(), Some("urn:d"));
        assert_eq!(doc.root.namespaces.len(), 2);
        assert!(doc.root.children[0].namespaces.is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let xml = "<a><b><c/></b></a>";
        let limits = Limits::default().with_max_xml_depth(2);
        assert!(matches!(
            Document::parse_with_limits(xml, &limits),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_write_declares_used_namespaces() {
        let mut prefixes = PrefixTable::new();
        prefixes.bind("unused", "urn:unused").unwrap();
        prefixes.bind("ns1", "urn:one").unwrap();
        let root = Element::new(QName::namespaced("urn:one", "root"))
            .with_attribute(QName::local("id"), "a&b")
            .with_child(Element::new(QName::namespaced("urn:one", "item")).with_text("1 < 2"))
            .with_child(Element::new(QName::namespaced("urn:one", "empty")));
        let doc = Document::new(root, prefixes);

        let xml = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(
            xml,
            r#"<ns1:root xmlns:ns1="urn:one" id="a&amp;b"><ns1:item>1 &lt; 2</ns1:item><ns1:empty/></ns1:root>"#
        );
    }

    #[test]
    fn test_write_default_namespace_scopes() {
        let mut prefixes = PrefixTable::new();
        prefixes.bind("", "urn:d").unwrap();
        let root = Element::new(QName::namespaced("urn:d", "root"))
            .with_child(Element::new(QName::local("plain")));
        let doc = Document::new(root, prefixes);

        let xml = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(xml, r#"<root xmlns="urn:d"><plain xmlns=""/></root>"#);
    }

    #[test]
    fn test_write_declares_prefixes_of_qname_values() {
        let mut prefixes = PrefixTable::new();
        prefixes.bind("ns1", "urn:one").unwrap();
        prefixes.bind("xsi", XSI_NAMESPACE).unwrap();
        prefixes.bind("ty", "urn:types").unwrap();
        prefixes.bind("code", "urn:codes").unwrap();
        let root = Element::new(QName::namespaced("urn:one", "root"))
            .with_attribute(QName::namespaced(XSI_NAMESPACE, "type"), "ty:Derived")
            .with_child(Element::new(QName::namespaced("urn:one", "unit")).with_text("code:kg"));
        let mut doc = Document::new(root, prefixes);
        doc.value_prefixes.push("code".to_string());

        let xml = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(
            xml,
            r#"<ns1:root xmlns:ns1="urn:one" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:ty="urn:types" xmlns:code="urn:codes" xsi:type="ty:Derived"><ns1:unit>code:kg</ns1:unit></ns1:root>"#
        );

        doc.value_prefixes.push("missing".to_string());
        assert!(matches!(
            doc.to_xml_string(&WriteOptions::new()),
            Err(Error::Xml(_))
        ));
    }

    #[test]
    fn test_write_unbound_namespace_fails() {
        let root = Element::new(QName::namespaced("urn:nowhere", "root"));
        let doc = Document::new(root, PrefixTable::new());
        assert!(matches!(
            doc.to_xml_string(&WriteOptions::new()),
            Err(Error::Xml(_))
        ));
    }

    #[test]
    fn test_parse_then_write() {
        let xml = r#"<p:root xmlns:p="urn:p"><p:a>1</p:a></p:root>"#;
        let doc = Document::from_str(xml).unwrap();
        let written = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(written, xml);
    }
}
