//! XSD Identity Constraints
//!
//! This module implements identity constraints for XML Schema:
//! - xs:unique - Ensures values are unique within scope
//! - xs:key - Like unique, but all field values must be present
//! - xs:keyref - References a key/unique constraint (foreign key)
//!
//! Selectors and fields use the restricted XPath subset of XSD 1.0: unions of
//! child steps, optionally starting with `.//`, where a field may end with an
//! attribute step.

use std::collections::HashMap;

use crate::documents::Element;
use crate::error::{Result, SchemaError};
use crate::names::is_valid_ncname;
use crate::namespaces::QName;
use crate::XML_NAMESPACE;

/// A tuple of field values forming a composite key
pub type FieldTuple = Vec<String>;

/// Type of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    /// xs:unique - values must be unique, but fields can be missing
    Unique,
    /// xs:key - values must be unique AND all fields must be present
    Key,
    /// xs:keyref - references a key or unique constraint
    Keyref,
}

impl IdentityKind {
    /// Kind from the local name of the declaring XSD element
    pub fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "unique" => Some(IdentityKind::Unique),
            "key" => Some(IdentityKind::Key),
            "keyref" => Some(IdentityKind::Keyref),
            _ => None,
        }
    }
}

/// Name test of a path step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(String),
    /// A qualified name; unprefixed names have no namespace
    Name(QName),
}

impl NameTest {
    fn matches(&self, name: &QName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => name.namespace() == Some(uri.as_str()),
            NameTest::Name(expected) => expected == name,
        }
    }
}

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.`
    SelfNode,
    /// Child element step
    Child(NameTest),
    /// Attribute step, only last in a field path
    Attribute(NameTest),
}

/// A single path of a union
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPath {
    /// Starts with `.//`
    pub descendants: bool,
    /// Steps in order
    pub steps: Vec<Step>,
}

/// A node reached by a path
#[derive(Debug, Clone, Copy)]
pub enum PathNode<'d> {
    /// An element
    Element(&'d Element),
    /// An attribute value
    Attribute(&'d str),
}

/// Parsed selector or field expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPath {
    /// Source text
    pub xpath: String,
    /// Union members
    pub paths: Vec<LocationPath>,
}

impl IdentityPath {
    /// Parse a selector (element steps only)
    pub fn selector<F>(xpath: &str, resolve: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::parse(xpath, false, &resolve)
    }

    /// Parse a field (may end with an attribute step)
    pub fn field<F>(xpath: &str, resolve: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::parse(xpath, true, &resolve)
    }

    fn parse(
        xpath: &str,
        allow_attribute: bool,
        resolve: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let invalid = |reason: &str| -> crate::error::Error {
            SchemaError::MalformedSchema(format!("invalid xpath '{}': {}", xpath, reason)).into()
        };

        let mut paths = Vec::new();
        for alternative in xpath.split('|') {
            let mut text = alternative.trim();
            let descendants = match text.strip_prefix(".//") {
                Some(rest) => {
                    text = rest.trim_start();
                    true
                }
                None => false,
            };
            if text.is_empty() {
                return Err(invalid("empty path"));
            }

            let mut steps = Vec::new();
            let raw_steps: Vec<&str> = text.split('/').map(str::trim).collect();
            for (index, raw) in raw_steps.iter().enumerate() {
                let last = index + 1 == raw_steps.len();
                let step = if *raw == "." {
                    Step::SelfNode
                } else if let Some(name) = raw
                    .strip_prefix('@')
                    .or_else(|| raw.strip_prefix("attribute::"))
                {
                    if !allow_attribute {
                        return Err(invalid("a selector cannot select attributes"));
                    }
                    if !last {
                        return Err(invalid("an attribute step must be last"));
                    }
                    let test = parse_name_test(name.trim(), resolve)
                        .ok_or_else(|| invalid("bad name test"))?;
                    Step::Attribute(test)
                } else {
                    let name = raw.strip_prefix("child::").unwrap_or(raw).trim();
                    let test =
                        parse_name_test(name, resolve).ok_or_else(|| invalid("bad name test"))?;
                    Step::Child(test)
                };
                steps.push(step);
            }
            paths.push(LocationPath { descendants, steps });
        }

        Ok(Self {
            xpath: xpath.to_string(),
            paths,
        })
    }

    /// Nodes reached from `context`, in document order per union member
    pub fn evaluate<'d>(&self, context: &'d Element) -> Vec<PathNode<'d>> {
        let mut found: Vec<PathNode<'d>> = Vec::new();
        for path in &self.paths {
            let mut current: Vec<&'d Element> = if path.descendants {
                let mut all = Vec::new();
                collect_subtree(context, &mut all);
                all
            } else {
                vec![context]
            };
            let mut attributes: Vec<&'d str> = Vec::new();
            for step in &path.steps {
                match step {
                    Step::SelfNode => {}
                    Step::Child(test) => {
                        current = current
                            .iter()
                            .copied()
                            .flat_map(|e| e.children.iter())
                            .filter(|child| test.matches(&child.name))
                            .collect();
                    }
                    Step::Attribute(test) => {
                        attributes = current
                            .iter()
                            .copied()
                            .flat_map(|e| e.attributes.iter())
                            .filter(|(name, _)| test.matches(name))
                            .map(|(_, value)| value.as_str())
                            .collect();
                        current.clear();
                    }
                }
            }
            for element in current {
                let seen = found
                    .iter()
                    .any(|node| matches!(node, PathNode::Element(e) if std::ptr::eq(*e, element)));
                if !seen {
                    found.push(PathNode::Element(element));
                }
            }
            found.extend(attributes.into_iter().map(PathNode::Attribute));
        }
        found
    }

    /// Elements reached from `context`
    pub fn select<'d>(&self, context: &'d Element) -> Vec<&'d Element> {
        self.evaluate(context)
            .into_iter()
            .filter_map(|node| match node {
                PathNode::Element(element) => Some(element),
                PathNode::Attribute(_) => None,
            })
            .collect()
    }
}

fn parse_name_test(text: &str, resolve: &dyn Fn(&str) -> Option<String>) -> Option<NameTest> {
    if text == "*" {
        return Some(NameTest::Any);
    }
    match text.split_once(':') {
        Some((prefix, "*")) => Some(NameTest::Namespace(resolve_prefix(prefix, resolve)?)),
        Some((prefix, local)) if is_valid_ncname(local) => Some(NameTest::Name(QName::namespaced(
            resolve_prefix(prefix, resolve)?,
            local,
        ))),
        None if is_valid_ncname(text) => Some(NameTest::Name(QName::local(text))),
        _ => None,
    }
}

fn resolve_prefix(prefix: &str, resolve: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    if prefix == "xml" {
        return Some(XML_NAMESPACE.to_string());
    }
    resolve(prefix).filter(|uri| !uri.is_empty())
}

fn collect_subtree<'d>(element: &'d Element, into: &mut Vec<&'d Element>) {
    into.push(element);
    for child in &element.children {
        collect_subtree(child, into);
    }
}

/// An identity constraint declared on an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XsdIdentity {
    /// Constraint name
    pub name: QName,
    /// Kind of constraint
    pub kind: IdentityKind,
    /// XPath selector
    pub selector: IdentityPath,
    /// XPath fields
    pub fields: Vec<IdentityPath>,
    /// Referenced key or unique (keyref only)
    pub refer: Option<QName>,
}

impl XsdIdentity {
    /// Create a new identity constraint
    pub fn new(name: QName, kind: IdentityKind, selector: IdentityPath) -> Self {
        Self {
            name,
            kind,
            selector,
            fields: Vec::new(),
            refer: None,
        }
    }

    /// Add a field
    pub fn with_field(mut self, field: IdentityPath) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the referenced constraint
    pub fn with_refer(mut self, refer: QName) -> Self {
        self.refer = Some(refer);
        self
    }

    /// Key rows of the nodes selected from `scope`
    pub fn rows<'d>(&self, scope: &'d Element) -> Vec<KeyRow<'d>> {
        self.selector
            .select(scope)
            .into_iter()
            .map(|node| {
                let mut values = Vec::with_capacity(self.fields.len());
                let mut problem = None;
                for field in &self.fields {
                    let found = field.evaluate(node);
                    match found.as_slice() {
                        [] => {
                            problem.get_or_insert(FieldProblem::Missing(field.xpath.clone()));
                        }
                        [value] => values.push(field_value(value)),
                        _ => {
                            problem.get_or_insert(FieldProblem::Several(field.xpath.clone()));
                        }
                    }
                }
                KeyRow {
                    node,
                    values,
                    problem,
                }
            })
            .collect()
    }
}

/// Whitespace-collapsed value of a field node
fn field_value(node: &PathNode<'_>) -> String {
    let raw = match node {
        PathNode::Element(element) => element.text.as_deref().unwrap_or(""),
        PathNode::Attribute(value) => value,
    };
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Why a selected node has no complete key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    /// The field selects nothing
    Missing(String),
    /// The field selects more than one node
    Several(String),
}

/// A node selected by a constraint and its field values
#[derive(Debug, Clone)]
pub struct KeyRow<'d> {
    /// Selected element
    pub node: &'d Element,
    /// Field values, complete only when `problem` is None
    pub values: FieldTuple,
    /// First field that did not yield exactly one node
    pub problem: Option<FieldProblem>,
}

/// Key values of one key or unique constraint, counted per tuple
#[derive(Debug, Clone, Default)]
pub struct IdentityCounter {
    counter: HashMap<FieldTuple, usize>,
}

impl IdentityCounter {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a tuple; returns the count after insertion
    pub fn increase(&mut self, fields: FieldTuple) -> usize {
        let count = self.counter.entry(fields).or_insert(0);
        *count += 1;
        *count
    }

    /// Check if a field tuple exists
    pub fn contains(&self, fields: &FieldTuple) -> bool {
        self.counter.contains_key(fields)
    }

    /// Number of distinct tuples
    pub fn len(&self) -> usize {
        self.counter.len()
    }

    /// Check if counter is empty
    pub fn is_empty(&self) -> bool {
        self.counter.is_empty()
    }
}

/// Key table produced by one constraint on one scope element
#[derive(Debug, Clone)]
pub struct KeyTable {
    /// Constraint name
    pub name: QName,
    /// Counted tuples
    pub counter: IdentityCounter,
}

/// Display a tuple in messages
pub fn display_tuple(fields: &FieldTuple) -> String {
    if fields.len() == 1 {
        format!("{:?}", fields[0])
    } else {
        format!("({})", fields.iter().map(|f| format!("{:?}", f)).collect::<Vec<_>>().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(prefix: &str) -> Option<String> {
        match prefix {
            "t" => Some("urn:t".to_string()),
            _ => None,
        }
    }

    fn t(local: &str) -> QName {
        QName::namespaced("urn:t", local)
    }

    fn catalog() -> Element {
        Element::new(t("root"))
            .with_child(
                Element::new(t("item"))
                    .with_attribute(QName::local("id"), " a ")
                    .with_child(Element::new(t("code")).with_text("1")),
            )
            .with_child(
                Element::new(t("group")).with_child(
                    Element::new(t("item"))
                        .with_attribute(QName::local("id"), "b")
                        .with_child(Element::new(t("code")).with_text("2")),
                ),
            )
    }

    #[test]
    fn test_parse_selector() {
        let path = IdentityPath::selector("t:item | .//t:group/*", resolver).unwrap();
        assert_eq!(path.paths.len(), 2);
        assert!(!path.paths[0].descendants);
        assert!(path.paths[1].descendants);
        assert_eq!(path.paths[1].steps[1], Step::Child(NameTest::Any));
    }

    #[test]
    fn test_parse_errors() {
        assert!(IdentityPath::selector("@id", resolver).is_err());
        assert!(IdentityPath::selector("x:item", resolver).is_err());
        assert!(IdentityPath::field("@id/t:code", resolver).is_err());
        assert!(IdentityPath::selector("t:a//t:b", resolver).is_err());
    }

    #[test]
    fn test_select_children_and_descendants() {
        let root = catalog();
        let direct = IdentityPath::selector("t:item", resolver).unwrap();
        assert_eq!(direct.select(&root).len(), 1);

        let all = IdentityPath::selector(".//t:item", resolver).unwrap();
        assert_eq!(all.select(&root).len(), 2);

        let unqualified = IdentityPath::selector("item", resolver).unwrap();
        assert!(unqualified.select(&root).is_empty());
    }

    #[test]
    fn test_rows() {
        let root = catalog();
        let identity = XsdIdentity::new(
            t("ids"),
            IdentityKind::Key,
            IdentityPath::selector(".//t:item", resolver).unwrap(),
        )
        .with_field(IdentityPath::field("@id", resolver).unwrap())
        .with_field(IdentityPath::field("t:code", resolver).unwrap());

        let rows = identity.rows(&root);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values, vec!["a".to_string(), "1".to_string()]);
        assert!(rows[1].problem.is_none());

        let missing = XsdIdentity::new(
            t("names"),
            IdentityKind::Key,
            IdentityPath::selector(".//t:item", resolver).unwrap(),
        )
        .with_field(IdentityPath::field("@name", resolver).unwrap());
        assert_eq!(
            missing.rows(&root)[0].problem,
            Some(FieldProblem::Missing("@name".to_string()))
        );
    }

    #[test]
    fn test_counter() {
        let mut counter = IdentityCounter::new();
        assert_eq!(counter.increase(vec!["a".to_string()]), 1);
        assert_eq!(counter.increase(vec!["a".to_string()]), 2);
        assert!(counter.contains(&vec!["a".to_string()]));
        assert_eq!(counter.len(), 1);
    }
}
