//! XML namespace handling
//!
//! [`QName`] identifies every schema component and XML tag by namespace URI and
//! local name. [`PrefixTable`] is the immutable prefix/URI mapping an encode call
//! renders tags with.

use crate::error::{NamespaceError, Result};
use crate::names::{is_valid_ncname, split_clark, split_qname};
use crate::validators::XsdSchema;
use crate::{XML_NAMESPACE, XMLNS_NAMESPACE, XSI_NAMESPACE};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

/// XML Namespace URI
pub type NamespaceUri = String;

/// Namespace prefix
pub type Prefix = String;

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
        }
    }

    /// Parse `{uri}local` or a plain local name
    pub fn from_clark(name: &str) -> Self {
        match split_clark(name) {
            Some((ns, local)) if !ns.is_empty() => QName::namespaced(ns, local),
            Some((_, local)) => QName::local(local),
            None => QName::local(name),
        }
    }

    /// Namespace URI as a string slice
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// True for names in the XSD namespace
    pub fn is_xsd(&self) -> bool {
        self.namespace() == Some(crate::XSD_NAMESPACE)
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Prefix bindings used to render qualified names.
///
/// The unprefixed (default) binding is stored under the empty prefix. Insertion
/// order is preserved and decides which prefix renders a namespace bound to
/// several prefixes; a requested target alias always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixTable {
    bindings: IndexMap<Prefix, NamespaceUri>,
    target_alias: Option<Prefix>,
}

impl PrefixTable {
    /// Create an empty prefix table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the prefix table for one encode call.
    ///
    /// Caller bindings are applied first and may not conflict with each other.
    /// The alias, when given, is then bound to the schema's target namespace,
    /// overriding a caller binding of the same prefix. The schema's default
    /// namespace fills the unprefixed binding if still free, the prefixes
    /// declared by the schema documents fill any remaining free prefixes, and
    /// `xsi` is bound unless the caller already bound the XSI namespace.
    pub fn resolve<I, P, U>(
        schema: &XsdSchema,
        target_alias: Option<&str>,
        caller_bindings: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (P, U)>,
        P: AsRef<str>,
        U: AsRef<str>,
    {
        let mut table = PrefixTable::new();
        for (prefix, uri) in caller_bindings {
            table.bind(prefix.as_ref(), uri.as_ref())?;
        }

        if let Some(alias) = target_alias {
            let target = schema
                .target_namespace()
                .ok_or_else(|| NamespaceError::NoTargetNamespace {
                    alias: alias.to_string(),
                })?;
            check_prefix(alias, target)?;
            table.bindings.insert(alias.to_string(), target.to_string());
            table.target_alias = Some(alias.to_string());
        }

        if let Some(default_ns) = schema.default_namespace() {
            if !table.bindings.contains_key("") {
                table.bindings.insert(String::new(), default_ns.to_string());
            }
        }

        for (prefix, uri) in schema.declared_prefixes() {
            if !table.bindings.contains_key(prefix.as_str()) && check_prefix(prefix, uri).is_ok() {
                table.bindings.insert(prefix.clone(), uri.clone());
            }
        }

        if table.prefix_for(XSI_NAMESPACE).is_none() && !table.bindings.contains_key("xsi") {
            table.bindings.insert("xsi".to_string(), XSI_NAMESPACE.to_string());
        }

        debug!(
            bindings = table.bindings.len(),
            alias = ?table.target_alias,
            "resolved prefix table"
        );
        Ok(table)
    }

    /// Bind a prefix, failing if it is already bound to another URI
    pub fn bind(&mut self, prefix: &str, uri: &str) -> Result<()> {
        check_prefix(prefix, uri)?;
        match self.bindings.get(prefix) {
            Some(existing) if existing != uri => Err(NamespaceError::ConflictingNamespaceBinding {
                prefix: prefix.to_string(),
                existing: existing.clone(),
                requested: uri.to_string(),
            }
            .into()),
            Some(_) => Ok(()),
            None => {
                self.bindings.insert(prefix.to_string(), uri.to_string());
                Ok(())
            }
        }
    }

    /// Bind a prefix to the target namespace and prefer it when rendering
    pub fn with_target_alias(mut self, alias: &str, uri: &str) -> Result<Self> {
        check_prefix(alias, uri)?;
        self.bindings.insert(alias.to_string(), uri.to_string());
        self.target_alias = Some(alias.to_string());
        Ok(self)
    }

    /// Namespace bound to a prefix ("" for the default namespace)
    pub fn namespace_for(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings.get(prefix).map(|s| s.as_str())
    }

    /// Default namespace, if bound
    pub fn default_namespace(&self) -> Option<&str> {
        self.namespace_for("")
    }

    /// Prefix used to render element names of a namespace (may be "")
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        if uri == XML_NAMESPACE {
            return Some("xml");
        }
        if let Some(alias) = &self.target_alias {
            if self.bindings.get(alias).map(|s| s.as_str()) == Some(uri) {
                return Some(alias);
            }
        }
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == uri)
            .map(|(prefix, _)| prefix.as_str())
    }

    /// Prefix used to render attribute names of a namespace (never "")
    pub fn attribute_prefix_for(&self, uri: &str) -> Option<&str> {
        match self.prefix_for(uri) {
            Some("") => self
                .bindings
                .iter()
                .find(|(prefix, bound)| !prefix.is_empty() && bound.as_str() == uri)
                .map(|(prefix, _)| prefix.as_str()),
            other => other,
        }
    }

    /// Render an element name, None when its namespace is unbound
    pub fn render(&self, name: &QName) -> Option<String> {
        match name.namespace() {
            None => Some(name.local_name.clone()),
            Some(ns) => self.prefix_for(ns).map(|prefix| join_prefixed(prefix, &name.local_name)),
        }
    }

    /// Render an attribute name, None when its namespace is unbound
    pub fn render_attribute(&self, name: &QName) -> Option<String> {
        match name.namespace() {
            None => Some(name.local_name.clone()),
            Some(ns) => self
                .attribute_prefix_for(ns)
                .map(|prefix| join_prefixed(prefix, &name.local_name)),
        }
    }

    /// Expand a `prefix:local` name; unprefixed names take the default namespace
    pub fn expand(&self, name: &str) -> Result<QName> {
        match split_qname(name) {
            (Some(prefix), local) => {
                let ns = self
                    .namespace_for(prefix)
                    .ok_or_else(|| NamespaceError::UnknownPrefix(prefix.to_string()))?;
                Ok(QName::namespaced(ns, local))
            }
            (None, local) => Ok(QName::new(self.default_namespace(), local)),
        }
    }

    /// Target alias requested for this table
    pub fn target_alias(&self) -> Option<&str> {
        self.target_alias.as_deref()
    }

    /// Iterate over bindings in priority order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn join_prefixed(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// Reject prefixes that are not NCNames and misuse of the reserved prefixes
fn check_prefix(prefix: &str, uri: &str) -> std::result::Result<(), NamespaceError> {
    if !prefix.is_empty() && !is_valid_ncname(prefix) {
        return Err(NamespaceError::InvalidPrefix(prefix.to_string()));
    }
    let reserved = match prefix {
        "xml" => Some(XML_NAMESPACE),
        "xmlns" => Some(XMLNS_NAMESPACE),
        _ => None,
    };
    match reserved {
        Some(fixed) if fixed != uri || prefix == "xmlns" => {
            Err(NamespaceError::ConflictingNamespaceBinding {
                prefix: prefix.to_string(),
                existing: fixed.to_string(),
                requested: uri.to_string(),
            })
        }
        _ if prefix != "xml" && (uri == XML_NAMESPACE || uri == XMLNS_NAMESPACE) => {
            Err(NamespaceError::ConflictingNamespaceBinding {
                prefix: prefix.to_string(),
                existing: String::new(),
                requested: uri.to_string(),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns:tns="urn:example:main" xmlns:other="urn:example:other"
        targetNamespace="urn:example:main">
      <xs:element name="root" type="xs:string"/>
    </xs:schema>"#;

    fn schema() -> XsdSchema {
        XsdSchema::from_str(SCHEMA).unwrap()
    }

    #[test]
    fn test_qname_display() {
        let qname = QName::namespaced("http://example.com", "element");
        assert_eq!(qname.to_string(), "{http://example.com}element");
        assert_eq!(QName::local("element").to_string(), "element");
        assert_eq!(QName::from_clark("{http://example.com}element"), qname);
    }

    #[test]
    fn test_alias_binds_target_namespace() {
        let table = PrefixTable::resolve(&schema(), Some("ns1"), Vec::<(&str, &str)>::new()).unwrap();
        assert_eq!(table.namespace_for("ns1"), Some("urn:example:main"));
        // alias wins over the schema's own tns prefix
        assert_eq!(table.prefix_for("urn:example:main"), Some("ns1"));
        assert_eq!(
            table.render(&QName::namespaced("urn:example:main", "root")),
            Some("ns1:root".to_string())
        );
    }

    #[test]
    fn test_alias_overrides_caller_binding() {
        let table = PrefixTable::resolve(&schema(), Some("a"), [("a", "urn:elsewhere")]).unwrap();
        assert_eq!(table.namespace_for("a"), Some("urn:example:main"));
    }

    #[test]
    fn test_conflicting_caller_bindings() {
        let err = PrefixTable::resolve(
            &schema(),
            None,
            [("p", "urn:one"), ("p", "urn:two")],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Namespace(NamespaceError::ConflictingNamespaceBinding { .. })
        ));

        // identical duplicates are fine
        assert!(PrefixTable::resolve(&schema(), None, [("p", "urn:one"), ("p", "urn:one")]).is_ok());
    }

    #[test]
    fn test_reserved_prefixes() {
        let mut table = PrefixTable::new();
        assert!(table.bind("xml", XML_NAMESPACE).is_ok());
        assert!(table.bind("xml", "urn:wrong").is_err());
        assert!(table.bind("xmlns", "urn:any").is_err());
        assert!(table.bind("p", XML_NAMESPACE).is_err());
        assert!(table.bind("1p", "urn:any").is_err());
    }

    #[test]
    fn test_schema_prefixes_are_lowest_priority() {
        let table = PrefixTable::resolve(&schema(), None, [("other", "urn:mine")]).unwrap();
        assert_eq!(table.namespace_for("other"), Some("urn:mine"));
        assert_eq!(table.namespace_for("tns"), Some("urn:example:main"));
        assert_eq!(table.namespace_for("xsi"), Some(XSI_NAMESPACE));
    }

    #[test]
    fn test_attribute_prefix_never_default() {
        let mut table = PrefixTable::new();
        table.bind("", "urn:a").unwrap();
        assert_eq!(table.prefix_for("urn:a"), Some(""));
        assert_eq!(table.attribute_prefix_for("urn:a"), None);
        table.bind("a", "urn:a").unwrap();
        assert_eq!(table.attribute_prefix_for("urn:a"), Some("a"));
    }

    #[test]
    fn test_expand() {
        let mut table = PrefixTable::new();
        table.bind("a", "urn:a").unwrap();
        assert_eq!(table.expand("a:item").unwrap(), QName::namespaced("urn:a", "item"));
        assert_eq!(table.expand("item").unwrap(), QName::local("item"));
        assert!(table.expand("b:item").is_err());
    }
}
