//! Base converter types
//!
//! Key conventions of the input value tree: attributes are keyed with a
//! prefix (`@id`), character data with a text key (`$`), everything else
//! names a child element. Names may be plain (`item`), prefixed (`ns:item`)
//! or in Clark notation (`{urn:example}item`).

use crate::names::{split_clark, split_qname};
use crate::namespaces::{PrefixTable, QName};

/// Configuration for converting value trees to XML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Prefix marking attribute keys
    attr_prefix: String,
    /// Key holding character data
    text_key: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            attr_prefix: "@".to_string(),
            text_key: "$".to_string(),
        }
    }
}

impl ConverterConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the text key
    pub fn text_key(&self) -> &str {
        &self.text_key
    }

    /// Get the attribute prefix
    pub fn attr_prefix(&self) -> &str {
        &self.attr_prefix
    }

    /// Set text key
    pub fn with_text_key(mut self, key: impl Into<String>) -> Self {
        self.text_key = key.into();
        self
    }

    /// Set attribute prefix
    pub fn with_attr_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.attr_prefix = prefix.into();
        self
    }

    /// Classify an object key
    pub fn classify<'k>(&self, key: &'k str) -> KeyKind<'k> {
        if key == self.text_key {
            return KeyKind::Text;
        }
        match key.strip_prefix(self.attr_prefix.as_str()) {
            Some(name) if !self.attr_prefix.is_empty() => {
                if name == "xmlns" || name.starts_with("xmlns:") {
                    KeyKind::NamespaceDecl
                } else {
                    KeyKind::Attribute(KeyName::parse(name))
                }
            }
            _ => KeyKind::Child(KeyName::parse(key)),
        }
    }
}

/// What an object key stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind<'k> {
    /// Character data
    Text,
    /// An `xmlns` declaration carried over from decoded XML; ignored
    NamespaceDecl,
    /// An attribute
    Attribute(KeyName<'k>),
    /// A child element (or an unprefixed attribute, decided by the schema)
    Child(KeyName<'k>),
}

/// Element or attribute name as written in a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName<'k> {
    /// Plain local name; matches the local name in any namespace
    Local(&'k str),
    /// `prefix:local`, resolved through the prefix table
    Prefixed(&'k str, &'k str),
    /// `{uri}local`
    Clark(&'k str, &'k str),
}

impl<'k> KeyName<'k> {
    /// Parse a key
    pub fn parse(key: &'k str) -> Self {
        if let Some((uri, local)) = split_clark(key) {
            return KeyName::Clark(uri, local);
        }
        match split_qname(key) {
            (Some(prefix), local) => KeyName::Prefixed(prefix, local),
            (None, local) => KeyName::Local(local),
        }
    }

    /// Local part of the name
    pub fn local_name(&self) -> &'k str {
        match self {
            KeyName::Local(local) | KeyName::Prefixed(_, local) | KeyName::Clark(_, local) => *local,
        }
    }

    /// Namespace the key explicitly names: None for plain names, `Some(None)`
    /// for `{}local`, and None as well for an unknown prefix (which matches nothing)
    fn explicit_namespace<'t>(&self, prefixes: &'t PrefixTable) -> Option<Option<&'t str>>
    where
        'k: 't,
    {
        match self {
            KeyName::Local(_) => None,
            KeyName::Prefixed(prefix, _) => prefixes.namespace_for(prefix).map(Some),
            KeyName::Clark(uri, _) if uri.is_empty() => Some(None),
            KeyName::Clark(uri, _) => Some(Some(*uri)),
        }
    }

    /// True if the key names `name`
    pub fn matches(&self, name: &QName, prefixes: &PrefixTable) -> bool {
        if self.local_name() != name.local_name {
            return false;
        }
        match self {
            KeyName::Local(_) => true,
            KeyName::Prefixed(..) => match self.explicit_namespace(prefixes) {
                Some(namespace) => namespace == name.namespace(),
                None => false,
            },
            KeyName::Clark(..) => self.explicit_namespace(prefixes) == Some(name.namespace()),
        }
    }

    /// True if the key is exactly `name`, not just the same local name
    pub fn is_exact(&self, name: &QName, prefixes: &PrefixTable) -> bool {
        match self {
            KeyName::Local(local) => *local == name.local_name && name.namespace.is_none(),
            _ => self.matches(name, prefixes),
        }
    }

    /// Qualified name for undeclared content.
    ///
    /// Plain element names take the default namespace, plain attribute names
    /// stay unqualified. None when the prefix is unbound.
    pub fn resolve(&self, prefixes: &PrefixTable, is_attribute: bool) -> Option<QName> {
        match self {
            KeyName::Local(local) if is_attribute => Some(QName::local(*local)),
            KeyName::Local(local) => Some(QName::new(prefixes.default_namespace(), *local)),
            KeyName::Prefixed(..) | KeyName::Clark(..) => self
                .explicit_namespace(prefixes)
                .map(|namespace| QName::new(namespace, self.local_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PrefixTable {
        let mut table = PrefixTable::new();
        table.bind("ns", "urn:a").unwrap();
        table
    }

    #[test]
    fn test_classify_keys() {
        let config = ConverterConfig::new();
        assert_eq!(config.classify("$"), KeyKind::Text);
        assert_eq!(config.classify("@xmlns:ns"), KeyKind::NamespaceDecl);
        assert_eq!(config.classify("@xmlns"), KeyKind::NamespaceDecl);
        assert_eq!(
            config.classify("@id"),
            KeyKind::Attribute(KeyName::Local("id"))
        );
        assert_eq!(
            config.classify("ns:item"),
            KeyKind::Child(KeyName::Prefixed("ns", "item"))
        );
        assert_eq!(
            config.classify("{urn:a}item"),
            KeyKind::Child(KeyName::Clark("urn:a", "item"))
        );
    }

    #[test]
    fn test_custom_config() {
        let config = ConverterConfig::new()
            .with_attr_prefix("-")
            .with_text_key("#text");
        assert_eq!(config.classify("#text"), KeyKind::Text);
        assert_eq!(
            config.classify("-lang"),
            KeyKind::Attribute(KeyName::Local("lang"))
        );
        assert_eq!(config.classify("@lang"), KeyKind::Child(KeyName::Local("@lang")));
    }

    #[test]
    fn test_key_matching() {
        let table = table();
        let name = QName::namespaced("urn:a", "item");
        assert!(KeyName::parse("item").matches(&name, &table));
        assert!(KeyName::parse("ns:item").matches(&name, &table));
        assert!(KeyName::parse("{urn:a}item").matches(&name, &table));
        assert!(!KeyName::parse("{urn:b}item").matches(&name, &table));
        assert!(!KeyName::parse("zz:item").matches(&name, &table));
        assert!(!KeyName::parse("item").is_exact(&name, &table));
        assert!(KeyName::parse("{}item").matches(&QName::local("item"), &table));
    }

    #[test]
    fn test_resolve_undeclared() {
        let table = table();
        assert_eq!(
            KeyName::parse("ns:x").resolve(&table, false),
            Some(QName::namespaced("urn:a", "x"))
        );
        assert_eq!(KeyName::parse("x").resolve(&table, true), Some(QName::local("x")));
        assert_eq!(KeyName::parse("zz:x").resolve(&table, false), None);
    }
}
