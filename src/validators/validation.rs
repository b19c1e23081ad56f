//! XML Validation Infrastructure
//!
//! The context threaded through a validation pass: the violations collected
//! so far, the path of the element being visited and the namespace
//! declarations in scope.

use crate::error::{Facet, ValidationReport, Violation, ViolationKind};
use crate::limits::Limits;
use crate::names::split_qname;
use crate::namespaces::{PrefixTable, QName};
use crate::XML_NAMESPACE;

/// Validation context for one pass over a document
///
/// Violations are collected, never raised: a pass always visits the whole
/// tree and the caller decides what a non-empty report means.
#[derive(Debug)]
pub struct ValidationContext<'d> {
    /// Collected violations in document order
    pub violations: Vec<Violation>,
    /// Rendered path segments of the elements being visited
    path: Vec<String>,
    /// Namespace declarations of the elements being visited
    scopes: Vec<&'d [(String, String)]>,
    /// Prefixes used to render paths
    prefixes: &'d PrefixTable,
    /// Resource limits
    limits: &'d Limits,
}

impl<'d> ValidationContext<'d> {
    /// Create a new validation context
    pub fn new(prefixes: &'d PrefixTable, limits: &'d Limits) -> Self {
        Self {
            violations: Vec::new(),
            path: Vec::new(),
            scopes: Vec::new(),
            prefixes,
            limits,
        }
    }

    /// Current nesting level
    pub fn level(&self) -> usize {
        self.path.len()
    }

    /// Resource limits of the pass
    pub fn limits(&self) -> &Limits {
        self.limits
    }

    /// Prefixes used to render paths
    pub fn prefixes(&self) -> &'d PrefixTable {
        self.prefixes
    }

    /// Enter an element; `position` is its 1-based index among same-named siblings
    pub fn enter(&mut self, name: &QName, namespaces: &'d [(String, String)], position: Option<usize>) {
        let mut segment = self.render(name);
        if let Some(position) = position {
            segment.push_str(&format!("[{}]", position));
        }
        self.path.push(segment);
        self.scopes.push(namespaces);
    }

    /// Leave the current element
    pub fn leave(&mut self) {
        self.path.pop();
        self.scopes.pop();
    }

    /// Path of the current element
    pub fn path(&self) -> String {
        if self.path.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.path.join("/"))
        }
    }

    /// Path of a child of the current element
    pub fn child_path(&self, name: &QName, position: Option<usize>) -> String {
        let mut path = format!("{}/{}", self.path(), self.render(name));
        if let Some(position) = position {
            path.push_str(&format!("[{}]", position));
        }
        path
    }

    /// Path of an attribute of the current element
    pub fn attribute_path(&self, name: &QName) -> String {
        let rendered = self
            .prefixes
            .render_attribute(name)
            .unwrap_or_else(|| name.to_string());
        format!("{}/@{}", self.path(), rendered)
    }

    fn render(&self, name: &QName) -> String {
        self.prefixes.render(name).unwrap_or_else(|| name.to_string())
    }

    /// Record a violation at the current element
    pub fn report(&mut self, kind: ViolationKind, message: impl Into<String>) {
        let path = self.path();
        self.report_at(path, kind, message);
    }

    /// Record a violation at an explicit path
    pub fn report_at(&mut self, path: String, kind: ViolationKind, message: impl Into<String>) {
        self.violations.push(Violation::new(path, kind, message));
    }

    /// Record a simple type violation naming its facet
    pub fn report_facet(&mut self, path: String, facet: Facet, message: impl Into<String>) {
        self.violations.push(
            Violation::new(path, ViolationKind::SimpleTypeConstraintViolation, message)
                .with_facet(facet),
        );
    }

    /// Number of violations so far
    pub fn error_count(&self) -> usize {
        self.violations.len()
    }

    /// Expand a `prefix:local` value using the declarations in scope.
    ///
    /// Innermost declarations win; prefixes never declared in the document
    /// fall back to the document's prefix table.
    pub fn resolve_qname(&self, value: &str) -> Option<QName> {
        let (prefix, local) = split_qname(value.trim());
        let prefix = prefix.unwrap_or("");
        if prefix == "xml" {
            return Some(QName::namespaced(XML_NAMESPACE, local));
        }
        let declared = self
            .scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str());
        match declared.or_else(|| self.prefixes.namespace_for(prefix)) {
            Some("") | None if prefix.is_empty() => Some(QName::local(local)),
            Some(uri) => Some(QName::namespaced(uri, local)),
            None => None,
        }
    }

    /// Finish the pass
    pub fn into_report(self) -> ValidationReport {
        ValidationReport {
            violations: self.violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PrefixTable {
        let mut table = PrefixTable::new();
        table.bind("a", "urn:a").unwrap();
        table
    }

    #[test]
    fn test_paths() {
        let table = table();
        let limits = Limits::default();
        let mut ctx = ValidationContext::new(&table, &limits);
        assert_eq!(ctx.path(), "/");

        ctx.enter(&QName::namespaced("urn:a", "root"), &[], None);
        ctx.enter(&QName::namespaced("urn:a", "item"), &[], Some(2));
        assert_eq!(ctx.path(), "/a:root/a:item[2]");
        assert_eq!(ctx.attribute_path(&QName::local("id")), "/a:root/a:item[2]/@id");
        assert_eq!(ctx.level(), 2);

        ctx.leave();
        assert_eq!(
            ctx.child_path(&QName::namespaced("urn:b", "x"), None),
            "/a:root/{urn:b}x"
        );
    }

    #[test]
    fn test_collects_violations() {
        let table = table();
        let limits = Limits::default();
        let mut ctx = ValidationContext::new(&table, &limits);
        ctx.report(ViolationKind::UnknownElement, "first");
        ctx.report_facet("/x".to_string(), Facet::Pattern, "second");
        let report = ctx.into_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report.violations[1].facet, Some(Facet::Pattern));
    }

    #[test]
    fn test_resolve_qname_scopes() {
        let table = table();
        let limits = Limits::default();
        let outer = vec![("b".to_string(), "urn:outer".to_string())];
        let inner = vec![("b".to_string(), "urn:inner".to_string())];
        let mut ctx = ValidationContext::new(&table, &limits);
        ctx.enter(&QName::local("r"), &outer, None);
        ctx.enter(&QName::local("c"), &inner, None);

        assert_eq!(ctx.resolve_qname("b:T"), Some(QName::namespaced("urn:inner", "T")));
        assert_eq!(ctx.resolve_qname("a:T"), Some(QName::namespaced("urn:a", "T")));
        assert_eq!(ctx.resolve_qname("T"), Some(QName::local("T")));
        assert_eq!(ctx.resolve_qname("zz:T"), None);
    }
}
