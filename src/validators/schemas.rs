//! XML Schema models
//!
//! [`SchemaBuilder`] collects schema documents (the load session and any
//! imports) and builds an immutable [`XsdSchema`]. Building resolves every
//! reference between components; a reference that does not resolve is a
//! build error, never a deferred one.
//!
//! Imports are only possible on the builder. Once built, a schema can be
//! shared across threads and used for any number of encode and validate calls.

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use super::attributes::AttributeUses;
use super::complex_types::{ContentModel, Derivation};
use super::elements::XsdElement;
use super::globals::{GroupMap, TypeRef, XsdGlobals, XsdType};
use super::groups::{Compositor, ModelGroup, Particle, Term};
use super::identities::{IdentityKind, XsdIdentity};
use super::parsing::{parse_schema_document, ParsedDocument};
use super::simple_types::{SimpleDerivation, XsdSimpleType};
use super::wildcards::Wildcard;

use crate::documents::Document;
use crate::error::{Error, Result, SchemaError, ValidationReport};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::namespaces::{PrefixTable, QName};
use crate::validators::document_validation::validate_document;
use crate::validators::encoding::{encode, EncodeOptions};
use crate::values::Value;
use crate::XSD_NAMESPACE;

/// Pending schema work item for iterative processing
#[derive(Debug, Clone)]
struct PendingDocument {
    /// Where the document comes from
    location: Location,
    /// Target namespace of the including document, for xs:include
    including_namespace: Option<Option<String>>,
    /// Namespace an import must declare
    expected_namespace: Option<Option<String>>,
    /// Include/import nesting depth
    depth: usize,
}

/// Collects schema documents and builds an [`XsdSchema`].
///
/// Every method consumes the builder, so a failed load or import leaves
/// nothing behind that could be used.
///
/// ```rust,ignore
/// let schema = SchemaBuilder::new()
///     .load_file("main.xsd")?
///     .import_file("urn:example:types", "types.xsd")?
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    globals: XsdGlobals,
    loader: Loader,
    limits: Limits,
    /// Facts of the first loaded document
    root: Option<ParsedDocument>,
    /// Prefixes declared by all loaded documents, first declaration wins
    prefixes: Vec<(String, String)>,
    /// Target namespaces with at least one loaded document
    namespaces: Vec<Option<String>>,
    /// Location keys already loaded
    loaded: HashSet<String>,
    /// Imports discovered by location hint, loaded at build time unless supplied
    discovered_imports: Vec<PendingDocument>,
}

impl SchemaBuilder {
    /// Create a builder with default limits
    pub fn new() -> Self {
        Self {
            globals: XsdGlobals::new(),
            loader: Loader::new(),
            limits: Limits::default(),
            root: None,
            prefixes: Vec::new(),
            namespaces: vec![Some(XSD_NAMESPACE.to_string())],
            loaded: HashSet::new(),
            discovered_imports: Vec::new(),
        }
    }

    /// Set resource limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.loader = Loader::new().with_limits(limits.clone());
        self.limits = limits;
        self
    }

    /// Load a schema document from a string
    pub fn load_str(self, source: &str) -> Result<Self> {
        self.load(Location::Inline(source.to_string()))
    }

    /// Load a schema document from a file, following its includes and imports
    pub fn load_file(self, path: impl AsRef<Path>) -> Result<Self> {
        self.load(Location::path(path))
    }

    /// Load a schema document from a location
    pub fn load(mut self, location: Location) -> Result<Self> {
        self.process(PendingDocument {
            location,
            including_namespace: None,
            expected_namespace: None,
            depth: 0,
        })?;
        Ok(self)
    }

    /// Supply the document for `namespace` from a string
    pub fn import_str(self, namespace: &str, source: &str) -> Result<Self> {
        self.import(namespace, Location::Inline(source.to_string()))
    }

    /// Supply the document for `namespace` from a file
    pub fn import_file(self, namespace: &str, path: impl AsRef<Path>) -> Result<Self> {
        self.import(namespace, Location::path(path))
    }

    /// Supply the document for `namespace`
    pub fn import(mut self, namespace: &str, location: Location) -> Result<Self> {
        let namespace = Some(namespace.to_string()).filter(|ns| !ns.is_empty());
        if self.namespaces.contains(&namespace) {
            return Err(SchemaError::MalformedSchema(format!(
                "namespace '{}' is already loaded",
                namespace.unwrap_or_default()
            ))
            .into());
        }
        debug!(namespace = namespace.as_deref().unwrap_or(""), location = %location.as_str(), "importing schema");
        self.process(PendingDocument {
            location,
            including_namespace: None,
            expected_namespace: Some(namespace),
            depth: 0,
        })?;
        Ok(self)
    }

    /// Load a document and, iteratively, the includes it names
    fn process(&mut self, first: PendingDocument) -> Result<()> {
        let mut pending = VecDeque::from([first]);
        while let Some(work) = pending.pop_front() {
            self.limits.check_schema_depth(work.depth)?;
            if !matches!(work.location, Location::Inline(_)) {
                let key = work.location.key()?;
                if !self.loaded.insert(key) {
                    continue;
                }
            }

            let text = self.loader.load(&work.location)?;
            let parsed = parse_schema_document(
                &text,
                &mut self.globals,
                work.including_namespace.as_ref().map(|ns| ns.as_deref()),
            )?;
            if let Some(expected) = &work.expected_namespace {
                if parsed.target_namespace != *expected {
                    return Err(SchemaError::MalformedSchema(format!(
                        "imported schema has targetNamespace '{}', expected '{}'",
                        parsed.target_namespace.as_deref().unwrap_or(""),
                        expected.as_deref().unwrap_or("")
                    ))
                    .into());
                }
            }
            debug!(
                location = %work.location.as_str(),
                target_namespace = parsed.target_namespace.as_deref().unwrap_or(""),
                "loaded schema document"
            );

            for include in &parsed.includes {
                pending.push_back(PendingDocument {
                    location: work.location.join(include)?,
                    including_namespace: Some(parsed.target_namespace.clone()),
                    expected_namespace: None,
                    depth: work.depth + 1,
                });
            }
            if !matches!(work.location, Location::Inline(_)) {
                for import in &parsed.imports {
                    if let Some(hint) = &import.schema_location {
                        self.discovered_imports.push(PendingDocument {
                            location: work.location.join(hint)?,
                            including_namespace: None,
                            expected_namespace: Some(import.namespace.clone()),
                            depth: work.depth + 1,
                        });
                    }
                }
            }

            for (prefix, uri) in &parsed.prefixes {
                if !self.prefixes.iter().any(|(p, _)| p == prefix) {
                    self.prefixes.push((prefix.clone(), uri.clone()));
                }
            }
            if !self.namespaces.contains(&parsed.target_namespace) {
                self.namespaces.push(parsed.target_namespace.clone());
            }
            if self.root.is_none() {
                self.root = Some(parsed);
            }
        }
        Ok(())
    }

    /// Resolve all references and build the schema
    pub fn build(mut self) -> Result<XsdSchema> {
        while !self.discovered_imports.is_empty() {
            let discovered = std::mem::take(&mut self.discovered_imports);
            for work in discovered {
                if let Some(namespace) = &work.expected_namespace {
                    if self.namespaces.contains(namespace) {
                        continue;
                    }
                }
                self.process(work)?;
            }
        }

        let root = self
            .root
            .take()
            .ok_or_else(|| SchemaError::MalformedSchema("no schema document loaded".to_string()))?;

        let mut resolver = Resolver::new(&mut self.globals, &self.namespaces);
        resolver.resolve()?;
        self.limits
            .check_schema_components(self.globals.component_count())?;

        debug!(
            target_namespace = root.target_namespace.as_deref().unwrap_or(""),
            elements = self.globals.elements.len(),
            types = self.globals.types.len(),
            anonymous_types = self.globals.anonymous_types.len(),
            namespaces = self.namespaces.len(),
            "built schema"
        );

        Ok(XsdSchema {
            globals: self.globals,
            target_namespace: root.target_namespace,
            default_namespace: root.default_namespace,
            prefixes: self.prefixes,
            namespaces: self.namespaces,
            limits: self.limits,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built, immutable XML Schema
#[derive(Debug, Clone)]
pub struct XsdSchema {
    globals: XsdGlobals,
    target_namespace: Option<String>,
    default_namespace: Option<String>,
    prefixes: Vec<(String, String)>,
    namespaces: Vec<Option<String>>,
    limits: Limits,
}

impl XsdSchema {
    /// Load and build a single-document schema (no imports) from a string
    pub fn from_str(source: &str) -> Result<Self> {
        SchemaBuilder::new().load_str(source)?.build()
    }

    /// Load and build a schema from a file, following includes and imports
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        SchemaBuilder::new().load_file(path)?.build()
    }

    /// Target namespace of the main document
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Default (unprefixed) namespace declared by the main document
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    /// Prefixes declared by the schema documents, main document first
    pub fn declared_prefixes(&self) -> &[(String, String)] {
        &self.prefixes
    }

    /// Target namespaces of all loaded documents
    pub fn namespaces(&self) -> &[Option<String>] {
        &self.namespaces
    }

    /// Component arena
    pub fn globals(&self) -> &XsdGlobals {
        &self.globals
    }

    /// Limits the schema was built with; encode and validate use them too
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Global element declarations in declared order
    pub fn elements(&self) -> impl Iterator<Item = &XsdElement> {
        self.globals.elements.values()
    }

    /// Look up a global element
    pub fn element(&self, name: &QName) -> Option<&XsdElement> {
        self.globals.element(name)
    }

    /// Encode a value tree into a document
    pub fn encode(
        &self,
        value: &Value,
        prefixes: &PrefixTable,
        options: &EncodeOptions,
    ) -> Result<Document> {
        encode(self, value, prefixes, options)
    }

    /// Validate a document, failing with every violation found
    pub fn validate(&self, doc: &Document) -> Result<()> {
        self.validation_report(doc).into_result()
    }

    /// Validate a document and return the full report
    pub fn validation_report(&self, doc: &Document) -> ValidationReport {
        validate_document(self, doc)
    }

    /// Check if a document is valid
    pub fn is_valid(&self, doc: &Document) -> bool {
        self.validation_report(doc).is_valid()
    }
}

// =============================================================================
// Reference resolution
// =============================================================================

/// Resolves references and derivations of a freshly loaded arena
struct Resolver<'g> {
    globals: &'g mut XsdGlobals,
    namespaces: &'g [Option<String>],
    simple_done: HashSet<TypeRef>,
    complex_done: HashSet<TypeRef>,
}

impl<'g> Resolver<'g> {
    fn new(globals: &'g mut XsdGlobals, namespaces: &'g [Option<String>]) -> Self {
        let builtins: HashSet<TypeRef> = globals
            .types
            .keys()
            .filter(|name| name.is_xsd())
            .map(|name| TypeRef::Named(name.clone()))
            .collect();
        Self {
            globals,
            namespaces,
            simple_done: builtins.clone(),
            complex_done: builtins,
        }
    }

    fn resolve(&mut self) -> Result<()> {
        self.resolve_attribute_groups()?;
        self.resolve_group_references()?;
        self.check_references()?;
        self.resolve_substitution_groups()?;
        for type_ref in self.all_type_refs() {
            if self.globals.simple_type(&type_ref).is_some() {
                self.resolve_simple(&type_ref, &mut Vec::new())?;
            }
        }
        for type_ref in self.all_type_refs() {
            if self.globals.complex_type(&type_ref).is_some() {
                self.resolve_complex(&type_ref, &mut Vec::new())?;
            }
        }
        self.check_substitution_groups()
    }

    fn all_type_refs(&self) -> Vec<TypeRef> {
        self.globals
            .types
            .keys()
            .filter(|name| !name.is_xsd())
            .map(|name| TypeRef::Named(name.clone()))
            .chain((0..self.globals.anonymous_types.len()).map(TypeRef::Anonymous))
            .collect()
    }

    /// Error for a name that does not resolve
    fn missing(&self, kind: &'static str, name: &QName) -> Error {
        if !self.namespaces.contains(&name.namespace) {
            SchemaError::UnresolvedNamespace {
                namespace: name.namespace.clone().unwrap_or_default(),
                reference: name.to_string(),
            }
            .into()
        } else {
            SchemaError::UnresolvedReference {
                kind,
                name: name.to_string(),
            }
            .into()
        }
    }

    fn check_type(&self, type_ref: &TypeRef) -> Result<()> {
        match type_ref {
            TypeRef::Named(name) if !self.globals.types.contains_key(name) => {
                Err(self.missing("type", name))
            }
            _ => Ok(()),
        }
    }

    // -------------------------------------------------------------------------
    // Attributes
    // -------------------------------------------------------------------------

    /// Fill attribute references, flatten attribute groups into their users
    fn resolve_attribute_groups(&mut self) -> Result<()> {
        let names: Vec<QName> = self.globals.attribute_groups.keys().cloned().collect();
        let mut flattened: IndexMap<QName, (AttributeUses, Option<Wildcard>)> = IndexMap::new();
        for name in &names {
            self.flatten_attribute_group(name, &mut flattened, &mut Vec::new())?;
        }
        for (name, (attributes, any_attribute)) in &flattened {
            if let Some(group) = self.globals.attribute_groups.get_mut(name) {
                group.attributes = attributes.clone();
                group.attribute_groups.clear();
                group.any_attribute = any_attribute.clone();
            }
        }

        for type_ref in self.all_type_refs() {
            let Some(XsdType::Complex(complex)) = self.globals.get_type(&type_ref) else {
                continue;
            };
            let mut complex = complex.clone();
            let mut attributes = self.fill_references(&complex.attributes)?;
            let mut any_attribute = complex.any_attribute.clone();
            for group_name in &complex.attribute_groups {
                let (group_attributes, group_any) = flattened
                    .get(group_name)
                    .ok_or_else(|| self.missing("attribute group", group_name))?;
                merge_attributes(&mut attributes, group_attributes)?;
                any_attribute = intersect_wildcards(any_attribute, group_any.clone());
            }
            for attr_use in attributes.values() {
                self.check_type(&attr_use.attribute.type_ref)?;
            }
            complex.attributes = attributes;
            complex.attribute_groups.clear();
            complex.any_attribute = any_attribute;
            if let Some(slot) = self.globals.get_type_mut(&type_ref) {
                *slot = XsdType::Complex(complex);
            }
        }

        for attribute in self.globals.attributes.values() {
            self.check_type(&attribute.type_ref)?;
        }
        Ok(())
    }

    fn flatten_attribute_group(
        &self,
        name: &QName,
        flattened: &mut IndexMap<QName, (AttributeUses, Option<Wildcard>)>,
        stack: &mut Vec<QName>,
    ) -> Result<()> {
        if flattened.contains_key(name) {
            return Ok(());
        }
        if stack.contains(name) {
            return Err(SchemaError::MalformedSchema(format!(
                "circular attribute group reference '{}'",
                name
            ))
            .into());
        }
        let group = self
            .globals
            .attribute_groups
            .get(name)
            .ok_or_else(|| self.missing("attribute group", name))?;
        stack.push(name.clone());
        let mut attributes = self.fill_references(&group.attributes)?;
        let mut any_attribute = group.any_attribute.clone();
        for nested in &group.attribute_groups {
            self.flatten_attribute_group(nested, flattened, stack)?;
            if let Some((nested_attributes, nested_any)) = flattened.get(nested) {
                merge_attributes(&mut attributes, nested_attributes)?;
                any_attribute = intersect_wildcards(any_attribute, nested_any.clone());
            }
        }
        stack.pop();
        flattened.insert(name.clone(), (attributes, any_attribute));
        Ok(())
    }

    /// Copy type and value constraints of referenced global attributes
    fn fill_references(&self, uses: &AttributeUses) -> Result<AttributeUses> {
        let mut filled = uses.clone();
        for attr_use in filled.values_mut() {
            if let Some(reference) = &attr_use.reference {
                let global = self
                    .globals
                    .attributes
                    .get(reference)
                    .ok_or_else(|| self.missing("attribute", reference))?;
                attr_use.attribute.type_ref = global.type_ref.clone();
                if attr_use.attribute.fixed.is_none() {
                    attr_use.attribute.fixed = global.fixed.clone();
                }
                if attr_use.attribute.default.is_none() && attr_use.attribute.fixed.is_none() {
                    attr_use.attribute.default = global.default.clone();
                }
            }
        }
        Ok(filled)
    }

    // -------------------------------------------------------------------------
    // Model groups
    // -------------------------------------------------------------------------

    /// Replace every group reference by a copy of the referenced group
    fn resolve_group_references(&mut self) -> Result<()> {
        let originals = self.globals.groups.clone();
        for (name, group) in self.globals.groups.iter_mut() {
            let mut stack = vec![name.clone()];
            expand_group(&mut group.model, &originals, &mut stack, self.namespaces)?;
        }
        for type_ref in self.all_type_refs() {
            if let Some(XsdType::Complex(complex)) = self.globals.get_type_mut(&type_ref) {
                if let ContentModel::Group { group, .. } = &mut complex.content {
                    expand_group(group, &originals, &mut Vec::new(), self.namespaces)?;
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reference checks
    // -------------------------------------------------------------------------

    fn check_references(&self) -> Result<()> {
        for element in self.globals.elements.values() {
            self.check_type(&element.type_ref)?;
            if let Some(head) = &element.substitution_group {
                if !self.globals.elements.contains_key(head) {
                    return Err(self.missing("element", head));
                }
            }
        }
        for type_ref in self.all_type_refs() {
            match self.globals.get_type(&type_ref) {
                Some(XsdType::Simple(simple)) => match &simple.derivation {
                    SimpleDerivation::Builtin(_) => {}
                    SimpleDerivation::Restriction(base) | SimpleDerivation::List(base) => {
                        self.check_type(base)?
                    }
                    SimpleDerivation::Union(members) => {
                        for member in members {
                            self.check_type(member)?;
                        }
                    }
                },
                Some(XsdType::Complex(complex)) => {
                    if let Some((_, base)) = &complex.base {
                        self.check_type(base)?;
                    }
                    if let ContentModel::SimpleContent(content) = &complex.content {
                        self.check_type(content)?;
                    }
                    if let ContentModel::Group { group, .. } = &complex.content {
                        self.check_model(group)?;
                    }
                }
                None => {}
            }
        }
        for group in self.globals.groups.values() {
            self.check_model(&group.model)?;
        }
        self.check_identities()
    }

    /// Identity constraint names are unique and every keyref refers to a key or unique
    fn check_identities(&self) -> Result<()> {
        let mut identities: IndexMap<&QName, &XsdIdentity> = IndexMap::new();
        for identity in self.globals.identity_constraints() {
            match identities.get(&identity.name) {
                // the same declaration, copied with its group
                Some(existing) if *existing == identity => {}
                Some(_) => {
                    return Err(SchemaError::MalformedSchema(format!(
                        "duplicate identity constraint '{}'",
                        identity.name
                    ))
                    .into())
                }
                None => {
                    identities.insert(&identity.name, identity);
                }
            }
        }
        for identity in identities.values() {
            let Some(refer) = &identity.refer else {
                continue;
            };
            let target = identities
                .get(refer)
                .filter(|target| target.kind != IdentityKind::Keyref)
                .ok_or_else(|| self.missing("identity constraint", refer))?;
            if target.fields.len() != identity.fields.len() {
                return Err(SchemaError::MalformedSchema(format!(
                    "keyref '{}' has {} fields but '{}' has {}",
                    identity.name,
                    identity.fields.len(),
                    target.name,
                    target.fields.len()
                ))
                .into());
            }
        }
        Ok(())
    }

    fn check_model(&self, group: &ModelGroup) -> Result<()> {
        for particle in &group.particles {
            match &particle.term {
                Term::Element(element) => self.check_type(&element.type_ref)?,
                Term::ElementRef(name) => {
                    if !self.globals.elements.contains_key(name) {
                        return Err(self.missing("element", name));
                    }
                }
                Term::Group(nested) => self.check_model(nested)?,
                Term::GroupRef(name) => return Err(self.missing("group", name)),
                Term::Any(_) => {}
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Substitution groups
    // -------------------------------------------------------------------------

    /// Default member types to their head's type and register the groups
    fn resolve_substitution_groups(&mut self) -> Result<()> {
        let names: Vec<QName> = self.globals.elements.keys().cloned().collect();
        for name in &names {
            let mut current = name.clone();
            let mut type_ref = None;
            for _ in 0..=names.len() {
                let Some(element) = self.globals.elements.get(&current) else {
                    break;
                };
                match &element.substitution_group {
                    Some(head) if !element.explicit_type => current = head.clone(),
                    _ => {
                        type_ref = Some(element.type_ref.clone());
                        break;
                    }
                }
            }
            let type_ref = type_ref.ok_or_else(|| {
                SchemaError::MalformedSchema(format!("circular substitution group at '{}'", name))
            })?;
            if let Some(element) = self.globals.elements.get_mut(name) {
                element.type_ref = type_ref;
            }
        }

        let mut groups: IndexMap<QName, Vec<QName>> = IndexMap::new();
        for element in self.globals.elements.values() {
            if let Some(head) = &element.substitution_group {
                groups
                    .entry(head.clone())
                    .or_default()
                    .push(element.name.clone());
            }
        }
        self.globals.substitution_groups = groups;
        Ok(())
    }

    fn check_substitution_groups(&self) -> Result<()> {
        for (head, members) in &self.globals.substitution_groups {
            let Some(head_decl) = self.globals.elements.get(head) else {
                continue;
            };
            for member in members {
                let Some(member_decl) = self.globals.elements.get(member) else {
                    continue;
                };
                if !self
                    .globals
                    .is_derived_from(&member_decl.type_ref, &head_decl.type_ref)
                {
                    return Err(SchemaError::InvalidSubstitutionGroupMember {
                        member: member.to_string(),
                        head: head.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Simple types
    // -------------------------------------------------------------------------

    /// Compute the effective variety and facets of a simple type
    fn resolve_simple(&mut self, type_ref: &TypeRef, stack: &mut Vec<TypeRef>) -> Result<()> {
        if self.simple_done.contains(type_ref) {
            return Ok(());
        }
        if stack.contains(type_ref) {
            return Err(SchemaError::MalformedSchema(format!(
                "circular simple type derivation at '{}'",
                self.globals.type_name(type_ref)
            ))
            .into());
        }
        let Some(simple) = self.globals.simple_type(type_ref).cloned() else {
            return Ok(());
        };
        stack.push(type_ref.clone());
        let resolved = match &simple.derivation {
            SimpleDerivation::Restriction(base) => {
                self.resolve_simple(base, stack)?;
                let base_type = self.globals.simple_type(base).ok_or_else(|| {
                    SchemaError::MalformedSchema(format!(
                        "simple type '{}' restricts the complex type '{}'",
                        self.globals.type_name(type_ref),
                        base
                    ))
                })?;
                XsdSimpleType {
                    variety: base_type.variety.clone(),
                    facets: base_type.facets.restrict(&simple.local_facets),
                    ..simple
                }
            }
            SimpleDerivation::List(item) => {
                self.resolve_simple(item, stack)?;
                if self.globals.simple_type(item).is_none() {
                    return Err(SchemaError::MalformedSchema(format!(
                        "list item type '{}' is not a simple type",
                        item
                    ))
                    .into());
                }
                simple
            }
            SimpleDerivation::Union(members) => {
                for member in members {
                    self.resolve_simple(member, stack)?;
                }
                simple
            }
            SimpleDerivation::Builtin(_) => simple,
        };
        stack.pop();
        if let Some(slot) = self.globals.get_type_mut(type_ref) {
            *slot = XsdType::Simple(resolved);
        }
        self.simple_done.insert(type_ref.clone());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Complex types
    // -------------------------------------------------------------------------

    /// Apply the derivation of a complex type to its content and attributes
    fn resolve_complex(&mut self, type_ref: &TypeRef, stack: &mut Vec<TypeRef>) -> Result<()> {
        if self.complex_done.contains(type_ref) {
            return Ok(());
        }
        if stack.contains(type_ref) {
            return Err(SchemaError::MalformedSchema(format!(
                "circular complex type derivation at '{}'",
                self.globals.type_name(type_ref)
            ))
            .into());
        }
        let Some(mut complex) = self.globals.complex_type(type_ref).cloned() else {
            return Ok(());
        };
        stack.push(type_ref.clone());

        if let Some((method, base)) = complex.base.clone() {
            self.resolve_complex(&base, stack)?;
            let base_complex = self.globals.complex_type(&base).cloned();
            let is_simple_content = complex.content.is_simple();

            match (&base_complex, is_simple_content) {
                // simpleContent deriving from a simple type
                (None, true) => {
                    if method == Derivation::Restriction {
                        return Err(SchemaError::MalformedSchema(format!(
                            "simpleContent restriction of '{}' needs a complex base type",
                            self.globals.type_name(type_ref)
                        ))
                        .into());
                    }
                    complex.content = ContentModel::SimpleContent(base.clone());
                }
                (None, false) => {
                    return Err(SchemaError::MalformedSchema(format!(
                        "complexContent of '{}' derives from the simple type '{}'",
                        self.globals.type_name(type_ref),
                        base
                    ))
                    .into())
                }
                (Some(base_complex), true) => {
                    let content_type = match (&base_complex.content, complex.simple_content_type()) {
                        // restriction with an inline simpleType
                        (_, Some(own)) if *own != base => own.clone(),
                        (ContentModel::SimpleContent(inherited), _) => inherited.clone(),
                        _ => {
                            return Err(SchemaError::MalformedSchema(format!(
                                "simpleContent of '{}' derives from '{}', which has no simple content",
                                self.globals.type_name(type_ref),
                                base
                            ))
                            .into())
                        }
                    };
                    complex.content = match complex.content_facets.take() {
                        Some(facets) if !facets.is_empty() => {
                            let restricted = XsdSimpleType::restriction(None, content_type, facets);
                            let anonymous = self.globals.add_anonymous(XsdType::Simple(restricted));
                            self.resolve_simple(&anonymous, &mut Vec::new())?;
                            ContentModel::SimpleContent(anonymous)
                        }
                        _ => ContentModel::SimpleContent(content_type),
                    };
                    complex.attributes =
                        derive_attributes(&base_complex.attributes, &complex.attributes, method);
                    if method == Derivation::Extension || complex.any_attribute.is_none() {
                        complex.any_attribute = complex
                            .any_attribute
                            .clone()
                            .or_else(|| base_complex.any_attribute.clone());
                    }
                }
                (Some(base_complex), false) => {
                    if method == Derivation::Extension {
                        complex.content = extend_content(&base_complex.content, complex.content.clone());
                        complex.mixed = complex.mixed || base_complex.mixed;
                        complex.any_attribute = complex
                            .any_attribute
                            .clone()
                            .or_else(|| base_complex.any_attribute.clone());
                    }
                    complex.attributes =
                        derive_attributes(&base_complex.attributes, &complex.attributes, method);
                }
            }
        } else {
            complex.attributes.retain(|_, attr_use| !attr_use.prohibited);
        }

        stack.pop();
        if let Some(slot) = self.globals.get_type_mut(type_ref) {
            *slot = XsdType::Complex(complex);
        }
        self.complex_done.insert(type_ref.clone());
        Ok(())
    }
}

/// Expand group references in place
fn expand_group(
    group: &mut ModelGroup,
    originals: &GroupMap,
    stack: &mut Vec<QName>,
    namespaces: &[Option<String>],
) -> Result<()> {
    for particle in group.particles.iter_mut() {
        match &mut particle.term {
            Term::GroupRef(name) => {
                if stack.contains(name) {
                    return Err(SchemaError::MalformedSchema(format!(
                        "circular group reference '{}'",
                        name
                    ))
                    .into());
                }
                let referenced = originals.get(name).ok_or_else(|| -> Error {
                    if namespaces.contains(&name.namespace) {
                        SchemaError::UnresolvedReference {
                            kind: "group",
                            name: name.to_string(),
                        }
                        .into()
                    } else {
                        SchemaError::UnresolvedNamespace {
                            namespace: name.namespace.clone().unwrap_or_default(),
                            reference: name.to_string(),
                        }
                        .into()
                    }
                })?;
                let mut model = referenced.model.clone();
                stack.push(name.clone());
                expand_group(&mut model, originals, stack, namespaces)?;
                stack.pop();
                particle.term = Term::Group(model);
            }
            Term::Group(nested) => expand_group(nested, originals, stack, namespaces)?,
            _ => {}
        }
    }
    Ok(())
}

/// Content of an extension: base content followed by the extension's own
fn extend_content(base: &ContentModel, own: ContentModel) -> ContentModel {
    match (base, own) {
        (ContentModel::Empty, own) => own,
        (base, ContentModel::Empty) => base.clone(),
        (ContentModel::Any, _) => ContentModel::Any,
        (
            ContentModel::Group {
                group: base_group,
                occurs: base_occurs,
            },
            ContentModel::Group { group, occurs },
        ) => ContentModel::group(ModelGroup::new(
            Compositor::Sequence,
            vec![
                Particle::new(Term::Group(base_group.clone()), *base_occurs),
                Particle::new(Term::Group(group), occurs),
            ],
        )),
        (_, own) => own,
    }
}

/// Attribute uses of a derived type
fn derive_attributes(base: &AttributeUses, own: &AttributeUses, method: Derivation) -> AttributeUses {
    let mut attributes = base.clone();
    for (name, attr_use) in own {
        if attr_use.prohibited {
            if method == Derivation::Restriction {
                attributes.shift_remove(name);
            }
        } else {
            attributes.insert(name.clone(), attr_use.clone());
        }
    }
    attributes
}

fn merge_attributes(target: &mut AttributeUses, source: &AttributeUses) -> Result<()> {
    for (name, attr_use) in source {
        if target.contains_key(name) {
            return Err(SchemaError::MalformedSchema(format!(
                "duplicate attribute use '{}'",
                name
            ))
            .into());
        }
        target.insert(name.clone(), attr_use.clone());
    }
    Ok(())
}

fn intersect_wildcards(a: Option<Wildcard>, b: Option<Wildcard>) -> Option<Wildcard> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.intersect(&b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builtins::PrimitiveKind;
    use crate::validators::simple_types::Variety;
    use std::io::Write;

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn schema(body: &str) -> Result<XsdSchema> {
        XsdSchema::from_str(&format!(
            r#"<xs:schema {} xmlns:t="urn:t" targetNamespace="urn:t" elementFormDefault="qualified">{}</xs:schema>"#,
            XS, body
        ))
    }

    fn t(local: &str) -> QName {
        QName::namespaced("urn:t", local)
    }

    #[test]
    fn test_schema_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<XsdSchema>();
    }

    #[test]
    fn test_forward_references() {
        let schema = schema(
            r#"<xs:element name="root" type="t:Root"/>
               <xs:complexType name="Root">
                 <xs:sequence><xs:element ref="t:child"/></xs:sequence>
               </xs:complexType>
               <xs:element name="child" type="xs:string"/>"#,
        )
        .unwrap();
        assert_eq!(schema.target_namespace(), Some("urn:t"));
        assert_eq!(schema.elements().count(), 2);
    }

    #[test]
    fn test_unresolved_reference() {
        let err = schema(r#"<xs:element name="root" type="t:Missing"/>"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::UnresolvedReference { kind: "type", .. })
        ));
    }

    #[test]
    fn test_unresolved_namespace() {
        let err = XsdSchema::from_str(&format!(
            r#"<xs:schema {} xmlns:o="urn:other"><xs:element name="a" type="o:T"/></xs:schema>"#,
            XS
        ))
        .unwrap_err();
        match err {
            Error::Schema(SchemaError::UnresolvedNamespace { namespace, .. }) => {
                assert_eq!(namespace, "urn:other")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_import_resolves_namespace() {
        let main = format!(
            r#"<xs:schema {} xmlns:o="urn:other" targetNamespace="urn:main">
                 <xs:import namespace="urn:other"/>
                 <xs:element name="a" type="o:T"/>
               </xs:schema>"#,
            XS
        );
        let other = format!(
            r#"<xs:schema {} targetNamespace="urn:other">
                 <xs:simpleType name="T"><xs:restriction base="xs:int"/></xs:simpleType>
               </xs:schema>"#,
            XS
        );
        let schema = SchemaBuilder::new()
            .load_str(&main)
            .unwrap()
            .import_str("urn:other", &other)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(schema.namespaces().len(), 3);

        let wrong = SchemaBuilder::new()
            .load_str(&main)
            .unwrap()
            .import_str("urn:else", &other);
        assert!(wrong.is_err());
    }

    #[test]
    fn test_simple_type_facets_accumulate() {
        let schema = schema(
            r#"<xs:simpleType name="Small">
                 <xs:restriction base="t:Positive"><xs:maxInclusive value="10"/></xs:restriction>
               </xs:simpleType>
               <xs:simpleType name="Positive">
                 <xs:restriction base="xs:integer"><xs:minInclusive value="1"/></xs:restriction>
               </xs:simpleType>"#,
        )
        .unwrap();
        let small = schema
            .globals()
            .simple_type(&TypeRef::Named(t("Small")))
            .unwrap();
        assert_eq!(small.variety, Variety::Atomic(PrimitiveKind::Integer));
        assert_eq!(small.facets.min_inclusive.as_deref(), Some("1"));
        assert_eq!(small.facets.max_inclusive.as_deref(), Some("10"));
        assert!(small.validate_text("11", schema.globals()).is_err());
    }

    #[test]
    fn test_complex_extension_and_attribute_groups() {
        let schema = schema(
            r#"<xs:attributeGroup name="common">
                 <xs:attribute name="lang" type="xs:language"/>
               </xs:attributeGroup>
               <xs:complexType name="Base">
                 <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
                 <xs:attribute name="id" type="xs:ID"/>
               </xs:complexType>
               <xs:complexType name="Derived">
                 <xs:complexContent>
                   <xs:extension base="t:Base">
                     <xs:sequence><xs:element name="b" type="xs:string"/></xs:sequence>
                     <xs:attributeGroup ref="t:common"/>
                   </xs:extension>
                 </xs:complexContent>
               </xs:complexType>"#,
        )
        .unwrap();
        let derived = schema
            .globals()
            .complex_type(&TypeRef::Named(t("Derived")))
            .unwrap();
        let names: Vec<&str> = derived
            .attributes
            .keys()
            .map(|n| n.local_name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "lang"]);
        let ContentModel::Group { group, .. } = &derived.content else {
            panic!("expected group content");
        };
        assert_eq!(group.particles.len(), 2);
        assert!(schema.globals().is_derived_from(
            &TypeRef::Named(t("Derived")),
            &TypeRef::Named(t("Base"))
        ));
    }

    #[test]
    fn test_simple_content_restriction() {
        let schema = schema(
            r#"<xs:complexType name="Amount">
                 <xs:simpleContent>
                   <xs:extension base="xs:decimal">
                     <xs:attribute name="currency" type="xs:string" use="required"/>
                   </xs:extension>
                 </xs:simpleContent>
               </xs:complexType>
               <xs:complexType name="SmallAmount">
                 <xs:simpleContent>
                   <xs:restriction base="t:Amount"><xs:maxInclusive value="100"/></xs:restriction>
                 </xs:simpleContent>
               </xs:complexType>"#,
        )
        .unwrap();
        let globals = schema.globals();
        let small = globals.complex_type(&TypeRef::Named(t("SmallAmount"))).unwrap();
        let content = globals
            .simple_type(small.simple_content_type().unwrap())
            .unwrap();
        assert!(content.validate_text("99.5", globals).is_ok());
        assert!(content.validate_text("101", globals).is_err());
        assert!(small.attributes[&QName::local("currency")].required);
    }

    #[test]
    fn test_group_reference_expanded() {
        let schema = schema(
            r#"<xs:group name="pair">
                 <xs:sequence>
                   <xs:element name="x" type="xs:int"/>
                   <xs:element name="y" type="xs:int"/>
                 </xs:sequence>
               </xs:group>
               <xs:complexType name="Point"><xs:group ref="t:pair"/></xs:complexType>"#,
        )
        .unwrap();
        let point = schema
            .globals()
            .complex_type(&TypeRef::Named(t("Point")))
            .unwrap();
        let ContentModel::Group { group, .. } = &point.content else {
            panic!("expected group content");
        };
        assert!(matches!(group.particles[0].term, Term::Group(_)));
    }

    #[test]
    fn test_substitution_group_membership() {
        let schema = schema(
            r#"<xs:element name="head" type="xs:string" abstract="true"/>
               <xs:element name="first" substitutionGroup="t:head"/>
               <xs:element name="second" type="xs:token" substitutionGroup="t:head"/>"#,
        )
        .unwrap();
        let globals = schema.globals();
        assert_eq!(
            globals.substitution_groups[&t("head")],
            vec![t("first"), t("second")]
        );
        assert_eq!(globals.elements[&t("first")].type_ref, TypeRef::xsd("string"));

        let err = self::schema(
            r#"<xs:element name="head" type="xs:int" abstract="true"/>
               <xs:element name="bad" type="xs:string" substitutionGroup="t:head"/>"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::InvalidSubstitutionGroupMember { .. })
        ));
    }

    #[test]
    fn test_load_file_follows_include_and_import() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: String| {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(text.as_bytes()).unwrap();
        };
        write(
            "main.xsd",
            format!(
                r#"<xs:schema {} xmlns:o="urn:o" targetNamespace="urn:m">
                     <xs:include schemaLocation="part.xsd"/>
                     <xs:import namespace="urn:o" schemaLocation="sub/other.xsd"/>
                     <xs:element name="root" type="o:T"/>
                   </xs:schema>"#,
                XS
            ),
        );
        write(
            "part.xsd",
            format!(r#"<xs:schema {}><xs:element name="extra" type="xs:int"/></xs:schema>"#, XS),
        );
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        write(
            "sub/other.xsd",
            format!(
                r#"<xs:schema {} targetNamespace="urn:o"><xs:simpleType name="T"><xs:restriction base="xs:string"/></xs:simpleType></xs:schema>"#,
                XS
            ),
        );

        let schema = XsdSchema::from_file(dir.path().join("main.xsd")).unwrap();
        assert!(schema.element(&QName::namespaced("urn:m", "extra")).is_some());
        assert!(schema
            .globals()
            .types
            .contains_key(&QName::namespaced("urn:o", "T")));
    }

    #[test]
    fn test_schema_depth_limit() {
        let limits = Limits {
            max_schema_depth: 0,
            ..Limits::default()
        };
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.xsd"),
            format!(r#"<xs:schema {}><xs:include schemaLocation="b.xsd"/></xs:schema>"#, XS),
        )
        .unwrap();
        std::fs::write(dir.path().join("b.xsd"), format!(r#"<xs:schema {}/>"#, XS)).unwrap();
        let result = SchemaBuilder::new()
            .with_limits(limits)
            .load_file(dir.path().join("a.xsd"));
        assert!(matches!(result, Err(Error::LimitExceeded(_))));
    }
}
