//! XSD Document Parsing
//!
//! Reads one XSD document into the [`XsdGlobals`] arena. References between
//! components are recorded by name only; they are checked and resolved when
//! the schema is built, once every document of the load session is present.
//!
//! Includes and imports are not followed here. Their locations are returned
//! in the [`ParsedDocument`] so the builder can schedule them.

use crate::error::{Result, SchemaError};
use crate::names::{split_qname, validate_ncname};
use crate::namespaces::QName;
use crate::validators::attributes::{AttributeUse, AttributeUses, XsdAttribute, XsdAttributeGroup};
use crate::validators::complex_types::{ContentModel, Derivation, XsdComplexType};
use crate::validators::elements::XsdElement;
use crate::validators::facets::FacetSet;
use crate::validators::globals::{TypeRef, XsdGlobals, XsdType};
use crate::validators::identities::{IdentityKind, IdentityPath, XsdIdentity};
use crate::validators::groups::{Compositor, ModelGroup, Particle, Term, XsdGroup};
use crate::validators::particles::parse_occurs;
use crate::validators::simple_types::XsdSimpleType;
use crate::validators::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
use crate::{XML_NAMESPACE, XSD_NAMESPACE};
use roxmltree::Node;
use tracing::{trace, warn};

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const GROUP: &str = "group";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const ANNOTATION: &str = "annotation";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const ANY: &str = "any";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const NOTATION: &str = "notation";
    pub const KEY: &str = "key";
    pub const KEYREF: &str = "keyref";
    pub const UNIQUE: &str = "unique";
    pub const SELECTOR: &str = "selector";
    pub const FIELD: &str = "field";
}

/// XSD attribute names
mod xsd_attrs {
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const TARGET_NAMESPACE: &str = "targetNamespace";
    pub const ELEMENT_FORM_DEFAULT: &str = "elementFormDefault";
    pub const ATTRIBUTE_FORM_DEFAULT: &str = "attributeFormDefault";
    pub const FORM: &str = "form";
    pub const NILLABLE: &str = "nillable";
    pub const DEFAULT: &str = "default";
    pub const FIXED: &str = "fixed";
    pub const BASE: &str = "base";
    pub const VALUE: &str = "value";
    pub const MIXED: &str = "mixed";
    pub const ABSTRACT: &str = "abstract";
    pub const SUBSTITUTION_GROUP: &str = "substitutionGroup";
    pub const NAMESPACE: &str = "namespace";
    pub const SCHEMA_LOCATION: &str = "schemaLocation";
    pub const ITEM_TYPE: &str = "itemType";
    pub const MEMBER_TYPES: &str = "memberTypes";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const USE: &str = "use";
    pub const PROCESS_CONTENTS: &str = "processContents";
    pub const XPATH: &str = "xpath";
    pub const REFER: &str = "refer";
}

/// XSD 1.1 and redefinition constructs this engine refuses
const UNSUPPORTED_CONSTRUCTS: &[&str] = &[
    "redefine",
    "override",
    "assert",
    "assertion",
    "alternative",
    "openContent",
    "defaultOpenContent",
    "explicitTimezone",
];

/// An `xs:import` found in a schema document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    /// Imported namespace (None for no-namespace components)
    pub namespace: Option<String>,
    /// Location hint
    pub schema_location: Option<String>,
}

/// Document-level facts collected while parsing
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Effective target namespace (the includer's, for chameleon includes)
    pub target_namespace: Option<String>,
    /// Unprefixed namespace declared on xs:schema, unless it is the XSD namespace
    pub default_namespace: Option<String>,
    /// Prefixed namespace declarations of xs:schema, in document order
    pub prefixes: Vec<(String, String)>,
    /// xs:include locations
    pub includes: Vec<String>,
    /// xs:import directives
    pub imports: Vec<ImportDirective>,
}

/// Parse an XSD document into `globals`.
///
/// `including_namespace` is the target namespace of the including document
/// for `xs:include`d documents: a document without `targetNamespace` adopts
/// it, a document with a different one is rejected.
pub fn parse_schema_document(
    text: &str,
    globals: &mut XsdGlobals,
    including_namespace: Option<Option<&str>>,
) -> Result<ParsedDocument> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(text, options)?;
    let root = doc.root_element();
    if !is_xsd(root, xsd_elements::SCHEMA) {
        return Err(SchemaError::MalformedSchema(format!(
            "expected xs:schema root element, got {}",
            root.tag_name().name()
        ))
        .into());
    }

    let declared = root
        .attribute(xsd_attrs::TARGET_NAMESPACE)
        .filter(|ns| !ns.is_empty())
        .map(String::from);
    let mut chameleon = None;
    let target_namespace = match including_namespace {
        Some(including) if declared.is_none() => {
            chameleon = including.map(String::from);
            chameleon.clone()
        }
        Some(including) if declared.as_deref() != including => {
            return Err(SchemaError::MalformedSchema(format!(
                "included schema has targetNamespace '{}', expected '{}'",
                declared.unwrap_or_default(),
                including.unwrap_or("")
            ))
            .into())
        }
        _ => declared,
    };

    let mut parsed = ParsedDocument {
        target_namespace: target_namespace.clone(),
        ..ParsedDocument::default()
    };
    for ns in root.namespaces() {
        match ns.name() {
            Some("xml") => {}
            Some(prefix) => parsed.prefixes.push((prefix.to_string(), ns.uri().to_string())),
            None if ns.uri() != XSD_NAMESPACE && !ns.uri().is_empty() => {
                parsed.default_namespace = Some(ns.uri().to_string())
            }
            None => {}
        }
    }

    let mut parser = SchemaParser {
        globals,
        target_namespace,
        chameleon,
        element_qualified: root.attribute(xsd_attrs::ELEMENT_FORM_DEFAULT) == Some("qualified"),
        attribute_qualified: root.attribute(xsd_attrs::ATTRIBUTE_FORM_DEFAULT)
            == Some("qualified"),
    };

    for child in xsd_children(root)? {
        match child.tag_name().name() {
            xsd_elements::INCLUDE => {
                let location = required_attribute(child, xsd_attrs::SCHEMA_LOCATION)?;
                parsed.includes.push(location.to_string());
            }
            xsd_elements::IMPORT => parsed.imports.push(ImportDirective {
                namespace: child
                    .attribute(xsd_attrs::NAMESPACE)
                    .filter(|ns| !ns.is_empty())
                    .map(String::from),
                schema_location: child.attribute(xsd_attrs::SCHEMA_LOCATION).map(String::from),
            }),
            xsd_elements::ELEMENT => {
                let element = parser.parse_global_element(child)?;
                parser.globals.insert_element(element)?;
            }
            xsd_elements::COMPLEX_TYPE => {
                let name = parser.component_name(child)?;
                let complex = parser.parse_complex_type(child, Some(name.clone()))?;
                parser.globals.insert_type(name, XsdType::Complex(complex))?;
            }
            xsd_elements::SIMPLE_TYPE => {
                let name = parser.component_name(child)?;
                let simple = parser.parse_simple_type(child, Some(name.clone()))?;
                parser.globals.insert_type(name, XsdType::Simple(simple))?;
            }
            xsd_elements::ATTRIBUTE => {
                let attribute = parser.parse_attribute(child, true)?;
                parser.globals.insert_attribute(attribute.attribute)?;
            }
            xsd_elements::ATTRIBUTE_GROUP => {
                let name = parser.component_name(child)?;
                let mut group = parser.parse_attribute_group(child)?;
                group.name = Some(name.clone());
                parser.globals.insert_attribute_group(name, group)?;
            }
            xsd_elements::GROUP => {
                let name = parser.component_name(child)?;
                let model = parser.parse_named_group(child)?;
                parser.globals.insert_group(XsdGroup { name, model })?;
            }
            xsd_elements::NOTATION => {
                warn!(
                    name = child.attribute(xsd_attrs::NAME).unwrap_or_default(),
                    "skipping xs:notation declaration"
                );
            }
            other => return Err(unexpected(other, "xs:schema")),
        }
    }

    trace!(
        target_namespace = parsed.target_namespace.as_deref().unwrap_or(""),
        includes = parsed.includes.len(),
        imports = parsed.imports.len(),
        "parsed schema document"
    );
    Ok(parsed)
}

/// Per-document parse state
struct SchemaParser<'g> {
    globals: &'g mut XsdGlobals,
    target_namespace: Option<String>,
    /// Namespace unqualified references are moved into (chameleon include)
    chameleon: Option<String>,
    element_qualified: bool,
    attribute_qualified: bool,
}

impl<'g> SchemaParser<'g> {
    /// Name of a global component, in the target namespace
    fn component_name(&self, node: Node) -> Result<QName> {
        let name = required_attribute(node, xsd_attrs::NAME)?;
        validate_ncname(name)?;
        Ok(QName::new(self.target_namespace.clone(), name))
    }

    /// Name of a local element or attribute, qualified per `form`
    fn local_name(&self, node: Node, qualified_default: bool) -> Result<QName> {
        let name = required_attribute(node, xsd_attrs::NAME)?;
        validate_ncname(name)?;
        let qualified = match node.attribute(xsd_attrs::FORM) {
            Some("qualified") => true,
            Some("unqualified") => false,
            Some(other) => {
                return Err(SchemaError::MalformedSchema(format!("invalid form '{}'", other)).into())
            }
            None => qualified_default,
        };
        Ok(if qualified {
            QName::new(self.target_namespace.clone(), name)
        } else {
            QName::local(name)
        })
    }

    /// Resolve a QName-valued attribute against the in-scope declarations
    fn resolve_qname(&self, node: Node, value: &str) -> Result<QName> {
        let (prefix, local) = split_qname(value.trim());
        validate_ncname(local)?;
        let namespace = match prefix {
            Some("xml") => Some(XML_NAMESPACE),
            Some(prefix) => Some(node.lookup_namespace_uri(Some(prefix)).ok_or_else(|| {
                SchemaError::MalformedSchema(format!(
                    "prefix '{}' of '{}' is not declared",
                    prefix, value
                ))
            })?),
            None => node.lookup_namespace_uri(None),
        };
        let namespace = namespace
            .filter(|ns| !ns.is_empty())
            .map(String::from)
            .or_else(|| self.chameleon.clone());
        Ok(QName::new(namespace, local))
    }

    fn type_attribute(&self, node: Node, name: &str) -> Result<Option<TypeRef>> {
        node.attribute(name)
            .map(|value| self.resolve_qname(node, value).map(TypeRef::Named))
            .transpose()
    }

    // =========================================================================
    // Elements
    // =========================================================================

    fn parse_global_element(&mut self, node: Node) -> Result<XsdElement> {
        if node.has_attribute(xsd_attrs::REF) {
            return Err(SchemaError::MalformedSchema(
                "a global element cannot have a ref attribute".to_string(),
            )
            .into());
        }
        let name = self.component_name(node)?;
        let mut element = self.parse_element_declaration(node, name)?.global();

        if let Some(heads) = node.attribute(xsd_attrs::SUBSTITUTION_GROUP) {
            let mut heads = heads.split_whitespace();
            if let Some(head) = heads.next() {
                element.substitution_group = Some(self.resolve_qname(node, head)?);
            }
            if heads.next().is_some() {
                return Err(unsupported("substitutionGroup with several heads", &element.name));
            }
        }
        element.is_abstract = parse_bool(node, xsd_attrs::ABSTRACT)?;
        Ok(element)
    }

    fn parse_element_declaration(&mut self, node: Node, name: QName) -> Result<XsdElement> {
        let mut inline_type = None;
        let mut identities = Vec::new();
        for child in xsd_children(node)? {
            match child.tag_name().name() {
                xsd_elements::COMPLEX_TYPE => {
                    let complex = self.parse_complex_type(child, None)?;
                    inline_type = Some(self.globals.add_anonymous(XsdType::Complex(complex)));
                }
                xsd_elements::SIMPLE_TYPE => {
                    let simple = self.parse_simple_type(child, None)?;
                    inline_type = Some(self.globals.add_anonymous(XsdType::Simple(simple)));
                }
                xsd_elements::KEY | xsd_elements::KEYREF | xsd_elements::UNIQUE => {
                    identities.push(self.parse_identity(child)?);
                }
                other => return Err(unexpected(other, "xs:element")),
            }
        }

        let declared = self.type_attribute(node, xsd_attrs::TYPE)?;
        if declared.is_some() && inline_type.is_some() {
            return Err(SchemaError::MalformedSchema(format!(
                "element '{}' has both a type attribute and an inline type",
                name
            ))
            .into());
        }
        let explicit = declared.or(inline_type);
        let mut element = XsdElement::new(
            name,
            explicit.clone().unwrap_or_else(TypeRef::any_type),
        );
        element.explicit_type = explicit.is_some();
        element.identities = identities;
        element.nillable = parse_bool(node, xsd_attrs::NILLABLE)?;
        element.default = node.attribute(xsd_attrs::DEFAULT).map(String::from);
        element.fixed = node.attribute(xsd_attrs::FIXED).map(String::from);
        if element.default.is_some() && element.fixed.is_some() {
            return Err(SchemaError::MalformedSchema(format!(
                "element '{}' has both default and fixed",
                element.name
            ))
            .into());
        }
        Ok(element)
    }

    fn parse_identity(&mut self, node: Node) -> Result<XsdIdentity> {
        let kind = IdentityKind::from_local_name(node.tag_name().name())
            .ok_or_else(|| unexpected(node.tag_name().name(), "xs:element"))?;
        let name = self.component_name(node)?;
        let resolve = |prefix: &str| node.lookup_namespace_uri(Some(prefix)).map(String::from);

        let mut selector = None;
        let mut fields = Vec::new();
        for child in xsd_children(node)? {
            let xpath = required_attribute(child, xsd_attrs::XPATH)?;
            match child.tag_name().name() {
                xsd_elements::SELECTOR if selector.is_none() && fields.is_empty() => {
                    selector = Some(IdentityPath::selector(xpath, resolve)?);
                }
                xsd_elements::FIELD if selector.is_some() => {
                    fields.push(IdentityPath::field(xpath, resolve)?);
                }
                other => return Err(unexpected(other, node.tag_name().name())),
            }
        }
        let selector = selector.ok_or_else(|| {
            SchemaError::MalformedSchema(format!("identity constraint '{}' has no selector", name))
        })?;
        if fields.is_empty() {
            return Err(SchemaError::MalformedSchema(format!(
                "identity constraint '{}' has no field",
                name
            ))
            .into());
        }

        let mut identity = XsdIdentity::new(name, kind, selector);
        identity.fields = fields;
        match (kind, node.attribute(xsd_attrs::REFER)) {
            (IdentityKind::Keyref, Some(refer)) => {
                identity = identity.with_refer(self.resolve_qname(node, refer)?);
            }
            (IdentityKind::Keyref, None) => {
                return Err(SchemaError::MalformedSchema(format!(
                    "keyref '{}' has no refer attribute",
                    identity.name
                ))
                .into())
            }
            _ => {}
        }
        trace!(name = %identity.name, kind = ?kind, "parsed identity constraint");
        Ok(identity)
    }

    /// A local element or element reference inside a model group
    fn parse_element_particle(&mut self, node: Node) -> Result<Particle> {
        let occurs = parse_occurs(
            node.attribute(xsd_attrs::MIN_OCCURS),
            node.attribute(xsd_attrs::MAX_OCCURS),
        )?;
        if let Some(reference) = node.attribute(xsd_attrs::REF) {
            let name = self.resolve_qname(node, reference)?;
            return Ok(Particle::new(Term::ElementRef(name), occurs));
        }
        let name = self.local_name(node, self.element_qualified)?;
        let element = self.parse_element_declaration(node, name)?;
        Ok(Particle::new(Term::Element(Box::new(element)), occurs))
    }

    // =========================================================================
    // Model groups
    // =========================================================================

    fn parse_named_group(&mut self, node: Node) -> Result<ModelGroup> {
        let mut model = None;
        for child in xsd_children(node)? {
            match child.tag_name().name() {
                name @ (xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL)
                    if model.is_none() =>
                {
                    let compositor = Compositor::from_local_name(name)
                        .ok_or_else(|| unexpected(name, "xs:group"))?;
                    model = Some(self.parse_model_group(child, compositor)?);
                }
                other => return Err(unexpected(other, "xs:group")),
            }
        }
        model.ok_or_else(|| {
            SchemaError::MalformedSchema("xs:group without a model group".to_string()).into()
        })
    }

    fn parse_model_group(&mut self, node: Node, compositor: Compositor) -> Result<ModelGroup> {
        let mut particles = Vec::new();
        for child in xsd_children(node)? {
            let particle = match child.tag_name().name() {
                xsd_elements::ELEMENT => self.parse_element_particle(child)?,
                xsd_elements::GROUP => self.parse_group_reference(child)?,
                name @ (xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL) => {
                    let nested = Compositor::from_local_name(name)
                        .ok_or_else(|| unexpected(name, "model group"))?;
                    let occurs = parse_occurs(
                        child.attribute(xsd_attrs::MIN_OCCURS),
                        child.attribute(xsd_attrs::MAX_OCCURS),
                    )?;
                    Particle::new(Term::Group(self.parse_model_group(child, nested)?), occurs)
                }
                xsd_elements::ANY => {
                    let occurs = parse_occurs(
                        child.attribute(xsd_attrs::MIN_OCCURS),
                        child.attribute(xsd_attrs::MAX_OCCURS),
                    )?;
                    Particle::new(Term::Any(self.parse_wildcard(child)?), occurs)
                }
                other => return Err(unexpected(other, &format!("xs:{}", compositor))),
            };
            if compositor == Compositor::All && particle.occurs.max.map_or(true, |max| max > 1) {
                return Err(SchemaError::MalformedSchema(
                    "particles of xs:all may occur at most once".to_string(),
                )
                .into());
            }
            particles.push(particle);
        }
        Ok(ModelGroup::new(compositor, particles))
    }

    fn parse_group_reference(&self, node: Node) -> Result<Particle> {
        let reference = required_attribute(node, xsd_attrs::REF)?;
        let occurs = parse_occurs(
            node.attribute(xsd_attrs::MIN_OCCURS),
            node.attribute(xsd_attrs::MAX_OCCURS),
        )?;
        Ok(Particle::new(
            Term::GroupRef(self.resolve_qname(node, reference)?),
            occurs,
        ))
    }

    fn parse_wildcard(&self, node: Node) -> Result<Wildcard> {
        for attr in ["notNamespace", "notQName"] {
            if node.has_attribute(attr) {
                return Err(SchemaError::UnsupportedSchemaConstruct {
                    construct: attr.to_string(),
                    context: format!("xs:{}", node.tag_name().name()),
                }
                .into());
            }
        }
        let namespaces = NamespaceConstraint::parse(
            node.attribute(xsd_attrs::NAMESPACE).unwrap_or("##any"),
            self.target_namespace.as_deref(),
        )?;
        let process_contents =
            ProcessContents::from_str(node.attribute(xsd_attrs::PROCESS_CONTENTS).unwrap_or("strict"))?;
        Ok(Wildcard::new(namespaces, process_contents))
    }

    // =========================================================================
    // Complex types
    // =========================================================================

    fn parse_complex_type(&mut self, node: Node, name: Option<QName>) -> Result<XsdComplexType> {
        let mut complex = XsdComplexType::new(name, ContentModel::Empty);
        complex.mixed = parse_bool(node, xsd_attrs::MIXED)?;
        complex.is_abstract = parse_bool(node, xsd_attrs::ABSTRACT)?;

        for child in xsd_children(node)? {
            match child.tag_name().name() {
                xsd_elements::SIMPLE_CONTENT => self.parse_simple_content(child, &mut complex)?,
                xsd_elements::COMPLEX_CONTENT => {
                    if child.has_attribute(xsd_attrs::MIXED) {
                        complex.mixed = parse_bool(child, xsd_attrs::MIXED)?;
                    }
                    self.parse_complex_content(child, &mut complex)?
                }
                _ => self.parse_type_body(child, &mut complex)?,
            }
        }
        Ok(complex)
    }

    /// Model group and attribute children shared by complexType and derivations
    fn parse_type_body(&mut self, child: Node, complex: &mut XsdComplexType) -> Result<()> {
        match child.tag_name().name() {
            name @ (xsd_elements::SEQUENCE | xsd_elements::CHOICE | xsd_elements::ALL) => {
                if !matches!(complex.content, ContentModel::Empty) {
                    return Err(unexpected(name, "complex type with content"));
                }
                let compositor =
                    Compositor::from_local_name(name).ok_or_else(|| unexpected(name, "complex type"))?;
                let occurs = parse_occurs(
                    child.attribute(xsd_attrs::MIN_OCCURS),
                    child.attribute(xsd_attrs::MAX_OCCURS),
                )?;
                complex.content = ContentModel::Group {
                    group: self.parse_model_group(child, compositor)?,
                    occurs,
                };
            }
            xsd_elements::GROUP => {
                if !matches!(complex.content, ContentModel::Empty) {
                    return Err(unexpected(xsd_elements::GROUP, "complex type with content"));
                }
                let particle = self.parse_group_reference(child)?;
                complex.content =
                    ContentModel::group(ModelGroup::new(Compositor::Sequence, vec![particle]));
            }
            _ => self.parse_attribute_child(
                child,
                &mut complex.attributes,
                &mut complex.attribute_groups,
                &mut complex.any_attribute,
            )?,
        }
        Ok(())
    }

    fn parse_attribute_child(
        &mut self,
        child: Node,
        attributes: &mut AttributeUses,
        attribute_groups: &mut Vec<QName>,
        any_attribute: &mut Option<Wildcard>,
    ) -> Result<()> {
        match child.tag_name().name() {
            xsd_elements::ATTRIBUTE => {
                let attr_use = self.parse_attribute(child, false)?;
                let name = attr_use.name().clone();
                if attributes.insert(name.clone(), attr_use).is_some() {
                    return Err(SchemaError::MalformedSchema(format!(
                        "duplicate attribute use '{}'",
                        name
                    ))
                    .into());
                }
            }
            xsd_elements::ATTRIBUTE_GROUP => {
                let reference = required_attribute(child, xsd_attrs::REF)?;
                attribute_groups.push(self.resolve_qname(child, reference)?);
            }
            xsd_elements::ANY_ATTRIBUTE => *any_attribute = Some(self.parse_wildcard(child)?),
            other => return Err(unexpected(other, "complex type")),
        }
        Ok(())
    }

    fn parse_complex_content(&mut self, node: Node, complex: &mut XsdComplexType) -> Result<()> {
        let derivation = single_derivation(node)?;
        let method = derivation_method(derivation)?;
        let base = self
            .type_attribute(derivation, xsd_attrs::BASE)?
            .ok_or_else(|| missing_attribute(xsd_attrs::BASE, derivation))?;
        complex.base = Some((method, base));
        for child in xsd_children(derivation)? {
            self.parse_type_body(child, complex)?;
        }
        Ok(())
    }

    fn parse_simple_content(&mut self, node: Node, complex: &mut XsdComplexType) -> Result<()> {
        let derivation = single_derivation(node)?;
        let method = derivation_method(derivation)?;
        let base = self
            .type_attribute(derivation, xsd_attrs::BASE)?
            .ok_or_else(|| missing_attribute(xsd_attrs::BASE, derivation))?;
        complex.base = Some((method, base.clone()));
        complex.content = ContentModel::SimpleContent(base);

        let mut facets = FacetSet::new();
        for child in xsd_children(derivation)? {
            let name = child.tag_name().name();
            if method == Derivation::Restriction && FacetSet::is_facet_name(name) {
                facets.add(name, required_attribute(child, xsd_attrs::VALUE)?)?;
            } else if method == Derivation::Restriction && name == xsd_elements::SIMPLE_TYPE {
                let simple = self.parse_simple_type(child, None)?;
                let inline = self.globals.add_anonymous(XsdType::Simple(simple));
                complex.content = ContentModel::SimpleContent(inline);
            } else {
                self.parse_attribute_child(
                    child,
                    &mut complex.attributes,
                    &mut complex.attribute_groups,
                    &mut complex.any_attribute,
                )?;
            }
        }
        if method == Derivation::Restriction {
            complex.content_facets = Some(facets);
        }
        Ok(())
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    fn parse_attribute(&mut self, node: Node, global: bool) -> Result<AttributeUse> {
        let mut inline_type = None;
        for child in xsd_children(node)? {
            match child.tag_name().name() {
                xsd_elements::SIMPLE_TYPE => {
                    let simple = self.parse_simple_type(child, None)?;
                    inline_type = Some(self.globals.add_anonymous(XsdType::Simple(simple)));
                }
                other => return Err(unexpected(other, "xs:attribute")),
            }
        }

        let reference = if global {
            None
        } else {
            node.attribute(xsd_attrs::REF)
                .map(|r| self.resolve_qname(node, r))
                .transpose()?
        };
        let name = match (&reference, global) {
            (Some(reference), _) => reference.clone(),
            (None, true) => self.component_name(node)?,
            (None, false) => self.local_name(node, self.attribute_qualified)?,
        };
        let type_ref = self
            .type_attribute(node, xsd_attrs::TYPE)?
            .or(inline_type)
            .unwrap_or_else(|| TypeRef::xsd("anySimpleType"));

        let mut attribute = XsdAttribute::new(name, type_ref);
        attribute.default = node.attribute(xsd_attrs::DEFAULT).map(String::from);
        attribute.fixed = node.attribute(xsd_attrs::FIXED).map(String::from);

        let mut attr_use = AttributeUse::new(attribute);
        attr_use.reference = reference;
        match node.attribute(xsd_attrs::USE) {
            None | Some("optional") => {}
            Some("required") if !global => attr_use.required = true,
            Some("prohibited") if !global => attr_use.prohibited = true,
            Some(other) => {
                return Err(SchemaError::MalformedSchema(format!(
                    "invalid use '{}' on attribute '{}'",
                    other,
                    attr_use.name()
                ))
                .into())
            }
        }
        Ok(attr_use)
    }

    fn parse_attribute_group(&mut self, node: Node) -> Result<XsdAttributeGroup> {
        let mut group = XsdAttributeGroup::default();
        for child in xsd_children(node)? {
            self.parse_attribute_child(
                child,
                &mut group.attributes,
                &mut group.attribute_groups,
                &mut group.any_attribute,
            )?;
        }
        Ok(group)
    }

    // =========================================================================
    // Simple types
    // =========================================================================

    fn parse_simple_type(&mut self, node: Node, name: Option<QName>) -> Result<XsdSimpleType> {
        let derivation = xsd_children(node)?
            .into_iter()
            .next()
            .ok_or_else(|| SchemaError::MalformedSchema("empty xs:simpleType".to_string()))?;

        match derivation.tag_name().name() {
            xsd_elements::RESTRICTION => {
                let mut base = self.type_attribute(derivation, xsd_attrs::BASE)?;
                let mut facets = FacetSet::new();
                for child in xsd_children(derivation)? {
                    let facet = child.tag_name().name();
                    if facet == xsd_elements::SIMPLE_TYPE && base.is_none() {
                        let inline = self.parse_simple_type(child, None)?;
                        base = Some(self.globals.add_anonymous(XsdType::Simple(inline)));
                    } else if FacetSet::is_facet_name(facet) {
                        facets.add(facet, required_attribute(child, xsd_attrs::VALUE)?)?;
                    } else {
                        return Err(unexpected(facet, "xs:restriction"));
                    }
                }
                let base = base.ok_or_else(|| missing_attribute(xsd_attrs::BASE, derivation))?;
                Ok(XsdSimpleType::restriction(name, base, facets))
            }
            xsd_elements::LIST => {
                let mut item = self.type_attribute(derivation, xsd_attrs::ITEM_TYPE)?;
                for child in xsd_children(derivation)? {
                    match child.tag_name().name() {
                        xsd_elements::SIMPLE_TYPE if item.is_none() => {
                            let inline = self.parse_simple_type(child, None)?;
                            item = Some(self.globals.add_anonymous(XsdType::Simple(inline)));
                        }
                        other => return Err(unexpected(other, "xs:list")),
                    }
                }
                let item = item.ok_or_else(|| missing_attribute(xsd_attrs::ITEM_TYPE, derivation))?;
                Ok(XsdSimpleType::list(name, item))
            }
            xsd_elements::UNION => {
                let mut members = Vec::new();
                if let Some(member_types) = derivation.attribute(xsd_attrs::MEMBER_TYPES) {
                    for member in member_types.split_whitespace() {
                        members.push(TypeRef::Named(self.resolve_qname(derivation, member)?));
                    }
                }
                for child in xsd_children(derivation)? {
                    match child.tag_name().name() {
                        xsd_elements::SIMPLE_TYPE => {
                            let inline = self.parse_simple_type(child, None)?;
                            members.push(self.globals.add_anonymous(XsdType::Simple(inline)));
                        }
                        other => return Err(unexpected(other, "xs:union")),
                    }
                }
                if members.is_empty() {
                    return Err(SchemaError::MalformedSchema(
                        "xs:union without member types".to_string(),
                    )
                    .into());
                }
                Ok(XsdSimpleType::union(name, members))
            }
            other => Err(unexpected(other, "xs:simpleType")),
        }
    }
}

// =============================================================================
// Node helpers
// =============================================================================

fn is_xsd(node: Node, local_name: &str) -> bool {
    node.tag_name().namespace() == Some(XSD_NAMESPACE) && node.tag_name().name() == local_name
}

/// Element children in the XSD namespace, annotations skipped.
///
/// Unsupported constructs fail here so no caller can silently drop them.
fn xsd_children<'a, 'input>(node: Node<'a, 'input>) -> Result<Vec<Node<'a, 'input>>> {
    let mut children = Vec::new();
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().namespace() != Some(XSD_NAMESPACE) {
            return Err(SchemaError::MalformedSchema(format!(
                "unexpected element {{{}}}{} in xs:{}",
                child.tag_name().namespace().unwrap_or(""),
                child.tag_name().name(),
                node.tag_name().name()
            ))
            .into());
        }
        let name = child.tag_name().name();
        if name == xsd_elements::ANNOTATION {
            continue;
        }
        if UNSUPPORTED_CONSTRUCTS.contains(&name) {
            return Err(SchemaError::UnsupportedSchemaConstruct {
                construct: format!("xs:{}", name),
                context: format!("xs:{}", node.tag_name().name()),
            }
            .into());
        }
        children.push(child);
    }
    Ok(children)
}

fn single_derivation<'a, 'input>(node: Node<'a, 'input>) -> Result<Node<'a, 'input>> {
    let children = xsd_children(node)?;
    match children.as_slice() {
        [derivation] => Ok(*derivation),
        _ => Err(SchemaError::MalformedSchema(format!(
            "xs:{} must contain exactly one xs:restriction or xs:extension",
            node.tag_name().name()
        ))
        .into()),
    }
}

fn derivation_method(node: Node) -> Result<Derivation> {
    match node.tag_name().name() {
        xsd_elements::EXTENSION => Ok(Derivation::Extension),
        xsd_elements::RESTRICTION => Ok(Derivation::Restriction),
        other => Err(unexpected(other, "content derivation")),
    }
}

fn required_attribute<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| missing_attribute(name, node))
}

fn missing_attribute(name: &str, node: Node) -> crate::error::Error {
    SchemaError::MalformedSchema(format!(
        "xs:{} is missing the '{}' attribute",
        node.tag_name().name(),
        name
    ))
    .into()
}

fn parse_bool(node: Node, name: &str) -> Result<bool> {
    match node.attribute(name).map(str::trim) {
        None | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(SchemaError::MalformedSchema(format!(
            "invalid boolean '{}' for attribute '{}'",
            other, name
        ))
        .into()),
    }
}

fn unexpected(name: &str, context: &str) -> crate::error::Error {
    SchemaError::MalformedSchema(format!("unexpected xs:{} in {}", name, context)).into()
}

fn unsupported(construct: &str, name: &QName) -> crate::error::Error {
    SchemaError::UnsupportedSchemaConstruct {
        construct: construct.to_string(),
        context: name.to_string(),
    }
    .into()
}
