//! Schema-driven encoding of value trees
//!
//! Walks a [`Value`] together with the content model of the selected root
//! element and builds the XML [`Document`]. Object keys are matched against
//! particles in declared order (or by name with `allow_unordered`), choices
//! select the branch the keys point at, and substitution group heads accept
//! their members. Any mismatch aborts the call with an [`EncodeError`] naming
//! the offending value path.

use std::cell::RefCell;

use tracing::{debug, trace};

use crate::converters::{ConverterConfig, KeyKind, KeyName};
use crate::documents::{Document, Element};
use crate::error::{EncodeError, Error, Facet, Result};
use crate::limits::Limits;
use crate::names::split_qname;
use crate::namespaces::{PrefixTable, QName};
use crate::values::Value;
use crate::XSI_NAMESPACE;

use super::builtins::PrimitiveKind;
use super::complex_types::{ContentModel, XsdComplexType};
use super::elements::XsdElement;
use super::facets::FacetViolation;
use super::globals::{TypeRef, XsdGlobals, XsdType};
use super::groups::{Compositor, ModelGroup, Particle, Term};
use super::models::{element_candidates, head_declaration, model_names, model_wildcards};
use super::particles::Occurs;
use super::schemas::XsdSchema;
use super::simple_types::XsdSimpleType;
use super::wildcards::{ProcessContents, Wildcard};

/// Options of an encode call
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Validate the produced tree before returning it
    pub strict_validation: bool,
    /// Declare the target namespace on the root even if no name uses it
    pub preserve_root_namespace: bool,
    /// Match object keys to particles by name instead of by position
    pub allow_unordered: bool,
    /// Name of the root element (`local`, `prefix:local` or `{uri}local`)
    pub root: Option<String>,
    /// Key conventions of the value tree
    pub converter: ConverterConfig,
    /// Resource limits, defaulting to the schema's
    pub limits: Option<Limits>,
}

impl EncodeOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-validate the produced document
    pub fn with_strict_validation(mut self, enabled: bool) -> Self {
        self.strict_validation = enabled;
        self
    }

    /// Always declare the target namespace on the root
    pub fn with_preserve_root_namespace(mut self, enabled: bool) -> Self {
        self.preserve_root_namespace = enabled;
        self
    }

    /// Relax key order matching
    pub fn with_allow_unordered(mut self, enabled: bool) -> Self {
        self.allow_unordered = enabled;
        self
    }

    /// Select the root element
    pub fn with_root(mut self, name: impl Into<String>) -> Self {
        self.root = Some(name.into());
        self
    }

    /// Set the value tree conventions
    pub fn with_converter(mut self, converter: ConverterConfig) -> Self {
        self.converter = converter;
        self
    }

    /// Override the schema's limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }
}

/// Encode a value tree into an XML document
pub fn encode(
    schema: &XsdSchema,
    value: &Value,
    prefixes: &PrefixTable,
    options: &EncodeOptions,
) -> Result<Document> {
    let encoder = Encoder {
        globals: schema.globals(),
        prefixes,
        converter: &options.converter,
        limits: options.limits.as_ref().unwrap_or_else(|| schema.limits()),
        unordered: options.allow_unordered,
        value_prefixes: RefCell::new(Vec::new()),
    };

    let (decl, content, key) = encoder.select_root(schema, value, options.root.as_deref())?;
    let path = format!("/{}", key);
    debug!(root = %decl.name, "encoding value tree");
    let root = encoder.encode_element(decl, content, &path, 1)?;

    let mut doc = Document::new(root, prefixes.clone());
    doc.value_prefixes = encoder.value_prefixes.take();
    if options.preserve_root_namespace {
        if let Some(target) = schema.target_namespace() {
            encoder.check_element_namespace(target, &path)?;
            doc.root_namespaces.push(target.to_string());
        }
    }
    if options.strict_validation {
        schema.validation_report(&doc).into_result()?;
    }
    Ok(doc)
}

// =============================================================================
// Encoder
// =============================================================================

struct Encoder<'s> {
    globals: &'s XsdGlobals,
    prefixes: &'s PrefixTable,
    converter: &'s ConverterConfig,
    limits: &'s Limits,
    unordered: bool,
    /// Prefixes inside encoded QName values
    value_prefixes: RefCell<Vec<String>>,
}

/// Object entries split by role
#[derive(Default)]
struct Parts<'v> {
    text: Option<&'v Value>,
    attributes: Vec<(&'v str, KeyName<'v>, &'v Value)>,
    children: Vec<(&'v str, KeyName<'v>, &'v Value)>,
}

/// `xsi:` attributes found in an object
#[derive(Default)]
struct XsiAttributes {
    type_override: Option<TypeRef>,
    nil: bool,
    attributes: Vec<(QName, String)>,
}

impl<'s> Encoder<'s> {
    fn select_root<'v>(
        &self,
        schema: &'s XsdSchema,
        value: &'v Value,
        requested: Option<&str>,
    ) -> Result<(&'s XsdElement, &'v Value, String)> {
        let single_key = value
            .as_object()
            .filter(|map| map.len() == 1)
            .and_then(|map| map.iter().next());

        if let Some(requested) = requested {
            let decl = self
                .find_global(&KeyName::parse(requested))
                .ok_or_else(|| EncodeError::UnknownRootElement {
                    name: Some(requested.to_string()),
                })?;
            return Ok(match single_key {
                Some((key, inner)) if KeyName::parse(key).matches(&decl.name, self.prefixes) => {
                    (decl, inner, key.clone())
                }
                _ => (decl, value, decl.name.local_name.clone()),
            });
        }

        if let Some((key, inner)) = single_key {
            if let KeyKind::Child(name) = self.converter.classify(key) {
                if let Some(decl) = self.find_global(&name) {
                    debug!(root = %decl.name, "root selected by the value's single key");
                    return Ok((decl, inner, key.clone()));
                }
            }
        }

        let mut concrete = schema.elements().filter(|decl| !decl.is_abstract);
        match (concrete.next(), concrete.next()) {
            (Some(decl), None) => {
                debug!(root = %decl.name, "root selected as the only global element");
                Ok((decl, value, decl.name.local_name.clone()))
            }
            _ => Err(EncodeError::UnknownRootElement { name: None }.into()),
        }
    }

    /// Global element named by a key, exact names first
    fn find_global(&self, name: &KeyName<'_>) -> Option<&'s XsdElement> {
        let globals: &'s XsdGlobals = self.globals;
        let elements = &globals.elements;
        elements
            .values()
            .find(|decl| name.is_exact(&decl.name, self.prefixes))
            .or_else(|| {
                elements
                    .values()
                    .find(|decl| name.matches(&decl.name, self.prefixes))
            })
    }

    fn check_element_namespace(&self, namespace: &str, path: &str) -> Result<()> {
        match self.prefixes.prefix_for(namespace) {
            Some(_) => Ok(()),
            None => Err(EncodeError::UnboundNamespace {
                path: path.to_string(),
                namespace: namespace.to_string(),
            }
            .into()),
        }
    }

    fn check_attribute_namespace(&self, name: &QName, path: &str) -> Result<()> {
        match name.namespace() {
            Some(ns) if self.prefixes.attribute_prefix_for(ns).is_none() => {
                Err(EncodeError::UnboundNamespace {
                    path: path.to_string(),
                    namespace: ns.to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    fn split<'v>(&self, value: &'v Value) -> Parts<'v> {
        let mut parts = Parts::default();
        match value {
            Value::Object(map) => {
                for (key, item) in map {
                    match self.converter.classify(key) {
                        KeyKind::Text => parts.text = Some(item),
                        KeyKind::NamespaceDecl => {}
                        KeyKind::Attribute(name) => parts.attributes.push((key, name, item)),
                        KeyKind::Child(name) => parts.children.push((key, name, item)),
                    }
                }
            }
            other => parts.text = Some(other),
        }
        parts
    }

    /// Pull the `xsi:` attributes out of the attribute keys
    fn take_xsi(&self, parts: &mut Parts<'_>, path: &str) -> Result<XsiAttributes> {
        let mut xsi = XsiAttributes::default();
        let mut rest = Vec::with_capacity(parts.attributes.len());
        for (key, name, item) in parts.attributes.drain(..) {
            let resolved = name.resolve(self.prefixes, true);
            let Some(qname) = resolved.filter(|q| q.namespace() == Some(XSI_NAMESPACE)) else {
                rest.push((key, name, item));
                continue;
            };
            let attr_path = format!("{}/@{}", path, key);
            let text = item.scalar_text().ok_or_else(|| EncodeError::InvalidValue {
                path: attr_path.clone(),
                message: format!("expected a scalar, got {}", item.type_name()),
            })?;
            self.check_attribute_namespace(&qname, &attr_path)?;
            match qname.local_name.as_str() {
                "type" => {
                    let type_name = self.prefixes.expand(text.trim()).map_err(|_| {
                        EncodeError::InvalidValue {
                            path: attr_path.clone(),
                            message: format!("cannot resolve type name '{}'", text),
                        }
                    })?;
                    xsi.type_override = Some(TypeRef::Named(type_name));
                }
                "nil" => xsi.nil = matches!(text.trim(), "true" | "1"),
                _ => {}
            }
            xsi.attributes.push((qname, text));
        }
        parts.attributes = rest;
        Ok(xsi)
    }

    fn encode_element(
        &self,
        decl: &'s XsdElement,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<Element> {
        self.limits.check_xml_depth(depth)?;
        if let Some(ns) = decl.name.namespace() {
            self.check_element_namespace(ns, path)?;
        }

        let mut parts = self.split(value);
        let xsi = self.take_xsi(&mut parts, path)?;

        let type_ref = match &xsi.type_override {
            Some(override_ref) => {
                if self.globals.get_type(override_ref).is_none()
                    || !self.globals.is_derived_from(override_ref, &decl.type_ref)
                {
                    return Err(EncodeError::InvalidValue {
                        path: path.to_string(),
                        message: format!(
                            "xsi:type '{}' is not derived from '{}'",
                            override_ref,
                            self.globals.type_name(&decl.type_ref)
                        ),
                    }
                    .into());
                }
                override_ref
            }
            None => &decl.type_ref,
        };

        let mut element = Element::new(decl.name.clone());
        element.attributes.extend(xsi.attributes);

        if matches!(value, Value::Null) || xsi.nil {
            if decl.nillable {
                let nil = QName::namespaced(XSI_NAMESPACE, "nil");
                self.check_attribute_namespace(&nil, path)?;
                if element.attribute(&nil).is_none() {
                    element.attributes.push((nil, "true".to_string()));
                }
                let has_text = parts.text.is_some_and(|t| !matches!(t, Value::Null));
                if has_text || !parts.children.is_empty() {
                    return Err(EncodeError::InvalidValue {
                        path: path.to_string(),
                        message: "a nil element cannot have content".to_string(),
                    }
                    .into());
                }
                if let Some(XsdType::Complex(complex)) = self.globals.get_type(type_ref) {
                    self.encode_attributes(complex, &parts.attributes, &[], &mut element, path)?;
                }
                return Ok(element);
            }
            if xsi.nil {
                return Err(not_nillable(decl, path));
            }
        }

        match self.globals.get_type(type_ref) {
            Some(XsdType::Simple(simple)) => {
                if let Some((key, _, _)) = parts.attributes.first() {
                    return Err(EncodeError::UnexpectedAttribute {
                        path: format!("{}/@{}", path, key),
                        attribute: key.to_string(),
                    }
                    .into());
                }
                if let Some((key, _, _)) = parts.children.first() {
                    return Err(EncodeError::UnexpectedElement {
                        path: format!("{}/{}", path, key),
                        key: key.to_string(),
                    }
                    .into());
                }
                let text = self.simple_text(decl, simple, parts.text, path)?;
                if !text.is_empty() {
                    element.text = Some(text);
                }
                Ok(element)
            }
            Some(XsdType::Complex(complex)) => {
                if complex.is_abstract && xsi.type_override.is_none() {
                    return Err(EncodeError::InvalidValue {
                        path: path.to_string(),
                        message: format!(
                            "type '{}' is abstract, select a derived type with xsi:type",
                            self.globals.type_name(type_ref)
                        ),
                    }
                    .into());
                }
                self.encode_complex(decl, complex, parts, element, path, depth)
            }
            None => Err(EncodeError::InvalidValue {
                path: path.to_string(),
                message: format!("type '{}' is not defined", type_ref),
            }
            .into()),
        }
    }

    /// Lexical form of a simple-typed element value
    fn simple_text(
        &self,
        decl: &XsdElement,
        simple: &XsdSimpleType,
        value: Option<&Value>,
        path: &str,
    ) -> Result<String> {
        let empty = Value::String(String::new());
        let (value, from_null) = match value {
            Some(Value::Null) => (&empty, true),
            None => (&empty, false),
            Some(other) => (other, false),
        };
        let text = match simple.encode_value(value, self.globals) {
            Ok(text) => text,
            Err(_) if from_null && !decl.nillable => return Err(not_nillable(decl, path)),
            Err(violation) => return Err(constraint_violation(path, value, violation)),
        };
        self.check_fixed(decl.fixed.as_deref(), simple, &text, path)?;
        self.note_qname_value(simple, &text, path)?;
        Ok(text)
    }

    /// The prefix of a QName value must be bound; it is then declared on the root
    fn note_qname_value(&self, simple: &XsdSimpleType, text: &str, path: &str) -> Result<()> {
        if !matches!(
            simple.primitive_kind(),
            Some(PrimitiveKind::QName | PrimitiveKind::Notation)
        ) {
            return Ok(());
        }
        let prefix = split_qname(text.trim()).0.unwrap_or("");
        if prefix.is_empty() && self.prefixes.default_namespace().is_none() {
            return Ok(());
        }
        if self.prefixes.namespace_for(prefix).is_none() {
            return Err(EncodeError::InvalidValue {
                path: path.to_string(),
                message: format!("prefix '{}' is not bound", prefix),
            }
            .into());
        }
        let mut prefixes = self.value_prefixes.borrow_mut();
        if !prefixes.iter().any(|p| p == prefix) {
            prefixes.push(prefix.to_string());
        }
        Ok(())
    }

    fn check_fixed(
        &self,
        fixed: Option<&str>,
        simple: &XsdSimpleType,
        text: &str,
        path: &str,
    ) -> Result<()> {
        let Some(fixed) = fixed else {
            return Ok(());
        };
        let expected = simple
            .validate_text(fixed, self.globals)
            .unwrap_or_else(|_| fixed.to_string());
        if expected == text {
            Ok(())
        } else {
            Err(EncodeError::SimpleTypeConstraintViolation {
                path: path.to_string(),
                facet: Facet::Fixed,
                value: text.to_string(),
                message: format!("value must be '{}'", fixed),
            }
            .into())
        }
    }

    fn encode_complex(
        &self,
        decl: &XsdElement,
        complex: &'s XsdComplexType,
        parts: Parts<'_>,
        mut element: Element,
        path: &str,
        depth: usize,
    ) -> Result<Element> {
        let names = match &complex.content {
            ContentModel::Group { group, .. } => model_names(group, self.globals),
            _ => Vec::new(),
        };

        // a bare key naming a declared attribute and no child element is an attribute
        let mut children = Vec::with_capacity(parts.children.len());
        let mut bare_attributes = Vec::new();
        for (key, name, item) in parts.children {
            let names_child = names.iter().any(|n| name.matches(n, self.prefixes));
            let names_attribute = complex
                .attributes
                .values()
                .any(|u| !u.prohibited && name.matches(u.name(), self.prefixes));
            if !names_child && names_attribute && item.as_object().is_none() {
                bare_attributes.push((key, name, item));
            } else {
                children.push((key, name, item));
            }
        }
        self.encode_attributes(complex, &parts.attributes, &bare_attributes, &mut element, path)?;

        match &complex.content {
            ContentModel::SimpleContent(content_type) => {
                if let Some((key, _, _)) = children.first() {
                    return Err(unexpected_element(path, key));
                }
                let simple = self.globals.simple_type(content_type).ok_or_else(|| {
                    EncodeError::InvalidValue {
                        path: path.to_string(),
                        message: format!("simple content type '{}' is not defined", content_type),
                    }
                })?;
                let text = self.simple_text(decl, simple, parts.text, path)?;
                if !text.is_empty() {
                    element.text = Some(text);
                }
            }
            ContentModel::Empty => {
                if let Some((key, _, _)) = children.first() {
                    return Err(unexpected_element(path, key));
                }
                self.mixed_text(parts.text, complex.mixed, path, &mut element)?;
            }
            ContentModel::Any => {
                self.mixed_text(parts.text, true, path, &mut element)?;
                for (key, name, item) in children {
                    self.encode_any_child(key, &name, item, path, depth, &mut element, None)?;
                }
            }
            ContentModel::Group { group, occurs } => {
                self.mixed_text(parts.text, complex.mixed, path, &mut element)?;
                let mut matcher = ContentMatcher::new(self, path, depth, children, names, group);
                matcher.match_group(group, *occurs, self.unordered)?;
                matcher.check_leftovers()?;
                element.children = matcher.output;
            }
        }
        Ok(element)
    }

    fn mixed_text(
        &self,
        text: Option<&Value>,
        mixed: bool,
        path: &str,
        element: &mut Element,
    ) -> Result<()> {
        let Some(value) = text else {
            return Ok(());
        };
        let text = value.scalar_text().ok_or_else(|| EncodeError::InvalidValue {
            path: path.to_string(),
            message: format!("expected text, got {}", value.type_name()),
        })?;
        if text.is_empty() {
            return Ok(());
        }
        if !mixed {
            return Err(EncodeError::InvalidValue {
                path: path.to_string(),
                message: "character data is not allowed in element-only content".to_string(),
            }
            .into());
        }
        element.text = Some(text);
        Ok(())
    }

    fn encode_attributes(
        &self,
        complex: &XsdComplexType,
        prefixed: &[(&str, KeyName<'_>, &Value)],
        bare: &[(&str, KeyName<'_>, &Value)],
        element: &mut Element,
        path: &str,
    ) -> Result<()> {
        for (key, name, item) in prefixed.iter().chain(bare) {
            let attr_path = format!("{}/@{}", path, key);
            let declared = complex
                .attributes
                .values()
                .find(|u| !u.prohibited && name.matches(u.name(), self.prefixes));

            let (qname, text) = match declared {
                Some(attribute_use) => {
                    let attribute = &attribute_use.attribute;
                    let simple = self.globals.simple_type(&attribute.type_ref).ok_or_else(|| {
                        EncodeError::InvalidValue {
                            path: attr_path.clone(),
                            message: format!("type '{}' is not defined", attribute.type_ref),
                        }
                    })?;
                    let text = simple
                        .encode_value(item, self.globals)
                        .map_err(|violation| constraint_violation(&attr_path, item, violation))?;
                    self.check_fixed(attribute.fixed.as_deref(), simple, &text, &attr_path)?;
                    self.note_qname_value(simple, &text, &attr_path)?;
                    (attribute.name.clone(), text)
                }
                None => {
                    let qname = name
                        .resolve(self.prefixes, true)
                        .filter(|q| {
                            complex
                                .any_attribute
                                .as_ref()
                                .is_some_and(|w| w.allows(q.namespace()))
                        })
                        .ok_or_else(|| EncodeError::UnexpectedAttribute {
                            path: attr_path.clone(),
                            attribute: key.to_string(),
                        })?;
                    let text = item.scalar_text().ok_or_else(|| EncodeError::InvalidValue {
                        path: attr_path.clone(),
                        message: format!("expected a scalar, got {}", item.type_name()),
                    })?;
                    (qname, text)
                }
            };
            self.check_attribute_namespace(&qname, &attr_path)?;
            if element.attribute(&qname).is_some() {
                return Err(EncodeError::UnexpectedAttribute {
                    path: attr_path,
                    attribute: key.to_string(),
                }
                .into());
            }
            element.attributes.push((qname, text));
        }

        for attribute_use in complex.attributes.values() {
            if attribute_use.required
                && !attribute_use.prohibited
                && element.attribute(attribute_use.name()).is_none()
            {
                return Err(EncodeError::MissingRequiredAttribute {
                    path: path.to_string(),
                    attribute: self.display_name(attribute_use.name()),
                }
                .into());
            }
        }
        self.limits.check_attributes(element.attributes.len())?;
        Ok(())
    }

    /// Encode a child of `xs:anyType` content or of a wildcard
    #[allow(clippy::too_many_arguments)]
    fn encode_any_child(
        &self,
        key: &str,
        name: &KeyName<'_>,
        value: &Value,
        path: &str,
        depth: usize,
        parent: &mut Element,
        wildcard: Option<&Wildcard>,
    ) -> Result<()> {
        let items: Vec<(String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (format!("{}/{}[{}]", path, key, i), item))
                .collect(),
            other => vec![(format!("{}/{}", path, key), other)],
        };
        for (item_path, item) in items {
            let child = self.encode_untyped_or_global(name, item, &item_path, depth + 1, wildcard)?;
            parent.children.push(child);
        }
        Ok(())
    }

    fn encode_untyped_or_global(
        &self,
        name: &KeyName<'_>,
        value: &Value,
        path: &str,
        depth: usize,
        wildcard: Option<&Wildcard>,
    ) -> Result<Element> {
        let process = wildcard.map(|w| w.process_contents).unwrap_or(ProcessContents::Lax);
        if process != ProcessContents::Skip {
            let global = self
                .find_global(name)
                .filter(|decl| wildcard.map_or(true, |w| w.allows(decl.name.namespace())));
            match global {
                Some(decl) if decl.is_abstract => {
                    return Err(EncodeError::AbstractElementUsed {
                        path: path.to_string(),
                        element: self.display_name(&decl.name),
                    }
                    .into())
                }
                Some(decl) => return self.encode_element(decl, value, path, depth),
                None if process == ProcessContents::Strict => {
                    return Err(EncodeError::UnexpectedElement {
                        path: path.to_string(),
                        key: name_text(name),
                    }
                    .into())
                }
                None => {}
            }
        }
        let qname = self.resolve_untyped(name, path, false)?;
        self.encode_untyped(qname, value, path, depth)
    }

    fn resolve_untyped(&self, name: &KeyName<'_>, path: &str, is_attribute: bool) -> Result<QName> {
        name.resolve(self.prefixes, is_attribute).ok_or_else(|| {
            let prefix = match name {
                KeyName::Prefixed(prefix, _) => *prefix,
                _ => "",
            };
            EncodeError::InvalidValue {
                path: path.to_string(),
                message: format!("prefix '{}' is not bound", prefix),
            }
            .into()
        })
    }

    /// Element with no declaration: scalars become text, objects children
    fn encode_untyped(&self, name: QName, value: &Value, path: &str, depth: usize) -> Result<Element> {
        self.limits.check_xml_depth(depth)?;
        if let Some(ns) = name.namespace() {
            self.check_element_namespace(ns, path)?;
        }
        let mut element = Element::new(name);
        let parts = self.split(value);
        self.mixed_text(parts.text, true, path, &mut element)?;
        for (key, attr_name, item) in parts.attributes {
            let attr_path = format!("{}/@{}", path, key);
            let qname = self.resolve_untyped(&attr_name, &attr_path, true)?;
            self.check_attribute_namespace(&qname, &attr_path)?;
            let text = item.scalar_text().ok_or_else(|| EncodeError::InvalidValue {
                path: attr_path,
                message: format!("expected a scalar, got {}", item.type_name()),
            })?;
            element.attributes.push((qname, text));
        }
        self.limits.check_attributes(element.attributes.len())?;
        for (key, child_name, item) in parts.children {
            self.encode_any_child(key, &child_name, item, path, depth, &mut element, None)?;
        }
        Ok(element)
    }

    fn display_name(&self, name: &QName) -> String {
        self.prefixes
            .render(name)
            .unwrap_or_else(|| name.local_name.clone())
    }
}

fn name_text(name: &KeyName<'_>) -> String {
    match name {
        KeyName::Local(local) => local.to_string(),
        KeyName::Prefixed(prefix, local) => format!("{}:{}", prefix, local),
        KeyName::Clark(uri, local) => format!("{{{}}}{}", uri, local),
    }
}

fn not_nillable(decl: &XsdElement, path: &str) -> Error {
    EncodeError::NotNillable {
        path: path.to_string(),
        element: decl.name.local_name.clone(),
    }
    .into()
}

fn unexpected_element(path: &str, key: &str) -> Error {
    EncodeError::UnexpectedElement {
        path: format!("{}/{}", path, key),
        key: key.to_string(),
    }
    .into()
}

fn constraint_violation(path: &str, value: &Value, violation: FacetViolation) -> Error {
    EncodeError::SimpleTypeConstraintViolation {
        path: path.to_string(),
        facet: violation.facet,
        value: value.scalar_text().unwrap_or_else(|| value.to_string()),
        message: violation.message,
    }
    .into()
}

// =============================================================================
// Content matching
// =============================================================================

/// A child key of the object being matched
struct Entry<'v> {
    key: &'v str,
    name: KeyName<'v>,
    items: Vec<&'v Value>,
    is_array: bool,
    consumed: usize,
    /// Named by the content model
    named: bool,
    /// Named by the model or admitted by one of its wildcards
    relevant: bool,
}

impl Entry<'_> {
    fn is_exhausted(&self) -> bool {
        self.consumed >= self.items.len()
    }

    fn is_started(&self) -> bool {
        self.consumed > 0
    }
}

/// Matches the child keys of one object against a model group
struct ContentMatcher<'e, 's, 'v> {
    encoder: &'e Encoder<'s>,
    path: &'e str,
    depth: usize,
    entries: Vec<Entry<'v>>,
    output: Vec<Element>,
    /// Sequence siblings still to be matched after the current particle
    follow: Vec<&'s [Particle]>,
}

impl<'e, 's, 'v> ContentMatcher<'e, 's, 'v> {
    fn new(
        encoder: &'e Encoder<'s>,
        path: &'e str,
        depth: usize,
        children: Vec<(&'v str, KeyName<'v>, &'v Value)>,
        names: Vec<QName>,
        group: &'s ModelGroup,
    ) -> Self {
        let wildcards = model_wildcards(group);
        let entries = children
            .into_iter()
            .map(|(key, name, value)| {
                let (items, is_array) = match value {
                    Value::Array(items) => (items.iter().collect(), true),
                    other => (vec![other], false),
                };
                let named = names.iter().any(|n| name.matches(n, encoder.prefixes));
                let relevant = named
                    || name
                        .resolve(encoder.prefixes, false)
                        .is_some_and(|q| wildcards.iter().any(|w| w.allows(q.namespace())));
                Entry {
                    key,
                    name,
                    items,
                    is_array,
                    consumed: 0,
                    named,
                    relevant,
                }
            })
            .collect();
        Self {
            encoder,
            path,
            depth,
            entries,
            output: Vec::new(),
            follow: Vec::new(),
        }
    }

    /// Entries a particle may take its next item from.
    ///
    /// Unordered: any pending entry. Ordered: entries already started plus
    /// the first untouched one.
    fn available(&self, unordered: bool) -> Vec<usize> {
        let mut found = Vec::new();
        let mut untouched_seen = false;
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.relevant || entry.is_exhausted() {
                continue;
            }
            if unordered || entry.is_started() {
                found.push(index);
            } else if !untouched_seen {
                untouched_seen = true;
                found.push(index);
            }
        }
        found
    }

    fn pending(&self) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&i| self.entries[i].relevant && !self.entries[i].is_exhausted())
            .collect()
    }

    /// Take the next item of an entry, returning its value path
    fn take(&mut self, index: usize) -> (String, &'v Value) {
        let entry = &mut self.entries[index];
        let item = entry.items[entry.consumed];
        let path = if entry.is_array {
            format!("{}/{}[{}]", self.path, entry.key, entry.consumed)
        } else {
            format!("{}/{}", self.path, entry.key)
        };
        entry.consumed += 1;
        (path, item)
    }

    fn accepts(&self, particle: &Particle, entry: &Entry<'_>) -> bool {
        match &particle.term {
            Term::Element(_) | Term::ElementRef(_) => {
                element_candidates(&particle.term, self.encoder.globals)
                    .iter()
                    .any(|decl| entry.name.matches(&decl.name, self.encoder.prefixes))
            }
            Term::Group(group) => group.particles.iter().any(|p| self.accepts(p, entry)),
            Term::GroupRef(name) => self
                .encoder
                .globals
                .groups
                .get(name)
                .is_some_and(|g| g.model.particles.iter().any(|p| self.accepts(p, entry))),
            Term::Any(wildcard) => self.wildcard_accepts(wildcard, entry),
        }
    }

    fn wildcard_accepts(&self, wildcard: &Wildcard, entry: &Entry<'_>) -> bool {
        !entry.named
            && entry
                .name
                .resolve(self.encoder.prefixes, false)
                .is_some_and(|q| wildcard.allows(q.namespace()))
    }

    fn group_is_relevant(&self, group: &ModelGroup, unordered: bool) -> bool {
        self.available(unordered)
            .into_iter()
            .any(|i| group.particles.iter().any(|p| self.accepts(p, &self.entries[i])))
    }

    fn match_particle(&mut self, particle: &'s Particle, unordered: bool) -> Result<usize> {
        match &particle.term {
            Term::Element(_) | Term::ElementRef(_) => self.match_element(particle, unordered),
            Term::Group(group) => self.match_group(group, particle.occurs, unordered),
            Term::GroupRef(name) => match self.encoder.globals.groups.get(name) {
                Some(named) => self.match_group(&named.model, particle.occurs, unordered),
                None => Ok(0),
            },
            Term::Any(wildcard) => self.match_wildcard(wildcard, particle.occurs, unordered),
        }
    }

    /// Repeat a model group while keys it can consume remain
    fn match_group(&mut self, group: &'s ModelGroup, occurs: Occurs, unordered: bool) -> Result<usize> {
        let inner_unordered = unordered || group.compositor == Compositor::All;
        let mut repetitions = 0usize;
        let mut total = 0usize;
        while !occurs.is_over(repetitions) {
            if !self.group_is_relevant(group, inner_unordered) {
                break;
            }
            let consumed = self.match_group_once(group, occurs, inner_unordered)?;
            if consumed == 0 {
                break;
            }
            repetitions += 1;
            total += consumed;
        }

        if occurs.is_missing(repetitions) && !group.is_emptiable(self.encoder.globals) {
            if repetitions == 0 {
                // reports the first required particle that is missing
                self.match_group_once(group, occurs, inner_unordered)?;
            }
            return Err(EncodeError::MissingRequiredElement {
                path: self.path.to_string(),
                element: self.describe(group),
            }
            .into());
        }
        Ok(total)
    }

    fn match_group_once(
        &mut self,
        group: &'s ModelGroup,
        occurs: Occurs,
        unordered: bool,
    ) -> Result<usize> {
        match group.compositor {
            Compositor::Sequence => {
                let mut consumed = 0;
                for (index, particle) in group.particles.iter().enumerate() {
                    self.follow.push(&group.particles[index + 1..]);
                    let matched = self.match_particle(particle, unordered);
                    self.follow.pop();
                    consumed += matched?;
                }
                Ok(consumed)
            }
            Compositor::All => {
                let mut consumed = 0;
                for particle in &group.particles {
                    consumed += self.match_particle(particle, unordered)?;
                }
                Ok(consumed)
            }
            Compositor::Choice => self.match_choice(group, occurs, unordered),
        }
    }

    /// Select and match one branch of a choice
    fn match_choice(&mut self, group: &'s ModelGroup, occurs: Occurs, unordered: bool) -> Result<usize> {
        let pending = self.pending();
        let branches: Vec<Vec<usize>> = group
            .particles
            .iter()
            .map(|p| {
                pending
                    .iter()
                    .copied()
                    .filter(|&i| self.accepts(p, &self.entries[i]))
                    .collect()
            })
            .collect();
        let mut relevant: Vec<usize> = branches.iter().flatten().copied().collect();
        relevant.sort_unstable();
        relevant.dedup();

        if relevant.is_empty() {
            if group.is_emptiable(self.encoder.globals) {
                return Ok(0);
            }
            return Err(EncodeError::MissingRequiredElement {
                path: self.path.to_string(),
                element: self.describe(group),
            }
            .into());
        }

        let covering = branches
            .iter()
            .position(|b| b.len() == relevant.len())
            .or_else(|| self.claiming_branch(&branches, &relevant));
        let chosen = match covering {
            Some(branch) => branch,
            None if occurs.is_single() => {
                return Err(EncodeError::ChoiceAmbiguity {
                    path: self.path.to_string(),
                    candidates: relevant
                        .iter()
                        .map(|&i| self.entries[i].key.to_string())
                        .collect(),
                }
                .into())
            }
            None if unordered => branches.iter().position(|b| !b.is_empty()).unwrap_or(0),
            None => {
                let available = self.available(false);
                let earliest = available
                    .iter()
                    .copied()
                    .find(|i| relevant.contains(i))
                    .unwrap_or(relevant[0]);
                branches
                    .iter()
                    .position(|b| b.contains(&earliest))
                    .unwrap_or(0)
            }
        };
        trace!(path = self.path, branch = chosen, "choice branch selected");
        self.match_particle(&group.particles[chosen], unordered)
    }

    /// The only branch holding every key that no later sibling can consume
    fn claiming_branch(&self, branches: &[Vec<usize>], relevant: &[usize]) -> Option<usize> {
        let own: Vec<usize> = relevant
            .iter()
            .copied()
            .filter(|&i| {
                !self
                    .follow
                    .iter()
                    .flat_map(|siblings| siblings.iter())
                    .any(|p| self.accepts(p, &self.entries[i]))
            })
            .collect();
        if own.is_empty() {
            return None;
        }
        let mut claiming = branches
            .iter()
            .enumerate()
            .filter(|(_, b)| own.iter().all(|i| b.contains(i)))
            .map(|(index, _)| index);
        match (claiming.next(), claiming.next()) {
            (Some(branch), None) => Some(branch),
            _ => None,
        }
    }

    fn match_element(&mut self, particle: &'s Particle, unordered: bool) -> Result<usize> {
        let globals = self.encoder.globals;
        let candidates = element_candidates(&particle.term, globals);
        let mut count = 0usize;

        while !particle.occurs.is_over(count) {
            let next = self.available(unordered).into_iter().find_map(|i| {
                candidates
                    .iter()
                    .find(|decl| self.entries[i].name.matches(&decl.name, self.encoder.prefixes))
                    .map(|decl| (i, *decl))
            });
            let Some((index, decl)) = next else {
                break;
            };
            if decl.is_abstract {
                let key = self.entries[index].key;
                return Err(EncodeError::AbstractElementUsed {
                    path: format!("{}/{}", self.path, key),
                    element: key.to_string(),
                }
                .into());
            }
            let (path, value) = self.take(index);
            trace!(path = %path, element = %decl.name, "matched element particle");
            let child = self.encoder.encode_element(decl, value, &path, self.depth + 1)?;
            self.output.push(child);
            count += 1;
        }

        if particle.occurs.is_missing(count) {
            if let Some(head) = head_declaration(&particle.term, globals) {
                if head.is_abstract {
                    return Err(EncodeError::NoSubstitutionGroupMember {
                        path: self.path.to_string(),
                        head: head.name.local_name.clone(),
                    }
                    .into());
                }
                return Err(EncodeError::MissingRequiredElement {
                    path: format!("{}/{}", self.path, head.name.local_name),
                    element: self.encoder.display_name(&head.name),
                }
                .into());
            }
        }
        Ok(count)
    }

    fn match_wildcard(&mut self, wildcard: &'s Wildcard, occurs: Occurs, unordered: bool) -> Result<usize> {
        let mut count = 0usize;
        while !occurs.is_over(count) {
            let next = self
                .available(unordered)
                .into_iter()
                .find(|&i| self.wildcard_accepts(wildcard, &self.entries[i]));
            let Some(index) = next else {
                break;
            };
            let name = self.entries[index].name;
            let (path, value) = self.take(index);
            trace!(path = %path, "matched wildcard");
            let child = self.encoder.encode_untyped_or_global(
                &name,
                value,
                &path,
                self.depth + 1,
                Some(wildcard),
            )?;
            self.output.push(child);
            count += 1;
        }
        if occurs.is_missing(count) {
            return Err(EncodeError::MissingRequiredElement {
                path: format!("{}/*", self.path),
                element: "*".to_string(),
            }
            .into());
        }
        Ok(count)
    }

    /// Report the first entry the model did not fully consume
    fn check_leftovers(&self) -> Result<()> {
        match self.entries.iter().find(|e| !e.is_exhausted()) {
            Some(entry) if entry.is_started() => Err(EncodeError::TooManyOccurrences {
                path: format!("{}/{}", self.path, entry.key),
                element: entry.key.to_string(),
                max: entry.consumed,
                found: entry.items.len(),
            }
            .into()),
            Some(entry) => Err(unexpected_element(self.path, entry.key)),
            None => Ok(()),
        }
    }

    fn describe(&self, group: &ModelGroup) -> String {
        let separator = if group.compositor == Compositor::Choice {
            " | "
        } else {
            ", "
        };
        model_names(group, self.encoder.globals)
            .iter()
            .map(|name| self.encoder.display_name(name))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::WriteOptions;
    use crate::error::ViolationKind;
    use pretty_assertions::assert_eq;

    const ORDER_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns="urn:order" targetNamespace="urn:order"
           elementFormDefault="qualified">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="id" type="xs:integer"/>
        <xs:element name="note" type="xs:string" minOccurs="0"/>
        <xs:element name="line" type="Line" maxOccurs="3"/>
        <xs:choice minOccurs="0">
          <xs:element name="pickup" type="xs:boolean"/>
          <xs:element name="address" type="xs:string"/>
        </xs:choice>
      </xs:sequence>
      <xs:attribute name="currency" use="required">
        <xs:simpleType>
          <xs:restriction base="xs:string">
            <xs:enumeration value="EUR"/>
            <xs:enumeration value="USD"/>
          </xs:restriction>
        </xs:simpleType>
      </xs:attribute>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="Line">
    <xs:simpleContent>
      <xs:extension base="xs:decimal">
        <xs:attribute name="sku" type="xs:string"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
</xs:schema>"#;

    fn schema() -> XsdSchema {
        XsdSchema::from_str(ORDER_XSD).unwrap()
    }

    fn table(schema: &XsdSchema) -> PrefixTable {
        PrefixTable::resolve(schema, Some("o"), Vec::<(String, String)>::new()).unwrap()
    }

    fn encode_json(json: &str, options: &EncodeOptions) -> Result<String> {
        let schema = schema();
        let value = Value::from_json_str(json).unwrap();
        let doc = schema.encode(&value, &table(&schema), options)?;
        doc.to_xml_string(&WriteOptions::new().with_xml_declaration(false))
    }

    fn encode_error(json: &str, options: &EncodeOptions) -> EncodeError {
        match encode_json(json, options) {
            Err(Error::Encode(err)) => err,
            other => panic!("expected an encode error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_order() {
        let xml = encode_json(
            r#"{"@currency": "EUR", "id": 7, "line": [{"@sku": "A", "$": "1.50"}, 2], "pickup": true}"#,
            &EncodeOptions::new(),
        )
        .unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<o:order xmlns:o="urn:order" currency="EUR"><o:id>7</o:id>"#,
                r#"<o:line sku="A">1.50</o:line><o:line>2</o:line>"#,
                r#"<o:pickup>true</o:pickup></o:order>"#
            )
        );
    }

    #[test]
    fn test_single_key_root() {
        let xml = encode_json(
            r#"{"order": {"currency": "USD", "id": 1, "line": 3}}"#,
            &EncodeOptions::new(),
        )
        .unwrap();
        assert!(xml.starts_with(r#"<o:order xmlns:o="urn:order" currency="USD">"#));
    }

    #[test]
    fn test_missing_required_element() {
        let err = encode_error(r#"{"@currency": "EUR", "id": 1}"#, &EncodeOptions::new());
        assert_eq!(err.kind(), ViolationKind::MissingRequiredElement);
        assert_eq!(err.path(), "/order/line");
    }

    #[test]
    fn test_too_many_occurrences() {
        let err = encode_error(
            r#"{"@currency": "EUR", "id": 1, "line": [1, 2, 3, 4]}"#,
            &EncodeOptions::new(),
        );
        assert!(matches!(
            err,
            EncodeError::TooManyOccurrences { max: 3, found: 4, .. }
        ));
    }

    #[test]
    fn test_choice_ambiguity() {
        let err = encode_error(
            r#"{"@currency": "EUR", "id": 1, "line": 1, "pickup": true, "address": "x"}"#,
            &EncodeOptions::new(),
        );
        assert_eq!(err.kind(), ViolationKind::ChoiceAmbiguity);
    }

    #[test]
    fn test_facet_violation_names_facet() {
        let err = encode_error(r#"{"@currency": "GBP", "id": 1, "line": 1}"#, &EncodeOptions::new());
        match err {
            EncodeError::SimpleTypeConstraintViolation { facet, path, .. } => {
                assert_eq!(facet, Facet::Enumeration);
                assert_eq!(path, "/order/@currency");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_attribute() {
        let err = encode_error(r#"{"id": 1, "line": 1}"#, &EncodeOptions::new());
        assert_eq!(err.kind(), ViolationKind::MissingRequiredAttribute);
    }

    #[test]
    fn test_ordered_and_unordered() {
        let json = r#"{"@currency": "EUR", "line": 1, "id": 1}"#;
        let err = encode_error(json, &EncodeOptions::new());
        assert_eq!(err.kind(), ViolationKind::MissingRequiredElement);

        let xml = encode_json(json, &EncodeOptions::new().with_allow_unordered(true)).unwrap();
        assert!(xml.contains("<o:id>1</o:id><o:line>1</o:line>"));
    }

    #[test]
    fn test_unexpected_key() {
        let err = encode_error(
            r#"{"@currency": "EUR", "id": 1, "line": 1, "bogus": 1}"#,
            &EncodeOptions::new(),
        );
        assert_eq!(err.kind(), ViolationKind::UnexpectedElement);
        assert_eq!(err.path(), "/order/bogus");
    }

    #[test]
    fn test_unbound_namespace() {
        let schema = schema();
        let value = Value::from_json_str(r#"{"@currency": "EUR", "id": 1, "line": 1}"#).unwrap();
        let err = schema
            .encode(&value, &PrefixTable::new(), &EncodeOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Encode(EncodeError::UnboundNamespace { .. })));
    }

    #[test]
    fn test_strict_validation_passes() {
        let xml = encode_json(
            r#"{"@currency": "EUR", "id": 1, "line": 1}"#,
            &EncodeOptions::new().with_strict_validation(true),
        );
        assert!(xml.is_ok());
    }

    #[test]
    fn test_unknown_root() {
        let schema = XsdSchema::from_str(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="a" type="xs:string"/>
                 <xs:element name="b" type="xs:string"/>
               </xs:schema>"#,
        )
        .unwrap();
        let err = schema
            .encode(&Value::from("x"), &PrefixTable::new(), &EncodeOptions::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Encode(EncodeError::UnknownRootElement { name: None })
        ));

        let doc = schema
            .encode(
                &Value::from("x"),
                &PrefixTable::new(),
                &EncodeOptions::new().with_root("b"),
            )
            .unwrap();
        assert_eq!(doc.root.local_name(), "b");
        assert_eq!(doc.root.text.as_deref(), Some("x"));
    }

    #[test]
    fn test_nillable_and_any_type() {
        let schema = XsdSchema::from_str(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="root">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element name="maybe" type="xs:int" nillable="true"/>
                       <xs:element name="never" type="xs:int" minOccurs="0"/>
                       <xs:element name="extra" minOccurs="0"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        let prefixes = PrefixTable::resolve(&schema, None, Vec::<(String, String)>::new()).unwrap();
        let value = Value::from_json_str(
            r#"{"maybe": null, "extra": {"@kind": "k", "inner": ["x", "y"]}}"#,
        )
        .unwrap();
        let doc = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        let xml = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
                r#"<maybe xsi:nil="true"/><extra kind="k"><inner>x</inner><inner>y</inner></extra></root>"#
            )
        );

        let value = Value::from_json_str(r#"{"maybe": 1, "never": null}"#).unwrap();
        let err = schema
            .encode(&value, &prefixes, &EncodeOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Encode(EncodeError::NotNillable { .. })));
    }

    #[test]
    fn test_qname_value_prefix_declared() {
        let schema = XsdSchema::from_str(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="measure">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:element name="unit" type="xs:QName"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        let prefixes = PrefixTable::resolve(&schema, None, vec![("u", "urn:units")]).unwrap();

        let value = Value::from_json_str(r#"{"unit": "u:kg"}"#).unwrap();
        let doc = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        let xml = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(xml, r#"<measure xmlns:u="urn:units"><unit>u:kg</unit></measure>"#);

        let value = Value::from_json_str(r#"{"unit": "zz:kg"}"#).unwrap();
        let err = match schema.encode(&value, &prefixes, &EncodeOptions::new()) {
            Err(Error::Encode(err)) => err,
            other => panic!("expected an encode error, got {:?}", other),
        };
        assert_eq!(err.kind(), ViolationKind::InvalidValue);
        assert_eq!(err.path(), "/measure/unit");
    }

    #[test]
    fn test_choice_leaves_keys_for_later_particles() {
        let schema = XsdSchema::from_str(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="pair">
                   <xs:complexType>
                     <xs:sequence>
                       <xs:choice>
                         <xs:element name="a" type="xs:string"/>
                         <xs:element name="b" type="xs:string"/>
                       </xs:choice>
                       <xs:element name="b" type="xs:string"/>
                     </xs:sequence>
                   </xs:complexType>
                 </xs:element>
               </xs:schema>"#,
        )
        .unwrap();
        let prefixes = PrefixTable::resolve(&schema, None, Vec::<(String, String)>::new()).unwrap();

        let value = Value::from_json_str(r#"{"a": "1", "b": "2"}"#).unwrap();
        let doc = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        let xml = doc
            .to_xml_string(&WriteOptions::new().with_xml_declaration(false))
            .unwrap();
        assert_eq!(xml, "<pair><a>1</a><b>2</b></pair>");
    }
}
