//! Global component arena
//!
//! [`XsdGlobals`] owns every type, element, attribute and group of a schema,
//! including those of imported namespaces. Components point at each other
//! through [`TypeRef`]s and qualified names, never by containment.

use crate::error::{Result, SchemaError};
use crate::namespaces::QName;
use crate::validators::attributes::{XsdAttribute, XsdAttributeGroup};
use crate::validators::builtins::BUILTIN_TYPES;
use crate::validators::complex_types::{ContentModel, XsdComplexType};
use crate::validators::elements::XsdElement;
use crate::validators::groups::{ModelGroup, Term, XsdGroup};
use crate::validators::identities::XsdIdentity;
use crate::validators::simple_types::XsdSimpleType;
use indexmap::IndexMap;
use std::fmt;

/// Type map - maps QNames to global types
pub type TypeMap = IndexMap<QName, XsdType>;
/// Element map - maps QNames to global element declarations
pub type ElementMap = IndexMap<QName, XsdElement>;
/// Attribute map - maps QNames to global attribute declarations
pub type AttributeMap = IndexMap<QName, XsdAttribute>;
/// Attribute group map - maps QNames to attribute group definitions
pub type AttributeGroupMap = IndexMap<QName, XsdAttributeGroup>;
/// Group map - maps QNames to model group definitions
pub type GroupMap = IndexMap<QName, XsdGroup>;
/// Substitution group map - maps head element QNames to direct members in declared order
pub type SubstitutionGroupMap = IndexMap<QName, Vec<QName>>;

/// Address of a type definition in the arena
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// Named global type
    Named(QName),
    /// Anonymous type by index
    Anonymous(usize),
}

impl TypeRef {
    /// Reference to a built-in type of the XSD namespace
    pub fn xsd(local_name: &str) -> Self {
        TypeRef::Named(QName::namespaced(crate::XSD_NAMESPACE, local_name))
    }

    /// xs:anyType
    pub fn any_type() -> Self {
        Self::xsd("anyType")
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::Anonymous(id) => write!(f, "<anonymous #{}>", id),
        }
    }
}

/// A type definition
#[derive(Debug, Clone)]
pub enum XsdType {
    /// Simple type
    Simple(XsdSimpleType),
    /// Complex type
    Complex(XsdComplexType),
}

/// Arena of schema components
#[derive(Debug, Clone)]
pub struct XsdGlobals {
    /// Named types (built-ins included)
    pub types: TypeMap,
    /// Anonymous types, addressed by [`TypeRef::Anonymous`]
    pub anonymous_types: Vec<XsdType>,
    /// Global elements
    pub elements: ElementMap,
    /// Global attributes
    pub attributes: AttributeMap,
    /// Named attribute groups
    pub attribute_groups: AttributeGroupMap,
    /// Named model groups
    pub groups: GroupMap,
    /// Substitution groups
    pub substitution_groups: SubstitutionGroupMap,
}

impl XsdGlobals {
    /// Create an arena holding the built-in types
    pub fn new() -> Self {
        let mut types = TypeMap::new();
        let any_type = XsdComplexType::any_type();
        types.insert(
            QName::namespaced(crate::XSD_NAMESPACE, "anyType"),
            XsdType::Complex(any_type),
        );
        for builtin in BUILTIN_TYPES {
            types.insert(
                QName::namespaced(crate::XSD_NAMESPACE, builtin.name),
                XsdType::Simple(XsdSimpleType::builtin(builtin)),
            );
        }
        Self {
            types,
            anonymous_types: Vec::new(),
            elements: ElementMap::new(),
            attributes: AttributeMap::new(),
            attribute_groups: AttributeGroupMap::new(),
            groups: GroupMap::new(),
            substitution_groups: SubstitutionGroupMap::new(),
        }
    }

    /// Look up a type
    pub fn get_type(&self, type_ref: &TypeRef) -> Option<&XsdType> {
        match type_ref {
            TypeRef::Named(name) => self.types.get(name),
            TypeRef::Anonymous(id) => self.anonymous_types.get(*id),
        }
    }

    /// Look up a type for modification
    pub fn get_type_mut(&mut self, type_ref: &TypeRef) -> Option<&mut XsdType> {
        match type_ref {
            TypeRef::Named(name) => self.types.get_mut(name),
            TypeRef::Anonymous(id) => self.anonymous_types.get_mut(*id),
        }
    }

    /// Look up a simple type
    pub fn simple_type(&self, type_ref: &TypeRef) -> Option<&XsdSimpleType> {
        match self.get_type(type_ref)? {
            XsdType::Simple(simple) => Some(simple),
            XsdType::Complex(_) => None,
        }
    }

    /// Look up a complex type
    pub fn complex_type(&self, type_ref: &TypeRef) -> Option<&XsdComplexType> {
        match self.get_type(type_ref)? {
            XsdType::Complex(complex) => Some(complex),
            XsdType::Simple(_) => None,
        }
    }

    /// Store an anonymous type and return its reference
    pub fn add_anonymous(&mut self, xsd_type: XsdType) -> TypeRef {
        self.anonymous_types.push(xsd_type);
        TypeRef::Anonymous(self.anonymous_types.len() - 1)
    }

    /// Register a named type
    pub fn insert_type(&mut self, name: QName, xsd_type: XsdType) -> Result<()> {
        insert_unique(&mut self.types, "type", name, xsd_type)
    }

    /// Register a global element
    pub fn insert_element(&mut self, element: XsdElement) -> Result<()> {
        insert_unique(&mut self.elements, "element", element.name.clone(), element)
    }

    /// Register a global attribute
    pub fn insert_attribute(&mut self, attribute: XsdAttribute) -> Result<()> {
        insert_unique(&mut self.attributes, "attribute", attribute.name.clone(), attribute)
    }

    /// Register a named attribute group
    pub fn insert_attribute_group(&mut self, name: QName, group: XsdAttributeGroup) -> Result<()> {
        insert_unique(&mut self.attribute_groups, "attribute group", name, group)
    }

    /// Register a named model group
    pub fn insert_group(&mut self, group: XsdGroup) -> Result<()> {
        insert_unique(&mut self.groups, "group", group.name.clone(), group)
    }

    /// Look up a global element
    pub fn element(&self, name: &QName) -> Option<&XsdElement> {
        self.elements.get(name)
    }

    /// Elements that may appear in place of `head`, transitively, in declared
    /// order. The head itself is not included.
    pub fn substitutes(&self, head: &QName) -> Vec<&XsdElement> {
        let mut found: Vec<&XsdElement> = Vec::new();
        let mut pending = vec![head];
        while let Some(current) = pending.pop() {
            if let Some(members) = self.substitution_groups.get(current) {
                for member in members {
                    if let Some(decl) = self.elements.get(member) {
                        if decl.name != *head && !found.iter().any(|f| f.name == decl.name) {
                            found.push(decl);
                            pending.push(&decl.name);
                        }
                    }
                }
            }
        }
        // keep the declared order of the flattened members
        found.sort_by_key(|decl| self.elements.get_index_of(&decl.name));
        found
    }

    /// Direct base of a type, following built-in and user derivations
    pub fn base_type(&self, type_ref: &TypeRef) -> Option<TypeRef> {
        match self.get_type(type_ref)? {
            XsdType::Simple(simple) => match simple.base() {
                Some(base) => Some(base.clone()),
                None if *type_ref == TypeRef::any_type() => None,
                None => Some(TypeRef::any_type()),
            },
            XsdType::Complex(complex) => match &complex.base {
                Some((_, base)) => Some(base.clone()),
                None if *type_ref == TypeRef::any_type() => None,
                None => Some(TypeRef::any_type()),
            },
        }
    }

    /// True if `derived` equals `base` or derives from it
    pub fn is_derived_from(&self, derived: &TypeRef, base: &TypeRef) -> bool {
        if *base == TypeRef::any_type() {
            return true;
        }
        let mut current = Some(derived.clone());
        let mut steps = 0usize;
        while let Some(type_ref) = current {
            if type_ref == *base {
                return true;
            }
            steps += 1;
            if steps > self.types.len() + self.anonymous_types.len() {
                break;
            }
            current = self.base_type(&type_ref);
        }
        // list and union types derive from anySimpleType
        base == &TypeRef::xsd("anySimpleType") && self.simple_type(derived).is_some()
    }

    /// Display name of a type for messages
    pub fn type_name(&self, type_ref: &TypeRef) -> String {
        match self.get_type(type_ref) {
            Some(XsdType::Simple(XsdSimpleType { name: Some(name), .. }))
            | Some(XsdType::Complex(XsdComplexType { name: Some(name), .. })) => name.to_string(),
            _ => type_ref.to_string(),
        }
    }

    /// Number of global components declared by schema documents
    pub fn component_count(&self) -> usize {
        self.types.len() + self.anonymous_types.len()
            + self.elements.len()
            + self.attributes.len()
            + self.attribute_groups.len()
            + self.groups.len()
    }

    /// Identity constraints of every element declaration, global or local.
    ///
    /// A constraint on a local element of a named group is listed once per
    /// copy of that group.
    pub fn identity_constraints(&self) -> Vec<&XsdIdentity> {
        let mut found = Vec::new();
        for element in self.elements.values() {
            found.extend(element.identities.iter());
        }
        for xsd_type in self.types.values().chain(self.anonymous_types.iter()) {
            if let XsdType::Complex(XsdComplexType {
                content: ContentModel::Group { group, .. },
                ..
            }) = xsd_type
            {
                collect_identities(group, &mut found);
            }
        }
        for group in self.groups.values() {
            collect_identities(&group.model, &mut found);
        }
        found
    }

    /// Namespaces that declare at least one global component
    pub fn namespaces(&self) -> Vec<Option<String>> {
        let mut namespaces: Vec<Option<String>> = Vec::new();
        let names = self
            .types
            .keys()
            .chain(self.elements.keys())
            .chain(self.attributes.keys())
            .chain(self.attribute_groups.keys())
            .chain(self.groups.keys());
        for name in names {
            if !namespaces.contains(&name.namespace) {
                namespaces.push(name.namespace.clone());
            }
        }
        namespaces
    }
}

impl Default for XsdGlobals {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_identities<'g>(group: &'g ModelGroup, found: &mut Vec<&'g XsdIdentity>) {
    for particle in &group.particles {
        match &particle.term {
            Term::Element(element) => found.extend(element.identities.iter()),
            Term::Group(nested) => collect_identities(nested, found),
            _ => {}
        }
    }
}

fn insert_unique<V>(
    map: &mut IndexMap<QName, V>,
    kind: &str,
    name: QName,
    value: V,
) -> Result<()> {
    if map.contains_key(&name) {
        return Err(SchemaError::MalformedSchema(format!("duplicate {} '{}'", kind, name)).into());
    }
    map.insert(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::complex_types::Derivation;

    #[test]
    fn test_builtins_registered() {
        let globals = XsdGlobals::new();
        assert!(globals.simple_type(&TypeRef::xsd("string")).is_some());
        assert!(globals.complex_type(&TypeRef::any_type()).is_some());
        assert!(globals.simple_type(&TypeRef::xsd("anyType")).is_none());
    }

    #[test]
    fn test_builtin_derivation() {
        let globals = XsdGlobals::new();
        assert!(globals.is_derived_from(&TypeRef::xsd("byte"), &TypeRef::xsd("integer")));
        assert!(globals.is_derived_from(&TypeRef::xsd("byte"), &TypeRef::xsd("decimal")));
        assert!(!globals.is_derived_from(&TypeRef::xsd("string"), &TypeRef::xsd("decimal")));
        assert!(globals.is_derived_from(&TypeRef::xsd("string"), &TypeRef::any_type()));
    }

    #[test]
    fn test_user_derivation_and_duplicates() {
        let mut globals = XsdGlobals::new();
        let base = QName::namespaced("urn:t", "Base");
        let derived = QName::namespaced("urn:t", "Derived");
        globals
            .insert_type(base.clone(), XsdType::Complex(XsdComplexType::new(Some(base.clone()), ContentModel::Empty)))
            .unwrap();
        let ct = XsdComplexType::new(Some(derived.clone()), ContentModel::Empty)
            .with_base(Derivation::Extension, TypeRef::Named(base.clone()));
        globals.insert_type(derived.clone(), XsdType::Complex(ct.clone())).unwrap();
        assert!(globals.insert_type(derived.clone(), XsdType::Complex(ct)).is_err());

        assert!(globals.is_derived_from(&TypeRef::Named(derived), &TypeRef::Named(base.clone())));
        let anon = globals.add_anonymous(XsdType::Complex(XsdComplexType::new(None, ContentModel::Empty)));
        assert_eq!(anon, TypeRef::Anonymous(0));
        assert!(!globals.is_derived_from(&anon, &TypeRef::Named(base)));
    }

    #[test]
    fn test_substitutes_transitive_in_declared_order() {
        let mut globals = XsdGlobals::new();
        let q = |n: &str| QName::namespaced("urn:t", n);
        for name in ["head", "a", "b", "c"] {
            globals
                .insert_element(XsdElement::new(q(name), TypeRef::xsd("string")).global())
                .unwrap();
        }
        globals.substitution_groups.insert(q("head"), vec![q("a"), q("c")]);
        globals.substitution_groups.insert(q("a"), vec![q("b")]);

        let names: Vec<&str> = globals
            .substitutes(&q("head"))
            .iter()
            .map(|e| e.name.local_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
