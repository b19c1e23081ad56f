//! XSD attribute declarations, attribute uses and attribute groups

use crate::namespaces::QName;
use crate::validators::globals::TypeRef;
use crate::validators::wildcards::Wildcard;
use indexmap::IndexMap;

/// An attribute declaration
#[derive(Debug, Clone, PartialEq)]
pub struct XsdAttribute {
    /// Qualified attribute name
    pub name: QName,
    /// Simple type of the value
    pub type_ref: TypeRef,
    /// Default value
    pub default: Option<String>,
    /// Fixed value
    pub fixed: Option<String>,
}

impl XsdAttribute {
    /// Create a new attribute declaration
    pub fn new(name: QName, type_ref: TypeRef) -> Self {
        Self {
            name,
            type_ref,
            default: None,
            fixed: None,
        }
    }
}

/// How a complex type or attribute group uses an attribute
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUse {
    /// The declaration (filled from the global one for references at build time)
    pub attribute: XsdAttribute,
    /// use="required"
    pub required: bool,
    /// use="prohibited" (removes an inherited attribute in a restriction)
    pub prohibited: bool,
    /// Referenced global attribute, for ref="..."
    pub reference: Option<QName>,
}

impl AttributeUse {
    /// Optional use of a declaration
    pub fn new(attribute: XsdAttribute) -> Self {
        Self {
            attribute,
            required: false,
            prohibited: false,
            reference: None,
        }
    }

    /// Attribute name
    pub fn name(&self) -> &QName {
        &self.attribute.name
    }
}

/// Attribute uses keyed by name, in declared order
pub type AttributeUses = IndexMap<QName, AttributeUse>;

/// A named attribute group
#[derive(Debug, Clone, Default)]
pub struct XsdAttributeGroup {
    /// Group name
    pub name: Option<QName>,
    /// Directly declared uses
    pub attributes: AttributeUses,
    /// Referenced attribute groups, flattened when the schema is built
    pub attribute_groups: Vec<QName>,
    /// xs:anyAttribute
    pub any_attribute: Option<Wildcard>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_use() {
        let decl = XsdAttribute::new(QName::local("id"), TypeRef::xsd("ID"));
        let mut attr_use = AttributeUse::new(decl);
        attr_use.required = true;
        assert_eq!(attr_use.name().local_name, "id");

        let mut uses = AttributeUses::new();
        uses.insert(attr_use.name().clone(), attr_use);
        assert!(uses[&QName::local("id")].required);
    }
}
