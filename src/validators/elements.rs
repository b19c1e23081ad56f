//! XSD element declarations

use crate::namespaces::QName;
use crate::validators::globals::TypeRef;
use crate::validators::identities::XsdIdentity;

/// An element declaration, global or local
#[derive(Debug, Clone, PartialEq)]
pub struct XsdElement {
    /// Qualified element name
    pub name: QName,
    /// Declared type
    pub type_ref: TypeRef,
    /// False when the type was defaulted (anyType, or the substitution head's type)
    pub explicit_type: bool,
    /// abstract="true"
    pub is_abstract: bool,
    /// nillable="true"
    pub nillable: bool,
    /// Head of the substitution group this element belongs to
    pub substitution_group: Option<QName>,
    /// Default value
    pub default: Option<String>,
    /// Fixed value
    pub fixed: Option<String>,
    /// Declared at schema top level
    pub is_global: bool,
    /// Key, keyref and unique constraints scoped to this element
    pub identities: Vec<XsdIdentity>,
}

impl XsdElement {
    /// Create a local element declaration of the given type
    pub fn new(name: QName, type_ref: TypeRef) -> Self {
        Self {
            name,
            type_ref,
            explicit_type: true,
            is_abstract: false,
            nillable: false,
            substitution_group: None,
            default: None,
            fixed: None,
            is_global: false,
            identities: Vec::new(),
        }
    }

    /// Mark the declaration as global
    pub fn global(mut self) -> Self {
        self.is_global = true;
        self
    }

    /// Set the abstract flag
    pub fn with_abstract(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    /// Set the substitution group head
    pub fn with_substitution_group(mut self, head: QName) -> Self {
        self.substitution_group = Some(head);
        self
    }

    /// Value constraint (fixed wins over default)
    pub fn value_constraint(&self) -> Option<&str> {
        self.fixed.as_deref().or(self.default.as_deref())
    }
}
