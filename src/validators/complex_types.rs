//! XSD complex types
//!
//! A complex type is its content model plus its attribute uses. Derivation
//! is applied when the schema is built: afterwards `content`, `attributes`
//! and `any_attribute` are the effective ones, inherited parts included.

use crate::namespaces::QName;
use crate::validators::attributes::AttributeUses;
use crate::validators::facets::FacetSet;
use crate::validators::globals::TypeRef;
use crate::validators::groups::ModelGroup;
use crate::validators::particles::Occurs;
use crate::validators::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};

/// Derivation method of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// xs:extension
    Extension,
    /// xs:restriction
    Restriction,
}

/// Content of a complex type
#[derive(Debug, Clone)]
pub enum ContentModel {
    /// No character data, no children
    Empty,
    /// Element content described by a sequence, choice or all group
    Group {
        /// The top-level model group
        group: ModelGroup,
        /// Its occurrence bounds
        occurs: Occurs,
    },
    /// Character data of a simple type, no children
    SimpleContent(TypeRef),
    /// Anything (xs:anyType)
    Any,
}

impl ContentModel {
    /// Model group content with default occurrence
    pub fn group(group: ModelGroup) -> Self {
        ContentModel::Group {
            group,
            occurs: Occurs::once(),
        }
    }

    /// True for [`ContentModel::SimpleContent`]
    pub fn is_simple(&self) -> bool {
        matches!(self, ContentModel::SimpleContent(_))
    }
}

/// A complex type definition
#[derive(Debug, Clone)]
pub struct XsdComplexType {
    /// Type name (None for anonymous types)
    pub name: Option<QName>,
    /// Base type and derivation method
    pub base: Option<(Derivation, TypeRef)>,
    /// abstract="true"
    pub is_abstract: bool,
    /// mixed="true": character data allowed between children
    pub mixed: bool,
    /// Content model
    pub content: ContentModel,
    /// Attribute uses
    pub attributes: AttributeUses,
    /// Referenced attribute groups, flattened when the schema is built
    pub attribute_groups: Vec<QName>,
    /// xs:anyAttribute
    pub any_attribute: Option<Wildcard>,
    /// Facets of a simpleContent restriction, applied to the inherited simple type
    pub content_facets: Option<FacetSet>,
}

impl XsdComplexType {
    /// A complex type with the given content and no attributes
    pub fn new(name: Option<QName>, content: ContentModel) -> Self {
        Self {
            name,
            base: None,
            is_abstract: false,
            mixed: false,
            content,
            attributes: AttributeUses::new(),
            attribute_groups: Vec::new(),
            any_attribute: None,
            content_facets: None,
        }
    }

    /// xs:anyType
    pub fn any_type() -> Self {
        let mut any = Self::new(
            Some(QName::namespaced(crate::XSD_NAMESPACE, "anyType")),
            ContentModel::Any,
        );
        any.mixed = true;
        any.any_attribute = Some(Wildcard::new(NamespaceConstraint::Any, ProcessContents::Lax));
        any
    }

    /// Set the derivation
    pub fn with_base(mut self, derivation: Derivation, base: TypeRef) -> Self {
        self.base = Some((derivation, base));
        self
    }

    /// Simple type of the character data, for simple content
    pub fn simple_content_type(&self) -> Option<&TypeRef> {
        match &self.content {
            ContentModel::SimpleContent(type_ref) => Some(type_ref),
            _ => None,
        }
    }

    /// True if the type has element content
    pub fn has_element_content(&self) -> bool {
        matches!(self.content, ContentModel::Group { .. } | ContentModel::Any)
    }
}
