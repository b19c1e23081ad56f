//! XSD simple types
//!
//! Atomic, list and union types. After the schema is built every simple type
//! carries its effective variety and the facets accumulated along its
//! restriction chain, so checking a value never walks the base chain.

use crate::error::Facet;
use crate::namespaces::QName;
use crate::validators::builtins::{BuiltinType, PrimitiveKind};
use crate::validators::facets::{FacetSet, FacetViolation, WhiteSpace};
use crate::validators::globals::{TypeRef, XsdGlobals};
use crate::values::Value;

/// Effective variety of a simple type
#[derive(Debug, Clone, PartialEq)]
pub enum Variety {
    /// Single atomic value
    Atomic(PrimitiveKind),
    /// Whitespace separated items of the item type
    List(TypeRef),
    /// First member type that accepts the value
    Union(Vec<TypeRef>),
}

/// How a simple type is defined
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleDerivation {
    /// Built-in type with its base
    Builtin(Option<TypeRef>),
    /// xs:restriction
    Restriction(TypeRef),
    /// xs:list
    List(TypeRef),
    /// xs:union
    Union(Vec<TypeRef>),
}

/// A simple type definition
#[derive(Debug, Clone)]
pub struct XsdSimpleType {
    /// Type name (None for anonymous types)
    pub name: Option<QName>,
    /// Definition
    pub derivation: SimpleDerivation,
    /// Effective variety (resolved at build time)
    pub variety: Variety,
    /// Facets declared by this definition only
    pub local_facets: FacetSet,
    /// Effective facets (resolved at build time)
    pub facets: FacetSet,
}

impl XsdSimpleType {
    /// A simple type defined by restriction of `base`
    pub fn restriction(name: Option<QName>, base: TypeRef, local_facets: FacetSet) -> Self {
        Self {
            name,
            derivation: SimpleDerivation::Restriction(base),
            variety: Variety::Atomic(PrimitiveKind::AnySimpleType),
            local_facets,
            facets: FacetSet::new(),
        }
    }

    /// A list type
    pub fn list(name: Option<QName>, item: TypeRef) -> Self {
        Self {
            name,
            derivation: SimpleDerivation::List(item.clone()),
            variety: Variety::List(item),
            local_facets: FacetSet::new(),
            facets: FacetSet::new(),
        }
    }

    /// A union type
    pub fn union(name: Option<QName>, members: Vec<TypeRef>) -> Self {
        Self {
            name,
            derivation: SimpleDerivation::Union(members.clone()),
            variety: Variety::Union(members),
            local_facets: FacetSet::new(),
            facets: FacetSet::new(),
        }
    }

    /// A built-in type, already resolved
    pub fn builtin(builtin: &BuiltinType) -> Self {
        let mut facets = FacetSet::new();
        facets.min_inclusive = builtin.min.map(String::from);
        facets.max_inclusive = builtin.max.map(String::from);
        let variety = match builtin.list_item {
            Some(item) => {
                facets.min_length = Some(1);
                Variety::List(TypeRef::xsd(item))
            }
            None => Variety::Atomic(builtin.kind),
        };
        Self {
            name: Some(QName::namespaced(crate::XSD_NAMESPACE, builtin.name)),
            derivation: SimpleDerivation::Builtin(builtin.base.map(TypeRef::xsd)),
            variety,
            local_facets: FacetSet::new(),
            facets,
        }
    }

    /// Type this one is derived from
    pub fn base(&self) -> Option<&TypeRef> {
        match &self.derivation {
            SimpleDerivation::Builtin(base) => base.as_ref(),
            SimpleDerivation::Restriction(base) => Some(base),
            SimpleDerivation::List(_) | SimpleDerivation::Union(_) => None,
        }
    }

    /// True for list types
    pub fn is_list(&self) -> bool {
        matches!(self.variety, Variety::List(_))
    }

    /// Primitive kind of atomic types
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self.variety {
            Variety::Atomic(kind) => Some(kind),
            _ => None,
        }
    }

    /// Check a lexical value, returning its whitespace-normalized form
    pub fn validate_text(&self, text: &str, globals: &XsdGlobals) -> Result<String, FacetViolation> {
        match &self.variety {
            Variety::Atomic(kind) => {
                let normalized = self.facets.white_space_for(*kind).normalize(text);
                kind.check_lexical(&normalized)
                    .map_err(|message| FacetViolation::new(Facet::Lexical, message))?;
                self.facets.check(*kind, &normalized, kind.measure(&normalized))?;
                Ok(normalized)
            }
            Variety::List(item) => {
                let normalized = WhiteSpace::Collapse.normalize(text);
                let items: Vec<&str> = normalized.split(' ').filter(|s| !s.is_empty()).collect();
                if let Some(item_type) = globals.simple_type(item) {
                    for token in &items {
                        item_type.validate_text(token, globals)?;
                    }
                }
                self.facets
                    .check(PrimitiveKind::String, &normalized, items.len())?;
                Ok(normalized)
            }
            Variety::Union(members) => {
                let mut last_error = None;
                for member in members.iter().filter_map(|m| globals.simple_type(m)) {
                    match member.validate_text(text, globals) {
                        Ok(normalized) => {
                            let length = normalized.chars().count();
                            self.facets.check(PrimitiveKind::String, &normalized, length)?;
                            return Ok(normalized);
                        }
                        Err(err) => last_error = Some(err),
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    FacetViolation::new(Facet::Lexical, "no member type of the union accepts the value")
                }))
            }
        }
    }

    /// Format and check a scalar (or, for list types, an array) value
    pub fn encode_value(&self, value: &Value, globals: &XsdGlobals) -> Result<String, FacetViolation> {
        match (&self.variety, value) {
            (Variety::Atomic(kind), _) => {
                let lexical = kind
                    .format_value(value)
                    .map_err(|message| FacetViolation::new(Facet::Lexical, message))?;
                self.validate_text(&lexical, globals)
            }
            (Variety::List(item), Value::Array(items)) => {
                let item_type = globals.simple_type(item).ok_or_else(|| {
                    FacetViolation::new(Facet::Lexical, format!("unresolved list item type {}", item))
                })?;
                let tokens = items
                    .iter()
                    .map(|v| item_type.encode_value(v, globals))
                    .collect::<Result<Vec<_>, _>>()?;
                self.validate_text(&tokens.join(" "), globals)
            }
            (Variety::Union(members), _) => {
                let mut last_error = None;
                for member in members.iter().filter_map(|m| globals.simple_type(m)) {
                    match member.encode_value(value, globals) {
                        Ok(lexical) => return self.validate_text(&lexical, globals),
                        Err(err) => last_error = Some(err),
                    }
                }
                Err(last_error.unwrap_or_else(|| {
                    FacetViolation::new(Facet::Lexical, "no member type of the union accepts the value")
                }))
            }
            (_, scalar) => match scalar.scalar_text() {
                Some(text) => self.validate_text(&text, globals),
                None => Err(FacetViolation::new(
                    Facet::Lexical,
                    format!("expected a scalar or an array, got {}", scalar.type_name()),
                )),
            },
        }
    }
}
