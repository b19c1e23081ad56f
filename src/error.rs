//! Error types for xsdcodec
//!
//! Schema construction, namespace resolution and encoding fail fast with a
//! single error. Validation never fails fast: it accumulates [`Violation`]s
//! into a [`ValidationReport`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsdcodec operations
#[derive(Error, Debug)]
pub enum Error {
    /// Schema could not be loaded, imported or built
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Prefix table could not be resolved
    #[error("namespace error: {0}")]
    Namespace(#[from] NamespaceError),

    /// Value tree could not be encoded
    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// An XML tree does not conform to the schema
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationReport),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Name error (invalid XML name)
    #[error("name error: {0}")]
    Name(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing or writing error
    #[error("XML error: {0}")]
    Xml(String),

    /// JSON input error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<roxmltree::Error> for Error {
    fn from(err: roxmltree::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

/// Errors raised while loading, importing or building a schema.
///
/// A failed load or import leaves the builder exactly as it was before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// A reference points into a namespace for which no schema document was supplied
    #[error("no schema document for namespace '{namespace}' (needed by '{reference}')")]
    UnresolvedNamespace {
        /// The missing namespace URI
        namespace: String,
        /// The reference that needs it, in `{ns}local` form
        reference: String,
    },

    /// A reference names a component that no loaded document declares
    #[error("unresolved {kind} reference '{name}'")]
    UnresolvedReference {
        /// Component kind ("type", "element", "group", ...)
        kind: &'static str,
        /// Referenced name in `{ns}local` form
        name: String,
    },

    /// The schema uses a construct this engine does not map
    #[error("unsupported schema construct <xs:{construct}> in {context}")]
    UnsupportedSchemaConstruct {
        /// Local name of the construct
        construct: String,
        /// Where it was found
        context: String,
    },

    /// A substitution group member whose type is not derived from the head's type
    #[error("element '{member}' cannot substitute '{head}': its type is not derived from the head type")]
    InvalidSubstitutionGroupMember {
        /// Member element
        member: String,
        /// Head element
        head: String,
    },

    /// Structurally invalid schema document
    #[error("malformed schema: {0}")]
    MalformedSchema(String),
}

/// Errors raised while building a prefix table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// The same prefix was bound to two different namespace URIs
    #[error("prefix '{prefix}' is bound to both '{existing}' and '{requested}'")]
    ConflictingNamespaceBinding {
        /// The prefix ("" for the default namespace)
        prefix: String,
        /// URI already bound
        existing: String,
        /// URI requested
        requested: String,
    },

    /// A target namespace alias was requested for a schema without a target namespace
    #[error("cannot bind alias '{alias}': schema has no target namespace")]
    NoTargetNamespace {
        /// Requested alias
        alias: String,
    },

    /// A prefix is not a valid NCName
    #[error("invalid namespace prefix '{0}'")]
    InvalidPrefix(String),

    /// A prefixed name uses a prefix with no binding
    #[error("unknown namespace prefix '{0}'")]
    UnknownPrefix(String),
}

/// Errors raised while encoding a value tree. Every variant except
/// [`EncodeError::UnknownRootElement`] carries the offending value path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A required element has no value
    #[error("{path}: missing required element '{element}'")]
    MissingRequiredElement {
        /// Value path where the element was expected
        path: String,
        /// Expected element(s)
        element: String,
    },

    /// More values than maxOccurs allows
    #[error("{path}: element '{element}' occurs {found} times, at most {max} allowed")]
    TooManyOccurrences {
        /// Value path of the key
        path: String,
        /// Element name
        element: String,
        /// Allowed occurrences
        max: usize,
        /// Supplied occurrences
        found: usize,
    },

    /// Several keys select different branches of a single choice
    #[error("{path}: keys {candidates:?} select different branches of the same choice")]
    ChoiceAmbiguity {
        /// Value path of the owning object
        path: String,
        /// Competing keys
        candidates: Vec<String>,
    },

    /// A key names an abstract element
    #[error("{path}: element '{element}' is abstract, use a member of its substitution group")]
    AbstractElementUsed {
        /// Value path of the key
        path: String,
        /// The abstract element
        element: String,
    },

    /// A required abstract head has no substituting member in the value
    #[error("{path}: no member of the substitution group of '{head}' found")]
    NoSubstitutionGroupMember {
        /// Value path of the owning object
        path: String,
        /// Head element
        head: String,
    },

    /// A scalar failed a facet of its simple type
    #[error("{path}: value {value:?} violates facet '{facet}': {message}")]
    SimpleTypeConstraintViolation {
        /// Value path of the scalar
        path: String,
        /// Failing facet
        facet: Facet,
        /// Offending lexical value
        value: String,
        /// Detail
        message: String,
    },

    /// A required attribute has no value
    #[error("{path}: missing required attribute '{attribute}'")]
    MissingRequiredAttribute {
        /// Value path of the owning object
        path: String,
        /// Attribute name
        attribute: String,
    },

    /// A tag needs a namespace the prefix table does not bind
    #[error("{path}: namespace '{namespace}' has no prefix binding")]
    UnboundNamespace {
        /// Value path of the tag
        path: String,
        /// The unbound namespace URI
        namespace: String,
    },

    /// A key matches no element of the content model
    #[error("{path}: unexpected element '{key}'")]
    UnexpectedElement {
        /// Value path of the key
        path: String,
        /// The key
        key: String,
    },

    /// An attribute key matches no declared attribute
    #[error("{path}: unexpected attribute '{attribute}'")]
    UnexpectedAttribute {
        /// Value path of the key
        path: String,
        /// The key
        attribute: String,
    },

    /// No root element could be selected
    #[error("cannot select a root element{}", .name.as_ref().map(|n| format!(" named '{}'", n)).unwrap_or_default())]
    UnknownRootElement {
        /// Requested root name, if any
        name: Option<String>,
    },

    /// Value shape does not fit the declared type (e.g. an object for a simple type)
    #[error("{path}: {message}")]
    InvalidValue {
        /// Value path
        path: String,
        /// Detail
        message: String,
    },

    /// Null supplied for an element that is not nillable
    #[error("{path}: element '{element}' is not nillable")]
    NotNillable {
        /// Value path
        path: String,
        /// Element name
        element: String,
    },
}

impl EncodeError {
    /// Value path of the error (empty for root selection failures)
    pub fn path(&self) -> &str {
        match self {
            EncodeError::MissingRequiredElement { path, .. }
            | EncodeError::TooManyOccurrences { path, .. }
            | EncodeError::ChoiceAmbiguity { path, .. }
            | EncodeError::AbstractElementUsed { path, .. }
            | EncodeError::NoSubstitutionGroupMember { path, .. }
            | EncodeError::SimpleTypeConstraintViolation { path, .. }
            | EncodeError::MissingRequiredAttribute { path, .. }
            | EncodeError::UnboundNamespace { path, .. }
            | EncodeError::UnexpectedElement { path, .. }
            | EncodeError::UnexpectedAttribute { path, .. }
            | EncodeError::InvalidValue { path, .. }
            | EncodeError::NotNillable { path, .. } => path,
            EncodeError::UnknownRootElement { .. } => "",
        }
    }

    /// Kind of the error in the shared violation taxonomy
    pub fn kind(&self) -> ViolationKind {
        match self {
            EncodeError::MissingRequiredElement { .. } => ViolationKind::MissingRequiredElement,
            EncodeError::TooManyOccurrences { .. } => ViolationKind::TooManyOccurrences,
            EncodeError::ChoiceAmbiguity { .. } => ViolationKind::ChoiceAmbiguity,
            EncodeError::AbstractElementUsed { .. } => ViolationKind::AbstractElementUsed,
            EncodeError::NoSubstitutionGroupMember { .. } => {
                ViolationKind::NoSubstitutionGroupMember
            }
            EncodeError::SimpleTypeConstraintViolation { .. } => {
                ViolationKind::SimpleTypeConstraintViolation
            }
            EncodeError::MissingRequiredAttribute { .. } => ViolationKind::MissingRequiredAttribute,
            EncodeError::UnboundNamespace { .. } => ViolationKind::UnboundNamespace,
            EncodeError::UnexpectedElement { .. } => ViolationKind::UnexpectedElement,
            EncodeError::UnexpectedAttribute { .. } => ViolationKind::UnexpectedAttribute,
            EncodeError::UnknownRootElement { .. } => ViolationKind::UnknownElement,
            EncodeError::InvalidValue { .. } => ViolationKind::InvalidValue,
            EncodeError::NotNillable { .. } => ViolationKind::NotNillable,
        }
    }
}

/// Constraining facet named by a simple type failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Facet {
    /// Lexical space of the primitive type
    Lexical,
    /// xs:pattern
    Pattern,
    /// xs:enumeration
    Enumeration,
    /// xs:minInclusive
    MinInclusive,
    /// xs:maxInclusive
    MaxInclusive,
    /// xs:minExclusive
    MinExclusive,
    /// xs:maxExclusive
    MaxExclusive,
    /// xs:length
    Length,
    /// xs:minLength
    MinLength,
    /// xs:maxLength
    MaxLength,
    /// xs:totalDigits
    TotalDigits,
    /// xs:fractionDigits
    FractionDigits,
    /// xs:whiteSpace
    WhiteSpace,
    /// fixed value constraint of an element or attribute
    Fixed,
}

impl Facet {
    /// Name as written in a schema
    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Lexical => "lexical",
            Facet::Pattern => "pattern",
            Facet::Enumeration => "enumeration",
            Facet::MinInclusive => "minInclusive",
            Facet::MaxInclusive => "maxInclusive",
            Facet::MinExclusive => "minExclusive",
            Facet::MaxExclusive => "maxExclusive",
            Facet::Length => "length",
            Facet::MinLength => "minLength",
            Facet::MaxLength => "maxLength",
            Facet::TotalDigits => "totalDigits",
            Facet::FractionDigits => "fractionDigits",
            Facet::WhiteSpace => "whiteSpace",
            Facet::Fixed => "fixed",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a violation, shared by encode errors and validation reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    /// A required element is absent
    MissingRequiredElement,
    /// An element occurs more often than allowed
    TooManyOccurrences,
    /// Content selects several branches of one choice
    ChoiceAmbiguity,
    /// An abstract element appears directly
    AbstractElementUsed,
    /// A required abstract head has no member present
    NoSubstitutionGroupMember,
    /// A simple value fails a facet
    SimpleTypeConstraintViolation,
    /// A required attribute is absent
    MissingRequiredAttribute,
    /// A namespace has no prefix binding
    UnboundNamespace,
    /// An element the content model does not allow here
    UnexpectedElement,
    /// An attribute the type does not declare
    UnexpectedAttribute,
    /// An element with no global declaration where one is required
    UnknownElement,
    /// Character data where the content model allows none
    UnexpectedText,
    /// Value shape does not fit the declared type
    InvalidValue,
    /// xsi:nil on an element that is not nillable
    NotNillable,
    /// xsi:type names an unknown or underived type
    InvalidXsiType,
    /// Two nodes selected by a key or unique constraint share a value
    DuplicateKey,
    /// A key field selects no node, or several
    MissingKeyField,
    /// A keyref value matches no key in scope
    KeyNotFound,
}

/// A single validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Ancestor chain of the offending element or attribute, e.g. `/ns:root/ns:item[2]/@id`
    pub path: String,
    /// Violation kind
    pub kind: ViolationKind,
    /// Failing facet for simple type violations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facet: Option<Facet>,
    /// Human readable detail
    pub message: String,
}

impl Violation {
    /// Create a new violation
    pub fn new(path: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            facet: None,
            message: message.into(),
        }
    }

    /// Set the failing facet
    pub fn with_facet(mut self, facet: Facet) -> Self {
        self.facet = Some(facet);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}: {}", self.path, self.kind, self.message)
    }
}

/// All violations found in one validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Violations in document order
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no violation was found
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// True when the report holds no violations
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Iterate over the violations
    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.violations.iter()
    }

    /// Violations of one kind
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    /// Turn the report into `Ok(())` when empty
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  {}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

impl<'a> IntoIterator for &'a ValidationReport {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.violations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_error_carries_path() {
        let err = EncodeError::MissingRequiredElement {
            path: "/order/customer".to_string(),
            element: "{urn:shop}customer".to_string(),
        };
        assert_eq!(err.path(), "/order/customer");
        assert_eq!(err.kind(), ViolationKind::MissingRequiredElement);
        assert!(err.to_string().contains("customer"));
    }

    #[test]
    fn test_facet_display() {
        let err = EncodeError::SimpleTypeConstraintViolation {
            path: "/a".to_string(),
            facet: Facet::MaxInclusive,
            value: "11".to_string(),
            message: "greater than 10".to_string(),
        };
        assert!(err.to_string().contains("maxInclusive"));
    }

    #[test]
    fn test_report_into_result() {
        assert!(ValidationReport::new().into_result().is_ok());

        let mut report = ValidationReport::new();
        report.violations.push(Violation::new(
            "/root",
            ViolationKind::UnexpectedText,
            "text not allowed",
        ));
        assert_eq!(report.len(), 1);
        assert_eq!(report.of_kind(ViolationKind::UnexpectedText).count(), 1);
        match report.into_result() {
            Err(Error::Validation(r)) => assert_eq!(r.violations[0].path, "/root"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_schema_error_wraps() {
        let err: Error = SchemaError::UnresolvedNamespace {
            namespace: "urn:x".to_string(),
            reference: "{urn:x}item".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::UnresolvedNamespace { .. })
        ));
    }
}
