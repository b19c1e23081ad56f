//! XML Schema validators
//!
//! The schema component model, the schema loader that builds it, and the two
//! passes that run against it: encoding value trees into XML documents and
//! validating XML documents.

// Schema components
pub mod attributes;
pub mod builtins;
pub mod complex_types;
pub mod elements;
pub mod facets;
pub mod globals;
pub mod groups;
pub mod identities;
pub mod particles;
pub mod simple_types;
pub mod wildcards;

// Loading
pub mod parsing;
pub mod schemas;

// Passes over the model
pub mod document_validation;
pub mod encoding;
pub mod models;
pub mod validation;

// Re-exports
pub use attributes::{AttributeUse, XsdAttribute, XsdAttributeGroup};
pub use complex_types::{ContentModel, Derivation, XsdComplexType};
pub use document_validation::validate_document;
pub use elements::XsdElement;
pub use encoding::{encode, EncodeOptions};
pub use globals::{TypeRef, XsdGlobals, XsdType};
pub use groups::{Compositor, ModelGroup, Particle, Term, XsdGroup};
pub use identities::{IdentityKind, XsdIdentity};
pub use particles::Occurs;
pub use schemas::{SchemaBuilder, XsdSchema};
pub use simple_types::{Variety, XsdSimpleType};
pub use validation::ValidationContext;
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
