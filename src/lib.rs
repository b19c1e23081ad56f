//! # xsdcodec
//!
//! Schema-driven encoding of JSON-like value trees into namespace-qualified
//! XML, and validation of XML documents against XSD 1.0 schemas.
//!
//! A schema is loaded from a main document plus any number of imported
//! documents into one component model. Encoding walks a value tree through
//! that model and produces an XML tree whose element names carry the
//! namespace each declaration belongs to. Validation walks an XML tree
//! through the same model and collects every violation it finds.
//!
//! ## Features
//!
//! - Multi-namespace schemas built from `xs:import` and `xs:include`
//! - Prefix resolution with a caller-chosen alias for the target namespace
//! - Sequences, choices, `xs:all`, wildcards and substitution groups
//! - Built-in simple types and facets
//! - Nillable elements and `xsi:type` derivation
//! - Protection against oversized and deeply nested input
//!
//! ## Example
//!
//! ```rust,ignore
//! use xsdcodec::{EncodeOptions, PrefixTable, SchemaBuilder, Value, WriteOptions};
//!
//! let schema = SchemaBuilder::new()
//!     .load_file("order.xsd")?
//!     .import_file("urn:common", "common.xsd")?
//!     .build()?;
//!
//! let prefixes = PrefixTable::resolve(&schema, Some("ord"), Vec::<(&str, &str)>::new())?;
//! let value = Value::from_json_str(r#"{"order": {"id": "42"}}"#)?;
//! let doc = schema.encode(&value, &prefixes, &EncodeOptions::new())?;
//! println!("{}", doc.to_xml_string(&WriteOptions::new())?);
//!
//! let report = schema.validation_report(&doc);
//! assert!(report.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and namespaces
pub mod names;
pub mod namespaces;

// Resource loading
pub mod documents;
pub mod loaders;
pub mod locations;

// Values and their key conventions
pub mod converters;
pub mod values;

// Schema model, encoding and validation
pub mod validators;

// Re-exports for convenience
pub use converters::ConverterConfig;
pub use documents::{Document, Element, WriteOptions};
pub use error::{
    EncodeError, Error, Facet, NamespaceError, Result, SchemaError, ValidationReport, Violation,
    ViolationKind,
};
pub use limits::Limits;
pub use namespaces::{PrefixTable, QName};
pub use validators::{EncodeOptions, SchemaBuilder, XsdSchema};
pub use values::Value;

/// Version of the xsdcodec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XSD namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
