//! Encoding integration tests
//!
//! These tests load the fixture schemas from disk, encode the fixture values
//! and check the produced XML trees and the errors raised for bad input.

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use xsdcodec::{
    EncodeError, EncodeOptions, Error, PrefixTable, QName, SchemaBuilder, Value, ViolationKind,
    WriteOptions, XsdSchema,
};

fn fixtures_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path
}

fn load(relative: &str) -> XsdSchema {
    XsdSchema::from_file(fixtures_dir().join(relative)).unwrap()
}

fn value(relative: &str) -> Value {
    Value::from_json_str(&fs::read_to_string(fixtures_dir().join(relative)).unwrap()).unwrap()
}

fn no_bindings() -> Vec<(String, String)> {
    Vec::new()
}

fn compact() -> WriteOptions {
    WriteOptions::new().with_xml_declaration(false)
}

fn encode_error(result: xsdcodec::Result<xsdcodec::Document>) -> EncodeError {
    match result {
        Err(Error::Encode(err)) => err,
        other => panic!("expected an encode error, got {:?}", other.map(|d| d.root)),
    }
}

// ============================================================================
// Simple schema
// ============================================================================

#[test]
fn test_encode_simple_person() {
    let schema = load("simple/person.xsd");
    let prefixes = PrefixTable::resolve(&schema, None, no_bindings()).unwrap();
    let doc = schema
        .encode(&value("simple/person.json"), &prefixes, &EncodeOptions::new())
        .unwrap();

    assert_eq!(
        doc.to_xml_string(&compact()).unwrap(),
        concat!(
            r#"<person id="p1"><name>Ada Lovelace</name><age>36</age>"#,
            r#"<email>ada@example.org</email><email>countess@example.org</email>"#,
            r#"<birthDate>1815-12-10</birthDate><active>true</active></person>"#
        )
    );
}

#[test]
fn test_encode_simple_with_declaration_and_indent() {
    let schema = load("simple/person.xsd");
    let prefixes = PrefixTable::resolve(&schema, None, no_bindings()).unwrap();
    let doc = schema
        .encode(&value("simple/person.json"), &prefixes, &EncodeOptions::new())
        .unwrap();

    let xml = doc
        .to_xml_string(&WriteOptions::new().with_indent(2))
        .unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("\n  <name>Ada Lovelace</name>"));
}

#[test]
fn test_encode_missing_required_element_names_path() {
    let schema = load("simple/person.xsd");
    let prefixes = PrefixTable::resolve(&schema, None, no_bindings()).unwrap();
    let input = Value::from_json_str(r#"{"person": {"@id": "p1", "name": "Ada", "active": false}}"#)
        .unwrap();

    let err = encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new()));
    assert_eq!(err.kind(), ViolationKind::MissingRequiredElement);
    assert_eq!(err.path(), "/person/age");
}

#[test]
fn test_encode_range_facet() {
    let schema = load("simple/person.xsd");
    let prefixes = PrefixTable::resolve(&schema, None, no_bindings()).unwrap();
    let input = Value::from_json_str(
        r#"{"person": {"@id": "p1", "name": "Ada", "age": 151, "active": true}}"#,
    )
    .unwrap();

    match encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new())) {
        EncodeError::SimpleTypeConstraintViolation { facet, path, .. } => {
            assert_eq!(facet, xsdcodec::Facet::MaxInclusive);
            assert_eq!(path, "/person/age");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_encode_pattern_facet_in_array() {
    let schema = load("simple/person.xsd");
    let prefixes = PrefixTable::resolve(&schema, None, no_bindings()).unwrap();
    let input = Value::from_json_str(
        r#"{"person": {"@id": "p1", "name": "Ada", "age": 3, "email": ["a@b", "nope"], "active": true}}"#,
    )
    .unwrap();

    let err = encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new()));
    assert_eq!(err.kind(), ViolationKind::SimpleTypeConstraintViolation);
    assert_eq!(err.path(), "/person/email[1]");
}

#[test]
fn test_encode_is_deterministic() {
    let schema = load("simple/person.xsd");
    let prefixes = PrefixTable::resolve(&schema, None, no_bindings()).unwrap();
    let input = value("simple/person.json");

    let first = schema
        .encode(&input, &prefixes, &EncodeOptions::new())
        .unwrap()
        .to_xml_string(&WriteOptions::new())
        .unwrap();
    let second = schema
        .encode(&input, &prefixes, &EncodeOptions::new())
        .unwrap()
        .to_xml_string(&WriteOptions::new())
        .unwrap();
    assert_eq!(first, second);
}

// ============================================================================
// Substitution groups
// ============================================================================

fn container_schema() -> XsdSchema {
    load("substitution_group/container.xsd")
}

#[test]
fn test_substitution_member_takes_its_namespace() {
    let schema = container_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("ns1"), no_bindings()).unwrap();
    let input = Value::from_json_str(
        r#"{"container": {
            "label": "box",
            "concreteItem": [{"@code": "A", "value": "1.0"}, {"@code": "B", "value": 2}]
        }}"#,
    )
    .unwrap();

    let doc = schema
        .encode(&input, &prefixes, &EncodeOptions::new())
        .unwrap();
    assert_eq!(
        doc.root.name,
        QName::namespaced("urn:example:container", "container")
    );
    assert_eq!(doc.prefixes.prefix_for("urn:example:container"), Some("ns1"));

    let items: Vec<_> = doc.root.children.iter().skip(1).collect();
    assert_eq!(items.len(), 2);
    for item in items {
        assert_eq!(
            item.name,
            QName::namespaced("urn:example:items", "concreteItem")
        );
    }

    let xml = doc.to_xml_string(&compact()).unwrap();
    assert!(xml.starts_with(r#"<ns1:container xmlns:ns1="urn:example:container""#));
    assert!(xml.contains(r#"<ns2:concreteItem code="A"><ns2:value>1.0</ns2:value></ns2:concreteItem>"#));
}

#[test]
fn test_abstract_head_key_is_rejected() {
    let schema = container_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("ns1"), no_bindings()).unwrap();
    let input = Value::from_json_str(
        r#"{"container": {"label": "box", "abstractItem": {"@code": "A", "value": 1}}}"#,
    )
    .unwrap();

    let err = encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new()));
    assert_eq!(err.kind(), ViolationKind::AbstractElementUsed);
    assert_eq!(err.path(), "/container/abstractItem");
}

#[test]
fn test_missing_substitution_member() {
    let schema = container_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("ns1"), no_bindings()).unwrap();
    let input = Value::from_json_str(r#"{"container": {"label": "box"}}"#).unwrap();

    let err = encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new()));
    assert_eq!(err.kind(), ViolationKind::NoSubstitutionGroupMember);
}

#[test]
fn test_prefixed_key_selects_member() {
    let schema = container_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("ns1"), no_bindings()).unwrap();
    let input = Value::from_json_str(
        r#"{"ns1:container": {"ns1:label": "box", "ns2:concreteItem": {"@code": "A", "ns2:value": 1}}}"#,
    )
    .unwrap();

    let doc = schema
        .encode(&input, &prefixes, &EncodeOptions::new().with_strict_validation(true))
        .unwrap();
    assert_eq!(doc.root.children.len(), 2);
}

// ============================================================================
// Namespaces
// ============================================================================

#[test]
fn test_target_alias_binds_root_namespace() {
    let schema = container_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("ns1"), no_bindings()).unwrap();
    assert_eq!(prefixes.namespace_for("ns1"), Some("urn:example:container"));

    // the alias overrides a caller binding of the same prefix
    let prefixes =
        PrefixTable::resolve(&schema, Some("ns1"), [("ns1", "urn:somewhere:else")]).unwrap();
    assert_eq!(prefixes.namespace_for("ns1"), Some("urn:example:container"));
}

#[test]
fn test_conflicting_caller_bindings() {
    let schema = container_schema();
    let err = PrefixTable::resolve(&schema, None, [("p", "urn:one"), ("p", "urn:two")]).unwrap_err();
    assert!(matches!(
        err,
        Error::Namespace(xsdcodec::NamespaceError::ConflictingNamespaceBinding { .. })
    ));
}

#[test]
fn test_unbound_namespace() {
    let schema = container_schema();
    let mut prefixes = PrefixTable::new();
    prefixes.bind("ns1", "urn:example:container").unwrap();
    let input = Value::from_json_str(
        r#"{"container": {"label": "box", "concreteItem": {"@code": "A", "value": 1}}}"#,
    )
    .unwrap();

    let err = encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new()));
    match err {
        EncodeError::UnboundNamespace { namespace, .. } => {
            assert_eq!(namespace, "urn:example:items")
        }
        other => panic!("unexpected error {:?}", other),
    }
}

// ============================================================================
// Multiple namespaces
// ============================================================================

fn report_schema() -> XsdSchema {
    load("multi_namespace/report.xsd")
}

#[test]
fn test_multi_namespace_encode_and_validate() {
    let schema = report_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("r"), no_bindings()).unwrap();
    let doc = schema
        .encode(&value("multi_namespace/report.json"), &prefixes, &EncodeOptions::new())
        .unwrap();

    let namespaces: Vec<_> = doc
        .root
        .children
        .iter()
        .map(|child| child.namespace().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        namespaces,
        vec![
            "urn:example:report",
            "urn:example:alpha",
            "urn:example:beta",
            "urn:example:gamma",
        ]
    );

    let xml = doc.to_xml_string(&compact()).unwrap();
    assert!(xml.contains("<b:amount>1250000.50</b:amount>"));
    assert!(schema.validation_report(&doc).is_valid());
}

#[test]
fn test_multi_namespace_missing_element() {
    let schema = report_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("r"), no_bindings()).unwrap();
    let input = Value::from_json_str(
        r#"{"report": {
            "title": "t",
            "entity": "e",
            "period": {"start": "2025-01-01", "end": "2025-12-31"}
        }}"#,
    )
    .unwrap();

    let err = encode_error(schema.encode(&input, &prefixes, &EncodeOptions::new()));
    assert_eq!(err.kind(), ViolationKind::MissingRequiredElement);
    assert_eq!(err.path(), "/report/amount");
}

#[test]
fn test_root_from_imported_namespace() {
    let schema = report_schema();
    let prefixes = PrefixTable::resolve(&schema, Some("r"), no_bindings()).unwrap();
    let input = Value::from("ACME");

    let options = EncodeOptions::new().with_root("a:entity");
    let doc = schema.encode(&input, &prefixes, &options).unwrap();
    assert_eq!(
        doc.to_xml_string(&compact()).unwrap(),
        r#"<a:entity xmlns:a="urn:example:alpha">ACME</a:entity>"#
    );

    let doc = schema
        .encode(&input, &prefixes, &options.with_preserve_root_namespace(true))
        .unwrap();
    assert_eq!(
        doc.to_xml_string(&compact()).unwrap(),
        r#"<a:entity xmlns:r="urn:example:report" xmlns:a="urn:example:alpha">ACME</a:entity>"#
    );
}

#[test]
fn test_explicit_imports_from_strings() {
    let dir = fixtures_dir().join("multi_namespace");
    let read = |name: &str| fs::read_to_string(dir.join(name)).unwrap();

    let schema = SchemaBuilder::new()
        .load_str(&read("report.xsd"))
        .unwrap()
        .import_str("urn:example:alpha", &read("alpha.xsd"))
        .unwrap()
        .import_str("urn:example:beta", &read("beta.xsd"))
        .unwrap()
        .import_str("urn:example:gamma", &read("gamma.xsd"))
        .unwrap()
        .build()
        .unwrap();

    let prefixes = PrefixTable::resolve(&schema, Some("r"), no_bindings()).unwrap();
    let doc = schema
        .encode(&value("multi_namespace/report.json"), &prefixes, &EncodeOptions::new())
        .unwrap();
    assert_eq!(doc.root.children.len(), 4);
}
