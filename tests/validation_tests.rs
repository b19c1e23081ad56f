//! Validation integration tests
//!
//! Instance documents are parsed from the fixtures and validated against the
//! fixture schemas; every violation of a document is collected in one pass.

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use xsdcodec::{
    Document, EncodeOptions, Error, Facet, PrefixTable, Value, ViolationKind, XsdSchema,
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

fn document(relative: &str) -> Document {
    Document::from_str(&fs::read_to_string(fixtures_dir().join(relative)).unwrap()).unwrap()
}

#[test]
fn test_valid_instance() {
    let schema = load("simple/person.xsd");
    let doc = document("simple/person.xml");
    assert!(schema.is_valid(&doc));
    assert!(schema.validate(&doc).is_ok());
}

#[test]
fn test_invalid_instance_collects_everything() {
    let schema = load("simple/person.xsd");
    let doc = document("simple/person_invalid.xml");
    let report = schema.validation_report(&doc);

    assert_eq!(report.len(), 6, "{}", report);
    assert_eq!(report.of_kind(ViolationKind::MissingRequiredAttribute).count(), 1);
    assert_eq!(report.of_kind(ViolationKind::UnexpectedElement).count(), 1);
    assert_eq!(report.of_kind(ViolationKind::SimpleTypeConstraintViolation).count(), 4);

    let facets: Vec<_> = report
        .of_kind(ViolationKind::SimpleTypeConstraintViolation)
        .map(|v| (v.path.as_str(), v.facet))
        .collect();
    assert!(facets.contains(&("/person/@status", Some(Facet::Fixed))));
    assert!(facets.contains(&("/person/age", Some(Facet::MaxInclusive))));
    assert!(facets.contains(&("/person/email", Some(Facet::Pattern))));

    let unexpected = report.of_kind(ViolationKind::UnexpectedElement).next().unwrap();
    assert_eq!(unexpected.path, "/person/nickname");
}

#[test]
fn test_validate_returns_report_as_error() {
    let schema = load("simple/person.xsd");
    let doc = document("simple/person_invalid.xml");
    match schema.validate(&doc) {
        Err(Error::Validation(report)) => assert_eq!(report.len(), 6),
        other => panic!("expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_missing_cross_namespace_element_reported_once() {
    let schema = load("multi_namespace/report.xsd");
    let doc = document("multi_namespace/report_missing.xml");
    let report = schema.validation_report(&doc);

    assert_eq!(report.len(), 1, "{}", report);
    let violation = &report.violations[0];
    assert_eq!(violation.kind, ViolationKind::MissingRequiredElement);
    assert!(violation.path.starts_with("/r:report/"));
    assert!(violation.path.ends_with("amount"));
}

#[test]
fn test_substitution_member_in_instance() {
    let schema = load("substitution_group/container.xsd");
    let valid = Document::from_str(
        r#"<c:container xmlns:c="urn:example:container" xmlns:i="urn:example:items">
             <c:label>box</c:label>
             <i:concreteItem code="A"><i:value>1.5</i:value></i:concreteItem>
             <i:concreteItem code="B"><i:value>2</i:value></i:concreteItem>
           </c:container>"#,
    )
    .unwrap();
    assert!(schema.is_valid(&valid));

    let head = Document::from_str(
        r#"<c:container xmlns:c="urn:example:container" xmlns:i="urn:example:items">
             <c:label>box</c:label>
             <i:abstractItem code="A"><i:value>1.5</i:value></i:abstractItem>
           </c:container>"#,
    )
    .unwrap();
    let report = schema.validation_report(&head);
    assert_eq!(report.len(), 1, "{}", report);
    assert_eq!(report.violations[0].kind, ViolationKind::AbstractElementUsed);
    assert_eq!(report.violations[0].path, "/c:container/i:abstractItem");

    let empty = Document::from_str(
        r#"<c:container xmlns:c="urn:example:container"><c:label>box</c:label></c:container>"#,
    )
    .unwrap();
    let report = schema.validation_report(&empty);
    assert_eq!(report.len(), 1, "{}", report);
    assert_eq!(report.violations[0].kind, ViolationKind::NoSubstitutionGroupMember);
}

#[test]
fn test_nested_violations_carry_positions() {
    let schema = load("substitution_group/container.xsd");
    let doc = Document::from_str(
        r#"<c:container xmlns:c="urn:example:container" xmlns:i="urn:example:items">
             <c:label>box</c:label>
             <i:concreteItem code="A"><i:value>1.5</i:value></i:concreteItem>
             <i:concreteItem><i:value>abc</i:value></i:concreteItem>
           </c:container>"#,
    )
    .unwrap();
    let report = schema.validation_report(&doc);

    let found: Vec<_> = report.iter().map(|v| (v.kind, v.path.as_str())).collect();
    assert_eq!(
        found,
        vec![
            (
                ViolationKind::MissingRequiredAttribute,
                "/c:container/i:concreteItem[2]"
            ),
            (
                ViolationKind::SimpleTypeConstraintViolation,
                "/c:container/i:concreteItem[2]/i:value"
            ),
        ]
    );
}

#[test]
fn test_round_trip_through_text() {
    let schema = load("multi_namespace/report.xsd");
    let prefixes = PrefixTable::resolve(&schema, Some("r"), Vec::<(&str, &str)>::new()).unwrap();
    let input = Value::from_json_str(
        &fs::read_to_string(fixtures_dir().join("multi_namespace/report.json")).unwrap(),
    )
    .unwrap();

    let doc = schema
        .encode(&input, &prefixes, &EncodeOptions::new())
        .unwrap();
    let xml = doc.to_xml_string(&xsdcodec::WriteOptions::new()).unwrap();

    let parsed = Document::from_str(&xml).unwrap();
    assert_eq!(parsed.to_xml_string(&xsdcodec::WriteOptions::new()).unwrap(), xml);
    assert!(schema.is_valid(&parsed));
}

#[test]
fn test_xsi_type_and_nil() {
    let schema = XsdSchema::from_str(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                      xmlns:t="urn:t" targetNamespace="urn:t" elementFormDefault="qualified">
             <xs:complexType name="Base">
               <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
             </xs:complexType>
             <xs:complexType name="Derived">
               <xs:complexContent>
                 <xs:extension base="t:Base">
                   <xs:sequence><xs:element name="b" type="xs:int"/></xs:sequence>
                 </xs:extension>
               </xs:complexContent>
             </xs:complexType>
             <xs:element name="root">
               <xs:complexType>
                 <xs:sequence>
                   <xs:element name="item" type="t:Base" maxOccurs="unbounded"/>
                   <xs:element name="note" type="xs:string" nillable="true"/>
                 </xs:sequence>
               </xs:complexType>
             </xs:element>
           </xs:schema>"#,
    )
    .unwrap();

    let doc = Document::from_str(
        r#"<t:root xmlns:t="urn:t" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
             <t:item><t:a>x</t:a></t:item>
             <t:item xsi:type="t:Derived"><t:a>x</t:a><t:b>2</t:b></t:item>
             <t:note xsi:nil="true"/>
           </t:root>"#,
    )
    .unwrap();
    let report = schema.validation_report(&doc);
    assert!(report.is_valid(), "{}", report);

    let doc = Document::from_str(
        r#"<t:root xmlns:t="urn:t" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
             <t:item xsi:type="xs:string" xmlns:xs="http://www.w3.org/2001/XMLSchema"><t:a>x</t:a></t:item>
             <t:note xsi:nil="true">text</t:note>
           </t:root>"#,
    )
    .unwrap();
    let report = schema.validation_report(&doc);
    let kinds: Vec<_> = report.iter().map(|v| v.kind).collect();
    assert_eq!(
        kinds,
        vec![ViolationKind::InvalidXsiType, ViolationKind::InvalidValue]
    );
}
