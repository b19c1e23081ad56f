//! Property tests for encoding
//!
//! Any value tree the encoder accepts must validate cleanly, and encoding is
//! deterministic down to the serialized bytes.

use proptest::prelude::*;
use xsdcodec::{EncodeOptions, PrefixTable, Value, WriteOptions, XsdSchema};

const LEDGER_XSD: &str = r#"<?xml version="1.0"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:l="urn:ledger" targetNamespace="urn:ledger"
           elementFormDefault="qualified">
  <xs:element name="ledger">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="owner" type="xs:string"/>
        <xs:element name="entry" type="l:Entry" minOccurs="0" maxOccurs="unbounded"/>
        <xs:choice minOccurs="0">
          <xs:element name="closed" type="xs:boolean"/>
          <xs:element name="closedOn" type="xs:date"/>
        </xs:choice>
      </xs:sequence>
      <xs:attribute name="currency" type="l:Currency" use="required"/>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="Entry">
    <xs:sequence>
      <xs:element name="amount" type="xs:decimal"/>
      <xs:element name="memo" type="xs:string" minOccurs="0"/>
    </xs:sequence>
    <xs:attribute name="seq" type="xs:nonNegativeInteger"/>
  </xs:complexType>
  <xs:simpleType name="Currency">
    <xs:restriction base="xs:string">
      <xs:pattern value="[A-Z]{3}"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

fn entry() -> impl Strategy<Value = serde_json::Value> {
    (
        -1_000_000i64..1_000_000,
        0u32..100,
        proptest::option::of("[a-zA-Z0-9 &<>]{0,12}"),
        proptest::option::of(0u32..1000),
    )
        .prop_map(|(units, cents, memo, seq)| {
            let mut object = serde_json::Map::new();
            if let Some(seq) = seq {
                object.insert("@seq".to_string(), serde_json::json!(seq));
            }
            object.insert(
                "amount".to_string(),
                serde_json::json!(format!("{}.{:02}", units, cents)),
            );
            if let Some(memo) = memo {
                object.insert("memo".to_string(), serde_json::json!(memo));
            }
            serde_json::Value::Object(object)
        })
}

fn closing() -> impl Strategy<Value = Option<(String, serde_json::Value)>> {
    prop_oneof![
        Just(None),
        any::<bool>().prop_map(|b| Some(("closed".to_string(), serde_json::json!(b)))),
        (1990u32..2100, 1u32..13, 1u32..29).prop_map(|(y, m, d)| {
            Some((
                "closedOn".to_string(),
                serde_json::json!(format!("{:04}-{:02}-{:02}", y, m, d)),
            ))
        }),
    ]
}

fn ledger() -> impl Strategy<Value = Value> {
    (
        "[A-Z]{3}",
        "[a-zA-Z ]{1,16}",
        proptest::collection::vec(entry(), 0..5),
        closing(),
    )
        .prop_map(|(currency, owner, entries, closing)| {
            let mut object = serde_json::Map::new();
            object.insert("@currency".to_string(), serde_json::json!(currency));
            object.insert("owner".to_string(), serde_json::json!(owner));
            if !entries.is_empty() {
                object.insert("entry".to_string(), serde_json::Value::Array(entries));
            }
            if let Some((key, value)) = closing {
                object.insert(key, value);
            }
            Value::from(serde_json::Value::Object(object))
        })
}

fn schema() -> XsdSchema {
    XsdSchema::from_str(LEDGER_XSD).unwrap()
}

proptest! {
    #[test]
    fn encoded_values_validate(value in ledger()) {
        let schema = schema();
        let prefixes = PrefixTable::resolve(&schema, Some("l"), Vec::<(&str, &str)>::new()).unwrap();
        let doc = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        let report = schema.validation_report(&doc);
        prop_assert!(report.is_valid(), "{}", report);
    }

    #[test]
    fn encoding_is_deterministic(value in ledger()) {
        let schema = schema();
        let prefixes = PrefixTable::resolve(&schema, Some("l"), Vec::<(&str, &str)>::new()).unwrap();
        let write = WriteOptions::new();
        let first = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        let second = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        prop_assert_eq!(first.to_xml_string(&write).unwrap(), second.to_xml_string(&write).unwrap());
    }

    #[test]
    fn serialized_documents_reparse(value in ledger()) {
        let schema = schema();
        let prefixes = PrefixTable::resolve(&schema, Some("l"), Vec::<(&str, &str)>::new()).unwrap();
        let doc = schema.encode(&value, &prefixes, &EncodeOptions::new()).unwrap();
        let xml = doc.to_xml_string(&WriteOptions::new()).unwrap();
        let parsed = xsdcodec::Document::from_str(&xml).unwrap();
        prop_assert!(schema.is_valid(&parsed));
    }

    #[test]
    fn dropping_owner_is_reported(value in ledger()) {
        let schema = schema();
        let prefixes = PrefixTable::resolve(&schema, Some("l"), Vec::<(&str, &str)>::new()).unwrap();
        let mut object = value.as_object().unwrap().clone();
        object.shift_remove("owner");
        let err = schema
            .encode(&Value::Object(object), &prefixes, &EncodeOptions::new())
            .unwrap_err();
        match err {
            xsdcodec::Error::Encode(err) => {
                prop_assert_eq!(err.kind(), xsdcodec::ViolationKind::MissingRequiredElement);
                prop_assert_eq!(err.path(), "/ledger/owner");
            }
            other => prop_assert!(false, "unexpected error {}", other),
        }
    }
}
