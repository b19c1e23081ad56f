//! Encoding and validation benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::PathBuf;
use xsdcodec::{EncodeOptions, PrefixTable, Value, WriteOptions, XsdSchema};

fn fixture(relative: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(relative);
    path
}

fn container_value(items: usize) -> Value {
    let items: Vec<serde_json::Value> = (0..items)
        .map(|i| serde_json::json!({"@code": format!("C{}", i), "value": format!("{}.25", i)}))
        .collect();
    Value::from(serde_json::json!({
        "container": {"label": "bench", "concreteItem": items}
    }))
}

fn bench_encode(c: &mut Criterion) {
    let schema = XsdSchema::from_file(fixture("substitution_group/container.xsd")).unwrap();
    let prefixes = PrefixTable::resolve(&schema, Some("ns1"), Vec::<(&str, &str)>::new()).unwrap();
    let value = container_value(500);
    let options = EncodeOptions::new();

    c.bench_function("encode 500 substitution members", |b| {
        b.iter(|| schema.encode(black_box(&value), &prefixes, &options).unwrap())
    });

    let doc = schema.encode(&value, &prefixes, &options).unwrap();
    c.bench_function("serialize 500 substitution members", |b| {
        b.iter(|| doc.to_xml_string(black_box(&WriteOptions::new())).unwrap())
    });
    c.bench_function("validate 500 substitution members", |b| {
        b.iter(|| schema.validation_report(black_box(&doc)))
    });
}

criterion_group!(benches, bench_encode);
criterion_main!(benches);
