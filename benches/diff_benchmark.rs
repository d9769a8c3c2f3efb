//! Benchmarks for snapshot parsing and comparison.
//!
//! Run with: cargo bench --bench diff_benchmark

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fmt::Write;
use std::hint::black_box;
use tmdiff::model::Severity;
use tmdiff::{
    ComparisonEngine, Component, Countermeasure, Dataflow, DiagramParser, Provenance, Snapshot,
    Threat,
};

/// Generate a snapshot with `count` components, a dataflow chain between
/// them and one threat plus countermeasure per component.
fn generate_snapshot(label: &str, count: usize, revision: usize) -> Snapshot {
    let components = (0..count).map(|i| {
        Component::new(format!("c{i}"), format!("Service {i}"))
            .with_type(if i % 3 == 0 { "database" } else { "web-service" })
            .with_property("technology", format!("stack-{}", (i + revision) % 7))
    });
    let dataflows = (1..count).map(|i| {
        Dataflow::new(format!("f{i}"), format!("c{}", i - 1), format!("c{i}"))
            .with_data_types(["pii"])
            .with_protocol("https")
    });
    let threats = (0..count).map(|i| {
        let mut threat =
            Threat::new(format!("t{i}"), format!("Threat {i}")).affecting([format!("c{i}")]);
        threat.severity = if (i + revision) % 5 == 0 {
            Severity::High
        } else {
            Severity::Medium
        };
        threat
    });
    let countermeasures = (0..count)
        .filter(|i| i % 10 >= revision % 10)
        .map(|i| Countermeasure::new(format!("m{i}"), format!("Control {i}")).mitigating([format!("t{i}")]));

    Snapshot::builder(Provenance::Local { label: label.into() })
        .components(components)
        .dataflows(dataflows)
        .threats(threats)
        .countermeasures(countermeasures)
        .build()
}

/// Generate an uncompressed diagram with `count` vertices and a chain of edges.
fn generate_diagram(count: usize) -> String {
    let mut xml = String::from(r#"<mxGraphModel><root><mxCell id="0"/><mxCell id="1" parent="0"/>"#);
    let _ = write!(
        xml,
        r#"<object label="Zone" nodeType="trustZone" id="zone"><mxCell vertex="1" parent="1"><mxGeometry x="0" y="0" width="{}" height="200" as="geometry"/></mxCell></object>"#,
        count * 100
    );
    for i in 0..count {
        let _ = write!(
            xml,
            r#"<object label="Service {i}" componentType="web-service" id="c{i}"><mxCell vertex="1" parent="1"><mxGeometry x="{}" y="50" width="80" height="80" as="geometry"/></mxCell></object>"#,
            i * 100 + 10
        );
    }
    for i in 1..count {
        let _ = write!(
            xml,
            r#"<mxCell id="f{i}" edge="1" parent="1" source="c{}" target="c{i}"/>"#,
            i - 1
        );
    }
    xml.push_str("</root></mxGraphModel>");
    xml
}

fn bench_compare(c: &mut Criterion) {
    let engine = ComparisonEngine::new();
    let mut group = c.benchmark_group("compare");
    for size in [100, 1_000, 5_000] {
        let baseline = generate_snapshot("baseline", size, 0);
        let target = generate_snapshot("target", size, 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(engine.compare(black_box(&baseline), black_box(&target))));
        });
    }
    group.finish();
}

fn bench_identical(c: &mut Criterion) {
    let engine = ComparisonEngine::new();
    let baseline = generate_snapshot("a", 5_000, 0);
    let target = generate_snapshot("b", 5_000, 0);
    c.bench_function("compare_identical_5000", |b| {
        b.iter(|| black_box(engine.compare(black_box(&baseline), black_box(&target))));
    });
}

fn bench_parse_diagram(c: &mut Criterion) {
    let parser = DiagramParser::new();
    let mut group = c.benchmark_group("parse_diagram");
    for size in [100, 1_000] {
        let document = generate_diagram(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &document, |b, doc| {
            b.iter(|| black_box(parser.parse_str(black_box(doc))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compare, bench_identical, bench_parse_diagram);
criterion_main!(benches);
