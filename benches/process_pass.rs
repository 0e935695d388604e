//! Benchmarks for full graph passes.

use std::sync::Arc;

use aquila::graph::{DataStream, NodeRegistry};
use aquila::ParamValue;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn build_chain(depth: usize) -> Arc<DataStream> {
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());

    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    root_node
        .get_parameter("rows")
        .unwrap()
        .write(ParamValue::Int(32))
        .unwrap();
    root_node
        .get_parameter("cols")
        .unwrap()
        .write(ParamValue::Int(32))
        .unwrap();

    let mut current = root_node;
    for _ in 0..depth {
        let child = current
            .add_child(registry.create("Gain").unwrap())
            .unwrap();
        current = child.current().unwrap();
    }
    stream
}

fn bench_process_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_pass");

    for depth in [1usize, 4, 16] {
        let stream = build_chain(depth);
        group.bench_function(format!("chain_depth_{depth}"), |b| {
            b.iter(|| {
                stream.process_pass();
                black_box(stream.passes())
            })
        });
    }

    // A wider pass: blur and threshold do real per-element work.
    let registry = Arc::new(NodeRegistry::with_builtins());
    let stream = DataStream::new(registry.clone());
    let root = stream.create_root("TestPattern").unwrap();
    let root_node = root.current().unwrap();
    root_node
        .get_parameter("rows")
        .unwrap()
        .write(ParamValue::Int(64))
        .unwrap();
    root_node
        .get_parameter("cols")
        .unwrap()
        .write(ParamValue::Int(64))
        .unwrap();
    root_node
        .add_child(registry.create("BoxBlur").unwrap())
        .unwrap();
    root_node
        .add_child(registry.create("Threshold").unwrap())
        .unwrap();
    group.bench_function("blur_threshold_64x64", |b| {
        b.iter(|| {
            stream.process_pass();
            black_box(stream.passes())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_process_pass);
criterion_main!(benches);
