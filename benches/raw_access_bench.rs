use criterion::{black_box, criterion_group, criterion_main, Criterion};
use chunkschema::{
    Bootstrap, FieldKind, InitGate, LocalChunkService, RawAccessExt, SchemaBuilder, SchemaCatalog,
    TypeRegistry,
};
use std::sync::Arc;

fn benchmark_record_access(c: &mut Criterion) {
    let mut catalog = SchemaCatalog::new();
    let pose = catalog
        .register(
            "Pose",
            SchemaBuilder::new()
                .int64("stamp")
                .fixed_array("position", FieldKind::Float64, 3)
                .fixed_array("orientation", FieldKind::Float64, 4),
        )
        .unwrap();
    let catalog = Arc::new(catalog);

    let mut registry = TypeRegistry::new(Arc::clone(&catalog));
    let pose_type = registry.register_fixed_type(pose).unwrap();
    let service = LocalChunkService::with_capacity(1024 * 1024).unwrap();
    let gate = InitGate::new();
    let runtime = registry
        .init_with_gate(&gate, Bootstrap::new(0, Arc::new(service)))
        .unwrap();

    let chunk = runtime.create_record(pose_type).unwrap();
    let mut graph = runtime.new_graph();
    let node = graph.instantiate(pose).unwrap();

    let mut group = c.benchmark_group("PoseRecord");

    group.bench_function("handle_field_write", |b| {
        let record = runtime.record(chunk).unwrap();
        b.iter(|| record.write("position[1]", black_box(2.0f64)).unwrap())
    });

    group.bench_function("handle_field_read", |b| {
        let record = runtime.record(chunk).unwrap();
        b.iter(|| record.read(black_box("orientation[3]")).unwrap())
    });

    group.bench_function("pinned_field_read", |b| {
        let pinned = runtime.pin_record(chunk).unwrap();
        let offset = pinned.fields().offset("orientation[3]").unwrap();
        let guard = pinned.fields();
        b.iter(|| guard.access().read_f64(black_box(offset)).unwrap())
    });

    group.bench_function("store_whole_record", |b| {
        b.iter(|| runtime.store_record(chunk, black_box(&graph), node).unwrap())
    });

    group.bench_function("load_whole_record", |b| {
        b.iter(|| runtime.load_record(chunk, &mut graph, node).unwrap())
    });

    group.finish();
}

criterion_group!(benches, benchmark_record_access);
criterion_main!(benches);
