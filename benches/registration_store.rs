//! Benchmark for the address registration store
//!
//! Covers the paths a registration watch and `leave` hit on every tick.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sim_cluster::registration::{RegistrationInfo, RegistrationStore};
use sim_cluster::NodeId;
use std::sync::Arc;

fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration_store");
    group.throughput(Throughput::Elements(1));

    group.bench_function("register_single", |b| {
        let store = RegistrationStore::new();
        let node_id = NodeId::random();
        let mut counter = 0u64;

        b.iter(|| {
            counter += 1;
            let info = RegistrationInfo::new(node_id.clone(), "endpoint").with_seq(counter);
            store.register(black_box("svc.echo"), info);
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration_store");
    group.throughput(Throughput::Elements(1));

    // Pre-register endpoints
    let store = RegistrationStore::new();
    for i in 0..100 {
        let info = RegistrationInfo::new(NodeId::new(format!("node-{:03}", i % 10)), format!("endpoint-{i}"));
        store.register("svc.echo", info);
    }

    group.bench_function("snapshot_100", |b| {
        b.iter(|| black_box(store.snapshot(black_box("svc.echo"))));
    });

    group.bench_function("snapshot_missing", |b| {
        b.iter(|| black_box(store.snapshot(black_box("svc.none"))));
    });

    group.finish();
}

fn bench_remove_node(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration_store");
    group.throughput(Throughput::Elements(10));

    group.bench_function("remove_node_across_10_addresses", |b| {
        let store = RegistrationStore::new();
        let node_id = NodeId::random();

        b.iter(|| {
            for i in 0..10 {
                store.register(&format!("svc.{i}"), RegistrationInfo::new(node_id.clone(), "endpoint"));
            }
            black_box(store.remove_node(black_box(&node_id)));
        });
    });

    group.finish();
}

fn bench_concurrent_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration_store");
    group.throughput(Throughput::Elements(100));

    let store = Arc::new(RegistrationStore::new());
    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("concurrent_100_registers", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::new();
                for i in 0..100 {
                    let store = Arc::clone(&store);
                    handles.push(tokio::spawn(async move {
                        let address = format!("svc.{}", i % 8);
                        store.register(&address, RegistrationInfo::new(NodeId::new("node"), "endpoint"));
                    }));
                }
                for handle in handles {
                    let _ = handle.await;
                }
            });
            store.clear();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_register,
    bench_snapshot,
    bench_remove_node,
    bench_concurrent_register,
);
criterion_main!(benches);
