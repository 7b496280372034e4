//! Local store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;
use teamsync_bench::generate_batch;
use teamsync_engine::{reconcile, StandardDerivation};
use teamsync_model::EntitySet;
use teamsync_store::{FileStore, InMemoryStore, LocalStore};

fn entity_set(members: usize) -> EntitySet {
    let batch = generate_batch(members, members * 2, 10);
    reconcile(&EntitySet::new(), &batch, &StandardDerivation::unbounded(), 0).unwrap()
}

/// Benchmark full-set writes.
fn bench_bulk_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_upsert");

    for members in [10, 100].iter() {
        let set = entity_set(*members);

        group.bench_with_input(BenchmarkId::new("memory", members), &set, |b, set| {
            let store = InMemoryStore::new();
            b.iter(|| store.bulk_upsert(black_box(set)).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("file", members), &set, |b, set| {
            let dir = TempDir::new().unwrap();
            let store = FileStore::open(&dir.path().join("cache.json")).unwrap();
            b.iter(|| store.bulk_upsert(black_box(set)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark reading the whole cache back.
fn bench_read_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_all");
    let set = entity_set(100);

    let memory = InMemoryStore::with_entities(set.clone());
    group.bench_function("memory", |b| {
        b.iter(|| black_box(memory.read_all().unwrap()));
    });

    let dir = TempDir::new().unwrap();
    let file = FileStore::open(&dir.path().join("cache.json")).unwrap();
    file.bulk_upsert(&set).unwrap();
    group.bench_function("file", |b| {
        b.iter(|| black_box(file.read_all().unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_bulk_upsert, bench_read_all);
criterion_main!(benches);
