//! Storage benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use streamlog_bench::random_data;
use streamlog_storage::{
    BlobStore, DirectoryBlobStore, FileBackend, InMemoryBlobStore, PutCondition, StorageBackend,
};
use tempfile::TempDir;

/// Benchmark FileBackend append operations.
fn bench_file_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_append");
    group.sample_size(50);

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let backend = FileBackend::open(&temp_dir.path().join("stream.dat")).unwrap();
            let data = random_data(size);

            b.iter(|| {
                let offset = backend.append(black_box(&data)).unwrap();
                black_box(offset);
            });
        });
    }
    group.finish();
}

/// Benchmark blob uploads with a fresh name each time.
fn bench_blob_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("blob_put");
    group.sample_size(30);

    for size in [256, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("memory", size), size, |b, &size| {
            let store = InMemoryBlobStore::new();
            let data = random_data(size);
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                let version = store
                    .put(&format!("bench/{n}"), black_box(&data), PutCondition::IfAbsent)
                    .unwrap();
                black_box(version);
            });
        });
        group.bench_with_input(BenchmarkId::new("directory", size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let store = DirectoryBlobStore::open(temp_dir.path()).unwrap();
            let data = random_data(size);
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                let version = store
                    .put(&format!("bench/{n}"), black_box(&data), PutCondition::IfAbsent)
                    .unwrap();
                black_box(version);
            });
        });
    }
    group.finish();
}

/// Benchmark compare-and-swap updates of a single blob.
fn bench_blob_cas(c: &mut Criterion) {
    c.bench_function("blob_cas_memory", |b| {
        let store = InMemoryBlobStore::new();
        let mut version = store.put("log/head", b"0", PutCondition::IfAbsent).unwrap();

        b.iter(|| {
            version = store
                .put("log/head", black_box(b"1"), PutCondition::IfMatch(version))
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_file_append, bench_blob_put, bench_blob_cas);

criterion_main!(benches);
