//! Merge Throughput Benchmarks
//!
//! Measures staging plus merging of a chunked upload, and content hashing of
//! whole-file uploads.
//!
//! Run with: `cargo bench --bench merge_throughput`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use slicevault::storage::ContentStore;
use slicevault::upload::{compute_hash, UploadService};

const SLICE_SIZE: usize = 256 * 1024;

fn bench_stage_and_merge(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("stage_and_merge");
    group.measurement_time(Duration::from_secs(10));

    for slices in [4usize, 16, 64] {
        group.throughput(Throughput::Bytes((slices * SLICE_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(slices), &slices, |b, &slices| {
            let payload = vec![0x5au8; SLICE_SIZE];
            b.iter(|| {
                let temp_dir = tempfile::TempDir::new().unwrap();
                let service = UploadService::new(ContentStore::new(temp_dir.path()));
                runtime.block_on(async {
                    // Reverse order so the merge has to sort
                    for ordinal in (0..slices).rev() {
                        let name = format!("bench_{ordinal}.bin");
                        service.receive_named_slice(&name, &payload).await.unwrap();
                    }
                    black_box(service.merge_session("bench", slices).await.unwrap());
                });
            });
        });
    }

    group.finish();
}

fn bench_content_hash(c: &mut Criterion) {
    let data = vec![0xa5u8; 4 * 1024 * 1024];
    let mut group = c.benchmark_group("content_hash");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("sha256_4mib", |b| b.iter(|| compute_hash(black_box(&data))));
    group.finish();
}

criterion_group!(benches, bench_stage_and_merge, bench_content_hash);
criterion_main!(benches);
