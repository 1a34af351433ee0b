#![allow(clippy::unwrap_used, clippy::uninlined_format_args)]

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tinyrpc::config::MAX_FRAME_SIZE;
use tinyrpc::utils::compression::{CompressionType, CompressorRegistry};

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");
    let registry = CompressorRegistry::builtin();
    let sizes = [64usize, 512, 4096, 65536, 1024 * 1024];
    let tags = [
        CompressionType::GZIP,
        CompressionType::SNAPPY,
        CompressionType::ZLIB,
    ];

    for &size in &sizes {
        // Mildly repetitive text, closer to real argument bodies than zeros
        let data: Vec<u8> = b"method=Arith.Add;args=[12455,266];"
            .iter()
            .copied()
            .cycle()
            .take(size)
            .collect();
        group.throughput(Throughput::Bytes(size as u64));

        for tag in tags {
            group.bench_function(format!("{}_compress_{}b", tag.name(), size), |b| {
                b.iter_batched(
                    || data.clone(),
                    |d| {
                        let _ = registry.compress(tag, &d).unwrap();
                    },
                    BatchSize::SmallInput,
                )
            });
            group.bench_function(format!("{}_decompress_{}b", tag.name(), size), |b| {
                let compressed = registry.compress(tag, &data).unwrap();
                b.iter(|| {
                    let out = registry.decompress(tag, &compressed, MAX_FRAME_SIZE).unwrap();
                    assert_eq!(out.len(), data.len());
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_compression);
criterion_main!(benches);
