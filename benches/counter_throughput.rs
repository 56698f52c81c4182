//! Throughput benchmarks for distinct counting
//!
//! Compares the exact set counter against the HyperLogLog sketch, and
//! measures key routing through the index and a full TSM file scan.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kuba_inspect::cardinality::{CardinalityIndex, CountingMode};
use kuba_inspect::storage::TsmIndexBuilder;
use kuba_inspect::ShardScanner;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::hint::black_box;
use tempfile::TempDir;

/// Raw keys spread over a handful of measurements, in random order
fn make_keys(n: usize) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = (0..n)
        .map(|i| {
            format!(
                "m{},host=server-{:05},region=r{}#!~#field{}",
                i % 8,
                i / 4,
                i % 5,
                i % 4
            )
            .into_bytes()
        })
        .collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));
    keys
}

fn modes() -> [(&'static str, CountingMode); 2] {
    [("exact", CountingMode::Exact), ("estimated", CountingMode::default())]
}

/// Benchmark: add every key to a single counter
fn bench_counter_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_add");

    for size in [1_000, 10_000, 100_000] {
        let keys = make_keys(size);
        group.throughput(Throughput::Elements(size as u64));

        for (name, mode) in modes() {
            group.bench_with_input(BenchmarkId::new(name, size), &keys, |b, keys| {
                b.iter(|| {
                    let mut counter = mode.new_counter();
                    for key in keys {
                        counter.add(key);
                    }
                    black_box(counter.count())
                });
            });
        }
    }

    group.finish();
}

/// Benchmark: decompose keys and route them into index buckets
fn bench_index_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_record_key");
    let size = 50_000;
    let keys = make_keys(size);
    group.throughput(Throughput::Elements(size as u64));

    for (name, mode) in modes() {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut index = CardinalityIndex::new(mode);
                for key in &keys {
                    index.record_key("db0", "autogen", key);
                }
                black_box(index.len())
            });
        });
    }

    group.finish();
}

/// Benchmark: scan shards from disk, sequential vs parallel
fn bench_shard_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("shard_scan");
    let temp_dir = TempDir::new().unwrap();
    let mut shards = BTreeMap::new();
    for id in 1..=8u64 {
        let dir = temp_dir.path().join(format!("db0/autogen/{}", id));
        std::fs::create_dir_all(&dir).unwrap();
        TsmIndexBuilder::new()
            .keys(make_keys(20_000))
            .write_to(dir.join("000000001-000000001.tsm"))
            .unwrap();
        shards.insert(id, dir);
    }
    group.throughput(Throughput::Elements(8 * 20_000));

    for workers in [1, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &shards, |b, shards| {
            let scanner = ShardScanner::new(CountingMode::default(), workers);
            b.iter(|| black_box(scanner.scan(shards).unwrap().stats));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_counter_add, bench_index_record, bench_shard_scan);
criterion_main!(benches);
