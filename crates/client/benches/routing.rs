use client::group_by_shard;
use corelib::{Partitioner, Sip13Partitioner, Xxh3Partitioner};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("saga/{i:08}/state")).collect()
}

fn bench_shard_index(c: &mut Criterion) {
    let key = b"saga/00004242/state";
    c.bench_function("shard_index_xxh3", |b| {
        b.iter(|| Xxh3Partitioner.shard_index(black_box(key), 16))
    });
    c.bench_function("shard_index_sip13", |b| {
        b.iter(|| Sip13Partitioner.shard_index(black_box(key), 16))
    });
}

fn bench_group_by_shard_1k(c: &mut Criterion) {
    let keys = keys(1_000);
    c.bench_function("group_by_shard_1k_over_16", |b| {
        b.iter(|| group_by_shard(&Xxh3Partitioner, 16, keys.iter().map(String::as_str)))
    });
}

fn bench_group_by_shard_single_shard(c: &mut Criterion) {
    let keys = keys(1_000);
    c.bench_function("group_by_shard_1k_over_1", |b| {
        b.iter(|| group_by_shard(&Xxh3Partitioner, 1, keys.iter().map(String::as_str)))
    });
}

criterion_group!(
    benches,
    bench_shard_index,
    bench_group_by_shard_1k,
    bench_group_by_shard_single_shard
);
criterion_main!(benches);
