//! Benchmark suite for the core map operations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use expiry_map::sync::ExpiringMap;
use std::time::Duration;

/// Benchmark insertion of new entries into an empty map.
///
/// Tests map sizes: 100, 1,000, and 10,000 entries.
fn insert_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [100u64, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let map: ExpiringMap<u64, String> =
                    ExpiringMap::with_time_to_live(Duration::from_secs(60));
                for i in 0..size {
                    map.insert(black_box(i), black_box(format!("value-{i}")));
                }
            });
        });
    }

    group.finish();
}

/// Benchmark reads against a pre-filled map, with and without touching.
fn get_benchmark(c: &mut Criterion) {
    const NUM_KEYS: u64 = 10_000;

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(NUM_KEYS));

    for touch_on_get in [false, true] {
        let map: ExpiringMap<u64, String> = ExpiringMap::builder()
            .time_to_live(Duration::from_secs(60))
            .touch_on_get(touch_on_get)
            .build();
        for i in 0..NUM_KEYS {
            map.insert(i, format!("value-{i}"));
        }

        let label = if touch_on_get { "touching" } else { "plain" };
        group.bench_function(label, |b| {
            b.iter(|| {
                for i in 0..NUM_KEYS {
                    black_box(map.get(&i));
                }
            });
        });
    }

    group.finish();
}

/// Benchmark inserts that continuously overflow a size-bounded map, forcing
/// an eviction per insert.
fn bounded_insert_benchmark(c: &mut Criterion) {
    const NUM_KEYS: u64 = 1_000;

    let mut group = c.benchmark_group("bounded_insert");
    group.throughput(Throughput::Elements(NUM_KEYS));

    group.bench_function("target_100", |b| {
        b.iter(|| {
            let map: ExpiringMap<u64, u64> = ExpiringMap::bounded(Duration::ZERO, 100);
            for i in 0..NUM_KEYS {
                map.insert(black_box(i), black_box(i));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    insert_benchmark,
    get_benchmark,
    bounded_insert_benchmark
);
criterion_main!(benches);
