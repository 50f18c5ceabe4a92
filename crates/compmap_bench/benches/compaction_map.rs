//! Compaction map benchmarks.

use compmap_bench::{random_pass, random_stack};
use compmap_core::{CompactionMap, MapConfig, PartialCompactionMap, RecordId, SegmentId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;

/// Benchmark single-generation lookups, live vs packed.
fn bench_layer_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("layer_resolve");

    for (name, packed) in [("live", false), ("packed", true)] {
        for records in [1_000, 10_000, 100_000].iter() {
            group.bench_with_input(
                BenchmarkId::new(name, records),
                records,
                |b, &records| {
                    let config = MapConfig::new().pack_on_finalize(packed);
                    let workload = random_pass(1, 64, records, &config);
                    let mut rng = rand::thread_rng();

                    b.iter(|| {
                        let idx = rng.gen_range(0..workload.befores.len());
                        black_box(workload.layer.resolve(black_box(workload.befores[idx])));
                    });
                },
            );
        }
    }
    group.finish();
}

/// Benchmark composite lookups as depth grows.
fn bench_composite_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite_resolve");

    for depth in [1, 4, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let (map, befores, _) = random_stack(depth, 32, 2_000, &MapConfig::default());
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let idx = rng.gen_range(0..befores.len());
                black_box(map.resolve(black_box(befores[idx])));
            });
        });
    }
    group.finish();
}

/// Benchmark misses, which have to visit every layer.
fn bench_composite_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite_miss");

    for depth in [1, 4, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let (map, _, _) = random_stack(depth, 32, 2_000, &MapConfig::default());
            let absent = RecordId::new(SegmentId::new_random(), 0);

            b.iter(|| {
                black_box(map.resolve(black_box(absent)));
                black_box(map.was_compacted(black_box(absent.segment())));
            });
        });
    }
    group.finish();
}

/// Benchmark finalizing a generation into the packed tier.
fn bench_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("finalize");

    for records in [1_000, 10_000, 100_000].iter() {
        group.throughput(Throughput::Elements(*records as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(records),
            records,
            |b, &records| {
                let config = MapConfig::new().pack_on_finalize(false);
                let live = random_pass(1, 64, records, &config).layer;
                let entries = live.entries();

                b.iter_batched(
                    || {
                        let mut layer = PartialCompactionMap::new(1);
                        for &(before, after) in &entries {
                            layer.put(before, after).unwrap();
                        }
                        layer
                    },
                    |mut layer| {
                        layer.finalize().unwrap();
                        black_box(layer);
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

/// Benchmark publishing a new generation.
fn bench_extend(c: &mut Criterion) {
    c.bench_function("extend", |b| {
        let (map, _, _) = random_stack(16, 32, 1_000, &MapConfig::default());
        let layer = Arc::new(random_pass(17, 32, 1_000, &MapConfig::default()).layer);

        b.iter(|| {
            black_box(map.extend(Arc::clone(&layer)));
        });
    });
}

/// Benchmark pruning the oldest generation's input segments.
fn bench_prune(c: &mut Criterion) {
    let mut group = c.benchmark_group("prune");

    for depth in [4, 16, 64].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let (map, _, inputs) = random_stack(depth, 32, 1_000, &MapConfig::default());
            let oldest: HashSet<SegmentId> = inputs[0].iter().copied().collect();

            b.iter(|| {
                let (pruned, summary): (CompactionMap, _) = map.pruned(black_box(&oldest));
                black_box((pruned, summary));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_layer_resolve,
    bench_composite_resolve,
    bench_composite_miss,
    bench_finalize,
    bench_extend,
    bench_prune,
);

criterion_main!(benches);
