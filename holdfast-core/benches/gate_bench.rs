use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use holdfast_core::gate::RetentionGate;
use holdfast_core::types::*;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn make_object(i: u64, event_based_hold: bool, temporary_hold: bool) -> ObjectAttributes {
    ObjectAttributes {
        bucket: BucketId::parse("bench-bucket").unwrap(),
        name: format!("obj-{}", i),
        generation: i + 1,
        metageneration: 1,
        creation_time_ms: i * 1_000,
        event_based_hold,
        temporary_hold,
    }
}

fn make_policy(retention_period_secs: u64) -> BucketRetentionPolicy {
    BucketRetentionPolicy {
        retention_period_secs,
        effective_time_ms: 0,
        is_locked: true,
    }
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_can_delete_single(c: &mut Criterion) {
    let object = make_object(1, false, false);
    let policy = make_policy(3_600);

    c.bench_function("gate_can_delete_single", |b| {
        b.iter(|| RetentionGate::can_delete(black_box(&object), Some(&policy), black_box(10_000_000)))
    });
}

fn bench_can_delete_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_sweep");
    let policy = make_policy(60);

    for count in [100u64, 1_000, 10_000] {
        let objects: Vec<ObjectAttributes> = (0..count)
            .map(|i| make_object(i, i % 7 == 0, i % 11 == 0))
            .collect();

        group.bench_with_input(BenchmarkId::new("objects", count), &objects, |b, objects| {
            b.iter(|| {
                let now = count * 500;
                black_box(
                    objects
                        .iter()
                        .filter(|o| RetentionGate::can_delete(o, Some(&policy), now).is_allowed())
                        .count(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_can_delete_single, bench_can_delete_sweep);
criterion_main!(benches);
