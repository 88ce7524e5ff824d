use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use holdfast_core::client::HoldfastClient;

fn bench_policy_lifecycle(c: &mut Criterion) {
    c.bench_function("set_lock_extend_cycle", |b| {
        b.iter(|| {
            let client = HoldfastClient::new();
            client.create_bucket("bench-bucket").unwrap();
            client.set_retention_policy("bench-bucket", 60).unwrap();
            client.lock_retention_policy("bench-bucket").unwrap();
            black_box(client.set_retention_policy("bench-bucket", 120).unwrap())
        })
    });
}

fn bench_hold_toggles(c: &mut Criterion) {
    let client = HoldfastClient::new();
    client.create_bucket("bench-bucket").unwrap();
    client.create_object("bench-bucket", "toggled.bin").unwrap();

    c.bench_function("temporary_hold_toggle", |b| {
        let mut enabled = false;
        b.iter(|| {
            enabled = !enabled;
            black_box(
                client
                    .set_object_temporary_hold("bench-bucket", "toggled.bin", enabled)
                    .unwrap(),
            )
        })
    });
}

fn bench_create_and_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_churn");

    for count in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("objects", count), &count, |b, &count| {
            b.iter(|| {
                let client = HoldfastClient::new();
                client.create_bucket("bench-bucket").unwrap();

                for i in 0..count {
                    client
                        .create_object("bench-bucket", &format!("obj-{}", i))
                        .unwrap();
                }
                for i in 0..count {
                    client
                        .delete_object("bench-bucket", &format!("obj-{}", i))
                        .unwrap();
                }

                black_box(client.can_delete("bench-bucket", "obj-0").is_err())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_policy_lifecycle, bench_hold_toggles, bench_create_and_delete);
criterion_main!(benches);
