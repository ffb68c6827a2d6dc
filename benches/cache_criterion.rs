use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use plum_zero::cache::cache_value::NodeBinding;
use plum_zero::cache::evaluation_cache::EvaluationCache;
use plum_zero::search::policy::{DirichletNoise, MAX_POLICY_INDEX};

const ENTRIES: i64 = 4096;

fn binding(node: usize, root: bool) -> NodeBinding {
    NodeBinding {
        node,
        legal_indexes: (0..32).map(|i| i * 97 % MAX_POLICY_INDEX).collect(),
        root_noise: root.then(DirichletNoise::default),
        seed: 7,
    }
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation_cache");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(4));
    group.sample_size(20);
    group.throughput(Throughput::Elements(ENTRIES as u64));

    let logits: Vec<f32> = (0..MAX_POLICY_INDEX).map(|i| (i % 13) as f32 * 0.05).collect();

    // capacity below the key count exercises eviction
    for capacity in [1024usize, 8192] {
        group.bench_with_input(
            BenchmarkId::new("claim_fill_attach", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let cache = EvaluationCache::new(capacity);
                    for key in 2..ENTRIES + 2 {
                        if cache.claim(key, "bench", true).is_created() {
                            cache
                                .update_value_and_policies(key, 0.0, logits.clone())
                                .expect("fill should succeed");
                            cache
                                .attach(key, binding(key as usize, key % 64 == 0))
                                .expect("attach should succeed");
                        }
                    }
                    black_box(cache.stats())
                });
            },
        );
    }

    group.bench_function("lookup_hits", |b| {
        let cache = EvaluationCache::new(ENTRIES as usize);
        for key in 2..ENTRIES + 2 {
            cache.create(key, "bench", false).expect("create should succeed");
        }
        b.iter(|| {
            let mut found = 0usize;
            for key in 2..ENTRIES + 2 {
                found += usize::from(cache.get(black_box(key)).is_some());
            }
            black_box(found)
        });
    });

    group.finish();
}

criterion_group!(cache_benches, bench_cache);
criterion_main!(cache_benches);
