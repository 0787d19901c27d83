//! Propagation benchmarks for ripple-core
//!
//! Measures write-to-effect latency for wide fan-outs, deep chains and
//! diamonds.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::reactive::{batch, Computed, Effect, Signal};

/// One signal read by `width` computeds, all summed by a single effect.
fn benchmark_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10, 100, 1000] {
        let source = Signal::new(0_u64);
        let leaves: Vec<Computed<u64>> = (0..width)
            .map(|i| {
                let source = source.clone();
                Computed::new(move || source.get() + i)
            })
            .collect();
        let _sum = Effect::new(move || {
            black_box(leaves.iter().map(Computed::get).sum::<u64>());
        });

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| source.update(|n| n + 1));
        });
    }

    group.finish();
}

/// A chain of `depth` computeds ending in an effect.
fn benchmark_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for depth in [10, 100, 500] {
        let source = Signal::new(0_u64);
        let mut tail = {
            let source = source.clone();
            Computed::new(move || source.get())
        };
        for _ in 1..depth {
            let previous = tail.clone();
            tail = Computed::new(move || previous.get() + 1);
        }
        let _effect = Effect::new(move || {
            black_box(tail.get());
        });

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| source.update(|n| n + 1));
        });
    }

    group.finish();
}

/// Many diamonds over one signal, written in a batch of ten.
fn benchmark_batched_diamonds(c: &mut Criterion) {
    let source = Signal::new(0_u64);
    let mut effects = Vec::new();
    for _ in 0..100 {
        let left = {
            let source = source.clone();
            Computed::new(move || source.get() * 2)
        };
        let right = {
            let source = source.clone();
            Computed::new(move || source.get() + 1)
        };
        effects.push(Effect::new(move || {
            black_box(left.get() + right.get());
        }));
    }

    c.bench_function("batched_diamonds", |b| {
        b.iter(|| {
            batch(|| {
                for _ in 0..10 {
                    source.update(|n| n + 1);
                }
            })
        });
    });
}

criterion_group!(
    benches,
    benchmark_fan_out,
    benchmark_chain,
    benchmark_batched_diamonds
);
criterion_main!(benches);
