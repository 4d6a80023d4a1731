//! Benchmark: cost of one write through different graph shapes.
//!
//! Compares:
//! - a long chain of `map`s
//! - a wide fan-out of `map`s under one source
//! - a stack of diamonds, where every join has two paths to the source

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use downstream_core::{Engine, Stream};

fn chain(engine: &Engine, length: usize) -> (Stream<u64>, Stream<u64>) {
    let source = engine.source::<u64>();
    let mut tail = source.clone();
    for _ in 0..length {
        tail = tail.map(|n| n + 1).expect("same engine");
    }
    (source, tail)
}

fn fan_out(engine: &Engine, width: usize) -> (Stream<u64>, Vec<Stream<u64>>) {
    let source = engine.source::<u64>();
    let leaves = (0..width)
        .map(|i| source.map(move |n| n + i as u64).expect("same engine"))
        .collect();
    (source, leaves)
}

fn diamonds(engine: &Engine, depth: usize) -> (Stream<u64>, Stream<u64>) {
    let source = engine.source::<u64>();
    let mut tip = source.clone();
    for _ in 0..depth {
        let left = tip.map(|n| n.wrapping_add(1)).expect("same engine");
        let right = tip.map(|n| n.wrapping_mul(2)).expect("same engine");
        tip = engine
            .combine_when_all(&[&left, &right], |values| values[0].wrapping_add(*values[1]))
            .expect("same engine");
    }
    (source, tip)
}

fn benchmark_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("chain", size), &size, |b, &size| {
            let engine = Engine::new();
            let (source, tail) = chain(&engine, size);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(black_box(n)).expect("source is active");
                black_box(tail.value());
            });
        });

        group.bench_with_input(BenchmarkId::new("fan_out", size), &size, |b, &size| {
            let engine = Engine::new();
            let (source, leaves) = fan_out(&engine, size);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(black_box(n)).expect("source is active");
                black_box(leaves.len());
            });
        });
    }

    for depth in [4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("diamonds", depth), &depth, |b, &depth| {
            let engine = Engine::new();
            let (source, tip) = diamonds(&engine, depth);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(black_box(n % 8)).expect("source is active");
                black_box(tip.value());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_shapes);
criterion_main!(benches);
