use std::cell::Cell;
use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strand_core::{Computed, Runtime};

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain");

    for &depth in &[10, 100, 500] {
        let rt = Runtime::new();
        let head = rt.signal(0u64);
        let mut tail: Computed<u64> = rt.computed({
            let head = head.clone();
            move || head.get() + 1
        });
        for _ in 1..depth {
            let prev = tail;
            tail = rt.computed(move || prev.get() + 1);
        }

        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                head.set(n);
                black_box(tail.get());
            });
        });
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/fan_out");

    for &width in &[10, 100, 1_000] {
        let rt = Runtime::new();
        let source = rt.signal(0u64);
        let runs = Rc::new(Cell::new(0u64));
        let handles: Vec<_> = (0..width)
            .map(|_| {
                let (source, runs) = (source.clone(), runs.clone());
                rt.effect(move || runs.set(runs.get() + source.get()))
            })
            .collect();

        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n);
            });
        });

        black_box(runs.get());
        for handle in handles {
            handle.unsubscribe();
        }
    }

    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/batch");

    for &writes in &[10, 100] {
        let rt = Runtime::new();
        let signals: Vec<_> = (0..writes).map(|_| rt.signal(0u64)).collect();
        let sum = Rc::new(Cell::new(0u64));
        let handle = rt.effect({
            let (signals, sum) = (signals.clone(), sum.clone());
            move || sum.set(signals.iter().map(|s| s.get()).sum())
        });

        group.bench_with_input(BenchmarkId::from_parameter(writes), &writes, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                rt.batch(|| {
                    for signal in &signals {
                        signal.set(n);
                    }
                });
                black_box(sum.get());
            });
        });

        handle.unsubscribe();
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_batched_writes);
criterion_main!(benches);
