//! Benchmarks for sample allocation
//!
//! Target: <50ns per alloc/release

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sigroute::core::{SamplePool, SignalData};

fn bench_alloc_release(c: &mut Criterion) {
    let pool = SamplePool::new(1024, 8);

    c.bench_function("sample_alloc_release", |b| {
        b.iter(|| black_box(pool.alloc()))
    });
}

fn bench_alloc_many(c: &mut Criterion) {
    let pool = SamplePool::new(1024, 8);
    let mut batch = Vec::with_capacity(64);

    c.bench_function("sample_alloc_many_64", |b| {
        b.iter(|| {
            let n = pool.alloc_many(&mut batch, black_box(64));
            batch.clear();
            black_box(n)
        })
    });
}

fn bench_clone_and_fill(c: &mut Criterion) {
    let pool = SamplePool::new(16, 8);
    let values = [SignalData::Float(1.5); 8];

    c.bench_function("sample_fill_and_share", |b| {
        b.iter(|| {
            let mut smp = pool.alloc();
            if let Some(s) = smp.as_mut().and_then(|s| s.get_mut()) {
                s.set_values(black_box(&values));
            }
            let shared = smp.clone();
            black_box((smp, shared))
        })
    });
}

criterion_group!(benches, bench_alloc_release, bench_alloc_many, bench_clone_and_fill);
criterion_main!(benches);
