//! Benchmarks for the MPMC offset queue
//!
//! Target: <20ns per uncontended push/pull pair

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sigroute::core::Queue;
use std::sync::Arc;
use std::thread;

fn bench_push_pull(c: &mut Criterion) {
    let queue = Queue::new(1024);

    c.bench_function("queue_push_pull", |b| {
        b.iter(|| {
            let _ = queue.push(black_box(42));
            black_box(queue.pull())
        })
    });
}

fn bench_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_batch");
    for size in [8usize, 64, 256] {
        let queue = Queue::new(1024);
        let input: Vec<usize> = (0..size).collect();
        let mut output = vec![0usize; size];

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let _ = queue.push_many(black_box(&input));
                black_box(queue.pull_many(&mut output))
            })
        });
    }
    group.finish();
}

fn bench_spsc_threads(c: &mut Criterion) {
    const ITEMS: usize = 10_000;

    c.bench_function("queue_spsc_10k", |b| {
        b.iter(|| {
            let queue = Arc::new(Queue::new(256));
            let producer = {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..ITEMS {
                        while queue.push(i).is_err() {
                            std::hint::spin_loop();
                        }
                    }
                })
            };

            let mut received = 0;
            while received < ITEMS {
                if queue.pull().is_ok() {
                    received += 1;
                }
            }
            let _ = producer.join();
            black_box(received)
        })
    });
}

criterion_group!(benches, bench_push_pull, bench_batches, bench_spsc_threads);
criterion_main!(benches);
