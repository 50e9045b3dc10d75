//! Benchmarks for chunk processing.

use batchflow::errors::{Failure, ProcessingError};
use batchflow::events::NoOpEventSink;
use batchflow::items::{FnTransformer, IterSource};
use batchflow::step::{Step, StepBuilder};
use batchflow::testing::TransactionalStore;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

const ITEMS: u64 = 1_000;

fn run_step(rt: &tokio::runtime::Runtime, chunk_size: usize, fail_every: Option<u64>) -> u64 {
    let store = Arc::new(TransactionalStore::new());
    let mut step = StepBuilder::<u64, u64>::new("bench")
        .chunk_size(chunk_size)
        .skip_limit(ITEMS)
        .source(IterSource::from_vec((1..=ITEMS).collect()))
        .transformer(FnTransformer::new(move |n: &u64| match fail_every {
            Some(every) if n % every == 0 => {
                Err(Box::new(ProcessingError::new("rejected")) as Failure)
            }
            _ => Ok(Some(n * 2)),
        }))
        .transactional_sink(store)
        .build()
        .unwrap();

    let execution = rt.block_on(step.execute(&NoOpEventSink));
    execution.stats.write_count
}

fn chunk_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("chunk");
    for chunk_size in [10, 100] {
        group.bench_with_input(
            BenchmarkId::new("clean", chunk_size),
            &chunk_size,
            |b, &size| b.iter(|| black_box(run_step(&rt, size, None))),
        );
        group.bench_with_input(
            BenchmarkId::new("isolation", chunk_size),
            &chunk_size,
            |b, &size| b.iter(|| black_box(run_step(&rt, size, Some(50)))),
        );
    }
    group.finish();
}

criterion_group!(benches, chunk_benchmark);
criterion_main!(benches);
