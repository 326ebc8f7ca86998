//! Basic benchmarks for the `block_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use block_pool::{DropPolicy, DynamicPool, FixedPool};
use criterion::{Criterion, criterion_group, criterion_main};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

const ENTRIES_PER_BLOCK: u32 = 128;

fn fixed_pool() -> FixedPool<TestItem> {
    FixedPool::builder()
        .capacity(ENTRIES_PER_BLOCK)
        .drop_policy(DropPolicy::MayDropItems)
        .build()
        .unwrap()
}

fn dynamic_pool() -> DynamicPool<TestItem> {
    DynamicPool::builder()
        .entries_per_block(ENTRIES_PER_BLOCK)
        .drop_policy(DropPolicy::MayDropItems)
        .build()
        .unwrap()
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("bp_basic");

    group.bench_function("fixed_build", |b| {
        b.iter(|| drop(black_box(fixed_pool())));
    });

    group.bench_function("fixed_new_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(fixed_pool)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                // SAFETY: The pool outlives every handle taken from it.
                _ = black_box(unsafe { pool.new_object(black_box(TEST_VALUE)) });
            }

            start.elapsed()
        });
    });

    group.bench_function("fixed_new_delete_churn", |b| {
        let mut pool = fixed_pool();

        b.iter(|| {
            // SAFETY: The pool outlives every handle taken from it.
            let item = unsafe { pool.new_object(black_box(TEST_VALUE)) }.unwrap();
            pool.delete_object(black_box(item));
        });
    });

    group.bench_function("dynamic_new_first", |b| {
        b.iter_custom(|iters| {
            let mut pools = iter::repeat_with(dynamic_pool)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for pool in &mut pools {
                // SAFETY: The pool outlives every handle taken from it.
                _ = black_box(unsafe { pool.new_object(black_box(TEST_VALUE)) });
            }

            start.elapsed()
        });
    });

    group.bench_function("dynamic_new_delete_churn", |b| {
        let mut pool = dynamic_pool();

        // Occupy a few blocks so the hint has to do its job.
        let _warm = (0..ENTRIES_PER_BLOCK * 4)
            // SAFETY: The pool outlives every handle taken from it.
            .map(|_| unsafe { pool.new_object(TEST_VALUE) }.unwrap())
            .collect::<Vec<_>>();

        // SAFETY: The pool outlives every handle taken from it.
        let hole = unsafe { pool.new_object(TEST_VALUE) }.unwrap();
        pool.delete_object(hole);

        b.iter(|| {
            // SAFETY: The pool outlives every handle taken from it.
            let item = unsafe { pool.new_object(black_box(TEST_VALUE)) }.unwrap();
            pool.delete_object(black_box(item));
        });
    });

    group.bench_function("dynamic_stats", |b| {
        let mut pool = dynamic_pool();

        let _warm = (0..ENTRIES_PER_BLOCK * 4)
            // SAFETY: The pool outlives every handle taken from it.
            .map(|_| unsafe { pool.new_object(TEST_VALUE) }.unwrap())
            .collect::<Vec<_>>();

        b.iter(|| black_box(pool.stats()));
    });

    group.finish();
}
