//! Integration tests for `block_pool` exercising the public API end to end.
//!
//! These tests drive both pool variants through longer allocate/free sequences and check the
//! observable guarantees: live counts, slot reuse order, address stability and traversal.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::collections::HashSet;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use std::thread;

use block_pool::{DropPolicy, DynamicPool, FixedPool, PoolError, Pooled};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[test]
fn fixed_pool_live_count_is_allocations_minus_frees() {
    let mut pool = FixedPool::<u64>::new(32);
    let mut live: Vec<Pooled<u64>> = Vec::new();

    let mut rng = SmallRng::seed_from_u64(0x5EED);

    for _ in 0..1_000 {
        let value: u64 = rng.random();

        if rng.random_ratio(1, 3) && !live.is_empty() {
            let victim = live.swap_remove(rng.random_range(0..live.len()));
            pool.delete_object(victim);
        } else {
            match unsafe { pool.new_object(value) } {
                Some(item) => live.push(item),
                None => assert_eq!(live.len(), pool.capacity()),
            }
        }

        assert_eq!(pool.stats().allocation_count(), live.len());
        assert_eq!(pool.stats().block_count(), 1);
    }

    for item in live {
        pool.delete_object(item);
    }
}

#[test]
fn dynamic_pool_live_count_is_allocations_minus_frees() {
    let mut pool = DynamicPool::<u64>::new(8);
    let mut live: Vec<Pooled<u64>> = Vec::new();
    let mut max_live = 0;

    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);

    for _ in 0..1_000 {
        let value: u64 = rng.random();

        if rng.random_ratio(1, 3) && !live.is_empty() {
            let victim = live.swap_remove(rng.random_range(0..live.len()));
            pool.delete_object(victim);
        } else {
            live.push(unsafe { pool.new_object(value) }.unwrap());
        }

        max_live = max_live.max(live.len());

        let stats = pool.stats();
        assert_eq!(stats.allocation_count(), live.len());

        // The pool only grows when every block is full.
        assert!(stats.block_count() <= max_live.div_ceil(8).max(1));
    }

    for item in live {
        pool.delete_object(item);
    }

    assert!(pool.is_empty());
}

#[test]
fn freed_slots_are_reused_most_recent_first() {
    let mut pool = FixedPool::<u32>::new(8);

    let items: Vec<_> = (0..8).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();
    let addrs: Vec<NonNull<u32>> = items.iter().map(Pooled::ptr).collect();

    // Free slots 1, 4 and 6 in that order.
    let mut items: Vec<Option<Pooled<u32>>> = items.into_iter().map(Some).collect();
    for index in [1, 4, 6] {
        pool.delete_object(items[index].take().unwrap());
    }

    let reused: Vec<_> = (0..3).map(|i| unsafe { pool.new_object(100 + i) }.unwrap()).collect();
    let reused_addrs: Vec<_> = reused.iter().map(Pooled::ptr).collect();

    assert_eq!(reused_addrs, vec![addrs[6], addrs[4], addrs[1]]);

    for item in reused.into_iter().chain(items.into_iter().flatten()) {
        pool.delete_object(item);
    }
}

#[test]
fn traversal_matches_live_set_across_blocks() {
    let mut pool = DynamicPool::<usize>::new(5);

    let mut live = Vec::new();
    for i in 0..37 {
        let item = unsafe { pool.new_object(i) }.unwrap();
        if i % 4 == 1 {
            pool.delete_object(item);
        } else {
            live.push(item);
        }
    }

    let expected: HashSet<_> = live.iter().map(Pooled::ptr).collect();

    let mut visited = Vec::new();
    pool.for_each(|ptr| visited.push(ptr));

    assert_eq!(visited.len(), expected.len());
    assert_eq!(visited.iter().copied().collect::<HashSet<_>>(), expected);

    let values: usize = pool.iter().map(|ptr| unsafe { ptr.read() }).sum();
    assert_eq!(values, live.iter().map(|item| **item).sum::<usize>());

    for item in live {
        pool.delete_object(item);
    }
}

#[test]
fn addresses_survive_heavy_growth() {
    let mut pool = DynamicPool::<[u64; 4]>::new(3);

    let anchors: Vec<_> = (0..3)
        .map(|i| unsafe { pool.new_object([i; 4]) }.unwrap())
        .collect();
    let anchor_addrs: Vec<_> = anchors.iter().map(Pooled::ptr).collect();

    let filler: Vec<_> = (0..300)
        .map(|i| unsafe { pool.new_object([i; 4]) }.unwrap())
        .collect();

    for (index, anchor) in anchors.iter().enumerate() {
        assert_eq!(anchor.ptr(), anchor_addrs[index]);
        assert_eq!(**anchor, [index as u64; 4]);
    }

    for item in anchors.into_iter().chain(filler) {
        pool.delete_object(item);
    }
}

#[test]
fn objects_are_aligned_for_their_type() {
    #[repr(align(64))]
    #[derive(Debug)]
    struct CacheLine([u8; 40]);

    let mut pool = DynamicPool::<CacheLine>::new(3);

    let items: Vec<_> = (0..10)
        .map(|i| unsafe { pool.new_object(CacheLine([i; 40])) }.unwrap())
        .collect();

    for item in &items {
        assert_eq!(item.ptr().as_ptr().addr() % 64, 0);
    }

    for item in items {
        pool.delete_object(item);
    }
}

#[test]
fn pinned_access_through_handle() {
    let mut pool = FixedPool::<String>::new(2);

    let mut item = unsafe { pool.new_object("pinned".to_string()) }.unwrap();
    item.as_pin_mut().get_mut().push_str(" value");

    assert_eq!(item.as_pin().get_ref(), "pinned value");

    pool.delete_object(item);
}

#[test]
fn pool_moves_between_threads() {
    let mut pool = DynamicPool::<String>::new(4);
    let item = unsafe { pool.new_object("from main".to_string()) }.unwrap();

    let (pool, item) = thread::spawn(move || {
        assert_eq!(&*item, "from main");
        (pool, item)
    })
    .join()
    .unwrap();

    let mut pool = pool;
    assert_eq!(pool.take_object(item), "from main");
}

#[test]
fn pool_shared_via_mutex() {
    let pool = Arc::new(Mutex::new(
        DynamicPool::<usize>::builder()
            .entries_per_block(4)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap(),
    ));

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let pool = Arc::clone(&pool);

            thread::spawn(move || {
                for i in 0..25 {
                    let item = unsafe { pool.lock().unwrap().new_object(worker * 100 + i) }.unwrap();
                    assert_eq!(*item, worker * 100 + i);

                    if i % 2 == 0 {
                        pool.lock().unwrap().delete_object(item);
                    } else {
                        // Leak the handle, leaving the object for the pool to drop.
                        _ = item.into_ptr();
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    // 4 workers kept 12 objects each.
    assert_eq!(pool.lock().unwrap().stats().allocation_count(), 48);
}

#[test]
#[cfg(target_pointer_width = "64")]
fn oversized_block_is_error() {
    let result = FixedPool::<[u8; 1 << 40]>::try_new(u32::MAX);

    assert!(matches!(result, Err(PoolError::LayoutTooLarge(_))));
}
