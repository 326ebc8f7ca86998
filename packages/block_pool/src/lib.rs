//! Fixed-size object pools backed by contiguous slab blocks.
//!
//! This crate provides two pools that hand out storage for objects of a single type `T`:
//!
//! - [`FixedPool`] owns exactly one block and never grows. Once full, allocation returns `None`
//!   until an object is freed.
//! - [`DynamicPool`] owns a growing sequence of blocks and adds one block whenever all existing
//!   blocks are full.
//!
//! Each block is a single allocation holding a small header, one `u32` index per slot and the
//! slots themselves. The index array encodes both the free list and the occupancy map, so
//! allocating and freeing an object within a block are O(1) and never touch the raw allocator.
//! Freed slots are reused most-recently-freed first.
//!
//! # Key Features
//!
//! - **Stable memory addresses**: Objects never move while they are live
//! - **Exclusive handles**: [`Pooled<T>`] cannot be copied and is consumed on removal, so an
//!   object cannot be freed twice through safe code
//! - **Explicit lifetime contract**: Handles do not borrow the pool, so allocation is `unsafe`
//!   and the caller promises not to use a handle once its pool has been dropped
//! - **Cache-line aligned blocks**: Blocks never share a cache line and honor strictly aligned
//!   types
//! - **Pluggable raw allocator**: Blocks come from any [`std::alloc::GlobalAlloc`], by default
//!   [`std::alloc::System`]
//! - **Flexible drop policies**: Configure behavior when a pool is dropped with live objects
//! - **Thread mobility**: Pools can be moved between threads (but not shared without
//!   synchronization)
//!
//! # Out of band access
//!
//! The pools never hold references to their contents. Traversal with `for_each()` or `iter()`
//! yields raw pointers, leaving it to the caller to ensure no conflicting references exist while
//! dereferencing them.
//!
//! # Examples
//!
//! ## Fixed capacity
//!
//! ```rust
//! use block_pool::FixedPool;
//!
//! let mut pool = FixedPool::<u64>::new(2);
//!
//! // SAFETY: The pool outlives every handle taken from it.
//! let a = unsafe { pool.new_object(1) }.unwrap();
//! let b = unsafe { pool.new_object(2) }.unwrap();
//! assert!(unsafe { pool.new_object(3) }.is_none());
//!
//! pool.delete_object(a);
//! // SAFETY: The pool outlives every handle taken from it.
//! let c = unsafe { pool.new_object(3) }.unwrap();
//!
//! assert_eq!(*b + *c, 5);
//!
//! pool.delete_object(b);
//! pool.delete_object(c);
//! ```
//!
//! ## Growing on demand
//!
//! ```rust
//! use block_pool::DynamicPool;
//!
//! let mut pool = DynamicPool::<String>::new(16);
//!
//! let handles: Vec<_> = (0..100)
//!     // SAFETY: The pool outlives every handle taken from it.
//!     .map(|i| unsafe { pool.new_object(format!("item {i}")) }.unwrap())
//!     .collect();
//!
//! assert_eq!(pool.stats().allocation_count(), 100);
//! assert_eq!(pool.stats().block_count(), 7);
//!
//! for handle in handles {
//!     pool.delete_object(handle);
//! }
//! ```
//!
//! ## Custom configuration
//!
//! ```rust
//! use std::alloc::System;
//!
//! use block_pool::{DropPolicy, DynamicPool};
//!
//! let mut pool = DynamicPool::<Vec<u8>>::builder()
//!     .entries_per_block(32)
//!     .drop_policy(DropPolicy::MayDropItems)
//!     .allocator(System)
//!     .build()
//!     .unwrap();
//!
//! // SAFETY: The handle is never used after the pool is dropped.
//! let _buffer = unsafe { pool.new_object_with(|| vec![0; 4096]) }.unwrap();
//!
//! // Remaining objects are dropped together with the pool.
//! drop(pool);
//! ```

mod block;
mod builder;
mod drop_policy;
mod dynamic_pool;
mod error;
mod fixed_pool;
mod pooled;
mod raw;
mod stats;

pub use builder::*;
pub use drop_policy::*;
pub use dynamic_pool::DynamicPool;
pub use error::*;
pub use fixed_pool::FixedPool;
pub use pooled::Pooled;
pub use stats::*;
