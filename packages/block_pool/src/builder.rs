use std::alloc::{GlobalAlloc, System};
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{DropPolicy, DynamicPool, FixedPool, PoolError};

/// Number of slots in a block when the caller does not specify one.
#[cfg(not(miri))]
pub(crate) const DEFAULT_ENTRIES_PER_BLOCK: u32 = 128;

// Under Miri, we use a smaller default because Miri test runtime scales by memory usage.
#[cfg(miri)]
pub(crate) const DEFAULT_ENTRIES_PER_BLOCK: u32 = 4;

/// Builder for creating an instance of [`FixedPool`].
///
/// # Examples
///
/// ```
/// use block_pool::{DropPolicy, FixedPool};
///
/// let pool = FixedPool::<u32>::builder()
///     .capacity(1024)
///     .drop_policy(DropPolicy::MayDropItems)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.capacity(), 1024);
/// ```
#[must_use]
pub struct FixedPoolBuilder<T, A = System> {
    capacity: u32,
    drop_policy: DropPolicy,
    allocator: A,

    _item: PhantomData<T>,
}

impl<T, A> fmt::Debug for FixedPoolBuilder<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("allocator_type", &format_args!("{}", type_name::<A>()))
            .field("capacity", &self.capacity)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl<T> FixedPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: DEFAULT_ENTRIES_PER_BLOCK,
            drop_policy: DropPolicy::default(),
            allocator: System,
            _item: PhantomData,
        }
    }
}

impl<T, A: GlobalAlloc> FixedPoolBuilder<T, A> {
    /// Sets the number of objects the pool can hold. The pool never grows beyond this.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat remaining
    /// objects in the pool when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Sets the raw allocator that provides the pool's block.
    pub fn allocator<B: GlobalAlloc>(self, allocator: B) -> FixedPoolBuilder<T, B> {
        FixedPoolBuilder {
            capacity: self.capacity,
            drop_policy: self.drop_policy,
            allocator,
            _item: PhantomData,
        }
    }

    /// Builds the pool, allocating its block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is too large to represent or the allocator fails.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero or `T` is zero-sized.
    pub fn build(self) -> Result<FixedPool<T, A>, PoolError> {
        FixedPool::new_inner(self.capacity, self.drop_policy, self.allocator)
    }
}

/// Builder for creating an instance of [`DynamicPool`].
///
/// # Examples
///
/// ```
/// use block_pool::DynamicPool;
///
/// let pool = DynamicPool::<u64>::builder()
///     .entries_per_block(64)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.entries_per_block(), 64);
/// assert_eq!(pool.stats().block_count(), 1);
/// ```
#[must_use]
pub struct DynamicPoolBuilder<T, A = System> {
    entries_per_block: u32,
    drop_policy: DropPolicy,
    allocator: A,

    _item: PhantomData<T>,
}

impl<T, A> fmt::Debug for DynamicPoolBuilder<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicPoolBuilder")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("allocator_type", &format_args!("{}", type_name::<A>()))
            .field("entries_per_block", &self.entries_per_block)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl<T> DynamicPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries_per_block: DEFAULT_ENTRIES_PER_BLOCK,
            drop_policy: DropPolicy::default(),
            allocator: System,
            _item: PhantomData,
        }
    }
}

impl<T, A: GlobalAlloc + Clone> DynamicPoolBuilder<T, A> {
    /// Sets the number of objects in each block. The pool grows one block at a time.
    pub fn entries_per_block(mut self, entries_per_block: u32) -> Self {
        self.entries_per_block = entries_per_block;
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat remaining
    /// objects in the pool when the pool is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Sets the raw allocator that provides the pool's blocks.
    pub fn allocator<B: GlobalAlloc + Clone>(self, allocator: B) -> DynamicPoolBuilder<T, B> {
        DynamicPoolBuilder {
            entries_per_block: self.entries_per_block,
            drop_policy: self.drop_policy,
            allocator,
            _item: PhantomData,
        }
    }

    /// Builds the pool, allocating its first block.
    ///
    /// # Errors
    ///
    /// Returns an error if a block is too large to represent or the allocator fails.
    ///
    /// # Panics
    ///
    /// Panics if the block capacity is zero or `T` is zero-sized.
    pub fn build(self) -> Result<DynamicPool<T, A>, PoolError> {
        DynamicPool::new_inner(self.entries_per_block, self.drop_policy, self.allocator)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(FixedPoolBuilder<u32>: Send, Sync, fmt::Debug);
    assert_impl_all!(DynamicPoolBuilder<u32>: Send, Sync, fmt::Debug);
    assert_not_impl_any!(FixedPoolBuilder<Rc<u32>>: Send, Sync);

    #[test]
    fn defaults() {
        let pool = FixedPool::<u32>::builder().build().unwrap();
        assert_eq!(pool.capacity(), usize::try_from(DEFAULT_ENTRIES_PER_BLOCK).unwrap());

        let pool = DynamicPool::<u32>::builder().build().unwrap();
        assert_eq!(pool.entries_per_block(), DEFAULT_ENTRIES_PER_BLOCK);
    }

    #[test]
    fn debug_mentions_configuration() {
        let builder = DynamicPool::<u32>::builder().entries_per_block(7);
        let output = format!("{builder:?}");

        assert!(output.contains("u32"));
        assert!(output.contains('7'));
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_panic() {
        drop(FixedPool::<u32>::builder().capacity(0).build());
    }

    #[test]
    #[should_panic]
    fn zero_entries_per_block_is_panic() {
        drop(DynamicPool::<u32>::builder().entries_per_block(0).build());
    }
}
