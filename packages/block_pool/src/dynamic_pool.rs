use std::alloc::{GlobalAlloc, System};
use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

use crate::block::SlabBlock;
use crate::raw::{SlotIndex, index_to_usize};
use crate::{DropPolicy, DynamicPoolBuilder, PoolError, PoolStats, Pooled};

/// Per-block bookkeeping kept by a [`DynamicPool`].
struct BlockInfo<T, A: GlobalAlloc> {
    /// Number of vacant slots in `block`. Never larger than the true count, so a non-zero value
    /// guarantees the block can satisfy an allocation.
    num_free: SlotIndex,

    /// Start of the slot array of `block`, cached for ownership tests on delete.
    first_slot: NonNull<T>,

    block: SlabBlock<T, A>,
}

impl<T, A: GlobalAlloc> BlockInfo<T, A> {
    fn new(block: SlabBlock<T, A>) -> Self {
        Self {
            num_free: block.capacity(),
            first_slot: block.first_slot_ptr(),
            block,
        }
    }

    fn is_empty(&self) -> bool {
        self.num_free == self.block.capacity()
    }

    fn owns(&self, ptr: NonNull<T>) -> bool {
        ptr.as_ptr()
            .addr()
            .checked_sub(self.first_slot.as_ptr().addr())
            .is_some_and(|offset| offset < self.block.slots_size())
    }
}

// SAFETY: `first_slot` points into memory owned by `block`, so the record may move between
// threads whenever the block may.
unsafe impl<T: Send, A: GlobalAlloc + Send> Send for BlockInfo<T, A> {}

/// An object pool that grows one block at a time as objects are allocated.
///
/// Each block holds [`entries_per_block()`][1] objects. When every existing block is full, the
/// pool requests one more block from the raw allocator. Blocks are never released until the pool
/// is dropped, so an object keeps its address for as long as it is live.
///
/// The pool remembers the lowest-indexed block that may have space, which makes repeated
/// allocations into the same block O(1) instead of a scan over every block. Deleting an object
/// scans the blocks to find the one that owns it.
///
/// # Examples
///
/// ```
/// use block_pool::DynamicPool;
///
/// let mut pool = DynamicPool::<u64>::new(2);
///
/// // SAFETY: The pool outlives every handle taken from it.
/// let items: Vec<_> = (0..5).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();
///
/// let stats = pool.stats();
/// assert_eq!(stats.block_count(), 3);
/// assert_eq!(stats.allocation_count(), 5);
///
/// for item in items {
///     pool.delete_object(item);
/// }
///
/// // Blocks are retained after being emptied.
/// assert_eq!(pool.stats().block_count(), 3);
/// assert!(pool.is_empty());
/// ```
///
/// [1]: Self::entries_per_block
pub struct DynamicPool<T, A: GlobalAlloc + Clone = System> {
    /// Blocks in creation order. Only ever appended to.
    blocks: Vec<BlockInfo<T, A>>,

    /// Lowest index of any block that may have a vacant slot. Every block before this index is
    /// full. Equal to `blocks.len()` if no block is known to have space.
    free_block_index: usize,

    entries_per_block: SlotIndex,

    drop_policy: DropPolicy,

    allocator: A,
}

impl<T> DynamicPool<T> {
    /// Creates a pool with `entries_per_block` objects per block and the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `entries_per_block` is zero, if `T` is zero-sized or if the first block cannot
    /// be allocated.
    #[must_use]
    pub fn new(entries_per_block: u32) -> Self {
        Self::try_new(entries_per_block).unwrap_or_else(|error| {
            panic!(
                "failed to create a dynamic pool of {} with {entries_per_block} entries per block: {error}",
                type_name::<T>()
            )
        })
    }

    /// Creates a pool with `entries_per_block` objects per block and the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the first block is too large to represent or cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `entries_per_block` is zero or `T` is zero-sized.
    pub fn try_new(entries_per_block: u32) -> Result<Self, PoolError> {
        Self::builder().entries_per_block(entries_per_block).build()
    }

    /// Starts building a new [`DynamicPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    pub fn builder() -> DynamicPoolBuilder<T> {
        DynamicPoolBuilder::new()
    }
}

impl<T, A: GlobalAlloc + Clone> DynamicPool<T, A> {
    pub(crate) fn new_inner(
        entries_per_block: u32,
        drop_policy: DropPolicy,
        allocator: A,
    ) -> Result<Self, PoolError> {
        let first = SlabBlock::new(entries_per_block, drop_policy, allocator.clone())?;

        Ok(Self {
            blocks: vec![BlockInfo::new(first)],
            free_block_index: 0,
            entries_per_block,
            drop_policy,
            allocator,
        })
    }

    /// The number of objects each block holds.
    #[must_use]
    pub fn entries_per_block(&self) -> u32 {
        self.entries_per_block
    }

    /// The number of objects the pool can hold without adding another block.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.blocks
            .len()
            .checked_mul(index_to_usize(self.entries_per_block))
            .expect("the blocks exist in memory, so their total capacity fits in usize")
    }

    /// Whether the pool holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(BlockInfo::is_empty)
    }

    /// Moves `value` into a vacant slot and returns a handle to it, adding a block if needed.
    ///
    /// Returns `None` only if a new block was needed and could not be allocated, in which case
    /// `value` is dropped.
    ///
    /// # Safety
    ///
    /// The returned handle does not borrow the pool. The caller must ensure the handle is not
    /// dereferenced after the pool has been dropped, because dropping the pool releases the
    /// memory of every object still in it.
    ///
    /// Because of this, handing out a handle cannot be done from safe code:
    ///
    /// ```compile_fail
    /// use block_pool::DynamicPool;
    ///
    /// let mut pool = DynamicPool::<u64>::new(1);
    ///
    /// let item = pool.new_object(1);
    /// ```
    #[must_use]
    pub unsafe fn new_object(&mut self, value: T) -> Option<Pooled<T>> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.new_object_with(|| value) }
    }

    /// Constructs an object in a vacant slot by calling `f` and returns a handle to it, adding a
    /// block if needed.
    ///
    /// Returns `None` without calling `f` if a new block was needed and could not be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::DynamicPool;
    ///
    /// let mut pool = DynamicPool::<String>::new(8);
    ///
    /// // SAFETY: The pool outlives every handle taken from it.
    /// let name = unsafe { pool.new_object_with(|| format!("worker-{}", 7)) }.unwrap();
    /// assert_eq!(&*name, "worker-7");
    ///
    /// pool.delete_object(name);
    /// ```
    ///
    /// # Safety
    ///
    /// The returned handle does not borrow the pool. The caller must ensure the handle is not
    /// dereferenced after the pool has been dropped, because dropping the pool releases the
    /// memory of every object still in it.
    #[must_use]
    pub unsafe fn new_object_with(&mut self, f: impl FnOnce() -> T) -> Option<Pooled<T>> {
        let block_index = match self.index_of_block_with_vacant_slot() {
            Some(index) => index,
            None => self.add_block()?,
        };

        self.free_block_index = block_index;

        let info = self
            .blocks
            .get_mut(block_index)
            .expect("we just found or created a block at this index");

        let ptr = info
            .block
            .new_object_with(f)
            .expect("the block has a non-zero free count, so it has a vacant slot");

        // Cannot underflow, the free count was non-zero.
        info.num_free = info.num_free.wrapping_sub(1);

        Some(Pooled::new(ptr))
    }

    /// Drops the object in place and makes its slot available for reuse.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not issued by this pool.
    #[allow(
        clippy::needless_pass_by_value,
        reason = "Pooled must be consumed to prevent reuse"
    )]
    pub fn delete_object(&mut self, pooled: Pooled<T>) {
        let ptr = pooled.into_ptr();
        let block_index = self.index_of_owner(ptr);

        let info = self
            .blocks
            .get_mut(block_index)
            .expect("we just found the owner at this index");

        info.block.delete_object(ptr);

        // Cannot overflow, the block had at least one occupied slot.
        info.num_free = info.num_free.wrapping_add(1);

        self.update_free_block_index(block_index);
    }

    /// Moves the object out of the pool and makes its slot available for reuse.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not issued by this pool.
    #[must_use]
    #[allow(
        clippy::needless_pass_by_value,
        reason = "Pooled must be consumed to prevent reuse"
    )]
    pub fn take_object(&mut self, pooled: Pooled<T>) -> T {
        let ptr = pooled.into_ptr();
        let block_index = self.index_of_owner(ptr);

        let info = self
            .blocks
            .get_mut(block_index)
            .expect("we just found the owner at this index");

        let value = info.block.take_object(ptr);

        // Cannot overflow, the block had at least one occupied slot.
        info.num_free = info.num_free.wrapping_add(1);

        self.update_free_block_index(block_index);

        value
    }

    /// Calls `f` with a pointer to every live object, block by block in creation order and in
    /// slot order within each block.
    ///
    /// Pointers are provided instead of references because live objects may be exclusively
    /// borrowed through their [`Pooled`] handles. Dereferencing them is up to the caller.
    pub fn for_each(&self, f: impl FnMut(NonNull<T>)) {
        self.iter().for_each(f);
    }

    /// Iterates over pointers to every live object, in the same order as
    /// [`for_each()`](Self::for_each).
    pub fn iter(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        self.blocks
            .iter()
            .filter(|info| !info.is_empty())
            .flat_map(|info| info.block.iter())
    }

    /// Reports the number of blocks and the number of live objects.
    ///
    /// The live object count is obtained by scanning every non-empty block.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let allocation_count = self
            .blocks
            .iter()
            .filter(|info| !info.is_empty())
            .map(|info| info.block.count_allocations())
            .sum();

        PoolStats::new(self.blocks.len(), allocation_count)
    }

    /// Scans forward from the free block hint for a block with a vacant slot.
    fn index_of_block_with_vacant_slot(&self) -> Option<usize> {
        let offset = self
            .blocks
            .get(self.free_block_index..)?
            .iter()
            .position(|info| info.num_free != 0)?;

        // Cannot overflow, the sum is a valid index into `blocks`.
        Some(self.free_block_index.wrapping_add(offset))
    }

    /// Appends a new block and returns its index, or `None` if the block cannot be allocated.
    #[cold]
    fn add_block(&mut self) -> Option<usize> {
        match SlabBlock::new(
            self.entries_per_block,
            self.drop_policy,
            self.allocator.clone(),
        ) {
            Ok(block) => {
                self.blocks.push(BlockInfo::new(block));

                tracing::debug!(
                    item_type = type_name::<T>(),
                    block_count = self.blocks.len(),
                    entries_per_block = self.entries_per_block,
                    "added block to dynamic pool"
                );

                Some(
                    self.blocks
                        .len()
                        .checked_sub(1)
                        .expect("we just pushed a block, so len >= 1"),
                )
            }
            Err(error) => {
                tracing::warn!(
                    item_type = type_name::<T>(),
                    block_count = self.blocks.len(),
                    %error,
                    "failed to add block to dynamic pool"
                );

                // Every block is full.
                self.free_block_index = self.blocks.len();
                None
            }
        }
    }

    fn index_of_owner(&self, ptr: NonNull<T>) -> usize {
        self.blocks
            .iter()
            .position(|info| info.owns(ptr))
            .unwrap_or_else(|| {
                panic!(
                    "pointer {ptr:?} does not belong to any block of dynamic pool of {}",
                    type_name::<T>()
                )
            })
    }

    /// Pulls the free block hint down to a block that just gained a vacant slot.
    #[cfg_attr(test, mutants::skip)] // This is a cache, mutations only cost performance.
    fn update_free_block_index(&mut self, block_index: usize) {
        self.free_block_index = self.free_block_index.min(block_index);
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(test)]
    pub(crate) fn integrity_check(&self) {
        assert!(
            self.free_block_index <= self.blocks.len(),
            "free block index {} is beyond {} blocks",
            self.free_block_index,
            self.blocks.len()
        );

        for (index, info) in self.blocks.iter().enumerate() {
            #[cfg(debug_assertions)]
            info.block.integrity_check();

            let actual_free = index_to_usize(info.block.capacity())
                .wrapping_sub(info.block.count_allocations());

            assert_eq!(
                index_to_usize(info.num_free),
                actual_free,
                "cached free count of block {index} is stale"
            );

            if index < self.free_block_index {
                assert_eq!(
                    info.num_free, 0,
                    "block {index} has space but is before the free block index"
                );
            }
        }
    }
}

impl<T, A: GlobalAlloc + Clone> fmt::Debug for DynamicPool<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("block_count", &self.blocks.len())
            .field("entries_per_block", &self.entries_per_block)
            .field("free_block_index", &self.free_block_index)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    clippy::items_after_statements,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::alloc::Layout;
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::ptr;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(DynamicPool<u32>: Send, fmt::Debug);
    assert_not_impl_any!(DynamicPool<u32>: Sync);
    assert_not_impl_any!(DynamicPool<Rc<u32>>: Send, Sync);

    /// Forwards to the system allocator until its budget of allocations is spent.
    #[derive(Clone, Debug)]
    struct BudgetAllocator {
        remaining: Arc<AtomicUsize>,
    }

    impl BudgetAllocator {
        fn new(budget: usize) -> Self {
            Self {
                remaining: Arc::new(AtomicUsize::new(budget)),
            }
        }
    }

    // SAFETY: Forwards to the system allocator or reports failure.
    unsafe impl GlobalAlloc for BudgetAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            if self
                .remaining
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_err()
            {
                return ptr::null_mut();
            }

            unsafe { System.alloc(layout) }
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            unsafe { System.dealloc(ptr, layout) }
        }
    }

    #[test]
    fn starts_with_one_block() {
        let pool = DynamicPool::<u32>::new(4);

        assert_eq!(pool.stats().block_count(), 1);
        assert_eq!(pool.capacity(), 4);
        assert!(pool.is_empty());
    }

    #[test]
    fn per_block_capacity_two_scenario() {
        let mut pool = DynamicPool::<u32>::new(2);

        let items: Vec<_> = (0..5).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();

        let stats = pool.stats();
        assert_eq!(stats.block_count(), 3);
        assert_eq!(stats.allocation_count(), 5);
        pool.integrity_check();

        for item in items {
            pool.delete_object(item);
        }

        let stats = pool.stats();
        assert_eq!(stats.block_count(), 3);
        assert_eq!(stats.allocation_count(), 0);
        assert!(pool.is_empty());
        pool.integrity_check();
    }

    #[test]
    fn grows_by_exactly_one_block_when_full() {
        let mut pool = DynamicPool::<u64>::new(3);
        let mut items = Vec::new();

        for i in 0..3 {
            items.push(unsafe { pool.new_object(i) }.unwrap());
        }
        assert_eq!(pool.stats().block_count(), 1);

        items.push(unsafe { pool.new_object(3) }.unwrap());
        assert_eq!(pool.stats().block_count(), 2);
        assert_eq!(pool.capacity(), 6);

        for item in items {
            pool.delete_object(item);
        }
    }

    #[test]
    fn fills_hole_before_adding_block() {
        let mut pool = DynamicPool::<u32>::new(2);

        let a = unsafe { pool.new_object(1) }.unwrap();
        let b = unsafe { pool.new_object(2) }.unwrap();
        let c = unsafe { pool.new_object(3) }.unwrap();
        assert_eq!(pool.stats().block_count(), 2);

        let a_addr = a.ptr();
        pool.delete_object(a);

        // The hint is pulled back to the first block, so the hole is reused.
        let d = unsafe { pool.new_object(4) }.unwrap();
        assert_eq!(d.ptr(), a_addr);
        assert_eq!(pool.stats().block_count(), 2);
        pool.integrity_check();

        pool.delete_object(b);
        pool.delete_object(c);
        pool.delete_object(d);
    }

    #[test]
    fn prefers_lowest_block_with_space() {
        let mut pool = DynamicPool::<u32>::new(2);

        let items: Vec<_> = (0..6).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();
        let mut items = items.into_iter().map(Some).collect::<Vec<_>>();

        // Free one slot in the last block, then one in the first block.
        let last_addr = items[5].as_ref().unwrap().ptr();
        let first_addr = items[0].as_ref().unwrap().ptr();
        pool.delete_object(items[5].take().unwrap());
        pool.delete_object(items[0].take().unwrap());

        let x = unsafe { pool.new_object(10) }.unwrap();
        let y = unsafe { pool.new_object(11) }.unwrap();

        assert_eq!(x.ptr(), first_addr);
        assert_eq!(y.ptr(), last_addr);
        assert_eq!(pool.stats().block_count(), 3);
        pool.integrity_check();

        pool.delete_object(x);
        pool.delete_object(y);
        for item in items.into_iter().flatten() {
            pool.delete_object(item);
        }
    }

    #[test]
    fn addresses_are_stable_across_growth() {
        let mut pool = DynamicPool::<u64>::new(2);

        let anchor = unsafe { pool.new_object(0xABCD) }.unwrap();
        let anchor_addr = anchor.ptr();

        let more: Vec<_> = (0..20).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();

        assert_eq!(anchor.ptr(), anchor_addr);
        assert_eq!(*anchor, 0xABCD);

        pool.delete_object(anchor);
        for item in more {
            pool.delete_object(item);
        }
    }

    #[test]
    fn for_each_visits_each_live_object_once() {
        let mut pool = DynamicPool::<u32>::new(3);

        let items: Vec<_> = (0..10).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();
        let mut kept = Vec::new();

        for item in items {
            if *item % 2 == 0 {
                kept.push(item);
            } else {
                pool.delete_object(item);
            }
        }

        let mut seen = Vec::new();
        pool.for_each(|ptr| seen.push(unsafe { ptr.read() }));
        assert_eq!(seen, vec![0, 2, 4, 6, 8]);

        let distinct: HashSet<_> = pool.iter().collect();
        assert_eq!(distinct.len(), 5);

        for item in kept {
            pool.delete_object(item);
        }
    }

    #[test]
    fn take_object_returns_value() {
        let mut pool = DynamicPool::<String>::new(1);

        let a = unsafe { pool.new_object("a".to_string()) }.unwrap();
        let b = unsafe { pool.new_object("b".to_string()) }.unwrap();

        assert_eq!(pool.take_object(b), "b");
        assert_eq!(pool.take_object(a), "a");
        assert!(pool.is_empty());
        pool.integrity_check();
    }

    #[test]
    fn block_allocation_failure_is_none() {
        let mut pool = DynamicPool::<u32>::builder()
            .entries_per_block(2)
            .allocator(BudgetAllocator::new(2))
            .build()
            .unwrap();

        let mut items: Vec<_> = (0..4).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();
        assert_eq!(pool.stats().block_count(), 2);

        let called = Cell::new(false);
        let result = unsafe {
            pool.new_object_with(|| {
                called.set(true);
                99
            })
        };
        assert!(result.is_none());
        assert!(!called.get());
        assert_eq!(pool.stats().block_count(), 2);
        pool.integrity_check();

        // Space freed in an existing block is still usable.
        pool.delete_object(items.pop().unwrap());
        items.push(unsafe { pool.new_object(5) }.unwrap());

        for item in items {
            pool.delete_object(item);
        }
    }

    #[test]
    fn first_block_allocation_failure_is_error() {
        let result = DynamicPool::<u32>::builder()
            .allocator(BudgetAllocator::new(0))
            .build();

        assert!(matches!(result, Err(PoolError::AllocationFailed { .. })));
    }

    #[test]
    #[should_panic]
    fn foreign_handle_is_panic() {
        let mut pool_a = DynamicPool::<u32>::builder()
            .entries_per_block(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();
        let mut pool_b = DynamicPool::<u32>::builder()
            .entries_per_block(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();

        let item = unsafe { pool_a.new_object(1) }.unwrap();
        pool_b.delete_object(item);
    }

    #[test]
    #[should_panic]
    fn drop_with_live_objects_is_panic() {
        let mut pool = DynamicPool::<u32>::new(2);
        _ = unsafe { pool.new_object(1) }.unwrap();
    }

    #[test]
    fn drop_with_may_drop_policy_drops_objects_in_every_block() {
        let dropped = Rc::new(Cell::new(0_usize));

        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut pool = DynamicPool::<Counted>::builder()
            .entries_per_block(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();

        for _ in 0..5 {
            _ = unsafe { pool.new_object(Counted(Rc::clone(&dropped))) }.unwrap();
        }

        drop(pool);
        assert_eq!(dropped.get(), 5);
    }

    #[test]
    fn churn_keeps_bookkeeping_consistent() {
        let mut pool = DynamicPool::<usize>::new(4);
        let mut live = Vec::new();

        for step in 0..200_usize {
            if step % 5 >= 3 && !live.is_empty() {
                let victim = live.swap_remove(step % live.len());
                pool.delete_object(victim);
            } else {
                live.push(unsafe { pool.new_object(step) }.unwrap());
            }

            assert_eq!(pool.stats().allocation_count(), live.len());
            pool.integrity_check();
        }

        for item in live {
            pool.delete_object(item);
        }
    }

    #[test]
    fn debug_mentions_item_type() {
        let pool = DynamicPool::<u16>::new(2);

        assert!(format!("{pool:?}").contains("u16"));
    }
}
