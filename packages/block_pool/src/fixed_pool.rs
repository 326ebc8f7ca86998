use std::alloc::{GlobalAlloc, System};
use std::any::type_name;
use std::fmt;
use std::ptr::NonNull;

use crate::block::SlabBlock;
use crate::raw::index_to_usize;
use crate::{DropPolicy, FixedPoolBuilder, PoolError, PoolStats, Pooled};

/// An object pool with a fixed capacity, backed by a single contiguous block.
///
/// Allocating and freeing objects are O(1) operations that never touch the raw allocator. Once
/// all slots are occupied, [`new_object()`][1] returns `None` until an object is freed; the pool
/// never grows. For a pool that grows on demand, see [`DynamicPool`][2].
///
/// Freed slots are reused most-recently-freed first, which keeps the working set of a churning
/// workload in as few cache lines as possible.
///
/// # Examples
///
/// ```
/// use block_pool::FixedPool;
///
/// let mut pool = FixedPool::<u32>::new(3);
///
/// // SAFETY: The pool outlives every handle taken from it.
/// let a = unsafe { pool.new_object(1) }.unwrap();
/// let b = unsafe { pool.new_object(2) }.unwrap();
/// let c = unsafe { pool.new_object(3) }.unwrap();
///
/// // The pool is full.
/// // SAFETY: The pool outlives every handle taken from it.
/// assert!(unsafe { pool.new_object(4) }.is_none());
///
/// pool.delete_object(b);
/// // SAFETY: The pool outlives every handle taken from it.
/// let d = unsafe { pool.new_object(4) }.unwrap();
/// assert_eq!(pool.stats().allocation_count(), 3);
///
/// pool.delete_object(a);
/// pool.delete_object(c);
/// pool.delete_object(d);
/// ```
///
/// [1]: Self::new_object
/// [2]: crate::DynamicPool
pub struct FixedPool<T, A: GlobalAlloc = System> {
    block: SlabBlock<T, A>,
}

impl<T> FixedPool<T> {
    /// Creates a pool that can hold `capacity` objects, with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, if `T` is zero-sized or if the block cannot be allocated.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self::try_new(capacity).unwrap_or_else(|error| {
            panic!(
                "failed to create a fixed pool of {} with capacity {capacity}: {error}",
                type_name::<T>()
            )
        })
    }

    /// Creates a pool that can hold `capacity` objects, with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is too large to represent or cannot be allocated.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `T` is zero-sized.
    pub fn try_new(capacity: u32) -> Result<Self, PoolError> {
        Self::builder().capacity(capacity).build()
    }

    /// Starts building a new [`FixedPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the defaults.
    pub fn builder() -> FixedPoolBuilder<T> {
        FixedPoolBuilder::new()
    }
}

impl<T, A: GlobalAlloc> FixedPool<T, A> {
    pub(crate) fn new_inner(
        capacity: u32,
        drop_policy: DropPolicy,
        allocator: A,
    ) -> Result<Self, PoolError> {
        Ok(Self {
            block: SlabBlock::new(capacity, drop_policy, allocator)?,
        })
    }

    /// The number of objects the pool can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        index_to_usize(self.block.capacity())
    }

    /// Whether every slot in the pool is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.block.is_full()
    }

    /// Whether the pool holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block.iter().next().is_none()
    }

    /// Moves `value` into a vacant slot and returns a handle to it.
    ///
    /// Returns `None` if the pool is full, in which case `value` is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<String>::new(1);
    ///
    /// // SAFETY: The pool outlives every handle taken from it.
    /// let item = unsafe { pool.new_object("first".to_string()) }.unwrap();
    /// assert!(unsafe { pool.new_object("second".to_string()) }.is_none());
    ///
    /// pool.delete_object(item);
    /// ```
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
    /// use block_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u64>::new(1);
    ///
    /// let item = pool.new_object(1);
    /// ```
    #[must_use]
    pub unsafe fn new_object(&mut self, value: T) -> Option<Pooled<T>> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { self.new_object_with(|| value) }
    }

    /// Constructs an object in a vacant slot by calling `f` and returns a handle to it.
    ///
    /// Returns `None` without calling `f` if the pool is full.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<Vec<u8>>::new(2);
    ///
    /// // SAFETY: The pool outlives every handle taken from it.
    /// let buffer = unsafe { pool.new_object_with(|| Vec::with_capacity(1024)) }.unwrap();
    /// assert!(buffer.capacity() >= 1024);
    ///
    /// pool.delete_object(buffer);
    /// ```
    ///
    /// # Safety
    ///
    /// The returned handle does not borrow the pool. The caller must ensure the handle is not
    /// dereferenced after the pool has been dropped, because dropping the pool releases the
    /// memory of every object still in it.
    #[must_use]
    pub unsafe fn new_object_with(&mut self, f: impl FnOnce() -> T) -> Option<Pooled<T>> {
        self.block.new_object_with(f).map(Pooled::new)
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
        self.block.delete_object(pooled.into_ptr());
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
        self.block.take_object(pooled.into_ptr())
    }

    /// Calls `f` with a pointer to every live object, in slot order.
    ///
    /// Pointers are provided instead of references because live objects may be exclusively
    /// borrowed through their [`Pooled`] handles. Dereferencing them is up to the caller.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_pool::FixedPool;
    ///
    /// let mut pool = FixedPool::<u32>::new(4);
    /// // SAFETY: The pool outlives every handle taken from it.
    /// let a = unsafe { pool.new_object(10) }.unwrap();
    /// let b = unsafe { pool.new_object(20) }.unwrap();
    ///
    /// let mut sum = 0;
    /// // SAFETY: No handle is being used to access the objects while we read them.
    /// pool.for_each(|ptr| sum += unsafe { ptr.read() });
    /// assert_eq!(sum, 30);
    ///
    /// pool.delete_object(a);
    /// pool.delete_object(b);
    /// ```
    pub fn for_each(&self, f: impl FnMut(NonNull<T>)) {
        self.iter().for_each(f);
    }

    /// Iterates over pointers to every live object, in slot order.
    ///
    /// The same aliasing considerations as for [`for_each()`](Self::for_each) apply.
    pub fn iter(&self) -> impl Iterator<Item = NonNull<T>> + '_ {
        self.block.iter()
    }

    /// Reports the block count (always 1) and the number of live objects.
    ///
    /// The live object count is obtained by scanning every slot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats::new(1, self.block.count_allocations())
    }
}

impl<T, A: GlobalAlloc> fmt::Debug for FixedPool<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("capacity", &self.capacity())
            .field("is_full", &self.is_full())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::items_after_statements,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(FixedPool<u32>: Send, fmt::Debug);
    assert_not_impl_any!(FixedPool<u32>: Sync);
    assert_not_impl_any!(FixedPool<Rc<u32>>: Send, Sync);

    #[test]
    fn capacity_three_scenario() {
        let mut pool = FixedPool::<i32>::new(3);

        let one = unsafe { pool.new_object(1) }.unwrap();
        let two = unsafe { pool.new_object(2) }.unwrap();
        let three = unsafe { pool.new_object(3) }.unwrap();

        assert!(unsafe { pool.new_object(99) }.is_none());
        assert_eq!(pool.stats().allocation_count(), 3);

        let two_addr = two.ptr();
        pool.delete_object(two);

        let four = unsafe { pool.new_object(4) }.unwrap();
        assert_eq!(four.ptr(), two_addr);
        assert_eq!(*four, 4);

        let stats = pool.stats();
        assert_eq!(stats.allocation_count(), 3);
        assert_eq!(stats.block_count(), 1);

        pool.delete_object(one);
        pool.delete_object(three);
        pool.delete_object(four);

        assert_eq!(pool.stats().allocation_count(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn exhaustion_has_no_side_effects() {
        let mut pool = FixedPool::<u32>::new(2);
        let a = unsafe { pool.new_object(1) }.unwrap();
        let b = unsafe { pool.new_object(2) }.unwrap();

        let before = pool.stats();
        assert!(unsafe { pool.new_object(3) }.is_none());
        assert!(unsafe { pool.new_object_with(|| unreachable!()) }.is_none());
        assert_eq!(pool.stats(), before);
        assert!(pool.is_full());

        pool.delete_object(a);
        pool.delete_object(b);
    }

    #[test]
    fn live_count_tracks_allocations_minus_frees() {
        let mut pool = FixedPool::<usize>::new(8);
        let mut live = Vec::new();

        for step in 0..40_usize {
            if step % 4 == 3 {
                pool.delete_object(live.remove(step % live.len()));
            } else if let Some(item) = unsafe { pool.new_object(step) } {
                live.push(item);
            }

            assert_eq!(pool.stats().allocation_count(), live.len());
        }

        for item in live {
            pool.delete_object(item);
        }
    }

    #[test]
    fn lifo_reuse() {
        let mut pool = FixedPool::<u64>::new(4);

        let a = unsafe { pool.new_object(1) }.unwrap();
        let b = unsafe { pool.new_object(2) }.unwrap();
        let a_addr = a.ptr();

        pool.delete_object(a);
        let c = unsafe { pool.new_object(3) }.unwrap();

        assert_eq!(c.ptr(), a_addr);

        pool.delete_object(b);
        pool.delete_object(c);
    }

    #[test]
    fn take_object_returns_value() {
        let mut pool = FixedPool::<String>::new(2);
        let item = unsafe { pool.new_object("Hello".to_string()) }.unwrap();

        assert_eq!(pool.take_object(item), "Hello");
        assert!(pool.is_empty());
    }

    #[test]
    fn for_each_visits_each_live_object_once() {
        let mut pool = FixedPool::<u32>::new(6);

        let items: Vec<_> = (0..6).map(|i| unsafe { pool.new_object(i) }.unwrap()).collect();
        let mut items = items.into_iter();

        let first = items.next().unwrap();
        pool.delete_object(first);

        let mut seen = Vec::new();
        pool.for_each(|ptr| seen.push(unsafe { ptr.read() }));
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        assert_eq!(pool.iter().count(), 5);

        for item in items {
            pool.delete_object(item);
        }
    }

    #[test]
    fn addresses_are_stable_under_churn() {
        let mut pool = FixedPool::<u64>::new(16);

        let anchor = unsafe { pool.new_object(0xDEAD_BEEF) }.unwrap();
        let anchor_addr = anchor.ptr();

        for round in 0..100 {
            let item = unsafe { pool.new_object(round) }.unwrap();
            pool.delete_object(item);
        }

        assert_eq!(anchor.ptr(), anchor_addr);
        assert_eq!(*anchor, 0xDEAD_BEEF);

        pool.delete_object(anchor);
    }

    #[test]
    #[should_panic]
    fn drop_with_live_objects_is_panic() {
        let mut pool = FixedPool::<u32>::new(2);
        _ = unsafe { pool.new_object(1) }.unwrap();
    }

    #[test]
    fn drop_with_may_drop_policy_drops_objects() {
        let dropped = Rc::new(Cell::new(0_usize));

        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut pool = FixedPool::<Counted>::builder()
            .capacity(4)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();

        _ = unsafe { pool.new_object(Counted(Rc::clone(&dropped))) }.unwrap();
        _ = unsafe { pool.new_object(Counted(Rc::clone(&dropped))) }.unwrap();

        drop(pool);
        assert_eq!(dropped.get(), 2);
    }

    #[test]
    fn dropping_pool_destroys_objects_behind_outstanding_handles() {
        let dropped = Rc::new(Cell::new(false));

        struct Flagged(Rc<Cell<bool>>);

        impl Drop for Flagged {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let mut pool = FixedPool::<Flagged>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();

        let handle = unsafe { pool.new_object(Flagged(Rc::clone(&dropped))) }.unwrap();

        // The handle outlives the pool, so it must not be dereferenced from here on.
        drop(pool);
        assert!(dropped.get());

        // Dropping the handle itself touches no memory.
        drop(handle);
        assert!(dropped.get());
    }

    #[test]
    #[should_panic]
    fn foreign_handle_is_panic() {
        let mut pool_a = FixedPool::<u32>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();
        let mut pool_b = FixedPool::<u32>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();

        let item = unsafe { pool_a.new_object(1) }.unwrap();
        pool_b.delete_object(item);
    }

    #[test]
    #[should_panic]
    fn forged_double_free_is_panic() {
        let mut pool = FixedPool::<u32>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MayDropItems)
            .build()
            .unwrap();

        let item = unsafe { pool.new_object(1) }.unwrap();
        let ptr = item.into_ptr();

        pool.delete_object(unsafe { Pooled::from_ptr(ptr) });
        pool.delete_object(unsafe { Pooled::from_ptr(ptr) });
    }
}
