use std::alloc::GlobalAlloc;
use std::any::type_name;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::thread;

use num_integer::Integer;

use crate::raw::{self, BlockLayout, SlotIndex, index_to_usize};
use crate::{DropPolicy, PoolError};

/// The part of a block allocation that precedes the index and slot arrays.
#[repr(C)]
#[derive(Debug)]
struct BlockHeader {
    /// Head of the intrusive freelist. Equal to `entries_per_block` when the block is full.
    free_head_index: SlotIndex,

    entries_per_block: SlotIndex,
}

/// Fixed-capacity backing storage for the pools in this crate.
///
/// A block is one allocation holding a [`BlockHeader`], an index array with one [`SlotIndex`]
/// per slot and a slot array with storage for one `T` per slot. The index array doubles as the
/// freelist and the occupancy map:
///
/// * If `index[i] == i`, slot `i` holds a live object.
/// * Otherwise, slot `i` is vacant and `index[i]` is the next vacant slot in the freelist, or
///   the sentinel `entries_per_block` if `i` is the tail.
///
/// The freelist is a stack, so the most recently freed slot is the next one handed out.
///
/// # Out of band access
///
/// The block does not create or keep references to its items. Items are only ever handed out as
/// pointers, so callers may create references to them from unsafe code without holding any
/// reference to the block, as long as they stop doing so before removing the item.
#[derive(Debug)]
pub(crate) struct SlabBlock<T, A: GlobalAlloc> {
    header: NonNull<BlockHeader>,

    layout: BlockLayout,

    allocator: A,

    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T, A: GlobalAlloc> SlabBlock<T, A> {
    /// Creates a block with room for `entries_per_block` items.
    ///
    /// # Errors
    ///
    /// Returns an error if the block layout is not representable or the allocator fails.
    ///
    /// # Panics
    ///
    /// Panics if `entries_per_block` is zero or `T` is zero-sized.
    pub(crate) fn new(
        entries_per_block: SlotIndex,
        drop_policy: DropPolicy,
        allocator: A,
    ) -> Result<Self, PoolError> {
        assert!(
            entries_per_block > 0,
            "block of {} must have non-zero capacity",
            type_name::<T>()
        );
        assert!(
            size_of::<T>() > 0,
            "block of {} must have non-zero item size",
            type_name::<T>()
        );

        let layout = BlockLayout::calculate::<BlockHeader, T>(entries_per_block)?;
        let header = raw::allocate(&allocator, layout.allocation())?.cast::<BlockHeader>();

        // SAFETY: The allocation starts with space for the header and is aligned for it.
        unsafe {
            header.write(BlockHeader {
                free_head_index: 0,
                entries_per_block,
            });
        }

        let mut block = Self {
            header,
            layout,
            allocator,
            drop_policy,
            _item: PhantomData,
        };

        // Every slot starts vacant, chained 0 -> 1 -> ... -> capacity - 1 -> sentinel.
        for index in 0..entries_per_block {
            // Cannot overflow, the largest value written is the sentinel itself.
            block.set_next_index(index, index.wrapping_add(1));
        }

        Ok(block)
    }

    fn header(&self) -> &BlockHeader {
        // SAFETY: Initialized in the ctor and valid until drop.
        unsafe { self.header.as_ref() }
    }

    fn header_mut(&mut self) -> &mut BlockHeader {
        // SAFETY: Initialized in the ctor and valid until drop; we hold `&mut self`.
        unsafe { self.header.as_mut() }
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> SlotIndex {
        self.header().entries_per_block
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.header().free_head_index == self.capacity()
    }

    /// Pointer to the first slot. Item pointers from this block all fall within
    /// `[first_slot_ptr, first_slot_ptr + slots_size)`.
    #[must_use]
    pub(crate) fn first_slot_ptr(&self) -> NonNull<T> {
        // SAFETY: The slot array lies within our allocation at this offset.
        unsafe { self.header.byte_add(self.layout.slots_offset()).cast::<T>() }
    }

    /// Size in bytes of the slot array.
    #[must_use]
    pub(crate) fn slots_size(&self) -> usize {
        self.layout.slots_size()
    }

    fn index_ptr(&self, index: SlotIndex) -> NonNull<SlotIndex> {
        assert!(
            index < self.capacity(),
            "slot {index} out of bounds in block of {}",
            type_name::<T>()
        );

        // SAFETY: The index array lies within our allocation at this offset and the bounds
        // check above keeps us within the array.
        unsafe {
            self.header
                .byte_add(self.layout.indices_offset())
                .cast::<SlotIndex>()
                .add(index_to_usize(index))
        }
    }

    fn next_index(&self, index: SlotIndex) -> SlotIndex {
        // SAFETY: Every index entry is initialized in the ctor.
        unsafe { self.index_ptr(index).read() }
    }

    #[expect(
        clippy::needless_pass_by_ref_mut,
        reason = "the write goes through a raw pointer, &mut self is what makes it exclusive"
    )]
    fn set_next_index(&mut self, index: SlotIndex, next: SlotIndex) {
        // SAFETY: The pointer is in bounds and the index array is only ever accessed by value,
        // so no reference to this entry exists.
        unsafe {
            self.index_ptr(index).write(next);
        }
    }

    fn slot_ptr(&self, index: SlotIndex) -> NonNull<T> {
        assert!(
            index < self.capacity(),
            "slot {index} out of bounds in block of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by the bounds check above.
        unsafe { self.first_slot_ptr().add(index_to_usize(index)) }
    }

    #[must_use]
    fn is_occupied(&self, index: SlotIndex) -> bool {
        self.next_index(index) == index
    }

    /// Constructs an item in the next vacant slot and returns a pointer to it.
    ///
    /// Returns `None` without calling `f` if the block is full.
    #[must_use]
    pub(crate) fn new_object_with(&mut self, f: impl FnOnce() -> T) -> Option<NonNull<T>> {
        #[cfg(debug_assertions)]
        self.integrity_check();

        if self.is_full() {
            return None;
        }

        let index = self.header().free_head_index;
        let slot = self.slot_ptr(index);

        // We construct before touching the freelist, so a panicking constructor leaves the
        // block unchanged.
        //
        // SAFETY: The slot is vacant, in bounds and aligned for T.
        unsafe {
            slot.write(f());
        }

        // Pop the slot off the freelist and mark it occupied with a self-loop.
        let next_free_index = self.next_index(index);
        self.set_next_index(index, index);
        self.header_mut().free_head_index = next_free_index;

        Some(slot)
    }

    /// Drops the item at `ptr` in place and makes its slot available again.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point to an occupied slot of this block.
    pub(crate) fn delete_object(&mut self, ptr: NonNull<T>) {
        self.release(ptr);

        // The slot is already back on the freelist, so a panicking destructor cannot leave
        // it marked as occupied.
        //
        // SAFETY: The slot held a live item until the release above and will not be reused
        // before we return, as reuse requires `&mut self`.
        unsafe {
            ptr::drop_in_place(ptr.as_ptr());
        }
    }

    /// Moves the item at `ptr` out of the block and makes its slot available again.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point to an occupied slot of this block.
    #[must_use]
    pub(crate) fn take_object(&mut self, ptr: NonNull<T>) -> T {
        self.release(ptr);

        // SAFETY: The slot held a live item until the release above. Reading it out transfers
        // ownership to the caller and the slot is now treated as uninitialized.
        unsafe { ptr.read() }
    }

    /// Pushes the slot of `ptr` onto the freelist.
    fn release(&mut self, ptr: NonNull<T>) {
        let index = self.index_of(ptr);

        assert!(
            self.is_occupied(index),
            "slot {index} was vacant when removing an item from block of {}",
            type_name::<T>()
        );

        let free_head_index = self.header().free_head_index;
        self.set_next_index(index, free_head_index);
        self.header_mut().free_head_index = index;
    }

    /// Whether `ptr` falls within the slot array of this block.
    #[must_use]
    pub(crate) fn contains(&self, ptr: NonNull<T>) -> bool {
        ptr.as_ptr()
            .addr()
            .checked_sub(self.first_slot_ptr().as_ptr().addr())
            .is_some_and(|offset| offset < self.slots_size())
    }

    fn index_of(&self, ptr: NonNull<T>) -> SlotIndex {
        assert!(
            self.contains(ptr),
            "pointer {ptr:?} does not belong to block of {}",
            type_name::<T>()
        );

        // Cannot underflow, guarded by the containment check above.
        let offset = ptr
            .as_ptr()
            .addr()
            .wrapping_sub(self.first_slot_ptr().as_ptr().addr());

        let (index, remainder) = offset.div_rem(&size_of::<T>());

        assert!(
            remainder == 0,
            "pointer {ptr:?} is not at a slot boundary in block of {}",
            type_name::<T>()
        );

        SlotIndex::try_from(index)
            .expect("guarded by containment check, so the index is below capacity")
    }

    /// Iterates over pointers to the live items, in slot order.
    pub(crate) fn iter(&self) -> BlockIter<'_, T, A> {
        BlockIter {
            block: self,
            next_index: 0,
        }
    }

    /// Counts the live items by scanning every slot.
    #[must_use]
    pub(crate) fn count_allocations(&self) -> usize {
        self.iter().count()
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let capacity = self.capacity();

        assert!(
            self.header().free_head_index <= capacity,
            "free head {} is beyond the sentinel {capacity} in block of {}",
            self.header().free_head_index,
            type_name::<T>()
        );

        let occupied = (0..capacity)
            .filter(|&index| self.is_occupied(index))
            .count();

        // Cannot underflow because we count at most `capacity` occupied slots.
        let expected_vacant = index_to_usize(capacity).wrapping_sub(occupied);

        let mut observed_vacant: usize = 0;
        let mut index = self.header().free_head_index;

        while index != capacity {
            assert!(
                index < capacity,
                "freelist links to out-of-bounds slot {index} in block of {}",
                type_name::<T>()
            );
            assert!(
                !self.is_occupied(index),
                "freelist links to occupied slot {index} in block of {}",
                type_name::<T>()
            );

            observed_vacant = observed_vacant
                .checked_add(1)
                .expect("bounded by the cycle check below");

            assert!(
                observed_vacant <= expected_vacant,
                "freelist contains a cycle in block of {}",
                type_name::<T>()
            );

            index = self.next_index(index);
        }

        assert!(
            observed_vacant == expected_vacant,
            "freelist has {observed_vacant} slots but {expected_vacant} slots are vacant in block of {}",
            type_name::<T>()
        );
    }
}

impl<T, A: GlobalAlloc> Drop for SlabBlock<T, A> {
    fn drop(&mut self) {
        let mut live_count: usize = 0;

        for index in 0..self.capacity() {
            if self.is_occupied(index) {
                // Cannot overflow, bounded by capacity.
                live_count = live_count.wrapping_add(1);

                // SAFETY: The slot is occupied so holds a live item, which nobody else may use
                // once the block is being dropped.
                unsafe {
                    ptr::drop_in_place(self.slot_ptr(index).as_ptr());
                }
            }
        }

        // SAFETY: Allocated in the ctor with this allocator and layout, released exactly once.
        unsafe {
            raw::deallocate(
                &self.allocator,
                self.header.cast::<u8>(),
                self.layout.allocation(),
            );
        }

        // We do this check at the end so we clean up the memory first. If we are already
        // panicking, we do not want to panic again because that would obscure the original.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                live_count == 0,
                "dropped a block of {} with {live_count} live items - this is forbidden by DropPolicy::MustNotDropItems",
                type_name::<T>()
            );
        }
    }
}

// SAFETY: The raw pointers refer to memory exclusively owned by the block, with nothing tied
// to the current thread, so the block may move between threads whenever its items and its
// allocator may.
unsafe impl<T: Send, A: GlobalAlloc + Send> Send for SlabBlock<T, A> {}

/// Iterator over the live items of a [`SlabBlock`], yielding pointers in slot order.
#[derive(Debug)]
pub(crate) struct BlockIter<'b, T, A: GlobalAlloc> {
    block: &'b SlabBlock<T, A>,
    next_index: SlotIndex,
}

impl<T, A: GlobalAlloc> Iterator for BlockIter<'_, T, A> {
    type Item = NonNull<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_index < self.block.capacity() {
            let index = self.next_index;

            // Cannot overflow, bounded by capacity.
            self.next_index = index.wrapping_add(1);

            if self.block.is_occupied(index) {
                return Some(self.block.slot_ptr(index));
            }
        }

        None
    }
}

impl<T, A: GlobalAlloc> FusedIterator for BlockIter<'_, T, A> {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    clippy::items_after_statements,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::alloc::{Layout, System};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    fn block<T>(capacity: SlotIndex) -> SlabBlock<T, System> {
        SlabBlock::new(capacity, DropPolicy::MayDropItems, System).unwrap()
    }

    fn values(block: &SlabBlock<u32, System>) -> Vec<u32> {
        block.iter().map(|ptr| unsafe { ptr.read() }).collect()
    }

    assert_impl_all!(SlabBlock<u32, System>: Send);
    assert_not_impl_any!(SlabBlock<u32, System>: Sync);
    assert_not_impl_any!(SlabBlock<Rc<u32>, System>: Send);

    #[test]
    fn smoke_test() {
        let mut block = block::<u32>(3);

        let a = block.new_object_with(|| 1).unwrap();
        let b = block.new_object_with(|| 2).unwrap();
        let c = block.new_object_with(|| 3).unwrap();

        assert!(block.is_full());
        assert!(block.new_object_with(|| 4).is_none());
        assert_eq!(block.count_allocations(), 3);

        unsafe {
            assert_eq!(a.read(), 1);
            assert_eq!(b.read(), 2);
            assert_eq!(c.read(), 3);
        }

        block.delete_object(b);
        assert_eq!(block.count_allocations(), 2);

        let d = block.new_object_with(|| 4).unwrap();
        assert_eq!(d, b);
        assert_eq!(values(&block), vec![1, 4, 3]);

        block.delete_object(a);
        block.delete_object(c);
        block.delete_object(d);
    }

    #[test]
    fn hands_out_slots_in_order_when_fresh() {
        let mut block = block::<u64>(4);
        let first = block.first_slot_ptr();

        for expected in 0..4 {
            let ptr = block.new_object_with(|| 0).unwrap();
            assert_eq!(ptr, unsafe { first.add(expected) });
        }
    }

    #[test]
    fn freed_slots_are_reused_lifo() {
        let mut block = block::<u32>(4);

        let a = block.new_object_with(|| 10).unwrap();
        let b = block.new_object_with(|| 11).unwrap();
        let c = block.new_object_with(|| 12).unwrap();

        block.delete_object(a);
        block.delete_object(c);

        // c was freed last, so it comes back first.
        assert_eq!(block.new_object_with(|| 20).unwrap(), c);
        assert_eq!(block.new_object_with(|| 21).unwrap(), a);

        // Then the never-used tail slot.
        let tail = block.new_object_with(|| 22).unwrap();
        assert_eq!(tail, unsafe { block.first_slot_ptr().add(3) });

        assert!(block.is_full());
        block.delete_object(b);
        assert!(!block.is_full());
    }

    #[test]
    fn full_block_does_not_call_constructor() {
        let mut block = block::<u32>(1);
        _ = block.new_object_with(|| 1).unwrap();

        let called = Cell::new(false);
        assert!(
            block
                .new_object_with(|| {
                    called.set(true);
                    2
                })
                .is_none()
        );
        assert!(!called.get());
    }

    #[test]
    fn iter_visits_live_items_in_slot_order() {
        let mut block = block::<u32>(5);

        let ptrs: Vec<_> = (0..5)
            .map(|i| block.new_object_with(|| i * 10).unwrap())
            .collect();

        block.delete_object(ptrs[1]);
        block.delete_object(ptrs[3]);

        assert_eq!(values(&block), vec![0, 20, 40]);

        let mut visited = Vec::new();
        block.iter().for_each(|ptr| visited.push(ptr));
        assert_eq!(visited, vec![ptrs[0], ptrs[2], ptrs[4]]);
    }

    #[test]
    fn iter_on_empty_block_is_empty() {
        let block = block::<u32>(8);

        assert_eq!(block.iter().count(), 0);
        assert_eq!(block.count_allocations(), 0);
    }

    #[test]
    fn take_object_returns_value_without_drop() {
        let dropped = Rc::new(Cell::new(0_usize));

        struct Tracked(Rc<Cell<usize>>);

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut block = SlabBlock::<Tracked, System>::new(2, DropPolicy::MayDropItems, System)
            .unwrap();

        let ptr = block
            .new_object_with(|| Tracked(Rc::clone(&dropped)))
            .unwrap();

        let value = block.take_object(ptr);
        assert_eq!(dropped.get(), 0);
        assert_eq!(block.count_allocations(), 0);

        drop(value);
        assert_eq!(dropped.get(), 1);
    }

    #[test]
    fn delete_calls_drop() {
        let dropped = Rc::new(Cell::new(false));

        struct Droppable(Rc<Cell<bool>>);

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let mut block =
            SlabBlock::<Droppable, System>::new(2, DropPolicy::MayDropItems, System).unwrap();

        let ptr = block
            .new_object_with(|| Droppable(Rc::clone(&dropped)))
            .unwrap();
        block.delete_object(ptr);

        assert!(dropped.get());
    }

    #[test]
    fn drop_with_may_drop_policy_drops_remaining_items() {
        let dropped = Rc::new(Cell::new(0_usize));

        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut block =
            SlabBlock::<Counted, System>::new(4, DropPolicy::MayDropItems, System).unwrap();

        for _ in 0..3 {
            _ = block.new_object_with(|| Counted(Rc::clone(&dropped))).unwrap();
        }

        drop(block);
        assert_eq!(dropped.get(), 3);
    }

    #[test]
    #[should_panic]
    fn drop_with_must_not_drop_policy_panics_when_not_empty() {
        let mut block = SlabBlock::<u32, System>::new(2, DropPolicy::MustNotDropItems, System)
            .unwrap();
        _ = block.new_object_with(|| 1);
    }

    #[test]
    fn drop_with_must_not_drop_policy_ok_when_empty() {
        let mut block = SlabBlock::<u32, System>::new(2, DropPolicy::MustNotDropItems, System)
            .unwrap();
        let ptr = block.new_object_with(|| 1).unwrap();
        block.delete_object(ptr);
        drop(block);
    }

    #[test]
    #[should_panic]
    fn double_delete_panics() {
        let mut block = block::<u32>(2);
        let ptr = block.new_object_with(|| 1).unwrap();

        block.delete_object(ptr);
        block.delete_object(ptr);
    }

    #[test]
    #[should_panic]
    fn foreign_pointer_panics() {
        let mut block = block::<u32>(2);
        let mut other = 5_u32;

        block.delete_object(NonNull::from(&mut other));
    }

    #[test]
    #[should_panic]
    fn misaligned_pointer_panics() {
        let mut block = block::<u64>(2);
        let ptr = block.new_object_with(|| 1).unwrap();

        let misaligned = unsafe { ptr.byte_add(1) };
        block.delete_object(misaligned);
    }

    #[test]
    #[should_panic]
    fn zero_capacity_is_panic() {
        drop(block::<u32>(0));
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        drop(block::<()>(3));
    }

    #[test]
    fn strictly_aligned_items_are_aligned() {
        #[repr(align(128))]
        struct Aligned {
            data: [u8; 8],
        }

        let mut block = SlabBlock::<Aligned, System>::new(3, DropPolicy::MayDropItems, System)
            .unwrap();

        for _ in 0..3 {
            let ptr = block.new_object_with(|| Aligned { data: [7; 8] }).unwrap();
            assert_eq!(ptr.as_ptr().addr() % 128, 0);
            assert_eq!(unsafe { ptr.as_ref() }.data, [7; 8]);
        }
    }

    #[test]
    fn block_is_cache_line_aligned() {
        let block = block::<u8>(3);

        assert_eq!(block.header.as_ptr().addr() % raw::MIN_BLOCK_ALIGN, 0);
    }

    #[test]
    fn panicking_constructor_leaves_block_unchanged() {
        let block = RefCell::new(block::<u32>(2));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            _ = block.borrow_mut().new_object_with(|| panic!("constructor failure"));
        }));
        assert!(result.is_err());

        let mut block = block.into_inner();
        assert_eq!(block.count_allocations(), 0);

        let ptr = block.new_object_with(|| 5).unwrap();
        assert_eq!(ptr, block.first_slot_ptr());
    }

    #[test]
    fn allocation_failure_is_error() {
        struct FailingAllocator;

        // SAFETY: Never hands out memory, so there is nothing to uphold.
        unsafe impl GlobalAlloc for FailingAllocator {
            unsafe fn alloc(&self, _layout: Layout) -> *mut u8 {
                ptr::null_mut()
            }

            unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
                unreachable!("nothing was ever allocated");
            }
        }

        let result = SlabBlock::<u32, _>::new(4, DropPolicy::MayDropItems, FailingAllocator);
        assert!(matches!(result, Err(PoolError::AllocationFailed { .. })));
    }

    #[test]
    fn releases_memory_to_its_allocator() {
        #[derive(Clone, Debug, Default)]
        struct CountingAllocator {
            live: Arc<AtomicUsize>,
        }

        // SAFETY: Forwards to the system allocator, only counting calls.
        unsafe impl GlobalAlloc for CountingAllocator {
            unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
                self.live.fetch_add(1, Ordering::Relaxed);
                unsafe { System.alloc(layout) }
            }

            unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
                self.live.fetch_sub(1, Ordering::Relaxed);
                unsafe { System.dealloc(ptr, layout) }
            }
        }

        let allocator = CountingAllocator::default();
        let block =
            SlabBlock::<u32, _>::new(4, DropPolicy::MayDropItems, allocator.clone()).unwrap();
        assert_eq!(allocator.live.load(Ordering::Relaxed), 1);

        drop(block);
        assert_eq!(allocator.live.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn multithreaded_via_mutex() {
        let block = Arc::new(Mutex::new(block::<u32>(3)));

        let a = block.lock().unwrap().new_object_with(|| 42).unwrap();
        let a_addr = a.as_ptr().addr();

        let block_clone = Arc::clone(&block);
        std::thread::spawn(move || {
            let mut block = block_clone.lock().unwrap();
            _ = block.new_object_with(|| 43).unwrap();
            assert_eq!(block.count_allocations(), 2);
        })
        .join()
        .unwrap();

        let block = block.lock().unwrap();
        assert_eq!(values(&block), vec![42, 43]);
        assert_eq!(block.first_slot_ptr().as_ptr().addr(), a_addr);
    }

    #[test]
    #[cfg(debug_assertions)]
    fn integrity_holds_through_churn() {
        let mut block = block::<u32>(16);
        let mut live = Vec::new();

        for round in 0..64_u32 {
            if round % 3 == 2 {
                if let Some(ptr) = live.pop() {
                    block.delete_object(ptr);
                }
            } else if let Some(ptr) = block.new_object_with(|| round) {
                live.push(ptr);
            }

            block.integrity_check();
            assert_eq!(block.count_allocations(), live.len());
        }
    }
}
