use std::alloc::{GlobalAlloc, Layout};
use std::ptr::NonNull;

use crate::PoolError;

/// Every block allocation is aligned to at least one cache line, so that neighboring blocks
/// never share a line and strictly aligned item types are satisfied.
pub(crate) const MIN_BLOCK_ALIGN: usize = 64;

/// Index of a slot within a block. This dictates the maximum number of slots in one block.
pub(crate) type SlotIndex = u32;

#[must_use]
#[inline]
pub(crate) fn index_to_usize(index: SlotIndex) -> usize {
    // SlotIndex is never wider than usize on any platform we build for.
    index as usize
}

/// Byte offsets and total size of one block allocation.
///
/// A block is laid out as a header `H`, followed by an index array of `capacity` entries,
/// followed by a slot array of `capacity` items of type `T`. The slot array starts at an
/// offset aligned for `T` and the whole allocation is aligned to [`MIN_BLOCK_ALIGN`] or the
/// alignment of `T`, whichever is larger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BlockLayout {
    allocation: Layout,
    indices_offset: usize,
    slots_offset: usize,
    slots_size: usize,
}

impl BlockLayout {
    /// # Errors
    ///
    /// Returns [`PoolError::LayoutTooLarge`] if the block would not fit in the address space.
    pub(crate) fn calculate<H, T>(capacity: SlotIndex) -> Result<Self, PoolError> {
        let capacity = index_to_usize(capacity);

        let indices = Layout::array::<SlotIndex>(capacity)?;
        let slots = Layout::array::<T>(capacity)?;

        let (with_indices, indices_offset) = Layout::new::<H>().extend(indices)?;
        let (combined, slots_offset) = with_indices.extend(slots)?;

        let allocation = combined.align_to(MIN_BLOCK_ALIGN)?.pad_to_align();

        Ok(Self {
            allocation,
            indices_offset,
            slots_offset,
            slots_size: slots.size(),
        })
    }

    #[must_use]
    pub(crate) fn allocation(&self) -> Layout {
        self.allocation
    }

    #[must_use]
    pub(crate) fn indices_offset(&self) -> usize {
        self.indices_offset
    }

    #[must_use]
    pub(crate) fn slots_offset(&self) -> usize {
        self.slots_offset
    }

    /// Size in bytes of the slot array, i.e. the address range that item pointers fall into.
    #[must_use]
    pub(crate) fn slots_size(&self) -> usize {
        self.slots_size
    }
}

/// Requests one block allocation from the raw allocator.
///
/// # Errors
///
/// Returns [`PoolError::AllocationFailed`] if the allocator returns null.
pub(crate) fn allocate<A: GlobalAlloc>(
    allocator: &A,
    layout: Layout,
) -> Result<NonNull<u8>, PoolError> {
    debug_assert!(layout.size() > 0, "block layouts always include a header");

    // SAFETY: The layout is non-zero-sized because every block layout includes a non-empty header.
    let ptr = unsafe { allocator.alloc(layout) };

    NonNull::new(ptr).ok_or(PoolError::AllocationFailed {
        size: layout.size(),
        align: layout.align(),
    })
}

/// Releases a block allocation previously obtained from [`allocate()`].
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate()`] on the same allocator with the same layout,
/// and must not have been released already.
pub(crate) unsafe fn deallocate<A: GlobalAlloc>(allocator: &A, ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: Forwarding safety requirements to the caller.
    unsafe {
        allocator.dealloc(ptr.as_ptr(), layout);
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::alloc::System;

    use super::*;

    #[repr(C)]
    struct TestHeader {
        a: u32,
        b: u32,
    }

    #[test]
    fn slots_follow_indices() {
        let layout = BlockLayout::calculate::<TestHeader, u64>(3).unwrap();

        assert_eq!(layout.indices_offset(), size_of::<TestHeader>());
        assert!(layout.slots_offset() >= layout.indices_offset() + 3 * size_of::<SlotIndex>());
        assert_eq!(layout.slots_offset() % align_of::<u64>(), 0);
        assert_eq!(layout.slots_size(), 3 * size_of::<u64>());
    }

    #[test]
    fn allocation_is_cache_line_aligned() {
        let layout = BlockLayout::calculate::<TestHeader, u8>(1).unwrap();

        assert_eq!(layout.allocation().align(), MIN_BLOCK_ALIGN);
        assert_eq!(layout.allocation().size() % MIN_BLOCK_ALIGN, 0);
    }

    #[test]
    fn strict_alignment_wins_over_cache_line() {
        #[repr(align(256))]
        struct Aligned {
            _data: [u8; 256],
        }

        let layout = BlockLayout::calculate::<TestHeader, Aligned>(2).unwrap();

        assert_eq!(layout.allocation().align(), 256);
        assert_eq!(layout.slots_offset() % 256, 0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_layout_is_error() {
        let result = BlockLayout::calculate::<TestHeader, [u8; 1 << 40]>(SlotIndex::MAX);

        assert!(matches!(result, Err(PoolError::LayoutTooLarge(_))));
    }

    #[test]
    fn allocate_and_deallocate_roundtrip() {
        let layout = BlockLayout::calculate::<TestHeader, u32>(8).unwrap();

        let ptr = allocate(&System, layout.allocation()).unwrap();
        assert_eq!(ptr.as_ptr().addr() % MIN_BLOCK_ALIGN, 0);

        // SAFETY: We just allocated it with this allocator and layout.
        unsafe {
            deallocate(&System, ptr, layout.allocation());
        }
    }
}
