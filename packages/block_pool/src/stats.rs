/// A snapshot of pool occupancy, returned by `stats()` on either pool type.
///
/// The allocation count is computed by scanning the slots of every non-empty block, so taking
/// a snapshot costs time proportional to the pool's capacity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    block_count: usize,
    allocation_count: usize,
}

impl PoolStats {
    #[must_use]
    pub(crate) fn new(block_count: usize, allocation_count: usize) -> Self {
        Self {
            block_count,
            allocation_count,
        }
    }

    /// Total number of blocks the pool has created. Blocks are never released while the pool
    /// exists, so this never decreases.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Number of live objects in the pool.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }
}
