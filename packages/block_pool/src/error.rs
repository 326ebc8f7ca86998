use std::alloc::LayoutError;

use thiserror::Error;

/// Errors that can occur when reserving storage for a pool.
///
/// Running out of slots is not an error - allocating from a pool without space returns `None`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The requested capacity would produce a block larger than the address space allows.
    #[error("block layout cannot be represented: {0}")]
    LayoutTooLarge(#[from] LayoutError),

    /// The raw allocator could not provide memory for a new block.
    #[error("failed to allocate a block of {size} bytes with alignment {align}")]
    AllocationFailed {
        /// Size in bytes of the requested block allocation.
        size: usize,

        /// Alignment in bytes of the requested block allocation.
        align: usize,
    },
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PoolError: Send, Sync, Debug);

    #[test]
    fn allocation_failed_mentions_size() {
        let error = PoolError::AllocationFailed {
            size: 4096,
            align: 64,
        };

        let message = error.to_string();
        assert!(message.contains("4096"));
        assert!(message.contains("64"));
    }
}
