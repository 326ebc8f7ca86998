/// Determines item dropping behavior when a pool is dropped.
///
/// By default, a pool must be empty when it is dropped.
///
/// # Examples
///
/// ```
/// use block_pool::{DropPolicy, DynamicPool};
///
/// let mut pool = DynamicPool::<u32>::builder()
///     .drop_policy(DropPolicy::MayDropItems)
///     .build()
///     .unwrap();
///
/// // SAFETY: The handle is never used after the pool is dropped.
/// let _item = unsafe { pool.new_object(42) }.unwrap();
///
/// // Under this policy, the pool may be dropped while still holding items.
/// drop(pool);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool will panic if it still contains items when it is dropped. This is the default.
    ///
    /// Items handed out by a pool are referenced through raw handles that the pool cannot track,
    /// so dropping a pool with live items usually means some handle now dangles.
    #[default]
    MustNotDropItems,

    /// The pool will drop any remaining items in place when the pool is dropped.
    MayDropItems,
}
