use std::any::type_name;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::ptr::NonNull;

/// Exclusive handle to a live object allocated from a [`FixedPool`] or [`DynamicPool`].
///
/// The handle is the only way to reach the object through safe code. It cannot be copied or
/// cloned and returning the object to the pool via `delete_object()` or `take_object()` consumes
/// it, so an object cannot be freed twice through the safe API.
///
/// The object stays at the same address from allocation until it is returned to the pool, which
/// makes [`Pin`] access sound.
///
/// Dropping the handle does not return the object to the pool. The slot remains occupied until
/// the pool itself is dropped, which [`DropPolicy::MustNotDropItems`] reports as a leak.
///
/// # Examples
///
/// ```
/// use block_pool::FixedPool;
///
/// let mut pool = FixedPool::<String>::new(4);
///
/// // SAFETY: The pool outlives every handle taken from it.
/// let mut greeting = unsafe { pool.new_object("Hello".to_string()) }.unwrap();
/// greeting.push_str(", world");
/// assert_eq!(&*greeting, "Hello, world");
///
/// pool.delete_object(greeting);
/// ```
///
/// # Lifetime
///
/// The handle does not borrow the pool, so the compiler cannot stop it from outliving the pool.
/// Dereferencing it after the pool has been dropped reads freed memory, which is why the pool
/// methods that hand out handles are `unsafe`. The default drop policy panics when a pool is
/// dropped with live objects, surfacing handles that were never returned.
///
/// [`FixedPool`]: crate::FixedPool
/// [`DynamicPool`]: crate::DynamicPool
/// [`DropPolicy::MustNotDropItems`]: crate::DropPolicy::MustNotDropItems
pub struct Pooled<T> {
    ptr: NonNull<T>,
}

impl<T> Pooled<T> {
    #[must_use]
    pub(crate) fn new(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    /// Returns a pointer to the object.
    ///
    /// The owner of the handle has exclusive access to the object and may create both shared
    /// and exclusive references to it from unsafe code.
    #[must_use]
    #[inline]
    pub fn ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// Consumes the handle, returning the raw pointer to the object.
    ///
    /// The object remains allocated. Use [`from_ptr()`](Self::from_ptr) to recreate the handle
    /// before returning the object to its pool.
    #[must_use]
    #[inline]
    pub fn into_ptr(self) -> NonNull<T> {
        self.ptr
    }

    /// Recreates a handle from a pointer obtained via [`into_ptr()`](Self::into_ptr).
    ///
    /// # Safety
    ///
    /// The pointer must have come from [`into_ptr()`](Self::into_ptr) on a handle whose object
    /// is still live, and no other handle to the same object may exist.
    #[must_use]
    #[inline]
    pub unsafe fn from_ptr(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    /// Returns a pinned reference to the object.
    #[must_use]
    #[inline]
    pub fn as_pin(&self) -> Pin<&T> {
        // SAFETY: Pooled objects never move while they are live.
        unsafe { Pin::new_unchecked(&**self) }
    }

    /// Returns a pinned exclusive reference to the object.
    #[must_use]
    #[inline]
    pub fn as_pin_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: Pooled objects never move while they are live.
        unsafe { Pin::new_unchecked(&mut **self) }
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: The handle guarantees the object is live and initialized as long as its pool
        // exists, which the caller promised when obtaining the handle. Holding `&self` means no
        // exclusive reference is created through this handle at the same time.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for Pooled<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: The handle is the unique owner of the live object and we hold `&mut self`.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("ptr", &self.ptr)
            .finish()
    }
}

// SAFETY: The handle owns its object the same way a `Box<T>` does.
unsafe impl<T: Send> Send for Pooled<T> {}

// SAFETY: Shared access to the handle only gives shared access to the object.
unsafe impl<T: Sync> Sync for Pooled<T> {}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Pooled<u32>: Send, Sync);
    assert_impl_all!(Pooled<String>: Send, Sync);
    assert_impl_all!(Pooled<RefCell<u32>>: Send);
    assert_not_impl_any!(Pooled<RefCell<u32>>: Sync);
    assert_not_impl_any!(Pooled<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(Pooled<u32>: Copy, Clone);

    #[test]
    fn deref_reads_and_writes_through_pointer() {
        let mut value = 5_u32;
        let mut pooled = Pooled::new(NonNull::from(&mut value));

        *pooled += 1;
        assert_eq!(*pooled, 6);
        assert_eq!(*pooled.as_pin(), 6);

        *pooled.as_pin_mut() = 7;
        drop(pooled);

        assert_eq!(value, 7);
    }

    #[test]
    fn ptr_roundtrip_preserves_address() {
        let mut value = 1_u64;
        let ptr = NonNull::from(&mut value);

        let pooled = Pooled::new(ptr);
        let raw = pooled.into_ptr();
        assert_eq!(raw, ptr);

        // SAFETY: The pointer came from into_ptr() and no other handle exists.
        let pooled = unsafe { Pooled::from_ptr(raw) };
        assert_eq!(pooled.ptr(), ptr);
    }

    #[test]
    fn debug_mentions_item_type() {
        let mut value = 1_u16;
        let pooled = Pooled::new(NonNull::from(&mut value));

        assert!(format!("{pooled:?}").contains("u16"));
    }
}
