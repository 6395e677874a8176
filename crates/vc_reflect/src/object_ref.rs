use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::Reflect;
use crate::descriptor::TypeDescriptor;

// -----------------------------------------------------------------------------
// ObjectRef

/// A shared reference to a reflectable object.
///
/// This is the value of a `ReflectablePtr` field. Several fields, in one or
/// more objects, may hold clones of the same `ObjectRef`; the serializers
/// preserve that aliasing through encode/decode, tree conversion, patching
/// and cloning.
///
/// Identity is the address of the shared allocation. It is only used within
/// a single serialization call, while the call holds the handles alive.
///
/// # Examples
///
/// ```
/// use vc_reflect::{derive::Reflect, ObjectRef};
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 7)]
/// struct Counter {
///     #[reflect(id = 0)]
///     value: u32,
/// }
///
/// let a = ObjectRef::new(Counter { value: 1 });
/// let alias = a.clone();
///
/// alias.with_mut(|c: &mut Counter| c.value += 1);
///
/// assert!(a.ptr_eq(&alias));
/// assert_eq!(a.with(|c: &Counter| c.value), Some(2));
/// ```
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Box<dyn Reflect>>>);

impl ObjectRef {
    /// Wraps a value in a new shared reference.
    #[inline]
    pub fn new<T: Reflect>(value: T) -> Self {
        Self::from_boxed(Box::new(value))
    }

    /// Wraps a boxed value in a new shared reference.
    #[inline]
    pub fn from_boxed(value: Box<dyn Reflect>) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Locks the object for reading.
    ///
    /// A poisoned lock is recovered, the object graph carries no invariant
    /// that a panicking reader or writer could break halfway.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Box<dyn Reflect>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the object for writing.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Reflect>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if both handles refer to the same object.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns the identity pointer used by identity maps.
    #[inline]
    pub fn as_ptr(&self) -> *const () {
        Arc::as_ptr(&self.0).cast()
    }

    /// Returns the descriptor of the referenced object.
    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.read().descriptor()
    }

    /// Returns `true` if the referenced object is of type `T`.
    #[inline]
    pub fn is<T: Reflect>(&self) -> bool {
        self.read().is::<T>()
    }

    /// Runs `f` on the object if it is of type `T`.
    pub fn with<T: Reflect, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.read();
        guard.downcast_ref::<T>().map(f)
    }

    /// Runs `f` on the object mutably if it is of type `T`.
    pub fn with_mut<T: Reflect, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.write();
        guard.downcast_mut::<T>().map(f)
    }

    /// Takes the object out if this is the only handle to it.
    pub fn try_unwrap(self) -> Result<Box<dyn Reflect>, Self> {
        match Arc::try_unwrap(self.0) {
            Ok(lock) => Ok(lock.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(shared) => Err(Self(shared)),
        }
    }

    /// Returns the number of handles sharing the object.
    #[inline]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(guard) => write!(f, "ObjectRef({} @ {:p})", guard.type_name(), self.as_ptr()),
            Err(TryLockError::Poisoned(poisoned)) => {
                let guard = poisoned.into_inner();
                write!(f, "ObjectRef({} @ {:p})", guard.type_name(), self.as_ptr())
            }
            Err(TryLockError::WouldBlock) => write!(f, "ObjectRef(<locked> @ {:p})", self.as_ptr()),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use crate::ObjectRef;
    use crate::derive::Reflect;

    #[derive(Reflect, Default, Debug, PartialEq)]
    #[reflect(id = 0x200)]
    struct Leaf {
        #[reflect(id = 0)]
        value: i64,
    }

    #[test]
    fn clones_share_identity() {
        let a = ObjectRef::new(Leaf { value: 4 });
        let b = a.clone();
        let c = ObjectRef::new(Leaf { value: 4 });

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(a.handle_count(), 2);
    }

    #[test]
    fn try_unwrap_requires_a_unique_handle() {
        let a = ObjectRef::new(Leaf { value: 9 });
        let b = a.clone();

        let a = a.try_unwrap().err().unwrap();
        drop(b);

        let value = a.try_unwrap().ok().unwrap().downcast::<Leaf>().ok().unwrap();
        assert_eq!(*value, Leaf { value: 9 });
    }

    #[test]
    fn debug_does_not_block_on_a_held_lock() {
        let a = ObjectRef::new(Leaf::default());
        let guard = a.write();
        let text = format!("{a:?}");
        drop(guard);

        assert!(text.contains("<locked>"));
        assert!(format!("{a:?}").contains("Leaf"));
    }
}
