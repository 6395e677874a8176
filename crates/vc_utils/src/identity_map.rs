use core::fmt::Debug;

use hashbrown::hash_map::Entry;

use crate::hash::{FixedHashState, HashMap};

// -----------------------------------------------------------------------------
// identity_of

/// Returns the identity key of the value behind `ptr`.
///
/// The key is the address with any pointer metadata dropped, so a
/// `*const dyn Trait` and a `*const Concrete` to the same value agree.
///
/// Only meaningful while the pointee stays alive and does not move.
///
/// # Examples
///
/// ```
/// use vc_utils::identity_of;
///
/// let value = 5_u32;
/// let as_dyn: &dyn core::fmt::Debug = &value;
/// assert_eq!(identity_of(&value), identity_of(as_dyn));
/// ```
#[inline]
pub fn identity_of<T: ?Sized>(ptr: *const T) -> usize {
    ptr.cast::<()>().addr()
}

// -----------------------------------------------------------------------------
// IdentityMap

/// A map keyed by object identity.
///
/// Keys are produced by [`identity_of`]. The map never dereferences them,
/// it is the caller's duty to keep the keyed objects alive (and in place)
/// for as long as the map is in use. Serialization passes create one per
/// call and drop it before returning.
pub struct IdentityMap<V>(HashMap<usize, V>);

impl<V> IdentityMap<V> {
    /// Creates an empty `IdentityMap`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vc_utils::IdentityMap;
    /// let map = IdentityMap::<u32>::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self(HashMap::with_hasher(FixedHashState))
    }

    /// Returns a reference to the value keyed by `ptr`'s identity.
    #[inline]
    pub fn get<T: ?Sized>(&self, ptr: *const T) -> Option<&V> {
        self.0.get(&identity_of(ptr))
    }

    /// Returns a mutable reference to the value keyed by `ptr`'s identity.
    #[inline]
    pub fn get_mut<T: ?Sized>(&mut self, ptr: *const T) -> Option<&mut V> {
        self.0.get_mut(&identity_of(ptr))
    }

    /// Inserts a value, returning the previous one if the identity was present.
    #[inline]
    pub fn insert<T: ?Sized>(&mut self, ptr: *const T, value: V) -> Option<V> {
        self.0.insert(identity_of(ptr), value)
    }

    /// Returns the value keyed by `ptr`'s identity, inserting the result
    /// of `f` first if the key is not present.
    ///
    /// The second element is `true` if the value was just inserted.
    ///
    /// # Examples
    ///
    /// ```
    /// use vc_utils::IdentityMap;
    ///
    /// let (a, b) = (1_u8, 1_u8);
    /// let mut ids = IdentityMap::new();
    ///
    /// assert_eq!(ids.get_or_insert_with(&a, || 1), (&mut 1, true));
    /// assert_eq!(ids.get_or_insert_with(&a, || 2), (&mut 1, false));
    /// assert_eq!(ids.get_or_insert_with(&b, || 3), (&mut 3, true));
    /// ```
    pub fn get_or_insert_with<T: ?Sized>(
        &mut self,
        ptr: *const T,
        f: impl FnOnce() -> V,
    ) -> (&mut V, bool) {
        match self.0.entry(identity_of(ptr)) {
            Entry::Vacant(entry) => (entry.insert(f()), true),
            Entry::Occupied(entry) => (entry.into_mut(), false),
        }
    }

    /// Returns `true` if the map contains `ptr`'s identity.
    #[inline]
    pub fn contains<T: ?Sized>(&self, ptr: *const T) -> bool {
        self.0.contains_key(&identity_of(ptr))
    }

    /// Removes `ptr`'s identity from the map.
    #[inline]
    pub fn remove<T: ?Sized>(&mut self, ptr: *const T) -> Option<V> {
        self.0.remove(&identity_of(ptr))
    }

    /// Returns the number of elements in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the map contains no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clears the map, keeping the allocated memory for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// An iterator visiting all values in arbitrary order.
    #[inline]
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> {
        self.0.values()
    }
}

impl<V> Default for IdentityMap<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Debug> Debug for IdentityMap<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

// -----------------------------------------------------------------------------
// Tests
