use std::sync::OnceLock;

use crate::descriptor::TypeDescriptor;

/// Static storage for a lazily built [`TypeDescriptor`].
///
/// Building a descriptor must not require the descriptor itself: base
/// types, embedded value types and reference targets are stored as
/// function pointers and resolved on first use.
///
/// # Examples
///
/// ```
/// use vc_reflect::descriptor::{DescriptorCell, TypeDescriptor};
/// use vc_reflect::{Reflect, Typed};
///
/// #[derive(Default)]
/// struct Marker;
///
/// impl Reflect for Marker {
///     fn descriptor(&self) -> &'static TypeDescriptor {
///         Self::type_descriptor()
///     }
/// }
///
/// impl Typed for Marker {
///     fn type_descriptor() -> &'static TypeDescriptor {
///         static CELL: DescriptorCell = DescriptorCell::new();
///         CELL.get_or_init(|| TypeDescriptor::builder::<Self>(42, "Marker").with_factory().build())
///     }
/// }
///
/// assert_eq!(Marker::type_descriptor().id(), 42);
/// assert!(core::ptr::eq(Marker::type_descriptor(), Marker.descriptor()));
/// ```
pub struct DescriptorCell(OnceLock<TypeDescriptor>);

impl DescriptorCell {
    /// Creates an empty cell.
    #[inline]
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the descriptor, building it on first access.
    #[inline]
    pub fn get_or_init(&'static self, f: impl FnOnce() -> TypeDescriptor) -> &'static TypeDescriptor {
        self.0.get_or_init(f)
    }
}
