use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;

use crate::descriptor::TypeDescriptor;
use crate::field::{ArrayBinding, Binding};
use crate::field::{DataBlockAccess, PlainAccess, ReflectableAccess, ReflectablePtrAccess};
use crate::plain::PlainType;
use crate::{DataBlock, ObjectRef, Reflect, Typed};

// -----------------------------------------------------------------------------
// FieldKind

/// The four kinds of reflectable members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A fixed- or dynamic-length byte-copyable value.
    Plain,
    /// A nested reflectable value embedded by value.
    Reflectable,
    /// A shared reference to another reflectable object.
    ReflectablePtr,
    /// An opaque byte blob.
    DataBlock,
}

bitflags! {
    /// Per-field behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldFlags: u8 {
        /// The reference is not followed during dependency or cycle analysis,
        /// and may point back into an object that is still being decoded.
        const WEAK_REF = 1 << 0;
        /// The field is ignored by dependency searches.
        const SKIP_IN_REFERENCE_SEARCH = 1 << 1;
    }
}

// -----------------------------------------------------------------------------
// FieldAccessor

/// The capability object used to read and write one field.
pub enum FieldAccessor {
    Plain(Box<dyn PlainAccess>),
    Reflectable(Box<dyn ReflectableAccess>),
    ReflectablePtr(Box<dyn ReflectablePtrAccess>),
    DataBlock(Box<dyn DataBlockAccess>),
}

impl FieldAccessor {
    /// Returns the kind of field this accessor serves.
    #[inline]
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Plain(_) => FieldKind::Plain,
            Self::Reflectable(_) => FieldKind::Reflectable,
            Self::ReflectablePtr(_) => FieldKind::ReflectablePtr,
            Self::DataBlock(_) => FieldKind::DataBlock,
        }
    }
}

// -----------------------------------------------------------------------------
// FieldDescriptor

/// Schema of one member of a reflectable type.
///
/// The 16-bit id identifies the field in serialized data. It must stay the
/// same across schema versions and is independent of declaration order and
/// name. Ids are unique within one [`TypeDescriptor`], but base and derived
/// types may reuse each other's ids.
///
/// # Examples
///
/// ```
/// use vc_reflect::descriptor::{FieldDescriptor, FieldKind};
/// use vc_reflect::derive::Reflect;
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 5)]
/// struct Item {
///     #[reflect(id = 0)]
///     count: u16,
///     #[reflect(id = 1)]
///     label: String,
/// }
///
/// let count = FieldDescriptor::plain::<Item, u16>(0, "count", |v| &v.count, |v| &mut v.count);
/// assert_eq!(count.kind(), FieldKind::Plain);
/// assert_eq!(count.type_size(), 2);
/// assert!(!count.has_dynamic_size());
///
/// let label = FieldDescriptor::plain::<Item, String>(1, "label", |v| &v.label, |v| &mut v.label);
/// assert!(label.has_dynamic_size());
/// assert_eq!(label.type_size(), 0);
/// ```
pub struct FieldDescriptor {
    id: u16,
    name: &'static str,
    is_array: bool,
    flags: FieldFlags,
    // Resolved lazily, a type may reference itself.
    target: Option<fn() -> &'static TypeDescriptor>,
    accessor: FieldAccessor,
}

impl FieldDescriptor {
    /// Creates a field from a custom accessor.
    ///
    /// # Panics
    ///
    /// Panics if a plain accessor reports a static size of zero, or if a
    /// data block field is declared as an array.
    pub fn new(id: u16, name: &'static str, is_array: bool, accessor: FieldAccessor) -> Self {
        match &accessor {
            FieldAccessor::Plain(plain) => {
                assert!(
                    plain.static_size() != Some(0),
                    "plain field `{name}` reports a static size of zero"
                );
            }
            FieldAccessor::DataBlock(_) => {
                assert!(!is_array, "data block field `{name}` cannot be an array");
            }
            _ => {}
        }
        Self {
            id,
            name,
            is_array,
            flags: FieldFlags::empty(),
            target: None,
            accessor,
        }
    }

    /// A plain field of type `F`.
    pub fn plain<T: Reflect, F: PlainType>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        let accessor = FieldAccessor::Plain(Box::new(Binding::new(get, get_mut)));
        Self::new(id, name, false, accessor)
    }

    /// A plain array field with elements of type `F`.
    pub fn plain_array<T: Reflect, F: PlainType + Default>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &Vec<F>,
        get_mut: fn(&mut T) -> &mut Vec<F>,
    ) -> Self {
        let accessor = FieldAccessor::Plain(Box::new(ArrayBinding::new(get, get_mut)));
        Self::new(id, name, true, accessor)
    }

    /// A reflectable value of type `F` embedded by value.
    pub fn reflectable<T: Reflect, F: Typed>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        let accessor = FieldAccessor::Reflectable(Box::new(Binding::new(get, get_mut)));
        Self::new(id, name, false, accessor)
    }

    /// An array of reflectable values of type `F` embedded by value.
    pub fn reflectable_array<T: Reflect, F: Typed + Default>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &Vec<F>,
        get_mut: fn(&mut T) -> &mut Vec<F>,
    ) -> Self {
        let accessor = FieldAccessor::Reflectable(Box::new(ArrayBinding::new(get, get_mut)));
        Self::new(id, name, true, accessor)
    }

    /// A shared reference to another reflectable object.
    pub fn reflectable_ptr<T: Reflect>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &Option<ObjectRef>,
        get_mut: fn(&mut T) -> &mut Option<ObjectRef>,
    ) -> Self {
        let accessor = FieldAccessor::ReflectablePtr(Box::new(Binding::new(get, get_mut)));
        Self::new(id, name, false, accessor)
    }

    /// An array of shared references.
    pub fn reflectable_ptr_array<T: Reflect>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &Vec<Option<ObjectRef>>,
        get_mut: fn(&mut T) -> &mut Vec<Option<ObjectRef>>,
    ) -> Self {
        let accessor = FieldAccessor::ReflectablePtr(Box::new(ArrayBinding::new(get, get_mut)));
        Self::new(id, name, true, accessor)
    }

    /// A data block.
    pub fn data_block<T: Reflect>(
        id: u16,
        name: &'static str,
        get: fn(&T) -> &DataBlock,
        get_mut: fn(&mut T) -> &mut DataBlock,
    ) -> Self {
        let accessor = FieldAccessor::DataBlock(Box::new(Binding::new(get, get_mut)));
        Self::new(id, name, false, accessor)
    }

    /// Adds behaviour flags.
    #[inline]
    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Marks the field as a weak reference.
    #[inline]
    pub fn weak(self) -> Self {
        self.with_flags(FieldFlags::WEAK_REF)
    }

    /// Declares the type a reference field points at, for schema cycle analysis.
    #[inline]
    pub fn with_target<U: Typed>(mut self) -> Self {
        self.target = Some(U::type_descriptor);
        self
    }

    /// Returns the field id.
    #[inline]
    pub const fn id(&self) -> u16 {
        self.id
    }

    /// Returns the field name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the field kind.
    #[inline]
    pub fn kind(&self) -> FieldKind {
        self.accessor.kind()
    }

    /// Returns `true` for array fields.
    #[inline]
    pub const fn is_array(&self) -> bool {
        self.is_array
    }

    /// Returns the behaviour flags.
    #[inline]
    pub const fn flags(&self) -> FieldFlags {
        self.flags
    }

    /// Returns `true` if the field is a weak reference.
    #[inline]
    pub const fn is_weak(&self) -> bool {
        self.flags.contains(FieldFlags::WEAK_REF)
    }

    /// Returns `true` if the encoded size of a value varies.
    ///
    /// Embedded reflectables and data blocks are always dynamic.
    pub fn has_dynamic_size(&self) -> bool {
        match &self.accessor {
            FieldAccessor::Plain(plain) => plain.static_size().is_none(),
            FieldAccessor::Reflectable(_) | FieldAccessor::DataBlock(_) => true,
            FieldAccessor::ReflectablePtr(_) => false,
        }
    }

    /// Returns the static encoded size of one element, `0` if dynamic.
    pub fn type_size(&self) -> u8 {
        match &self.accessor {
            FieldAccessor::Plain(plain) => plain.static_size().unwrap_or(0),
            // A persistent object id.
            FieldAccessor::ReflectablePtr(_) => 4,
            FieldAccessor::Reflectable(_) | FieldAccessor::DataBlock(_) => 0,
        }
    }

    /// Returns the declared target type of a reference field.
    #[inline]
    pub fn target(&self) -> Option<&'static TypeDescriptor> {
        self.target.map(|f| f())
    }

    /// Returns the accessor.
    #[inline]
    pub fn accessor(&self) -> &FieldAccessor {
        &self.accessor
    }

    /// Returns the plain accessor, if this is a plain field.
    #[inline]
    pub fn as_plain(&self) -> Option<&dyn PlainAccess> {
        match &self.accessor {
            FieldAccessor::Plain(access) => Some(access.as_ref()),
            _ => None,
        }
    }

    /// Returns the reflectable accessor, if this is an embedded field.
    #[inline]
    pub fn as_reflectable(&self) -> Option<&dyn ReflectableAccess> {
        match &self.accessor {
            FieldAccessor::Reflectable(access) => Some(access.as_ref()),
            _ => None,
        }
    }

    /// Returns the reference accessor, if this is a reference field.
    #[inline]
    pub fn as_reflectable_ptr(&self) -> Option<&dyn ReflectablePtrAccess> {
        match &self.accessor {
            FieldAccessor::ReflectablePtr(access) => Some(access.as_ref()),
            _ => None,
        }
    }

    /// Returns the data block accessor, if this is a data block field.
    #[inline]
    pub fn as_data_block(&self) -> Option<&dyn DataBlockAccess> {
        match &self.accessor {
            FieldAccessor::DataBlock(access) => Some(access.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("is_array", &self.is_array)
            .field("flags", &self.flags)
            .finish()
    }
}
