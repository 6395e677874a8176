//! Field accessor capabilities.
//!
//! Every [`FieldDescriptor`](crate::descriptor::FieldDescriptor) owns one
//! accessor object per kind. The serializers only talk to fields through
//! these traits, always passing the traversal's [`SchemaInstance`] and the
//! object part the field belongs to.
//!
//! [`Binding`] and [`ArrayBinding`] implement the traits for plain struct
//! members reached through a pair of projection functions. Types with
//! computed fields implement the traits themselves.
//!
//! Single-value accessors ignore `len`/`set_len` (a single value has length
//! one) and only accept index `0`.
//!
//! [`SchemaInstance`]: crate::descriptor::SchemaInstance

// -----------------------------------------------------------------------------
// Modules

mod binding;

// -----------------------------------------------------------------------------
// Exports

pub use binding::{ArrayBinding, Binding};

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::descriptor::{SchemaInstance, TypeDescriptor};
use crate::{DataBlock, FieldError, ObjectRef, Reflect};

// -----------------------------------------------------------------------------
// PlainAccess

/// Accessor of a plain field.
pub trait PlainAccess: Send + Sync + 'static {
    /// Static encoded size of one element, `None` if dynamic.
    fn static_size(&self) -> Option<u8>;

    /// Number of elements.
    fn len(&self, schema: &mut SchemaInstance, object: &dyn Reflect) -> Result<usize, FieldError>;

    /// Resizes an array field.
    fn set_len(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        len: usize,
    ) -> Result<(), FieldError>;

    /// Appends the encoded element at `index` to `out`.
    fn write(
        &self,
        schema: &mut SchemaInstance,
        object: &dyn Reflect,
        index: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), FieldError>;

    /// Decodes `bytes` into the element at `index`.
    ///
    /// `bytes` holds exactly one encoded element, including the size prefix
    /// of dynamic payloads.
    fn read(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), FieldError>;
}

// -----------------------------------------------------------------------------
// ReflectableAccess

/// Accessor of an embedded reflectable field.
pub trait ReflectableAccess: Send + Sync + 'static {
    /// Descriptor of the embedded value type.
    fn value_descriptor(&self) -> &'static TypeDescriptor;

    /// Number of elements.
    fn len(&self, schema: &mut SchemaInstance, object: &dyn Reflect) -> Result<usize, FieldError>;

    /// Resizes an array field.
    fn set_len(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        len: usize,
    ) -> Result<(), FieldError>;

    /// Borrows the element at `index`.
    fn get<'a>(
        &self,
        schema: &mut SchemaInstance,
        object: &'a dyn Reflect,
        index: usize,
    ) -> Result<&'a dyn Reflect, FieldError>;

    /// Borrows the element at `index` mutably.
    fn get_mut<'a>(
        &self,
        schema: &mut SchemaInstance,
        object: &'a mut dyn Reflect,
        index: usize,
    ) -> Result<&'a mut dyn Reflect, FieldError>;

    /// Replaces the element at `index`.
    fn set(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        value: Box<dyn Reflect>,
    ) -> Result<(), FieldError>;
}

// -----------------------------------------------------------------------------
// ReflectablePtrAccess

/// Accessor of a shared reference field.
pub trait ReflectablePtrAccess: Send + Sync + 'static {
    /// Number of elements.
    fn len(&self, schema: &mut SchemaInstance, object: &dyn Reflect) -> Result<usize, FieldError>;

    /// Resizes an array field.
    fn set_len(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        len: usize,
    ) -> Result<(), FieldError>;

    /// Returns the reference at `index`.
    fn get(
        &self,
        schema: &mut SchemaInstance,
        object: &dyn Reflect,
        index: usize,
    ) -> Result<Option<ObjectRef>, FieldError>;

    /// Replaces the reference at `index`.
    fn set(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        value: Option<ObjectRef>,
    ) -> Result<(), FieldError>;
}

// -----------------------------------------------------------------------------
// DataBlockAccess

/// Accessor of a data block field.
pub trait DataBlockAccess: Send + Sync + 'static {
    /// Returns the block. Cloning a [`DataBlock`] never copies its bytes.
    fn get(&self, schema: &mut SchemaInstance, object: &dyn Reflect) -> Result<DataBlock, FieldError>;

    /// Replaces the block.
    fn set(
        &self,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        value: DataBlock,
    ) -> Result<(), FieldError>;
}
