use alloc::string::String;

use thiserror::Error;

use crate::descriptor::FieldKind;

// -----------------------------------------------------------------------------
// FieldError

/// An error raised by a field accessor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FieldError {
    /// The target object is not of the type the accessor was bound to.
    #[error("accessor bound to `{expected}` applied to another type")]
    Downcast { expected: &'static str },
    /// A value handed to a setter is not of the field's type.
    #[error("expected a value of type `{expected}`, found `{found}`")]
    ValueType {
        expected: &'static str,
        found: &'static str,
    },
    /// Element index past the end of an array field.
    #[error("index {index} out of range for array of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// A plain payload ended early.
    #[error("plain payload truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    /// A plain payload holds bytes that are not a valid value.
    #[error("invalid plain payload: {0}")]
    InvalidPayload(&'static str),
}

// -----------------------------------------------------------------------------
// FieldMismatch

/// How a field recorded in a stream disagrees with the live schema.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FieldMismatch {
    #[error("static size {stream} in stream, {schema} in schema")]
    Size { stream: u8, schema: u8 },
    #[error("array flag {stream} in stream, {schema} in schema")]
    Array { stream: bool, schema: bool },
    #[error("kind {stream:?} in stream, {schema:?} in schema")]
    Kind { stream: FieldKind, schema: FieldKind },
}

// -----------------------------------------------------------------------------
// SchemaError

/// A fatal disagreement between data and the reflection schema.
///
/// Any of these aborts the whole serialization call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// Two different descriptors claim the same numeric type id.
    #[error("type id {id} registered by both `{existing}` and `{new}`")]
    DuplicateTypeId {
        id: u32,
        existing: &'static str,
        new: &'static str,
    },
    /// A type id that no registered descriptor owns.
    #[error("unknown type id {0}")]
    UnknownTypeId(u32),
    /// A field name that the type does not declare.
    #[error("type `{type_name}` has no field named `{field}`")]
    UnknownField {
        type_name: &'static str,
        field: String,
    },
    /// An instance was required for a type without a factory.
    #[error("type `{0}` is abstract and cannot be instantiated")]
    AbstractType(&'static str),
    /// A stream field has the id of a live field but another shape.
    #[error("field {field_id} of `{type_name}` mismatches: {mismatch}")]
    FieldMismatch {
        type_name: &'static str,
        field_id: u16,
        mismatch: FieldMismatch,
    },
    /// A metadata word that no valid encoder produces.
    #[error("malformed metadata word {word:#010x}: {reason}")]
    MalformedMetadata { word: u32, reason: &'static str },
    /// An object's base part does not match its descriptor chain.
    #[error("base part of `{type_name}` does not match descriptor `{expected}`")]
    BaseMismatch {
        type_name: &'static str,
        expected: &'static str,
    },
    /// Two types reference each other through non-weak pointer fields.
    #[error(
        "circular reference between `{from}` and `{to}`, \
         remove one of the references or mark it weak"
    )]
    CircularReference {
        from: &'static str,
        to: &'static str,
    },
    /// An accessor failed on a field.
    #[error("field `{field}` of `{type_name}`: {source}")]
    Field {
        type_name: &'static str,
        field: &'static str,
        #[source]
        source: FieldError,
    },
}

impl SchemaError {
    /// Wraps an accessor failure with the field it happened on.
    #[inline]
    pub fn field(
        type_name: &'static str,
        field: &'static str,
    ) -> impl Fn(FieldError) -> Self + Copy {
        move |source| Self::Field {
            type_name,
            field,
            source,
        }
    }
}
