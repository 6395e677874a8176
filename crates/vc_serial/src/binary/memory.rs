//! In-memory helpers around [`BinarySerializer`].

use alloc::vec::Vec;
use std::io::Cursor;

use vc_reflect::registry::TypeRegistry;
use vc_reflect::{ObjectRef, SerializationContext};

use super::{BinarySerializer, EncodeOptions};
use crate::SerialError;

/// Encodes `root` into a new byte vector.
#[inline]
pub fn encode_to_vec(
    registry: &TypeRegistry,
    root: &ObjectRef,
    ctx: &mut SerializationContext,
) -> Result<Vec<u8>, SerialError> {
    encode_to_vec_with(registry, root, EncodeOptions::default(), ctx)
}

pub fn encode_to_vec_with(
    registry: &TypeRegistry,
    root: &ObjectRef,
    options: EncodeOptions,
    ctx: &mut SerializationContext,
) -> Result<Vec<u8>, SerialError> {
    let mut bytes = Vec::new();
    BinarySerializer::new(registry).encode_with(root, &mut bytes, options, ctx)?;
    Ok(bytes)
}

/// Decodes a stream held in memory.
#[inline]
pub fn decode_from_slice(
    registry: &TypeRegistry,
    bytes: &[u8],
    ctx: &mut SerializationContext,
) -> Result<Option<ObjectRef>, SerialError> {
    BinarySerializer::new(registry).decode(Cursor::new(bytes), ctx)
}
