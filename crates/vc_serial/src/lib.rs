#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod cycles;
mod error;

pub mod binary;
pub mod clone;
pub mod deps;
pub mod diff;
pub mod tree;

// -----------------------------------------------------------------------------
// Top-Level exports

pub use error::{SerialError, StreamError};

// -----------------------------------------------------------------------------
// Helpers

use alloc::boxed::Box;
use core::{mem, ptr};

use vc_reflect::descriptor::TypeDescriptor;
use vc_reflect::{ObjectRef, Reflect, SchemaError};

/// Moves a freshly built object out of its shared handle.
///
/// Falls back to swapping in a default instance when other handles still
/// exist, which happens when the object was reached through a reference
/// cycle.
pub(crate) fn take_object(object: ObjectRef) -> Result<Box<dyn Reflect>, SchemaError> {
    match object.try_unwrap() {
        Ok(value) => Ok(value),
        Err(shared) => {
            let descriptor = shared.descriptor();
            let fresh = descriptor
                .new_instance()
                .ok_or(SchemaError::AbstractType(descriptor.name()))?;
            Ok(mem::replace(&mut *shared.write(), fresh))
        }
    }
}

/// Returns the part of `object` at `depth`, checked against the descriptor chain.
pub(crate) fn level_mut<'a>(
    object: &'a mut dyn Reflect,
    depth: usize,
    expected: &'static TypeDescriptor,
) -> Result<&'a mut dyn Reflect, SchemaError> {
    let type_name = object.type_name();
    match object.level_mut(depth) {
        Some(level) if ptr::eq(level.descriptor(), expected) => Ok(level),
        _ => Err(SchemaError::BaseMismatch {
            type_name,
            expected: expected.name(),
        }),
    }
}

/// Shared-borrow version of [`level_mut`].
pub(crate) fn level_ref<'a>(
    object: &'a dyn Reflect,
    depth: usize,
    expected: &'static TypeDescriptor,
) -> Result<&'a dyn Reflect, SchemaError> {
    match object.level(depth) {
        Some(level) if ptr::eq(level.descriptor(), expected) => Ok(level),
        _ => Err(SchemaError::BaseMismatch {
            type_name: object.type_name(),
            expected: expected.name(),
        }),
    }
}

// -----------------------------------------------------------------------------
// Tests
