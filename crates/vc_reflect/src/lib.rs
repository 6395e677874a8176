#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

// -----------------------------------------------------------------------------
// Extern Self

// The derive macro emits `::vc_reflect::...` paths, this keeps them valid
// inside the crate itself (unit tests and doc tests).
extern crate self as vc_reflect;

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod context;
mod data_block;
mod error;
mod object_ref;
mod reflect;

pub mod descriptor;
pub mod field;
pub mod plain;
pub mod registry;

// -----------------------------------------------------------------------------
// Top-Level exports

pub mod __macro_exports;

pub use context::{SerializationContext, Warning};
pub use data_block::DataBlock;
pub use error::{FieldError, FieldMismatch, SchemaError};
pub use object_ref::ObjectRef;
pub use reflect::{Reflect, Typed};
pub use vc_reflect_derive as derive;
