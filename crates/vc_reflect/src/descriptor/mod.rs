//! Type and field descriptors.
//!
//! ## Menu
//!
//! - [`TypeDescriptor`]: schema of one reflectable type.
//! - [`TypeDescriptorBuilder`]: builds a descriptor, usually from generated code.
//! - [`DescriptorCell`]: lazily initialized static storage for a descriptor.
//! - [`FieldDescriptor`]: schema of one member, with its [`FieldAccessor`].
//! - [`SchemaInstance`]: per-traversal scratch clone of a descriptor.
//! - [`LifecycleHooks`]: serialization/deserialization started and ended callbacks.

// -----------------------------------------------------------------------------
// Modules

mod cell;
mod field_descriptor;
mod hooks;
mod schema_instance;
mod type_descriptor;

// -----------------------------------------------------------------------------
// Exports

pub use cell::DescriptorCell;
pub use field_descriptor::{FieldAccessor, FieldDescriptor, FieldFlags, FieldKind};
pub use hooks::{LifecycleHook, LifecycleHooks};
pub use schema_instance::SchemaInstance;
pub use type_descriptor::{TypeDescriptor, TypeDescriptorBuilder};
