//! Provide the type registry used to resolve type ids.
//!
//! ## Menu
//!
//! - [`TypeRegistry`]: the table of registered [`TypeDescriptor`]s.
//! - [`TypeRegistryArc`]: a shareable, lockable registry.
//! - [`AutoRegistration`]: static registration record collected by
//!   [`TypeRegistry::auto_register`].
//!
//! ## auto_register
//!
//! We use the [`inventory`] crate to implement static registration. Types
//! derived with `#[reflect(auto_register)]` submit an [`AutoRegistration`],
//! and [`TypeRegistry::auto_register`] registers all of them.
//!
//! Not all platforms support it (although major platforms do). When it is
//! unsupported or the `auto_register` feature is disabled, nothing is
//! registered and no error is raised.
//!
//! [`TypeDescriptor`]: crate::descriptor::TypeDescriptor
//! [`inventory`]: https://docs.rs/inventory

// -----------------------------------------------------------------------------
// Modules

mod auto_register;
mod type_registry;

// -----------------------------------------------------------------------------
// Exports

pub use auto_register::AutoRegistration;
pub use type_registry::{TypeRegistry, TypeRegistryArc};
