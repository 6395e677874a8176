//! Items used by code generated with `#[derive(Reflect)]`. Not public API.

#[cfg(feature = "auto_register")]
pub mod auto_register {
    pub use crate::registry::AutoRegistration;
    pub use inventory;
}
