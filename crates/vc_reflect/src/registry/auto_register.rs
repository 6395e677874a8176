use crate::descriptor::TypeDescriptor;

/// A statically submitted registration.
///
/// Emitted by `#[derive(Reflect)]` for types marked `#[reflect(auto_register)]`.
#[derive(Clone, Copy)]
pub struct AutoRegistration {
    descriptor: fn() -> &'static TypeDescriptor,
}

impl AutoRegistration {
    #[inline]
    pub const fn new(descriptor: fn() -> &'static TypeDescriptor) -> Self {
        Self { descriptor }
    }

    /// Returns the submitted descriptor.
    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        (self.descriptor)()
    }
}

#[cfg(feature = "auto_register")]
inventory::collect!(AutoRegistration);
