use alloc::boxed::Box;
use core::any::Any;
use core::fmt;

use crate::descriptor::TypeDescriptor;
use crate::{Reflect, SerializationContext};

/// A disposable clone of a [`TypeDescriptor`] for one traversal.
///
/// Accessors and hooks receive the schema instance instead of the
/// descriptor singleton, so per-traversal temporary state (for example
/// a buffer prepared in `serialization_started` and consumed by a field
/// getter) never leaks between concurrent traversals of the same type.
///
/// # Examples
///
/// ```
/// use vc_reflect::{derive::Reflect, Typed};
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 3)]
/// struct Empty {}
///
/// let mut schema = Empty::type_descriptor().instantiate();
/// assert_eq!(schema.descriptor().name(), "Empty");
/// // Types without explicit state carry `()`.
/// assert!(schema.state_mut::<()>().is_some());
/// ```
pub struct SchemaInstance {
    descriptor: &'static TypeDescriptor,
    state: Box<dyn Any + Send>,
}

impl SchemaInstance {
    #[inline]
    pub(crate) fn new(descriptor: &'static TypeDescriptor, state: Box<dyn Any + Send>) -> Self {
        Self { descriptor, state }
    }

    /// Returns the descriptor this instance was created from.
    #[inline]
    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    /// Returns the scratch state if it is of type `S`.
    #[inline]
    pub fn state<S: Any>(&self) -> Option<&S> {
        self.state.downcast_ref()
    }

    /// Returns the scratch state mutably if it is of type `S`.
    #[inline]
    pub fn state_mut<S: Any>(&mut self) -> Option<&mut S> {
        self.state.downcast_mut()
    }

    /// Runs the `serialization_started` hook, if any.
    #[inline]
    pub fn serialization_started(&mut self, object: &mut dyn Reflect, ctx: &mut SerializationContext) {
        if let Some(hook) = self.descriptor.hooks().serialization_started {
            hook(self, object, ctx);
        }
    }

    /// Runs the `serialization_ended` hook, if any.
    #[inline]
    pub fn serialization_ended(&mut self, object: &mut dyn Reflect, ctx: &mut SerializationContext) {
        if let Some(hook) = self.descriptor.hooks().serialization_ended {
            hook(self, object, ctx);
        }
    }

    /// Runs the `deserialization_started` hook, if any.
    #[inline]
    pub fn deserialization_started(
        &mut self,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) {
        if let Some(hook) = self.descriptor.hooks().deserialization_started {
            hook(self, object, ctx);
        }
    }

    /// Runs the `deserialization_ended` hook, if any.
    #[inline]
    pub fn deserialization_ended(
        &mut self,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) {
        if let Some(hook) = self.descriptor.hooks().deserialization_ended {
            hook(self, object, ctx);
        }
    }
}

impl fmt::Debug for SchemaInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaInstance")
            .field("type", &self.descriptor.name())
            .finish_non_exhaustive()
    }
}
