use crate::descriptor::SchemaInstance;
use crate::{Reflect, SerializationContext};

/// A lifecycle callback.
///
/// Receives the traversal's schema instance, the object part of the
/// descriptor's type (not the most-derived object), and the caller context.
pub type LifecycleHook = fn(&mut SchemaInstance, &mut dyn Reflect, &mut SerializationContext);

/// The four lifecycle callbacks of a type.
///
/// Serialization hooks run around reading an object's fields (encoding,
/// tree building, diff generation, reference gathering). Deserialization
/// hooks run around writing them (decoding, tree materialization, patching).
#[derive(Clone, Copy, Default, Debug)]
pub struct LifecycleHooks {
    pub serialization_started: Option<LifecycleHook>,
    pub serialization_ended: Option<LifecycleHook>,
    pub deserialization_started: Option<LifecycleHook>,
    pub deserialization_ended: Option<LifecycleHook>,
}
