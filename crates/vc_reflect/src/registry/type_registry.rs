use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ptr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use vc_utils::hash::{HashMap, HashSet};

use crate::descriptor::{FieldAccessor, TypeDescriptor};
use crate::{Reflect, SchemaError, Typed};

// -----------------------------------------------------------------------------
// TypeRegistry

/// A registry of [`TypeDescriptor`]s, keyed by numeric type id.
///
/// Decoders use it to turn the type ids found in data back into instances.
/// It is populated once, before any serialization call, and passed
/// explicitly to the codec, diff engine and cloner.
///
/// Registering a type also registers its base types first, then the value
/// types of its embedded fields and the declared targets of its reference
/// fields.
///
/// # Example
///
/// ```
/// use vc_reflect::{derive::Reflect, registry::TypeRegistry, SchemaError, Typed};
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 900)]
/// struct Base {}
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 901)]
/// struct Derived {
///     #[reflect(base)]
///     base: Base,
/// }
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 900, name = "Impostor")]
/// struct Impostor {}
///
/// let mut registry = TypeRegistry::new();
/// registry.register::<Derived>().unwrap();
///
/// assert!(registry.contains(900));
/// assert!(registry.is_derived_from(901, 900));
/// assert_eq!(registry.get_by_name("Derived").unwrap().id(), 901);
///
/// let err = registry.register::<Impostor>().unwrap_err();
/// assert!(matches!(err, SchemaError::DuplicateTypeId { id: 900, .. }));
/// ```
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<u32, &'static TypeDescriptor>,
    name_to_id: HashMap<&'static str, u32>,
    ambiguous_names: HashSet<&'static str>,
    derived: HashMap<u32, Vec<u32>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` and its dependencies.
    ///
    /// See [`register_descriptor`](Self::register_descriptor).
    #[inline]
    pub fn register<T: Typed>(&mut self) -> Result<(), SchemaError> {
        self.register_descriptor(T::type_descriptor()).map(|_| ())
    }

    /// Registers a descriptor and its dependencies.
    ///
    /// Returns `Ok(false)` if this exact descriptor was already registered.
    ///
    /// # Errors
    ///
    /// [`SchemaError::DuplicateTypeId`] if another descriptor owns the id,
    /// either this one's or a dependency's.
    pub fn register_descriptor(
        &mut self,
        descriptor: &'static TypeDescriptor,
    ) -> Result<bool, SchemaError> {
        let id = descriptor.id();
        if let Some(existing) = self.types.get(&id) {
            if ptr::eq(*existing, descriptor) {
                return Ok(false);
            }
            return Err(SchemaError::DuplicateTypeId {
                id,
                existing: existing.name(),
                new: descriptor.name(),
            });
        }

        if let Some(base) = descriptor.base() {
            self.register_descriptor(base)?;
            // The base's fields may have led back here.
            if self.types.contains_key(&id) {
                return Ok(false);
            }
            self.derived.entry(base.id()).or_default().push(id);
        }

        self.types.insert(id, descriptor);
        let name = descriptor.name();
        if !self.ambiguous_names.contains(name) {
            if self.name_to_id.remove(name).is_some() {
                self.ambiguous_names.insert(name);
            } else {
                self.name_to_id.insert(name, id);
            }
        }
        log::debug!("registered type `{name}` ({id})");

        // Inserted before visiting fields, so self references terminate.
        for field in descriptor.fields() {
            if let FieldAccessor::Reflectable(access) = field.accessor() {
                self.register_descriptor(access.value_descriptor())?;
            }
            if let Some(target) = field.target() {
                self.register_descriptor(target)?;
            }
        }
        Ok(true)
    }

    /// Registers every type submitted with `#[reflect(auto_register)]`.
    ///
    /// Returns the number of newly registered descriptors, dependencies
    /// not counted. Repeated calls are cheap and insert nothing new.
    ///
    /// Without the `auto_register` feature, or on platforms that the
    /// `inventory` crate does not support, this registers nothing.
    pub fn auto_register(&mut self) -> Result<usize, SchemaError> {
        #[cfg(feature = "auto_register")]
        {
            let mut count = 0;
            for registration in inventory::iter::<crate::registry::AutoRegistration> {
                if self.register_descriptor(registration.descriptor())? {
                    count += 1;
                }
            }
            Ok(count)
        }
        #[cfg(not(feature = "auto_register"))]
        {
            Ok(0)
        }
    }

    /// Returns the descriptor with the given id.
    #[inline]
    pub fn get(&self, id: u32) -> Option<&'static TypeDescriptor> {
        self.types.get(&id).copied()
    }

    /// Returns the descriptor with the given display name.
    ///
    /// Names shared by several registered types are ambiguous and return `None`.
    pub fn get_by_name(&self, name: &str) -> Option<&'static TypeDescriptor> {
        self.name_to_id.get(name).and_then(|id| self.get(*id))
    }

    /// Returns `true` if a descriptor with the given id is registered.
    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.types.contains_key(&id)
    }

    /// Returns the number of registered types.
    #[inline]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates all registered descriptors in arbitrary order.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &'static TypeDescriptor> + '_ {
        self.types.values().copied()
    }

    /// Returns the ids of the types directly derived from `id`.
    #[inline]
    pub fn derived_types(&self, id: u32) -> &[u32] {
        self.derived.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Returns `true` if `derived` is a strict descendant of `base`.
    ///
    /// Walks the derived-class lists starting from `base`.
    pub fn is_derived_from(&self, derived: u32, base: u32) -> bool {
        let mut todo: Vec<u32> = self.derived_types(base).to_vec();
        while let Some(id) = todo.pop() {
            if id == derived {
                return true;
            }
            todo.extend_from_slice(self.derived_types(id));
        }
        false
    }

    /// Creates a default instance of the type with the given id.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnknownTypeId`] for unregistered ids,
    /// [`SchemaError::AbstractType`] for types without a factory.
    pub fn create_instance(&self, id: u32) -> Result<Box<dyn Reflect>, SchemaError> {
        let descriptor = self.get(id).ok_or(SchemaError::UnknownTypeId(id))?;
        descriptor
            .new_instance()
            .ok_or(SchemaError::AbstractType(descriptor.name()))
    }

    /// Rejects pairs of types that hold non-weak references to each other.
    ///
    /// Such pairs can only be decoded by handing one of them a partially
    /// decoded instance. A type referencing itself through a non-weak
    /// field counts as a pair. Reference fields without a declared target
    /// are not checked.
    pub fn check_circular_references(&self) -> Result<(), SchemaError> {
        for descriptor in self.types.values() {
            for field in descriptor.fields() {
                if field.as_reflectable_ptr().is_none() || field.is_weak() {
                    continue;
                }
                let Some(other) = field.target() else {
                    continue;
                };
                let points_back = other.fields().iter().any(|other_field| {
                    other_field.as_reflectable_ptr().is_some()
                        && !other_field.is_weak()
                        && other_field.target().map(TypeDescriptor::id) == Some(descriptor.id())
                });
                if points_back {
                    return Err(SchemaError::CircularReference {
                        from: descriptor.name(),
                        to: other.name(),
                    });
                }
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// TypeRegistryArc

/// A synchronized wrapper around a [`TypeRegistry`].
#[derive(Clone, Default)]
pub struct TypeRegistryArc {
    pub internal: Arc<RwLock<TypeRegistry>>,
}

impl TypeRegistryArc {
    /// Takes a read lock on the underlying [`TypeRegistry`].
    pub fn read(&self) -> RwLockReadGuard<'_, TypeRegistry> {
        self.internal.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a write lock on the underlying [`TypeRegistry`].
    pub fn write(&self) -> RwLockWriteGuard<'_, TypeRegistry> {
        self.internal.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<TypeRegistry> for TypeRegistryArc {
    fn from(registry: TypeRegistry) -> Self {
        Self {
            internal: Arc::new(RwLock::new(registry)),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use crate::derive::Reflect;
    use crate::registry::{TypeRegistry, TypeRegistryArc};
    use crate::{ObjectRef, SchemaError, Typed};

    #[derive(Reflect, Default)]
    #[reflect(id = 0x500)]
    struct Shape {}

    #[derive(Reflect, Default)]
    #[reflect(id = 0x501)]
    struct Polygon {
        #[reflect(base)]
        shape: Shape,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x502)]
    struct Triangle {
        #[reflect(base)]
        polygon: Polygon,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x503)]
    struct Circle {
        #[reflect(base)]
        shape: Shape,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x510)]
    struct Owner {
        #[reflect(id = 0, target = Pet)]
        pet: Option<ObjectRef>,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x511)]
    struct Pet {
        #[reflect(id = 0, target = Owner)]
        owner: Option<ObjectRef>,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x520)]
    struct Parent {
        #[reflect(id = 0, target = Child)]
        child: Option<ObjectRef>,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x521)]
    struct Child {
        #[reflect(id = 0, weak, target = Parent)]
        parent: Option<ObjectRef>,
    }

    #[test]
    fn bases_are_registered_first() {
        let mut registry = TypeRegistry::new();
        registry.register::<Triangle>().unwrap();
        registry.register::<Circle>().unwrap();

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.derived_types(0x500), [0x501, 0x503]);
        assert!(registry.is_derived_from(0x502, 0x500));
        assert!(registry.is_derived_from(0x503, 0x500));
        assert!(!registry.is_derived_from(0x503, 0x501));
        assert!(!registry.is_derived_from(0x500, 0x500));

        // Agrees with the descriptor chain walk.
        assert!(Triangle::type_descriptor().is_derived_from(Shape::type_descriptor()));
    }

    #[test]
    fn registering_twice_is_a_no_op() {
        let mut registry = TypeRegistry::new();
        assert!(registry.register_descriptor(Circle::type_descriptor()).unwrap());
        assert!(!registry.register_descriptor(Circle::type_descriptor()).unwrap());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn reference_targets_are_registered() {
        let mut registry = TypeRegistry::new();
        registry.register::<Parent>().unwrap();
        assert!(registry.contains(0x521));
        assert!(registry.create_instance(0x521).unwrap().is::<Child>());
        assert!(matches!(
            registry.create_instance(0x999),
            Err(SchemaError::UnknownTypeId(0x999))
        ));
    }

    #[test]
    fn circular_references_need_a_weak_side() {
        let mut registry = TypeRegistry::new();
        registry.register::<Parent>().unwrap();
        registry.check_circular_references().unwrap();

        registry.register::<Owner>().unwrap();
        let err = registry.check_circular_references().unwrap_err();
        assert!(matches!(err, SchemaError::CircularReference { .. }));
    }

    #[test]
    fn shared_registry() {
        let shared = TypeRegistryArc::from(TypeRegistry::new());
        shared.write().register::<Shape>().unwrap();
        assert!(shared.clone().read().contains(0x500));
    }
}
