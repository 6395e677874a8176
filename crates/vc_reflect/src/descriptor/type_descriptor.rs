use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::any::{Any, TypeId};
use core::fmt;
use core::marker::PhantomData;

use crate::descriptor::{FieldDescriptor, LifecycleHook, LifecycleHooks, SchemaInstance};
use crate::{Reflect, SchemaError, Typed};

fn default_factory<T: Reflect + Default>() -> Box<dyn Reflect> {
    Box::new(T::default())
}

fn unit_state() -> Box<dyn Any + Send> {
    Box::new(())
}

// -----------------------------------------------------------------------------
// TypeDescriptor

/// Schema of one reflectable type.
///
/// Holds a stable numeric id (unique within a [`TypeRegistry`]), a display
/// name, the ordered fields declared by this type (not its bases), an optional
/// link to the base type, a factory for default instances and four
/// [lifecycle hooks](LifecycleHooks).
///
/// Descriptors are built once, stored in a [`DescriptorCell`] and never
/// mutated afterwards.
///
/// # Examples
///
/// ```
/// use vc_reflect::{derive::Reflect, Typed};
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 20)]
/// struct Animal {
///     #[reflect(id = 0)]
///     legs: u8,
/// }
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 21)]
/// struct Dog {
///     #[reflect(base)]
///     animal: Animal,
///     #[reflect(id = 0)]
///     name: String,
/// }
///
/// let dog = Dog::type_descriptor();
/// let names: Vec<_> = dog.chain().map(|d| d.name()).collect();
/// assert_eq!(names, ["Dog", "Animal"]);
///
/// assert!(dog.is_derived_from(Animal::type_descriptor()));
/// assert!(dog.field(0).is_some());
/// assert!(dog.field_by_name("legs").is_err());
/// assert!(dog.new_instance().is_some());
/// ```
///
/// [`TypeRegistry`]: crate::registry::TypeRegistry
/// [`DescriptorCell`]: crate::descriptor::DescriptorCell
pub struct TypeDescriptor {
    id: u32,
    name: &'static str,
    type_id: TypeId,
    fields: Box<[FieldDescriptor]>,
    // Resolved lazily, like every other descriptor link.
    base: Option<fn() -> &'static TypeDescriptor>,
    factory: Option<fn() -> Box<dyn Reflect>>,
    hooks: LifecycleHooks,
    new_state: fn() -> Box<dyn Any + Send>,
}

impl TypeDescriptor {
    /// Starts building the descriptor of `T`.
    #[inline]
    pub fn builder<T: Reflect>(id: u32, name: &'static str) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            id,
            name,
            fields: Vec::new(),
            base: None,
            factory: None,
            hooks: LifecycleHooks::default(),
            new_state: unit_state,
            _marker: PhantomData,
        }
    }

    /// Returns the numeric type id.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Returns the display name.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`TypeId`] of the described Rust type.
    #[inline]
    pub const fn rust_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the fields declared by this type, in declaration order.
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Finds a field by id.
    #[inline]
    pub fn field(&self, id: u16) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.id() == id)
    }

    /// Finds a field by name.
    pub fn field_by_name(&self, name: &str) -> Result<&FieldDescriptor, SchemaError> {
        self.fields
            .iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| SchemaError::UnknownField {
                type_name: self.name,
                field: name.to_string(),
            })
    }

    /// Returns the base type, if any.
    #[inline]
    pub fn base(&self) -> Option<&'static TypeDescriptor> {
        self.base.map(|f| f())
    }

    /// Iterates the inheritance chain from this type to the root base type.
    #[inline]
    pub fn chain(&'static self) -> impl Iterator<Item = &'static TypeDescriptor> {
        core::iter::successors(Some(self), |descriptor| descriptor.base())
    }

    /// Returns `true` if this type is a strict descendant of `other`.
    pub fn is_derived_from(&'static self, other: &TypeDescriptor) -> bool {
        self.chain().skip(1).any(|base| base.id == other.id)
    }

    /// Returns `true` if this type has no factory.
    #[inline]
    pub const fn is_abstract(&self) -> bool {
        self.factory.is_none()
    }

    /// Creates a default instance, `None` for abstract types.
    #[inline]
    pub fn new_instance(&self) -> Option<Box<dyn Reflect>> {
        self.factory.map(|factory| factory())
    }

    /// Returns the lifecycle hooks.
    #[inline]
    pub const fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// Creates a schema instance for one traversal.
    #[inline]
    pub fn instantiate(&'static self) -> SchemaInstance {
        SchemaInstance::new(self, (self.new_state)())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base", &self.base().map(TypeDescriptor::name))
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// TypeDescriptorBuilder

/// Builder of a [`TypeDescriptor`] for type `T`.
///
/// # Examples
///
/// ```
/// use vc_reflect::descriptor::{DescriptorCell, FieldDescriptor, SchemaInstance, TypeDescriptor};
/// use vc_reflect::{Reflect, SerializationContext, Typed};
///
/// #[derive(Default)]
/// struct Stats {
///     hits: u32,
///     checksum: u32,
/// }
///
/// fn refresh_checksum(_: &mut SchemaInstance, object: &mut dyn Reflect, _: &mut SerializationContext) {
///     if let Some(stats) = object.downcast_mut::<Stats>() {
///         stats.checksum = stats.hits.wrapping_mul(31);
///     }
/// }
///
/// impl Reflect for Stats {
///     fn descriptor(&self) -> &'static TypeDescriptor {
///         Self::type_descriptor()
///     }
/// }
///
/// impl Typed for Stats {
///     fn type_descriptor() -> &'static TypeDescriptor {
///         static CELL: DescriptorCell = DescriptorCell::new();
///         CELL.get_or_init(|| {
///             TypeDescriptor::builder::<Self>(77, "Stats")
///                 .field(FieldDescriptor::plain::<Self, u32>(0, "hits", |v| &v.hits, |v| &mut v.hits))
///                 .field(FieldDescriptor::plain::<Self, u32>(1, "checksum", |v| &v.checksum, |v| &mut v.checksum))
///                 .on_serialization_started(refresh_checksum)
///                 .with_factory()
///                 .build()
///         })
///     }
/// }
///
/// let descriptor = Stats::type_descriptor();
/// assert_eq!(descriptor.fields().len(), 2);
/// assert!(descriptor.hooks().serialization_started.is_some());
/// ```
pub struct TypeDescriptorBuilder<T> {
    id: u32,
    name: &'static str,
    fields: Vec<FieldDescriptor>,
    base: Option<fn() -> &'static TypeDescriptor>,
    factory: Option<fn() -> Box<dyn Reflect>>,
    hooks: LifecycleHooks,
    new_state: fn() -> Box<dyn Any + Send>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> TypeDescriptorBuilder<T> {
    /// Declares `B` as the base type.
    ///
    /// `T::base()` must return the embedded `B` part.
    #[inline]
    pub fn base<B: Typed>(mut self) -> Self {
        self.base = Some(B::type_descriptor);
        self
    }

    /// Appends a field.
    #[inline]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Uses `T::default` as the factory.
    #[inline]
    pub fn with_factory(mut self) -> Self
    where
        T: Default,
    {
        self.factory = Some(default_factory::<T>);
        self
    }

    /// Uses a custom factory.
    #[inline]
    pub fn with_factory_fn(mut self, factory: fn() -> Box<dyn Reflect>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the scratch state created for every schema instance.
    #[inline]
    pub fn with_state(mut self, new_state: fn() -> Box<dyn Any + Send>) -> Self {
        self.new_state = new_state;
        self
    }

    #[inline]
    pub fn on_serialization_started(mut self, hook: LifecycleHook) -> Self {
        self.hooks.serialization_started = Some(hook);
        self
    }

    #[inline]
    pub fn on_serialization_ended(mut self, hook: LifecycleHook) -> Self {
        self.hooks.serialization_ended = Some(hook);
        self
    }

    #[inline]
    pub fn on_deserialization_started(mut self, hook: LifecycleHook) -> Self {
        self.hooks.deserialization_started = Some(hook);
        self
    }

    #[inline]
    pub fn on_deserialization_ended(mut self, hook: LifecycleHook) -> Self {
        self.hooks.deserialization_ended = Some(hook);
        self
    }

    /// Finishes the descriptor.
    ///
    /// # Panics
    ///
    /// Panics if two fields share an id.
    pub fn build(self) -> TypeDescriptor {
        for (index, field) in self.fields.iter().enumerate() {
            let duplicate = self.fields[..index].iter().any(|f| f.id() == field.id());
            assert!(
                !duplicate,
                "type `{}` declares field id {} twice",
                self.name,
                field.id()
            );
        }
        TypeDescriptor {
            id: self.id,
            name: self.name,
            type_id: TypeId::of::<T>(),
            fields: self.fields.into_boxed_slice(),
            base: self.base,
            factory: self.factory,
            hooks: self.hooks,
            new_state: self.new_state,
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use crate::descriptor::{FieldDescriptor, TypeDescriptor};
    use crate::derive::Reflect;
    use crate::{SchemaError, Typed};

    #[derive(Reflect, Default)]
    #[reflect(id = 0x400, abstract_type)]
    struct Component {
        #[reflect(id = 0)]
        enabled: bool,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x401, name = "Light")]
    struct PointLight {
        #[reflect(base)]
        component: Component,
        #[reflect(id = 0)]
        intensity: f32,
        #[reflect(skip)]
        _cached: u64,
    }

    #[test]
    fn derived_descriptor_shape() {
        let light = PointLight::type_descriptor();
        assert_eq!(light.id(), 0x401);
        assert_eq!(light.name(), "Light");
        assert_eq!(light.fields().len(), 1);
        assert_eq!(light.base().unwrap().id(), 0x400);
        assert!(light.is_derived_from(Component::type_descriptor()));
        assert!(!Component::type_descriptor().is_derived_from(light));
        assert!(!light.is_derived_from(light));
    }

    #[test]
    fn abstract_types_have_no_factory() {
        let component = Component::type_descriptor();
        assert!(component.is_abstract());
        assert!(component.new_instance().is_none());

        let light = PointLight::type_descriptor().new_instance().unwrap();
        assert!(light.is::<PointLight>());
    }

    #[test]
    fn unknown_field_name() {
        let err = PointLight::type_descriptor().field_by_name("enabled").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField { type_name: "Light", .. }));
    }

    #[test]
    #[should_panic(expected = "declares field id 3 twice")]
    fn duplicate_field_ids_are_rejected() {
        TypeDescriptor::builder::<PointLight>(0x4ff, "Broken")
            .field(FieldDescriptor::plain::<PointLight, f32>(
                3,
                "a",
                |v| &v.intensity,
                |v| &mut v.intensity,
            ))
            .field(FieldDescriptor::plain::<PointLight, f32>(
                3,
                "b",
                |v| &v.intensity,
                |v| &mut v.intensity,
            ))
            .build();
    }
}
