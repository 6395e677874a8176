use alloc::boxed::Box;
use core::any::Any;

use crate::descriptor::TypeDescriptor;

// -----------------------------------------------------------------------------
// Reflect

/// A value whose fields can be enumerated through a [`TypeDescriptor`].
///
/// Usually implemented through [`#[derive(Reflect)]`](crate::derive::Reflect).
///
/// # Inheritance
///
/// Single inheritance is expressed by composition: a derived type embeds its
/// base part and returns it from [`Reflect::base`] / [`Reflect::base_mut`].
/// The descriptor chain (`descriptor().base()`) must follow the same shape,
/// the serializers check this level by level.
///
/// # Examples
///
/// ```
/// use vc_reflect::{derive::Reflect, Reflect};
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 10)]
/// struct Shape {
///     #[reflect(id = 0)]
///     area: f32,
/// }
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 11)]
/// struct Circle {
///     #[reflect(base)]
///     shape: Shape,
///     #[reflect(id = 0)]
///     radius: f32,
/// }
///
/// let circle = Circle::default();
/// let value: &dyn Reflect = &circle;
///
/// assert_eq!(value.descriptor().name(), "Circle");
/// assert_eq!(value.base().unwrap().descriptor().name(), "Shape");
/// assert!(value.downcast_ref::<Circle>().is_some());
/// ```
pub trait Reflect: Any + Send + Sync {
    /// Returns the descriptor of the most-derived type of this value.
    fn descriptor(&self) -> &'static TypeDescriptor;

    /// Returns the embedded base-class part, if the type has one.
    #[inline]
    fn base(&self) -> Option<&dyn Reflect> {
        None
    }

    /// Returns the embedded base-class part mutably, if the type has one.
    #[inline]
    fn base_mut(&mut self) -> Option<&mut dyn Reflect> {
        None
    }
}

/// Static access to a type's descriptor, without an instance.
pub trait Typed: Reflect {
    /// Returns the descriptor of `Self`.
    fn type_descriptor() -> &'static TypeDescriptor;
}

// -----------------------------------------------------------------------------
// dyn Reflect

impl dyn Reflect {
    /// Returns `true` if the underlying value is of type `T`.
    #[inline]
    pub fn is<T: Reflect>(&self) -> bool {
        let any: &dyn Any = self;
        any.is::<T>()
    }

    /// Downcasts the value to type `T` by reference.
    #[inline]
    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        let any: &dyn Any = self;
        any.downcast_ref::<T>()
    }

    /// Downcasts the value to type `T` by mutable reference.
    #[inline]
    pub fn downcast_mut<T: Reflect>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self;
        any.downcast_mut::<T>()
    }

    /// Downcasts a boxed value to type `T`, returning it unchanged on failure.
    pub fn downcast<T: Reflect>(self: Box<Self>) -> Result<Box<T>, Box<dyn Reflect>> {
        if !self.is::<T>() {
            return Err(self);
        }
        let any: Box<dyn Any> = self;
        match any.downcast::<T>() {
            Ok(value) => Ok(value),
            Err(_) => unreachable!("type checked above"),
        }
    }

    /// Returns the display name of the most-derived type.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.descriptor().name()
    }

    /// Returns the part of this value at `depth` in its inheritance chain.
    ///
    /// Depth `0` is the value itself, `1` its base part and so on.
    pub fn level(&self, depth: usize) -> Option<&dyn Reflect> {
        let mut current = self;
        for _ in 0..depth {
            current = current.base()?;
        }
        Some(current)
    }

    /// Returns the part of this value at `depth` in its inheritance chain, mutably.
    pub fn level_mut(&mut self, depth: usize) -> Option<&mut dyn Reflect> {
        let mut current = self;
        for _ in 0..depth {
            current = current.base_mut()?;
        }
        Some(current)
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use crate::Reflect;
    use crate::derive::Reflect;

    #[derive(Reflect, Default)]
    #[reflect(id = 0x100)]
    struct Base {
        #[reflect(id = 0)]
        value: u32,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x101)]
    struct Middle {
        #[reflect(base)]
        base: Base,
        #[reflect(id = 0)]
        value: u32,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x102)]
    struct Leaf {
        #[reflect(base)]
        base: Middle,
        #[reflect(id = 0)]
        value: u32,
    }

    #[test]
    fn level_walks_the_base_parts() {
        let mut leaf = Leaf::default();
        leaf.base.base.value = 7;

        let value: &mut dyn Reflect = &mut leaf;
        assert_eq!(value.level(0).unwrap().type_name(), "Leaf");
        assert_eq!(value.level(1).unwrap().type_name(), "Middle");
        assert_eq!(value.level(2).unwrap().type_name(), "Base");
        assert!(value.level(3).is_none());

        let base = value.level_mut(2).unwrap().downcast_mut::<Base>().unwrap();
        base.value += 1;
        assert_eq!(leaf.base.base.value, 8);
    }

    #[test]
    fn boxed_downcast_returns_the_value_on_mismatch() {
        let boxed: Box<dyn Reflect> = Box::new(Base { value: 3 });

        let boxed = boxed.downcast::<Leaf>().err().unwrap();
        let base = boxed.downcast::<Base>().ok().unwrap();
        assert_eq!(base.value, 3);
    }
}
