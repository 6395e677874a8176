use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::type_name;

use crate::descriptor::{SchemaInstance, TypeDescriptor};
use crate::field::{DataBlockAccess, PlainAccess, ReflectableAccess, ReflectablePtrAccess};
use crate::plain::PlainType;
use crate::{DataBlock, FieldError, ObjectRef, Reflect, Typed};

// -----------------------------------------------------------------------------
// Helpers

#[inline]
fn target<T: Reflect>(object: &dyn Reflect) -> Result<&T, FieldError> {
    object.downcast_ref::<T>().ok_or(FieldError::Downcast {
        expected: type_name::<T>(),
    })
}

#[inline]
fn target_mut<T: Reflect>(object: &mut dyn Reflect) -> Result<&mut T, FieldError> {
    object.downcast_mut::<T>().ok_or(FieldError::Downcast {
        expected: type_name::<T>(),
    })
}

#[inline]
fn single(index: usize) -> Result<(), FieldError> {
    if index == 0 {
        Ok(())
    } else {
        Err(FieldError::IndexOutOfRange { index, len: 1 })
    }
}

#[inline]
fn element<F>(items: &[F], index: usize) -> Result<&F, FieldError> {
    let len = items.len();
    items
        .get(index)
        .ok_or(FieldError::IndexOutOfRange { index, len })
}

#[inline]
fn element_mut<F>(items: &mut [F], index: usize) -> Result<&mut F, FieldError> {
    let len = items.len();
    items
        .get_mut(index)
        .ok_or(FieldError::IndexOutOfRange { index, len })
}

fn unbox<F: Reflect>(value: Box<dyn Reflect>) -> Result<F, FieldError> {
    match value.downcast::<F>() {
        Ok(value) => Ok(*value),
        Err(value) => Err(FieldError::ValueType {
            expected: type_name::<F>(),
            found: value.type_name(),
        }),
    }
}

// -----------------------------------------------------------------------------
// Binding

/// Binds a single member of type `F` inside `T`.
///
/// Implements [`PlainAccess`] for `F: PlainType`, [`ReflectableAccess`] for
/// `F: Typed`, [`ReflectablePtrAccess`] for `Option<ObjectRef>` and
/// [`DataBlockAccess`] for [`DataBlock`].
pub struct Binding<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> Binding<T, F> {
    /// Creates a binding from a pair of projections.
    #[inline]
    pub const fn new(get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self {
        Self { get, get_mut }
    }
}

impl<T: Reflect, F: PlainType> PlainAccess for Binding<T, F> {
    #[inline]
    fn static_size(&self) -> Option<u8> {
        F::STATIC_SIZE
    }

    #[inline]
    fn len(&self, _: &mut SchemaInstance, _: &dyn Reflect) -> Result<usize, FieldError> {
        Ok(1)
    }

    #[inline]
    fn set_len(&self, _: &mut SchemaInstance, _: &mut dyn Reflect, _: usize) -> Result<(), FieldError> {
        Ok(())
    }

    fn write(
        &self,
        _: &mut SchemaInstance,
        object: &dyn Reflect,
        index: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), FieldError> {
        single(index)?;
        (self.get)(target(object)?).write_plain(out);
        Ok(())
    }

    fn read(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), FieldError> {
        single(index)?;
        *(self.get_mut)(target_mut(object)?) = F::read_plain(bytes)?;
        Ok(())
    }
}

impl<T: Reflect, F: Typed> ReflectableAccess for Binding<T, F> {
    #[inline]
    fn value_descriptor(&self) -> &'static TypeDescriptor {
        F::type_descriptor()
    }

    #[inline]
    fn len(&self, _: &mut SchemaInstance, _: &dyn Reflect) -> Result<usize, FieldError> {
        Ok(1)
    }

    #[inline]
    fn set_len(&self, _: &mut SchemaInstance, _: &mut dyn Reflect, _: usize) -> Result<(), FieldError> {
        Ok(())
    }

    fn get<'a>(
        &self,
        _: &mut SchemaInstance,
        object: &'a dyn Reflect,
        index: usize,
    ) -> Result<&'a dyn Reflect, FieldError> {
        single(index)?;
        Ok((self.get)(target(object)?))
    }

    fn get_mut<'a>(
        &self,
        _: &mut SchemaInstance,
        object: &'a mut dyn Reflect,
        index: usize,
    ) -> Result<&'a mut dyn Reflect, FieldError> {
        single(index)?;
        Ok((self.get_mut)(target_mut(object)?))
    }

    fn set(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        value: Box<dyn Reflect>,
    ) -> Result<(), FieldError> {
        single(index)?;
        let value = unbox::<F>(value)?;
        *(self.get_mut)(target_mut(object)?) = value;
        Ok(())
    }
}

impl<T: Reflect> ReflectablePtrAccess for Binding<T, Option<ObjectRef>> {
    #[inline]
    fn len(&self, _: &mut SchemaInstance, _: &dyn Reflect) -> Result<usize, FieldError> {
        Ok(1)
    }

    #[inline]
    fn set_len(&self, _: &mut SchemaInstance, _: &mut dyn Reflect, _: usize) -> Result<(), FieldError> {
        Ok(())
    }

    fn get(
        &self,
        _: &mut SchemaInstance,
        object: &dyn Reflect,
        index: usize,
    ) -> Result<Option<ObjectRef>, FieldError> {
        single(index)?;
        Ok((self.get)(target(object)?).clone())
    }

    fn set(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        value: Option<ObjectRef>,
    ) -> Result<(), FieldError> {
        single(index)?;
        *(self.get_mut)(target_mut(object)?) = value;
        Ok(())
    }
}

impl<T: Reflect> DataBlockAccess for Binding<T, DataBlock> {
    fn get(&self, _: &mut SchemaInstance, object: &dyn Reflect) -> Result<DataBlock, FieldError> {
        Ok((self.get)(target(object)?).clone())
    }

    fn set(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        value: DataBlock,
    ) -> Result<(), FieldError> {
        *(self.get_mut)(target_mut(object)?) = value;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ArrayBinding

/// Binds a `Vec<F>` member inside `T` as an array field.
///
/// Shrinking drops trailing elements, growing appends default values.
pub struct ArrayBinding<T, F> {
    get: fn(&T) -> &Vec<F>,
    get_mut: fn(&mut T) -> &mut Vec<F>,
}

impl<T, F> ArrayBinding<T, F> {
    /// Creates a binding from a pair of projections.
    #[inline]
    pub const fn new(get: fn(&T) -> &Vec<F>, get_mut: fn(&mut T) -> &mut Vec<F>) -> Self {
        Self { get, get_mut }
    }

    #[inline]
    fn items<'a>(&self, object: &'a dyn Reflect) -> Result<&'a Vec<F>, FieldError>
    where
        T: Reflect,
    {
        Ok((self.get)(target(object)?))
    }

    #[inline]
    fn items_mut<'a>(&self, object: &'a mut dyn Reflect) -> Result<&'a mut Vec<F>, FieldError>
    where
        T: Reflect,
    {
        Ok((self.get_mut)(target_mut(object)?))
    }
}

impl<T: Reflect, F: PlainType + Default> PlainAccess for ArrayBinding<T, F> {
    #[inline]
    fn static_size(&self) -> Option<u8> {
        F::STATIC_SIZE
    }

    fn len(&self, _: &mut SchemaInstance, object: &dyn Reflect) -> Result<usize, FieldError> {
        Ok(self.items(object)?.len())
    }

    fn set_len(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        len: usize,
    ) -> Result<(), FieldError> {
        self.items_mut(object)?.resize_with(len, F::default);
        Ok(())
    }

    fn write(
        &self,
        _: &mut SchemaInstance,
        object: &dyn Reflect,
        index: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), FieldError> {
        element(self.items(object)?, index)?.write_plain(out);
        Ok(())
    }

    fn read(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        bytes: &[u8],
    ) -> Result<(), FieldError> {
        *element_mut(self.items_mut(object)?, index)? = F::read_plain(bytes)?;
        Ok(())
    }
}

impl<T: Reflect, F: Typed + Default> ReflectableAccess for ArrayBinding<T, F> {
    #[inline]
    fn value_descriptor(&self) -> &'static TypeDescriptor {
        F::type_descriptor()
    }

    fn len(&self, _: &mut SchemaInstance, object: &dyn Reflect) -> Result<usize, FieldError> {
        Ok(self.items(object)?.len())
    }

    fn set_len(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        len: usize,
    ) -> Result<(), FieldError> {
        self.items_mut(object)?.resize_with(len, F::default);
        Ok(())
    }

    fn get<'a>(
        &self,
        _: &mut SchemaInstance,
        object: &'a dyn Reflect,
        index: usize,
    ) -> Result<&'a dyn Reflect, FieldError> {
        Ok(element(self.items(object)?, index)?)
    }

    fn get_mut<'a>(
        &self,
        _: &mut SchemaInstance,
        object: &'a mut dyn Reflect,
        index: usize,
    ) -> Result<&'a mut dyn Reflect, FieldError> {
        Ok(element_mut(self.items_mut(object)?, index)?)
    }

    fn set(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        value: Box<dyn Reflect>,
    ) -> Result<(), FieldError> {
        let value = unbox::<F>(value)?;
        *element_mut(self.items_mut(object)?, index)? = value;
        Ok(())
    }
}

impl<T: Reflect> ReflectablePtrAccess for ArrayBinding<T, Option<ObjectRef>> {
    fn len(&self, _: &mut SchemaInstance, object: &dyn Reflect) -> Result<usize, FieldError> {
        Ok(self.items(object)?.len())
    }

    fn set_len(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        len: usize,
    ) -> Result<(), FieldError> {
        self.items_mut(object)?.resize(len, None);
        Ok(())
    }

    fn get(
        &self,
        _: &mut SchemaInstance,
        object: &dyn Reflect,
        index: usize,
    ) -> Result<Option<ObjectRef>, FieldError> {
        Ok(element(self.items(object)?, index)?.clone())
    }

    fn set(
        &self,
        _: &mut SchemaInstance,
        object: &mut dyn Reflect,
        index: usize,
        value: Option<ObjectRef>,
    ) -> Result<(), FieldError> {
        *element_mut(self.items_mut(object)?, index)? = value;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;
    use alloc::vec;
    use alloc::vec::Vec;

    use crate::derive::Reflect;
    use crate::field::{ArrayBinding, Binding, PlainAccess, ReflectableAccess};
    use crate::{FieldError, Typed};

    #[derive(Reflect, Default, Debug, PartialEq)]
    #[reflect(id = 0x300)]
    struct Inner {
        #[reflect(id = 0)]
        value: u8,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x301)]
    struct Outer {
        #[reflect(id = 0)]
        scores: Vec<u16>,
        #[reflect(id = 1, reflectable)]
        inner: Inner,
    }

    #[test]
    fn array_binding_resizes_and_indexes() {
        let binding = ArrayBinding::<Outer, u16>::new(|v| &v.scores, |v| &mut v.scores);
        let mut schema = Outer::type_descriptor().instantiate();
        let mut outer = Outer::default();

        binding.set_len(&mut schema, &mut outer, 2).unwrap();
        binding.read(&mut schema, &mut outer, 1, &[0x34, 0x12]).unwrap();
        assert_eq!(outer.scores, vec![0, 0x1234]);

        let mut out = Vec::new();
        binding.write(&mut schema, &outer, 1, &mut out).unwrap();
        assert_eq!(out, [0x34, 0x12]);

        assert_eq!(
            binding.write(&mut schema, &outer, 2, &mut out),
            Err(FieldError::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn binding_rejects_foreign_objects_and_values() {
        let binding = Binding::<Outer, Inner>::new(|v| &v.inner, |v| &mut v.inner);
        let mut schema = Outer::type_descriptor().instantiate();
        let mut inner = Inner::default();
        let mut outer = Outer::default();

        assert!(matches!(
            binding.get(&mut schema, &inner, 0),
            Err(FieldError::Downcast { .. })
        ));
        assert!(matches!(
            binding.set(&mut schema, &mut inner, 0, Box::new(Inner::default())),
            Err(FieldError::Downcast { .. })
        ));
        assert!(matches!(
            binding.set(&mut schema, &mut outer, 0, Box::new(Outer::default())),
            Err(FieldError::ValueType { .. })
        ));

        binding
            .set(&mut schema, &mut outer, 0, Box::new(Inner { value: 5 }))
            .unwrap();
        assert_eq!(outer.inner, Inner { value: 5 });
        assert_eq!(
            binding.get(&mut schema, &outer, 0).unwrap().type_name(),
            "Inner"
        );
    }
}
