use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::ptr;
use std::io::{self, Read, Write};

use vc_reflect::descriptor::{FieldAccessor, FieldDescriptor, SchemaInstance, TypeDescriptor};
use vc_reflect::registry::TypeRegistry;
use vc_reflect::{FieldError, ObjectRef, Reflect, SchemaError, SerializationContext};
use vc_utils::IdentityMap;

use super::{EncodeOptions, FieldMeta, MAX_OBJECT_ID, ObjectMeta};
use crate::{SerialError, StreamError};

// -----------------------------------------------------------------------------
// Sink

/// The output stream plus a running byte count.
struct Sink<W> {
    out: W,
    written: u64,
}

impl<W: Write> Sink<W> {
    #[inline]
    fn bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.out.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    #[inline]
    fn word(&mut self, word: u32) -> Result<(), StreamError> {
        self.bytes(&word.to_le_bytes())
    }

    fn len(&mut self, len: usize) -> Result<(), StreamError> {
        let len = u32::try_from(len).map_err(|_| StreamError::LengthOverflow(len as u64))?;
        self.word(len)
    }

    /// Copies exactly `len` bytes from `reader`.
    fn copy_from(&mut self, reader: impl Read, len: u32) -> Result<(), StreamError> {
        let copied = io::copy(&mut reader.take(u64::from(len)), &mut self.out)?;
        self.written += copied;
        if copied != u64::from(len) {
            return Err(StreamError::UnexpectedEof);
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Encoder

/// State of one encode call.
///
/// Objects are written breadth-first: the first reference to an object
/// assigns its persistent id and queues it, later references reuse the id.
pub(super) struct Encoder<'r, W> {
    registry: &'r TypeRegistry,
    sink: Sink<W>,
    shallow: bool,
    ids: IdentityMap<u32>,
    next_id: u32,
    queue: VecDeque<(u32, ObjectRef)>,
    scratch: Vec<u8>,
}

impl<'r, W: Write> Encoder<'r, W> {
    pub fn new(registry: &'r TypeRegistry, out: W, options: EncodeOptions) -> Self {
        Self {
            registry,
            sink: Sink { out, written: 0 },
            shallow: options.shallow,
            ids: IdentityMap::new(),
            next_id: 1,
            queue: VecDeque::new(),
            scratch: Vec::new(),
        }
    }

    pub fn encode_object(
        mut self,
        root: &ObjectRef,
        ctx: &mut SerializationContext,
    ) -> Result<u64, SerialError> {
        let id = self.assign_id(root.as_ptr())?;
        {
            let mut guard = root.write();
            self.write_record(id, &mut **guard, ctx)?;
        }
        self.finish(ctx)
    }

    pub fn encode_value(
        mut self,
        root: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<u64, SerialError> {
        let address: *const dyn Reflect = &*root;
        let id = self.assign_id(address)?;
        self.write_record(id, root, ctx)?;
        self.finish(ctx)
    }

    fn finish(mut self, ctx: &mut SerializationContext) -> Result<u64, SerialError> {
        while let Some((id, object)) = self.queue.pop_front() {
            let mut guard = object.write();
            self.write_record(id, &mut **guard, ctx)?;
        }
        self.sink.out.flush()?;
        log::debug!(
            "encoded {} objects in {} bytes",
            self.next_id - 1,
            self.sink.written
        );
        Ok(self.sink.written)
    }

    fn assign_id<T: ?Sized>(&mut self, address: *const T) -> Result<u32, StreamError> {
        let candidate = self.next_id;
        let (id, inserted) = self.ids.get_or_insert_with(address, || candidate);
        let id = *id;
        if inserted {
            if id > MAX_OBJECT_ID {
                return Err(StreamError::ObjectIdOverflow(id as u64));
            }
            self.next_id += 1;
        }
        Ok(id)
    }

    fn reference_id(&mut self, target: &ObjectRef) -> Result<u32, StreamError> {
        let before = self.next_id;
        let id = self.assign_id(target.as_ptr())?;
        if self.next_id != before {
            self.queue.push_back((id, target.clone()));
        }
        Ok(id)
    }

    /// Writes all levels of `object`. Embedded values pass `object_id == 0`
    /// and are closed by a terminator.
    fn write_record(
        &mut self,
        object_id: u32,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let descriptor = object.descriptor();
        if object_id != 0 {
            match self.registry.get(descriptor.id()) {
                Some(registered) if ptr::eq(registered, descriptor) => {}
                _ => return Err(SchemaError::UnknownTypeId(descriptor.id()).into()),
            }
        }
        log::trace!("encoding `{}` as object {object_id}", descriptor.name());

        let chain: Vec<&'static TypeDescriptor> = descriptor.chain().collect();
        let mut schemas: Vec<SchemaInstance> = chain.iter().map(|d| d.instantiate()).collect();

        for (depth, &level_descriptor) in chain.iter().enumerate() {
            let level = crate::level_mut(object, depth, level_descriptor)?;
            let schema = &mut schemas[depth];
            schema.serialization_started(level, ctx);

            let meta = ObjectMeta::new(object_id, level_descriptor.id(), depth > 0)?;
            self.sink.bytes(&meta.to_bytes())?;
            for field in level_descriptor.fields() {
                self.write_field(field, schema, level, ctx)?;
            }
        }
        for (depth, &level_descriptor) in chain.iter().enumerate().rev() {
            let level = crate::level_mut(object, depth, level_descriptor)?;
            schemas[depth].serialization_ended(level, ctx);
        }

        if object_id == 0 {
            self.sink.word(FieldMeta::TERMINATOR.to_word())?;
        }
        Ok(())
    }

    fn write_field(
        &mut self,
        field: &FieldDescriptor,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let type_name = schema.descriptor().name();
        let field_name = field.name();
        let wrap = |source: FieldError| SchemaError::Field {
            type_name,
            field: field_name,
            source,
        };

        self.sink.word(FieldMeta::for_field(field).to_word())?;
        match field.accessor() {
            FieldAccessor::Plain(access) => {
                let len = access.len(schema, object).map_err(wrap)?;
                if field.is_array() {
                    self.sink.len(len)?;
                }
                for index in 0..len {
                    self.scratch.clear();
                    access
                        .write(schema, object, index, &mut self.scratch)
                        .map_err(wrap)?;
                    self.sink.bytes(&self.scratch)?;
                }
            }
            FieldAccessor::DataBlock(access) => {
                let block = access.get(schema, object).map_err(wrap)?;
                let len = block.len();
                let len = u32::try_from(len).map_err(|_| StreamError::LengthOverflow(len))?;
                self.sink.word(len)?;
                self.sink.copy_from(block.open()?, len)?;
            }
            FieldAccessor::Reflectable(access) => {
                let len = access.len(schema, object).map_err(wrap)?;
                if field.is_array() {
                    self.sink.len(len)?;
                }
                for index in 0..len {
                    let child = access.get_mut(schema, object, index).map_err(wrap)?;
                    self.write_record(0, child, ctx)?;
                }
            }
            FieldAccessor::ReflectablePtr(access) => {
                let len = access.len(schema, object).map_err(wrap)?;
                if field.is_array() {
                    self.sink.len(len)?;
                }
                for index in 0..len {
                    let id = match access.get(schema, object, index).map_err(wrap)? {
                        Some(target) if !self.shallow => self.reference_id(&target)?,
                        _ => 0,
                    };
                    self.sink.word(id)?;
                }
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use std::io::Cursor;

    use vc_reflect::derive::Reflect;
    use vc_reflect::descriptor::{DescriptorCell, FieldDescriptor, SchemaInstance, TypeDescriptor};
    use vc_reflect::registry::TypeRegistry;
    use vc_reflect::{DataBlock, ObjectRef, Reflect, SerializationContext, Typed};

    use crate::binary::memory::{decode_from_slice, encode_to_vec, encode_to_vec_with};
    use crate::binary::{BinarySerializer, EncodeOptions, FlushBuffer};
    use crate::{SerialError, StreamError};

    #[derive(Reflect, Default)]
    #[reflect(id = 0x710)]
    struct Link {
        #[reflect(id = 0)]
        next: Option<ObjectRef>,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x712)]
    struct Archive {
        #[reflect(id = 0)]
        payload: DataBlock,
    }

    #[derive(Default)]
    struct Stamped {
        value: u32,
        stamp: u32,
    }

    fn event(ctx: &mut SerializationContext, name: &'static str) {
        if let Some(events) = ctx.user_data_mut::<Vec<&'static str>>() {
            events.push(name);
        }
    }

    fn stamp(_: &mut SchemaInstance, object: &mut dyn Reflect, ctx: &mut SerializationContext) {
        if let Some(stamped) = object.downcast_mut::<Stamped>() {
            stamped.stamp = stamped.value + 1;
        }
        event(ctx, "serialization_started");
    }

    fn stamped_ended(_: &mut SchemaInstance, _: &mut dyn Reflect, ctx: &mut SerializationContext) {
        event(ctx, "serialization_ended");
    }

    fn loaded(_: &mut SchemaInstance, _: &mut dyn Reflect, ctx: &mut SerializationContext) {
        event(ctx, "deserialization_ended");
    }

    impl Reflect for Stamped {
        fn descriptor(&self) -> &'static TypeDescriptor {
            Self::type_descriptor()
        }
    }

    impl Typed for Stamped {
        fn type_descriptor() -> &'static TypeDescriptor {
            static CELL: DescriptorCell = DescriptorCell::new();
            CELL.get_or_init(|| {
                TypeDescriptor::builder::<Self>(0x711, "Stamped")
                    .field(FieldDescriptor::plain::<Self, u32>(0, "value", |s| &s.value, |s| &mut s.value))
                    .field(FieldDescriptor::plain::<Self, u32>(1, "stamp", |s| &s.stamp, |s| &mut s.stamp))
                    .with_factory()
                    .on_serialization_started(stamp)
                    .on_serialization_ended(stamped_ended)
                    .on_deserialization_ended(loaded)
                    .build()
            })
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<Link>().unwrap();
        registry.register::<Stamped>().unwrap();
        registry.register::<Archive>().unwrap();
        registry
    }

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn stream_layout() {
        let tail = ObjectRef::new(Link::default());
        let head = ObjectRef::new(Link { next: Some(tail) });
        let bytes = encode_to_vec(&registry(), &head, &mut SerializationContext::new()).unwrap();

        assert_eq!(
            words(&bytes),
            [
                (1 << 2) | 1, 0x710, 0x0000_0410, 2, // head -> 2
                (2 << 2) | 1, 0x710, 0x0000_0410, 0, // tail -> none
            ]
        );
    }

    #[test]
    fn hooks_run_around_each_object() {
        let registry = registry();
        let root = ObjectRef::new(Stamped { value: 41, stamp: 0 });

        let mut ctx = SerializationContext::new();
        ctx.set_user_data(Vec::<&'static str>::new());
        let bytes = encode_to_vec(&registry, &root, &mut ctx).unwrap();
        let copy = decode_from_slice(&registry, &bytes, &mut ctx).unwrap().unwrap();

        assert_eq!(copy.with(|s: &Stamped| s.stamp), Some(42));
        assert_eq!(
            ctx.user_data::<Vec<&'static str>>().unwrap(),
            &["serialization_started", "serialization_ended", "deserialization_ended"]
        );
    }

    #[test]
    fn shallow_encoding_drops_references() {
        let registry = registry();
        let head = ObjectRef::new(Link {
            next: Some(ObjectRef::new(Link::default())),
        });
        let mut ctx = SerializationContext::new();
        let options = EncodeOptions { shallow: true };
        let bytes = encode_to_vec_with(&registry, &head, options, &mut ctx).unwrap();
        assert_eq!(bytes.len(), 16);

        let copy = decode_from_slice(&registry, &bytes, &mut ctx).unwrap().unwrap();
        assert_eq!(copy.with(|l: &Link| l.next.is_none()), Some(true));
    }

    #[test]
    fn unregistered_types_are_rejected() {
        let root = ObjectRef::new(Link::default());
        let err = encode_to_vec(&TypeRegistry::new(), &root, &mut SerializationContext::new())
            .unwrap_err();
        assert!(matches!(err, SerialError::Schema(_)));
    }

    #[test]
    fn streaming_through_a_flush_buffer() {
        let registry = registry();
        let mut chain = ObjectRef::new(Link::default());
        for _ in 0..10 {
            chain = ObjectRef::new(Link { next: Some(chain) });
        }
        let expected = encode_to_vec(&registry, &chain, &mut SerializationContext::new()).unwrap();

        let mut streamed = Vec::new();
        let mut buffer = FlushBuffer::with_capacity(12, |full: Vec<u8>| {
            streamed.extend_from_slice(&full);
            Some(full)
        });
        let serializer = BinarySerializer::new(&registry);
        let count = serializer
            .encode(&chain, &mut buffer, &mut SerializationContext::new())
            .unwrap();
        assert_eq!(buffer.finish().unwrap(), count);
        assert_eq!(streamed, expected);

        let copy = serializer
            .decode(Cursor::new(streamed), &mut SerializationContext::new())
            .unwrap();
        assert!(copy.is_some());
    }

    #[test]
    fn refused_flush_aborts_encoding() {
        let registry = registry();
        let root = ObjectRef::new(Link {
            next: Some(ObjectRef::new(Link::default())),
        });
        let mut buffer = FlushBuffer::with_capacity(8, |_| None);
        let err = BinarySerializer::new(&registry)
            .encode(&root, &mut buffer, &mut SerializationContext::new())
            .unwrap_err();
        assert!(matches!(err, SerialError::Stream(StreamError::FlushRefused)));
    }

    #[test]
    fn oversized_blocks_are_rejected_before_reading() {
        let len = u64::from(u32::MAX) + 1;
        let root = ObjectRef::new(Archive {
            payload: DataBlock::from_file_region(std::path::Path::new("unread.bin"), 0, len),
        });
        let err = encode_to_vec(&registry(), &root, &mut SerializationContext::new()).unwrap_err();
        assert!(matches!(err, SerialError::Stream(StreamError::LengthOverflow(n)) if n == len));
    }
}
