use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use vc_reflect::descriptor::{FieldAccessor, FieldDescriptor, FieldKind, SchemaInstance, TypeDescriptor};
use vc_reflect::plain::SIZE_PREFIX_LEN;
use vc_reflect::registry::TypeRegistry;
use vc_reflect::{DataBlock, FieldError, FieldMismatch, ObjectRef, Reflect, SchemaError};
use vc_reflect::{SerializationContext, Warning};

use super::{FieldMeta, ObjectMeta};
use crate::cycles::StrongEdges;
use crate::{SerialError, StreamError};

fn malformed(word: u32, reason: &'static str) -> SerialError {
    SchemaError::MalformedMetadata { word, reason }.into()
}

// -----------------------------------------------------------------------------
// StreamReader

/// A seekable input that tracks its position and length.
struct StreamReader<R> {
    inner: R,
    pos: u64,
    end: u64,
}

impl<R: Read + Seek> StreamReader<R> {
    fn new(mut inner: R) -> Result<Self, StreamError> {
        let pos = inner.stream_position()?;
        let end = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(pos))?;
        Ok(Self { inner, pos, end })
    }

    #[inline]
    fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }

    fn ensure(&self, needed: u64) -> Result<(), StreamError> {
        if needed > self.remaining() {
            return Err(StreamError::Truncated {
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn word(&mut self) -> Result<u32, StreamError> {
        let mut buf = [0; 4];
        self.inner.read_exact(&mut buf)?;
        self.pos += 4;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a word, `None` at the end of the stream.
    fn next_word(&mut self) -> Result<Option<u32>, StreamError> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        self.word().map(Some)
    }

    fn bytes(&mut self, len: u64) -> Result<Vec<u8>, StreamError> {
        self.ensure(len)?;
        let mut buf = vec![0; len as usize];
        self.inner.read_exact(&mut buf)?;
        self.pos += len;
        Ok(buf)
    }

    /// Reads a size-prefixed payload, prefix included.
    fn dynamic_payload(&mut self) -> Result<Vec<u8>, SerialError> {
        let size = self.word()?;
        if (size as usize) < SIZE_PREFIX_LEN {
            return Err(malformed(size, "dynamic payload smaller than its size prefix"));
        }
        let rest = size as u64 - SIZE_PREFIX_LEN as u64;
        self.ensure(rest)?;
        let mut buf = Vec::with_capacity(size as usize);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.resize(size as usize, 0);
        self.inner.read_exact(&mut buf[SIZE_PREFIX_LEN..])?;
        self.pos += rest;
        Ok(buf)
    }

    fn skip(&mut self, len: u64) -> Result<(), StreamError> {
        self.ensure(len)?;
        self.seek_to(self.pos + len)
    }

    fn seek_to(&mut self, pos: u64) -> Result<(), StreamError> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Decoder

struct DecodedObject {
    object: ObjectRef,
    type_name: &'static str,
    meta: ObjectMeta,
    /// Stream position right after the object's first header.
    offset: u64,
}

/// How the fields of one inheritance level ended.
enum LevelEnd {
    Eof,
    Terminator,
    Header(ObjectMeta),
}

/// State of one decode call.
///
/// Phase 1 scans the top-level records, creates one default instance per
/// persistent id and remembers where each record starts. Phase 2 fills the
/// objects in id order. A reference receives the shared instance right
/// away, whether or not it is filled yet.
pub(super) struct Decoder<'r, R> {
    registry: &'r TypeRegistry,
    reader: StreamReader<R>,
    file: Option<Arc<Path>>,
    objects: BTreeMap<u32, DecodedObject>,
    root: Option<u32>,
    /// The object being filled.
    current: u32,
    edges: StrongEdges,
}

impl<'r, R: Read + Seek> Decoder<'r, R> {
    pub fn new(
        registry: &'r TypeRegistry,
        input: R,
        file: Option<Arc<Path>>,
    ) -> Result<Self, SerialError> {
        Ok(Self {
            registry,
            reader: StreamReader::new(input)?,
            file,
            objects: BTreeMap::new(),
            root: None,
            current: 0,
            edges: StrongEdges::default(),
        })
    }

    pub fn run(mut self, ctx: &mut SerializationContext) -> Result<Option<ObjectRef>, SerialError> {
        self.scan(ctx)?;

        let ids: Vec<u32> = self.objects.keys().copied().collect();
        for id in ids {
            self.decode_object(id, ctx)?;
        }
        for id in self.edges.cycle_targets() {
            if let Some(entry) = self.objects.get(&id) {
                ctx.warn(Warning::CircularReference {
                    type_name: entry.type_name,
                });
            }
        }
        log::debug!("decoded {} objects", self.objects.len());

        let root = self.root.and_then(|id| self.objects.get(&id));
        Ok(root.map(|entry| entry.object.clone()))
    }

    fn header(&mut self, word0: u32) -> Result<ObjectMeta, SerialError> {
        let word1 = self.reader.word()?;
        Ok(ObjectMeta::from_words(word0, word1)?)
    }

    fn scan(&mut self, ctx: &mut SerializationContext) -> Result<(), SerialError> {
        let Some(word0) = self.reader.next_word()? else {
            return Ok(());
        };
        let mut next = Some(self.header(word0)?);

        while let Some(meta) = next {
            let [word0, _] = meta.to_words();
            if meta.is_base {
                return Err(malformed(word0, "base-class header outside of an object"));
            }
            if meta.object_id == 0 {
                return Err(malformed(word0, "top-level object without persistent id"));
            }

            let value = self.registry.create_instance(meta.type_id)?;
            let entry = DecodedObject {
                type_name: value.type_name(),
                object: ObjectRef::from_boxed(value),
                meta,
                offset: self.reader.position(),
            };
            if self.objects.insert(meta.object_id, entry).is_some() {
                return Err(malformed(word0, "duplicate persistent id"));
            }
            self.root.get_or_insert(meta.object_id);

            next = self.read_record(meta, None, false, ctx)?;
        }
        Ok(())
    }

    fn decode_object(&mut self, id: u32, ctx: &mut SerializationContext) -> Result<(), SerialError> {
        let Some(entry) = self.objects.get(&id) else {
            return Ok(());
        };
        let (object, meta, offset) = (entry.object.clone(), entry.meta, entry.offset);
        log::trace!("decoding object {id} (`{}`)", entry.type_name);

        self.current = id;
        self.reader.seek_to(offset)?;
        let mut guard = object.write();
        self.read_record(meta, Some(&mut **guard), false, ctx)?;
        Ok(())
    }

    fn resolve(
        &mut self,
        id: u32,
        weak: bool,
        ctx: &mut SerializationContext,
    ) -> Result<Option<ObjectRef>, SerialError> {
        if id == 0 {
            return Ok(None);
        }
        let Some(entry) = self.objects.get(&id) else {
            ctx.warn(Warning::MissingReference { object_id: id });
            return Ok(None);
        };
        if !weak {
            self.edges.insert(self.current, id);
        }
        Ok(Some(entry.object.clone()))
    }

    /// Reads all levels of one record starting after its first header.
    ///
    /// Without a target the fields are skipped. Returns the header of the
    /// next top-level record, if any.
    fn read_record(
        &mut self,
        first: ObjectMeta,
        mut target: Option<&mut dyn Reflect>,
        embedded: bool,
        ctx: &mut SerializationContext,
    ) -> Result<Option<ObjectMeta>, SerialError> {
        if let Some(object) = target.as_deref()
            && object.descriptor().id() != first.type_id
        {
            ctx.warn(Warning::TypeMismatch {
                expected: object.type_name(),
                found: first.type_id,
            });
            target = None;
        }

        let chain: Vec<&'static TypeDescriptor> = match target.as_deref() {
            Some(object) => object.descriptor().chain().collect(),
            None => Vec::new(),
        };
        let mut schemas: Vec<SchemaInstance> = chain.iter().map(|d| d.instantiate()).collect();

        if let Some(object) = target.as_deref_mut() {
            for (depth, &descriptor) in chain.iter().enumerate().rev() {
                let level = crate::level_mut(object, depth, descriptor)?;
                schemas[depth].deserialization_started(level, ctx);
            }
        }

        let mut meta = first;
        let next = loop {
            let depth = chain.iter().position(|d| d.id() == meta.type_id);
            if depth.is_none() && target.is_some() {
                log::debug!("skipping unknown base level {} of `{}`", meta.type_id, chain[0].name());
            }

            let end = loop {
                let Some(word) = self.reader.next_word()? else {
                    break LevelEnd::Eof;
                };
                if ObjectMeta::is_object_word(word) {
                    break LevelEnd::Header(self.header(word)?);
                }
                let field_meta = FieldMeta::from_word(word)?;
                if field_meta.is_terminator() {
                    break LevelEnd::Terminator;
                }

                let live = depth.zip(target.as_deref_mut()).and_then(|(depth, object)| {
                    let descriptor = chain[depth];
                    descriptor
                        .field(field_meta.field_id)
                        .map(|field| (depth, descriptor, field, object))
                });
                match live {
                    Some((depth, descriptor, field, object)) => {
                        let level = crate::level_mut(object, depth, descriptor)?;
                        self.read_field(field, field_meta, &mut schemas[depth], level, ctx)?;
                    }
                    None => {
                        if depth.is_some() {
                            log::debug!(
                                "skipping unknown field {} of `{}`",
                                field_meta.field_id,
                                chain[0].name()
                            );
                        }
                        self.skip_field(field_meta, ctx)?;
                    }
                }
            };

            match end {
                LevelEnd::Eof if embedded => return Err(StreamError::UnexpectedEof.into()),
                LevelEnd::Eof => break None,
                LevelEnd::Terminator if embedded => break None,
                LevelEnd::Terminator => {
                    return Err(malformed(
                        FieldMeta::TERMINATOR.to_word(),
                        "terminator outside of an embedded value",
                    ));
                }
                LevelEnd::Header(header) if header.is_base => {
                    if header.object_id != first.object_id {
                        return Err(malformed(header.to_words()[0], "base-class header of another object"));
                    }
                    meta = header;
                }
                LevelEnd::Header(header) if embedded => {
                    return Err(malformed(header.to_words()[0], "object header inside an embedded value"));
                }
                LevelEnd::Header(header) => break Some(header),
            }
        };

        if let Some(object) = target {
            for (depth, &descriptor) in chain.iter().enumerate().rev() {
                let level = crate::level_mut(object, depth, descriptor)?;
                schemas[depth].deserialization_ended(level, ctx);
            }
        }
        Ok(next)
    }

    fn read_field(
        &mut self,
        field: &FieldDescriptor,
        meta: FieldMeta,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let type_name = schema.descriptor().name();
        let field_name = field.name();
        let mismatch = |mismatch: FieldMismatch| SchemaError::FieldMismatch {
            type_name,
            field_id: field.id(),
            mismatch,
        };
        let wrap = |source: FieldError| SchemaError::Field {
            type_name,
            field: field_name,
            source,
        };

        let kind = meta.kind()?;
        if kind != field.kind() {
            return Err(mismatch(FieldMismatch::Kind {
                stream: kind,
                schema: field.kind(),
            })
            .into());
        }
        if meta.is_array() != field.is_array() {
            return Err(mismatch(FieldMismatch::Array {
                stream: meta.is_array(),
                schema: field.is_array(),
            })
            .into());
        }
        let dynamic = field.has_dynamic_size();
        if meta.is_dynamic() != dynamic || (!dynamic && meta.size != field.type_size()) {
            return Err(mismatch(FieldMismatch::Size {
                stream: meta.size,
                schema: field.type_size(),
            })
            .into());
        }

        let len = if field.is_array() {
            self.reader.word()? as usize
        } else {
            1
        };

        match field.accessor() {
            FieldAccessor::Plain(access) => {
                if field.is_array() {
                    access.set_len(schema, object, len).map_err(wrap)?;
                }
                for index in 0..len {
                    let bytes = if dynamic {
                        self.reader.dynamic_payload()?
                    } else {
                        self.reader.bytes(meta.size as u64)?
                    };
                    access.read(schema, object, index, &bytes).map_err(wrap)?;
                }
            }
            FieldAccessor::DataBlock(access) => {
                let size = self.reader.word()?;
                let block = match &self.file {
                    Some(path) => {
                        let offset = self.reader.position();
                        self.reader.skip(size as u64)?;
                        DataBlock::from_file_region(path.clone(), offset, u64::from(size))
                    }
                    None => DataBlock::from(self.reader.bytes(size as u64)?),
                };
                access.set(schema, object, block).map_err(wrap)?;
            }
            FieldAccessor::Reflectable(access) => {
                if field.is_array() {
                    access.set_len(schema, object, len).map_err(wrap)?;
                }
                for index in 0..len {
                    let header = self.embedded_header()?;
                    let child = access.get_mut(schema, object, index).map_err(wrap)?;
                    self.read_record(header, Some(child), true, ctx)?;
                }
            }
            FieldAccessor::ReflectablePtr(access) => {
                if field.is_array() {
                    access.set_len(schema, object, len).map_err(wrap)?;
                }
                for index in 0..len {
                    let id = self.reader.word()?;
                    let value = self.resolve(id, field.is_weak(), ctx)?;
                    access.set(schema, object, index, value).map_err(wrap)?;
                }
            }
        }
        Ok(())
    }

    fn embedded_header(&mut self) -> Result<ObjectMeta, SerialError> {
        let word0 = self.reader.word()?;
        let header = self.header(word0)?;
        if header.is_base || header.object_id != 0 {
            return Err(malformed(word0, "expected the header of an embedded value"));
        }
        Ok(header)
    }

    fn skip_field(&mut self, meta: FieldMeta, ctx: &mut SerializationContext) -> Result<(), SerialError> {
        let len = if meta.is_array() {
            self.reader.word()? as u64
        } else {
            1
        };
        match meta.kind()? {
            FieldKind::Plain if meta.is_dynamic() => {
                for _ in 0..len {
                    let size = self.reader.word()?;
                    if (size as usize) < SIZE_PREFIX_LEN {
                        return Err(malformed(size, "dynamic payload smaller than its size prefix"));
                    }
                    self.reader.skip(size as u64 - SIZE_PREFIX_LEN as u64)?;
                }
            }
            FieldKind::Plain => self.reader.skip(len * meta.size as u64)?,
            FieldKind::ReflectablePtr => self.reader.skip(len * 4)?,
            FieldKind::DataBlock => {
                for _ in 0..len {
                    let size = self.reader.word()?;
                    self.reader.skip(size as u64)?;
                }
            }
            FieldKind::Reflectable => {
                for _ in 0..len {
                    let header = self.embedded_header()?;
                    self.read_record(header, None, true, ctx)?;
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

    use vc_reflect::derive::Reflect;
    use vc_reflect::descriptor::{DescriptorCell, FieldDescriptor, SchemaInstance, TypeDescriptor};
    use vc_reflect::registry::TypeRegistry;
    use vc_reflect::{
        DataBlock, FieldMismatch, ObjectRef, Reflect, SchemaError, SerializationContext, Typed, Warning,
    };

    use crate::binary::memory::{decode_from_slice, encode_to_vec};
    use crate::binary::{BinarySerializer, FieldMeta, ObjectMeta};
    use crate::{SerialError, StreamError};

    #[derive(Reflect, Default)]
    #[reflect(id = 0x701)]
    struct Inner {
        #[reflect(id = 0)]
        x: i8,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x700)]
    struct Sample {
        #[reflect(id = 0)]
        a: u32,
        #[reflect(id = 1)]
        name: String,
        #[reflect(id = 2, array)]
        values: Vec<u16>,
        #[reflect(id = 3)]
        blob: DataBlock,
        #[reflect(id = 4, reflectable)]
        inner: Inner,
        #[reflect(id = 5)]
        link: Option<ObjectRef>,
    }

    /// `Sample` as seen by an older schema.
    #[derive(Reflect, Default)]
    #[reflect(id = 0x700)]
    struct Narrow {
        #[reflect(id = 0)]
        a: u32,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x700)]
    struct Wide {
        #[reflect(id = 0)]
        a: u64,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x702)]
    struct Link {
        #[reflect(id = 0)]
        next: Option<ObjectRef>,
    }

    #[derive(Default)]
    struct Shape {
        area: u32,
    }

    #[derive(Default)]
    struct Circle {
        shape: Shape,
        radius: u32,
    }

    fn record(ctx: &mut SerializationContext, event: &'static str) {
        if let Some(events) = ctx.user_data_mut::<Vec<&'static str>>() {
            events.push(event);
        }
    }

    fn shape_started(_: &mut SchemaInstance, _: &mut dyn Reflect, ctx: &mut SerializationContext) {
        record(ctx, "shape started");
    }

    fn shape_ended(_: &mut SchemaInstance, _: &mut dyn Reflect, ctx: &mut SerializationContext) {
        record(ctx, "shape ended");
    }

    fn circle_started(_: &mut SchemaInstance, _: &mut dyn Reflect, ctx: &mut SerializationContext) {
        record(ctx, "circle started");
    }

    fn circle_ended(_: &mut SchemaInstance, _: &mut dyn Reflect, ctx: &mut SerializationContext) {
        record(ctx, "circle ended");
    }

    impl Reflect for Shape {
        fn descriptor(&self) -> &'static TypeDescriptor {
            Self::type_descriptor()
        }
    }

    impl Typed for Shape {
        fn type_descriptor() -> &'static TypeDescriptor {
            static CELL: DescriptorCell = DescriptorCell::new();
            CELL.get_or_init(|| {
                TypeDescriptor::builder::<Self>(0x703, "Shape")
                    .field(FieldDescriptor::plain::<Self, u32>(0, "area", |s| &s.area, |s| &mut s.area))
                    .with_factory()
                    .on_deserialization_started(shape_started)
                    .on_deserialization_ended(shape_ended)
                    .build()
            })
        }
    }

    impl Reflect for Circle {
        fn descriptor(&self) -> &'static TypeDescriptor {
            Self::type_descriptor()
        }

        fn base(&self) -> Option<&dyn Reflect> {
            Some(&self.shape)
        }

        fn base_mut(&mut self) -> Option<&mut dyn Reflect> {
            Some(&mut self.shape)
        }
    }

    impl Typed for Circle {
        fn type_descriptor() -> &'static TypeDescriptor {
            static CELL: DescriptorCell = DescriptorCell::new();
            CELL.get_or_init(|| {
                TypeDescriptor::builder::<Self>(0x704, "Circle")
                    .base::<Shape>()
                    .field(FieldDescriptor::plain::<Self, u32>(0, "radius", |c| &c.radius, |c| &mut c.radius))
                    .with_factory()
                    .on_deserialization_started(circle_started)
                    .on_deserialization_ended(circle_ended)
                    .build()
            })
        }
    }

    fn registry<T: Typed>() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<T>().unwrap();
        registry
    }

    fn sample_bytes() -> Vec<u8> {
        let sample = ObjectRef::new(Sample {
            a: 7,
            name: "seven".into(),
            values: vec![1, 2, 3],
            blob: DataBlock::from(vec![9; 16]),
            inner: Inner { x: -3 },
            link: Some(ObjectRef::new(Sample::default())),
        });
        encode_to_vec(&registry::<Sample>(), &sample, &mut SerializationContext::new()).unwrap()
    }

    fn link_stream(records: &[(u32, u32, bool, u32)]) -> Vec<u8> {
        let field = FieldMeta::for_field(Link::type_descriptor().field(0).unwrap());
        let mut bytes = Vec::new();
        for &(object_id, type_id, is_base, next) in records {
            bytes.extend_from_slice(&ObjectMeta::new(object_id, type_id, is_base).unwrap().to_bytes());
            bytes.extend_from_slice(&field.to_word().to_le_bytes());
            bytes.extend_from_slice(&next.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn full_round_trip() {
        let bytes = sample_bytes();
        let mut ctx = SerializationContext::new();
        let copy = decode_from_slice(&registry::<Sample>(), &bytes, &mut ctx)
            .unwrap()
            .unwrap();

        copy.with(|s: &Sample| {
            assert_eq!(s.a, 7);
            assert_eq!(s.name, "seven");
            assert_eq!(s.values, [1, 2, 3]);
            assert_eq!(s.blob.as_bytes().unwrap(), [9; 16]);
            assert_eq!(s.inner.x, -3);
            assert!(s.link.as_ref().unwrap().is::<Sample>());
        })
        .unwrap();
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let bytes = sample_bytes();
        let copy = decode_from_slice(&registry::<Narrow>(), &bytes, &mut SerializationContext::new())
            .unwrap()
            .unwrap();
        assert_eq!(copy.with(|n: &Narrow| n.a), Some(7));
    }

    #[test]
    fn static_size_mismatch_is_fatal() {
        let bytes = sample_bytes();
        let err = decode_from_slice(&registry::<Wide>(), &bytes, &mut SerializationContext::new())
            .unwrap_err();
        assert!(matches!(
            err,
            SerialError::Schema(SchemaError::FieldMismatch {
                field_id: 0,
                mismatch: FieldMismatch::Size { stream: 4, schema: 8 },
                ..
            })
        ));
    }

    #[test]
    fn missing_reference_warns() {
        let bytes = link_stream(&[(1, 0x702, false, 9)]);
        let mut ctx = SerializationContext::new();
        let root = decode_from_slice(&registry::<Link>(), &bytes, &mut ctx)
            .unwrap()
            .unwrap();

        assert_eq!(root.with(|l: &Link| l.next.is_none()), Some(true));
        assert_eq!(ctx.warnings(), [Warning::MissingReference { object_id: 9 }]);
    }

    #[test]
    fn forward_and_backward_references() {
        // 1 -> 3 -> 2 -> 1, written out of order.
        let bytes = link_stream(&[(1, 0x702, false, 3), (2, 0x702, false, 1), (3, 0x702, false, 2)]);
        let mut ctx = SerializationContext::new();
        let one = decode_from_slice(&registry::<Link>(), &bytes, &mut ctx)
            .unwrap()
            .unwrap();

        let next = |o: &ObjectRef| o.with(|l: &Link| l.next.clone()).unwrap().unwrap();
        let three = next(&one);
        let two = next(&three);
        assert!(next(&two).ptr_eq(&one));
        // The non-weak cycle is reported once, where it closes.
        assert_eq!(ctx.warnings().len(), 1);

        two.with_mut(|l: &mut Link| l.next = None);
    }

    #[test]
    fn malformed_streams() {
        let registry = registry::<Link>();
        let decode = |bytes: &[u8]| decode_from_slice(&registry, bytes, &mut SerializationContext::new());

        assert!(decode(&[]).unwrap().is_none());

        let base_first = link_stream(&[(1, 0x702, true, 0)]);
        assert!(matches!(
            decode(&base_first),
            Err(SerialError::Schema(SchemaError::MalformedMetadata { .. }))
        ));

        let duplicate = link_stream(&[(1, 0x702, false, 0), (1, 0x702, false, 0)]);
        assert!(matches!(
            decode(&duplicate),
            Err(SerialError::Schema(SchemaError::MalformedMetadata { .. }))
        ));

        let unknown = link_stream(&[(1, 0x7FF, false, 0)]);
        assert!(matches!(
            decode(&unknown),
            Err(SerialError::Schema(SchemaError::UnknownTypeId(0x7FF)))
        ));

        let mut truncated = link_stream(&[(1, 0x702, false, 0)]);
        truncated.truncate(truncated.len() - 2);
        assert!(matches!(
            decode(&truncated),
            Err(SerialError::Stream(StreamError::Truncated { needed: 4, available: 2 }))
        ));
    }

    #[test]
    fn oversized_data_block_is_truncation() {
        let mut bytes = sample_bytes();
        // The data block length follows the `values` array.
        let marker = 16_u32.to_le_bytes();
        let at = bytes.windows(4).position(|w| w == marker).unwrap();
        bytes[at..at + 4].copy_from_slice(&1000_u32.to_le_bytes());

        let err = decode_from_slice(&registry::<Sample>(), &bytes, &mut SerializationContext::new())
            .unwrap_err();
        assert!(matches!(err, SerialError::Stream(StreamError::Truncated { needed: 1000, .. })));
    }

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn inheritance_levels_round_trip() {
        let registry = registry::<Circle>();
        let circle = ObjectRef::new(Circle {
            shape: Shape { area: 12 },
            radius: 2,
        });
        let bytes = encode_to_vec(&registry, &circle, &mut SerializationContext::new()).unwrap();

        let radius = FieldMeta::for_field(Circle::type_descriptor().field(0).unwrap()).to_word();
        let area = FieldMeta::for_field(Shape::type_descriptor().field(0).unwrap()).to_word();
        assert_eq!(
            words(&bytes),
            [
                (1 << 2) | 0b01, 0x704, radius, 2,
                (1 << 2) | 0b11, 0x703, area, 12,
            ]
        );

        let mut ctx = SerializationContext::new();
        ctx.set_user_data(Vec::<&'static str>::new());
        let copy = decode_from_slice(&registry, &bytes, &mut ctx).unwrap().unwrap();
        assert_eq!(copy.with(|c: &Circle| (c.shape.area, c.radius)), Some((12, 2)));
        assert_eq!(
            ctx.user_data::<Vec<&'static str>>().unwrap(),
            &["shape started", "circle started", "shape ended", "circle ended"]
        );
        assert!(ctx.warnings().is_empty());
    }

    #[test]
    fn base_header_must_match_its_object() {
        let registry = registry::<Circle>();
        let circle = ObjectRef::new(Circle::default());
        let mut bytes = encode_to_vec(&registry, &circle, &mut SerializationContext::new()).unwrap();

        // Renumber the base-class header to object 2.
        let base = ObjectMeta::new(2, 0x703, true).unwrap().to_bytes();
        bytes[16..24].copy_from_slice(&base);
        let err = decode_from_slice(&registry, &bytes, &mut SerializationContext::new()).unwrap_err();
        assert!(matches!(
            err,
            SerialError::Schema(SchemaError::MalformedMetadata {
                reason: "base-class header of another object",
                ..
            })
        ));
    }

    #[test]
    fn file_decoding_keeps_blocks_in_the_file() {
        let path = std::env::temp_dir().join(format!(
            "vc_serial_decode_file_{}.bin",
            std::process::id()
        ));
        std::fs::write(&path, sample_bytes()).unwrap();

        let registry = registry::<Sample>();
        let mut ctx = SerializationContext::new();
        let copy = BinarySerializer::new(&registry)
            .decode_file(&path, &mut ctx)
            .unwrap()
            .unwrap();
        let (blob, a) = copy.with(|s: &Sample| (s.blob.clone(), s.a)).unwrap();
        assert_eq!(a, 7);
        assert!(blob.is_file_backed());
        assert_eq!(blob.len(), 16);
        assert_eq!(blob.to_vec().unwrap(), [9; 16]);
        assert!(ctx.warnings().is_empty());

        std::fs::remove_file(&path).unwrap();
    }
}
