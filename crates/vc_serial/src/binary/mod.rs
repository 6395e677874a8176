//! The binary codec.
//!
//! # Layout
//!
//! A stream is a sequence of object records, the root first. A record
//! starts with an [`ObjectMeta`] header for the most-derived type, followed
//! by that level's fields, then a header flagged as base class and the
//! fields of the next level, down to the root of the inheritance chain.
//!
//! Each field is a [`FieldMeta`] word and its payload:
//!
//! - arrays carry a `u32` element count first;
//! - plain values are fixed width, or size-prefixed when dynamic;
//! - data blocks are a `u32` byte length and the raw bytes;
//! - references are the `u32` persistent id of the target, `0` for none;
//! - embedded values are nested records with persistent id `0`, closed by
//!   [`FieldMeta::TERMINATOR`].
//!
//! All words are little-endian.
//!
//! Every referenced object is written once, the first reference assigns its
//! persistent id. Decoding creates all objects before filling any of them,
//! so references resolve regardless of order, cycles included.

// -----------------------------------------------------------------------------
// Modules

mod decoder;
mod encoder;
mod flush;
mod meta;

pub mod memory;

// -----------------------------------------------------------------------------
// Exports

pub use flush::FlushBuffer;
pub use meta::{FieldMeta, FieldMetaFlags, MAX_OBJECT_ID, ObjectMeta};

use alloc::sync::Arc;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use vc_reflect::registry::TypeRegistry;
use vc_reflect::{ObjectRef, Reflect, SerializationContext};

use crate::SerialError;

// -----------------------------------------------------------------------------
// EncodeOptions

/// Options of [`BinarySerializer::encode_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Write every reference as "no reference" and do not follow it.
    pub shallow: bool,
}

// -----------------------------------------------------------------------------
// BinarySerializer

/// Encodes and decodes object graphs in the binary format.
///
/// Decoding creates objects through the registry, so every type that can
/// appear in a stream must be registered.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use vc_reflect::{derive::Reflect, registry::TypeRegistry, ObjectRef, SerializationContext};
/// use vc_serial::binary::BinarySerializer;
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 40)]
/// struct Pair {
///     #[reflect(id = 0)]
///     left: Option<ObjectRef>,
///     #[reflect(id = 1)]
///     right: Option<ObjectRef>,
///     #[reflect(id = 2)]
///     tag: String,
/// }
///
/// let mut registry = TypeRegistry::new();
/// registry.register::<Pair>().unwrap();
///
/// let shared = ObjectRef::new(Pair { tag: "leaf".into(), ..Default::default() });
/// let root = ObjectRef::new(Pair {
///     left: Some(shared.clone()),
///     right: Some(shared),
///     tag: "root".into(),
/// });
///
/// let serializer = BinarySerializer::new(&registry);
/// let mut ctx = SerializationContext::new();
///
/// let mut bytes = Vec::new();
/// let count = serializer.encode(&root, &mut bytes, &mut ctx).unwrap();
/// assert_eq!(count, bytes.len() as u64);
///
/// let copy = serializer.decode(Cursor::new(bytes), &mut ctx).unwrap().unwrap();
/// let (left, right) = copy
///     .with(|p: &Pair| (p.left.clone().unwrap(), p.right.clone().unwrap()))
///     .unwrap();
/// assert!(left.ptr_eq(&right));
/// assert_eq!(left.with(|p: &Pair| p.tag.clone()).unwrap(), "leaf");
/// ```
#[derive(Clone, Copy)]
pub struct BinarySerializer<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> BinarySerializer<'r> {
    #[inline]
    pub const fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    #[inline]
    pub const fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Writes `root` and every object reachable through references.
    ///
    /// Returns the number of bytes written.
    #[inline]
    pub fn encode(
        &self,
        root: &ObjectRef,
        out: impl Write,
        ctx: &mut SerializationContext,
    ) -> Result<u64, SerialError> {
        self.encode_with(root, out, EncodeOptions::default(), ctx)
    }

    pub fn encode_with(
        &self,
        root: &ObjectRef,
        out: impl Write,
        options: EncodeOptions,
        ctx: &mut SerializationContext,
    ) -> Result<u64, SerialError> {
        encoder::Encoder::new(self.registry, out, options).encode_object(root, ctx)
    }

    /// Writes a value that is not behind an [`ObjectRef`].
    ///
    /// The value becomes the root record, keyed by its own address.
    pub fn encode_value(
        &self,
        root: &mut dyn Reflect,
        out: impl Write,
        options: EncodeOptions,
        ctx: &mut SerializationContext,
    ) -> Result<u64, SerialError> {
        encoder::Encoder::new(self.registry, out, options).encode_value(root, ctx)
    }

    /// Reads a stream written by [`encode`](Self::encode).
    ///
    /// Returns `None` for an empty stream. Data blocks are copied into memory.
    pub fn decode(
        &self,
        input: impl Read + Seek,
        ctx: &mut SerializationContext,
    ) -> Result<Option<ObjectRef>, SerialError> {
        decoder::Decoder::new(self.registry, input, None)?.run(ctx)
    }

    /// Reads a stream from a file.
    ///
    /// Data blocks stay in the file and are read on demand, see
    /// [`DataBlock::open`](vc_reflect::DataBlock::open).
    pub fn decode_file(
        &self,
        path: impl AsRef<Path>,
        ctx: &mut SerializationContext,
    ) -> Result<Option<ObjectRef>, SerialError> {
        let path: Arc<Path> = Arc::from(path.as_ref());
        let file = BufReader::new(File::open(&path)?);
        decoder::Decoder::new(self.registry, file, Some(path))?.run(ctx)
    }
}
