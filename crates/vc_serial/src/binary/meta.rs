use bitflags::bitflags;
use vc_reflect::SchemaError;
use vc_reflect::descriptor::{FieldDescriptor, FieldKind};

use crate::StreamError;

/// Largest persistent id an [`ObjectMeta`] can carry.
pub const MAX_OBJECT_ID: u32 = (1 << 30) - 1;

const OBJECT_MARKER: u32 = 0b01;
const IS_BASE: u32 = 0b10;

// -----------------------------------------------------------------------------
// ObjectMeta

/// The two-word header of one inheritance level of an object record.
///
/// Word 0 holds the object marker in bit 0, the base-class flag in bit 1
/// and the persistent id in bits 2 to 31. Word 1 is the type id. Embedded
/// values use the persistent id `0`.
///
/// # Examples
///
/// ```
/// use vc_serial::binary::ObjectMeta;
///
/// let meta = ObjectMeta::new(3, 1000, true).unwrap();
/// assert_eq!(meta.to_words(), [(3 << 2) | 0b11, 1000]);
///
/// let [word0, word1] = meta.to_words();
/// assert_eq!(ObjectMeta::from_words(word0, word1).unwrap(), meta);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub object_id: u32,
    pub type_id: u32,
    pub is_base: bool,
}

impl ObjectMeta {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    /// Creates a header, rejecting ids beyond [`MAX_OBJECT_ID`].
    pub fn new(object_id: u32, type_id: u32, is_base: bool) -> Result<Self, StreamError> {
        if object_id > MAX_OBJECT_ID {
            return Err(StreamError::ObjectIdOverflow(object_id as u64));
        }
        Ok(Self {
            object_id,
            type_id,
            is_base,
        })
    }

    /// Returns `true` if `word` starts an object header rather than a field.
    #[inline]
    pub const fn is_object_word(word: u32) -> bool {
        word & OBJECT_MARKER != 0
    }

    #[inline]
    pub const fn to_words(self) -> [u32; 2] {
        let base = if self.is_base { IS_BASE } else { 0 };
        [(self.object_id << 2) | base | OBJECT_MARKER, self.type_id]
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let [word0, word1] = self.to_words();
        let mut bytes = [0; Self::SIZE];
        bytes[..4].copy_from_slice(&word0.to_le_bytes());
        bytes[4..].copy_from_slice(&word1.to_le_bytes());
        bytes
    }

    pub fn from_words(word0: u32, word1: u32) -> Result<Self, SchemaError> {
        if !Self::is_object_word(word0) {
            return Err(SchemaError::MalformedMetadata {
                word: word0,
                reason: "expected an object header",
            });
        }
        Ok(Self {
            object_id: word0 >> 2,
            type_id: word1,
            is_base: word0 & IS_BASE != 0,
        })
    }
}

// -----------------------------------------------------------------------------
// FieldMeta

bitflags! {
    /// Flag bits of a [`FieldMeta`] word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldMetaFlags: u8 {
        const ARRAY = 1 << 1;
        const DATA_BLOCK = 1 << 2;
        const REFLECTABLE = 1 << 3;
        const REFLECTABLE_PTR = 1 << 4;
        const DYNAMIC_SIZE = 1 << 5;
        const TERMINATOR = 1 << 6;
    }
}

const KIND_BITS: FieldMetaFlags = FieldMetaFlags::DATA_BLOCK
    .union(FieldMetaFlags::REFLECTABLE)
    .union(FieldMetaFlags::REFLECTABLE_PTR);

/// The one-word header of a field.
///
/// Bit 0 is clear, bits 1 to 6 hold [`FieldMetaFlags`], bits 8 to 15 the
/// static size of one element and bits 16 to 31 the field id. The kind is
/// plain when none of the kind bits is set.
///
/// # Examples
///
/// ```
/// use vc_reflect::descriptor::FieldKind;
/// use vc_serial::binary::{FieldMeta, FieldMetaFlags};
///
/// let meta = FieldMeta::from_word(0x0003_0412).unwrap();
/// assert_eq!(meta.field_id, 3);
/// assert_eq!(meta.size, 4);
/// assert!(meta.flags.contains(FieldMetaFlags::ARRAY));
/// assert_eq!(meta.kind().unwrap(), FieldKind::ReflectablePtr);
///
/// assert!(FieldMeta::from_word(FieldMeta::TERMINATOR.to_word()).unwrap().is_terminator());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    pub field_id: u16,
    pub size: u8,
    pub flags: FieldMetaFlags,
}

impl FieldMeta {
    /// Closes an embedded value.
    pub const TERMINATOR: Self = Self {
        field_id: 0,
        size: 0,
        flags: FieldMetaFlags::TERMINATOR,
    };

    /// The header describing `field` in the live schema.
    pub fn for_field(field: &FieldDescriptor) -> Self {
        let mut flags = match field.kind() {
            FieldKind::Plain => FieldMetaFlags::empty(),
            FieldKind::Reflectable => FieldMetaFlags::REFLECTABLE,
            FieldKind::ReflectablePtr => FieldMetaFlags::REFLECTABLE_PTR,
            FieldKind::DataBlock => FieldMetaFlags::DATA_BLOCK,
        };
        flags.set(FieldMetaFlags::ARRAY, field.is_array());
        flags.set(FieldMetaFlags::DYNAMIC_SIZE, field.has_dynamic_size());
        Self {
            field_id: field.id(),
            size: field.type_size(),
            flags,
        }
    }

    #[inline]
    pub const fn to_word(self) -> u32 {
        ((self.field_id as u32) << 16) | ((self.size as u32) << 8) | self.flags.bits() as u32
    }

    pub fn from_word(word: u32) -> Result<Self, SchemaError> {
        if ObjectMeta::is_object_word(word) {
            return Err(SchemaError::MalformedMetadata {
                word,
                reason: "expected a field header",
            });
        }
        let Some(flags) = FieldMetaFlags::from_bits(word as u8) else {
            return Err(SchemaError::MalformedMetadata {
                word,
                reason: "unknown field flag",
            });
        };
        let meta = Self {
            field_id: (word >> 16) as u16,
            size: (word >> 8) as u8,
            flags,
        };
        meta.kind()?;
        Ok(meta)
    }

    /// Returns the field kind encoded in the flags.
    ///
    /// More than one kind bit is malformed.
    pub fn kind(&self) -> Result<FieldKind, SchemaError> {
        let kind = self.flags.intersection(KIND_BITS);
        if kind.is_empty() {
            Ok(FieldKind::Plain)
        } else if kind == FieldMetaFlags::DATA_BLOCK {
            Ok(FieldKind::DataBlock)
        } else if kind == FieldMetaFlags::REFLECTABLE {
            Ok(FieldKind::Reflectable)
        } else if kind == FieldMetaFlags::REFLECTABLE_PTR {
            Ok(FieldKind::ReflectablePtr)
        } else {
            Err(SchemaError::MalformedMetadata {
                word: self.to_word(),
                reason: "conflicting field kinds",
            })
        }
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.flags.contains(FieldMetaFlags::ARRAY)
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(FieldMetaFlags::DYNAMIC_SIZE)
    }

    #[inline]
    pub fn is_terminator(&self) -> bool {
        self.flags.contains(FieldMetaFlags::TERMINATOR)
    }
}

// -----------------------------------------------------------------------------
// Tests
