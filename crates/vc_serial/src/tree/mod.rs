//! A format-independent document of an object graph.
//!
//! [`SerializedObjectTree`] mirrors the field values of every object
//! reachable from a root. Objects live in an arena and references between
//! them are [`ObjectHandle`]s, so shared and cyclic references need no
//! special casing. Leaf payloads are owned copies, in the same encoding the
//! binary codec uses for them.
//!
//! Trees are the input and output of the [diff engine](crate::diff).
//!
//! # Examples
//!
//! ```
//! use vc_reflect::{derive::Reflect, registry::TypeRegistry, ObjectRef, SerializationContext};
//! use vc_serial::tree::{SerializedInstance, TreeSerializer};
//!
//! #[derive(Reflect, Default)]
//! #[reflect(id = 60)]
//! struct Label {
//!     #[reflect(id = 0)]
//!     text: String,
//!     #[reflect(id = 1)]
//!     owner: Option<ObjectRef>,
//! }
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<Label>().unwrap();
//!
//! let owner = ObjectRef::new(Label::default());
//! let label = ObjectRef::new(Label { text: "hi".into(), owner: Some(owner) });
//!
//! let serializer = TreeSerializer::new(&registry);
//! let mut ctx = SerializationContext::new();
//!
//! let deep = serializer.to_tree(&label, false, &mut ctx).unwrap();
//! assert_eq!(deep.len(), 2);
//!
//! let shallow = serializer.to_tree(&label, true, &mut ctx).unwrap();
//! assert_eq!(shallow.len(), 1);
//! let owner_entry = &shallow.root().sub_objects[0].entries[&1];
//! assert_eq!(owner_entry, &SerializedInstance::Reference(None));
//!
//! let copy = serializer.from_tree(&deep, &mut ctx).unwrap();
//! assert_eq!(copy.with(|l: &Label| l.text.clone()).unwrap(), "hi");
//! ```

// -----------------------------------------------------------------------------
// Modules

mod serializer;

// -----------------------------------------------------------------------------
// Exports

pub use serializer::TreeSerializer;

pub(crate) use serializer::{mismatch, set_len, shape_mismatch};

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use vc_reflect::descriptor::FieldKind;

// -----------------------------------------------------------------------------
// ObjectHandle

/// Index of an object in a [`SerializedObjectTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// -----------------------------------------------------------------------------
// SerializedObjectTree

/// An arena of serialized objects and the handle of the root.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializedObjectTree {
    pub objects: Vec<SerializedObject>,
    pub root: ObjectHandle,
}

impl SerializedObjectTree {
    /// Returns the root object.
    ///
    /// # Panics
    ///
    /// Panics if `root` is out of range.
    #[inline]
    pub fn root(&self) -> &SerializedObject {
        &self.objects[self.root.index()]
    }

    #[inline]
    pub fn get(&self, handle: ObjectHandle) -> Option<&SerializedObject> {
        self.objects.get(handle.index())
    }

    /// Number of objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Handles of all objects in arena order.
    pub fn handles(&self) -> impl ExactSizeIterator<Item = ObjectHandle> + use<> {
        (0..self.objects.len() as u32).map(ObjectHandle)
    }
}

// -----------------------------------------------------------------------------
// SerializedObject

/// One object, as one sub-object per inheritance level, most-derived first.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializedObject {
    pub sub_objects: Vec<SerializedSubObject>,
}

impl SerializedObject {
    /// The most-derived type id.
    #[inline]
    pub fn type_id(&self) -> Option<u32> {
        self.sub_objects.first().map(|sub| sub.type_id)
    }

    pub fn sub_object(&self, type_id: u32) -> Option<&SerializedSubObject> {
        self.sub_objects.iter().find(|sub| sub.type_id == type_id)
    }
}

/// The fields one inheritance level declares, keyed by field id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializedSubObject {
    pub type_id: u32,
    pub entries: BTreeMap<u16, SerializedInstance>,
}

impl SerializedSubObject {
    #[inline]
    pub fn new(type_id: u32) -> Self {
        Self {
            type_id,
            entries: BTreeMap::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// SerializedInstance

/// The value of one field, or of one array element.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SerializedInstance {
    Field(SerializedField),
    Array(SerializedArray),
    DataBlock(SerializedDataBlock),
    /// An embedded value.
    Object(Box<SerializedObject>),
    /// A reference to another object of the tree.
    Reference(Option<ObjectHandle>),
}

impl SerializedInstance {
    /// The field kind this value belongs to, `None` for arrays.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Self::Field(_) => Some(FieldKind::Plain),
            Self::Array(_) => None,
            Self::DataBlock(_) => Some(FieldKind::DataBlock),
            Self::Object(_) => Some(FieldKind::Reflectable),
            Self::Reference(_) => Some(FieldKind::ReflectablePtr),
        }
    }
}

/// The encoded bytes of a plain value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializedField {
    pub bytes: Vec<u8>,
}

/// Array elements keyed by index. Indices may be missing in diffs.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializedArray {
    pub len: u32,
    pub entries: BTreeMap<u32, SerializedInstance>,
}

/// A copy of a data block's content.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerializedDataBlock {
    pub data: Arc<[u8]>,
}

impl Default for SerializedDataBlock {
    fn default() -> Self {
        Self {
            data: Arc::from(Vec::new()),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(all(test, feature = "serde"))]
mod tests {
    use vc_reflect::derive::Reflect;
    use vc_reflect::registry::TypeRegistry;
    use vc_reflect::{DataBlock, ObjectRef, SerializationContext};

    use super::{SerializedObjectTree, TreeSerializer};

    #[derive(Reflect, Default)]
    #[reflect(id = 0x810)]
    struct Track {
        #[reflect(id = 0)]
        title: String,
        #[reflect(id = 1, array)]
        beats: Vec<u16>,
        #[reflect(id = 2)]
        sample: DataBlock,
        #[reflect(id = 3, weak)]
        next: Option<ObjectRef>,
    }

    fn sample_tree() -> (TypeRegistry, SerializedObjectTree) {
        let mut registry = TypeRegistry::new();
        registry.register::<Track>().unwrap();

        let first = ObjectRef::new(Track {
            title: "intro".into(),
            beats: vec![1, 2, 4],
            sample: DataBlock::from(vec![7; 5]),
            next: None,
        });
        let second = ObjectRef::new(Track {
            title: "outro".into(),
            next: Some(first.clone()),
            ..Default::default()
        });
        first.with_mut(|t: &mut Track| t.next = Some(second.clone()));

        let tree = TreeSerializer::new(&registry)
            .to_tree(&first, false, &mut SerializationContext::new())
            .unwrap();
        first.with_mut(|t: &mut Track| t.next = None);
        (registry, tree)
    }

    #[test]
    fn json_persistence() {
        let (registry, tree) = sample_tree();
        let text = serde_json::to_string(&tree).unwrap();
        let back: SerializedObjectTree = serde_json::from_str(&text).unwrap();
        assert_eq!(back, tree);

        let mut ctx = SerializationContext::new();
        let graph = TreeSerializer::new(&registry).from_tree(&back, &mut ctx).unwrap();
        assert!(ctx.warnings().is_empty());
        let next = graph.with(|t: &Track| t.next.clone().unwrap()).unwrap();
        let back_link = next.with(|t: &Track| t.next.clone().unwrap()).unwrap();
        assert!(back_link.ptr_eq(&graph));
        graph.with_mut(|t: &mut Track| t.next = None);
    }

    #[test]
    fn ron_persistence() {
        let (_, tree) = sample_tree();
        let text = ron::ser::to_string_pretty(&tree, ron::ser::PrettyConfig::default()).unwrap();
        let back: SerializedObjectTree = ron::from_str(&text).unwrap();
        assert_eq!(back, tree);
    }
}
