//! Deep and shallow copies of reflectable objects.
//!
//! Both go through the binary codec. A deep copy duplicates every object
//! reachable through references and keeps the sharing between them. A
//! shallow copy duplicates only the value itself, its references keep
//! pointing at the original targets.
//!
//! # Examples
//!
//! ```
//! use vc_reflect::{derive::Reflect, registry::TypeRegistry, ObjectRef, SerializationContext};
//! use vc_serial::clone::BinaryCloner;
//!
//! #[derive(Reflect, Default)]
//! #[reflect(id = 70)]
//! struct Folder {
//!     #[reflect(id = 0)]
//!     title: String,
//!     #[reflect(id = 1)]
//!     parent: Option<ObjectRef>,
//! }
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<Folder>().unwrap();
//!
//! let parent = ObjectRef::new(Folder { title: "home".into(), parent: None });
//! let folder = ObjectRef::new(Folder { title: "docs".into(), parent: Some(parent.clone()) });
//!
//! let cloner = BinaryCloner::new(&registry);
//! let mut ctx = SerializationContext::new();
//!
//! let shallow = cloner.clone(&folder, true, &mut ctx).unwrap();
//! let same = shallow.with(|f: &Folder| f.parent.clone().unwrap()).unwrap();
//! assert!(same.ptr_eq(&parent));
//!
//! let deep = cloner.clone(&folder, false, &mut ctx).unwrap();
//! let copied = deep.with(|f: &Folder| f.parent.clone().unwrap()).unwrap();
//! assert!(!copied.ptr_eq(&parent));
//! assert_eq!(copied.with(|f: &Folder| f.title.clone()).unwrap(), "home");
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use std::io::Cursor;

use vc_reflect::descriptor::{FieldAccessor, SchemaInstance, TypeDescriptor};
use vc_reflect::registry::TypeRegistry;
use vc_reflect::{ObjectRef, Reflect, SchemaError, SerializationContext};

use crate::SerialError;
use crate::binary::{BinarySerializer, EncodeOptions};

// -----------------------------------------------------------------------------
// ObjectReferenceGraph

/// One recorded reference slot.
struct ReferenceSlot {
    depth: usize,
    field_id: u16,
    index: usize,
    target: Option<ObjectRef>,
}

/// One embedded value and the references recorded inside it.
struct EmbeddedSlot {
    depth: usize,
    field_id: u16,
    index: usize,
    graph: ObjectReferenceGraph,
}

/// Snapshot of every reference an object holds, including weak ones and
/// those inside embedded values.
///
/// Used to give a shallow copy the references of its source.
#[derive(Default)]
pub struct ObjectReferenceGraph {
    references: Vec<ReferenceSlot>,
    embedded: Vec<EmbeddedSlot>,
}

impl ObjectReferenceGraph {
    /// Records the references held by `object`.
    pub fn gather(object: &dyn Reflect) -> Result<Self, SchemaError> {
        let chain: Vec<&'static TypeDescriptor> = object.descriptor().chain().collect();
        let mut graph = Self::default();

        for (depth, &descriptor) in chain.iter().enumerate() {
            let level = crate::level_ref(object, depth, descriptor)?;
            let mut schema = descriptor.instantiate();
            for field in descriptor.fields() {
                let wrap = SchemaError::field(descriptor.name(), field.name());
                match field.accessor() {
                    FieldAccessor::ReflectablePtr(access) => {
                        for index in 0..access.len(&mut schema, level).map_err(wrap)? {
                            graph.references.push(ReferenceSlot {
                                depth,
                                field_id: field.id(),
                                index,
                                target: access.get(&mut schema, level, index).map_err(wrap)?,
                            });
                        }
                    }
                    FieldAccessor::Reflectable(access) => {
                        for index in 0..access.len(&mut schema, level).map_err(wrap)? {
                            let child = access.get(&mut schema, level, index).map_err(wrap)?;
                            graph.embedded.push(EmbeddedSlot {
                                depth,
                                field_id: field.id(),
                                index,
                                graph: Self::gather(child)?,
                            });
                        }
                    }
                    FieldAccessor::Plain(_) | FieldAccessor::DataBlock(_) => {}
                }
            }
        }
        Ok(graph)
    }

    /// Writes the recorded references into `object`.
    ///
    /// `object` must have the type and array lengths of the gathered one.
    pub fn restore(&self, object: &mut dyn Reflect) -> Result<(), SchemaError> {
        let chain: Vec<&'static TypeDescriptor> = object.descriptor().chain().collect();
        let mut schemas: Vec<SchemaInstance> = chain.iter().map(|d| d.instantiate()).collect();

        for slot in self.references.iter().rev() {
            let (Some(&descriptor), Some(schema)) = (chain.get(slot.depth), schemas.get_mut(slot.depth))
            else {
                continue;
            };
            let Some(field) = descriptor.field(slot.field_id) else {
                continue;
            };
            let Some(access) = field.as_reflectable_ptr() else {
                continue;
            };
            let level = crate::level_mut(object, slot.depth, descriptor)?;
            access
                .set(schema, level, slot.index, slot.target.clone())
                .map_err(SchemaError::field(descriptor.name(), field.name()))?;
        }

        for slot in &self.embedded {
            let (Some(&descriptor), Some(schema)) = (chain.get(slot.depth), schemas.get_mut(slot.depth))
            else {
                continue;
            };
            let Some(field) = descriptor.field(slot.field_id) else {
                continue;
            };
            let Some(access) = field.as_reflectable() else {
                continue;
            };
            let level = crate::level_mut(object, slot.depth, descriptor)?;
            let child = access
                .get_mut(schema, level, slot.index)
                .map_err(SchemaError::field(descriptor.name(), field.name()))?;
            slot.graph.restore(child)?;
        }
        Ok(())
    }

    /// Number of recorded reference slots, embedded values included.
    pub fn len(&self) -> usize {
        self.references.len() + self.embedded.iter().map(|e| e.graph.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -----------------------------------------------------------------------------
// BinaryCloner

/// Copies objects by encoding and decoding them.
#[derive(Clone, Copy)]
pub struct BinaryCloner<'r> {
    serializer: BinarySerializer<'r>,
}

impl<'r> BinaryCloner<'r> {
    #[inline]
    pub const fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            serializer: BinarySerializer::new(registry),
        }
    }

    /// Copies the object behind `source`.
    ///
    /// Serialization hooks run on the source and deserialization hooks on
    /// the copy, like any encode and decode.
    pub fn clone(
        &self,
        source: &ObjectRef,
        shallow: bool,
        ctx: &mut SerializationContext,
    ) -> Result<ObjectRef, SerialError> {
        let graph = match shallow {
            true => Some(ObjectReferenceGraph::gather(&**source.read())?),
            false => None,
        };

        let mut bytes = Vec::new();
        let options = EncodeOptions { shallow };
        self.serializer.encode_with(source, &mut bytes, options, ctx)?;
        let copy = self.decode_root(bytes, ctx)?;

        if let Some(graph) = graph {
            graph.restore(&mut **copy.write())?;
        }
        Ok(copy)
    }

    /// Copies a value that is not behind an [`ObjectRef`].
    ///
    /// A deep copy follows the references of `source`, none of them may
    /// lead back to an object the caller keeps locked.
    pub fn clone_value(
        &self,
        source: &mut dyn Reflect,
        shallow: bool,
        ctx: &mut SerializationContext,
    ) -> Result<Box<dyn Reflect>, SerialError> {
        let graph = match shallow {
            true => Some(ObjectReferenceGraph::gather(source)?),
            false => None,
        };

        let mut bytes = Vec::new();
        let options = EncodeOptions { shallow };
        self.serializer.encode_value(source, &mut bytes, options, ctx)?;
        let mut copy = crate::take_object(self.decode_root(bytes, ctx)?)?;

        if let Some(graph) = graph {
            graph.restore(&mut *copy)?;
        }
        Ok(copy)
    }

    fn decode_root(&self, bytes: Vec<u8>, ctx: &mut SerializationContext) -> Result<ObjectRef, SerialError> {
        let root = self.serializer.decode(Cursor::new(bytes), ctx)?;
        root.ok_or_else(|| SchemaError::MalformedMetadata {
            word: 0,
            reason: "clone stream without root object",
        })
        .map_err(SerialError::from)
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use vc_reflect::derive::Reflect;
    use vc_reflect::registry::TypeRegistry;
    use vc_reflect::{ObjectRef, SerializationContext, Typed};

    use super::{BinaryCloner, ObjectReferenceGraph};

    #[derive(Reflect, Default)]
    #[reflect(id = 0x901)]
    struct Socket {
        #[reflect(id = 0)]
        peer: Option<ObjectRef>,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x900)]
    struct Device {
        #[reflect(id = 0)]
        label: String,
        #[reflect(id = 1, reflectable)]
        socket: Socket,
        #[reflect(id = 2, weak)]
        owner: Option<ObjectRef>,
        #[reflect(id = 3)]
        links: Vec<Option<ObjectRef>>,
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<Device>().unwrap();
        registry
    }

    fn device(label: &str) -> ObjectRef {
        ObjectRef::new(Device {
            label: label.into(),
            ..Default::default()
        })
    }

    #[test]
    fn graph_records_every_reference() {
        let peer = device("peer");
        let owner = device("owner");
        let value = Device {
            socket: Socket {
                peer: Some(peer.clone()),
            },
            owner: Some(owner.clone()),
            links: vec![None, Some(peer.clone())],
            ..Default::default()
        };
        let graph = ObjectReferenceGraph::gather(&value).unwrap();
        assert_eq!(graph.len(), 4);

        let mut blank = Device {
            links: vec![None, None],
            ..Default::default()
        };
        graph.restore(&mut blank).unwrap();
        assert!(blank.socket.peer.as_ref().unwrap().ptr_eq(&peer));
        assert!(blank.owner.as_ref().unwrap().ptr_eq(&owner));
        assert!(blank.links[0].is_none());
        assert!(blank.links[1].as_ref().unwrap().ptr_eq(&peer));
    }

    #[test]
    fn shallow_copy_shares_targets() {
        let registry = registry();
        let peer = device("peer");
        let source = ObjectRef::new(Device {
            label: "source".into(),
            socket: Socket {
                peer: Some(peer.clone()),
            },
            links: vec![Some(peer.clone())],
            ..Default::default()
        });
        let copy = BinaryCloner::new(&registry)
            .clone(&source, true, &mut SerializationContext::new())
            .unwrap();

        assert!(!copy.ptr_eq(&source));
        copy.with(|d: &Device| {
            assert_eq!(d.label, "source");
            assert!(d.socket.peer.as_ref().unwrap().ptr_eq(&peer));
            assert!(d.links[0].as_ref().unwrap().ptr_eq(&peer));
        })
        .unwrap();
    }

    #[test]
    fn deep_copy_duplicates_and_keeps_sharing() {
        let registry = registry();
        let peer = device("peer");
        let source = ObjectRef::new(Device {
            socket: Socket {
                peer: Some(peer.clone()),
            },
            links: vec![Some(peer.clone())],
            ..Default::default()
        });
        let copy = BinaryCloner::new(&registry)
            .clone(&source, false, &mut SerializationContext::new())
            .unwrap();

        let (a, b) = copy
            .with(|d: &Device| (d.socket.peer.clone().unwrap(), d.links[0].clone().unwrap()))
            .unwrap();
        assert!(!a.ptr_eq(&peer));
        assert!(a.ptr_eq(&b));
        assert_eq!(a.with(|d: &Device| d.label.clone()).unwrap(), "peer");
    }

    #[test]
    fn deep_copy_of_a_weak_cycle_closes_the_cycle() {
        let registry = registry();
        let owner = device("owner");
        let child = ObjectRef::new(Device {
            owner: Some(owner.clone()),
            ..Default::default()
        });
        owner.with_mut(|d: &mut Device| d.links.push(Some(child.clone())));

        let mut ctx = SerializationContext::new();
        let copy = BinaryCloner::new(&registry).clone(&owner, false, &mut ctx).unwrap();
        assert!(ctx.warnings().is_empty());

        let child_copy = copy.with(|d: &Device| d.links[0].clone().unwrap()).unwrap();
        let back = child_copy.with(|d: &Device| d.owner.clone().unwrap()).unwrap();
        assert!(back.ptr_eq(&copy));
        assert!(!back.ptr_eq(&owner));

        owner.with_mut(|d: &mut Device| d.links.clear());
    }

    #[test]
    fn clone_value_copies_embedded_values() {
        let registry = registry();
        let peer = device("peer");
        let mut socket = Socket { peer: Some(peer.clone()) };
        let cloner = BinaryCloner::new(&registry);
        let mut ctx = SerializationContext::new();

        let copy = cloner.clone_value(&mut socket, true, &mut ctx).unwrap();
        assert_eq!(copy.descriptor().id(), Socket::type_descriptor().id());
        let copy = copy.downcast::<Socket>().ok().unwrap();
        assert!(copy.peer.unwrap().ptr_eq(&peer));

        let deep: Vec<_> = (0..2)
            .map(|_| cloner.clone_value(&mut socket, false, &mut ctx).unwrap())
            .collect();
        let first = deep[0].downcast_ref::<Socket>().unwrap().peer.clone().unwrap();
        assert!(!first.ptr_eq(&peer));
    }
}
