use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;

use vc_reflect::descriptor::{FieldAccessor, FieldDescriptor, SchemaInstance, TypeDescriptor};
use vc_reflect::registry::TypeRegistry;
use vc_reflect::{DataBlock, FieldError, FieldMismatch, ObjectRef, Reflect, SchemaError};
use vc_reflect::{SerializationContext, Warning};
use vc_utils::IdentityMap;

use super::{
    ObjectHandle, SerializedArray, SerializedDataBlock, SerializedField, SerializedInstance,
    SerializedObject, SerializedObjectTree, SerializedSubObject,
};
use crate::cycles::StrongEdges;
use crate::{SerialError, StreamError};

// -----------------------------------------------------------------------------
// TreeSerializer

/// Converts between live object graphs and [`SerializedObjectTree`]s.
pub struct TreeSerializer<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> TreeSerializer<'r> {
    #[inline]
    pub const fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    #[inline]
    pub const fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Captures the graph reachable from `root`.
    ///
    /// The root gets handle 0. With `shallow` set, references are recorded
    /// as empty and only the root is captured.
    pub fn to_tree(
        &self,
        root: &ObjectRef,
        shallow: bool,
        ctx: &mut SerializationContext,
    ) -> Result<SerializedObjectTree, SerialError> {
        let mut writer = TreeWriter {
            registry: self.registry,
            shallow,
            handles: IdentityMap::new(),
            objects: Vec::new(),
            queue: VecDeque::new(),
        };
        let root = writer.handle_of(root)?;
        while let Some((handle, object)) = writer.queue.pop_front() {
            let mut guard = object.write();
            let captured = writer.capture_object(&mut **guard, true, ctx)?;
            writer.objects[handle.index()] = captured;
        }
        log::debug!("captured {} objects into a tree", writer.objects.len());
        Ok(SerializedObjectTree {
            objects: writer.objects,
            root,
        })
    }

    /// Builds a new object graph from `tree` and returns its root.
    ///
    /// Every object of the tree is instantiated first, so an unknown type
    /// id fails before any hook runs.
    pub fn from_tree(
        &self,
        tree: &SerializedObjectTree,
        ctx: &mut SerializationContext,
    ) -> Result<ObjectRef, SerialError> {
        let mut reader = TreeReader::new(self.registry, tree)?;
        for handle in tree.handles() {
            reader.fill(handle, ctx)?;
        }
        for target in reader.edges.cycle_targets() {
            if let Some(slot) = reader.slots.get(target as usize) {
                ctx.warn(Warning::CircularReference {
                    type_name: slot.type_name,
                });
            }
        }
        reader
            .slots
            .get(tree.root.index())
            .map(|slot| slot.object.clone())
            .ok_or_else(|| missing_root(tree))
    }
}

fn missing_root(tree: &SerializedObjectTree) -> SerialError {
    SchemaError::MalformedMetadata {
        word: tree.root.0,
        reason: "root handle outside of the tree",
    }
    .into()
}

fn array_len(len: usize) -> Result<u32, StreamError> {
    u32::try_from(len).map_err(|_| StreamError::LengthOverflow(len as u64))
}

// -----------------------------------------------------------------------------
// TreeWriter

struct TreeWriter<'r> {
    registry: &'r TypeRegistry,
    shallow: bool,
    handles: IdentityMap<ObjectHandle>,
    objects: Vec<SerializedObject>,
    queue: VecDeque<(ObjectHandle, ObjectRef)>,
}

impl TreeWriter<'_> {
    /// Returns the handle of `object`, reserving a slot on first sight.
    fn handle_of(&mut self, object: &ObjectRef) -> Result<ObjectHandle, StreamError> {
        let next = ObjectHandle(array_len(self.objects.len())?);
        let (handle, inserted) = self.handles.get_or_insert_with(object.as_ptr(), || next);
        let handle = *handle;
        if inserted {
            self.objects.push(SerializedObject::default());
            self.queue.push_back((handle, object.clone()));
        }
        Ok(handle)
    }

    fn capture_object(
        &mut self,
        object: &mut dyn Reflect,
        top_level: bool,
        ctx: &mut SerializationContext,
    ) -> Result<SerializedObject, SerialError> {
        let descriptor = object.descriptor();
        if top_level && self.registry.get(descriptor.id()).is_none() {
            return Err(SchemaError::UnknownTypeId(descriptor.id()).into());
        }

        let chain: Vec<&'static TypeDescriptor> = descriptor.chain().collect();
        let mut schemas: Vec<SchemaInstance> = chain.iter().map(|d| d.instantiate()).collect();
        let mut captured = SerializedObject::default();

        for (depth, &level_descriptor) in chain.iter().enumerate() {
            let level = crate::level_mut(object, depth, level_descriptor)?;
            let schema = &mut schemas[depth];
            schema.serialization_started(level, ctx);

            let mut sub = SerializedSubObject::new(level_descriptor.id());
            for field in level_descriptor.fields() {
                let value = self.capture_field(field, schema, level, ctx)?;
                sub.entries.insert(field.id(), value);
            }
            captured.sub_objects.push(sub);
        }
        for (depth, &level_descriptor) in chain.iter().enumerate().rev() {
            let level = crate::level_mut(object, depth, level_descriptor)?;
            schemas[depth].serialization_ended(level, ctx);
        }
        Ok(captured)
    }

    fn capture_field(
        &mut self,
        field: &FieldDescriptor,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<SerializedInstance, SerialError> {
        let wrap = SchemaError::field(schema.descriptor().name(), field.name());

        let mut elements = Vec::new();
        match field.accessor() {
            FieldAccessor::Plain(access) => {
                let len = access.len(schema, object).map_err(wrap)?;
                for index in 0..len {
                    let mut bytes = Vec::new();
                    access.write(schema, object, index, &mut bytes).map_err(wrap)?;
                    elements.push(SerializedInstance::Field(SerializedField { bytes }));
                }
            }
            FieldAccessor::DataBlock(access) => {
                let block = access.get(schema, object).map_err(wrap)?;
                let data = Arc::from(block.to_vec()?);
                return Ok(SerializedInstance::DataBlock(SerializedDataBlock { data }));
            }
            FieldAccessor::Reflectable(access) => {
                let len = access.len(schema, object).map_err(wrap)?;
                for index in 0..len {
                    let child = access.get_mut(schema, object, index).map_err(wrap)?;
                    let captured = self.capture_object(child, false, ctx)?;
                    elements.push(SerializedInstance::Object(Box::new(captured)));
                }
            }
            FieldAccessor::ReflectablePtr(access) => {
                let len = access.len(schema, object).map_err(wrap)?;
                for index in 0..len {
                    let handle = match access.get(schema, object, index).map_err(wrap)? {
                        Some(target) if !self.shallow => Some(self.handle_of(&target)?),
                        _ => None,
                    };
                    elements.push(SerializedInstance::Reference(handle));
                }
            }
        }

        if field.is_array() {
            let len = array_len(elements.len())?;
            let entries = (0..len).zip(elements).collect::<BTreeMap<_, _>>();
            return Ok(SerializedInstance::Array(SerializedArray { len, entries }));
        }
        elements.pop().ok_or_else(|| {
            wrap(FieldError::IndexOutOfRange { index: 0, len: 0 }).into()
        })
    }
}

// -----------------------------------------------------------------------------
// TreeReader

struct Slot {
    object: ObjectRef,
    type_name: &'static str,
}

/// Rebuilds a graph from a tree, one object after another in handle order.
struct TreeReader<'t> {
    tree: &'t SerializedObjectTree,
    slots: Vec<Slot>,
    current: ObjectHandle,
    edges: StrongEdges,
}

impl<'t> TreeReader<'t> {
    fn new(registry: &TypeRegistry, tree: &'t SerializedObjectTree) -> Result<Self, SerialError> {
        let mut slots = Vec::with_capacity(tree.len());
        for node in &tree.objects {
            let type_id = node.type_id().ok_or(SchemaError::MalformedMetadata {
                word: 0,
                reason: "serialized object without sub-objects",
            })?;
            let value = registry.create_instance(type_id)?;
            slots.push(Slot {
                type_name: value.type_name(),
                object: ObjectRef::from_boxed(value),
            });
        }
        Ok(Self {
            tree,
            slots,
            current: tree.root,
            edges: StrongEdges::default(),
        })
    }

    fn fill(&mut self, handle: ObjectHandle, ctx: &mut SerializationContext) -> Result<(), SerialError> {
        let tree = self.tree;
        let (Some(slot), Some(node)) = (self.slots.get(handle.index()), tree.get(handle)) else {
            return Ok(());
        };
        let object = slot.object.clone();
        log::trace!("filling tree object {} (`{}`)", handle.0, slot.type_name);

        self.current = handle;
        let mut guard = object.write();
        self.restore_object(&mut **guard, node, ctx)?;
        Ok(())
    }

    fn resolve(
        &mut self,
        handle: Option<ObjectHandle>,
        weak: bool,
        ctx: &mut SerializationContext,
    ) -> Result<Option<ObjectRef>, SerialError> {
        let Some(handle) = handle else {
            return Ok(None);
        };
        let Some(slot) = self.slots.get(handle.index()) else {
            ctx.warn(Warning::MissingReference { object_id: handle.0 });
            return Ok(None);
        };
        if !weak {
            self.edges.insert(self.current.0, handle.0);
        }
        Ok(Some(slot.object.clone()))
    }

    fn restore_object(
        &mut self,
        object: &mut dyn Reflect,
        node: &SerializedObject,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let descriptor = object.descriptor();
        if node.type_id() != Some(descriptor.id()) {
            ctx.warn(Warning::TypeMismatch {
                expected: descriptor.name(),
                found: node.type_id().unwrap_or_default(),
            });
            return Ok(());
        }

        let chain: Vec<&'static TypeDescriptor> = descriptor.chain().collect();
        let mut schemas: Vec<SchemaInstance> = chain.iter().map(|d| d.instantiate()).collect();

        for (depth, &level_descriptor) in chain.iter().enumerate().rev() {
            let level = crate::level_mut(object, depth, level_descriptor)?;
            schemas[depth].deserialization_started(level, ctx);
        }

        for sub in &node.sub_objects {
            let Some(depth) = chain.iter().position(|d| d.id() == sub.type_id) else {
                log::debug!("skipping unknown base level {} of `{}`", sub.type_id, descriptor.name());
                continue;
            };
            let level_descriptor = chain[depth];
            for (&field_id, value) in &sub.entries {
                let Some(field) = level_descriptor.field(field_id) else {
                    log::debug!("skipping unknown field {field_id} of `{}`", level_descriptor.name());
                    continue;
                };
                let level = crate::level_mut(object, depth, level_descriptor)?;
                self.restore_field(field, value, &mut schemas[depth], level, ctx)?;
            }
        }

        for (depth, &level_descriptor) in chain.iter().enumerate().rev() {
            let level = crate::level_mut(object, depth, level_descriptor)?;
            schemas[depth].deserialization_ended(level, ctx);
        }
        Ok(())
    }

    fn restore_field(
        &mut self,
        field: &FieldDescriptor,
        value: &SerializedInstance,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        match value {
            SerializedInstance::Array(array) if field.is_array() => {
                set_len(field, schema, object, array.len as usize)?;
                for (&index, element) in &array.entries {
                    self.restore_element(field, index as usize, element, schema, object, ctx)?;
                }
                Ok(())
            }
            _ if field.is_array() => Err(mismatch(
                field,
                schema,
                FieldMismatch::Array {
                    stream: false,
                    schema: true,
                },
            )),
            element => self.restore_element(field, 0, element, schema, object, ctx),
        }
    }

    fn restore_element(
        &mut self,
        field: &FieldDescriptor,
        index: usize,
        value: &SerializedInstance,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let wrap = SchemaError::field(schema.descriptor().name(), field.name());
        match (field.accessor(), value) {
            (FieldAccessor::Plain(access), SerializedInstance::Field(plain)) => {
                access.read(schema, object, index, &plain.bytes).map_err(wrap)?;
            }
            (FieldAccessor::DataBlock(access), SerializedInstance::DataBlock(block)) => {
                let block = DataBlock::from_bytes(block.data.clone());
                access.set(schema, object, block).map_err(wrap)?;
            }
            (FieldAccessor::Reflectable(access), SerializedInstance::Object(node)) => {
                let child = access.get_mut(schema, object, index).map_err(wrap)?;
                self.restore_object(child, node, ctx)?;
            }
            (FieldAccessor::ReflectablePtr(access), SerializedInstance::Reference(handle)) => {
                let target = self.resolve(*handle, field.is_weak(), ctx)?;
                access.set(schema, object, index, target).map_err(wrap)?;
            }
            (_, value) => return Err(shape_mismatch(field, schema, value)),
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Field shape helpers

pub(crate) fn set_len(
    field: &FieldDescriptor,
    schema: &mut SchemaInstance,
    object: &mut dyn Reflect,
    len: usize,
) -> Result<(), SchemaError> {
    let wrap = SchemaError::field(schema.descriptor().name(), field.name());
    match field.accessor() {
        FieldAccessor::Plain(access) => access.set_len(schema, object, len),
        FieldAccessor::Reflectable(access) => access.set_len(schema, object, len),
        FieldAccessor::ReflectablePtr(access) => access.set_len(schema, object, len),
        FieldAccessor::DataBlock(_) => Ok(()),
    }
    .map_err(wrap)
}

pub(crate) fn mismatch(
    field: &FieldDescriptor,
    schema: &SchemaInstance,
    mismatch: FieldMismatch,
) -> SerialError {
    SchemaError::FieldMismatch {
        type_name: schema.descriptor().name(),
        field_id: field.id(),
        mismatch,
    }
    .into()
}

/// The error for a value whose variant does not fit the field's kind.
pub(crate) fn shape_mismatch(
    field: &FieldDescriptor,
    schema: &SchemaInstance,
    value: &SerializedInstance,
) -> SerialError {
    let found = match value.kind() {
        Some(kind) => FieldMismatch::Kind {
            stream: kind,
            schema: field.kind(),
        },
        None => FieldMismatch::Array {
            stream: true,
            schema: field.is_array(),
        },
    };
    mismatch(field, schema, found)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use vc_reflect::derive::Reflect;
    use vc_reflect::registry::TypeRegistry;
    use vc_reflect::{DataBlock, FieldMismatch, ObjectRef, SchemaError, SerializationContext, Warning};

    use crate::SerialError;
    use crate::tree::{
        ObjectHandle, SerializedField, SerializedInstance, SerializedObject, SerializedObjectTree,
        SerializedSubObject, TreeSerializer,
    };

    #[derive(Reflect, Default, Clone, PartialEq, Debug)]
    #[reflect(id = 0x801)]
    struct Point {
        #[reflect(id = 0)]
        x: f32,
        #[reflect(id = 1)]
        y: f32,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x800, abstract_type)]
    struct Entity {
        #[reflect(id = 0)]
        name: String,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0x802)]
    struct Sprite {
        #[reflect(base)]
        entity: Entity,
        #[reflect(id = 0, reflectable)]
        origin: Point,
        #[reflect(id = 1, array, reflectable)]
        corners: Vec<Point>,
        #[reflect(id = 2)]
        pixels: DataBlock,
        #[reflect(id = 3)]
        parent: Option<ObjectRef>,
        #[reflect(id = 4)]
        children: Vec<Option<ObjectRef>>,
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<Sprite>().unwrap();
        registry
    }

    fn sprite(name: &str) -> Sprite {
        Sprite {
            entity: Entity { name: name.into() },
            origin: Point { x: 1.0, y: 2.0 },
            corners: vec![Point::default(), Point { x: 4.0, y: 4.0 }],
            pixels: DataBlock::from(vec![1, 2, 3]),
            ..Default::default()
        }
    }

    #[test]
    fn tree_mirrors_inheritance_levels() {
        let registry = registry();
        let root = ObjectRef::new(sprite("root"));
        let tree = TreeSerializer::new(&registry)
            .to_tree(&root, false, &mut SerializationContext::new())
            .unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root, ObjectHandle(0));
        let ids: Vec<u32> = tree.root().sub_objects.iter().map(|s| s.type_id).collect();
        assert_eq!(ids, [0x802, 0x800]);

        let sprite = tree.root().sub_object(0x802).unwrap();
        let SerializedInstance::Array(corners) = &sprite.entries[&1] else {
            panic!("corners should be an array");
        };
        assert_eq!(corners.len, 2);
        assert!(matches!(sprite.entries[&0], SerializedInstance::Object(_)));
        assert!(matches!(sprite.entries[&2], SerializedInstance::DataBlock(_)));
        assert_eq!(sprite.entries[&3], SerializedInstance::Reference(None));
    }

    #[test]
    fn shared_references_share_a_handle() {
        let registry = registry();
        let shared = ObjectRef::new(sprite("shared"));
        let root = ObjectRef::new(Sprite {
            parent: Some(shared.clone()),
            children: vec![Some(shared.clone()), None, Some(shared)],
            ..sprite("root")
        });
        let serializer = TreeSerializer::new(&registry);
        let mut ctx = SerializationContext::new();
        let tree = serializer.to_tree(&root, false, &mut ctx).unwrap();
        assert_eq!(tree.len(), 2);

        let copy = serializer.from_tree(&tree, &mut ctx).unwrap();
        assert!(ctx.warnings().is_empty());
        let (parent, children) = copy
            .with(|s: &Sprite| (s.parent.clone().unwrap(), s.children.clone()))
            .unwrap();
        assert!(children[0].as_ref().unwrap().ptr_eq(&parent));
        assert!(children[1].is_none());
        assert!(children[2].as_ref().unwrap().ptr_eq(&parent));
        let name = parent.with(|s: &Sprite| s.entity.name.clone()).unwrap();
        assert_eq!(name, "shared");
        let corners = copy.with(|s: &Sprite| s.corners.clone()).unwrap();
        assert_eq!(corners[1], Point { x: 4.0, y: 4.0 });
    }

    #[test]
    fn cycles_warn_and_still_link() {
        let registry = registry();
        let a = ObjectRef::new(sprite("a"));
        let b = ObjectRef::new(Sprite {
            parent: Some(a.clone()),
            ..sprite("b")
        });
        a.with_mut(|s: &mut Sprite| s.parent = Some(b.clone()));

        let serializer = TreeSerializer::new(&registry);
        let mut ctx = SerializationContext::new();
        let tree = serializer.to_tree(&a, false, &mut ctx).unwrap();
        let copy = serializer.from_tree(&tree, &mut ctx).unwrap();

        assert_eq!(ctx.warnings(), [Warning::CircularReference { type_name: "Sprite" }]);
        let b2 = copy.with(|s: &Sprite| s.parent.clone().unwrap()).unwrap();
        let back = b2.with(|s: &Sprite| s.parent.clone().unwrap()).unwrap();
        assert!(back.ptr_eq(&copy));

        a.with_mut(|s: &mut Sprite| s.parent = None);
        copy.with_mut(|s: &mut Sprite| s.parent = None);
    }

    #[test]
    fn unknown_types_and_shapes_are_fatal() {
        let registry = registry();
        let serializer = TreeSerializer::new(&registry);
        let mut ctx = SerializationContext::new();

        let mut unknown = SerializedObject::default();
        unknown.sub_objects.push(SerializedSubObject::new(0x8FF));
        let tree = SerializedObjectTree {
            objects: vec![unknown],
            root: ObjectHandle(0),
        };
        assert!(matches!(
            serializer.from_tree(&tree, &mut ctx),
            Err(SerialError::Schema(SchemaError::UnknownTypeId(0x8FF)))
        ));

        let root = ObjectRef::new(sprite("root"));
        let mut tree = serializer.to_tree(&root, false, &mut ctx).unwrap();
        let plain = SerializedInstance::Field(SerializedField { bytes: vec![0; 4] });
        tree.objects[0].sub_objects[0].entries.insert(3, plain);
        assert!(matches!(
            serializer.from_tree(&tree, &mut ctx),
            Err(SerialError::Schema(SchemaError::FieldMismatch {
                field_id: 3,
                mismatch: FieldMismatch::Kind { .. },
                ..
            }))
        ));
    }

    #[test]
    fn dangling_handles_warn() {
        let registry = registry();
        let serializer = TreeSerializer::new(&registry);
        let mut ctx = SerializationContext::new();
        let root = ObjectRef::new(sprite("root"));
        let mut tree = serializer.to_tree(&root, false, &mut ctx).unwrap();
        let dangling = SerializedInstance::Reference(Some(ObjectHandle(5)));
        tree.objects[0].sub_objects[0].entries.insert(3, dangling);

        let copy = serializer.from_tree(&tree, &mut ctx).unwrap();
        assert_eq!(ctx.warnings(), [Warning::MissingReference { object_id: 5 }]);
        assert!(copy.with(|s: &Sprite| s.parent.is_none()).unwrap());
    }
}
