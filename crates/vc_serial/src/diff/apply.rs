use alloc::collections::VecDeque;
use alloc::vec::Vec;

use vc_reflect::descriptor::{FieldAccessor, FieldDescriptor, SchemaInstance, TypeDescriptor};
use vc_reflect::registry::TypeRegistry;
use vc_reflect::{DataBlock, FieldMismatch, ObjectRef, Reflect, SchemaError};
use vc_reflect::{SerializationContext, Warning};
use vc_utils::IdentityMap;
use vc_utils::hash::HashMap;

use crate::SerialError;
use crate::clone::BinaryCloner;
use crate::tree::{ObjectHandle, SerializedInstance, SerializedObject, SerializedObjectTree};
use crate::tree::{mismatch, set_len, shape_mismatch};

// -----------------------------------------------------------------------------
// Commands

enum Action<'d> {
    SetLen(usize),
    Plain(&'d [u8]),
    DataBlock(DataBlock),
    /// Installs a patched copy of an embedded value.
    Embedded(ObjectRef),
    Reference(Option<ObjectRef>),
}

struct Command<'d> {
    depth: usize,
    field: &'static FieldDescriptor,
    index: usize,
    action: Action<'d>,
}

/// The commands that patch one object.
struct PatchBlock<'d> {
    target: ObjectRef,
    commands: Vec<Command<'d>>,
}

// -----------------------------------------------------------------------------
// Patcher

/// State of one apply call.
///
/// Pass 1 plans a command block per object without touching any field.
/// Referenced objects are planned from a queue in the order the diff
/// discovered them, embedded values right where they appear. Pass 2 runs
/// the blocks in reverse, so children are patched before the command that
/// installs them.
pub(super) struct Patcher<'r, 'd> {
    registry: &'r TypeRegistry,
    diff: &'d SerializedObjectTree,
    slots: HashMap<ObjectHandle, ObjectRef>,
    /// Live objects already taken by a diff node.
    claimed: IdentityMap<ObjectHandle>,
    queue: VecDeque<(ObjectRef, &'d SerializedObject)>,
    /// The blocks of one queued object, its embedded values first.
    groups: Vec<Vec<PatchBlock<'d>>>,
}

impl<'r, 'd> Patcher<'r, 'd> {
    pub fn new(registry: &'r TypeRegistry, diff: &'d SerializedObjectTree) -> Self {
        Self {
            registry,
            diff,
            slots: HashMap::default(),
            claimed: IdentityMap::new(),
            queue: VecDeque::new(),
            groups: Vec::new(),
        }
    }

    pub fn run(mut self, target: &ObjectRef, ctx: &mut SerializationContext) -> Result<(), SerialError> {
        let Some(root) = self.diff.get(self.diff.root) else {
            return Ok(());
        };
        self.slots.insert(self.diff.root, target.clone());
        self.claimed.insert(target.as_ptr(), self.diff.root);
        self.queue.push_back((target.clone(), root));

        while let Some((target, node)) = self.queue.pop_front() {
            let mut group = Vec::new();
            self.plan(target, node, &mut group, ctx)?;
            self.groups.push(group);
        }

        log::debug!("applying {} patch groups", self.groups.len());
        for group in self.groups.into_iter().rev() {
            for block in group {
                execute(block, ctx)?;
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Pass 1

    fn plan(
        &mut self,
        target: ObjectRef,
        node: &'d SerializedObject,
        group: &mut Vec<PatchBlock<'d>>,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let mut commands = Vec::new();
        {
            let mut guard = target.write();
            let object = &mut **guard;
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
            for (depth, &level_descriptor) in chain.iter().enumerate() {
                let level = crate::level_mut(object, depth, level_descriptor)?;
                schemas[depth].serialization_started(level, ctx);
            }

            let mut planner = Planner {
                patcher: self,
                group: &mut *group,
                commands: &mut commands,
            };
            for sub in &node.sub_objects {
                let Some(depth) = chain.iter().position(|d| d.id() == sub.type_id) else {
                    log::debug!("skipping sub-object {} not in the chain of `{}`", sub.type_id, descriptor.name());
                    continue;
                };
                let level_descriptor = chain[depth];
                for (&field_id, value) in &sub.entries {
                    let Some(field) = level_descriptor.field(field_id) else {
                        continue;
                    };
                    let level = crate::level_mut(object, depth, level_descriptor)?;
                    planner.field(depth, field, value, &mut schemas[depth], level, ctx)?;
                }
            }

            for (depth, &level_descriptor) in chain.iter().enumerate().rev() {
                let level = crate::level_mut(object, depth, level_descriptor)?;
                schemas[depth].serialization_ended(level, ctx);
            }
        }

        group.push(PatchBlock { target, commands });
        Ok(())
    }
}

/// Plans the fields of one locked object.
struct Planner<'p, 'r, 'd> {
    patcher: &'p mut Patcher<'r, 'd>,
    group: &'p mut Vec<PatchBlock<'d>>,
    commands: &'p mut Vec<Command<'d>>,
}

impl<'d> Planner<'_, '_, 'd> {
    fn field(
        &mut self,
        depth: usize,
        field: &'static FieldDescriptor,
        value: &'d SerializedInstance,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        match value {
            SerializedInstance::Array(array) if field.is_array() => {
                let current = current_len(field, schema, object)?;
                self.push(depth, field, 0, Action::SetLen(array.len as usize));
                for (&index, element) in array.entries.range(..array.len) {
                    let index = index as usize;
                    self.element(depth, field, index, index < current, element, schema, object, ctx)?;
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
            element => self.element(depth, field, 0, true, element, schema, object, ctx),
        }
    }

    fn element(
        &mut self,
        depth: usize,
        field: &'static FieldDescriptor,
        index: usize,
        exists: bool,
        value: &'d SerializedInstance,
        schema: &mut SchemaInstance,
        object: &mut dyn Reflect,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        let wrap = SchemaError::field(schema.descriptor().name(), field.name());
        let action = match (field.accessor(), value) {
            (FieldAccessor::Plain(_), SerializedInstance::Field(plain)) => {
                if plain.bytes.is_empty() {
                    return Ok(());
                }
                Action::Plain(&plain.bytes)
            }
            (FieldAccessor::DataBlock(_), SerializedInstance::DataBlock(block)) => {
                Action::DataBlock(DataBlock::from_bytes(block.data.clone()))
            }
            (FieldAccessor::Reflectable(access), SerializedInstance::Object(node)) => {
                let Some(type_id) = node.type_id() else {
                    return Ok(());
                };
                let copy = match exists {
                    true => {
                        let child = access.get_mut(schema, object, index).map_err(wrap)?;
                        match child.descriptor().id() == type_id {
                            true => BinaryCloner::new(self.patcher.registry).clone_value(child, true, ctx)?,
                            false => self.patcher.registry.create_instance(type_id)?,
                        }
                    }
                    false => self.patcher.registry.create_instance(type_id)?,
                };
                let copy = ObjectRef::from_boxed(copy);
                self.patcher.plan(copy.clone(), node, self.group, ctx)?;
                Action::Embedded(copy)
            }
            (FieldAccessor::ReflectablePtr(access), SerializedInstance::Reference(handle)) => {
                let current = match exists {
                    true => access.get(schema, object, index).map_err(wrap)?,
                    false => None,
                };
                Action::Reference(self.reference(*handle, current, ctx)?)
            }
            (_, value) => return Err(shape_mismatch(field, schema, value)),
        };
        self.push(depth, field, index, action);
        Ok(())
    }

    /// Resolves a pointer diff to the object that receives it.
    fn reference(
        &mut self,
        handle: Option<ObjectHandle>,
        current: Option<ObjectRef>,
        ctx: &mut SerializationContext,
    ) -> Result<Option<ObjectRef>, SerialError> {
        let Some(handle) = handle else {
            return Ok(None);
        };
        if let Some(target) = self.patcher.slots.get(&handle) {
            return Ok(Some(target.clone()));
        }
        let diff = self.patcher.diff;
        let Some((node, type_id)) = diff.get(handle).and_then(|n| Some((n, n.type_id()?))) else {
            ctx.warn(Warning::MissingReference { object_id: handle.0 });
            return Ok(None);
        };

        // The first node to reach an unclaimed object of its type patches it
        // in place. Objects being planned are claimed.
        let reusable = current.filter(|current| {
            !self.patcher.claimed.contains(current.as_ptr()) && current.descriptor().id() == type_id
        });
        let target = match reusable {
            Some(current) => current,
            None => ObjectRef::from_boxed(self.patcher.registry.create_instance(type_id)?),
        };

        self.patcher.slots.insert(handle, target.clone());
        self.patcher.claimed.insert(target.as_ptr(), handle);
        self.patcher.queue.push_back((target.clone(), node));
        Ok(Some(target))
    }

    fn push(&mut self, depth: usize, field: &'static FieldDescriptor, index: usize, action: Action<'d>) {
        self.commands.push(Command {
            depth,
            field,
            index,
            action,
        });
    }
}

fn current_len(
    field: &FieldDescriptor,
    schema: &mut SchemaInstance,
    object: &dyn Reflect,
) -> Result<usize, SchemaError> {
    let wrap = SchemaError::field(schema.descriptor().name(), field.name());
    match field.accessor() {
        FieldAccessor::Plain(access) => access.len(schema, object),
        FieldAccessor::Reflectable(access) => access.len(schema, object),
        FieldAccessor::ReflectablePtr(access) => access.len(schema, object),
        FieldAccessor::DataBlock(_) => Ok(1),
    }
    .map_err(wrap)
}

// -----------------------------------------------------------------------------
// Pass 2

fn execute(block: PatchBlock<'_>, ctx: &mut SerializationContext) -> Result<(), SerialError> {
    let PatchBlock { target, commands } = block;
    let mut guard = target.write();
    let object = &mut **guard;

    let chain: Vec<&'static TypeDescriptor> = object.descriptor().chain().collect();
    let mut schemas: Vec<SchemaInstance> = chain.iter().map(|d| d.instantiate()).collect();
    for (depth, &descriptor) in chain.iter().enumerate().rev() {
        let level = crate::level_mut(object, depth, descriptor)?;
        schemas[depth].deserialization_started(level, ctx);
    }

    for command in commands {
        let Command {
            depth,
            field,
            index,
            action,
        } = command;
        let (Some(&descriptor), Some(schema)) = (chain.get(depth), schemas.get_mut(depth)) else {
            continue;
        };
        let level = crate::level_mut(object, depth, descriptor)?;
        let wrap = SchemaError::field(descriptor.name(), field.name());

        match (field.accessor(), action) {
            (_, Action::SetLen(len)) => set_len(field, schema, level, len)?,
            (FieldAccessor::Plain(access), Action::Plain(bytes)) => {
                access.read(schema, level, index, bytes).map_err(wrap)?;
            }
            (FieldAccessor::DataBlock(access), Action::DataBlock(block)) => {
                access.set(schema, level, block).map_err(wrap)?;
            }
            (FieldAccessor::Reflectable(access), Action::Embedded(value)) => {
                let value = crate::take_object(value)?;
                access.set(schema, level, index, value).map_err(wrap)?;
            }
            (FieldAccessor::ReflectablePtr(access), Action::Reference(value)) => {
                access.set(schema, level, index, value).map_err(wrap)?;
            }
            _ => {}
        }
    }

    for (depth, &descriptor) in chain.iter().enumerate().rev() {
        let level = crate::level_mut(object, depth, descriptor)?;
        schemas[depth].deserialization_ended(level, ctx);
    }
    Ok(())
}
