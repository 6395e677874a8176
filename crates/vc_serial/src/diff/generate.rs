use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use vc_reflect::registry::TypeRegistry;
use vc_utils::hash::HashMap;

use crate::tree::{
    ObjectHandle, SerializedArray, SerializedDataBlock, SerializedField, SerializedInstance,
    SerializedObject, SerializedObjectTree, SerializedSubObject,
};
use crate::{SerialError, StreamError};

/// What one output node holds.
#[derive(Debug, Clone, Copy)]
enum NodeKind {
    /// The changes from an original object to a modified one.
    Diff {
        original: ObjectHandle,
        modified: ObjectHandle,
    },
    /// The full content of a modified object.
    Copy { modified: ObjectHandle },
}

struct Node {
    kind: NodeKind,
    /// Kept in the output.
    changed: bool,
    /// Nodes this node's fields link to.
    links: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Finds every node and whether it changed by itself.
    Discover,
    /// Writes the kept nodes.
    Emit,
}

/// State of one diff call.
///
/// Every modified object reached through references gets one node, so an
/// object referenced from several fields yields a single node that every
/// referencing field links to. A node diffs its modified object against
/// the original object the first field paired it with. An original object
/// paired with a second modified object is not patched twice: that field
/// links to a full copy instead.
///
/// Nodes are processed in discovery order from a worklist. The discover
/// pass records links, the kept set then grows from changed nodes to the
/// nodes linking to them, and the emit pass writes the kept nodes.
pub(super) struct Differ<'a> {
    registry: &'a TypeRegistry,
    original: &'a SerializedObjectTree,
    modified: &'a SerializedObjectTree,
    pass: Pass,
    nodes: Vec<Node>,
    by_modified: HashMap<ObjectHandle, usize>,
    /// Original objects already paired, with their modified partner.
    claims: HashMap<ObjectHandle, ObjectHandle>,
    /// Output handle of every kept node.
    handles: Vec<Option<ObjectHandle>>,
    current: usize,
}

impl<'a> Differ<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        original: &'a SerializedObjectTree,
        modified: &'a SerializedObjectTree,
    ) -> Self {
        Self {
            registry,
            original,
            modified,
            pass: Pass::Discover,
            nodes: Vec::new(),
            by_modified: HashMap::default(),
            claims: HashMap::default(),
            handles: Vec::new(),
            current: 0,
        }
    }

    pub fn run(mut self) -> Result<Option<SerializedObjectTree>, SerialError> {
        let (original_root, modified_root) = (self.original.root, self.modified.root);
        let (Some(original), Some(modified)) =
            (self.original.get(original_root), self.modified.get(modified_root))
        else {
            return Ok(None);
        };

        if original.type_id() == modified.type_id() {
            self.claims.insert(original_root, modified_root);
            self.node(NodeKind::Diff {
                original: original_root,
                modified: modified_root,
            });
        } else {
            self.node(NodeKind::Copy {
                modified: modified_root,
            });
        }

        let mut index = 0;
        while index < self.nodes.len() {
            self.current = index;
            let (_, changed) = self.build(index)?;
            self.nodes[index].changed |= changed;
            index += 1;
        }
        self.propagate();
        if !self.nodes[0].changed {
            return Ok(None);
        }

        let mut next = 0_usize;
        for node in &self.nodes {
            let handle = match node.changed {
                true => {
                    let handle = u32::try_from(next).map_err(|_| StreamError::LengthOverflow(next as u64))?;
                    next += 1;
                    Some(ObjectHandle(handle))
                }
                false => None,
            };
            self.handles.push(handle);
        }

        self.pass = Pass::Emit;
        let mut objects = Vec::with_capacity(next);
        for index in 0..self.nodes.len() {
            if self.nodes[index].changed {
                self.current = index;
                objects.push(self.build(index)?.0);
            }
        }

        log::debug!(
            "generated a diff of {} objects out of {} compared",
            objects.len(),
            self.nodes.len()
        );
        Ok(Some(SerializedObjectTree {
            objects,
            root: ObjectHandle(0),
        }))
    }

    fn node(&mut self, kind: NodeKind) -> usize {
        let index = self.nodes.len();
        let (NodeKind::Diff { modified, .. } | NodeKind::Copy { modified }) = kind;
        self.by_modified.insert(modified, index);
        self.nodes.push(Node {
            kind,
            changed: matches!(kind, NodeKind::Copy { .. }),
            links: Vec::new(),
        });
        index
    }

    /// Marks every node that links to a changed node as changed.
    fn propagate(&mut self) {
        let mut owners: Vec<Vec<usize>> = (0..self.nodes.len()).map(|_| Vec::new()).collect();
        for (index, node) in self.nodes.iter().enumerate() {
            for &link in &node.links {
                owners[link].push(index);
            }
        }

        let mut stack: Vec<usize> = (0..self.nodes.len()).filter(|&i| self.nodes[i].changed).collect();
        while let Some(index) = stack.pop() {
            for &owner in &owners[index] {
                if !self.nodes[owner].changed {
                    self.nodes[owner].changed = true;
                    stack.push(owner);
                }
            }
        }
    }

    fn build(&mut self, index: usize) -> Result<(SerializedObject, bool), SerialError> {
        let (original, modified) = (self.original, self.modified);
        match self.nodes[index].kind {
            NodeKind::Diff {
                original: before,
                modified: after,
            } => match (original.get(before), modified.get(after)) {
                (Some(before), Some(after)) => self.diff_object(before, after),
                _ => Ok((SerializedObject::default(), false)),
            },
            NodeKind::Copy { modified: after } => match modified.get(after) {
                Some(after) => Ok((self.copy_inline(after)?, true)),
                None => Ok((SerializedObject::default(), true)),
            },
        }
    }

    /// A link from the current node to `node`.
    ///
    /// A hard link is a changed field by itself, a soft one only when the
    /// target turns out changed.
    fn link(&mut self, node: usize, hard: bool) -> Option<SerializedInstance> {
        match self.pass {
            Pass::Discover => {
                self.nodes[self.current].links.push(node);
                hard.then_some(SerializedInstance::Reference(None))
            }
            Pass::Emit => {
                let handle = self.handles.get(node).copied().flatten()?;
                Some(SerializedInstance::Reference(Some(handle)))
            }
        }
    }

    /// Diffs two values of the same type.
    ///
    /// The most-derived sub-object is always part of the output, the flag
    /// tells whether anything differs.
    fn diff_object(
        &mut self,
        original: &'a SerializedObject,
        modified: &'a SerializedObject,
    ) -> Result<(SerializedObject, bool), SerialError> {
        let mut output = SerializedObject::default();
        let mut changed = false;

        for (depth, sub) in modified.sub_objects.iter().enumerate() {
            let Some(descriptor) = self.registry.get(sub.type_id) else {
                log::debug!("skipping unregistered sub-object type {}", sub.type_id);
                continue;
            };
            let previous = original.sub_object(sub.type_id);

            let mut ids: BTreeSet<u16> = sub.entries.keys().copied().collect();
            if let Some(previous) = previous {
                ids.extend(previous.entries.keys().copied());
            }

            let mut diff = SerializedSubObject::new(sub.type_id);
            for id in ids {
                if descriptor.field(id).is_none() {
                    continue;
                }
                let before = previous.and_then(|p| p.entries.get(&id));
                let after = sub.entries.get(&id);
                let modification = match (before, after) {
                    (Some(before), Some(after)) => self.diff_value(before, after)?,
                    (None, Some(after)) => Some(self.copy_value(after)?),
                    (Some(before), None) => cleared(before),
                    (None, None) => None,
                };
                if let Some(modification) = modification {
                    diff.entries.insert(id, modification);
                }
            }

            changed |= !diff.entries.is_empty();
            if depth == 0 || !diff.entries.is_empty() {
                output.sub_objects.push(diff);
            }
        }

        Ok((output, changed))
    }

    fn diff_value(
        &mut self,
        before: &'a SerializedInstance,
        after: &'a SerializedInstance,
    ) -> Result<Option<SerializedInstance>, SerialError> {
        use SerializedInstance as I;

        let modification = match (before, after) {
            (I::Field(a), I::Field(b)) => (a != b).then(|| after.clone()),
            (I::DataBlock(a), I::DataBlock(b)) => (a != b).then(|| after.clone()),
            (I::Object(a), I::Object(b)) if a.type_id() == b.type_id() => {
                let (diff, changed) = self.diff_object(a, b)?;
                changed.then(|| I::Object(Box::new(diff)))
            }
            (I::Reference(a), I::Reference(b)) => self.diff_reference(*a, *b),
            (I::Array(a), I::Array(b)) => self.diff_array(a, b)?,
            _ => Some(self.copy_value(after)?),
        };
        Ok(modification)
    }

    fn diff_array(
        &mut self,
        before: &'a SerializedArray,
        after: &'a SerializedArray,
    ) -> Result<Option<SerializedInstance>, SerialError> {
        let mut entries = BTreeMap::new();
        for (&index, element) in after.entries.range(..after.len) {
            let modification = match before.entries.get(&index) {
                Some(previous) => self.diff_value(previous, element)?,
                None => Some(self.copy_value(element)?),
            };
            if let Some(modification) = modification {
                entries.insert(index, modification);
            }
        }

        if entries.is_empty() && before.len == after.len {
            return Ok(None);
        }
        Ok(Some(SerializedInstance::Array(SerializedArray {
            len: after.len,
            entries,
        })))
    }

    fn diff_reference(
        &mut self,
        before: Option<ObjectHandle>,
        after: Option<ObjectHandle>,
    ) -> Option<SerializedInstance> {
        let (before, after) = match (before, after) {
            (_, None) => return before.map(|_| SerializedInstance::Reference(None)),
            (None, Some(after)) => return Some(self.copy_object(after)),
            (Some(before), Some(after)) => (before, after),
        };

        let (original, modified) = (self.original, self.modified);
        let (Some(original), Some(modified)) = (original.get(before), modified.get(after)) else {
            return None;
        };

        if let Some(&node) = self.by_modified.get(&after) {
            let same_pair = matches!(
                self.nodes[node].kind,
                NodeKind::Diff { original: paired, .. } if paired == before
            );
            if !same_pair {
                self.nodes[node].changed = true;
            }
            return self.link(node, !same_pair);
        }

        if self.claims.contains_key(&before) || original.type_id() != modified.type_id() {
            return Some(self.copy_object(after));
        }
        self.claims.insert(before, after);
        let node = self.node(NodeKind::Diff {
            original: before,
            modified: after,
        });
        self.link(node, false)
    }

    /// Copies a modified-side value, linking every object it references.
    fn copy_value(&mut self, value: &'a SerializedInstance) -> Result<SerializedInstance, SerialError> {
        use SerializedInstance as I;

        Ok(match value {
            I::Field(_) | I::DataBlock(_) => value.clone(),
            I::Reference(None) => I::Reference(None),
            I::Reference(Some(handle)) => self.copy_object(*handle),
            I::Object(object) => I::Object(Box::new(self.copy_inline(object)?)),
            I::Array(array) => {
                let mut entries = BTreeMap::new();
                for (&index, element) in &array.entries {
                    entries.insert(index, self.copy_value(element)?);
                }
                I::Array(SerializedArray {
                    len: array.len,
                    entries,
                })
            }
        })
    }

    fn copy_inline(&mut self, object: &'a SerializedObject) -> Result<SerializedObject, SerialError> {
        let mut copy = SerializedObject::default();
        for sub in &object.sub_objects {
            let mut entries = BTreeMap::new();
            for (&id, value) in &sub.entries {
                entries.insert(id, self.copy_value(value)?);
            }
            copy.sub_objects.push(SerializedSubObject {
                type_id: sub.type_id,
                entries,
            });
        }
        Ok(copy)
    }

    /// A hard link to the node of a modified-side object, a full copy on
    /// first sight.
    fn copy_object(&mut self, modified: ObjectHandle) -> SerializedInstance {
        let node = match self.by_modified.get(&modified) {
            Some(&node) => {
                self.nodes[node].changed = true;
                node
            }
            None => self.node(NodeKind::Copy { modified }),
        };
        self.link(node, true).unwrap_or(SerializedInstance::Reference(None))
    }
}

/// The entry that clears a field present only in the original.
fn cleared(before: &SerializedInstance) -> Option<SerializedInstance> {
    use SerializedInstance as I;

    match before {
        I::Field(_) => Some(I::Field(SerializedField::default())),
        I::DataBlock(_) => Some(I::DataBlock(SerializedDataBlock::default())),
        I::Reference(_) => Some(I::Reference(None)),
        I::Array(_) => Some(I::Array(SerializedArray::default())),
        I::Object(_) => None,
    }
}
