//! Structural deltas between object trees.
//!
//! A diff is itself a [`SerializedObjectTree`] that holds only what changed:
//!
//! - Plain values and data blocks appear with their full new value when
//!   their bytes differ.
//! - Embedded values recurse and appear only when something inside them
//!   changed.
//! - References link to a nested diff node of their target. An object
//!   referenced from several fields gets a single node.
//! - A reference whose target was absent or changed type links to a full
//!   copy of the new target instead. So does a reference whose original
//!   target is already being patched into another object.
//! - Arrays record changed indices and their new length.
//!
//! The most-derived sub-object is always present in a diff node, so the
//! node keeps the type of the object it patches.
//!
//! [`BinaryDiff::apply`] patches a live graph in two passes. The first plans
//! one command block per object without touching any field. The second runs
//! the blocks children first, so every value is complete when it is
//! installed into its parent.
//!
//! # Examples
//!
//! ```
//! use vc_reflect::{derive::Reflect, registry::TypeRegistry, ObjectRef, SerializationContext};
//! use vc_serial::diff::BinaryDiff;
//! use vc_serial::tree::TreeSerializer;
//!
//! #[derive(Reflect, Default)]
//! #[reflect(id = 90)]
//! struct Config {
//!     #[reflect(id = 0)]
//!     volume: u8,
//!     #[reflect(id = 1)]
//!     title: String,
//! }
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<Config>().unwrap();
//! let serializer = TreeSerializer::new(&registry);
//! let mut ctx = SerializationContext::new();
//!
//! let before = ObjectRef::new(Config { volume: 3, title: "main".into() });
//! let after = ObjectRef::new(Config { volume: 7, title: "main".into() });
//! let before_tree = serializer.to_tree(&before, false, &mut ctx).unwrap();
//! let after_tree = serializer.to_tree(&after, false, &mut ctx).unwrap();
//!
//! let differ = BinaryDiff::new(&registry);
//! assert!(differ.generate(&before_tree, &before_tree).unwrap().is_none());
//!
//! let diff = differ.generate(&before_tree, &after_tree).unwrap().unwrap();
//! assert_eq!(diff.root().sub_objects[0].entries.len(), 1);
//!
//! differ.apply(&before, &diff, &mut ctx).unwrap();
//! assert_eq!(before.with(|c: &Config| c.volume).unwrap(), 7);
//! ```

// -----------------------------------------------------------------------------
// Modules

mod apply;
mod generate;

use vc_reflect::registry::TypeRegistry;
use vc_reflect::{ObjectRef, SerializationContext};

use crate::SerialError;
use crate::tree::SerializedObjectTree;

// -----------------------------------------------------------------------------
// BinaryDiff

/// Generates and applies diffs against a registry.
#[derive(Clone, Copy)]
pub struct BinaryDiff<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> BinaryDiff<'r> {
    #[inline]
    pub const fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Returns what changed from `original` to `modified`, `None` if nothing did.
    ///
    /// Sub-objects of unregistered types and fields their descriptor does
    /// not declare are ignored. Trees with different root types yield a
    /// full copy of `modified`.
    pub fn generate(
        &self,
        original: &SerializedObjectTree,
        modified: &SerializedObjectTree,
    ) -> Result<Option<SerializedObjectTree>, SerialError> {
        generate::Differ::new(self.registry, original, modified).run()
    }

    /// Patches `target` with `diff`.
    ///
    /// A referenced object is patched in place when its type matches the
    /// diff node and no other node took it first, otherwise a new instance
    /// replaces it. Embedded values are patched on a copy that then
    /// replaces the old value.
    pub fn apply(
        &self,
        target: &ObjectRef,
        diff: &SerializedObjectTree,
        ctx: &mut SerializationContext,
    ) -> Result<(), SerialError> {
        apply::Patcher::new(self.registry, diff).run(target, ctx)
    }
}

/// Shorthand for [`BinaryDiff::generate`].
#[inline]
pub fn generate_diff(
    registry: &TypeRegistry,
    original: &SerializedObjectTree,
    modified: &SerializedObjectTree,
) -> Result<Option<SerializedObjectTree>, SerialError> {
    BinaryDiff::new(registry).generate(original, modified)
}

/// Shorthand for [`BinaryDiff::apply`].
#[inline]
pub fn apply_diff(
    registry: &TypeRegistry,
    target: &ObjectRef,
    diff: &SerializedObjectTree,
    ctx: &mut SerializationContext,
) -> Result<(), SerialError> {
    BinaryDiff::new(registry).apply(target, diff, ctx)
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use vc_reflect::derive::Reflect;
    use vc_reflect::registry::TypeRegistry;
    use vc_reflect::{DataBlock, ObjectRef, SerializationContext, Warning};

    use super::BinaryDiff;
    use crate::clone::BinaryCloner;
    use crate::tree::{
        ObjectHandle, SerializedArray, SerializedField, SerializedInstance, SerializedObjectTree,
        TreeSerializer,
    };

    #[derive(Reflect, Default)]
    #[reflect(id = 0xB01)]
    struct Stats {
        #[reflect(id = 0)]
        hp: u32,
        #[reflect(id = 1)]
        mp: u32,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0xB02)]
    struct Marker {
        #[reflect(id = 0)]
        label: String,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0xB00)]
    struct Unit {
        #[reflect(id = 0)]
        name: String,
        #[reflect(id = 1, reflectable)]
        stats: Stats,
        #[reflect(id = 2, array)]
        path: Vec<i32>,
        #[reflect(id = 3)]
        target: Option<ObjectRef>,
        #[reflect(id = 4)]
        escort: Option<ObjectRef>,
        #[reflect(id = 5)]
        icon: DataBlock,
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<Unit>().unwrap();
        registry.register::<Marker>().unwrap();
        registry
    }

    fn tree(registry: &TypeRegistry, object: &ObjectRef) -> SerializedObjectTree {
        TreeSerializer::new(registry)
            .to_tree(object, false, &mut SerializationContext::new())
            .unwrap()
    }

    fn marker(label: &str) -> ObjectRef {
        ObjectRef::new(Marker { label: label.into() })
    }

    fn unit(name: &str) -> Unit {
        Unit {
            name: name.into(),
            stats: Stats { hp: 1, mp: 2 },
            path: vec![1, 2, 3],
            icon: DataBlock::from(vec![1]),
            ..Default::default()
        }
    }

    /// Applies the diff between `before` and `after` to a deep copy of `before`.
    fn patch(registry: &TypeRegistry, before: &ObjectRef, after: &ObjectRef) -> ObjectRef {
        let mut ctx = SerializationContext::new();
        let diff = BinaryDiff::new(registry)
            .generate(&tree(registry, before), &tree(registry, after))
            .unwrap()
            .unwrap();
        let copy = BinaryCloner::new(registry).clone(before, false, &mut ctx).unwrap();
        BinaryDiff::new(registry).apply(&copy, &diff, &mut ctx).unwrap();
        assert!(ctx.warnings().is_empty());
        copy
    }

    #[test]
    fn equal_trees_have_no_diff() {
        let registry = registry();
        let differ = BinaryDiff::new(&registry);
        let a = ObjectRef::new(Unit {
            target: Some(marker("x")),
            ..unit("a")
        });
        let b = ObjectRef::new(Unit {
            target: Some(marker("x")),
            ..unit("a")
        });
        let a_tree = tree(&registry, &a);
        assert!(differ.generate(&a_tree, &a_tree).unwrap().is_none());
        assert!(differ.generate(&a_tree, &tree(&registry, &b)).unwrap().is_none());
    }

    #[test]
    fn diff_keeps_only_changes() {
        let registry = registry();
        let before = ObjectRef::new(unit("a"));
        let after = ObjectRef::new(Unit {
            stats: Stats { hp: 1, mp: 5 },
            path: vec![1, 2],
            ..unit("a")
        });
        let diff = BinaryDiff::new(&registry)
            .generate(&tree(&registry, &before), &tree(&registry, &after))
            .unwrap()
            .unwrap();

        assert_eq!(diff.len(), 1);
        let root = &diff.root().sub_objects[0];
        assert_eq!(root.type_id, 0xB00);
        assert_eq!(root.entries.keys().copied().collect::<Vec<_>>(), [1, 2]);
        let SerializedInstance::Object(stats) = &root.entries[&1] else {
            panic!("stats should be an embedded diff");
        };
        assert_eq!(stats.sub_objects[0].entries.len(), 1);
        assert_eq!(
            root.entries[&2],
            SerializedInstance::Array(SerializedArray {
                len: 2,
                entries: Default::default(),
            })
        );
    }

    #[test]
    fn patched_copy_matches_modified() {
        let registry = registry();
        let before = ObjectRef::new(Unit {
            target: Some(marker("x")),
            ..unit("a")
        });
        let after = ObjectRef::new(Unit {
            name: "b".into(),
            stats: Stats { hp: 1, mp: 5 },
            path: vec![1, 9],
            target: Some(marker("y")),
            escort: Some(ObjectRef::new(unit("e"))),
            icon: DataBlock::from(vec![2, 2]),
        });

        let patched = patch(&registry, &before, &after);
        assert_eq!(tree(&registry, &patched), tree(&registry, &after));
    }

    #[test]
    fn shared_targets_are_patched_once() {
        let registry = registry();
        let shared = marker("x");
        let before = ObjectRef::new(Unit {
            target: Some(shared.clone()),
            escort: Some(shared),
            ..unit("a")
        });
        let shared = marker("y");
        let after = ObjectRef::new(Unit {
            target: Some(shared.clone()),
            escort: Some(shared),
            ..unit("a")
        });

        let diff = BinaryDiff::new(&registry)
            .generate(&tree(&registry, &before), &tree(&registry, &after))
            .unwrap()
            .unwrap();
        assert_eq!(diff.len(), 2);
        let root = &diff.root().sub_objects[0];
        assert_eq!(root.entries[&3], SerializedInstance::Reference(Some(ObjectHandle(1))));
        assert_eq!(root.entries[&4], SerializedInstance::Reference(Some(ObjectHandle(1))));

        let patched = patch(&registry, &before, &after);
        let (target, escort) = patched
            .with(|u: &Unit| (u.target.clone().unwrap(), u.escort.clone().unwrap()))
            .unwrap();
        assert!(target.ptr_eq(&escort));
        assert_eq!(target.with(|m: &Marker| m.label.clone()).unwrap(), "y");
    }

    #[test]
    fn split_shared_target_patches_each_field() {
        let registry = registry();
        let shared = marker("x");
        let before = ObjectRef::new(Unit {
            target: Some(shared.clone()),
            escort: Some(shared),
            ..unit("a")
        });
        let after = ObjectRef::new(Unit {
            target: Some(marker("y")),
            escort: Some(marker("x")),
            ..unit("a")
        });

        let patched = patch(&registry, &before, &after);
        let (target, escort) = patched
            .with(|u: &Unit| (u.target.clone().unwrap(), u.escort.clone().unwrap()))
            .unwrap();
        assert!(!target.ptr_eq(&escort));
        assert_eq!(target.with(|m: &Marker| m.label.clone()).unwrap(), "y");
        assert_eq!(escort.with(|m: &Marker| m.label.clone()).unwrap(), "x");

        let differ = BinaryDiff::new(&registry);
        let rest = differ.generate(&tree(&registry, &patched), &tree(&registry, &after)).unwrap();
        assert!(rest.is_none());
    }

    #[test]
    fn joined_targets_stay_shared() {
        let registry = registry();
        let before = ObjectRef::new(Unit {
            target: Some(marker("x")),
            escort: Some(marker("z")),
            ..unit("a")
        });
        let shared = marker("y");
        let after = ObjectRef::new(Unit {
            target: Some(shared.clone()),
            escort: Some(shared),
            ..unit("a")
        });

        let patched = patch(&registry, &before, &after);
        let (target, escort) = patched
            .with(|u: &Unit| (u.target.clone().unwrap(), u.escort.clone().unwrap()))
            .unwrap();
        assert!(target.ptr_eq(&escort));
        assert_eq!(target.with(|m: &Marker| m.label.clone()).unwrap(), "y");
    }

    #[test]
    fn changed_target_type_is_replaced() {
        let registry = registry();
        let before = ObjectRef::new(Unit {
            target: Some(marker("x")),
            ..unit("a")
        });
        let after = ObjectRef::new(Unit {
            target: Some(ObjectRef::new(unit("t"))),
            ..unit("a")
        });

        let patched = patch(&registry, &before, &after);
        let target = patched.with(|u: &Unit| u.target.clone().unwrap()).unwrap();
        assert_eq!(target.with(|u: &Unit| u.name.clone()).unwrap(), "t");
    }

    #[test]
    fn removed_fields_are_cleared() {
        let registry = registry();
        let before = ObjectRef::new(Unit {
            target: Some(marker("x")),
            ..unit("a")
        });
        let original = tree(&registry, &before);
        let mut modified = original.clone();
        let entries = &mut modified.objects[0].sub_objects[0].entries;
        entries.remove(&0);
        entries.remove(&3);

        let diff = BinaryDiff::new(&registry)
            .generate(&original, &modified)
            .unwrap()
            .unwrap();
        let root = &diff.root().sub_objects[0];
        assert_eq!(root.entries[&0], SerializedInstance::Field(SerializedField::default()));
        assert_eq!(root.entries[&3], SerializedInstance::Reference(None));

        let mut ctx = SerializationContext::new();
        BinaryDiff::new(&registry).apply(&before, &diff, &mut ctx).unwrap();
        before
            .with(|u: &Unit| {
                assert_eq!(u.name, "a");
                assert!(u.target.is_none());
            })
            .unwrap();
    }

    #[test]
    fn mismatched_root_warns() {
        let registry = registry();
        let before = ObjectRef::new(unit("a"));
        let after = ObjectRef::new(Unit {
            name: "b".into(),
            ..unit("a")
        });
        let diff = BinaryDiff::new(&registry)
            .generate(&tree(&registry, &before), &tree(&registry, &after))
            .unwrap()
            .unwrap();

        let other = marker("m");
        let mut ctx = SerializationContext::new();
        BinaryDiff::new(&registry).apply(&other, &diff, &mut ctx).unwrap();
        assert_eq!(
            ctx.warnings(),
            [Warning::TypeMismatch {
                expected: "Marker",
                found: 0xB00,
            }]
        );
    }
}
