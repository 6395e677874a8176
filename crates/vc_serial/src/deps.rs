//! Reference walks over live object graphs.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use vc_reflect::descriptor::{FieldFlags, TypeDescriptor};
use vc_reflect::{ObjectRef, Reflect, SchemaError};
use vc_utils::IdentityMap;

/// Returns every object `root` depends on, in breadth-first order.
///
/// Weak references and fields flagged
/// [`SKIP_IN_REFERENCE_SEARCH`](FieldFlags::SKIP_IN_REFERENCE_SEARCH) are
/// not followed. Each object appears once and `root` itself never does,
/// even when a cycle leads back to it.
///
/// # Examples
///
/// ```
/// use vc_reflect::{derive::Reflect, ObjectRef};
/// use vc_serial::deps::find_dependencies;
///
/// #[derive(Reflect, Default)]
/// #[reflect(id = 80)]
/// struct Task {
///     #[reflect(id = 0)]
///     after: Vec<Option<ObjectRef>>,
///     #[reflect(id = 1, skip_in_reference_search)]
///     hint: Option<ObjectRef>,
/// }
///
/// let a = ObjectRef::new(Task::default());
/// let b = ObjectRef::new(Task { after: vec![Some(a.clone())], hint: None });
/// let c = ObjectRef::new(Task {
///     after: vec![Some(b.clone()), Some(a.clone())],
///     hint: Some(ObjectRef::new(Task::default())),
/// });
///
/// let deps = find_dependencies(&c).unwrap();
/// assert_eq!(deps.len(), 2);
/// assert!(deps[0].ptr_eq(&b));
/// assert!(deps[1].ptr_eq(&a));
/// ```
pub fn find_dependencies(root: &ObjectRef) -> Result<Vec<ObjectRef>, SchemaError> {
    let mut seen: IdentityMap<()> = IdentityMap::new();
    seen.insert(root.as_ptr(), ());

    let mut found = Vec::new();
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(object) = queue.pop_front() {
        let mut targets = Vec::new();
        collect_references(&**object.read(), &mut targets)?;
        for target in targets {
            if seen.get_or_insert_with(target.as_ptr(), || ()).1 {
                found.push(target.clone());
                queue.push_back(target);
            }
        }
    }
    log::trace!("found {} dependencies of `{}`", found.len(), root.descriptor().name());
    Ok(found)
}

/// Pushes the followed references held by `object` and its embedded values.
fn collect_references(object: &dyn Reflect, out: &mut Vec<ObjectRef>) -> Result<(), SchemaError> {
    let chain: Vec<&'static TypeDescriptor> = object.descriptor().chain().collect();
    for (depth, &descriptor) in chain.iter().enumerate() {
        let level = crate::level_ref(object, depth, descriptor)?;
        let mut schema = descriptor.instantiate();
        for field in descriptor.fields() {
            let wrap = SchemaError::field(descriptor.name(), field.name());
            if let Some(access) = field.as_reflectable_ptr() {
                if field.flags().intersects(FieldFlags::WEAK_REF | FieldFlags::SKIP_IN_REFERENCE_SEARCH) {
                    continue;
                }
                for index in 0..access.len(&mut schema, level).map_err(wrap)? {
                    out.extend(access.get(&mut schema, level, index).map_err(wrap)?);
                }
            } else if let Some(access) = field.as_reflectable() {
                for index in 0..access.len(&mut schema, level).map_err(wrap)? {
                    let child = access.get(&mut schema, level, index).map_err(wrap)?;
                    collect_references(child, out)?;
                }
            }
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use vc_reflect::ObjectRef;
    use vc_reflect::derive::Reflect;

    use super::find_dependencies;

    #[derive(Reflect, Default)]
    #[reflect(id = 0xA01)]
    struct Slot {
        #[reflect(id = 0)]
        item: Option<ObjectRef>,
    }

    #[derive(Reflect, Default)]
    #[reflect(id = 0xA00)]
    struct Node {
        #[reflect(id = 0)]
        next: Option<ObjectRef>,
        #[reflect(id = 1, weak)]
        back: Option<ObjectRef>,
        #[reflect(id = 2, reflectable)]
        slot: Slot,
    }

    #[test]
    fn cycles_and_weak_links_are_not_followed_twice() {
        let a = ObjectRef::new(Node::default());
        let b = ObjectRef::new(Node {
            next: Some(a.clone()),
            ..Default::default()
        });
        let weak_only = ObjectRef::new(Node::default());
        a.with_mut(|n: &mut Node| {
            n.next = Some(b.clone());
            n.back = Some(weak_only.clone());
        });

        let deps = find_dependencies(&a).unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps[0].ptr_eq(&b));

        a.with_mut(|n: &mut Node| n.next = None);
    }

    #[test]
    fn embedded_values_are_searched() {
        let item = ObjectRef::new(Node::default());
        let root = ObjectRef::new(Node {
            slot: Slot {
                item: Some(item.clone()),
            },
            ..Default::default()
        });
        let deps = find_dependencies(&root).unwrap();
        assert_eq!(deps.len(), 1);
        assert!(deps[0].ptr_eq(&item));
        assert!(find_dependencies(&item).unwrap().is_empty());
    }
}
