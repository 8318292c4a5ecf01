//! Generic object cloning driven by field flags.

use crate::data::DataObject;
use crate::oo::field::FieldFlags;
use crate::oo::object::{object_addr, OORef};
use crate::oo::ref_target::{Reference, RefTarget, TargetRef};
use std::collections::HashMap;

/// Clones objects, copying each source object at most once.
///
/// A shallow copy shares every referenced target. A deep copy clones strong
/// and data references recursively, except those flagged
/// [`FieldFlags::NEVER_CLONE_TARGET`]. Weak references are carried over as-is
/// and [`FieldFlags::NO_CLONE`] fields are left empty.
#[derive(Default)]
pub struct CloneHelper {
    clones: HashMap<usize, TargetRef>,
}

impl CloneHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone a dependency node.
    ///
    /// Data objects are cloned as such, whichever kind of field they were
    /// reached through.
    pub fn clone_target(&mut self, source: &dyn RefTarget, deep_copy: bool) -> OORef<dyn RefTarget> {
        let addr = object_addr(source);
        if let Some(existing) = self.clones.get(&addr) {
            return existing.to_target();
        }
        if let Some(data) = source.data_object() {
            return self.clone_data_object(data, deep_copy).as_target();
        }
        let copy = source.duplicate_target();
        self.clones.insert(addr, TargetRef::Target(copy.clone()));
        self.copy_reference_fields(source, &*copy, deep_copy);
        copy
    }

    /// Clone a data object.
    pub fn clone_data_object(&mut self, source: &dyn DataObject, deep_copy: bool) -> OORef<dyn DataObject> {
        let addr = object_addr(source);
        if let Some(existing) = self.clones.get(&addr).and_then(TargetRef::as_data) {
            return existing.clone();
        }
        let copy = source.duplicate_data();
        self.clones.insert(addr, TargetRef::Data(copy.clone()));
        self.copy_reference_fields(source.as_ref_target(), copy.as_ref_target(), deep_copy);
        tracing::trace!(
            class = source.class().name(),
            identifier = %source.identifier(),
            deep_copy,
            "Cloned data object"
        );
        copy
    }

    /// Fill the reference fields of `dest` from those of `source`.
    pub fn copy_reference_fields(&mut self, source: &dyn RefTarget, dest: &dyn RefTarget, deep_copy: bool) {
        debug_assert!(std::ptr::eq(source.class(), dest.class()));
        for (field, targets) in source.core().snapshot() {
            if field.flags().contains(FieldFlags::NO_CLONE) {
                continue;
            }
            let share = !deep_copy || field.flags().contains(FieldFlags::NEVER_CLONE_TARGET);
            let values: Vec<Reference> = targets
                .into_iter()
                .map(|target| {
                    if field.is_weak() {
                        return Reference::Weak(target.to_target().downgrade());
                    }
                    match target {
                        TargetRef::Data(object) if share => Reference::data(object),
                        TargetRef::Data(object) => Reference::data(self.clone_data_object(&*object, true)),
                        TargetRef::Target(object) if share => Reference::Strong(object),
                        TargetRef::Target(object) => Reference::Strong(self.clone_target(&*object, true)),
                    }
                })
                .collect();
            dest.core().init_field(field, values);
        }
    }
}
