//! Shared data objects with copy-on-write semantics.
//!
//! A [`DataObject`] is a [`RefTarget`] carrying a second counter, the number
//! of [`DataOORef`]s that hold it. While that count is at most one the object
//! is exclusively owned and may be modified in place. Otherwise a modifier
//! must call [`DataObject::make_mutable`] on the parent, which swaps in a
//! private copy and returns it.
//!
//! ## Base fields
//!
//! | Field            | Flags                                   |
//! |------------------|-----------------------------------------|
//! | `visElements`    | vector, never cloned (copies share)     |
//! | `editableProxy`  | never cloned, no change messages        |
//! | `dataSource`     | weak, not saved, no change messages     |

use crate::data::data_ref::DataOORef;
use crate::error::Result;
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ObjectClass, CORE_PLUGIN_ID};
use crate::oo::clone::CloneHelper;
use crate::oo::field::{FieldDescriptor, FieldFlags};
use crate::oo::object::{object_addr, OORef};
use crate::oo::ref_target::{RefTarget, Reference, TargetCore, TargetRef};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub static VIS_ELEMENTS_FIELD: FieldDescriptor = FieldDescriptor::new(
    "visElements",
    "Visual elements",
    FieldFlags::VECTOR.union(FieldFlags::NEVER_CLONE_TARGET),
);

pub static EDITABLE_PROXY_FIELD: FieldDescriptor = FieldDescriptor::new(
    "editableProxy",
    "Editable proxy",
    FieldFlags::NEVER_CLONE_TARGET.union(FieldFlags::NO_CHANGE_MESSAGE),
);

pub static DATA_SOURCE_FIELD: FieldDescriptor = FieldDescriptor::new(
    "dataSource",
    "Data source",
    FieldFlags::WEAK_REF
        .union(FieldFlags::DONT_SAVE)
        .union(FieldFlags::NO_CHANGE_MESSAGE),
);

pub static DATA_OBJECT_CLASS: ObjectClass = ObjectClass::new(
    "DataObject",
    CORE_PLUGIN_ID,
    "Data object",
    None,
    &[&VIS_ELEMENTS_FIELD, &EDITABLE_PROXY_FIELD, &DATA_SOURCE_FIELD],
    None,
);

const BASE_CHUNK: u32 = 0x01;

/// State common to every data object.
pub struct DataObjectBase {
    core: TargetCore,
    identifier: RwLock<String>,
    data_references: AtomicUsize,
}

impl DataObjectBase {
    pub fn new(class: &'static ObjectClass) -> Self {
        debug_assert!(class.is_derived_from(&DATA_OBJECT_CLASS));
        Self {
            core: TargetCore::new(class),
            identifier: RwLock::new(String::new()),
            data_references: AtomicUsize::new(0),
        }
    }

    /// New base of the same class carrying the same identifier.
    pub fn duplicate(&self) -> Self {
        let copy = Self::new(self.core.class());
        *copy.identifier.write() = self.identifier.read().clone();
        copy
    }

    pub fn core(&self) -> &TargetCore {
        &self.core
    }

    pub fn identifier(&self) -> String {
        self.identifier.read().clone()
    }

    pub fn set_identifier(&self, identifier: &str) {
        self.assert_safe_to_modify();
        let changed = {
            let mut current = self.identifier.write();
            if *current == identifier {
                false
            } else {
                *current = identifier.to_string();
                true
            }
        };
        if changed {
            self.core.notify_target_changed();
        }
    }

    /// Assign the identifier while restoring an object from a stream.
    pub(crate) fn restore_identifier(&self, identifier: &str) {
        *self.identifier.write() = identifier.to_string();
    }

    pub fn data_reference_count(&self) -> usize {
        self.data_references.load(Ordering::Acquire)
    }

    pub fn is_safe_to_modify(&self) -> bool {
        self.data_reference_count() <= 1
    }

    pub(crate) fn increment_data_reference_count(&self) {
        self.data_references.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_data_reference_count(&self) {
        let previous = self.data_references.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "data reference count underflow");
    }

    /// Debug check guarding every in-place modification.
    pub fn assert_safe_to_modify(&self) {
        debug_assert!(
            self.is_safe_to_modify(),
            "modifying a {} that is shared by {} data references",
            self.core.class().name(),
            self.data_reference_count()
        );
    }

    pub fn save(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        stream.begin_chunk(BASE_CHUNK)?;
        stream.write_string(&self.identifier.read())?;
        stream.end_chunk()
    }

    pub fn load(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        stream.expect_chunk(BASE_CHUNK)?;
        self.restore_identifier(&stream.read_string()?);
        stream.close_chunk()
    }
}

/// Casting helpers implemented for every [`DataObject`].
pub trait AsDataObject {
    fn as_data_object(&self) -> &dyn DataObject;
    fn into_data_object_arc(self: Arc<Self>) -> Arc<dyn DataObject>;
    /// Fresh instance with copied properties and empty reference fields.
    fn duplicate_data(&self) -> OORef<dyn DataObject>;
}

impl<T: DataObject> AsDataObject for T {
    fn as_data_object(&self) -> &dyn DataObject {
        self
    }

    fn into_data_object_arc(self: Arc<Self>) -> Arc<dyn DataObject> {
        self
    }

    fn duplicate_data(&self) -> OORef<dyn DataObject> {
        OORef::new(self.duplicate()).into_data_object()
    }
}

/// A dependency node that takes part in copy-on-write sharing.
pub trait DataObject: RefTarget + AsDataObject {
    fn data_base(&self) -> &DataObjectBase;

    fn identifier(&self) -> String {
        self.data_base().identifier()
    }

    fn set_identifier(&self, identifier: &str) {
        self.data_base().set_identifier(identifier);
    }

    fn data_reference_count(&self) -> usize {
        self.data_base().data_reference_count()
    }

    /// True while at most one data reference holds this object.
    fn is_safe_to_modify(&self) -> bool {
        self.data_base().is_safe_to_modify()
    }

    /// Pipeline stage that produced this object, if it is still alive.
    fn data_source(&self) -> Option<OORef<dyn RefTarget>> {
        self.core().get(&DATA_SOURCE_FIELD).map(|t| t.to_target())
    }

    fn set_data_source(&self, source: Option<&OORef<dyn RefTarget>>) {
        self.data_base().assert_safe_to_modify();
        self.core()
            .set(&DATA_SOURCE_FIELD, source.map(Reference::weak));
    }

    fn editable_proxy(&self) -> Option<OORef<dyn RefTarget>> {
        self.core().get(&EDITABLE_PROXY_FIELD).map(|t| t.to_target())
    }

    fn set_editable_proxy(&self, proxy: Option<OORef<dyn RefTarget>>) {
        self.data_base().assert_safe_to_modify();
        self.core()
            .set(&EDITABLE_PROXY_FIELD, proxy.map(Reference::Strong));
    }

    fn vis_elements(&self) -> Vec<OORef<dyn RefTarget>> {
        self.core()
            .get_all(&VIS_ELEMENTS_FIELD)
            .iter()
            .map(TargetRef::to_target)
            .collect()
    }

    /// The first attached visual element.
    fn vis_element(&self) -> Option<OORef<dyn RefTarget>> {
        self.core().get(&VIS_ELEMENTS_FIELD).map(|t| t.to_target())
    }

    fn add_vis_element(&self, vis: OORef<dyn RefTarget>) {
        self.data_base().assert_safe_to_modify();
        self.core()
            .insert(&VIS_ELEMENTS_FIELD, None, Reference::Strong(vis));
    }

    /// Replace all visual elements by a single one, or remove them.
    fn set_vis_element(&self, vis: Option<OORef<dyn RefTarget>>) {
        self.data_base().assert_safe_to_modify();
        self.core().clear(&VIS_ELEMENTS_FIELD);
        if let Some(vis) = vis {
            self.core()
                .insert(&VIS_ELEMENTS_FIELD, None, Reference::Strong(vis));
        }
    }

    /// Direct sub-objects held through data references.
    fn sub_objects(&self) -> Vec<OORef<dyn DataObject>> {
        self.core().data_objects()
    }

    /// Call `visitor` for each direct sub-object until it returns true.
    fn visit_sub_objects(&self, visitor: &mut dyn FnMut(&OORef<dyn DataObject>) -> bool) -> bool {
        self.sub_objects().iter().any(|object| visitor(object))
    }

    /// Whether `object` is a direct sub-object.
    fn contains_sub_object(&self, object: &dyn DataObject) -> bool {
        self.core().find_data_object(object_addr(object)).is_some()
    }

    /// Exclusive version of a direct sub-object, cloned if it is shared.
    fn make_mutable(&self, sub_object: &OORef<dyn DataObject>) -> OORef<dyn DataObject> {
        self.make_mutable_with(sub_object, false)
    }

    fn make_mutable_with(&self, sub_object: &OORef<dyn DataObject>, deep_copy: bool) -> OORef<dyn DataObject> {
        self.data_base().assert_safe_to_modify();
        let Some((field, index, current)) = self.core().find_data_object(sub_object.addr()) else {
            debug_assert!(false, "make_mutable() called with an object that is not a sub-object");
            tracing::error!(
                parent = self.class().name(),
                "make_mutable() called with an object that is not a sub-object"
            );
            return sub_object.clone();
        };
        if current.is_safe_to_modify() {
            return current;
        }
        let copy = CloneHelper::new().clone_data_object(&*current, deep_copy);
        self.core().replace_at(field, index, Reference::data(copy.clone()));
        tracing::debug!(
            parent = self.class().name(),
            class = copy.class().name(),
            identifier = %copy.identifier(),
            "Replaced shared sub-object by a private copy"
        );
        copy
    }

    /// Typed variant of [`DataObject::make_mutable`].
    fn make_mutable_of<T: DataObject>(&self, sub_object: &OORef<T>) -> OORef<T>
    where
        Self: Sized,
    {
        let object = sub_object.clone().into_data_object();
        self.make_mutable(&object)
            .downcast::<T>()
            .unwrap_or_else(|| sub_object.clone())
    }

    /// Swap a direct sub-object for another one, or remove it.
    fn replace_sub_object(&self, old: &dyn DataObject, new: Option<OORef<dyn DataObject>>) -> bool {
        self.data_base().assert_safe_to_modify();
        self.core()
            .replace_references_to(object_addr(old), new.map(Reference::data))
            > 0
    }
}

impl<T: DataObject> OORef<T> {
    pub fn into_data_object(self) -> OORef<dyn DataObject> {
        let arc: Arc<dyn DataObject> = self.into_arc();
        OORef::from_arc(arc)
    }
}

impl OORef<dyn DataObject> {
    /// The same object as a plain dependency node.
    pub fn as_target(&self) -> OORef<dyn RefTarget> {
        OORef::acquire_arc(self.arc().clone().into_ref_target_arc())
    }

    pub fn downcast<T: DataObject>(&self) -> Option<OORef<T>> {
        let any = self.arc().clone().into_any_arc();
        any.downcast::<T>().ok().map(OORef::acquire_arc)
    }

    pub fn is<T: DataObject>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl<T: DataObject> From<OORef<T>> for DataOORef<dyn DataObject> {
    fn from(object: OORef<T>) -> Self {
        DataOORef::new(object.into_data_object())
    }
}
