//! The data collection: one snapshot of processed data.
//!
//! A [`DataCollection`] holds an ordered list of top-level data objects through
//! data references. Read access never copies anything; every mutable accessor
//! goes through [`DataObject::make_mutable`] so that objects shared with other
//! collections (for example a cached pipeline output) are copied first.
//!
//! ## Paths
//!
//! Nested objects are addressed by slash-separated identifiers such as
//! `"particles/Position"`. Objects with an empty identifier are transparent
//! when the path ends before them.

use crate::data::attribute::{AttributeDataObject, AttributeValue, ATTRIBUTE_DATA_OBJECT_CLASS};
use crate::data::object::{DataObject, DataObjectBase, DATA_OBJECT_CLASS};
use crate::data::path::{DataObjectPath, DataObjectReference};
use crate::error::{CoreError, Result};
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ObjectClass, StaticClass, CORE_PLUGIN_ID};
use crate::oo::clone::CloneHelper;
use crate::oo::field::{FieldDescriptor, FieldFlags};
use crate::oo::object::{object_addr, OORef, ObjectHeader, RefCounted};
use crate::oo::ref_target::{RefTarget, Reference, TargetCore, TargetRef};
use std::collections::BTreeMap;

pub static OBJECTS_FIELD: FieldDescriptor = FieldDescriptor::new(
    "objects",
    "Data objects",
    FieldFlags::VECTOR.union(FieldFlags::DATA_OBJECT),
);

pub static DATA_COLLECTION_CLASS: ObjectClass = ObjectClass::new(
    "DataCollection",
    CORE_PLUGIN_ID,
    "Data collection",
    Some(&DATA_OBJECT_CLASS),
    &[&OBJECTS_FIELD],
    Some(create_collection),
);

fn create_collection() -> TargetRef {
    TargetRef::Data(OORef::new(DataCollection::new()).into_data_object())
}

/// Attribute holding the animation frame the data was loaded from.
pub const SOURCE_FRAME_ATTRIBUTE: &str = "SourceFrame";

/// Ordered container of data objects.
pub struct DataCollection {
    base: DataObjectBase,
}

impl DataCollection {
    pub fn new() -> Self {
        Self {
            base: DataObjectBase::new(&DATA_COLLECTION_CLASS),
        }
    }

    /// Top-level objects, in insertion order.
    pub fn objects(&self) -> Vec<OORef<dyn DataObject>> {
        self.base
            .core()
            .get_all(&OBJECTS_FIELD)
            .into_iter()
            .filter_map(TargetRef::into_data)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.base.core().len_of(&OBJECTS_FIELD)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index_of(&self, object: &dyn DataObject) -> Option<usize> {
        let addr = object_addr(object);
        self.objects().iter().position(|o| o.addr() == addr)
    }

    /// Whether `object` is a top-level member.
    pub fn contains(&self, object: &dyn DataObject) -> bool {
        self.index_of(object).is_some()
    }

    /// Append an object unless it is already a member.
    pub fn add_object(&self, object: OORef<dyn DataObject>) {
        self.base.assert_safe_to_modify();
        if !self.contains(&*object) {
            self.base
                .core()
                .insert(&OBJECTS_FIELD, None, Reference::data(object));
        }
    }

    /// Insert an object at `index`, clamped to the end of the list.
    pub fn insert_object(&self, index: usize, object: OORef<dyn DataObject>) {
        self.base.assert_safe_to_modify();
        if !self.contains(&*object) {
            self.base
                .core()
                .insert(&OBJECTS_FIELD, Some(index), Reference::data(object));
        }
    }

    /// Wrap `value` in a new object and append it.
    pub fn create_object<T: DataObject>(&self, value: T) -> OORef<T> {
        let object = OORef::new(value);
        self.add_object(object.clone().into_data_object());
        object
    }

    /// Append an object, renaming it first if its identifier is taken.
    ///
    /// An object already held by another container is copied before the
    /// rename. Returns the object that was added.
    pub fn add_object_with_unique_id(&self, object: OORef<dyn DataObject>) -> OORef<dyn DataObject> {
        let identifier = self.generate_unique_identifier(&object.identifier(), object.class());
        let object = if identifier == object.identifier() {
            object
        } else {
            let object = if object.data_reference_count() == 0 {
                object
            } else {
                CloneHelper::new().clone_data_object(&*object, false)
            };
            object.set_identifier(&identifier);
            object
        };
        self.add_object(object.clone());
        object
    }

    pub fn remove_object(&self, object: &dyn DataObject) -> bool {
        match self.index_of(object) {
            Some(index) => self.remove_object_by_index(index).is_some(),
            None => false,
        }
    }

    pub fn remove_object_by_index(&self, index: usize) -> Option<OORef<dyn DataObject>> {
        self.base.assert_safe_to_modify();
        let removed = self.base.core().remove(&OBJECTS_FIELD, index)?;
        removed.view().and_then(TargetRef::into_data)
    }

    /// Replace a top-level object by another one, or remove it with `None`.
    pub fn replace_object(&self, old: &dyn DataObject, new: Option<OORef<dyn DataObject>>) -> bool {
        self.base.assert_safe_to_modify();
        let Some(index) = self.index_of(old) else {
            return false;
        };
        match new {
            Some(new) => self
                .base
                .core()
                .replace_at(&OBJECTS_FIELD, index, Reference::data(new))
                .is_some(),
            None => self.base.core().remove(&OBJECTS_FIELD, index).is_some(),
        }
    }

    pub fn clear(&self) {
        self.base.assert_safe_to_modify();
        self.base.core().clear(&OBJECTS_FIELD);
    }

    /// First top-level object of `class` or a subclass.
    pub fn get_object(&self, class: &ObjectClass) -> Option<OORef<dyn DataObject>> {
        self.objects()
            .into_iter()
            .find(|o| o.class().is_derived_from(class))
    }

    pub fn get_object_of<T: DataObject>(&self) -> Option<OORef<T>> {
        self.objects().iter().find_map(|o| o.downcast::<T>())
    }

    pub fn get_objects(&self, class: &ObjectClass) -> Vec<OORef<dyn DataObject>> {
        self.objects()
            .into_iter()
            .filter(|o| o.class().is_derived_from(class))
            .collect()
    }

    pub fn get_objects_of<T: DataObject>(&self) -> Vec<OORef<T>> {
        self.objects().iter().filter_map(|o| o.downcast::<T>()).collect()
    }

    pub fn contains_object(&self, class: &ObjectClass) -> bool {
        self.get_object(class).is_some()
    }

    pub fn expect_object(&self, class: &ObjectClass) -> Result<OORef<dyn DataObject>> {
        self.get_object(class)
            .ok_or_else(|| CoreError::missing_object(class.display_name()))
    }

    pub fn expect_object_of<T: DataObject + StaticClass>(&self) -> Result<OORef<T>> {
        self.get_object_of::<T>()
            .ok_or_else(|| CoreError::missing_object(T::static_class().display_name()))
    }

    /// Exclusive version of the first top-level object of `class`.
    pub fn expect_mutable_object(&self, class: &ObjectClass) -> Result<OORef<dyn DataObject>> {
        let object = self.expect_object(class)?;
        Ok(self.make_mutable(&object))
    }

    pub fn expect_mutable_object_of<T: DataObject + StaticClass>(&self) -> Result<OORef<T>> {
        let object = self.expect_object_of::<T>()?;
        Ok(self.make_mutable_of(&object))
    }

    /// Whether any object in the tree is of `class`.
    pub fn contains_object_recursive(&self, class: &ObjectClass) -> bool {
        fn visit(object: &OORef<dyn DataObject>, class: &ObjectClass) -> bool {
            object.class().is_derived_from(class)
                || object.visit_sub_objects(&mut |sub| visit(sub, class))
        }
        self.objects().iter().any(|o| visit(o, class))
    }

    /// Paths to every object of `class` in the tree, depth first.
    pub fn get_objects_recursive(&self, class: &ObjectClass) -> Vec<DataObjectPath> {
        fn collect(class: &ObjectClass, path: &mut DataObjectPath, results: &mut Vec<DataObjectPath>) {
            let Some(object) = path.leaf().cloned() else {
                return;
            };
            if object.class().is_derived_from(class) {
                results.push(path.clone());
            }
            for sub in object.sub_objects() {
                path.push(sub);
                collect(class, path, results);
                path.pop();
            }
        }
        let mut results = Vec::new();
        for object in self.objects() {
            let mut path = DataObjectPath::from_objects(vec![object]);
            collect(class, &mut path, &mut results);
        }
        results
    }

    /// Full path to the object of `class` addressed by `path`. An empty path
    /// selects the first matching object anywhere in the tree.
    pub fn get_object_by_path(&self, class: &ObjectClass, path: &str) -> Option<DataObjectPath> {
        if path.is_empty() {
            return self.get_objects_recursive(class).into_iter().next();
        }
        for object in self.objects() {
            let mut result = DataObjectPath::from_objects(vec![object]);
            if find_path(class, path, &mut result) {
                return Some(result);
            }
        }
        None
    }

    pub fn expect_object_by_path(&self, class: &ObjectClass, path: &str) -> Result<DataObjectPath> {
        self.get_object_by_path(class, path)
            .ok_or_else(|| missing(class, path))
    }

    /// The object of `class` whose own identifier ends `path`.
    pub fn get_leaf_object(&self, class: &ObjectClass, path: &str) -> Option<OORef<dyn DataObject>> {
        if path.is_empty() {
            return self
                .get_objects_recursive(class)
                .into_iter()
                .next()
                .and_then(|p| p.leaf().cloned());
        }
        self.objects().iter().find_map(|o| find_leaf(class, path, o))
    }

    pub fn expect_leaf_object(&self, class: &ObjectClass, path: &str) -> Result<OORef<dyn DataObject>> {
        self.get_leaf_object(class, path)
            .ok_or_else(|| missing(class, path))
    }

    pub fn get_object_by_reference(&self, reference: &DataObjectReference) -> Option<DataObjectPath> {
        self.get_object_by_path(reference.class(), reference.path())
    }

    /// Object of `class` produced by `source` whose identifier is `identifier`
    /// or `identifier` with a uniqueness suffix.
    pub fn get_object_by(
        &self,
        class: &ObjectClass,
        source: &OORef<dyn RefTarget>,
        identifier: &str,
    ) -> Option<OORef<dyn DataObject>> {
        debug_assert!(!identifier.is_empty());
        let prefix = format!("{identifier}.");
        self.objects().into_iter().find(|o| {
            o.class().is_derived_from(class)
                && o.data_source().is_some_and(|s| s.ptr_eq(source))
                && {
                    let id = o.identifier();
                    id == identifier || id.starts_with(&prefix)
                }
        })
    }

    /// Make every object along `path` exclusive, copying shared ones.
    pub fn make_mutable_path(&self, path: &DataObjectPath) -> DataObjectPath {
        let mut result = DataObjectPath::new();
        for object in path.iter() {
            let mutable = match result.leaf() {
                Some(parent) => parent.make_mutable(object),
                None => self.make_mutable(object),
            };
            result.push(mutable);
        }
        result
    }

    /// Like [`DataCollection::get_object_by_path`], with every object along the
    /// path made exclusive.
    pub fn get_mutable_object(&self, class: &ObjectClass, path: &str) -> Option<DataObjectPath> {
        let path = self.get_object_by_path(class, path)?;
        Some(self.make_mutable_path(&path))
    }

    pub fn expect_mutable_object_by_path(&self, class: &ObjectClass, path: &str) -> Result<DataObjectPath> {
        self.get_mutable_object(class, path)
            .ok_or_else(|| missing(class, path))
    }

    pub fn expect_mutable_leaf_object(&self, class: &ObjectClass, path: &str) -> Result<OORef<dyn DataObject>> {
        let path = self.expect_mutable_object_by_path(class, path)?;
        path.leaf()
            .cloned()
            .ok_or_else(|| missing(class, &path.to_string_path()))
    }

    /// Replace every shared object in the tree by an exclusive copy.
    pub fn make_all_mutable_recursive(&self) {
        fn visit(parent: &dyn DataObject, helper: &mut CloneHelper) {
            for sub in parent.sub_objects() {
                if !parent.contains_sub_object(&*sub) {
                    continue;
                }
                let sub = if sub.is_safe_to_modify() {
                    sub
                } else {
                    let copy = helper.clone_data_object(&*sub, false);
                    parent
                        .core()
                        .replace_references_to(sub.addr(), Some(Reference::data(copy.clone())));
                    copy
                };
                visit(&*sub, helper);
            }
        }
        self.base.assert_safe_to_modify();
        visit(self, &mut CloneHelper::new());
    }

    /// All global attributes by name. Repeated names get `.2`, `.3`, ... suffixes.
    pub fn build_attributes_map(&self) -> BTreeMap<String, AttributeValue> {
        let mut attributes = BTreeMap::new();
        for attribute in self.get_objects_of::<AttributeDataObject>() {
            let name = attribute.identifier();
            let key = if attributes.contains_key(&name) {
                (2..)
                    .map(|counter| format!("{name}.{counter}"))
                    .find(|candidate| !attributes.contains_key(candidate))
                    .unwrap_or_default()
            } else {
                name
            };
            attributes.insert(key, attribute.value());
        }
        attributes
    }

    pub fn get_attribute_value(&self, name: &str) -> Option<AttributeValue> {
        self.get_objects_of::<AttributeDataObject>()
            .into_iter()
            .find(|a| a.identifier() == name)
            .map(|a| a.value())
    }

    /// Value of the attribute produced by `source` under `base_name`.
    pub fn get_attribute_value_by(&self, source: &OORef<dyn RefTarget>, base_name: &str) -> Option<AttributeValue> {
        self.get_object_by(&ATTRIBUTE_DATA_OBJECT_CLASS, source, base_name)
            .and_then(|o| o.downcast::<AttributeDataObject>())
            .map(|a| a.value())
    }

    /// Append a new attribute, even if one with the same name exists.
    pub fn add_attribute(
        &self,
        key: &str,
        value: impl Into<AttributeValue>,
        source: Option<&OORef<dyn RefTarget>>,
    ) -> OORef<AttributeDataObject> {
        let attribute = AttributeDataObject::new(key, value.into());
        attribute.set_data_source(source);
        self.create_object(attribute)
    }

    /// Set the value of an attribute, overwriting an existing one with the same name.
    pub fn set_attribute(
        &self,
        key: &str,
        value: impl Into<AttributeValue>,
        source: Option<&OORef<dyn RefTarget>>,
    ) -> OORef<AttributeDataObject> {
        let existing = self
            .get_objects_of::<AttributeDataObject>()
            .into_iter()
            .find(|a| a.identifier() == key);
        match existing {
            Some(attribute) => {
                let attribute = self.make_mutable_of(&attribute);
                attribute.set_value(value.into());
                attribute.set_data_source(source);
                attribute
            }
            None => self.add_attribute(key, value, source),
        }
    }

    /// `base`, or `base.N` with the smallest N >= 2 not used by an object of `class`.
    pub fn generate_unique_identifier(&self, base: &str, class: &ObjectClass) -> String {
        let taken: Vec<String> = self
            .get_objects(class)
            .iter()
            .map(|o| o.identifier())
            .collect();
        if !taken.iter().any(|id| id == base) {
            return base.to_string();
        }
        (2..)
            .map(|index| format!("{base}.{index}"))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_default()
    }

    /// Animation frame the data was loaded from, or -1.
    pub fn source_frame(&self) -> i64 {
        self.get_attribute_value(SOURCE_FRAME_ATTRIBUTE)
            .and_then(|v| v.to_f64())
            .map_or(-1, |frame| frame as i64)
    }
}

impl Default for DataCollection {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(class: &ObjectClass, path: &str) -> CoreError {
    if path.is_empty() {
        CoreError::missing_object(class.display_name())
    } else {
        CoreError::missing_object_at(class.display_name(), path)
    }
}

fn find_path(class: &ObjectClass, path: &str, result: &mut DataObjectPath) -> bool {
    let Some(object) = result.leaf().cloned() else {
        return false;
    };
    let sub_path = if path.is_empty() {
        if object.class().is_derived_from(class) {
            return true;
        }
        if !object.identifier().is_empty() {
            return false;
        }
        ""
    } else {
        match path.split_once('/') {
            None => {
                if object.identifier() != path {
                    return false;
                }
                if object.class().is_derived_from(class) {
                    return true;
                }
                ""
            }
            Some((head, rest)) if object.identifier() == head => rest,
            Some(_) => return false,
        }
    };
    for sub in object.sub_objects() {
        result.push(sub);
        if find_path(class, sub_path, result) {
            return true;
        }
        result.pop();
    }
    false
}

fn find_leaf(class: &ObjectClass, path: &str, parent: &OORef<dyn DataObject>) -> Option<OORef<dyn DataObject>> {
    if path.is_empty() {
        if parent.class().is_derived_from(class) {
            return Some(parent.clone());
        }
        if !parent.identifier().is_empty() {
            return None;
        }
        return parent.sub_objects().iter().find_map(|sub| find_leaf(class, "", sub));
    }
    match path.split_once('/') {
        None => (parent.class().is_derived_from(class) && parent.identifier() == path)
            .then(|| parent.clone()),
        Some((head, rest)) if parent.identifier() == head => parent
            .sub_objects()
            .iter()
            .find_map(|sub| find_leaf(class, rest, sub)),
        Some(_) => None,
    }
}

impl RefCounted for DataCollection {
    fn header(&self) -> &ObjectHeader {
        self.base.core().header()
    }

    fn about_to_be_deleted(&self) {
        self.base.core().notify_deleted();
    }
}

impl RefTarget for DataCollection {
    fn core(&self) -> &TargetCore {
        self.base.core()
    }

    fn data_object(&self) -> Option<&dyn DataObject> {
        Some(self)
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.duplicate(),
        }
    }

    fn save_properties(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        self.base.save(stream)
    }

    fn load_properties(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        self.base.load(stream)
    }
}

impl DataObject for DataCollection {
    fn data_base(&self) -> &DataObjectBase {
        &self.base
    }
}

impl StaticClass for DataCollection {
    fn static_class() -> &'static ObjectClass {
        &DATA_COLLECTION_CLASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::property::{PropertyContainer, PropertyObject, PROPERTY_CONTAINER_CLASS, PROPERTY_OBJECT_CLASS};
    use crate::data::vis::VisElement;
    use crate::data::DataOORef;

    fn particles() -> OORef<PropertyContainer> {
        let container = OORef::new(PropertyContainer::new("particles"));
        container
            .add_property(OORef::new(PropertyObject::new("Position", 3, vec![0.0; 6])))
            .unwrap();
        container
            .add_property(OORef::new(PropertyObject::new("Mass", 1, vec![1.0, 2.0])))
            .unwrap();
        container
    }

    #[test]
    fn test_structural_edits() {
        let collection = DataCollection::new();
        let a = OORef::new(AttributeDataObject::new("A", AttributeValue::Int(1))).into_data_object();
        let b = OORef::new(AttributeDataObject::new("B", AttributeValue::Int(2))).into_data_object();
        collection.add_object(a.clone());
        collection.add_object(a.clone());
        assert_eq!(collection.len(), 1);

        collection.insert_object(0, b.clone());
        let ids: Vec<String> = collection.objects().iter().map(|o| o.identifier()).collect();
        assert_eq!(ids, ["B", "A"]);

        assert!(collection.remove_object(&*b));
        assert!(!collection.remove_object(&*b));
        assert_eq!(b.data_reference_count(), 0);

        let c = OORef::new(AttributeDataObject::new("C", AttributeValue::Int(3))).into_data_object();
        assert!(collection.replace_object(&*a, Some(c.clone())));
        assert!(collection.contains(&*c));
        assert!(!collection.contains(&*a));

        collection.clear();
        assert!(collection.is_empty());
    }

    #[test]
    fn test_lookup_by_class() {
        let collection = DataCollection::new();
        collection.add_attribute("Timestep", 10, None);
        collection.add_object(particles().into_data_object());

        assert!(collection.contains_object(&PROPERTY_CONTAINER_CLASS));
        assert!(!collection.contains_object(&PROPERTY_OBJECT_CLASS));
        assert!(collection.contains_object_recursive(&PROPERTY_OBJECT_CLASS));
        assert!(collection.get_object_of::<PropertyContainer>().is_some());
        assert_eq!(collection.get_objects(&DATA_OBJECT_CLASS).len(), 2);
        assert_eq!(collection.get_objects_recursive(&PROPERTY_OBJECT_CLASS).len(), 2);
    }

    #[test]
    fn test_expect_object_error_message() {
        let collection = DataCollection::new();
        let err = collection.expect_object(&PROPERTY_CONTAINER_CLASS).unwrap_err();
        assert!(err.is_missing_object());
        assert_eq!(
            err.to_string(),
            "The dataset does not contain an object of type: Property container"
        );

        let err = collection
            .expect_leaf_object(&PROPERTY_OBJECT_CLASS, "particles/Charge")
            .unwrap_err();
        assert!(err.to_string().contains("particles/Charge"));
    }

    #[test]
    fn test_path_lookup() {
        let collection = DataCollection::new();
        collection.add_object(particles().into_data_object());

        let path = collection
            .get_object_by_path(&PROPERTY_OBJECT_CLASS, "particles/Mass")
            .unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.to_string(), "particles/Mass");

        // A path ending at a container resolves to its first matching child.
        let first = collection
            .get_object_by_path(&PROPERTY_OBJECT_CLASS, "particles")
            .unwrap();
        assert_eq!(first.leaf().unwrap().identifier(), "Position");

        assert!(collection
            .get_object_by_path(&PROPERTY_OBJECT_CLASS, "bonds/Mass")
            .is_none());
        let leaf = collection
            .get_leaf_object(&PROPERTY_OBJECT_CLASS, "particles/Mass")
            .unwrap();
        assert_eq!(leaf.identifier(), "Mass");
        assert!(collection
            .get_leaf_object(&PROPERTY_OBJECT_CLASS, "particles")
            .is_none());

        let reference = DataObjectReference::from_path(&path).unwrap();
        let again = collection.get_object_by_reference(&reference).unwrap();
        assert!(again.leaf().unwrap().ptr_eq(path.leaf().unwrap()));
    }

    #[test]
    fn test_mutable_path_copies_shared_ancestors() {
        let original = DataOORef::create(DataCollection::new());
        original.add_object(particles().into_data_object());
        let mut copy = original.clone();
        let copy = copy.make_mutable();

        let path = copy
            .expect_mutable_object_by_path(&PROPERTY_OBJECT_CLASS, "particles/Mass")
            .unwrap();
        let mass = path.leaf().unwrap().downcast::<PropertyObject>().unwrap();
        mass.set_value(0, 0, 99.0);

        let untouched = original
            .get_leaf_object(&PROPERTY_OBJECT_CLASS, "particles/Mass")
            .unwrap()
            .downcast::<PropertyObject>()
            .unwrap();
        assert_eq!(untouched.values(), vec![1.0, 2.0]);
        assert_eq!(
            copy.get_object_of::<PropertyContainer>()
                .unwrap()
                .property("Mass")
                .unwrap()
                .values(),
            vec![99.0, 2.0]
        );
        // The unmodified sibling is still shared.
        let position_a = original.get_leaf_object(&PROPERTY_OBJECT_CLASS, "particles/Position").unwrap();
        let position_b = copy.get_leaf_object(&PROPERTY_OBJECT_CLASS, "particles/Position").unwrap();
        assert!(position_a.ptr_eq(&position_b));
    }

    #[test]
    fn test_make_all_mutable_recursive() {
        let shared = particles();
        let first = DataCollection::new();
        let second = DataCollection::new();
        first.add_object(shared.clone().into_data_object());
        second.add_object(shared.clone().into_data_object());

        first.make_all_mutable_recursive();
        let container = first.get_object_of::<PropertyContainer>().unwrap();
        assert!(!container.ptr_eq(&shared));
        assert!(container.is_safe_to_modify());
        for property in container.properties() {
            assert!(property.is_safe_to_modify());
        }
        assert!(second.get_object_of::<PropertyContainer>().unwrap().ptr_eq(&shared));
    }

    #[test]
    fn test_attributes_map_suffixes_duplicates() {
        let collection = DataCollection::new();
        collection.add_attribute("Energy", 1.0, None);
        collection.add_attribute("Energy", 2.0, None);
        collection.add_attribute("Energy", 3.0, None);
        collection.add_attribute("Timestep", 5, None);

        let map = collection.build_attributes_map();
        assert_eq!(map.len(), 4);
        assert_eq!(map["Energy"], AttributeValue::Float(1.0));
        assert_eq!(map["Energy.2"], AttributeValue::Float(2.0));
        assert_eq!(map["Energy.3"], AttributeValue::Float(3.0));
        assert_eq!(collection.get_attribute_value("Timestep"), Some(AttributeValue::Int(5)));
    }

    #[test]
    fn test_set_attribute_overwrites() {
        let collection = DataCollection::new();
        collection.set_attribute("Timestep", 1, None);
        collection.set_attribute("Timestep", 2, None);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get_attribute_value("Timestep"), Some(AttributeValue::Int(2)));
    }

    #[test]
    fn test_attribute_lookup_by_source() {
        let collection = DataCollection::new();
        let source = OORef::new(VisElement::new("stage stand-in")).into_target();
        let other = OORef::new(VisElement::new("other")).into_target();
        collection.add_attribute("Count", 1, Some(&other));
        collection.add_attribute("Count.2", 2, Some(&source));

        assert_eq!(
            collection.get_attribute_value_by(&source, "Count"),
            Some(AttributeValue::Int(2))
        );
        assert!(collection
            .get_object_by(&ATTRIBUTE_DATA_OBJECT_CLASS, &source, "Missing")
            .is_none());
    }

    #[test]
    fn test_unique_identifiers() {
        let collection = DataCollection::new();
        assert_eq!(collection.generate_unique_identifier("bonds", &PROPERTY_CONTAINER_CLASS), "bonds");
        collection.add_object(OORef::new(PropertyContainer::new("bonds")).into_data_object());
        assert_eq!(collection.generate_unique_identifier("bonds", &PROPERTY_CONTAINER_CLASS), "bonds.2");

        collection.add_object_with_unique_id(OORef::new(PropertyContainer::new("bonds")).into_data_object());
        let ids: Vec<String> = collection.objects().iter().map(|o| o.identifier()).collect();
        assert_eq!(ids, ["bonds", "bonds.2"]);
        assert_eq!(collection.generate_unique_identifier("bonds", &PROPERTY_CONTAINER_CLASS), "bonds.3");
        // Identifiers of other classes do not collide.
        assert_eq!(collection.generate_unique_identifier("bonds", &ATTRIBUTE_DATA_OBJECT_CLASS), "bonds");
    }

    #[test]
    fn test_unique_id_copies_object_held_elsewhere() {
        let other = DataCollection::new();
        let shared = OORef::new(PropertyContainer::new("bonds")).into_data_object();
        other.add_object(shared.clone());

        let collection = DataCollection::new();
        collection.add_object(OORef::new(PropertyContainer::new("bonds")).into_data_object());
        let added = collection.add_object_with_unique_id(shared.clone());
        assert!(!added.ptr_eq(&shared));
        assert_eq!(added.identifier(), "bonds.2");
        assert_eq!(shared.identifier(), "bonds");
        assert!(collection.contains(&*added));
        assert_eq!(shared.data_reference_count(), 1);

        // No rename needed: the shared object itself is added.
        let fresh = DataCollection::new();
        assert!(fresh.add_object_with_unique_id(shared.clone()).ptr_eq(&shared));
        assert_eq!(shared.data_reference_count(), 2);
    }

    #[test]
    fn test_source_frame() {
        let collection = DataCollection::new();
        assert_eq!(collection.source_frame(), -1);
        collection.set_attribute(SOURCE_FRAME_ATTRIBUTE, 7, None);
        assert_eq!(collection.source_frame(), 7);
    }
}
