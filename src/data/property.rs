//! Named numeric arrays and the containers that group them.
//!
//! A [`PropertyContainer`] (for example `particles`) owns a list of
//! [`PropertyObject`]s (`Position`, `Mass`, ...) that all describe the same
//! number of elements. Properties are held through data references, so two
//! containers can share an unmodified property array.

use crate::data::object::{DataObject, DataObjectBase, DATA_OBJECT_CLASS};
use crate::error::{CoreError, Result};
use crate::io::migration;
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ObjectClass, StaticClass, CORE_PLUGIN_ID};
use crate::oo::field::{FieldDescriptor, FieldFlags};
use crate::oo::object::{OORef, ObjectHeader, RefCounted};
use crate::oo::ref_target::{RefTarget, Reference, TargetCore, TargetRef};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

pub static PROPERTY_OBJECT_CLASS: ObjectClass = ObjectClass::new(
    "PropertyObject",
    CORE_PLUGIN_ID,
    "Property",
    Some(&DATA_OBJECT_CLASS),
    &[],
    Some(create_property),
);

fn create_property() -> TargetRef {
    TargetRef::Data(OORef::new(PropertyObject::new("", 1, Vec::new())).into_data_object())
}

const PROPERTY_CHUNK: u32 = 0x02;

/// A named array of `len() * component_count()` floating-point values.
pub struct PropertyObject {
    base: DataObjectBase,
    component_count: AtomicUsize,
    values: RwLock<Vec<f64>>,
}

impl PropertyObject {
    pub fn new(name: &str, component_count: usize, values: Vec<f64>) -> Self {
        debug_assert!(component_count > 0);
        debug_assert_eq!(values.len() % component_count.max(1), 0);
        let base = DataObjectBase::new(&PROPERTY_OBJECT_CLASS);
        base.set_identifier(name);
        Self {
            base,
            component_count: AtomicUsize::new(component_count.max(1)),
            values: RwLock::new(values),
        }
    }

    /// Property of `len` zero-initialized elements.
    pub fn zeroed(name: &str, component_count: usize, len: usize) -> Self {
        Self::new(name, component_count, vec![0.0; len * component_count.max(1)])
    }

    pub fn name(&self) -> String {
        self.identifier()
    }

    pub fn component_count(&self) -> usize {
        self.component_count.load(Ordering::Acquire)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values.read().len() / self.component_count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.values.read().clone()
    }

    /// Read the raw values without copying them.
    pub fn with_values<R>(&self, f: impl FnOnce(&[f64]) -> R) -> R {
        f(&self.values.read())
    }

    pub fn value(&self, element: usize, component: usize) -> Option<f64> {
        let stride = self.component_count();
        if component >= stride {
            return None;
        }
        self.values.read().get(element * stride + component).copied()
    }

    pub fn set_values(&self, values: Vec<f64>) {
        self.base.assert_safe_to_modify();
        debug_assert_eq!(values.len() % self.component_count(), 0);
        *self.values.write() = values;
        self.base.core().notify_target_changed();
    }

    pub fn set_value(&self, element: usize, component: usize, value: f64) -> bool {
        self.base.assert_safe_to_modify();
        let stride = self.component_count();
        let updated = component < stride
            && match self.values.write().get_mut(element * stride + component) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            };
        if updated {
            self.base.core().notify_target_changed();
        }
        updated
    }

    /// Grow or shrink to `len` elements, filling new ones with zeros.
    pub fn resize(&self, len: usize) {
        self.base.assert_safe_to_modify();
        let stride = self.component_count();
        self.values.write().resize(len * stride, 0.0);
        self.base.core().notify_target_changed();
    }
}

impl RefCounted for PropertyObject {
    fn header(&self) -> &ObjectHeader {
        self.base.core().header()
    }

    fn about_to_be_deleted(&self) {
        self.base.core().notify_deleted();
    }
}

impl RefTarget for PropertyObject {
    fn core(&self) -> &TargetCore {
        self.base.core()
    }

    fn data_object(&self) -> Option<&dyn DataObject> {
        Some(self)
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.duplicate(),
            component_count: AtomicUsize::new(self.component_count()),
            values: RwLock::new(self.values()),
        }
    }

    fn title(&self) -> String {
        self.name()
    }

    fn save_properties(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        self.base.save(stream)?;
        stream.begin_chunk(PROPERTY_CHUNK)?;
        stream.write_u32(self.component_count() as u32)?;
        let values = self.values.read();
        stream.write_u64(values.len() as u64)?;
        for value in values.iter() {
            stream.write_float(*value)?;
        }
        stream.end_chunk()
    }

    fn load_properties(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        self.base.load(stream)?;
        stream.expect_chunk(PROPERTY_CHUNK)?;
        let position = stream.position()?;
        let components = stream.read_u32()? as usize;
        let count = stream.read_u64()? as usize;
        if components == 0 || count % components != 0 {
            return Err(CoreError::format(
                format!("property array of {count} values with {components} components"),
                position,
            ));
        }
        let mut values = Vec::with_capacity(count.min(1 << 24));
        for _ in 0..count {
            values.push(stream.read_float()?);
        }
        self.component_count.store(components, Ordering::Release);
        *self.values.write() = values;
        stream.close_chunk()
    }
}

impl DataObject for PropertyObject {
    fn data_base(&self) -> &DataObjectBase {
        &self.base
    }
}

impl StaticClass for PropertyObject {
    fn static_class() -> &'static ObjectClass {
        &PROPERTY_OBJECT_CLASS
    }
}

pub static PROPERTIES_FIELD: FieldDescriptor = FieldDescriptor::new(
    "properties",
    "Properties",
    FieldFlags::VECTOR.union(FieldFlags::DATA_OBJECT),
);

pub static PROPERTY_CONTAINER_CLASS: ObjectClass = ObjectClass::new(
    "PropertyContainer",
    CORE_PLUGIN_ID,
    "Property container",
    Some(&DATA_OBJECT_CLASS),
    &[&PROPERTIES_FIELD],
    Some(create_container),
);

fn create_container() -> TargetRef {
    TargetRef::Data(OORef::new(PropertyContainer::new("")).into_data_object())
}

const CONTAINER_CHUNK: u32 = 0x02;

/// A group of properties describing the same set of elements.
pub struct PropertyContainer {
    base: DataObjectBase,
    element_count: AtomicUsize,
}

impl PropertyContainer {
    pub fn new(identifier: &str) -> Self {
        let base = DataObjectBase::new(&PROPERTY_CONTAINER_CLASS);
        base.set_identifier(identifier);
        Self {
            base,
            element_count: AtomicUsize::new(0),
        }
    }

    pub fn element_count(&self) -> usize {
        self.element_count.load(Ordering::Acquire)
    }

    pub fn properties(&self) -> Vec<OORef<PropertyObject>> {
        self.base
            .core()
            .get_all(&PROPERTIES_FIELD)
            .iter()
            .filter_map(TargetRef::downcast::<PropertyObject>)
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<OORef<PropertyObject>> {
        self.properties().into_iter().find(|p| p.name() == name)
    }

    /// Add a property. The first property fixes the element count of an empty container.
    pub fn add_property(&self, property: OORef<PropertyObject>) -> Result<()> {
        self.base.assert_safe_to_modify();
        let is_first = self.base.core().len_of(&PROPERTIES_FIELD) == 0;
        if is_first && self.element_count() == 0 {
            self.element_count.store(property.len(), Ordering::Release);
        } else if property.len() != self.element_count() {
            return Err(CoreError::Integrity(format!(
                "property '{}' has {} elements, container '{}' has {}",
                property.name(),
                property.len(),
                self.identifier(),
                self.element_count()
            )));
        }
        self.base.core().insert(
            &PROPERTIES_FIELD,
            None,
            Reference::data(property.into_data_object()),
        );
        Ok(())
    }

    /// Create and add a zero-initialized property.
    pub fn create_property(&self, name: &str, component_count: usize) -> Result<OORef<PropertyObject>> {
        let property = OORef::new(PropertyObject::zeroed(name, component_count, self.element_count()));
        self.add_property(property.clone())?;
        Ok(property)
    }

    pub fn remove_property(&self, name: &str) -> bool {
        self.base.assert_safe_to_modify();
        match self.property(name) {
            Some(property) => self
                .base
                .core()
                .replace_references_to(property.addr(), None)
                > 0,
            None => false,
        }
    }

    /// Exclusive version of one of this container's properties.
    pub fn make_property_mutable(&self, property: &OORef<PropertyObject>) -> OORef<PropertyObject> {
        self.make_mutable_of(property)
    }

    /// Resize every property, copying shared arrays first.
    pub fn set_element_count(&self, count: usize) {
        self.base.assert_safe_to_modify();
        for property in self.properties() {
            if property.len() != count {
                self.make_property_mutable(&property).resize(count);
            }
        }
        self.element_count.store(count, Ordering::Release);
        self.base.core().notify_target_changed();
    }

    /// Check that every property describes `element_count()` elements.
    pub fn verify_integrity(&self) -> Result<()> {
        let expected = self.element_count();
        for property in self.properties() {
            if property.len() != expected {
                return Err(CoreError::Integrity(format!(
                    "property array '{}' has wrong length: {} instead of {}",
                    property.name(),
                    property.len(),
                    expected
                )));
            }
        }
        Ok(())
    }
}

impl RefCounted for PropertyContainer {
    fn header(&self) -> &ObjectHeader {
        self.base.core().header()
    }

    fn about_to_be_deleted(&self) {
        self.base.core().notify_deleted();
    }
}

impl RefTarget for PropertyContainer {
    fn core(&self) -> &TargetCore {
        self.base.core()
    }

    fn data_object(&self) -> Option<&dyn DataObject> {
        Some(self)
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.duplicate(),
            element_count: AtomicUsize::new(self.element_count()),
        }
    }

    fn title(&self) -> String {
        self.identifier()
    }

    fn save_properties(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        self.base.save(stream)?;
        if !migration::has_container_chunk(stream.format_version()) {
            return Ok(());
        }
        stream.begin_chunk(CONTAINER_CHUNK)?;
        // Recomputable data is always written in full.
        stream.write_bool(false)?;
        stream.write_u64(self.element_count() as u64)?;
        stream.end_chunk()
    }

    fn load_properties(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        self.base.load(stream)?;
        if migration::has_container_chunk(stream.format_version()) {
            stream.expect_chunk(CONTAINER_CHUNK)?;
            let _exclude_recomputable = stream.read_bool()?;
            let count = stream.read_u64()? as usize;
            self.element_count.store(count, Ordering::Release);
            stream.close_chunk()?;
        }
        Ok(())
    }

    fn load_complete(&self) -> Result<()> {
        if self.identifier().is_empty() {
            let fallback = migration::default_container_identifier(self.class());
            tracing::debug!(identifier = %fallback, "Assigning identifier to unnamed property container");
            self.base.restore_identifier(&fallback);
        }
        if self.element_count() == 0 {
            if let Some(first) = self.properties().first() {
                self.element_count.store(first.len(), Ordering::Release);
            }
        }
        self.verify_integrity()
    }
}

impl DataObject for PropertyContainer {
    fn data_base(&self) -> &DataObjectBase {
        &self.base
    }
}

impl StaticClass for PropertyContainer {
    fn static_class() -> &'static ObjectClass {
        &PROPERTY_CONTAINER_CLASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_layout() {
        let prop = PropertyObject::new("Position", 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(prop.len(), 2);
        assert_eq!(prop.component_count(), 3);
        assert_eq!(prop.value(1, 2), Some(6.0));
        assert_eq!(prop.value(0, 3), None);
        assert!(prop.set_value(0, 0, 9.0));
        assert!(!prop.set_value(5, 0, 9.0));
        assert_eq!(prop.with_values(|v| v[0]), 9.0);
    }

    #[test]
    fn test_container_rejects_mismatched_length() {
        let container = PropertyContainer::new("particles");
        container
            .add_property(OORef::new(PropertyObject::zeroed("Position", 3, 4)))
            .unwrap();
        assert_eq!(container.element_count(), 4);
        let err = container
            .add_property(OORef::new(PropertyObject::zeroed("Mass", 1, 5)))
            .unwrap_err();
        assert!(err.to_string().contains("Mass"));
        assert!(container.verify_integrity().is_ok());
    }

    #[test]
    fn test_create_and_remove_property() {
        let container = PropertyContainer::new("particles");
        container
            .add_property(OORef::new(PropertyObject::zeroed("Position", 3, 2)))
            .unwrap();
        let mass = container.create_property("Mass", 1).unwrap();
        assert_eq!(mass.len(), 2);
        assert_eq!(container.properties().len(), 2);
        assert!(container.remove_property("Mass"));
        assert!(!container.remove_property("Mass"));
        assert!(container.property("Position").is_some());
    }

    #[test]
    fn test_set_element_count_copies_shared_arrays() {
        let shared = OORef::new(PropertyObject::zeroed("Mass", 1, 2));
        let a = OORef::new(PropertyContainer::new("a"));
        let b = OORef::new(PropertyContainer::new("b"));
        a.add_property(shared.clone()).unwrap();
        b.add_property(shared.clone()).unwrap();

        a.set_element_count(5);
        assert_eq!(a.property("Mass").unwrap().len(), 5);
        assert_eq!(b.property("Mass").unwrap().len(), 2);
        assert_eq!(shared.len(), 2);
        assert!(a.verify_integrity().is_ok());
    }
}
