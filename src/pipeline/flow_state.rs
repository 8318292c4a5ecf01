//! The value passed between pipeline stages.

use crate::data::{
    AttributeDataObject, AttributeValue, DataCollection, DataObject, DataObjectPath, DataOORef,
};
use crate::error::{CoreError, Result};
use crate::oo::class::{ObjectClass, StaticClass};
use crate::oo::object::OORef;
use crate::oo::ref_target::RefTarget;
use crate::pipeline::status::PipelineStatus;
use crate::pipeline::time::{TimeInterval, TimePoint};
use std::collections::BTreeMap;

/// Data collection, status and validity produced by a pipeline stage.
///
/// Cloning a flow state only adds a data reference to its collection. The
/// collection is copied the first time [`PipelineFlowState::mutable_data`] is
/// called on a state whose collection is shared.
#[derive(Debug, Clone, Default)]
pub struct PipelineFlowState {
    data: Option<DataOORef<DataCollection>>,
    status: PipelineStatus,
    validity: TimeInterval,
}

impl PipelineFlowState {
    pub fn new(
        data: Option<DataOORef<DataCollection>>,
        status: PipelineStatus,
        validity: TimeInterval,
    ) -> Self {
        Self {
            data,
            status,
            validity,
        }
    }

    /// A state without data, valid at all times.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A state holding `collection`, which may be shared with other states.
    pub fn from_collection(collection: OORef<DataCollection>, validity: TimeInterval) -> Self {
        Self::new(
            Some(DataOORef::new(collection)),
            PipelineStatus::success(),
            validity,
        )
    }

    /// Whether no data has been produced yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Read-only access to the collection.
    pub fn data(&self) -> Option<&DataCollection> {
        self.data.as_deref()
    }

    pub fn data_ref(&self) -> Option<&DataOORef<DataCollection>> {
        self.data.as_ref()
    }

    pub fn set_data(&mut self, data: Option<DataOORef<DataCollection>>) {
        self.data = data;
    }

    /// Drop the data and status, keeping the validity.
    pub fn reset(&mut self) {
        self.data = None;
        self.status = PipelineStatus::success();
    }

    /// Exclusive access to the collection, copying it first if it is shared.
    /// Creates an empty collection if the state has none.
    pub fn mutable_data(&mut self) -> &DataCollection {
        let data = self
            .data
            .get_or_insert_with(|| DataOORef::create(DataCollection::new()));
        data.make_mutable()
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: PipelineStatus) {
        self.status = status;
    }

    pub fn state_validity(&self) -> TimeInterval {
        self.validity
    }

    pub fn set_state_validity(&mut self, validity: TimeInterval) {
        self.validity = validity;
    }

    /// Narrow the validity to the times also covered by `validity`.
    pub fn intersect_state_validity(&mut self, validity: &TimeInterval) {
        self.validity = self.validity.intersect(validity);
    }

    /// Whether the state can be reused for a query at `time`.
    pub fn is_valid_at(&self, time: TimePoint) -> bool {
        self.validity.contains(time)
    }

    fn expect_data(&self) -> Result<&DataCollection> {
        self.data()
            .ok_or_else(|| CoreError::missing_object("DataCollection"))
    }

    pub fn get_object(&self, class: &ObjectClass) -> Option<OORef<dyn DataObject>> {
        self.data()?.get_object(class)
    }

    pub fn get_object_of<T: DataObject>(&self) -> Option<OORef<T>> {
        self.data()?.get_object_of::<T>()
    }

    pub fn contains_object(&self, class: &ObjectClass) -> bool {
        self.data().is_some_and(|d| d.contains_object(class))
    }

    pub fn get_object_by_path(&self, class: &ObjectClass, path: &str) -> Option<DataObjectPath> {
        self.data()?.get_object_by_path(class, path)
    }

    pub fn get_leaf_object(&self, class: &ObjectClass, path: &str) -> Option<OORef<dyn DataObject>> {
        self.data()?.get_leaf_object(class, path)
    }

    pub fn expect_object(&self, class: &ObjectClass) -> Result<OORef<dyn DataObject>> {
        self.expect_data()
            .map_err(|_| CoreError::missing_object(class.display_name()))?
            .expect_object(class)
    }

    pub fn expect_object_of<T: DataObject + StaticClass>(&self) -> Result<OORef<T>> {
        self.expect_data()
            .map_err(|_| CoreError::missing_object(T::static_class().display_name()))?
            .expect_object_of::<T>()
    }

    pub fn expect_leaf_object(&self, class: &ObjectClass, path: &str) -> Result<OORef<dyn DataObject>> {
        self.expect_data()
            .map_err(|_| CoreError::missing_object_at(class.display_name(), path))?
            .expect_leaf_object(class, path)
    }

    pub fn expect_mutable_object(&mut self, class: &ObjectClass) -> Result<OORef<dyn DataObject>> {
        if !self.contains_object(class) {
            return Err(CoreError::missing_object(class.display_name()));
        }
        self.mutable_data().expect_mutable_object(class)
    }

    pub fn expect_mutable_object_of<T: DataObject + StaticClass>(&mut self) -> Result<OORef<T>> {
        if !self.contains_object(T::static_class()) {
            return Err(CoreError::missing_object(T::static_class().display_name()));
        }
        self.mutable_data().expect_mutable_object_of::<T>()
    }

    pub fn expect_mutable_leaf_object(
        &mut self,
        class: &ObjectClass,
        path: &str,
    ) -> Result<OORef<dyn DataObject>> {
        if self.get_leaf_object(class, path).is_none() {
            return Err(CoreError::missing_object_at(class.display_name(), path));
        }
        self.mutable_data().expect_mutable_leaf_object(class, path)
    }

    pub fn add_object(&mut self, object: OORef<dyn DataObject>) {
        self.mutable_data().add_object(object);
    }

    pub fn create_object<T: DataObject>(&mut self, value: T) -> OORef<T> {
        self.mutable_data().create_object(value)
    }

    pub fn remove_object(&mut self, object: &dyn DataObject) -> bool {
        if !self.data().is_some_and(|d| d.contains(object)) {
            return false;
        }
        self.mutable_data().remove_object(object)
    }

    pub fn replace_object(&mut self, old: &dyn DataObject, new: Option<OORef<dyn DataObject>>) -> bool {
        if !self.data().is_some_and(|d| d.contains(old)) {
            return false;
        }
        self.mutable_data().replace_object(old, new)
    }

    pub fn build_attributes_map(&self) -> BTreeMap<String, AttributeValue> {
        self.data()
            .map(DataCollection::build_attributes_map)
            .unwrap_or_default()
    }

    pub fn get_attribute_value(&self, name: &str) -> Option<AttributeValue> {
        self.data()?.get_attribute_value(name)
    }

    pub fn get_attribute_value_by(
        &self,
        source: &OORef<dyn RefTarget>,
        base_name: &str,
    ) -> Option<AttributeValue> {
        self.data()?.get_attribute_value_by(source, base_name)
    }

    pub fn add_attribute(
        &mut self,
        key: &str,
        value: impl Into<AttributeValue>,
        source: Option<&OORef<dyn RefTarget>>,
    ) -> OORef<AttributeDataObject> {
        self.mutable_data().add_attribute(key, value, source)
    }

    pub fn set_attribute(
        &mut self,
        key: &str,
        value: impl Into<AttributeValue>,
        source: Option<&OORef<dyn RefTarget>>,
    ) -> OORef<AttributeDataObject> {
        self.mutable_data().set_attribute(key, value, source)
    }

    /// Animation frame the data was loaded from, or -1.
    pub fn source_frame(&self) -> i64 {
        self.data().map_or(-1, DataCollection::source_frame)
    }
}
