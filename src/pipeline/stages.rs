//! Built-in pipeline stages.

use crate::data::{AttributeValue, DataCollection};
use crate::error::{CoreError, Result};
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ObjectClass, StaticClass, CORE_PLUGIN_ID};
use crate::oo::field::{FieldDescriptor, FieldFlags};
use crate::oo::object::{OORef, ObjectHeader, RefCounted};
use crate::oo::ref_target::{RefTarget, Reference, TargetCore, TargetRef};
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::stage::{PipelineStage, StageContext, PIPELINE_STAGE_CLASS};
use crate::pipeline::time::TimeInterval;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

// ==================== Static Source ====================

pub static SOURCE_DATA_FIELD: FieldDescriptor =
    FieldDescriptor::new("data_collection", "Data collection", FieldFlags::DATA_OBJECT);

pub static STATIC_SOURCE_CLASS: ObjectClass = ObjectClass::new(
    "StaticSource",
    CORE_PLUGIN_ID,
    "Static source",
    Some(&PIPELINE_STAGE_CLASS),
    &[&SOURCE_DATA_FIELD],
    Some(create_static_source),
);

fn create_static_source() -> TargetRef {
    TargetRef::Target(OORef::new(StaticSource::new()).into_target())
}

/// Source stage that hands out a fixed data collection, valid at all times.
///
/// The collection is shared with every state the source produces, so
/// downstream stages copy it before modifying it.
pub struct StaticSource {
    core: TargetCore,
}

impl StaticSource {
    pub fn new() -> Self {
        Self {
            core: TargetCore::new(&STATIC_SOURCE_CLASS),
        }
    }

    pub fn with_data(collection: OORef<DataCollection>) -> Self {
        let source = Self::new();
        source.set_data(Some(collection));
        source
    }

    pub fn data(&self) -> Option<OORef<DataCollection>> {
        self.core
            .get(&SOURCE_DATA_FIELD)
            .and_then(|target| target.downcast::<DataCollection>())
    }

    pub fn set_data(&self, collection: Option<OORef<DataCollection>>) {
        let value = collection.map(|c| Reference::data(c.into_data_object()));
        self.core.set(&SOURCE_DATA_FIELD, value);
    }
}

impl Default for StaticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCounted for StaticSource {
    fn header(&self) -> &ObjectHeader {
        self.core.header()
    }

    fn about_to_be_deleted(&self) {
        self.core.notify_deleted();
    }
}

impl RefTarget for StaticSource {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn duplicate(&self) -> Self {
        Self::new()
    }
}

impl PipelineStage for StaticSource {
    fn evaluate(&self, _context: &StageContext, _input: PipelineFlowState) -> Result<PipelineFlowState> {
        Ok(match self.data() {
            Some(collection) => PipelineFlowState::from_collection(collection, TimeInterval::infinite()),
            None => PipelineFlowState::empty(),
        })
    }
}

impl StaticClass for StaticSource {
    fn static_class() -> &'static ObjectClass {
        &STATIC_SOURCE_CLASS
    }
}

// ==================== Set Attribute ====================

pub static SET_ATTRIBUTE_STAGE_CLASS: ObjectClass = ObjectClass::new(
    "SetAttributeStage",
    CORE_PLUGIN_ID,
    "Set attribute",
    Some(&PIPELINE_STAGE_CLASS),
    &[],
    Some(create_set_attribute_stage),
);

fn create_set_attribute_stage() -> TargetRef {
    TargetRef::Target(OORef::new(SetAttributeStage::new("", AttributeValue::Int(0))).into_target())
}

const SET_ATTRIBUTE_CHUNK: u32 = 0x01;

/// Stores a global attribute in the data passing through it.
pub struct SetAttributeStage {
    core: TargetCore,
    name: RwLock<String>,
    value: RwLock<AttributeValue>,
    enabled: AtomicBool,
}

impl SetAttributeStage {
    pub fn new(name: &str, value: AttributeValue) -> Self {
        Self {
            core: TargetCore::new(&SET_ATTRIBUTE_STAGE_CLASS),
            name: RwLock::new(name.to_string()),
            value: RwLock::new(value),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    pub fn set_name(&self, name: &str) {
        *self.name.write() = name.to_string();
        self.core.notify_target_changed();
    }

    pub fn value(&self) -> AttributeValue {
        self.value.read().clone()
    }

    pub fn set_value(&self, value: impl Into<AttributeValue>) {
        *self.value.write() = value.into();
        self.core.notify_target_changed();
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            self.core.notify_target_changed();
        }
    }
}

impl RefCounted for SetAttributeStage {
    fn header(&self) -> &ObjectHeader {
        self.core.header()
    }

    fn about_to_be_deleted(&self) {
        self.core.notify_deleted();
    }
}

impl RefTarget for SetAttributeStage {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn duplicate(&self) -> Self {
        let copy = Self::new(&self.name(), self.value());
        copy.enabled.store(self.is_enabled(), Ordering::Release);
        copy
    }

    fn title(&self) -> String {
        format!("Set attribute {}", self.name.read())
    }

    fn save_properties(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        stream.begin_chunk(SET_ATTRIBUTE_CHUNK)?;
        stream.write_string(&self.name.read())?;
        self.value.read().save(stream)?;
        stream.write_bool(self.is_enabled())?;
        stream.end_chunk()
    }

    fn load_properties(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        stream.expect_chunk(SET_ATTRIBUTE_CHUNK)?;
        *self.name.write() = stream.read_string()?;
        *self.value.write() = AttributeValue::load(stream)?;
        self.enabled.store(stream.read_bool()?, Ordering::Release);
        stream.close_chunk()
    }
}

impl PipelineStage for SetAttributeStage {
    fn evaluate(&self, context: &StageContext, input: PipelineFlowState) -> Result<PipelineFlowState> {
        let name = self.name();
        if name.is_empty() {
            return Err(CoreError::Evaluation("attribute name must not be empty".into()));
        }
        let mut output = input;
        output.set_attribute(&name, self.value(), Some(context.stage()));
        Ok(output)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

impl StaticClass for SetAttributeStage {
    fn static_class() -> &'static ObjectClass {
        &SET_ATTRIBUTE_STAGE_CLASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataObject;

    fn context_for<T: RefTarget>(stage: &OORef<T>, time: i32) -> StageContext {
        StageContext::new(time, stage.clone().into_target())
    }

    #[test]
    fn test_static_source_shares_its_collection() {
        let collection = OORef::new(DataCollection::new());
        collection.add_attribute("Frame", 1, None);
        let source = OORef::new(StaticSource::with_data(collection.clone()));

        let state = source
            .evaluate(&context_for(&source, 0), PipelineFlowState::empty())
            .unwrap();
        assert!(state.data_ref().unwrap().object().ptr_eq(&collection));
        assert_eq!(collection.data_reference_count(), 2);
        assert!(state.state_validity().is_infinite());
    }

    #[test]
    fn test_set_attribute_copies_shared_input() {
        let collection = OORef::new(DataCollection::new());
        collection.add_attribute("Frame", 1, None);
        let source = OORef::new(StaticSource::with_data(collection.clone()));
        let input = source
            .evaluate(&context_for(&source, 0), PipelineFlowState::empty())
            .unwrap();

        let stage = OORef::new(SetAttributeStage::new("Frame", AttributeValue::Int(5)));
        let output = stage.evaluate(&context_for(&stage, 0), input).unwrap();
        assert_eq!(output.get_attribute_value("Frame"), Some(AttributeValue::Int(5)));
        assert_eq!(collection.get_attribute_value("Frame"), Some(AttributeValue::Int(1)));

        let producer = output
            .data()
            .unwrap()
            .get_objects_of::<crate::data::AttributeDataObject>()[0]
            .data_source()
            .unwrap();
        assert!(producer.ptr_eq(&stage));
    }

    #[test]
    fn test_empty_attribute_name_is_an_error() {
        let stage = OORef::new(SetAttributeStage::new("", AttributeValue::Bool(true)));
        let result = stage.evaluate(&context_for(&stage, 0), PipelineFlowState::empty());
        assert!(matches!(result, Err(CoreError::Evaluation(_))));
    }

    #[test]
    fn test_changes_notify_listeners() {
        let stage = OORef::new(SetAttributeStage::new("A", AttributeValue::Int(1)));
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = count.clone();
        stage.core().subscribe(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        stage.set_value(2);
        stage.set_enabled(false);
        stage.set_enabled(false);
        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert!(!stage.is_enabled());
        assert_eq!(stage.title(), "Set attribute A");
    }
}
