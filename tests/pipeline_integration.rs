//! Pipeline evaluation, validity intervals and stage persistence

mod common;

use common::builders::{particles, CollectionBuilder};
use common::{load_from_bytes, save_to_bytes};
use datavis_core::data::{AttributeValue, DataCollection, DataObject, PropertyContainer};
use datavis_core::io::StreamHeader;
use datavis_core::oo::{ExecutionContext, OORef, RefCounted, RefTarget, TargetRef};
use datavis_core::pipeline::{
    Pipeline, PipelineCache, PipelineFlowState, SetAttributeStage, StaticSource, StatusKind,
    TimeInterval,
};

fn source_pipeline() -> (OORef<DataCollection>, Pipeline) {
    let collection = CollectionBuilder::new()
        .container(particles())
        .attribute("Timestep", 10)
        .build();
    let source = OORef::new(StaticSource::with_data(collection.clone()));
    (collection, Pipeline::new(source.into_stage()))
}

#[test]
fn test_narrowed_validity_excludes_later_times() {
    let collection = CollectionBuilder::new().attribute("Timestep", 0).build();
    let mut state = PipelineFlowState::from_collection(collection, TimeInterval::new(0, 10));
    state.intersect_state_validity(&TimeInterval::new(5, 20));

    assert_eq!(state.state_validity(), TimeInterval::new(5, 10));
    assert!(state.is_valid_at(5));
    assert!(state.is_valid_at(9));
    assert!(!state.is_valid_at(10));
    assert!(!state.is_valid_at(12));

    let mut cache = PipelineCache::new(2);
    assert!(cache.insert(state));
    assert!(cache.get(7).is_some());
    assert!(cache.get(12).is_none());
}

#[test]
fn test_stages_do_not_modify_source_data() {
    let (collection, mut pipeline) = source_pipeline();
    pipeline.push_stage(
        OORef::new(SetAttributeStage::new("Label", AttributeValue::from("run-1"))).into_stage(),
    );

    let state = pipeline.evaluate(3);
    assert_eq!(state.status().kind, StatusKind::Success);
    assert!(state.state_validity().is_infinite());
    assert_eq!(
        state.get_attribute_value("Label"),
        Some(AttributeValue::from("run-1"))
    );
    assert_eq!(state.get_attribute_value("Timestep").and_then(|v| v.as_int()), Some(10));

    assert!(collection.get_attribute_value("Label").is_none());
    let output = state.data_ref().unwrap();
    assert!(!output.object().ptr_eq(&collection));
    // Unmodified sub-objects are still shared with the source.
    let input_container = collection.get_object_of::<PropertyContainer>().unwrap();
    let output_container = state.get_object_of::<PropertyContainer>().unwrap();
    assert!(input_container.ptr_eq(&output_container));
}

#[test]
fn test_failing_stage_keeps_data_and_reports_error() {
    let (_collection, mut pipeline) = source_pipeline();
    pipeline.push_stage(OORef::new(SetAttributeStage::new("", AttributeValue::from(1))).into_stage());
    pipeline.push_stage(
        OORef::new(SetAttributeStage::new("After", AttributeValue::from(true))).into_stage(),
    );

    let state = pipeline.evaluate(4);
    // The stage after the failure still runs on the passed-through input.
    assert_eq!(state.get_attribute_value("After"), Some(AttributeValue::from(true)));
    assert_eq!(state.get_attribute_value("Timestep").and_then(|v| v.as_int()), Some(10));
    assert!(!state.state_validity().is_infinite());
    assert!(state.is_valid_at(4));
}

#[test]
fn test_stage_edit_invalidates_cached_state() {
    let (_collection, mut pipeline) = source_pipeline();
    let stage = OORef::new(SetAttributeStage::new("Label", AttributeValue::from("old")));
    pipeline.push_stage(stage.clone().into_stage());

    let first = pipeline.evaluate(0);
    assert_eq!(pipeline.cache().len(), 1);
    assert_eq!(first.get_attribute_value("Label"), Some(AttributeValue::from("old")));

    stage.set_value("new");
    let second = pipeline.evaluate(0);
    assert_eq!(second.get_attribute_value("Label"), Some(AttributeValue::from("new")));
    // The earlier snapshot is unaffected.
    assert_eq!(first.get_attribute_value("Label"), Some(AttributeValue::from("old")));
}

#[test]
fn test_background_result_is_published_on_owner() {
    let (_collection, mut pipeline) = source_pipeline();
    pipeline.push_stage(
        OORef::new(SetAttributeStage::new("Worker", AttributeValue::from(1))).into_stage(),
    );

    let evaluation = pipeline.evaluate_in_background(2).unwrap();
    let state = pipeline.wait_background(evaluation).unwrap();
    assert_eq!(state.get_attribute_value("Worker").and_then(|v| v.as_int()), Some(1));
    assert!(pipeline.cache().get(2).is_some());

    // Objects made on the worker now belong to this thread.
    let owner = ExecutionContext::current();
    let output = state.data_ref().unwrap().object().clone().into_data_object();
    assert_eq!(output.header().context(), owner);
    assert!(output
        .sub_objects()
        .iter()
        .all(|child| child.header().context() == owner));
    drop(state);
    drop(output);
    assert_eq!(owner.pending_count(), 0);
}

#[test]
fn test_pipeline_stages_survive_stream_round_trip() {
    let collection = CollectionBuilder::new().attribute("Timestep", 5).build();
    let source = OORef::new(StaticSource::with_data(collection));
    let stage = OORef::new(SetAttributeStage::new("Label", AttributeValue::from(2.5)));

    let bytes = save_to_bytes(&TargetRef::from(source.into_target()), StreamHeader::default());
    let loaded = load_from_bytes(bytes).downcast::<StaticSource>().unwrap();
    let data = loaded.data().unwrap();
    assert_eq!(data.get_attribute_value("Timestep").and_then(|v| v.as_int()), Some(5));

    let bytes = save_to_bytes(&TargetRef::from(stage.into_target()), StreamHeader::default());
    let loaded = load_from_bytes(bytes).downcast::<SetAttributeStage>().unwrap();
    assert_eq!(loaded.name(), "Label");
    assert_eq!(loaded.value(), AttributeValue::from(2.5));
    assert_eq!(loaded.title(), "Set attribute Label");
}
