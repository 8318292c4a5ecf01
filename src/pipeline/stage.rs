//! Pipeline stage abstraction.

use crate::error::Result;
use crate::oo::class::{ObjectClass, CORE_PLUGIN_ID};
use crate::oo::object::OORef;
use crate::oo::ref_target::RefTarget;
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::time::TimePoint;
use std::sync::Arc;

/// Common base class of all stages.
pub static PIPELINE_STAGE_CLASS: ObjectClass =
    ObjectClass::new("PipelineStage", CORE_PLUGIN_ID, "Pipeline stage", None, &[], None);

/// Passed to a stage for one evaluation.
pub struct StageContext {
    time: TimePoint,
    stage: OORef<dyn RefTarget>,
}

impl StageContext {
    pub fn new(time: TimePoint, stage: OORef<dyn RefTarget>) -> Self {
        Self { time, stage }
    }

    /// Animation time being evaluated.
    pub fn time(&self) -> TimePoint {
        self.time
    }

    /// The stage being evaluated, recorded as the producer of new data objects.
    pub fn stage(&self) -> &OORef<dyn RefTarget> {
        &self.stage
    }
}

/// A step of a pipeline: turns an input flow state into an output state.
///
/// Sources receive an empty input state. Implementations must not modify
/// the input collection in place; every change goes through
/// [`PipelineFlowState::mutable_data`] so cached states stay untouched.
pub trait PipelineStage: RefTarget {
    fn evaluate(&self, context: &StageContext, input: PipelineFlowState) -> Result<PipelineFlowState>;

    /// Disabled stages pass their input through unchanged.
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<T: PipelineStage> OORef<T> {
    pub fn into_stage(self) -> OORef<dyn PipelineStage> {
        let arc: Arc<dyn PipelineStage> = self.into_arc();
        OORef::from_arc(arc)
    }
}

impl OORef<dyn PipelineStage> {
    /// The same stage as a plain dependency node.
    pub fn as_target(&self) -> OORef<dyn RefTarget> {
        OORef::acquire_arc(self.arc().clone().into_ref_target_arc())
    }
}
