//! Pipeline executor: evaluates a source and its stages, caches the results.
//!
//! Evaluation either runs inline ([`Pipeline::evaluate`]) or on a worker
//! thread ([`Pipeline::evaluate_in_background`]). The worker only reads the
//! stages and works on copy-on-write snapshots; the result travels back over a
//! channel and is published to the cache by the thread that owns the pipeline.
//! Publishing also hands the objects the worker created over to the owning
//! context, since the worker's own context closes when the thread exits.

use crate::data::DataObject;
use crate::error::{CoreError, Result};
use crate::oo::context::ExecutionContext;
use crate::oo::object::{OORef, RefCounted};
use crate::oo::ref_target::{ListenerId, RefTarget};
use crate::pipeline::cache::{PipelineCache, DEFAULT_CACHE_CAPACITY};
use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::stage::{PipelineStage, StageContext};
use crate::pipeline::status::PipelineStatus;
use crate::pipeline::time::{TimeInterval, TimePoint};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A stage together with the listener that invalidates the cache when it changes.
struct WatchedStage {
    stage: OORef<dyn PipelineStage>,
    listener: ListenerId,
}

impl WatchedStage {
    fn new(stage: OORef<dyn PipelineStage>, generation: &Arc<AtomicU64>) -> Self {
        let generation = generation.clone();
        let listener = stage.core().subscribe(move |event| {
            if event.kind.propagates() {
                generation.fetch_add(1, Ordering::AcqRel);
            }
        });
        Self { stage, listener }
    }

    fn unwatch(self) -> OORef<dyn PipelineStage> {
        self.stage.core().unsubscribe(self.listener);
        self.stage
    }
}

/// A source stage followed by an ordered chain of stages.
pub struct Pipeline {
    source: WatchedStage,
    stages: Vec<WatchedStage>,
    cache: PipelineCache,
    /// Bumped whenever a stage or anything it depends on changes.
    generation: Arc<AtomicU64>,
    cached_generation: u64,
    context: ExecutionContext,
}

impl Pipeline {
    pub fn new(source: OORef<dyn PipelineStage>) -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        Self {
            source: WatchedStage::new(source, &generation),
            stages: Vec::new(),
            cache: PipelineCache::new(DEFAULT_CACHE_CAPACITY),
            generation,
            cached_generation: 0,
            context: ExecutionContext::current(),
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = PipelineCache::new(capacity);
        self
    }

    pub fn source(&self) -> &OORef<dyn PipelineStage> {
        &self.source.stage
    }

    pub fn stages(&self) -> impl Iterator<Item = &OORef<dyn PipelineStage>> {
        self.stages.iter().map(|w| &w.stage)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn cache(&self) -> &PipelineCache {
        &self.cache
    }

    /// Append a stage at the end of the chain.
    pub fn push_stage(&mut self, stage: OORef<dyn PipelineStage>) {
        let index = self.stages.len();
        self.insert_stage(index, stage);
    }

    pub fn insert_stage(&mut self, index: usize, stage: OORef<dyn PipelineStage>) {
        tracing::debug!(stage = %stage.title(), index, "Inserting pipeline stage");
        let watched = WatchedStage::new(stage, &self.generation);
        self.stages.insert(index.min(self.stages.len()), watched);
        self.invalidate();
    }

    pub fn remove_stage(&mut self, index: usize) -> Option<OORef<dyn PipelineStage>> {
        if index >= self.stages.len() {
            return None;
        }
        let stage = self.stages.remove(index).unwatch();
        self.invalidate();
        Some(stage)
    }

    /// Discard every cached state.
    pub fn invalidate(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.sync_cache();
    }

    fn sync_cache(&mut self) {
        let current = self.generation.load(Ordering::Acquire);
        if current != self.cached_generation {
            self.cache.invalidate();
            self.cached_generation = current;
        }
    }

    fn snapshot(&self) -> (OORef<dyn PipelineStage>, Vec<OORef<dyn PipelineStage>>) {
        (
            self.source.stage.clone(),
            self.stages.iter().map(|w| w.stage.clone()).collect(),
        )
    }

    /// Output of the pipeline at `time`, served from the cache when possible.
    pub fn evaluate(&mut self, time: TimePoint) -> PipelineFlowState {
        self.sync_cache();
        if let Some(state) = self.cache.get(time) {
            tracing::trace!(time, "Pipeline cache hit");
            return state;
        }
        let (source, stages) = self.snapshot();
        let state = evaluate_chain(&source, &stages, time);
        self.cache.insert(state.clone());
        state
    }

    /// Start evaluating the pipeline on a worker thread.
    ///
    /// Collect the result with [`Pipeline::poll_background`] or
    /// [`Pipeline::wait_background`] on the thread that owns the pipeline.
    pub fn evaluate_in_background(&self, time: TimePoint) -> Result<BackgroundEvaluation> {
        let (source, stages) = self.snapshot();
        let (tx, rx) = bounded(1);
        let handle = std::thread::Builder::new()
            .name(format!("pipeline-eval-{time}"))
            .spawn(move || {
                let state = evaluate_chain(&source, &stages, time);
                let _ = tx.send(state);
            })?;
        tracing::debug!(time, "Started background pipeline evaluation");
        Ok(BackgroundEvaluation {
            time,
            generation: self.generation.load(Ordering::Acquire),
            receiver: rx,
            handle: Some(handle),
        })
    }

    /// Publish the result of a background evaluation if it has arrived.
    pub fn poll_background(&mut self, evaluation: &mut BackgroundEvaluation) -> Option<PipelineFlowState> {
        let state = evaluation.try_take()?;
        self.publish(evaluation.generation, &state);
        Some(state)
    }

    /// Block until a background evaluation finishes and publish its result.
    pub fn wait_background(&mut self, evaluation: BackgroundEvaluation) -> Result<PipelineFlowState> {
        let generation = evaluation.generation;
        let state = evaluation.wait()?;
        self.publish(generation, &state);
        Ok(state)
    }

    fn publish(&mut self, generation: u64, state: &PipelineFlowState) {
        debug_assert!(
            self.context.is_current(),
            "pipeline results must be published by the owning thread"
        );
        let adopted = adopt_output(state, &self.context);
        if adopted > 0 {
            tracing::trace!(adopted, "Adopted objects created by a background evaluation");
        }
        self.sync_cache();
        if generation != self.cached_generation {
            tracing::debug!("Discarding background result of a pipeline that changed since");
        } else {
            self.cache.insert(state.clone());
        }
        if self.context.is_current() {
            self.context.process_pending();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.source.stage.core().unsubscribe(self.source.listener);
        for watched in self.stages.drain(..) {
            watched.unwatch();
        }
    }
}

/// Run `stage` on `input`, turning a failure into an error status.
fn run_stage(stage: &OORef<dyn PipelineStage>, time: TimePoint, input: PipelineFlowState) -> PipelineFlowState {
    if !stage.is_enabled() {
        return input;
    }
    let context = StageContext::new(time, stage.as_target());
    let input_validity = input.state_validity();
    match stage.evaluate(&context, input.clone()) {
        Ok(mut output) => {
            output.intersect_state_validity(&input_validity);
            output
        }
        Err(err) => {
            tracing::warn!(stage = %stage.title(), time, "Pipeline stage failed: {}", err);
            let mut output = input;
            output.set_status(PipelineStatus::from(&err));
            output.intersect_state_validity(&TimeInterval::instant(time));
            output
        }
    }
}

/// Move objects whose owning context has closed into `context`.
fn adopt_output(state: &PipelineFlowState, context: &ExecutionContext) -> usize {
    let Some(data) = state.data_ref() else {
        return 0;
    };
    let mut adopted = 0;
    let mut visited = HashSet::new();
    let mut stack: Vec<OORef<dyn DataObject>> = vec![data.object().clone().into_data_object()];
    while let Some(object) = stack.pop() {
        if !visited.insert(object.addr()) {
            continue;
        }
        adopted += usize::from(object.header().adopt(context));
        for vis in object.vis_elements() {
            adopted += usize::from(vis.header().adopt(context));
        }
        stack.extend(object.sub_objects());
    }
    adopted
}

fn evaluate_chain(
    source: &OORef<dyn PipelineStage>,
    stages: &[OORef<dyn PipelineStage>],
    time: TimePoint,
) -> PipelineFlowState {
    let initial = run_stage(source, time, PipelineFlowState::empty());
    stages
        .iter()
        .fold(initial, |state, stage| run_stage(stage, time, state))
}

/// A pipeline evaluation running on a worker thread.
pub struct BackgroundEvaluation {
    time: TimePoint,
    generation: u64,
    receiver: Receiver<PipelineFlowState>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundEvaluation {
    pub fn time(&self) -> TimePoint {
        self.time
    }

    /// The result, if the worker has finished.
    pub fn try_take(&mut self) -> Option<PipelineFlowState> {
        match self.receiver.try_recv() {
            Ok(state) => {
                self.join();
                Some(state)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                None
            }
        }
    }

    /// Block until the worker has finished.
    pub fn wait(mut self) -> Result<PipelineFlowState> {
        let state = self.receiver.recv().map_err(|_| {
            CoreError::Evaluation(format!(
                "background evaluation at time {} terminated without a result",
                self.time
            ))
        });
        self.join();
        state
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(time = self.time, "Background evaluation thread panicked");
            }
        }
    }
}
