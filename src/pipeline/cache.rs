//! Validity-keyed cache of pipeline outputs.

use crate::pipeline::flow_state::PipelineFlowState;
use crate::pipeline::time::TimePoint;
use std::collections::VecDeque;

/// Default number of states kept by a [`PipelineCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

/// Keeps recent pipeline outputs and serves them for any time inside their validity.
#[derive(Debug)]
pub struct PipelineCache {
    states: VecDeque<PipelineFlowState>,
    capacity: usize,
}

impl PipelineCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// A cached state valid at `time`. The returned state shares its data.
    pub fn get(&self, time: TimePoint) -> Option<PipelineFlowState> {
        self.states.iter().find(|s| s.is_valid_at(time)).cloned()
    }

    /// Store `state`, evicting the oldest entry when full.
    /// States with an empty validity are never cached.
    pub fn insert(&mut self, state: PipelineFlowState) -> bool {
        if state.state_validity().is_empty() {
            return false;
        }
        // A newer state replaces older ones covering the same start time.
        let start = state.state_validity().start();
        self.states.retain(|s| !s.is_valid_at(start));
        if self.states.len() == self.capacity {
            self.states.pop_front();
        }
        tracing::trace!(validity = %state.state_validity(), "Caching pipeline output");
        self.states.push_back(state);
        true
    }

    pub fn invalidate(&mut self) {
        if !self.states.is_empty() {
            tracing::debug!(entries = self.states.len(), "Invalidating pipeline cache");
        }
        self.states.clear();
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
