//! Pipeline evaluation.
//!
//! A [`Pipeline`] runs a source stage followed by a chain of stages. Each
//! stage receives the [`PipelineFlowState`] of its predecessor and returns a
//! new one:
//!
//! ```text
//! [StaticSource] ──► [SetAttributeStage] ──► ... ──► PipelineFlowState
//! ```
//!
//! # Design
//!
//! - **Copy-on-write hand-off**: stages never modify their input in place, so
//!   cached states and states on other threads stay untouched.
//! - **Validity**: every output is valid over the intersection of its inputs'
//!   validity intervals; the [`PipelineCache`] reuses states by validity.
//! - **Errors become status**: a failing stage yields its input with an error
//!   [`PipelineStatus`] instead of aborting the evaluation.
//! - **Background evaluation**: results come back over a channel and are
//!   published by the thread that owns the pipeline.

pub mod cache;
pub mod executor;
pub mod flow_state;
pub mod stage;
pub mod stages;
pub mod status;
pub mod time;

pub use cache::{PipelineCache, DEFAULT_CACHE_CAPACITY};
pub use executor::{BackgroundEvaluation, Pipeline};
pub use flow_state::PipelineFlowState;
pub use stage::{PipelineStage, StageContext, PIPELINE_STAGE_CLASS};
pub use stages::{SetAttributeStage, StaticSource, SET_ATTRIBUTE_STAGE_CLASS, STATIC_SOURCE_CLASS};
pub use status::{PipelineStatus, StatusKind};
pub use time::{TimeInterval, TimePoint, TIME_NEGATIVE_INFINITY, TIME_POSITIVE_INFINITY};
