//! # datavis-core: object model, copy-on-write data and session streams
//!
//! The substrate a visualization application builds on. Objects are
//! reference counted and torn down on the thread that owns them; processed
//! data travels between pipeline stages as copy-on-write snapshots; object
//! graphs are persisted in a chunked binary format that keeps shared
//! sub-objects shared.
//!
//! ## Architecture
//!
//! - **oo**: reference counting, execution contexts, class and field
//!   descriptors, the dependency graph with change events, cloning
//! - **data**: data objects with a second, data-reference count, data
//!   collections and the concrete attribute, property and vis element types
//! - **pipeline**: flow states, validity intervals, stages, caching and
//!   background evaluation
//! - **io**: `SaveStream`/`LoadStream`, object streams and session files
//!
//! ## Configuration
//!
//! [`config::CoreConfig`] is stored as TOML under the platform config
//! directory in `dev.hxyulin.datavis-core`.
//!
//! ## Example
//!
//! ```ignore
//! use datavis_core::{
//!     data::DataCollection,
//!     oo::OORef,
//!     pipeline::{Pipeline, SetAttributeStage, StaticSource},
//! };
//!
//! let collection = OORef::new(DataCollection::new());
//! collection.add_attribute("Timestep", 0, None);
//!
//! let mut pipeline = Pipeline::new(OORef::new(StaticSource::with_data(collection)).into_stage());
//! pipeline.push_stage(OORef::new(SetAttributeStage::new("Label", "run-1".into())).into_stage());
//!
//! let state = pipeline.evaluate(0);
//! assert!(state.get_attribute_value("Label").is_some());
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod logging;
pub mod oo;
pub mod pipeline;

use oo::class::ObjectClass;

// Re-export commonly used types
pub use config::CoreConfig;
pub use data::{AttributeValue, DataCollection, DataObject, DataOORef};
pub use error::{CoreError, Result, ResultExt};
pub use io::{LoadStream, ObjectLoadStream, ObjectSaveStream, SaveStream, StreamHeader};
pub use oo::{ExecutionContext, OORef, OOWeakRef, RefTarget};
pub use pipeline::{Pipeline, PipelineFlowState, PipelineStatus, TimeInterval};

/// Every concrete class the crate can restore from a stream.
pub(crate) fn builtin_classes() -> [&'static ObjectClass; 7] {
    [
        &data::DATA_COLLECTION_CLASS,
        &data::ATTRIBUTE_DATA_OBJECT_CLASS,
        &data::PROPERTY_OBJECT_CLASS,
        &data::PROPERTY_CONTAINER_CLASS,
        &data::VIS_ELEMENT_CLASS,
        &pipeline::STATIC_SOURCE_CLASS,
        &pipeline::SET_ATTRIBUTE_STAGE_CLASS,
    ]
}
