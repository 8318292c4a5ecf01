//! Object model: lifetime, class descriptors and the dependency graph.
//!
//! - [`object`]: reference counting with context-affine teardown
//! - [`context`]: per-thread run queues receiving deferred teardown
//! - [`class`] / [`field`]: hand-written class and field descriptor tables
//! - [`ref_target`]: reference fields, dependents and change events
//! - [`clone`]: flag-driven shallow and deep copies

pub mod class;
pub mod clone;
pub mod context;
pub mod field;
pub mod object;
pub mod ref_target;

pub use class::{ClassRegistry, ObjectClass, StaticClass, CORE_PLUGIN_ID};
pub use clone::CloneHelper;
pub use context::ExecutionContext;
pub use field::{FieldDescriptor, FieldFlags};
pub use object::{object_addr, LifetimeState, OORef, OOWeakRef, ObjectHeader, RefCounted};
pub use ref_target::{
    AsRefTarget, ListenerId, ObjectId, RefTarget, Reference, ReferenceEvent, ReferenceEventKind,
    TargetCore, TargetRef,
};
