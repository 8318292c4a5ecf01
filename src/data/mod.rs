//! Copy-on-write data objects and the collections that carry them.
//!
//! - [`object`]: the [`DataObject`] trait and its shared base state
//! - [`data_ref`]: [`DataOORef`], the handle that makes an object shared
//! - [`collection`]: [`DataCollection`], one snapshot of processed data
//! - [`path`]: addressing nested objects by identifier path
//! - [`attribute`], [`property`], [`vis`]: concrete object types

pub mod attribute;
pub mod collection;
pub mod data_ref;
pub mod object;
pub mod path;
pub mod property;
pub mod vis;

pub use attribute::{AttributeDataObject, AttributeValue, ATTRIBUTE_DATA_OBJECT_CLASS};
pub use collection::{DataCollection, DATA_COLLECTION_CLASS, OBJECTS_FIELD, SOURCE_FRAME_ATTRIBUTE};
pub use data_ref::DataOORef;
pub use object::{
    AsDataObject, DataObject, DataObjectBase, DATA_OBJECT_CLASS, DATA_SOURCE_FIELD,
    EDITABLE_PROXY_FIELD, VIS_ELEMENTS_FIELD,
};
pub use path::{DataObjectPath, DataObjectReference};
pub use property::{
    PropertyContainer, PropertyObject, PROPERTIES_FIELD, PROPERTY_CONTAINER_CLASS,
    PROPERTY_OBJECT_CLASS,
};
pub use vis::{VisElement, VIS_ELEMENT_CLASS};
