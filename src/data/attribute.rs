//! Global attributes: named scalar values carried in a data collection.

use crate::data::object::{DataObject, DataObjectBase, DATA_OBJECT_CLASS};
use crate::error::{CoreError, Result};
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ObjectClass, StaticClass, CORE_PLUGIN_ID};
use crate::oo::object::{OORef, ObjectHeader, RefCounted};
use crate::oo::ref_target::{RefTarget, TargetCore, TargetRef};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a global attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric value, converting integers and booleans.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::String(_) => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            AttributeValue::Bool(_) => 0,
            AttributeValue::Int(_) => 1,
            AttributeValue::Float(_) => 2,
            AttributeValue::String(_) => 3,
        }
    }

    pub fn save(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        stream.write_u8(self.tag())?;
        match self {
            AttributeValue::Bool(v) => stream.write_bool(*v),
            AttributeValue::Int(v) => stream.write_i64(*v),
            AttributeValue::Float(v) => stream.write_float(*v),
            AttributeValue::String(v) => stream.write_string(v),
        }
    }

    pub fn load(stream: &mut LoadStream<'_>) -> Result<Self> {
        let position = stream.position()?;
        Ok(match stream.read_u8()? {
            0 => AttributeValue::Bool(stream.read_bool()?),
            1 => AttributeValue::Int(stream.read_i64()?),
            2 => AttributeValue::Float(stream.read_float()?),
            3 => AttributeValue::String(stream.read_string()?),
            tag => {
                return Err(CoreError::format(
                    format!("unknown attribute value tag {tag}"),
                    position,
                ))
            }
        })
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

pub static ATTRIBUTE_DATA_OBJECT_CLASS: ObjectClass = ObjectClass::new(
    "AttributeDataObject",
    CORE_PLUGIN_ID,
    "Global attribute",
    Some(&DATA_OBJECT_CLASS),
    &[],
    Some(create_attribute),
);

fn create_attribute() -> TargetRef {
    TargetRef::Data(
        OORef::new(AttributeDataObject::new("", AttributeValue::Int(0))).into_data_object(),
    )
}

const VALUE_CHUNK: u32 = 0x02;

/// A single global attribute. The identifier is the attribute name.
pub struct AttributeDataObject {
    base: DataObjectBase,
    value: RwLock<AttributeValue>,
}

impl AttributeDataObject {
    pub fn new(name: &str, value: AttributeValue) -> Self {
        let base = DataObjectBase::new(&ATTRIBUTE_DATA_OBJECT_CLASS);
        base.set_identifier(name);
        Self {
            base,
            value: RwLock::new(value),
        }
    }

    pub fn value(&self) -> AttributeValue {
        self.value.read().clone()
    }

    pub fn set_value(&self, value: AttributeValue) {
        self.base.assert_safe_to_modify();
        *self.value.write() = value;
        self.base.core().notify_target_changed();
    }
}

impl RefCounted for AttributeDataObject {
    fn header(&self) -> &ObjectHeader {
        self.base.core().header()
    }

    fn about_to_be_deleted(&self) {
        self.base.core().notify_deleted();
    }
}

impl RefTarget for AttributeDataObject {
    fn core(&self) -> &TargetCore {
        self.base.core()
    }

    fn data_object(&self) -> Option<&dyn DataObject> {
        Some(self)
    }

    fn duplicate(&self) -> Self {
        Self {
            base: self.base.duplicate(),
            value: RwLock::new(self.value()),
        }
    }

    fn title(&self) -> String {
        format!("{} = {}", self.identifier(), self.value.read())
    }

    fn save_properties(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        self.base.save(stream)?;
        stream.begin_chunk(VALUE_CHUNK)?;
        self.value.read().save(stream)?;
        stream.end_chunk()
    }

    fn load_properties(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        self.base.load(stream)?;
        stream.expect_chunk(VALUE_CHUNK)?;
        *self.value.write() = AttributeValue::load(stream)?;
        stream.close_chunk()
    }
}

impl DataObject for AttributeDataObject {
    fn data_base(&self) -> &DataObjectBase {
        &self.base
    }
}

impl StaticClass for AttributeDataObject {
    fn static_class() -> &'static ObjectClass {
        &ATTRIBUTE_DATA_OBJECT_CLASS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert_eq!(AttributeValue::Bool(true).as_bool(), Some(true));
        assert_eq!(AttributeValue::Int(42).as_int(), Some(42));
        assert_eq!(AttributeValue::Float(2.5).as_float(), Some(2.5));
        assert_eq!(AttributeValue::from("hello").as_str(), Some("hello"));
        assert_eq!(AttributeValue::Int(42).as_float(), None);
        assert_eq!(AttributeValue::Int(3).to_f64(), Some(3.0));
        assert_eq!(AttributeValue::from("x").to_f64(), None);
    }

    #[test]
    fn test_value_json_is_untagged() {
        let json = serde_json::to_string(&AttributeValue::Int(7)).unwrap();
        assert_eq!(json, "7");
        let back: AttributeValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, AttributeValue::String("abc".into()));
    }

    #[test]
    fn test_attribute_object() {
        let attr = AttributeDataObject::new("Timestep", AttributeValue::Int(100));
        assert_eq!(attr.identifier(), "Timestep");
        assert_eq!(attr.value(), AttributeValue::Int(100));
        assert_eq!(attr.title(), "Timestep = 100");
        attr.set_value(AttributeValue::Int(200));
        assert_eq!(attr.duplicate().value(), AttributeValue::Int(200));
    }
}
