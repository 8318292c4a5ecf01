//! Addressing objects inside a data collection.

use crate::data::object::DataObject;
use crate::error::{CoreError, Result};
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ClassRegistry, ObjectClass};
use crate::oo::object::OORef;
use std::fmt;
use std::ops::Deref;

/// Chain of data objects from a top-level collection member down to a nested one.
#[derive(Clone, Default)]
pub struct DataObjectPath(Vec<OORef<dyn DataObject>>);

impl DataObjectPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_objects(objects: Vec<OORef<dyn DataObject>>) -> Self {
        Self(objects)
    }

    pub fn push(&mut self, object: OORef<dyn DataObject>) {
        self.0.push(object);
    }

    pub fn pop(&mut self) -> Option<OORef<dyn DataObject>> {
        self.0.pop()
    }

    /// The addressed (innermost) object.
    pub fn leaf(&self) -> Option<&OORef<dyn DataObject>> {
        self.0.last()
    }

    /// The object holding the leaf.
    pub fn parent(&self) -> Option<&OORef<dyn DataObject>> {
        self.0.len().checked_sub(2).map(|index| &self.0[index])
    }

    pub fn into_vec(self) -> Vec<OORef<dyn DataObject>> {
        self.0
    }

    /// Slash-separated identifiers, skipping objects without one.
    pub fn to_string_path(&self) -> String {
        self.0
            .iter()
            .map(|object| object.identifier())
            .filter(|id| !id.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Deref for DataObjectPath {
    type Target = [OORef<dyn DataObject>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for DataObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_path())
    }
}

impl fmt::Debug for DataObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataObjectPath({:?})", self.to_string_path())
    }
}

const REFERENCE_CHUNK: u32 = 0x02;

/// Names an object of a collection by class and path, without holding it.
#[derive(Clone, Debug)]
pub struct DataObjectReference {
    class: &'static ObjectClass,
    path: String,
    title: String,
}

impl DataObjectReference {
    pub fn new(class: &'static ObjectClass, path: impl Into<String>) -> Self {
        Self {
            class,
            path: path.into(),
            title: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Reference to the leaf of `path`.
    pub fn from_path(path: &DataObjectPath) -> Option<Self> {
        let leaf = path.leaf()?;
        Some(Self::new(leaf.class(), path.to_string_path()).with_title(leaf.title()))
    }

    pub fn class(&self) -> &'static ObjectClass {
        self.class
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Display title, falling back to the path.
    pub fn title(&self) -> &str {
        if self.title.is_empty() {
            &self.path
        } else {
            &self.title
        }
    }

    pub fn save(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        stream.begin_chunk(REFERENCE_CHUNK)?;
        stream.write_string(self.class.plugin_id())?;
        stream.write_string(self.class.name())?;
        stream.write_string(&self.path)?;
        stream.write_string(&self.title)?;
        stream.end_chunk()
    }

    pub fn load(stream: &mut LoadStream<'_>) -> Result<Self> {
        stream.expect_chunk(REFERENCE_CHUNK)?;
        let plugin_id = stream.read_string()?;
        let name = stream.read_string()?;
        let class = ClassRegistry::global()
            .lookup(&plugin_id, &name)
            .ok_or_else(|| CoreError::UnknownClass(format!("{plugin_id}::{name}")))?;
        let path = stream.read_string()?;
        let title = stream.read_string()?;
        stream.close_chunk()?;
        Ok(Self { class, path, title })
    }
}

impl PartialEq for DataObjectReference {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.class, other.class) && self.path == other.path
    }
}

impl Eq for DataObjectReference {}

impl fmt::Display for DataObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.class.name(), self.path)
    }
}
