//! Object-graph streams.
//!
//! [`ObjectSaveStream`] writes every object reachable from the saved roots
//! exactly once, so shared sub-objects and reference cycles survive a round
//! trip with their identity intact. The layout after the stream header is:
//!
//! ```text
//! ...caller chunks holding object ids...
//! OBJECT_DATA (0x100) per object:
//!     FIELDS (0x10): u32 n, then n x [name] u32 count, count x u64 id
//!     PROPERTIES (0x20): type-specific payload
//! OBJECT_TABLE (0x200): u64 n, then n x u64 id, class, u64 offset
//! u64 offset of OBJECT_TABLE
//! ```
//!
//! A class is written as a pointer id followed, on its first occurrence
//! only, by its plugin id and name.

use crate::error::{CoreError, Result, ResultExt};
use crate::io::load_stream::LoadStream;
use crate::io::migration;
use crate::io::save_stream::SaveStream;
use crate::oo::class::{ClassRegistry, ObjectClass};
use crate::oo::field::{FieldDescriptor, FieldFlags};
use crate::oo::ref_target::{Reference, TargetRef};
use std::collections::HashMap;

const OBJECT_DATA_CHUNK: u32 = 0x100;
const FIELDS_CHUNK: u32 = 0x10;
const PROPERTIES_CHUNK: u32 = 0x20;
const OBJECT_TABLE_CHUNK: u32 = 0x200;

/// Writes object graphs on top of a [`SaveStream`].
pub struct ObjectSaveStream<'a> {
    stream: SaveStream<'a>,
    objects: Vec<TargetRef>,
    ids: HashMap<usize, u64>,
}

impl<'a> ObjectSaveStream<'a> {
    pub fn new(stream: SaveStream<'a>) -> Self {
        Self {
            stream,
            objects: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// The underlying stream, for writing caller chunks.
    pub fn stream(&mut self) -> &mut SaveStream<'a> {
        &mut self.stream
    }

    /// Number of objects queued so far.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn object_id(&mut self, object: &TargetRef) -> u64 {
        if let Some(id) = self.ids.get(&object.addr()) {
            return *id;
        }
        self.objects.push(object.clone());
        let id = self.objects.len() as u64;
        self.ids.insert(object.addr(), id);
        id
    }

    /// Write a reference to `object` (0 for `None`) and queue it for saving.
    pub fn save_object(&mut self, object: Option<&TargetRef>) -> Result<u64> {
        let id = object.map_or(0, |o| self.object_id(o));
        self.stream.write_u64(id)?;
        Ok(id)
    }

    fn write_object(&mut self, object: &TargetRef) -> Result<()> {
        let target = object.get();
        let named = migration::has_named_fields(self.stream.format_version());
        self.stream.begin_chunk(OBJECT_DATA_CHUNK)?;
        self.stream.begin_chunk(FIELDS_CHUNK)?;
        let fields: Vec<(&'static FieldDescriptor, Vec<TargetRef>)> = target
            .core()
            .snapshot()
            .into_iter()
            .filter(|(field, _)| !named || !field.flags().contains(FieldFlags::DONT_SAVE))
            .collect();
        self.stream.write_u32(fields.len() as u32)?;
        for (field, targets) in fields {
            if named {
                self.stream.write_string(field.name())?;
            }
            if field.flags().contains(FieldFlags::DONT_SAVE) {
                self.stream.write_u32(0)?;
                continue;
            }
            self.stream.write_u32(targets.len() as u32)?;
            for value in &targets {
                let id = self.object_id(value);
                self.stream.write_u64(id)?;
            }
        }
        self.stream.end_chunk()?;
        self.stream.begin_chunk(PROPERTIES_CHUNK)?;
        target
            .save_properties(&mut self.stream)
            .with_context(|| format!("saving {}", target.class().name()))?;
        self.stream.end_chunk()?;
        self.stream.end_chunk()
    }

    /// Write all queued objects, the object table and the footer, then close
    /// the underlying stream.
    pub fn close(&mut self) -> Result<()> {
        let mut offsets = Vec::new();
        let mut index = 0;
        while index < self.objects.len() {
            let object = self.objects[index].clone();
            offsets.push(self.stream.position()?);
            self.write_object(&object)?;
            index += 1;
        }

        let table_offset = self.stream.position()?;
        self.stream.begin_chunk(OBJECT_TABLE_CHUNK)?;
        self.stream.write_size(self.objects.len())?;
        let objects = self.objects.clone();
        for (index, (object, offset)) in objects.iter().zip(&offsets).enumerate() {
            self.stream.write_u64(index as u64 + 1)?;
            let class: &'static ObjectClass = object.class();
            let (_, is_new) = self.stream.write_pointer(Some(class))?;
            if is_new {
                self.stream.write_string(class.plugin_id())?;
                self.stream.write_string(class.name())?;
            }
            self.stream.write_u64(*offset)?;
        }
        self.stream.end_chunk()?;
        self.stream.write_u64(table_offset)?;
        tracing::debug!(objects = self.objects.len(), "Wrote object graph");
        self.stream.close()
    }
}

struct TableEntry {
    class: &'static ObjectClass,
    offset: u64,
    object: TargetRef,
}

/// Restores object graphs written by an [`ObjectSaveStream`].
pub struct ObjectLoadStream<'a> {
    stream: LoadStream<'a>,
    entries: Vec<TableEntry>,
    by_id: HashMap<u64, usize>,
    restored: bool,
}

impl<'a> ObjectLoadStream<'a> {
    /// Read the object table and create an empty instance of every object.
    pub fn new(mut stream: LoadStream<'a>) -> Result<Self> {
        let resume = stream.position()?;
        let len = stream.stream_len()?;
        if len < resume + 8 {
            return Err(CoreError::format("stream has no object table", resume));
        }
        stream.seek(len - 8)?;
        let table_offset = stream.read_u64()?;
        if table_offset < resume || table_offset >= len - 8 {
            return Err(CoreError::format(
                format!("object table offset {table_offset} out of range"),
                len - 8,
            ));
        }
        stream.seek(table_offset)?;
        stream.expect_chunk(OBJECT_TABLE_CHUNK)?;
        let count = stream.read_size()?;
        let registry = ClassRegistry::global();
        let mut classes: HashMap<u64, &'static ObjectClass> = HashMap::new();
        let mut entries = Vec::with_capacity(count.min(1 << 16));
        let mut by_id = HashMap::new();
        for _ in 0..count {
            let id = stream.read_u64()?;
            let class_id = stream.read_pointer()?;
            let class = match classes.get(&class_id) {
                Some(class) => *class,
                None => {
                    let plugin_id = stream.read_string()?;
                    let name = stream.read_string()?;
                    let class = registry
                        .lookup(&plugin_id, &name)
                        .ok_or_else(|| CoreError::UnknownClass(format!("{plugin_id}::{name}")))?;
                    classes.insert(class_id, class);
                    class
                }
            };
            let offset = stream.read_u64()?;
            let object = class.create_instance()?;
            by_id.insert(id, entries.len());
            entries.push(TableEntry {
                class,
                offset,
                object,
            });
        }
        stream.close_chunk()?;
        stream.seek(resume)?;
        tracing::debug!(objects = entries.len(), classes = classes.len(), "Read object table");
        Ok(Self {
            stream,
            entries,
            by_id,
            restored: false,
        })
    }

    /// The underlying stream, for reading caller chunks.
    pub fn stream(&mut self) -> &mut LoadStream<'a> {
        &mut self.stream
    }

    pub fn object_count(&self) -> usize {
        self.entries.len()
    }

    fn resolve(&self, id: u64) -> Result<TargetRef> {
        self.by_id
            .get(&id)
            .map(|index| self.entries[*index].object.clone())
            .ok_or(CoreError::UnresolvedReference(id))
    }

    /// Read a reference written by [`ObjectSaveStream::save_object`].
    ///
    /// The returned object is empty until [`ObjectLoadStream::close`] runs.
    pub fn load_object(&mut self) -> Result<Option<TargetRef>> {
        match self.stream.read_u64()? {
            0 => Ok(None),
            id => self.resolve(id).map(Some),
        }
    }

    fn read_object(&mut self, index: usize) -> Result<()> {
        let class = self.entries[index].class;
        let object = self.entries[index].object.clone();
        let named = migration::has_named_fields(self.stream.format_version());
        self.stream.seek(self.entries[index].offset)?;
        self.stream.expect_chunk(OBJECT_DATA_CHUNK)?;
        self.stream.expect_chunk(FIELDS_CHUNK)?;
        let field_count = self.stream.read_u32()?;
        let all_fields = class.all_fields();
        for position in 0..field_count as usize {
            let field = if named {
                let name = self.stream.read_string()?;
                let field = class.find_field(&name);
                if field.is_none() {
                    tracing::warn!(class = class.name(), field = %name, "Ignoring unknown reference field");
                }
                field
            } else {
                all_fields.get(position).copied()
            };
            let count = self.stream.read_u32()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let id = self.stream.read_u64()?;
                values.push(self.resolve(id)?);
            }
            let Some(field) = field else {
                continue;
            };
            if field.flags().contains(FieldFlags::DONT_SAVE) {
                continue;
            }
            let references = values
                .into_iter()
                .map(|target| Reference::for_field(field, target))
                .collect::<Result<Vec<_>>>()?;
            object.get().core().init_field(field, references);
        }
        self.stream.close_chunk()?;
        self.stream.expect_chunk(PROPERTIES_CHUNK)?;
        object
            .get()
            .load_properties(&mut self.stream)
            .with_context(|| format!("loading {}", class.name()))?;
        self.stream.close_chunk()?;
        self.stream.close_chunk()
    }

    /// Restore every object, then run their `load_complete` hooks.
    pub fn close(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        let resume = self.stream.position()?;
        for index in 0..self.entries.len() {
            self.read_object(index)?;
        }
        for entry in &self.entries {
            entry.object.get().load_complete()?;
        }
        self.restored = true;
        self.stream.seek(resume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AttributeValue, DataCollection, DataObject, PropertyContainer, PropertyObject, VisElement};
    use crate::io::format::StreamHeader;
    use crate::oo::object::OORef;
    use crate::oo::ref_target::RefTarget;
    use std::io::Cursor;

    const ROOT_CHUNK: u32 = 0x01;

    fn save(root: &TargetRef, header: StreamHeader) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut out = ObjectSaveStream::new(SaveStream::new(&mut buffer, header).unwrap());
            out.stream().begin_chunk(ROOT_CHUNK).unwrap();
            out.save_object(Some(root)).unwrap();
            out.stream().end_chunk().unwrap();
            out.close().unwrap();
        }
        buffer.into_inner()
    }

    fn load(bytes: Vec<u8>) -> TargetRef {
        let mut input = ObjectLoadStream::new(LoadStream::new(Cursor::new(bytes)).unwrap()).unwrap();
        input.stream().expect_chunk(ROOT_CHUNK).unwrap();
        let root = input.load_object().unwrap().unwrap();
        input.stream().close_chunk().unwrap();
        input.close().unwrap();
        root
    }

    #[test]
    fn test_round_trip_preserves_shared_identity() {
        let collection = OORef::new(DataCollection::new());
        let prop = OORef::new(PropertyObject::new("Mass", 1, vec![1.0, 2.0]));
        let a = OORef::new(PropertyContainer::new("a"));
        let b = OORef::new(PropertyContainer::new("b"));
        a.add_property(prop.clone()).unwrap();
        b.add_property(prop).unwrap();
        collection.add_object(a.into_data_object());
        collection.add_object(b.into_data_object());
        collection.add_attribute("Timestep", 3, None);

        let root = TargetRef::from(collection.into_data_object());
        let loaded = load(save(&root, StreamHeader::default()));
        let loaded = loaded.downcast::<DataCollection>().unwrap();

        let containers = loaded.get_objects_of::<PropertyContainer>();
        assert_eq!(containers.len(), 2);
        let first = containers[0].property("Mass").unwrap();
        let second = containers[1].property("Mass").unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.data_reference_count(), 2);
        assert_eq!(first.values(), vec![1.0, 2.0]);
        assert_eq!(containers[1].identifier(), "b");
        assert_eq!(loaded.get_attribute_value("Timestep"), Some(AttributeValue::Int(3)));
    }

    #[test]
    fn test_container_length_mismatch_fails_on_close() {
        let container = OORef::new(PropertyContainer::new("particles"));
        let mass = OORef::new(PropertyObject::new("Mass", 1, vec![1.0, 2.0]));
        container.add_property(mass.clone()).unwrap();
        mass.set_values(vec![1.0, 2.0, 3.0]);

        let bytes = save(&TargetRef::from(container.into_data_object()), StreamHeader::default());
        let mut input = ObjectLoadStream::new(LoadStream::new(Cursor::new(bytes)).unwrap()).unwrap();
        input.stream().expect_chunk(ROOT_CHUNK).unwrap();
        input.load_object().unwrap();
        input.stream().close_chunk().unwrap();
        assert!(matches!(input.close(), Err(CoreError::Integrity(_))));
    }

    #[test]
    fn test_vis_elements_are_restored() {
        let vis = OORef::new(VisElement::new("Particles"));
        vis.set_enabled(false);
        let container = OORef::new(PropertyContainer::new("particles"));
        container.add_vis_element(vis.into_target());

        let loaded = load(save(&TargetRef::from(container.into_data_object()), StreamHeader::default()));
        let loaded = loaded.into_data().unwrap();
        let vis = loaded.vis_element().unwrap().downcast::<VisElement>().unwrap();
        assert!(!vis.is_enabled());
        assert_eq!(vis.title(), "Particles");
    }

    #[test]
    fn test_data_source_is_not_saved() {
        let source = OORef::new(VisElement::new("stand-in")).into_target();
        let collection = OORef::new(DataCollection::new());
        collection.add_attribute("Frame", 1, Some(&source));
        let loaded = load(save(&TargetRef::from(collection.into_data_object()), StreamHeader::default()));
        let loaded = loaded.downcast::<DataCollection>().unwrap();
        let attribute = loaded.objects()[0].clone();
        assert!(attribute.data_source().is_none());
        assert_eq!(attribute.identifier(), "Frame");
    }

    #[test]
    fn test_old_format_without_container_chunk() {
        let container = OORef::new(PropertyContainer::new(""));
        container
            .add_property(OORef::new(PropertyObject::zeroed("Position", 3, 4)))
            .unwrap();
        let mut header = StreamHeader::default();
        header.format_version = migration::CONTAINER_CHUNK_SINCE - 1;

        let loaded = load(save(&TargetRef::from(container.into_data_object()), header));
        let loaded = loaded.downcast::<PropertyContainer>().unwrap();
        assert_eq!(loaded.element_count(), 4);
        assert_eq!(loaded.identifier(), "property_container");
    }

    #[test]
    fn test_unresolved_reference() {
        let collection = OORef::new(DataCollection::new());
        let bytes = save(&TargetRef::from(collection.into_data_object()), StreamHeader::default());
        let mut input = ObjectLoadStream::new(LoadStream::new(Cursor::new(bytes)).unwrap()).unwrap();
        assert_eq!(input.object_count(), 1);
        assert!(matches!(input.resolve(7), Err(CoreError::UnresolvedReference(7))));
        input.stream().expect_chunk(ROOT_CHUNK).unwrap();
        assert!(input.load_object().unwrap().is_some());
    }
}
