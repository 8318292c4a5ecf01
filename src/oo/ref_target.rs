//! Dependency nodes: objects with reference fields and change notifications.
//!
//! A [`RefTarget`] embeds a [`TargetCore`], which stores the values of the
//! reference fields declared by the object's class. Storing a strong or data
//! reference registers the holder as a *dependent* of the target. When a
//! target changes it notifies its own listeners and then propagates a
//! [`ReferenceEventKind::TargetChanged`] event up the dependents graph.
//!
//! ## Field access
//!
//! Writers hand in [`Reference`] values, which own their target. Readers get
//! [`TargetRef`] views, which keep the target alive but do not count as data
//! references, so inspecting a collection never makes its members look shared.

use crate::data::{DataOORef, DataObject};
use crate::error::{CoreError, Result};
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::ObjectClass;
use crate::oo::field::{FieldDescriptor, FieldFlags};
use crate::oo::object::{OORef, OOWeakRef, ObjectHeader, RefCounted};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of a dependency node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Obj({})", self.0)
    }
}

/// Kinds of notifications emitted by dependency nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceEventKind {
    /// The sender (or something it depends on) changed.
    TargetChanged,
    /// A single reference field of the sender was reassigned.
    ReferenceChanged,
    /// A reference was inserted into a vector field.
    ReferenceAdded,
    /// A reference was removed from a vector field.
    ReferenceRemoved,
    /// The display title of the sender changed.
    TitleChanged,
    /// The sender is being destroyed.
    TargetDeleted,
}

impl ReferenceEventKind {
    /// Whether dependents receive this event as well.
    pub fn propagates(self) -> bool {
        matches!(self, ReferenceEventKind::TargetChanged)
    }
}

/// A notification delivered to listeners.
#[derive(Debug, Clone)]
pub struct ReferenceEvent {
    pub kind: ReferenceEventKind,
    /// Object that emitted the event.
    pub sender: ObjectId,
    /// Reference field involved, for field-level events.
    pub field: Option<&'static str>,
    /// Position within a vector field.
    pub index: Option<usize>,
}

impl ReferenceEvent {
    pub fn new(kind: ReferenceEventKind, sender: ObjectId) -> Self {
        Self {
            kind,
            sender,
            field: None,
            index: None,
        }
    }
}

/// Callback registered on a dependency node.
pub type Listener = Arc<dyn Fn(&ReferenceEvent) + Send + Sync>;

/// Handle returned by [`TargetCore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct DependentLink {
    hub: Weak<EventHub>,
    field: &'static FieldDescriptor,
}

pub(crate) struct EventHub {
    id: ObjectId,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    dependents: Mutex<Vec<DependentLink>>,
}

impl EventHub {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ObjectId::next(),
            next_listener: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
            dependents: Mutex::new(Vec::new()),
        })
    }

    fn add_dependent(&self, parent: &Arc<EventHub>, field: &'static FieldDescriptor) {
        self.dependents.lock().push(DependentLink {
            hub: Arc::downgrade(parent),
            field,
        });
    }

    fn remove_dependent(&self, parent: &Arc<EventHub>, field: &'static FieldDescriptor) {
        let mut dependents = self.dependents.lock();
        if let Some(pos) = dependents.iter().position(|link| {
            std::ptr::eq(link.hub.as_ptr(), Arc::as_ptr(parent)) && std::ptr::eq(link.field, field)
        }) {
            dependents.remove(pos);
        }
    }

    fn live_dependents(&self) -> Vec<(Arc<EventHub>, &'static FieldDescriptor)> {
        let mut dependents = self.dependents.lock();
        dependents.retain(|link| link.hub.strong_count() > 0);
        dependents
            .iter()
            .filter_map(|link| link.hub.upgrade().map(|hub| (hub, link.field)))
            .collect()
    }

    fn notify_listeners(&self, event: &ReferenceEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    fn propagate(&self, event: &ReferenceEvent, visited: &mut Vec<ObjectId>) {
        if visited.contains(&self.id) {
            return;
        }
        visited.push(self.id);
        self.notify_listeners(event);
        for (hub, field) in self.live_dependents() {
            if !field.flags().contains(FieldFlags::NO_CHANGE_MESSAGE) {
                hub.propagate(event, visited);
            }
        }
    }
}

/// An owning value stored in a reference field.
#[derive(Clone)]
pub enum Reference {
    /// Strong reference to a dependency node.
    Strong(OORef<dyn RefTarget>),
    /// Data reference to a payload sub-object; counts toward copy-on-write sharing.
    Data(DataOORef<dyn DataObject>),
    /// Non-owning reference.
    Weak(OOWeakRef<dyn RefTarget>),
}

impl Reference {
    pub fn strong(target: OORef<dyn RefTarget>) -> Self {
        Reference::Strong(target)
    }

    pub fn data(object: OORef<dyn DataObject>) -> Self {
        Reference::Data(DataOORef::new(object))
    }

    pub fn weak(target: &OORef<dyn RefTarget>) -> Self {
        Reference::Weak(target.downgrade())
    }

    /// Build the reference kind a field expects for the given target.
    pub fn for_field(field: &FieldDescriptor, target: TargetRef) -> Result<Self> {
        if field.is_weak() {
            return Ok(Reference::Weak(target.to_target().downgrade()));
        }
        if field.is_data_object() {
            return match target {
                TargetRef::Data(object) => Ok(Reference::data(object)),
                TargetRef::Target(other) => Err(CoreError::Integrity(format!(
                    "field '{}' requires a data object, got {}",
                    field.name(),
                    other.class().name()
                ))),
            };
        }
        Ok(Reference::Strong(target.to_target()))
    }

    /// Address of the referenced object.
    pub fn addr(&self) -> usize {
        match self {
            Reference::Strong(target) => target.addr(),
            Reference::Data(object) => object.addr(),
            Reference::Weak(weak) => weak.addr(),
        }
    }

    /// Non-counting view of the target; `None` for a dead weak reference.
    pub fn view(&self) -> Option<TargetRef> {
        match self {
            Reference::Strong(target) => Some(TargetRef::Target(target.clone())),
            Reference::Data(object) => Some(TargetRef::Data(object.object().clone())),
            Reference::Weak(weak) => weak.upgrade().map(TargetRef::Target),
        }
    }

    fn hub(&self) -> Option<Arc<EventHub>> {
        match self {
            Reference::Strong(target) => Some(target.core().hub.clone()),
            Reference::Data(object) => Some(object.core().hub.clone()),
            Reference::Weak(_) => None,
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Strong(target) => write!(f, "Strong({:?})", target),
            Reference::Data(object) => write!(f, "Data({:?})", object),
            Reference::Weak(weak) => write!(f, "Weak({:?})", weak),
        }
    }
}

/// Non-counting handle to a dependency node, remembering whether it is a data object.
#[derive(Clone)]
pub enum TargetRef {
    Target(OORef<dyn RefTarget>),
    Data(OORef<dyn DataObject>),
}

impl TargetRef {
    pub fn get(&self) -> &dyn RefTarget {
        match self {
            TargetRef::Target(target) => &**target,
            TargetRef::Data(object) => object.as_ref_target(),
        }
    }

    pub fn to_target(&self) -> OORef<dyn RefTarget> {
        match self {
            TargetRef::Target(target) => target.clone(),
            TargetRef::Data(object) => object.as_target(),
        }
    }

    pub fn as_data(&self) -> Option<&OORef<dyn DataObject>> {
        match self {
            TargetRef::Data(object) => Some(object),
            TargetRef::Target(_) => None,
        }
    }

    pub fn into_data(self) -> Option<OORef<dyn DataObject>> {
        match self {
            TargetRef::Data(object) => Some(object),
            TargetRef::Target(_) => None,
        }
    }

    pub fn addr(&self) -> usize {
        match self {
            TargetRef::Target(target) => target.addr(),
            TargetRef::Data(object) => object.addr(),
        }
    }

    pub fn class(&self) -> &'static ObjectClass {
        self.get().class()
    }

    pub fn downcast<T: RefTarget>(&self) -> Option<OORef<T>> {
        self.to_target().downcast::<T>()
    }
}

impl From<OORef<dyn RefTarget>> for TargetRef {
    fn from(target: OORef<dyn RefTarget>) -> Self {
        TargetRef::Target(target)
    }
}

impl From<OORef<dyn DataObject>> for TargetRef {
    fn from(object: OORef<dyn DataObject>) -> Self {
        TargetRef::Data(object)
    }
}

impl fmt::Debug for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@0x{:x}", self.class().name(), self.addr())
    }
}

enum FieldSlot {
    Single(Option<Reference>),
    Vector(Vec<Reference>),
}

impl FieldSlot {
    fn iter(&self) -> std::slice::Iter<'_, Reference> {
        match self {
            FieldSlot::Single(value) => value.as_slice().iter(),
            FieldSlot::Vector(values) => values.iter(),
        }
    }
}

/// Field storage, identity and event hub shared by all dependency nodes.
pub struct TargetCore {
    header: ObjectHeader,
    class: &'static ObjectClass,
    fields: Vec<&'static FieldDescriptor>,
    slots: RwLock<Vec<FieldSlot>>,
    hub: Arc<EventHub>,
}

impl TargetCore {
    pub fn new(class: &'static ObjectClass) -> Self {
        let fields = class.all_fields();
        let slots = fields
            .iter()
            .map(|field| {
                if field.is_vector() {
                    FieldSlot::Vector(Vec::new())
                } else {
                    FieldSlot::Single(None)
                }
            })
            .collect();
        Self {
            header: ObjectHeader::new(),
            class,
            fields,
            slots: RwLock::new(slots),
            hub: EventHub::new(),
        }
    }

    pub fn header(&self) -> &ObjectHeader {
        &self.header
    }

    pub fn class(&self) -> &'static ObjectClass {
        self.class
    }

    pub fn id(&self) -> ObjectId {
        self.hub.id
    }

    /// All reference fields of the class, inherited ones first.
    pub fn fields(&self) -> &[&'static FieldDescriptor] {
        &self.fields
    }

    fn slot_index(&self, field: &FieldDescriptor) -> Option<usize> {
        let index = self.fields.iter().position(|f| std::ptr::eq(*f, field));
        debug_assert!(
            index.is_some(),
            "field '{}' is not declared by class {}",
            field.name(),
            self.class.name()
        );
        index
    }

    fn link(&self, field: &'static FieldDescriptor, value: &Reference) {
        if let Some(hub) = value.hub() {
            hub.add_dependent(&self.hub, field);
        }
    }

    fn unlink(&self, field: &'static FieldDescriptor, value: &Reference) {
        if let Some(hub) = value.hub() {
            hub.remove_dependent(&self.hub, field);
        }
    }

    /// First target of a field.
    pub fn get(&self, field: &FieldDescriptor) -> Option<TargetRef> {
        let index = self.slot_index(field)?;
        let value = self.slots.read()[index].iter().next().cloned();
        value.and_then(|r| r.view())
    }

    /// All live targets of a field, in order.
    pub fn get_all(&self, field: &FieldDescriptor) -> Vec<TargetRef> {
        let Some(index) = self.slot_index(field) else {
            return Vec::new();
        };
        let values: Vec<Reference> = self.slots.read()[index].iter().cloned().collect();
        values.iter().filter_map(Reference::view).collect()
    }

    /// Number of values stored in a field.
    pub fn len_of(&self, field: &FieldDescriptor) -> usize {
        match self.slot_index(field) {
            Some(index) => self.slots.read()[index].iter().count(),
            None => 0,
        }
    }

    /// Views of every field's targets.
    pub fn snapshot(&self) -> Vec<(&'static FieldDescriptor, Vec<TargetRef>)> {
        let values: Vec<Vec<Reference>> = self
            .slots
            .read()
            .iter()
            .map(|slot| slot.iter().cloned().collect())
            .collect();
        self.fields
            .iter()
            .copied()
            .zip(values)
            .map(|(field, refs)| (field, refs.iter().filter_map(Reference::view).collect()))
            .collect()
    }

    /// Data objects held by `DATA_OBJECT` fields, in field order.
    pub fn data_objects(&self) -> Vec<OORef<dyn DataObject>> {
        let slots = self.slots.read();
        self.fields
            .iter()
            .zip(slots.iter())
            .filter(|(field, _)| field.is_data_object())
            .flat_map(|(_, slot)| slot.iter())
            .filter_map(|value| match value {
                Reference::Data(object) => Some(object.object().clone()),
                _ => None,
            })
            .collect()
    }

    /// Locate a data object held by this node.
    pub fn find_data_object(
        &self,
        addr: usize,
    ) -> Option<(&'static FieldDescriptor, usize, OORef<dyn DataObject>)> {
        let slots = self.slots.read();
        for (field, slot) in self.fields.iter().zip(slots.iter()) {
            for (index, value) in slot.iter().enumerate() {
                if let Reference::Data(object) = value {
                    if object.addr() == addr {
                        return Some((field, index, object.object().clone()));
                    }
                }
            }
        }
        None
    }

    /// Assign a single-valued field. Returns the previous value.
    pub fn set(&self, field: &'static FieldDescriptor, value: Option<Reference>) -> Option<Reference> {
        debug_assert!(!field.is_vector(), "set() used on vector field '{}'", field.name());
        let index = self.slot_index(field)?;
        if let Some(value) = &value {
            self.link(field, value);
        }
        let old = match &mut self.slots.write()[index] {
            FieldSlot::Single(slot) => std::mem::replace(slot, value),
            FieldSlot::Vector(values) => {
                let old = std::mem::take(values);
                values.extend(value);
                old.into_iter().next()
            }
        };
        if let Some(old) = &old {
            self.unlink(field, old);
        }
        self.field_changed(ReferenceEventKind::ReferenceChanged, field, None);
        old
    }

    /// Insert into a vector field; `None` appends. Returns the final position.
    pub fn insert(&self, field: &'static FieldDescriptor, index: Option<usize>, value: Reference) -> usize {
        let Some(slot_index) = self.slot_index(field) else {
            return 0;
        };
        self.link(field, &value);
        let (position, displaced) = match &mut self.slots.write()[slot_index] {
            FieldSlot::Vector(values) => {
                let position = index.unwrap_or(values.len()).min(values.len());
                values.insert(position, value);
                (position, None)
            }
            FieldSlot::Single(slot) => (0, slot.replace(value)),
        };
        if let Some(old) = &displaced {
            self.unlink(field, old);
        }
        self.field_changed(ReferenceEventKind::ReferenceAdded, field, Some(position));
        position
    }

    /// Remove the value at `index`.
    pub fn remove(&self, field: &'static FieldDescriptor, index: usize) -> Option<Reference> {
        let slot_index = self.slot_index(field)?;
        let removed = match &mut self.slots.write()[slot_index] {
            FieldSlot::Vector(values) if index < values.len() => Some(values.remove(index)),
            FieldSlot::Single(slot) if index == 0 => slot.take(),
            _ => None,
        }?;
        self.unlink(field, &removed);
        self.field_changed(ReferenceEventKind::ReferenceRemoved, field, Some(index));
        Some(removed)
    }

    /// Replace the value at `index` of a field.
    pub fn replace_at(
        &self,
        field: &'static FieldDescriptor,
        index: usize,
        value: Reference,
    ) -> Option<Reference> {
        let slot_index = self.slot_index(field)?;
        self.link(field, &value);
        let old = match &mut self.slots.write()[slot_index] {
            FieldSlot::Vector(values) if index < values.len() => {
                Ok(std::mem::replace(&mut values[index], value))
            }
            FieldSlot::Single(slot) if index == 0 => slot.replace(value).ok_or(None),
            _ => Err(Some(value)),
        };
        match old {
            Ok(old) => {
                self.unlink(field, &old);
                self.field_changed(ReferenceEventKind::ReferenceChanged, field, Some(index));
                Some(old)
            }
            Err(Some(rejected)) => {
                self.unlink(field, &rejected);
                None
            }
            Err(None) => {
                self.field_changed(ReferenceEventKind::ReferenceChanged, field, Some(index));
                None
            }
        }
    }

    /// Remove every value of a field.
    pub fn clear(&self, field: &'static FieldDescriptor) -> Vec<Reference> {
        let Some(index) = self.slot_index(field) else {
            return Vec::new();
        };
        let removed: Vec<Reference> = match &mut self.slots.write()[index] {
            FieldSlot::Vector(values) => std::mem::take(values),
            FieldSlot::Single(slot) => slot.take().into_iter().collect(),
        };
        for old in &removed {
            self.unlink(field, old);
        }
        if !removed.is_empty() {
            self.field_changed(ReferenceEventKind::ReferenceRemoved, field, None);
        }
        removed
    }

    /// Replace every reference to the object at `addr`. With `None`, vector
    /// entries are removed and single fields cleared. Returns the number of
    /// replaced references.
    pub fn replace_references_to(&self, addr: usize, new_value: Option<Reference>) -> usize {
        let mut removed: Vec<(&'static FieldDescriptor, Reference)> = Vec::new();
        let mut added: Vec<&'static FieldDescriptor> = Vec::new();
        {
            let mut slots = self.slots.write();
            for (field, slot) in self.fields.iter().copied().zip(slots.iter_mut()) {
                match slot {
                    FieldSlot::Single(value) => {
                        if value.as_ref().is_some_and(|v| v.addr() == addr) {
                            if let Some(old) = std::mem::replace(value, new_value.clone()) {
                                removed.push((field, old));
                            }
                            if new_value.is_some() {
                                added.push(field);
                            }
                        }
                    }
                    FieldSlot::Vector(values) => match &new_value {
                        Some(replacement) => {
                            for value in values.iter_mut().filter(|v| v.addr() == addr) {
                                removed.push((field, std::mem::replace(value, replacement.clone())));
                                added.push(field);
                            }
                        }
                        None => {
                            let mut kept = Vec::with_capacity(values.len());
                            for value in values.drain(..) {
                                if value.addr() == addr {
                                    removed.push((field, value));
                                } else {
                                    kept.push(value);
                                }
                            }
                            *values = kept;
                        }
                    },
                }
            }
        }
        if let Some(replacement) = &new_value {
            for field in &added {
                self.link(field, replacement);
            }
        }
        for (field, old) in &removed {
            self.unlink(field, old);
            let kind = if new_value.is_some() {
                ReferenceEventKind::ReferenceChanged
            } else {
                ReferenceEventKind::ReferenceRemoved
            };
            self.field_changed(kind, field, None);
        }
        removed.len()
    }

    /// Fill a field of a freshly created object without emitting events.
    pub(crate) fn init_field(&self, field: &'static FieldDescriptor, values: Vec<Reference>) {
        let Some(index) = self.slot_index(field) else {
            return;
        };
        for value in &values {
            self.link(field, value);
        }
        let old = {
            let mut slots = self.slots.write();
            let slot = if field.is_vector() {
                FieldSlot::Vector(values)
            } else {
                FieldSlot::Single(values.into_iter().next())
            };
            std::mem::replace(&mut slots[index], slot)
        };
        for value in old.iter() {
            self.unlink(field, value);
        }
    }

    /// Register a listener for events emitted by (or propagated to) this node.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ReferenceEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.hub.next_listener.fetch_add(1, Ordering::Relaxed));
        self.hub.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.hub.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Number of live nodes that hold a strong or data reference to this one.
    pub fn dependent_count(&self) -> usize {
        self.hub.live_dependents().len()
    }

    /// Tell listeners and dependents that this node changed.
    pub fn notify_target_changed(&self) {
        self.notify(ReferenceEventKind::TargetChanged);
    }

    /// Emit an event of the given kind from this node.
    pub fn notify(&self, kind: ReferenceEventKind) {
        let event = ReferenceEvent::new(kind, self.id());
        if kind.propagates() {
            self.hub.propagate(&event, &mut Vec::new());
        } else {
            self.hub.notify_listeners(&event);
        }
    }

    fn field_changed(&self, kind: ReferenceEventKind, field: &'static FieldDescriptor, index: Option<usize>) {
        let event = ReferenceEvent {
            kind,
            sender: self.id(),
            field: Some(field.name()),
            index,
        };
        self.hub.notify_listeners(&event);
        self.notify_target_changed();
    }

    /// Announce destruction to this node's listeners.
    pub fn notify_deleted(&self) {
        let event = ReferenceEvent::new(ReferenceEventKind::TargetDeleted, self.id());
        self.hub.notify_listeners(&event);
    }
}

impl Drop for TargetCore {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        for (field, slot) in self.fields.iter().copied().zip(self.slots.get_mut().iter()) {
            for value in slot.iter() {
                if let Some(child) = value.hub() {
                    child.remove_dependent(&hub, field);
                }
            }
        }
    }
}

impl fmt::Debug for TargetCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetCore")
            .field("id", &self.id())
            .field("class", &self.class.name())
            .field("refs", &self.header.reference_count())
            .finish()
    }
}

/// Casting helpers implemented for every [`RefTarget`].
pub trait AsRefTarget {
    fn as_ref_target(&self) -> &dyn RefTarget;
    fn as_any(&self) -> &dyn Any;
    fn into_ref_target_arc(self: Arc<Self>) -> Arc<dyn RefTarget>;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    /// Fresh instance with copied properties and empty reference fields.
    fn duplicate_target(&self) -> OORef<dyn RefTarget>;
}

impl<T: RefTarget> AsRefTarget for T {
    fn as_ref_target(&self) -> &dyn RefTarget {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_ref_target_arc(self: Arc<Self>) -> Arc<dyn RefTarget> {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn duplicate_target(&self) -> OORef<dyn RefTarget> {
        OORef::new(self.duplicate()).into_target()
    }
}

/// A node of the dependency graph.
pub trait RefTarget: RefCounted + AsRefTarget {
    fn core(&self) -> &TargetCore;

    /// Copy of the object's own properties; reference fields stay empty.
    fn duplicate(&self) -> Self
    where
        Self: Sized;

    fn class(&self) -> &'static ObjectClass {
        self.core().class()
    }

    /// This node viewed as a data object, if it is one.
    fn data_object(&self) -> Option<&dyn DataObject> {
        None
    }

    fn title(&self) -> String {
        self.class().display_name().to_string()
    }

    /// Write the non-reference properties of this object.
    fn save_properties(&self, _stream: &mut SaveStream<'_>) -> Result<()> {
        Ok(())
    }

    /// Read back what [`RefTarget::save_properties`] wrote.
    fn load_properties(&self, _stream: &mut LoadStream<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once every object of a stream has been restored.
    fn load_complete(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: RefTarget> OORef<T> {
    pub fn into_target(self) -> OORef<dyn RefTarget> {
        let arc: Arc<dyn RefTarget> = self.into_arc();
        OORef::from_arc(arc)
    }
}

impl OORef<dyn RefTarget> {
    pub fn downcast<T: RefTarget>(&self) -> Option<OORef<T>> {
        let any = self.arc().clone().into_any_arc();
        any.downcast::<T>().ok().map(OORef::acquire_arc)
    }

    pub fn is<T: RefTarget>(&self) -> bool {
        self.as_any().is::<T>()
    }
}
