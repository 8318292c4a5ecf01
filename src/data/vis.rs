//! Visual elements attached to data objects.

use crate::error::Result;
use crate::io::{LoadStream, SaveStream};
use crate::oo::class::{ObjectClass, StaticClass, CORE_PLUGIN_ID};
use crate::oo::object::{OORef, ObjectHeader, RefCounted};
use crate::oo::ref_target::{RefTarget, ReferenceEventKind, TargetCore, TargetRef};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

pub static VIS_ELEMENT_CLASS: ObjectClass = ObjectClass::new(
    "VisElement",
    CORE_PLUGIN_ID,
    "Visual element",
    None,
    &[],
    Some(create_vis_element),
);

fn create_vis_element() -> TargetRef {
    TargetRef::Target(OORef::new(VisElement::new("")).into_target())
}

const VIS_CHUNK: u32 = 0x01;

/// Describes how a data object is rendered. Shared by all copies of the object.
pub struct VisElement {
    core: TargetCore,
    enabled: AtomicBool,
    title: RwLock<String>,
}

impl VisElement {
    pub fn new(title: &str) -> Self {
        Self {
            core: TargetCore::new(&VIS_ELEMENT_CLASS),
            enabled: AtomicBool::new(true),
            title: RwLock::new(title.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            self.core.notify_target_changed();
        }
    }

    pub fn set_title(&self, title: &str) {
        *self.title.write() = title.to_string();
        self.core.notify(ReferenceEventKind::TitleChanged);
    }
}

impl RefCounted for VisElement {
    fn header(&self) -> &ObjectHeader {
        self.core.header()
    }

    fn about_to_be_deleted(&self) {
        self.core.notify_deleted();
    }
}

impl RefTarget for VisElement {
    fn core(&self) -> &TargetCore {
        &self.core
    }

    fn duplicate(&self) -> Self {
        let copy = VisElement::new(&self.title.read());
        copy.enabled.store(self.is_enabled(), Ordering::Release);
        copy
    }

    fn title(&self) -> String {
        self.title.read().clone()
    }

    fn save_properties(&self, stream: &mut SaveStream<'_>) -> Result<()> {
        stream.begin_chunk(VIS_CHUNK)?;
        stream.write_bool(self.is_enabled())?;
        stream.write_string(&self.title.read())?;
        stream.end_chunk()
    }

    fn load_properties(&self, stream: &mut LoadStream<'_>) -> Result<()> {
        stream.expect_chunk(VIS_CHUNK)?;
        self.enabled.store(stream.read_bool()?, Ordering::Release);
        *self.title.write() = stream.read_string()?;
        stream.close_chunk()
    }
}

impl StaticClass for VisElement {
    fn static_class() -> &'static ObjectClass {
        &VIS_ELEMENT_CLASS
    }
}
