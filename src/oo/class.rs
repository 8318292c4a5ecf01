//! Class descriptors and the class registry.
//!
//! Every concrete object type has a `static` [`ObjectClass`] listing its own
//! reference fields, its parent class and an optional factory. The
//! [`ClassRegistry`] maps `(plugin, name)` pairs back to descriptors so that
//! object streams can instantiate the right type when loading.

use crate::error::{CoreError, Result};
use crate::oo::field::FieldDescriptor;
use crate::oo::ref_target::TargetRef;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Creates a default-constructed instance of a class.
pub type ClassFactory = fn() -> TargetRef;

/// Plugin id of the classes defined in this crate.
pub const CORE_PLUGIN_ID: &str = "Core";

/// Static descriptor of an object class.
pub struct ObjectClass {
    name: &'static str,
    plugin_id: &'static str,
    display_name: &'static str,
    parent: Option<&'static ObjectClass>,
    fields: &'static [&'static FieldDescriptor],
    factory: Option<ClassFactory>,
}

impl ObjectClass {
    pub const fn new(
        name: &'static str,
        plugin_id: &'static str,
        display_name: &'static str,
        parent: Option<&'static ObjectClass>,
        fields: &'static [&'static FieldDescriptor],
        factory: Option<ClassFactory>,
    ) -> Self {
        Self {
            name,
            plugin_id,
            display_name,
            parent,
            fields,
            factory,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn plugin_id(&self) -> &'static str {
        self.plugin_id
    }

    /// Human-readable name, used in error messages.
    pub fn display_name(&self) -> &'static str {
        self.display_name
    }

    pub fn parent(&self) -> Option<&'static ObjectClass> {
        self.parent
    }

    /// Registry key of this class.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.plugin_id, self.name)
    }

    /// Whether this class is `other` or one of its descendants.
    pub fn is_derived_from(&self, other: &ObjectClass) -> bool {
        let mut class = Some(self);
        while let Some(c) = class {
            if c.same_as(other) {
                return true;
            }
            class = c.parent;
        }
        false
    }

    fn same_as(&self, other: &ObjectClass) -> bool {
        std::ptr::eq(self, other) || (self.name == other.name && self.plugin_id == other.plugin_id)
    }

    /// Fields declared directly by this class.
    pub fn own_fields(&self) -> &'static [&'static FieldDescriptor] {
        self.fields
    }

    /// All fields, inherited ones first.
    pub fn all_fields(&self) -> Vec<&'static FieldDescriptor> {
        let mut chain = Vec::new();
        let mut class = Some(self);
        while let Some(c) = class {
            chain.push(c);
            class = c.parent;
        }
        chain
            .iter()
            .rev()
            .flat_map(|c| c.fields.iter().copied())
            .collect()
    }

    /// Look up a field by its stream name.
    pub fn find_field(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.all_fields().into_iter().find(|f| f.name() == name)
    }

    pub fn is_abstract(&self) -> bool {
        self.factory.is_none()
    }

    pub fn create_instance(&self) -> Result<TargetRef> {
        match self.factory {
            Some(factory) => Ok(factory()),
            None => Err(CoreError::UnknownClass(format!(
                "{} (abstract class cannot be instantiated)",
                self.qualified_name()
            ))),
        }
    }
}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectClass({})", self.qualified_name())
    }
}

/// Types with a static class descriptor.
pub trait StaticClass {
    fn static_class() -> &'static ObjectClass;
}

/// Lookup table of instantiable classes.
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, &'static ObjectClass>>,
}

impl ClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the classes defined in this crate.
    pub fn global() -> &'static ClassRegistry {
        static GLOBAL: OnceLock<ClassRegistry> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let registry = ClassRegistry::new();
            for class in crate::builtin_classes() {
                registry.register(class);
            }
            registry
        })
    }

    pub fn register(&self, class: &'static ObjectClass) {
        let key = class.qualified_name();
        tracing::trace!(class = %key, "Registering object class");
        self.classes.write().insert(key, class);
    }

    pub fn lookup(&self, plugin_id: &str, name: &str) -> Option<&'static ObjectClass> {
        self.classes
            .read()
            .get(&format!("{plugin_id}::{name}"))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DATA_COLLECTION_CLASS, DATA_OBJECT_CLASS, PROPERTY_OBJECT_CLASS};
    use crate::data::vis::VIS_ELEMENT_CLASS;

    #[test]
    fn test_derivation() {
        assert!(DATA_COLLECTION_CLASS.is_derived_from(&DATA_OBJECT_CLASS));
        assert!(DATA_COLLECTION_CLASS.is_derived_from(&DATA_COLLECTION_CLASS));
        assert!(!DATA_OBJECT_CLASS.is_derived_from(&DATA_COLLECTION_CLASS));
        assert!(!PROPERTY_OBJECT_CLASS.is_derived_from(&VIS_ELEMENT_CLASS));
    }

    #[test]
    fn test_inherited_fields_come_first() {
        let fields = DATA_COLLECTION_CLASS.all_fields();
        let base = DATA_OBJECT_CLASS.all_fields();
        assert!(fields.len() > base.len());
        for (a, b) in fields.iter().zip(base.iter()) {
            assert!(std::ptr::eq(*a, *b));
        }
        assert!(DATA_COLLECTION_CLASS.find_field("objects").is_some());
        assert!(DATA_COLLECTION_CLASS.find_field("visElements").is_some());
        assert!(DATA_COLLECTION_CLASS.find_field("bogus").is_none());
    }

    #[test]
    fn test_abstract_class_cannot_be_created() {
        assert!(DATA_OBJECT_CLASS.is_abstract());
        assert!(DATA_OBJECT_CLASS.create_instance().is_err());
        let instance = DATA_COLLECTION_CLASS.create_instance().unwrap();
        assert!(instance.get().class().is_derived_from(&DATA_COLLECTION_CLASS));
    }

    #[test]
    fn test_global_registry_lookup() {
        let registry = ClassRegistry::global();
        assert!(!registry.is_empty());
        let class = registry.lookup(CORE_PLUGIN_ID, "DataCollection").unwrap();
        assert!(std::ptr::eq(class, &DATA_COLLECTION_CLASS));
        assert!(registry.lookup(CORE_PLUGIN_ID, "Nope").is_none());
    }
}
