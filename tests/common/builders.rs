//! Test data builders for creating test objects

use datavis_core::data::{
    AttributeValue, DataCollection, DataObject, PropertyContainer, PropertyObject,
};
use datavis_core::oo::OORef;

/// Builder for property containers
pub struct ContainerBuilder {
    identifier: String,
    properties: Vec<(String, usize, Vec<f64>)>,
}

impl ContainerBuilder {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, components: usize, values: Vec<f64>) -> Self {
        self.properties.push((name.to_string(), components, values));
        self
    }

    pub fn build(self) -> OORef<PropertyContainer> {
        let container = OORef::new(PropertyContainer::new(&self.identifier));
        for (name, components, values) in self.properties {
            container
                .add_property(OORef::new(PropertyObject::new(&name, components, values)))
                .unwrap();
        }
        container
    }
}

/// Builder for data collections
#[derive(Default)]
pub struct CollectionBuilder {
    containers: Vec<OORef<PropertyContainer>>,
    attributes: Vec<(String, AttributeValue)>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container(mut self, container: OORef<PropertyContainer>) -> Self {
        self.containers.push(container);
        self
    }

    pub fn attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    pub fn build(self) -> OORef<DataCollection> {
        let collection = OORef::new(DataCollection::new());
        for container in self.containers {
            collection.add_object(container.into_data_object());
        }
        for (name, value) in self.attributes {
            collection.add_attribute(&name, value, None);
        }
        collection
    }
}

/// Two particles with positions and masses
pub fn particles() -> OORef<PropertyContainer> {
    ContainerBuilder::new("particles")
        .property("Position", 3, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])
        .property("Mass", 1, vec![1.5, 2.5])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_builder() {
        let collection = CollectionBuilder::new()
            .container(particles())
            .attribute("Timestep", 5)
            .build();

        assert_eq!(collection.len(), 2);
        let container = collection.get_object_of::<PropertyContainer>().unwrap();
        assert_eq!(container.identifier(), "particles");
        assert_eq!(container.element_count(), 2);
    }
}
