//! Data references: handles that count toward copy-on-write sharing.

use crate::data::object::DataObject;
use crate::oo::clone::CloneHelper;
use crate::oo::object::OORef;
use crate::oo::ref_target::RefTarget;
use std::fmt;
use std::ops::Deref;

/// Owning handle to a [`DataObject`] that also bumps its data-reference count.
///
/// An object reachable through more than one `DataOORef` is shared and must
/// be copied before it is modified. Plain [`OORef`]s keep an object alive but
/// do not make it shared.
pub struct DataOORef<T: ?Sized + DataObject> {
    object: OORef<T>,
}

impl<T: ?Sized + DataObject> DataOORef<T> {
    pub fn new(object: OORef<T>) -> Self {
        object.data_base().increment_data_reference_count();
        Self { object }
    }

    /// The lifetime handle, without data-reference semantics.
    pub fn object(&self) -> &OORef<T> {
        &self.object
    }

    pub fn addr(&self) -> usize {
        self.object.addr()
    }

    pub fn ptr_eq<U: ?Sized + DataObject>(&self, other: &DataOORef<U>) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: DataObject> DataOORef<T> {
    /// Wrap a freshly constructed object.
    pub fn create(value: T) -> Self {
        Self::new(OORef::new(value))
    }

    /// Shallow copy of the referenced object; sub-objects are shared.
    pub fn make_copy(&self) -> DataOORef<T> {
        let copy = OORef::new(self.object.duplicate());
        CloneHelper::new().copy_reference_fields(&*self.object, &*copy, false);
        tracing::debug!(
            class = copy.class().name(),
            "Copied shared data object before modification"
        );
        DataOORef::new(copy)
    }

    /// Exclusive access, replacing the referenced object by a copy if it is shared.
    pub fn make_mutable(&mut self) -> &T {
        if !self.object.is_safe_to_modify() {
            *self = self.make_copy();
        }
        &self.object
    }

    pub fn into_dyn(self) -> DataOORef<dyn DataObject> {
        DataOORef::new(self.object.clone().into_data_object())
    }
}

impl DataOORef<dyn DataObject> {
    pub fn downcast<T: DataObject>(&self) -> Option<DataOORef<T>> {
        self.object.downcast::<T>().map(DataOORef::new)
    }
}

impl<T: ?Sized + DataObject> Deref for DataOORef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: ?Sized + DataObject> Clone for DataOORef<T> {
    fn clone(&self) -> Self {
        Self::new(self.object.clone())
    }
}

impl<T: ?Sized + DataObject> Drop for DataOORef<T> {
    fn drop(&mut self) {
        self.object.data_base().decrement_data_reference_count();
    }
}

impl<T: ?Sized + DataObject> fmt::Debug for DataOORef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataOORef(0x{:x}, data_refs={})",
            self.addr(),
            self.object.data_reference_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AttributeDataObject, AttributeValue};

    #[test]
    fn test_data_reference_counting() {
        let object = OORef::new(AttributeDataObject::new("A", AttributeValue::Int(1)));
        assert_eq!(object.data_reference_count(), 0);
        assert!(object.is_safe_to_modify());

        let first = DataOORef::new(object.clone());
        assert_eq!(object.data_reference_count(), 1);
        assert!(object.is_safe_to_modify());

        let second = first.clone();
        assert_eq!(object.data_reference_count(), 2);
        assert!(!object.is_safe_to_modify());

        drop(second);
        assert_eq!(object.data_reference_count(), 1);
        drop(first);
        assert_eq!(object.data_reference_count(), 0);
        assert_eq!(object.reference_count(), 1);
    }

    #[test]
    fn test_make_mutable_copies_only_when_shared() {
        let mut first = DataOORef::create(AttributeDataObject::new("A", AttributeValue::Int(1)));
        let before = first.addr();
        first.make_mutable();
        assert_eq!(first.addr(), before);

        let second = first.clone();
        first.make_mutable().set_value(AttributeValue::Int(2));
        assert_ne!(first.addr(), second.addr());
        assert_eq!(second.value(), AttributeValue::Int(1));
        assert_eq!(first.value(), AttributeValue::Int(2));
        assert_eq!(first.identifier(), "A");
        assert!(first.is_safe_to_modify());
        assert!(second.is_safe_to_modify());
    }

    #[test]
    fn test_into_dyn_keeps_count() {
        let typed = DataOORef::create(AttributeDataObject::new("A", AttributeValue::Bool(true)));
        let object = typed.object().clone();
        let dynamic = typed.into_dyn();
        assert_eq!(object.data_reference_count(), 1);
        assert!(dynamic.downcast::<AttributeDataObject>().is_some());
        assert_eq!(object.data_reference_count(), 1);
    }
}
