//! Reference-counted object lifetime.
//!
//! Objects embed an [`ObjectHeader`] holding an atomic reference count and the
//! [`ExecutionContext`] they belong to. [`OORef`] is the owning handle: cloning
//! it acquires a reference, dropping it releases one. When the count reaches
//! zero the header switches to a reserved sentinel value, the object's
//! [`RefCounted::about_to_be_deleted`] hook runs exactly once, and the object
//! is freed. If the last release happens on a foreign thread, the teardown is
//! posted to the owning context.
//!
//! ```text
//! Live ──release() to 0──▶ Releasing ──hook done──▶ Destroyed
//! ```
//!
//! [`OOWeakRef`] observes an object without keeping it alive. Upgrading fails
//! once the object has entered the releasing state.

use crate::oo::context::ExecutionContext;
use parking_lot::RwLock;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Count value marking an object whose teardown has begun.
pub const INVALID_REFERENCE_COUNT: usize = usize::MAX / 2;

/// Lifetime phase of a reference-counted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeState {
    /// At least one handle may exist.
    Live,
    /// The last handle is gone and teardown is running or queued.
    Releasing,
}

/// Address of an object, used for identity comparisons and pointer maps.
pub fn object_addr<T: ?Sized>(object: &T) -> usize {
    object as *const T as *const () as usize
}

/// Reference count and owning context embedded in every object.
pub struct ObjectHeader {
    ref_count: AtomicUsize,
    context: RwLock<ExecutionContext>,
}

impl ObjectHeader {
    /// Header owned by the calling thread's context.
    pub fn new() -> Self {
        Self::with_context(ExecutionContext::current())
    }

    pub fn with_context(context: ExecutionContext) -> Self {
        Self {
            ref_count: AtomicUsize::new(0),
            context: RwLock::new(context),
        }
    }

    /// Current number of owning handles.
    pub fn reference_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn context(&self) -> ExecutionContext {
        self.context.read().clone()
    }

    /// Hand the object over to `context` if its owning context has closed.
    ///
    /// Returns true if the owner changed.
    pub fn adopt(&self, context: &ExecutionContext) -> bool {
        let mut owner = self.context.write();
        if owner.is_open() || *owner == *context {
            return false;
        }
        *owner = context.clone();
        true
    }

    pub fn state(&self) -> LifetimeState {
        if self.is_about_to_be_deleted() {
            LifetimeState::Releasing
        } else {
            LifetimeState::Live
        }
    }

    /// True once the count has been replaced by the teardown sentinel.
    pub fn is_about_to_be_deleted(&self) -> bool {
        self.reference_count() >= INVALID_REFERENCE_COUNT
    }

    pub(crate) fn acquire(&self) {
        let previous = self.ref_count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(
            previous < INVALID_REFERENCE_COUNT,
            "acquired a reference to an object whose teardown has started"
        );
    }

    /// Acquire only if the object is live and already owned.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut current = self.ref_count.load(Ordering::Relaxed);
        loop {
            if current == 0 || current >= INVALID_REFERENCE_COUNT {
                return false;
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Release one reference. Returns true if the caller must tear the object down.
    pub(crate) fn release(&self) -> bool {
        let previous = self.ref_count.fetch_sub(1, Ordering::Release);
        debug_assert!(
            previous != 0 && previous < INVALID_REFERENCE_COUNT,
            "released a reference that was never acquired"
        );
        if previous != 1 {
            return false;
        }
        std::sync::atomic::fence(Ordering::Acquire);
        self.ref_count
            .compare_exchange(0, INVALID_REFERENCE_COUNT, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for ObjectHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeader")
            .field("ref_count", &self.reference_count())
            .field("context", &self.context.read().id())
            .finish()
    }
}

/// An object managed through [`OORef`] handles.
pub trait RefCounted: Send + Sync + 'static {
    fn header(&self) -> &ObjectHeader;

    /// Runs once, on the owning context, right before the object is freed.
    fn about_to_be_deleted(&self) {}
}

/// Owning handle to a reference-counted object.
pub struct OORef<T: ?Sized + RefCounted> {
    // Only `None` while the handle is being consumed.
    inner: Option<Arc<T>>,
}

impl<T: RefCounted> OORef<T> {
    /// Take ownership of a freshly constructed object.
    pub fn new(value: T) -> Self {
        let arc = Arc::new(value);
        arc.header().acquire();
        Self { inner: Some(arc) }
    }
}

impl<T: ?Sized + RefCounted> OORef<T> {
    /// Wrap an `Arc` whose reference has already been acquired.
    pub(crate) fn from_arc(arc: Arc<T>) -> Self {
        Self { inner: Some(arc) }
    }

    /// Wrap an `Arc`, acquiring a new reference for the handle.
    pub(crate) fn acquire_arc(arc: Arc<T>) -> Self {
        arc.header().acquire();
        Self { inner: Some(arc) }
    }

    pub(crate) fn arc(&self) -> &Arc<T> {
        match &self.inner {
            Some(arc) => arc,
            None => unreachable!("OORef accessed after being consumed"),
        }
    }

    /// Consume the handle, handing its acquired reference to the returned `Arc`.
    pub(crate) fn into_arc(mut self) -> Arc<T> {
        match self.inner.take() {
            Some(arc) => arc,
            None => unreachable!("OORef consumed twice"),
        }
    }

    /// Address of the referenced object.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(self.arc()) as *const () as usize
    }

    /// Whether two handles refer to the same object.
    pub fn ptr_eq<U: ?Sized + RefCounted>(&self, other: &OORef<U>) -> bool {
        self.addr() == other.addr()
    }

    pub fn reference_count(&self) -> usize {
        self.header().reference_count()
    }

    pub fn downgrade(&self) -> OOWeakRef<T> {
        OOWeakRef {
            inner: Arc::downgrade(self.arc()),
        }
    }
}

impl<T: ?Sized + RefCounted> Deref for OORef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.arc()
    }
}

impl<T: ?Sized + RefCounted> Clone for OORef<T> {
    fn clone(&self) -> Self {
        Self::acquire_arc(self.arc().clone())
    }
}

impl<T: ?Sized + RefCounted> Drop for OORef<T> {
    fn drop(&mut self) {
        if let Some(arc) = self.inner.take() {
            if arc.header().release() {
                destroy(arc);
            }
        }
    }
}

impl<T: ?Sized + RefCounted> fmt::Debug for OORef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OORef(0x{:x}, refs={})",
            self.addr(),
            self.reference_count()
        )
    }
}

fn destroy<T: ?Sized + RefCounted>(object: Arc<T>) {
    let context = object.header().context();
    if context.is_current() {
        teardown(object);
    } else {
        tracing::trace!(
            owner = %context.name(),
            "Last reference released off the owning context; deferring teardown"
        );
        context.post(move || teardown(object));
    }
}

fn teardown<T: ?Sized + RefCounted>(object: Arc<T>) {
    object.about_to_be_deleted();
    drop(object);
}

/// Non-owning handle to a reference-counted object.
pub struct OOWeakRef<T: ?Sized + RefCounted> {
    inner: Weak<T>,
}

impl<T: ?Sized + RefCounted> OOWeakRef<T> {
    /// Obtain an owning handle if the object is still live.
    pub fn upgrade(&self) -> Option<OORef<T>> {
        let arc = self.inner.upgrade()?;
        if arc.header().try_acquire() {
            Some(OORef::from_arc(arc))
        } else {
            None
        }
    }

    /// Whether the object is live and owned by at least one handle.
    pub fn is_alive(&self) -> bool {
        self.inner.upgrade().is_some_and(|arc| {
            let count = arc.header().reference_count();
            count > 0 && count < INVALID_REFERENCE_COUNT
        })
    }

    pub fn addr(&self) -> usize {
        Weak::as_ptr(&self.inner) as *const () as usize
    }
}

impl<T: ?Sized + RefCounted> Clone for OOWeakRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: ?Sized + RefCounted> fmt::Debug for OOWeakRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OOWeakRef(0x{:x}, alive={})", self.addr(), self.is_alive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Probe {
        header: ObjectHeader,
        deletions: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(deletions: &Arc<AtomicUsize>) -> Self {
            Self {
                header: ObjectHeader::new(),
                deletions: deletions.clone(),
            }
        }
    }

    impl RefCounted for Probe {
        fn header(&self) -> &ObjectHeader {
            &self.header
        }

        fn about_to_be_deleted(&self) {
            assert!(self.header.is_about_to_be_deleted());
            self.deletions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_object_has_one_reference() {
        let deletions = Arc::new(AtomicUsize::new(0));
        let object = OORef::new(Probe::new(&deletions));
        assert_eq!(object.reference_count(), 1);
        assert_eq!(object.header().state(), LifetimeState::Live);

        let second = object.clone();
        assert_eq!(object.reference_count(), 2);
        assert!(object.ptr_eq(&second));
    }

    #[test]
    fn test_destroyed_exactly_once() {
        let deletions = Arc::new(AtomicUsize::new(0));
        let object = OORef::new(Probe::new(&deletions));
        let copies: Vec<_> = (0..5).map(|_| object.clone()).collect();
        drop(object);
        assert_eq!(deletions.load(Ordering::SeqCst), 0);
        drop(copies);
        assert_eq!(deletions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_weak_reference_does_not_keep_alive() {
        let deletions = Arc::new(AtomicUsize::new(0));
        let object = OORef::new(Probe::new(&deletions));
        let weak = object.downgrade();
        assert!(weak.is_alive());
        {
            let upgraded = weak.upgrade().unwrap();
            assert_eq!(upgraded.reference_count(), 2);
        }
        drop(object);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
        assert_eq!(deletions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_foreign_release_defers_teardown() {
        let context = ExecutionContext::current();
        let deletions = Arc::new(AtomicUsize::new(0));
        let object = OORef::new(Probe::new(&deletions));
        let weak = object.downgrade();

        std::thread::spawn(move || drop(object)).join().unwrap();

        // Releasing: not yet torn down, but no longer upgradable.
        assert_eq!(deletions.load(Ordering::SeqCst), 0);
        assert!(weak.upgrade().is_none());
        assert!(!weak.is_alive());

        assert_eq!(context.process_pending(), 1);
        assert_eq!(deletions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_adopt_takes_over_closed_owner() {
        let context = ExecutionContext::current();
        let deletions = Arc::new(AtomicUsize::new(0));
        let d = deletions.clone();
        let object = std::thread::spawn(move || OORef::new(Probe::new(&d)))
            .join()
            .unwrap();
        assert!(!object.header().context().is_open());

        assert!(object.header().adopt(&context));
        assert_eq!(object.header().context(), context);
        assert!(!object.header().adopt(&context));

        drop(object);
        assert_eq!(deletions.load(Ordering::SeqCst), 1);
        assert_eq!(context.pending_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_hook_runs_once_for_any_handle_sequence(ops in prop::collection::vec(any::<bool>(), 0..64)) {
            let deletions = Arc::new(AtomicUsize::new(0));
            let mut handles = vec![OORef::new(Probe::new(&deletions))];
            for clone in ops {
                if clone || handles.len() == 1 {
                    let next = handles[0].clone();
                    handles.push(next);
                } else {
                    handles.pop();
                }
                prop_assert_eq!(handles[0].reference_count(), handles.len());
                prop_assert_eq!(deletions.load(Ordering::SeqCst), 0);
            }
            drop(handles);
            prop_assert_eq!(deletions.load(Ordering::SeqCst), 1);
        }
    }
}
