//! Execution contexts that own objects.
//!
//! Every thread has one implicit [`ExecutionContext`]. Objects remember the
//! context they were created on; when the last reference to an object is
//! dropped on a different thread, its teardown is posted to the owner's run
//! queue instead of running in place. The owner drains that queue with
//! [`ExecutionContext::process_pending`].
//!
//! Once a thread exits its context is closed, and anything posted to it
//! afterwards runs inline on the posting thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

/// Deferred unit of work posted to a context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextInner {
    id: u64,
    name: String,
    thread: ThreadId,
    /// Held while posting and while closing, so no task lands after the final drain.
    open: Mutex<bool>,
    task_tx: Sender<Task>,
    task_rx: Receiver<Task>,
}

/// Handle to the run queue of an owning thread.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

struct ContextGuard {
    context: ExecutionContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        *self.context.inner.open.lock() = false;
        let pending = self.context.drain();
        if pending > 0 {
            tracing::debug!(
                context = %self.context.name(),
                pending,
                "Ran pending teardown tasks while closing execution context"
            );
        }
    }
}

thread_local! {
    static CURRENT: ContextGuard = ContextGuard {
        context: ExecutionContext::for_current_thread(true),
    };
}

impl ExecutionContext {
    fn for_current_thread(open: bool) -> Self {
        let thread = std::thread::current();
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let name = thread
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("context-{id}"));
        let (task_tx, task_rx) = unbounded();
        Self {
            inner: Arc::new(ContextInner {
                id,
                name,
                thread: thread.id(),
                open: Mutex::new(open),
                task_tx,
                task_rx,
            }),
        }
    }

    /// The context of the calling thread.
    ///
    /// During thread shutdown, after the thread's own context has been torn
    /// down, this returns a closed context so that teardown runs inline.
    pub fn current() -> Self {
        CURRENT
            .try_with(|guard| guard.context.clone())
            .unwrap_or_else(|_| Self::for_current_thread(false))
    }

    /// Unique id of this context.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Thread name, or a generated name for unnamed threads.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the calling thread owns this context.
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.inner.thread
    }

    /// Whether the owning thread is still alive to process tasks.
    pub fn is_open(&self) -> bool {
        *self.inner.open.lock()
    }

    /// Number of tasks waiting for the owning thread.
    pub fn pending_count(&self) -> usize {
        self.inner.task_rx.len()
    }

    /// Post a task to this context's run queue.
    ///
    /// Runs the task immediately when the context has already been closed.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let rejected = {
            let open = self.inner.open.lock();
            if *open {
                self.inner.task_tx.send(Box::new(task)).err().map(|err| err.into_inner())
            } else {
                Some(Box::new(task) as Task)
            }
        };
        if let Some(task) = rejected {
            tracing::debug!(
                context = %self.name(),
                "Execution context is closed; running posted task inline"
            );
            task();
        }
    }

    /// Run every task posted to this context so far.
    ///
    /// Must be called from the owning thread. Returns the number of tasks run.
    pub fn process_pending(&self) -> usize {
        debug_assert!(
            self.is_current(),
            "process_pending() called from a thread that does not own the context"
        );
        self.drain()
    }

    fn drain(&self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.inner.task_rx.try_recv() {
            task();
            count += 1;
        }
        count
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("open", &self.is_open())
            .field("pending", &self.pending_count())
            .finish()
    }
}
