use crate::runtime::executor::Shared;
use crate::runtime::handle::Handle;
use crate::runtime::task::Id;
use crate::runtime::work_stealing::queue::LocalQueue;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

thread_local! {
    /// Handle of the runtime this thread is currently running in.
    ///
    /// Installed by worker threads for their whole lifetime and by
    /// `block_on` for the duration of the call, so that free functions like
    /// [`spawn`](crate::spawn) and [`sleep`](crate::time::sleep) can find
    /// their runtime without explicit parameter passing.
    static CURRENT: RefCell<Option<Handle>> = const { RefCell::new(None) };

    /// Id of the task being polled on this thread.
    static CURRENT_TASK: Cell<Option<Id>> = const { Cell::new(None) };

    /// Scheduler state of the worker running on this thread, if any.
    static CURRENT_WORKER: RefCell<Option<Rc<WorkerContext>>> = const { RefCell::new(None) };
}

/// Per-thread view of a worker: which scheduler it belongs to and its local
/// run queue.
pub(crate) struct WorkerContext {
    pub(crate) shared: Arc<Shared>,
    pub(crate) index: usize,
    pub(crate) local: LocalQueue,
}

/// Restores the previous runtime handle when dropped.
pub(crate) struct EnterGuard {
    prev: Option<Handle>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        let _ = CURRENT.try_with(|c| *c.borrow_mut() = prev);
    }
}

/// Installs `handle` as the current runtime of this thread until the guard
/// is dropped.
pub(crate) fn enter(handle: Handle) -> EnterGuard {
    let prev = CURRENT.with(|c| c.borrow_mut().replace(handle));
    EnterGuard { prev }
}

/// Returns a clone of the current runtime handle.
pub(crate) fn current() -> Option<Handle> {
    CURRENT
        .try_with(|c| c.borrow().clone())
        .ok()
        .flatten()
}

/// Returns `true` if this thread is inside a runtime context.
pub(crate) fn is_entered() -> bool {
    CURRENT
        .try_with(|c| c.borrow().is_some())
        .unwrap_or(false)
}

/// Runs `f` with `id` recorded as the current task.
pub(crate) fn enter_task<R>(id: Id, f: impl FnOnce() -> R) -> R {
    struct Reset(Option<Id>);

    impl Drop for Reset {
        fn drop(&mut self) {
            let _ = CURRENT_TASK.try_with(|c| c.set(self.0));
        }
    }

    let _reset = Reset(CURRENT_TASK.with(|c| c.replace(Some(id))));
    f()
}

pub(crate) fn current_task_id() -> Option<Id> {
    CURRENT_TASK.try_with(|c| c.get()).ok().flatten()
}

/// Clears the worker context when dropped.
pub(crate) struct WorkerGuard {
    prev: Option<Rc<WorkerContext>>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        let _ = CURRENT_WORKER.try_with(|w| *w.borrow_mut() = prev);
    }
}

pub(crate) fn enter_worker(cx: Rc<WorkerContext>) -> WorkerGuard {
    let prev = CURRENT_WORKER.with(|w| w.borrow_mut().replace(cx));
    WorkerGuard { prev }
}

/// Returns the worker running on this thread, if any.
pub(crate) fn current_worker() -> Option<Rc<WorkerContext>> {
    CURRENT_WORKER
        .try_with(|w| w.try_borrow().ok().and_then(|cx| cx.clone()))
        .ok()
        .flatten()
}
