use crate::runtime::task::Notified;
use crate::runtime::work_stealing::queue::LocalQueue;

use crossbeam_deque::{Injector as GlobalQueue, Steal};
use parking_lot::{Condvar, Mutex};
use std::iter;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Global task injector for the work-stealing scheduler.
///
/// Tasks spawned from outside a worker, or woken from a thread that is not
/// one of this scheduler's workers, land here before being picked up.
///
/// The injector also coordinates idle workers: a worker that found nothing
/// to do parks on the condition variable until a task is injected, a peer
/// signals that it has stealable work, or shutdown begins.
pub(crate) struct Injector {
    queue: GlobalQueue<Notified>,

    /// Guards the park/notify handshake. A parking worker re-checks for work
    /// while holding it, and every notification takes it, so no wake-up can
    /// slip between the check and the wait.
    lock: Mutex<()>,

    condvar: Condvar,

    /// Number of parked workers. Only written while `lock` is held.
    parked: AtomicUsize,

    shutdown: AtomicBool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            queue: GlobalQueue::new(),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Pushes a task and wakes one parked worker.
    pub(crate) fn push(&self, task: Notified) {
        self.queue.push(task);
        self.notify_one();
    }

    /// Moves a batch of tasks into `dest` and returns one of them.
    pub(crate) fn steal_batch_and_pop(&self, dest: &LocalQueue) -> Option<Notified> {
        iter::repeat_with(|| self.queue.steal_batch_and_pop(dest))
            .find(|steal| !steal.is_retry())
            .and_then(|steal| steal.success())
    }

    /// Takes a single task, used when draining the queue at shutdown.
    pub(crate) fn pop(&self) -> Option<Notified> {
        loop {
            match self.queue.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Parks the current worker until it is notified, `timeout` elapses, or
    /// shutdown begins.
    ///
    /// The park is skipped when the injector holds work or when `ready`
    /// reports that the caller has something else to do. Both are checked
    /// under the coordination lock.
    pub(crate) fn park(&self, timeout: Duration, ready: impl Fn() -> bool) {
        let mut guard = self.lock.lock();

        if self.is_shutdown() || !self.queue.is_empty() || ready() {
            return;
        }

        self.parked.fetch_add(1, Ordering::SeqCst);
        let _ = self.condvar.wait_for(&mut guard, timeout);
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }

    /// Wakes one parked worker, if any.
    pub(crate) fn notify_one(&self) {
        let _guard = self.lock.lock();
        self.condvar.notify_one();
    }

    /// Wakes one parked worker only if one is known to be parked.
    ///
    /// Used after pushing onto a local queue: a worker that parks later will
    /// see the work through its stealers before waiting.
    pub(crate) fn notify_if_parked(&self) {
        if self.parked.load(Ordering::SeqCst) > 0 {
            self.notify_one();
        }
    }

    /// Signals shutdown and wakes every parked worker.
    pub(crate) fn shutdown(&self) {
        let _guard = self.lock.lock();
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}
