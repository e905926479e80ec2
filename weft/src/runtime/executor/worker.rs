use crate::runtime::context::{self, WorkerContext, WorkerGuard};
use crate::runtime::executor::Shared;
use crate::runtime::task::Notified;
use crate::runtime::work_stealing::queue::{self, LocalQueue};

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

/// What a worker is doing, reported in trace logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Idle,
    Popping,
    Polling,
    Stealing,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Popping => "popping",
            WorkerState::Polling => "polling",
            WorkerState::Stealing => "stealing",
        };
        f.write_str(s)
    }
}

/// A worker of the scheduler.
///
/// The execution order is:
/// 1. every `global_queue_interval` ticks, the global injector first,
/// 2. the local queue,
/// 3. a batch stolen from the injector, then from a peer,
/// 4. spin a few rounds, then park until work becomes available.
pub(crate) struct Worker {
    cx: Rc<WorkerContext>,

    /// Number of tasks this worker has looked for.
    tick: u32,

    state: WorkerState,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>, index: usize, local: LocalQueue) -> Self {
        Self {
            cx: Rc::new(WorkerContext {
                shared,
                index,
                local,
            }),
            tick: 0,
            state: WorkerState::Idle,
        }
    }

    /// Makes this worker the one of the current thread, so that wakes
    /// issued from its tasks land on its local queue.
    pub(crate) fn enter(&self) -> WorkerGuard {
        context::enter_worker(self.cx.clone())
    }

    /// Gives back the local queue. Must be called after the guard returned
    /// by [`enter`](Self::enter) was dropped.
    pub(crate) fn into_local(self) -> Option<LocalQueue> {
        Rc::try_unwrap(self.cx).ok().map(|cx| cx.local)
    }

    fn shared(&self) -> &Shared {
        &self.cx.shared
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            tracing::trace!(worker = self.cx.index, from = %self.state, to = %next, "worker state");
            self.state = next;
        }
    }

    /// Runs the worker loop until shutdown, then cancels whatever is left
    /// in the local queue.
    pub(crate) fn run(mut self) {
        let _guard = self.enter();
        tracing::debug!(worker = self.cx.index, "worker started");

        while !self.shared().is_shutdown() {
            if !self.run_once() {
                self.idle(|| false);
            }
        }

        self.drain();
        tracing::debug!(worker = self.cx.index, "worker stopped");
    }

    /// Finds and polls one task. Returns `false` if there was nothing to do.
    pub(crate) fn run_once(&mut self) -> bool {
        match self.find_task() {
            Some(task) => {
                self.transition(WorkerState::Polling);
                task.run();
                true
            }
            None => false,
        }
    }

    fn find_task(&mut self) -> Option<Notified> {
        self.tick = self.tick.wrapping_add(1);

        if self.tick % self.shared().config.global_queue_interval == 0
            && let Some(task) = self.shared().injector.steal_batch_and_pop(&self.cx.local)
        {
            return Some(task);
        }

        self.transition(WorkerState::Popping);
        if let Some(task) = self.cx.local.pop() {
            return Some(task);
        }

        self.transition(WorkerState::Stealing);
        self.steal()
    }

    fn steal(&self) -> Option<Notified> {
        let shared = self.shared();

        if let Some(task) = shared.injector.steal_batch_and_pop(&self.cx.local) {
            return Some(task);
        }

        let start = fastrand::usize(..shared.stealers.len());
        let task = queue::steal_from_peers(&shared.stealers, self.cx.index, start, &self.cx.local);

        if let Some(task) = &task {
            tracing::trace!(worker = self.cx.index, task.id = %task.id(), "stole task");
        }
        task
    }

    fn has_work(&self) -> bool {
        let shared = self.shared();

        !self.cx.local.is_empty()
            || !shared.injector.is_empty()
            || queue::peers_have_work(&shared.stealers, self.cx.index)
    }

    /// Waits for work: spins `spin_before_park` rounds, then parks.
    ///
    /// `ready` lets the caller cut the wait short, the current-thread
    /// flavor uses it for wakes of the `block_on` future.
    pub(crate) fn idle(&mut self, ready: impl Fn() -> bool) {
        self.transition(WorkerState::Idle);

        let shared = self.cx.shared.clone();

        for _ in 0..shared.config.spin_before_park {
            if shared.is_shutdown() || self.has_work() || ready() {
                return;
            }
            thread::yield_now();
        }

        shared
            .injector
            .park(shared.config.park_timeout, || self.has_work() || ready());
    }

    /// Cancels the tasks still sitting in the local queue.
    fn drain(&self) {
        while let Some(task) = self.cx.local.pop() {
            task.shutdown();
        }
    }
}
