use super::error::JoinError;
use super::id::Id;
use super::state::{
    CANCELLED, COMPLETED, NOTIFIED, RUNNING, SCHEDULED, SUSPENDED, TaskState,
};
use super::waker::make_waker;
use crate::diagnostics::TaskEventKind;
use crate::runtime::context;
use crate::runtime::executor::Shared;

use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// A task as seen by the queues: type-erased over its output.
pub(crate) type Notified = Arc<dyn Runnable>;

/// A runnable unit of work that can be executed by the scheduler.
///
/// The trait erases the output type of a task so that queues can hold a
/// heterogeneous collection of tasks through `Arc<dyn Runnable>`.
pub(crate) trait Runnable: Send + Sync {
    /// Polls the task once. Called by the worker that popped it.
    fn run(self: Arc<Self>);

    /// Cancels a task that is still sitting in a queue when the runtime
    /// shuts down.
    fn shutdown(self: Arc<Self>);

    fn id(&self) -> Id;
}

/// State shared by every task regardless of its output type.
pub(crate) struct Header {
    pub(crate) id: Id,

    /// One of the constants in [`state`](super::state).
    pub(crate) state: AtomicU8,

    /// Number of live wakers bound to this task.
    pub(crate) wakers: AtomicUsize,

    /// Claimed by the single thread that finalizes a cancelled task.
    finalized: AtomicBool,
}

/// Completion slot observed by the task's `JoinHandle`.
struct JoinSlot<T> {
    /// Output moved out exactly once by the `JoinHandle`.
    output: Option<Result<T, JoinError>>,

    /// Waker of the task awaiting the `JoinHandle`, if any.
    waker: Option<Waker>,

    /// `false` once the `JoinHandle` was dropped.
    interested: bool,

    /// `true` once the task reached a terminal state and was finalized.
    finished: bool,
}

/// A spawned asynchronous task managed by the runtime.
///
/// A `Task` owns its future exclusively. The future is only touched by the
/// thread that moved the state word to `RUNNING`, or by the thread that
/// cancelled the task while it was `SUSPENDED` or still queued.
pub(crate) struct Task<T> {
    pub(crate) header: Header,

    future: UnsafeCell<Option<Pin<Box<dyn Future<Output = T> + Send>>>>,

    join: Mutex<JoinSlot<T>>,

    scheduler: Arc<Shared>,
}

// Safety: the future is only accessed by the thread holding exclusive
// ownership through the state word, and `T` only crosses threads through the
// join slot mutex.
unsafe impl<T: Send> Send for Task<T> {}
unsafe impl<T: Send> Sync for Task<T> {}

impl<T> Task<T> {
    pub(crate) fn id(&self) -> Id {
        self.header.id
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_raw(self.header.state.load(Ordering::Acquire))
    }

    /// Reports a task that suspended with no waker alive to resume it.
    ///
    /// This is only a heuristic: a waker may legitimately be created later by
    /// another thread through some side channel.
    fn check_liveness(&self) {
        if self.header.wakers.load(Ordering::Acquire) == 0
            && self.header.state.load(Ordering::Acquire) == SUSPENDED
        {
            let id = self.id();
            tracing::warn!(
                task.id = %id,
                "task returned Pending without registering a waker; it may never be polled again"
            );
            self.scheduler.emit(id, TaskEventKind::LivenessViolation, None);
        }
    }

    /// Completes the task with a value or a panic and notifies the joiner.
    fn complete(&self, result: Result<T, JoinError>, elapsed: Duration) {
        let id = self.id();

        self.drop_future();
        self.header.state.store(COMPLETED, Ordering::Release);

        let panicked = result.is_err();
        if panicked {
            tracing::debug!(task.id = %id, "task panicked");
        } else {
            tracing::trace!(task.id = %id, "task completed");
        }
        self.scheduler.emit(id, TaskEventKind::Completed, Some(elapsed));
        self.scheduler.release(id);

        let (waker, unobserved) = {
            let mut slot = self.join.lock();
            slot.finished = true;

            if slot.interested {
                slot.output = Some(result);
                (slot.waker.take(), None)
            } else {
                (None, Some(result))
            }
        };

        if let Some(Err(err)) = unobserved {
            self.report_unobserved(&err);
        }

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Drops the future of a cancelled task and resolves its joiner.
    ///
    /// Called by whoever owns the cancelled task: the aborter of a suspended
    /// task, the worker that popped or was polling it, or the runtime at
    /// shutdown. Only the first caller does anything.
    fn finalize_cancelled(&self) {
        if self.header.finalized.swap(true, Ordering::AcqRel) {
            return;
        }

        let id = self.id();

        self.drop_future();

        tracing::trace!(task.id = %id, "task cancelled");
        self.scheduler.emit(id, TaskEventKind::Cancelled, None);
        self.scheduler.release(id);

        let waker = {
            let mut slot = self.join.lock();
            slot.finished = true;

            if slot.interested {
                slot.output = Some(Err(JoinError::cancelled(id)));
            }
            slot.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Drops the future, swallowing panics raised by its destructor.
    fn drop_future(&self) {
        // Safety: only called by the thread owning the task.
        let future = unsafe { (*self.future.get()).take() };

        if panic::catch_unwind(AssertUnwindSafe(move || drop(future))).is_err() {
            tracing::warn!(task.id = %self.id(), "task future panicked while being dropped");
        }
    }

    fn report_unobserved(&self, err: &JoinError) {
        if err.is_panic() {
            tracing::error!(task.id = %self.id(), error = %err, "detached task panicked");
            self.scheduler.emit(self.id(), TaskEventKind::Panicked { observed: false }, None);
        }
    }

    /// Requests cancellation of the task.
    ///
    /// A suspended task is finalized right away on the calling thread. A
    /// queued task is dropped by the worker that pops it, and a running task
    /// by its worker once the in-flight poll returns.
    pub(crate) fn abort(&self) {
        loop {
            let state = self.header.state.load(Ordering::Acquire);

            if state == COMPLETED || state == CANCELLED {
                return;
            }

            if self
                .header
                .state
                .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                tracing::trace!(task.id = %self.id(), from = state, "abort requested");

                if state == SUSPENDED {
                    self.finalize_cancelled();
                }
                return;
            }
        }
    }

    /// Polls the completion slot on behalf of a `JoinHandle`.
    pub(crate) fn poll_join(&self, cx: &mut Context<'_>) -> Poll<Result<T, JoinError>> {
        let mut slot = self.join.lock();

        if slot.finished {
            return match slot.output.take() {
                Some(output) => {
                    if matches!(&output, Err(err) if err.is_panic()) {
                        let id = self.id();
                        self.scheduler.emit(id, TaskEventKind::Panicked { observed: true }, None);
                    }
                    Poll::Ready(output)
                }
                None => panic!("`JoinHandle` polled after completion"),
            };
        }

        match &slot.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => slot.waker = Some(cx.waker().clone()),
        }

        Poll::Pending
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join.lock().finished
    }

    /// Detaches the `JoinHandle` from the task.
    pub(crate) fn drop_join_handle(&self) {
        let (output, waker) = {
            let mut slot = self.join.lock();
            slot.interested = false;
            (slot.output.take(), slot.waker.take())
        };

        if let Some(Err(err)) = &output {
            self.report_unobserved(err);
        }

        drop(waker);
        drop(output);
    }
}

impl<T: Send + 'static> Task<T> {
    /// Creates a new task in the `SCHEDULED` state.
    ///
    /// The caller is responsible for pushing it onto a queue.
    pub(crate) fn new<F>(future: F, scheduler: Arc<Shared>) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            header: Header {
                id: Id::next(),
                state: AtomicU8::new(SCHEDULED),
                wakers: AtomicUsize::new(0),
                finalized: AtomicBool::new(false),
            },
            future: UnsafeCell::new(Some(Box::pin(future))),
            join: Mutex::new(JoinSlot {
                output: None,
                waker: None,
                interested: true,
                finished: false,
            }),
            scheduler,
        }
    }

    /// Polls the task once.
    ///
    /// The state moves `SCHEDULED -> RUNNING`, the future is polled under
    /// `catch_unwind`, and the result decides the next state:
    /// - `Ready`: the task completes and its joiner is woken,
    /// - `Pending`: the task suspends, or is re-queued if it was woken
    ///   during the poll, or is finalized if it was cancelled meanwhile,
    /// - panic: the task completes with a [`JoinError::Panic`].
    fn run_inner(self: Arc<Self>) {
        let id = self.id();

        if let Err(actual) = self.header.state.compare_exchange(
            SCHEDULED,
            RUNNING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            // Aborted while queued. The worker that popped it owns it now.
            if actual == CANCELLED {
                self.finalize_cancelled();
            }
            return;
        }

        self.scheduler.emit(id, TaskEventKind::Running, None);
        tracing::trace!(task.id = %id, "polling task");

        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);

        let start = Instant::now();
        let poll = context::enter_task(id, || {
            panic::catch_unwind(AssertUnwindSafe(|| {
                // Safety: the RUNNING state guarantees that no other thread
                // touches the future.
                let future = unsafe { &mut *self.future.get() };
                match future.as_mut() {
                    Some(future) => future.as_mut().poll(&mut cx),
                    None => unreachable!("task {id} polled without a future"),
                }
            }))
        });
        let elapsed = start.elapsed();

        drop(waker);

        match poll {
            Ok(Poll::Ready(value)) => self.complete(Ok(value), elapsed),
            Ok(Poll::Pending) => self.suspend(elapsed),
            Err(payload) => self.complete(Err(JoinError::panic(id, payload)), elapsed),
        }
    }

    /// Handles a `Pending` poll.
    fn suspend(self: Arc<Self>, elapsed: Duration) {
        let id = self.id();

        loop {
            match self.header.state.compare_exchange(
                RUNNING,
                SUSPENDED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.scheduler.emit(id, TaskEventKind::Suspended, Some(elapsed));
                    self.check_liveness();
                    return;
                }
                Err(NOTIFIED) => {
                    // Woken while running: re-queue it ourselves. This is the
                    // only place a task goes back on a queue without a wake.
                    if self
                        .header
                        .state
                        .compare_exchange(NOTIFIED, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.scheduler.emit(id, TaskEventKind::Scheduled, Some(elapsed));
                        let scheduler = self.scheduler.clone();
                        scheduler.schedule(self);
                        return;
                    }
                }
                Err(CANCELLED) => {
                    self.finalize_cancelled();
                    return;
                }
                Err(other) => unreachable!("task {id} in state {other} after poll"),
            }
        }
    }

    /// Signals the task to be rescheduled.
    ///
    /// - `SUSPENDED`: moves to `SCHEDULED` and is pushed onto a queue,
    /// - `RUNNING`: moves to `NOTIFIED` so that the worker re-queues it once
    ///   the current poll returns,
    /// - anything else: nothing to do, the wake coalesces with a pending one
    ///   or the task is finished.
    pub(crate) fn wake_by_ref(self: &Arc<Self>) {
        loop {
            let state = self.header.state.load(Ordering::Acquire);

            match state {
                SUSPENDED => {
                    if self
                        .header
                        .state
                        .compare_exchange(SUSPENDED, SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.scheduler.emit(self.id(), TaskEventKind::Scheduled, None);
                        self.scheduler.schedule(self.clone());
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .header
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

impl<T: Send + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        self.run_inner()
    }

    fn shutdown(self: Arc<Self>) {
        loop {
            let state = self.header.state.load(Ordering::Acquire);

            match state {
                // Aborted while queued, nobody finalized it yet.
                CANCELLED => break,
                SCHEDULED | SUSPENDED => {
                    if self
                        .header
                        .state
                        .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        break;
                    }
                }
                _ => return,
            }
        }

        self.finalize_cancelled();
    }

    fn id(&self) -> Id {
        self.header.id
    }
}
