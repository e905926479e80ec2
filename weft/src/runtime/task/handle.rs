use super::error::JoinError;
use super::id::Id;
use super::state::TaskState;
use crate::runtime::task::Task;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A handle to a spawned task.
///
/// A `JoinHandle` implements [`Future`] and resolves once the task reached a
/// terminal state: `Ok(value)` if it completed, `Err(JoinError)` if it was
/// cancelled or panicked. The output is handed out exactly once. Polling the
/// handle again after it resolved is a programmer error and panics.
///
/// Awaiting a handle registers the awaiting task's waker on the completion
/// slot of the target task; no busy polling is involved.
///
/// Dropping the `JoinHandle` does **not** cancel the task. It only
/// discards the ability to observe its result. Use [`abort`](Self::abort)
/// to cancel it.
pub struct JoinHandle<T> {
    pub(crate) task: Arc<Task<T>>,
}

impl<T: Send + 'static> JoinHandle<T> {
    pub(crate) fn new(task: Arc<Task<T>>) -> Self {
        Self { task }
    }

    /// Requests cancellation of the task.
    ///
    /// Cancellation is cooperative at poll boundaries: a poll already in
    /// progress runs to completion, but the task is never polled again. The
    /// handle then resolves with a cancelled [`JoinError`], unless the
    /// in-flight poll completed the task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Returns a cloneable handle that can only cancel the task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            task: self.task.clone(),
        }
    }

    /// Returns `true` once the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns the id of the task.
    pub fn id(&self) -> Id {
        self.task.id()
    }

    /// Returns a snapshot of the task's lifecycle state.
    pub fn state(&self) -> TaskState {
        self.task.state()
    }
}

impl<T: Send + 'static> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.task.poll_join(cx)
    }
}

impl<T> Unpin for JoinHandle<T> {}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        self.task.drop_join_handle();
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.task.header.id)
            .finish()
    }
}

/// Object-safe view of a task used by [`AbortHandle`].
pub(crate) trait TaskControl: Send + Sync {
    fn abort(&self);
    fn is_finished(&self) -> bool;
    fn id(&self) -> Id;
}

impl<T: Send + 'static> TaskControl for Task<T> {
    fn abort(&self) {
        Task::abort(self)
    }

    fn is_finished(&self) -> bool {
        Task::is_finished(self)
    }

    fn id(&self) -> Id {
        Task::id(self)
    }
}

/// A cloneable handle that can cancel a task without observing its output.
///
/// Created by [`JoinHandle::abort_handle`].
#[derive(Clone)]
pub struct AbortHandle {
    task: Arc<dyn TaskControl>,
}

impl AbortHandle {
    /// Requests cancellation of the task. See [`JoinHandle::abort`].
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Returns `true` once the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns the id of the task.
    pub fn id(&self) -> Id {
        self.task.id()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("id", &self.task.id())
            .finish()
    }
}
