use std::fmt;

/// Task sits in exactly one ready queue and waits to be polled.
pub(crate) const SCHEDULED: u8 = 0;

/// Task is being polled by a worker.
///
/// At most one thread may observe this state at a time, it grants
/// exclusive access to the task's future.
pub(crate) const RUNNING: u8 = 1;

/// Task returned `Poll::Pending` and is waiting for a waker to fire.
///
/// It is in no queue. The thread that moves it out of this state owns it.
pub(crate) const SUSPENDED: u8 = 2;

/// Task was woken while it was being polled.
///
/// The polling worker re-queues it once the current poll returns.
pub(crate) const NOTIFIED: u8 = 3;

/// The future returned `Poll::Ready` (or panicked) and was dropped.
pub(crate) const COMPLETED: u8 = 4;

/// Cancellation was requested. The task will never be polled again.
pub(crate) const CANCELLED: u8 = 5;

/// Observable lifecycle state of a task.
///
/// Returned by [`JoinHandle::state`](crate::task::JoinHandle::state). The
/// value is a snapshot and may be stale as soon as it is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Queued and waiting for a worker.
    Scheduled,
    /// Currently being polled.
    Running,
    /// Waiting for a wake-up.
    Suspended,
    /// Finished, either with a value or with a panic.
    Completed,
    /// Cancelled before it could finish.
    Cancelled,
}

impl TaskState {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            SCHEDULED => TaskState::Scheduled,
            // A notified task is still executing its current poll.
            RUNNING | NOTIFIED => TaskState::Running,
            SUSPENDED => TaskState::Suspended,
            COMPLETED => TaskState::Completed,
            CANCELLED => TaskState::Cancelled,
            _ => unreachable!("invalid task state {raw}"),
        }
    }

    /// Returns `true` once the task can no longer be polled.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Scheduled => "scheduled",
            TaskState::Running => "running",
            TaskState::Suspended => "suspended",
            TaskState::Completed => "completed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
