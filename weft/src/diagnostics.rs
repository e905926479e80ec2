//! Best-effort task lifecycle events.
//!
//! When enabled with [`Builder::enable_diagnostics`], the runtime records an
//! event each time a task changes state. Events go through a bounded
//! lock-free queue: if consumers fall behind the newest events are dropped
//! and counted, the scheduler itself never waits on the queue.
//!
//! ```
//! use weft::runtime::Builder;
//!
//! let rt = Builder::new_current_thread().enable_diagnostics(1024).build().unwrap();
//! rt.block_on(async { weft::spawn(async {}).await.unwrap() });
//!
//! let events = rt.diagnostics().unwrap().drain();
//! assert!(!events.is_empty());
//! ```
//!
//! [`Builder::enable_diagnostics`]: crate::runtime::Builder::enable_diagnostics

use crate::task::Id;

use crossbeam_queue::ArrayQueue;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What happened to a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskEventKind {
    /// The task was queued for its next poll.
    Scheduled,

    /// A worker started polling the task.
    Running,

    /// The task returned `Pending` and waits for a wake.
    Suspended,

    /// The task finished, either with a value or a panic.
    Completed,

    /// The task was aborted or dropped at shutdown.
    Cancelled,

    /// The task panicked. `observed` is `true` when the panic was handed to
    /// a `JoinHandle`, `false` when nobody was left to receive it.
    Panicked { observed: bool },

    /// The task suspended while no waker bound to it was alive, so nothing
    /// is known to be able to resume it.
    LivenessViolation,
}

/// A single lifecycle event.
#[derive(Clone, Debug)]
pub struct TaskEvent {
    pub id: Id,
    pub kind: TaskEventKind,
    pub at: Instant,

    /// Duration of the poll that led to this event, when there was one.
    pub poll_duration: Option<Duration>,
}

/// Producer side, owned by the scheduler.
pub(crate) struct Sink {
    queue: ArrayQueue<TaskEvent>,
    dropped: AtomicU64,
}

impl Sink {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn push(&self, event: TaskEvent) {
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer side of the event stream.
///
/// Cloning a `Diagnostics` yields another reader of the same queue; every
/// event is delivered to exactly one reader.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<Sink>,
}

impl Diagnostics {
    pub(crate) fn new(sink: Arc<Sink>) -> Self {
        Self { sink }
    }

    /// Takes the oldest pending event.
    pub fn try_next(&self) -> Option<TaskEvent> {
        self.sink.queue.pop()
    }

    /// Takes every pending event, oldest first.
    pub fn drain(&self) -> Vec<TaskEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.sink.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.sink.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sink.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.sink.queue.capacity()
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("pending", &self.len())
            .field("capacity", &self.capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}
