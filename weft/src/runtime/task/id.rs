use crate::runtime::context;

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque ID that uniquely identifies a task relative to all other tasks
/// spawned in this process.
///
/// IDs are handed out in spawn order but should not be relied upon for
/// ordering.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(NonZeroU64);

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    /// Returns the raw numeric value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns the [`Id`] of the currently running task, or `None` if called
/// outside of a task (for example from the future passed to `block_on`).
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}

/// Returns the [`Id`] of the currently running task.
///
/// # Panics
///
/// Panics if called outside of a task.
pub fn id() -> Id {
    try_id().expect("task::id() called outside of a task")
}
