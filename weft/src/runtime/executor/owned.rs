use crate::runtime::task::{Id, Runnable};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::sync::Weak;

/// Every live task spawned on a scheduler.
///
/// Queues hold tasks only while they are runnable, and a suspended task is
/// kept alive by whoever holds its wakers. At shutdown the scheduler walks
/// this list to cancel suspended tasks as well, which drops their futures
/// and breaks reference cycles between tasks that await each other.
pub(crate) struct OwnedTasks {
    inner: Mutex<Inner>,
}

struct Inner {
    tasks: HashMap<Id, Weak<dyn Runnable>>,

    /// Set once shutdown took the list. Later binds are refused.
    closed: bool,
}

impl OwnedTasks {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Records a new task. Returns `false` if the scheduler is shutting down,
    /// in which case the caller must cancel the task.
    pub(crate) fn bind(&self, id: Id, task: Weak<dyn Runnable>) -> bool {
        let mut inner = self.inner.lock();

        if inner.closed {
            return false;
        }

        inner.tasks.insert(id, task);
        true
    }

    /// Forgets a task that reached a terminal state.
    pub(crate) fn remove(&self, id: Id) {
        self.inner.lock().tasks.remove(&id);
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Closes the list and returns every task still alive.
    pub(crate) fn close(&self) -> Vec<Weak<dyn Runnable>> {
        let mut inner = self.inner.lock();
        inner.closed = true;

        mem::take(&mut inner.tasks).into_values().collect()
    }
}
