use super::error::JoinError;
use super::handle::{AbortHandle, JoinHandle};
use crate::task;

use parking_lot::Mutex;
use slab::Slab;
use std::collections::VecDeque;
use std::fmt;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// A collection of tasks that allows awaiting their completion
/// collectively or managing their lifecycle as a group.
///
/// `JoinSet` manages a dynamic number of tasks returning the same type.
/// It is especially useful for scenarios like:
/// - Processing a list of requests and acting on the first few that finish.
/// - Ensuring all background tasks are cancelled if a parent process stops.
/// - Limiting concurrency by spawning and joining tasks in a loop.
///
/// Results are returned in completion order. Dropping the set aborts every
/// task it still holds.
///
/// Each handle is awaited with a waker of its own, so a poll of the set only
/// looks at the tasks that finished since the previous one.
pub struct JoinSet<T> {
    entries: Slab<Entry<T>>,

    ready: Arc<Ready>,
}

struct Entry<T> {
    handle: JoinHandle<T>,

    /// Queues this entry's key on `ready` when woken.
    waker: Waker,
}

/// Keys of the entries to poll next.
struct Ready {
    state: Mutex<ReadyState>,
}

struct ReadyState {
    keys: VecDeque<usize>,

    /// Waker of the task polling the set.
    waker: Option<Waker>,
}

impl Ready {
    fn push(&self, key: usize) {
        let waker = {
            let mut state = self.state.lock();
            state.keys.push_back(key);
            state.waker.take()
        };

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn pop(&self) -> Option<usize> {
        self.state.lock().keys.pop_front()
    }

    fn register(&self, waker: &Waker) {
        let mut state = self.state.lock();

        match &state.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => state.waker = Some(waker.clone()),
        }
    }

    fn clear(&self) {
        self.state.lock().keys.clear();
    }
}

/// Waker handed to the task behind one entry.
struct EntryWaker {
    key: usize,
    ready: Arc<Ready>,
}

impl Wake for EntryWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.push(self.key);
    }
}

impl<T: Send + 'static> JoinSet<T> {
    /// Creates a new, empty `JoinSet`.
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            ready: Arc::new(Ready {
                state: Mutex::new(ReadyState {
                    keys: VecDeque::new(),
                    waker: None,
                }),
            }),
        }
    }

    /// Spawns a new task into the set on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime, like [`spawn`](crate::spawn).
    #[track_caller]
    pub fn spawn<F>(&mut self, future: F) -> AbortHandle
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = task::spawn(future);
        let abort = handle.abort_handle();

        let entry = self.entries.vacant_entry();
        let key = entry.key();
        let waker = Waker::from(Arc::new(EntryWaker {
            key,
            ready: self.ready.clone(),
        }));
        entry.insert(Entry { handle, waker });

        // Polled once so the handle learns its waker.
        self.ready.push(key);
        abort
    }

    /// Returns the number of tasks currently managed by the set, including
    /// finished tasks whose result was not taken yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Polls for the next finished task.
    ///
    /// Returns `Ready(None)` when the set is empty.
    pub fn poll_join_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<T, JoinError>>> {
        if self.entries.is_empty() {
            return Poll::Ready(None);
        }

        // Registered first: a key queued from now on wakes the caller.
        self.ready.register(cx.waker());

        while let Some(key) = self.ready.pop() {
            // Stale key of an entry already joined or aborted.
            let Some(entry) = self.entries.get_mut(key) else {
                continue;
            };

            let mut entry_cx = Context::from_waker(&entry.waker);
            if let Poll::Ready(result) = Pin::new(&mut entry.handle).poll(&mut entry_cx) {
                self.entries.remove(key);
                return Poll::Ready(Some(result));
            }
        }

        Poll::Pending
    }

    /// Waits for the next task in the set to finish and returns its result.
    ///
    /// Returns `None` if the set is empty.
    pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
        poll_fn(|cx| self.poll_join_next(cx)).await
    }

    /// Waits for every task and returns their results in completion order.
    pub async fn join_all(mut self) -> Vec<Result<T, JoinError>> {
        let mut results = Vec::with_capacity(self.entries.len());

        while let Some(result) = self.join_next().await {
            results.push(result);
        }
        results
    }

    /// Waits for the first `n` tasks to finish, then aborts the others.
    ///
    /// If the set holds fewer than `n` tasks, all of them are awaited.
    pub async fn race_n(&mut self, n: usize) -> Vec<Result<T, JoinError>> {
        let mut results = Vec::with_capacity(n.min(self.entries.len()));

        while results.len() < n {
            match self.join_next().await {
                Some(result) => results.push(result),
                None => break,
            }
        }

        self.abort_all();
        results
    }

    /// Waits for the first task to finish, then aborts the others.
    pub async fn race(&mut self) -> Option<Result<T, JoinError>> {
        self.race_n(1).await.pop()
    }

    /// Aborts all tasks currently managed by the set.
    ///
    /// The set is cleared immediately. Results of tasks that had not been
    /// joined yet are discarded.
    pub fn abort_all(&mut self) {
        for entry in self.entries.drain() {
            entry.handle.abort();
        }
        self.ready.clear();
    }
}

impl<T: Send + 'static> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for JoinSet<T> {
    fn drop(&mut self) {
        for entry in self.entries.drain() {
            entry.handle.task.abort();
        }
    }
}

impl<T> fmt::Debug for JoinSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Builder;
    use crate::time::sleep;
    use std::time::Duration;

    fn queued(set: &JoinSet<u32>) -> usize {
        set.ready.state.lock().keys.len()
    }

    #[test]
    fn test_only_finished_entries_are_queued() {
        let rt = Builder::new_current_thread().build().unwrap();

        rt.block_on(async {
            let mut set = JoinSet::new();
            for _ in 0..100 {
                set.spawn(async {
                    sleep(Duration::from_secs(60)).await;
                    0
                });
            }
            set.spawn(async {
                sleep(Duration::from_millis(5)).await;
                7
            });
            assert_eq!(queued(&set), 101);

            // The first poll visits every new entry once.
            assert!(poll_fn(|cx| Poll::Ready(set.poll_join_next(cx))).await.is_pending());
            assert_eq!(queued(&set), 0);

            sleep(Duration::from_millis(30)).await;
            assert_eq!(queued(&set), 1);

            assert_eq!(set.join_next().await.unwrap().unwrap(), 7);
            assert_eq!(set.len(), 100);
        });
    }

    #[test]
    fn test_keys_of_aborted_entries_are_skipped() {
        let rt = Builder::new_current_thread().build().unwrap();

        rt.block_on(async {
            let mut set = JoinSet::new();
            set.spawn(async { 1 });
            set.abort_all();
            assert_eq!(queued(&set), 0);

            set.spawn(async { 2 });
            assert_eq!(set.join_next().await.unwrap().unwrap(), 2);
            assert!(set.join_next().await.is_none());
        });
    }
}
