use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// An asynchronous mutex.
///
/// `Mutex<T>` provides mutual exclusion for async tasks. Unlike
/// [`std::sync::Mutex`], a task that cannot acquire the lock is suspended
/// rather than blocking its worker thread, and is woken once the lock is
/// handed to it.
///
/// Waiters are served in FIFO order: once somebody is queued, new callers of
/// [`lock`](Self::lock) line up behind it.
///
/// The guard must not be held across an `.await` that waits on another task
/// needing the same lock; release it before suspending.
pub struct Mutex<T: ?Sized> {
    state: parking_lot::Mutex<State>,

    data: UnsafeCell<T>,
}

struct State {
    locked: bool,

    /// Waiting lock futures, oldest first.
    waiters: VecDeque<(u64, Waker)>,

    next_id: u64,
}

// Safety: the data is only reached through a guard, and at most one guard
// exists at a time.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked mutex wrapping the given value.
    pub fn new(value: T) -> Mutex<T> {
        Self {
            state: parking_lot::Mutex::new(State {
                locked: false,
                waiters: VecDeque::new(),
                next_id: 0,
            }),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Returns a future that resolves to a guard once the lock is acquired.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use weft::sync::Mutex;
    ///
    /// let runtime = weft::runtime::Builder::new_multi_thread().worker_threads(2).build().unwrap();
    ///
    /// let total = runtime.block_on(async {
    ///     let counter = Arc::new(Mutex::new(0));
    ///
    ///     let handles: Vec<_> = (0..8)
    ///         .map(|_| {
    ///             let counter = counter.clone();
    ///             weft::spawn(async move { *counter.lock().await += 1 })
    ///         })
    ///         .collect();
    ///
    ///     for handle in handles {
    ///         handle.await.unwrap();
    ///     }
    ///     *counter.lock().await
    /// });
    /// assert_eq!(total, 8);
    /// ```
    pub fn lock(&self) -> Lock<'_, T> {
        Lock {
            mutex: self,
            id: None,
        }
    }

    /// Acquires the lock if it is free and nobody is waiting for it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.lock();

        if state.locked || !state.waiters.is_empty() {
            return None;
        }

        state.locked = true;
        Some(MutexGuard { mutex: self })
    }

    /// Mutable access without locking: the borrow proves no guard exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn unlock(&self) {
        let next = {
            let mut state = self.state.lock();
            state.locked = false;
            state.waiters.front().map(|(_, waker)| waker.clone())
        };

        if let Some(waker) = next {
            waker.wake();
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Future returned by [`Mutex::lock`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Lock<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,

    /// Position in the wait queue, once queued.
    id: Option<u64>,
}

impl<'a, T: ?Sized> Future for Lock<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mutex = self.mutex;
        let mut state = mutex.state.lock();

        let first = match (self.id, state.waiters.front()) {
            (_, None) => true,
            (Some(id), Some((front, _))) => id == *front,
            (None, Some(_)) => false,
        };

        if !state.locked && first {
            state.locked = true;
            if self.id.take().is_some() {
                state.waiters.pop_front();
            }
            return Poll::Ready(MutexGuard { mutex });
        }

        match self.id {
            Some(id) => {
                if let Some((_, waker)) = state.waiters.iter_mut().find(|(w, _)| *w == id)
                    && !waker.will_wake(cx.waker())
                {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.waiters.push_back((id, cx.waker().clone()));
                self.id = Some(id);
            }
        }

        Poll::Pending
    }
}

impl<T: ?Sized> Drop for Lock<'_, T> {
    /// Leaves the queue. If the lock was about to be handed to this future,
    /// it is passed on to the next waiter instead.
    fn drop(&mut self) {
        let Some(id) = self.id else {
            return;
        };

        let next = {
            let mut state = self.mutex.state.lock();

            let was_first = state.waiters.front().is_some_and(|(front, _)| *front == id);
            state.waiters.retain(|(w, _)| *w != id);

            if was_first && !state.locked {
                state.waiters.front().map(|(_, waker)| waker.clone())
            } else {
                None
            }
        };

        if let Some(waker) = next {
            waker.wake();
        }
    }
}

/// Guard returned by [`Mutex::lock`]. Releases the mutex when dropped.
#[must_use = "dropping the guard releases the lock right away"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
}

// Safety: sharing the guard only shares `&T`.
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: the guard holds the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: the guard holds the lock.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
