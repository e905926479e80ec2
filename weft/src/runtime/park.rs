use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Blocks a thread until its waker is invoked.
///
/// Used by `block_on` to drive the root future from a thread that is not a
/// worker. A wake issued before `park` is not lost: the next `park` returns
/// immediately.
pub(crate) struct Parker {
    inner: Arc<Inner>,
}

struct Inner {
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Parker {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                notified: Mutex::new(false),
                condvar: Condvar::new(),
            }),
        }
    }

    pub(crate) fn waker(&self) -> Waker {
        Waker::from(self.inner.clone())
    }

    pub(crate) fn park(&self) {
        let mut notified = self.inner.notified.lock();

        while !*notified {
            self.inner.condvar.wait(&mut notified);
        }
        *notified = false;
    }
}

impl Wake for Inner {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        *self.notified.lock() = true;
        self.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wake_before_park_is_kept() {
        let parker = Parker::new();
        parker.waker().wake();

        parker.park();
    }

    #[test]
    fn test_wake_from_other_thread() {
        let parker = Parker::new();
        let waker = parker.waker();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            waker.wake();
        });

        parker.park();
        handle.join().unwrap();
    }
}
