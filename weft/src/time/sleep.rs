use crate::reactor::{self, TimerKey};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// # Panics
///
/// The returned future panics if polled outside of a runtime.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// runtime.block_on(async {
///     let start = Instant::now();
///     weft::time::sleep(Duration::from_millis(10)).await;
///     assert!(start.elapsed() >= Duration::from_millis(10));
/// });
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    sleep_until(Instant::now() + duration)
}

/// Creates a future that completes once `deadline` is reached.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep {
        deadline,
        entry: None,
    }
}

/// Future returned by [`sleep`] and [`sleep_until`].
///
/// The timer is registered with the reactor of the current runtime on first
/// poll. Dropping the future cancels it, releasing the waker the reactor
/// holds.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Sleep {
    deadline: Instant,

    entry: Option<(reactor::Handle, TimerKey)>,
}

impl Sleep {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Moves the deadline. The next poll registers the new one.
    pub fn reset(&mut self, deadline: Instant) {
        self.cancel();
        self.deadline = deadline;
    }

    /// Releases the reactor timer, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some((reactor, key)) = self.entry.take() {
            reactor.cancel_timer(key);
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if this.is_elapsed() {
            this.cancel();
            return Poll::Ready(());
        }

        let registered = match &this.entry {
            Some((reactor, key)) => reactor.reset_timer_waker(*key, cx.waker()),
            None => false,
        };

        // Not registered yet, or the reactor no longer knows the timer.
        if !registered {
            let reactor = match this.entry.take() {
                Some((reactor, _)) => reactor,
                None => reactor::Handle::current(),
            };
            let key = reactor.insert_timer(this.deadline, cx.waker().clone());
            this.entry = Some((reactor, key));
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Sleep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sleep")
            .field("deadline", &self.deadline)
            .field("registered", &self.entry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Builder;

    #[test]
    fn test_elapsed_deadline_never_registers() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let reactor = runtime.handle().reactor().clone();

        runtime.block_on(async {
            sleep(Duration::ZERO).await;
            sleep_until(Instant::now() - Duration::from_millis(1)).await;
        });

        assert_eq!(reactor.timer_count(), 0);
    }

    #[test]
    fn test_dropped_sleep_cancels_timer() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let reactor = runtime.handle().reactor().clone();

        runtime.block_on(async {
            let mut sleep = Box::pin(sleep(Duration::from_secs(60)));
            let waker = std::task::Waker::noop();

            assert!(sleep.as_mut().poll(&mut Context::from_waker(waker)).is_pending());
            assert_eq!(reactor.timer_count(), 1);

            // Polling again keeps a single timer.
            assert!(sleep.as_mut().poll(&mut Context::from_waker(waker)).is_pending());
            assert_eq!(reactor.timer_count(), 1);

            drop(sleep);
            assert_eq!(reactor.timer_count(), 0);
        });
    }

    #[test]
    fn test_reset_moves_deadline() {
        let runtime = Builder::new_current_thread().build().unwrap();

        runtime.block_on(async {
            let start = Instant::now();
            let mut sleep = Box::pin(sleep(Duration::from_secs(60)));
            let waker = std::task::Waker::noop();
            assert!(sleep.as_mut().poll(&mut Context::from_waker(waker)).is_pending());

            sleep.reset(start + Duration::from_millis(5));
            sleep.await;

            assert!(start.elapsed() < Duration::from_secs(60));
        });
    }
}
