use crate::time::error::Elapsed;
use crate::time::sleep::{Sleep, sleep_until};

use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Requires `future` to complete within `duration`.
///
/// Whichever side loses the race is released as soon as the `Timeout`
/// resolves: the timer when the future wins, the future (and whatever
/// registrations it holds) when the `Timeout` is dropped after elapsing.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use weft::time::{sleep, timeout};
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// runtime.block_on(async {
///     let slow = timeout(Duration::from_millis(5), sleep(Duration::from_secs(60))).await;
///     assert!(slow.is_err());
///
///     let fast = timeout(Duration::from_secs(60), async { 7 }).await;
///     assert_eq!(fast, Ok(7));
/// });
/// ```
pub fn timeout<F>(duration: Duration, future: F) -> Timeout<F>
where
    F: Future,
{
    timeout_at(Instant::now() + duration, future)
}

/// Requires `future` to complete before `deadline`.
pub fn timeout_at<F>(deadline: Instant, future: F) -> Timeout<F>
where
    F: Future,
{
    Timeout {
        future,
        sleep: sleep_until(deadline),
    }
}

/// Future returned by [`timeout`] and [`timeout_at`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Timeout<F> {
    #[pin]
    future: F,

    sleep: Sleep,
}

impl<F> Timeout<F> {
    pub fn get_ref(&self) -> &F {
        &self.future
    }

    pub fn into_inner(self) -> F {
        self.future
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output, Elapsed>;

    /// The inner future is polled first, so a future that is ready at the
    /// deadline still wins.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        if let Poll::Ready(output) = this.future.poll(cx) {
            this.sleep.cancel();
            return Poll::Ready(Ok(output));
        }

        match Pin::new(this.sleep).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Elapsed(()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Builder;
    use crate::time::sleep;

    #[test]
    fn test_winner_releases_timer() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let reactor = runtime.handle().reactor().clone();

        runtime.block_on(async {
            let out = timeout(Duration::from_secs(60), async {
                sleep(Duration::from_millis(2)).await;
                "done"
            })
            .await;

            assert_eq!(out, Ok("done"));
            assert_eq!(reactor.timer_count(), 0);
        });
    }

    #[test]
    fn test_elapsed() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let reactor = runtime.handle().reactor().clone();

        runtime.block_on(async {
            let start = Instant::now();
            let out = timeout(Duration::from_millis(10), sleep(Duration::from_secs(60))).await;

            assert_eq!(out, Err(Elapsed(())));
            assert!(start.elapsed() >= Duration::from_millis(10));
            assert_eq!(reactor.timer_count(), 0);
        });
    }

    #[test]
    fn test_elapsed_message() {
        assert_eq!(Elapsed(()).to_string(), "deadline has elapsed");
    }
}
