use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Wraps a future and measures the time it takes to complete.
///
/// The returned future resolves to a tuple containing:
/// - the output of the wrapped future,
/// - the elapsed time since the first poll.
///
/// Timing starts on the **first poll**, not at construction time.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use weft::time::{instrumented, sleep};
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// let (value, elapsed) = runtime.block_on(instrumented(async {
///     sleep(Duration::from_millis(5)).await;
///     42
/// }));
/// assert_eq!(value, 42);
/// assert!(elapsed >= Duration::from_millis(5));
/// ```
pub fn instrumented<F>(future: F) -> Instrumented<F> {
    Instrumented {
        future,
        start: None,
        polls: 0,
    }
}

/// A future that measures the execution time of another future.
///
/// Dropping it before completion discards the measurement.
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Instrumented<F> {
    #[pin]
    future: F,

    /// Instant of the first poll.
    start: Option<Instant>,

    polls: u64,
}

impl<F> Instrumented<F> {
    /// Number of times the wrapped future was polled so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl<F: Future> Future for Instrumented<F> {
    type Output = (F::Output, Duration);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let start = *this.start.get_or_insert_with(Instant::now);
        *this.polls += 1;

        match this.future.poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(output) => {
                let elapsed = start.elapsed();
                tracing::trace!(polls = *this.polls, ?elapsed, "instrumented future completed");
                Poll::Ready((output, elapsed))
            }
        }
    }
}
