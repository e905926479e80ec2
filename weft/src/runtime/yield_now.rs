use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`yield_now`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    /// On the first poll the task wakes itself and returns `Pending`, which
    /// puts it at the back of its worker's queue. The second poll completes.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.yielded {
            self.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        Poll::Ready(())
    }
}

/// Yields execution back to the scheduler.
///
/// Polls must stay short: a task running a long computation should await
/// `yield_now` regularly so that the other tasks queued on its worker make
/// progress.
///
/// # Examples
///
/// ```
/// # let rt = weft::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// for chunk in 0..4 {
///     // ... process `chunk` ...
///     weft::yield_now().await;
/// }
/// # });
/// ```
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}
