use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One of two values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }
}

/// Waits for the first of two futures to complete.
///
/// Resolves to the winner's output together with the other future, still
/// pending. Dropping that future cancels it and releases its resources;
/// awaiting it resumes it where it stopped. `a` is polled first, so it wins
/// when both are ready.
///
/// Both futures must be [`Unpin`] to be handed back; pin others with
/// [`Box::pin`] or [`std::pin::pin!`].
///
/// # Examples
///
/// ```
/// use std::pin::pin;
/// use std::time::Duration;
/// use weft::future::{Either, select};
/// use weft::time::sleep;
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// runtime.block_on(async {
///     let slow = pin!(sleep(Duration::from_secs(60)));
///     let fast = pin!(async { "fast" });
///
///     match select(slow, fast).await {
///         Either::Right((winner, _slow)) => assert_eq!(winner, "fast"),
///         Either::Left(_) => unreachable!(),
///     }
/// });
/// ```
pub fn select<A, B>(a: A, b: B) -> Select<A, B>
where
    A: Future + Unpin,
    B: Future + Unpin,
{
    Select {
        inner: Some((a, b)),
    }
}

/// Future returned by [`select`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub struct Select<A, B> {
    inner: Option<(A, B)>,
}

impl<A, B> Future for Select<A, B>
where
    A: Future + Unpin,
    B: Future + Unpin,
{
    type Output = Either<(A::Output, B), (B::Output, A)>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some((a, b)) = self.inner.as_mut() else {
            panic!("`Select` polled after completion");
        };

        if let Poll::Ready(output) = Pin::new(a).poll(cx) {
            let Some((_, b)) = self.inner.take() else {
                unreachable!()
            };
            return Poll::Ready(Either::Left((output, b)));
        }

        if let Poll::Ready(output) = Pin::new(b).poll(cx) {
            let Some((a, _)) = self.inner.take() else {
                unreachable!()
            };
            return Poll::Ready(Either::Right((output, a)));
        }

        Poll::Pending
    }
}
