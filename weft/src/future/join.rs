use pin_project::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future together with its output once it completed.
#[pin_project(project = MaybeDoneProj, project_replace = MaybeDoneProjReplace)]
enum MaybeDone<F: Future> {
    Pending(#[pin] F),
    Done(F::Output),
    Taken,
}

impl<F: Future> MaybeDone<F> {
    /// Polls the future unless it already completed. Returns `true` once an
    /// output is available.
    fn poll_done(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> bool {
        match self.as_mut().project() {
            MaybeDoneProj::Pending(future) => match future.poll(cx) {
                Poll::Ready(output) => {
                    self.set(MaybeDone::Done(output));
                    true
                }
                Poll::Pending => false,
            },
            MaybeDoneProj::Done(_) => true,
            MaybeDoneProj::Taken => panic!("`Join` polled after completion"),
        }
    }

    fn take_output(self: Pin<&mut Self>) -> F::Output {
        match self.project_replace(MaybeDone::Taken) {
            MaybeDoneProjReplace::Done(output) => output,
            _ => panic!("`Join` output taken before completion"),
        }
    }
}

/// Polls both futures concurrently. Resolves to both outputs.
///
/// A side that completed is never polled again.
///
/// # Examples
///
/// ```
/// use weft::future::join;
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// let (a, b) = runtime.block_on(join(async { 1 }, async { "two" }));
/// assert_eq!((a, b), (1, "two"));
/// ```
pub fn join<A, B>(a: A, b: B) -> Join<A, B>
where
    A: Future,
    B: Future,
{
    Join {
        a: MaybeDone::Pending(a),
        b: MaybeDone::Pending(b),
    }
}

/// Future returned by [`join`].
#[pin_project]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Join<A: Future, B: Future> {
    #[pin]
    a: MaybeDone<A>,

    #[pin]
    b: MaybeDone<B>,
}

impl<A: Future, B: Future> Future for Join<A, B> {
    type Output = (A::Output, B::Output);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        let a = this.a.as_mut().poll_done(cx);
        let b = this.b.as_mut().poll_done(cx);

        if a && b {
            Poll::Ready((this.a.take_output(), this.b.take_output()))
        } else {
            Poll::Pending
        }
    }
}

impl<A: Future, B: Future> fmt::Debug for Join<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Join").finish_non_exhaustive()
    }
}

/// Polls every future of `iter` concurrently. Resolves to their outputs, in
/// the order of `iter`.
///
/// # Examples
///
/// ```
/// use weft::future::join_all;
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// let outputs = runtime.block_on(join_all((0..4).map(|i| async move { i * 10 })));
/// assert_eq!(outputs, [0, 10, 20, 30]);
/// ```
pub fn join_all<I>(iter: I) -> JoinAll<I::Item>
where
    I: IntoIterator,
    I::Item: Future,
{
    let elems: Box<[_]> = iter.into_iter().map(MaybeDone::Pending).collect();

    JoinAll {
        elems: Box::into_pin(elems),
        complete: false,
    }
}

/// Future returned by [`join_all`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct JoinAll<F: Future> {
    elems: Pin<Box<[MaybeDone<F>]>>,

    complete: bool,
}

impl<F: Future> JoinAll<F> {
    fn elems(&mut self) -> impl Iterator<Item = Pin<&mut MaybeDone<F>>> {
        // Safety: the elements are never moved out of the pinned slice, they
        // are only projected in place.
        unsafe { self.elems.as_mut().get_unchecked_mut() }
            .iter_mut()
            .map(|elem| unsafe { Pin::new_unchecked(elem) })
    }
}

impl<F: Future> Future for JoinAll<F> {
    type Output = Vec<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.complete {
            panic!("`JoinAll` polled after completion");
        }

        let mut all_done = true;
        for elem in this.elems() {
            all_done &= elem.poll_done(cx);
        }

        if !all_done {
            return Poll::Pending;
        }

        this.complete = true;
        Poll::Ready(this.elems().map(MaybeDone::take_output).collect())
    }
}

impl<F: Future> fmt::Debug for JoinAll<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinAll")
            .field("len", &self.elems.len())
            .field("complete", &self.complete)
            .finish()
    }
}
