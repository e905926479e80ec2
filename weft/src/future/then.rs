use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

/// Future returned by [`FutureExt::then`](super::FutureExt::then).
///
/// The first stage is dropped as soon as it completes, before the second
/// stage is created.
#[pin_project(project = ThenProj, project_replace = ThenProjReplace)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[derive(Debug)]
pub enum Then<Fut1, F, Fut2> {
    First {
        #[pin]
        future: Fut1,
        f: F,
    },
    Second {
        #[pin]
        future: Fut2,
    },
    Complete,
}

impl<Fut1, F, Fut2> Then<Fut1, F, Fut2> {
    pub(super) fn new(future: Fut1, f: F) -> Self {
        Then::First { future, f }
    }
}

impl<Fut1, F, Fut2> Future for Then<Fut1, F, Fut2>
where
    Fut1: Future,
    F: FnOnce(Fut1::Output) -> Fut2,
    Fut2: Future,
{
    type Output = Fut2::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.as_mut().project() {
                ThenProj::First { future, .. } => {
                    let output = ready!(future.poll(cx));

                    let f = match self.as_mut().project_replace(Then::Complete) {
                        ThenProjReplace::First { f, .. } => f,
                        _ => unreachable!(),
                    };
                    self.set(Then::Second { future: f(output) });
                }
                ThenProj::Second { future } => {
                    let output = ready!(future.poll(cx));
                    self.set(Then::Complete);
                    return Poll::Ready(output);
                }
                ThenProj::Complete => panic!("`Then` polled after completion"),
            }
        }
    }
}
