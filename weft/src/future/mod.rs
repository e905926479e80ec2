//! Future combinators.
//!
//! Every combinator is a plain state machine over the futures it owns:
//! - [`FutureExt::map`] transforms an output,
//! - [`FutureExt::then`] chains a second future created from the output,
//! - [`join`] and [`join_all`] wait for several futures at once,
//! - [`select`] waits for the first of two futures.
//!
//! Polling a combinator again after it returned `Ready` is a bug and panics.

mod join;
mod map;
mod select;
mod then;

pub use self::join::{Join, JoinAll, join, join_all};
pub use self::map::Map;
pub use self::select::{Either, Select, select};
pub use self::then::Then;
pub use crate::runtime::yield_now::{YieldNow, yield_now};

use std::future::Future;

/// Combinators available on every [`Future`].
pub trait FutureExt: Future {
    /// Maps the output of this future with `f`.
    ///
    /// ```
    /// use weft::future::FutureExt;
    ///
    /// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
    /// assert_eq!(runtime.block_on(async { 20 }.map(|n| n + 1)), 21);
    /// ```
    fn map<U, F>(self, f: F) -> Map<Self, F>
    where
        F: FnOnce(Self::Output) -> U,
        Self: Sized,
    {
        Map::new(self, f)
    }

    /// Runs the future returned by `f` once this one completed.
    ///
    /// The second future only exists once the first one is done.
    fn then<Fut, F>(self, f: F) -> Then<Self, F, Fut>
    where
        F: FnOnce(Self::Output) -> Fut,
        Fut: Future,
        Self: Sized,
    {
        Then::new(self, f)
    }
}

impl<T: Future + ?Sized> FutureExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::pin::{Pin, pin};
    use std::rc::Rc;
    use std::task::{Context, Poll, Waker};

    /// Pending for `delay` polls, then ready with `value`. Counts its polls
    /// and panics if polled once complete.
    struct Countdown {
        delay: usize,
        value: u32,
        polls: Rc<Cell<usize>>,
        done: bool,
    }

    fn countdown(delay: usize, value: u32) -> (Countdown, Rc<Cell<usize>>) {
        let polls = Rc::new(Cell::new(0));
        let fut = Countdown {
            delay,
            value,
            polls: polls.clone(),
            done: false,
        };
        (fut, polls)
    }

    impl Future for Countdown {
        type Output = u32;

        fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<u32> {
            assert!(!self.done, "stage polled after it completed");
            self.polls.set(self.polls.get() + 1);

            if self.delay == 0 {
                self.done = true;
                Poll::Ready(self.value)
            } else {
                self.delay -= 1;
                Poll::Pending
            }
        }
    }

    fn poll_once<F: Future + ?Sized>(fut: Pin<&mut F>) -> Poll<F::Output> {
        fut.poll(&mut Context::from_waker(Waker::noop()))
    }

    fn poll_until_ready<F: Future + ?Sized>(mut fut: Pin<&mut F>) -> F::Output {
        for _ in 0..64 {
            if let Poll::Ready(output) = poll_once(fut.as_mut()) {
                return output;
            }
        }
        panic!("future never completed");
    }

    #[test]
    fn test_map() {
        let (fut, polls) = countdown(2, 20);
        let mut fut = pin!(fut.map(|n| n * 2));

        assert_eq!(poll_until_ready(fut.as_mut()), 40);
        assert_eq!(polls.get(), 3);

        let again = catch_unwind(AssertUnwindSafe(|| poll_once(fut.as_mut())));
        assert!(again.is_err());
    }

    #[test]
    fn test_then_never_repolls_first_stage() {
        let (first, first_polls) = countdown(1, 3);
        let mut fut = pin!(first.then(|n| countdown(2, n + 1).0));

        assert!(poll_once(fut.as_mut()).is_pending());
        assert_eq!(first_polls.get(), 1);

        assert_eq!(poll_until_ready(fut.as_mut()), 4);
        assert_eq!(first_polls.get(), 2);

        let again = catch_unwind(AssertUnwindSafe(|| poll_once(fut.as_mut())));
        assert!(again.is_err());
    }

    /// Ready on first poll, keeps its `Rc` until dropped.
    struct Holds(#[allow(dead_code)] Rc<()>);

    impl Future for Holds {
        type Output = ();

        fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
            Poll::Ready(())
        }
    }

    #[test]
    fn test_then_drops_first_stage_on_completion() {
        let marker = Rc::new(());
        let watched = marker.clone();

        let mut fut = pin!(Holds(marker.clone()).then(move |()| async move {
            Rc::strong_count(&watched)
        }));

        // Only `marker` and `watched` remain once the first stage is done.
        assert_eq!(poll_until_ready(fut.as_mut()), 2);
    }

    #[rstest]
    #[case::left_slower(3, 1)]
    #[case::right_slower(0, 4)]
    #[case::same(2, 2)]
    fn test_join_polls_each_side_until_done(#[case] a_delay: usize, #[case] b_delay: usize) {
        let (a, a_polls) = countdown(a_delay, 1);
        let (b, b_polls) = countdown(b_delay, 2);
        let mut fut = pin!(join(a, b));

        assert_eq!(poll_until_ready(fut.as_mut()), (1, 2));
        assert_eq!(a_polls.get(), a_delay + 1);
        assert_eq!(b_polls.get(), b_delay + 1);
    }

    #[test]
    fn test_join_all_keeps_input_order() {
        let futs: Vec<_> = [3, 0, 1].into_iter().map(|d| countdown(d, d as u32).0).collect();
        let mut fut = pin!(join_all(futs));

        assert_eq!(poll_until_ready(fut.as_mut()), [3, 0, 1]);

        let again = catch_unwind(AssertUnwindSafe(|| poll_once(fut.as_mut())));
        assert!(again.is_err());
    }

    #[test]
    fn test_join_all_empty() {
        let mut fut = pin!(join_all(Vec::<Countdown>::new()));
        assert_eq!(poll_once(fut.as_mut()), Poll::Ready(vec![]));
    }

    #[test]
    fn test_select_returns_loser() {
        let (a, _) = countdown(5, 1);
        let (b, _) = countdown(1, 2);

        let (winner, mut loser) = match poll_until_ready(pin!(select(a, b))) {
            Either::Right(pair) => pair,
            Either::Left(_) => panic!("slower future won"),
        };
        assert_eq!(winner, 2);

        // The loser resumes where it stopped.
        assert_eq!(poll_until_ready(Pin::new(&mut loser)), 1);
        assert_eq!(loser.polls.get(), 6);
    }

    #[test]
    fn test_select_prefers_first_when_both_ready() {
        let out = poll_until_ready(pin!(select(countdown(0, 1).0, countdown(0, 2).0)));
        assert!(out.is_left());
    }
}
