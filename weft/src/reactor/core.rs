use super::error::ResourceError;
use super::event::Event;
use super::poller::{Events, Poller};
use super::registration::{Direction, Interest, Registration, Token};
use super::timer::{TimerKey, Timers};

use parking_lot::Mutex;
use slab::Slab;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::os::fd::RawFd;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on a single blocking wait, so that the loop re-checks its
/// state regularly even if a wake-up is missed.
const MAX_WAIT: Duration = Duration::from_millis(100);

const EVENTS_CAPACITY: usize = 256;

/// The reactor before its thread is started.
///
/// The reactor runs on a dedicated thread and is responsible for:
/// - polling OS I/O readiness events,
/// - firing timers,
/// - waking the tasks waiting on either.
pub(crate) struct Reactor {
    inner: Arc<Inner>,
}

/// Shared by the reactor thread and every [`Handle`].
struct Inner {
    poller: Poller,
    state: Mutex<State>,
}

struct State {
    registrations: Slab<Registration>,

    /// Descriptor to registration key.
    fds: HashMap<RawFd, usize>,

    timers: Timers,

    shutdown: bool,

    /// Set when the epoll instance itself failed. Every wait reports it.
    failed: Option<io::ErrorKind>,
}

/// A handle to a reactor.
///
/// Handles are cheap to clone and usable from any thread. Registration
/// changes take effect immediately: `epoll_ctl` is issued by the calling
/// thread while the reactor thread keeps waiting.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

/// Owns the reactor thread. Shutting it down stops the thread and releases
/// every waker the reactor still holds.
pub(crate) struct Driver {
    handle: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Reactor {
    /// Creates the epoll instance and its wake-up `eventfd`.
    pub(crate) fn new() -> io::Result<Self> {
        let poller = Poller::new()?;

        Ok(Self {
            inner: Arc::new(Inner {
                poller,
                state: Mutex::new(State {
                    registrations: Slab::new(),
                    fds: HashMap::new(),
                    timers: Timers::new(),
                    shutdown: false,
                    failed: None,
                }),
            }),
        })
    }

    /// Starts the reactor thread.
    pub(crate) fn spawn(self, name: String, stack_size: Option<usize>) -> io::Result<Driver> {
        let mut builder = thread::Builder::new().name(name);

        if let Some(stack_size) = stack_size {
            builder = builder.stack_size(stack_size);
        }

        let inner = self.inner.clone();
        let thread = builder.spawn(move || inner.run())?;

        Ok(Driver {
            handle: Handle { inner: self.inner },
            thread: Some(thread),
        })
    }
}

impl Inner {
    /// Main reactor loop.
    ///
    /// 1. Compute the wait timeout from the next timer deadline
    /// 2. Wait for I/O readiness
    /// 3. Record readiness and collect the wakers it satisfies
    /// 4. Collect the wakers of expired timers
    /// 5. Wake everything collected, with the state lock released
    fn run(&self) {
        tracing::debug!("reactor started");

        let mut buf = Events::with_capacity(EVENTS_CAPACITY);
        let mut events = Vec::with_capacity(EVENTS_CAPACITY);
        let mut wakers = Vec::new();

        loop {
            let timeout = {
                let state = self.state.lock();
                if state.shutdown {
                    break;
                }

                state
                    .timers
                    .next_deadline()
                    .map_or(MAX_WAIT, |deadline| {
                        deadline.saturating_duration_since(Instant::now())
                    })
                    .min(MAX_WAIT)
            };

            if let Err(err) = self.poller.poll(&mut buf, &mut events, Some(timeout)) {
                tracing::error!(error = %err, "epoll_wait failed, reactor stopping");
                self.fail_all(err.kind());
                break;
            }

            {
                let mut state = self.state.lock();

                for event in &events {
                    self.dispatch(&mut state, event, &mut wakers);
                }

                let fired = state.timers.expire(Instant::now(), &mut wakers);
                if fired > 0 {
                    tracing::trace!(fired, "timers fired");
                }
            }

            for waker in wakers.drain(..) {
                waker.wake();
            }
        }

        tracing::debug!("reactor stopped");
    }

    fn dispatch(&self, state: &mut State, event: &Event, wakers: &mut Vec<Waker>) {
        // Deregistered while the event was in flight.
        let Some(reg) = state.registrations.get_mut(event.token) else {
            return;
        };

        tracing::trace!(
            token = event.token,
            fd = reg.fd,
            readable = event.readable,
            writable = event.writable,
            "readiness"
        );
        reg.dispatch(event.readable, event.writable, wakers);

        // The interest is single-shot: re-arm for waiters that were not
        // satisfied by this event.
        if let Some(waiting) = reg.waiting()
            && let Err(err) = self.poller.rearm(reg.fd, event.token, waiting)
        {
            tracing::warn!(fd = reg.fd, error = %err, "failed to re-arm registration");
            reg.fail(err.kind(), wakers);
        }
    }

    /// Fails every registration after the epoll instance broke.
    fn fail_all(&self, kind: io::ErrorKind) {
        let wakers = {
            let mut state = self.state.lock();
            state.failed = Some(kind);

            let mut wakers = state.timers.clear();
            for (_, reg) in state.registrations.iter_mut() {
                reg.take_wakers(&mut wakers);
            }
            wakers
        };

        for waker in wakers {
            waker.wake();
        }
    }

    fn notify(&self) {
        if let Err(err) = self.poller.wake() {
            tracing::warn!(error = %err, "failed to wake the reactor");
        }
    }
}

impl Handle {
    /// Returns the reactor of the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime context.
    #[track_caller]
    pub fn current() -> Self {
        crate::runtime::Handle::current().reactor().clone()
    }

    /// Returns the reactor of the current runtime, or `None` outside of one.
    pub fn try_current() -> Option<Self> {
        crate::runtime::Handle::try_current().map(|handle| handle.reactor().clone())
    }

    /// Registers `fd` for `interest`.
    ///
    /// The descriptor should be in non-blocking mode. Registering the same
    /// descriptor twice fails, whether or not the interest matches.
    pub fn register(&self, fd: RawFd, interest: Interest) -> Result<Token, ResourceError> {
        if fd < 0 {
            return Err(ResourceError::InvalidResource {
                fd,
                source: io::Error::from_raw_os_error(libc::EBADF),
            });
        }

        let mut state = self.inner.state.lock();

        if state.shutdown {
            return Err(ResourceError::Shutdown);
        }
        if let Some(kind) = state.failed {
            return Err(ResourceError::Io(kind.into()));
        }

        if let Some(&key) = state.fds.get(&fd) {
            let registered = state.registrations[key].interest;

            return Err(if registered == interest {
                ResourceError::AlreadyRegistered { fd }
            } else {
                ResourceError::ConflictingInterest {
                    fd,
                    registered,
                    requested: interest,
                }
            });
        }

        let entry = state.registrations.vacant_entry();
        let key = entry.key();

        if let Err(err) = self.inner.poller.register(fd, key, interest) {
            return Err(match err.raw_os_error() {
                Some(libc::EBADF) | Some(libc::EPERM) | Some(libc::EINVAL) => {
                    ResourceError::InvalidResource { fd, source: err }
                }
                Some(libc::EEXIST) => ResourceError::AlreadyRegistered { fd },
                _ => ResourceError::Io(err),
            });
        }

        entry.insert(Registration::new(fd, interest));
        state.fds.insert(fd, key);

        tracing::trace!(fd, token = key, %interest, "registered");

        Ok(Token(key))
    }

    /// Removes a registration.
    ///
    /// Idempotent, and safe to call after the descriptor was closed. Wakers
    /// still stored in the registration are dropped without being woken.
    pub fn deregister(&self, token: Token) {
        let removed = {
            let mut state = self.inner.state.lock();

            let Some(reg) = state.registrations.try_remove(token.0) else {
                return;
            };
            state.fds.remove(&reg.fd);

            if let Err(err) = self.inner.poller.deregister(reg.fd) {
                match err.raw_os_error() {
                    Some(libc::ENOENT) | Some(libc::EBADF) => {}
                    _ => tracing::warn!(fd = reg.fd, error = %err, "epoll deregistration failed"),
                }
            }

            tracing::trace!(fd = reg.fd, token = token.0, "deregistered");
            reg
        };

        drop(removed);
    }

    /// Polls readiness of `direction` on a registration.
    ///
    /// Returns `Ready(Ok(()))` if readiness was observed since the last call,
    /// consuming it. Otherwise stores the waker, re-arms the single-shot
    /// interest, and returns `Pending`. Readiness is only a hint: the caller
    /// must retry its operation and wait again on `WouldBlock`.
    pub fn poll_ready(
        &self,
        token: Token,
        direction: Direction,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), ResourceError>> {
        let mut state = self.inner.state.lock();

        if state.shutdown {
            return Poll::Ready(Err(ResourceError::Shutdown));
        }
        if let Some(kind) = state.failed {
            return Poll::Ready(Err(ResourceError::Io(kind.into())));
        }

        let Some(reg) = state.registrations.get_mut(token.0) else {
            return Poll::Ready(Err(ResourceError::UnknownToken(token)));
        };

        if !reg.interest.contains(direction) {
            return Poll::Ready(Err(ResourceError::InterestNotRegistered { token, direction }));
        }
        if let Some(kind) = reg.error {
            return Poll::Ready(Err(ResourceError::Io(kind.into())));
        }

        if reg.take_ready(direction) {
            return Poll::Ready(Ok(()));
        }

        reg.set_waker(direction, cx.waker());

        let waiting = reg.waiting().unwrap_or(reg.interest);
        if let Err(err) = self.inner.poller.rearm(reg.fd, token.0, waiting) {
            let mut wakers = Vec::new();
            reg.fail(err.kind(), &mut wakers);
            drop(state);

            for waker in wakers {
                waker.wake();
            }

            return Poll::Ready(Err(ResourceError::Io(err)));
        }

        Poll::Pending
    }

    /// Forgets the waiter of `direction` stored by an earlier
    /// [`poll_ready`](Self::poll_ready) with `waker`.
    ///
    /// Callers that stop waiting before readiness arrived use this so the
    /// registration no longer holds on to their task. A waiter registered
    /// since with another waker is left in place.
    pub fn clear_waker(&self, token: Token, direction: Direction, waker: &Waker) {
        let removed = {
            let mut state = self.inner.state.lock();
            state
                .registrations
                .get_mut(token.0)
                .and_then(|reg| reg.clear_waker(direction, waker))
        };

        drop(removed);
    }

    /// Waits for readiness of `direction`. See [`poll_ready`](Self::poll_ready).
    ///
    /// Dropping the future before it completes removes its waiter.
    pub fn readiness(&self, token: Token, direction: Direction) -> Readiness<'_> {
        Readiness {
            handle: self,
            token,
            direction,
            waker: None,
        }
    }

    /// Schedules `waker` to be woken once `deadline` has passed.
    ///
    /// A deadline earlier than every pending one interrupts the current wait
    /// so that it is honored on time.
    pub fn insert_timer(&self, deadline: Instant, waker: Waker) -> TimerKey {
        let (key, earliest) = {
            let mut state = self.inner.state.lock();

            if state.shutdown || state.failed.is_some() {
                (state.timers.next_key(deadline), false)
            } else {
                state.timers.insert(deadline, waker)
            }
        };

        if earliest {
            self.inner.notify();
        }
        key
    }

    /// Replaces the waker of a pending timer. Returns `false` if it already
    /// fired or was cancelled.
    pub fn reset_timer_waker(&self, key: TimerKey, waker: &Waker) -> bool {
        self.inner.state.lock().timers.reset_waker(key, waker)
    }

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// cancelled.
    pub fn cancel_timer(&self, key: TimerKey) -> bool {
        let removed = self.inner.state.lock().timers.cancel(key);
        removed.is_some()
    }

    /// Number of live I/O registrations.
    pub fn registration_count(&self) -> usize {
        self.inner.state.lock().registrations.len()
    }

    /// Number of pending timers.
    pub fn timer_count(&self) -> usize {
        self.inner.state.lock().timers.len()
    }

    /// Number of tasks waiting on readiness, over every registration.
    pub fn waiter_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .registrations
            .iter()
            .map(|(_, reg)| reg.waiter_count())
            .sum()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();

        f.debug_struct("Handle")
            .field("registrations", &state.registrations.len())
            .field("timers", &state.timers.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

/// Future returned by [`Handle::readiness`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Readiness<'a> {
    handle: &'a Handle,
    token: Token,
    direction: Direction,

    /// The waker left in the registration by the last `Pending` poll.
    waker: Option<Waker>,
}

impl Future for Readiness<'_> {
    type Output = Result<(), ResourceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.handle.poll_ready(self.token, self.direction, cx) {
            Poll::Ready(res) => {
                self.waker = None;
                Poll::Ready(res)
            }
            Poll::Pending => {
                if !self.waker.as_ref().is_some_and(|w| w.will_wake(cx.waker())) {
                    self.waker = Some(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for Readiness<'_> {
    fn drop(&mut self) {
        if let Some(waker) = self.waker.take() {
            self.handle.clear_waker(self.token, self.direction, &waker);
        }
    }
}

impl Driver {
    pub(crate) fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stops and joins the reactor thread, then drops every stored waker.
    ///
    /// Safe to call more than once.
    pub(crate) fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.handle.inner.state.lock().shutdown = true;
        self.handle.inner.notify();

        if thread.join().is_err() {
            tracing::error!("reactor thread panicked");
        }

        // Wakers may own tasks whose futures own registrations and timers.
        // Drop them with the lock released.
        let released = {
            let mut state = self.handle.inner.state.lock();

            let mut wakers = state.timers.clear();
            for (_, reg) in state.registrations.iter_mut() {
                reg.take_wakers(&mut wakers);
            }
            wakers
        };
        drop(released);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
