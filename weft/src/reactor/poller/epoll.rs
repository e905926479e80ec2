//! Linux `epoll`-based poller.
//!
//! Responsibilities:
//! - Register file descriptors with single-shot read/write interests
//! - Re-arm a descriptor once its interest fired
//! - Block waiting for I/O readiness
//! - Interrupt a blocking wait through an `eventfd`

use crate::reactor::event::Event;
use crate::reactor::registration::Interest;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLONESHOT, EPOLLOUT, EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Reserved token of the wake-up `eventfd`.
///
/// Must never collide with registration tokens, which are slab keys.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// All methods take `&self`: `epoll_ctl` may be called from any thread
/// while the reactor thread blocks in `epoll_wait`.
pub(crate) struct EpollPoller {
    epoll: OwnedFd,

    /// Written to interrupt `epoll_wait`.
    eventfd: OwnedFd,
}

/// Reusable buffer for raw epoll events.
pub(crate) struct Events {
    raw: Vec<epoll_event>,
}

impl Events {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
        }
    }
}

fn cvt(rc: libc::c_int) -> io::Result<libc::c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

fn interest_flags(interest: Interest) -> u32 {
    let mut flags = EPOLLONESHOT | EPOLLRDHUP;

    if interest.is_readable() {
        flags |= EPOLLIN;
    }
    if interest.is_writable() {
        flags |= EPOLLOUT;
    }

    flags as u32
}

/// Converts a timeout to whole milliseconds, rounding up so that a timer
/// never fires early. `None` blocks indefinitely.
fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(timeout) => {
            let ms = timeout.as_nanos().div_ceil(1_000_000);
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

impl EpollPoller {
    /// Creates the epoll instance and registers the wake-up `eventfd` as a
    /// persistent wake source.
    pub(crate) fn new() -> io::Result<Self> {
        // Safety: plain syscalls, the returned descriptors are owned below.
        let epoll = unsafe { OwnedFd::from_raw_fd(cvt(epoll_create1(EPOLL_CLOEXEC))?) };
        let eventfd = unsafe {
            OwnedFd::from_raw_fd(cvt(libc::eventfd(
                0,
                libc::EFD_NONBLOCK | libc::EFD_CLOEXEC,
            ))?)
        };

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };
        cvt(unsafe {
            epoll_ctl(
                epoll.as_raw_fd(),
                EPOLL_CTL_ADD,
                eventfd.as_raw_fd(),
                &mut event,
            )
        })?;

        Ok(Self { epoll, eventfd })
    }

    /// Interrupts a blocking [`poll`](Self::poll).
    pub(crate) fn wake(&self) -> io::Result<()> {
        let buf: u64 = 1;
        let rc = unsafe {
            libc::write(
                self.eventfd.as_raw_fd(),
                &buf as *const u64 as *const libc::c_void,
                8,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            // The counter is saturated, a wake is already pending.
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
        }
        Ok(())
    }

    fn drain_wake(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(
                self.eventfd.as_raw_fd(),
                &mut buf as *mut u64 as *mut libc::c_void,
                8,
            );
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: interest_flags(interest),
            u64: token as u64,
        };

        cvt(unsafe { epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) }).map(drop)
    }

    /// Adds `fd`, armed for `interest`.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token, interest)
    }

    /// Re-arms the single-shot interest of an already registered `fd`.
    pub(crate) fn rearm(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, token, interest)
    }

    /// Removes `fd` from the interest list.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        cvt(unsafe {
            epoll_ctl(
                self.epoll.as_raw_fd(),
                EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        })
        .map(drop)
    }

    /// Waits for readiness events.
    ///
    /// Blocks until a registered descriptor becomes ready, [`wake`](Self::wake)
    /// is called, or `timeout` expires. An interrupted wait (`EINTR`) returns
    /// with no events.
    pub(crate) fn poll(
        &self,
        buf: &mut Events,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();
        buf.raw.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                buf.raw.as_mut_ptr(),
                buf.raw.capacity() as libc::c_int,
                timeout_ms(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        // Safety: the kernel initialized the first `n` entries.
        unsafe {
            buf.raw.set_len(n as usize);
        }

        for raw in &buf.raw {
            let token = raw.u64;
            let flags = raw.events;

            if token == WAKE_TOKEN {
                self.drain_wake();
                continue;
            }

            let closed = flags & ((EPOLLHUP | EPOLLERR | EPOLLRDHUP) as u32) != 0;

            events.push(Event {
                token: token as usize,
                readable: closed || flags & (EPOLLIN as u32) != 0,
                writable: closed || flags & (EPOLLOUT as u32) != 0,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[rstest]
    #[case::infinite(None, -1)]
    #[case::zero(Some(Duration::ZERO), 0)]
    #[case::rounds_up(Some(Duration::from_micros(1)), 1)]
    #[case::exact(Some(Duration::from_millis(10)), 10)]
    #[case::partial(Some(Duration::from_micros(10_500)), 11)]
    fn test_timeout_ms(#[case] timeout: Option<Duration>, #[case] expected: libc::c_int) {
        assert_eq!(timeout_ms(timeout), expected);
    }

    #[test]
    fn test_wake_interrupts_poll() {
        let poller = EpollPoller::new().unwrap();
        let mut buf = Events::with_capacity(8);
        let mut events = Vec::new();

        poller.wake().unwrap();
        poller
            .poll(&mut buf, &mut events, Some(Duration::from_secs(5)))
            .unwrap();

        assert!(events.is_empty());
    }

    #[test]
    fn test_oneshot_readiness() {
        let poller = EpollPoller::new().unwrap();
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut buf = Events::with_capacity(8);
        let mut events = Vec::new();

        poller.register(a.as_raw_fd(), 7, Interest::READABLE).unwrap();
        b.write_all(b"x").unwrap();

        poller
            .poll(&mut buf, &mut events, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token, 7);
        assert!(events[0].readable);

        // Disarmed until re-armed, even though the data is still unread.
        poller
            .poll(&mut buf, &mut events, Some(Duration::from_millis(10)))
            .unwrap();
        assert!(events.is_empty());

        poller.rearm(a.as_raw_fd(), 7, Interest::READABLE).unwrap();
        poller
            .poll(&mut buf, &mut events, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(events.len(), 1);

        poller.deregister(a.as_raw_fd()).unwrap();
    }
}
