use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::task::Waker;

/// Readiness a registration is interested in.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interest {
    read: bool,
    write: bool,
}

impl Interest {
    /// Read readiness only.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    /// Write readiness only.
    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Read and write readiness.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };

    pub fn is_readable(self) -> bool {
        self.read
    }

    pub fn is_writable(self) -> bool {
        self.write
    }

    /// Returns `true` if waiting on `direction` is allowed by this interest.
    pub fn contains(self, direction: Direction) -> bool {
        match direction {
            Direction::Read => self.read,
            Direction::Write => self.write,
        }
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.read, self.write) {
            (true, true) => f.write_str("READABLE | WRITABLE"),
            (true, false) => f.write_str("READABLE"),
            (false, true) => f.write_str("WRITABLE"),
            (false, false) => f.write_str("(empty)"),
        }
    }
}

/// A single side of a registration a task can wait on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

/// Identifies a registration within its reactor.
///
/// A token is only meaningful until it is passed to
/// [`deregister`](super::Handle::deregister).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Token(pub(crate) usize);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reactor-side record of a registered descriptor.
pub(crate) struct Registration {
    pub(crate) fd: RawFd,

    pub(crate) interest: Interest,

    /// Readiness observed and not consumed yet.
    readable: bool,
    writable: bool,

    reader: Option<Waker>,
    writer: Option<Waker>,

    /// Set when re-arming failed. Every later wait reports it.
    pub(crate) error: Option<io::ErrorKind>,
}

impl Registration {
    pub(crate) fn new(fd: RawFd, interest: Interest) -> Self {
        Self {
            fd,
            interest,
            readable: false,
            writable: false,
            reader: None,
            writer: None,
            error: None,
        }
    }

    /// Consumes pending readiness for `direction`.
    pub(crate) fn take_ready(&mut self, direction: Direction) -> bool {
        match direction {
            Direction::Read => std::mem::take(&mut self.readable),
            Direction::Write => std::mem::take(&mut self.writable),
        }
    }

    /// Stores the waker of the task waiting on `direction`.
    pub(crate) fn set_waker(&mut self, direction: Direction, waker: &Waker) {
        let slot = match direction {
            Direction::Read => &mut self.reader,
            Direction::Write => &mut self.writer,
        };

        match slot {
            Some(current) if current.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        }
    }

    /// Removes the waker stored for `direction` if it wakes the same task as
    /// `waker`. A waiter that replaced it in the meantime is kept.
    pub(crate) fn clear_waker(&mut self, direction: Direction, waker: &Waker) -> Option<Waker> {
        let slot = match direction {
            Direction::Read => &mut self.reader,
            Direction::Write => &mut self.writer,
        };

        match slot {
            Some(current) if current.will_wake(waker) => slot.take(),
            _ => None,
        }
    }

    pub(crate) fn waiter_count(&self) -> usize {
        usize::from(self.reader.is_some()) + usize::from(self.writer.is_some())
    }

    /// Interest covering the directions somebody is waiting on.
    pub(crate) fn waiting(&self) -> Option<Interest> {
        match (self.reader.is_some(), self.writer.is_some()) {
            (true, true) => Some(Interest::BOTH),
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (false, false) => None,
        }
    }

    /// Records an event and collects the wakers it satisfies.
    pub(crate) fn dispatch(&mut self, readable: bool, writable: bool, wakers: &mut Vec<Waker>) {
        if readable && self.interest.is_readable() {
            self.readable = true;
            wakers.extend(self.reader.take());
        }

        if writable && self.interest.is_writable() {
            self.writable = true;
            wakers.extend(self.writer.take());
        }
    }

    /// Marks the registration as failed and collects every waiter.
    pub(crate) fn fail(&mut self, kind: io::ErrorKind, wakers: &mut Vec<Waker>) {
        self.error = Some(kind);
        self.take_wakers(wakers);
    }

    pub(crate) fn take_wakers(&mut self, wakers: &mut Vec<Waker>) {
        wakers.extend(self.reader.take());
        wakers.extend(self.writer.take());
    }
}
