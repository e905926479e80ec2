use crate::reactor::{self, Direction, Interest, Token};

use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, RawFd};
use std::ptr;

/// A non-blocking I/O object driven by the reactor.
///
/// The wrapped descriptor is switched to non-blocking mode on construction.
/// It is registered for both directions the first time an operation returns
/// [`WouldBlock`](io::ErrorKind::WouldBlock), and deregistered when the
/// `Async` is dropped. Dropping a pending operation, for example because its
/// task was aborted or lost a [`timeout`](crate::time::timeout), removes its
/// waiter from the registration right away.
///
/// Readiness is a hint: every operation is retried until it stops reporting
/// `WouldBlock`, so spurious wake-ups are harmless.
///
/// # Examples
///
/// ```
/// use std::os::unix::net::UnixStream;
/// use weft::io::Async;
///
/// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
///
/// runtime.block_on(async {
///     let (a, b) = UnixStream::pair().unwrap();
///     let a = Async::new(a).unwrap();
///     let b = Async::new(b).unwrap();
///
///     let reader = weft::spawn(async move {
///         let mut buf = [0; 5];
///         let n = b.read(&mut buf).await.unwrap();
///         buf[..n].to_vec()
///     });
///
///     a.write_all(b"hello").await.unwrap();
///     assert_eq!(reader.await.unwrap(), b"hello");
/// });
/// ```
pub struct Async<T: AsRawFd> {
    io: T,

    reactor: reactor::Handle,

    /// Set on the first `WouldBlock`.
    token: Mutex<Option<Token>>,
}

impl<T: AsRawFd> Async<T> {
    /// Wraps `io`, putting its descriptor in non-blocking mode.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime context.
    #[track_caller]
    pub fn new(io: T) -> io::Result<Self> {
        Self::with_reactor(io, reactor::Handle::current())
    }

    /// Wraps `io` for an explicit reactor.
    pub fn with_reactor(io: T, reactor: reactor::Handle) -> io::Result<Self> {
        set_nonblocking(io.as_raw_fd())?;

        Ok(Self {
            io,
            reactor,
            token: Mutex::new(None),
        })
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    /// Mutable access to the inner object. It must stay in non-blocking
    /// mode.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Deregisters the descriptor and returns the inner object. The
    /// descriptor stays in non-blocking mode.
    pub fn into_inner(self) -> T {
        self.deregister();

        let this = ManuallyDrop::new(self);
        // Safety: `this` is never used again and its destructor never runs,
        // so every field is read out exactly once.
        unsafe {
            drop(ptr::read(&this.reactor));
            drop(ptr::read(&this.token));
            ptr::read(&this.io)
        }
    }

    /// Returns `true` once the descriptor went through the reactor.
    pub fn is_registered(&self) -> bool {
        self.token.lock().is_some()
    }

    /// Waits until the descriptor may be readable.
    pub async fn readable(&self) -> io::Result<()> {
        self.ready(Direction::Read).await
    }

    /// Waits until the descriptor may be writable.
    pub async fn writable(&self) -> io::Result<()> {
        self.ready(Direction::Write).await
    }

    /// Runs `op` until it stops reporting `WouldBlock`, waiting for read
    /// readiness in between.
    pub async fn read_with<R>(&self, op: impl FnMut(&T) -> io::Result<R>) -> io::Result<R> {
        self.retry(Direction::Read, op).await
    }

    /// Runs `op` until it stops reporting `WouldBlock`, waiting for write
    /// readiness in between.
    pub async fn write_with<R>(&self, op: impl FnMut(&T) -> io::Result<R>) -> io::Result<R> {
        self.retry(Direction::Write, op).await
    }

    async fn retry<R>(
        &self,
        direction: Direction,
        mut op: impl FnMut(&T) -> io::Result<R>,
    ) -> io::Result<R> {
        loop {
            match op(&self.io) {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                res => return res,
            }

            self.ready(direction).await?;
        }
    }

    async fn ready(&self, direction: Direction) -> io::Result<()> {
        let token = self.token()?;

        self.reactor
            .readiness(token, direction)
            .await
            .map_err(io::Error::from)
    }

    fn token(&self) -> io::Result<Token> {
        let mut slot = self.token.lock();

        if let Some(token) = *slot {
            return Ok(token);
        }

        let token = self.reactor.register(self.io.as_raw_fd(), Interest::BOTH)?;
        *slot = Some(token);
        Ok(token)
    }

    fn deregister(&self) {
        if let Some(token) = self.token.lock().take() {
            self.reactor.deregister(token);
        }
    }
}

impl<T: AsRawFd> Async<T>
where
    for<'a> &'a T: Read,
{
    /// Reads into `buf`, returning the number of bytes read.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_with(|io| {
            let mut io = io;
            io.read(buf)
        })
        .await
    }
}

impl<T: AsRawFd> Async<T>
where
    for<'a> &'a T: Write,
{
    /// Writes from `buf`, returning the number of bytes written.
    pub async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.write_with(|io| {
            let mut io = io;
            io.write(buf)
        })
        .await
    }

    /// Writes the whole of `buf`.
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf).await? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

impl<T: AsRawFd> AsRawFd for Async<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.io.as_raw_fd()
    }
}

impl<T: AsRawFd> Drop for Async<T> {
    fn drop(&mut self) {
        self.deregister();
    }
}

impl<T: AsRawFd + fmt::Debug> fmt::Debug for Async<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Async")
            .field("io", &self.io)
            .field("token", &*self.token.lock())
            .finish()
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // Safety: `fcntl` on a descriptor the caller owns.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }

    // Safety: same descriptor as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Builder;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    fn is_nonblocking(fd: RawFd) -> bool {
        unsafe { libc::fcntl(fd, libc::F_GETFL) & libc::O_NONBLOCK != 0 }
    }

    #[test]
    fn test_new_sets_nonblocking() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        assert!(!is_nonblocking(a.as_raw_fd()));

        let a = Async::with_reactor(a, runtime.handle().reactor().clone()).unwrap();

        assert!(is_nonblocking(a.as_raw_fd()));
        assert!(!a.is_registered());
    }

    #[test]
    fn test_registers_lazily_and_deregisters_on_drop() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let reactor = runtime.handle().reactor().clone();

        runtime.block_on(async {
            let (a, b) = UnixStream::pair().unwrap();
            let a = Async::new(a).unwrap();
            let b = Async::new(b).unwrap();

            // Writable right away: no registration needed.
            a.write_all(b"x").await.unwrap();
            assert!(!a.is_registered());

            let mut buf = [0; 1];
            assert_eq!(b.read(&mut buf).await.unwrap(), 1);
            assert!(!b.is_registered());

            let reader = crate::spawn(async move {
                let mut buf = [0; 4];
                let n = b.read(&mut buf).await.unwrap();
                (b.is_registered(), n)
            });
            crate::yield_now().await;
            a.write_all(b"ping").await.unwrap();

            assert_eq!(reader.await.unwrap(), (true, 4));
        });

        assert_eq!(reactor.registration_count(), 0);
    }

    #[test]
    fn test_read_reports_eof() {
        let runtime = Builder::new_current_thread().build().unwrap();

        runtime.block_on(async {
            let (a, b) = UnixStream::pair().unwrap();
            let b = Async::new(b).unwrap();

            let reader = crate::spawn(async move {
                let mut buf = [0; 8];
                b.read(&mut buf).await
            });
            crate::yield_now().await;
            drop(a);

            assert_eq!(reader.await.unwrap().unwrap(), 0);
        });
    }

    #[test]
    fn test_into_inner_deregisters() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let reactor = runtime.handle().reactor().clone();

        runtime.block_on(async {
            let (a, b) = UnixStream::pair().unwrap();
            let a = Async::new(a).unwrap();

            let waiting = crate::time::timeout(Duration::from_millis(5), a.readable()).await;
            assert!(waiting.is_err());

            // Registered, but the abandoned wait left nothing behind.
            assert_eq!(reactor.registration_count(), 1);
            assert_eq!(reactor.waiter_count(), 0);

            let a = a.into_inner();
            assert_eq!(reactor.registration_count(), 0);
            drop((a, b));
        });
    }
}
