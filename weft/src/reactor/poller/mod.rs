//! Platform-specific I/O poller.
//!
//! The poller is used by the reactor to:
//! - wait for I/O readiness events,
//! - be woken when new timers or a shutdown request arrive.
//!
//! Only Linux is supported.

#[cfg(not(target_os = "linux"))]
compile_error!("weft only supports Linux: the reactor is built on epoll and eventfd");

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) use epoll::{EpollPoller as Poller, Events};
