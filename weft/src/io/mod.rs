//! Non-blocking I/O on raw file descriptors.
//!
//! [`Async`] adapts any type exposing a file descriptor (sockets, pipes,
//! `eventfd`s...) to the reactor. Operations are attempted directly; the
//! descriptor is only registered with the reactor the first time one of
//! them would block.

mod async_io;

pub use async_io::Async;
