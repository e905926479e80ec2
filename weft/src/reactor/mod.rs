//! I/O readiness and timers.
//!
//! The reactor runs on its own thread, separate from the workers. It is
//! responsible for:
//! - waiting on OS readiness events with `epoll`,
//! - firing timers,
//! - waking the tasks waiting on either.
//!
//! Tasks never block on the reactor. They register a descriptor once, then
//! poll for readiness; a `Pending` readiness stores the task's waker in the
//! registration and the reactor invokes it when the event arrives.
//!
//! Most code uses [`Async`](crate::io::Async) and [`sleep`](crate::time::sleep)
//! rather than this module directly.

mod core;
mod error;
mod event;
mod poller;
mod registration;
mod timer;

pub(crate) use self::core::{Driver, Reactor};

pub use self::core::{Handle, Readiness};
pub use self::error::ResourceError;
pub use self::registration::{Direction, Interest, Token};
pub use self::timer::TimerKey;
