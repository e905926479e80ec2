//! Synchronization primitives for tasks.
//!
//! Tasks that cannot make progress are suspended and woken when the
//! resource becomes available, never blocking their worker thread.
//!
//! - [`Mutex`]: an asynchronous, FIFO-fair mutual exclusion primitive.

mod mutex;

pub use mutex::{Lock, Mutex, MutexGuard};
