//! Work-stealing scheduler components.
//!
//! - [`injector`]: the global queue for tasks scheduled from outside a
//!   worker, which also coordinates parking of idle workers,
//! - [`queue`]: per-worker FIFO queues and the peer stealing routine.

pub(crate) mod injector;
pub(crate) mod queue;
