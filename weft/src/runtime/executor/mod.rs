//! Task executor implementation.
//!
//! - [`core`]: state shared by the workers, spawning and scheduling, and
//!   the lifecycle of the worker threads,
//! - [`owned`]: the list of live tasks used to cancel them at shutdown,
//! - [`worker`]: the worker loop.

pub(crate) mod core;
pub(crate) mod owned;
pub(crate) mod worker;

pub(crate) use self::core::{Config, Executor, Flavor, Shared};
