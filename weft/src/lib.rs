//! # Weft
//!
//! **Weft** is a minimal cooperative async runtime for Rust.
//!
//! It consists of three layers:
//!
//! - a **future toolkit**: combinators that sequence, join and race futures,
//! - a **work-stealing scheduler** running tasks on a single thread or on a
//!   pool of worker threads,
//! - an **I/O reactor** turning `epoll` readiness and timer deadlines into
//!   task wake-ups.
//!
//! A task only runs while its worker polls it: a poll must return quickly,
//! and a task doing long computations should call [`yield_now`] regularly.
//!
//! ## Quick Start
//!
//! The runtime is built explicitly and entered once with `block_on`, there
//! is no attribute macro:
//!
//! ```rust
//! use std::time::Duration;
//! use weft::runtime::Builder;
//! use weft::time::sleep;
//!
//! let runtime = Builder::new_multi_thread().worker_threads(2).build().unwrap();
//!
//! runtime.block_on(async {
//!     let handle = weft::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         "task completed"
//!     });
//!
//!     assert_eq!(handle.await.unwrap(), "task completed");
//! });
//! ```
//!
//! ## Modules
//!
//! - [`future`]: combinators and [`FutureExt`](future::FutureExt)
//! - [`runtime`]: the builder, the runtime, and task spawning
//! - [`task`]: join handles, abort handles, join sets
//! - [`reactor`]: readiness registrations and timers
//! - [`io`]: [`Async`](io::Async), a non-blocking descriptor wrapper
//! - [`time`]: sleep, timeout, and instrumentation
//! - [`sync`]: an async mutex
//! - [`diagnostics`]: a task lifecycle event stream
//!
//! ## Platform
//!
//! The reactor is built on `epoll` and `eventfd`, so only Linux is supported.

pub mod diagnostics;
pub mod future;
pub mod io;
pub mod reactor;
pub mod runtime;
pub mod sync;
pub mod time;

pub use runtime::task;
pub use runtime::task::spawn;
pub use runtime::yield_now::yield_now;
pub use runtime::{Builder, Runtime};
