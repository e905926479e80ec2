//! The runtime: scheduler, worker threads and their configuration.
//!
//! Most programs build a [`Runtime`] with a [`Builder`] and enter it once
//! with [`Runtime::block_on`]:
//!
//! ```
//! use weft::runtime::Builder;
//!
//! let runtime = Builder::new_multi_thread().worker_threads(2).build().unwrap();
//!
//! runtime.block_on(async {
//!     let handle = weft::spawn(async { "hello" });
//!     assert_eq!(handle.await.unwrap(), "hello");
//! });
//! ```

mod core;
mod executor;
mod park;
mod work_stealing;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod handle;
pub(crate) mod yield_now;

pub mod task;

pub use self::builder::{Builder, ConfigError};
pub use self::core::Runtime;
pub use self::handle::Handle;
