//! Asynchronous task primitives.
//!
//! This module defines the core abstractions used by the runtime to
//! represent, schedule, and execute asynchronous tasks:
//! - the task unit, its state machine and custom waker integration,
//! - join handles and join sets for awaiting task completion,
//! - abort handles for cancellation.
//!
//! Most users will interact with this module through [`spawn`] and
//! [`JoinHandle`], while the lower-level components are used internally by
//! the executor.

pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod handle;
pub(crate) mod id;
pub(crate) mod set;
pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use self::core::{Notified, Runnable, Task};

pub use self::error::JoinError;
pub use self::handle::{AbortHandle, JoinHandle};
pub use self::id::{Id, id, try_id};
pub use self::set::JoinSet;
pub use self::state::TaskState;

use crate::runtime::context;

use std::future::Future;

/// Spawns a new asynchronous task on the current runtime, returning a
/// [`JoinHandle`] for it.
///
/// The task starts running in the background right away; awaiting the handle
/// is only needed to observe its output. Dropping the handle detaches the
/// task, it does not cancel it.
///
/// The future must be `Send + 'static`: it may move to another worker
/// between polls and it cannot borrow from the stack of the spawner.
///
/// ```compile_fail
/// # let rt = weft::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let local = String::from("borrowed");
/// let handle = weft::spawn(async { println!("{}", &local) });
/// # handle.await.unwrap();
/// # });
/// ```
///
/// # Panics
///
/// Panics if called outside of a runtime context.
///
/// # Examples
///
/// ```
/// # let rt = weft::runtime::Builder::new_multi_thread().worker_threads(2).build().unwrap();
/// # rt.block_on(async {
/// let handle = weft::spawn(async { 6 * 7 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # });
/// ```
#[track_caller]
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match context::current() {
        Some(handle) => handle.spawn(future),
        None => panic!(
            "`spawn` called outside of a weft runtime; \
             use `Runtime::spawn` or call it from inside `block_on`"
        ),
    }
}
