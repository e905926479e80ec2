use crate::reactor;
use crate::runtime::context;
use crate::runtime::executor::Shared;
use crate::runtime::task::JoinHandle;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A cloneable handle to a [`Runtime`](super::Runtime).
///
/// A handle can spawn tasks and reach the runtime's reactor from any
/// thread. It does not keep the runtime running: once the runtime is shut
/// down, tasks spawned through a handle are cancelled immediately.
#[derive(Clone)]
pub struct Handle {
    pub(crate) shared: Arc<Shared>,
}

impl Handle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Returns the handle of the runtime the current thread is running in.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a runtime context.
    #[track_caller]
    pub fn current() -> Self {
        match Self::try_current() {
            Some(handle) => handle,
            None => panic!(
                "there is no weft runtime on this thread; \
                 call this from a task or from inside `Runtime::block_on`"
            ),
        }
    }

    /// Returns the handle of the current runtime, or `None` outside of one.
    pub fn try_current() -> Option<Self> {
        context::current()
    }

    /// Spawns a future onto the runtime. See [`spawn`](crate::spawn).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.shared.spawn(future)
    }

    /// Returns the runtime's I/O and timer reactor.
    pub fn reactor(&self) -> &reactor::Handle {
        self.shared.reactor()
    }

    /// Number of spawned tasks that have not completed or been cancelled.
    pub fn alive_tasks(&self) -> usize {
        self.shared.live_tasks()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("flavor", &self.shared.flavor())
            .finish_non_exhaustive()
    }
}
