use super::context;
use super::executor::worker::Worker;
use super::executor::{Executor, Flavor, Shared};
use super::handle::Handle;
use super::park::Parker;
use super::task::JoinHandle;
use super::work_stealing::queue::LocalQueue;
use crate::diagnostics::Diagnostics;
use crate::reactor::Driver;

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};

/// The runtime: a scheduler, its worker threads, and an I/O reactor.
///
/// `Runtime` is responsible for:
/// - spawning asynchronous tasks,
/// - driving task execution via the executor,
/// - integrating with the reactor for timers and I/O,
/// - providing a synchronous entry point via [`block_on`](Self::block_on).
///
/// Build one with a [`Builder`](super::Builder). Dropping the runtime
/// shuts down all internal components in an orderly fashion.
pub struct Runtime {
    executor: Executor,

    driver: Driver,

    handle: Handle,

    diagnostics: Option<Diagnostics>,
}

impl Runtime {
    pub(crate) fn new(
        executor: Executor,
        driver: Driver,
        diagnostics: Option<Diagnostics>,
    ) -> Self {
        let handle = Handle::new(executor.shared().clone());

        Self {
            executor,
            driver,
            handle,
            diagnostics,
        }
    }

    /// Returns a cloneable handle to this runtime.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns a future onto the runtime.
    ///
    /// With the current-thread flavor the task only makes progress while
    /// some thread is inside [`block_on`](Self::block_on).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Returns the lifecycle event stream, if enabled with
    /// [`Builder::enable_diagnostics`](super::Builder::enable_diagnostics).
    pub fn diagnostics(&self) -> Option<Diagnostics> {
        self.diagnostics.clone()
    }

    /// Runs a future to completion, blocking the current thread.
    ///
    /// The future runs on the calling thread and does not need to be `Send`.
    /// With the multi-thread flavor spawned tasks run on the worker threads
    /// meanwhile. With the current-thread flavor the calling thread becomes
    /// the worker and interleaves the future with spawned tasks.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that is already inside a runtime,
    /// such as from within a task.
    ///
    /// # Examples
    ///
    /// ```
    /// let runtime = weft::runtime::Builder::new_current_thread().build().unwrap();
    ///
    /// let answer = runtime.block_on(async {
    ///     weft::spawn(async { 40 }).await.unwrap() + 2
    /// });
    /// assert_eq!(answer, 42);
    /// ```
    #[track_caller]
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        if context::is_entered() {
            panic!(
                "cannot start a runtime from within a runtime: `block_on` was called \
                 from a thread that is already driving tasks"
            );
        }

        let _enter = context::enter(self.handle.clone());

        match self.executor.shared().flavor() {
            Flavor::MultiThread => block_on_parked(future),
            Flavor::CurrentThread => match self.executor.take_core() {
                Some(local) => self.block_on_current_thread(local, future),
                // Another thread drives the scheduler, just wait for our
                // own future.
                None => block_on_parked(future),
            },
        }
    }

    fn block_on_current_thread<F: Future>(&self, local: LocalQueue, future: F) -> F::Output {
        let shared = self.executor.shared().clone();

        let mut core = CoreGuard {
            executor: &self.executor,
            worker: Some(Worker::new(shared.clone(), 0, local)),
        };
        let Some(worker) = core.worker.as_mut() else {
            unreachable!("current-thread core missing");
        };
        let _entered = worker.enter();

        let root = Arc::new(RootWaker {
            woken: AtomicBool::new(true),
            shared: shared.clone(),
        });
        let waker = Waker::from(root.clone());
        let mut cx = Context::from_waker(&waker);
        let mut future = pin!(future);

        let budget = shared.config.global_queue_interval;

        loop {
            if root.woken.swap(false, Ordering::AcqRel)
                && let Poll::Ready(output) = future.as_mut().poll(&mut cx)
            {
                return output;
            }

            // Queued tasks get a turn between two polls of the root future,
            // even when the root future keeps waking itself.
            let mut ran = 0;
            while ran < budget && worker.run_once() {
                ran += 1;
            }

            if ran == 0 && !root.is_woken() {
                worker.idle(|| root.is_woken());
            }
        }
    }

    /// Shuts the runtime down.
    ///
    /// Worker threads are stopped and joined, every task that did not
    /// finish is cancelled (its `JoinHandle` resolves with a cancelled
    /// error), then the reactor thread is stopped.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        tracing::debug!("runtime shutting down");

        self.executor.shutdown();
        self.driver.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Polls `future` on the current thread, sleeping between polls.
fn block_on_parked<F: Future>(future: F) -> F::Output {
    let parker = Parker::new();
    let waker = parker.waker();
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        parker.park();
    }
}

/// Waker of the `block_on` future under the current-thread flavor.
struct RootWaker {
    woken: AtomicBool,
    shared: Arc<Shared>,
}

impl RootWaker {
    fn is_woken(&self) -> bool {
        self.woken.load(Ordering::Acquire)
    }
}

impl Wake for RootWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
        self.shared.injector.notify_one();
    }
}

/// Hands the current-thread local queue back to the executor, also when the
/// `block_on` future panics.
struct CoreGuard<'a> {
    executor: &'a Executor,
    worker: Option<Worker>,
}

impl Drop for CoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(local) = self.worker.take().and_then(Worker::into_local) {
            self.executor.put_core(local);
        }
    }
}
