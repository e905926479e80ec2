use super::Runtime;
use super::executor::{Config, Executor, Flavor};
use crate::diagnostics::{Diagnostics, Sink};
use crate::reactor::Reactor;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

const DEFAULT_GLOBAL_QUEUE_INTERVAL: u32 = 31;

const DEFAULT_SPIN_BEFORE_PARK: u32 = 16;

/// Upper bound on a single park of an idle worker. Wakes are never lost, a
/// worker that parks simply re-checks its queues at least this often.
const PARK_TIMEOUT: Duration = Duration::from_millis(10);

const DEFAULT_THREAD_NAME: &str = "weft";

pub(crate) type ThreadNameFn = Arc<dyn Fn() -> String + Send + Sync + 'static>;

fn default_thread_name_fn() -> ThreadNameFn {
    let counter = Arc::new(AtomicUsize::new(0));

    Arc::new(move || {
        let n = counter.fetch_add(1, Ordering::Relaxed);
        format!("{DEFAULT_THREAD_NAME}-worker-{n}")
    })
}

/// Options applied to every thread spawned by the runtime.
pub(crate) struct ThreadOptions {
    pub(crate) name: ThreadNameFn,
    pub(crate) stack_size: Option<usize>,
}

/// Errors returned by [`Builder::build`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("worker_threads must be greater than 0")]
    ZeroWorkerThreads,

    #[error("global_queue_interval must be greater than 0")]
    ZeroGlobalQueueInterval,

    #[error("diagnostics capacity must be greater than 0")]
    ZeroDiagnosticsCapacity,

    #[error("failed to spawn a runtime thread")]
    ThreadSpawn(#[source] io::Error),

    #[error("failed to set up the I/O reactor")]
    Reactor(#[source] io::Error),
}

/// Builder for configuring and creating a [`Runtime`].
///
/// Settings are only validated by [`build`](Self::build), which reports
/// invalid values as a [`ConfigError`].
///
/// # Examples
///
/// ```
/// use weft::runtime::Builder;
///
/// let runtime = Builder::new_multi_thread()
///     .worker_threads(2)
///     .thread_name("app")
///     .build()
///     .unwrap();
///
/// assert_eq!(runtime.block_on(async { 1 + 1 }), 2);
/// ```
pub struct Builder {
    flavor: Flavor,

    /// Number of worker threads, `None` means one per logical CPU.
    ///
    /// Ignored by the current-thread flavor.
    worker_threads: Option<usize>,

    thread_name: ThreadNameFn,

    /// Prefix of the reactor thread name.
    thread_name_prefix: String,

    thread_stack_size: Option<usize>,

    global_queue_interval: u32,

    spin_before_park: u32,

    /// Capacity of the diagnostics queue, `None` when disabled.
    diagnostics: Option<usize>,
}

impl Builder {
    fn with_flavor(flavor: Flavor) -> Self {
        Self {
            flavor,
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_name_prefix: DEFAULT_THREAD_NAME.to_owned(),
            thread_stack_size: None,
            global_queue_interval: DEFAULT_GLOBAL_QUEUE_INTERVAL,
            spin_before_park: DEFAULT_SPIN_BEFORE_PARK,
            diagnostics: None,
        }
    }

    /// Creates a builder for the multi-thread scheduler.
    pub fn new() -> Self {
        Self::new_multi_thread()
    }

    /// Creates a builder for the current-thread scheduler: tasks only run
    /// while a thread is inside [`Runtime::block_on`].
    pub fn new_current_thread() -> Self {
        Self::with_flavor(Flavor::CurrentThread)
    }

    /// Creates a builder for the multi-thread, work-stealing scheduler.
    pub fn new_multi_thread() -> Self {
        Self::with_flavor(Flavor::MultiThread)
    }

    /// Sets the number of worker threads.
    ///
    /// Defaults to the number of logical CPUs. Has no effect on the
    /// current-thread scheduler.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n);
        self
    }

    /// Sets the name of worker threads. The reactor thread is named
    /// `{name}-reactor`.
    ///
    /// The default names are `weft-worker-{N}` and `weft-reactor`.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.thread_name_prefix = name.clone();
        self.thread_name = Arc::new(move || name.clone());
        self
    }

    /// Sets a function generating the name of each worker thread.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = Arc::new(f);
        self
    }

    /// Sets the stack size, in bytes, of threads spawned by the runtime.
    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Sets how many tasks a worker polls before it checks the global queue
    /// ahead of its local one.
    ///
    /// Lower values favor newly injected work, higher values favor locality.
    /// Defaults to 31.
    pub fn global_queue_interval(mut self, n: u32) -> Self {
        self.global_queue_interval = n;
        self
    }

    /// Sets how many times an idle worker yields its thread, re-checking for
    /// work, before it parks. Defaults to 16.
    pub fn spin_before_park(mut self, n: u32) -> Self {
        self.spin_before_park = n;
        self
    }

    /// Records task lifecycle events into a queue holding at most
    /// `capacity` events. See [`diagnostics`](crate::diagnostics).
    pub fn enable_diagnostics(mut self, capacity: usize) -> Self {
        self.diagnostics = Some(capacity);
        self
    }

    fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.flavor == Flavor::MultiThread && self.resolved_worker_threads() == 0 {
            return Err(ConfigError::ZeroWorkerThreads);
        }

        if self.global_queue_interval == 0 {
            return Err(ConfigError::ZeroGlobalQueueInterval);
        }

        if self.diagnostics == Some(0) {
            return Err(ConfigError::ZeroDiagnosticsCapacity);
        }

        Ok(())
    }

    /// Builds the runtime with the configured options.
    ///
    /// This starts the reactor thread and, for the multi-thread flavor, the
    /// worker threads.
    pub fn build(self) -> Result<Runtime, ConfigError> {
        self.validate()?;

        let worker_threads = self.resolved_worker_threads();

        let reactor = Reactor::new().map_err(ConfigError::Reactor)?;
        let driver = reactor
            .spawn(
                format!("{}-reactor", self.thread_name_prefix),
                self.thread_stack_size,
            )
            .map_err(ConfigError::ThreadSpawn)?;

        let sink = self.diagnostics.map(|capacity| Arc::new(Sink::new(capacity)));
        let diagnostics = sink.clone().map(Diagnostics::new);

        let config = Config {
            global_queue_interval: self.global_queue_interval,
            spin_before_park: self.spin_before_park,
            park_timeout: PARK_TIMEOUT,
        };

        let threads = ThreadOptions {
            name: self.thread_name,
            stack_size: self.thread_stack_size,
        };

        let executor = Executor::new(
            self.flavor,
            worker_threads,
            &threads,
            config,
            driver.handle(),
            sink,
        )
        .map_err(ConfigError::ThreadSpawn)?;

        Ok(Runtime::new(executor, driver, diagnostics))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("flavor", &self.flavor)
            .field("worker_threads", &self.worker_threads)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("thread_stack_size", &self.thread_stack_size)
            .field("global_queue_interval", &self.global_queue_interval)
            .field("spin_before_park", &self.spin_before_park)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_thread_names() {
        let name = default_thread_name_fn();

        assert_eq!(name(), "weft-worker-0");
        assert_eq!(name(), "weft-worker-1");
    }

    #[rstest]
    #[case::zero_workers(Builder::new_multi_thread().worker_threads(0), "worker_threads")]
    #[case::zero_interval(Builder::new_current_thread().global_queue_interval(0), "global_queue_interval")]
    #[case::zero_capacity(Builder::new_current_thread().enable_diagnostics(0), "diagnostics")]
    fn test_invalid_config(#[case] builder: Builder, #[case] mentions: &str) {
        let err = builder.validate().unwrap_err();
        assert!(err.to_string().contains(mentions), "{err}");
    }

    #[test]
    fn test_zero_workers_ignored_by_current_thread() {
        let builder = Builder::new_current_thread().worker_threads(0);
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn test_thread_name_sets_reactor_prefix() {
        let builder = Builder::new_multi_thread().thread_name("io");

        assert_eq!(builder.thread_name_prefix, "io");
        assert_eq!((builder.thread_name)(), "io");
    }
}
