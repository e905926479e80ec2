use crate::diagnostics::{Sink, TaskEvent, TaskEventKind};
use crate::reactor;
use crate::runtime::builder::ThreadOptions;
use crate::runtime::context;
use crate::runtime::executor::owned::OwnedTasks;
use crate::runtime::executor::worker::Worker;
use crate::runtime::handle::Handle;
use crate::runtime::task::{Id, JoinHandle, Notified, Task};
use crate::runtime::work_stealing::injector::Injector;
use crate::runtime::work_stealing::queue::{self, LocalQueue};

use crossbeam_deque::Stealer;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Scheduler flavor selected by the builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flavor {
    /// No worker threads, tasks run on the thread calling `block_on`.
    CurrentThread,

    /// A pool of worker threads stealing from each other.
    MultiThread,
}

/// Tuning knobs of the worker loop.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Config {
    /// Every that many ticks a worker checks the injector before its local
    /// queue.
    pub(crate) global_queue_interval: u32,

    /// Number of `yield_now` rounds an idle worker spins before parking.
    pub(crate) spin_before_park: u32,

    /// Upper bound on a single park.
    pub(crate) park_timeout: Duration,
}

/// State shared by all workers of a scheduler and by every task spawned on
/// it.
pub(crate) struct Shared {
    pub(crate) injector: Injector,

    /// One stealer per worker, indexed like the workers.
    pub(crate) stealers: Vec<Stealer<Notified>>,

    pub(crate) config: Config,

    flavor: Flavor,

    owned: OwnedTasks,

    diagnostics: Option<Arc<Sink>>,

    reactor: reactor::Handle,
}

impl Shared {
    pub(crate) fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub(crate) fn reactor(&self) -> &reactor::Handle {
        &self.reactor
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.injector.is_shutdown()
    }

    /// Number of tasks spawned on this scheduler that did not finish yet.
    pub(crate) fn live_tasks(&self) -> usize {
        self.owned.len()
    }

    /// Spawns a new task.
    ///
    /// Once shutdown has begun the task is cancelled right away and its
    /// handle resolves with a cancelled `JoinError`.
    pub(crate) fn spawn<F>(self: &Arc<Self>, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task = Arc::new(Task::new(future, self.clone()));
        let id = task.id();
        let notified: Notified = task.clone();

        if !self.owned.bind(id, Arc::downgrade(&notified)) {
            tracing::debug!(task.id = %id, "spawn after shutdown, cancelling task");
            notified.shutdown();
            return JoinHandle::new(task);
        }

        tracing::trace!(task.id = %id, "task spawned");
        self.emit(id, TaskEventKind::Scheduled, None);
        self.schedule(notified);

        JoinHandle::new(task)
    }

    /// Pushes a runnable task onto a queue.
    ///
    /// From a worker of this scheduler the task goes to the back of that
    /// worker's local queue. From anywhere else it goes to the injector,
    /// which wakes a parked worker.
    pub(crate) fn schedule(self: &Arc<Self>, task: Notified) {
        if let Some(worker) = context::current_worker()
            && Arc::ptr_eq(&worker.shared, self)
        {
            worker.local.push(task);
            self.injector.notify_if_parked();
            return;
        }

        self.injector.push(task);
    }

    /// Records a lifecycle event if diagnostics are enabled.
    pub(crate) fn emit(&self, id: Id, kind: TaskEventKind, poll_duration: Option<Duration>) {
        if let Some(sink) = &self.diagnostics {
            sink.push(TaskEvent {
                id,
                kind,
                at: Instant::now(),
                poll_duration,
            });
        }
    }

    /// Forgets a task that reached a terminal state.
    pub(crate) fn release(&self, id: Id) {
        self.owned.remove(id);
    }

    /// Cancels every task that is still alive. Called once the workers are
    /// gone.
    fn cancel_all(&self) {
        let tasks = self.owned.close();
        let count = tasks.len();

        for task in tasks.into_iter().filter_map(|task| task.upgrade()) {
            task.shutdown();
        }

        while let Some(task) = self.injector.pop() {
            task.shutdown();
        }

        if count > 0 {
            tracing::debug!(tasks = count, "cancelled tasks at shutdown");
        }
    }
}

/// Owns the worker threads of a scheduler.
pub(crate) struct Executor {
    shared: Arc<Shared>,

    handles: Vec<thread::JoinHandle<()>>,

    /// Local queue of the current-thread flavor. Taken by the thread driving
    /// `block_on` and put back when it returns.
    core: Mutex<Option<LocalQueue>>,
}

impl Executor {
    /// Creates the scheduler and, for the multi-thread flavor, spawns its
    /// workers.
    ///
    /// If a worker thread fails to spawn, the workers already running are
    /// shut down before the error is returned.
    pub(crate) fn new(
        flavor: Flavor,
        worker_threads: usize,
        threads: &ThreadOptions,
        config: Config,
        reactor: reactor::Handle,
        diagnostics: Option<Arc<Sink>>,
    ) -> io::Result<Self> {
        let workers = match flavor {
            Flavor::CurrentThread => 1,
            Flavor::MultiThread => worker_threads,
        };

        let (mut locals, stealers) = queue::local_queues(workers);

        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            config,
            flavor,
            owned: OwnedTasks::new(),
            diagnostics,
            reactor,
        });

        let mut executor = Self {
            shared,
            handles: Vec::with_capacity(workers),
            core: Mutex::new(None),
        };

        match flavor {
            Flavor::CurrentThread => *executor.core.get_mut() = locals.pop(),
            Flavor::MultiThread => {
                for (index, local) in locals.into_iter().enumerate() {
                    match spawn_worker(&executor.shared, index, local, threads) {
                        Ok(handle) => executor.handles.push(handle),
                        Err(err) => {
                            executor.shutdown();
                            return Err(err);
                        }
                    }
                }
            }
        }

        tracing::debug!(?flavor, workers, "executor started");

        Ok(executor)
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Takes the current-thread core, if nobody else is driving it.
    pub(crate) fn take_core(&self) -> Option<LocalQueue> {
        self.core.lock().take()
    }

    pub(crate) fn put_core(&self, local: LocalQueue) {
        *self.core.lock() = Some(local);
    }

    /// Stops the workers and cancels every remaining task.
    ///
    /// Safe to call more than once.
    pub(crate) fn shutdown(&mut self) {
        self.shared.injector.shutdown();

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        if let Some(local) = self.core.get_mut().take() {
            while let Some(task) = local.pop() {
                task.shutdown();
            }
        }

        self.shared.cancel_all();
    }
}

fn spawn_worker(
    shared: &Arc<Shared>,
    index: usize,
    local: LocalQueue,
    threads: &ThreadOptions,
) -> io::Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new().name((threads.name)());

    if let Some(stack_size) = threads.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let shared = shared.clone();

    builder.spawn(move || {
        let _enter = context::enter(Handle::new(shared.clone()));
        Worker::new(shared, index, local).run();
    })
}
