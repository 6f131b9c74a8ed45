use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

use crate::error::{DnnError, Result};
use crate::runtime::lock;

/// One unit of asynchronous work: layers plus completion for one slot.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs inference jobs off the submitting thread.
pub trait AsyncExecutor: Send + Sync {
    fn spawn(&self, job: Job);

    /// Called once at model teardown before waiting for in-flight jobs.
    /// Executors that only run jobs when driven must run them here.
    fn shutdown(&self) {}
}

/// Rayon-backed executor; the default when no executor is supplied.
pub struct ThreadPoolExecutor {
    pool: ThreadPool,
}

impl ThreadPoolExecutor {
    /// `threads == 0` lets rayon pick the worker count.
    pub fn new(threads: usize) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new().thread_name(|index| format!("nativednn-infer-{}", index));
        if threads > 0 {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|err| DnnError::Executor(format!("failed to build inference threadpool: {}", err)))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl AsyncExecutor for ThreadPoolExecutor {
    fn spawn(&self, job: Job) {
        self.pool.spawn(move || {
            trace!(thread = ?std::thread::current().id(), "inference job start");
            job();
            trace!(thread = ?std::thread::current().id(), "inference job end");
        });
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("threads", &self.threads())
            .finish()
    }
}

/// Queues jobs until the owner runs them; lets callers decide completion order.
#[derive(Default)]
pub struct DeferredExecutor {
    jobs: Mutex<VecDeque<Job>>,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        lock(&self.jobs).len()
    }

    /// Run the oldest queued job. Returns false when none was queued.
    pub fn run_next(&self) -> bool {
        let job = lock(&self.jobs).pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run the newest queued job. Returns false when none was queued.
    pub fn run_last(&self) -> bool {
        let job = lock(&self.jobs).pop_back();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run queued jobs, including ones queued while running, until empty.
    pub fn run_all(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }
}

impl AsyncExecutor for DeferredExecutor {
    fn spawn(&self, job: Job) {
        lock(&self.jobs).push_back(job);
    }

    fn shutdown(&self) {
        self.run_all();
    }
}

impl fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Count of dispatched jobs that have not finished yet.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(crate) fn enter(self: &Arc<Self>) -> InFlightGuard {
        *lock(&self.count) += 1;
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    pub(crate) fn count(&self) -> usize {
        *lock(&self.count)
    }

    pub(crate) fn wait_idle(&self) {
        let mut count = lock(&self.count);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }
}

/// Decrements the in-flight count when the job that owns it is dropped,
/// whether or not it ran.
pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = lock(&self.tracker.count);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.tracker.idle.notify_all();
        }
    }
}
