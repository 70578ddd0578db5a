//! Bounded background worker pool
//!
//! Wraps a tokio runtime and uses its blocking pool as the worker set: every
//! job is synchronous (file writes, blocking HTTP) and runs on one of at most
//! `worker_threads` threads. Callers never wait on a job.

use eyre::{Context, Result};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn begin(&self) {
        let mut count = match self.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *count += 1;
    }

    fn end(&self) {
        let mut count = match self.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the in-flight count when the job finishes or unwinds
struct JobGuard(Arc<InFlight>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

pub struct Executor {
    runtime: Option<Runtime>,
    in_flight: Arc<InFlight>,
    workers: usize,
}

impl Executor {
    pub fn new(worker_threads: usize) -> Result<Self> {
        let workers = worker_threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("fanlog-worker")
            .build()
            .context("Failed to create worker runtime")?;

        log::debug!("Executor started with {} worker thread(s)", workers);
        Ok(Self {
            runtime: Some(runtime),
            in_flight: Arc::new(InFlight::default()),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue a job; returns immediately
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            log::warn!("Executor is shut down, dropping job");
            return;
        };

        self.in_flight.begin();
        let guard = JobGuard(self.in_flight.clone());
        runtime.spawn_blocking(move || {
            let _guard = guard;
            job();
        });
    }

    /// Number of jobs queued or running
    pub fn pending(&self) -> usize {
        match self.in_flight.count.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Wait until no jobs are queued or running, up to `timeout`
    ///
    /// Returns true if the pool went idle in time. Jobs submitted by running
    /// jobs are waited for as well.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = match self.in_flight.count.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            count = match self.in_flight.idle.wait_timeout(count, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // Blocking shutdown is not allowed from inside a runtime thread
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("workers", &self.workers)
            .field("pending", &self.pending())
            .finish()
    }
}
