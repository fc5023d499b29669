//! Managed delivery executor
//!
//! Wraps a tokio runtime handle with tracked task lifecycles and a two-phase
//! shutdown: wait for tasks to finish within a graceful timeout, then abort
//! stragglers and wait a shorter forced interval. Tasks that survive both
//! phases are reported and logged, never propagated — shutdown always
//! completes.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Shutdown timeouts for the executor
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// How long to wait for tasks to finish on their own
    pub graceful_timeout: Duration,

    /// How long to wait for aborted tasks to unwind
    pub forced_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(30),
            forced_timeout: Duration::from_secs(10),
        }
    }
}

/// Executor for delivery tasks with bounded shutdown
///
/// `spawn` works from any thread (the runtime handle is captured at
/// construction), so non-async callers can schedule delivery without
/// blocking. Once `shutdown` begins, new work is rejected.
pub struct DeliveryExecutor {
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    config: ExecutorConfig,
}

impl DeliveryExecutor {
    /// Create an executor on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime context.
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_handle(Handle::current(), config)
    }

    /// Create an executor on an explicit runtime handle
    pub fn with_handle(runtime: Handle, config: ExecutorConfig) -> Self {
        Self {
            runtime,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            config,
        }
    }

    /// Spawn a delivery task
    ///
    /// Returns `false` if the executor is shut down, in which case the task
    /// never runs.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            warn!("executor is shut down, rejecting delivery task");
            return false;
        }

        let handle = self.runtime.spawn(task);

        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
        true
    }

    /// Number of tracked tasks that have not finished
    pub fn pending(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }

    /// Whether shutdown has begun
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shut the executor down
    ///
    /// Idempotent: the second and later calls return an empty report. Never
    /// fails — tasks that outlive the forced phase are counted as leaked and
    /// logged at error level.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        debug!(task_count = tasks.len(), "executor shutting down");

        let mut report = ShutdownReport::default();
        let mut stragglers = Vec::new();

        let deadline = Instant::now() + self.config.graceful_timeout;
        for mut task in tasks {
            if task.is_finished() {
                report.completed += 1;
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, &mut task).await {
                Ok(Ok(())) => report.completed += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, "delivery task panicked during shutdown");
                    report.completed += 1;
                }
                Err(_) => {
                    task.abort();
                    stragglers.push(task);
                }
            }
        }

        if !stragglers.is_empty() {
            warn!(
                count = stragglers.len(),
                "delivery tasks did not finish gracefully, aborting"
            );

            let deadline = Instant::now() + self.config.forced_timeout;
            for mut task in stragglers {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match timeout(remaining, &mut task).await {
                    Ok(_) => report.aborted += 1,
                    Err(_) => {
                        error!("delivery task did not terminate after abort");
                        report.leaked += 1;
                    }
                }
            }
        }

        debug!(
            completed = report.completed,
            aborted = report.aborted,
            leaked = report.leaked,
            "executor shut down"
        );

        report
    }
}

impl std::fmt::Debug for DeliveryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryExecutor")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Outcome of an executor shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that finished within the graceful timeout
    pub completed: usize,
    /// Tasks aborted after the graceful timeout that then unwound
    pub aborted: usize,
    /// Tasks still running after the forced timeout
    pub leaked: usize,
}

impl ShutdownReport {
    /// True if every task finished on its own
    pub fn is_clean(&self) -> bool {
        self.aborted == 0 && self.leaked == 0
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
