//! Job queue with a single sequential worker.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::BoundedBuffer;
use crate::job::{JobOutcome, join_error_message};
use crate::{Job, JobError, QueueError};

/// Configuration for the job queue.
///
/// # Example
///
/// ```rust
/// use serial_job_queue::JobQueueConfig;
///
/// // Use defaults
/// let config = JobQueueConfig::default();
///
/// // Or customize
/// let config = JobQueueConfig {
///     capacity: 64,
///     catch_panics: false,
/// };
/// ```
#[derive(Clone, Debug)]
pub struct JobQueueConfig {
    /// Maximum number of pending jobs.
    ///
    /// When the buffer is full, [`JobQueue::add_job`] waits for the worker
    /// to take a job. A capacity of 0 turns every enqueue into a direct
    /// handoff to a waiting worker.
    pub capacity: usize,

    /// Whether the worker contains panics raised by jobs.
    ///
    /// When set, a panicking action is reported to the job's compensation
    /// as a [`JobPanicked`](crate::JobPanicked) failure and the worker moves
    /// on. When unset, a panic terminates the worker and is reported by
    /// [`JobQueue::shutdown`].
    pub catch_panics: bool,
}

impl Default for JobQueueConfig {
    /// Returns a configuration with sensible defaults.
    ///
    /// - `capacity`: 20
    /// - `catch_panics`: true
    fn default() -> Self {
        Self {
            capacity: 20,
            catch_panics: true,
        }
    }
}

/// A bounded job queue drained in order by one background worker.
///
/// Each job pairs an action with a compensation. The worker runs actions one
/// at a time in the order they were enqueued; when an action fails, its
/// compensation runs with the failure before the next job starts. Job
/// failures never reach the producer.
///
/// # Lifecycle
///
/// 1. Create with [`JobQueue::new`] or [`JobQueue::with_config`]
/// 2. Enqueue jobs with [`JobQueue::add_job`], before or after starting
/// 3. Call [`JobQueue::start_working`] once to spawn the worker
/// 4. Call [`JobQueue::close`] to stop accepting jobs; pending jobs still run
/// 5. Optionally await [`JobQueue::shutdown`] to wait for the drain
///
/// Dropping the queue closes it. A running worker still drains the jobs
/// already buffered and then exits.
///
/// # Example
///
/// ```rust
/// use serial_job_queue::{JobError, JobQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), serial_job_queue::QueueError> {
/// let queue = JobQueue::new(20);
///
/// queue
///     .add_job(
///         || async { Ok::<(), JobError>(()) },
///         |err| async move { eprintln!("rolling back: {err}") },
///     )
///     .await?;
///
/// queue.start_working()?;
/// queue.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JobQueue {
    buffer: Arc<BoundedBuffer<Job>>,
    config: JobQueueConfig,
    worker: Mutex<WorkerSlot>,
}

/// Lifecycle of the single worker a queue may own.
#[derive(Debug, Default)]
enum WorkerSlot {
    #[default]
    Idle,
    Running(JoinHandle<()>),
    /// Handed to a `shutdown` call; a new worker is never started.
    Joined,
}

impl JobQueue {
    /// Create an open queue holding at most `capacity` pending jobs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_config(JobQueueConfig {
            capacity,
            ..JobQueueConfig::default()
        })
    }

    /// Create an open queue from a full configuration.
    #[must_use]
    pub fn with_config(config: JobQueueConfig) -> Self {
        Self {
            buffer: Arc::new(BoundedBuffer::new(config.capacity)),
            config,
            worker: Mutex::new(WorkerSlot::Idle),
        }
    }

    fn worker_slot(&self) -> MutexGuard<'_, WorkerSlot> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job built from `action` and `compensate`.
    ///
    /// Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed before the job
    /// could be inserted, including while waiting for a free slot.
    pub async fn add_job<A, AFut, E, C, CFut>(
        &self,
        action: A,
        compensate: C,
    ) -> Result<(), QueueError>
    where
        A: FnOnce() -> AFut + Send + 'static,
        AFut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<JobError> + Send + 'static,
        C: FnOnce(JobError) -> CFut + Send + 'static,
        CFut: Future<Output = ()> + Send + 'static,
    {
        self.push(Job::new(action, compensate)).await
    }

    /// Enqueue a pre-built job, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed.
    pub async fn push(&self, job: Job) -> Result<(), QueueError> {
        self.buffer.push(job).await
    }

    /// Enqueue a job without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed, or
    /// [`QueueError::Full`] if no slot is free.
    pub fn try_add_job<A, AFut, E, C, CFut>(
        &self,
        action: A,
        compensate: C,
    ) -> Result<(), QueueError>
    where
        A: FnOnce() -> AFut + Send + 'static,
        AFut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<JobError> + Send + 'static,
        C: FnOnce(JobError) -> CFut + Send + 'static,
        CFut: Future<Output = ()> + Send + 'static,
    {
        self.try_push(Job::new(action, compensate))
    }

    /// Enqueue a pre-built job without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed, or
    /// [`QueueError::Full`] if no slot is free.
    pub fn try_push(&self, job: Job) -> Result<(), QueueError> {
        self.buffer.try_push(job)
    }

    /// Stop accepting jobs.
    ///
    /// Waiting and future enqueues fail with [`QueueError::Closed`]. Jobs
    /// already buffered stay queued and are run by the worker, which exits
    /// once the buffer is empty. Closing an already closed queue does
    /// nothing.
    pub fn close(&self) {
        if self.buffer.close() {
            debug!(pending = self.buffer.len(), "Queue closed");
        } else {
            debug!("Queue already closed");
        }
    }

    /// Spawn the background worker.
    ///
    /// Returns immediately. Jobs enqueued before this call are run first,
    /// in order.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::AlreadyStarted`] if a worker was already
    /// started for this queue; no second worker is spawned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_working(&self) -> Result<(), QueueError> {
        // Held until the handle is stored so `shutdown` never sees a
        // spawned worker as missing.
        let mut slot = self.worker_slot();
        if !matches!(*slot, WorkerSlot::Idle) {
            warn!("Worker already started for this queue");
            return Err(QueueError::AlreadyStarted);
        }

        let buffer = Arc::clone(&self.buffer);
        let catch_panics = self.config.catch_panics;

        let handle = tokio::spawn(async move {
            debug!(capacity = buffer.capacity(), catch_panics, "Worker starting");

            let mut succeeded: u64 = 0;
            let mut compensated: u64 = 0;

            while let Some(job) = buffer.pop().await {
                match job.execute(catch_panics).await {
                    JobOutcome::Succeeded => succeeded += 1,
                    JobOutcome::Compensated => compensated += 1,
                }
            }

            debug!(succeeded, compensated, "Worker drained closed queue, shutting down");
        });

        *slot = WorkerSlot::Running(handle);
        Ok(())
    }

    /// Close the queue and wait for the worker to drain it.
    ///
    /// If no worker was started, this only closes the queue and leaves any
    /// buffered jobs unexecuted.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::WorkerPanicked`] if the worker died from a
    /// panic, which only happens with `catch_panics` disabled.
    pub async fn shutdown(&self) -> Result<(), QueueError> {
        self.close();

        let handle = {
            let mut slot = self.worker_slot();
            match std::mem::take(&mut *slot) {
                WorkerSlot::Running(handle) => {
                    *slot = WorkerSlot::Joined;
                    Some(handle)
                }
                other => {
                    *slot = other;
                    None
                }
            }
        };
        if let Some(handle) = handle {
            handle.await.map_err(|e| QueueError::WorkerPanicked {
                reason: join_error_message(e),
            })?;
        }

        info!("Job queue shut down successfully");
        Ok(())
    }

    /// Maximum number of pending jobs.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of jobs waiting to be picked up by the worker.
    #[must_use = "this returns the count, it doesn't modify the queue"]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no jobs are waiting to be picked up.
    #[must_use = "this returns a boolean, it doesn't modify the queue"]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }

    /// Whether a worker has been started and is still running.
    #[must_use]
    pub fn is_working(&self) -> bool {
        matches!(&*self.worker_slot(), WorkerSlot::Running(handle) if !handle.is_finished())
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.buffer.close();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
