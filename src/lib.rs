//! A bounded job queue drained in order by a single background worker.
//!
//! Every job pairs an action with a compensation. The worker runs actions
//! strictly one after another, in the order they were enqueued. When an
//! action fails, its compensation is called with the failure (to roll back,
//! clean up, or log) before the next job starts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  add_job   ┌──────────────────┐  pop   ┌────────┐
//! │ producer │───────────►│  bounded buffer  │───────►│ worker │──► action
//! ├──────────┤            │  (FIFO, N slots) │        └────────┘      │ Err
//! │ producer │───────────►│  open / closed   │                        ▼
//! └──────────┘            └──────────────────┘                   compensate
//! ```
//!
//! - Enqueueing waits while the buffer is full and fails with
//!   [`QueueError::Closed`] once the queue is closed.
//! - Closing keeps buffered jobs; the worker drains them and then exits.
//! - Job failures go to the job's compensation, never back to the producer.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serial_job_queue::{JobError, JobQueue, QueueError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let queue = JobQueue::new(20);
//!
//!     queue
//!         .add_job(
//!             || async {
//!                 println!("writing record");
//!                 Err::<(), JobError>("write rejected".into())
//!             },
//!             |err| async move {
//!                 println!("rolling back: {err}");
//!             },
//!         )
//!         .await?;
//!
//!     queue.start_working()?;
//!     queue.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod buffer;
mod error;
mod job;
mod queue;

pub use error::{JobPanicked, QueueError};
pub use job::{Job, JobError};
pub use queue::{JobQueue, JobQueueConfig};
