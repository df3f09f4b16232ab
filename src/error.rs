//! Error types for the job queue crate.

use thiserror::Error;

/// Errors that can occur when using the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue has been closed and no longer accepts jobs.
    ///
    /// Jobs that were buffered before the close are still executed.
    #[error("Queue is closed")]
    Closed,

    /// The queue has no free slot. Only returned by the non-blocking
    /// enqueue variants.
    #[error("Queue is full")]
    Full,

    /// A worker has already been started for this queue.
    #[error("Worker already started")]
    AlreadyStarted,

    /// The worker panicked during execution.
    #[error("Worker panicked: {reason}")]
    WorkerPanicked { reason: String },
}

/// Synthetic job failure handed to a job's compensation when its action
/// panicked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Job panicked: {message}")]
pub struct JobPanicked {
    /// Panic payload, when it was a string.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_error_messages() {
        assert_eq!(QueueError::Closed.to_string(), "Queue is closed");
        assert_eq!(QueueError::Full.to_string(), "Queue is full");
        assert_eq!(
            QueueError::WorkerPanicked {
                reason: "boom".into()
            }
            .to_string(),
            "Worker panicked: boom"
        );
    }

    #[test]
    fn job_panicked_message() {
        let err = JobPanicked {
            message: "index out of bounds".into(),
        };
        assert_eq!(err.to_string(), "Job panicked: index out of bounds");
    }
}
