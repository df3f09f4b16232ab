//! Job record: an action and the compensation run when it fails.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinError;
use tracing::{debug, error};

use crate::error::JobPanicked;

/// Failure value produced by a job's action and handed to its compensation.
pub type JobError = Box<dyn std::error::Error + Send + Sync + 'static>;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type Action = Box<dyn FnOnce() -> BoxFuture<Result<(), JobError>> + Send + 'static>;
type Compensation = Box<dyn FnOnce(JobError) -> BoxFuture<()> + Send + 'static>;

/// Outcome of executing one job on the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    /// The action completed successfully.
    Succeeded,
    /// The action failed (or panicked) and the compensation was run.
    Compensated,
}

/// A unit of work: a fallible action plus the compensation invoked with
/// the action's failure.
///
/// Both halves are captured when the job is built and are consumed by the
/// single execution attempt the worker makes.
///
/// # Example
///
/// ```rust
/// use serial_job_queue::{Job, JobError};
///
/// let job = Job::new(
///     || async { Err::<(), JobError>("insert failed".into()) },
///     |err| async move { eprintln!("rolling back: {err}") },
/// );
/// # drop(job);
/// ```
pub struct Job {
    action: Action,
    compensate: Compensation,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").finish_non_exhaustive()
    }
}

impl Job {
    /// Build a job from an action and its compensation.
    ///
    /// The compensation is only called when the action returns an error,
    /// and is given that error.
    pub fn new<A, AFut, E, C, CFut>(action: A, compensate: C) -> Self
    where
        A: FnOnce() -> AFut + Send + 'static,
        AFut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<JobError> + Send + 'static,
        C: FnOnce(JobError) -> CFut + Send + 'static,
        CFut: Future<Output = ()> + Send + 'static,
    {
        let action: Action = Box::new(move || -> BoxFuture<Result<(), JobError>> {
            Box::pin(async move { action().await.map_err(Into::<JobError>::into) })
        });
        // The caller's closure runs on first poll, not when the box is called.
        let compensate: Compensation = Box::new(move |err: JobError| -> BoxFuture<()> {
            Box::pin(async move { compensate(err).await })
        });

        Self { action, compensate }
    }

    /// Run the action and, on failure, the compensation.
    ///
    /// With `catch_panics` set, each half runs on its own task so a panic
    /// is observed through the join handle instead of unwinding the
    /// caller. A panicking action is reported to the compensation as
    /// [`JobPanicked`]; a panicking compensation is only logged.
    pub(crate) async fn execute(self, catch_panics: bool) -> JobOutcome {
        let Self { action, compensate } = self;

        let result = if catch_panics {
            match tokio::spawn(action()).await {
                Ok(result) => result,
                Err(e) => {
                    let message = join_error_message(e);
                    error!(error = %message, "Job action panicked");
                    Err(Box::new(JobPanicked { message }) as JobError)
                }
            }
        } else {
            action().await
        };

        let err = match result {
            Ok(()) => return JobOutcome::Succeeded,
            Err(err) => err,
        };

        debug!(error = %err, "Job failed, running compensation");
        let compensation = compensate(err);
        if catch_panics {
            if let Err(e) = tokio::spawn(compensation).await {
                error!(error = %join_error_message(e), "Job compensation panicked");
            }
        } else {
            compensation.await;
        }

        JobOutcome::Compensated
    }
}

/// Extract a readable message from a failed join.
pub(crate) fn join_error_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => panic_payload_message(payload.as_ref()),
        Err(err) => err.to_string(),
    }
}

fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    fn failing(message: &'static str) -> impl Future<Output = Result<(), io::Error>> {
        async move { Err(io::Error::other(message)) }
    }

    #[tokio::test]
    async fn success_skips_compensation() {
        let compensations = Arc::new(AtomicUsize::new(0));
        let counter = compensations.clone();

        let job = Job::new(
            || async { Ok::<(), JobError>(()) },
            move |_err| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(job.execute(true).await, JobOutcome::Succeeded);
        assert_eq!(compensations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_passes_error_to_compensation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let job = Job::new(
            || failing("disk full"),
            move |err| async move {
                sink.lock().await.push(err.to_string());
            },
        );

        assert_eq!(job.execute(false).await, JobOutcome::Compensated);
        assert_eq!(*seen.lock().await, vec!["disk full".to_string()]);
    }

    #[tokio::test]
    async fn action_panic_becomes_job_panicked() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        let job = Job::new(
            || async {
                if true {
                    panic!("exploded");
                }
                Ok::<(), JobError>(())
            },
            move |err| async move {
                *sink.lock().await = err.downcast_ref::<JobPanicked>().cloned();
            },
        );

        assert_eq!(job.execute(true).await, JobOutcome::Compensated);
        assert_eq!(
            *seen.lock().await,
            Some(JobPanicked {
                message: "exploded".into()
            })
        );
    }

    #[tokio::test]
    async fn compensation_panic_is_contained() {
        let job = Job::new(
            || failing("first"),
            |_err| async {
                panic!("rollback failed");
            },
        );

        assert_eq!(job.execute(true).await, JobOutcome::Compensated);
    }

    #[tokio::test]
    async fn compensation_panic_before_future_is_contained() {
        let job = Job::new(
            || failing("first"),
            |_err| -> std::future::Ready<()> {
                panic!("sync rollback panic");
            },
        );

        let joined = tokio::spawn(job.execute(true)).await;
        assert_eq!(joined.unwrap(), JobOutcome::Compensated);
    }

    #[tokio::test]
    async fn panic_escapes_without_boundary() {
        let job = Job::new(
            || async {
                if true {
                    panic!("exploded");
                }
                Ok::<(), JobError>(())
            },
            |_err| async {},
        );

        let joined = tokio::spawn(job.execute(false)).await;
        let err = joined.expect_err("panic should escape");
        assert!(err.is_panic());
    }

    #[test]
    fn payload_message_handles_str_and_string() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_payload_message(s.as_ref()), "static");

        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_payload_message(s.as_ref()), "owned");

        let s: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_payload_message(s.as_ref()), "unknown panic payload");
    }
}
