use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use crate::shutdown;

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("retry: maximum number of retries reached")]
    MaxRetryReached,

    #[error("retry: cancelled by shutdown")]
    Cancelled,

    #[error("{0}")]
    Operation(E),
}

impl<E> RetryError<E> {
    pub fn operation(&self) -> Option<&E> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Re-runs a fallible async operation on a fixed backoff schedule.
///
/// The operation runs once, then once more after each interval for as long
/// as `classify` marks the last error as transient. A non-transient error or
/// a success ends the loop immediately. If the schedule runs out while the
/// error is still transient the caller gets [`RetryError::MaxRetryReached`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    intervals: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            intervals: vec![Duration::from_secs(1), Duration::from_secs(3), Duration::from_secs(5)],
        }
    }
}

impl RetryPolicy {
    pub fn new(intervals: Vec<Duration>) -> Self {
        Self { intervals }
    }

    /// A policy that runs the operation exactly once.
    pub fn none() -> Self {
        Self { intervals: Vec::new() }
    }

    pub async fn run<T, E, F, Fut, C>(
        &self,
        shutdown: &watch::Receiver<bool>,
        classify: C,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let mut stop = shutdown.clone();
        let mut result = op().await;

        for (attempt, interval) in self.intervals.iter().enumerate() {
            match result {
                Ok(v) => return Ok(v),
                Err(e) if classify(&e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        wait_ms = interval.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(*interval) => {}
                        _ = shutdown::wait(&mut stop) => return Err(RetryError::Cancelled),
                    }
                    result = op().await;
                }
                Err(e) => return Err(RetryError::Operation(e)),
            }
        }

        match result {
            Ok(v) => Ok(v),
            Err(e) if classify(&e) => {
                tracing::error!(error = %e, "Retry schedule exhausted");
                Err(RetryError::MaxRetryReached)
            }
            Err(e) => Err(RetryError::Operation(e)),
        }
    }
}
