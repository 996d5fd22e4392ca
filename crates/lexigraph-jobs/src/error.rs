//! Job error types.

use crate::job::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// A job with this id is already queued.
    #[error("Duplicate job id: {0}")]
    DuplicateId(JobId),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Invalid job state for the requested transition.
    #[error("Invalid job state for {job_id}: expected {expected}, got {actual}")]
    InvalidState {
        job_id: JobId,
        expected: String,
        actual: JobStatus,
    },

    /// A single attempt failed.
    #[error("Job {job_id} failed: {source}")]
    Execution {
        job_id: JobId,
        #[source]
        source: ExecutionError,
    },

    /// Every allowed attempt failed.
    #[error("Retries exhausted for job {job_id} after {attempts} attempts: {last_error}")]
    RetryExhausted {
        job_id: JobId,
        attempts: u32,
        last_error: String,
    },

    /// Job was cancelled.
    #[error("Job {0} was cancelled")]
    Cancelled(JobId),

    /// Request rejected before enqueueing.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<lexigraph_core::LexigraphError> for JobError {
    fn from(err: lexigraph_core::LexigraphError) -> Self {
        match err {
            lexigraph_core::LexigraphError::Validation(msg) => JobError::InvalidRequest(msg),
            lexigraph_core::LexigraphError::Configuration(msg) => JobError::Configuration(msg),
            other => JobError::Internal(other.to_string()),
        }
    }
}

/// Failure reported by an [`Executor`](crate::executor::Executor) for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExecutionError {
    /// The generation failed; another attempt may succeed.
    #[error("generation failed: {0}")]
    Failed(String),

    /// The generation was rejected; retrying will not help.
    #[error("generation rejected: {0}")]
    Rejected(String),

    /// The executor observed the cancellation token.
    #[error("generation cancelled")]
    Cancelled,

    /// The attempt exceeded its time budget.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

impl ExecutionError {
    /// Creates a retryable failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates a non-retryable failure.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Timeout(_))
    }
}
