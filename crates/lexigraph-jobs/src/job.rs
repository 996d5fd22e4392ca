//! Job model: identity, lifecycle status, and the per-job record.

use crate::error::{ExecutionError, JobError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;
use uuid::Uuid;

/// Highest progress a job may report while it is still running.
///
/// A value of 100 is reserved for jobs that have completed.
pub const RUNNING_PROGRESS_CEILING: f64 = 99.0;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a job ID from a string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a free slot.
    Pending,
    /// An executor call is in progress.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error after all allowed attempts.
    Failed,
    /// Held back from dispatch until resumed.
    Paused,
    /// Cancelled by the user.
    Cancelled,
}

impl JobStatus {
    /// Every status, in display order.
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Paused,
        JobStatus::Cancelled,
    ];

    /// Returns true once the job will never run again on its own.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority. Higher priorities are dispatched first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(JobError::InvalidRequest(format!(
                "unknown priority '{other}', expected low, normal or high"
            ))),
        }
    }
}

/// One unit of batch work: a request plus its lifecycle record.
///
/// Status transitions are owned by the queue and scheduler; callers only
/// read jobs or create new ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job<R, O> {
    id: JobId,
    request: R,
    priority: Priority,
    status: JobStatus,
    progress: f64,
    attempt: u32,
    remaining_retries: u32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    result: Option<O>,
    error: Option<String>,
    tags: Vec<String>,
    #[serde(skip)]
    retry_at: Option<Instant>,
}

impl<R, O> Job<R, O> {
    /// Creates a new pending job.
    pub fn new(request: R, priority: Priority) -> Self {
        Self {
            id: JobId::new(),
            request,
            priority,
            status: JobStatus::Pending,
            progress: 0.0,
            attempt: 0,
            remaining_retries: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            tags: Vec::new(),
            retry_at: None,
        }
    }

    /// Sets an explicit job ID.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<JobId>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn request(&self) -> &R {
        &self.request
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Progress percentage in `[0, 100]`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Number of times the job has entered `Running`.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Retries that were still available when the job last failed.
    ///
    /// Zero for jobs that have not failed.
    pub fn remaining_retries(&self) -> u32 {
        self.remaining_retries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the job first entered `Running`.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Output of a completed job.
    pub fn result(&self) -> Option<&O> {
        self.result.as_ref()
    }

    /// Error message of a failed job.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall time between first start and finish.
    pub fn duration(&self) -> Option<std::time::Duration> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        (finished - started).to_std().ok()
    }

    /// Typed view of a terminal job's outcome. `None` while the job can still run.
    pub fn outcome(&self) -> Option<Result<&O, JobError>> {
        match self.status {
            JobStatus::Completed => self.result.as_ref().map(Ok),
            JobStatus::Failed => {
                let last_error = self.error.clone().unwrap_or_default();
                Some(Err(if self.attempt > 1 {
                    JobError::RetryExhausted {
                        job_id: self.id.clone(),
                        attempts: self.attempt,
                        last_error,
                    }
                } else {
                    JobError::Execution {
                        job_id: self.id.clone(),
                        source: ExecutionError::Failed(last_error),
                    }
                }))
            }
            JobStatus::Cancelled => Some(Err(JobError::Cancelled(self.id.clone()))),
            JobStatus::Pending | JobStatus::Running | JobStatus::Paused => None,
        }
    }

    /// True if the job may be dispatched at `now`.
    pub(crate) fn is_ready(&self, now: Instant) -> bool {
        self.status == JobStatus::Pending && self.retry_at.map_or(true, |at| at <= now)
    }

    pub(crate) fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Fresh pending copy with a new id. History is not carried over.
    pub(crate) fn duplicate(&self) -> Self
    where
        R: Clone,
    {
        let mut copy = Self::new(self.request.clone(), self.priority);
        copy.tags = self.tags.clone();
        copy
    }

    /// Clears run history so a job built elsewhere, or restored from a
    /// snapshot, enters the queue as a fresh pending job. Identity, request,
    /// priority, tags and `created_at` are kept.
    pub(crate) fn reset_for_enqueue(&mut self) {
        self.status = JobStatus::Pending;
        self.progress = 0.0;
        self.attempt = 0;
        self.remaining_retries = 0;
        self.started_at = None;
        self.finished_at = None;
        self.result = None;
        self.error = None;
        self.retry_at = None;
    }

    pub(crate) fn mark_pending(&mut self) {
        self.status = JobStatus::Pending;
        self.progress = 0.0;
    }

    pub(crate) fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.progress = 0.0;
        self.attempt += 1;
        self.retry_at = None;
        self.started_at.get_or_insert(now);
    }

    /// Records reported progress. Returns the new value if it changed.
    ///
    /// Progress only moves forward and stays below 100 until completion.
    pub(crate) fn record_progress(&mut self, percent: f64) -> Option<f64> {
        if self.status != JobStatus::Running || !percent.is_finite() {
            return None;
        }
        let clamped = percent.clamp(0.0, RUNNING_PROGRESS_CEILING);
        if clamped > self.progress {
            self.progress = clamped;
            Some(clamped)
        } else {
            None
        }
    }

    pub(crate) fn complete(&mut self, output: O, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.result = Some(output);
        self.error = None;
        self.remaining_retries = 0;
        self.finished_at = Some(now);
    }

    pub(crate) fn fail(&mut self, message: String, remaining_retries: u32, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(message);
        self.result = None;
        self.remaining_retries = remaining_retries;
        self.finished_at = Some(now);
    }

    /// Returns a failed attempt to the queue, not dispatchable before `retry_at`.
    pub(crate) fn schedule_retry(&mut self, retry_at: Option<Instant>) {
        self.mark_pending();
        self.retry_at = retry_at;
    }

    pub(crate) fn pause(&mut self) {
        self.status = JobStatus::Paused;
    }

    pub(crate) fn resume(&mut self) {
        self.mark_pending();
        self.retry_at = None;
    }

    pub(crate) fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.result = None;
        self.error = None;
        self.retry_at = None;
        self.finished_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestJob = Job<String, u32>;

    fn job() -> TestJob {
        Job::new("a lighthouse at dusk".to_string(), Priority::Normal)
    }

    #[test]
    fn test_job_id_new() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_job_id_from_string() {
        let id = JobId::from_string("test-id");
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }

    #[test]
    fn test_job_id_serializes_as_string() {
        let json = serde_json::to_string(&JobId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_from_str() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.attempt(), 0);
        assert_eq!(job.progress(), 0.0);
        assert!(job.started_at().is_none());
        assert!(job.outcome().is_none());
    }

    #[test]
    fn test_running_increments_attempt_and_keeps_first_start() {
        let mut job = job();
        let first = Utc::now();
        job.mark_running(first);
        assert_eq!(job.attempt(), 1);

        job.schedule_retry(None);
        job.mark_running(first + chrono::Duration::seconds(5));
        assert_eq!(job.attempt(), 2);
        assert_eq!(job.started_at(), Some(first));
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let mut job = job();
        assert_eq!(job.record_progress(10.0), None);

        job.mark_running(Utc::now());
        assert_eq!(job.record_progress(-5.0), None);
        assert_eq!(job.record_progress(40.0), Some(40.0));
        assert_eq!(job.record_progress(30.0), None);
        assert_eq!(job.record_progress(250.0), Some(RUNNING_PROGRESS_CEILING));
        assert_eq!(job.record_progress(f64::NAN), None);
        assert_eq!(job.progress(), RUNNING_PROGRESS_CEILING);
    }

    #[test]
    fn test_complete_sets_result_and_full_progress() {
        let mut job = job();
        job.mark_running(Utc::now());
        job.complete(7, Utc::now());

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.progress(), 100.0);
        assert_eq!(job.result(), Some(&7));
        assert!(job.error().is_none());
        assert!(job.duration().is_some());
        assert!(matches!(job.outcome(), Some(Ok(&7))));
    }

    #[test]
    fn test_fail_after_retries_reports_exhaustion() {
        let mut job = job();
        job.mark_running(Utc::now());
        job.schedule_retry(None);
        job.mark_running(Utc::now());
        job.fail("out of memory".into(), 0, Utc::now());

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.error(), Some("out of memory"));
        assert!(job.result().is_none());
        match job.outcome() {
            Some(Err(JobError::RetryExhausted { attempts, .. })) => assert_eq!(attempts, 2),
            other => panic!("Expected RetryExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_fail_first_attempt_reports_execution_error() {
        let mut job = job();
        job.mark_running(Utc::now());
        job.fail("bad seed".into(), 0, Utc::now());
        assert!(matches!(job.outcome(), Some(Err(JobError::Execution { .. }))));
    }

    #[test]
    fn test_cancel_carries_no_result_or_error() {
        let mut job = job();
        job.cancel(Utc::now());
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert_eq!(job.attempt(), 0);
        assert!(job.result().is_none());
        assert!(job.error().is_none());
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn test_retry_delay_blocks_readiness() {
        let mut job = job();
        let now = Instant::now();
        job.mark_running(Utc::now());
        job.schedule_retry(Some(now + std::time::Duration::from_secs(10)));

        assert!(!job.is_ready(now));
        assert!(job.is_ready(now + std::time::Duration::from_secs(10)));
    }

    #[test]
    fn test_resume_resets_progress() {
        let mut job = job();
        job.mark_running(Utc::now());
        job.record_progress(60.0);
        job.pause();
        assert_eq!(job.progress(), 60.0);

        job.resume();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.progress(), 0.0);
    }

    #[test]
    fn test_duplicate_gets_fresh_identity() {
        let mut original = job().with_tag("batch-1");
        original.mark_running(Utc::now());
        original.complete(1, Utc::now());

        let copy = original.duplicate();
        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.request(), original.request());
        assert_eq!(copy.tags(), original.tags());
        assert_eq!(copy.status(), JobStatus::Pending);
        assert_eq!(copy.attempt(), 0);
        assert!(copy.result().is_none());
    }

    #[test]
    fn test_job_serialization_skips_retry_deadline() {
        let job = job().with_id("job-1");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["id"], "job-1");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "normal");
        assert!(json.get("retry_at").is_none());
    }
}
