//! Metrics for batch queue monitoring.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! host process installs a recorder.

use crate::job::Priority;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the batch queue.
pub mod names {
    /// Total jobs added.
    pub const JOBS_ENQUEUED_TOTAL: &str = "lexigraph_jobs_enqueued_total";
    /// Total attempts started.
    pub const JOBS_STARTED_TOTAL: &str = "lexigraph_jobs_started_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "lexigraph_jobs_completed_total";
    /// Total jobs failed for good.
    pub const JOBS_FAILED_TOTAL: &str = "lexigraph_jobs_failed_total";
    /// Total retries scheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "lexigraph_jobs_retried_total";
    /// Total jobs cancelled.
    pub const JOBS_CANCELLED_TOTAL: &str = "lexigraph_jobs_cancelled_total";

    /// Current pending jobs.
    pub const JOBS_PENDING: &str = "lexigraph_jobs_pending";
    /// Current running jobs.
    pub const JOBS_RUNNING: &str = "lexigraph_jobs_running";
    /// Current paused jobs.
    pub const JOBS_PAUSED: &str = "lexigraph_jobs_paused";

    /// Attempt duration in seconds.
    pub const ATTEMPT_DURATION_SECONDS: &str = "lexigraph_job_attempt_duration_seconds";
    /// Time from creation to first start in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "lexigraph_job_wait_time_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs added");
    describe_counter!(names::JOBS_STARTED_TOTAL, "Total number of attempts started");
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed after all attempts"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of retries scheduled");
    describe_counter!(names::JOBS_CANCELLED_TOTAL, "Total number of jobs cancelled");

    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_gauge!(names::JOBS_RUNNING, "Current number of running jobs");
    describe_gauge!(names::JOBS_PAUSED, "Current number of paused jobs");

    describe_histogram!(
        names::ATTEMPT_DURATION_SECONDS,
        "Duration of a single executor attempt in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time between job creation and first start in seconds"
    );
}

/// Job metrics recorder.
pub struct JobMetrics;

impl JobMetrics {
    pub fn job_enqueued(priority: Priority) {
        counter!(names::JOBS_ENQUEUED_TOTAL, "priority" => priority.as_str()).increment(1);
    }

    /// Record an attempt starting. `wait` is only known for first attempts.
    pub fn job_started(priority: Priority, wait: Option<Duration>) {
        counter!(names::JOBS_STARTED_TOTAL, "priority" => priority.as_str()).increment(1);
        if let Some(wait) = wait {
            histogram!(names::JOB_WAIT_TIME_SECONDS).record(wait.as_secs_f64());
        }
    }

    pub fn job_completed(attempt_duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
        histogram!(names::ATTEMPT_DURATION_SECONDS, "outcome" => "completed")
            .record(attempt_duration.as_secs_f64());
    }

    pub fn job_failed(retryable: bool, attempt_duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "retryable" => if retryable { "true" } else { "false" }
        )
        .increment(1);
        histogram!(names::ATTEMPT_DURATION_SECONDS, "outcome" => "failed")
            .record(attempt_duration.as_secs_f64());
    }

    pub fn job_retried(attempt: u32) {
        counter!(names::JOBS_RETRIED_TOTAL, "attempt" => attempt.to_string()).increment(1);
    }

    pub fn job_cancelled() {
        counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
    }

    /// Update status gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_queue_sizes(pending: usize, running: usize, paused: usize) {
        gauge!(names::JOBS_PENDING).set(pending as f64);
        gauge!(names::JOBS_RUNNING).set(running as f64);
        gauge!(names::JOBS_PAUSED).set(paused as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            names::JOBS_ENQUEUED_TOTAL,
            names::JOBS_STARTED_TOTAL,
            names::JOBS_COMPLETED_TOTAL,
            names::JOBS_FAILED_TOTAL,
            names::JOBS_RETRIED_TOTAL,
            names::JOBS_CANCELLED_TOTAL,
            names::JOBS_PENDING,
            names::JOBS_RUNNING,
            names::JOBS_PAUSED,
            names::ATTEMPT_DURATION_SECONDS,
            names::JOB_WAIT_TIME_SECONDS,
        ] {
            assert!(name.starts_with("lexigraph_"), "{name}");
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metrics();
        JobMetrics::job_enqueued(Priority::High);
        JobMetrics::job_started(Priority::High, Some(Duration::from_millis(5)));
        JobMetrics::job_completed(Duration::from_secs(1));
        JobMetrics::job_failed(true, Duration::from_secs(1));
        JobMetrics::job_retried(2);
        JobMetrics::job_cancelled();
        JobMetrics::update_queue_sizes(3, 1, 0);
    }
}
