//! Aggregate statistics over a set of jobs.

use crate::job::{Job, JobStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Paused => self.paused,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    fn increment(&mut self, status: JobStatus) {
        let slot = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Paused => &mut self.paused,
            JobStatus::Cancelled => &mut self.cancelled,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// Snapshot of queue health for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub counts: StatusCounts,
    pub total: usize,
    /// `completed / (completed + failed)`, absent until something has finished.
    pub success_rate: Option<f64>,
    /// Mean `finished_at - started_at` over completed jobs.
    ///
    /// `started_at` is the first attempt's start, so a job that was retried
    /// counts every attempt plus the backoff waits between them. The
    /// remaining-time estimate inherits this.
    pub average_duration: Option<Duration>,
    /// `average_duration * pending / concurrency`.
    pub estimated_time_remaining: Option<Duration>,
    /// Completed jobs per minute across the observed run window.
    pub throughput_per_minute: Option<f64>,
    /// Mean progress across all jobs, with terminal jobs counted as done.
    pub overall_progress: f64,
}

impl QueueStats {
    /// True when nothing is waiting for or holding a slot.
    pub fn is_settled(&self) -> bool {
        self.counts.pending == 0 && self.counts.running == 0
    }
}

/// Computes [`QueueStats`] from a job list. Pure: no caching, no side effects.
pub struct StatsAggregator;

impl StatsAggregator {
    /// Computes stats. `concurrency` scales the remaining-time estimate and is
    /// treated as at least 1.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute<'a, R, O, I>(jobs: I, concurrency: usize) -> QueueStats
    where
        R: 'a,
        O: 'a,
        I: IntoIterator<Item = &'a Job<R, O>>,
    {
        let mut counts = StatusCounts::default();
        let mut completed_total = Duration::ZERO;
        let mut completed_timed: u32 = 0;
        let mut progress_sum = 0.0;
        let mut window_start = None;
        let mut window_end = None;

        for job in jobs {
            counts.increment(job.status());

            progress_sum += if job.is_terminal() {
                100.0
            } else {
                job.progress()
            };

            if let Some(started) = job.started_at() {
                window_start = Some(window_start.map_or(started, |s: chrono::DateTime<_>| s.min(started)));
            }

            if job.status() == JobStatus::Completed {
                if let Some(duration) = job.duration() {
                    completed_total += duration;
                    completed_timed += 1;
                }
                if let Some(finished) = job.finished_at() {
                    window_end =
                        Some(window_end.map_or(finished, |e: chrono::DateTime<_>| e.max(finished)));
                }
            }
        }

        let total = counts.total();

        let finished = counts.completed + counts.failed;
        let success_rate = (finished > 0).then(|| counts.completed as f64 / finished as f64);

        let average_duration = (completed_timed > 0).then(|| completed_total / completed_timed);

        let estimated_time_remaining = average_duration.map(|avg| {
            let slots = u32::try_from(concurrency.max(1)).unwrap_or(u32::MAX);
            let pending = u32::try_from(counts.pending).unwrap_or(u32::MAX);
            avg.saturating_mul(pending) / slots
        });

        let throughput_per_minute = match (window_start, window_end) {
            (Some(start), Some(end)) if counts.completed > 0 => (end - start)
                .to_std()
                .ok()
                .filter(|window| !window.is_zero())
                .map(|window| counts.completed as f64 / (window.as_secs_f64() / 60.0)),
            _ => None,
        };

        let overall_progress = if total == 0 {
            0.0
        } else {
            progress_sum / total as f64
        };

        QueueStats {
            counts,
            total,
            success_rate,
            average_duration,
            estimated_time_remaining,
            throughput_per_minute,
            overall_progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Priority;
    use chrono::{TimeZone, Utc};

    type TestJob = Job<u32, u32>;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn completed(start: i64, end: i64) -> TestJob {
        let mut job = Job::new(0, Priority::Normal);
        job.mark_running(at(start));
        job.complete(1, at(end));
        job
    }

    fn failed(start: i64, end: i64) -> TestJob {
        let mut job = Job::new(0, Priority::Normal);
        job.mark_running(at(start));
        job.fail("boom".into(), 0, at(end));
        job
    }

    #[test]
    fn test_empty() {
        let stats = StatsAggregator::compute(Vec::<&TestJob>::new(), 2);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, None);
        assert_eq!(stats.average_duration, None);
        assert_eq!(stats.estimated_time_remaining, None);
        assert_eq!(stats.throughput_per_minute, None);
        assert_eq!(stats.overall_progress, 0.0);
        assert!(stats.is_settled());
    }

    #[test]
    fn test_counts_sum_to_total() {
        let mut paused = Job::new(0, Priority::Low);
        paused.pause();
        let mut cancelled = Job::new(0, Priority::Low);
        cancelled.cancel(at(0));
        let mut running = Job::new(0, Priority::Low);
        running.mark_running(at(0));

        let jobs: Vec<TestJob> = vec![
            Job::new(0, Priority::Normal),
            running,
            completed(0, 10),
            failed(0, 5),
            paused,
            cancelled,
        ];
        let stats = StatsAggregator::compute(&jobs, 1);

        for status in JobStatus::ALL {
            assert_eq!(stats.counts.get(status), 1, "{status}");
        }
        assert_eq!(stats.total, jobs.len());
        assert!(!stats.is_settled());
    }

    #[test]
    fn test_success_rate_ignores_cancelled() {
        let mut cancelled = Job::new(0, Priority::Normal);
        cancelled.cancel(at(0));
        let jobs = vec![completed(0, 10), completed(0, 10), completed(0, 10), failed(0, 1), cancelled];

        let stats = StatsAggregator::compute(&jobs, 1);
        assert_eq!(stats.success_rate, Some(0.75));
    }

    #[test]
    fn test_average_duration_over_completed_only() {
        let jobs = vec![completed(0, 10), completed(0, 20), failed(0, 1000)];
        let stats = StatsAggregator::compute(&jobs, 1);
        assert_eq!(stats.average_duration, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_average_duration_spans_retries() {
        let mut retried: TestJob = Job::new(0, Priority::Normal);
        retried.mark_running(at(0));
        retried.fail("boom".into(), 1, at(5));
        retried.schedule_retry(None);
        retried.mark_running(at(30));
        retried.complete(1, at(40));

        let stats = StatsAggregator::compute(&[retried], 1);
        assert_eq!(stats.average_duration, Some(Duration::from_secs(40)));
    }

    #[test]
    fn test_eta_scales_with_pending_and_concurrency() {
        let mut jobs = vec![completed(0, 10), completed(0, 20)];
        for _ in 0..4 {
            jobs.push(Job::new(0, Priority::Normal));
        }

        let single = StatsAggregator::compute(&jobs, 1);
        assert_eq!(single.estimated_time_remaining, Some(Duration::from_secs(60)));

        let double = StatsAggregator::compute(&jobs, 2);
        assert_eq!(double.estimated_time_remaining, Some(Duration::from_secs(30)));

        let zero = StatsAggregator::compute(&jobs, 0);
        assert_eq!(zero.estimated_time_remaining, single.estimated_time_remaining);
    }

    #[test]
    fn test_eta_absent_without_completed_jobs() {
        let jobs: Vec<TestJob> = vec![Job::new(0, Priority::Normal)];
        assert_eq!(StatsAggregator::compute(&jobs, 1).estimated_time_remaining, None);
    }

    #[test]
    fn test_throughput() {
        let jobs = vec![completed(0, 30), completed(30, 60), completed(60, 120)];
        let stats = StatsAggregator::compute(&jobs, 1);
        let throughput = stats.throughput_per_minute.unwrap();
        assert!((throughput - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_overall_progress_counts_terminal_as_done() {
        let mut running: TestJob = Job::new(0, Priority::Normal);
        running.mark_running(at(0));
        running.record_progress(50.0);
        let jobs = vec![running, completed(0, 1), Job::new(0, Priority::Normal), failed(0, 1)];

        let stats = StatsAggregator::compute(&jobs, 1);
        assert!((stats.overall_progress - 62.5).abs() < 1e-9);
    }
}
