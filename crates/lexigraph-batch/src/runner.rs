//! Drives one batch of prompts through the scheduler.

use crate::prompts::PromptLine;
use lexigraph_config::AppConfig;
use lexigraph_core::ErrorReport;
use lexigraph_jobs::{
    EventEnvelope, GenerationRequest, JobEvent, JobOf, JobStatus, Priority, QueueStats, Scheduler,
    SchedulerConfig, SimulatedExecutor, StylePreset,
};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Knobs for the simulated generation backend.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub step_delay: Duration,
    pub fail_every: Option<u64>,
    pub style: Option<StylePreset>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(25),
            fail_every: None,
            style: None,
        }
    }
}

/// A prompt that never reached the queue.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPrompt {
    pub line: usize,
    pub error: ErrorReport,
}

/// Final state of one job, as printed by the runner.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub prompt: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl From<&JobOf<SimulatedExecutor>> for JobSummary {
    fn from(job: &JobOf<SimulatedExecutor>) -> Self {
        Self {
            id: job.id().to_string(),
            prompt: job.request().prompt.clone(),
            priority: job.priority(),
            status: job.status(),
            attempts: job.attempt(),
            image_id: job.result().map(|output| output.image_id.clone()),
            error: job.error().map(str::to_string),
            duration_ms: job
                .duration()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub interrupted: bool,
    pub stats: QueueStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPrompt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<JobSummary>,
}

/// Turns prompt lines into validated requests, collecting the rejects.
pub fn build_requests(
    prompts: &[PromptLine],
    config: &AppConfig,
    style: Option<StylePreset>,
) -> (Vec<(GenerationRequest, Priority)>, Vec<SkippedPrompt>) {
    let mut accepted = Vec::with_capacity(prompts.len());
    let mut skipped = Vec::new();

    for line in prompts {
        let mut request = GenerationRequest::from_defaults(line.prompt.clone(), &config.generation);
        if let Some(style) = style {
            request = request.with_style(style);
        }

        match request.check(&config.generation) {
            Ok(()) => accepted.push((request, line.priority)),
            Err(e) => skipped.push(SkippedPrompt {
                line: line.line,
                error: ErrorReport::from(&e),
            }),
        }
    }

    (accepted, skipped)
}

/// Runs `prompts` to completion, or until `shutdown` resolves.
///
/// On shutdown the scheduler is stopped: running jobs go back to pending and
/// the report reflects the queue at that moment.
pub async fn run_batch<F>(
    config: &AppConfig,
    prompts: &[PromptLine],
    options: &BatchOptions,
    shutdown: F,
) -> anyhow::Result<BatchReport>
where
    F: Future<Output = ()>,
{
    let (requests, skipped) = build_requests(prompts, config, options.style);
    for skip in &skipped {
        warn!(line = skip.line, error = %skip.error.message, "Skipping prompt");
    }

    let mut executor = SimulatedExecutor::new(options.step_delay);
    if let Some(n) = options.fail_every {
        executor = executor.with_failure_every(n);
    }

    let scheduler = Scheduler::new(executor, SchedulerConfig::from(&config.batch))?;
    let logger = tokio::spawn(log_events(scheduler.subscribe()));

    let ids = scheduler.add_batch(requests)?;
    info!(
        scheduler_id = %scheduler.id(),
        jobs = ids.len(),
        skipped = skipped.len(),
        max_concurrent = scheduler.config().max_concurrent,
        "Starting batch"
    );
    scheduler.start();

    let interrupted = tokio::select! {
        () = scheduler.wait_for_completion() => false,
        () = shutdown => {
            warn!("Shutdown requested, stopping scheduler");
            scheduler.stop();
            true
        }
    };

    let stats = scheduler.stats();
    let jobs = scheduler.jobs().iter().map(JobSummary::from).collect();
    logger.abort();

    info!(
        completed = stats.counts.completed,
        failed = stats.counts.failed,
        pending = stats.counts.pending,
        interrupted,
        "Batch finished"
    );

    Ok(BatchReport {
        interrupted,
        stats,
        skipped,
        jobs,
    })
}

async fn log_events(mut events: broadcast::Receiver<EventEnvelope>) {
    loop {
        match events.recv().await {
            Ok(envelope) => match envelope.event {
                JobEvent::JobStatusChanged {
                    job_id,
                    from,
                    to,
                    attempt,
                } => match to {
                    JobStatus::Failed => warn!(%job_id, %from, attempt, "Job failed"),
                    _ => info!(%job_id, %from, %to, attempt, "Job status changed"),
                },
                JobEvent::JobProgress { job_id, progress } => {
                    debug!(%job_id, progress, "Job progress");
                }
                JobEvent::SchedulerStateChanged { from, to } => {
                    info!(%from, %to, "Scheduler state changed");
                }
                _ => {}
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::parse_line;

    fn prompts(lines: &[&str]) -> Vec<PromptLine> {
        lines
            .iter()
            .enumerate()
            .filter_map(|(i, line)| parse_line(i + 1, line, Priority::Normal))
            .collect()
    }

    fn fast() -> BatchOptions {
        BatchOptions {
            step_delay: Duration::ZERO,
            ..BatchOptions::default()
        }
    }

    #[test]
    fn test_build_requests_applies_defaults_and_style() {
        let mut config = AppConfig::default();
        config.generation.default_steps = 12;

        let (accepted, skipped) =
            build_requests(&prompts(&["high: a red fox"]), &config, Some(StylePreset::Anime));

        assert!(skipped.is_empty());
        let (request, priority) = &accepted[0];
        assert_eq!(*priority, Priority::High);
        assert_eq!(request.steps, 12);
        assert_eq!(request.style, Some(StylePreset::Anime));
    }

    #[test]
    fn test_build_requests_skips_overlong_prompt() {
        let long = "a".repeat(600);
        let (accepted, skipped) =
            build_requests(&prompts(&["a red fox", &long]), &AppConfig::default(), None);

        assert_eq!(accepted.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 2);
        assert_eq!(skipped[0].error.code, "VALIDATION_ERROR");
        assert_eq!(skipped[0].error.fields[0].field, "prompt");
    }

    #[tokio::test]
    async fn test_run_batch_completes_every_job() {
        let mut config = AppConfig::default();
        config.batch.max_concurrent = 2;

        let report = run_batch(
            &config,
            &prompts(&["a red fox", "low: misty forest", "high: lighthouse"]),
            &fast(),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert!(!report.interrupted);
        assert_eq!(report.stats.counts.completed, 3);
        assert_eq!(report.stats.success_rate, Some(1.0));
        assert!(report.jobs.iter().all(|job| job.image_id.is_some()));
    }

    #[tokio::test]
    async fn test_run_batch_reports_failures_without_retry() {
        let options = BatchOptions {
            fail_every: Some(1),
            ..fast()
        };

        let report = run_batch(
            &AppConfig::default(),
            &prompts(&["a red fox", "a blue fox"]),
            &options,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(report.stats.counts.failed, 2);
        assert!(report
            .jobs
            .iter()
            .all(|job| job.attempts == 1 && job.error.is_some()));
    }

    #[tokio::test]
    async fn test_run_batch_retries_when_configured() {
        let mut config = AppConfig::default();
        config.batch.auto_retry = true;
        config.batch.max_retries = 1;
        config.batch.retry_backoff_ms = 1;
        let options = BatchOptions {
            fail_every: Some(2),
            ..fast()
        };

        let report = run_batch(&config, &prompts(&["a red fox"]), &options, std::future::pending())
            .await
            .unwrap();

        // First call succeeds; nothing to retry.
        assert_eq!(report.stats.counts.completed, 1);
        assert_eq!(report.jobs[0].attempts, 1);

        let report = run_batch(
            &config,
            &prompts(&["a red fox", "a blue fox"]),
            &options,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(report.stats.counts.completed, 2);
        assert_eq!(report.jobs.iter().map(|job| job.attempts).sum::<u32>(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_batch() {
        let options = BatchOptions {
            step_delay: Duration::from_secs(60),
            ..BatchOptions::default()
        };

        let report = run_batch(
            &AppConfig::default(),
            &prompts(&["a red fox", "a blue fox"]),
            &options,
            async {},
        )
        .await
        .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.stats.counts.pending, 2);
        assert_eq!(report.stats.counts.running, 0);
    }
}
