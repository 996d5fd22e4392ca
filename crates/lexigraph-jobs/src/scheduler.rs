//! Concurrency-bounded dispatcher for queued jobs.
//!
//! All job state lives behind a single mutex. Operations take the lock,
//! mutate, publish events, and release it; the lock is never held across an
//! `.await`. Executor calls run on spawned tasks and report back under the
//! same lock, so a late result is always matched against whatever happened
//! to the job in the meantime.

use crate::config::SchedulerConfig;
use crate::error::{ExecutionError, JobError, JobResult};
use crate::events::{EventBus, EventEnvelope, JobEvent, RunState};
use crate::executor::{Executor, ProgressReporter, ProgressSink};
use crate::job::{Job, JobId, JobStatus, Priority};
use crate::metrics::JobMetrics;
use crate::queue::JobQueue;
use crate::stats::{QueueStats, StatsAggregator};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Job type handled by a scheduler driving executor `E`.
pub type JobOf<E> = Job<<E as Executor>::Request, <E as Executor>::Output>;

/// What to do with an attempt's outcome once the executor returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Mark the job cancelled.
    Cancel,
    /// Mark the job paused.
    Pause,
    /// The job was already moved elsewhere; drop the outcome.
    Detach,
}

struct InFlight {
    attempt: u32,
    token: CancellationToken,
    started: std::time::Instant,
    interrupt: Option<Interrupt>,
}

struct State<R, O> {
    queue: JobQueue<R, O>,
    run_state: RunState,
    /// Executor calls that have not returned yet. Each one holds a slot,
    /// including detached calls whose job has already left `Running`.
    in_flight: HashMap<JobId, InFlight>,
    wakeup: Option<Instant>,
}

struct Inner<E: Executor> {
    id: String,
    config: SchedulerConfig,
    executor: E,
    runtime: Handle,
    state: Mutex<State<E::Request, E::Output>>,
    events: EventBus,
    stats: watch::Sender<QueueStats>,
    run_state: watch::Sender<RunState>,
}

/// Dispatches queued jobs to an [`Executor`] with bounded concurrency.
///
/// Cloning yields another handle to the same scheduler.
pub struct Scheduler<E: Executor> {
    inner: Arc<Inner<E>>,
}

impl<E: Executor> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Executor> Scheduler<E> {
    /// Creates an idle scheduler.
    ///
    /// Must be called from within a Tokio runtime; executor calls are spawned
    /// onto that runtime.
    pub fn new(executor: E, config: SchedulerConfig) -> JobResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            JobError::Configuration(format!("scheduler requires a Tokio runtime: {e}"))
        })?;

        let id = Uuid::new_v4().to_string();
        let (stats, _) = watch::channel(QueueStats::default());
        let (run_state, _) = watch::channel(RunState::Idle);

        info!(
            scheduler_id = %id,
            max_concurrent = config.max_concurrent,
            retry_strategy = ?config.retry.strategy,
            max_retries = config.retry.max_retries,
            "Scheduler created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                events: EventBus::new(config.event_capacity),
                config,
                executor,
                runtime,
                state: Mutex::new(State {
                    queue: JobQueue::new(),
                    run_state: RunState::Idle,
                    in_flight: HashMap::new(),
                    wakeup: None,
                }),
                stats,
                run_state,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn executor(&self) -> &E {
        &self.inner.executor
    }

    pub fn run_state(&self) -> RunState {
        self.inner.state.lock().run_state
    }

    /// Number of executor calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Subscribes to scheduler events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.inner.events.subscribe()
    }

    /// Latest stats, updated after every change.
    pub fn watch_stats(&self) -> watch::Receiver<QueueStats> {
        self.inner.stats.subscribe()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        StatsAggregator::compute(state.queue.all(), self.inner.config.max_concurrent)
    }

    /// Adds a new pending job.
    pub fn add(&self, request: E::Request, priority: Priority) -> JobResult<JobId> {
        self.add_job(Job::new(request, priority))
    }

    /// Adds a prepared job, for example one carrying tags or a fixed id.
    pub fn add_job(&self, job: JobOf<E>) -> JobResult<JobId> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let id = self.inner.enqueue(state, job)?;
        self.inner.settle(state);
        Ok(id)
    }

    /// Adds several jobs under one lock, so none is dispatched before all are queued.
    pub fn add_batch<I>(&self, requests: I) -> JobResult<Vec<JobId>>
    where
        I: IntoIterator<Item = (E::Request, Priority)>,
    {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let mut ids = Vec::new();
        for (request, priority) in requests {
            match self.inner.enqueue(state, Job::new(request, priority)) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    self.inner.settle(state);
                    return Err(e);
                }
            }
        }
        info!(scheduler_id = %self.inner.id, count = ids.len(), "Batch added");
        self.inner.settle(state);
        Ok(ids)
    }

    pub fn get(&self, id: &JobId) -> Option<JobOf<E>> {
        self.inner.state.lock().queue.get(id).cloned()
    }

    /// Snapshot of every job in insertion order.
    pub fn jobs(&self) -> Vec<JobOf<E>> {
        self.inner.state.lock().queue.snapshot()
    }

    /// Removes a job. A running job is cancelled first; its slot is released
    /// once the executor returns.
    pub fn remove(&self, id: &JobId) -> Option<JobOf<E>> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let job = state.queue.remove(id)?;
        if let Some(flight) = state.in_flight.get_mut(id) {
            flight.token.cancel();
            flight.interrupt = Some(Interrupt::Detach);
        }

        info!(scheduler_id = %self.inner.id, job_id = %id, status = %job.status(), "Job removed");
        self.inner
            .events
            .publish(JobEvent::JobRemoved { job_id: id.clone() });
        self.inner.settle(state);
        Some(job)
    }

    /// Enqueues a fresh pending copy of a job.
    pub fn duplicate(&self, id: &JobId) -> JobResult<JobId> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let new_id = state.queue.duplicate(id)?;
        if let Some(job) = state.queue.get(&new_id) {
            self.inner.job_added(job);
        }
        debug!(job_id = %id, copy_id = %new_id, "Job duplicated");
        self.inner.settle(state);
        Ok(new_id)
    }

    /// Removes every terminal job. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let removed = state.queue.clear_finished();
        for job in &removed {
            self.inner.events.publish(JobEvent::JobRemoved {
                job_id: job.id().clone(),
            });
        }
        if !removed.is_empty() {
            self.inner.settle(state);
        }
        removed.len()
    }

    /// Starts or resumes dispatching.
    pub fn start(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.run_state == RunState::Running {
            return;
        }
        self.inner.set_run_state(state, RunState::Running);
        self.inner.settle(state);
    }

    /// Stops dispatching new jobs. Running jobs finish normally.
    pub fn pause(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.run_state != RunState::Running {
            return;
        }
        let next = if state.in_flight.is_empty() {
            RunState::Idle
        } else {
            RunState::Draining
        };
        self.inner.set_run_state(state, next);
        self.inner.settle(state);
    }

    /// Stops dispatching and interrupts every running job.
    ///
    /// Running jobs go back to `Pending` with progress reset; the outcome of
    /// their interrupted calls is discarded. Jobs with a cancel or pause
    /// already requested settle into `Cancelled` or `Paused`.
    pub fn stop(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let now = Utc::now();
        let mut transitions = Vec::new();

        for (id, flight) in &mut state.in_flight {
            if flight.interrupt == Some(Interrupt::Detach) {
                continue;
            }
            flight.token.cancel();
            let requested = flight.interrupt.replace(Interrupt::Detach);

            let Some(job) = state.queue.get_mut(id) else {
                continue;
            };
            let to = match requested {
                Some(Interrupt::Cancel) => {
                    job.cancel(now);
                    JobMetrics::job_cancelled();
                    JobStatus::Cancelled
                }
                Some(Interrupt::Pause) => {
                    job.pause();
                    JobStatus::Paused
                }
                Some(Interrupt::Detach) | None => {
                    job.mark_pending();
                    JobStatus::Pending
                }
            };
            transitions.push((id.clone(), to, job.attempt()));
        }

        info!(
            scheduler_id = %self.inner.id,
            interrupted = transitions.len(),
            "Scheduler stopped"
        );
        for (id, to, attempt) in transitions {
            self.inner
                .status_changed(&id, JobStatus::Running, to, attempt);
        }

        self.inner.set_run_state(state, RunState::Idle);
        self.inner.settle(state);
    }

    /// Cancels a job.
    ///
    /// Pending and paused jobs are cancelled immediately. A running job is
    /// signalled and becomes `Cancelled` once its executor call returns; any
    /// result it produces is discarded. Returns false if the job is unknown
    /// or already terminal.
    pub fn cancel(&self, id: &JobId) -> bool {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let Some(job) = state.queue.get_mut(id) else {
            return false;
        };

        match job.status() {
            from @ (JobStatus::Pending | JobStatus::Paused) => {
                job.cancel(Utc::now());
                let attempt = job.attempt();
                info!(job_id = %id, from = %from, "Job cancelled");
                JobMetrics::job_cancelled();
                self.inner
                    .status_changed(id, from, JobStatus::Cancelled, attempt);
                self.inner.settle(state);
                true
            }
            JobStatus::Running => {
                if let Some(flight) = state.in_flight.get_mut(id) {
                    flight.token.cancel();
                    flight.interrupt = Some(Interrupt::Cancel);
                }
                info!(job_id = %id, "Cancellation requested for running job");
                true
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }

    /// Holds a job back from dispatch.
    ///
    /// A running job is interrupted and becomes `Paused` once its executor
    /// call returns.
    pub fn pause_job(&self, id: &JobId) -> JobResult<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let job = state
            .queue
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;

        match job.status() {
            JobStatus::Paused => Ok(()),
            JobStatus::Pending => {
                job.pause();
                let attempt = job.attempt();
                debug!(job_id = %id, "Job paused");
                self.inner
                    .status_changed(id, JobStatus::Pending, JobStatus::Paused, attempt);
                self.inner.settle(state);
                Ok(())
            }
            JobStatus::Running => {
                if let Some(flight) = state.in_flight.get_mut(id) {
                    if flight.interrupt.is_none() {
                        flight.token.cancel();
                        flight.interrupt = Some(Interrupt::Pause);
                    }
                }
                debug!(job_id = %id, "Pause requested for running job");
                Ok(())
            }
            actual => Err(JobError::InvalidState {
                job_id: id.clone(),
                expected: "pending or running".to_string(),
                actual,
            }),
        }
    }

    /// Returns a paused job to the queue with progress reset.
    pub fn resume_job(&self, id: &JobId) -> JobResult<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        let job = state
            .queue
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?;

        if job.status() != JobStatus::Paused {
            return Err(JobError::InvalidState {
                job_id: id.clone(),
                expected: JobStatus::Paused.to_string(),
                actual: job.status(),
            });
        }

        job.resume();
        let attempt = job.attempt();
        debug!(job_id = %id, "Job resumed");
        self.inner
            .status_changed(id, JobStatus::Paused, JobStatus::Pending, attempt);
        self.inner.settle(state);
        Ok(())
    }

    /// Waits until no job is pending or running.
    ///
    /// Never returns while pending jobs remain and the scheduler is not
    /// started.
    pub async fn wait_for_completion(&self) {
        let mut rx = self.inner.stats.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(QueueStats::is_settled).await;
    }

    /// Waits until the scheduler reaches [`RunState::Idle`].
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.run_state.subscribe();
        let _ = rx.wait_for(|state| *state == RunState::Idle).await;
    }
}

impl<E: Executor> Inner<E> {
    fn enqueue(
        &self,
        state: &mut State<E::Request, E::Output>,
        job: JobOf<E>,
    ) -> JobResult<JobId> {
        let id = state.queue.enqueue(job)?;
        if let Some(job) = state.queue.get(&id) {
            self.job_added(job);
        }
        Ok(id)
    }

    fn job_added(&self, job: &JobOf<E>) {
        debug!(scheduler_id = %self.id, job_id = %job.id(), priority = %job.priority(), "Job added");
        JobMetrics::job_enqueued(job.priority());
        self.events.publish(JobEvent::JobAdded {
            job_id: job.id().clone(),
            priority: job.priority(),
        });
    }

    fn status_changed(&self, job_id: &JobId, from: JobStatus, to: JobStatus, attempt: u32) {
        self.events.publish(JobEvent::JobStatusChanged {
            job_id: job_id.clone(),
            from,
            to,
            attempt,
        });
    }

    fn set_run_state(&self, state: &mut State<E::Request, E::Output>, to: RunState) {
        let from = state.run_state;
        if from == to {
            return;
        }
        state.run_state = to;
        info!(scheduler_id = %self.id, from = %from, to = %to, "Scheduler state changed");
        self.events
            .publish(JobEvent::SchedulerStateChanged { from, to });
        self.run_state.send_replace(to);
    }

    fn publish_stats(&self, state: &State<E::Request, E::Output>) {
        let stats = StatsAggregator::compute(state.queue.all(), self.config.max_concurrent);
        JobMetrics::update_queue_sizes(
            stats.counts.pending,
            stats.counts.running,
            stats.counts.paused,
        );
        self.events.publish(JobEvent::StatsUpdated {
            stats: stats.clone(),
        });
        self.stats.send_replace(stats);
    }

    /// Refills slots, finishes draining, and publishes stats.
    fn settle(self: &Arc<Self>, state: &mut State<E::Request, E::Output>) {
        self.fill_slots(state);
        if state.run_state == RunState::Draining && state.in_flight.is_empty() {
            self.set_run_state(state, RunState::Idle);
        }
        self.publish_stats(state);
    }

    fn fill_slots(self: &Arc<Self>, state: &mut State<E::Request, E::Output>) {
        if state.run_state != RunState::Running {
            return;
        }

        let now = Instant::now();
        while state.in_flight.len() < self.config.max_concurrent {
            let in_flight = &state.in_flight;
            let Some(job_id) = state
                .queue
                .next_ready(now, |job| !in_flight.contains_key(job.id()))
                .map(|job| job.id().clone())
            else {
                break;
            };
            self.dispatch(state, job_id);
        }

        if state.in_flight.len() < self.config.max_concurrent {
            if let Some(deadline) = state.queue.next_retry_deadline(now) {
                self.arm_wakeup(state, deadline);
            }
        }
    }

    /// Schedules a slot refill for when a retry backoff expires.
    fn arm_wakeup(self: &Arc<Self>, state: &mut State<E::Request, E::Output>, deadline: Instant) {
        if state.wakeup.is_some_and(|armed| armed <= deadline) {
            return;
        }
        state.wakeup = Some(deadline);

        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            if state.wakeup == Some(deadline) {
                state.wakeup = None;
            }
            inner.settle(state);
        });
    }

    fn dispatch(self: &Arc<Self>, state: &mut State<E::Request, E::Output>, job_id: JobId) {
        let Some(job) = state.queue.get_mut(&job_id) else {
            return;
        };

        let from = job.status();
        let first_attempt = job.attempt() == 0;
        let now = Utc::now();
        job.mark_running(now);

        let attempt = job.attempt();
        let priority = job.priority();
        let request = job.request().clone();
        let wait = if first_attempt {
            (now - job.created_at()).to_std().ok()
        } else {
            None
        };

        let token = CancellationToken::new();
        state.in_flight.insert(
            job_id.clone(),
            InFlight {
                attempt,
                token: token.clone(),
                started: std::time::Instant::now(),
                interrupt: None,
            },
        );

        info!(scheduler_id = %self.id, job_id = %job_id, attempt, priority = %priority, "Job started");
        JobMetrics::job_started(priority, wait);
        self.status_changed(&job_id, from, JobStatus::Running, attempt);

        let sink: Arc<dyn ProgressSink> = Arc::clone(self) as Arc<dyn ProgressSink>;
        let reporter = ProgressReporter::new(job_id.clone(), attempt, sink);
        let inner = Arc::clone(self);
        let span = info_span!("generation", job_id = %job_id, attempt);

        self.runtime.spawn(
            async move {
                let call = inner.executor.execute(request, reporter, token);
                let outcome = match AssertUnwindSafe(call).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        error!(job_id = %job_id, "Executor panicked");
                        Err(ExecutionError::failed("executor panicked"))
                    }
                };
                inner.finish(&job_id, attempt, outcome);
            }
            .instrument(span),
        );
    }

    /// Applies an attempt's outcome and frees its slot.
    fn finish(
        self: &Arc<Self>,
        job_id: &JobId,
        attempt: u32,
        outcome: Result<E::Output, ExecutionError>,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(flight) = state.in_flight.remove(job_id) else {
            return;
        };
        let elapsed = flight.started.elapsed();

        match (flight.interrupt, state.queue.get_mut(job_id)) {
            (_, None) | (Some(Interrupt::Detach), Some(_)) => {
                debug!(job_id = %job_id, attempt, "Discarding outcome of detached attempt");
            }
            (Some(Interrupt::Cancel), Some(job)) => {
                job.cancel(Utc::now());
                info!(job_id = %job_id, attempt, "Job cancelled");
                JobMetrics::job_cancelled();
                self.status_changed(job_id, JobStatus::Running, JobStatus::Cancelled, attempt);
            }
            (Some(Interrupt::Pause), Some(job)) => {
                job.pause();
                debug!(job_id = %job_id, attempt, "Job paused");
                self.status_changed(job_id, JobStatus::Running, JobStatus::Paused, attempt);
            }
            (None, Some(job)) => self.apply_outcome(job, attempt, outcome, elapsed),
        }

        self.settle(state);
    }

    fn apply_outcome(
        &self,
        job: &mut JobOf<E>,
        attempt: u32,
        outcome: Result<E::Output, ExecutionError>,
        elapsed: std::time::Duration,
    ) {
        let job_id = job.id().clone();
        let now = Utc::now();

        let to = match outcome {
            Ok(output) => {
                job.complete(output, now);
                info!(job_id = %job_id, attempt, elapsed = ?elapsed, "Job completed");
                JobMetrics::job_completed(elapsed);
                JobStatus::Completed
            }
            Err(ExecutionError::Cancelled) => {
                job.cancel(now);
                info!(job_id = %job_id, attempt, "Executor gave up; job cancelled");
                JobMetrics::job_cancelled();
                JobStatus::Cancelled
            }
            Err(err) => {
                let retryable = err.is_retryable();
                let policy = &self.config.retry;

                if retryable && policy.should_retry(attempt) {
                    let delay = policy.delay_for_attempt(attempt);
                    let retry_at = (!delay.is_zero()).then(|| Instant::now() + delay);
                    job.schedule_retry(retry_at);
                    warn!(
                        job_id = %job_id,
                        attempt,
                        error = %err,
                        retry_in = ?delay,
                        "Job attempt failed, retrying"
                    );
                    JobMetrics::job_retried(attempt);
                    JobStatus::Pending
                } else {
                    let remaining = if retryable { policy.remaining_after(attempt) } else { 0 };
                    job.fail(err.to_string(), remaining, now);
                    if retryable && attempt > 1 {
                        error!(job_id = %job_id, attempts = attempt, error = %err, "Job failed, retries exhausted");
                    } else {
                        warn!(job_id = %job_id, attempt, error = %err, retryable, "Job failed");
                    }
                    JobMetrics::job_failed(retryable, elapsed);
                    JobStatus::Failed
                }
            }
        };

        self.status_changed(&job_id, JobStatus::Running, to, attempt);
    }
}

impl<E: Executor> ProgressSink for Inner<E> {
    fn report(&self, job_id: &JobId, attempt: u32, percent: f64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let current = state
            .in_flight
            .get(job_id)
            .is_some_and(|flight| flight.attempt == attempt && flight.interrupt.is_none());
        if !current {
            return;
        }

        let Some(progress) = state
            .queue
            .get_mut(job_id)
            .and_then(|job| job.record_progress(percent))
        else {
            return;
        };

        self.events.publish(JobEvent::JobProgress {
            job_id: job_id.clone(),
            progress,
        });
        self.publish_stats(state);
    }
}
