//! The pluggable step that turns a request into an output.
//!
//! The scheduler owns when and how often an executor runs; the executor
//! owns what a single attempt does. Executors report progress through a
//! [`ProgressReporter`] and should stop early when the supplied
//! [`CancellationToken`] fires.

use crate::error::ExecutionError;
use crate::job::JobId;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs one attempt of a job.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Opaque request carried by each job.
    type Request: Clone + Send + Sync + 'static;
    /// Output stored on completed jobs.
    type Output: Clone + Send + Sync + 'static;

    /// Executes one attempt.
    async fn execute(
        &self,
        request: Self::Request,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Self::Output, ExecutionError>;
}

/// Receives progress reports from running attempts.
pub trait ProgressSink: Send + Sync {
    fn report(&self, job_id: &JobId, attempt: u32, percent: f64);
}

struct NoopSink;

impl ProgressSink for NoopSink {
    fn report(&self, _job_id: &JobId, _attempt: u32, _percent: f64) {}
}

/// Handle an executor uses to report progress for the attempt it is running.
///
/// Reports for an attempt that is no longer current are ignored.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    attempt: u32,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, attempt: u32, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            job_id,
            attempt,
            sink,
        }
    }

    /// A reporter that discards every report.
    pub fn noop(job_id: JobId) -> Self {
        Self::new(job_id, 0, Arc::new(NoopSink))
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reports progress as a percentage. Values are clamped to `[0, 100]`.
    pub fn report(&self, percent: f64) {
        self.sink.report(&self.job_id, self.attempt, percent);
    }

    /// Reports `done` out of `total` steps.
    pub fn report_steps(&self, done: u32, total: u32) {
        if total > 0 {
            self.report(f64::from(done) * 100.0 / f64::from(total));
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Boxed future returned by closures wrapped in [`FnExecutor`].
pub type ExecuteFuture<O> = BoxFuture<'static, Result<O, ExecutionError>>;

/// Adapts a closure into an [`Executor`].
pub struct FnExecutor<Req, Out, F> {
    handler: F,
    _marker: PhantomData<fn(Req) -> Out>,
}

impl<Req, Out, F> FnExecutor<Req, Out, F>
where
    F: Fn(Req, ProgressReporter, CancellationToken) -> ExecuteFuture<Out> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<Req, Out, F> Executor for FnExecutor<Req, Out, F>
where
    Req: Clone + Send + Sync + 'static,
    Out: Clone + Send + Sync + 'static,
    F: Fn(Req, ProgressReporter, CancellationToken) -> ExecuteFuture<Out> + Send + Sync + 'static,
{
    type Request = Req;
    type Output = Out;

    async fn execute(
        &self,
        request: Req,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Out, ExecutionError> {
        (self.handler)(request, progress, cancel).await
    }
}

/// Bounds every attempt of the wrapped executor by a fixed duration.
///
/// An attempt that runs past the limit fails with
/// [`ExecutionError::Timeout`], which the retry policy treats as retryable.
pub struct TimeoutExecutor<E> {
    inner: E,
    timeout: Duration,
}

impl<E: Executor> TimeoutExecutor<E> {
    pub fn new(inner: E, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<E: Executor> Executor for TimeoutExecutor<E> {
    type Request = E::Request;
    type Output = E::Output;

    async fn execute(
        &self,
        request: Self::Request,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<Self::Output, ExecutionError> {
        let attempt_token = cancel.child_token();
        match tokio::time::timeout(
            self.timeout,
            self.inner.execute(request, progress, attempt_token.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                attempt_token.cancel();
                Err(ExecutionError::Timeout(self.timeout))
            }
        }
    }
}
