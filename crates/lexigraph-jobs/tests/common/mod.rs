//! Common test infrastructure for scheduler integration tests.
//!
//! [`GatedExecutor`] hands every executor call to the test as a [`Call`],
//! and the test decides when and how each call resolves.

#![allow(dead_code)]

use async_trait::async_trait;
use lexigraph_jobs::{ExecutionError, Executor, ProgressReporter, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Upper bound for any single wait in a test.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// One pending executor call.
pub struct Call {
    pub request: String,
    pub progress: ProgressReporter,
    pub cancel: CancellationToken,
    reply: oneshot::Sender<Result<String, ExecutionError>>,
}

impl Call {
    pub fn attempt(&self) -> u32 {
        self.progress.attempt()
    }

    pub fn succeed(self) {
        let output = format!("image-for-{}", self.request);
        let _ = self.reply.send(Ok(output));
    }

    pub fn fail(self, message: &str) {
        let _ = self.reply.send(Err(ExecutionError::failed(message)));
    }

    pub fn resolve(self, result: Result<String, ExecutionError>) {
        let _ = self.reply.send(result);
    }
}

#[derive(Default)]
struct Counters {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Executor whose calls are resolved by the test.
pub struct GatedExecutor {
    calls: mpsc::UnboundedSender<Call>,
    counters: Arc<Counters>,
}

impl GatedExecutor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                calls: tx,
                counters: Arc::new(Counters::default()),
            },
            rx,
        )
    }

    /// Total calls started.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously unresolved calls observed.
    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveGuard(Arc<Counters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Executor for GatedExecutor {
    type Request = String;
    type Output = String;

    async fn execute(
        &self,
        request: String,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<String, ExecutionError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.counters));

        let (reply, rx) = oneshot::channel();
        self.calls
            .send(Call {
                request,
                progress,
                cancel,
                reply,
            })
            .map_err(|_| ExecutionError::failed("test harness gone"))?;

        rx.await
            .unwrap_or_else(|_| Err(ExecutionError::failed("call dropped by test")))
    }
}

/// Receives the next executor call or panics after [`TIMEOUT`].
pub async fn next_call(calls: &mut mpsc::UnboundedReceiver<Call>) -> Call {
    tokio::time::timeout(TIMEOUT, calls.recv())
        .await
        .expect("timed out waiting for an executor call")
        .expect("executor dropped")
}

/// Waits until `predicate` holds, re-checking after every scheduler change.
pub async fn wait_until<E, F>(scheduler: &Scheduler<E>, mut predicate: F)
where
    E: Executor,
    F: FnMut(&Scheduler<E>) -> bool,
{
    let mut changes = scheduler.watch_stats();
    tokio::time::timeout(TIMEOUT, async {
        while !predicate(scheduler) {
            changes.changed().await.expect("scheduler dropped");
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Waits until every pending and running job has finished.
pub async fn wait_for_completion<E: Executor>(scheduler: &Scheduler<E>) {
    tokio::time::timeout(TIMEOUT, scheduler.wait_for_completion())
        .await
        .expect("queue did not settle in time");
}
