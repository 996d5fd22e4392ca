//! Lexigraph Jobs - Batch Image Generation Queue
//!
//! An in-process job queue for batch image generation:
//! - Jobs carry an opaque request and record status, progress, attempts and outcome
//! - Priority dispatch (high, normal, low), first-in first-out within a priority
//! - A scheduler bounded by a concurrency limit, with pause, stop and per-job cancel
//! - Retry policies with fixed, linear or exponential backoff
//! - Broadcast events and live aggregate statistics for presenters
//!
//! # Architecture
//!
//! ```text
//!   add / add_batch
//!         │
//!         ▼
//!  ┌──────────────────────────────┐      events (broadcast)
//!  │          Scheduler           │ ───────────────────────▶ UI / logs
//!  │  ┌────────────────────────┐  │
//!  │  │ JobQueue               │  │      stats (watch)
//!  │  │  high ▸ normal ▸ low   │  │ ───────────────────────▶ dashboards
//!  │  └───────────┬────────────┘  │
//!  │              │ max_concurrent│
//!  │     ┌────────┴────────┐      │
//!  │     ▼                 ▼      │
//!  │  Executor          Executor  │
//!  └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use lexigraph_jobs::prelude::*;
//! use std::time::Duration;
//!
//! let executor = SimulatedExecutor::new(Duration::from_millis(50));
//! let scheduler = Scheduler::new(executor, SchedulerConfig::new(2))?;
//!
//! scheduler.add(GenerationRequest::new("a lighthouse at dusk"), Priority::High)?;
//! scheduler.add(GenerationRequest::new("a red fox"), Priority::Normal)?;
//! scheduler.start();
//! scheduler.wait_for_completion().await;
//!
//! println!("{:?}", scheduler.stats());
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod generation;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod stats;

pub use config::SchedulerConfig;
pub use error::{ExecutionError, JobError, JobResult};
pub use events::{EventBus, EventEnvelope, JobEvent, RunState};
pub use executor::{ExecuteFuture, Executor, FnExecutor, ProgressReporter, ProgressSink, TimeoutExecutor};
pub use generation::{GenerationOutput, GenerationRequest, Sampler, SimulatedExecutor, StylePreset};
pub use job::{Job, JobId, JobStatus, Priority};
pub use metrics::{register_metrics, JobMetrics};
pub use queue::JobQueue;
pub use retry::{RetryPolicy, RetryStrategy};
pub use scheduler::{JobOf, Scheduler};
pub use stats::{QueueStats, StatsAggregator, StatusCounts};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::executor::{Executor, ProgressReporter};
    pub use crate::generation::{GenerationRequest, SimulatedExecutor};
    pub use crate::job::{Job, JobId, JobStatus, Priority};
    pub use crate::scheduler::Scheduler;
    pub use crate::{ExecutionError, JobError, JobEvent, JobResult, RetryPolicy, SchedulerConfig};
    pub use tokio_util::sync::CancellationToken;
}
