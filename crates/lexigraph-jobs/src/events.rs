//! Scheduler events and the broadcast bus that carries them.

use crate::job::{JobId, JobStatus, Priority};
use crate::stats::QueueStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Scheduler-level run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not dispatching.
    Idle,
    /// Dispatching whenever a slot is free.
    Running,
    /// Paused: no new dispatches, in-flight attempts finishing.
    Draining,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
        })
    }
}

/// Something observable that happened in a scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum JobEvent {
    JobAdded {
        job_id: JobId,
        priority: Priority,
    },
    JobStatusChanged {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
        attempt: u32,
    },
    JobProgress {
        job_id: JobId,
        progress: f64,
    },
    JobRemoved {
        job_id: JobId,
    },
    StatsUpdated {
        stats: QueueStats,
    },
    SchedulerStateChanged {
        from: RunState,
        to: RunState,
    },
}

impl JobEvent {
    /// Job the event concerns, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobAdded { job_id, .. }
            | Self::JobStatusChanged { job_id, .. }
            | Self::JobProgress { job_id, .. }
            | Self::JobRemoved { job_id } => Some(job_id),
            Self::StatsUpdated { .. } | Self::SchedulerStateChanged { .. } => None,
        }
    }
}

/// Metadata envelope attached to every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonic per-scheduler sequence number.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: JobEvent,
}

/// Fan-out publisher for scheduler events.
///
/// Publishing never blocks. Slow subscribers observe
/// [`broadcast::error::RecvError::Lagged`] instead of stalling the scheduler.
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publishes an event to every current subscriber.
    pub fn publish(&self, event: JobEvent) {
        let envelope = EventEnvelope {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            event,
        };
        // No subscribers is not an error.
        let _ = self.sender.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(JobEvent::JobRemoved {
            job_id: JobId::from("a"),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_fan_out_with_sequence() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(JobEvent::JobAdded {
            job_id: JobId::from("a"),
            priority: Priority::High,
        });
        bus.publish(JobEvent::SchedulerStateChanged {
            from: RunState::Idle,
            to: RunState::Running,
        });

        let a = first.recv().await.unwrap();
        let b = first.recv().await.unwrap();
        assert_eq!(a.sequence + 1, b.sequence);
        assert_eq!(a.event.job_id().map(JobId::as_str), Some("a"));
        assert!(b.event.job_id().is_none());

        assert_eq!(second.recv().await.unwrap(), a);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = JobEvent::JobStatusChanged {
            job_id: JobId::from("a"),
            from: JobStatus::Pending,
            to: JobStatus::Running,
            attempt: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_status_changed");
        assert_eq!(json["to"], "running");
    }
}
