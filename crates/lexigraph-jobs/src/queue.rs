//! In-memory job queue ordered by priority then submission order.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobStatus};
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

struct Slot<R, O> {
    sequence: u64,
    job: Job<R, O>,
}

/// Owns every job known to a scheduler.
///
/// Iteration follows insertion order. Dispatch order is highest
/// [`Priority`](crate::job::Priority) first, earliest insertion among equals.
pub struct JobQueue<R, O> {
    slots: HashMap<JobId, Slot<R, O>>,
    order: BTreeMap<u64, JobId>,
    next_sequence: u64,
}

impl<R, O> Default for JobQueue<R, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, O> JobQueue<R, O> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Inserts a job as a fresh `Pending` job.
    ///
    /// Any run history the job carries (attempts, outcome, timestamps) is
    /// cleared, so a restored job gets its full retry budget again.
    pub fn enqueue(&mut self, mut job: Job<R, O>) -> JobResult<JobId> {
        if self.slots.contains_key(job.id()) {
            return Err(JobError::DuplicateId(job.id().clone()));
        }

        job.reset_for_enqueue();

        let id = job.id().clone();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.order.insert(sequence, id.clone());
        self.slots.insert(id.clone(), Slot { sequence, job });
        Ok(id)
    }

    /// Returns the next job to dispatch, without changing its status.
    pub fn dequeue_next(&self) -> Option<&Job<R, O>> {
        self.next_ready(Instant::now(), |_| true)
    }

    /// Highest-priority ready pending job accepted by `filter`.
    pub(crate) fn next_ready<F>(&self, now: Instant, filter: F) -> Option<&Job<R, O>>
    where
        F: Fn(&Job<R, O>) -> bool,
    {
        let mut best: Option<&Job<R, O>> = None;
        for job in self.all() {
            if !job.is_ready(now) || !filter(job) {
                continue;
            }
            // Strict comparison keeps the earliest job among equal priorities.
            if best.map_or(true, |b| job.priority() > b.priority()) {
                best = Some(job);
            }
        }
        best
    }

    /// Earliest retry deadline among pending jobs still waiting out a backoff.
    pub(crate) fn next_retry_deadline(&self, now: Instant) -> Option<Instant> {
        self.slots
            .values()
            .filter(|slot| slot.job.status() == JobStatus::Pending)
            .filter_map(|slot| slot.job.retry_at())
            .filter(|at| *at > now)
            .min()
    }

    /// Removes a job regardless of status.
    pub fn remove(&mut self, id: &JobId) -> Option<Job<R, O>> {
        let slot = self.slots.remove(id)?;
        self.order.remove(&slot.sequence);
        Some(slot.job)
    }

    /// Enqueues a fresh pending copy of an existing job.
    pub fn duplicate(&mut self, id: &JobId) -> JobResult<JobId>
    where
        R: Clone,
    {
        let copy = self
            .get(id)
            .ok_or_else(|| JobError::NotFound(id.clone()))?
            .duplicate();
        self.enqueue(copy)
    }

    pub fn get(&self, id: &JobId) -> Option<&Job<R, O>> {
        self.slots.get(id).map(|slot| &slot.job)
    }

    pub(crate) fn get_mut(&mut self, id: &JobId) -> Option<&mut Job<R, O>> {
        self.slots.get_mut(id).map(|slot| &mut slot.job)
    }

    /// All jobs in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Job<R, O>> + '_ {
        self.order
            .values()
            .filter_map(|id| self.slots.get(id).map(|slot| &slot.job))
    }

    /// Cloned snapshot of all jobs in insertion order.
    pub fn snapshot(&self) -> Vec<Job<R, O>>
    where
        R: Clone,
        O: Clone,
    {
        self.all().cloned().collect()
    }

    /// Number of jobs with the given status.
    pub fn count(&self, status: JobStatus) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.job.status() == status)
            .count()
    }

    /// Removes every terminal job, returning them in insertion order.
    pub fn clear_finished(&mut self) -> Vec<Job<R, O>> {
        let finished: Vec<JobId> = self
            .all()
            .filter(|job| job.is_terminal())
            .map(|job| job.id().clone())
            .collect();

        finished.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
