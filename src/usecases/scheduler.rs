//! Durable weekly scheduler: one time-ordered queue across all jobs.
//!
//! Registrations flow over an mpsc channel into the single timer loop, so
//! the dialogue side never touches the queue directly. The loop sleeps
//! until the earliest due instant, fires every job due at that instant on a
//! spawned task (deliveries never block the timer), then re-arms each fired
//! job from its civil-calendar rules.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::domain::{DomainError, ScheduledJob, next_fire_instant};
use crate::ports::JobStorePort;
use crate::usecases::dispatcher::DispatchService;

/// Registration side of the scheduler. Cheap to clone; safe to use from
/// many concurrent dialogues.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<ScheduledJob>,
}

impl SchedulerHandle {
    pub fn register(&self, job: ScheduledJob) -> Result<(), DomainError> {
        self.tx
            .send(job)
            .map_err(|_| DomainError::Scheduler("scheduler loop is not running".to_string()))
    }
}

#[cfg(test)]
impl SchedulerHandle {
    /// Detached handle whose registrations land in the returned receiver.
    pub fn test_pair() -> (Self, mpsc::UnboundedReceiver<ScheduledJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    due: DateTime<Utc>,
    job: ScheduledJob,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due).then(self.job.id.cmp(&other.job.id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The fire queue. Synchronous and self-contained; the async loop and the
/// tests drive it the same way.
pub struct FireQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    registered: HashSet<uuid::Uuid>,
    tz: Tz,
}

impl FireQueue {
    pub fn new(tz: Tz) -> Self {
        Self {
            heap: BinaryHeap::new(),
            registered: HashSet::new(),
            tz,
        }
    }

    /// Arm a job from `now`. A job id already in the queue is ignored (the
    /// first registration wins), so double registration cannot produce
    /// duplicate fire entries.
    pub fn insert(&mut self, job: ScheduledJob, now: DateTime<Utc>) -> bool {
        if !self.registered.insert(job.id) {
            warn!(job_id = %job.id, "job already registered; ignoring duplicate");
            return false;
        }
        match next_fire_instant(&job.schedule, self.tz, now) {
            Some(due) => {
                debug!(job_id = %job.id, due = %due, "job armed");
                self.heap.push(Reverse(QueueEntry { due, job }));
                true
            }
            None => {
                warn!(job_id = %job.id, "job has no computable fire instant; dropping");
                self.registered.remove(&job.id);
                false
            }
        }
    }

    /// Earliest queued fire instant.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|Reverse(e)| e.due)
    }

    /// Pop every job due at or before `now`, re-arming each for its next
    /// occurrence (derived from one minute past the fired instant, so the
    /// same minute never fires twice).
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.due > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            match next_fire_instant(&entry.job.schedule, self.tz, entry.due + Duration::minutes(1)) {
                Some(next) => {
                    debug!(job_id = %entry.job.id, next = %next, "job re-armed");
                    self.heap.push(Reverse(QueueEntry { due: next, job: entry.job.clone() }));
                }
                None => {
                    warn!(job_id = %entry.job.id, "no next fire instant; job dequeued");
                    self.registered.remove(&entry.job.id);
                }
            }
            fired.push(entry.job);
        }
        fired
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// The scheduler loop. Owns the fire queue; fed by `SchedulerHandle`.
pub struct SchedulerService {
    rx: mpsc::UnboundedReceiver<ScheduledJob>,
    dispatcher: Arc<DispatchService>,
    queue: FireQueue,
}

impl SchedulerService {
    pub fn new(dispatcher: Arc<DispatchService>, tz: Tz) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx,
                dispatcher,
                queue: FireQueue::new(tz),
            },
            SchedulerHandle { tx },
        )
    }

    /// Restart recovery: reload every persisted job and recompute its next
    /// fire instant from the current moment. Missed fires are skipped, not
    /// replayed.
    pub async fn recover(&mut self, store: &dyn JobStorePort) -> Result<usize, DomainError> {
        let jobs = store.load_all().await?;
        let now = Utc::now();
        let mut armed = 0usize;
        for job in jobs {
            if self.queue.insert(job, now) {
                armed += 1;
            }
        }
        info!(count = armed, "recovered persisted jobs");
        Ok(armed)
    }

    /// Run the timer loop until every `SchedulerHandle` is dropped.
    pub async fn run(mut self) {
        info!("scheduler loop started");
        loop {
            tokio::select! {
                registered = self.rx.recv() => match registered {
                    Some(job) => {
                        self.queue.insert(job, Utc::now());
                    }
                    None => {
                        info!("registration channel closed; scheduler stopping");
                        break;
                    }
                },
                _ = sleep_until(self.queue.next_due()) => {
                    let due = self.queue.pop_due(Utc::now());
                    if due.is_empty() {
                        continue;
                    }
                    info!(count = due.len(), "firing due jobs");
                    for job in due {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        tokio::spawn(async move {
                            dispatcher.deliver(&job).await;
                        });
                    }
                }
            }
        }
    }
}

/// Sleep until `deadline`; with no deadline, park until a registration
/// wakes the select.
async fn sleep_until(deadline: Option<DateTime<Utc>>) {
    match deadline {
        Some(at) => {
            let wait = (at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        None => std::future::pending::<()>().await,
    }
}
