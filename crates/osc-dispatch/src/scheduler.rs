//! Deferred task scheduling
//!
//! [`TimerQueue`] is a single tokio task that owns a heap of pending jobs
//! ordered by due time. Scheduling never blocks the caller and no thread is
//! created per job. Jobs with equal due times run in submission order, but
//! callers must not rely on that.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error};

use crate::error::{DispatchError, Result};

/// A unit of deferred work
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs after a delay without blocking the caller
pub trait Schedule: Send + Sync {
    /// Run `job` once `delay` has elapsed
    fn after(&self, delay: Duration, job: Job) -> Result<()>;

    /// Drop every job that has not run yet
    fn cancel_all(&self);
}

enum Command {
    Schedule { due: Instant, job: Job },
    CancelAll,
}

struct Entry {
    due: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// Timer queue backed by one tokio task.
///
/// Dropping the queue stops the task and discards pending jobs.
pub struct TimerQueue {
    tx: mpsc::UnboundedSender<Command>,
    pending: Arc<AtomicUsize>,
}

impl TimerQueue {
    /// Start the queue on the current tokio runtime.
    ///
    /// Panics when called outside a runtime, like `tokio::spawn`.
    pub fn start() -> Self {
        Self::start_on(&Handle::current())
    }

    /// Start the queue on a specific runtime
    pub fn start_on(handle: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        handle.spawn(run_queue(rx, Arc::clone(&pending)));
        Self { tx, pending }
    }

    /// Number of jobs waiting to run
    pub fn pending(&self) -> usize {
        self.pending.load(AtomicOrdering::SeqCst)
    }
}

impl Schedule for TimerQueue {
    fn after(&self, delay: Duration, job: Job) -> Result<()> {
        let due = Instant::now() + delay;
        self.pending.fetch_add(1, AtomicOrdering::SeqCst);
        self.tx
            .send(Command::Schedule { due, job })
            .map_err(|_| {
                self.pending.fetch_sub(1, AtomicOrdering::SeqCst);
                DispatchError::SchedulerStopped
            })
    }

    fn cancel_all(&self) {
        let _ = self.tx.send(Command::CancelAll);
    }
}

async fn run_queue(mut rx: mpsc::UnboundedReceiver<Command>, pending: Arc<AtomicUsize>) {
    let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let next_due = heap.peek().map(|Reverse(entry)| entry.due);

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Schedule { due, job }) => {
                    seq += 1;
                    heap.push(Reverse(Entry { due, seq, job }));
                }
                Some(Command::CancelAll) => {
                    debug!("Cancelling {} pending jobs", heap.len());
                    pending.fetch_sub(heap.len(), AtomicOrdering::SeqCst);
                    heap.clear();
                }
                None => break,
            },

            _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                let now = Instant::now();
                while heap.peek().is_some_and(|Reverse(entry)| entry.due <= now) {
                    if let Some(Reverse(entry)) = heap.pop() {
                        pending.fetch_sub(1, AtomicOrdering::SeqCst);
                        if catch_unwind(AssertUnwindSafe(entry.job)).is_err() {
                            error!("Scheduled job panicked");
                        }
                    }
                }
            }
        }
    }

    debug!("Timer queue stopped with {} jobs discarded", heap.len());
    pending.fetch_sub(heap.len(), AtomicOrdering::SeqCst);
}
