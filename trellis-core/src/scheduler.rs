//! Update Scheduler
//!
//! Batches component updates so that many synchronous writes produce one
//! re-render. Jobs are deduplicated by id while queued; post-flush
//! callbacks run after the job queue drains (mounted/updated lifecycle
//! hooks ride this queue).
//!
//! The host environment owns the tick: enqueuing only marks a flush
//! pending, and the embedder (or a test) calls [`flush_jobs`] once per
//! tick. A flush keeps looping while jobs or callbacks were enqueued
//! during the previous round, so cascading updates settle within a
//! single flush.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

/// A deduplicable unit of work. Two jobs with the same id are the same
/// job; queueing the second while the first is still pending is a no-op.
#[derive(Clone)]
pub struct Job {
    id: u64,
    run: Arc<dyn Fn()>,
}

impl Job {
    pub fn new<F>(id: u64, run: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id,
            run: Arc::new(run),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Job>,
    queued_ids: HashSet<u64>,
    post_flush: Vec<Box<dyn FnOnce()>>,
    pending: bool,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Enqueue a job for the next flush, deduplicated by job id.
pub fn queue_job(job: Job) {
    SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        if state.queued_ids.insert(job.id) {
            state.queue.push(job);
        }
        state.pending = true;
    });
}

/// Enqueue a callback to run after the job queue drains.
pub fn queue_post_flush<F>(f: F)
where
    F: FnOnce() + 'static,
{
    SCHEDULER.with(|s| {
        let mut state = s.borrow_mut();
        state.post_flush.push(Box::new(f));
        state.pending = true;
    });
}

/// Whether a flush has been requested since the last [`flush_jobs`].
pub fn has_pending_flush() -> bool {
    SCHEDULER.with(|s| s.borrow().pending)
}

/// Drain both queues. Jobs run first, then post-flush callbacks; the
/// loop repeats while either round enqueued more work.
pub fn flush_jobs() {
    loop {
        let jobs: Vec<Job> = SCHEDULER.with(|s| {
            let mut state = s.borrow_mut();
            state.queued_ids.clear();
            std::mem::take(&mut state.queue)
        });
        let had_jobs = !jobs.is_empty();
        if had_jobs {
            debug!(count = jobs.len(), "flushing update jobs");
        }
        // Queue borrows are released here; a job may re-enqueue.
        for job in &jobs {
            (job.run)();
        }

        let callbacks: Vec<Box<dyn FnOnce()>> = SCHEDULER.with(|s| {
            let mut state = s.borrow_mut();
            std::mem::take(&mut state.post_flush)
        });
        let had_callbacks = !callbacks.is_empty();
        for callback in callbacks {
            callback();
        }

        if !had_jobs && !had_callbacks {
            break;
        }
    }
    SCHEDULER.with(|s| s.borrow_mut().pending = false);
}
