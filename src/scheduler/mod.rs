//! Bounded worker-pool task scheduler
//!
//! A [`TaskScheduler`] runs [`Job`]s on a fixed set of worker threads and
//! multiplexes their results back to one controlling thread. Heterogeneous
//! task kinds are expressed as a sum type implementing `Job`, so results
//! travel through a single buffer without boxing.
//!
//! # Architecture
//!
//! ```text
//!  controlling thread                       worker threads
//! ┌──────────────────┐   task channel    ┌──────────────────┐
//! │ submit(task)     │ ────────────────► │  <pool>-0 .. N   │
//! │  pending += 1    │                   │  run job         │
//! │                  │   result buffer   │  catch panics    │
//! │ collect_results()│ ◄──────────────── │  pending -= 1    │
//! │  wait on condvar │   (mutex+condvar) │  push result     │
//! └──────────────────┘                   └──────────────────┘
//! ```
//!
//! Dropping the scheduler sets the stop flag, closes the task channel and
//! joins every worker before the shared state is released. Jobs already
//! running are allowed to finish; queued jobs are discarded.

mod task;
mod worker;

pub use task::{Job, Outcome, Task, TaskResult};

use crate::error::{TaskError, WorkerError};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use worker::Worker;

/// Status returned by [`TaskScheduler::collect_results`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collect {
    /// At least one result was moved into the caller's buffer
    HaveResults,

    /// Nothing is pending and nothing is buffered
    Finished,
}

/// State guarded by the scheduler mutex
pub(crate) struct State<C, J: Job> {
    /// Submitted tasks whose result has not been buffered yet
    pub(crate) pending: usize,

    /// Results not yet collected
    pub(crate) results: Vec<TaskResult<C, J>>,
}

/// State shared between the scheduler and its workers
pub(crate) struct Shared<C, J: Job> {
    pub(crate) state: Mutex<State<C, J>>,
    pub(crate) result_ready: Condvar,
    pub(crate) stop: AtomicBool,
}

/// Fixed-size worker pool with a single result collector
pub struct TaskScheduler<C, J: Job> {
    /// Pool name, used for thread names
    name: String,

    /// Task channel, `None` once shutdown has started
    sender: Option<Sender<Task<C, J>>>,

    /// Shared state
    shared: Arc<Shared<C, J>>,

    /// Worker threads
    workers: Vec<Worker>,
}

impl<C, J> TaskScheduler<C, J>
where
    C: Send + 'static,
    J: Job,
{
    /// Create a scheduler and start `worker_count` threads (at least one)
    pub fn new(name: impl Into<String>, worker_count: usize) -> Result<Self, WorkerError> {
        let name = name.into();
        let (sender, receiver) = unbounded();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: 0,
                results: Vec::new(),
            }),
            result_ready: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let mut scheduler = Self {
            name,
            sender: Some(sender),
            shared,
            workers: Vec::new(),
        };

        for id in 0..worker_count.max(1) {
            // on error, Drop joins the workers spawned so far
            let worker = Worker::spawn(
                &scheduler.name,
                id,
                receiver.clone(),
                Arc::clone(&scheduler.shared),
            )?;
            scheduler.workers.push(worker);
        }

        debug!(pool = %scheduler.name, count = scheduler.workers.len(), "Workers spawned");
        Ok(scheduler)
    }

    /// Hand a task to the pool. Never blocks.
    pub fn submit(&self, task: Task<C, J>) {
        self.shared.state.lock().pending += 1;

        let rejected = match &self.sender {
            Some(sender) => sender.send(task).err().map(|e| e.into_inner()),
            None => Some(task),
        };

        // the pool is gone: still deliver exactly one outcome for the task
        if let Some(task) = rejected {
            warn!(pool = %self.name, "Task submitted after worker pool stopped");
            let mut state = self.shared.state.lock();
            state.pending -= 1;
            state.results.push(TaskResult {
                task,
                outcome: Err(TaskError::Cancelled),
            });
            drop(state);
            self.shared.result_ready.notify_one();
        }
    }

    /// Wait for results.
    ///
    /// Clears `out`, then blocks until at least one result is buffered or no
    /// task is pending. Buffered results are swapped into `out`.
    pub fn collect_results(&self, out: &mut Vec<TaskResult<C, J>>) -> Collect {
        out.clear();

        let mut state = self.shared.state.lock();
        while state.results.is_empty() && state.pending > 0 {
            self.shared.result_ready.wait(&mut state);
        }

        if state.results.is_empty() {
            Collect::Finished
        } else {
            std::mem::swap(out, &mut state.results);
            Collect::HaveResults
        }
    }

    /// Number of submitted tasks whose result has not been buffered yet
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl<C, J: Job> Drop for TaskScheduler<C, J> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.sender = None;

        for worker in self.workers.drain(..) {
            let name = worker.name().to_string();
            if let Err(e) = worker.join() {
                warn!(worker = %name, error = %e, "Worker failed to join cleanly");
            }
        }
    }
}
