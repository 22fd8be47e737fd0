//! Worker thread logic for the task scheduler
//!
//! Each worker:
//! - Pulls tasks from the shared task channel
//! - Runs the job with panics captured
//! - Moves the finished task into the result buffer and wakes the collector

use super::task::{execute, Job, Task, TaskResult};
use super::Shared;
use crate::error::WorkerError;
use crossbeam_channel::Receiver;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// A worker thread of a [`TaskScheduler`](super::TaskScheduler)
pub(crate) struct Worker {
    /// Thread name, `<pool>-<id>`
    name: String,

    /// Thread handle
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a new worker thread
    pub(crate) fn spawn<C, J>(
        pool: &str,
        id: usize,
        tasks: Receiver<Task<C, J>>,
        shared: Arc<Shared<C, J>>,
    ) -> Result<Self, WorkerError>
    where
        C: Send + 'static,
        J: Job,
    {
        let name = format!("{}-{}", pool, id);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(tasks, shared))
            .map_err(|e| WorkerError::InitFailed {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            handle: Some(handle),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the worker to finish
    pub(crate) fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                name: self.name.clone(),
                message: "Worker thread panicked".into(),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop<C, J>(tasks: Receiver<Task<C, J>>, shared: Arc<Shared<C, J>>)
where
    C: Send + 'static,
    J: Job,
{
    debug!("Worker started");

    let mut completed = 0u64;

    // ends when the scheduler drops its sender
    while let Ok(task) = tasks.recv() {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        let outcome = execute(&task.job);
        trace!(ok = outcome.is_ok(), "Task finished");
        completed += 1;

        let mut state = shared.state.lock();
        state.pending -= 1;
        state.results.push(TaskResult { task, outcome });
        drop(state);

        shared.result_ready.notify_one();
    }

    debug!(completed = completed, "Worker shutting down");
}
