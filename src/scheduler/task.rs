//! Units of work and their outcomes

use crate::error::TaskError;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A computation executed on a worker thread.
///
/// `run` takes `&self` so a failed task can be resubmitted unchanged.
pub trait Job: Send + 'static {
    /// Value produced on success
    type Output: Send + 'static;

    /// Error produced on failure
    type Error: Send + 'static;

    fn run(&self) -> Result<Self::Output, Self::Error>;
}

/// A job together with its routing context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task<C, J> {
    /// Routing metadata, only interpreted by the controlling thread
    pub context: C,

    /// The computation
    pub job: J,
}

impl<C, J> Task<C, J> {
    pub fn new(context: C, job: J) -> Self {
        Self { context, job }
    }
}

/// Outcome of a job, captured on the worker thread
pub type Outcome<J> = Result<<J as Job>::Output, TaskError<<J as Job>::Error>>;

/// A finished task handed back to the controlling thread
pub struct TaskResult<C, J: Job> {
    /// The task as it was submitted
    pub task: Task<C, J>,

    /// Exactly one of success value or captured error
    pub outcome: Outcome<J>,
}

impl<C, J> fmt::Debug for TaskResult<C, J>
where
    C: fmt::Debug,
    J: Job + fmt::Debug,
    J::Output: fmt::Debug,
    J::Error: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskResult")
            .field("task", &self.task)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Run a job, converting both errors and panics into data
pub(crate) fn execute<J: Job>(job: &J) -> Outcome<J> {
    match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
