//! Parallel directory traversal
//!
//! The traverser drives a [`TaskScheduler`] with directory listing tasks.
//! Workers only call the [`Enumerator`]; every callback invocation,
//! retry decision and resubmission happens on the controlling thread.
//!
//! # Architecture
//!
//! ```text
//!                     ┌───────────────────────────────┐
//!                     │   ParallelTraverser           │
//!                     │  - controlling thread         │
//!                     │  - callback arena (per folder)│
//!                     └──────┬─────────────────▲──────┘
//!              ListDir /     │                 │  TaskResult
//!              ResolveSymlink│                 │  (listing | error)
//!              StatItem      ▼                 │
//!       ┌────────────────────────────────────────────────────┐
//!       │                 TaskScheduler                      │
//!       │  ┌─────────┐  ┌─────────┐            ┌─────────┐   │
//!       │  │ trav-0  │  │ trav-1  │    ...     │ trav-N  │   │
//!       │  └─────────┘  └─────────┘            └─────────┘   │
//!       └────────────────────────────────────────────────────┘
//! ```
//!
//! A failed task is reported to its callback (`report_dir_error` for
//! listings, `report_item_error` for single items). `Retry` resubmits the same
//! operation with the retry count incremented; `Ignore` drops it. There is no
//! built-in retry ceiling: the callback decides, e.g. via [`RetryPolicy`].

mod callback;
mod enumerator;
mod job;

pub use callback::{ErrorInfo, HandleError, HandleLink, RetryPolicy, TraverserCallback};
pub use enumerator::{
    DirListing, Enumerator, FileInfo, FolderInfo, ItemFailure, ItemInfo, LinkTarget, LocalFs,
    SymlinkInfo,
};
pub use job::{CallbackId, TravContext, TravJob, TravOp, TravOutput};

use crate::error::{CallbackAbort, CallbackResult, Result, ScanError, WorkerError};
use crate::scheduler::{Collect, Task, TaskResult, TaskScheduler};
use slab::Slab;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Counters describing a finished traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraverseStats {
    /// Tasks handed to the scheduler, retries included
    pub tasks_submitted: u64,

    /// Tasks resubmitted after a `Retry` answer
    pub retries: u64,

    /// Failures answered with `Ignore`
    pub errors_ignored: u64,
}

/// A traversal ended early by a callback, with the counters reached so far
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct TraversalAborted {
    pub reason: CallbackAbort,
    pub stats: TraverseStats,
}

/// A callback and the number of its tasks still in flight
struct CallbackSlot {
    callback: Box<dyn TraverserCallback>,
    outstanding: usize,
}

/// Recursive, parallel enumeration of a forest of directory roots
pub struct ParallelTraverser<E: Enumerator> {
    fs: Arc<E>,

    /// Declared before `callbacks`: workers are joined first on drop
    scheduler: TaskScheduler<TravContext, TravJob<E>>,

    callbacks: Slab<CallbackSlot>,

    stats: TraverseStats,
}

type TravResult<E> = TaskResult<TravContext, TravJob<E>>;

impl<E: Enumerator> ParallelTraverser<E> {
    /// Create a traverser with `worker_count` listing threads
    pub fn new(fs: Arc<E>, worker_count: usize) -> std::result::Result<Self, WorkerError> {
        Ok(Self {
            fs,
            scheduler: TaskScheduler::new("trav", worker_count)?,
            callbacks: Slab::new(),
            stats: TraverseStats::default(),
        })
    }

    /// Traverse every root, each with its own callback.
    ///
    /// Returns once all listings and retries have resolved, or as soon as a
    /// callback aborts. Results arrive in completion order; callbacks must
    /// not rely on any ordering across folders.
    pub fn traverse(
        mut self,
        roots: Vec<(PathBuf, Box<dyn TraverserCallback>)>,
    ) -> std::result::Result<TraverseStats, TraversalAborted> {
        debug!(roots = roots.len(), "Starting traversal");

        for (root, callback) in roots {
            let id = self.register(callback);
            self.submit(TravContext::folder(id), TravOp::ListDir(root));
        }

        let mut batch = Vec::new();
        while self.scheduler.collect_results(&mut batch) == Collect::HaveResults {
            for result in batch.drain(..) {
                if let Err(reason) = self.handle_result(result) {
                    debug!(reason = %reason, tasks = self.stats.tasks_submitted, "Traversal aborted");
                    return Err(TraversalAborted {
                        reason,
                        stats: self.stats,
                    });
                }
            }
        }

        debug_assert!(self.callbacks.is_empty(), "callbacks leaked after traversal");
        debug!(
            tasks = self.stats.tasks_submitted,
            retries = self.stats.retries,
            ignored = self.stats.errors_ignored,
            "Traversal finished"
        );
        Ok(self.stats)
    }

    fn register(&mut self, callback: Box<dyn TraverserCallback>) -> CallbackId {
        CallbackId(self.callbacks.insert(CallbackSlot {
            callback,
            outstanding: 0,
        }))
    }

    fn callback(&mut self, id: CallbackId) -> &mut (dyn TraverserCallback + 'static) {
        self.callbacks[id.0].callback.as_mut()
    }

    fn submit(&mut self, context: TravContext, op: TravOp) {
        self.callbacks[context.callback.0].outstanding += 1;
        self.stats.tasks_submitted += 1;

        let job = TravJob::new(Arc::clone(&self.fs), op);
        self.scheduler.submit(Task::new(context, job));
    }

    /// Drop the callback once its last task has been handled
    fn release(&mut self, id: CallbackId) {
        let slot = &mut self.callbacks[id.0];
        slot.outstanding -= 1;
        if slot.outstanding == 0 {
            self.callbacks.remove(id.0);
        }
    }

    fn handle_result(&mut self, result: TravResult<E>) -> CallbackResult<()> {
        let TaskResult { mut task, outcome } = result;
        let id = task.context.callback;

        match outcome {
            Ok(output) => {
                self.dispatch(id, &task.job.op, output)?;
                self.release(id);
            }
            Err(e) => {
                let info = ErrorInfo::new(e.to_string(), task.context.retry_count);
                let answer = match &task.context.error_item {
                    Some(name) => self.callback(id).report_item_error(&info, name)?,
                    None => self.callback(id).report_dir_error(&info)?,
                };

                match answer {
                    HandleError::Retry => {
                        trace!(retry = info.retry_number + 1, error = %info.message, "Retrying task");
                        task.context.retry_count += 1;
                        self.stats.retries += 1;
                        self.stats.tasks_submitted += 1;
                        // the slot keeps its outstanding count across the retry
                        self.scheduler.submit(task);
                    }
                    HandleError::Ignore => {
                        self.stats.errors_ignored += 1;
                        self.release(id);
                    }
                }
            }
        }

        Ok(())
    }

    fn dispatch(&mut self, id: CallbackId, op: &TravOp, output: TravOutput) -> CallbackResult<()> {
        match (op, output) {
            (_, TravOutput::Listing(listing)) => self.on_listing(id, listing),
            (TravOp::ResolveSymlink(link), TravOutput::Link(target)) => {
                self.on_link_target(id, link, target)
            }
            (_, TravOutput::Item(item)) => self.on_item(id, item),
            (op, TravOutput::Link(_)) => {
                warn!(op = ?op, "Link target returned for non-link task");
                Ok(())
            }
        }
    }

    fn on_listing(&mut self, id: CallbackId, listing: DirListing) -> CallbackResult<()> {
        for file in &listing.files {
            self.callback(id).on_file(file)?;
        }
        for link in listing.symlinks {
            self.on_symlink(id, link)?;
        }
        for folder in &listing.folders {
            self.on_folder(id, folder)?;
        }

        for failure in listing.failed {
            let info = ErrorInfo::new(failure.error.to_string(), 0);
            match self.callback(id).report_item_error(&info, &failure.name)? {
                HandleError::Retry => {
                    let mut context = TravContext::item(id, failure.name);
                    context.retry_count = 1;
                    self.stats.retries += 1;
                    self.submit(context, TravOp::StatItem(failure.path));
                }
                HandleError::Ignore => self.stats.errors_ignored += 1,
            }
        }

        Ok(())
    }

    fn on_item(&mut self, id: CallbackId, item: ItemInfo) -> CallbackResult<()> {
        match item {
            ItemInfo::File(file) => self.callback(id).on_file(&file),
            ItemInfo::Folder(folder) => self.on_folder(id, &folder),
            ItemInfo::Symlink(link) => self.on_symlink(id, link),
        }
    }

    fn on_symlink(&mut self, id: CallbackId, link: SymlinkInfo) -> CallbackResult<()> {
        match self.callback(id).on_symlink(&link)? {
            HandleLink::Follow => {
                let context = TravContext::item(id, link.name.clone());
                self.submit(context, TravOp::ResolveSymlink(link));
            }
            HandleLink::Skip => {}
        }
        Ok(())
    }

    fn on_folder(&mut self, id: CallbackId, folder: &FolderInfo) -> CallbackResult<()> {
        if let Some(child) = self.callback(id).on_folder(folder)? {
            let child_id = self.register(child);
            self.submit(TravContext::folder(child_id), TravOp::ListDir(folder.path.clone()));
        }
        Ok(())
    }

    fn on_link_target(
        &mut self,
        id: CallbackId,
        link: &SymlinkInfo,
        target: LinkTarget,
    ) -> CallbackResult<()> {
        match target {
            LinkTarget::File { size, modified } => {
                let file = FileInfo {
                    name: link.name.clone(),
                    path: link.path.clone(),
                    size,
                    modified,
                    followed_link: true,
                };
                self.callback(id).on_file(&file)
            }
            LinkTarget::Folder => {
                let folder = FolderInfo {
                    name: link.name.clone(),
                    path: link.path.clone(),
                    followed_link: true,
                };
                self.on_folder(id, &folder)
            }
        }
    }
}

/// Traverse `roots` with a fresh traverser of `worker_count` threads
pub fn traverse_folders<E: Enumerator>(
    fs: Arc<E>,
    roots: Vec<(PathBuf, Box<dyn TraverserCallback>)>,
    worker_count: usize,
) -> Result<TraverseStats> {
    let traverser = ParallelTraverser::new(fs, worker_count)?;
    traverser
        .traverse(roots)
        .map_err(|aborted| ScanError::Aborted(aborted.reason))
}
