//! Reporting interface consumed by the traverser
//!
//! Callbacks are only ever invoked on the controlling thread, so
//! implementations need not be `Send` or `Sync`.

use super::enumerator::{FileInfo, FolderInfo, SymlinkInfo};
use crate::error::CallbackResult;
use std::time::SystemTime;

/// Answer to a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// Run the failed operation again
    Retry,

    /// Drop the failed operation and carry on
    Ignore,
}

/// Answer to a discovered symlink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleLink {
    /// Resolve the link and report its target
    Follow,

    /// Ignore the link
    Skip,
}

/// Context delivered with every reported error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Human readable description
    pub message: String,

    /// Number of retries already made for this operation
    pub retry_number: usize,

    /// When the failure was observed by the controlling thread
    pub fail_time: SystemTime,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, retry_number: usize) -> Self {
        Self {
            message: message.into(),
            retry_number,
            fail_time: SystemTime::now(),
        }
    }
}

/// Receives traversal results for one directory.
///
/// Every method may return a [`CallbackAbort`](crate::error::CallbackAbort),
/// which ends the whole traversal.
pub trait TraverserCallback {
    /// A file was found
    fn on_file(&mut self, file: &FileInfo) -> CallbackResult<()>;

    /// A symlink was found
    fn on_symlink(&mut self, link: &SymlinkInfo) -> CallbackResult<HandleLink>;

    /// A folder was found. Return a callback for its contents to descend into
    /// it, or `None` to skip the subtree.
    fn on_folder(&mut self, folder: &FolderInfo)
        -> CallbackResult<Option<Box<dyn TraverserCallback>>>;

    /// Listing this callback's directory failed
    fn report_dir_error(&mut self, error: &ErrorInfo) -> CallbackResult<HandleError>;

    /// A single item inside this callback's directory failed
    fn report_item_error(&mut self, error: &ErrorInfo, item_name: &str)
        -> CallbackResult<HandleError>;
}

/// Headless error policy: retry a fixed number of times, then ignore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
}

impl RetryPolicy {
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries }
    }

    /// Never retry
    pub fn ignore_all() -> Self {
        Self::new(0)
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn decide(&self, error: &ErrorInfo) -> HandleError {
        if error.retry_number < self.max_retries {
            HandleError::Retry
        } else {
            HandleError::Ignore
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
