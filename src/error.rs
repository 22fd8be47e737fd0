//! Error types for syncscan
//!
//! This module defines the error hierarchy that covers:
//! - Enumeration collaborator failures (directory listing, metadata, symlinks)
//! - Failures captured at the worker task boundary
//! - Configuration and CLI errors
//! - Worker thread errors
//! - Caller-level aborts raised from traversal callbacks
//!
//! Enumeration errors travel from worker threads back to the controlling
//! thread as data; only `CallbackAbort` unwinds a traversal.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for syncscan
#[derive(Error, Debug)]
pub enum ScanError {
    /// Enumeration errors
    #[error("Enumeration error: {0}")]
    Enum(#[from] EnumError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Traversal aborted by a callback
    #[error("Traversal aborted: {0}")]
    Aborted(#[from] CallbackAbort),
}

/// Errors reported by an enumeration collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumError {
    /// Directory listing failed
    #[error("Failed to read directory '{path}': {reason}")]
    ReadDirFailed { path: PathBuf, reason: String },

    /// Metadata lookup failed
    #[error("Failed to stat '{path}': {reason}")]
    StatFailed { path: PathBuf, reason: String },

    /// Symlink target could not be resolved
    #[error("Failed to resolve symbolic link '{path}': {reason}")]
    ReadLinkFailed { path: PathBuf, reason: String },

    /// Permission denied
    #[error("Permission denied: '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Path not found
    #[error("Path not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Resource temporarily busy
    #[error("Resource busy: '{path}'")]
    Busy { path: PathBuf },

    /// Operation timed out
    #[error("Operation timed out: '{path}'")]
    Timeout { path: PathBuf },
}

impl EnumError {
    /// Classify an I/O error raised while reading a directory
    pub fn read_dir(path: &Path, err: io::Error) -> Self {
        Self::classify(path, err, |path, reason| EnumError::ReadDirFailed { path, reason })
    }

    /// Classify an I/O error raised while reading metadata
    pub fn stat(path: &Path, err: io::Error) -> Self {
        Self::classify(path, err, |path, reason| EnumError::StatFailed { path, reason })
    }

    /// Classify an I/O error raised while following a symlink
    pub fn read_link(path: &Path, err: io::Error) -> Self {
        Self::classify(path, err, |path, reason| EnumError::ReadLinkFailed { path, reason })
    }

    fn classify(
        path: &Path,
        err: io::Error,
        fallback: impl FnOnce(PathBuf, String) -> EnumError,
    ) -> Self {
        let path = path.to_path_buf();
        match err.kind() {
            io::ErrorKind::PermissionDenied => EnumError::PermissionDenied { path },
            io::ErrorKind::NotFound => EnumError::NotFound { path },
            io::ErrorKind::TimedOut => EnumError::Timeout { path },
            io::ErrorKind::ResourceBusy | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                EnumError::Busy { path }
            }
            _ => fallback(path, err.to_string()),
        }
    }
}

/// Failure of a single task, captured on the worker thread
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError<E> {
    /// The job returned an error
    #[error("{0}")]
    Failed(E),

    /// The job panicked
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The worker pool shut down before the task ran
    #[error("Task was not run: worker pool has stopped")]
    Cancelled,
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// No roots given
    #[error("At least one directory to scan is required")]
    NoRoots,

    /// Root is missing or not a directory
    #[error("Invalid root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Invalid estimator window
    #[error("Invalid {name} window {millis}ms: must be greater than zero")]
    InvalidWindow { name: &'static str, millis: u64 },

    /// Invalid icon buffer capacity
    #[error("Invalid icon buffer capacity {0}: must be greater than zero")]
    InvalidCapacity(usize),

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside of a task
    #[error("Worker {name} panicked: {message}")]
    Panicked { name: String, message: String },

    /// Worker thread could not be started
    #[error("Failed to start worker {name}: {reason}")]
    InitFailed { name: String, reason: String },
}

/// Unrecoverable abort requested by a traversal callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CallbackAbort(pub String);

impl CallbackAbort {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type alias for ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

/// Result type alias for EnumError
pub type EnumResult<T> = std::result::Result<T, EnumError>;

/// Result type alias for callback methods
pub type CallbackResult<T> = std::result::Result<T, CallbackAbort>;
