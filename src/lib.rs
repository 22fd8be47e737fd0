//! syncscan - parallel directory traversal core
//!
//! Building blocks for a responsive file browser or sync tool: a worker pool
//! whose results are multiplexed back to one controlling thread, a recursive
//! traverser with caller-driven retries, a windowed throughput estimator and
//! a bounded icon cache fed by a background loader.
//!
//! # Features
//!
//! - **Single Controlling Thread**: Workers only run collaborator calls.
//!   Callbacks, retry decisions and display conversion stay on the thread
//!   that owns the scheduler or cache.
//!
//! - **Retryable Errors**: Directory and item failures are reported with
//!   their retry count; the callback answers `Retry` or `Ignore`.
//!
//! - **Windowed Rates**: Throughput and remaining time reflect only the
//!   trailing window, not the whole history.
//!
//! - **Pluggable Backends**: Any [`Enumerator`] can back a traversal and any
//!   [`IconLoader`] can fill the icon cache.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Controlling Thread                      │
//! │  ParallelTraverser ── callbacks ── SlidingWindowEstimator  │
//! │         │                                  IconBuffer      │
//! └─────────┼──────────────────────────────────────┼───────────┘
//!           │ Task / TaskResult                    │ WorkLoad / Buffer
//!           ▼                                      ▼
//! ┌───────────────────────────────┐      ┌──────────────────────┐
//! │ TaskScheduler worker pool     │      │ icon-loader thread   │
//! │  Enumerator::enumerate()      │      │  IconLoader::load()  │
//! └───────────────────────────────┘      └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Scan two trees with 16 workers
//! syncscan /data /backup -w 16
//!
//! # Retry flaky listings up to 5 times, skip caches
//! syncscan /home --retries 5 --exclude '\.cache'
//! ```

pub mod config;
pub mod error;
pub mod estimator;
pub mod icon_buffer;
pub mod progress;
pub mod scheduler;
pub mod traverser;

pub use config::{EstimatorConfig, IconBufferConfig, ScanArgs, ScanConfig};
pub use error::{CallbackAbort, EnumError, Result, ScanError, TaskError};
pub use estimator::{SlidingWindowEstimator, Throughput};
pub use icon_buffer::{IconBuffer, IconLoader, IconProbe, IconSize};
pub use scheduler::{Collect, Job, Task, TaskResult, TaskScheduler};
pub use traverser::{
    traverse_folders, Enumerator, LocalFs, ParallelTraverser, RetryPolicy, TraversalAborted,
    TraverseStats, TraverserCallback,
};
