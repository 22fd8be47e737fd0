//! syncscan - parallel directory scanner
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncscan::config::{ScanArgs, ScanConfig};
use syncscan::error::{CallbackAbort, CallbackResult};
use syncscan::progress::{print_header, print_summary, ProgressReporter, ScanProgress};
use syncscan::traverser::{
    ErrorInfo, FileInfo, FolderInfo, HandleError, HandleLink, LocalFs, ParallelTraverser,
    RetryPolicy, SymlinkInfo, TraverserCallback,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Minimum time between progress refreshes
const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = ScanArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ScanConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(&config.roots, config.worker_count, config.retry_count);
    }

    // Setup signal handler for graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received, shutting down...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to set signal handler")?;
    }

    let start = Instant::now();
    let state = Rc::new(RefCell::new(ScanState {
        policy: RetryPolicy::new(config.retry_count),
        progress: ScanProgress {
            dirs: config.roots.len() as u64,
            ..Default::default()
        },
        reporter: ProgressReporter::new(&config.estimator, config.show_progress),
        start,
        last_update: start,
        shutdown,
        visited: HashSet::new(),
        config,
    }));

    let (roots, workers) = {
        let s = state.borrow();
        let roots = s
            .config
            .roots
            .iter()
            .map(|root| {
                let callback: Box<dyn TraverserCallback> =
                    Box::new(ScanCallback::new(Rc::clone(&state), root.clone(), 0));
                (root.clone(), callback)
            })
            .collect::<Vec<_>>();
        (roots, s.config.worker_count)
    };

    let traverser =
        ParallelTraverser::new(Arc::new(LocalFs), workers).context("Failed to start workers")?;
    let (stats, completed) = match traverser.traverse(roots) {
        Ok(stats) => (stats, true),
        Err(aborted) => {
            info!(reason = %aborted.reason, "Scan was interrupted before completion");
            (aborted.stats, false)
        }
    };

    let s = state.borrow();
    if completed {
        s.reporter.finish("Scan completed");
    } else {
        s.reporter.finish("Scan interrupted");
    }

    print_summary(&s.progress, &stats, start.elapsed());

    if s.progress.errors > 0 {
        info!(errors = s.progress.errors, "Scan completed with errors");
    }

    Ok(())
}

/// State shared by every folder callback of a scan
struct ScanState {
    config: ScanConfig,
    policy: RetryPolicy,
    progress: ScanProgress,
    reporter: ProgressReporter,
    start: Instant,
    last_update: Instant,
    shutdown: Arc<AtomicBool>,

    /// Canonical targets of followed folder links
    visited: HashSet<PathBuf>,
}

impl ScanState {
    fn check_shutdown(&self) -> CallbackResult<()> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(CallbackAbort::new("interrupted by user"));
        }
        Ok(())
    }

    fn tick(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_update) >= UPDATE_INTERVAL {
            self.last_update = now;
            self.reporter.update(now.duration_since(self.start), &self.progress);
        }
    }
}

/// Callback for one directory of the scan
struct ScanCallback {
    state: Rc<RefCell<ScanState>>,
    dir: PathBuf,
    depth: usize,
}

impl ScanCallback {
    fn new(state: Rc<RefCell<ScanState>>, dir: PathBuf, depth: usize) -> Self {
        Self { state, dir, depth }
    }

    /// Whether a followed folder link leads back into the current branch
    /// or into a tree already scanned through another link
    fn is_link_cycle(&self, state: &mut ScanState, folder: &FolderInfo) -> bool {
        let target = match folder.path.canonicalize() {
            Ok(target) => target,
            Err(_) => return true,
        };
        let here = self.dir.canonicalize().unwrap_or_else(|_| self.dir.clone());

        here.starts_with(&target) || !state.visited.insert(target)
    }
}

impl TraverserCallback for ScanCallback {
    fn on_file(&mut self, file: &FileInfo) -> CallbackResult<()> {
        let mut state = self.state.borrow_mut();
        state.check_shutdown()?;

        if state.config.is_excluded(&file.path) {
            return Ok(());
        }

        state.progress.files += 1;
        state.progress.bytes += file.size;
        state.tick();
        Ok(())
    }

    fn on_symlink(&mut self, link: &SymlinkInfo) -> CallbackResult<HandleLink> {
        let mut state = self.state.borrow_mut();
        state.check_shutdown()?;

        if state.config.is_excluded(&link.path) {
            return Ok(HandleLink::Skip);
        }

        state.progress.symlinks += 1;
        if state.config.follow_symlinks {
            Ok(HandleLink::Follow)
        } else {
            Ok(HandleLink::Skip)
        }
    }

    fn on_folder(
        &mut self,
        folder: &FolderInfo,
    ) -> CallbackResult<Option<Box<dyn TraverserCallback>>> {
        let mut state = self.state.borrow_mut();
        state.check_shutdown()?;

        if state.config.is_excluded(&folder.path) {
            debug!(path = %folder.path.display(), "Excluded");
            return Ok(None);
        }

        if folder.followed_link && self.is_link_cycle(&mut state, folder) {
            debug!(path = %folder.path.display(), "Skipping symlink cycle");
            return Ok(None);
        }

        state.progress.dirs += 1;
        state.tick();

        let depth = self.depth + 1;
        if state.config.max_depth.is_some_and(|max| depth > max) {
            return Ok(None);
        }

        Ok(Some(Box::new(ScanCallback::new(
            Rc::clone(&self.state),
            folder.path.clone(),
            depth,
        ))))
    }

    fn report_dir_error(&mut self, error: &ErrorInfo) -> CallbackResult<HandleError> {
        let mut state = self.state.borrow_mut();
        state.check_shutdown()?;

        let decision = state.policy.decide(error);
        match decision {
            HandleError::Retry => {
                debug!(dir = %self.dir.display(), retry = error.retry_number + 1, error = %error.message, "Retrying directory");
            }
            HandleError::Ignore => {
                warn!(dir = %self.dir.display(), error = %error.message, "Skipping directory");
                state.progress.errors += 1;
            }
        }
        Ok(decision)
    }

    fn report_item_error(
        &mut self,
        error: &ErrorInfo,
        item_name: &str,
    ) -> CallbackResult<HandleError> {
        let mut state = self.state.borrow_mut();
        state.check_shutdown()?;

        let decision = state.policy.decide(error);
        match decision {
            HandleError::Retry => {
                debug!(item = item_name, retry = error.retry_number + 1, error = %error.message, "Retrying item");
            }
            HandleError::Ignore => {
                warn!(dir = %self.dir.display(), item = item_name, error = %error.message, "Skipping item");
                state.progress.errors += 1;
            }
        }
        Ok(decision)
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("syncscan=debug,warn")
    } else {
        EnvFilter::new("syncscan=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
