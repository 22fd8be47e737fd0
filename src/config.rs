//! Configuration types for syncscan
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime scan configuration with validation
//! - Estimator window and icon buffer settings

use crate::error::ConfigError;
use crate::icon_buffer::IconSize;
use clap::Parser;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Default icon buffer capacity
pub const BUFFER_SIZE_MAX: usize = 1000;

/// Parallel directory scanner with retryable error handling
#[derive(Parser, Debug, Clone)]
#[command(
    name = "syncscan",
    version,
    about = "Parallel directory scanner with retryable error handling",
    long_about = "Enumerates one or more directory trees in parallel using a fixed worker pool.\n\n\
                  Listing errors are retried up to --retries times and then skipped.\n\
                  Throughput is reported over a sliding time window.",
    after_help = "EXAMPLES:\n    \
        syncscan /data\n    \
        syncscan /data /backup -w 16 --retries 5\n    \
        syncscan /home --exclude '\\.cache' --max-depth 4"
)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "DIR", required = true)]
    pub roots: Vec<PathBuf>,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Retry attempts for failed listings before skipping
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub retries: usize,

    /// Maximum directory depth (unlimited if not set)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub max_depth: Option<usize>,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Do not follow symbolic links
    #[arg(long)]
    pub no_follow_symlinks: bool,

    /// Window for the throughput figure, in milliseconds
    #[arg(long, default_value = "5000", value_name = "MS")]
    pub speed_window_ms: u64,

    /// Window for the remaining-time figure, in milliseconds
    #[arg(long, default_value = "10000", value_name = "MS")]
    pub eta_window_ms: u64,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (show retries and skipped items)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // directory listing is I/O bound
    num_cpus::get() * 2
}

/// Estimator window settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorConfig {
    /// Window for instantaneous throughput
    pub speed_window: Duration,

    /// Window for remaining-time smoothing
    pub eta_window: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            speed_window: Duration::from_secs(5),
            eta_window: Duration::from_secs(10),
        }
    }
}

impl EstimatorConfig {
    pub fn from_millis(speed_ms: u64, eta_ms: u64) -> Result<Self, ConfigError> {
        if speed_ms == 0 {
            return Err(ConfigError::InvalidWindow {
                name: "speed",
                millis: speed_ms,
            });
        }
        if eta_ms == 0 {
            return Err(ConfigError::InvalidWindow {
                name: "eta",
                millis: eta_ms,
            });
        }

        Ok(Self {
            speed_window: Duration::from_millis(speed_ms),
            eta_window: Duration::from_millis(eta_ms),
        })
    }
}

/// Icon buffer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconBufferConfig {
    /// Maximum number of cached entries
    pub capacity: usize,

    /// Size requested from the loader
    pub icon_size: IconSize,
}

impl Default for IconBufferConfig {
    fn default() -> Self {
        Self {
            capacity: BUFFER_SIZE_MAX,
            icon_size: IconSize::Small,
        }
    }
}

impl IconBufferConfig {
    pub fn new(capacity: usize, icon_size: IconSize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            icon_size,
        })
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directories to traverse
    pub roots: Vec<PathBuf>,

    /// Number of worker threads
    pub worker_count: usize,

    /// Retries per failing task before it is skipped
    pub retry_count: usize,

    /// Maximum traversal depth
    pub max_depth: Option<usize>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Follow symbolic links
    pub follow_symlinks: bool,

    /// Estimator windows
    pub estimator: EstimatorConfig,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ScanConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: ScanArgs) -> Result<Self, ConfigError> {
        if args.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        for root in &args.roots {
            validate_root(root)?;
        }

        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        let estimator = EstimatorConfig::from_millis(args.speed_window_ms, args.eta_window_ms)?;

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            roots: args.roots,
            worker_count: args.workers,
            retry_count: args.retries,
            max_depth: args.max_depth,
            exclude_patterns,
            follow_symlinks: !args.no_follow_symlinks,
            estimator,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&path))
    }
}

fn validate_root(root: &Path) -> Result<(), ConfigError> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::InvalidRoot {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
