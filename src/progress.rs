//! Progress reporting for the scanner
//!
//! Provides a live spinner whose rates come from a sliding-window estimator,
//! plus the header and summary printed around a scan.

use crate::config::EstimatorConfig;
use crate::estimator::SlidingWindowEstimator;
use crate::traverser::TraverseStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

/// Running totals of a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub dirs: u64,
    pub files: u64,
    pub symlinks: u64,
    pub bytes: u64,
    pub errors: u64,
}

/// Progress reporter that displays scan status
pub struct ProgressReporter {
    /// Progress bar, `None` in quiet mode
    bar: Option<ProgressBar>,

    /// Windowed rates
    estimator: SlidingWindowEstimator,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new(config: &EstimatorConfig, visible: bool) -> Self {
        let bar = visible.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
            {
                bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });

        Self {
            bar,
            estimator: SlidingWindowEstimator::from_config(config),
        }
    }

    /// Record a sample and refresh the display
    pub fn update(&mut self, elapsed: Duration, progress: &ScanProgress) {
        self.estimator
            .add_sample(elapsed, progress.files + progress.dirs, progress.bytes);

        if let Some(bar) = &self.bar {
            bar.set_message(status_line(progress, &self.estimator));
        }
    }

    /// Estimator holding the samples recorded so far
    pub fn estimator(&self) -> &SlidingWindowEstimator {
        &self.estimator
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.finish_with_message(message.to_string());
        }
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn status_line(progress: &ScanProgress, estimator: &SlidingWindowEstimator) -> String {
    let rate = match (
        estimator.format_items_per_sec(),
        estimator.format_bytes_per_sec(),
    ) {
        (Some(items), Some(bytes)) => format!("{} | {}", items, bytes),
        _ => "-".to_string(),
    };

    format!(
        "Dirs: {} | Files: {} | Size: {} | Rate: {} | Errors: {}",
        format_number(progress.dirs),
        format_number(progress.files),
        format_size(progress.bytes, BINARY),
        rate,
        format_number(progress.errors),
    )
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the scan results
pub fn print_summary(progress: &ScanProgress, stats: &TraverseStats, duration: Duration) {
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        (progress.files + progress.dirs) as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Scan Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Directories:").bold(), format_number(progress.dirs));
    println!("  {} {}", style("Files:").bold(), format_number(progress.files));
    if progress.symlinks > 0 {
        println!("  {} {}", style("Symlinks:").bold(), format_number(progress.symlinks));
    }
    println!("  {} {}", style("Total Size:").bold(), format_size(progress.bytes, BINARY));
    println!(
        "  {} {:.1}s ({:.0} items/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    println!("  {} {}", style("Tasks:").bold(), format_number(stats.tasks_submitted));
    if stats.retries > 0 {
        println!("  {} {}", style("Retries:").yellow().bold(), format_number(stats.retries));
    }
    if progress.errors > 0 {
        println!(
            "  {} {} ({} skipped)",
            style("Errors:").yellow().bold(),
            format_number(progress.errors),
            format_number(stats.errors_ignored)
        );
    }
    println!();
}

/// Print a header at the start of the scan
pub fn print_header(roots: &[PathBuf], workers: usize, retries: usize) {
    println!();
    println!("{} {}", style("syncscan").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("{}", style("─".repeat(50)).dim());
    for root in roots {
        println!("  {} {}", style("Root:").bold(), root.display());
    }
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Retries:").bold(), retries);
    println!();
}
