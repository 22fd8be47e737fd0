//! Sliding-window throughput and remaining-time estimation
//!
//! Progress producers feed monotonic `(elapsed, items, bytes)` samples into a
//! [`SlidingWindowEstimator`]. Throughput is computed over a short speed
//! window, remaining time over a longer ETA window. Samples older than the
//! largest window are pruned, except that one sample before the cutoff is kept
//! so a measurement hole can still be bridged by interpolation.
//!
//! ```
//! use std::time::Duration;
//! use syncscan::estimator::SlidingWindowEstimator;
//!
//! let mut est = SlidingWindowEstimator::new(Duration::from_secs(5), Duration::from_secs(10));
//! est.add_sample(Duration::ZERO, 0, 0);
//! est.add_sample(Duration::from_secs(2), 10, 4096);
//!
//! let speed = est.throughput().unwrap();
//! assert_eq!(speed.bytes_per_sec, 2048.0);
//! assert_eq!(est.remaining_time(4096.0), Some(2.0));
//! ```

use crate::config::EstimatorConfig;
use humansize::{format_size, BINARY};
use std::collections::VecDeque;
use std::time::Duration;

/// Deltas smaller than this are treated as zero
const EPSILON: f64 = 1e-9;

fn is_null(value: f64) -> bool {
    value.abs() <= EPSILON
}

/// A single progress measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Time since the start of the operation
    pub time: Duration,

    /// Items processed so far
    pub items: u64,

    /// Bytes processed so far
    pub bytes: u64,
}

/// Throughput measured over the speed window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub items_per_sec: f64,
    pub bytes_per_sec: f64,
}

/// Windowed rate and ETA estimator
#[derive(Debug, Clone)]
pub struct SlidingWindowEstimator {
    speed_window: Duration,
    eta_window: Duration,
    samples: VecDeque<Sample>,
}

impl SlidingWindowEstimator {
    /// Create an estimator with separate speed and ETA windows
    pub fn new(speed_window: Duration, eta_window: Duration) -> Self {
        Self {
            speed_window,
            eta_window,
            samples: VecDeque::new(),
        }
    }

    /// Create an estimator that uses one window for both figures
    pub fn with_window(window: Duration) -> Self {
        Self::new(window, window)
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(config.speed_window, config.eta_window)
    }

    /// Record a sample.
    ///
    /// `elapsed` must not be earlier than the previous sample.
    pub fn add_sample(&mut self, elapsed: Duration, items: u64, bytes: u64) {
        debug_assert!(
            self.samples.back().map_or(true, |last| last.time <= elapsed),
            "samples must be added in non-decreasing time order"
        );

        self.samples.push_back(Sample {
            time: elapsed,
            items,
            bytes,
        });

        let window = self.speed_window.max(self.eta_window);
        let Some(cutoff) = elapsed.checked_sub(window) else {
            return;
        };

        // keep one sample before the cutoff to bridge measurement holes
        while self.samples.len() > 2 && self.samples[1].time <= cutoff {
            self.samples.pop_front();
        }
    }

    /// Estimated seconds until `bytes_remaining` more bytes are processed.
    ///
    /// Returns `None` if no bytes moved during the ETA window. A negative
    /// value is returned as-is and signals an abnormal state such as a
    /// shrinking total.
    pub fn remaining_time(&self, bytes_remaining: f64) -> Option<f64> {
        let (first, last) = self.window_bounds(self.eta_window)?;

        let bytes_delta = last.bytes as f64 - first.bytes as f64;
        if is_null(bytes_delta) {
            return None;
        }
        let time_delta = (last.time - first.time).as_secs_f64();

        Some(time_delta * bytes_remaining / bytes_delta)
    }

    /// Items and bytes per second over the speed window
    pub fn throughput(&self) -> Option<Throughput> {
        let (first, last) = self.window_bounds(self.speed_window)?;

        let time_delta = (last.time - first.time).as_secs_f64();
        if is_null(time_delta) {
            return None;
        }

        Some(Throughput {
            items_per_sec: (last.items as f64 - first.items as f64) / time_delta,
            bytes_per_sec: (last.bytes as f64 - first.bytes as f64) / time_delta,
        })
    }

    /// Bytes per second formatted for display, e.g. `"1.50 MiB/s"`
    pub fn format_bytes_per_sec(&self) -> Option<String> {
        self.throughput()
            .map(|t| format!("{}/s", format_size(t.bytes_per_sec.max(0.0) as u64, BINARY)))
    }

    /// Items per second formatted for display, e.g. `"120 items/s"`
    pub fn format_items_per_sec(&self) -> Option<String> {
        self.throughput()
            .map(|t| format!("{:.0} items/s", t.items_per_sec))
    }

    /// Discard all samples
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of retained samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest and newest sample spanning `window`, ending at the newest sample.
    ///
    /// The oldest is the last sample at or before the window start, falling
    /// back to the first retained sample.
    fn window_bounds(&self, window: Duration) -> Option<(&Sample, &Sample)> {
        let last = self.samples.back()?;
        let start = last.time.saturating_sub(window);

        // first sample strictly inside the window
        let inside = self.samples.partition_point(|s| s.time <= start);
        let first = &self.samples[inside.saturating_sub(1)];

        Some((first, last))
    }
}

/// Format a remaining-time estimate in seconds for display
pub fn format_remaining_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "-".to_string();
    }

    let secs = seconds.round() as u64;
    match secs {
        0..=59 => format!("{} sec", secs),
        60..=3599 => format!("{} min", (secs + 30) / 60),
        3600..=86_399 => {
            let hours = secs / 3600;
            let mins = (secs % 3600 + 30) / 60;
            if mins == 0 {
                format!("{} h", hours)
            } else {
                format!("{} h {} min", hours, mins.min(59))
            }
        }
        _ => format!("{} days", secs / 86_400),
    }
}
