//! Progress display for export runs
//!
//! A run knows how many rows it will write when the rows are already in memory
//! or when a cap bounds a paginated provider; it then shows a bar against that
//! total. Otherwise it falls back to a spinner with the running count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use super::source::RowProvider;

/// Row progress of a single export run
///
/// The display is cleared when the tracker is dropped, so early returns on
/// errors leave no half-drawn bar behind.
pub struct ProgressTracker {
    rows: AtomicU64,
    total: Option<u64>,
    started: Instant,
    display: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Tracker that records counts without drawing anything
    pub fn hidden(total: Option<u64>) -> Self {
        Self {
            rows: AtomicU64::new(0),
            total,
            started: Instant::now(),
            display: None,
        }
    }

    /// Tracker for a run, drawn on stderr when `visible`
    ///
    /// # Arguments
    /// * `total` - Rows the run is expected to write, if known
    /// * `visible` - Whether to draw a bar or spinner
    pub fn new(total: Option<u64>, visible: bool) -> Self {
        let mut tracker = Self::hidden(total);
        if visible {
            tracker.display = Some(match total {
                Some(n) => bounded_bar(n),
                None => spinner(),
            });
        }
        tracker
    }

    /// Tracker sized from the provider a source returned
    ///
    /// Materialized rows give an exact total once the cap is applied; a
    /// paginated provider is only bounded by the cap, if any.
    pub fn for_provider<R>(provider: &RowProvider<R>, cap: Option<usize>, visible: bool) -> Self {
        let total = match provider {
            RowProvider::Materialized(rows) => {
                Some(cap.map_or(rows.len(), |cap| cap.min(rows.len())) as u64)
            }
            RowProvider::Paginated(_) => cap.map(|cap| cap as u64),
        };
        Self::new(total, visible)
    }

    /// Record the number of rows written so far
    pub fn update(&self, rows: u64) {
        self.rows.store(rows, Ordering::Relaxed);

        if let Some(display) = &self.display {
            display.set_position(rows);
            let secs = self.started.elapsed().as_secs_f64();
            if secs > 0.0 {
                display.set_message(format!("({:.0} rows/sec)", rows as f64 / secs));
            }
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Expected row count, when known up front
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_visible(&self) -> bool {
        self.display.is_some()
    }

    /// Clear the display
    pub fn finish(&self) {
        if let Some(display) = &self.display {
            display.finish_and_clear();
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn bounded_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rows {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {pos} rows {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar
}
