//! Run counters and progress display
//!
//! [`MigrationProgress`] holds the counters of one run. [`MigrationProgressBar`]
//! draws them on stderr with `indicatif`, or stays hidden.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

/// Counters for one migration run
///
/// Only ever increased while the run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    /// Snapshots selected for this run
    pub files_total: usize,
    /// Snapshots that produced at least one record
    pub files_processed: usize,
    /// Snapshots that produced no records
    pub files_skipped: usize,
    /// Raw records loaded from snapshots
    pub records_loaded: u64,
    /// Rows newly stored
    pub records_inserted: u64,
    /// Batches rolled back
    pub batches_failed: usize,
    /// Wall time of the run
    #[serde(skip)]
    pub duration: Duration,
}

impl MigrationProgress {
    /// Create new empty progress
    pub fn new() -> Self {
        Self::default()
    }

    /// Get inserted records per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.records_inserted as f64 / secs
        }
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let secs = self.duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

/// File progress bar for a migration run
pub struct MigrationProgressBar {
    bar: ProgressBar,
}

impl MigrationProgressBar {
    /// Create a bar over `total_files`; a hidden bar when `visible` is false
    pub fn new(total_files: u64, visible: bool) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(total_files);
        let style = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} files {msg}",
        )
        .map(|style| style.progress_chars("█▓▒░  "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Show the running insert count next to the bar
    pub fn update(&self, progress: &MigrationProgress) {
        self.bar.set_message(format!(
            "({} inserted)",
            format_number(progress.records_inserted)
        ));
    }

    /// Increment file progress by one
    pub fn inc_files(&self) {
        self.bar.inc(1);
    }

    /// Finish with success message
    pub fn finish_success(&self, msg: &str) {
        self.bar.finish_with_message(format!("✓ {}", msg));
    }

    /// Finish with error message
    pub fn finish_error(&self, msg: &str) {
        self.bar.abandon_with_message(format!("✗ {}", msg));
    }
}

/// Format a number with thousand separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
