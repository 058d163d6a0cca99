//! Configuration types for snapshot migration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Receiver id written when none is configured
pub const DEFAULT_RECEIVER_ID: &str = "primary";

/// File extension of snapshot files and objects
pub const SNAPSHOT_EXTENSION: &str = ".json";

/// Default number of records per write transaction
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Where snapshots are read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Local directory tree
    Local(PathBuf),
    /// S3 bucket and key prefix
    #[cfg(feature = "s3")]
    S3 { bucket: String, prefix: String },
}

/// Settings that shape one migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Records per write transaction
    pub batch_size: usize,
    /// Process at most this many snapshots, in enumeration order
    pub max_files: Option<usize>,
    /// Receiver id stamped onto every record
    pub receiver_id: String,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_files: None,
            receiver_id: DEFAULT_RECEIVER_ID.to_string(),
            show_progress: false,
        }
    }
}

impl MigrationSettings {
    /// Create a new builder for MigrationSettings
    pub fn builder() -> MigrationSettingsBuilder {
        MigrationSettingsBuilder::default()
    }

    /// Batch size clamped to at least one record
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Builder for MigrationSettings
#[derive(Debug, Default)]
pub struct MigrationSettingsBuilder {
    batch_size: Option<usize>,
    max_files: Option<usize>,
    receiver_id: Option<String>,
    show_progress: bool,
}

impl MigrationSettingsBuilder {
    /// Set the batch size for database inserts
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Limit the number of snapshots processed
    pub fn max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }

    /// Set the receiver id
    pub fn receiver_id(mut self, receiver_id: &str) -> Self {
        self.receiver_id = Some(receiver_id.to_string());
        self
    }

    /// Enable the progress bar
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Build the MigrationSettings
    pub fn build(self) -> Result<MigrationSettings, String> {
        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err("Batch size must be at least 1".to_string());
        }

        if self.max_files == Some(0) {
            return Err("Max files must be at least 1".to_string());
        }

        let receiver_id = self
            .receiver_id
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| DEFAULT_RECEIVER_ID.to_string());
        if receiver_id.is_empty() {
            return Err("Receiver id must not be empty".to_string());
        }

        Ok(MigrationSettings {
            batch_size,
            max_files: self.max_files,
            receiver_id,
            show_progress: self.show_progress,
        })
    }
}
