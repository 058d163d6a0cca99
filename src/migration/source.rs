//! Snapshot discovery and loading
//!
//! Sources never fail a run. Listing problems shorten the file list and
//! loading problems produce an empty record set; both are logged.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::config::SNAPSHOT_EXTENSION;
use super::error::SourceError;
use super::record::RawRecord;

/// A location holding JSON snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Identifiers of every snapshot, sorted ascending
    async fn list(&self) -> Vec<String>;

    /// Raw bytes of one snapshot
    async fn read(&self, id: &str) -> Result<Vec<u8>, SourceError>;

    /// Human-readable location, used in logs and errors
    fn describe(&self) -> String;

    /// Load one snapshot as raw records.
    ///
    /// Read and decode failures are logged and yield no records.
    async fn load(&self, id: &str) -> Vec<RawRecord> {
        let bytes = match self.read(id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", id, e);
                return Vec::new();
            }
        };

        match decode_snapshot(id, &bytes) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", id, e);
                Vec::new()
            }
        }
    }
}

/// Decode a snapshot body.
///
/// A single object is a one-record snapshot. In an array, entries that are
/// not objects are dropped with a warning.
pub fn decode_snapshot(id: &str, bytes: &[u8]) -> Result<Vec<RawRecord>, SourceError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| SourceError::Decode {
        path: id.to_string(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => {
            let total = items.len();
            let records: Vec<RawRecord> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();

            if records.len() < total {
                tracing::warn!(
                    "{}: ignored {} non-object entries",
                    id,
                    total - records.len()
                );
            }
            Ok(records)
        }
        other => Err(SourceError::Decode {
            path: id.to_string(),
            reason: format!("expected an object or array of objects, found {}", kind(&other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Snapshots stored under a local directory, searched recursively
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    /// Create a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pattern(&self) -> String {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        format!("{}/**/*{}", root.trim_end_matches('/'), SNAPSHOT_EXTENSION)
    }
}

#[async_trait]
impl SnapshotSource for LocalSource {
    async fn list(&self) -> Vec<String> {
        if !self.root.is_dir() {
            tracing::warn!("Source directory not found: {}", self.root.display());
            return Vec::new();
        }

        let pattern = self.pattern();
        let entries = match glob::glob(&pattern) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("{}", SourceError::InvalidPattern(format!("{}: {}", pattern, e)));
                return Vec::new();
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => {
                    if path.is_file() {
                        files.push(path.to_string_lossy().into_owned());
                    }
                }
                Err(e) => {
                    // Unreadable subdirectory; keep what we have
                    tracing::warn!("Error accessing path: {}", e);
                }
            }
        }

        files.sort();
        files
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>, SourceError> {
        tokio::fs::read(id)
            .await
            .map_err(|e| SourceError::Unavailable {
                path: id.to_string(),
                reason: e.to_string(),
            })
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
