//! Aircraft position history
//!
//! Migrates aircraft-tracking JSON snapshots into a deduplicated, time-partitioned
//! position history:
//! - Snapshot discovery on local disk or S3
//! - Record normalization into canonical position samples
//! - Idempotent batched writes to TimescaleDB or an embedded DuckDB file
//! - Post-load integrity reports

pub mod config;
pub mod migration;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError, DestinationConfig};
pub use migration::{
    CanonicalPositionRecord, MigrationError, MigrationProgress, MigrationSettings, Migrator,
    PositionStore, SnapshotSource, ValidationReport, Validator,
};
