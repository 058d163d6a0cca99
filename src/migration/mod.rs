//! Snapshot migration into the position history
//!
//! This module moves aircraft snapshots into a deduplicated store:
//! - Snapshot discovery on a local tree or an S3 prefix
//! - Record normalization with timestamp fallback and safe coercion
//! - Idempotent batched writes keyed by `(icao, time)`
//! - Post-load validation
//!
//! # Example
//!
//! ```rust,ignore
//! use aircraft_history::migration::{
//!     DuckDbStore, LocalSource, MigrationSettings, Migrator, PositionStore, SchemaOptions,
//!     Validator,
//! };
//!
//! let store = DuckDbStore::memory()?;
//! store.ensure_schema(&SchemaOptions::default()).await?;
//!
//! let settings = MigrationSettings::default();
//! let progress = Migrator::new(&settings, &store)
//!     .run(&LocalSource::new("./data"))
//!     .await?;
//!
//! println!("{} records inserted", progress.records_inserted);
//! println!("{}", Validator::new(&store).validate().await?);
//! ```

pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod progress;
pub mod record;
#[cfg(feature = "s3")]
pub mod s3;
pub mod schema;
pub mod source;
pub mod store;
pub mod validate;
pub mod writer;

pub use config::{MigrationSettings, SourceType};
#[cfg(feature = "duckdb-backend")]
pub use db::DuckDbStore;
#[cfg(feature = "postgres-backend")]
pub use db::TimescaleStore;
pub use driver::Migrator;
pub use error::{MigrationError, SourceError, StoreError};
pub use progress::MigrationProgress;
pub use record::{CanonicalPositionRecord, RawRecord, RecordTransformer, parse_timestamp};
#[cfg(feature = "s3")]
pub use s3::{S3SnapshotSource, S3Source, SecureCredentials};
pub use schema::{PositionSchema, SchemaOptions};
pub use source::{LocalSource, SnapshotSource};
pub use store::PositionStore;
pub use validate::{FieldCompleteness, ValidationReport, Validator};
pub use writer::{BatchOutcome, BatchWriter};
