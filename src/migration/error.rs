//! Error types for migration operations

use thiserror::Error;

/// Errors raised while enumerating or reading snapshot sources
///
/// These never abort a run: the enumerator and loader log them and carry on
/// with a shorter file list or an empty record set.
#[derive(Error, Debug)]
pub enum SourceError {
    /// A listing or read of one source failed
    #[error("Source not accessible: {path} - {reason}")]
    Unavailable { path: String, reason: String },

    /// The snapshot body is not JSON, or not an object / array of objects
    #[error("Invalid snapshot format: {path} - {reason}")]
    Decode { path: String, reason: String },

    /// Glob pattern could not be compiled
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Errors reported by a destination store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The destination cannot be reached at all
    #[error("Destination unreachable: {0}")]
    Unreachable(String),

    /// A batch write failed and was rolled back
    #[error("Batch write failed: {0}")]
    Batch(String),

    /// A read query failed
    #[error("Query error: {0}")]
    Query(String),

    /// Schema creation or verification failed
    #[error("Schema error: {0}")]
    Schema(String),
}

impl StoreError {
    /// Whether this error means no further write can succeed
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Unreachable(_))
    }
}

/// Run-level migration errors
#[derive(Error, Debug)]
pub enum MigrationError {
    /// Connection-level failure; the only condition that aborts a run
    #[error("Destination unreachable: {0}")]
    DestinationUnreachable(String),

    /// Enumeration produced nothing to process
    #[error("No snapshot files found in {0}")]
    NoSources(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Store error outside of a batch write (schema, validation queries)
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for MigrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unreachable(msg) => MigrationError::DestinationUnreachable(msg),
            other => MigrationError::Store(other),
        }
    }
}

impl MigrationError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            MigrationError::DestinationUnreachable(msg) => {
                format!(
                    "Cannot reach the destination database: {msg}\n\n\
                    Hint: Check --db-host/--db-port and that TimescaleDB is running."
                )
            }
            MigrationError::NoSources(location) => {
                format!(
                    "No snapshot files found in {location}\n\n\
                    Hint: Snapshots must end in .json; check --source-dir or --s3-bucket/--s3-prefix."
                )
            }
            MigrationError::InvalidConfig(msg) => {
                format!("Invalid configuration: {msg}\n\nHint: Check your migration configuration.")
            }
            MigrationError::Store(StoreError::Schema(msg)) => {
                format!(
                    "Schema setup failed: {msg}\n\n\
                    Hint: The destination must have the timescaledb extension installed."
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(feature = "duckdb-backend")]
impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

#[cfg(feature = "postgres-backend")]
impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            StoreError::Unreachable(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }
}

#[cfg(feature = "postgres-backend")]
impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StoreError::Unreachable(err.to_string())
    }
}
