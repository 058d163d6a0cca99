//! Destination store abstraction
//!
//! Both backends implement the same write-once contract: a batch is one
//! transaction, and a row whose `(icao, time)` already exists is skipped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreError;
use super::record::CanonicalPositionRecord;
use super::schema::{PositionSchema, SchemaOptions};

/// Earliest and latest stored sample time; both `None` for an empty store
pub type TimeRange = (Option<DateTime<Utc>>, Option<DateTime<Utc>>);

/// A destination for canonical position records
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Create the table, indexes and policies if they do not exist
    async fn ensure_schema(&self, options: &SchemaOptions) -> Result<(), StoreError>;

    /// Insert a batch atomically, returning the number of new rows.
    ///
    /// Rows whose key is already stored are skipped. On error nothing from
    /// the batch is persisted.
    async fn insert_batch(&self, records: &[CanonicalPositionRecord]) -> Result<u64, StoreError>;

    /// Total stored rows
    async fn row_count(&self) -> Result<u64, StoreError>;

    /// Minimum and maximum stored time
    async fn time_range(&self) -> Result<TimeRange, StoreError>;

    /// Number of distinct aircraft
    async fn distinct_aircraft(&self) -> Result<u64, StoreError>;

    /// Rows where `column` is not null
    async fn non_null_count(&self, column: &str) -> Result<u64, StoreError>;

    /// Display name for logs
    fn describe(&self) -> String;
}

/// Reject anything that is not a position column before it reaches SQL text
pub(crate) fn checked_column(column: &str) -> Result<&str, StoreError> {
    if PositionSchema::is_column(column) {
        Ok(column)
    } else {
        Err(StoreError::Query(format!("Unknown column: {}", column)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_column() {
        assert_eq!(checked_column("latitude").unwrap(), "latitude");
        assert!(matches!(
            checked_column("latitude) FROM x; --"),
            Err(StoreError::Query(_))
        ));
    }
}
