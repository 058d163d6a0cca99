//! Post-load integrity report
//!
//! Read-only aggregate queries against the configured store. A report is
//! descriptive; nothing here changes data or decides whether a run passed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use super::progress::format_number;
use super::store::PositionStore;

/// Fields whose fill rate is reported
pub const COMPLETENESS_FIELDS: [&str; 4] = ["latitude", "longitude", "altitude_ft", "speed_kt"];

/// Non-null share of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCompleteness {
    pub field: String,
    pub non_null: u64,
    pub total: u64,
}

impl FieldCompleteness {
    /// Fraction of rows with a value; 0.0 for an empty store
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.non_null as f64 / self.total as f64
        }
    }
}

/// Result of [`Validator::validate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub total_rows: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub distinct_aircraft: u64,
    pub completeness: Vec<FieldCompleteness>,
}

impl ValidationReport {
    /// Completeness entry for `field`, if it was measured
    pub fn completeness_of(&self, field: &str) -> Option<&FieldCompleteness> {
        self.completeness.iter().find(|c| c.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |t: &Option<DateTime<Utc>>| match t {
            Some(t) => t.to_rfc3339(),
            None => "-".to_string(),
        };

        writeln!(f, "Total records:     {}", format_number(self.total_rows))?;
        writeln!(f, "Time range:        {} .. {}", show(&self.earliest), show(&self.latest))?;
        writeln!(f, "Distinct aircraft: {}", format_number(self.distinct_aircraft))?;
        write!(f, "Field completeness:")?;
        for c in &self.completeness {
            write!(
                f,
                "\n  {:<12} {:>6.1}% ({}/{})",
                c.field,
                c.ratio() * 100.0,
                format_number(c.non_null),
                format_number(c.total)
            )?;
        }
        Ok(())
    }
}

/// Runs integrity queries against a store
pub struct Validator<'a> {
    store: &'a dyn PositionStore,
}

impl<'a> Validator<'a> {
    pub fn new(store: &'a dyn PositionStore) -> Self {
        Self { store }
    }

    /// Build a report for the current contents of the store
    pub async fn validate(&self) -> Result<ValidationReport, StoreError> {
        let total_rows = self.store.row_count().await?;
        let (earliest, latest) = self.store.time_range().await?;
        let distinct_aircraft = self.store.distinct_aircraft().await?;

        let mut completeness = Vec::with_capacity(COMPLETENESS_FIELDS.len());
        for field in COMPLETENESS_FIELDS {
            completeness.push(FieldCompleteness {
                field: field.to_string(),
                non_null: self.store.non_null_count(field).await?,
                total: total_rows,
            });
        }

        Ok(ValidationReport {
            total_rows,
            earliest,
            latest,
            distinct_aircraft,
            completeness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio() {
        let c = FieldCompleteness {
            field: "latitude".to_string(),
            non_null: 3,
            total: 4,
        };
        assert_eq!(c.ratio(), 0.75);

        let empty = FieldCompleteness {
            field: "latitude".to_string(),
            non_null: 0,
            total: 0,
        };
        assert_eq!(empty.ratio(), 0.0);
    }

    #[test]
    fn test_report_display() {
        let report = ValidationReport {
            total_rows: 1500,
            earliest: None,
            latest: None,
            distinct_aircraft: 12,
            completeness: vec![FieldCompleteness {
                field: "speed_kt".to_string(),
                non_null: 750,
                total: 1500,
            }],
        };

        let text = report.to_string();
        assert!(text.contains("Total records:     1,500"));
        assert!(text.contains("Distinct aircraft: 12"));
        assert!(text.contains("50.0%"));
        assert!(text.contains("- .. -"));
        assert!(report.completeness_of("speed_kt").is_some());
        assert!(report.completeness_of("heading").is_none());
    }

    #[cfg(feature = "duckdb-backend")]
    mod with_duckdb {
        use super::super::*;
        use crate::migration::db::DuckDbStore;
        use crate::migration::record::CanonicalPositionRecord;
        use crate::migration::schema::SchemaOptions;
        use chrono::TimeZone;

        #[tokio::test]
        async fn test_validate_empty_store() {
            let store = DuckDbStore::memory().unwrap();
            store.ensure_schema(&SchemaOptions::default()).await.unwrap();

            let report = Validator::new(&store).validate().await.unwrap();

            assert_eq!(report.total_rows, 0);
            assert_eq!(report.earliest, None);
            assert_eq!(report.latest, None);
            assert_eq!(report.distinct_aircraft, 0);
            assert_eq!(report.completeness.len(), COMPLETENESS_FIELDS.len());
            assert!(report.completeness.iter().all(|c| c.ratio() == 0.0));
        }

        #[tokio::test]
        async fn test_validate_single_row() {
            let store = DuckDbStore::memory().unwrap();
            store.ensure_schema(&SchemaOptions::default()).await.unwrap();

            let time = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
            let mut record = CanonicalPositionRecord::new("ABC123", time);
            record.latitude = Some(41.5);
            record.altitude_ft = Some(350);
            store.insert_batch(&[record]).await.unwrap();

            let report = Validator::new(&store).validate().await.unwrap();

            assert_eq!(report.total_rows, 1);
            assert_eq!(report.earliest, Some(time));
            assert_eq!(report.latest, Some(time));
            assert_eq!(report.distinct_aircraft, 1);
            assert_eq!(report.completeness_of("latitude").unwrap().ratio(), 1.0);
            assert_eq!(report.completeness_of("speed_kt").unwrap().non_null, 0);
        }
    }
}
