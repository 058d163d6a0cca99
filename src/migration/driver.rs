//! Migration driver
//!
//! Pulls the snapshot list once, then loads, transforms and writes each
//! snapshot in order. Bad files and rejected batches are counted and skipped;
//! only a lost destination ends the run early.

use std::time::Instant;

use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::config::MigrationSettings;
use super::error::MigrationError;
use super::progress::{MigrationProgress, MigrationProgressBar, format_number};
use super::record::{CanonicalPositionRecord, RecordTransformer};
use super::source::SnapshotSource;
use super::store::PositionStore;
use super::writer::{BatchOutcome, BatchWriter};

/// Runs snapshots from a [`SnapshotSource`] into a [`PositionStore`]
pub struct Migrator<'a> {
    settings: &'a MigrationSettings,
    store: &'a dyn PositionStore,
    transformer: RecordTransformer,
    run_id: String,
}

impl<'a> Migrator<'a> {
    /// Create a migrator for one run
    pub fn new(settings: &'a MigrationSettings, store: &'a dyn PositionStore) -> Self {
        Self {
            settings,
            store,
            transformer: RecordTransformer::new(settings.receiver_id.clone()),
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Identifier attached to this run's log lines
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Migrate every snapshot the source lists.
    ///
    /// Returns [`MigrationError::NoSources`] when nothing is listed and
    /// [`MigrationError::DestinationUnreachable`] when the store goes away.
    pub async fn run(&self, source: &dyn SnapshotSource) -> Result<MigrationProgress, MigrationError> {
        let span = info_span!("migration", run_id = %self.run_id, source = %source.describe());
        self.run_inner(source).instrument(span).await
    }

    async fn run_inner(
        &self,
        source: &dyn SnapshotSource,
    ) -> Result<MigrationProgress, MigrationError> {
        let start = Instant::now();

        let mut files = source.list().await;
        if files.is_empty() {
            return Err(MigrationError::NoSources(source.describe()));
        }
        let found = files.len();
        if let Some(max) = self.settings.max_files {
            files.truncate(max);
        }

        info!(
            "Found {} snapshot files, processing {} into {}",
            found,
            files.len(),
            self.store.describe()
        );

        let mut progress = MigrationProgress {
            files_total: files.len(),
            ..Default::default()
        };
        let bar = MigrationProgressBar::new(files.len() as u64, self.settings.show_progress);

        for (index, file) in files.iter().enumerate() {
            info!("Processing file {}/{}: {}", index + 1, files.len(), file);

            if let Err(e) = self.migrate_file(source, file, &mut progress).await {
                progress.duration = start.elapsed();
                bar.finish_error(&e.to_string());
                error!(
                    files = progress.files_processed,
                    loaded = progress.records_loaded,
                    inserted = progress.records_inserted,
                    failed_batches = progress.batches_failed,
                    "Migration aborted at file {}/{} after {}: {}",
                    index + 1,
                    files.len(),
                    progress.duration_string(),
                    e
                );
                return Err(e);
            }

            bar.inc_files();
            bar.update(&progress);
        }

        progress.duration = start.elapsed();
        bar.finish_success(&format!(
            "{} records inserted",
            format_number(progress.records_inserted)
        ));
        info!(
            files = progress.files_processed,
            loaded = progress.records_loaded,
            inserted = progress.records_inserted,
            failed_batches = progress.batches_failed,
            "Migration finished in {}",
            progress.duration_string()
        );

        Ok(progress)
    }

    async fn migrate_file(
        &self,
        source: &dyn SnapshotSource,
        file: &str,
        progress: &mut MigrationProgress,
    ) -> Result<(), MigrationError> {
        let raw = source.load(file).await;
        if raw.is_empty() {
            warn!("No records in {}, skipping", file);
            progress.files_skipped += 1;
            return Ok(());
        }

        progress.records_loaded += raw.len() as u64;

        let records: Vec<CanonicalPositionRecord> = raw
            .iter()
            .filter_map(|r| self.transformer.transform(r))
            .collect();

        let writer = BatchWriter::new(self.store);
        let batch_size = self.settings.effective_batch_size();
        for (number, batch) in records.chunks(batch_size).enumerate() {
            match writer.write(batch).await? {
                BatchOutcome::Inserted(n) => {
                    progress.records_inserted += n;
                    info!("Batch {}: inserted {}/{} records", number + 1, n, batch.len());
                }
                BatchOutcome::RolledBack => {
                    progress.batches_failed += 1;
                }
            }
        }

        progress.files_processed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::error::{SourceError, StoreError};
    use crate::migration::schema::SchemaOptions;
    use crate::migration::store::TimeRange;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    /// Snapshots held in memory, keyed by name
    struct MemorySource {
        files: BTreeMap<String, String>,
    }

    impl MemorySource {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for MemorySource {
        async fn list(&self) -> Vec<String> {
            self.files.keys().cloned().collect()
        }

        async fn read(&self, id: &str) -> Result<Vec<u8>, SourceError> {
            self.files
                .get(id)
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| SourceError::Unavailable {
                    path: id.to_string(),
                    reason: "missing".to_string(),
                })
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }

    /// Keeps keys in a set; fails batches containing a given icao
    #[derive(Default)]
    struct SetStore {
        keys: Mutex<HashSet<(String, i64)>>,
        reject_icao: Option<&'static str>,
        unreachable: bool,
    }

    impl SetStore {
        fn icaos(&self) -> Vec<String> {
            let mut icaos: Vec<String> = self
                .keys
                .lock()
                .unwrap()
                .iter()
                .map(|(icao, _)| icao.clone())
                .collect();
            icaos.sort();
            icaos
        }
    }

    #[async_trait]
    impl PositionStore for SetStore {
        async fn ensure_schema(&self, _: &SchemaOptions) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert_batch(
            &self,
            records: &[CanonicalPositionRecord],
        ) -> Result<u64, StoreError> {
            if self.unreachable {
                return Err(StoreError::Unreachable("connection reset".to_string()));
            }
            if records.iter().any(|r| Some(r.icao.as_str()) == self.reject_icao) {
                return Err(StoreError::Batch("rejected".to_string()));
            }
            let mut keys = self.keys.lock().unwrap();
            let inserted = records
                .iter()
                .filter(|r| keys.insert((r.icao.clone(), r.time.timestamp())))
                .count();
            Ok(inserted as u64)
        }

        async fn row_count(&self) -> Result<u64, StoreError> {
            Ok(self.keys.lock().unwrap().len() as u64)
        }

        async fn time_range(&self) -> Result<TimeRange, StoreError> {
            Ok((None, None))
        }

        async fn distinct_aircraft(&self) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn non_null_count(&self, _: &str) -> Result<u64, StoreError> {
            Ok(0)
        }

        fn describe(&self) -> String {
            "set".to_string()
        }
    }

    fn snapshot(icaos: &[&str]) -> String {
        let entries: Vec<String> = icaos
            .iter()
            .map(|icao| format!(r#"{{"ICAO":"{icao}","Position_Time":"2025-01-01T12:00:00Z"}}"#))
            .collect();
        format!("[{}]", entries.join(","))
    }

    #[tokio::test]
    async fn test_run_counts_and_skips() {
        let source = MemorySource::new(&[
            ("a.json", &snapshot(&["A1", "A2", "A3"])),
            ("b.json", "not json"),
            ("c.json", "[]"),
            ("d.json", r#"{"ICAO":"D1","Last_Seen":"20250101_120500"}"#),
        ]);
        let store = SetStore::default();
        let settings = MigrationSettings::default();

        let progress = Migrator::new(&settings, &store).run(&source).await.unwrap();

        assert_eq!(progress.files_total, 4);
        assert_eq!(progress.files_processed, 2);
        assert_eq!(progress.files_skipped, 2);
        assert_eq!(progress.records_loaded, 4);
        assert_eq!(progress.records_inserted, 4);
        assert_eq!(progress.batches_failed, 0);
    }

    #[tokio::test]
    async fn test_run_with_no_sources() {
        let source = MemorySource::new(&[]);
        let store = SetStore::default();
        let settings = MigrationSettings::default();

        let err = Migrator::new(&settings, &store).run(&source).await.unwrap_err();
        assert!(matches!(err, MigrationError::NoSources(ref s) if s == "memory"));
    }

    #[tokio::test]
    async fn test_run_respects_max_files_and_batch_size() {
        let source = MemorySource::new(&[
            ("1.json", &snapshot(&["A", "B", "C", "D", "E"])),
            ("2.json", &snapshot(&["F"])),
        ]);
        let store = SetStore::default();
        let settings = MigrationSettings::builder()
            .batch_size(2)
            .max_files(Some(1))
            .build()
            .unwrap();

        let progress = Migrator::new(&settings, &store).run(&source).await.unwrap();

        assert_eq!(progress.files_total, 1);
        assert_eq!(progress.records_inserted, 5);
        assert_eq!(store.row_count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_run_isolates_failed_batches() {
        let source = MemorySource::new(&[("a.json", &snapshot(&["A", "B", "BAD", "C"]))]);
        let store = SetStore {
            reject_icao: Some("BAD"),
            ..Default::default()
        };
        let settings = MigrationSettings::builder().batch_size(2).build().unwrap();

        let progress = Migrator::new(&settings, &store).run(&source).await.unwrap();

        assert_eq!(progress.records_loaded, 4);
        assert_eq!(progress.records_inserted, 2);
        assert_eq!(progress.batches_failed, 1);
        assert_eq!(progress.files_processed, 1);
    }

    #[tokio::test]
    async fn test_batches_after_a_failed_batch_still_commit() {
        let source = MemorySource::new(&[("a.json", &snapshot(&["A", "BAD", "C"]))]);
        let store = SetStore {
            reject_icao: Some("BAD"),
            ..Default::default()
        };
        let settings = MigrationSettings::builder().batch_size(1).build().unwrap();

        let progress = Migrator::new(&settings, &store).run(&source).await.unwrap();

        assert_eq!(store.icaos(), vec!["A", "C"]);
        assert_eq!(progress.records_loaded, 3);
        assert_eq!(progress.records_inserted, 2);
        assert_eq!(progress.batches_failed, 1);
        assert_eq!(progress.files_processed, 1);
    }

    #[tokio::test]
    async fn test_run_aborts_when_destination_unreachable() {
        let source = MemorySource::new(&[
            ("a.json", &snapshot(&["A"])),
            ("b.json", &snapshot(&["B"])),
        ]);
        let store = SetStore {
            unreachable: true,
            ..Default::default()
        };
        let settings = MigrationSettings::default();

        let err = Migrator::new(&settings, &store).run(&source).await.unwrap_err();
        assert!(matches!(err, MigrationError::DestinationUnreachable(_)));
        assert_eq!(store.row_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let source = MemorySource::new(&[("a.json", &snapshot(&["A", "B"]))]);
        let store = SetStore::default();
        let settings = MigrationSettings::default();
        let migrator = Migrator::new(&settings, &store);

        assert_eq!(migrator.run(&source).await.unwrap().records_inserted, 2);
        let second = migrator.run(&source).await.unwrap();
        assert_eq!(second.records_loaded, 2);
        assert_eq!(second.records_inserted, 0);
        assert_eq!(store.row_count().await.unwrap(), 2);
        assert!(!migrator.run_id().is_empty());
    }
}
