//! End-to-end migration tests against an embedded DuckDB store

#![cfg(feature = "duckdb-backend")]

use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use tempfile::TempDir;

use aircraft_history::migration::{
    DuckDbStore, LocalSource, MigrationError, MigrationSettings, Migrator, PositionSchema,
    PositionStore, SchemaOptions, Validator,
};

async fn memory_store() -> DuckDbStore {
    let store = DuckDbStore::memory().unwrap();
    store.ensure_schema(&SchemaOptions::default()).await.unwrap();
    store
}

fn position(index: usize) -> Value {
    json!({
        "ICAO": format!("{:06X}", 0xA00000 + index),
        "Ident": format!("UAL{}", index),
        "Position_Time": "2025-01-01T12:00:00Z",
        "Latitude": 41.0 + index as f64 / 1000.0,
        "Longitude": "-87.9",
        "Altitude_ft": 30000,
        "Speed_kt": "450"
    })
}

fn write_snapshot(dir: &Path, name: &str, records: &[Value]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, serde_json::to_string(records).unwrap()).unwrap();
}

#[tokio::test]
async fn test_second_run_inserts_nothing() {
    let dir = TempDir::new().unwrap();
    let records: Vec<Value> = (0..100).map(position).collect();
    write_snapshot(dir.path(), "snapshot_20250101_120000.json", &records);

    let store = memory_store().await;
    let source = LocalSource::new(dir.path());
    let settings = MigrationSettings::default();

    let first = Migrator::new(&settings, &store).run(&source).await.unwrap();
    assert_eq!(first.records_loaded, 100);
    assert_eq!(first.records_inserted, 100);
    assert_eq!(store.row_count().await.unwrap(), 100);

    let second = Migrator::new(&settings, &store).run(&source).await.unwrap();
    assert_eq!(second.records_loaded, 100);
    assert_eq!(second.records_inserted, 0);
    assert_eq!(store.row_count().await.unwrap(), 100);
}

#[tokio::test]
async fn test_failed_batch_does_not_affect_others() {
    let dir = TempDir::new().unwrap();
    let records: Vec<Value> = (0..1000)
        .map(|i| {
            let mut record = position(i);
            if i >= 500 {
                record["Altitude_ft"] = json!(70000);
            }
            record
        })
        .collect();
    write_snapshot(dir.path(), "snapshot.json", &records);

    // Same table with an extra CHECK the second half violates
    let store = DuckDbStore::memory().unwrap();
    let ddl = PositionSchema::create_table_duckdb().replace(
        "altitude_ft INTEGER,",
        "altitude_ft INTEGER CHECK (altitude_ft < 60000),",
    );
    store.execute_batch(&ddl).unwrap();

    let settings = MigrationSettings::builder().batch_size(500).build().unwrap();
    let progress = Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.records_loaded, 1000);
    assert_eq!(progress.records_inserted, 500);
    assert_eq!(progress.batches_failed, 1);
    assert_eq!(progress.files_processed, 1);
    assert_eq!(store.row_count().await.unwrap(), 500);
}

#[tokio::test]
async fn test_batches_around_a_failed_batch_are_committed() {
    let dir = TempDir::new().unwrap();
    let records: Vec<Value> = (0..1500)
        .map(|i| {
            let mut record = position(i);
            if (500..1000).contains(&i) {
                record["Altitude_ft"] = json!(70000);
            }
            record
        })
        .collect();
    write_snapshot(dir.path(), "snapshot.json", &records);

    let store = DuckDbStore::memory().unwrap();
    let ddl = PositionSchema::create_table_duckdb().replace(
        "altitude_ft INTEGER,",
        "altitude_ft INTEGER CHECK (altitude_ft < 60000),",
    );
    store.execute_batch(&ddl).unwrap();

    let settings = MigrationSettings::builder().batch_size(500).build().unwrap();
    let progress = Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.records_loaded, 1500);
    assert_eq!(progress.records_inserted, 1000);
    assert_eq!(progress.batches_failed, 1);
    assert_eq!(store.row_count().await.unwrap(), 1000);
    assert_eq!(store.non_null_count("altitude_ft").await.unwrap(), 1000);
    assert_eq!(store.distinct_aircraft().await.unwrap(), 1000);
}

#[tokio::test]
async fn test_validator_after_single_record() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("one.json"),
        r#"{"ICAO":"ABC123","Position_Time":"2025-01-01T12:00:00Z","Latitude":"41.5","Altitude_ft":"350"}"#,
    )
    .unwrap();

    let store = memory_store().await;
    let settings = MigrationSettings::default();
    Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap();

    let report = Validator::new(&store).validate().await.unwrap();
    let noon = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

    assert_eq!(report.total_rows, 1);
    assert_eq!(report.earliest, Some(noon));
    assert_eq!(report.latest, Some(noon));
    assert_eq!(report.distinct_aircraft, 1);

    let latitude = report.completeness_of("latitude").unwrap();
    assert_eq!((latitude.non_null, latitude.total), (1, 1));
    let speed = report.completeness_of("speed_kt").unwrap();
    assert_eq!((speed.non_null, speed.total), (0, 1));
}

#[tokio::test]
async fn test_bad_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    write_snapshot(dir.path(), "a.json", &[position(1), position(2)]);
    fs::write(dir.path().join("b.json"), "{ not json").unwrap();
    fs::write(dir.path().join("c.json"), "\"just a string\"").unwrap();
    fs::write(dir.path().join("d.json"), "[]").unwrap();
    write_snapshot(dir.path(), "nested/2025/e.json", &[position(3)]);
    fs::write(dir.path().join("ignored.txt"), "[]").unwrap();

    let store = memory_store().await;
    let settings = MigrationSettings::default();
    let progress = Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.files_total, 5);
    assert_eq!(progress.files_processed, 2);
    assert_eq!(progress.files_skipped, 3);
    assert_eq!(progress.records_loaded, 3);
    assert_eq!(progress.records_inserted, 3);
}

#[tokio::test]
async fn test_max_files_limits_run() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        write_snapshot(dir.path(), &format!("snapshot_{i}.json"), &[position(i)]);
    }

    let store = memory_store().await;
    let settings = MigrationSettings::builder().max_files(Some(2)).build().unwrap();
    let progress = Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.files_total, 2);
    assert_eq!(store.row_count().await.unwrap(), 2);
    assert_eq!(store.distinct_aircraft().await.unwrap(), 2);
}

#[tokio::test]
async fn test_empty_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("readme.txt"), "no snapshots here").unwrap();

    let store = memory_store().await;
    let settings = MigrationSettings::default();
    let err = Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::NoSources(_)));
    assert_eq!(store.row_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_overlapping_snapshots_keep_first_sample() {
    let dir = TempDir::new().unwrap();
    let mut later = position(7);
    later["Speed_kt"] = json!(999);
    write_snapshot(dir.path(), "a.json", &[position(7)]);
    write_snapshot(dir.path(), "b.json", &[later, position(8)]);

    let store = memory_store().await;
    let settings = MigrationSettings::default();
    let progress = Migrator::new(&settings, &store)
        .run(&LocalSource::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(progress.records_loaded, 3);
    assert_eq!(progress.records_inserted, 2);
    assert_eq!(store.row_count().await.unwrap(), 2);
}
