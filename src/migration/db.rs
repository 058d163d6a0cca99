//! Position store backends
//!
//! `DuckDbStore` is an embedded destination used for local runs and tests.
//! `TimescaleStore` writes to TimescaleDB through a connection pool.

#[cfg(feature = "duckdb-backend")]
use std::path::{Path, PathBuf};
#[cfg(feature = "duckdb-backend")]
use std::sync::{Mutex, MutexGuard};

#[cfg(feature = "duckdb-backend")]
use async_trait::async_trait;
#[cfg(feature = "duckdb-backend")]
use chrono::{DateTime, Utc};

#[cfg(feature = "duckdb-backend")]
use super::error::StoreError;
#[cfg(feature = "duckdb-backend")]
use super::record::{CanonicalPositionRecord, parse_timestamp};
#[cfg(feature = "duckdb-backend")]
use super::schema::{PositionSchema, SchemaOptions};
#[cfg(feature = "duckdb-backend")]
use super::store::{PositionStore, TimeRange, checked_column};

/// Text form used to bind timestamps into DuckDB
#[cfg(feature = "duckdb-backend")]
const DUCKDB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Embedded DuckDB position store
#[cfg(feature = "duckdb-backend")]
pub struct DuckDbStore {
    conn: Mutex<duckdb::Connection>,
    path: Option<PathBuf>,
}

#[cfg(feature = "duckdb-backend")]
impl DuckDbStore {
    /// Open or create a database file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = duckdb::Connection::open(path)
            .map_err(|e| StoreError::Unreachable(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn memory() -> Result<Self, StoreError> {
        let conn = duckdb::Connection::open_in_memory()
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Get the database path (if not in-memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run raw DDL; used to install alternative table definitions
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| StoreError::Schema(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, duckdb::Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Query("DuckDB connection lock poisoned".to_string()))
    }

    fn count(conn: &duckdb::Connection, sql: &str) -> Result<u64, duckdb::Error> {
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn write_batch(
        conn: &mut duckdb::Connection,
        records: &[CanonicalPositionRecord],
    ) -> Result<u64, duckdb::Error> {
        let tx = conn.transaction()?;
        let before = Self::count(&tx, "SELECT COUNT(*) FROM aircraft_positions")?;

        {
            let mut stmt = tx.prepare(&PositionSchema::insert_duckdb())?;
            for r in records {
                stmt.execute(duckdb::params![
                    format_time(&r.time),
                    r.icao,
                    r.flight,
                    r.airline,
                    r.registration,
                    r.aircraft_type,
                    r.latitude,
                    r.longitude,
                    r.altitude_ft,
                    r.speed_kt,
                    r.vertical_rate_ft_min,
                    r.distance_nm,
                    r.heading,
                    r.messages,
                    r.rssi,
                    r.age,
                    r.data_quality,
                    r.receiver_id,
                    format_time(&r.first_seen),
                    format_time(&r.last_seen),
                ])?;
            }
        }

        let after = Self::count(&tx, "SELECT COUNT(*) FROM aircraft_positions")?;
        tx.commit()?;

        Ok(after.saturating_sub(before))
    }
}

#[cfg(feature = "duckdb-backend")]
fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DUCKDB_TIME_FORMAT).to_string()
}

/// DuckDB error classes after which the database file takes no more writes
#[cfg(feature = "duckdb-backend")]
const FATAL_DUCKDB_ERRORS: [&str; 6] = [
    "IO Error",
    "Connection Error",
    "FATAL Error",
    "Permission Error",
    "Out of Memory Error",
    "read-only mode",
];

/// Inside a batch, constraint and conversion failures roll back; storage
/// failures mean the destination is gone.
#[cfg(feature = "duckdb-backend")]
fn batch_error(err: duckdb::Error) -> StoreError {
    classify_batch_failure(err.to_string())
}

#[cfg(feature = "duckdb-backend")]
fn classify_batch_failure(message: String) -> StoreError {
    if FATAL_DUCKDB_ERRORS.iter().any(|class| message.contains(class)) {
        StoreError::Unreachable(message)
    } else {
        StoreError::Batch(message)
    }
}

#[cfg(feature = "duckdb-backend")]
#[async_trait]
impl PositionStore for DuckDbStore {
    async fn ensure_schema(&self, options: &SchemaOptions) -> Result<(), StoreError> {
        tracing::debug!(
            "DuckDB has no retention or compression policies; ignoring {:?}",
            options
        );
        self.execute_batch(PositionSchema::create_table_duckdb())
    }

    async fn insert_batch(&self, records: &[CanonicalPositionRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        Self::write_batch(&mut conn, records).map_err(batch_error)
    }

    async fn row_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        Ok(Self::count(&conn, "SELECT COUNT(*) FROM aircraft_positions")?)
    }

    async fn time_range(&self) -> Result<TimeRange, StoreError> {
        let conn = self.lock()?;
        let (min, max): (Option<String>, Option<String>) = conn.query_row(
            "SELECT strftime(MIN(time), '%Y-%m-%dT%H:%M:%S.%f'), \
                    strftime(MAX(time), '%Y-%m-%dT%H:%M:%S.%f') \
             FROM aircraft_positions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((
            min.as_deref().and_then(parse_timestamp),
            max.as_deref().and_then(parse_timestamp),
        ))
    }

    async fn distinct_aircraft(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        Ok(Self::count(
            &conn,
            "SELECT COUNT(DISTINCT icao) FROM aircraft_positions",
        )?)
    }

    async fn non_null_count(&self, column: &str) -> Result<u64, StoreError> {
        let column = checked_column(column)?;
        let conn = self.lock()?;
        Ok(Self::count(
            &conn,
            &format!("SELECT COUNT({}) FROM aircraft_positions", column),
        )?)
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("duckdb:{}", path.display()),
            None => "duckdb:memory".to_string(),
        }
    }
}

// ============================================================================
// TimescaleDB backend
// ============================================================================

#[cfg(feature = "postgres-backend")]
pub use postgres_impl::TimescaleStore;

#[cfg(feature = "postgres-backend")]
mod postgres_impl {
    use std::time::Duration;

    use async_trait::async_trait;
    use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
    use tokio_postgres::NoTls;
    use tokio_postgres::types::ToSql;

    use crate::config::DestinationConfig;
    use crate::migration::error::StoreError;
    use crate::migration::record::CanonicalPositionRecord;
    use crate::migration::schema::{PositionSchema, SchemaOptions};
    use crate::migration::store::{PositionStore, TimeRange, checked_column};

    /// TimescaleDB position store (async, pooled)
    pub struct TimescaleStore {
        pool: Pool,
        display: String,
    }

    impl TimescaleStore {
        /// Build a pool and check that the server answers.
        ///
        /// Fails with [`StoreError::Unreachable`] when no connection can be made.
        pub async fn connect(destination: &DestinationConfig) -> Result<Self, StoreError> {
            let mut cfg = Config::new();
            cfg.host = Some(destination.host.clone());
            cfg.port = Some(destination.port);
            cfg.dbname = Some(destination.database.clone());
            cfg.user = Some(destination.user.clone());
            cfg.password = destination.password.clone();
            cfg.connect_timeout = Some(Duration::from_secs(destination.connect_timeout_secs));
            cfg.manager = Some(ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            });

            let pool = cfg
                .create_pool(Some(Runtime::Tokio1), NoTls)
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;

            let store = Self {
                pool,
                display: destination.display(),
            };

            let client = store.client().await?;
            client
                .simple_query("SELECT 1")
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;

            tracing::info!("Connected to {}", store.display);
            Ok(store)
        }

        async fn client(&self) -> Result<deadpool_postgres::Client, StoreError> {
            Ok(self.pool.get().await?)
        }

        async fn count(&self, sql: &str) -> Result<u64, StoreError> {
            let client = self.client().await?;
            let row = client.query_one(sql, &[]).await?;
            let count: i64 = row.get(0);
            Ok(count.max(0) as u64)
        }
    }

    /// Inside a batch, anything short of a lost connection is a rollback
    fn batch_error(err: tokio_postgres::Error) -> StoreError {
        if err.is_closed() {
            StoreError::Unreachable(err.to_string())
        } else {
            StoreError::Batch(err.to_string())
        }
    }

    fn schema_error(err: tokio_postgres::Error) -> StoreError {
        if err.is_closed() {
            StoreError::Unreachable(err.to_string())
        } else {
            StoreError::Schema(err.to_string())
        }
    }

    #[async_trait]
    impl PositionStore for TimescaleStore {
        async fn ensure_schema(&self, options: &SchemaOptions) -> Result<(), StoreError> {
            let client = self.client().await?;

            // One statement at a time: continuous aggregates refuse to be
            // created inside a transaction block.
            for statement in PositionSchema::create_table_postgres() {
                client.batch_execute(&statement).await.map_err(schema_error)?;
            }

            let compressed = client
                .query_opt(PositionSchema::select_compression_enabled(), &[])
                .await
                .map_err(schema_error)?
                .and_then(|row| row.get::<_, Option<bool>>(0))
                .unwrap_or(false);
            if !compressed {
                client
                    .batch_execute(PositionSchema::enable_compression())
                    .await
                    .map_err(schema_error)?;
            }

            for statement in PositionSchema::timescale_policies(options) {
                client.batch_execute(&statement).await.map_err(schema_error)?;
            }

            tracing::info!(
                "Schema verified (retention {}d, compression {}d, hourly rollup {})",
                options.retention_days,
                options.compression_days,
                options.hourly_rollup
            );
            Ok(())
        }

        async fn insert_batch(
            &self,
            records: &[CanonicalPositionRecord],
        ) -> Result<u64, StoreError> {
            if records.is_empty() {
                return Ok(0);
            }

            let mut client = self.client().await?;
            let tx = client.transaction().await.map_err(batch_error)?;

            let mut inserted = 0u64;
            for chunk in records.chunks(PositionSchema::MAX_ROWS_PER_STATEMENT) {
                let stmt = tx
                    .prepare_cached(&PositionSchema::insert_postgres(chunk.len()))
                    .await
                    .map_err(batch_error)?;

                let mut params: Vec<&(dyn ToSql + Sync)> =
                    Vec::with_capacity(chunk.len() * PositionSchema::COLUMNS.len());
                for r in chunk {
                    let row: [&(dyn ToSql + Sync); 20] = [
                        &r.time,
                        &r.icao,
                        &r.flight,
                        &r.airline,
                        &r.registration,
                        &r.aircraft_type,
                        &r.latitude,
                        &r.longitude,
                        &r.altitude_ft,
                        &r.speed_kt,
                        &r.vertical_rate_ft_min,
                        &r.distance_nm,
                        &r.heading,
                        &r.messages,
                        &r.rssi,
                        &r.age,
                        &r.data_quality,
                        &r.receiver_id,
                        &r.first_seen,
                        &r.last_seen,
                    ];
                    params.extend_from_slice(&row);
                }
                inserted += tx.execute(&stmt, &params).await.map_err(batch_error)?;
            }

            tx.commit().await.map_err(batch_error)?;
            Ok(inserted)
        }

        async fn row_count(&self) -> Result<u64, StoreError> {
            self.count("SELECT COUNT(*) FROM aircraft_positions").await
        }

        async fn time_range(&self) -> Result<TimeRange, StoreError> {
            let client = self.client().await?;
            let row = client
                .query_one("SELECT MIN(time), MAX(time) FROM aircraft_positions", &[])
                .await?;
            Ok((row.get(0), row.get(1)))
        }

        async fn distinct_aircraft(&self) -> Result<u64, StoreError> {
            self.count("SELECT COUNT(DISTINCT icao) FROM aircraft_positions")
                .await
        }

        async fn non_null_count(&self, column: &str) -> Result<u64, StoreError> {
            let column = checked_column(column)?;
            self.count(&format!("SELECT COUNT({}) FROM aircraft_positions", column))
                .await
        }

        fn describe(&self) -> String {
            self.display.clone()
        }
    }
}
