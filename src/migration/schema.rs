//! Destination schema for the position history

use serde::{Deserialize, Serialize};

/// Tunable parts of the TimescaleDB schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    /// Drop chunks older than this many days
    pub retention_days: u32,
    /// Compress chunks older than this many days
    pub compression_days: u32,
    /// Maintain the hourly continuous aggregate
    pub hourly_rollup: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            retention_days: 31,
            compression_days: 30,
            hourly_rollup: true,
        }
    }
}

impl SchemaOptions {
    /// Check that the horizons are usable together
    pub fn validate(&self) -> Result<(), String> {
        if self.retention_days == 0 {
            return Err("retention_days must be at least 1".to_string());
        }
        if self.compression_days >= self.retention_days {
            return Err(format!(
                "compression_days ({}) must be less than retention_days ({})",
                self.compression_days, self.retention_days
            ));
        }
        Ok(())
    }
}

/// SQL for the position history table
pub struct PositionSchema;

impl PositionSchema {
    /// Columns in insert order
    pub const COLUMNS: [&'static str; 20] = [
        "time",
        "icao",
        "flight",
        "airline",
        "registration",
        "aircraft_type",
        "latitude",
        "longitude",
        "altitude_ft",
        "speed_kt",
        "vertical_rate_ft_min",
        "distance_nm",
        "heading",
        "messages",
        "rssi",
        "age",
        "data_quality",
        "receiver_id",
        "first_seen",
        "last_seen",
    ];

    /// Whether `column` belongs to the position table
    pub fn is_column(column: &str) -> bool {
        Self::COLUMNS.contains(&column)
    }

    /// Table and index DDL (PostgreSQL / TimescaleDB syntax)
    ///
    /// Statements are separate so they can run outside a transaction block.
    #[cfg(feature = "postgres-backend")]
    pub fn create_table_postgres() -> Vec<String> {
        vec![
            "CREATE EXTENSION IF NOT EXISTS timescaledb".to_string(),
            r#"CREATE TABLE IF NOT EXISTS aircraft_positions (
    time TIMESTAMPTZ NOT NULL,
    icao TEXT NOT NULL,
    flight TEXT,
    airline TEXT,
    registration TEXT,
    aircraft_type TEXT,
    latitude DOUBLE PRECISION,
    longitude DOUBLE PRECISION,
    altitude_ft INTEGER,
    speed_kt INTEGER,
    vertical_rate_ft_min INTEGER,
    distance_nm DOUBLE PRECISION,
    heading DOUBLE PRECISION,
    messages INTEGER,
    rssi DOUBLE PRECISION,
    age DOUBLE PRECISION,
    data_quality TEXT,
    receiver_id TEXT DEFAULT 'primary',
    first_seen TIMESTAMPTZ,
    last_seen TIMESTAMPTZ,
    UNIQUE(icao, time)
)"#
            .to_string(),
            "SELECT create_hypertable('aircraft_positions', 'time', if_not_exists => TRUE)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_aircraft_positions_icao_time \
             ON aircraft_positions (icao, time DESC)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_aircraft_positions_flight_time \
             ON aircraft_positions (flight, time DESC) WHERE flight IS NOT NULL"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_aircraft_positions_airline \
             ON aircraft_positions (airline) WHERE airline IS NOT NULL"
                .to_string(),
        ]
    }

    /// Compression settings applied once to the hypertable
    #[cfg(feature = "postgres-backend")]
    pub fn enable_compression() -> &'static str {
        "ALTER TABLE aircraft_positions SET (\
         timescaledb.compress, \
         timescaledb.compress_segmentby = 'icao', \
         timescaledb.compress_orderby = 'time DESC')"
    }

    /// Whether compression is already enabled on the hypertable
    #[cfg(feature = "postgres-backend")]
    pub fn select_compression_enabled() -> &'static str {
        "SELECT compression_enabled FROM timescaledb_information.hypertables \
         WHERE hypertable_name = 'aircraft_positions'"
    }

    /// Retention, compression and rollup statements for `options`
    #[cfg(feature = "postgres-backend")]
    pub fn timescale_policies(options: &SchemaOptions) -> Vec<String> {
        let mut statements = vec![
            format!(
                "SELECT add_compression_policy('aircraft_positions', INTERVAL '{} days', if_not_exists => TRUE)",
                options.compression_days
            ),
            format!(
                "SELECT add_retention_policy('aircraft_positions', INTERVAL '{} days', if_not_exists => TRUE)",
                options.retention_days
            ),
        ];

        if options.hourly_rollup {
            statements.push(
                r#"CREATE MATERIALIZED VIEW IF NOT EXISTS hourly_aircraft_summary
WITH (timescaledb.continuous) AS
SELECT
    time_bucket('1 hour', time) AS bucket,
    icao,
    flight,
    airline,
    COUNT(*) AS position_count,
    AVG(altitude_ft) AS avg_altitude,
    MAX(altitude_ft) AS max_altitude,
    AVG(speed_kt) AS avg_speed,
    MAX(distance_nm) AS max_distance,
    MIN(latitude) AS min_lat,
    MAX(latitude) AS max_lat,
    MIN(longitude) AS min_lon,
    MAX(longitude) AS max_lon
FROM aircraft_positions
WHERE latitude IS NOT NULL AND longitude IS NOT NULL
GROUP BY bucket, icao, flight, airline
WITH NO DATA"#
                    .to_string(),
            );
            statements.push(
                "SELECT add_continuous_aggregate_policy('hourly_aircraft_summary', \
                 start_offset => INTERVAL '3 hours', \
                 end_offset => INTERVAL '1 hour', \
                 schedule_interval => INTERVAL '1 hour', \
                 if_not_exists => TRUE)"
                    .to_string(),
            );
        }

        statements
    }

    /// Most rows one Postgres statement can carry (bind parameters are capped at 65535)
    #[cfg(feature = "postgres-backend")]
    pub const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / Self::COLUMNS.len();

    /// Multi-row insert-if-absent statement for `rows` records, numbered `$1..`
    #[cfg(feature = "postgres-backend")]
    pub fn insert_postgres(rows: usize) -> String {
        let width = Self::COLUMNS.len();
        let tuples: Vec<String> = (0..rows)
            .map(|row| {
                let placeholders: Vec<String> = (1..=width)
                    .map(|column| format!("${}", row * width + column))
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO aircraft_positions ({}) VALUES {} ON CONFLICT (icao, time) DO NOTHING",
            Self::COLUMNS.join(", "),
            tuples.join(", ")
        )
    }

    /// Table and index DDL (DuckDB syntax)
    ///
    /// Same table and key as the TimescaleDB schema. DuckDB has no partial or
    /// descending indexes.
    #[cfg(feature = "duckdb-backend")]
    pub fn create_table_duckdb() -> &'static str {
        r#"
CREATE TABLE IF NOT EXISTS aircraft_positions (
    time TIMESTAMP NOT NULL,
    icao VARCHAR NOT NULL,
    flight VARCHAR,
    airline VARCHAR,
    registration VARCHAR,
    aircraft_type VARCHAR,
    latitude DOUBLE,
    longitude DOUBLE,
    altitude_ft INTEGER,
    speed_kt INTEGER,
    vertical_rate_ft_min INTEGER,
    distance_nm DOUBLE,
    heading DOUBLE,
    messages INTEGER,
    rssi DOUBLE,
    age DOUBLE,
    data_quality VARCHAR,
    receiver_id VARCHAR DEFAULT 'primary',
    first_seen TIMESTAMP,
    last_seen TIMESTAMP,
    UNIQUE(icao, time)
);

CREATE INDEX IF NOT EXISTS idx_aircraft_positions_icao_time ON aircraft_positions(icao, time);
CREATE INDEX IF NOT EXISTS idx_aircraft_positions_flight_time ON aircraft_positions(flight, time);
CREATE INDEX IF NOT EXISTS idx_aircraft_positions_airline ON aircraft_positions(airline);
"#
    }

    /// Insert-if-absent statement with `?` placeholders; times bind as text
    #[cfg(feature = "duckdb-backend")]
    pub fn insert_duckdb() -> String {
        let placeholders: Vec<&str> = Self::COLUMNS
            .iter()
            .map(|column| match *column {
                "time" | "first_seen" | "last_seen" => "CAST(? AS TIMESTAMP)",
                _ => "?",
            })
            .collect();
        format!(
            "INSERT INTO aircraft_positions ({}) VALUES ({}) ON CONFLICT (icao, time) DO NOTHING",
            Self::COLUMNS.join(", "),
            placeholders.join(", ")
        )
    }
}
