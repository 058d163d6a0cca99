//! Application configuration
//!
//! One [`AppConfig`] is built at startup from defaults, an optional TOML file,
//! environment overrides and finally command-line flags, then passed by
//! reference to whatever needs it.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::migration::config::{MigrationSettings, SourceType};
use crate::migration::error::MigrationError;
use crate::migration::schema::SchemaOptions;

/// Default S3 key prefix for snapshot objects
pub const DEFAULT_S3_PREFIX: &str = "aircraft-data/";

/// Errors raised while building the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(String),

    /// A value is out of range or inconsistent with another
    #[error("{0}")]
    Invalid(String),

    /// Neither a source directory nor a bucket was given
    #[error("No snapshot source configured")]
    MissingSource,
}

impl From<ConfigError> for MigrationError {
    fn from(err: ConfigError) -> Self {
        MigrationError::InvalidConfig(err.to_string())
    }
}

/// Where snapshots come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Local directory searched recursively
    pub dir: Option<PathBuf>,
    /// S3 bucket
    pub bucket: Option<String>,
    /// Key prefix inside the bucket
    pub prefix: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: None,
            bucket: None,
            prefix: DEFAULT_S3_PREFIX.to_string(),
        }
    }
}

/// S3 client settings
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field(
                "access_key_id",
                &self.access_key_id.as_deref().map(|k| redact_secret(k, 4)),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Destination database settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
    /// Write to an embedded DuckDB file instead of TimescaleDB
    pub duckdb: Option<PathBuf>,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "aircraft_db".to_string(),
            user: "postgres".to_string(),
            password: None,
            connect_timeout_secs: 10,
            duckdb: None,
        }
    }
}

impl DestinationConfig {
    /// Connection target without the password
    pub fn display(&self) -> String {
        match &self.duckdb {
            Some(path) => format!("duckdb:{}", path.display()),
            None => format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}

impl std::fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("duckdb", &self.duckdb)
            .finish()
    }
}

/// Complete configuration for one process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub s3: S3Settings,
    pub destination: DestinationConfig,
    pub migration: MigrationSettings,
    pub schema: SchemaOptions,
}

impl AppConfig {
    /// Load a TOML config file; missing sections keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("S3_ENDPOINT") {
            self.s3.endpoint = Some(v);
        }
        if let Some(v) = get("S3_REGION") {
            self.s3.region = Some(v);
        }
        if let Some(v) = get("S3_ACCESS_KEY") {
            self.s3.access_key_id = Some(v);
        }
        if let Some(v) = get("S3_SECRET_KEY") {
            self.s3.secret_access_key = Some(v);
        }
        if let Some(v) = get("READ_BUCKET") {
            self.source.bucket = Some(v);
        }
        if let Some(v) = get("TSDB_HOST") {
            self.destination.host = v;
        }
        if let Some(v) = get("TSDB_PORT") {
            self.destination.port = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("TSDB_PORT is not a port: {}", v)))?;
        }
        if let Some(v) = get("TSDB_DB") {
            self.destination.database = v;
        }
        if let Some(v) = get("TSDB_USER") {
            self.destination.user = v;
        }
        if let Some(v) = get("TSDB_PASSWORD") {
            self.destination.password = Some(v);
        }

        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migration.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        if self.migration.max_files == Some(0) {
            return Err(ConfigError::Invalid("max_files must be at least 1".to_string()));
        }
        if self.migration.receiver_id.trim().is_empty() {
            return Err(ConfigError::Invalid("receiver_id must not be empty".to_string()));
        }
        if self.source.dir.is_some() && self.source.bucket.is_some() {
            return Err(ConfigError::Invalid(
                "Configure either a source directory or an S3 bucket, not both".to_string(),
            ));
        }
        self.schema.validate().map_err(ConfigError::Invalid)
    }

    /// Resolve the configured snapshot location
    pub fn source_type(&self) -> Result<SourceType, ConfigError> {
        match (&self.source.dir, &self.source.bucket) {
            (Some(_), Some(_)) => Err(ConfigError::Invalid(
                "Configure either a source directory or an S3 bucket, not both".to_string(),
            )),
            (Some(dir), None) => Ok(SourceType::Local(dir.clone())),
            #[cfg(feature = "s3")]
            (None, Some(bucket)) => Ok(SourceType::S3 {
                bucket: bucket.clone(),
                prefix: self.source.prefix.clone(),
            }),
            #[cfg(not(feature = "s3"))]
            (None, Some(_)) => Err(ConfigError::Invalid(
                "S3 support not enabled. Build with --features s3".to_string(),
            )),
            (None, None) => Err(ConfigError::MissingSource),
        }
    }

    /// S3 source for `bucket`/`prefix` using the client settings
    #[cfg(feature = "s3")]
    pub fn s3_source(&self, bucket: &str, prefix: &str) -> crate::migration::s3::S3Source {
        use crate::migration::s3::{S3Source, SecureCredentials};

        let mut source = S3Source::new(bucket, prefix);
        if let Some(region) = &self.s3.region {
            source = source.with_region(region.clone());
        }
        if let Some(profile) = &self.s3.profile {
            source = source.with_profile(profile.clone());
        }
        if let Some(endpoint) = &self.s3.endpoint {
            source = source.with_endpoint(endpoint.clone());
        }
        if let (Some(key), Some(secret)) = (&self.s3.access_key_id, &self.s3.secret_access_key) {
            source = source.with_credentials(SecureCredentials::new(key.clone(), secret.clone()));
        }
        source
    }
}

/// Redact a secret string, showing only the first N characters
pub fn redact_secret(secret: &str, visible_chars: usize) -> String {
    match secret.char_indices().nth(visible_chars) {
        Some((cut, _)) => format!("{}...[REDACTED]", &secret[..cut]),
        None => "[REDACTED]".to_string(),
    }
}

static AWS_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AKIA[0-9A-Z]{16}").expect("static regex"));

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)((?:secret[_-]?(?:access[_-]?)?key|password)["']?\s*[:=]\s*["']?)([^\s"',;]+)"#)
        .expect("static regex")
});

static URL_PASSWORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(://[^:/@\s]+:)([^@\s]+)(@)").expect("static regex"));

/// Redact potential secrets from a string (URLs, keys, passwords)
pub fn redact_secrets_in_string(s: &str) -> String {
    let result = AWS_KEY_PATTERN.replace_all(s, "AKIA...[REDACTED]");
    let result = SECRET_PATTERN.replace_all(&result, "${1}[REDACTED]");
    let result = URL_PASSWORD_PATTERN.replace_all(&result, "${1}[REDACTED]${3}");
    result.into_owned()
}
