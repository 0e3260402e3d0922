//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Live database the tool operates on.
    pub database: DatabaseConfig,

    /// Export behavior.
    #[serde(default)]
    pub export: ExportConfig,

    /// Schema evolution behavior.
    #[serde(default)]
    pub migrations: MigrationsConfig,

    /// Seed behavior.
    #[serde(default)]
    pub seeds: SeedConfig,
}

/// Connection settings for the live database.
///
/// `engine: sqlite` uses only `path`; `engine: postgres` uses the network
/// fields. Unused fields may be omitted from the YAML.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Engine dialect: `sqlite` or `postgres`.
    pub engine: Dialect,

    /// SQLite database file path.
    #[serde(default = "default_sqlite_path")]
    pub path: PathBuf,

    /// PostgreSQL host.
    #[serde(default = "default_host")]
    pub host: String,

    /// PostgreSQL port.
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// PostgreSQL database name.
    #[serde(default)]
    pub database: String,

    /// PostgreSQL username.
    #[serde(default)]
    pub user: String,

    /// PostgreSQL password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// PostgreSQL schema to introspect.
    #[serde(default = "default_public_schema")]
    pub schema: String,
}

impl DatabaseConfig {
    /// Build a connection string for tokio-postgres.
    pub fn pg_conn_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

// Keep passwords out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("engine", &self.engine)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Export behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory receiving the artifact set.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Rows per multi-row INSERT statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            batch_size: default_batch_size(),
        }
    }
}

/// Schema evolution behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding revision step files.
    #[serde(default = "default_migrations_dir")]
    pub dir: PathBuf,

    /// Seconds to wait for the migration lock before giving up.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: default_migrations_dir(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

/// Seed behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Skip rows whose natural key already exists.
    #[serde(default = "default_true")]
    pub skip_existing: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            skip_existing: default_true(),
        }
    }
}

// Default value functions for serde

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("instance/clinic.db")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("migration_export")
}

fn default_batch_size() -> usize {
    100
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_lock_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}
