//! Live database connections.
//!
//! [`DbHandle`] is the narrow surface shared by the evolution engine, the
//! seed reconciler and the sequence resynchronizer: execute one statement,
//! execute a script, or run a query and get owned rows back. The SQLite side
//! wraps an embedded `rusqlite` connection; the PostgreSQL side drives a
//! `tokio-postgres` client.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`; the tool itself runs one
//! connection with sequential per-table work.

mod postgres;
mod sqlite;

pub use postgres::PostgresDb;
pub use sqlite::SqliteDb;

use async_trait::async_trait;

use crate::config::DatabaseConfig;
use crate::core::SqlValue;
use crate::dialect::Dialect;
use crate::error::Result;

/// A connected database, either dialect.
#[async_trait]
pub trait DbHandle: Send + Sync {
    /// The dialect this connection speaks.
    fn dialect(&self) -> Dialect;

    /// Execute a single statement, returning the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute a multi-statement script.
    ///
    /// On PostgreSQL the script travels over the simple protocol and runs as
    /// one implicit transaction. On SQLite statements execute one at a time,
    /// stopping at the first failure with earlier statements already applied.
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run a query and return every row as owned values.
    async fn query(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>>;
}

/// Open a connection for the configured engine.
pub async fn connect(config: &DatabaseConfig) -> Result<Box<dyn DbHandle>> {
    match config.engine {
        Dialect::Sqlite => Ok(Box::new(SqliteDb::open(&config.path)?)),
        Dialect::Postgres => Ok(Box::new(PostgresDb::connect(&config.pg_conn_string()).await?)),
    }
}
