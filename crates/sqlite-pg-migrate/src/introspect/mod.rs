//! Live catalog introspection.
//!
//! Reads the connected engine's catalog into dialect-neutral
//! [`TableSchema`](crate::core::TableSchema) descriptors. Both dialects are
//! supported because the evolution engine rebuilds tables against whichever
//! engine it is pointed at, and autogenerate diffs the live catalog against
//! the revision chain.
//!
//! Engine bookkeeping tables (`sqlite_*`) and the version-tracking table are
//! never reported.

mod postgres;
mod sqlite;

use tracing::info;

use crate::core::TableSchema;
use crate::db::DbHandle;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::evolve::state::VERSION_TABLE;

/// True for tables the introspector never reports.
pub fn is_reserved_table(name: &str) -> bool {
    name.starts_with("sqlite_") || name == VERSION_TABLE
}

/// Read every user table from the connected engine's catalog.
///
/// `pg_schema` selects the PostgreSQL schema to read and is ignored for
/// SQLite. Tables come back ordered by name; columns in declaration order.
pub async fn read_schema(db: &dyn DbHandle, pg_schema: &str) -> Result<Vec<TableSchema>> {
    let tables = match db.dialect() {
        Dialect::Sqlite => sqlite::read_schema(db).await?,
        Dialect::Postgres => postgres::read_schema(db, pg_schema).await?,
    };
    info!(tables = tables.len(), dialect = %db.dialect(), "introspected catalog");
    Ok(tables)
}

/// Read a single table's descriptor, or `None` if it does not exist.
pub async fn read_table(
    db: &dyn DbHandle,
    pg_schema: &str,
    table: &str,
) -> Result<Option<TableSchema>> {
    match db.dialect() {
        Dialect::Sqlite => sqlite::read_table(db, table).await,
        Dialect::Postgres => postgres::read_table(db, pg_schema, table).await,
    }
}
