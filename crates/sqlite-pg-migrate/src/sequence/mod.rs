//! Auto-increment counter resynchronization.
//!
//! Bulk loads that insert explicit key values leave the engine's counter
//! behind the data, so the next organic insert collides. Both statements
//! here compute from the current `MAX(id)`, which makes a second run a
//! no-op.

use tracing::{debug, info};

use crate::core::{quote_ident, quote_literal, TableSchema};
use crate::db::DbHandle;
use crate::dialect::Dialect;
use crate::error::Result;

/// Render the counter-reset statement for one table's serial key.
///
/// PostgreSQL advances the backing sequence to `MAX + 1` (with `is_called`
/// false so the next `nextval` returns exactly that). SQLite rewrites the
/// table's `sqlite_sequence` row, which stores the last value handed out.
pub fn resync_statement(table: &str, pk_col: &str, dialect: Dialect) -> Result<String> {
    let quoted_table = quote_ident(table)?;
    let quoted_col = quote_ident(pk_col)?;
    Ok(match dialect {
        Dialect::Postgres => format!(
            "SELECT setval(pg_get_serial_sequence('{}', {}), \
             COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
            quoted_table,
            quote_literal(pk_col),
            quoted_col,
            quoted_table
        ),
        Dialect::Sqlite => format!(
            "INSERT OR REPLACE INTO sqlite_sequence(name, seq) \
             VALUES ({}, COALESCE((SELECT MAX({}) FROM {}), 0))",
            quote_literal(table),
            quoted_col,
            quoted_table
        ),
    })
}

/// Resynchronize every table that has a single-column serial key.
///
/// Returns the names of the tables touched. On SQLite the bookkeeping table
/// only exists once some table has used AUTOINCREMENT; when it is absent
/// there is nothing to fix and the run is a silent no-op.
pub async fn resync_all(db: &dyn DbHandle, tables: &[TableSchema]) -> Result<Vec<String>> {
    if db.dialect() == Dialect::Sqlite && !sqlite_sequence_exists(db).await? {
        debug!("sqlite_sequence does not exist; no counters to resynchronize");
        return Ok(Vec::new());
    }

    let mut resynced = Vec::new();
    for table in tables {
        let pk_col = match table.auto_increment_pk() {
            Some(col) => col,
            None => continue,
        };
        let sql = resync_statement(&table.name, pk_col, db.dialect())?;
        match db.dialect() {
            // setval returns a row; run it as a query
            Dialect::Postgres => {
                db.query(&sql).await?;
            }
            Dialect::Sqlite => {
                db.execute(&sql).await?;
            }
        }
        info!(table = %table.name, column = pk_col, "resynchronized serial counter");
        resynced.push(table.name.clone());
    }
    Ok(resynced)
}

async fn sqlite_sequence_exists(db: &dyn DbHandle) -> Result<bool> {
    let rows = db
        .query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'")
        .await?;
    Ok(!rows.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use crate::introspect;

    #[test]
    fn test_postgres_statement_shape() {
        let sql = resync_statement("users", "id", Dialect::Postgres).unwrap();
        assert_eq!(
            sql,
            "SELECT setval(pg_get_serial_sequence('\"users\"', 'id'), \
             COALESCE((SELECT MAX(\"id\") FROM \"users\"), 0) + 1, false)"
        );
    }

    #[test]
    fn test_sqlite_statement_shape() {
        let sql = resync_statement("users", "id", Dialect::Sqlite).unwrap();
        assert_eq!(
            sql,
            "INSERT OR REPLACE INTO sqlite_sequence(name, seq) \
             VALUES ('users', COALESCE((SELECT MAX(\"id\") FROM \"users\"), 0))"
        );
    }

    #[tokio::test]
    async fn test_resync_repairs_stale_counter_and_is_idempotent() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);\n\
             INSERT INTO users (id, name) VALUES (1, 'a'), (2, 'b'), (7, 'c');\n\
             UPDATE sqlite_sequence SET seq = 0 WHERE name = 'users';",
        )
        .await
        .unwrap();

        let tables = introspect::read_schema(&db, "public").await.unwrap();
        let resynced = resync_all(&db, &tables).await.unwrap();
        assert_eq!(resynced, vec!["users"]);

        let seq = current_seq(&db).await;
        assert_eq!(seq, 7);

        // Second run computes the same value
        resync_all(&db, &tables).await.unwrap();
        assert_eq!(current_seq(&db).await, 7);

        // The next organic insert no longer collides
        db.execute("INSERT INTO users (name) VALUES ('d')")
            .await
            .unwrap();
        let rows = db.query("SELECT MAX(id) FROM users").await.unwrap();
        assert_eq!(rows[0][0].as_i64(), Some(8));
    }

    #[tokio::test]
    async fn test_tables_without_serial_key_are_skipped() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE counters (id INTEGER PRIMARY KEY AUTOINCREMENT);\n\
             CREATE TABLE treatments (code TEXT PRIMARY KEY, label TEXT);",
        )
        .await
        .unwrap();
        let tables = introspect::read_schema(&db, "public").await.unwrap();
        let resynced = resync_all(&db, &tables).await.unwrap();
        assert_eq!(resynced, vec!["counters"]);
    }

    #[tokio::test]
    async fn test_missing_sqlite_sequence_is_a_noop() {
        let db = SqliteDb::open_in_memory().unwrap();
        // Plain INTEGER PRIMARY KEY never creates sqlite_sequence
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let tables = introspect::read_schema(&db, "public").await.unwrap();
        let resynced = resync_all(&db, &tables).await.unwrap();
        assert!(resynced.is_empty());
    }

    async fn current_seq(db: &SqliteDb) -> i64 {
        let rows = db
            .query("SELECT seq FROM sqlite_sequence WHERE name = 'users'")
            .await
            .unwrap();
        rows[0][0].as_i64().unwrap()
    }
}
