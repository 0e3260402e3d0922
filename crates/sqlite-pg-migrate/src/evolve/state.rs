//! Version marker and advisory lock for the evolution engine.
//!
//! The marker table holds at most one non-lock row, whose `version` value is
//! the revision id of the step currently applied (zero rows means the database
//! is at base). Concurrent invocations are serialized through a sentinel row
//! in the same table: whoever inserts it holds the lock.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::db::DbHandle;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Table that records the applied revision. Excluded from introspection,
/// export, and autogenerate diffs.
pub const VERSION_TABLE: &str = "schema_migrations";

/// Sentinel `version` value used as the advisory lock row.
pub const LOCK_SENTINEL: &str = "__lock__";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Creates the version marker table if it does not exist yet.
///
/// The statement is identical on both dialects on purpose: the marker must
/// stay portable so a database exported from one engine can continue its
/// migration history on the other.
pub async fn ensure_version_table(db: &dyn DbHandle) -> Result<()> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {VERSION_TABLE} (version TEXT PRIMARY KEY)"
    );
    db.execute_batch(&sql).await?;
    debug!(table = VERSION_TABLE, "version marker table ensured");
    Ok(())
}

/// Reads the applied revision, if any.
///
/// More than one non-lock row means the marker was edited by hand or a
/// different tool; that is unrecoverable without operator intervention, so it
/// is reported as an error rather than silently picking one.
pub async fn current_revision(db: &dyn DbHandle) -> Result<Option<String>> {
    let sql = format!(
        "SELECT version FROM {VERSION_TABLE} WHERE version <> '{LOCK_SENTINEL}'"
    );
    let rows = db.query(&sql).await?;
    match rows.len() {
        0 => Ok(None),
        1 => {
            let rev = rows[0]
                .first()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .ok_or_else(|| {
                    MigrateError::Evolution {
                        revision: "?".to_string(),
                        message: "version marker row has no readable value".to_string(),
                    }
                })?;
            Ok(Some(rev))
        }
        n => Err(MigrateError::Evolution {
            revision: "?".to_string(),
            message: format!(
                "version marker table {VERSION_TABLE} holds {n} revision rows, expected at most one; \
                 repair it by deleting the stale rows"
            ),
        }),
    }
}

/// Replaces the version marker. `None` returns the database to base.
pub async fn set_revision(db: &dyn DbHandle, revision: Option<&str>) -> Result<()> {
    for sql in marker_update_sql(revision) {
        db.execute(&sql).await?;
    }
    debug!(revision = revision.unwrap_or("<base>"), "version marker updated");
    Ok(())
}

/// Statements that replace the marker, exposed separately so the postgres
/// apply path can fold them into the same implicit transaction as the step's
/// DDL.
pub fn marker_update_sql(revision: Option<&str>) -> Vec<String> {
    let mut stmts = vec![format!(
        "DELETE FROM {VERSION_TABLE} WHERE version <> '{LOCK_SENTINEL}'"
    )];
    if let Some(rev) = revision {
        // Revision ids are generated hex strings; reject anything that could
        // break out of the literal rather than trying to escape it.
        stmts.push(format!(
            "INSERT INTO {VERSION_TABLE} (version) VALUES ('{}')",
            rev.replace('\'', "''")
        ));
    }
    stmts
}

/// Acquires the single-writer lock, polling until `timeout` elapses.
///
/// The insert either claims the sentinel row or affects zero rows because
/// another process holds it; the primary key makes that race-free. On timeout
/// the error names the manual recovery step, since a crashed holder never
/// deletes its row.
pub async fn acquire_lock(db: &dyn DbHandle, timeout: Duration) -> Result<()> {
    let sql = match db.dialect() {
        Dialect::Postgres => format!(
            "INSERT INTO {VERSION_TABLE} (version) VALUES ('{LOCK_SENTINEL}') \
             ON CONFLICT (version) DO NOTHING"
        ),
        Dialect::Sqlite => format!(
            "INSERT OR IGNORE INTO {VERSION_TABLE} (version) VALUES ('{LOCK_SENTINEL}')"
        ),
    };
    let start = Instant::now();
    loop {
        if db.execute(&sql).await? > 0 {
            debug!("migration lock acquired");
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(MigrateError::LockTimeout(format!(
                "could not acquire the migration lock within {}s; if a previous run crashed, \
                 release it manually: DELETE FROM {VERSION_TABLE} WHERE version = '{LOCK_SENTINEL}'",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(LOCK_POLL_INTERVAL).await;
    }
}

/// Releases the single-writer lock. Safe to call when not held.
pub async fn release_lock(db: &dyn DbHandle) -> Result<()> {
    let sql = format!(
        "DELETE FROM {VERSION_TABLE} WHERE version = '{LOCK_SENTINEL}'"
    );
    let removed = db.execute(&sql).await?;
    if removed == 0 {
        warn!("migration lock was already released");
    } else {
        debug!("migration lock released");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;

    async fn open_with_marker() -> SqliteDb {
        let db = SqliteDb::open_in_memory().expect("open in-memory db");
        ensure_version_table(&db).await.expect("ensure marker");
        db
    }

    // ==================== Version marker ====================

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let db = open_with_marker().await;
        ensure_version_table(&db).await.expect("second ensure");
        assert_eq!(current_revision(&db).await.expect("read"), None);
    }

    #[tokio::test]
    async fn set_and_read_revision() {
        let db = open_with_marker().await;
        set_revision(&db, Some("a1b2c3d4e5f6")).await.expect("set");
        assert_eq!(
            current_revision(&db).await.expect("read"),
            Some("a1b2c3d4e5f6".to_string())
        );

        set_revision(&db, Some("001122334455")).await.expect("replace");
        assert_eq!(
            current_revision(&db).await.expect("read"),
            Some("001122334455".to_string())
        );

        set_revision(&db, None).await.expect("clear");
        assert_eq!(current_revision(&db).await.expect("read"), None);
    }

    #[tokio::test]
    async fn corrupt_marker_is_reported() {
        let db = open_with_marker().await;
        db.execute("INSERT INTO schema_migrations (version) VALUES ('aaa')")
            .await
            .expect("first row");
        db.execute("INSERT INTO schema_migrations (version) VALUES ('bbb')")
            .await
            .expect("second row");
        let err = current_revision(&db).await.expect_err("must fail");
        assert!(err.to_string().contains("expected at most one"));
    }

    // ==================== Advisory lock ====================

    #[tokio::test]
    async fn lock_blocks_second_holder_until_released() {
        let db = open_with_marker().await;
        acquire_lock(&db, Duration::from_secs(1)).await.expect("first acquire");

        let err = acquire_lock(&db, Duration::ZERO)
            .await
            .expect_err("second acquire must time out");
        assert!(matches!(err, MigrateError::LockTimeout(_)));
        assert!(err.to_string().contains("DELETE FROM schema_migrations"));

        release_lock(&db).await.expect("release");
        acquire_lock(&db, Duration::from_secs(1)).await.expect("reacquire");
        release_lock(&db).await.expect("release again");
    }

    #[tokio::test]
    async fn lock_row_does_not_shadow_revision() {
        let db = open_with_marker().await;
        acquire_lock(&db, Duration::from_secs(1)).await.expect("acquire");
        set_revision(&db, Some("feedc0ffee00")).await.expect("set");
        assert_eq!(
            current_revision(&db).await.expect("read"),
            Some("feedc0ffee00".to_string())
        );
        release_lock(&db).await.expect("release");
        // Releasing the lock must not disturb the marker.
        assert_eq!(
            current_revision(&db).await.expect("read"),
            Some("feedc0ffee00".to_string())
        );
    }
}
