//! Rebuild-via-copy: the one path for table changes a dialect cannot make in
//! place (dropping a column, adding or dropping a constraint on sqlite).
//!
//! The sequence is always: create a `_new_<table>` shadow with the target
//! shape, copy the column intersection, drop the original, rename the shadow
//! into place, recreate indexes. On postgres the whole list runs as one
//! batch, which the simple query protocol wraps in a single implicit
//! transaction. On sqlite statements run one at a time with foreign key
//! enforcement suspended; everything before the drop/rename pair is
//! non-destructive, so a failure up to that point leaves the original table
//! untouched and at worst an orphaned shadow to clean up by hand.

use tracing::{debug, warn};

use crate::core::{quote_ident, TableSchema};
use crate::db::DbHandle;
use crate::ddl::{create_index_sql, create_table_sql};
use crate::dialect::{Dialect, TranslationWarning};
use crate::error::Result;

/// Shadow table name used during a rebuild of `table`.
pub fn shadow_name(table: &str) -> String {
    format!("_new_{table}")
}

/// Plans the ordered statement list that rebuilds `old` into the shape of
/// `new`. Both must describe the same table name. Statements carry no
/// trailing semicolons; `execute_rebuild` owns execution strategy.
pub fn rebuild_statements(
    old: &TableSchema,
    new: &TableSchema,
    dialect: Dialect,
    warnings: &mut Vec<TranslationWarning>,
) -> Result<Vec<String>> {
    let shadow = shadow_name(&new.name);
    let table_ident = quote_ident(&new.name)?;
    let shadow_ident = quote_ident(&shadow)?;

    // Constraint names inside the body must carry the final table name, so
    // the shadow is rendered under that name and only the header is swapped.
    let create = create_table_sql(new, dialect, warnings)?;
    let create_shadow = create.replacen(
        &format!("CREATE TABLE {table_ident}"),
        &format!("CREATE TABLE {shadow_ident}"),
        1,
    );

    let mut statements = vec![create_shadow];

    let common: Vec<String> = new
        .columns
        .iter()
        .filter(|c| old.column(&c.name).is_some())
        .map(|c| quote_ident(&c.name))
        .collect::<Result<_>>()?;
    if !common.is_empty() {
        let cols = common.join(", ");
        statements.push(format!(
            "INSERT INTO {shadow_ident} ({cols}) SELECT {cols} FROM {table_ident}"
        ));
    }

    statements.push(format!("DROP TABLE {table_ident}"));
    statements.push(format!(
        "ALTER TABLE {shadow_ident} RENAME TO {table_ident}"
    ));

    for index in &new.indexes {
        statements.push(create_index_sql(&new.name, index)?);
    }
    Ok(statements)
}

/// Runs a planned rebuild against the live database.
pub async fn execute_rebuild(db: &dyn DbHandle, statements: &[String]) -> Result<()> {
    match db.dialect() {
        Dialect::Postgres => db.execute_batch(&statements.join(";\n")).await,
        Dialect::Sqlite => {
            db.execute("PRAGMA foreign_keys = OFF").await?;
            let mut outcome = Ok(());
            for sql in statements {
                debug!(sql, "rebuild statement");
                if let Err(e) = db.execute(sql).await {
                    outcome = Err(e);
                    break;
                }
            }
            if let Err(e) = db.execute("PRAGMA foreign_keys = ON").await {
                match &outcome {
                    Ok(()) => outcome = Err(e),
                    Err(first) => warn!(
                        error = %e,
                        first_error = %first,
                        "could not re-enable foreign key enforcement after failed rebuild"
                    ),
                }
            }
            outcome
        }
    }
}
