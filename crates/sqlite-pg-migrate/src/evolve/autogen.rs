//! Drift detection for `migrate --autogenerate`.
//!
//! The chain's `up` operations are replayed into an in-memory model of what
//! the schema should look like; the live catalog is then diffed against that
//! model at table and column granularity. Finer drift (column definitions,
//! indexes, foreign keys) is logged so the operator sees it, but is not
//! turned into operations.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::TableSchema;
use crate::ddl;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::evolve::files::StepFile;
use crate::evolve::step::{self, MigrationOp};

/// Replays every step that applies to `dialect` into a model keyed by table
/// name. A chain that does not replay cleanly is corrupt and reported
/// against the offending revision.
pub(crate) fn replay_chain(
    steps: &[StepFile],
    dialect: Dialect,
) -> Result<BTreeMap<String, TableSchema>> {
    let mut model = BTreeMap::new();
    for file in steps {
        if !file.step.applies_to(dialect) {
            continue;
        }
        for op in &file.step.up {
            apply_to_model(&mut model, op, dialect).map_err(|message| {
                MigrateError::Evolution {
                    revision: file.step.revision.clone(),
                    message,
                }
            })?;
        }
    }
    Ok(model)
}

fn apply_to_model(
    model: &mut BTreeMap<String, TableSchema>,
    op: &MigrationOp,
    dialect: Dialect,
) -> std::result::Result<(), String> {
    match op {
        MigrationOp::CreateTable { table } => {
            if model.contains_key(&table.name) {
                return Err(format!("table {} already exists", table.name));
            }
            model.insert(table.name.clone(), table.clone());
            Ok(())
        }
        MigrationOp::DropTable { table } => model
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| format!("no table {table}")),
        MigrationOp::RawSql { dialect: only, .. } => {
            if only.map_or(true, |d| d == dialect) {
                debug!("raw sql is invisible to the replay model");
            }
            Ok(())
        }
        table_op => {
            let table = model
                .get_mut(table_op.table_name())
                .ok_or_else(|| format!("no table {}", table_op.table_name()))?;
            step::transform_table(table, table_op)
        }
    }
}

/// Diffs the live schema against the replayed model. Returns `(up, down)`
/// where `up` brings the model in line with the live database and `down` is
/// the exact inverse, in reverse order.
pub(crate) fn diff_schemas(
    model: &BTreeMap<String, TableSchema>,
    live: &[TableSchema],
) -> (Vec<MigrationOp>, Vec<MigrationOp>) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let live_by_name: BTreeMap<&str, &TableSchema> =
        live.iter().map(|t| (t.name.as_str(), t)).collect();

    // Tables only the live database has, created in dependency order so the
    // generated step applies cleanly.
    let new_tables: Vec<TableSchema> = live
        .iter()
        .filter(|t| !model.contains_key(&t.name))
        .cloned()
        .collect();
    for table in ddl::create_order(&new_tables) {
        up.push(MigrationOp::CreateTable {
            table: table.clone(),
        });
        down.push(MigrationOp::DropTable {
            table: table.name.clone(),
        });
    }

    // Tables only the model has, dropped referencing-first.
    let gone_tables: Vec<TableSchema> = model
        .values()
        .filter(|t| !live_by_name.contains_key(t.name.as_str()))
        .cloned()
        .collect();
    for table in ddl::drop_order(&gone_tables) {
        up.push(MigrationOp::DropTable {
            table: table.name.clone(),
        });
        down.push(MigrationOp::CreateTable {
            table: table.clone(),
        });
    }

    // Column drift on shared tables.
    for (name, modeled) in model {
        let Some(live_table) = live_by_name.get(name.as_str()) else {
            continue;
        };
        for col in &live_table.columns {
            match modeled.column(&col.name) {
                None => {
                    up.push(MigrationOp::AddColumn {
                        table: name.clone(),
                        column: col.clone(),
                    });
                    down.push(MigrationOp::DropColumn {
                        table: name.clone(),
                        column: col.name.clone(),
                    });
                }
                Some(m) if m != col => {
                    debug!(
                        table = %name,
                        column = %col.name,
                        "column definition drift; not expressed as an operation"
                    );
                }
                Some(_) => {}
            }
        }
        for col in &modeled.columns {
            if live_table.column(&col.name).is_none() {
                up.push(MigrationOp::DropColumn {
                    table: name.clone(),
                    column: col.name.clone(),
                });
                down.push(MigrationOp::AddColumn {
                    table: name.clone(),
                    column: col.clone(),
                });
            }
        }
        if modeled.foreign_keys != live_table.foreign_keys {
            debug!(table = %name, "foreign key drift; not expressed as an operation");
        }
        if modeled.indexes != live_table.indexes {
            debug!(table = %name, "index drift; not expressed as an operation");
        }
    }

    down.reverse();
    (up, down)
}
