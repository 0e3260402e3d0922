//! Migration step model: one YAML file per step, ops applied forward (`up`)
//! or in reverse (`down`).

use serde::{Deserialize, Serialize};

use crate::core::{ColumnSpec, ForeignKeySpec, IndexSpec, TableSchema};
use crate::dialect::Dialect;

/// A single reversible migration step.
///
/// Steps form a strictly linear chain: each step names its predecessor in
/// `down_revision`, and the first step carries none. Revision ids are opaque
/// strings; generated ones are 12 hex characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_revision: Option<String>,
    pub name: String,
    /// Restricts the whole step to one dialect. A filtered-out step still
    /// advances the version marker so the chain stays linear on both engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_dialect: Option<Dialect>,
    #[serde(default)]
    pub up: Vec<MigrationOp>,
    #[serde(default)]
    pub down: Vec<MigrationOp>,
}

impl MigrationStep {
    /// Whether this step's operations run on the given dialect.
    pub fn applies_to(&self, dialect: Dialect) -> bool {
        self.only_dialect.map_or(true, |d| d == dialect)
    }
}

/// One schema operation inside a step.
///
/// The set is deliberately small: everything a step does to a table is
/// expressed through these, so the engine can decide per dialect whether an
/// in-place ALTER suffices or the table must be rebuilt through a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOp {
    CreateTable {
        table: TableSchema,
    },
    DropTable {
        table: String,
    },
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    DropColumn {
        table: String,
        column: String,
    },
    AddForeignKey {
        table: String,
        foreign_key: ForeignKeySpec,
    },
    DropForeignKey {
        table: String,
        foreign_key: ForeignKeySpec,
    },
    CreateIndex {
        table: String,
        index: IndexSpec,
    },
    DropIndex {
        table: String,
        name: String,
    },
    /// Escape hatch for statements the structured ops cannot express.
    /// Invisible to autogenerate's replay model.
    RawSql {
        sql: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dialect: Option<Dialect>,
    },
}

impl MigrationOp {
    /// Table the operation targets, for logging and grouping.
    pub fn table_name(&self) -> &str {
        match self {
            MigrationOp::CreateTable { table } => &table.name,
            MigrationOp::DropTable { table }
            | MigrationOp::AddColumn { table, .. }
            | MigrationOp::DropColumn { table, .. }
            | MigrationOp::AddForeignKey { table, .. }
            | MigrationOp::DropForeignKey { table, .. }
            | MigrationOp::CreateIndex { table, .. }
            | MigrationOp::DropIndex { table, .. } => table,
            MigrationOp::RawSql { .. } => "",
        }
    }

    /// Short human-readable form used in progress logs.
    pub fn describe(&self) -> String {
        match self {
            MigrationOp::CreateTable { table } => format!("create_table {}", table.name),
            MigrationOp::DropTable { table } => format!("drop_table {table}"),
            MigrationOp::AddColumn { table, column } => {
                format!("add_column {table}.{}", column.name)
            }
            MigrationOp::DropColumn { table, column } => {
                format!("drop_column {table}.{column}")
            }
            MigrationOp::AddForeignKey { table, foreign_key } => format!(
                "add_foreign_key {}",
                foreign_key.constraint_name(table)
            ),
            MigrationOp::DropForeignKey { table, foreign_key } => format!(
                "drop_foreign_key {}",
                foreign_key.constraint_name(table)
            ),
            MigrationOp::CreateIndex { table, index } => {
                format!("create_index {}.{}", table, index.name)
            }
            MigrationOp::DropIndex { table, name } => {
                format!("drop_index {table}.{name}")
            }
            MigrationOp::RawSql { dialect, .. } => match dialect {
                Some(d) => format!("raw_sql ({d})"),
                None => "raw_sql".to_string(),
            },
        }
    }
}

/// Generates a fresh revision id: 12 hex characters from a random UUID.
pub fn new_revision_id() -> String {
    let full = uuid::Uuid::new_v4().simple().to_string();
    full[..12].to_string()
}

/// Applies a table-level operation to an in-memory table shape.
///
/// Used both to compute the target shape of a rebuild and to replay a chain
/// into the model autogenerate diffs against. `CreateTable`, `DropTable` and
/// `RawSql` are not table-level and are rejected here; callers route them.
///
/// Dropping a column removes indexes that mention it, but a foreign key that
/// mentions it is an error: the step must drop the constraint explicitly so
/// both dialects see the same named drop.
pub(crate) fn transform_table(
    table: &mut TableSchema,
    op: &MigrationOp,
) -> std::result::Result<(), String> {
    match op {
        MigrationOp::AddColumn { column, .. } => {
            if table.column(&column.name).is_some() {
                return Err(format!(
                    "column {} already exists on {}",
                    column.name, table.name
                ));
            }
            table.columns.push(column.clone());
            Ok(())
        }
        MigrationOp::DropColumn { column, .. } => {
            let idx = table
                .columns
                .iter()
                .position(|c| c.name == *column)
                .ok_or_else(|| format!("no column {} on {}", column, table.name))?;
            if let Some(pk) = &table.primary_key {
                if pk.columns.iter().any(|c| c == column) {
                    return Err(format!(
                        "column {} is part of the primary key of {}",
                        column, table.name
                    ));
                }
            }
            if let Some(fk) = table
                .foreign_keys
                .iter()
                .find(|fk| fk.columns.iter().any(|c| c == column))
            {
                return Err(format!(
                    "column {} is referenced by {}; drop the constraint first",
                    column,
                    fk.constraint_name(&table.name)
                ));
            }
            table.columns.remove(idx);
            table
                .indexes
                .retain(|ix| !ix.columns.iter().any(|c| c == column));
            Ok(())
        }
        MigrationOp::AddForeignKey { foreign_key, .. } => {
            for col in &foreign_key.columns {
                if table.column(col).is_none() {
                    return Err(format!("no column {} on {}", col, table.name));
                }
            }
            if table.foreign_keys.iter().any(|fk| {
                fk.columns == foreign_key.columns
                    && fk.referenced_table == foreign_key.referenced_table
            }) {
                return Err(format!(
                    "{} already exists",
                    foreign_key.constraint_name(&table.name)
                ));
            }
            table.foreign_keys.push(foreign_key.clone());
            Ok(())
        }
        MigrationOp::DropForeignKey { foreign_key, .. } => {
            let idx = table
                .foreign_keys
                .iter()
                .position(|fk| {
                    fk.columns == foreign_key.columns
                        && fk.referenced_table == foreign_key.referenced_table
                })
                .ok_or_else(|| {
                    format!(
                        "no foreign key matching {}",
                        foreign_key.constraint_name(&table.name)
                    )
                })?;
            table.foreign_keys.remove(idx);
            Ok(())
        }
        MigrationOp::CreateIndex { index, .. } => {
            for col in &index.columns {
                if table.column(col).is_none() {
                    return Err(format!("no column {} on {}", col, table.name));
                }
            }
            if table.indexes.iter().any(|ix| ix.name == index.name) {
                return Err(format!("index {} already exists", index.name));
            }
            table.indexes.push(index.clone());
            Ok(())
        }
        MigrationOp::DropIndex { name, .. } => {
            let idx = table
                .indexes
                .iter()
                .position(|ix| ix.name == *name)
                .ok_or_else(|| format!("no index {} on {}", name, table.name))?;
            table.indexes.remove(idx);
            Ok(())
        }
        MigrationOp::CreateTable { .. }
        | MigrationOp::DropTable { .. }
        | MigrationOp::RawSql { .. } => Err(format!(
            "{} is not a table-level operation",
            op.describe()
        )),
    }
}
