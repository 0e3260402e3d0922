//! PostgreSQL catalog introspection via `information_schema` and `pg_catalog`.
//!
//! Queries travel over the simple protocol, so every cell arrives as text
//! and ordered multi-column sets come back row-per-column with an explicit
//! ordinality instead of as arrays.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{
    quote_literal, validate_identifier, ColumnSpec, ForeignKeySpec, IndexSpec, PrimaryKeySpec,
    TableSchema, TypeDescriptor,
};
use crate::db::DbHandle;
use crate::error::{MigrateError, Result};

pub(super) async fn read_schema(db: &dyn DbHandle, schema: &str) -> Result<Vec<TableSchema>> {
    validate_identifier(schema)?;
    let rows = db
        .query(&format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_schema = {} \
             ORDER BY table_name",
            quote_literal(schema)
        ))
        .await?;

    let mut tables = Vec::new();
    for row in rows {
        let name = cell_str(&row, 0, "information_schema.tables")?;
        if super::is_reserved_table(&name) {
            continue;
        }
        tables.push(load_table(db, schema, &name).await?);
    }
    Ok(tables)
}

pub(super) async fn read_table(
    db: &dyn DbHandle,
    schema: &str,
    table: &str,
) -> Result<Option<TableSchema>> {
    validate_identifier(schema)?;
    validate_identifier(table)?;
    let rows = db
        .query(&format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = {}",
            quote_literal(schema),
            quote_literal(table)
        ))
        .await?;
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(load_table(db, schema, table).await?))
}

async fn load_table(db: &dyn DbHandle, schema: &str, name: &str) -> Result<TableSchema> {
    let (columns, serial_columns) = load_columns(db, schema, name).await?;
    let pk_columns = load_primary_key(db, schema, name).await?;

    let primary_key = if pk_columns.is_empty() {
        debug!(table = name, "no primary key declared");
        None
    } else {
        let auto_increment = pk_columns.len() == 1 && serial_columns.contains(&pk_columns[0]);
        Some(PrimaryKeySpec {
            columns: pk_columns,
            auto_increment,
        })
    };

    let foreign_keys = load_foreign_keys(db, schema, name).await?;
    let indexes = load_indexes(db, schema, name).await?;

    debug!(
        table = name,
        columns = columns.len(),
        foreign_keys = foreign_keys.len(),
        indexes = indexes.len(),
        "loaded table"
    );

    Ok(TableSchema {
        name: name.to_string(),
        columns,
        primary_key,
        foreign_keys,
        indexes,
    })
}

/// Returns the columns plus the names of sequence-backed (serial) columns.
async fn load_columns(
    db: &dyn DbHandle,
    schema: &str,
    table: &str,
) -> Result<(Vec<ColumnSpec>, Vec<String>)> {
    let rows = db
        .query(&format!(
            "SELECT column_name, data_type, \
                    COALESCE(character_maximum_length, 0)::int, \
                    COALESCE(numeric_precision, 0)::int, \
                    COALESCE(numeric_scale, 0)::int, \
                    is_nullable, column_default \
             FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} \
             ORDER BY ordinal_position",
            quote_literal(schema),
            quote_literal(table)
        ))
        .await?;
    if rows.is_empty() {
        return Err(MigrateError::Introspection(format!(
            "table {} has no columns in the catalog",
            table
        )));
    }

    let mut columns = Vec::new();
    let mut serial_columns = Vec::new();
    for row in &rows {
        let col_name = cell_str(row, 0, "information_schema.columns")?;
        let data_type = cell_str(row, 1, "information_schema.columns")?;
        let char_len = row.get(2).and_then(|v| v.as_i64()).unwrap_or(0);
        let precision = row.get(3).and_then(|v| v.as_i64()).unwrap_or(0);
        let scale = row.get(4).and_then(|v| v.as_i64()).unwrap_or(0);
        let nullable = row.get(5).and_then(|v| v.as_str()) == Some("YES");
        let default = row.get(6).and_then(|v| v.as_str()).map(str::to_string);

        let lowered = data_type.to_lowercase();
        let declared = if char_len > 0 {
            format!("{}({})", data_type, char_len)
        } else if (lowered == "numeric" || lowered == "decimal") && precision > 0 {
            format!("{}({},{})", data_type, precision, scale)
        } else {
            data_type
        };

        // nextval defaults are the serial mechanism, not a declared default
        let is_serial = default
            .as_deref()
            .map(|d| d.starts_with("nextval("))
            .unwrap_or(false);
        if is_serial {
            serial_columns.push(col_name.clone());
        }

        columns.push(ColumnSpec {
            name: col_name,
            ty: TypeDescriptor::parse(&declared),
            nullable,
            default: if is_serial { None } else { default },
        });
    }
    Ok((columns, serial_columns))
}

async fn load_primary_key(db: &dyn DbHandle, schema: &str, table: &str) -> Result<Vec<String>> {
    let rows = db
        .query(&format!(
            "SELECT a.attname::text \
             FROM pg_catalog.pg_constraint c \
             JOIN pg_catalog.pg_class t ON t.oid = c.conrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid \
             WHERE n.nspname = {} AND t.relname = {} \
               AND c.contype = 'p' AND a.attnum = ANY(c.conkey) \
             ORDER BY array_position(c.conkey, a.attnum)",
            quote_literal(schema),
            quote_literal(table)
        ))
        .await?;

    rows.iter()
        .map(|row| cell_str(row, 0, "pg_constraint"))
        .collect()
}

async fn load_foreign_keys(
    db: &dyn DbHandle,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeySpec>> {
    let rows = db
        .query(&format!(
            "SELECT c.conname::text, la.attname::text, rt.relname::text, ra.attname::text, \
                    k.ord::int \
             FROM pg_catalog.pg_constraint c \
             JOIN pg_catalog.pg_class t ON t.oid = c.conrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid \
             CROSS JOIN LATERAL unnest(c.conkey, c.confkey) \
                   WITH ORDINALITY AS k(attnum, fattnum, ord) \
             JOIN pg_catalog.pg_attribute la ON la.attrelid = t.oid AND la.attnum = k.attnum \
             JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.fattnum \
             WHERE c.contype = 'f' AND n.nspname = {} AND t.relname = {} \
             ORDER BY c.conname, k.ord",
            quote_literal(schema),
            quote_literal(table)
        ))
        .await?;

    let mut grouped: BTreeMap<String, (String, Vec<(String, String)>)> = BTreeMap::new();
    for row in &rows {
        let conname = cell_str(row, 0, "pg_constraint")?;
        let local = cell_str(row, 1, "pg_constraint")?;
        let referenced_table = cell_str(row, 2, "pg_constraint")?;
        let referenced = cell_str(row, 3, "pg_constraint")?;
        grouped
            .entry(conname)
            .or_insert_with(|| (referenced_table, Vec::new()))
            .1
            .push((local, referenced));
    }

    Ok(grouped
        .into_values()
        .map(|(referenced_table, pairs)| ForeignKeySpec {
            columns: pairs.iter().map(|(l, _)| l.clone()).collect(),
            referenced_table,
            referenced_columns: pairs.into_iter().map(|(_, r)| r).collect(),
        })
        .collect())
}

async fn load_indexes(db: &dyn DbHandle, schema: &str, table: &str) -> Result<Vec<IndexSpec>> {
    let rows = db
        .query(&format!(
            "SELECT i.relname::text, ix.indisunique, a.attname::text, k.ord::int \
             FROM pg_catalog.pg_index ix \
             JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = {} AND t.relname = {} AND NOT ix.indisprimary \
             ORDER BY i.relname, k.ord",
            quote_literal(schema),
            quote_literal(table)
        ))
        .await?;

    let mut grouped: BTreeMap<String, (bool, Vec<String>)> = BTreeMap::new();
    for row in &rows {
        let name = cell_str(row, 0, "pg_index")?;
        let unique = row.get(1).and_then(|v| v.as_bool()).unwrap_or(false);
        let column = cell_str(row, 2, "pg_index")?;
        grouped
            .entry(name)
            .or_insert_with(|| (unique, Vec::new()))
            .1
            .push(column);
    }

    Ok(grouped
        .into_iter()
        .map(|(name, (unique, columns))| IndexSpec {
            name,
            columns,
            unique,
        })
        .collect())
}

fn cell_str(row: &[crate::core::SqlValue], idx: usize, context: &str) -> Result<String> {
    row.get(idx)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            MigrateError::Introspection(format!(
                "{}: expected text in column {} of catalog row",
                context, idx
            ))
        })
}
