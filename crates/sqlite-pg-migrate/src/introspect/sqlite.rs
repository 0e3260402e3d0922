//! SQLite catalog introspection via `sqlite_master` and PRAGMA calls.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{
    quote_ident, ColumnSpec, ForeignKeySpec, IndexSpec, PrimaryKeySpec, TableSchema,
    TypeDescriptor,
};
use crate::db::DbHandle;
use crate::error::{MigrateError, Result};

pub(super) async fn read_schema(db: &dyn DbHandle) -> Result<Vec<TableSchema>> {
    let rows = db
        .query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .await?;

    let mut tables = Vec::new();
    for row in rows {
        let name = row
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| MigrateError::Introspection("sqlite_master returned no name".into()))?
            .to_string();
        if super::is_reserved_table(&name) {
            continue;
        }
        tables.push(load_table(db, &name).await?);
    }
    Ok(tables)
}

pub(super) async fn read_table(db: &dyn DbHandle, table: &str) -> Result<Option<TableSchema>> {
    let rows = db
        .query(&format!(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {}",
            crate::core::quote_literal(table)
        ))
        .await?;
    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(load_table(db, table).await?))
}

async fn load_table(db: &dyn DbHandle, name: &str) -> Result<TableSchema> {
    let quoted = quote_ident(name)?;

    // PRAGMA table_info: cid, name, type, notnull, dflt_value, pk
    let rows = db.query(&format!("PRAGMA table_info({})", quoted)).await?;
    if rows.is_empty() {
        return Err(MigrateError::Introspection(format!(
            "table {} has no columns in the catalog",
            name
        )));
    }

    let mut columns = Vec::new();
    // (pk ordinal, column name) so composite keys come out in key order
    let mut pk_cols: Vec<(i64, String)> = Vec::new();
    for row in &rows {
        let col_name = field_str(row, 1, name)?;
        let declared = field_str(row, 2, name)?;
        let notnull = row.get(3).and_then(|v| v.as_i64()).unwrap_or(0) != 0;
        let default = row.get(4).and_then(|v| v.as_str()).map(str::to_string);
        let pk_ordinal = row.get(5).and_then(|v| v.as_i64()).unwrap_or(0);

        let ty = TypeDescriptor::parse(&declared);
        if pk_ordinal > 0 {
            pk_cols.push((pk_ordinal, col_name.clone()));
        }
        columns.push(ColumnSpec {
            name: col_name,
            ty,
            nullable: !notnull,
            default,
        });
    }

    pk_cols.sort_by_key(|(ordinal, _)| *ordinal);
    let primary_key = if pk_cols.is_empty() {
        debug!(table = name, "no primary key declared");
        None
    } else {
        let key_columns: Vec<String> = pk_cols.into_iter().map(|(_, c)| c).collect();
        // A lone INTEGER key column is the rowid alias and auto-assigns,
        // with or without the AUTOINCREMENT keyword.
        let auto_increment = key_columns.len() == 1
            && columns
                .iter()
                .find(|c| c.name == key_columns[0])
                .map(|c| c.ty.is_integer())
                .unwrap_or(false);
        Some(PrimaryKeySpec {
            columns: key_columns,
            auto_increment,
        })
    };

    let foreign_keys = load_foreign_keys(db, &quoted).await?;
    let indexes = load_indexes(db, &quoted).await?;

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

async fn load_foreign_keys(db: &dyn DbHandle, quoted_table: &str) -> Result<Vec<ForeignKeySpec>> {
    // PRAGMA foreign_key_list: id, seq, table, from, to, on_update, on_delete, match
    let rows = db
        .query(&format!("PRAGMA foreign_key_list({})", quoted_table))
        .await?;

    // One constraint per id; seq orders the column pairs within it
    let mut grouped: BTreeMap<i64, (String, Vec<(i64, String, String)>)> = BTreeMap::new();
    for row in &rows {
        let id = row.first().and_then(|v| v.as_i64()).unwrap_or(0);
        let seq = row.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
        let referenced = field_str(row, 2, "foreign_key_list")?;
        let from = field_str(row, 3, "foreign_key_list")?;
        // `to` is NULL when the reference names no column and means the
        // parent's primary key; this schema family always calls that `id`.
        let to = row
            .get(4)
            .and_then(|v| v.as_str())
            .unwrap_or("id")
            .to_string();
        grouped
            .entry(id)
            .or_insert_with(|| (referenced, Vec::new()))
            .1
            .push((seq, from, to));
    }

    let mut fks = Vec::new();
    for (_, (referenced_table, mut pairs)) in grouped {
        pairs.sort_by_key(|(seq, _, _)| *seq);
        fks.push(ForeignKeySpec {
            columns: pairs.iter().map(|(_, f, _)| f.clone()).collect(),
            referenced_table,
            referenced_columns: pairs.into_iter().map(|(_, _, t)| t).collect(),
        });
    }
    Ok(fks)
}

async fn load_indexes(db: &dyn DbHandle, quoted_table: &str) -> Result<Vec<IndexSpec>> {
    // PRAGMA index_list: seq, name, unique, origin, partial
    let rows = db
        .query(&format!("PRAGMA index_list({})", quoted_table))
        .await?;

    let mut indexes = Vec::new();
    for row in &rows {
        let name = field_str(row, 1, "index_list")?;
        let unique = row.get(2).and_then(|v| v.as_i64()).unwrap_or(0) != 0;
        let origin = row.get(3).and_then(|v| v.as_str()).unwrap_or("");
        // origin 'c' = explicitly created; 'pk'/'u' are implicit constraint
        // indexes the DDL synthesizer regenerates from the key metadata
        if origin != "c" || name.starts_with("sqlite_autoindex") {
            continue;
        }

        let info = db
            .query(&format!("PRAGMA index_info({})", quote_ident(&name)?))
            .await?;
        let mut cols: Vec<(i64, String)> = Vec::new();
        for info_row in &info {
            let seqno = info_row.first().and_then(|v| v.as_i64()).unwrap_or(0);
            let col = field_str(info_row, 2, "index_info")?;
            cols.push((seqno, col));
        }
        cols.sort_by_key(|(seqno, _)| *seqno);

        indexes.push(IndexSpec {
            name,
            columns: cols.into_iter().map(|(_, c)| c).collect(),
            unique,
        });
    }
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}

fn field_str(row: &[crate::core::SqlValue], idx: usize, context: &str) -> Result<String> {
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
