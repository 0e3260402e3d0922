//! Literal encoding and batched INSERT assembly.
//!
//! Every exported cell becomes a SQL literal the target dialect parses back
//! to the same value. Quoting is the whole game: one unescaped quote breaks
//! the script, so text goes through exactly one escaper here.

use crate::core::{quote_ident, SqlValue, TableSchema, TypeDescriptor};
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Encode one cell as a SQL literal.
///
/// The declared type drives interpretation of SQLite's loose storage
/// classes: integer 0/1 under a `BOOLEAN` column becomes `FALSE`/`TRUE`.
/// Errors carry only the reason; callers attach table and row context.
pub fn encode_literal(
    value: &SqlValue,
    ty: &TypeDescriptor,
    dialect: Dialect,
) -> std::result::Result<String, String> {
    match value {
        SqlValue::Null => Ok("NULL".to_string()),
        SqlValue::Bool(b) => Ok(bool_literal(*b)),
        SqlValue::Int(i) => {
            if *ty == TypeDescriptor::Boolean {
                match i {
                    0 => Ok(bool_literal(false)),
                    1 => Ok(bool_literal(true)),
                    other => Err(format!("integer {} is not a valid boolean", other)),
                }
            } else {
                Ok(i.to_string())
            }
        }
        SqlValue::Float(f) => {
            if f.is_finite() {
                Ok(f.to_string())
            } else {
                Err(format!("non-finite float {} cannot be exported", f))
            }
        }
        SqlValue::Text(s) => Ok(quote_text(s)),
        SqlValue::Bytes(b) => Ok(match dialect {
            Dialect::Postgres => format!("'\\x{}'", hex::encode(b)),
            Dialect::Sqlite => format!("X'{}'", hex::encode_upper(b)),
        }),
    }
}

fn bool_literal(b: bool) -> String {
    if b { "TRUE" } else { "FALSE" }.to_string()
}

/// Single-quote a string, doubling embedded quotes (`O'Brien` → `'O''Brien'`).
fn quote_text(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a table's rows as multi-row INSERT statements of at most
/// `batch_size` rows each, without trailing semicolons.
///
/// Rows must match the table's column order. The first cell that fails to
/// encode aborts the table with an error naming its one-based row ordinal.
pub fn insert_batches(
    table: &TableSchema,
    rows: &[Vec<SqlValue>],
    dialect: Dialect,
    batch_size: usize,
) -> Result<Vec<String>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let col_list = table
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let header = format!("INSERT INTO {} ({}) VALUES", quote_ident(&table.name)?, col_list);

    let mut statements = Vec::new();
    for (chunk_idx, chunk) in rows.chunks(batch_size.max(1)).enumerate() {
        let mut tuples = Vec::with_capacity(chunk.len());
        for (offset, row) in chunk.iter().enumerate() {
            let ordinal = chunk_idx * batch_size.max(1) + offset + 1;
            if row.len() != table.columns.len() {
                return Err(MigrateError::encoding(
                    &table.name,
                    ordinal,
                    format!(
                        "row has {} values, table has {} columns",
                        row.len(),
                        table.columns.len()
                    ),
                ));
            }
            let mut literals = Vec::with_capacity(row.len());
            for (cell, col) in row.iter().zip(&table.columns) {
                let literal = encode_literal(cell, &col.ty, dialect).map_err(|message| {
                    MigrateError::encoding(
                        &table.name,
                        ordinal,
                        format!("column {}: {}", col.name, message),
                    )
                })?;
                literals.push(literal);
            }
            tuples.push(format!("({})", literals.join(", ")));
        }
        statements.push(format!("{}\n{}", header, tuples.join(",\n")));
    }
    Ok(statements)
}
