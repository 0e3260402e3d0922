//! Identifier validation and quoting.
//!
//! SQL identifiers (table names, column names) cannot be passed as
//! parameters in prepared statements, so every piece of generated SQL in
//! this crate builds them through the functions here: validate for
//! suspicious content, then double-quote.
//!
//! Both SQLite and PostgreSQL accept the same `"name"` quoting with embedded
//! quotes doubled, so one quoting function serves both dialects.

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers past 63 bytes; staying under that limit
/// keeps generated constraint and index names stable on both engines.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier before it is spliced into generated SQL.
///
/// Rejects empty names, names containing null bytes, and names exceeding
/// the portable length limit.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier for either dialect.
///
/// Escapes embedded double quotes by doubling them and wraps the name in
/// double quotes. Validates first.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a string for use inside a single-quoted SQL literal.
///
/// Doubles embedded single quotes. This is for generated literal contexts
/// (function arguments like `pg_get_serial_sequence`); row data goes through
/// the encoder instead.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
