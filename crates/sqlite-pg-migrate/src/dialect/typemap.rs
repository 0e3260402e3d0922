//! Column type rendering per dialect.
//!
//! One function, keyed on the target [`Dialect`]. SQLite accepts any declared
//! type name and derives affinity from it, so the SQLite side renders the
//! descriptor's canonical form; the PostgreSQL side applies the real mapping
//! table.

use crate::core::schema::TypeDescriptor;
use crate::dialect::Dialect;

/// A type that could not be translated and was passed through verbatim.
///
/// Collected per run and reported together at the end; never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationWarning {
    pub table: String,
    pub column: String,
    pub raw: String,
}

impl std::fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}: unrecognized type {:?} passed through unchanged",
            self.table, self.column, self.raw
        )
    }
}

/// Render a type descriptor as the target dialect's column type.
///
/// Unknown descriptors pass through verbatim on both dialects; the caller is
/// responsible for recording a [`TranslationWarning`] when that happens.
pub fn map_type(ty: &TypeDescriptor, dialect: Dialect) -> String {
    match dialect {
        // Canonical form: SQLite keeps declared names and applies affinity,
        // and the introspector parses the same names back.
        Dialect::Sqlite => ty.to_string(),
        Dialect::Postgres => match ty {
            TypeDescriptor::Integer => "INTEGER".to_string(),
            TypeDescriptor::SmallInt => "SMALLINT".to_string(),
            TypeDescriptor::BigInt => "BIGINT".to_string(),
            TypeDescriptor::Float => "REAL".to_string(),
            TypeDescriptor::Double => "DOUBLE PRECISION".to_string(),
            TypeDescriptor::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            TypeDescriptor::Char(n) => format!("CHAR({})", n),
            TypeDescriptor::Varchar(Some(n)) => format!("VARCHAR({})", n),
            TypeDescriptor::Varchar(None) | TypeDescriptor::Text => "TEXT".to_string(),
            TypeDescriptor::Blob => "BYTEA".to_string(),
            TypeDescriptor::Boolean => "BOOLEAN".to_string(),
            TypeDescriptor::Date => "DATE".to_string(),
            TypeDescriptor::Time => "TIME".to_string(),
            TypeDescriptor::DateTime => "TIMESTAMP".to_string(),
            TypeDescriptor::Json => "JSONB".to_string(),
            TypeDescriptor::Unknown(raw) => raw.clone(),
        },
    }
}
