//! Core abstractions shared by every stage of the pipeline.
//!
//! - [`schema`]: dialect-neutral table, column, key and index descriptors
//! - [`value`]: owned cell values read back from either engine
//! - [`identifier`]: identifier validation and quoting for generated SQL
//!
//! Everything here is engine-agnostic; the `db` and `introspect` modules
//! supply the SQLite and PostgreSQL specifics.

pub mod identifier;
pub mod schema;
pub mod value;

// Re-export commonly used types for convenience
pub use identifier::{quote_ident, quote_literal, validate_identifier};
pub use schema::{
    ColumnSpec, ForeignKeySpec, IndexSpec, PrimaryKeySpec, TableSchema, TypeDescriptor,
};
pub use value::SqlValue;
