//! # sqlite-pg-migrate
//!
//! Schema and data portability for an embedded SQLite database moving to
//! PostgreSQL, plus the day-two tooling that keeps both engines in step:
//!
//! - **Export**: introspect the live SQLite catalog, synthesize PostgreSQL
//!   DDL, and encode every row into a replayable artifact set.
//! - **Validation** of the generated DDL against the target dialect.
//! - **Schema evolution**: linear, reversible YAML migration steps with a
//!   version marker and single-writer lock, applied to either engine.
//! - **Seed reconciliation**: idempotent demo data keyed by natural ids.
//! - **Sequence resynchronization** after bulk loads with explicit keys.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, Orchestrator};
//!
//! async fn export_everything() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config);
//!     let result = orchestrator.export(None, false).await?;
//!     println!("Exported {} rows", result.total_rows());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod db;
pub mod ddl;
pub mod dialect;
pub mod encode;
pub mod error;
pub mod evolve;
pub mod introspect;
pub mod orchestrator;
pub mod seed;
pub mod sequence;

// Re-exports for convenient access
pub use crate::config::{Config, DatabaseConfig, ExportConfig, MigrationsConfig, SeedConfig};
pub use crate::core::{SqlValue, TableSchema, TypeDescriptor};
pub use crate::db::{connect, DbHandle};
pub use crate::dialect::Dialect;
pub use crate::error::{MigrateError, Result};
pub use crate::evolve::{EvolutionEngine, MigrationOp, MigrationStep, StepState, StepStatus};
pub use crate::orchestrator::{ExportResult, Orchestrator};
pub use crate::seed::{SeedLoader, SeedMode, SeedResult};
