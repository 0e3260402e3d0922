//! Incremental, reversible schema evolution.
//!
//! Steps are YAML files in a migrations directory, strictly linearly chained
//! by revision ids and ordered by a filename ordinal. The engine applies or
//! reverts them against either dialect, records the head revision in a
//! single-row marker table, and serializes concurrent runs through an
//! advisory lock row in that same table.

mod autogen;
mod engine;
mod files;
mod rebuild;
pub mod state;
mod step;

pub use engine::{EvolutionEngine, StepState, StepStatus};
pub use files::{discover_steps, parse_filename, write_step, StepFile};
pub use rebuild::{execute_rebuild, rebuild_statements, shadow_name};
pub use step::{new_revision_id, MigrationOp, MigrationStep};
