//! Execution of the migration chain against a live database.
//!
//! Each step moves `pending -> applying -> applied` going forward and
//! `applied -> reverting -> pending` going back; a step starts applying only
//! when the marker shows its predecessor, which keeps the chain strictly
//! linear even if plan files changed between planning and execution.
//!
//! Strategy selection is per dialect: postgres lowers every operation to an
//! in-place ALTER and runs a whole step, marker update included, as one
//! batch (the simple query protocol makes that a single implicit
//! transaction). sqlite can only add columns in place, so column drops and
//! constraint changes go through the shared rebuild-via-copy path.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::DbHandle;
use crate::ddl;
use crate::dialect::{Dialect, TranslationWarning};
use crate::error::{MigrateError, Result};
use crate::evolve::autogen;
use crate::evolve::files::{self, StepFile};
use crate::evolve::rebuild;
use crate::evolve::state;
use crate::evolve::step::{self, MigrationOp, MigrationStep};
use crate::introspect::{read_schema, read_table};

/// Lifecycle state of one step. `Applied` and `Pending` are the terminal
/// states visible in status output; the other two only ever appear in logs
/// while an engine run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Applying,
    Applied,
    Reverting,
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepState::Pending => "pending",
            StepState::Applying => "applying",
            StepState::Applied => "applied",
            StepState::Reverting => "reverting",
        };
        f.write_str(s)
    }
}

/// One row of `migrate --status` output.
#[derive(Debug, Clone)]
pub struct StepStatus {
    pub ordinal: u32,
    pub revision: String,
    pub name: String,
    pub state: StepState,
}

/// Plans and executes migration steps for one database.
pub struct EvolutionEngine<'a> {
    db: &'a dyn DbHandle,
    migrations_dir: PathBuf,
    pg_schema: String,
    lock_timeout: Duration,
}

impl<'a> EvolutionEngine<'a> {
    pub fn new(db: &'a dyn DbHandle, config: &Config) -> Self {
        Self {
            db,
            migrations_dir: config.migrations.dir.clone(),
            pg_schema: config.database.schema.clone(),
            lock_timeout: Duration::from_secs(config.migrations.lock_timeout_secs),
        }
    }

    /// Reports every step in the chain with its terminal state. Read-only;
    /// does not take the migration lock.
    pub async fn status(&self) -> Result<Vec<StepStatus>> {
        let steps = files::discover_steps(&self.migrations_dir)?;
        state::ensure_version_table(self.db).await?;
        let current = state::current_revision(self.db).await?;
        let head_pos = position_of_current(&steps, current.as_deref())?;
        Ok(steps
            .iter()
            .enumerate()
            .map(|(i, f)| StepStatus {
                ordinal: f.ordinal,
                revision: f.step.revision.clone(),
                name: f.step.name.clone(),
                state: match head_pos {
                    Some(h) if i <= h => StepState::Applied,
                    _ => StepState::Pending,
                },
            })
            .collect())
    }

    /// Applies pending steps up to and including `target` (`head` or an
    /// exact revision id). Returns the number of steps applied.
    pub async fn upgrade(&self, target: &str) -> Result<u32> {
        let steps = files::discover_steps(&self.migrations_dir)?;
        state::ensure_version_table(self.db).await?;
        state::acquire_lock(self.db, self.lock_timeout).await?;
        let outcome = self.upgrade_locked(&steps, target).await;
        if let Err(e) = state::release_lock(self.db).await {
            warn!(error = %e, "failed to release migration lock");
        }
        outcome
    }

    /// Reverts applied steps down to (and keeping) `target`: `base` reverts
    /// everything, `-1` one step, a revision id reverts until that revision
    /// is the head. Returns the number of steps reverted.
    pub async fn downgrade(&self, target: &str) -> Result<u32> {
        let steps = files::discover_steps(&self.migrations_dir)?;
        state::ensure_version_table(self.db).await?;
        state::acquire_lock(self.db, self.lock_timeout).await?;
        let outcome = self.downgrade_locked(&steps, target).await;
        if let Err(e) = state::release_lock(self.db).await {
            warn!(error = %e, "failed to release migration lock");
        }
        outcome
    }

    /// Marks the database as being at the head of the chain without running
    /// any operations. Used to adopt a database whose schema was created by
    /// other means (an export replay, typically).
    pub async fn stamp_head(&self) -> Result<Option<String>> {
        let steps = files::discover_steps(&self.migrations_dir)?;
        state::ensure_version_table(self.db).await?;
        state::acquire_lock(self.db, self.lock_timeout).await?;
        let head = steps.last().map(|f| f.step.revision.clone());
        let outcome = state::set_revision(self.db, head.as_deref()).await;
        if let Err(e) = state::release_lock(self.db).await {
            warn!(error = %e, "failed to release migration lock");
        }
        outcome?;
        match &head {
            Some(rev) => info!(revision = %rev, "database stamped at head"),
            None => info!("chain is empty; database stamped at base"),
        }
        Ok(head)
    }

    /// Compares the live schema against the chain's replayed model and
    /// writes a new step file capturing the drift at table and column
    /// granularity. Index and foreign key drift is reported in logs but not
    /// turned into operations. No drift still writes an (empty) step, so a
    /// release always gets its revision.
    pub async fn autogenerate(&self, message: &str) -> Result<PathBuf> {
        let steps = files::discover_steps(&self.migrations_dir)?;
        let dialect = self.db.dialect();
        let model = autogen::replay_chain(&steps, dialect)?;
        let live = read_schema(self.db, &self.pg_schema).await?;
        let (up, down) = autogen::diff_schemas(&model, &live);
        if up.is_empty() {
            info!("no schema drift detected; writing an empty step");
        }
        let new_step = MigrationStep {
            revision: step::new_revision_id(),
            down_revision: steps.last().map(|f| f.step.revision.clone()),
            name: message.to_string(),
            only_dialect: None,
            up,
            down,
        };
        let path = files::write_step(&self.migrations_dir, files::next_ordinal(&steps), &new_step)?;
        info!(file = %path.display(), revision = %new_step.revision, "migration step generated");
        Ok(path)
    }

    async fn upgrade_locked(&self, steps: &[StepFile], target: &str) -> Result<u32> {
        let current = state::current_revision(self.db).await?;
        let cur_pos = position_of_current(steps, current.as_deref())?;
        let target_pos = match target {
            "head" => match steps.len().checked_sub(1) {
                Some(p) => p,
                None => {
                    info!("no migration steps found; nothing to apply");
                    return Ok(0);
                }
            },
            rev => position_of(steps, rev)
                .ok_or_else(|| MigrateError::Usage(format!("unknown revision {rev}")))?,
        };
        if let Some(cp) = cur_pos {
            if target_pos < cp {
                return Err(MigrateError::Usage(format!(
                    "revision {} is behind the current head; use --downgrade",
                    steps[target_pos].step.revision
                )));
            }
            if target_pos == cp {
                info!(revision = %steps[cp].step.revision, "already at the requested revision");
                return Ok(0);
            }
        }
        let start = cur_pos.map_or(0, |p| p + 1);
        let mut applied = 0u32;
        for file in &steps[start..=target_pos] {
            self.run_step(file, true).await?;
            applied += 1;
        }
        info!(steps = applied, "upgrade complete");
        Ok(applied)
    }

    async fn downgrade_locked(&self, steps: &[StepFile], target: &str) -> Result<u32> {
        let current = state::current_revision(self.db).await?;
        let Some(cur_pos) = position_of_current(steps, current.as_deref())? else {
            info!("database is at base; nothing to revert");
            return Ok(0);
        };
        let keep_pos = match target {
            "base" => None,
            "-1" => cur_pos.checked_sub(1),
            rev => {
                let p = position_of(steps, rev)
                    .ok_or_else(|| MigrateError::Usage(format!("unknown revision {rev}")))?;
                if p > cur_pos {
                    return Err(MigrateError::Usage(format!(
                        "revision {rev} is ahead of the current head; use --upgrade"
                    )));
                }
                if p == cur_pos {
                    info!(revision = rev, "already at the requested revision");
                    return Ok(0);
                }
                Some(p)
            }
        };
        let start = keep_pos.map_or(0, |p| p + 1);
        let mut reverted = 0u32;
        for file in steps[start..=cur_pos].iter().rev() {
            self.run_step(file, false).await?;
            reverted += 1;
        }
        info!(steps = reverted, "downgrade complete");
        Ok(reverted)
    }

    /// Runs one step forward or backward, including the marker update.
    async fn run_step(&self, file: &StepFile, forward: bool) -> Result<()> {
        let step = &file.step;
        let (ops, marker, running, done) = if forward {
            (
                &step.up,
                Some(step.revision.as_str()),
                StepState::Applying,
                StepState::Applied,
            )
        } else {
            (
                &step.down,
                step.down_revision.as_deref(),
                StepState::Reverting,
                StepState::Pending,
            )
        };

        // The marker must show this step's neighbor before the transition
        // may start; anything else means the plan went stale under us.
        let observed = state::current_revision(self.db).await?;
        let expected = if forward {
            step.down_revision.as_deref()
        } else {
            Some(step.revision.as_str())
        };
        if observed.as_deref() != expected {
            return Err(MigrateError::Evolution {
                revision: step.revision.clone(),
                message: format!(
                    "cannot start {running}: database is at {:?}, expected {:?}",
                    observed, expected
                ),
            });
        }

        log_transition(file, running);
        let dialect = self.db.dialect();
        if !step.applies_to(dialect) {
            info!(revision = %step.revision, "step restricted to another dialect; moving marker only");
            state::set_revision(self.db, marker).await?;
            log_transition(file, done);
            return Ok(());
        }

        match dialect {
            Dialect::Postgres => self.run_ops_postgres(ops, marker).await?,
            Dialect::Sqlite => {
                for op in ops {
                    debug!(revision = %step.revision, op = %op.describe(), "running operation");
                    if let Err(e) = self.apply_op_sqlite(step, op).await {
                        error!(revision = %step.revision, op = %op.describe(), "operation failed");
                        return Err(e);
                    }
                }
                state::set_revision(self.db, marker).await?;
            }
        }
        log_transition(file, done);
        Ok(())
    }

    /// Lowers every operation to SQL and executes the step as one batch so
    /// DDL and marker commit together.
    async fn run_ops_postgres(&self, ops: &[MigrationOp], marker: Option<&str>) -> Result<()> {
        let mut statements = Vec::new();
        let mut warnings = Vec::new();
        for op in ops {
            statements.extend(lower_op_postgres(op, &mut warnings)?);
        }
        log_warnings(&warnings);
        statements.extend(state::marker_update_sql(marker));
        self.db.execute_batch(&statements.join(";\n")).await
    }

    async fn apply_op_sqlite(&self, step: &MigrationStep, op: &MigrationOp) -> Result<()> {
        let dialect = Dialect::Sqlite;
        match op {
            MigrationOp::CreateTable { table } => {
                let mut warnings = Vec::new();
                let sql = ddl::create_table_sql(table, dialect, &mut warnings)?;
                log_warnings(&warnings);
                self.db.execute(&sql).await?;
                for index in &table.indexes {
                    self.db.execute(&ddl::create_index_sql(&table.name, index)?).await?;
                }
                Ok(())
            }
            MigrationOp::DropTable { table } => {
                self.db.execute(&ddl::drop_table_sql(table, dialect)?).await?;
                Ok(())
            }
            MigrationOp::AddColumn { table, column } => {
                let mut warnings = Vec::new();
                let sql = ddl::add_column_sql(table, column, dialect, &mut warnings)?;
                log_warnings(&warnings);
                self.db.execute(&sql).await?;
                Ok(())
            }
            MigrationOp::CreateIndex { table, index } => {
                self.db.execute(&ddl::create_index_sql(table, index)?).await?;
                Ok(())
            }
            MigrationOp::DropIndex { name, .. } => {
                self.db.execute(&ddl::drop_index_sql(name)?).await?;
                Ok(())
            }
            MigrationOp::RawSql { sql, dialect: only } => {
                if only.map_or(false, |d| d != dialect) {
                    debug!(op = %op.describe(), "raw sql filtered out for this dialect");
                    return Ok(());
                }
                self.db.execute_batch(sql).await
            }
            MigrationOp::DropColumn { .. }
            | MigrationOp::AddForeignKey { .. }
            | MigrationOp::DropForeignKey { .. } => self.rebuild_for_op(step, op).await,
        }
    }

    /// sqlite cannot express these changes in place; compute the target
    /// shape from the live table and rebuild through the shared copy path.
    async fn rebuild_for_op(&self, step: &MigrationStep, op: &MigrationOp) -> Result<()> {
        let table_name = op.table_name();
        let old = read_table(self.db, &self.pg_schema, table_name)
            .await?
            .ok_or_else(|| MigrateError::Evolution {
                revision: step.revision.clone(),
                message: format!("table {table_name} does not exist"),
            })?;
        let mut new = old.clone();
        step::transform_table(&mut new, op).map_err(|message| MigrateError::Evolution {
            revision: step.revision.clone(),
            message,
        })?;
        let mut warnings = Vec::new();
        let statements = rebuild::rebuild_statements(&old, &new, Dialect::Sqlite, &mut warnings)?;
        log_warnings(&warnings);
        debug!(table = table_name, statements = statements.len(), "rebuilding table");
        rebuild::execute_rebuild(self.db, &statements).await
    }
}

fn log_transition(file: &StepFile, state: StepState) {
    info!(
        ordinal = file.ordinal,
        revision = %file.step.revision,
        state = %state,
        "{}",
        file.step.name
    );
}

fn log_warnings(warnings: &[TranslationWarning]) {
    for w in warnings {
        warn!(warning = %w, "type passed through unchanged");
    }
}

fn position_of(steps: &[StepFile], revision: &str) -> Option<usize> {
    steps.iter().position(|f| f.step.revision == revision)
}

fn position_of_current(steps: &[StepFile], current: Option<&str>) -> Result<Option<usize>> {
    match current {
        None => Ok(None),
        Some(rev) => position_of(steps, rev).map(Some).ok_or_else(|| {
            MigrateError::Evolution {
                revision: rev.to_string(),
                message: "database reports a revision that is not in the local chain; \
                          was the migrations directory pruned?"
                    .to_string(),
            }
        }),
    }
}

/// Lowers one operation to postgres statements. Everything is a direct
/// ALTER; the dialect has no rebuild cases in this operation set.
fn lower_op_postgres(
    op: &MigrationOp,
    warnings: &mut Vec<TranslationWarning>,
) -> Result<Vec<String>> {
    let dialect = Dialect::Postgres;
    Ok(match op {
        MigrationOp::CreateTable { table } => {
            let mut stmts = vec![ddl::create_table_sql(table, dialect, warnings)?];
            for index in &table.indexes {
                stmts.push(ddl::create_index_sql(&table.name, index)?);
            }
            stmts
        }
        MigrationOp::DropTable { table } => vec![ddl::drop_table_sql(table, dialect)?],
        MigrationOp::AddColumn { table, column } => {
            vec![ddl::add_column_sql(table, column, dialect, warnings)?]
        }
        MigrationOp::DropColumn { table, column } => vec![ddl::drop_column_sql(table, column)?],
        MigrationOp::AddForeignKey { table, foreign_key } => {
            vec![ddl::add_foreign_key_sql(table, foreign_key)?]
        }
        MigrationOp::DropForeignKey { table, foreign_key } => {
            vec![ddl::drop_foreign_key_sql(table, foreign_key)?]
        }
        MigrationOp::CreateIndex { table, index } => vec![ddl::create_index_sql(table, index)?],
        MigrationOp::DropIndex { name, .. } => vec![ddl::drop_index_sql(name)?],
        MigrationOp::RawSql { sql, dialect: only } => {
            if only.map_or(false, |d| d != dialect) {
                debug!(op = %op.describe(), "raw sql filtered out for this dialect");
                Vec::new()
            } else {
                // Trailing semicolons would produce empty statements when the
                // batch is joined.
                vec![sql.trim().trim_end_matches(';').trim_end().to_string()]
            }
        }
    })
}
