//! Export and validation workflows.
//!
//! The orchestrator ties the pipeline together: introspect the embedded
//! source, synthesize PostgreSQL DDL, encode row data, and write the
//! artifact set (schema script, data script, combined loader, README).
//! Validation runs the same DDL synthesis in memory and scans it for
//! source-dialect leftovers instead of writing anything.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::{quote_ident, TableSchema};
use crate::db::{connect, DbHandle};
use crate::ddl::{self, ValidationIssue};
use crate::dialect::{Dialect, TranslationWarning};
use crate::encode;
use crate::error::{MigrateError, Result};
use crate::introspect;
use crate::sequence;

/// Artifact set produced by one export run.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub output_dir: PathBuf,
    pub schema_file: PathBuf,
    /// Absent under `--schema-only`.
    pub data_file: Option<PathBuf>,
    pub combined_file: PathBuf,
    pub readme_file: PathBuf,
    /// Source rows per table, in export order.
    pub row_counts: Vec<(String, u64)>,
    /// Types passed through unchanged during DDL synthesis.
    pub warnings: Vec<TranslationWarning>,
}

impl ExportResult {
    pub fn total_rows(&self) -> u64 {
        self.row_counts.iter().map(|(_, n)| n).sum()
    }
}

/// Coordinates export and validation against the configured database.
pub struct Orchestrator {
    config: Config,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Export the source database as a replayable PostgreSQL artifact set.
    ///
    /// A table whose data cannot be encoded is recorded in the data script
    /// as aborted and the remaining tables still export; the first such
    /// failure is returned after every artifact is written, so the run
    /// exits nonzero without hiding the rest of the output.
    pub async fn export(
        &self,
        output_override: Option<PathBuf>,
        schema_only: bool,
    ) -> Result<ExportResult> {
        self.require_sqlite_source("export")?;

        let db = connect(&self.config.database).await?;
        let tables = introspect::read_schema(db.as_ref(), &self.config.database.schema).await?;
        if tables.is_empty() {
            warn!("source database has no exportable tables");
        }

        let output_dir = output_override.unwrap_or_else(|| self.config.export.output_dir.clone());
        fs::create_dir_all(&output_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let source_label = self.config.database.path.display().to_string();

        info!(
            source = %source_label,
            output = %output_dir.display(),
            tables = tables.len(),
            schema_only,
            "starting export"
        );

        let mut counts = BTreeMap::new();
        for table in &tables {
            counts.insert(table.name.clone(), count_rows(db.as_ref(), &table.name).await?);
        }

        // Schema artifact. Drops lead so replaying over an earlier load works.
        let mut warnings = Vec::new();
        let schema_sql = ddl::schema_script(
            &tables,
            Dialect::Postgres,
            &source_label,
            true,
            &mut warnings,
        )?;
        let schema_file = output_dir.join(format!("schema_{stamp}.sql"));
        write_artifact(&schema_file, &schema_sql)?;
        info!(file = %schema_file.display(), "wrote schema artifact");

        // Data artifact.
        let mut data_file = None;
        let mut first_failure = None;
        if !schema_only {
            let artifact = self
                .build_data_script(db.as_ref(), &tables, &source_label)
                .await?;
            first_failure = artifact.first_failure;
            let path = output_dir.join(format!("data_{stamp}.sql"));
            write_artifact(&path, &artifact.script)?;
            info!(file = %path.display(), "wrote data artifact");
            data_file = Some(path);
        }

        // Combined loader: schema first, then data.
        let combined_file = output_dir.join(format!("migration_{stamp}.sql"));
        write_artifact(
            &combined_file,
            &build_combined_script(&stamp, &source_label, schema_only),
        )?;

        let readme_file = output_dir.join("README.md");
        write_artifact(
            &readme_file,
            &build_readme(&stamp, &tables, &counts, schema_only),
        )?;

        for warning in &warnings {
            warn!(warning = %warning, "type passed through unchanged");
        }

        if let Some(err) = first_failure {
            return Err(err);
        }

        let result = ExportResult {
            output_dir,
            schema_file,
            data_file,
            combined_file,
            readme_file,
            row_counts: tables
                .iter()
                .map(|t| (t.name.clone(), counts.get(&t.name).copied().unwrap_or(0)))
                .collect(),
            warnings,
        };
        info!(
            tables = tables.len(),
            rows = result.total_rows(),
            "export complete"
        );
        Ok(result)
    }

    /// Regenerate the PostgreSQL DDL in memory and scan it for tokens the
    /// target cannot accept. Writes nothing.
    pub async fn validate(&self, target: Dialect) -> Result<Vec<ValidationIssue>> {
        if target != Dialect::Postgres {
            return Err(MigrateError::Usage(format!(
                "validate supports only the postgres target dialect, got {target}"
            )));
        }
        self.require_sqlite_source("validate")?;

        let db = connect(&self.config.database).await?;
        let tables = introspect::read_schema(db.as_ref(), &self.config.database.schema).await?;
        let source_label = self.config.database.path.display().to_string();

        let mut warnings = Vec::new();
        let generated = ddl::schema_script(&tables, target, &source_label, false, &mut warnings)?;
        let issues = ddl::scan_ddl(&generated);
        if issues.is_empty() {
            info!(tables = tables.len(), "generated DDL is clean for postgres");
        } else {
            warn!(count = issues.len(), "validation found dialect issues");
        }
        Ok(issues)
    }

    /// Resynchronize serial counters on the live database.
    pub async fn fix_sequences(&self) -> Result<Vec<String>> {
        let db = connect(&self.config.database).await?;
        let tables = introspect::read_schema(db.as_ref(), &self.config.database.schema).await?;
        sequence::resync_all(db.as_ref(), &tables).await
    }

    fn require_sqlite_source(&self, operation: &str) -> Result<()> {
        if self.config.database.engine != Dialect::Sqlite {
            return Err(MigrateError::Usage(format!(
                "{operation} reads the embedded source database; set database.engine to sqlite"
            )));
        }
        Ok(())
    }

    async fn build_data_script(
        &self,
        db: &dyn DbHandle,
        tables: &[TableSchema],
        source_label: &str,
    ) -> Result<DataArtifact> {
        let mut script = format!(
            "-- Data export generated by sqlite-pg-migrate\n\
             -- Source: {}\n\
             -- Generated: {}\n\n\
             SET session_replication_role = replica;\n\n",
            source_label,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        let mut first_failure = None;
        let mut exported = Vec::new();
        for table in tables {
            let select = format!("SELECT * FROM {}", quote_ident(&table.name)?);
            let rows = db.query(&select).await?;
            if rows.is_empty() {
                script.push_str(&format!("-- No data in {}\n\n", table.name));
                continue;
            }
            match encode::insert_batches(
                table,
                &rows,
                Dialect::Postgres,
                self.config.export.batch_size,
            ) {
                Ok(statements) => {
                    script.push_str(&format!(
                        "-- Data for table: {} ({} rows)\n",
                        table.name,
                        rows.len()
                    ));
                    for statement in statements {
                        script.push_str(&statement);
                        script.push_str(";\n");
                    }
                    script.push('\n');
                    exported.push(table);
                }
                Err(err) => {
                    error!(table = %table.name, error = %err, "table export aborted");
                    script.push_str(&format!(
                        "-- Export of table {} aborted: {}\n\n",
                        table.name, err
                    ));
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        script.push_str("SET session_replication_role = DEFAULT;\n");

        let mut resync = Vec::new();
        for table in exported {
            if let Some(pk_col) = table.auto_increment_pk() {
                resync.push(sequence::resync_statement(&table.name, pk_col, Dialect::Postgres)?);
            }
        }
        if !resync.is_empty() {
            script.push_str("\n-- Advance serial counters past the loaded ids\n");
            for statement in &resync {
                script.push_str(statement);
                script.push_str(";\n");
            }
        }

        Ok(DataArtifact {
            script,
            first_failure,
        })
    }
}

struct DataArtifact {
    script: String,
    first_failure: Option<MigrateError>,
}

fn build_combined_script(stamp: &str, source_label: &str, schema_only: bool) -> String {
    let mut script = format!(
        "-- Combined migration script generated by sqlite-pg-migrate\n\
         -- Source: {}\n\
         -- Runs the schema script, then the data script.\n\n\
         \\i schema_{}.sql\n",
        source_label, stamp
    );
    if !schema_only {
        script.push_str(&format!("\\i data_{stamp}.sql\n"));
    }
    script
}

fn build_readme(
    stamp: &str,
    tables: &[TableSchema],
    counts: &BTreeMap<String, u64>,
    schema_only: bool,
) -> String {
    let mut readme = format!(
        "# Migration export\n\n\
         Generated: {}\n\n\
         ## Artifacts\n\n\
         - `schema_{stamp}.sql` — DDL for {} tables: drops, creates, indexes\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        tables.len()
    );
    if !schema_only {
        readme.push_str(&format!(
            "- `data_{stamp}.sql` — batched INSERT statements with serial counter resets\n"
        ));
    }
    readme.push_str(&format!(
        "- `migration_{stamp}.sql` — combined loader, schema then data\n\n"
    ));

    readme.push_str("## Row counts\n\n| Table | Rows |\n|-------|------|\n");
    for table in tables {
        readme.push_str(&format!(
            "| {} | {} |\n",
            table.name,
            counts.get(&table.name).copied().unwrap_or(0)
        ));
    }

    readme.push_str(&format!(
        "\n## Replay\n\n\
         Option 1, combined file:\n\n\
         ```\n\
         psql -d <database> -f migration_{stamp}.sql\n\
         ```\n\n\
         Option 2, separate files:\n\n\
         ```\n\
         psql -d <database> -f schema_{stamp}.sql\n"
    ));
    if !schema_only {
        readme.push_str(&format!("psql -d <database> -f data_{stamp}.sql\n"));
    }
    readme.push_str("```\n");
    readme
}

async fn count_rows(db: &dyn DbHandle, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
    let rows = db.query(&sql).await?;
    let n = rows
        .first()
        .and_then(|r| r.first())
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    Ok(n.max(0) as u64)
}

/// Write through a dotted temp name and rename, so a torn write never
/// leaves a half-artifact under the final name.
fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MigrateError::Config(format!("invalid artifact path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use std::path::Path;

    async fn seed_source(path: &Path) {
        let db = SqliteDb::open(path).expect("open source");
        db.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name VARCHAR(120) NOT NULL);\n\
             CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT);\n\
             INSERT INTO users (name) VALUES ('Sarah O''Brien'), ('Marcus Williams');",
        )
        .await
        .expect("seed source");
    }

    fn test_config(db_path: &Path) -> Config {
        Config::from_yaml(&format!(
            "database:\n  engine: sqlite\n  path: {}\n",
            db_path.display()
        ))
        .expect("config")
    }

    // ==================== Export ====================

    #[tokio::test]
    async fn export_writes_the_full_artifact_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        seed_source(&db_path).await;
        let out = dir.path().join("out");

        let orchestrator = Orchestrator::new(test_config(&db_path));
        let result = orchestrator
            .export(Some(out.clone()), false)
            .await
            .expect("export");

        assert!(result.schema_file.exists());
        let data_file = result.data_file.as_ref().expect("data artifact");
        assert!(data_file.exists());
        assert!(result.combined_file.exists());
        assert!(result.readme_file.exists());
        assert_eq!(result.total_rows(), 2);

        let schema = std::fs::read_to_string(&result.schema_file).expect("read schema");
        assert!(schema.contains("DROP TABLE IF EXISTS \"users\" CASCADE;"));
        assert!(schema.contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(!schema.contains("AUTOINCREMENT"));

        let data = std::fs::read_to_string(data_file).expect("read data");
        assert!(data.contains("SET session_replication_role = replica;"));
        assert!(data.contains("-- Data for table: users (2 rows)"));
        assert!(data.contains("'Sarah O''Brien'"));
        assert!(data.contains("-- No data in notes"));
        assert!(data.contains("SET session_replication_role = DEFAULT;"));
        // Counter reset only for the table that exported rows.
        assert!(data.contains("pg_get_serial_sequence('\"users\"'"));
        assert!(!data.contains("pg_get_serial_sequence('\"notes\"'"));
    }

    #[tokio::test]
    async fn combined_file_replays_schema_then_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        seed_source(&db_path).await;

        let orchestrator = Orchestrator::new(test_config(&db_path));
        let result = orchestrator
            .export(Some(dir.path().join("out")), false)
            .await
            .expect("export");

        let combined = std::fs::read_to_string(&result.combined_file).expect("read combined");
        let schema_pos = combined.find("\\i schema_").expect("schema include");
        let data_pos = combined.find("\\i data_").expect("data include");
        assert!(schema_pos < data_pos);

        let readme = std::fs::read_to_string(&result.readme_file).expect("read readme");
        assert!(readme.contains("| users | 2 |"));
        assert!(readme.contains("| notes | 0 |"));
        assert!(readme.contains("psql -d <database> -f migration_"));
    }

    #[tokio::test]
    async fn schema_only_omits_the_data_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        seed_source(&db_path).await;

        let orchestrator = Orchestrator::new(test_config(&db_path));
        let result = orchestrator
            .export(Some(dir.path().join("out")), true)
            .await
            .expect("export");

        assert!(result.data_file.is_none());
        let combined = std::fs::read_to_string(&result.combined_file).expect("read combined");
        assert!(combined.contains("\\i schema_"));
        assert!(!combined.contains("\\i data_"));
        // Row counts still come from the live source.
        let readme = std::fs::read_to_string(&result.readme_file).expect("read readme");
        assert!(readme.contains("| users | 2 |"));
    }

    #[tokio::test]
    async fn unencodable_table_aborts_without_stopping_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        {
            let db = SqliteDb::open(&db_path).expect("open source");
            db.execute_batch(
                "CREATE TABLE flags (id INTEGER PRIMARY KEY AUTOINCREMENT, ok BOOLEAN);\n\
                 CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name VARCHAR(120));\n\
                 INSERT INTO flags (ok) VALUES (2);\n\
                 INSERT INTO users (name) VALUES ('Sarah Chen');",
            )
            .await
            .expect("seed source");
        }

        let out = dir.path().join("out");
        let orchestrator = Orchestrator::new(test_config(&db_path));
        let err = orchestrator
            .export(Some(out.clone()), false)
            .await
            .expect_err("export must fail");
        match err {
            MigrateError::Encoding { table, row, .. } => {
                assert_eq!(table, "flags");
                assert_eq!(row, 1);
            }
            other => panic!("expected encoding error, got {:?}", other),
        }

        // The artifacts are still on disk, with the failure spelled out and
        // the healthy table fully exported.
        let data_path = std::fs::read_dir(&out)
            .expect("read out dir")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("data_"))
            })
            .expect("data artifact present");
        let data = std::fs::read_to_string(data_path).expect("read data");
        assert!(data.contains("-- Export of table flags aborted:"));
        assert!(data.contains("'Sarah Chen'"));
    }

    #[tokio::test]
    async fn export_requires_a_sqlite_source() {
        let config = Config::from_yaml(
            "database:\n  engine: postgres\n  database: clinic\n  user: app\n",
        )
        .expect("config");
        let err = Orchestrator::new(config)
            .export(None, false)
            .await
            .expect_err("must fail");
        assert!(matches!(err, MigrateError::Usage(_)));
    }

    // ==================== Validate ====================

    #[tokio::test]
    async fn validate_passes_clean_generated_ddl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        seed_source(&db_path).await;

        let orchestrator = Orchestrator::new(test_config(&db_path));
        let issues = orchestrator
            .validate(Dialect::Postgres)
            .await
            .expect("validate");
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
        // Nothing written anywhere.
        assert!(!dir.path().join("migration_export").exists());
    }

    #[tokio::test]
    async fn validate_rejects_non_postgres_targets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        seed_source(&db_path).await;

        let err = Orchestrator::new(test_config(&db_path))
            .validate(Dialect::Sqlite)
            .await
            .expect_err("must fail");
        assert!(matches!(err, MigrateError::Usage(_)));
    }

    // ==================== Sequences ====================

    #[tokio::test]
    async fn fix_sequences_touches_serial_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clinic.db");
        seed_source(&db_path).await;

        let orchestrator = Orchestrator::new(test_config(&db_path));
        let resynced = orchestrator.fix_sequences().await.expect("fix sequences");
        // notes has a serial key but no sqlite_sequence row requirement;
        // both tables carry single-column autoincrement keys.
        assert_eq!(resynced, vec!["notes".to_string(), "users".to_string()]);
    }
}
