//! CLI integration tests for sqlite-pg-migrate.
//!
//! These tests verify command-line argument parsing, exit codes for the
//! error classes, and the full seed/export/migrate workflows against a
//! throwaway SQLite database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Get a command for the sqlite-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlite-pg-migrate").unwrap()
}

/// A tempdir with a config pointing every path inside it.
struct TestEnv {
    dir: tempfile::TempDir,
    config: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        let contents = format!(
            "database:\n\
             \x20 engine: sqlite\n\
             \x20 path: {}\n\
             export:\n\
             \x20 output_dir: {}\n\
             migrations:\n\
             \x20 dir: {}\n",
            dir.path().join("clinic.db").display(),
            dir.path().join("out").display(),
            dir.path().join("migrations").display(),
        );
        fs::write(&config, contents).unwrap();
        Self { dir, config }
    }

    fn config_arg(&self) -> &str {
        self.config.to_str().unwrap()
    }

    fn out_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn artifact_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.out_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn write_step(&self, file_name: &str, yaml: &str) {
        let dir = self.dir.path().join("migrations");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file_name), yaml).unwrap();
    }
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("seed"))
        .stdout(predicate::str::contains("fix-sequences"));
}

#[test]
fn test_export_subcommand_help() {
    cmd()
        .args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--schema-only"));
}

#[test]
fn test_migrate_subcommand_help() {
    cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--status"))
        .stdout(predicate::str::contains("--upgrade"))
        .stdout(predicate::str::contains("--downgrade"))
        .stdout(predicate::str::contains("--autogenerate"))
        .stdout(predicate::str::contains("--stamp-head"));
}

#[test]
fn test_seed_subcommand_help() {
    cmd()
        .args(["seed", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--reset"))
        .stdout(predicate::str::contains("--only"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlite-pg-migrate"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default_path() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not a config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "fix-sequences"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "fix-sequences"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = tempfile::NamedTempFile::new().unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "fix-sequences"])
        .assert()
        .code(1);
}

// =============================================================================
// Flag Conflict Tests
// =============================================================================

#[test]
fn test_seed_reset_and_only_conflict_before_any_io() {
    // The config path does not exist; a usage conflict must win anyway.
    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "seed",
            "--reset",
            "--only",
            "users",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--reset and --only"));
}

#[test]
fn test_migrate_without_action_exits_with_code_2() {
    let env = TestEnv::new();
    cmd()
        .args(["--config", env.config_arg(), "migrate"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("exactly one"));
}

#[test]
fn test_migrate_autogenerate_requires_message() {
    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "migrate",
            "--autogenerate",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--message"));
}

#[test]
fn test_migrate_rejects_two_actions() {
    cmd()
        .args([
            "--config",
            "nonexistent_config_file.yaml",
            "migrate",
            "--status",
            "--stamp-head",
        ])
        .assert()
        .code(2);
}

// =============================================================================
// Seed Workflow Tests
// =============================================================================

#[test]
fn test_seed_loads_then_skips_on_rerun() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users: 7 loaded, 0 skipped"))
        .stdout(predicate::str::contains("treatments: 8 loaded"))
        .stdout(predicate::str::contains("conditions: 4 loaded"))
        .stdout(predicate::str::contains("appointments: 5 loaded"));

    cmd()
        .args(["--config", env.config_arg(), "seed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users: 0 loaded, 7 skipped"));
}

#[test]
fn test_seed_only_pulls_the_identity_category() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed", "--only", "conditions"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users: 7 loaded"))
        .stdout(predicate::str::contains("conditions: 4 loaded"))
        .stdout(predicate::str::contains("treatments:").not());
}

#[test]
fn test_seed_unknown_category_is_a_usage_error() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed", "--only", "biomarkers"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("biomarkers"));
}

// =============================================================================
// Export and Validate Workflow Tests
// =============================================================================

#[test]
fn test_export_writes_the_artifact_set() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed"])
        .assert()
        .success();

    cmd()
        .args(["--config", env.config_arg(), "export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Export completed!"));

    let names = env.artifact_names();
    assert!(names.iter().any(|n| n.starts_with("schema_")), "{names:?}");
    assert!(names.iter().any(|n| n.starts_with("data_")), "{names:?}");
    assert!(
        names.iter().any(|n| n.starts_with("migration_")),
        "{names:?}"
    );
    assert!(names.iter().any(|n| n == "README.md"), "{names:?}");
}

#[test]
fn test_export_schema_only_omits_data() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed"])
        .assert()
        .success();

    cmd()
        .args(["--config", env.config_arg(), "export", "--schema-only"])
        .assert()
        .success();

    let names = env.artifact_names();
    assert!(names.iter().any(|n| n.starts_with("schema_")), "{names:?}");
    assert!(!names.iter().any(|n| n.starts_with("data_")), "{names:?}");
}

#[test]
fn test_validate_passes_on_seeded_database() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed"])
        .assert()
        .success();

    cmd()
        .args(["--config", env.config_arg(), "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation passed"));
}

#[test]
fn test_fix_sequences_reports_resynced_tables() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "seed"])
        .assert()
        .success();

    cmd()
        .args(["--config", env.config_arg(), "fix-sequences"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users"));
}

// =============================================================================
// Migrate Workflow Tests
// =============================================================================

const STEP_CREATE_NOTES: &str = "\
revision: aaaa11111111
name: create notes
up:
  - op: create_table
    table:
      name: notes
      columns:
        - name: id
          type: INTEGER
          nullable: false
        - name: body
          type: TEXT
      primary_key:
        columns: [id]
        auto_increment: true
down:
  - op: drop_table
    table: notes
";

#[test]
fn test_migrate_status_with_no_steps() {
    let env = TestEnv::new();

    cmd()
        .args(["--config", env.config_arg(), "migrate", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No migration steps found"));
}

#[test]
fn test_migrate_upgrade_status_downgrade_flow() {
    let env = TestEnv::new();
    env.write_step("0001_create_notes.yaml", STEP_CREATE_NOTES);

    cmd()
        .args(["--config", env.config_arg(), "migrate", "--upgrade"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 1 step(s)"));

    cmd()
        .args(["--config", env.config_arg(), "migrate", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied"))
        .stdout(predicate::str::contains("create notes"));

    cmd()
        .args([
            "--config",
            env.config_arg(),
            "migrate",
            "--downgrade",
            "base",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 1 step(s)"));

    cmd()
        .args(["--config", env.config_arg(), "migrate", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"));
}

#[test]
fn test_migrate_stamp_head_skips_execution() {
    let env = TestEnv::new();
    env.write_step("0001_create_notes.yaml", STEP_CREATE_NOTES);

    cmd()
        .args(["--config", env.config_arg(), "migrate", "--stamp-head"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marker stamped to aaaa11111111"));

    cmd()
        .args(["--config", env.config_arg(), "migrate", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied"));
}
