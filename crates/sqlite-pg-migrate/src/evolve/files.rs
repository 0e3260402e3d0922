//! Discovery and validation of migration step files.
//!
//! Steps live in one directory as `NNNN_name.yaml`, where `NNNN` is a
//! zero-padded ordinal that fixes on-disk ordering. The revision links inside
//! the files must agree with that ordering; `discover_steps` refuses a
//! directory where they do not.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::evolve::state::LOCK_SENTINEL;
use crate::evolve::step::MigrationStep;

const FILENAME_PATTERN: &str = r"^(\d{4})_(.+)\.ya?ml$";

/// A parsed step file, ordered by its filename ordinal.
#[derive(Debug, Clone)]
pub struct StepFile {
    pub ordinal: u32,
    pub path: PathBuf,
    pub step: MigrationStep,
}

/// Extracts `(ordinal, slug)` from a step filename, or `None` when the name
/// does not match the `NNNN_name.yaml` shape.
pub fn parse_filename(name: &str) -> Option<(u32, String)> {
    let re = Regex::new(FILENAME_PATTERN).ok()?;
    let caps = re.captures(name)?;
    let ordinal: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some((ordinal, caps.get(2)?.as_str().to_string()))
}

/// Reads every step file in `dir`, sorted by ordinal, and validates the
/// revision chain. A missing directory is an empty chain, not an error, so a
/// fresh checkout can run `migrate --autogenerate` before any step exists.
pub fn discover_steps(dir: &Path) -> Result<Vec<StepFile>> {
    if !dir.exists() {
        debug!(dir = %dir.display(), "migrations directory does not exist; empty chain");
        return Ok(Vec::new());
    }
    let mut steps = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some((ordinal, _slug)) = parse_filename(name) else {
            debug!(file = name, "skipping non-step file");
            continue;
        };
        let path = entry.path();
        let text = fs::read_to_string(&path)?;
        let step: MigrationStep = serde_yaml::from_str(&text).map_err(|e| {
            MigrateError::Evolution {
                revision: name.to_string(),
                message: format!("failed to parse step file: {e}"),
            }
        })?;
        steps.push(StepFile { ordinal, path, step });
    }
    steps.sort_by_key(|s| s.ordinal);
    validate_chain(&steps)?;
    Ok(steps)
}

/// Enforces the strictly linear chain invariant over ordinal-sorted steps:
/// unique ordinals and revisions, first step without a predecessor, every
/// later step naming exactly the previous step's revision.
pub fn validate_chain(steps: &[StepFile]) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for (i, file) in steps.iter().enumerate() {
        let step = &file.step;
        if step.revision.is_empty() || step.revision == LOCK_SENTINEL {
            return Err(MigrateError::Evolution {
                revision: step.revision.clone(),
                message: format!("invalid revision id in {}", file.path.display()),
            });
        }
        if !seen.insert(step.revision.clone()) {
            return Err(MigrateError::Evolution {
                revision: step.revision.clone(),
                message: "revision id appears in more than one step".to_string(),
            });
        }
        if i > 0 && steps[i - 1].ordinal == file.ordinal {
            return Err(MigrateError::Evolution {
                revision: step.revision.clone(),
                message: format!("duplicate step ordinal {:04}", file.ordinal),
            });
        }
        let expected = if i == 0 {
            None
        } else {
            Some(steps[i - 1].step.revision.as_str())
        };
        if step.down_revision.as_deref() != expected {
            return Err(MigrateError::Evolution {
                revision: step.revision.clone(),
                message: format!(
                    "step {:04} names predecessor {:?}, expected {:?}; the chain must be linear",
                    file.ordinal,
                    step.down_revision.as_deref(),
                    expected
                ),
            });
        }
    }
    Ok(())
}

/// Ordinal for the next step file to create.
pub fn next_ordinal(steps: &[StepFile]) -> u32 {
    steps.last().map_or(1, |s| s.ordinal + 1)
}

/// Turns a human message into a filename slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    let slug = slug.trim_end_matches('_').to_string();
    if slug.is_empty() {
        "step".to_string()
    } else {
        slug
    }
}

/// Writes a step file as `NNNN_slug.yaml`, creating the directory if needed.
/// The write goes through a temp file and rename so an interrupted run never
/// leaves a half-written step that discovery would then refuse.
pub fn write_step(dir: &Path, ordinal: u32, step: &MigrationStep) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_name = format!("{:04}_{}.yaml", ordinal, slugify(&step.name));
    let path = dir.join(&file_name);
    let yaml = serde_yaml::to_string(step)?;
    let tmp = dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, yaml)?;
    fs::rename(&tmp, &path)?;
    debug!(file = %path.display(), revision = %step.revision, "step file written");
    Ok(path)
}
