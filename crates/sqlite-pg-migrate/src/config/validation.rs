//! Configuration validation.

use super::Config;
use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    match config.database.engine {
        Dialect::Sqlite => {
            if config.database.path.as_os_str().is_empty() {
                return Err(MigrateError::Config(
                    "database.path is required for engine sqlite".into(),
                ));
            }
        }
        Dialect::Postgres => {
            if config.database.host.is_empty() {
                return Err(MigrateError::Config(
                    "database.host is required for engine postgres".into(),
                ));
            }
            if config.database.database.is_empty() {
                return Err(MigrateError::Config(
                    "database.database is required for engine postgres".into(),
                ));
            }
            if config.database.user.is_empty() {
                return Err(MigrateError::Config(
                    "database.user is required for engine postgres".into(),
                ));
            }
        }
    }

    if config.export.batch_size == 0 {
        return Err(MigrateError::Config(
            "export.batch_size must be at least 1".into(),
        ));
    }

    if config.migrations.dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("migrations.dir is required".into()));
    }
    if config.migrations.lock_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migrations.lock_timeout_secs must be at least 1".into(),
        ));
    }

    Ok(())
}
