//! SQL dialects and type mapping.
//!
//! The engine speaks exactly two dialects: embedded SQLite as the source of
//! record and networked PostgreSQL as the target. Every function that renders
//! SQL takes the [`Dialect`] explicitly; nothing consults ambient state to
//! decide how to quote or type a column.

mod typemap;

pub use typemap::{map_type, TranslationWarning};

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// The two engines this tool renders SQL for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Stable lowercase name, matching the config `engine` field and the
    /// `dialect` filter in migration step files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dialect {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(MigrateError::Config(format!(
                "unknown database engine: {} (expected sqlite or postgres)",
                other
            ))),
        }
    }
}
