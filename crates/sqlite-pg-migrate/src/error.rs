//! Error types for the portability library.

use thiserror::Error;

/// Main error type for export, validation, evolution and seeding operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Conflicting or malformed command usage, rejected before any I/O
    #[error("Usage error: {0}")]
    Usage(String),

    /// Source catalog could not be read
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// Source database (embedded engine) error
    #[error("Source database error: {0}")]
    Source(#[from] rusqlite::Error),

    /// Target database (server engine) error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A value could not be rendered as a SQL literal; aborts that table only
    #[error("Encoding failed for table {table} (row {row}): {message}")]
    Encoding {
        table: String,
        row: usize,
        message: String,
    },

    /// Dialect-compatibility validation found issues
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A migration step failed mid-application
    #[error("Migration step {revision} failed: {message}")]
    Evolution { revision: String, message: String },

    /// A seed category failed to load
    #[error("Seed category {category} failed: {message}")]
    Seed { category: String, message: String },

    /// The single-writer migration lock could not be acquired
    #[error("Migration lock timeout: {0}")]
    LockTimeout(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create an Encoding error identifying the one-based row ordinal.
    pub fn encoding(table: impl Into<String>, row: usize, message: impl Into<String>) -> Self {
        MigrateError::Encoding {
            table: table.into(),
            row,
            message: message.into(),
        }
    }

    /// Create an Evolution error for a failing step.
    pub fn evolution(revision: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Evolution {
            revision: revision.into(),
            message: message.into(),
        }
    }

    /// Create a Seed error for a failing category.
    pub fn seed(category: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Seed {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => 1,
            MigrateError::Usage(_) => 2,
            MigrateError::Introspection(_) | MigrateError::Source(_) => 3,
            MigrateError::Target(_) => 4,
            MigrateError::Encoding { .. } => 5,
            MigrateError::Validation(_) => 6,
            MigrateError::Io(_) => 7,
            MigrateError::Evolution { .. } => 8,
            MigrateError::Seed { .. } => 9,
            MigrateError::LockTimeout(_) => 10,
        }
    }
}

/// Result type alias for portability operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
