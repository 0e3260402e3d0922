//! Idempotent seed reconciliation.
//!
//! Four built-in categories, loaded in dependency order: `users` (the
//! identity category; every dependent maps external ids through it),
//! `treatments` (independent catalog), `conditions` and `appointments`
//! (both reference users). Each loader guards inserts with a natural-key
//! lookup so a rerun loads nothing new; `reset` drops and recreates the
//! managed tables and loads without the lookups.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::{
    quote_literal, ColumnSpec, ForeignKeySpec, IndexSpec, PrimaryKeySpec, TableSchema,
    TypeDescriptor,
};
use crate::db::DbHandle;
use crate::ddl;
use crate::error::{MigrateError, Result};
use crate::introspect::read_table;

mod appointments;
mod conditions;
mod treatments;
mod users;

/// The category whose id map dependents consume.
pub const IDENTITY_CATEGORY: &str = "users";

/// Natural keys resolved to live database row ids.
pub type IdentityMap = BTreeMap<String, i64>;

/// Outcome of loading one category.
#[derive(Debug, Clone, Default)]
pub struct SeedResult {
    pub category: String,
    pub loaded: u32,
    pub skipped: u32,
    /// Natural key to database id, for categories that expose one.
    pub id_map: BTreeMap<String, i64>,
}

impl SeedResult {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            ..Default::default()
        }
    }

    pub fn total(&self) -> u32 {
        self.loaded + self.skipped
    }
}

impl fmt::Display for SeedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} loaded, {} skipped",
            self.category, self.loaded, self.skipped
        )
    }
}

/// How a seed run selects and guards its categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedMode {
    /// Every category, natural-key guarded.
    All,
    /// Drop and recreate the managed tables, then load everything without
    /// the guards.
    Reset,
    /// Only the named categories (plus `users` when one of them needs the
    /// identity map). Never resets.
    Only(Vec<String>),
}

/// One seed category. Implementations hold their data as constants and do
/// all I/O through the handle they are given.
#[async_trait]
pub trait SeedLoader: Send + Sync {
    /// Category name used in `--only` lists and reports.
    fn category(&self) -> &'static str;

    /// Whether this category resolves user external ids through the
    /// identity map before it can run.
    fn requires_identities(&self) -> bool {
        false
    }

    async fn load(
        &self,
        db: &dyn DbHandle,
        identities: &IdentityMap,
        skip_existing: bool,
    ) -> Result<SeedResult>;
}

fn all_loaders() -> Vec<Box<dyn SeedLoader>> {
    vec![
        Box::new(users::UserLoader),
        Box::new(treatments::TreatmentLoader),
        Box::new(conditions::ConditionLoader),
        Box::new(appointments::AppointmentLoader),
    ]
}

/// Known category names, in load order.
pub fn categories() -> Vec<&'static str> {
    all_loaders().iter().map(|l| l.category()).collect()
}

/// Runs the reconciler. Returns one result per category actually loaded, in
/// load order.
pub async fn run(db: &dyn DbHandle, config: &Config, mode: SeedMode) -> Result<Vec<SeedResult>> {
    let loaders = all_loaders();
    let selected: Vec<&dyn SeedLoader> = match &mode {
        SeedMode::All | SeedMode::Reset => loaders.iter().map(|b| b.as_ref()).collect(),
        SeedMode::Only(requested) => {
            let known: Vec<&str> = loaders.iter().map(|l| l.category()).collect();
            for category in requested {
                if !known.contains(&category.as_str()) {
                    return Err(MigrateError::Usage(format!(
                        "unknown seed category {category}; known categories: {}",
                        known.join(", ")
                    )));
                }
            }
            let wants_identities = loaders
                .iter()
                .any(|l| requested.iter().any(|c| c == l.category()) && l.requires_identities());
            loaders
                .iter()
                .map(|b| b.as_ref())
                .filter(|l| {
                    requested.iter().any(|c| c == l.category())
                        || (l.category() == IDENTITY_CATEGORY && wants_identities)
                })
                .collect()
        }
    };

    match mode {
        SeedMode::Reset => reset_tables(db, &config.database.schema).await?,
        _ => ensure_tables(db, &config.database.schema).await?,
    }

    let skip_existing = !matches!(mode, SeedMode::Reset) && config.seeds.skip_existing;
    let mut identities = IdentityMap::new();
    let mut results = Vec::new();
    for loader in selected {
        info!(category = loader.category(), "loading seed category");
        let result = loader.load(db, &identities, skip_existing).await?;
        if loader.category() == IDENTITY_CATEGORY {
            identities.extend(result.id_map.clone());
        }
        info!(
            category = %result.category,
            loaded = result.loaded,
            skipped = result.skipped,
            "category complete"
        );
        results.push(result);
    }
    Ok(results)
}

/// Shapes of the tables the reconciler owns, in declaration order.
pub fn tables() -> Vec<TableSchema> {
    vec![
        users_table(),
        treatments_table(),
        conditions_table(),
        appointments_table(),
    ]
}

async fn reset_tables(db: &dyn DbHandle, pg_schema: &str) -> Result<()> {
    let managed = tables();
    let dialect = db.dialect();
    for table in ddl::drop_order(&managed) {
        info!(table = %table.name, "dropping managed table");
        db.execute(&ddl::drop_table_sql(&table.name, dialect)?).await?;
    }
    ensure_tables(db, pg_schema).await
}

async fn ensure_tables(db: &dyn DbHandle, pg_schema: &str) -> Result<()> {
    let managed = tables();
    let dialect = db.dialect();
    let mut warnings = Vec::new();
    for table in ddl::create_order(&managed) {
        if read_table(db, pg_schema, &table.name).await?.is_some() {
            continue;
        }
        debug!(table = %table.name, "creating managed table");
        db.execute(&ddl::create_table_sql(table, dialect, &mut warnings)?).await?;
        for index in &table.indexes {
            db.execute(&ddl::create_index_sql(&table.name, index)?).await?;
        }
    }
    for w in &warnings {
        warn!(warning = %w, "type passed through unchanged");
    }
    Ok(())
}

// ==================== Managed table shapes ====================

fn col(name: &str, ty: TypeDescriptor) -> ColumnSpec {
    ColumnSpec {
        name: name.to_string(),
        ty,
        nullable: true,
        default: None,
    }
}

fn required(name: &str, ty: TypeDescriptor) -> ColumnSpec {
    ColumnSpec {
        nullable: false,
        ..col(name, ty)
    }
}

fn serial_pk() -> Option<PrimaryKeySpec> {
    Some(PrimaryKeySpec {
        columns: vec!["id".to_string()],
        auto_increment: true,
    })
}

fn users_table() -> TableSchema {
    TableSchema {
        name: "users".to_string(),
        columns: vec![
            required("id", TypeDescriptor::Integer),
            required("external_id", TypeDescriptor::Varchar(Some(32))),
            required("name", TypeDescriptor::Varchar(Some(120))),
            col("email", TypeDescriptor::Varchar(Some(255))),
            col("phone", TypeDescriptor::Varchar(Some(32))),
            ColumnSpec {
                default: Some("'patient'".to_string()),
                ..required("role", TypeDescriptor::Varchar(Some(16)))
            },
        ],
        primary_key: serial_pk(),
        foreign_keys: Vec::new(),
        indexes: vec![IndexSpec {
            name: "ux_users_external_id".to_string(),
            columns: vec!["external_id".to_string()],
            unique: true,
        }],
    }
}

fn treatments_table() -> TableSchema {
    TableSchema {
        name: "treatments".to_string(),
        columns: vec![
            required("id", TypeDescriptor::Integer),
            required("code", TypeDescriptor::Varchar(Some(16))),
            required("name", TypeDescriptor::Varchar(Some(120))),
            required("category", TypeDescriptor::Varchar(Some(64))),
            col(
                "cost",
                TypeDescriptor::Decimal {
                    precision: 10,
                    scale: 2,
                },
            ),
            ColumnSpec {
                default: Some("'active'".to_string()),
                ..required("status", TypeDescriptor::Varchar(Some(16)))
            },
        ],
        primary_key: serial_pk(),
        foreign_keys: Vec::new(),
        indexes: vec![IndexSpec {
            name: "ux_treatments_code".to_string(),
            columns: vec!["code".to_string()],
            unique: true,
        }],
    }
}

fn conditions_table() -> TableSchema {
    TableSchema {
        name: "conditions".to_string(),
        columns: vec![
            required("id", TypeDescriptor::Integer),
            required("user_id", TypeDescriptor::Integer),
            required("name", TypeDescriptor::Varchar(Some(120))),
            col("icd_code", TypeDescriptor::Varchar(Some(16))),
            ColumnSpec {
                default: Some("'active'".to_string()),
                ..required("status", TypeDescriptor::Varchar(Some(16)))
            },
            ColumnSpec {
                default: Some("'mild'".to_string()),
                ..required("severity", TypeDescriptor::Varchar(Some(16)))
            },
        ],
        primary_key: serial_pk(),
        foreign_keys: vec![ForeignKeySpec {
            columns: vec!["user_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        }],
        indexes: vec![IndexSpec {
            name: "ix_conditions_user_id".to_string(),
            columns: vec!["user_id".to_string()],
            unique: false,
        }],
    }
}

fn appointments_table() -> TableSchema {
    TableSchema {
        name: "appointments".to_string(),
        columns: vec![
            required("id", TypeDescriptor::Integer),
            required("appointment_id", TypeDescriptor::Varchar(Some(16))),
            col("user_id", TypeDescriptor::Integer),
            required("title", TypeDescriptor::Varchar(Some(200))),
            required("date", TypeDescriptor::Date),
            required("time", TypeDescriptor::Time),
            ColumnSpec {
                default: Some("60".to_string()),
                ..required("duration_minutes", TypeDescriptor::Integer)
            },
            ColumnSpec {
                default: Some("'Consultation'".to_string()),
                ..required("treatment_type", TypeDescriptor::Varchar(Some(64)))
            },
            col("provider", TypeDescriptor::Varchar(Some(120))),
            ColumnSpec {
                default: Some("'scheduled'".to_string()),
                ..required("status", TypeDescriptor::Varchar(Some(16)))
            },
        ],
        primary_key: serial_pk(),
        foreign_keys: vec![ForeignKeySpec {
            columns: vec!["user_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        }],
        indexes: vec![IndexSpec {
            name: "ux_appointments_appointment_id".to_string(),
            columns: vec!["appointment_id".to_string()],
            unique: true,
        }],
    }
}

// ==================== Loader helpers ====================

/// Runs a natural-key lookup expected to yield at most one id.
pub(crate) async fn select_id(
    db: &dyn DbHandle,
    sql: &str,
    category: &str,
) -> Result<Option<i64>> {
    let rows = db.query(sql).await?;
    match rows.first() {
        None => Ok(None),
        Some(row) => row
            .first()
            .and_then(|v| v.as_i64())
            .map(Some)
            .ok_or_else(|| {
                MigrateError::seed(category, "natural key lookup returned an unreadable id")
            }),
    }
}

pub(crate) fn text_or_null(value: Option<&str>) -> String {
    value.map_or_else(|| "NULL".to_string(), quote_literal)
}
