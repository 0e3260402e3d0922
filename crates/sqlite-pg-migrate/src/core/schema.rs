//! Dialect-neutral schema descriptors.
//!
//! These types describe tables, columns, keys and indexes without committing
//! to either engine's SQL rendering. The introspector produces them from a
//! live catalog, the DDL synthesizer and evolution engine consume them, and
//! migration step files serialize them as YAML.

use serde::{Deserialize, Serialize};

/// Dialect-neutral column type descriptor.
///
/// Parameterized kinds carry their parameters (length, precision/scale).
/// Unrecognized declared types are preserved verbatim in [`Unknown`] so the
/// type mapper can pass them through with a warning instead of failing the
/// run.
///
/// The descriptor round-trips through a SQL-ish string form (`VARCHAR(120)`,
/// `DECIMAL(10,2)`) which is also its serde representation; the same parser
/// handles declared types read from the SQLite catalog.
///
/// [`Unknown`]: TypeDescriptor::Unknown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Integer,
    SmallInt,
    BigInt,
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Char(u32),
    Varchar(Option<u32>),
    Text,
    Blob,
    Boolean,
    Date,
    Time,
    DateTime,
    Json,
    Unknown(String),
}

impl TypeDescriptor {
    /// Parse a declared type string into a descriptor.
    ///
    /// Case-insensitive; length/precision parameters are read from a
    /// parenthesized suffix. Anything unrecognized becomes
    /// [`TypeDescriptor::Unknown`] carrying the raw string.
    pub fn parse(declared: &str) -> Self {
        let raw = declared.trim();
        let (base, params) = match raw.find('(') {
            Some(open) => {
                let params: Vec<u32> = raw[open + 1..]
                    .trim_end_matches(')')
                    .split(',')
                    .filter_map(|p| p.trim().parse().ok())
                    .collect();
                (raw[..open].trim().to_lowercase(), params)
            }
            None => (raw.to_lowercase(), Vec::new()),
        };

        match base.as_str() {
            "int" | "integer" | "mediumint" => TypeDescriptor::Integer,
            "smallint" | "tinyint" => TypeDescriptor::SmallInt,
            "bigint" | "unsigned big int" => TypeDescriptor::BigInt,
            "real" | "float" => TypeDescriptor::Float,
            "double" | "double precision" => TypeDescriptor::Double,
            "decimal" | "numeric" => TypeDescriptor::Decimal {
                precision: params.first().copied().unwrap_or(10),
                scale: params.get(1).copied().unwrap_or(0),
            },
            "char" | "character" | "nchar" => {
                TypeDescriptor::Char(params.first().copied().unwrap_or(1))
            }
            "varchar" | "nvarchar" | "character varying" => {
                TypeDescriptor::Varchar(params.first().copied())
            }
            "text" | "clob" | "string" => TypeDescriptor::Text,
            "blob" | "binary" | "varbinary" | "bytea" => TypeDescriptor::Blob,
            "boolean" | "bool" => TypeDescriptor::Boolean,
            "date" => TypeDescriptor::Date,
            "time" | "time without time zone" | "time with time zone" => TypeDescriptor::Time,
            "datetime"
            | "timestamp"
            | "timestamp without time zone"
            | "timestamp with time zone" => TypeDescriptor::DateTime,
            "json" | "jsonb" => TypeDescriptor::Json,
            // SQLite permits typeless columns; text is the safest reading
            "" => TypeDescriptor::Text,
            _ => TypeDescriptor::Unknown(raw.to_string()),
        }
    }

    /// True for the integer family eligible for auto-increment primary keys.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Integer | TypeDescriptor::SmallInt | TypeDescriptor::BigInt
        )
    }
}

impl std::fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeDescriptor::Integer => write!(f, "INTEGER"),
            TypeDescriptor::SmallInt => write!(f, "SMALLINT"),
            TypeDescriptor::BigInt => write!(f, "BIGINT"),
            TypeDescriptor::Float => write!(f, "FLOAT"),
            TypeDescriptor::Double => write!(f, "DOUBLE PRECISION"),
            TypeDescriptor::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            TypeDescriptor::Char(n) => write!(f, "CHAR({})", n),
            TypeDescriptor::Varchar(Some(n)) => write!(f, "VARCHAR({})", n),
            TypeDescriptor::Varchar(None) => write!(f, "VARCHAR"),
            TypeDescriptor::Text => write!(f, "TEXT"),
            TypeDescriptor::Blob => write!(f, "BLOB"),
            TypeDescriptor::Boolean => write!(f, "BOOLEAN"),
            TypeDescriptor::Date => write!(f, "DATE"),
            TypeDescriptor::Time => write!(f, "TIME"),
            TypeDescriptor::DateTime => write!(f, "DATETIME"),
            TypeDescriptor::Json => write!(f, "JSON"),
            TypeDescriptor::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

impl std::str::FromStr for TypeDescriptor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(TypeDescriptor::parse(s))
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeDescriptor {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TypeDescriptor::parse(&raw))
    }
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,

    /// Dialect-neutral type.
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,

    /// Whether NULL is permitted.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Default expression as declared (literal or function call), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Primary key declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeySpec {
    /// Key columns, in key order.
    pub columns: Vec<String>,

    /// Whether the key is engine-generated (single integer column only).
    #[serde(default)]
    pub auto_increment: bool,
}

/// Foreign key declaration.
///
/// Carries no name: constraint names are always computed by
/// [`constraint_name`](ForeignKeySpec::constraint_name) so both dialects can
/// identify and drop/recreate the same logical constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Local columns, in declaration order.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub referenced_table: String,

    /// Referenced columns, matching `columns` positionally.
    pub referenced_columns: Vec<String>,
}

impl ForeignKeySpec {
    /// Deterministic constraint name: `fk_<table>_<first column>_<referenced table>`.
    ///
    /// Used for every constraint drop/create pair on both dialects, replacing
    /// each engine's auto-generated naming.
    pub fn constraint_name(&self, table: &str) -> String {
        let first = self.columns.first().map(String::as_str).unwrap_or("");
        format!("fk_{}_{}_{}", table, first, self.referenced_table)
    }
}

/// Index declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    pub name: String,

    /// Indexed columns, in index order.
    pub columns: Vec<String>,

    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
}

/// A table: ordered columns plus key and index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Columns in catalog declaration order.
    pub columns: Vec<ColumnSpec>,

    /// Primary key, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeySpec>,

    /// Foreign keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeySpec>,

    /// Secondary indexes (excludes the engine's implicit PK index).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexSpec>,
}

impl TableSchema {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The auto-generated single-column integer primary key, if this table
    /// has one. Returns the key column name.
    pub fn auto_increment_pk(&self) -> Option<&str> {
        let pk = self.primary_key.as_ref()?;
        if pk.auto_increment && pk.columns.len() == 1 {
            Some(pk.columns[0].as_str())
        } else {
            None
        }
    }

    /// Check structural invariants: unique column names, and key, foreign
    /// key and index columns that actually exist.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(format!("table {}: duplicate column {}", self.name, col.name));
            }
        }
        if let Some(pk) = &self.primary_key {
            for col in &pk.columns {
                if self.column(col).is_none() {
                    return Err(format!(
                        "table {}: primary key column {} missing",
                        self.name, col
                    ));
                }
            }
        }
        for fk in &self.foreign_keys {
            if fk.columns.len() != fk.referenced_columns.len() {
                return Err(format!(
                    "table {}: foreign key to {} has mismatched column counts",
                    self.name, fk.referenced_table
                ));
            }
            for col in &fk.columns {
                if self.column(col).is_none() {
                    return Err(format!(
                        "table {}: foreign key column {} missing",
                        self.name, col
                    ));
                }
            }
        }
        for idx in &self.indexes {
            for col in &idx.columns {
                if self.column(col).is_none() {
                    return Err(format!(
                        "table {}: index {} references missing column {}",
                        self.name, idx.name, col
                    ));
                }
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_parse_parameterized_types() {
        assert_eq!(
            TypeDescriptor::parse("VARCHAR(120)"),
            TypeDescriptor::Varchar(Some(120))
        );
        assert_eq!(
            TypeDescriptor::parse("decimal(10, 2)"),
            TypeDescriptor::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(TypeDescriptor::parse("CHAR(2)"), TypeDescriptor::Char(2));
        assert_eq!(
            TypeDescriptor::parse("VARCHAR"),
            TypeDescriptor::Varchar(None)
        );
    }

    #[test]
    fn test_parse_plain_types() {
        assert_eq!(TypeDescriptor::parse("INTEGER"), TypeDescriptor::Integer);
        assert_eq!(TypeDescriptor::parse("integer"), TypeDescriptor::Integer);
        assert_eq!(TypeDescriptor::parse("BOOLEAN"), TypeDescriptor::Boolean);
        assert_eq!(TypeDescriptor::parse("DATETIME"), TypeDescriptor::DateTime);
        assert_eq!(TypeDescriptor::parse("TIMESTAMP"), TypeDescriptor::DateTime);
        assert_eq!(TypeDescriptor::parse("JSON"), TypeDescriptor::Json);
        assert_eq!(TypeDescriptor::parse("BLOB"), TypeDescriptor::Blob);
        assert_eq!(
            TypeDescriptor::parse("double precision"),
            TypeDescriptor::Double
        );
        assert_eq!(
            TypeDescriptor::parse("timestamp without time zone"),
            TypeDescriptor::DateTime
        );
    }

    #[test]
    fn test_parse_unknown_preserves_raw() {
        let ty = TypeDescriptor::parse("GEOMETRY(Point)");
        assert_eq!(ty, TypeDescriptor::Unknown("GEOMETRY(Point)".to_string()));
        assert_eq!(ty.to_string(), "GEOMETRY(Point)");
    }

    #[test]
    fn test_display_round_trip() {
        let types = vec![
            TypeDescriptor::Integer,
            TypeDescriptor::Varchar(Some(80)),
            TypeDescriptor::Decimal {
                precision: 12,
                scale: 4,
            },
            TypeDescriptor::Boolean,
            TypeDescriptor::DateTime,
            TypeDescriptor::Json,
        ];
        for ty in types {
            assert_eq!(TypeDescriptor::parse(&ty.to_string()), ty);
        }
    }

    #[test]
    fn test_foreign_key_constraint_name_is_deterministic() {
        let fk = ForeignKeySpec {
            columns: vec!["user_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        };
        assert_eq!(
            fk.constraint_name("appointments"),
            "fk_appointments_user_id_users"
        );
        // Same inputs, same name, every time
        assert_eq!(
            fk.constraint_name("appointments"),
            "fk_appointments_user_id_users"
        );
    }

    #[test]
    fn test_auto_increment_pk_detection() {
        let table = make_test_table("users");
        assert_eq!(table.auto_increment_pk(), Some("id"));

        let mut composite = make_test_table("memberships");
        composite.primary_key = Some(PrimaryKeySpec {
            columns: vec!["user_id".to_string(), "group_id".to_string()],
            auto_increment: false,
        });
        assert_eq!(composite.auto_increment_pk(), None);
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let mut table = make_test_table("users");
        table
            .columns
            .push(make_test_column("name", TypeDescriptor::Text));
        let err = table.validate().unwrap_err();
        assert!(err.contains("duplicate column"));
    }

    #[test]
    fn test_validate_rejects_dangling_fk_column() {
        let mut table = make_test_table("orders");
        table.foreign_keys.push(ForeignKeySpec {
            columns: vec!["customer_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        });
        let err = table.validate().unwrap_err();
        assert!(err.contains("customer_id"));
    }

    #[test]
    fn test_table_schema_yaml_round_trip() {
        let mut table = make_test_table("appointments");
        table.foreign_keys.push(ForeignKeySpec {
            columns: vec!["id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        });
        let yaml = serde_yaml::to_string(&table).unwrap();
        assert!(yaml.contains("type: VARCHAR(120)"));
        let back: TableSchema = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, table);
    }
}
