//! DDL synthesis.
//!
//! Renders dialect-neutral [`TableSchema`] descriptors as executable DDL:
//! CREATE TABLE with the serial-PK rule and inline named foreign keys,
//! CREATE INDEX, DROP TABLE, and whole-schema scripts in dependency order.
//! Statements come back without trailing semicolons; script assembly adds
//! them.
//!
//! The same renderer serves the exporter (PostgreSQL scripts), the evolution
//! engine (both dialects) and the seed reconciler's reset path.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Local;
use tracing::warn;

use crate::core::{quote_ident, ColumnSpec, ForeignKeySpec, IndexSpec, TableSchema, TypeDescriptor};
use crate::dialect::{map_type, Dialect, TranslationWarning};
use crate::error::Result;

/// A portability problem found while scanning generated DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Table the offending statement belongs to.
    pub table: String,
    /// The token that should not appear for the target dialect.
    pub token: String,
    /// Human-oriented explanation.
    pub detail: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({})", self.table, self.token, self.detail)
    }
}

/// Render one CREATE TABLE statement.
///
/// Unknown column types pass through verbatim and are recorded in
/// `warnings`.
pub fn create_table_sql(
    table: &TableSchema,
    dialect: Dialect,
    warnings: &mut Vec<TranslationWarning>,
) -> Result<String> {
    let auto_pk = table.auto_increment_pk();
    let mut lines = Vec::new();

    for col in &table.columns {
        if auto_pk == Some(col.name.as_str()) {
            let decl = match dialect {
                Dialect::Postgres => "SERIAL PRIMARY KEY",
                Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            };
            lines.push(format!("{} {}", quote_ident(&col.name)?, decl));
            continue;
        }
        lines.push(column_def(table, col, dialect, warnings)?);
    }

    // A single-column non-serial key renders inline on its column; only a
    // composite key earns the trailing clause.
    if let Some(pk) = &table.primary_key {
        if pk.columns.len() > 1 {
            let cols = pk
                .columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Result<Vec<_>>>()?;
            lines.push(format!("PRIMARY KEY ({})", cols.join(", ")));
        }
    }

    for fk in &table.foreign_keys {
        let local = fk
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?;
        let referenced = fk
            .referenced_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?;
        lines.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&fk.constraint_name(&table.name))?,
            local.join(", "),
            quote_ident(&fk.referenced_table)?,
            referenced.join(", ")
        ));
    }

    Ok(format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_ident(&table.name)?,
        lines.join(",\n    ")
    ))
}

fn column_def(
    table: &TableSchema,
    col: &ColumnSpec,
    dialect: Dialect,
    warnings: &mut Vec<TranslationWarning>,
) -> Result<String> {
    if let TypeDescriptor::Unknown(raw) = &col.ty {
        warnings.push(TranslationWarning {
            table: table.name.clone(),
            column: col.name.clone(),
            raw: raw.clone(),
        });
    }

    let mut def = format!("{} {}", quote_ident(&col.name)?, map_type(&col.ty, dialect));

    let single_pk_col = table
        .primary_key
        .as_ref()
        .filter(|pk| pk.columns.len() == 1)
        .map(|pk| pk.columns[0].as_str());
    if single_pk_col == Some(col.name.as_str()) {
        def.push_str(" PRIMARY KEY");
        return Ok(def);
    }

    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        def.push_str(" DEFAULT ");
        def.push_str(&render_default(col, default, dialect));
    }
    Ok(def)
}

/// Integer-literal defaults on boolean columns come from SQLite's 0/1
/// storage and must become real booleans on PostgreSQL.
fn render_default(col: &ColumnSpec, default: &str, dialect: Dialect) -> String {
    if dialect == Dialect::Postgres && col.ty == TypeDescriptor::Boolean {
        match default.trim() {
            "0" | "'0'" => return "FALSE".to_string(),
            "1" | "'1'" => return "TRUE".to_string(),
            _ => {}
        }
    }
    default.to_string()
}

/// Render one CREATE INDEX statement. Identical on both dialects.
pub fn create_index_sql(table: &str, index: &IndexSpec) -> Result<String> {
    let cols = index
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    let unique = if index.unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_ident(&index.name)?,
        quote_ident(table)?,
        cols.join(", ")
    ))
}

/// Render one DROP TABLE statement. CASCADE is PostgreSQL-only syntax.
pub fn drop_table_sql(table: &str, dialect: Dialect) -> Result<String> {
    let quoted = quote_ident(table)?;
    Ok(match dialect {
        Dialect::Postgres => format!("DROP TABLE IF EXISTS {} CASCADE", quoted),
        Dialect::Sqlite => format!("DROP TABLE IF EXISTS {}", quoted),
    })
}

/// Render ALTER TABLE ... ADD COLUMN. Works on both dialects; the column may
/// not carry a key, since key-shape changes go through a rebuild instead.
pub fn add_column_sql(
    table: &str,
    col: &ColumnSpec,
    dialect: Dialect,
    warnings: &mut Vec<TranslationWarning>,
) -> Result<String> {
    if let TypeDescriptor::Unknown(raw) = &col.ty {
        warnings.push(TranslationWarning {
            table: table.to_string(),
            column: col.name.clone(),
            raw: raw.clone(),
        });
    }
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table)?,
        quote_ident(&col.name)?,
        map_type(&col.ty, dialect)
    );
    if !col.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&render_default(col, default, dialect));
    }
    Ok(sql)
}

/// Render ALTER TABLE ... DROP COLUMN. PostgreSQL only; SQLite drops columns
/// through a rebuild.
pub fn drop_column_sql(table: &str, column: &str) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(table)?,
        quote_ident(column)?
    ))
}

/// Render ALTER TABLE ... ADD CONSTRAINT with the deterministic foreign key
/// name, so both dialects agree on what a later drop refers to.
pub fn add_foreign_key_sql(table: &str, fk: &ForeignKeySpec) -> Result<String> {
    let local = fk
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    let referenced = fk
        .referenced_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(table)?,
        quote_ident(&fk.constraint_name(table))?,
        local.join(", "),
        quote_ident(&fk.referenced_table)?,
        referenced.join(", ")
    ))
}

/// Render ALTER TABLE ... DROP CONSTRAINT by the deterministic name.
pub fn drop_foreign_key_sql(table: &str, fk: &ForeignKeySpec) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} DROP CONSTRAINT {}",
        quote_ident(table)?,
        quote_ident(&fk.constraint_name(table))?
    ))
}

/// Render DROP INDEX. Index names are schema-global on both dialects.
pub fn drop_index_sql(name: &str) -> Result<String> {
    Ok(format!("DROP INDEX {}", quote_ident(name)?))
}

/// Order tables so every referenced table precedes its referencing tables.
///
/// Deterministic: ties break by name. Self-references and references to
/// tables outside the set are ignored; if a reference cycle remains, the
/// leftover tables are appended in name order with a warning.
pub fn create_order(tables: &[TableSchema]) -> Vec<&TableSchema> {
    let by_name: BTreeMap<&str, &TableSchema> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut edges: BTreeSet<(&str, &str)> = BTreeSet::new();
    for table in tables {
        for fk in &table.foreign_keys {
            let parent = fk.referenced_table.as_str();
            if parent != table.name && by_name.contains_key(parent) {
                edges.insert((parent, table.name.as_str()));
            }
        }
    }

    let mut indegree: BTreeMap<&str, usize> = by_name.keys().map(|&n| (n, 0)).collect();
    for &(_, child) in &edges {
        *indegree.entry(child).or_insert(0) += 1;
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&n, _)| n)
        .collect();
    let mut order = Vec::with_capacity(tables.len());
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    while let Some(&name) = ready.iter().next() {
        ready.remove(name);
        placed.insert(name);
        order.push(by_name[name]);
        for &(parent, child) in &edges {
            if parent == name {
                let d = indegree.get_mut(child).map(|d| {
                    *d -= 1;
                    *d
                });
                if d == Some(0) {
                    ready.insert(child);
                }
            }
        }
    }

    if order.len() < tables.len() {
        let leftover: Vec<&str> = by_name
            .keys()
            .filter(|n| !placed.contains(*n))
            .copied()
            .collect();
        warn!(tables = ?leftover, "reference cycle detected; appending in name order");
        for name in leftover {
            order.push(by_name[name]);
        }
    }

    order
}

/// Order tables so every referencing table precedes its referenced tables.
pub fn drop_order(tables: &[TableSchema]) -> Vec<&TableSchema> {
    let mut order = create_order(tables);
    order.reverse();
    order
}

/// Assemble the whole-schema script: optional DROPs, CREATE TABLEs in
/// dependency order, then each table's secondary indexes.
pub fn schema_script(
    tables: &[TableSchema],
    dialect: Dialect,
    source_label: &str,
    include_drops: bool,
    warnings: &mut Vec<TranslationWarning>,
) -> Result<String> {
    let mut script = String::new();
    script.push_str(&format!(
        "-- Schema export generated by sqlite-pg-migrate\n\
         -- Source: {}\n\
         -- Generated: {}\n\n",
        source_label,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    if include_drops {
        for table in drop_order(tables) {
            script.push_str(&drop_table_sql(&table.name, dialect)?);
            script.push_str(";\n");
        }
        script.push('\n');
    }

    for table in create_order(tables) {
        script.push_str(&create_table_sql(table, dialect, warnings)?);
        script.push_str(";\n\n");
        for index in &table.indexes {
            script.push_str(&create_index_sql(&table.name, index)?);
            script.push_str(";\n");
        }
        if !table.indexes.is_empty() {
            script.push('\n');
        }
    }

    Ok(script)
}

/// Scan generated DDL for tokens the PostgreSQL target cannot accept.
///
/// One issue per offending line, first matching check wins, so a
/// `INTEGER PRIMARY KEY AUTOINCREMENT` line reports once.
pub fn scan_ddl(ddl: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut current_table = String::from("(unknown)");

    for line in ddl.lines() {
        let upper = line.to_uppercase();
        let trimmed = upper.trim_start();
        if trimmed.starts_with("--") {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("CREATE TABLE ") {
            current_table = rest
                .trim_start()
                .trim_start_matches('"')
                .chars()
                .take_while(|c| *c != '"' && *c != ' ' && *c != '(')
                .collect::<String>()
                .to_lowercase();
        }

        if upper.contains("AUTOINCREMENT") {
            issues.push(ValidationIssue {
                table: current_table.clone(),
                token: "AUTOINCREMENT".to_string(),
                detail: "SQLite keyword; PostgreSQL uses SERIAL".to_string(),
            });
        } else if upper.contains("DATETIME") {
            issues.push(ValidationIssue {
                table: current_table.clone(),
                token: "DATETIME".to_string(),
                detail: "SQLite type; PostgreSQL uses TIMESTAMP".to_string(),
            });
        } else if upper.contains("INTEGER")
            && upper.contains("PRIMARY KEY")
            && !upper.contains("SERIAL")
        {
            issues.push(ValidationIssue {
                table: current_table.clone(),
                token: "INTEGER PRIMARY KEY".to_string(),
                detail: "serial keys must render as SERIAL PRIMARY KEY".to_string(),
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::test_support::{make_test_column, make_test_table};
    use crate::core::{ForeignKeySpec, PrimaryKeySpec};

    fn users_and_orders() -> Vec<TableSchema> {
        let users = make_test_table("users");
        let mut orders = make_test_table("orders");
        orders.columns.push(make_test_column(
            "user_id",
            TypeDescriptor::Integer,
        ));
        orders.foreign_keys.push(ForeignKeySpec {
            columns: vec!["user_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        });
        vec![orders, users]
    }

    // ==================== CREATE TABLE ====================

    #[test]
    fn test_serial_pk_renders_per_dialect() {
        let table = make_test_table("users");
        let mut warnings = Vec::new();

        let pg = create_table_sql(&table, Dialect::Postgres, &mut warnings).unwrap();
        assert!(pg.contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(!pg.contains("AUTOINCREMENT"));

        let lite = create_table_sql(&table, Dialect::Sqlite, &mut warnings).unwrap();
        assert!(lite.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_composite_pk_gets_trailing_clause() {
        let mut table = make_test_table("memberships");
        table.columns = vec![
            make_test_column("user_id", TypeDescriptor::Integer),
            make_test_column("group_id", TypeDescriptor::Integer),
        ];
        table.primary_key = Some(PrimaryKeySpec {
            columns: vec!["user_id".to_string(), "group_id".to_string()],
            auto_increment: false,
        });
        let sql = create_table_sql(&table, Dialect::Postgres, &mut Vec::new()).unwrap();
        assert!(sql.contains("PRIMARY KEY (\"user_id\", \"group_id\")"));
        // No inline PRIMARY KEY on the individual columns
        assert!(!sql.contains("\"user_id\" INTEGER PRIMARY KEY"));
    }

    #[test]
    fn test_single_text_pk_renders_inline() {
        let mut table = make_test_table("treatments");
        table.columns = vec![
            make_test_column("code", TypeDescriptor::Varchar(Some(32))),
            make_test_column("label", TypeDescriptor::Text),
        ];
        table.primary_key = Some(PrimaryKeySpec {
            columns: vec!["code".to_string()],
            auto_increment: false,
        });
        let sql = create_table_sql(&table, Dialect::Postgres, &mut Vec::new()).unwrap();
        assert!(sql.contains("\"code\" VARCHAR(32) PRIMARY KEY"));
        assert!(!sql.contains("PRIMARY KEY ("));
    }

    #[test]
    fn test_foreign_key_renders_inline_with_deterministic_name() {
        let tables = users_and_orders();
        let orders = tables.iter().find(|t| t.name == "orders").unwrap();
        let sql = create_table_sql(orders, Dialect::Postgres, &mut Vec::new()).unwrap();
        assert!(sql.contains(
            "CONSTRAINT \"fk_orders_user_id_users\" FOREIGN KEY (\"user_id\") \
             REFERENCES \"users\" (\"id\")"
        ));
    }

    #[test]
    fn test_boolean_integer_default_rewritten_for_postgres() {
        let mut table = make_test_table("users");
        table.columns.push(ColumnSpec {
            name: "active".to_string(),
            ty: TypeDescriptor::Boolean,
            nullable: false,
            default: Some("1".to_string()),
        });
        let pg = create_table_sql(&table, Dialect::Postgres, &mut Vec::new()).unwrap();
        assert!(pg.contains("\"active\" BOOLEAN NOT NULL DEFAULT TRUE"));

        let lite = create_table_sql(&table, Dialect::Sqlite, &mut Vec::new()).unwrap();
        assert!(lite.contains("\"active\" BOOLEAN NOT NULL DEFAULT 1"));
    }

    #[test]
    fn test_unknown_type_passes_through_with_warning() {
        let mut table = make_test_table("sensors");
        table.columns.push(ColumnSpec {
            name: "location".to_string(),
            ty: TypeDescriptor::Unknown("GEOMETRY".to_string()),
            nullable: true,
            default: None,
        });
        let mut warnings = Vec::new();
        let sql = create_table_sql(&table, Dialect::Postgres, &mut warnings).unwrap();
        assert!(sql.contains("\"location\" GEOMETRY"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].column, "location");
    }

    // ==================== Ordering ====================

    #[test]
    fn test_create_order_puts_referenced_tables_first() {
        let tables = users_and_orders();
        let order: Vec<&str> = create_order(&tables).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["users", "orders"]);
    }

    #[test]
    fn test_drop_order_puts_referencing_tables_first() {
        let tables = users_and_orders();
        let order: Vec<&str> = drop_order(&tables).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["orders", "users"]);
    }

    #[test]
    fn test_order_is_deterministic_for_independent_tables() {
        let tables = vec![
            make_test_table("zebras"),
            make_test_table("apples"),
            make_test_table("mangoes"),
        ];
        let order: Vec<&str> = create_order(&tables).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["apples", "mangoes", "zebras"]);
    }

    #[test]
    fn test_self_reference_does_not_cycle() {
        let mut table = make_test_table("staff");
        table
            .columns
            .push(make_test_column("manager_id", TypeDescriptor::Integer));
        table.foreign_keys.push(ForeignKeySpec {
            columns: vec!["manager_id".to_string()],
            referenced_table: "staff".to_string(),
            referenced_columns: vec!["id".to_string()],
        });
        let tables = vec![table];
        assert_eq!(create_order(&tables).len(), 1);
    }

    // ==================== ALTER statements ====================

    #[test]
    fn test_add_column_renders_nullability_and_default() {
        let mut col = make_test_column("active", TypeDescriptor::Boolean);
        col.nullable = false;
        col.default = Some("1".to_string());
        assert_eq!(
            add_column_sql("users", &col, Dialect::Postgres, &mut Vec::new()).unwrap(),
            "ALTER TABLE \"users\" ADD COLUMN \"active\" BOOLEAN NOT NULL DEFAULT TRUE"
        );
        assert_eq!(
            add_column_sql("users", &col, Dialect::Sqlite, &mut Vec::new()).unwrap(),
            "ALTER TABLE \"users\" ADD COLUMN \"active\" BOOLEAN NOT NULL DEFAULT 1"
        );
    }

    #[test]
    fn test_foreign_key_alter_pair_uses_same_name() {
        let fk = ForeignKeySpec {
            columns: vec!["user_id".to_string()],
            referenced_table: "users".to_string(),
            referenced_columns: vec!["id".to_string()],
        };
        assert_eq!(
            add_foreign_key_sql("orders", &fk).unwrap(),
            "ALTER TABLE \"orders\" ADD CONSTRAINT \"fk_orders_user_id_users\" \
             FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\")"
        );
        assert_eq!(
            drop_foreign_key_sql("orders", &fk).unwrap(),
            "ALTER TABLE \"orders\" DROP CONSTRAINT \"fk_orders_user_id_users\""
        );
    }

    #[test]
    fn test_drop_column_and_index() {
        assert_eq!(
            drop_column_sql("users", "legacy_flag").unwrap(),
            "ALTER TABLE \"users\" DROP COLUMN \"legacy_flag\""
        );
        assert_eq!(
            drop_index_sql("ix_users_name").unwrap(),
            "DROP INDEX \"ix_users_name\""
        );
    }

    // ==================== DROP / script ====================

    #[test]
    fn test_drop_table_cascade_is_postgres_only() {
        assert_eq!(
            drop_table_sql("users", Dialect::Postgres).unwrap(),
            "DROP TABLE IF EXISTS \"users\" CASCADE"
        );
        assert_eq!(
            drop_table_sql("users", Dialect::Sqlite).unwrap(),
            "DROP TABLE IF EXISTS \"users\""
        );
    }

    #[test]
    fn test_schema_script_orders_statements() {
        let tables = users_and_orders();
        let script =
            schema_script(&tables, Dialect::Postgres, "clinic.db", true, &mut Vec::new()).unwrap();

        let drop_orders = script.find("DROP TABLE IF EXISTS \"orders\"").unwrap();
        let drop_users = script.find("DROP TABLE IF EXISTS \"users\"").unwrap();
        let create_users = script.find("CREATE TABLE \"users\"").unwrap();
        let create_orders = script.find("CREATE TABLE \"orders\"").unwrap();

        assert!(drop_orders < drop_users);
        assert!(drop_users < create_users);
        assert!(create_users < create_orders);
    }

    #[test]
    fn test_schema_script_emits_indexes_after_table() {
        let mut users = make_test_table("users");
        users.indexes.push(IndexSpec {
            name: "ix_users_name".to_string(),
            columns: vec!["name".to_string()],
            unique: false,
        });
        let script =
            schema_script(&[users], Dialect::Postgres, "clinic.db", false, &mut Vec::new())
                .unwrap();
        let create = script.find("CREATE TABLE \"users\"").unwrap();
        let index = script.find("CREATE INDEX \"ix_users_name\"").unwrap();
        assert!(create < index);
    }

    // ==================== Validation scan ====================

    #[test]
    fn test_scan_flags_autoincrement_exactly_once() {
        let ddl = "CREATE TABLE \"users\" (\n    \
                   \"id\" INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                   \"name\" TEXT\n)";
        let issues = scan_ddl(ddl);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].table, "users");
        assert_eq!(issues[0].token, "AUTOINCREMENT");
    }

    #[test]
    fn test_scan_flags_datetime_and_integer_pk() {
        let ddl = "CREATE TABLE \"appointments\" (\n    \
                   \"id\" INTEGER PRIMARY KEY,\n    \
                   \"scheduled_at\" DATETIME\n)";
        let issues = scan_ddl(ddl);
        let tokens: Vec<&str> = issues.iter().map(|i| i.token.as_str()).collect();
        assert!(tokens.contains(&"INTEGER PRIMARY KEY"));
        assert!(tokens.contains(&"DATETIME"));
    }

    #[test]
    fn test_scan_passes_clean_postgres_ddl() {
        let table = make_test_table("users");
        let script =
            schema_script(&[table], Dialect::Postgres, "clinic.db", true, &mut Vec::new())
                .unwrap();
        assert!(scan_ddl(&script).is_empty());
    }
}
