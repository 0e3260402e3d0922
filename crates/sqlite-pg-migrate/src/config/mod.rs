//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use crate::error::Result;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    #[test]
    fn test_from_yaml_minimal_sqlite() {
        let config = Config::from_yaml("database:\n  engine: sqlite\n").unwrap();
        assert_eq!(config.database.engine, Dialect::Sqlite);
        assert_eq!(config.export.batch_size, 100);
        assert_eq!(config.migrations.lock_timeout_secs, 60);
        assert!(config.seeds.skip_existing);
    }

    #[test]
    fn test_from_yaml_postgres_fields() {
        let yaml = "database:\n\
                    \x20 engine: postgres\n\
                    \x20 host: db.internal\n\
                    \x20 port: 5433\n\
                    \x20 database: clinic\n\
                    \x20 user: clinic\n\
                    \x20 password: hunter2\n\
                    export:\n\
                    \x20 batch_size: 25\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.database.engine, Dialect::Postgres);
        assert_eq!(config.export.batch_size, 25);
        assert_eq!(
            config.database.pg_conn_string(),
            "host=db.internal port=5433 dbname=clinic user=clinic password=hunter2"
        );
    }

    #[test]
    fn test_from_yaml_rejects_unknown_engine() {
        assert!(Config::from_yaml("database:\n  engine: oracle\n").is_err());
    }

    #[test]
    fn test_password_is_not_serialized() {
        let yaml = "database:\n\
                    \x20 engine: postgres\n\
                    \x20 host: h\n\
                    \x20 database: d\n\
                    \x20 user: u\n\
                    \x20 password: topsecret\n";
        let config = Config::from_yaml(yaml).unwrap();
        let out = serde_yaml::to_string(&config).unwrap();
        assert!(!out.contains("topsecret"));
    }
}
