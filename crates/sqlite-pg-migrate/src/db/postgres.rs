//! Networked PostgreSQL connection.

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::error;

use crate::core::SqlValue;
use crate::db::DbHandle;
use crate::dialect::Dialect;
use crate::error::Result;

/// A connected PostgreSQL client.
///
/// The connection task is spawned onto the runtime and lives until the
/// client drops; a connection-level error is logged there rather than
/// surfaced, since the in-flight call fails with its own error anyway.
pub struct PostgresDb {
    client: Client,
}

impl PostgresDb {
    /// Connect with a `key=value` connection string.
    pub async fn connect(conn_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conn_string, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection closed with error");
            }
        });
        Ok(Self { client })
    }
}

#[async_trait]
impl DbHandle for PostgresDb {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let affected = self.client.execute(sql, &[]).await?;
        Ok(affected)
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        // Simple protocol: the whole script is one implicit transaction
        // unless it carries its own BEGIN/COMMIT.
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        // The simple protocol returns every column as text; catalog queries
        // cast to ::text explicitly and SqlValue's accessors parse from
        // there.
        let messages = self.client.simple_query(sql).await?;
        let mut out = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                let mut cells = Vec::with_capacity(row.len());
                for i in 0..row.len() {
                    cells.push(match row.get(i) {
                        Some(text) => SqlValue::Text(text.to_string()),
                        None => SqlValue::Null,
                    });
                }
                out.push(cells);
            }
        }
        Ok(out)
    }
}
