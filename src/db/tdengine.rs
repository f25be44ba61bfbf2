//! TDengine backend over the `taos` driver (WebSocket transport).

use ::taos::taos_query::common::{SchemalessPrecision, SchemalessProtocol, SmlDataBuilder};
use ::taos::*;
use async_trait::async_trait;
use tracing::debug;

use super::connection::{Connection, Connector};
use crate::config::{self, TdengineConfig};

const PROBE_SQL: &str = "SELECT SERVER_VERSION()";

/// Driver error, transparent over the `taos` error and its causes.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct TaosError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl TaosError {
    fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(error))
    }
}

#[derive(Clone)]
pub struct TaosConnector {
    dsn: String,
    server_dsn: String,
    database: String,
}

impl TaosConnector {
    pub fn new(config: &TdengineConfig) -> Self {
        Self {
            dsn: config.dsn(),
            server_dsn: config.server_dsn(),
            database: config.database.clone(),
        }
    }

    /// Creates the target database over a server-level session, since a
    /// DSN naming a missing database cannot connect.
    async fn ensure_database(&self) -> std::result::Result<(), TaosError> {
        let server = TaosBuilder::from_dsn(self.server_dsn.as_str())
            .map_err(TaosError::new)?
            .build()
            .await
            .map_err(TaosError::new)?;
        server
            .exec(create_database_sql(&self.database))
            .await
            .map_err(TaosError::new)?;
        Ok(())
    }
}

fn create_database_sql(database: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS `{}`", database)
}

pub struct TaosConnection {
    taos: Taos,
}

#[async_trait]
impl Connector for TaosConnector {
    type Connection = TaosConnection;

    async fn open(&self) -> std::result::Result<TaosConnection, TaosError> {
        self.ensure_database().await?;

        let builder = TaosBuilder::from_dsn(self.dsn.as_str()).map_err(TaosError::new)?;
        let taos = builder.build().await.map_err(TaosError::new)?;
        Ok(TaosConnection { taos })
    }
}

#[async_trait]
impl Connection for TaosConnection {
    type Error = TaosError;

    async fn execute(&self, sql: &str) -> std::result::Result<(), TaosError> {
        let affected = self.taos.exec(sql).await.map_err(TaosError::new)?;
        debug!(affected, "Executed: {}", sql);
        Ok(())
    }

    async fn insert(
        &self,
        lines: Vec<String>,
        protocol: config::SchemalessProtocol,
        precision: config::TimestampPrecision,
    ) -> std::result::Result<(), TaosError> {
        let data = SmlDataBuilder::default()
            .protocol(sml_protocol(protocol))
            .precision(sml_precision(precision))
            .data(lines)
            .build()
            .map_err(TaosError::new)?;

        self.taos.put(&data).await.map_err(TaosError::new)
    }

    async fn ping(&self) -> std::result::Result<(), TaosError> {
        self.taos.exec(PROBE_SQL).await.map_err(TaosError::new)?;
        Ok(())
    }

    fn close(self) {
        drop(self.taos);
    }
}

fn sml_protocol(protocol: config::SchemalessProtocol) -> SchemalessProtocol {
    match protocol {
        config::SchemalessProtocol::Line => SchemalessProtocol::Line,
        config::SchemalessProtocol::Telnet => SchemalessProtocol::Telnet,
        config::SchemalessProtocol::Json => SchemalessProtocol::Json,
    }
}

fn sml_precision(precision: config::TimestampPrecision) -> SchemalessPrecision {
    match precision {
        config::TimestampPrecision::Milliseconds => SchemalessPrecision::Millisecond,
        config::TimestampPrecision::Microseconds => SchemalessPrecision::Microsecond,
        config::TimestampPrecision::Nanoseconds => SchemalessPrecision::Nanosecond,
    }
}
