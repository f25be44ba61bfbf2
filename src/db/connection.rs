use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{SchemalessProtocol, TimestampPrecision};
use crate::{DbError, Error, Result};

/// A physical database connection.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs a plain statement, discarding any result set.
    async fn execute(&self, sql: &str) -> std::result::Result<(), Self::Error>;

    /// Bulk schemaless insert of `lines` in one call.
    async fn insert(
        &self,
        lines: Vec<String>,
        protocol: SchemalessProtocol,
        precision: TimestampPrecision,
    ) -> std::result::Result<(), Self::Error>;

    /// Lightweight round trip confirming the connection is usable.
    async fn ping(&self) -> std::result::Result<(), Self::Error>;

    /// Releases the connection.
    fn close(self);
}

/// Opens physical connections to one database endpoint.
#[async_trait]
pub trait Connector: Clone + Send + Sync + 'static {
    type Connection: Connection;

    async fn open(
        &self,
    ) -> std::result::Result<Self::Connection, <Self::Connection as Connection>::Error>;
}

/// Opens a connection with a bounded number of attempts and a fixed backoff
/// between them.
pub struct ConnectionFactory<K> {
    connector: K,
    attempts: u32,
    backoff: Duration,
}

impl<K: Connector> ConnectionFactory<K> {
    pub fn new(connector: K, attempts: u32, backoff: Duration) -> Self {
        Self {
            connector,
            attempts: attempts.max(1),
            backoff,
        }
    }

    pub async fn acquire(&self) -> Result<K::Connection> {
        let mut attempt = 1;
        loop {
            debug!(attempt, max_attempts = self.attempts, "Opening TDengine connection");

            match self.connector.open().await {
                Ok(conn) => {
                    info!(attempt, "Connected to TDengine");
                    return Ok(conn);
                }
                Err(e) if attempt < self.attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.attempts,
                        backoff_ms = self.backoff.as_millis() as u64,
                        "Failed to connect to TDengine: {}",
                        e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Error::Connection {
                        attempts: attempt,
                        source: DbError::from_chain(e),
                    });
                }
            }
        }
    }
}
