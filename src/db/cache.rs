use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionFactory, Connector};
use crate::writer;
use crate::{DbError, Error, Result};

/// Holds at most one live connection, probing it before every reuse.
///
/// A connection that fails its probe is closed and replaced, and the target
/// database is re-initialized on the replacement.
pub struct ConnectionCache<K: Connector> {
    factory: ConnectionFactory<K>,
    database: String,
    slot: Mutex<Option<K::Connection>>,
}

impl<K: Connector> ConnectionCache<K> {
    pub fn new(factory: ConnectionFactory<K>, database: impl Into<String>) -> Self {
        Self {
            factory,
            database: database.into(),
            slot: Mutex::new(None),
        }
    }

    /// Returns a connection that passed its most recent liveness probe, or a
    /// freshly opened and initialized one.
    ///
    /// The returned guard keeps the cache locked until dropped.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, K::Connection>> {
        let mut slot = self.slot.lock().await;

        let healthy = match slot.as_ref() {
            Some(conn) => match conn.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        database = %self.database,
                        "Cached TDengine connection failed liveness probe, reconnecting: {}",
                        DbError::from_chain(e)
                    );
                    false
                }
            },
            None => true,
        };
        if !healthy {
            if let Some(stale) = slot.take() {
                stale.close();
            }
        }

        if slot.is_none() {
            let conn = self.factory.acquire().await?;
            self.init_db(&conn).await;
            *slot = Some(conn);
        }

        MutexGuard::try_map(slot, |slot| slot.as_mut())
            .map_err(|_| Error::Connection {
                attempts: 0,
                source: DbError::message("connection slot empty after acquire"),
            })
    }

    /// Creates the target database if missing and selects it.
    ///
    /// Failures are logged and tolerated; the next write surfaces them.
    async fn init_db(&self, conn: &K::Connection) {
        let statements = [
            format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database),
            format!("USE `{}`", self.database),
        ];

        for sql in &statements {
            if let Err(e) = writer::execute(conn, sql).await {
                warn!(database = %self.database, "Database initialization failed: {}", e);
                return;
            }
        }
        debug!(database = %self.database, "Database initialized");
    }

    /// Closes the cached connection, if any. Safe to call repeatedly.
    pub async fn close(&self) {
        if let Some(conn) = self.slot.lock().await.take() {
            info!(database = %self.database, "Closing TDengine connection");
            conn.close();
        }
    }

    pub async fn is_established(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
