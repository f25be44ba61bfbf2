//! Bulk schemaless writes through the cached connection.

use tracing::{debug, instrument};

use crate::config::{SchemalessProtocol, TimestampPrecision};
use crate::db::{Connection, ConnectionCache, Connector};
use crate::{DbError, Error, Result, SinkRecord};

/// Writes batches with one schemaless insert per call.
pub struct BulkWriter<K: Connector> {
    cache: ConnectionCache<K>,
    protocol: SchemalessProtocol,
    precision: TimestampPrecision,
}

impl<K: Connector> BulkWriter<K> {
    pub fn new(
        cache: ConnectionCache<K>,
        protocol: SchemalessProtocol,
        precision: TimestampPrecision,
    ) -> Self {
        Self {
            cache,
            protocol,
            precision,
        }
    }

    pub fn cache(&self) -> &ConnectionCache<K> {
        &self.cache
    }

    /// Inserts the payloads of `records` in a single call.
    ///
    /// Tombstones are skipped; a slice without payloads is a no-op.
    /// A failed insert is returned as [`Error::Write`] with the driver's
    /// cause chain; an exhausted connection attempt budget is returned
    /// unchanged as [`Error::Connection`].
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn write(&self, records: &[SinkRecord]) -> Result<()> {
        let lines: Vec<String> = records
            .iter()
            .filter_map(|r| r.payload().map(str::to_string))
            .collect();

        if lines.is_empty() {
            debug!("No payloads to write");
            return Ok(());
        }

        let conn = self.cache.connection().await?;
        let count = lines.len();
        conn.insert(lines, self.protocol, self.precision)
            .await
            .map_err(|e| Error::Write(DbError::from_chain(e)))?;

        debug!(lines = count, "Schemaless insert succeeded");
        Ok(())
    }
}

/// Runs a plain statement, discarding any result it produces.
pub async fn execute<C: Connection>(conn: &C, sql: &str) -> std::result::Result<(), DbError> {
    conn.execute(sql).await.map_err(DbError::from_chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConnectionFactory;
    use crate::testing::{MockConnector, MockState};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn writer(connector: &MockConnector) -> BulkWriter<MockConnector> {
        let factory = ConnectionFactory::new(connector.clone(), 1, Duration::ZERO);
        BulkWriter::new(
            ConnectionCache::new(factory, "power"),
            SchemalessProtocol::Line,
            TimestampPrecision::Milliseconds,
        )
    }

    fn records(lines: &[&str]) -> Vec<SinkRecord> {
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| SinkRecord::new("meters", 0, i as i64, *line))
            .collect()
    }

    #[tokio::test]
    async fn test_one_insert_per_write() {
        let connector = MockConnector::new();
        let writer = writer(&connector);

        writer
            .write(&records(&["m v=1i 1", "m v=2i 2", "m v=3i 3"]))
            .await
            .unwrap();

        assert_eq!(MockState::count(&connector.state.insert_calls), 1);
        assert_eq!(
            connector.state.inserted(),
            vec![vec![
                "m v=1i 1".to_string(),
                "m v=2i 2".to_string(),
                "m v=3i 3".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn test_tombstones_skipped() {
        let connector = MockConnector::new();
        let writer = writer(&connector);

        let mut batch = records(&["m v=1i 1", "m v=2i 2"]);
        batch[0].value = None;
        writer.write(&batch).await.unwrap();
        assert_eq!(connector.state.inserted(), vec![vec!["m v=2i 2".to_string()]]);

        batch[1].value = None;
        writer.write(&batch).await.unwrap();
        assert_eq!(MockState::count(&connector.state.insert_calls), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_cause_chain() {
        let connector = MockConnector::new();
        connector.state.poison("m v=2i 2");
        let writer = writer(&connector);

        let err = match writer.write(&records(&["m v=1i 1", "m v=2i 2"])).await {
            Err(Error::Write(e)) => e,
            other => panic!("unexpected result: {:?}", other),
        };

        assert_eq!(
            err.causes(),
            &["schemaless insert failed", "invalid data: m v=2i 2"]
        );
        assert!(err.to_string().contains("invalid data: m v=2i 2"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_exhausted_connection_attempts_propagate() {
        let connector = MockConnector::new();
        connector.state.failing_opens.store(1, Ordering::SeqCst);
        let writer = writer(&connector);

        let err = writer.write(&records(&["m v=1i 1"])).await.unwrap_err();
        match err {
            Error::Connection { attempts, source } => {
                assert_eq!(attempts, 1);
                assert_eq!(source.causes(), &["connection refused"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(MockState::count(&connector.state.insert_calls), 0);
    }
}
