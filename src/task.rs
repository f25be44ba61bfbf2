//! The sink task driven by the runtime: `start`, `put`, `stop`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::batch::batches;
use crate::config::SinkSettings;
use crate::db::{ConnectionCache, ConnectionFactory, Connector};
use crate::dlq::DeadLetterReporter;
use crate::retry::{BatchOutcome, RetryBudget, RetryCoordinator};
use crate::writer::BulkWriter;
use crate::{Error, Result, SinkRecord};

/// Callbacks a scheduler drives on one task instance, from a single
/// thread of control.
#[async_trait]
pub trait SinkTask: Send {
    fn version(&self) -> &'static str;

    async fn start(&mut self, settings: &SinkSettings) -> Result<()>;

    /// Writes `records` in order.
    ///
    /// [`Error::Retriable`] asks the scheduler to call `put` again with the
    /// same records after the given backoff; any other error is fatal.
    async fn put(&mut self, records: &[SinkRecord]) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;
}

/// Services a task may pick up from its scheduler.
#[derive(Clone, Default)]
pub struct SinkTaskContext {
    reporter: Option<Arc<dyn DeadLetterReporter>>,
}

impl SinkTaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn DeadLetterReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn dead_letter_reporter(&self) -> Option<Arc<dyn DeadLetterReporter>> {
        self.reporter.clone()
    }
}

pub struct TDengineSinkTask<K: Connector> {
    connector: K,
    context: SinkTaskContext,
    running: Option<Running<K>>,
}

struct Running<K: Connector> {
    coordinator: RetryCoordinator<K>,
    batch_size: usize,
}

impl<K: Connector> TDengineSinkTask<K> {
    pub fn new(connector: K, context: SinkTaskContext) -> Self {
        Self {
            connector,
            context,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Retry budget left, `None` before `start`.
    pub fn retry_budget(&self) -> Option<RetryBudget> {
        self.running.as_ref().map(|r| r.coordinator.budget())
    }
}

#[async_trait]
impl<K: Connector> SinkTask for TDengineSinkTask<K> {
    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    async fn start(&mut self, settings: &SinkSettings) -> Result<()> {
        if self.running.is_some() {
            self.stop().await?;
        }

        let factory = ConnectionFactory::new(
            self.connector.clone(),
            settings.connection_attempts,
            settings.connection_backoff,
        );
        let cache = ConnectionCache::new(factory, settings.database.clone());
        let writer = BulkWriter::new(cache, settings.protocol, settings.precision);

        let reporter = self.context.dead_letter_reporter();
        if reporter.is_none() {
            info!("No dead-letter reporter configured, exhausted retries will stop the task");
        }

        let budget = RetryBudget::from_max_retries(settings.max_retries);
        info!(
            database = %settings.database,
            retry_budget = budget.remaining(),
            batch_size = settings.batch_size,
            protocol = ?settings.protocol,
            "Starting TDengine sink task"
        );

        self.running = Some(Running {
            coordinator: RetryCoordinator::new(writer, budget, settings.retry_backoff, reporter),
            batch_size: settings.batch_size,
        });
        Ok(())
    }

    #[instrument(skip_all, fields(records = records.len()))]
    async fn put(&mut self, records: &[SinkRecord]) -> Result<()> {
        let running = self.running.as_mut().ok_or(Error::NotStarted)?;

        for batch in batches(records, running.batch_size) {
            match running.coordinator.write(batch).await? {
                BatchOutcome::Written => {
                    debug!(topic = batch.topic(), records = batch.len(), "Batch written");
                }
                BatchOutcome::Isolated { dead_letters } => {
                    info!(
                        topic = batch.topic(),
                        records = batch.len(),
                        dead_letters,
                        "Batch written after isolation"
                    );
                }
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(running) = self.running.take() {
            running.coordinator.writer().cache().close().await;
            info!("TDengine sink task stopped");
        }
        Ok(())
    }
}
