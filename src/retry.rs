//! Batch-level retry handling.
//!
//! A failed batch write is handled against a [`RetryBudget`] shared by the
//! whole task lifetime:
//!
//! - budget left: the connection is closed, the budget decremented, and the
//!   caller gets [`Error::Retriable`] asking for redelivery after the
//!   configured backoff;
//! - budget exhausted with a dead-letter reporter: every record of the batch
//!   is written on its own and the ones that still fail are reported;
//! - budget exhausted without a reporter: [`Error::Write`] stops the task.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::batch::Batch;
use crate::db::Connector;
use crate::dlq::DeadLetterReporter;
use crate::writer::BulkWriter;
use crate::{Error, Result};

/// Remaining batch-write retries for the lifetime of a task.
///
/// Never reset between batches; once it reaches zero every later failure
/// goes straight to isolation or fails the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(remaining: u32) -> Self {
        Self { remaining }
    }

    /// Budget for a task configured with `max_retries`, counting the first
    /// attempt as one of them.
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self::new(max_retries.saturating_sub(1))
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spends one retry, returning false if none were left.
    fn try_consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }
}

/// Terminal per-batch result that lets the task move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Written,
    /// The batch was written record by record; `dead_letters` records were
    /// reported instead of written.
    Isolated { dead_letters: usize },
}

pub struct RetryCoordinator<K: Connector> {
    writer: BulkWriter<K>,
    budget: RetryBudget,
    backoff: Duration,
    reporter: Option<Arc<dyn DeadLetterReporter>>,
}

impl<K: Connector> RetryCoordinator<K> {
    pub fn new(
        writer: BulkWriter<K>,
        budget: RetryBudget,
        backoff: Duration,
        reporter: Option<Arc<dyn DeadLetterReporter>>,
    ) -> Self {
        Self {
            writer,
            budget,
            backoff,
            reporter,
        }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn writer(&self) -> &BulkWriter<K> {
        &self.writer
    }

    pub async fn write(&mut self, batch: Batch<'_>) -> Result<BatchOutcome> {
        let source = match self.writer.write(batch.records()).await {
            Ok(()) => return Ok(BatchOutcome::Written),
            Err(Error::Write(source)) => source,
            Err(e) => return Err(e),
        };

        self.writer.cache().close().await;

        if self.budget.try_consume() {
            warn!(
                topic = batch.topic(),
                records = batch.len(),
                retries_left = self.budget.remaining(),
                backoff_ms = self.backoff.as_millis() as u64,
                "Batch write failed, requesting redelivery: {}",
                source
            );
            return Err(Error::Retriable {
                backoff: self.backoff,
                source,
            });
        }

        match self.reporter.clone() {
            Some(reporter) => {
                warn!(
                    topic = batch.topic(),
                    records = batch.len(),
                    "Batch write failed with retries exhausted, isolating records: {}",
                    source
                );
                let dead_letters = self.isolate(batch, reporter.as_ref()).await?;
                Ok(BatchOutcome::Isolated { dead_letters })
            }
            None => {
                error!(
                    topic = batch.topic(),
                    records = batch.len(),
                    causes = ?source.causes(),
                    "Batch write failed with retries exhausted and no dead-letter reporter"
                );
                Err(Error::Write(source))
            }
        }
    }

    /// Writes each record alone, reporting the ones that fail.
    async fn isolate(&self, batch: Batch<'_>, reporter: &dyn DeadLetterReporter) -> Result<usize> {
        let mut dead_letters = 0;

        for record in batch.records() {
            match self.writer.write(std::slice::from_ref(record)).await {
                Ok(()) => {}
                Err(Error::Write(source)) => {
                    reporter.report(record, &source).await?;
                    dead_letters += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            topic = batch.topic(),
            records = batch.len(),
            dead_letters,
            "Isolated batch handled"
        );
        Ok(dead_letters)
    }
}
