//! Kafka-driven scheduler for a single sink task.
//!
//! Polls records, hands each poll to [`SinkTask::put`], redelivers the same
//! records after a retriable failure and commits offsets once a poll has
//! been written.

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, KafkaConfig, SinkSettings};
use crate::task::SinkTask;
use crate::{Error, Result, SinkRecord};

/// Pause after a consumer error before asking for the next message.
const CONSUMER_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct SinkRuntime<T: SinkTask> {
    consumer: StreamConsumer,
    task: T,
    settings: SinkSettings,
    kafka: KafkaConfig,
}

impl<T: SinkTask> SinkRuntime<T> {
    pub fn new(config: &Config, task: T) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.kafka.brokers.join(","))
            .set("group.id", &config.kafka.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.kafka.auto_offset_reset)
            .create()
            .map_err(Error::Kafka)?;

        let topics: Vec<&str> = config.kafka.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics).map_err(Error::Kafka)?;
        info!(topics = ?topics, group_id = %config.kafka.group_id, "Subscribed to Kafka topics");

        Ok(Self {
            consumer,
            task,
            settings: SinkSettings::from(config),
            kafka: config.kafka.clone(),
        })
    }

    /// Runs until `shutdown` resolves or the task fails.
    ///
    /// The task is always stopped before returning.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(version = self.task.version(), "Starting sink runtime");
        self.task.start(&self.settings).await?;

        let result = self.consume(shutdown).await;

        if let Err(e) = self.task.stop().await {
            warn!("Failed to stop sink task: {}", e);
        }
        result
    }

    async fn consume<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let records = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                records = self.poll() => records,
            };

            deliver(&mut self.task, &records).await?;
            self.commit(&records)?;
        }
    }

    /// Waits for one message, then keeps collecting until the poll is full
    /// or the poll timeout elapses.
    async fn poll(&self) -> Vec<SinkRecord> {
        let consumer = &self.consumer;
        let first = next_message(move || consumer.recv()).await;
        let mut records = vec![SinkRecord::from_message(&first)];

        let deadline = Instant::now() + self.kafka.poll_timeout();
        while records.len() < self.kafka.max_poll_records {
            match tokio::time::timeout_at(deadline, next_message(move || consumer.recv())).await {
                Ok(message) => records.push(SinkRecord::from_message(&message)),
                Err(_) => break,
            }
        }

        debug!(records = records.len(), "Polled records");
        records
    }

    fn commit(&self, records: &[SinkRecord]) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        for ((topic, partition), offset) in next_offsets(records) {
            tpl.add_partition_offset(&topic, partition, Offset::Offset(offset))
                .map_err(Error::Kafka)?;
        }

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(Error::Kafka)?;
        debug!(partitions = tpl.count(), "Committed offsets");
        Ok(())
    }
}

/// Receives until a message arrives, backing off after each consumer error.
async fn next_message<M, F, Fut>(mut recv: F) -> M
where
    F: FnMut() -> Fut,
    Fut: Future<Output = KafkaResult<M>>,
{
    loop {
        match recv().await {
            Ok(message) => return message,
            Err(e) => {
                warn!("Kafka consumer error: {}", e);
                tokio::time::sleep(CONSUMER_ERROR_BACKOFF).await;
            }
        }
    }
}

/// Puts `records` until the task accepts them, sleeping the requested
/// backoff before each redelivery. Any non-retriable error is returned.
async fn deliver<T: SinkTask>(task: &mut T, records: &[SinkRecord]) -> Result<()> {
    loop {
        match task.put(records).await {
            Ok(()) => return Ok(()),
            Err(Error::Retriable { backoff, source }) => {
                warn!(
                    records = records.len(),
                    backoff_ms = backoff.as_millis() as u64,
                    "Redelivering records after retriable failure: {}",
                    source
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Offset to commit per topic partition: one past the highest seen.
fn next_offsets(records: &[SinkRecord]) -> BTreeMap<(String, i32), i64> {
    let mut offsets = BTreeMap::new();
    for record in records {
        let next = offsets
            .entry((record.topic.clone(), record.partition))
            .or_insert(record.offset + 1);
        *next = (*next).max(record.offset + 1);
    }
    offsets
}
