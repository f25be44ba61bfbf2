//! Dead-letter reporting for records that cannot be written on their own.

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::warn;

use crate::{DbError, Error, Result, SinkRecord};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Receives records that still fail after being written in isolation.
#[async_trait]
pub trait DeadLetterReporter: Send + Sync {
    async fn report(&self, record: &SinkRecord, error: &DbError) -> Result<()>;
}

/// Publishes dead letters to a Kafka topic.
///
/// The original key and value are forwarded untouched; where the record
/// came from and why it failed travel in headers.
pub struct KafkaDeadLetterReporter {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDeadLetterReporter {
    pub fn new(brokers: &[String], topic: impl Into<String>) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("acks", "all")
            .create()
            .map_err(Error::Kafka)?;

        Ok(Self {
            producer,
            topic: topic.into(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

fn dead_letter_headers(record: &SinkRecord, error: &DbError, reported_at: i64) -> OwnedHeaders {
    let fields = [
        ("errors.topic", record.topic.clone()),
        ("errors.partition", record.partition.to_string()),
        ("errors.offset", record.offset.to_string()),
        ("errors.message", error.to_string()),
        ("errors.timestamp", reported_at.to_string()),
    ];

    fields.iter().fold(OwnedHeaders::new(), |headers, (key, value)| {
        headers.insert(Header {
            key: *key,
            value: Some(value.as_str()),
        })
    })
}

#[async_trait]
impl DeadLetterReporter for KafkaDeadLetterReporter {
    async fn report(&self, record: &SinkRecord, error: &DbError) -> Result<()> {
        warn!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            dead_letter_topic = %self.topic,
            "Reporting record to dead-letter topic: {}",
            error
        );

        let headers = dead_letter_headers(record, error, chrono::Utc::now().timestamp_millis());
        let mut message = FutureRecord::to(&self.topic).headers(headers);
        if let Some(key) = record.key.as_deref() {
            message = message.key(key);
        }
        if let Some(value) = record.payload() {
            message = message.payload(value);
        }

        self.producer
            .send(message, Timeout::After(DELIVERY_TIMEOUT))
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        Ok(())
    }
}
