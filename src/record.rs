//! Records handed to the sink task by the runtime.

use rdkafka::Message;
use tracing::warn;

/// One consumed Kafka record.
///
/// Records are immutable and only live for the `put` call that receives
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: Option<String>,
    pub timestamp: Option<i64>,
}

impl SinkRecord {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, value: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            value: Some(value.into()),
            timestamp: None,
        }
    }

    /// Builds a record from a consumed message.
    ///
    /// Non UTF-8 keys and payloads are converted lossily.
    pub fn from_message<M: Message>(message: &M) -> Self {
        let value = message.payload().map(|bytes| {
            String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| {
                warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    "Payload is not valid UTF-8, converting lossily"
                );
                String::from_utf8_lossy(bytes).into_owned()
            })
        });
        let key = message
            .key()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key,
            value,
            timestamp: message.timestamp().to_millis(),
        }
    }

    /// The schemaless payload, `None` for tombstones.
    pub fn payload(&self) -> Option<&str> {
        self.value.as_deref()
    }
}
