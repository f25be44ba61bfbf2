use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub tdengine: TdengineConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TdengineConfig {
    /// WebSocket endpoint of taosAdapter, e.g. `ws://localhost:6041`.
    pub url: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default = "default_connection_attempts")]
    pub connection_attempts: u32,
    #[serde(default = "default_connection_backoff_ms")]
    pub connection_backoff_ms: u64,
}

/// Write pipeline settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    /// Total retry budget shared by every batch for the task lifetime.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Maximum records per insert; 0 disables the cap.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub protocol: SchemalessProtocol,
    #[serde(default)]
    pub precision: TimestampPrecision,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchemalessProtocol {
    #[default]
    Line,
    Telnet,
    Json,
}

/// Timestamp precision of schemaless lines. The WebSocket transport only
/// carries millisecond, microsecond and nanosecond precision.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
pub enum TimestampPrecision {
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[serde(rename = "ns")]
    Nanoseconds,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub group_id: String,
    pub topics: Vec<String>,
    /// Topic receiving records that still fail when written one by one.
    #[serde(default)]
    pub dead_letter_topic: Option<String>,
    #[serde(default = "default_max_poll_records")]
    pub max_poll_records: usize,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TDENGINE_SINK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tdengine.url.is_empty() {
            return Err(Error::Config("tdengine.url cannot be empty".to_string()));
        }
        if self.tdengine.database.is_empty() {
            return Err(Error::Config(
                "tdengine.database cannot be empty".to_string(),
            ));
        }
        if self.tdengine.connection_attempts == 0 {
            return Err(Error::Config(
                "tdengine.connection_attempts must be at least 1".to_string(),
            ));
        }
        if self.kafka.brokers.is_empty() {
            return Err(Error::Config(
                "At least one kafka broker is required".to_string(),
            ));
        }
        if self.kafka.topics.is_empty() {
            return Err(Error::Config(
                "At least one kafka topic is required".to_string(),
            ));
        }
        if self.kafka.max_poll_records == 0 {
            return Err(Error::Config(
                "kafka.max_poll_records must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validated settings a sink task is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSettings {
    pub database: String,
    pub connection_attempts: u32,
    pub connection_backoff: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub batch_size: usize,
    pub protocol: SchemalessProtocol,
    pub precision: TimestampPrecision,
}

impl From<&Config> for SinkSettings {
    fn from(config: &Config) -> Self {
        Self {
            database: config.tdengine.database.clone(),
            connection_attempts: config.tdengine.connection_attempts,
            connection_backoff: config.tdengine.connection_backoff(),
            max_retries: config.sink.max_retries,
            retry_backoff: config.sink.retry_backoff(),
            batch_size: config.sink.batch_size,
            protocol: config.sink.protocol,
            precision: config.sink.precision,
        }
    }
}

impl TdengineConfig {
    /// DSN understood by the `taos` driver, bound to the target database.
    ///
    /// The schemaless socket only learns its database from the DSN, so a
    /// `USE` on the query socket is not enough.
    pub fn dsn(&self) -> String {
        self.build_dsn(Some(&self.database))
    }

    /// DSN without a database, for statements that must run before the
    /// target database exists.
    pub fn server_dsn(&self) -> String {
        self.build_dsn(None)
    }

    fn build_dsn(&self, database: Option<&str>) -> String {
        let (scheme, rest) = match self.url.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("ws", self.url.as_str()),
        };
        let host = rest.trim_end_matches('/');

        let mut dsn = format!("{}://{}:{}@{}", scheme, self.user, self.password, host);
        if let Some(database) = database {
            dsn.push('/');
            dsn.push_str(database);
        }

        let params: Vec<String> = [("charset", &self.charset), ("timezone", &self.timezone)]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| format!("{}={}", key, v)))
            .collect();
        if !params.is_empty() {
            dsn.push(if dsn.contains('?') { '&' } else { '?' });
            dsn.push_str(&params.join("&"));
        }
        dsn
    }

    pub fn connection_backoff(&self) -> Duration {
        Duration::from_millis(self.connection_backoff_ms)
    }
}

impl SinkConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            batch_size: default_batch_size(),
            protocol: SchemalessProtocol::default(),
            precision: TimestampPrecision::default(),
        }
    }
}

impl KafkaConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn default_user() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "taosdata".to_string()
}

fn default_connection_attempts() -> u32 {
    3
}

fn default_connection_backoff_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    3000
}

fn default_batch_size() -> usize {
    3000
}

fn default_max_poll_records() -> usize {
    500
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}
