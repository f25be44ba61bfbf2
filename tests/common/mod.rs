use std::env;
use tdengine_sink::config::{
    Config, KafkaConfig, SchemalessProtocol, SinkConfig, TdengineConfig, TimestampPrecision,
};

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    // Use TEST_ prefix for test environment variables
    let tdengine = TdengineConfig {
        url: env::var("TEST_TDENGINE_URL").unwrap_or_else(|_| "ws://localhost:6041".to_string()),
        user: env::var("TEST_TDENGINE_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("TEST_TDENGINE_PASSWORD").unwrap_or_else(|_| "taosdata".to_string()),
        database: format!("test_sink_{}", std::process::id()),
        charset: None,
        timezone: None,
        connection_attempts: 3,
        connection_backoff_ms: 500,
    };

    let sink = SinkConfig {
        max_retries: 1, // Isolate on the first failure
        retry_backoff_ms: 100,
        batch_size: 100,
        protocol: SchemalessProtocol::Line,
        precision: TimestampPrecision::Milliseconds,
    };

    let kafka = KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        group_id: format!("test_group_{}", std::process::id()),
        topics: vec![format!("test_meters_{}", std::process::id())],
        dead_letter_topic: Some(format!("test_dlq_{}", std::process::id())),
        max_poll_records: 100,
        poll_timeout_ms: 200,
        auto_offset_reset: "earliest".to_string(),
    };

    Config {
        tdengine,
        sink,
        kafka,
    }
}
