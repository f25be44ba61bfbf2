//! Error types and result handling for tdengine-sink.
//!
//! This module defines the main error type [`Error`], the chained database
//! error [`DbError`] and a convenience [`Result`] type alias used throughout
//! the crate.
//!
//! # Example
//!
//! ```rust
//! use tdengine_sink::{Error, Result};
//!
//! fn load() -> Result<()> {
//!     Err(Error::Config("tdengine.database cannot be empty".to_string()))
//! }
//!
//! match load() {
//!     Ok(()) => println!("Loaded"),
//!     Err(e) if e.is_retriable() => eprintln!("Try again later: {}", e),
//!     Err(e) => eprintln!("Fatal: {}", e),
//! }
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for tdengine-sink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the config file, environment or validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No connection could be opened within the attempt budget.
    #[error("Connection error after {attempts} attempt(s): {source}")]
    Connection {
        /// Number of attempts made before giving up
        attempts: u32,
        /// Last failure reported by the driver
        #[source]
        source: DbError,
    },

    /// A batch write failed and the task should be redelivered the same
    /// records after `backoff`.
    ///
    /// This is not a terminal error. The runtime sleeps and calls `put`
    /// again with the same input.
    #[error("Retriable write error (redeliver after {backoff:?}): {source}")]
    Retriable {
        /// Delay requested before redelivery
        backoff: Duration,
        /// Write failure that triggered the retry
        #[source]
        source: DbError,
    },

    /// A batch write failed with the retry budget exhausted and no
    /// dead-letter reporter configured. Stops the task.
    #[error("Write error: {0}")]
    Write(#[source] DbError),

    /// Kafka client, consumer or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// `put` or `stop` was called on a task that was never started.
    #[error("Sink task has not been started")]
    NotStarted,
}

impl Error {
    /// Whether the caller should redeliver the same records instead of
    /// stopping.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Retriable { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

/// A database error that keeps the driver's full cause chain.
///
/// The messages of every error in the `source()` chain are collected
/// eagerly so the whole chain can be logged or reported as one line, while
/// the original error stays reachable through [`StdError::source`].
pub struct DbError {
    causes: Vec<String>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl DbError {
    /// Wraps a driver error, collecting the message of each cause in order.
    pub fn from_chain<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut causes = vec![error.to_string()];
        let mut current = error.source();
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        Self {
            causes,
            source: Some(Box::new(error)),
        }
    }

    /// An error raised by this crate rather than the driver.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            causes: vec![message.into()],
            source: None,
        }
    }

    /// Messages of the error and each underlying cause, outermost first.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.causes.join(": caused by: "))
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbError")
            .field("causes", &self.causes)
            .finish()
    }
}

impl StdError for DbError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A convenient Result type alias for tdengine-sink operations.
///
/// This is equivalent to `std::result::Result<T, tdengine_sink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Layer {
        message: &'static str,
        inner: Option<Box<Layer>>,
    }

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.inner.as_deref().map(|e| e as &(dyn StdError + 'static))
        }
    }

    #[test]
    fn test_db_error_collects_chain() {
        let chained = Layer {
            message: "insert failed",
            inner: Some(Box::new(Layer {
                message: "invalid line protocol",
                inner: Some(Box::new(Layer {
                    message: "missing timestamp",
                    inner: None,
                })),
            })),
        };

        let err = DbError::from_chain(chained);
        assert_eq!(
            err.causes(),
            &["insert failed", "invalid line protocol", "missing timestamp"]
        );
        assert_eq!(
            err.to_string(),
            "insert failed: caused by: invalid line protocol: caused by: missing timestamp"
        );

        // The original chain stays inspectable.
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "insert failed");
        assert_eq!(source.source().unwrap().to_string(), "invalid line protocol");
    }

    #[test]
    fn test_retriable_classification() {
        let retriable = Error::Retriable {
            backoff: Duration::from_millis(3000),
            source: DbError::message("timeout"),
        };
        assert!(retriable.is_retriable());
        assert!(!Error::Write(DbError::message("bad line")).is_retriable());
        assert!(!Error::NotStarted.is_retriable());
    }
}
