//! In-memory connector used by unit tests.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{SchemalessProtocol, TimestampPrecision};
use crate::db::{Connection, Connector};

#[derive(Debug)]
pub struct MockError {
    message: String,
    cause: Option<Box<MockError>>,
}

impl MockError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    fn caused_by(mut self, cause: MockError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Counters and scripted failures shared by a connector and its connections.
#[derive(Debug, Default)]
pub struct MockState {
    pub open_attempts: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub pings: AtomicUsize,
    pub insert_calls: AtomicUsize,
    /// Next N opens fail.
    pub failing_opens: AtomicUsize,
    /// Next N pings fail.
    pub failing_pings: AtomicUsize,
    /// Next N inserts fail regardless of content.
    pub failing_inserts: AtomicUsize,
    /// Next N statements fail.
    pub failing_executes: AtomicUsize,
    /// Lines that make any insert containing them fail.
    pub poison: Mutex<Vec<String>>,
    pub executed: Mutex<Vec<String>>,
    pub inserted: Mutex<Vec<Vec<String>>>,
}

impl MockState {
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn poison(&self, line: &str) {
        self.poison.lock().unwrap().push(line.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn inserted(&self) -> Vec<Vec<String>> {
        self.inserted.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn open(&self) -> Result<MockConnection, MockError> {
        self.state.open_attempts.fetch_add(1, Ordering::SeqCst);
        if MockState::take_failure(&self.state.failing_opens) {
            return Err(MockError::new("connection refused"));
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            state: self.state.clone(),
        })
    }
}

#[async_trait]
impl Connection for MockConnection {
    type Error = MockError;

    async fn execute(&self, sql: &str) -> Result<(), MockError> {
        if MockState::take_failure(&self.state.failing_executes) {
            return Err(MockError::new(format!("failed to execute: {}", sql)));
        }
        self.state.executed.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    async fn insert(
        &self,
        lines: Vec<String>,
        _protocol: SchemalessProtocol,
        _precision: TimestampPrecision,
    ) -> Result<(), MockError> {
        self.state.insert_calls.fetch_add(1, Ordering::SeqCst);
        if MockState::take_failure(&self.state.failing_inserts) {
            return Err(MockError::new("schemaless insert failed")
                .caused_by(MockError::new("connection reset by peer")));
        }
        let poisoned = {
            let poison = self.state.poison.lock().unwrap();
            lines.iter().find(|line| poison.contains(line)).cloned()
        };
        if let Some(line) = poisoned {
            return Err(MockError::new("schemaless insert failed")
                .caused_by(MockError::new(format!("invalid data: {}", line))));
        }
        self.state.inserted.lock().unwrap().push(lines);
        Ok(())
    }

    async fn ping(&self) -> Result<(), MockError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        if MockState::take_failure(&self.state.failing_pings) {
            return Err(MockError::new("broken pipe"));
        }
        Ok(())
    }

    fn close(self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}
