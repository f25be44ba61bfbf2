pub mod batch;
pub mod config;
pub mod db;
pub mod dlq;
pub mod error;
pub mod record;
pub mod retry;
pub mod runtime;
pub mod task;
pub mod writer;

#[cfg(test)]
mod testing;

pub use config::{Config, SinkSettings};
pub use error::{DbError, Error, Result};
pub use record::SinkRecord;
pub use runtime::SinkRuntime;
pub use task::{SinkTask, SinkTaskContext, TDengineSinkTask};
