pub mod cache;
pub mod connection;
pub mod tdengine;

pub use cache::ConnectionCache;
pub use connection::{Connection, ConnectionFactory, Connector};
pub use tdengine::{TaosConnection, TaosConnector, TaosError};
