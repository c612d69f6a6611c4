//! # Node Connections
//!
//! Lazily-opened TCP connections speaking the memcached text protocol, and
//! the bounded pool each node draws them from.

pub mod connection;
pub mod pool;

pub use connection::NodeConnection;
pub use pool::{ConnectionPool, PooledConnection};
