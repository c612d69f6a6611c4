//! Bounded per-node connection pool.
//!
//! A semaphore caps the number of checked-out connections; idle connections
//! sit in a stack so the most recently used (and most likely still open)
//! socket is reused first. Connections are created lazily, so a pool of size
//! `N` opens at most `N` sockets and none until traffic arrives.

use super::connection::NodeConnection;
use crate::error::{CacheError, CacheResult};
use crate::node::NodeAddress;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct ConnectionPool {
    address: NodeAddress,
    name: String,
    size: usize,
    connect_timeout: Duration,
    permits: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<NodeConnection>>>,
}

impl ConnectionPool {
    pub fn new(address: NodeAddress, size: usize, connect_timeout: Duration) -> Self {
        let name = address.name();
        Self {
            address,
            name,
            size,
            connect_timeout,
            permits: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(size))),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently checked out
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Check out a connection, waiting at most `wait` for a free slot
    pub async fn checkout(&self, wait: Duration) -> CacheResult<PooledConnection> {
        let permit = match tokio::time::timeout(wait, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) | Err(_) => return Err(CacheError::pool_exhausted(&self.name)),
        };

        let connection = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| NodeConnection::new(self.address.clone(), self.connect_timeout));

        Ok(PooledConnection {
            connection,
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }

    /// Close every idle connection and refuse further checkouts
    pub fn close(&self) {
        self.permits.close();
        self.idle.lock().clear();
    }
}

/// A checked-out connection, returned to the pool on drop.
///
/// A connection dropped while a request was outstanding (the caller's
/// deadline fired) is discarded instead of returned.
#[derive(Debug)]
pub struct PooledConnection {
    connection: NodeConnection,
    idle: Arc<Mutex<Vec<NodeConnection>>>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = NodeConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.connection.is_reusable() {
            let connection = self.connection.detach();
            self.idle.lock().push(connection);
        }
    }
}
