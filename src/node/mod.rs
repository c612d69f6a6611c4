//! # Cache Nodes
//!
//! A [`Node`] couples one server address with its connection pool and health
//! tracker. It is the only place that talks to a server: every request goes
//! through [`Node::execute`], which retries transient network failures and
//! feeds the outcome into [`NodeHealth`].

pub mod address;
pub mod health;

pub use address::NodeAddress;
pub use health::{HealthPolicy, NodeHealth, NodeState};

use crate::config::ClientConfig;
use crate::connection::ConnectionPool;
use crate::error::{CacheError, CacheResult};
use crate::protocol::{Command, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Point-in-time view of one node's health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub address: String,
    pub state: NodeState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Node {
    address: NodeAddress,
    name: String,
    health: NodeHealth,
    pool: ConnectionPool,
    request_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Node {
    pub fn new(address: NodeAddress, config: &ClientConfig) -> Self {
        let name = address.name();
        Self {
            health: NodeHealth::new(name.clone(), config.health_policy()),
            pool: ConnectionPool::new(address.clone(), config.pool.size, config.connect_timeout()),
            request_timeout: config.request_timeout(),
            max_retries: config.retry.max_retries,
            retry_delay: config.retry_delay(),
            address,
            name,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> &NodeHealth {
        &self.health
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            address: self.name.clone(),
            state: self.health.state(),
            consecutive_failures: self.health.consecutive_failures(),
            last_failure_at: self.health.last_failure_at().map(DateTime::<Utc>::from),
        }
    }

    /// Send one command, retrying network failures on this node.
    ///
    /// - Network failures are retried up to `max_retries` times, then counted
    ///   once against node health and returned as `NodeUnavailable`.
    /// - `ERROR`-class replies prove the node is alive and come back as
    ///   `ServerError`.
    /// - Pool exhaustion is returned untouched and not counted.
    pub async fn execute(&self, command: Command) -> CacheResult<Response> {
        let operation = command.name();
        let mut attempt = 0u32;

        loop {
            let mut connection = self.pool.checkout(self.request_timeout).await?;

            match connection.request(command.clone(), self.request_timeout).await {
                Ok(Response::Error(message)) => {
                    self.health.record_success();
                    warn!(node = %self.name, operation, message = %message, "Server rejected request");
                    return Err(CacheError::server_error(&self.name, message));
                }
                Ok(response) => {
                    self.health.record_success();
                    return Ok(response);
                }
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(
                        node = %self.name,
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "Retrying request"
                    );
                    drop(connection);
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(error) => {
                    self.health.record_failure();
                    warn!(
                        node = %self.name,
                        operation,
                        attempts = attempt + 1,
                        error = %error,
                        "Node request failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Drop pooled connections; in-flight requests finish on their own
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fast_config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.timeouts.request_ms = 200;
        config.timeouts.connect_ms = 200;
        config.retry.max_retries = 1;
        config.retry.retry_delay_ms = 5;
        config.failover.failure_threshold = 1;
        config
    }

    /// Accepts connections and answers every read with `reply`
    async fn scripted_server(reply: &'static [u8]) -> NodeAddress {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 256];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 || socket.write_all(reply).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        NodeAddress::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_success_marks_node_up() {
        let address = scripted_server(b"VERSION 1.6.21\r\n").await;
        let node = Node::new(address, &fast_config());
        assert_eq!(node.status().state, NodeState::Unknown);

        let response = node.execute(Command::Version).await.unwrap();
        assert_eq!(response, Response::Version("1.6.21".to_string()));
        assert_eq!(node.status().state, NodeState::Up);
        assert!(node.status().last_failure_at.is_none());
    }

    #[tokio::test]
    async fn test_server_error_keeps_node_up() {
        let address = scripted_server(b"SERVER_ERROR out of memory\r\n").await;
        let node = Node::new(address, &fast_config());

        let result = node.execute(Command::Version).await;
        match result {
            Err(CacheError::ServerError { message, .. }) => {
                assert_eq!(message, "SERVER_ERROR out of memory");
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
        assert_eq!(node.status().state, NodeState::Up);
    }

    #[tokio::test]
    async fn test_unreachable_node_goes_down_after_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let node = Node::new(NodeAddress::new("127.0.0.1", port), &fast_config());
        let result = node.execute(Command::Version).await;

        assert!(matches!(result, Err(CacheError::NodeUnavailable { .. })));
        let status = node.status();
        assert_eq!(status.state, NodeState::Down);
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_failure_at.is_some());
    }
}
