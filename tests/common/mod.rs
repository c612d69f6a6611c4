//! In-process fake memcached for integration tests.
//!
//! Speaks the subset of the text protocol the client issues, keeps items in a
//! `DashMap`, and can be stopped, restarted on the same port, or switched to
//! swallow requests without replying.

#![allow(dead_code)]

pub mod strategies;

use bytes::Bytes;
use cream_client::ClientConfig;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub flags: u32,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct ServerState {
    store: DashMap<String, StoredItem>,
    unresponsive: AtomicBool,
    requests: AtomicUsize,
}

/// One fake server bound to a fixed local port
pub struct FakeMemcached {
    port: u16,
    state: Arc<ServerState>,
    task: Option<JoinHandle<()>>,
}

impl FakeMemcached {
    /// Bind an ephemeral port and start serving
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake memcached");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(ServerState::default());
        let task = Some(tokio::spawn(serve(listener, Arc::clone(&state))));
        Self { port, state, task }
    }

    /// `host:port` as the client expects it
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Kill the server: listener and every open connection go away and the
    /// store is lost, like a crashed memcached
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.state.store.clear();
    }

    /// Start again on the same port with an empty store
    pub async fn restart(&mut self) {
        self.stop().await;
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .expect("rebind fake memcached");
        self.task = Some(tokio::spawn(serve(listener, Arc::clone(&self.state))));
    }

    /// Accept and read requests but never answer
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.state.unresponsive.store(unresponsive, Ordering::SeqCst);
    }

    pub fn item(&self, key: &str) -> Option<StoredItem> {
        self.state.store.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.store.contains_key(key)
    }

    pub fn item_count(&self) -> usize {
        self.state.store.len()
    }

    /// Commands received since start
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Put an item directly, bypassing the protocol
    pub fn insert(&self, key: &str, flags: u32, data: impl Into<Bytes>) {
        self.state.store.insert(
            key.to_string(),
            StoredItem {
                flags,
                data: data.into(),
            },
        );
    }
}

impl Drop for FakeMemcached {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Several fake servers started together
pub struct FakeCluster {
    pub nodes: Vec<FakeMemcached>,
}

impl FakeCluster {
    pub async fn start(count: usize) -> Self {
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            nodes.push(FakeMemcached::start().await);
        }
        Self { nodes }
    }

    pub fn servers(&self) -> Vec<String> {
        self.nodes.iter().map(FakeMemcached::address).collect()
    }

    /// The fake behind a `host:port` name
    pub fn by_address(&self, address: &str) -> &FakeMemcached {
        self.nodes
            .iter()
            .find(|node| node.address() == address)
            .expect("address belongs to the cluster")
    }

    pub fn by_address_mut(&mut self, address: &str) -> &mut FakeMemcached {
        self.nodes
            .iter_mut()
            .find(|node| node.address() == address)
            .expect("address belongs to the cluster")
    }

    /// Which nodes hold `key`
    pub fn holders(&self, key: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| node.contains(key))
            .map(FakeMemcached::address)
            .collect()
    }
}

/// Client configuration with timings short enough for tests
pub fn test_config(servers: Vec<String>) -> ClientConfig {
    let mut config = ClientConfig::with_servers(servers);
    config.timeouts.request_ms = 250;
    config.timeouts.connect_ms = 250;
    config.timeouts.operation_deadline_ms = 3000;
    config.retry.max_retries = 1;
    config.retry.retry_delay_ms = 10;
    config.failover.failure_threshold = 1;
    config.failover.cooldown_ms = 300;
    config.pool.size = 2;
    config
}

async fn serve(listener: TcpListener, state: Arc<ServerState>) {
    // Dropping the set on abort tears down every connection
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => {
                    connections.spawn(handle_connection(socket, Arc::clone(&state)));
                }
                Err(_) => return,
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn handle_connection(socket: TcpStream, state: Arc<ServerState>) {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        state.requests.fetch_add(1, Ordering::SeqCst);

        let parts: Vec<&str> = line.split_whitespace().collect();
        let reply = match parts.as_slice() {
            [verb @ ("set" | "add" | "replace"), key, flags, _exptime, length] => {
                let Ok(length) = length.parse::<usize>() else {
                    return;
                };
                let mut data = vec![0u8; length + 2];
                if reader.read_exact(&mut data).await.is_err() {
                    return;
                }
                data.truncate(length);
                store(&state, verb, key, flags.parse().unwrap_or(0), data)
            }
            ["get", keys @ ..] => {
                let mut out = Vec::new();
                for key in keys {
                    if let Some(item) = state.store.get(*key) {
                        out.extend_from_slice(
                            format!("VALUE {} {} {}\r\n", key, item.flags, item.data.len()).as_bytes(),
                        );
                        out.extend_from_slice(&item.data);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END\r\n");
                out
            }
            ["delete", key] => match state.store.remove(*key) {
                Some(_) => b"DELETED\r\n".to_vec(),
                None => b"NOT_FOUND\r\n".to_vec(),
            },
            ["touch", key, _exptime] => match state.store.contains_key(*key) {
                true => b"TOUCHED\r\n".to_vec(),
                false => b"NOT_FOUND\r\n".to_vec(),
            },
            [verb @ ("incr" | "decr"), key, delta] => counter(&state, verb, key, delta),
            ["version"] => b"VERSION 1.6.21-fake\r\n".to_vec(),
            ["flush_all"] => {
                state.store.clear();
                b"OK\r\n".to_vec()
            }
            _ => b"ERROR\r\n".to_vec(),
        };

        if state.unresponsive.load(Ordering::SeqCst) {
            continue;
        }
        if writer.write_all(&reply).await.is_err() {
            return;
        }
    }
}

fn store(state: &ServerState, verb: &str, key: &str, flags: u32, data: Vec<u8>) -> Vec<u8> {
    let exists = state.store.contains_key(key);
    let allowed = match verb {
        "add" => !exists,
        "replace" => exists,
        _ => true,
    };
    if !allowed {
        return b"NOT_STORED\r\n".to_vec();
    }
    state.store.insert(
        key.to_string(),
        StoredItem {
            flags,
            data: Bytes::from(data),
        },
    );
    b"STORED\r\n".to_vec()
}

fn counter(state: &ServerState, verb: &str, key: &str, delta: &str) -> Vec<u8> {
    let Ok(delta) = delta.parse::<u64>() else {
        return b"CLIENT_ERROR invalid numeric delta argument\r\n".to_vec();
    };
    let Some(mut entry) = state.store.get_mut(key) else {
        return b"NOT_FOUND\r\n".to_vec();
    };
    let current = std::str::from_utf8(&entry.data)
        .ok()
        .and_then(|text| text.trim().parse::<u64>().ok());
    let Some(current) = current else {
        return b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n".to_vec();
    };

    let next = if verb == "incr" {
        current.wrapping_add(delta)
    } else {
        current.saturating_sub(delta)
    };
    entry.data = Bytes::from(next.to_string());
    format!("{next}\r\n").into_bytes()
}
