//! # Cache Client
//!
//! Public entry point. Composes the ring, the per-node connection pools and
//! the value codec into `set` / `get` / `delete` (and friends) over a sharded
//! cluster.
//!
//! ## Routing
//!
//! For every key the ring yields the primary node followed by up to
//! `fallback_depth` distinct fallbacks. Nodes whose health says Down are
//! skipped; the first remaining node handles the request. A node failure moves
//! on to the next candidate, and only when every candidate is exhausted does
//! the caller see [`CacheError::ClusterUnavailable`]. A miss reported by a
//! reachable node is final.
//!
//! ## Deadlines
//!
//! Every public operation runs under one overall deadline covering retries
//! and fallbacks. On expiry the in-flight request is abandoned (its connection
//! is discarded) and [`CacheError::Timeout`] is returned.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cream_client::{CacheClient, ClientConfig};
//!
//! # async fn example() -> cream_client::CacheResult<()> {
//! let client = CacheClient::new(ClientConfig::with_servers([
//!     "localhost:11201",
//!     "localhost:11202",
//!     "localhost:11203",
//! ]))?;
//!
//! client.set("cream_ruby_test_key_0", &0, None).await?;
//! let value: Option<i64> = client.get("cream_ruby_test_key_0").await?;
//! assert_eq!(value, Some(0));
//! # Ok(())
//! # }
//! ```

mod expiry;
mod key;
mod topology;

use crate::codec::EncodedValue;
use crate::config::ClientConfig;
use crate::discovery::ServerSource;
use crate::error::{CacheError, CacheResult};
use crate::node::{Node, NodeAddress, NodeStatus};
use crate::protocol::{Command, Item, Response, StoreMode};
use bytes::Bytes;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use topology::Topology;
use tracing::{debug, info, warn};

/// Sharded cache client.
///
/// Cheap to clone; clones share the node set, pools and health state.
#[derive(Debug, Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
    deadline: Duration,
}

#[derive(Debug)]
struct ClientInner {
    config: ClientConfig,
    topology: RwLock<Arc<Topology>>,
}

/// Reply from the node that handled a routed request
struct Routed {
    node: String,
    response: Response,
}

impl Routed {
    fn unexpected(self, operation: &str) -> CacheError {
        CacheError::server_error(
            self.node,
            format!("unexpected reply to {operation}: {:?}", self.response),
        )
    }
}

impl CacheClient {
    /// Validate the configuration and build the initial node set.
    ///
    /// No connection is opened until the first request.
    pub fn new(config: ClientConfig) -> CacheResult<Self> {
        config.validate()?;
        let addresses = NodeAddress::parse_list(&config.servers)?;
        let topology = Topology::build(addresses, &config, None);

        info!(
            servers = ?config.servers,
            codec = %config.codec,
            namespace = ?config.namespace,
            fallback_depth = config.failover.fallback_depth,
            "Cache client created"
        );

        let deadline = config.operation_deadline();
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                topology: RwLock::new(Arc::new(topology)),
            }),
            deadline,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Overall deadline applied to each operation on this handle
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// A handle on the same cluster whose operations use `deadline`
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            deadline,
        }
    }

    // ------------------------------------------------------------------
    // Core operations
    // ------------------------------------------------------------------

    /// Store a value unconditionally.
    ///
    /// `ttl = None` uses the configured default TTL.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let encoded = self.inner.config.codec.encode(value)?;
        self.store(StoreMode::Set, key, encoded, ttl).await.map(|_| ())
    }

    /// Fetch and decode a value; `Ok(None)` on a miss
    pub async fn get<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get_item(key).await? {
            Some(item) => Ok(Some(self.inner.config.codec.decode(&item.data, item.flags)?)),
            None => Ok(None),
        }
    }

    /// Remove a key; `Ok(false)` when it was not present
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let qualified = self.qualify(key)?;
        self.run("delete", async {
            let routed = self
                .dispatch(&qualified, Command::Delete { key: qualified.clone() }, None)
                .await?;
            match routed.response {
                Response::Deleted => Ok(true),
                Response::NotFound => Ok(false),
                _ => Err(routed.unexpected("delete")),
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Conditional stores and raw values
    // ------------------------------------------------------------------

    /// Store only if the key is absent; `Ok(false)` when it already exists
    pub async fn add<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + ?Sized,
    {
        let encoded = self.inner.config.codec.encode(value)?;
        self.store(StoreMode::Add, key, encoded, ttl).await
    }

    /// Store only if the key is present; `Ok(false)` when it is missing
    pub async fn replace<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<bool>
    where
        T: Serialize + ?Sized,
    {
        let encoded = self.inner.config.codec.encode(value)?;
        self.store(StoreMode::Replace, key, encoded, ttl).await
    }

    /// Store bytes as-is (flags 0), e.g. a counter seed for [`incr`](Self::incr)
    pub async fn set_raw(&self, key: &str, data: impl Into<Bytes>, ttl: Option<Duration>) -> CacheResult<()> {
        self.store(StoreMode::Set, key, EncodedValue::raw(data), ttl)
            .await
            .map(|_| ())
    }

    /// Fetch the stored bytes without decoding
    pub async fn get_raw(&self, key: &str) -> CacheResult<Option<Bytes>> {
        Ok(self.get_item(key).await?.map(|item| item.data))
    }

    /// Fetch several keys, one request per node issued concurrently.
    ///
    /// Missing keys are absent from the result. Keys whose node fails are
    /// looked up again individually through the fallback candidates.
    pub async fn get_multi<T, K>(&self, keys: &[K]) -> CacheResult<HashMap<String, T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        let mut qualified_to_key: HashMap<String, String> = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            qualified_to_key.insert(self.qualify(key)?, key.to_string());
        }
        if qualified_to_key.is_empty() {
            return Ok(HashMap::new());
        }

        let items = self
            .run("get_multi", self.fetch_grouped(qualified_to_key.keys().cloned().collect()))
            .await?;

        let codec = self.inner.config.codec;
        let mut values = HashMap::with_capacity(items.len());
        for item in items {
            if let Some(key) = qualified_to_key.remove(&item.key) {
                values.insert(key, codec.decode(&item.data, item.flags)?);
            }
        }
        Ok(values)
    }

    // ------------------------------------------------------------------
    // Counters and expiration
    // ------------------------------------------------------------------

    /// Increment a raw decimal counter; `Ok(None)` when the key is missing
    pub async fn incr(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        let qualified = self.qualify(key)?;
        self.counter("incr", Command::Incr { key: qualified.clone(), delta }, &qualified)
            .await
    }

    /// Decrement a raw decimal counter (floors at 0); `Ok(None)` when missing
    pub async fn decr(&self, key: &str, delta: u64) -> CacheResult<Option<u64>> {
        let qualified = self.qualify(key)?;
        self.counter("decr", Command::Decr { key: qualified.clone(), delta }, &qualified)
            .await
    }

    /// Reset a key's expiration; `Ok(false)` when the key is missing
    pub async fn touch(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let qualified = self.qualify(key)?;
        let command = Command::Touch {
            key: qualified.clone(),
            exptime: expiry::exptime(Some(ttl)),
        };
        self.run("touch", async {
            let routed = self.dispatch(&qualified, command, None).await?;
            match routed.response {
                Response::Touched => Ok(true),
                Response::NotFound => Ok(false),
                _ => Err(routed.unexpected("touch")),
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Administration and diagnostics
    // ------------------------------------------------------------------

    /// Invalidate every item on every node, reporting each node's outcome
    pub async fn flush_all(&self) -> CacheResult<Vec<(String, CacheResult<()>)>> {
        self.run("flush_all", async {
            Ok(self
                .broadcast(Command::FlushAll, |name, response| match response {
                    Response::Ok => Ok(()),
                    other => Err(CacheError::server_error(
                        name,
                        format!("unexpected reply to flush_all: {other:?}"),
                    )),
                })
                .await)
        })
        .await
    }

    /// Server version of every node
    pub async fn versions(&self) -> CacheResult<Vec<(String, CacheResult<String>)>> {
        self.run("versions", async {
            Ok(self
                .broadcast(Command::Version, |name, response| match response {
                    Response::Version(version) => Ok(version),
                    other => Err(CacheError::server_error(
                        name,
                        format!("unexpected reply to version: {other:?}"),
                    )),
                })
                .await)
        })
        .await
    }

    /// Health snapshot of every node, in configured order
    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        self.topology().nodes().iter().map(|node| node.status()).collect()
    }

    /// `host:port` of the nodes a key would be tried on, primary first
    pub fn candidate_nodes(&self, key: &str) -> CacheResult<Vec<String>> {
        let qualified = self.qualify(key)?;
        Ok(self
            .topology()
            .candidates(&qualified, self.inner.config.failover.fallback_depth)?
            .iter()
            .map(|node| node.name().to_string())
            .collect())
    }

    /// Replace the node set atomically.
    ///
    /// Nodes that survive keep their health and pooled connections. Requests
    /// already routed finish against the snapshot they started with.
    pub fn refresh_nodes<S: AsRef<str>>(&self, servers: &[S]) -> CacheResult<()> {
        let addresses = NodeAddress::parse_list(servers)?;

        let mut guard = self.inner.topology.write();
        let previous = Arc::clone(&guard);
        let next = Topology::build(addresses, &self.inner.config, Some(&previous));

        let before = previous.nodes().len();
        let after = next.nodes().len();
        let kept = next
            .nodes()
            .iter()
            .filter(|node| previous.nodes().iter().any(|old| Arc::ptr_eq(old, node)))
            .count();
        *guard = Arc::new(next);
        drop(guard);

        info!(
            nodes_before = before,
            nodes_after = after,
            nodes_kept = kept,
            "Cache node set refreshed"
        );
        Ok(())
    }

    /// Fetch the node list from `source` and swap it in
    pub async fn refresh_from(&self, source: &dyn ServerSource) -> CacheResult<()> {
        let servers = source.servers().await?;
        debug!(source = %source.describe(), count = servers.len(), "Discovered cache servers");
        self.refresh_nodes(&servers)
    }

    /// Close pooled connections on every node
    pub fn close(&self) {
        for node in self.topology().nodes() {
            node.shutdown();
        }
        info!("Cache client closed");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn topology(&self) -> Arc<Topology> {
        Arc::clone(&self.inner.topology.read())
    }

    fn qualify(&self, key: &str) -> CacheResult<String> {
        key::qualify(self.inner.config.namespace.as_deref(), key)
    }

    /// Run an operation under this handle's deadline
    async fn run<T, F>(&self, operation: &'static str, future: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        match tokio::time::timeout(self.deadline, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "Operation deadline exceeded"
                );
                Err(CacheError::timeout(format!(
                    "{operation} exceeded {}ms deadline",
                    self.deadline.as_millis()
                )))
            }
        }
    }

    /// Send `command` to the first viable candidate for `key`.
    ///
    /// `skip` names a node already known to have failed for this key.
    async fn dispatch(&self, key: &str, command: Command, skip: Option<&str>) -> CacheResult<Routed> {
        let topology = self.topology();
        let candidates = topology.candidates(key, self.inner.config.failover.fallback_depth)?;
        let operation = command.name();
        let mut attempted = 0usize;

        for (position, node) in candidates.iter().enumerate() {
            if skip == Some(node.name()) {
                attempted += 1;
                continue;
            }
            if !node.health().should_allow() {
                debug!(node = %node.name(), key, operation, "Skipping down node");
                continue;
            }

            attempted += 1;
            match node.execute(command.clone()).await {
                Ok(response) => {
                    if position > 0 {
                        warn!(node = %node.name(), key, operation, position, "Served by fallback node");
                    } else {
                        debug!(node = %node.name(), key, operation, "Request served");
                    }
                    return Ok(Routed {
                        node: node.name().to_string(),
                        response,
                    });
                }
                Err(error) if error.is_node_failure() => {
                    warn!(
                        node = %node.name(),
                        key,
                        operation,
                        error = %error,
                        "Node failed, trying next candidate"
                    );
                }
                Err(error) => return Err(error),
            }
        }

        warn!(key, operation, attempted, "All candidate nodes exhausted");
        Err(CacheError::cluster_unavailable(key, attempted))
    }

    async fn store(&self, mode: StoreMode, key: &str, value: EncodedValue, ttl: Option<Duration>) -> CacheResult<bool> {
        let qualified = self.qualify(key)?;
        let max = self.inner.config.value_max_bytes;
        if value.len() > max {
            return Err(CacheError::EncodingError(format!(
                "value for '{key}' is {} bytes, limit is {max}",
                value.len()
            )));
        }

        let command = Command::Store {
            mode,
            key: qualified.clone(),
            flags: value.flags,
            exptime: expiry::exptime(ttl.or_else(|| self.inner.config.default_ttl())),
            data: value.data,
        };

        let operation = mode.verb();
        self.run(operation, async {
            let routed = self.dispatch(&qualified, command, None).await?;
            match routed.response {
                Response::Stored => Ok(true),
                Response::NotStored if mode != StoreMode::Set => Ok(false),
                _ => Err(routed.unexpected(operation)),
            }
        })
        .await
    }

    async fn get_item(&self, key: &str) -> CacheResult<Option<Item>> {
        let qualified = self.qualify(key)?;
        self.run("get", self.get_qualified(qualified, None)).await
    }

    async fn get_qualified(&self, qualified: String, skip: Option<&str>) -> CacheResult<Option<Item>> {
        let command = Command::Get {
            keys: vec![qualified.clone()],
        };
        let routed = self.dispatch(&qualified, command, skip).await?;
        match routed.response {
            Response::Values(items) => Ok(items.into_iter().find(|item| item.key == qualified)),
            _ => Err(routed.unexpected("get")),
        }
    }

    async fn counter(&self, operation: &'static str, command: Command, qualified: &str) -> CacheResult<Option<u64>> {
        self.run(operation, async {
            let routed = self.dispatch(qualified, command, None).await?;
            match routed.response {
                Response::Number(value) => Ok(Some(value)),
                Response::NotFound => Ok(None),
                _ => Err(routed.unexpected(operation)),
            }
        })
        .await
    }

    /// Group keys by primary node and fetch each group with one request.
    ///
    /// A group whose primary is down or fails is resolved key by key through
    /// the normal fallback path.
    async fn fetch_grouped(&self, qualified: Vec<String>) -> CacheResult<Vec<Item>> {
        let topology = self.topology();
        let mut groups: HashMap<usize, Vec<String>> = HashMap::new();
        for key in qualified {
            groups.entry(topology.primary(&key)?).or_default().push(key);
        }

        let fetches = groups.into_iter().map(|(index, keys)| {
            let node = Arc::clone(topology.node(index));
            async move { self.fetch_group(node, keys).await }
        });

        let mut items = Vec::new();
        for result in join_all(fetches).await {
            items.extend(result?);
        }
        Ok(items)
    }

    async fn fetch_group(&self, node: Arc<Node>, keys: Vec<String>) -> CacheResult<Vec<Item>> {
        let mut failed_node = None;
        if node.health().should_allow() {
            match node.execute(Command::Get { keys: keys.clone() }).await {
                Ok(Response::Values(items)) => return Ok(items),
                Ok(other) => {
                    return Err(CacheError::server_error(
                        node.name(),
                        format!("unexpected reply to get: {other:?}"),
                    ))
                }
                Err(error) if error.is_node_failure() => {
                    warn!(
                        node = %node.name(),
                        keys = keys.len(),
                        error = %error,
                        "Multi-get failed, falling back per key"
                    );
                    failed_node = Some(node.name());
                }
                Err(error) => return Err(error),
            }
        }

        let lookups = keys
            .into_iter()
            .map(|key| self.get_qualified(key, failed_node));
        let mut items = Vec::new();
        for result in join_all(lookups).await {
            if let Some(item) = result? {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Send `command` to every node concurrently
    async fn broadcast<T, F>(&self, command: Command, interpret: F) -> Vec<(String, CacheResult<T>)>
    where
        F: Fn(&str, Response) -> CacheResult<T>,
    {
        let topology = self.topology();
        let interpret = &interpret;
        let requests = topology.nodes().iter().map(|node| {
            let command = command.clone();
            async move {
                let name = node.name().to_string();
                if !node.health().should_allow() {
                    let error = CacheError::node_unavailable(&name, "node is down");
                    return (name, Err(error));
                }
                let result = match node.execute(command).await {
                    Ok(response) => interpret(&name, response),
                    Err(error) => Err(error),
                };
                (name, result)
            }
        });
        join_all(requests).await
    }
}
