#![allow(clippy::doc_markdown)] // Allow technical terms like memcached, Dalli in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Cream Client
//!
//! Sharded memcached client: spreads keys across independent cache servers
//! with consistent hashing, serializes values through a pluggable codec, and
//! keeps serving when individual servers go away.
//!
//! ## Architecture
//!
//! ```text
//! CacheClient ──▶ Ring ──────────▶ candidate nodes (primary + fallbacks)
//!      │
//!      ├──▶ Codec ─────────────▶ Json | Bincode
//!      │
//!      └──▶ Node ──▶ NodeHealth   (Unknown / Up / Down, cooldown probe)
//!              └──▶ ConnectionPool ──▶ NodeConnection ──▶ MemcacheCodec ──▶ TCP
//! ```
//!
//! ## Module Organization
//!
//! - [`client`] - Public operations, routing, failover and deadlines
//! - [`ring`] - Consistent hash ring (SHA1 points, CRC32 keys)
//! - [`node`] - Node addresses, health state machine, request execution
//! - [`connection`] - Lazy TCP connections and per-node pools
//! - [`protocol`] - Memcached text protocol framing
//! - [`codec`] - Value serialization
//! - [`config`] - Configuration structs and layered loading
//! - [`discovery`] - Pluggable node address sources
//! - [`error`] - Structured error handling
//! - [`logging`] - `tracing` subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cream_client::{CacheClient, ClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> cream_client::CacheResult<()> {
//! let client = CacheClient::new(ClientConfig::load()?)?;
//!
//! client.set("greeting", "hello", Some(Duration::from_secs(60))).await?;
//! let greeting: Option<String> = client.get("greeting").await?;
//!
//! for status in client.node_statuses() {
//!     println!("{} is {}", status.address, status.state);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod node;
pub mod protocol;
pub mod ring;

pub use client::CacheClient;
pub use codec::{Codec, EncodedValue};
pub use config::ClientConfig;
pub use discovery::{EnvServers, ServerSource, StaticServers};
pub use error::{CacheError, CacheResult};
pub use node::{NodeAddress, NodeState, NodeStatus};
pub use ring::Ring;
