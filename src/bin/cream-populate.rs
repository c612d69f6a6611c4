//! # Cream Populate
//!
//! Seeds the cluster with `cream_ruby_test_key_0..19` = `0..19`. Node
//! addresses and every other setting come from `ClientConfig::load()`
//! (`cream-client.toml` and `CREAM_*` variables).
//!
//! Exits non-zero when any key could not be written.

use anyhow::{Context, Result};
use cream_client::{logging, CacheClient, ClientConfig};
use std::process;
use tracing::{error, info};

const KEY_PREFIX: &str = "cream_ruby_test_key_";
const KEY_COUNT: i64 = 20;

#[tokio::main]
async fn main() {
    logging::init_structured_logging();

    match run().await {
        Ok(0) => info!(keys = KEY_COUNT, "Cluster populated"),
        Ok(failed) => {
            error!(failed, keys = KEY_COUNT, "Cluster population incomplete");
            process::exit(1);
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Cluster population aborted");
            process::exit(2);
        }
    }
}

/// Write every key, returning how many failed
async fn run() -> Result<usize> {
    let config = ClientConfig::load().context("loading cache client configuration")?;
    let client = CacheClient::new(config).context("creating cache client")?;

    let mut failed = 0;
    for value in 0..KEY_COUNT {
        let key = format!("{KEY_PREFIX}{value}");
        match client.set(&key, &value, None).await {
            Ok(()) => info!(key = %key, value, "Stored"),
            Err(e) => {
                error!(key = %key, value, error = %e, "Failed to store");
                failed += 1;
            }
        }
    }

    for status in client.node_statuses() {
        info!(
            node = %status.address,
            state = %status.state,
            consecutive_failures = status.consecutive_failures,
            "Node status"
        );
    }

    client.close();
    Ok(failed)
}
