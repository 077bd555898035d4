//! Print new block headers from a WebSocket node until Ctrl-C.
//!
//! ```bash
//! cargo run -p rpcpool-demos --bin subscribe_heads -- wss://node.example
//! ```

use std::env;

use anyhow::{bail, Context};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use rpcpool::{Client, Quantity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = env::args()
        .nth(1)
        .context("usage: subscribe_heads <ws-url>")?;
    let client = Client::new(url);

    if !client.subscription_enabled().await? {
        bail!("{} has no subscription support; use a ws:// or wss:// URL", client.endpoint().url());
    }

    let handle = client
        .subscribe("newHeads", Value::Null, |bytes| {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(head) => {
                    let number = serde_json::from_value::<Quantity>(head["number"].clone())
                        .map(|q| q.0.to_string())
                        .unwrap_or_else(|_| "?".into());
                    println!("block {number} {}", head["hash"].as_str().unwrap_or_default());
                }
                Err(e) => tracing::warn!(error = %e, "undecodable head"),
            }
        })
        .await?;
    tracing::info!(subscription = %handle.id(), "subscribed to new heads");

    tokio::signal::ctrl_c().await?;
    handle.cancel().await?;
    client.close().await?;
    Ok(())
}
