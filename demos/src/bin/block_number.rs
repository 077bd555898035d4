//! Print chain id, head block and client version of a node.
//!
//! ```bash
//! cargo run -p rpcpool-demos --bin block_number -- https://cloudflare-eth.com
//! RUST_LOG=rpcpool_core=debug cargo run -p rpcpool-demos --bin block_number -- wss://node.example
//! ```

use std::env;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use rpcpool::Client;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = env::args()
        .nth(1)
        .context("usage: block_number <url> [header=value ...]")?;
    let headers = env::args().skip(2).filter_map(|arg| {
        arg.split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
    });
    let client = Client::builder(url).headers(headers).build();

    let eth = client.eth();
    let (chain_id, head, version) = tokio::try_join!(eth.chain_id(), eth.block_number(), eth.client_version())?;

    println!("client    : {version}");
    println!("chain id  : {chain_id}");
    println!("head block: {head}");
    println!("pub/sub   : {}", client.subscription_enabled().await?);

    let stats = client.pool_stats();
    tracing::info!(created = stats.created, reused = stats.reused, "pool usage");
    client.close().await?;
    Ok(())
}
