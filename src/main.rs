//! DX Channel Client — Entry Point
//!
//! Opens (or resumes) a payment channel to a DX node, optionally runs
//! one metered query from the command line, and settles on request.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (env-filter, structured fields)
//! 3. Decrypt the wallet keystore (password from DX_KEYSTORE_PASSWORD)
//! 4. Connect to the chain RPC + validate chain ID
//! 5. Build the chain gateway and node client
//! 6. Open or resume the channel
//! 7. Optional query: `dx-channel <endpoint> [key=value ...]`
//! 8. Settle when DX_SETTLE=1

use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use tracing::{info, warn};

mod adapters;
mod config;
mod domain;
mod error;
mod ports;
mod usecases;

use adapters::api::client::{DxNodeClient, NodeClientConfig};
use adapters::chain::{EthGateway, RpcConnection};
use domain::units;
use domain::wallet::Wallet;
use usecases::channel::{Channel, QueryOptions};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured logging ────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        node = %config.node.base_url,
        "Starting DX channel client"
    );

    // ── 3. Decrypt the wallet keystore ──────────────────────
    let password = std::env::var("DX_KEYSTORE_PASSWORD")
        .context("DX_KEYSTORE_PASSWORD not set")?;
    let wallet = Wallet::from_keystore(&config.wallet.keystore_path, &password)
        .context("Failed to decrypt keystore")?;
    info!(address = %wallet.checksum_address(), "Wallet loaded");

    // ── 4. Connect to the chain RPC ─────────────────────────
    let connection = Arc::new(
        RpcConnection::connect(&config.chain)
            .await
            .context("Failed to connect to chain RPC")?,
    );

    // ── 5. Build the chain gateway and node client ──────────
    let gateway = EthGateway::new(
        Arc::clone(&connection),
        wallet.clone(),
        config.chain.log_lookback_blocks,
    );
    let node = DxNodeClient::new(NodeClientConfig {
        base_url: config.node.base_url.clone(),
        timeout: std::time::Duration::from_secs(config.node.timeout_seconds),
    })?;

    // ── 6. Open (or resume) the channel ─────────────────────
    let deposit = Decimal::from_f64(config.channel.deposit_dxn)
        .and_then(units::dxn_to_dei)
        .context("Invalid deposit amount")?;
    let mut channel = Channel::open(wallet, gateway, node, deposit, config.channel.clone())
        .await
        .context("Failed to open channel")?;
    println!("{}", draw_box("The DX Network", &channel.state_summary(), 81));

    // ── 7. Optional query from the command line ─────────────
    let mut args = std::env::args().skip(1);
    if let Some(endpoint) = args.next() {
        let params: Vec<(String, String)> = args
            .filter_map(|arg| {
                arg.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect();

        match channel
            .query(&endpoint, &params, &QueryOptions::default())
            .await?
        {
            Some(result) => println!("{result}"),
            None => warn!(endpoint = %endpoint, "Query returned no result"),
        }
        println!("{}", draw_box("The DX Network", &channel.balance_summary(), 69));
    }

    // ── 8. Settle when explicitly requested ─────────────────
    if std::env::var("DX_SETTLE").is_ok_and(|v| v == "1") {
        let hash = channel.settle().await.context("Settlement failed")?;
        info!(hash = %hash, "Channel settled");
        println!("{}", draw_box("The DX Network", &channel.state_summary(), 81));
    }

    Ok(())
}

/// Boxed terminal rendering for channel summaries.
fn draw_box(title: &str, body: &str, width: usize) -> String {
    let inner = width.saturating_sub(4);
    let dashes = inner.saturating_sub(title.chars().count());
    let left = dashes / 2;

    let mut out = format!(
        "┏{} {} {}┓\n",
        "━".repeat(left),
        title,
        "━".repeat(dashes - left)
    );
    for line in body.split('\n') {
        let pad = inner.saturating_sub(line.chars().count());
        out.push_str(&format!("┃ {}{} ┃\n", line, " ".repeat(pad)));
    }
    out.push_str(&format!("┗{}┛", "━".repeat(width.saturating_sub(2))));
    out
}
