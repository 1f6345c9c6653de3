//! Chain RPC Provider - alloy-rs 0.9 Connection Management
//!
//! Manages the connection to the chain node via alloy-rs. Validates
//! RPC connectivity and the expected chain ID at startup and exposes a
//! shared provider instance for all on-chain operations.
//!
//! In alloy 0.9, `ProviderBuilder::new().on_http()` returns a complex
//! filler type. We store it as a type-erased `dyn Provider` to keep
//! the API clean across the adapter layer.

use std::sync::Arc;

use alloy::providers::{Provider, ProviderBuilder};
use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::config::ChainConfig;

/// Shared RPC provider backed by alloy-rs 0.9.
///
/// The gateway and any future chain adapter share one instance to
/// avoid redundant connections and enable connection pooling.
pub struct RpcConnection {
    /// The alloy HTTP provider (type-erased).
    provider: Arc<dyn Provider + Send + Sync>,
    /// Chain ID confirmed at startup, reused when signing transactions.
    chain_id: u64,
}

impl RpcConnection {
    /// Connect to the RPC endpoint and validate the chain ID.
    ///
    /// The URL and expected chain ID come from `config.toml`; a wrong
    /// endpoint fails here instead of at the first settlement.
    #[instrument(skip_all)]
    pub async fn connect(config: &ChainConfig) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .on_http(config.rpc_url.parse().context("Invalid RPC URL")?)
            .boxed();

        let provider: Arc<dyn Provider + Send + Sync> = Arc::new(provider);

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain ID")?;

        if chain_id != config.chain_id {
            anyhow::bail!(
                "Expected chain_id={}, RPC endpoint reports {chain_id}",
                config.chain_id
            );
        }

        info!(chain_id, "Connected to chain RPC");

        Ok(Self { provider, chain_id })
    }

    /// Wrap an already-built provider. Used by gateway unit tests that
    /// never touch the network.
    #[cfg(test)]
    pub(crate) fn from_parts(
        provider: Arc<dyn Provider + Send + Sync>,
        chain_id: u64,
    ) -> Self {
        Self { provider, chain_id }
    }

    /// Get a shared reference to the alloy provider (type-erased).
    pub fn inner(&self) -> Arc<dyn Provider + Send + Sync> {
        Arc::clone(&self.provider)
    }

    /// Chain ID validated at connect time.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Check if the RPC connection is healthy via a lightweight call.
    pub async fn is_healthy(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }
}
