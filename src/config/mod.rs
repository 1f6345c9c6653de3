//! Configuration Module - TOML-based Client Configuration
//!
//! Loads and validates configuration from `config.toml`. Contract
//! addresses are never configured here (they come from the provider's
//! metadata endpoint), but every budget the protocol polls under,
//! event confirmation and provider sync alike, is externalized so no
//! wait is unbounded or hardcoded.

pub mod loader;

use serde::Deserialize;

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Provider node endpoints.
  pub node: NodeConfig,
  /// Chain RPC access.
  pub chain: ChainConfig,
  /// Wallet keystore location.
  pub wallet: WalletConfig,
  /// Channel lifecycle parameters.
  pub channel: ChannelConfig,
}

/// Provider node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
  /// Base URL of the provider's API.
  pub base_url: String,
  /// HTTP request timeout in seconds.
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
  /// RPC endpoint URL.
  pub rpc_url: String,
  /// Expected chain ID, validated at connect time.
  pub chain_id: u64,
  /// How many blocks behind the head event filters start scanning.
  #[serde(default = "default_lookback")]
  pub log_lookback_blocks: u64,
}

/// Wallet keystore configuration. The decryption password comes from
/// the `DX_KEYSTORE_PASSWORD` environment variable, never from this
/// file.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
  /// Path to the encrypted JSON keystore.
  pub keystore_path: String,
}

/// Channel lifecycle parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
  /// Deposit locked when opening a new channel, in DXN.
  pub deposit_dxn: f64,
  /// Poll rounds to wait for a confirmation event.
  #[serde(default = "default_event_retries")]
  pub event_max_retries: u32,
  /// Fixed interval between event polls, in milliseconds.
  #[serde(default = "default_event_interval")]
  pub event_poll_interval_ms: u64,
  /// Poll rounds to wait for the provider to report synchronized
  /// after an on-chain open.
  #[serde(default = "default_sync_polls")]
  pub sync_max_polls: u32,
  /// Fixed interval between sync polls, in milliseconds.
  #[serde(default = "default_sync_interval")]
  pub sync_poll_interval_ms: u64,
}

// Default value functions for serde

fn default_timeout() -> u64 {
  30
}

fn default_lookback() -> u64 {
  128
}

fn default_event_retries() -> u32 {
  30
}

fn default_event_interval() -> u64 {
  2_000
}

fn default_sync_polls() -> u32 {
  60
}

fn default_sync_interval() -> u64 {
  1_000
}
