//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters, and
//! providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config: AppConfig = toml::from_str(&content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  info!(
    node = %config.node.base_url,
    chain_id = config.chain.chain_id,
    deposit_dxn = config.channel.deposit_dxn,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.node.base_url.is_empty(),
    "Node base URL must not be empty"
  );
  anyhow::ensure!(
    config.node.timeout_seconds > 0,
    "Node timeout must be positive"
  );

  anyhow::ensure!(
    !config.chain.rpc_url.is_empty(),
    "Chain RPC URL must not be empty"
  );

  anyhow::ensure!(
    !config.wallet.keystore_path.is_empty(),
    "Wallet keystore path must not be empty"
  );

  anyhow::ensure!(
    config.channel.deposit_dxn > 0.0,
    "Channel deposit must be positive, got {}",
    config.channel.deposit_dxn
  );
  anyhow::ensure!(
    config.channel.event_poll_interval_ms > 0,
    "Event poll interval must be positive"
  );
  anyhow::ensure!(
    config.channel.sync_poll_interval_ms > 0,
    "Sync poll interval must be positive"
  );
  anyhow::ensure!(
    config.channel.sync_max_polls > 0,
    "Sync poll budget must be positive"
  );

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const VALID: &str = r#"
    [node]
    base_url = "https://api-alpha.dx.network"

    [chain]
    rpc_url = "http://127.0.0.1:8565"
    chain_id = 1

    [wallet]
    keystore_path = "wallet.json"

    [channel]
    deposit_dxn = 50.0
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_defaults_applied() {
    let config: AppConfig = toml::from_str(VALID).unwrap();
    validate_config(&config).unwrap();
    assert_eq!(config.node.timeout_seconds, 30);
    assert_eq!(config.channel.event_max_retries, 30);
    assert_eq!(config.channel.sync_max_polls, 60);
    assert_eq!(config.chain.log_lookback_blocks, 128);
  }

  #[test]
  fn test_zero_deposit_rejected() {
    let mut config: AppConfig = toml::from_str(VALID).unwrap();
    config.channel.deposit_dxn = 0.0;
    assert!(validate_config(&config).is_err());
  }

  #[test]
  fn test_unbounded_sync_poll_rejected() {
    let mut config: AppConfig = toml::from_str(VALID).unwrap();
    config.channel.sync_max_polls = 0;
    assert!(validate_config(&config).is_err());
  }
}
