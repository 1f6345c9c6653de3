//! Channel Use Case - Micropayment Channel Lifecycle
//!
//! Drives the channel state machine:
//! Probing -> {OpeningNew | ResumingExisting} -> Open -> Settled.
//!
//! Open flow:
//! 1. Fetch endpoints + fee quote from the provider's metadata endpoint
//! 2. Probe the channel manager for an existing channel to this node
//! 3a. Existing: fetch the last known receipt and go straight to Open
//! 3b. Fresh: balance check -> approve -> Approval event -> allowance
//!     re-check -> openChannel -> ChannelOpened event -> bounded
//!     provider sync wait
//!
//! A `Channel` value is single-owner: queries and settlement take
//! `&mut self`, so overlapping operations on one channel cannot be
//! expressed. Opening performs no rollback: a failure after approval
//! leaves the allowance standing and the channel un-opened.

use alloy::primitives::{Address, U256};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::domain::abi::{AbiType, AbiValue};
use crate::domain::crypto;
use crate::domain::receipt::Receipt;
use crate::domain::result::QueryResult;
use crate::domain::units;
use crate::domain::wallet::Wallet;
use crate::error::{ChannelError, Result};
use crate::ports::chain::{CallDescriptor, ChainGateway, EventDescriptor, EventParam};
use crate::ports::node::{NodeApi, QueryRequest};

/// Lifecycle states. There is no way back to `Open` from `Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
  /// Construction in progress; queries and settlement are refused.
  Probing,
  /// Channel usable for metered queries.
  Open,
  /// Settled on-chain; the channel value is spent.
  Settled,
}

/// Resolved on-chain endpoints for one (payer, node) channel.
#[derive(Debug, Clone)]
pub struct ChannelEndpoints {
  /// The provider's on-chain identity.
  pub node: Address,
  /// Fungible token contract backing the deposit.
  pub token: Address,
  /// Channel manager contract.
  pub channel_manager: Address,
  /// Quoted flat network fee in dei.
  pub network_fee: u128,
}

/// Per-query behavior flags.
#[derive(Debug, Clone)]
pub struct QueryOptions {
  /// Data model the query runs against.
  pub model: String,
  /// Keep per-datapoint metadata in the result (stripped otherwise).
  pub keep_metadata: bool,
  /// Verify datapoint signatures and flag each metadata object.
  /// Implies nothing on failure: invalid signatures are flagged, not
  /// fatal.
  pub verify_metadata: bool,
}

impl Default for QueryOptions {
  fn default() -> Self {
    Self {
      model: "techindustry".to_string(),
      keep_metadata: false,
      verify_metadata: false,
    }
  }
}

/// The aggregate root: one payment channel from one wallet to one
/// provider node, backed by one on-chain deposit.
pub struct Channel<G: ChainGateway, N: NodeApi> {
  wallet: Wallet,
  gateway: G,
  node: N,
  endpoints: ChannelEndpoints,
  deposit: U256,
  settings: ChannelConfig,
  state: ChannelState,
  /// Latest provider-issued receipt; the single source of truth for
  /// amounts owed. Replaced wholesale, never merged.
  receipt: Receipt,
  /// Final settlement transaction hash, once settled.
  settlement_hash: Option<String>,
}

impl<G: ChainGateway, N: NodeApi> std::fmt::Debug for Channel<G, N> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Channel")
      .field("wallet", &self.wallet)
      .field("endpoints", &self.endpoints)
      .field("deposit", &self.deposit)
      .field("settings", &self.settings)
      .field("state", &self.state)
      .field("receipt", &self.receipt)
      .field("settlement_hash", &self.settlement_hash)
      .finish_non_exhaustive()
  }
}

impl<G: ChainGateway, N: NodeApi> Channel<G, N> {
  /// Open a channel: resume the existing one for (wallet, node) if the
  /// channel manager knows it, otherwise drive the full open sequence.
  ///
  /// Every step is a hard dependency: failure leaves no channel value
  /// behind and performs no rollback of a partially-approved allowance.
  pub async fn open(
    wallet: Wallet,
    gateway: G,
    node: N,
    deposit: U256,
    settings: ChannelConfig,
  ) -> Result<Self> {
    let metadata = node.channel_metadata().await?;
    let endpoints = ChannelEndpoints {
      node: metadata.node_address,
      token: metadata.token_address,
      channel_manager: metadata.channel_manager_address,
      network_fee: metadata.network_fee,
    };
    info!(
      node = %endpoints.node,
      token = %endpoints.token,
      manager = %endpoints.channel_manager,
      "Resolved channel endpoints"
    );

    let mut channel = Self {
      wallet,
      gateway,
      node,
      endpoints,
      deposit,
      settings,
      state: ChannelState::Probing,
      receipt: Receipt::default(),
      settlement_hash: None,
    };

    // Probing: does a channel to this node already exist?
    let existing = channel
      .gateway
      .call(
        &CallDescriptor::new(channel.endpoints.channel_manager, "getChannel")
          .arg(AbiType::Address, AbiValue::Address(channel.endpoints.node))
          .returns(AbiType::Uint(64))
          .returns(AbiType::uint256()),
      )
      .await?;
    let fields = existing.tuple()?;
    let channel_id = fields[0].uint()?;

    if channel_id > U256::ZERO {
      channel.resume_existing().await?;
    } else {
      channel.open_new().await?;
    }

    channel.state = ChannelState::Open;
    Ok(channel)
  }

  /// ResumingExisting: load the provider's last receipt (absence means
  /// zero usage) and transition to Open.
  async fn resume_existing(&mut self) -> Result<()> {
    debug!("Existing channel found, resuming");
    if let Some(receipt) = self.node.last_receipt(self.wallet.checksum_address()).await? {
      self.receipt = receipt;
    }
    info!(owed_dei = self.receipt.total(), "Resumed existing channel");
    Ok(())
  }

  /// OpeningNew: precondition checks, approval, open, confirmation
  /// events, provider sync.
  async fn open_new(&mut self) -> Result<()> {
    let owner = self.wallet.address();

    // Deposit must be covered before anything is approved.
    let balance = self
      .gateway
      .call(
        &CallDescriptor::new(self.endpoints.token, "balanceOf")
          .arg(AbiType::Address, AbiValue::Address(owner))
          .returns(AbiType::uint256()),
      )
      .await?
      .single()?
      .uint()?;
    if balance < self.deposit {
      return Err(ChannelError::InsufficientBalance {
        balance,
        deposit: self.deposit,
      });
    }

    // Approve the channel manager to pull the deposit.
    self
      .gateway
      .send(
        &CallDescriptor::new(self.endpoints.token, "approve")
          .arg(
            AbiType::Address,
            AbiValue::Address(self.endpoints.channel_manager),
          )
          .arg(AbiType::uint256(), AbiValue::Uint(self.deposit)),
        true,
      )
      .await?;

    // Wait for Approval scoped to this wallet and spender.
    let approval = EventDescriptor::new(self.endpoints.token, "Approval")
      .param(EventParam::indexed(AbiType::Address, AbiValue::Address(owner)))
      .param(EventParam::indexed(
        AbiType::Address,
        AbiValue::Address(self.endpoints.channel_manager),
      ))
      .param(EventParam::data(AbiType::uint256()));
    self
      .gateway
      .wait_for_event(
        &approval,
        self.settings.event_max_retries,
        self.event_poll_interval(),
      )
      .await?;

    // The mined receipt alone is not trusted: re-read the allowance.
    let allowance = self
      .gateway
      .call(
        &CallDescriptor::new(self.endpoints.token, "allowance")
          .arg(AbiType::Address, AbiValue::Address(owner))
          .arg(
            AbiType::Address,
            AbiValue::Address(self.endpoints.channel_manager),
          )
          .returns(AbiType::uint256()),
      )
      .await?
      .single()?
      .uint()?;
    if allowance < self.deposit {
      return Err(ChannelError::InsufficientAllowance {
        allowance,
        deposit: self.deposit,
      });
    }

    // Open the channel.
    self
      .gateway
      .send(
        &CallDescriptor::new(self.endpoints.channel_manager, "openChannel")
          .arg(AbiType::Address, AbiValue::Address(self.endpoints.node))
          .arg(AbiType::uint256(), AbiValue::Uint(self.deposit)),
        true,
      )
      .await?;

    // ChannelOpened carries its parties in the payload; the predicate
    // filters out channels opened by or to someone else.
    let node_address = self.endpoints.node;
    let opened = EventDescriptor::new(self.endpoints.channel_manager, "ChannelOpened")
      .param(EventParam::data(AbiType::Address))
      .param(EventParam::data(AbiType::Address))
      .param(EventParam::data(AbiType::uint256()))
      .param(EventParam::data(AbiType::Uint(64)))
      .matching(move |values| {
        matches!(values.first(), Some(AbiValue::Address(a)) if *a == owner)
          && matches!(values.get(1), Some(AbiValue::Address(a)) if *a == node_address)
      });
    self
      .gateway
      .wait_for_event(
        &opened,
        self.settings.event_max_retries,
        self.event_poll_interval(),
      )
      .await?;

    // Bounded wait for the provider to catch up with the open event.
    self.await_node_sync().await?;

    info!(deposit_dei = %self.deposit, "Channel opened");
    Ok(())
  }

  /// Poll the provider's sync status under the configured budget.
  async fn await_node_sync(&self) -> Result<()> {
    for attempt in 0..self.settings.sync_max_polls {
      if attempt > 0 {
        tokio::time::sleep(self.sync_poll_interval()).await;
      }
      if self.node.is_synced().await {
        return Ok(());
      }
      debug!(attempt, "Provider not yet synchronized");
    }
    Err(ChannelError::SyncTimeout {
      polls: self.settings.sync_max_polls,
    })
  }

  /// Run a metered query.
  ///
  /// Returns `Ok(None)`, without touching the network, when the
  /// channel is not Open, and when the provider rejects the request or
  /// omits the receipt header. On success the stored receipt is
  /// replaced wholesale by the one from the response header.
  pub async fn query(
    &mut self,
    endpoint: &str,
    params: &[(String, String)],
    options: &QueryOptions,
  ) -> Result<Option<QueryResult>> {
    if self.state != ChannelState::Open {
      debug!(state = ?self.state, "Query refused outside Open state");
      return Ok(None);
    }

    let request = QueryRequest {
      endpoint: endpoint.to_string(),
      model: options.model.clone(),
      params: params.to_vec(),
      address: self.wallet.checksum_address().to_string(),
      receipt_signature: self.receipt_signature()?,
    };

    let Some(reply) = self.node.query(&request).await? else {
      return Ok(None);
    };

    self.receipt = reply.receipt;

    let mut payload = reply.payload;
    for group in &mut payload.data {
      for point in group {
        let Some(metadata) = point.metadata.take() else {
          continue;
        };
        if !options.keep_metadata {
          continue; // stripped
        }
        let metadata = if options.verify_metadata {
          let value = point.value.clone().unwrap_or(Value::Null);
          let valid = crypto::verify_datapoint(
            &metadata.owner,
            &metadata.creation_date,
            &metadata.signature,
            &value,
          );
          if !valid {
            warn!(owner = %metadata.owner, "Datapoint signature did not verify");
          }
          crate::ports::node::DatapointMetadata {
            is_signature_valid: Some(valid),
            ..metadata
          }
        } else {
          metadata
        };
        point.metadata = Some(metadata);
      }
    }

    let body = serde_json::to_value(&payload)
      .map_err(|e| ChannelError::Node(format!("unserializable payload: {e}")))?;
    Ok(Some(QueryResult::new(body)))
  }

  /// Settle the channel on-chain with the latest receipt and the
  /// provider's closing signature, then transition to Settled.
  ///
  /// A channel with zero usage still owes the node its flat teardown
  /// fee: a minimal network-only receipt is synthesized for it.
  pub async fn settle(&mut self) -> Result<String> {
    if self.state != ChannelState::Open {
      return Err(ChannelError::ChannelNotOpen);
    }

    let closing = self
      .node
      .closing_signature(
        self.wallet.checksum_address(),
        self.receipt_signature()?,
      )
      .await?;

    if self.receipt.is_empty() {
      self.receipt = Receipt::network_only(self.endpoints.node, self.endpoints.network_fee);
    }

    let (addresses, values) = self.receipt.pack();
    let descriptor = CallDescriptor::new(self.endpoints.channel_manager, "settleChannel")
      .arg(AbiType::Address, AbiValue::Address(self.endpoints.node))
      .arg(
        AbiType::Array(Box::new(AbiType::Address)),
        AbiValue::Array(addresses.into_iter().map(AbiValue::Address).collect()),
      )
      .arg(
        AbiType::Array(Box::new(AbiType::uint256())),
        AbiValue::Array(
          values
            .into_iter()
            .map(|v| AbiValue::Uint(U256::from(v)))
            .collect(),
        ),
      )
      .arg(AbiType::Bytes, AbiValue::Bytes(closing));

    let hash = self.gateway.send(&descriptor, true).await?;

    self.state = ChannelState::Settled;
    self.settlement_hash = Some(hash.clone());
    info!(hash = %hash, "Channel settled");
    Ok(hash)
  }

  /// Total owed across all receipt categories, in dei. Purely derived.
  pub fn balance(&self) -> u128 {
    self.receipt.total()
  }

  pub fn state(&self) -> ChannelState {
    self.state
  }

  pub fn receipt(&self) -> &Receipt {
    &self.receipt
  }

  pub fn endpoints(&self) -> &ChannelEndpoints {
    &self.endpoints
  }

  pub fn wallet(&self) -> &Wallet {
    &self.wallet
  }

  /// Settlement transaction hash, once settled.
  pub fn settlement_hash(&self) -> Option<&str> {
    self.settlement_hash.as_deref()
  }

  /// Human-readable state line for terminal rendering.
  pub fn state_summary(&self) -> String {
    match self.state {
      ChannelState::Settled => format!(
        "Channel is closed\nTX hash is 0x{}",
        self.settlement_hash.as_deref().unwrap_or("<unknown>")
      ),
      _ => format!(
        "Channel opened for {}\nDeposit amount: DXN {}",
        self.wallet.checksum_address(),
        units::format_dxn(self.deposit)
      ),
    }
  }

  /// Human-readable per-beneficiary balance rendering.
  pub fn balance_summary(&self) -> String {
    let mut out = String::new();
    if !self.receipt.is_empty() {
      out.push_str("Latest balance:\n");
    }
    for (name, entries) in [
      ("Network", &self.receipt.network),
      ("Sellers", &self.receipt.sellers),
    ] {
      if entries.is_empty() {
        continue;
      }
      out.push_str(&format!("    {name}\n"));
      for (address, amount) in entries {
        out.push_str(&format!(
          "        DXN {:<6} -> {}\n",
          units::format_dxn(U256::from(*amount)),
          address.to_checksum(None)
        ));
      }
    }
    out.push_str(&format!(
      "Total:  DXN {:<6}",
      units::format_dxn(U256::from(self.balance()))
    ));
    out
  }

  /// Hex signature over the stored receipt, absent while it is empty.
  fn receipt_signature(&self) -> Result<Option<String>> {
    if self.receipt.is_empty() {
      return Ok(None);
    }
    let signature = crypto::sign_receipt(&self.wallet, &self.receipt)?;
    Ok(Some(format!(
      "0x{}",
      alloy::hex::encode(signature.as_bytes())
    )))
  }

  fn event_poll_interval(&self) -> Duration {
    Duration::from_millis(self.settings.event_poll_interval_ms)
  }

  fn sync_poll_interval(&self) -> Duration {
    Duration::from_millis(self.settings.sync_poll_interval_ms)
  }
}
