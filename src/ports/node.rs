//! Node API Port - Provider HTTP Boundary
//!
//! Defines the trait for every interaction with the data provider's
//! HTTP API, plus the wire types those endpoints exchange. The payment
//! protocol rides on headers: the payer identifies itself with
//! `X-DX-Address`, authorizes with `X-DX-Signature`, and the provider
//! returns the refreshed receipt in `X-DX-PleasePay`.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::receipt::Receipt;
use crate::error::Result;

/// Contract addresses and fee quote served by the metadata endpoint.
/// Fetched once at channel construction; immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelMetadata {
  /// The provider's on-chain identity (channel counterparty).
  pub node_address: Address,
  /// Fungible token contract backing deposits.
  pub token_address: Address,
  /// Channel manager contract.
  pub channel_manager_address: Address,
  /// Flat network fee in dei, owed even on zero-usage settlement.
  pub network_fee: u128,
}

/// Seller attestation attached to a datapoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatapointMetadata {
  /// Seller address that must recover from the signature.
  pub owner: String,
  /// ISO-8601 creation timestamp (signed as epoch milliseconds).
  pub creation_date: String,
  /// Base64-encoded DER (v, r, s) signature.
  pub signature: String,
  /// Set by the client when verification was requested; never sent by
  /// the provider.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_signature_valid: Option<bool>,
}

/// One record inside a query response group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metadata: Option<DatapointMetadata>,
  /// Whatever else the provider attaches to a record.
  #[serde(flatten)]
  pub extra: serde_json::Map<String, Value>,
}

/// Parsed query response body: groups of datapoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
  pub data: Vec<Vec<Datapoint>>,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, Value>,
}

/// An outbound metered query plus the payment artifacts authorizing it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
  /// Path below the provider base URL, e.g. `techindustry/organizations`.
  pub endpoint: String,
  /// Data model the query runs against.
  pub model: String,
  /// Caller-supplied query parameters.
  pub params: Vec<(String, String)>,
  /// Checksummed payer address for `X-DX-Address`.
  pub address: String,
  /// Hex signature over the last receipt for `X-DX-Signature`;
  /// absent before the first paid query.
  pub receipt_signature: Option<String>,
}

/// A successful query: the superseding receipt from the response header
/// and the parsed body.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryReply {
  pub receipt: Receipt,
  pub payload: QueryPayload,
}

/// Trait for the provider's HTTP surface.
///
/// Query-path failures (non-2xx, missing receipt header) are `Ok(None)`
/// by contract; a flaky provider must not kill a long-running client.
/// Lifecycle paths (metadata, receipt fetch, closing signature) fail
/// loudly instead.
#[async_trait]
pub trait NodeApi: Send + Sync {
  /// Resolve contract addresses and the fee schedule.
  async fn channel_metadata(&self) -> Result<ChannelMetadata>;

  /// Latest receipt the provider knows for this payer.
  /// `None` means zero usage so far, not an error.
  async fn last_receipt(&self, address: &str) -> Result<Option<Receipt>>;

  /// Run a metered query. `Ok(None)` when the provider rejects the
  /// request or omits the receipt header.
  async fn query(&self, request: &QueryRequest) -> Result<Option<QueryReply>>;

  /// The provider's settlement authorization over the current receipt
  /// (raw signature bytes, decoded from un-prefixed hex).
  async fn closing_signature(
    &self,
    address: &str,
    receipt_signature: Option<String>,
  ) -> Result<Vec<u8>>;

  /// Whether the provider reports itself caught up with the chain.
  async fn is_synced(&self) -> bool;
}
