//! Error Taxonomy - Channel Protocol Failure Modes
//!
//! Every fallible library operation returns `ChannelError`. Provider
//! HTTP failures on read-only query paths surface as `Ok(None)`, not as
//! errors; signature mismatches on datapoint metadata are boolean
//! flags. The payer may still want flagged-unverified data.

use alloy::primitives::U256;
use thiserror::Error;

/// Failure modes of the channel protocol.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// ABI parameter did not match its declared type tag or range.
    /// Programming error, never retried.
    #[error("abi encoding failed: {0}")]
    Encoding(String),

    /// Raw return payload shorter or malformed versus the declared tuple.
    #[error("abi decoding failed: {0}")]
    Decoding(String),

    /// Transport or node-side failure on a chain read/write.
    /// Surfaced immediately; this layer does not retry.
    #[error("rpc request failed: {0}")]
    Rpc(String),

    /// On-chain execution failed for a transaction submitted with
    /// verification requested. Fatal to the calling operation.
    #[error("transaction 0x{hash} reverted on-chain")]
    TransactionReverted { hash: String },

    /// Confirmation event not observed within the fixed-interval retry
    /// budget. The caller decides whether to retry the whole attempt.
    #[error("event {event} not observed after {retries} polls")]
    EventTimeout { event: String, retries: u32 },

    /// Token balance below the requested channel deposit.
    #[error("deposit {deposit} dei exceeds token balance {balance} dei")]
    InsufficientBalance { balance: U256, deposit: U256 },

    /// Allowance granted to the channel manager does not cover the
    /// deposit even after the approval transaction confirmed.
    #[error("deposit {deposit} dei exceeds approved allowance {allowance} dei")]
    InsufficientAllowance { allowance: U256, deposit: U256 },

    /// Query or settlement attempted outside the Open state.
    #[error("channel is not open")]
    ChannelNotOpen,

    /// Provider never reported synchronized after the on-chain open
    /// confirmed. The poll budget comes from configuration.
    #[error("node sync status not ok after {polls} polls")]
    SyncTimeout { polls: u32 },

    /// Provider failure on a path that must not be silently absorbed
    /// (metadata at construction, closing signature at settlement).
    #[error("node request failed: {0}")]
    Node(String),

    /// Keystore decryption or signing failure.
    #[error("wallet error: {0}")]
    Wallet(String),
}

/// Convenience alias used across ports, adapters, and usecases.
pub type Result<T> = std::result::Result<T, ChannelError>;
