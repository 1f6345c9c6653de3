//! Chain Gateway - Calls, Transactions, and Event Waits
//!
//! Implements the `ChainGateway` port on alloy-rs 0.9: read-only calls
//! through `eth_call`, state changes through locally signed raw
//! transactions, and confirmation waits through bounded fixed-interval
//! polling of `eth_getLogs`. Calldata is built by the domain ABI codec;
//! nothing here re-implements encoding.

use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{B256, Bytes, keccak256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, TransactionRequest};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::abi::{self, AbiType, AbiValue, CallReturn};
use crate::domain::wallet::Wallet;
use crate::error::{ChannelError, Result};
use crate::ports::chain::{CallDescriptor, ChainGateway, EventDescriptor};

use super::provider::RpcConnection;

/// `ChainGateway` implementation over a shared RPC connection.
pub struct EthGateway {
    connection: Arc<RpcConnection>,
    wallet: Wallet,
    /// Network wallet derived from the payer key, used to sign
    /// transaction envelopes.
    tx_signer: EthereumWallet,
    /// How many blocks behind the head event filters start scanning.
    lookback_blocks: u64,
}

impl EthGateway {
    pub fn new(connection: Arc<RpcConnection>, wallet: Wallet, lookback_blocks: u64) -> Self {
        let tx_signer = EthereumWallet::from(wallet.signer().clone());
        Self {
            connection,
            wallet,
            tx_signer,
            lookback_blocks,
        }
    }

    /// Unsigned request skeleton shared by calls and sends.
    fn request_for(&self, descriptor: &CallDescriptor) -> Result<TransactionRequest> {
        let calldata =
            abi::encode_call(&descriptor.function, &descriptor.param_types, &descriptor.args)?;
        Ok(TransactionRequest::default()
            .with_from(self.wallet.address())
            .with_to(descriptor.contract)
            .with_input(Bytes::from(calldata)))
    }
}

fn rpc_err(e: impl std::fmt::Display) -> ChannelError {
    ChannelError::Rpc(e.to_string())
}

#[async_trait]
impl ChainGateway for EthGateway {
    #[instrument(skip_all, fields(function = %descriptor.function))]
    async fn call(&self, descriptor: &CallDescriptor) -> Result<CallReturn> {
        let provider = self.connection.inner();
        let tx = self.request_for(descriptor)?;

        let _gas = provider.estimate_gas(&tx).await.map_err(rpc_err)?;
        let raw = provider.call(&tx).await.map_err(rpc_err)?;
        let decoded = abi::decode_returns(&descriptor.return_types, &raw)?;

        debug!(signature = %descriptor.signature(), "CALL");
        Ok(decoded)
    }

    #[instrument(skip_all, fields(function = %descriptor.function, verify))]
    async fn send(&self, descriptor: &CallDescriptor, verify: bool) -> Result<String> {
        let provider = self.connection.inner();

        let nonce = provider
            .get_transaction_count(self.wallet.address())
            .pending()
            .await
            .map_err(rpc_err)?;
        let gas_price = provider.get_gas_price().await.map_err(rpc_err)?;

        let mut tx = self
            .request_for(descriptor)?
            .with_nonce(nonce)
            .with_gas_price(gas_price)
            .with_chain_id(self.connection.chain_id());
        let gas = provider.estimate_gas(&tx).await.map_err(rpc_err)?;
        tx = tx.with_gas_limit(gas);

        let envelope = tx
            .build(&self.tx_signer)
            .await
            .map_err(|e| ChannelError::Wallet(format!("transaction signing failed: {e}")))?;
        let pending = provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await
            .map_err(rpc_err)?;
        let hash = format!("{:x}", pending.tx_hash());

        debug!(signature = %descriptor.signature(), hash = %hash, "SEND");

        if verify {
            let receipt = pending
                .get_receipt()
                .await
                .map_err(|e| ChannelError::Rpc(format!("waiting for receipt: {e}")))?;
            if !receipt.status() {
                return Err(ChannelError::TransactionReverted { hash });
            }
        }

        Ok(hash)
    }

    #[instrument(skip_all, fields(event = %descriptor.name, max_retries))]
    async fn wait_for_event(
        &self,
        descriptor: &EventDescriptor,
        max_retries: u32,
        poll_interval: Duration,
    ) -> Result<Vec<AbiValue>> {
        // A zero budget fails before any RPC or sleep.
        if max_retries == 0 {
            return Err(ChannelError::EventTimeout {
                event: descriptor.name.clone(),
                retries: 0,
            });
        }

        let provider = self.connection.inner();
        let head = provider.get_block_number().await.map_err(rpc_err)?;
        let filter = build_filter(descriptor, head.saturating_sub(self.lookback_blocks))?;

        for attempt in 0..max_retries {
            if attempt > 0 {
                tokio::time::sleep(poll_interval).await;
            }

            let logs = provider.get_logs(&filter).await.map_err(rpc_err)?;
            for log in &logs {
                if let Some(decoded) = match_log(descriptor, &log.inner.data.data)? {
                    debug!(attempt, "event observed");
                    return Ok(decoded);
                }
            }
        }

        Err(ChannelError::EventTimeout {
            event: descriptor.name.clone(),
            retries: max_retries,
        })
    }
}

/// Log filter for an event descriptor: contract address, topic0 from
/// the full signature, and one topic per constrained indexed parameter.
fn build_filter(descriptor: &EventDescriptor, from_block: u64) -> Result<Filter> {
    let topic0 = abi::event_selector(&descriptor.signature());
    let mut filter = Filter::new()
        .address(descriptor.contract)
        .event_signature(topic0)
        .from_block(from_block);

    let indexed: Vec<&crate::ports::chain::EventParam> =
        descriptor.params.iter().filter(|p| p.indexed).collect();
    for (position, param) in indexed.iter().enumerate().take(3) {
        let Some(value) = &param.filter else { continue };
        let topic = topic_value(&param.ty, value)?;
        filter = match position {
            0 => filter.topic1(topic),
            1 => filter.topic2(topic),
            _ => filter.topic3(topic),
        };
    }

    Ok(filter)
}

/// 32-byte topic for an indexed argument: fixed-width values are
/// word-padded, everything else is keccak-hashed per the log
/// convention.
fn topic_value(ty: &AbiType, value: &AbiValue) -> Result<B256> {
    match (ty, value) {
        (AbiType::Address | AbiType::Uint(_) | AbiType::Bool, _) => {
            let word = abi::encode_params(std::slice::from_ref(ty), std::slice::from_ref(value))?;
            Ok(B256::from_slice(&word))
        }
        (AbiType::Bytes, AbiValue::Bytes(bytes)) => Ok(keccak256(bytes)),
        (
            AbiType::Array(elem) | AbiType::FixedArray(elem, _),
            AbiValue::Array(items),
        ) => {
            let types: Vec<AbiType> = items.iter().map(|_| (**elem).clone()).collect();
            let encoded = abi::encode_params(&types, items)?;
            Ok(keccak256(&encoded))
        }
        (ty, value) => Err(ChannelError::Encoding(format!(
            "cannot derive a topic from {value:?} as {ty}"
        ))),
    }
}

/// Decode a matching log's payload and apply the descriptor's
/// predicate. `None` means the entry concerns someone else.
fn match_log(descriptor: &EventDescriptor, data: &[u8]) -> Result<Option<Vec<AbiValue>>> {
    let data_types = descriptor.data_types();
    let decoded = if data_types.is_empty() {
        Vec::new()
    } else {
        abi::decode_params(&data_types, data)?
    };

    if let Some(predicate) = &descriptor.predicate {
        if !predicate(&decoded) {
            return Ok(None);
        }
    }

    Ok(Some(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::providers::ProviderBuilder;
    use crate::ports::chain::EventParam;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    /// Gateway over a provider that is never awaited against the
    /// network; only offline paths are exercised.
    fn offline_gateway() -> EthGateway {
        let provider = ProviderBuilder::new().on_http("http://127.0.0.1:1".parse().unwrap()).boxed();
        let connection = Arc::new(RpcConnection::from_parts(Arc::new(provider), 1));
        EthGateway::new(connection, Wallet::random(), 128)
    }

    fn approval_descriptor(owner: Address, spender: Address) -> EventDescriptor {
        EventDescriptor::new(addr(0x70), "Approval")
            .param(EventParam::indexed(AbiType::Address, AbiValue::Address(owner)))
            .param(EventParam::indexed(
                AbiType::Address,
                AbiValue::Address(spender),
            ))
            .param(EventParam::data(AbiType::uint256()))
    }

    #[tokio::test]
    async fn test_zero_retry_budget_times_out_immediately() {
        let gateway = offline_gateway();
        let descriptor = approval_descriptor(addr(0x01), addr(0x02));

        let started = std::time::Instant::now();
        let err = gateway
            .wait_for_event(&descriptor, 0, Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ChannelError::EventTimeout { retries: 0, .. }
        ));
        // No sleep, no RPC: this returns in well under a poll interval.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_build_filter_sets_topics_for_indexed_filters() {
        let owner = addr(0x01);
        let spender = addr(0x02);
        let filter = build_filter(&approval_descriptor(owner, spender), 100).unwrap();

        let topic0 = abi::event_selector("Approval(address,address,uint256)");
        assert!(filter.topics[0].matches(&topic0));

        let mut owner_word = [0u8; 32];
        owner_word[12..].copy_from_slice(owner.as_slice());
        let mut spender_word = [0u8; 32];
        spender_word[12..].copy_from_slice(spender.as_slice());
        assert!(filter.topics[1].matches(&B256::from(owner_word)));
        assert!(filter.topics[2].matches(&B256::from(spender_word)));
        // A topic for a different owner must not slip through.
        assert!(!filter.topics[1].matches(&B256::from(spender_word)));
    }

    #[test]
    fn test_match_log_decodes_payload() {
        let descriptor = approval_descriptor(addr(0x01), addr(0x02));
        let data = U256::from(500u64).to_be_bytes::<32>();

        let decoded = match_log(&descriptor, &data).unwrap().unwrap();
        assert_eq!(decoded, vec![AbiValue::Uint(U256::from(500u64))]);
    }

    #[test]
    fn test_match_log_predicate_rejects_other_parties() {
        let wanted = addr(0x0a);
        let descriptor = EventDescriptor::new(addr(0x70), "ChannelOpened")
            .param(EventParam::data(AbiType::Address))
            .param(EventParam::data(AbiType::Address))
            .param(EventParam::data(AbiType::uint256()))
            .param(EventParam::data(AbiType::Uint(64)))
            .matching(move |values| {
                matches!(values.first(), Some(AbiValue::Address(a)) if *a == wanted)
            });

        let encode = |sender: Address| {
            abi::encode_params(
                &[
                    AbiType::Address,
                    AbiType::Address,
                    AbiType::uint256(),
                    AbiType::Uint(64),
                ],
                &[
                    AbiValue::Address(sender),
                    AbiValue::Address(addr(0x0b)),
                    AbiValue::Uint(U256::from(1u64)),
                    AbiValue::Uint(U256::from(7u64)),
                ],
            )
            .unwrap()
        };

        assert!(match_log(&descriptor, &encode(addr(0x0a))).unwrap().is_some());
        assert!(match_log(&descriptor, &encode(addr(0xcc))).unwrap().is_none());
    }

    #[test]
    fn test_topic_value_hashes_dynamic_types() {
        let padded = topic_value(&AbiType::uint256(), &AbiValue::Uint(U256::from(9u64))).unwrap();
        assert_eq!(padded, B256::from(U256::from(9u64).to_be_bytes::<32>()));

        let hashed = topic_value(&AbiType::Bytes, &AbiValue::Bytes(b"abc".to_vec())).unwrap();
        assert_eq!(hashed, keccak256(b"abc"));
    }
}
