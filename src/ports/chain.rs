//! Chain Gateway Port - On-chain Interaction Interface
//!
//! Defines the trait for all read/write interaction with the blockchain
//! node, plus the descriptor types that name a contract call or event
//! in terms of the ABI codec's closed tag set. The gateway is injected
//! wherever chain access is needed; nothing looks it up ambiently.

use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::domain::abi::{self, AbiType, AbiValue, CallReturn};
use crate::error::Result;

/// A contract function invocation: target, name, typed arguments, and
/// the return tuple to decode.
#[derive(Debug, Clone)]
pub struct CallDescriptor {
  /// Target contract address.
  pub contract: Address,
  /// Function name (selector input together with the param types).
  pub function: String,
  /// Declared parameter types, in order.
  pub param_types: Vec<AbiType>,
  /// Argument values, position-aligned with `param_types`.
  pub args: Vec<AbiValue>,
  /// Declared return types; one entry decodes to a single value,
  /// several to an ordered tuple.
  pub return_types: Vec<AbiType>,
}

impl CallDescriptor {
  pub fn new(contract: Address, function: &str) -> Self {
    Self {
      contract,
      function: function.to_string(),
      param_types: Vec::new(),
      args: Vec::new(),
      return_types: Vec::new(),
    }
  }

  /// Append one typed argument.
  #[must_use]
  pub fn arg(mut self, ty: AbiType, value: AbiValue) -> Self {
    self.param_types.push(ty);
    self.args.push(value);
    self
  }

  /// Append one declared return type.
  #[must_use]
  pub fn returns(mut self, ty: AbiType) -> Self {
    self.return_types.push(ty);
    self
  }

  /// Canonical signature string for selector computation and logging.
  pub fn signature(&self) -> String {
    abi::function_signature(&self.function, &self.param_types)
  }
}

/// One event parameter: its type, whether it is indexed, and (for
/// indexed parameters) an optional concrete value to filter on.
#[derive(Debug, Clone)]
pub struct EventParam {
  pub ty: AbiType,
  pub indexed: bool,
  pub filter: Option<AbiValue>,
}

impl EventParam {
  /// Indexed parameter constrained to a concrete value (becomes a
  /// topic in the log filter).
  pub fn indexed(ty: AbiType, value: AbiValue) -> Self {
    Self {
      ty,
      indexed: true,
      filter: Some(value),
    }
  }

  /// Non-indexed parameter, decoded from the log payload.
  pub fn data(ty: AbiType) -> Self {
    Self {
      ty,
      indexed: false,
      filter: None,
    }
  }
}

/// Accepts or rejects a decoded event payload. Used to disambiguate
/// events that share a selector but concern different parties.
pub type EventPredicate = Box<dyn Fn(&[AbiValue]) -> bool + Send + Sync>;

/// An event to wait for: target contract, full signature (indexed and
/// non-indexed parameters in declaration order), topic filters, and an
/// optional payload predicate.
pub struct EventDescriptor {
  pub contract: Address,
  pub name: String,
  pub params: Vec<EventParam>,
  pub predicate: Option<EventPredicate>,
}

impl EventDescriptor {
  pub fn new(contract: Address, name: &str) -> Self {
    Self {
      contract,
      name: name.to_string(),
      params: Vec::new(),
      predicate: None,
    }
  }

  /// Append one parameter in declaration order.
  #[must_use]
  pub fn param(mut self, param: EventParam) -> Self {
    self.params.push(param);
    self
  }

  /// Only accept log entries whose decoded payload satisfies `pred`.
  #[must_use]
  pub fn matching(
    mut self,
    pred: impl Fn(&[AbiValue]) -> bool + Send + Sync + 'static,
  ) -> Self {
    self.predicate = Some(Box::new(pred));
    self
  }

  /// Canonical signature string: selector input for topic0.
  pub fn signature(&self) -> String {
    let types: Vec<AbiType> = self.params.iter().map(|p| p.ty.clone()).collect();
    abi::function_signature(&self.name, &types)
  }

  /// Types of the non-indexed parameters, in order: the payload tuple.
  pub fn data_types(&self) -> Vec<AbiType> {
    self
      .params
      .iter()
      .filter(|p| !p.indexed)
      .map(|p| p.ty.clone())
      .collect()
  }
}

impl std::fmt::Debug for EventDescriptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EventDescriptor")
      .field("contract", &self.contract)
      .field("name", &self.name)
      .field("params", &self.params)
      .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
      .finish()
  }
}

/// Trait for on-chain reads, writes, and confirmation waits.
///
/// `send` takes an explicit `verify` flag with no default: a call site
/// either waits for the mined receipt or deliberately reconciles the
/// outcome through a later state read.
#[async_trait]
pub trait ChainGateway: Send + Sync {
  /// Read-only call: encode, estimate gas, submit, decode.
  /// Never mutates chain state.
  async fn call(&self, descriptor: &CallDescriptor) -> Result<CallReturn>;

  /// State-changing transaction: pending nonce, gas estimation, local
  /// signing, raw submission. Returns the lowercase hex transaction
  /// hash without a `0x` prefix. With `verify`, blocks until mined and
  /// fails on reverted execution status.
  async fn send(&self, descriptor: &CallDescriptor, verify: bool) -> Result<String>;

  /// Block until a log entry matches the descriptor, polling at a
  /// fixed interval for at most `max_retries` rounds. No backoff: the
  /// worst case is exactly `max_retries x poll_interval`.
  async fn wait_for_event(
    &self,
    descriptor: &EventDescriptor,
    max_retries: u32,
    poll_interval: Duration,
  ) -> Result<Vec<AbiValue>>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_call_descriptor_signature() {
    let descriptor = CallDescriptor::new(Address::ZERO, "approve")
      .arg(AbiType::Address, AbiValue::Address(Address::ZERO))
      .arg(AbiType::uint256(), AbiValue::Uint(Default::default()))
      .returns(AbiType::Bool);
    assert_eq!(descriptor.signature(), "approve(address,uint256)");
    assert_eq!(descriptor.param_types.len(), descriptor.args.len());
  }

  #[test]
  fn test_event_descriptor_splits_indexed_and_data() {
    let descriptor = EventDescriptor::new(Address::ZERO, "Approval")
      .param(EventParam::indexed(
        AbiType::Address,
        AbiValue::Address(Address::ZERO),
      ))
      .param(EventParam::indexed(
        AbiType::Address,
        AbiValue::Address(Address::ZERO),
      ))
      .param(EventParam::data(AbiType::uint256()));

    assert_eq!(descriptor.signature(), "Approval(address,address,uint256)");
    assert_eq!(descriptor.data_types(), vec![AbiType::uint256()]);
  }
}
