//! ABI Codec - Deterministic Contract Call Encoding
//!
//! Word-aligned parameter encoding and decoding for the fixed contract
//! ABI convention: static values inline, dynamic values referenced by
//! offset from the tuple start (offset + length + elements).
//!
//! The tag set is closed. A mis-typed or out-of-range argument fails
//! here as an `Encoding` error before anything reaches the wire.

use alloy::primitives::{Address, B256, U256, keccak256};

use crate::error::{ChannelError, Result};

/// Closed set of parameter type tags understood by the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    /// 20-byte account address, left-padded to a word.
    Address,
    /// Unsigned integer of the given bit width (8..=256, multiple of 8).
    Uint(usize),
    /// Boolean, encoded as uint8 in a full word.
    Bool,
    /// Dynamic byte string.
    Bytes,
    /// Dynamic array of statically-sized elements.
    Array(Box<AbiType>),
    /// Fixed-size array of statically-sized elements. Encoded as plain
    /// concatenation, which is what makes the receipt signer's packed
    /// emulation byte-exact.
    FixedArray(Box<AbiType>, usize),
}

impl AbiType {
    /// Shorthand for `uint256`, the width every amount on this chain uses.
    pub const fn uint256() -> Self {
        Self::Uint(256)
    }

    /// Whether the encoding of this type lives in the tail section.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Address | Self::Uint(_) | Self::Bool => false,
            Self::Bytes | Self::Array(_) => true,
            Self::FixedArray(elem, _) => elem.is_dynamic(),
        }
    }

    /// Bytes this type occupies in the head section.
    fn head_size(&self) -> usize {
        if self.is_dynamic() {
            return 32;
        }
        match self {
            Self::FixedArray(elem, n) => elem.head_size() * n,
            _ => 32,
        }
    }
}

impl std::fmt::Display for AbiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address => write!(f, "address"),
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Bool => write!(f, "bool"),
            Self::Bytes => write!(f, "bytes"),
            Self::Array(elem) => write!(f, "{elem}[]"),
            Self::FixedArray(elem, n) => write!(f, "{elem}[{n}]"),
        }
    }
}

/// A typed argument or decoded return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
    Bool(bool),
    Bytes(Vec<u8>),
    Array(Vec<AbiValue>),
}

impl AbiValue {
    /// Extract an unsigned integer, or fail with a decoding error.
    pub fn uint(&self) -> Result<U256> {
        match self {
            Self::Uint(v) => Ok(*v),
            other => Err(ChannelError::Decoding(format!(
                "expected uint value, got {other:?}"
            ))),
        }
    }

    /// Extract an address, or fail with a decoding error.
    pub fn address(&self) -> Result<Address> {
        match self {
            Self::Address(a) => Ok(*a),
            other => Err(ChannelError::Decoding(format!(
                "expected address value, got {other:?}"
            ))),
        }
    }
}

/// Decoded return shape of a contract call.
///
/// A one-element return tuple is unwrapped to `Single`; anything else
/// stays a `Tuple`. Call sites of the chain gateway depend on this
/// asymmetry, so it is a sum type rather than a silent unwrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReturn {
    Single(AbiValue),
    Tuple(Vec<AbiValue>),
}

impl CallReturn {
    /// The single decoded value of a one-return-type call.
    pub fn single(self) -> Result<AbiValue> {
        match self {
            Self::Single(v) => Ok(v),
            Self::Tuple(vs) => Err(ChannelError::Decoding(format!(
                "expected a single return value, got a {}-tuple",
                vs.len()
            ))),
        }
    }

    /// The ordered decoded values of a multi-return-type call.
    pub fn tuple(self) -> Result<Vec<AbiValue>> {
        match self {
            Self::Tuple(vs) => Ok(vs),
            Self::Single(v) => Err(ChannelError::Decoding(format!(
                "expected a return tuple, got single value {v:?}"
            ))),
        }
    }
}

/// Canonical `"name(type,type,...)"` signature string.
pub fn function_signature(name: &str, types: &[AbiType]) -> String {
    let args = types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}({args})")
}

/// First four bytes of the keccak256 hash of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Full 32-byte keccak256 hash of an event signature (log topic0).
pub fn event_selector(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Selector plus tuple-encoded parameters: complete calldata.
pub fn encode_call(name: &str, types: &[AbiType], values: &[AbiValue]) -> Result<Vec<u8>> {
    let sig = function_signature(name, types);
    let mut data = selector(&sig).to_vec();
    data.extend_from_slice(&encode_params(types, values)?);
    Ok(data)
}

/// Tuple-encode a parameter list (head section, then tail section).
pub fn encode_params(types: &[AbiType], values: &[AbiValue]) -> Result<Vec<u8>> {
    if types.len() != values.len() {
        return Err(ChannelError::Encoding(format!(
            "{} type tags for {} values",
            types.len(),
            values.len()
        )));
    }
    for (ty, value) in types.iter().zip(values) {
        check_value(ty, value)?;
    }

    let head_len: usize = types.iter().map(AbiType::head_size).sum();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for (ty, value) in types.iter().zip(values) {
        if ty.is_dynamic() {
            let offset = head_len + tail.len();
            head.extend_from_slice(&U256::from(offset).to_be_bytes::<32>());
            encode_tail(ty, value, &mut tail);
        } else {
            encode_static(ty, value, &mut head);
        }
    }

    head.extend_from_slice(&tail);
    Ok(head)
}

/// Decode a raw payload against an ordered list of types.
pub fn decode_params(types: &[AbiType], raw: &[u8]) -> Result<Vec<AbiValue>> {
    let mut values = Vec::with_capacity(types.len());
    let mut cursor = 0usize;

    for ty in types {
        if ty.is_dynamic() {
            let offset = read_offset(raw, cursor)?;
            values.push(decode_tail(ty, raw, offset)?);
            cursor += 32;
        } else {
            let size = ty.head_size();
            values.push(decode_static(ty, raw, cursor)?);
            cursor += size;
        }
    }

    Ok(values)
}

/// Decode a call's return payload, unwrapping one-element tuples.
pub fn decode_returns(types: &[AbiType], raw: &[u8]) -> Result<CallReturn> {
    let mut values = decode_params(types, raw)?;
    if types.len() == 1 {
        Ok(CallReturn::Single(values.remove(0)))
    } else {
        Ok(CallReturn::Tuple(values))
    }
}

/// Validate a value against its declared type tag before any byte is
/// written. Range violations and shape mismatches are `Encoding` errors.
fn check_value(ty: &AbiType, value: &AbiValue) -> Result<()> {
    match (ty, value) {
        (AbiType::Address, AbiValue::Address(_))
        | (AbiType::Bool, AbiValue::Bool(_))
        | (AbiType::Bytes, AbiValue::Bytes(_)) => Ok(()),
        (AbiType::Uint(bits), AbiValue::Uint(v)) => {
            if *bits == 0 || *bits > 256 || bits % 8 != 0 {
                return Err(ChannelError::Encoding(format!(
                    "invalid uint width {bits}"
                )));
            }
            if v.bit_len() > *bits {
                return Err(ChannelError::Encoding(format!(
                    "value {v} exceeds uint{bits} range"
                )));
            }
            Ok(())
        }
        (AbiType::Array(elem), AbiValue::Array(items)) => {
            check_element_type(elem)?;
            items.iter().try_for_each(|item| check_value(elem, item))
        }
        (AbiType::FixedArray(elem, n), AbiValue::Array(items)) => {
            check_element_type(elem)?;
            if items.len() != *n {
                return Err(ChannelError::Encoding(format!(
                    "fixed array {ty} given {} elements",
                    items.len()
                )));
            }
            items.iter().try_for_each(|item| check_value(elem, item))
        }
        (ty, value) => Err(ChannelError::Encoding(format!(
            "value {value:?} does not match declared type {ty}"
        ))),
    }
}

fn check_element_type(elem: &AbiType) -> Result<()> {
    if elem.is_dynamic() {
        return Err(ChannelError::Encoding(format!(
            "array elements must be statically sized, got {elem}"
        )));
    }
    Ok(())
}

/// Append the word-aligned encoding of a statically-sized value.
/// Values are assumed checked.
fn encode_static(ty: &AbiType, value: &AbiValue, out: &mut Vec<u8>) {
    match (ty, value) {
        (AbiType::Address, AbiValue::Address(addr)) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(addr.as_slice());
            out.extend_from_slice(&word);
        }
        (AbiType::Uint(_), AbiValue::Uint(v)) => {
            out.extend_from_slice(&v.to_be_bytes::<32>());
        }
        (AbiType::Bool, AbiValue::Bool(b)) => {
            let mut word = [0u8; 32];
            word[31] = u8::from(*b);
            out.extend_from_slice(&word);
        }
        (AbiType::FixedArray(elem, _), AbiValue::Array(items)) => {
            for item in items {
                encode_static(elem, item, out);
            }
        }
        // check_value has already rejected every other combination
        _ => unreachable!("encode_static called with unchecked value"),
    }
}

/// Append the tail encoding (length + padded contents) of a dynamic value.
fn encode_tail(ty: &AbiType, value: &AbiValue, out: &mut Vec<u8>) {
    match (ty, value) {
        (AbiType::Bytes, AbiValue::Bytes(bytes)) => {
            out.extend_from_slice(&U256::from(bytes.len()).to_be_bytes::<32>());
            out.extend_from_slice(bytes);
            let rem = bytes.len() % 32;
            if rem != 0 {
                out.extend(std::iter::repeat_n(0u8, 32 - rem));
            }
        }
        (AbiType::Array(elem), AbiValue::Array(items)) => {
            out.extend_from_slice(&U256::from(items.len()).to_be_bytes::<32>());
            for item in items {
                encode_static(elem, item, out);
            }
        }
        _ => unreachable!("encode_tail called with unchecked value"),
    }
}

fn word(raw: &[u8], at: usize) -> Result<&[u8]> {
    raw.get(at..at + 32).ok_or_else(|| {
        ChannelError::Decoding(format!(
            "payload truncated: need word at byte {at}, have {} bytes",
            raw.len()
        ))
    })
}

fn read_offset(raw: &[u8], at: usize) -> Result<usize> {
    let v = U256::from_be_slice(word(raw, at)?);
    u64::try_from(v)
        .ok()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ChannelError::Decoding(format!("offset {v} out of range")))
}

fn decode_static(ty: &AbiType, raw: &[u8], at: usize) -> Result<AbiValue> {
    match ty {
        AbiType::Address => {
            let w = word(raw, at)?;
            Ok(AbiValue::Address(Address::from_slice(&w[12..])))
        }
        AbiType::Uint(_) => Ok(AbiValue::Uint(U256::from_be_slice(word(raw, at)?))),
        AbiType::Bool => Ok(AbiValue::Bool(word(raw, at)?[31] != 0)),
        AbiType::FixedArray(elem, n) => {
            let size = elem.head_size();
            let items = (0..*n)
                .map(|i| decode_static(elem, raw, at + i * size))
                .collect::<Result<Vec<_>>>()?;
            Ok(AbiValue::Array(items))
        }
        AbiType::Bytes | AbiType::Array(_) => Err(ChannelError::Decoding(format!(
            "{ty} is not statically sized"
        ))),
    }
}

fn decode_tail(ty: &AbiType, raw: &[u8], at: usize) -> Result<AbiValue> {
    match ty {
        AbiType::Bytes => {
            let len = read_offset(raw, at)?;
            let data = raw.get(at + 32..at + 32 + len).ok_or_else(|| {
                ChannelError::Decoding(format!(
                    "bytes tail truncated: {len} bytes declared at byte {at}"
                ))
            })?;
            Ok(AbiValue::Bytes(data.to_vec()))
        }
        AbiType::Array(elem) => {
            let len = read_offset(raw, at)?;
            let size = elem.head_size();
            let items = (0..len)
                .map(|i| decode_static(elem, raw, at + 32 + i * size))
                .collect::<Result<Vec<_>>>()?;
            Ok(AbiValue::Array(items))
        }
        _ => Err(ChannelError::Decoding(format!("{ty} has no tail encoding"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_selector_known_vectors() {
        // Canonical ERC-20 selectors
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(
            selector("allowance(address,address)"),
            [0xdd, 0x62, 0xed, 0x3e]
        );
    }

    #[test]
    fn test_selector_is_pure() {
        let sig = function_signature(
            "settleChannel",
            &[
                AbiType::Address,
                AbiType::Array(Box::new(AbiType::Address)),
                AbiType::Array(Box::new(AbiType::uint256())),
                AbiType::Bytes,
            ],
        );
        assert_eq!(sig, "settleChannel(address,address[],uint256[],bytes)");
        assert_eq!(selector(&sig), selector(&sig));
    }

    #[test]
    fn test_event_selector_known_vector() {
        // ERC-20 Approval topic0
        let topic = event_selector("Approval(address,address,uint256)");
        assert_eq!(
            format!("{topic:x}"),
            "8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925"
        );
    }

    #[test]
    fn test_encode_balance_of_calldata() {
        let owner = addr(0x11);
        let data = encode_call(
            "balanceOf",
            &[AbiType::Address],
            &[AbiValue::Address(owner)],
        )
        .unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], owner.as_slice());
    }

    #[test]
    fn test_encode_dynamic_offsets() {
        // (address, address[], uint256[], bytes): the settlement shape.
        let types = [
            AbiType::Address,
            AbiType::Array(Box::new(AbiType::Address)),
            AbiType::Array(Box::new(AbiType::uint256())),
            AbiType::Bytes,
        ];
        let values = [
            AbiValue::Address(addr(0xaa)),
            AbiValue::Array(vec![AbiValue::Address(addr(0xbb))]),
            AbiValue::Array(vec![AbiValue::Uint(U256::from(7u64))]),
            AbiValue::Bytes(vec![0xde, 0xad]),
        ];
        let enc = encode_params(&types, &values).unwrap();

        // Head: 4 words. Tails start at 128.
        assert_eq!(U256::from_be_slice(&enc[32..64]), U256::from(128u64));
        // address[] tail: length word + one element = 64 bytes.
        assert_eq!(U256::from_be_slice(&enc[64..96]), U256::from(192u64));
        assert_eq!(U256::from_be_slice(&enc[96..128]), U256::from(256u64));
        // bytes tail: length 2, content right-padded to a word.
        assert_eq!(U256::from_be_slice(&enc[256..288]), U256::from(2u64));
        assert_eq!(&enc[288..290], &[0xde, 0xad]);
        assert_eq!(enc.len(), 320);
    }

    #[test]
    fn test_round_trip_mixed_tuple() {
        let types = [
            AbiType::Uint(64),
            AbiType::Address,
            AbiType::Bool,
            AbiType::Array(Box::new(AbiType::uint256())),
            AbiType::Bytes,
        ];
        let values = vec![
            AbiValue::Uint(U256::from(42u64)),
            AbiValue::Address(addr(0x01)),
            AbiValue::Bool(true),
            AbiValue::Array(vec![
                AbiValue::Uint(U256::from(1u64)),
                AbiValue::Uint(U256::MAX),
            ]),
            AbiValue::Bytes(b"hello world, this is longer than one word".to_vec()),
        ];

        let enc = encode_params(&types, &values).unwrap();
        let dec = decode_params(&types, &enc).unwrap();
        assert_eq!(dec, values);
    }

    #[test]
    fn test_fixed_array_is_plain_concatenation() {
        let types = [AbiType::FixedArray(Box::new(AbiType::uint256()), 2)];
        let values = [AbiValue::Array(vec![
            AbiValue::Uint(U256::from(1u64)),
            AbiValue::Uint(U256::from(2u64)),
        ])];
        let enc = encode_params(&types, &values).unwrap();

        // No offset, no length prefix: just two words.
        assert_eq!(enc.len(), 64);
        assert_eq!(U256::from_be_slice(&enc[..32]), U256::from(1u64));
        assert_eq!(U256::from_be_slice(&enc[32..]), U256::from(2u64));
    }

    #[test]
    fn test_single_return_is_unwrapped() {
        let raw = U256::from(99u64).to_be_bytes::<32>();
        let ret = decode_returns(&[AbiType::uint256()], &raw).unwrap();
        assert_eq!(ret, CallReturn::Single(AbiValue::Uint(U256::from(99u64))));
        assert_eq!(
            ret.single().unwrap().uint().unwrap(),
            U256::from(99u64)
        );
    }

    #[test]
    fn test_multi_return_stays_tuple() {
        // getChannel returns (uint64, uint256).
        let mut raw = Vec::new();
        raw.extend_from_slice(&U256::from(3u64).to_be_bytes::<32>());
        raw.extend_from_slice(&U256::from(1000u64).to_be_bytes::<32>());

        let ret = decode_returns(&[AbiType::Uint(64), AbiType::uint256()], &raw).unwrap();
        let vals = ret.tuple().unwrap();
        assert_eq!(vals[0].uint().unwrap(), U256::from(3u64));
        assert_eq!(vals[1].uint().unwrap(), U256::from(1000u64));
    }

    #[test]
    fn test_uint_range_is_enforced() {
        let err = encode_params(
            &[AbiType::Uint(64)],
            &[AbiValue::Uint(U256::from(u128::from(u64::MAX) + 1))],
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::Encoding(_)));
    }

    #[test]
    fn test_arity_mismatch_is_rejected() {
        let err = encode_params(&[AbiType::Address], &[]).unwrap_err();
        assert!(matches!(err, ChannelError::Encoding(_)));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let err = encode_params(&[AbiType::Address], &[AbiValue::Bool(true)]).unwrap_err();
        assert!(matches!(err, ChannelError::Encoding(_)));
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let raw = [0u8; 16];
        let err = decode_params(&[AbiType::uint256()], &raw).unwrap_err();
        assert!(matches!(err, ChannelError::Decoding(_)));

        // Tuple longer than the payload.
        let raw = U256::from(1u64).to_be_bytes::<32>();
        let err = decode_params(&[AbiType::uint256(), AbiType::Bool], &raw).unwrap_err();
        assert!(matches!(err, ChannelError::Decoding(_)));
    }

    #[test]
    fn test_bytes_tail_bounds_checked() {
        // Offset word points at a length that overruns the payload.
        let mut raw = Vec::new();
        raw.extend_from_slice(&U256::from(32u64).to_be_bytes::<32>());
        raw.extend_from_slice(&U256::from(64u64).to_be_bytes::<32>()); // claims 64 bytes
        let err = decode_params(&[AbiType::Bytes], &raw).unwrap_err();
        assert!(matches!(err, ChannelError::Decoding(_)));
    }
}
