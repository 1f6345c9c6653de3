//! Receipt and Datapoint Cryptography
//!
//! Two independent signature schemes meet here:
//!
//! * Receipt signatures: the payer signs the keccak256 of the receipt's
//!   packed form. The packed form uses static fixed-size array encoding
//!   re-derived for the current receipt length, emulating the provider's
//!   tightly packed scheme; the encoding must match the provider's
//!   byte-for-byte or settlement verification fails.
//! * Datapoint signatures: sellers sign a DER SEQUENCE of
//!   (owner, creation millis, stringified value); the signature itself
//!   travels as a base64-encoded DER SEQUENCE of (v, r, s) integers.
//!   Verification is a query-time trust check and returns a boolean,
//!   never an error.

use alloy::primitives::{Address, B256, PrimitiveSignature, U256, keccak256};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use serde_json::Value;

use crate::domain::abi::{self, AbiType, AbiValue};
use crate::domain::receipt::Receipt;
use crate::domain::wallet::Wallet;
use crate::error::Result;

/// Hash of a receipt's packed form, identical on payer and provider.
pub fn receipt_hash(receipt: &Receipt) -> Result<B256> {
    let (addresses, values) = receipt.pack();
    let n = addresses.len();
    // Fixed-size arrays of static elements encode as plain concatenation
    // (no offsets, no length prefixes), sized to the current receipt.
    let types = [
        AbiType::FixedArray(Box::new(AbiType::Address), n),
        AbiType::FixedArray(Box::new(AbiType::uint256()), n),
    ];
    let args = [
        AbiValue::Array(addresses.into_iter().map(AbiValue::Address).collect()),
        AbiValue::Array(
            values
                .into_iter()
                .map(|v| AbiValue::Uint(U256::from(v)))
                .collect(),
        ),
    ];
    let encoded = abi::encode_params(&types, &args)?;
    Ok(keccak256(&encoded))
}

/// Sign the packed receipt with the wallet's key. The raw 65-byte
/// signature goes into the `X-DX-Signature` request header.
pub fn sign_receipt(wallet: &Wallet, receipt: &Receipt) -> Result<PrimitiveSignature> {
    let hash = receipt_hash(receipt)?;
    wallet.sign_hash(&hash)
}

/// Recover the signer of a receipt signature over the re-derived hash.
pub fn recover_receipt_signer(
    receipt: &Receipt,
    signature: &PrimitiveSignature,
) -> Result<Option<Address>> {
    let hash = receipt_hash(receipt)?;
    Ok(signature.recover_address_from_prehash(&hash).ok())
}

/// Check a provider-supplied datapoint signature: rebuild the exact byte
/// sequence the seller must have signed and require recovery to yield
/// the claimed owner. False on any mismatch or malformed input.
pub fn verify_datapoint(
    owner: &str,
    creation_date: &str,
    signature_b64: &str,
    value: &Value,
) -> bool {
    check_datapoint(owner, creation_date, signature_b64, value).unwrap_or(false)
}

fn check_datapoint(
    owner: &str,
    creation_date: &str,
    signature_b64: &str,
    value: &Value,
) -> Option<bool> {
    let owner_address: Address = owner.parse().ok()?;

    let date = DateTime::parse_from_rfc3339(creation_date).ok()?;
    let millis = u64::try_from(date.timestamp_millis()).ok()?;

    let hash = datapoint_hash(owner, millis, value);

    let der = BASE64.decode(signature_b64).ok()?;
    let (v, r, s) = decode_vrs(&der)?;
    let parity = match v {
        0 | 27 => false,
        1 | 28 => true,
        _ => return Some(false),
    };
    let signature = PrimitiveSignature::new(r, s, parity);
    let recovered = signature.recover_address_from_prehash(&hash).ok()?;

    Some(recovered == owner_address)
}

/// keccak256 over the DER SEQUENCE the seller signs:
/// UTF8String(owner), INTEGER(millis), UTF8String(value-as-string).
fn datapoint_hash(owner: &str, millis: u64, value: &Value) -> B256 {
    // JSON strings are signed bare; every other value in its
    // serialized form.
    let value_string = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let mut content = Vec::new();
    der_tlv(&mut content, DER_UTF8_STRING, owner.as_bytes());
    der_tlv(&mut content, DER_INTEGER, &der_unsigned(&millis.to_be_bytes()));
    der_tlv(&mut content, DER_UTF8_STRING, value_string.as_bytes());

    let mut message = Vec::with_capacity(content.len() + 4);
    der_tlv(&mut message, DER_SEQUENCE, &content);

    keccak256(&message)
}

// ── Minimal DER subset ──────────────────────────────────────
// Three tags cover both the signed payload and the (v, r, s)
// signature envelope.

const DER_INTEGER: u8 = 0x02;
const DER_UTF8_STRING: u8 = 0x0c;
const DER_SEQUENCE: u8 = 0x30;

/// Append one tag-length-value element.
fn der_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    if content.len() < 0x80 {
        out.push(content.len() as u8);
    } else {
        let len_bytes = content.len().to_be_bytes();
        let skip = len_bytes.iter().take_while(|b| **b == 0).count();
        let significant = &len_bytes[skip..];
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
    out.extend_from_slice(content);
}

/// Minimal two's-complement content bytes of a non-negative integer.
fn der_unsigned(value: &[u8]) -> Vec<u8> {
    let skip = value.iter().take_while(|b| **b == 0).count();
    let mut bytes = value[skip..].to_vec();
    if bytes.is_empty() {
        bytes.push(0);
    } else if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    bytes
}

struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn byte(&mut self) -> Option<u8> {
        let b = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_header(&mut self) -> Option<(u8, usize)> {
        let tag = self.byte()?;
        let first = self.byte()?;
        let len = if first < 0x80 {
            usize::from(first)
        } else {
            let n = usize::from(first & 0x7f);
            if n == 0 || n > size_of::<usize>() {
                return None;
            }
            let mut len = 0usize;
            for _ in 0..n {
                len = (len << 8) | usize::from(self.byte()?);
            }
            len
        };
        Some((tag, len))
    }

    fn read_content(&mut self, expected_tag: u8) -> Option<&'a [u8]> {
        let (tag, len) = self.read_header()?;
        if tag != expected_tag {
            return None;
        }
        let content = self.buf.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(content)
    }
}

/// Parse the provider's structured signature: SEQUENCE of three
/// INTEGERs (v, r, s).
fn decode_vrs(der: &[u8]) -> Option<(u64, U256, U256)> {
    let mut outer = DerReader::new(der);
    let seq = outer.read_content(DER_SEQUENCE)?;

    let mut inner = DerReader::new(seq);
    let v = der_uint::<8>(inner.read_content(DER_INTEGER)?)?;
    let r = der_uint::<32>(inner.read_content(DER_INTEGER)?)?;
    let s = der_uint::<32>(inner.read_content(DER_INTEGER)?)?;

    let v = u64::from_be_bytes(pad_left::<8>(&v)?);
    // from_be_slice left-pads short big-endian input
    let r = U256::from_be_slice(&r);
    let s = U256::from_be_slice(&s);
    Some((v, r, s))
}

/// Strip the sign byte a DER encoder prepends to high-bit integers.
fn der_trimmed(content: &[u8]) -> Option<Vec<u8>> {
    if content.is_empty() {
        return None;
    }
    if content[0] & 0x80 != 0 {
        // negative integers never appear in a (v, r, s) envelope
        return None;
    }
    let skip = content.iter().take_while(|b| **b == 0).count();
    Some(content[skip.min(content.len() - 1)..].to_vec())
}

fn der_uint<const N: usize>(content: &[u8]) -> Option<Vec<u8>> {
    let trimmed = der_trimmed(content)?;
    if trimmed.len() > N { None } else { Some(trimmed) }
}

fn pad_left<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    if bytes.len() > N {
        return None;
    }
    let mut out = [0u8; N];
    out[N - bytes.len()..].copy_from_slice(bytes);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn sample_receipt() -> Receipt {
        let mut receipt = Receipt::network_only(addr(0x0a), 10_000_000_000_000_000);
        receipt.sellers.insert(addr(0x01), 1_000);
        receipt.sellers.insert(addr(0x02), 2_000);
        receipt
    }

    #[test]
    fn test_receipt_hash_matches_manual_encoding() {
        let receipt = sample_receipt();
        let (addresses, values) = receipt.pack();

        // Concatenated words, addresses then values, nothing else.
        let mut manual = Vec::new();
        for a in &addresses {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(a.as_slice());
            manual.extend_from_slice(&word);
        }
        for v in &values {
            manual.extend_from_slice(&U256::from(*v).to_be_bytes::<32>());
        }

        assert_eq!(receipt_hash(&receipt).unwrap(), keccak256(&manual));
    }

    #[test]
    fn test_sign_receipt_recovers_to_signer() {
        let wallet = Wallet::random();
        let receipt = sample_receipt();

        let sig = sign_receipt(&wallet, &receipt).unwrap();
        let recovered = recover_receipt_signer(&receipt, &sig).unwrap();
        assert_eq!(recovered, Some(wallet.address()));
    }

    #[test]
    fn test_mutated_amount_invalidates_signature() {
        let wallet = Wallet::random();
        let receipt = sample_receipt();
        let sig = sign_receipt(&wallet, &receipt).unwrap();

        let mut tampered = receipt.clone();
        tampered.sellers.insert(addr(0x01), 1_001);

        let recovered = recover_receipt_signer(&tampered, &sig).unwrap();
        assert_ne!(recovered, Some(wallet.address()));
    }

    #[test]
    fn test_empty_receipt_hash_is_stable() {
        let empty = Receipt::default();
        assert_eq!(
            receipt_hash(&empty).unwrap(),
            receipt_hash(&Receipt {
                network: BTreeMap::new(),
                sellers: BTreeMap::new(),
            })
            .unwrap()
        );
    }

    #[test]
    fn test_der_unsigned_minimal_encoding() {
        assert_eq!(der_unsigned(&[0, 0, 0]), vec![0]);
        assert_eq!(der_unsigned(&[0, 0x7f]), vec![0x7f]);
        // High bit set: sign byte prepended.
        assert_eq!(der_unsigned(&[0x80]), vec![0, 0x80]);
        assert_eq!(der_unsigned(&0u64.to_be_bytes()), vec![0]);
    }

    /// Build the base64 DER (v, r, s) envelope a provider would attach.
    fn encode_signature(sig: &PrimitiveSignature) -> String {
        let bytes = sig.as_bytes();
        let mut content = Vec::new();
        der_tlv(&mut content, DER_INTEGER, &der_unsigned(&[bytes[64]]));
        der_tlv(&mut content, DER_INTEGER, &der_unsigned(&bytes[..32]));
        der_tlv(&mut content, DER_INTEGER, &der_unsigned(&bytes[32..64]));
        let mut der = Vec::new();
        der_tlv(&mut der, DER_SEQUENCE, &content);
        BASE64.encode(der)
    }

    fn signed_datapoint(
        wallet: &Wallet,
        creation_date: &str,
        value: &Value,
    ) -> (String, String) {
        let owner = wallet.checksum_address().to_string();
        let date = DateTime::parse_from_rfc3339(creation_date).unwrap();
        let millis = u64::try_from(date.timestamp_millis()).unwrap();
        let hash = datapoint_hash(&owner, millis, value);
        let sig = wallet.sign_hash(&hash).unwrap();
        (owner, encode_signature(&sig))
    }

    #[test]
    fn test_verify_datapoint_accepts_owner_signature() {
        let wallet = Wallet::random();
        let date = "2019-03-26T13:31:07+00:00";
        let value = Value::String("ACME Ltd".to_string());
        let (owner, signature) = signed_datapoint(&wallet, date, &value);

        assert!(verify_datapoint(&owner, date, &signature, &value));
    }

    #[test]
    fn test_verify_datapoint_accepts_numeric_value() {
        let wallet = Wallet::random();
        let date = "2021-07-01T00:00:00+00:00";
        let value = Value::from(250u64);
        let (owner, signature) = signed_datapoint(&wallet, date, &value);

        assert!(verify_datapoint(&owner, date, &signature, &value));
    }

    #[test]
    fn test_verify_datapoint_rejects_altered_value() {
        let wallet = Wallet::random();
        let date = "2019-03-26T13:31:07+00:00";
        let value = Value::String("original".to_string());
        let (owner, signature) = signed_datapoint(&wallet, date, &value);

        let altered = Value::String("altered".to_string());
        assert!(!verify_datapoint(&owner, date, &signature, &altered));
    }

    #[test]
    fn test_verify_datapoint_rejects_altered_timestamp() {
        let wallet = Wallet::random();
        let date = "2019-03-26T13:31:07+00:00";
        let value = Value::String("v".to_string());
        let (owner, signature) = signed_datapoint(&wallet, date, &value);

        assert!(!verify_datapoint(
            &owner,
            "2019-03-26T13:31:08+00:00",
            &signature,
            &value
        ));
    }

    #[test]
    fn test_verify_datapoint_rejects_wrong_owner() {
        let wallet = Wallet::random();
        let imposter = Wallet::random();
        let date = "2019-03-26T13:31:07+00:00";
        let value = Value::String("v".to_string());
        let (_, signature) = signed_datapoint(&wallet, date, &value);

        assert!(!verify_datapoint(
            imposter.checksum_address(),
            date,
            &signature,
            &value
        ));
    }

    #[test]
    fn test_verify_datapoint_rejects_garbage_input() {
        assert!(!verify_datapoint(
            "not-an-address",
            "2019-03-26T13:31:07+00:00",
            "AAAA",
            &Value::Null
        ));
        assert!(!verify_datapoint(
            "0x0000000000000000000000000000000000000001",
            "not-a-date",
            "AAAA",
            &Value::Null
        ));
        assert!(!verify_datapoint(
            "0x0000000000000000000000000000000000000001",
            "2019-03-26T13:31:07+00:00",
            "!!!not base64!!!",
            &Value::Null
        ));
    }
}
