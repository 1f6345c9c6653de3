//! Receipt - Provider-Issued Statement of Amounts Owed
//!
//! A receipt maps beneficiary addresses to cumulative owed amounts in dei
//! (the smallest indivisible unit), split into the network category (the
//! node's flat fee) and the sellers category (per-datapoint royalties).
//! Each receipt supersedes all previous ones for the same channel: the
//! client replaces its copy wholesale, never merges field-by-field.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Cumulative amounts owed per beneficiary, by category.
///
/// Categories are a closed set. The packed order (network first, then
/// sellers, addresses ascending within each) is part of the wire
/// protocol: the provider derives the same order when it verifies the
/// payer's signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Flat network fee owed to the node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub network: BTreeMap<Address, u128>,
    /// Per-seller amounts accrued by queried datapoints.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sellers: BTreeMap<Address, u128>,
}

impl Receipt {
    /// A receipt with no entries: the channel has zero usage so far.
    pub fn is_empty(&self) -> bool {
        self.network.is_empty() && self.sellers.is_empty()
    }

    /// The synthesized settlement receipt for a never-used channel:
    /// only the node's quoted flat fee.
    pub fn network_only(node: Address, fee: u128) -> Self {
        let mut network = BTreeMap::new();
        network.insert(node, fee);
        Self {
            network,
            sellers: BTreeMap::new(),
        }
    }

    /// Flatten into two equal-length parallel sequences in the fixed
    /// pack order. Identical content always yields identical output,
    /// whatever order entries were inserted in.
    pub fn pack(&self) -> (Vec<Address>, Vec<u128>) {
        let mut addresses = Vec::with_capacity(self.network.len() + self.sellers.len());
        let mut values = Vec::with_capacity(addresses.capacity());
        for (addr, amount) in self.network.iter().chain(self.sellers.iter()) {
            addresses.push(*addr);
            values.push(*amount);
        }
        (addresses, values)
    }

    /// Total owed across all categories. Purely derived.
    pub fn total(&self) -> u128 {
        self.network
            .values()
            .chain(self.sellers.values())
            .fold(0u128, |acc, v| acc.saturating_add(*v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_pack_orders_network_before_sellers() {
        let mut receipt = Receipt::default();
        receipt.sellers.insert(addr(0x01), 5);
        receipt.sellers.insert(addr(0xff), 7);
        receipt.network.insert(addr(0xaa), 3);

        let (addresses, values) = receipt.pack();
        assert_eq!(addresses, vec![addr(0xaa), addr(0x01), addr(0xff)]);
        assert_eq!(values, vec![3, 5, 7]);
    }

    #[test]
    fn test_pack_is_insertion_order_independent() {
        let mut a = Receipt::default();
        a.sellers.insert(addr(0x02), 2);
        a.sellers.insert(addr(0x01), 1);

        let mut b = Receipt::default();
        b.sellers.insert(addr(0x01), 1);
        b.sellers.insert(addr(0x02), 2);

        assert_eq!(a.pack(), b.pack());
    }

    #[test]
    fn test_pack_sequences_are_parallel() {
        let mut receipt = Receipt::network_only(addr(0x10), 100);
        receipt.sellers.insert(addr(0x20), 200);

        let (addresses, values) = receipt.pack();
        assert_eq!(addresses.len(), values.len());
        assert_eq!(addresses.len(), 2);
    }

    #[test]
    fn test_network_only_has_single_beneficiary() {
        let receipt = Receipt::network_only(addr(0x42), 1_000);
        assert_eq!(receipt.total(), 1_000);
        let (addresses, values) = receipt.pack();
        assert_eq!(addresses, vec![addr(0x42)]);
        assert_eq!(values, vec![1_000]);
    }

    #[test]
    fn test_total_sums_all_categories() {
        let mut receipt = Receipt::default();
        receipt.network.insert(addr(0x01), 10);
        receipt.sellers.insert(addr(0x02), 20);
        receipt.sellers.insert(addr(0x03), 30);
        assert_eq!(receipt.total(), 60);
    }

    #[test]
    fn test_wire_form_round_trip() {
        // The provider sends decimal integer amounts keyed by address.
        let json = r#"{
            "network": {"0x00000000000000000000000000000000000000aa": 10000000000000000},
            "sellers": {
                "0x0000000000000000000000000000000000000001": 1,
                "0x0000000000000000000000000000000000000002": 340282366920938463463374607431768211455
            }
        }"#;
        let receipt: Receipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.network[&addr_from("aa")], 10_000_000_000_000_000);
        assert_eq!(receipt.sellers.len(), 2);
        assert_eq!(
            receipt.sellers[&addr_from("02")],
            340_282_366_920_938_463_463_374_607_431_768_211_455
        );

        let back: Receipt =
            serde_json::from_str(&serde_json::to_string(&receipt).unwrap()).unwrap();
        assert_eq!(back, receipt);
    }

    #[test]
    fn test_empty_receipt() {
        let receipt = Receipt::default();
        assert!(receipt.is_empty());
        assert_eq!(receipt.total(), 0);
        assert_eq!(receipt.pack(), (vec![], vec![]));
    }

    fn addr_from(suffix: &str) -> Address {
        format!("0x{:0>40}", suffix).parse().unwrap()
    }
}
