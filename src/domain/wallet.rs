//! Wallet - Immutable Signing Identity
//!
//! A private key, its derived address, and the checksummed textual form
//! used in HTTP headers. Loaded once from an encrypted keystore at
//! startup, read-only afterwards. Holds no mutable state.

use std::path::Path;

use alloy::primitives::{Address, B256, PrimitiveSignature};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;

use crate::error::{ChannelError, Result};

/// The payer's signing identity.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    address: Address,
    checksum: String,
}

impl Wallet {
    pub fn new(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        let checksum = address.to_checksum(None);
        Self {
            signer,
            address,
            checksum,
        }
    }

    /// Decrypt a JSON keystore file. The password is read by the caller
    /// (environment variable, prompt) and never stored.
    pub fn from_keystore(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let signer = PrivateKeySigner::decrypt_keystore(path, password)
            .map_err(|e| ChannelError::Wallet(format!("keystore decryption failed: {e}")))?;
        Ok(Self::new(signer))
    }

    /// Fresh random identity. Demo and test use only; real deposits
    /// belong behind a keystore.
    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-55 checksummed form, sent in the `X-DX-Address` header.
    pub fn checksum_address(&self) -> &str {
        &self.checksum
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Sign a 32-byte hash directly. No message prefix: the provider
    /// recovers over the same raw hash.
    pub fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| ChannelError::Wallet(format!("signing failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;

    #[test]
    fn test_checksum_matches_address() {
        let wallet = Wallet::random();
        let parsed: Address = wallet.checksum_address().parse().unwrap();
        assert_eq!(parsed, wallet.address());
    }

    #[test]
    fn test_sign_hash_recovers_to_wallet() {
        let wallet = Wallet::random();
        let hash = keccak256(b"channel test message");
        let sig = wallet.sign_hash(&hash).unwrap();
        let recovered = sig.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[test]
    fn test_keystore_failure_is_wallet_error() {
        let err = Wallet::from_keystore("/nonexistent/keystore.json", "pw").unwrap_err();
        assert!(matches!(err, ChannelError::Wallet(_)));
    }
}
