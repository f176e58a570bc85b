//! # Addresses
//!
//! An [`Address`] is the 20-byte identity every participant and component
//! is known by on the ledger:
//!
//! ```text
//! user:       BLAKE3(public_key)[..20]
//! component:  BLAKE3_derive_key("vouch component address v1", label)[..20]
//! ```
//!
//! `Address::ZERO` is the null address. It is never a valid owner,
//! implementation, or judge; components reject it explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::hash::{blake3_hash, domain_separated_hash};
use crate::crypto::keys::PublicKey;

/// Address length in bytes.
pub const ADDRESS_LENGTH: usize = 20;

const COMPONENT_ADDRESS_CONTEXT: &str = "vouch component address v1";

/// Errors when parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// A 20-byte principal identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The null address.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the address controlled by an Ed25519 public key.
    pub fn from_public_key(pk: &PublicKey) -> Self {
        Self::truncate(blake3_hash(pk.as_bytes()))
    }

    /// Deterministic address for a deployed component or logic module,
    /// e.g. `Address::derive("bank")` or `Address::derive("bank-impl-v1")`.
    pub fn derive(label: &str) -> Self {
        Self::truncate(domain_separated_hash(
            COMPONENT_ADDRESS_CONTEXT,
            label.as_bytes(),
        ))
    }

    fn truncate(hash: [u8; 32]) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&hash[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let arr: [u8; ADDRESS_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            let arr: [u8; ADDRESS_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
                serde::de::Error::custom(format!(
                    "expected {}-byte address, got {}",
                    ADDRESS_LENGTH,
                    bytes.len()
                ))
            })?;
            Ok(Address(arr))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn zero_is_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::derive("bank").is_zero());
    }

    #[test]
    fn derive_is_stable_and_label_specific() {
        assert_eq!(Address::derive("bank"), Address::derive("bank"));
        assert_ne!(Address::derive("bank"), Address::derive("controller"));
    }

    #[test]
    fn public_key_address_matches_keypair() {
        let kp = Keypair::from_seed(&[5u8; 32]);
        assert_eq!(Address::from_public_key(&kp.public_key()), kp.address());
    }

    #[test]
    fn hex_parsing() {
        let addr = Address::derive("settings");
        assert_eq!(Address::from_hex(&addr.to_hex()), Ok(addr));
        assert_eq!(
            Address::from_hex(addr.to_hex().trim_start_matches("0x")),
            Ok(addr)
        );
        assert_eq!(Address::from_hex("0xdead"), Err(AddressError::InvalidLength(2)));
        assert!(matches!(
            Address::from_hex("0xzz"),
            Err(AddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn json_uses_hex_string() {
        let addr = Address::derive("judge");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
