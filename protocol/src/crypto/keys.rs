//! # Judge & Creator Keys
//!
//! Ed25519 keys for everyone who appears on a pledge. A judge signs the
//! pledge fingerprint to accept a seat on the panel; the ledger only ever
//! sees the [`Address`] derived from the public half.
//!
//! Secret material stays inside [`Keypair`]: it is not serializable, and
//! its `Debug` output shows the public key only.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::identity::Address;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Not 32 bytes, or not a point on the curve.
    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,
}

/// A signing identity.
///
/// ```
/// use vouch_protocol::crypto::keys::Keypair;
///
/// let judge = Keypair::from_seed(&[3u8; 32]);
/// let sig = judge.sign(b"seat on pledge 7");
/// assert!(judge.verify(b"seat on pledge 7", &sig));
/// ```
pub struct Keypair {
    signing: SigningKey,
}

/// Verifying half of a [`Keypair`].
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

/// Raw Ed25519 signature bytes. Length is only enforced when verifying,
/// so truncated input can be carried around and rejected later.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Keypair {
    /// Fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair; the same seed always yields the same address.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public_key_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes().to_vec())
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature)
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keypair").field(&self.public_key()).finish()
    }
}

impl PublicKey {
    /// Accepts exactly 32 bytes that decode to a curve point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Strict RFC 8032 verification. Malformed input is just `false`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match (VerifyingKey::from_bytes(&self.0), signature.to_dalek()) {
            (Ok(key), Some(sig)) => key.verify_strict(message, &sig).is_ok(),
            _ => false,
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", &self.to_hex()[..16])
    }
}

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn to_dalek(&self) -> Option<DalekSignature> {
        let bytes: [u8; 64] = self.0.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&bytes))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}
