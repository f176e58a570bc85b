//! # Signature Recovery
//!
//! Judges authorize their seat on a pledge panel by signing the pledge
//! fingerprint before the pledge exists. The engine never sees the judge
//! as a caller at that point; it only sees the signature, and has to turn
//! it back into an [`Address`].
//!
//! That mapping is the [`SignatureRecovery`] capability. It is a trait so
//! the engine can be driven by real Ed25519 verification in production and
//! by deterministic stubs in tests.
//!
//! ## The Ed25519 envelope
//!
//! Ed25519 has no public-key recovery, so a [`SignedDigest`] carries the
//! signer's public key next to the signature:
//!
//! ```text
//! envelope = public_key (32 bytes) || signature (64 bytes)
//! ```
//!
//! [`Ed25519Recovery`] strictly verifies the signature against the digest
//! with the embedded key and, on success, returns the address derived from
//! that key. A signature produced over any other digest, or an envelope of
//! the wrong size, recovers nothing.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::keys::{Keypair, PublicKey, Signature};
use crate::identity::Address;

/// Envelope length: 32-byte public key followed by a 64-byte signature.
pub const ENVELOPE_LENGTH: usize = 32 + 64;

/// Errors during signature recovery.
///
/// Deliberately coarse: callers learn that recovery failed, not why.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature envelope: expected {expected} bytes, got {got}")]
    MalformedEnvelope { expected: usize, got: usize },

    #[error("invalid public key in signature envelope")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    VerificationFailed,
}

/// An opaque signature over a 32-byte digest, as submitted by a caller.
///
/// Kept as raw bytes: what is inside depends on the [`SignatureRecovery`]
/// implementation in use.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDigest(Vec<u8>);

impl SignedDigest {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The "no signature" placeholder used for unused panel slots.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SignedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = hex::encode(&self.0);
        if hex_str.len() > 16 {
            write!(f, "SignedDigest({}...)", &hex_str[..16])
        } else {
            write!(f, "SignedDigest({})", hex_str)
        }
    }
}

/// Maps `(digest, signature)` to the identity that produced the signature.
pub trait SignatureRecovery: Send + Sync {
    fn recover(&self, digest: &[u8; 32], signature: &SignedDigest)
        -> Result<Address, SignatureError>;
}

/// Production recovery over the Ed25519 envelope format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Recovery;

impl SignatureRecovery for Ed25519Recovery {
    fn recover(
        &self,
        digest: &[u8; 32],
        signature: &SignedDigest,
    ) -> Result<Address, SignatureError> {
        let bytes = signature.as_bytes();
        if bytes.len() != ENVELOPE_LENGTH {
            return Err(SignatureError::MalformedEnvelope {
                expected: ENVELOPE_LENGTH,
                got: bytes.len(),
            });
        }

        let (key_bytes, sig_bytes) = bytes.split_at(32);
        let public_key =
            PublicKey::try_from_slice(key_bytes).map_err(|_| SignatureError::InvalidPublicKey)?;

        if !public_key.verify(digest, &Signature::from_slice(sig_bytes)) {
            return Err(SignatureError::VerificationFailed);
        }

        Ok(Address::from_public_key(&public_key))
    }
}

/// Sign a digest and pack the result into the Ed25519 envelope.
///
/// # Example
///
/// ```
/// use vouch_protocol::crypto::keys::Keypair;
/// use vouch_protocol::crypto::signatures::{sign_digest, Ed25519Recovery, SignatureRecovery};
///
/// let judge = Keypair::from_seed(&[7u8; 32]);
/// let digest = [0xAB; 32];
/// let envelope = sign_digest(&judge, &digest);
///
/// assert_eq!(Ed25519Recovery.recover(&digest, &envelope).unwrap(), judge.address());
/// ```
pub fn sign_digest(keypair: &Keypair, digest: &[u8; 32]) -> SignedDigest {
    let mut envelope = Vec::with_capacity(ENVELOPE_LENGTH);
    envelope.extend_from_slice(&keypair.public_key_bytes());
    envelope.extend_from_slice(keypair.sign(digest).as_bytes());
    SignedDigest(envelope)
}
