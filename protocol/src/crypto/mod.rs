//! # Cryptographic Primitives
//!
//! Everything that touches keys, signatures or digests lives here:
//!
//! - **Ed25519** for judge authorization signatures.
//! - **BLAKE3** for addresses and pledge fingerprints, always domain-separated.
//!
//! Thin, typed wrappers around audited crates. No custom constructions.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake3_hash, domain_separated_hash, domain_separated_hash_multi};
pub use keys::{Keypair, PublicKey, Signature};
pub use signatures::{sign_digest, Ed25519Recovery, SignatureError, SignatureRecovery, SignedDigest};
