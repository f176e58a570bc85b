//! # Hashing
//!
//! BLAKE3 only. Two shapes are used across Vouch:
//!
//! - [`blake3_hash`]: plain digest, used to turn a public key into an address.
//! - [`domain_separated_hash`] / [`domain_separated_hash_multi`]: BLAKE3 in
//!   `derive_key` mode. The context string is mixed into the key schedule,
//!   so a pledge fingerprint and a component address over identical bytes
//!   never coincide.

/// Plain BLAKE3 digest.
///
/// ```
/// use vouch_protocol::crypto::blake3_hash;
///
/// assert_ne!(blake3_hash(b"kept"), blake3_hash(b"broken"));
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// BLAKE3 keyed by a context string.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    domain_separated_hash_multi(context, &[data])
}

/// Like [`domain_separated_hash`] over the concatenation of `parts`.
///
/// Parts are fed back to back with no framing; callers keep the layout
/// unambiguous with fixed-width fields.
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}
