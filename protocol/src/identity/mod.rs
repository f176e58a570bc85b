//! # Identity Module
//!
//! Every participant is an Ed25519 keypair; what the ledger sees is the
//! 20-byte [`Address`] derived from its public key. Deployed components
//! (bank, controller, settings, logic modules) get deterministic addresses
//! derived from a label, so they can hold balances and be named in the
//! registry like any other principal.

pub mod address;

pub use address::{Address, AddressError, ADDRESS_LENGTH};
