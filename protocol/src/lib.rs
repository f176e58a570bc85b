// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vouch Protocol: Core Library
//!
//! Vouch lets a creator lock value against a commitment and name up to
//! three judges who may declare the commitment failed. This crate holds the
//! primitives the escrow components are built from; the components
//! themselves live in `vouch-contracts`.
//!
//! ## Architecture
//!
//! - **crypto**: Hashing, Ed25519 keys, and judge signature recovery.
//! - **identity**: 20-byte addresses for participants and components.
//! - **vault**: Value units, amounts, and the balance book.
//! - **clock**: Injectable time source.
//! - **config**: Protocol constants and engine parameters.
//! - **logging**: `tracing` subscriber setup.
//!
//! ## Design Philosophy
//!
//! 1. Every balance change is checked. Nothing wraps, nothing goes negative.
//! 2. Time comes from a [`clock::Clock`], never from the ambient system.
//! 3. If it touches money, it has tests. Plural.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod logging;
pub mod vault;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::EngineConfig;
pub use identity::Address;
pub use vault::{Amount, Unit};
