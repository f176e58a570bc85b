//! # Value Units
//!
//! A [`Unit`] names the denomination an amount is held in: the native
//! value of the host ledger, or a fungible token identified by its
//! contract address. Pledges, balances and transfers are always qualified
//! by a unit; there is no implicit conversion between units anywhere.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::Address;

/// Amounts are unsigned integers in the unit's smallest denomination.
///
/// `u128` gives headroom for 18-decimal tokens; all arithmetic on amounts
/// is checked.
pub type Amount = u128;

/// One gwei, in base units. The minimum pot default is expressed in it.
pub const GWEI: Amount = 1_000_000_000;

/// A value denomination.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum Unit {
    /// The host ledger's native value.
    Native,
    /// A fungible token, by contract address.
    Token(Address),
}

impl Unit {
    /// Normalizes the "zero address means native" convention used by
    /// external callers.
    pub fn from_address(address: Address) -> Self {
        if address.is_zero() {
            Unit::Native
        } else {
            Unit::Token(address)
        }
    }

    /// The address form of this unit (`Address::ZERO` for native).
    pub fn address(&self) -> Address {
        match self {
            Unit::Native => Address::ZERO,
            Unit::Token(addr) => *addr,
        }
    }

    /// Fixed-width encoding used in fingerprints: 1 tag byte + 20 address bytes.
    pub fn to_fixed_bytes(&self) -> [u8; 21] {
        let mut out = [0u8; 21];
        if let Unit::Token(addr) = self {
            out[0] = 1;
            out[1..].copy_from_slice(addr.as_bytes());
        }
        out
    }
}

impl Default for Unit {
    fn default() -> Self {
        Unit::Native
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Native => write!(f, "native"),
            Unit::Token(addr) => write!(f, "token:{}", addr),
        }
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit({})", self)
    }
}
