//! # Balance Book
//!
//! A [`BalanceBook`] maps `(holder, unit)` to an amount. It is the storage
//! primitive behind both the bank's internal ledger and the in-memory
//! value-transfer reference implementation, and it enforces the two rules
//! every balance in Vouch obeys: you can never debit more than is there,
//! and a credit that would overflow is rejected instead of wrapping.
//!
//! Thread safety is the owner's problem; a `BalanceBook` is plain data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::unit::{Amount, Unit};
use crate::identity::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient balance for {holder} in {unit}: available {available}, requested {requested}")]
    InsufficientBalance {
        holder: Address,
        unit: Unit,
        available: Amount,
        requested: Amount,
    },

    /// A credit would exceed `Amount::MAX`.
    #[error("balance overflow for {holder} in {unit}: current {current}, credit {credit}")]
    Overflow {
        holder: Address,
        unit: Unit,
        current: Amount,
        credit: Amount,
    },
}

// ---------------------------------------------------------------------------
// BalanceBook
// ---------------------------------------------------------------------------

/// Per-holder, per-unit balances.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BalanceBook {
    #[serde(with = "entries")]
    balances: HashMap<(Address, Unit), Amount>,
}

impl BalanceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance; zero if the holder has never been credited.
    pub fn balance_of(&self, holder: &Address, unit: Unit) -> Amount {
        self.balances.get(&(*holder, unit)).copied().unwrap_or(0)
    }

    /// Returns `Ok(())` if `amount` could be credited without overflow.
    pub fn check_credit(&self, holder: &Address, unit: Unit, amount: Amount) -> Result<(), BalanceError> {
        let current = self.balance_of(holder, unit);
        current.checked_add(amount).map(|_| ()).ok_or(BalanceError::Overflow {
            holder: *holder,
            unit,
            current,
            credit: amount,
        })
    }

    /// Returns `Ok(())` if `amount` could be debited.
    pub fn check_debit(&self, holder: &Address, unit: Unit, amount: Amount) -> Result<(), BalanceError> {
        let available = self.balance_of(holder, unit);
        if available < amount {
            return Err(BalanceError::InsufficientBalance {
                holder: *holder,
                unit,
                available,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Adds `amount` to the holder's balance and returns the new balance.
    pub fn credit(&mut self, holder: &Address, unit: Unit, amount: Amount) -> Result<Amount, BalanceError> {
        self.check_credit(holder, unit, amount)?;
        let entry = self.balances.entry((*holder, unit)).or_insert(0);
        *entry += amount;
        Ok(*entry)
    }

    /// Subtracts `amount` from the holder's balance and returns the new balance.
    pub fn debit(&mut self, holder: &Address, unit: Unit, amount: Amount) -> Result<Amount, BalanceError> {
        self.check_debit(holder, unit, amount)?;
        let entry = self.balances.entry((*holder, unit)).or_insert(0);
        *entry -= amount;
        Ok(*entry)
    }

    /// Moves `amount` between two holders atomically.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        unit: Unit,
        amount: Amount,
    ) -> Result<(), BalanceError> {
        self.check_debit(from, unit, amount)?;
        if from != to {
            self.check_credit(to, unit, amount)?;
        }
        self.debit(from, unit, amount)?;
        self.credit(to, unit, amount)?;
        Ok(())
    }

    /// Overwrites a balance. Used when realizing a computed figure (profit)
    /// rather than applying a delta.
    pub fn set(&mut self, holder: &Address, unit: Unit, amount: Amount) {
        self.balances.insert((*holder, unit), amount);
    }

    /// Sum of every balance in `unit`, optionally skipping one holder.
    pub fn total(&self, unit: Unit, excluding: Option<&Address>) -> Amount {
        self.balances
            .iter()
            .filter(|((holder, u), _)| *u == unit && Some(holder) != excluding)
            .map(|(_, amount)| *amount)
            .fold(0, Amount::saturating_add)
    }

    /// All non-zero balances held by `holder`.
    pub fn holdings(&self, holder: &Address) -> Vec<(Unit, Amount)> {
        let mut out: Vec<(Unit, Amount)> = self
            .balances
            .iter()
            .filter(|((h, _), amount)| h == holder && **amount > 0)
            .map(|((_, unit), amount)| (*unit, *amount))
            .collect();
        out.sort();
        out
    }
}

/// JSON cannot key a map by a tuple, so the book serializes as a list of
/// `{holder, unit, amount}` entries.
mod entries {
    use super::{Address, Amount, Unit};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize)]
    struct Entry {
        holder: Address,
        unit: Unit,
        amount: Amount,
    }

    pub fn serialize<S: Serializer>(
        map: &HashMap<(Address, Unit), Amount>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut list: Vec<Entry> = map
            .iter()
            .map(|((holder, unit), amount)| Entry {
                holder: *holder,
                unit: *unit,
                amount: *amount,
            })
            .collect();
        list.sort_by(|a, b| (a.holder, a.unit).cmp(&(b.holder, b.unit)));
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<(Address, Unit), Amount>, D::Error> {
        let list = Vec::<Entry>::deserialize(deserializer)?;
        Ok(list
            .into_iter()
            .map(|e| ((e.holder, e.unit), e.amount))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
