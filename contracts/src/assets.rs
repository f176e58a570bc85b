//! # Value Transfer
//!
//! The bank never holds value itself; it moves it through a [`ValueTransfer`]
//! primitive with the familiar balance/allowance shape: a holder approves a
//! spender, and the spender pulls with `transfer_from`.
//!
//! [`InMemoryAssets`] is the reference implementation. It covers both the
//! native unit and any number of tokens, and can mint, which is how tests
//! and the development yield source create value.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use vouch_protocol::identity::Address;
use vouch_protocol::vault::{Amount, BalanceBook, BalanceError, Unit};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from value transfers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The spender's allowance is smaller than the amount.
    #[error("exceeds allowance: {spender} may spend {allowed} of {owner}'s {unit}, requested {requested}")]
    AllowanceExceeded {
        owner: Address,
        spender: Address,
        unit: Unit,
        allowed: Amount,
        requested: Amount,
    },

    /// The source holds less than the amount.
    #[error("exceeds balance: {holder} holds {available} {unit}, requested {requested}")]
    BalanceExceeded {
        holder: Address,
        unit: Unit,
        available: Amount,
        requested: Amount,
    },

    /// The destination balance would overflow.
    #[error("amount overflow crediting {holder} in {unit}")]
    Overflow { holder: Address, unit: Unit },
}

impl From<BalanceError> for TransferError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientBalance {
                holder,
                unit,
                available,
                requested,
            } => TransferError::BalanceExceeded {
                holder,
                unit,
                available,
                requested,
            },
            BalanceError::Overflow { holder, unit, .. } => TransferError::Overflow { holder, unit },
        }
    }
}

// ---------------------------------------------------------------------------
// ValueTransfer
// ---------------------------------------------------------------------------

/// Balance/allowance value movement, per unit.
pub trait ValueTransfer: Send + Sync {
    /// Set (not add to) `spender`'s allowance over `owner`'s funds.
    fn approve(&self, owner: &Address, spender: &Address, unit: Unit, amount: Amount);

    fn allowance(&self, owner: &Address, spender: &Address, unit: Unit) -> Amount;

    /// Move the caller's own funds.
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        unit: Unit,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Move `from`'s funds on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        unit: Unit,
        amount: Amount,
    ) -> Result<(), TransferError>;

    fn balance_of(&self, holder: &Address, unit: Unit) -> Amount;
}

// ---------------------------------------------------------------------------
// InMemoryAssets
// ---------------------------------------------------------------------------

/// In-process reference implementation of [`ValueTransfer`].
#[derive(Debug, Default)]
pub struct InMemoryAssets {
    balances: RwLock<BalanceBook>,
    allowances: RwLock<HashMap<(Address, Address, Unit), Amount>>,
}

impl InMemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create value out of thin air.
    pub fn mint(&self, to: &Address, unit: Unit, amount: Amount) -> Result<Amount, TransferError> {
        let balance = self.balances.write().credit(to, unit, amount)?;
        debug!(to = %to, unit = %unit, amount, "minted");
        Ok(balance)
    }
}

impl ValueTransfer for InMemoryAssets {
    fn approve(&self, owner: &Address, spender: &Address, unit: Unit, amount: Amount) {
        self.allowances
            .write()
            .insert((*owner, *spender, unit), amount);
    }

    fn allowance(&self, owner: &Address, spender: &Address, unit: Unit) -> Amount {
        self.allowances
            .read()
            .get(&(*owner, *spender, unit))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        unit: Unit,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.balances.write().transfer(from, to, unit, amount)?;
        Ok(())
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        unit: Unit,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let mut allowances = self.allowances.write();
        let key = (*from, *spender, unit);
        let allowed = allowances.get(&key).copied().unwrap_or(0);
        if allowed < amount {
            return Err(TransferError::AllowanceExceeded {
                owner: *from,
                spender: *spender,
                unit,
                allowed,
                requested: amount,
            });
        }

        self.balances.write().transfer(from, to, unit, amount)?;
        allowances.insert(key, allowed - amount);
        Ok(())
    }

    fn balance_of(&self, holder: &Address, unit: Unit) -> Amount {
        self.balances.read().balance_of(holder, unit)
    }
}
