//! # Yield Source
//!
//! The bank parks everything it custodies with a [`YieldSource`]. Joining
//! hands value over; drawing pays it out to any recipient. Whatever the
//! source credits beyond what was joined is the bank's profit.
//!
//! [`DevYieldSource`] is the development implementation: it pays a fixed
//! amount of interest, minted on the spot, every time value joins.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use vouch_protocol::config::DEV_YIELD_INTEREST_PER_JOIN;
use vouch_protocol::identity::Address;
use vouch_protocol::vault::{Amount, BalanceBook, BalanceError, Unit};

use crate::assets::{InMemoryAssets, TransferError, ValueTransfer};

/// Errors from the yield source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum YieldError {
    /// Moving the underlying value failed.
    #[error("yield transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Drawing more than the holder has joined plus earned.
    #[error("yield balance: {0}")]
    Balance(#[from] BalanceError),
}

/// Somewhere idle value earns.
pub trait YieldSource: Send + Sync {
    /// The source's own address (the spender a joiner must approve).
    fn address(&self) -> Address;

    /// Pull `amount` from `holder` (who must have approved the source).
    fn join(&self, unit: Unit, holder: &Address, amount: Amount) -> Result<(), YieldError>;

    /// Pay `amount` of `holder`'s position out to `recipient`.
    fn draw(
        &self,
        unit: Unit,
        holder: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), YieldError>;

    /// `holder`'s position, interest included.
    fn balance_of(&self, unit: Unit, holder: &Address) -> Amount;
}

/// Fixed-interest development source.
pub struct DevYieldSource {
    address: Address,
    assets: Arc<InMemoryAssets>,
    positions: Mutex<BalanceBook>,
    interest_per_join: Amount,
}

impl DevYieldSource {
    pub fn new(address: Address, assets: Arc<InMemoryAssets>) -> Self {
        Self::with_interest(address, assets, DEV_YIELD_INTEREST_PER_JOIN)
    }

    pub fn with_interest(address: Address, assets: Arc<InMemoryAssets>, interest_per_join: Amount) -> Self {
        Self {
            address,
            assets,
            positions: Mutex::new(BalanceBook::new()),
            interest_per_join,
        }
    }
}

impl YieldSource for DevYieldSource {
    fn address(&self) -> Address {
        self.address
    }

    fn join(&self, unit: Unit, holder: &Address, amount: Amount) -> Result<(), YieldError> {
        let mut positions = self.positions.lock();
        let credited = amount
            .checked_add(self.interest_per_join)
            .ok_or(BalanceError::Overflow {
                holder: *holder,
                unit,
                current: amount,
                credit: self.interest_per_join,
            })?;
        positions.check_credit(holder, unit, credited)?;

        self.assets
            .transfer_from(&self.address, holder, &self.address, unit, amount)?;
        self.assets.mint(&self.address, unit, self.interest_per_join)?;
        positions.credit(holder, unit, credited)?;

        debug!(holder = %holder, unit = %unit, amount, interest = self.interest_per_join, "yield joined");
        Ok(())
    }

    fn draw(
        &self,
        unit: Unit,
        holder: &Address,
        recipient: &Address,
        amount: Amount,
    ) -> Result<(), YieldError> {
        let mut positions = self.positions.lock();
        positions.check_debit(holder, unit, amount)?;
        self.assets.transfer(&self.address, recipient, unit, amount)?;
        positions.debit(holder, unit, amount)?;

        debug!(holder = %holder, recipient = %recipient, unit = %unit, amount, "yield drawn");
        Ok(())
    }

    fn balance_of(&self, unit: Unit, holder: &Address) -> Amount {
        self.positions.lock().balance_of(holder, unit)
    }
}
