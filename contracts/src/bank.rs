//! # Bank
//!
//! Shared custody for every value that moves through Vouch.
//!
//! ## Money flow
//!
//! ```text
//!  deposit:   user ──transfer_from──► bank ──join──► yield source
//!                                       │
//!                                       ├─ fee  ──► bank's own balance
//!                                       └─ net  ──► escrow (controller)
//!
//!  credit:    escrow ──────────────────────────────► user balance
//!  withdraw:  yield source ──draw──► user           (user balance debited)
//! ```
//!
//! The bank never holds idle value: everything it custodies sits with the
//! yield source. User balances and escrow are liabilities against that
//! position, and whatever the position holds beyond them is profit.
//!
//! ## Invariant
//!
//! Per unit: Σ user balances + escrow ≤ value custodied at the yield source.
//! Credits only ever move value out of escrow, never create it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use vouch_protocol::clock::Clock;
use vouch_protocol::config::{ConfigError, EngineConfig};
use vouch_protocol::identity::Address;
use vouch_protocol::vault::{Amount, BalanceBook, BalanceError, Unit};

use crate::assets::{TransferError, ValueTransfer};
use crate::events::{Event, EventLog};
use crate::proxy::{Implementation, Proxy, ProxyError, Upgraded};
use crate::yield_source::{YieldError, YieldSource};

/// Storage schema understood by [`BankV1`].
pub const BANK_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from bank operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BankError {
    /// The operation is reserved for the registered controller.
    #[error("must be controller: {caller}")]
    NotController { caller: Address },

    /// A withdrawal exceeds the user's ledger balance.
    #[error("not enough balance: {user} holds {available} {unit}, requested {requested}")]
    InsufficientBalance {
        user: Address,
        unit: Unit,
        available: Amount,
        requested: Amount,
    },

    /// A credit exceeds what the controller has in escrow.
    #[error("insufficient escrow in {unit}: available {available}, requested {requested}")]
    InsufficientEscrow {
        unit: Unit,
        available: Amount,
        requested: Amount,
    },

    /// Summing amounts overflowed.
    #[error("amount overflow")]
    AmountOverflow,

    /// Pulling funds from the user failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The yield source refused a join or a draw.
    #[error(transparent)]
    Yield(#[from] YieldError),

    /// Internal ledger arithmetic failed.
    #[error(transparent)]
    Balance(#[from] BalanceError),

    /// The bank was handed a config that fails validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

// ---------------------------------------------------------------------------
// Context & storage
// ---------------------------------------------------------------------------

/// Resolved collaborators, fixed at deployment.
#[derive(Clone)]
pub struct BankContext {
    /// The bank's own address: fee account and yield position holder.
    pub address: Address,
    /// The only caller allowed to deposit and credit.
    pub controller: Address,
    pub config: EngineConfig,
    pub assets: Arc<dyn ValueTransfer>,
    pub yield_source: Arc<dyn YieldSource>,
    pub clock: Arc<dyn Clock>,
}

impl BankContext {
    fn ensure_controller(&self, caller: &Address) -> Result<(), BankError> {
        if *caller != self.controller {
            warn!(caller = %caller, "rejected controller-only bank call");
            return Err(BankError::NotController { caller: *caller });
        }
        Ok(())
    }
}

/// Bank state. Survives logic upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankStorage {
    pub schema_version: u32,
    /// User balances, plus the bank's own fee/profit balance.
    pub balances: BalanceBook,
    /// Deposited value not yet credited to anyone, held for the controller.
    pub escrow: BalanceBook,
    pub events: EventLog,
}

impl Default for BankStorage {
    fn default() -> Self {
        Self {
            schema_version: BANK_SCHEMA_VERSION,
            balances: BalanceBook::new(),
            escrow: BalanceBook::new(),
            events: EventLog::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

/// Bank logic. Reads have default implementations over [`BankStorage`].
pub trait BankLogic: Implementation {
    /// Pull `amount` from `for_user` into custody. Returns the net amount
    /// escrowed after the fee.
    fn deposit(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<Amount, BankError>;

    /// Move escrowed value to several users at once, all or nothing.
    fn credit_batch(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        unit: Unit,
        payouts: &[(Address, Amount)],
    ) -> Result<(), BankError>;

    /// Pay `amount` of `for_user`'s balance out to `for_user`.
    fn withdraw(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), BankError>;

    /// Realize custodied value in excess of liabilities into the bank's
    /// own balance.
    fn emit_profit(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        unit: Unit,
    ) -> Result<Amount, BankError>;

    fn credit(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), BankError> {
        self.credit_batch(ctx, storage, caller, unit, &[(*for_user, amount)])
    }

    fn user_balance(&self, storage: &BankStorage, user: &Address, unit: Unit) -> Amount {
        storage.balances.balance_of(user, unit)
    }

    fn escrowed(&self, storage: &BankStorage, unit: Unit) -> Amount {
        storage.escrow.total(unit, None)
    }

    /// What the bank owes: every user balance except its own, plus escrow.
    fn liabilities(&self, ctx: &BankContext, storage: &BankStorage, unit: Unit) -> Amount {
        storage
            .balances
            .total(unit, Some(&ctx.address))
            .saturating_add(storage.escrow.total(unit, None))
    }
}

/// First bank logic module.
#[derive(Debug, Clone)]
pub struct BankV1 {
    address: Address,
}

impl BankV1 {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl Implementation for BankV1 {
    fn address(&self) -> Address {
        self.address
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn schema_version(&self) -> u32 {
        BANK_SCHEMA_VERSION
    }
}

impl BankLogic for BankV1 {
    fn deposit(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<Amount, BankError> {
        ctx.ensure_controller(caller)?;

        let fee = ctx.config.fee_for(amount);
        let net = amount - fee;
        storage.balances.check_credit(&ctx.address, unit, fee)?;
        storage.escrow.check_credit(&ctx.controller, unit, net)?;

        ctx.assets
            .transfer_from(&ctx.address, for_user, &ctx.address, unit, amount)?;

        let yield_address = ctx.yield_source.address();
        ctx.assets.approve(&ctx.address, &yield_address, unit, amount);
        if let Err(err) = ctx.yield_source.join(unit, &ctx.address, amount) {
            ctx.assets.approve(&ctx.address, &yield_address, unit, 0);
            if let Err(refund) = ctx.assets.transfer(&ctx.address, for_user, unit, amount) {
                warn!(user = %for_user, unit = %unit, amount, error = %refund, "deposit refund failed");
            }
            return Err(err.into());
        }

        storage.balances.credit(&ctx.address, unit, fee)?;
        storage.escrow.credit(&ctx.controller, unit, net)?;

        debug!(user = %for_user, unit = %unit, amount, fee, net, "deposit");
        Ok(net)
    }

    fn credit_batch(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        unit: Unit,
        payouts: &[(Address, Amount)],
    ) -> Result<(), BankError> {
        ctx.ensure_controller(caller)?;

        let mut total: Amount = 0;
        let mut per_user: HashMap<Address, Amount> = HashMap::new();
        for (user, amount) in payouts {
            total = total.checked_add(*amount).ok_or(BankError::AmountOverflow)?;
            let entry = per_user.entry(*user).or_insert(0);
            *entry = entry.checked_add(*amount).ok_or(BankError::AmountOverflow)?;
        }

        let available = storage.escrow.balance_of(&ctx.controller, unit);
        if available < total {
            return Err(BankError::InsufficientEscrow {
                unit,
                available,
                requested: total,
            });
        }
        for (user, amount) in &per_user {
            storage.balances.check_credit(user, unit, *amount)?;
        }

        storage.escrow.debit(&ctx.controller, unit, total)?;
        for (user, amount) in payouts {
            storage.balances.credit(user, unit, *amount)?;
            debug!(user = %user, unit = %unit, amount = *amount, "credited");
        }
        Ok(())
    }

    fn withdraw(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), BankError> {
        if caller != for_user {
            ctx.ensure_controller(caller)?;
        }

        let available = storage.balances.balance_of(for_user, unit);
        if available < amount {
            return Err(BankError::InsufficientBalance {
                user: *for_user,
                unit,
                available,
                requested: amount,
            });
        }

        ctx.yield_source.draw(unit, &ctx.address, for_user, amount)?;
        storage.balances.debit(for_user, unit, amount)?;

        debug!(user = %for_user, unit = %unit, amount, "withdrawal");
        Ok(())
    }

    fn emit_profit(
        &self,
        ctx: &BankContext,
        storage: &mut BankStorage,
        unit: Unit,
    ) -> Result<Amount, BankError> {
        let custodied = ctx.yield_source.balance_of(unit, &ctx.address);
        let owed = self.liabilities(ctx, storage, unit);
        let profit = custodied.saturating_sub(owed);

        storage.balances.set(&ctx.address, unit, profit);
        storage
            .events
            .emit(ctx.clock.now(), Event::Profit { amount: profit, unit });

        info!(unit = %unit, custodied, owed, profit, "profit realized");
        Ok(profit)
    }
}

// ---------------------------------------------------------------------------
// Bank component
// ---------------------------------------------------------------------------

/// The bank as deployed: proxy, storage, and resolved collaborators.
pub struct Bank {
    ctx: BankContext,
    proxy: Proxy<dyn BankLogic>,
    storage: BankStorage,
}

impl Bank {
    pub fn new(ctx: BankContext, owner: Address, logic: Arc<dyn BankLogic>) -> Result<Self, BankError> {
        ctx.config.validate()?;
        let storage = BankStorage::default();
        if logic.schema_version() != storage.schema_version {
            return Err(ProxyError::IncompatibleStorage {
                live: storage.schema_version,
                candidate: logic.schema_version(),
            }
            .into());
        }
        Ok(Self {
            proxy: Proxy::new(owner, logic)?,
            ctx,
            storage,
        })
    }

    pub fn address(&self) -> Address {
        self.ctx.address
    }

    pub fn controller(&self) -> Address {
        self.ctx.controller
    }

    pub fn deposit(
        &mut self,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<Amount, BankError> {
        self.proxy
            .implementation()
            .deposit(&self.ctx, &mut self.storage, caller, for_user, amount, unit)
    }

    pub fn credit(
        &mut self,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), BankError> {
        self.proxy
            .implementation()
            .credit(&self.ctx, &mut self.storage, caller, for_user, amount, unit)
    }

    pub fn credit_batch(
        &mut self,
        caller: &Address,
        unit: Unit,
        payouts: &[(Address, Amount)],
    ) -> Result<(), BankError> {
        self.proxy
            .implementation()
            .credit_batch(&self.ctx, &mut self.storage, caller, unit, payouts)
    }

    pub fn withdraw(
        &mut self,
        caller: &Address,
        for_user: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), BankError> {
        self.proxy
            .implementation()
            .withdraw(&self.ctx, &mut self.storage, caller, for_user, amount, unit)
    }

    pub fn emit_profit(&mut self, unit: Unit) -> Result<Amount, BankError> {
        self.proxy
            .implementation()
            .emit_profit(&self.ctx, &mut self.storage, unit)
    }

    pub fn get_user_balance(&self, user: &Address, unit: Unit) -> Amount {
        self.proxy.implementation().user_balance(&self.storage, user, unit)
    }

    /// The bank's own fee and profit balance.
    pub fn get_own_balance(&self, unit: Unit) -> Amount {
        self.get_user_balance(&self.ctx.address, unit)
    }

    pub fn get_escrowed(&self, unit: Unit) -> Amount {
        self.proxy.implementation().escrowed(&self.storage, unit)
    }

    pub fn get_liabilities(&self, unit: Unit) -> Amount {
        self.proxy
            .implementation()
            .liabilities(&self.ctx, &self.storage, unit)
    }

    /// Swap the bank logic; balances and escrow are kept.
    pub fn upgrade(&mut self, caller: &Address, logic: Arc<dyn BankLogic>) -> Result<Upgraded, BankError> {
        let upgraded = self.proxy.set_implementation(caller, logic)?;
        self.storage.events.emit(
            self.ctx.clock.now(),
            Event::Upgraded {
                implementation: upgraded.implementation,
                version: upgraded.version.clone(),
            },
        );
        Ok(upgraded)
    }

    pub fn freeze_implementation(&mut self, caller: &Address) -> Result<(), BankError> {
        Ok(self.proxy.freeze_implementation(caller)?)
    }

    pub fn proxy(&self) -> &Proxy<dyn BankLogic> {
        &self.proxy
    }

    pub fn storage(&self) -> &BankStorage {
        &self.storage
    }

    pub fn events(&self) -> &EventLog {
        &self.storage.events
    }
}
