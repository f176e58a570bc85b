//! # Pledge Controller
//!
//! The pledge and judgement state machine.
//!
//! ## Lifecycle
//!
//! ```text
//!            end_date                end_date + judgement period
//!   Active ─────────────► Judgeable ─────────────────────► Expired ──settle──► Settled
//!                            │
//!                            │ failing majority
//!                            ▼
//!                          Failed   (pot split across the panel)
//! ```
//!
//! A pledge is created with its judges' signatures over the pledge
//! fingerprint, so judges never have to be online at creation time. After
//! the end date each judge may vote once until the judgement window closes.
//! The moment strictly more than half the panel votes "not passed", the
//! remaining balance is split evenly across the whole panel in the same
//! call; any indivisible remainder goes to the bank's own account.
//!
//! If the window closes without a failing majority the creator gets the
//! balance back. That credit happens the first time the pledge is observed
//! through a settlement path: [`Controller::settle_pledge`],
//! [`Controller::sweep_user`], or the creator's own [`Controller::withdraw`].
//! Read accessors never mutate.
//!
//! ## Atomicity
//!
//! Every operation checks all of its preconditions before it mutates
//! anything, and the bank calls it makes are themselves all-or-nothing. A
//! failed call leaves controller, bank, and assets exactly as they were.
//! `withdraw` compares the amount against the caller's balance plus
//! everything its sweep would settle, before settling anything.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use vouch_protocol::clock::{Clock, Timestamp};
use vouch_protocol::config::{ConfigError, EngineConfig, FINGERPRINT_CONTEXT, MAX_JUDGES, MIN_JUDGES};
use vouch_protocol::crypto::hash::domain_separated_hash_multi;
use vouch_protocol::crypto::signatures::{SignatureRecovery, SignedDigest};
use vouch_protocol::identity::Address;
use vouch_protocol::vault::{Amount, Unit};

use crate::bank::{Bank, BankError};
use crate::events::{Event, EventLog};
use crate::proxy::{Implementation, Proxy, ProxyError, Upgraded};

/// Storage schema understood by [`PledgeEngineV1`].
pub const CONTROLLER_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Broad classification of a [`PledgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is malformed.
    Validation,
    /// The caller may not do this.
    Authorization,
    /// The request is fine but the pledge or contract is in the wrong state.
    State,
    /// Not enough funds or allowance somewhere.
    Resource,
}

/// Errors from the pledge controller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PledgeError {
    /// The controller is locked by its admin.
    #[error("contract locked")]
    ContractLocked,

    /// The panel must have at least one judge.
    #[error("at least {min} judge needed, got {requested}")]
    TooFewJudges { requested: u8, min: u8 },

    /// The panel may have at most [`MAX_JUDGES`] judges.
    #[error("max {max} judges allowed, got {requested}")]
    TooManyJudges { requested: u8, max: u8 },

    /// The end date must be strictly after creation time.
    #[error("end date must be in future: end {end_date}, now {now}")]
    EndDateNotInFuture { end_date: Timestamp, now: Timestamp },

    /// The pot is below the configured minimum.
    #[error("pot amount must be at least {minimum}, got {pot}")]
    PotBelowMinimum { pot: Amount, minimum: Amount },

    /// A judge signature is missing or does not recover.
    #[error("invalid judge signature at slot {index}")]
    InvalidJudgeSignature { index: usize },

    /// A signature recovers to the creator.
    #[error("creator cannot be judge")]
    CreatorCannotBeJudge,

    /// Two signatures recover to the same judge.
    #[error("duplicate judge found: {judge}")]
    DuplicateJudge { judge: Address },

    #[error("pledge not found: {0}")]
    PledgeNotFound(u64),

    #[error("judgement not found: {0}")]
    JudgementNotFound(u64),

    /// Judging opens only after the end date.
    #[error("pledge {pledge_id} not yet ended")]
    NotYetEnded { pledge_id: u64 },

    /// The judgement window has elapsed.
    #[error("pledge {pledge_id} already expired")]
    JudgementWindowClosed { pledge_id: u64 },

    /// A failing majority has already been reached.
    #[error("pledge {pledge_id} already failed")]
    AlreadyFailed { pledge_id: u64 },

    /// The caller is not on the pledge's panel.
    #[error("must be a judge: {caller}")]
    NotAJudge { caller: Address },

    /// The judge has already voted on this pledge.
    #[error("already judged: {judge}")]
    AlreadyJudged { judge: Address },

    /// The pledge cannot be settled yet.
    #[error("pledge {pledge_id} not withdrawable")]
    NotWithdrawable { pledge_id: u64 },

    /// The pledge balance has already been paid out.
    #[error("pledge {pledge_id} already settled")]
    AlreadySettled { pledge_id: u64 },

    /// Lock and unlock are admin-only.
    #[error("must be admin: {caller}")]
    NotAdmin { caller: Address },

    #[error("amount overflow")]
    AmountOverflow,

    /// The controller was handed a config that fails validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl PledgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TooFewJudges { .. }
            | Self::TooManyJudges { .. }
            | Self::EndDateNotInFuture { .. }
            | Self::PotBelowMinimum { .. }
            | Self::InvalidJudgeSignature { .. }
            | Self::CreatorCannotBeJudge
            | Self::DuplicateJudge { .. }
            | Self::AmountOverflow
            | Self::Config(_) => ErrorKind::Validation,

            Self::NotAJudge { .. } | Self::NotAdmin { .. } => ErrorKind::Authorization,

            Self::ContractLocked
            | Self::PledgeNotFound(_)
            | Self::JudgementNotFound(_)
            | Self::NotYetEnded { .. }
            | Self::JudgementWindowClosed { .. }
            | Self::AlreadyFailed { .. }
            | Self::AlreadyJudged { .. }
            | Self::NotWithdrawable { .. }
            | Self::AlreadySettled { .. } => ErrorKind::State,

            Self::Bank(BankError::NotController { .. })
            | Self::Proxy(ProxyError::Unauthorized { .. }) => ErrorKind::Authorization,
            Self::Bank(BankError::AmountOverflow | BankError::Config(_)) => ErrorKind::Validation,
            Self::Bank(_) => ErrorKind::Resource,
            Self::Proxy(_) => ErrorKind::State,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where a pledge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PledgeStatus {
    /// Before the end date.
    Active,
    /// Inside the judgement window, still open to votes.
    Judgeable,
    /// Window closed without a failing majority; balance not yet returned.
    Expired,
    /// A failing majority was reached and the panel was paid.
    Failed,
    /// The creator was credited the balance.
    Settled,
}

impl PledgeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PledgeStatus::Failed | PledgeStatus::Settled)
    }
}

impl fmt::Display for PledgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PledgeStatus::Active => write!(f, "Active"),
            PledgeStatus::Judgeable => write!(f, "Judgeable"),
            PledgeStatus::Expired => write!(f, "Expired"),
            PledgeStatus::Failed => write!(f, "Failed"),
            PledgeStatus::Settled => write!(f, "Settled"),
        }
    }
}

/// A locked commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pledge {
    pub id: u64,
    pub creator: Address,
    /// Amount locked at creation, before the fee.
    pub pot: Amount,
    pub unit: Unit,
    pub end_date: Timestamp,
    pub num_judges: u8,
    /// Panel, in signature order.
    pub judges: Vec<Address>,
    /// Judgement id per panel slot, once that judge has voted.
    pub judgements: Vec<Option<u64>>,
    /// What is still owed out of this pledge.
    pub balance: Amount,
    pub num_judgements: u8,
    pub num_failed_judgements: u8,
    pub created_at: Timestamp,
    pub settled_at: Option<Timestamp>,
}

impl Pledge {
    /// Strictly more than half of the panel voted "not passed".
    pub fn is_failed(&self) -> bool {
        self.num_failed_judgements > self.num_judges / 2
    }

    /// Last instant at which a vote is accepted.
    pub fn judgement_deadline(&self, judgement_period: u64) -> Timestamp {
        self.end_date.saturating_add(judgement_period)
    }

    pub fn is_judgeable(&self, now: Timestamp, judgement_period: u64) -> bool {
        self.end_date < now
            && now <= self.judgement_deadline(judgement_period)
            && self.num_judgements < self.num_judges
            && !self.is_failed()
    }

    pub fn is_withdrawable(&self, now: Timestamp, judgement_period: u64) -> bool {
        now > self.judgement_deadline(judgement_period) || self.is_failed()
    }

    pub fn status(&self, now: Timestamp, judgement_period: u64) -> PledgeStatus {
        if self.is_failed() {
            PledgeStatus::Failed
        } else if self.settled_at.is_some() {
            PledgeStatus::Settled
        } else if now <= self.end_date {
            PledgeStatus::Active
        } else if now <= self.judgement_deadline(judgement_period) {
            PledgeStatus::Judgeable
        } else {
            PledgeStatus::Expired
        }
    }

    pub fn judge_index(&self, judge: &Address) -> Option<usize> {
        self.judges.iter().position(|j| j == judge)
    }
}

/// One judge's vote on one pledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgement {
    pub id: u64,
    pub pledge_id: u64,
    pub judge: Address,
    pub passed: bool,
    pub created_at: Timestamp,
}

/// Per-address bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub num_pledges_created: u64,
    pub num_pledges_judged: u64,
    /// Index into `created_pledges` of the oldest non-terminal pledge.
    pub oldest_active_created_pledge_index: u64,
    /// Index into `judged_pledges` of the oldest non-terminal pledge.
    pub oldest_active_judged_pledge_index: u64,
    pub created_pledges: Vec<u64>,
    pub judged_pledges: Vec<u64>,
}

/// Parameters for a new pledge.
///
/// `signatures[i]` is judge `i`'s signature over the pledge fingerprint;
/// only the first `num_judges` slots are read.
#[derive(Debug, Clone)]
pub struct PledgeRequest {
    pub pot: Amount,
    pub unit: Unit,
    pub end_date: Timestamp,
    pub num_judges: u8,
    pub signatures: Vec<SignedDigest>,
}

impl PledgeRequest {
    /// The digest the judges must sign for `creator` to submit this request.
    pub fn fingerprint(&self, creator: &Address) -> [u8; 32] {
        pledge_fingerprint(creator, self.pot, self.unit, self.end_date, self.num_judges)
    }
}

/// Domain-separated digest over the pledge parameters judges sign.
pub fn pledge_fingerprint(
    creator: &Address,
    pot: Amount,
    unit: Unit,
    end_date: Timestamp,
    num_judges: u8,
) -> [u8; 32] {
    domain_separated_hash_multi(
        FINGERPRINT_CONTEXT,
        &[
            &creator.as_bytes()[..],
            &pot.to_be_bytes()[..],
            &unit.to_fixed_bytes()[..],
            &end_date.to_be_bytes()[..],
            &[num_judges][..],
        ],
    )
}

// ---------------------------------------------------------------------------
// Context & storage
// ---------------------------------------------------------------------------

/// Resolved collaborators, fixed at deployment.
#[derive(Clone)]
pub struct ControllerContext {
    /// The controller's address: the bank only takes deposits and credits
    /// from it.
    pub address: Address,
    pub config: EngineConfig,
    pub bank: Arc<Mutex<Bank>>,
    pub clock: Arc<dyn Clock>,
    pub recovery: Arc<dyn SignatureRecovery>,
}

/// Controller state. Survives logic upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStorage {
    pub schema_version: u32,
    pub admin: Address,
    pub locked: bool,
    /// Pledge `id` lives at index `id - 1`.
    pub pledges: Vec<Pledge>,
    /// Judgement `id` lives at index `id - 1`.
    pub judgements: Vec<Judgement>,
    pub users: BTreeMap<Address, User>,
    pub events: EventLog,
}

impl ControllerStorage {
    pub fn new(admin: Address) -> Self {
        Self {
            schema_version: CONTROLLER_SCHEMA_VERSION,
            admin,
            locked: false,
            pledges: Vec::new(),
            judgements: Vec::new(),
            users: BTreeMap::new(),
            events: EventLog::new(),
        }
    }

    pub fn pledge(&self, pledge_id: u64) -> Result<&Pledge, PledgeError> {
        pledge_id
            .checked_sub(1)
            .and_then(|idx| self.pledges.get(idx as usize))
            .ok_or(PledgeError::PledgeNotFound(pledge_id))
    }

    fn pledge_mut(&mut self, pledge_id: u64) -> Result<&mut Pledge, PledgeError> {
        pledge_id
            .checked_sub(1)
            .and_then(|idx| self.pledges.get_mut(idx as usize))
            .ok_or(PledgeError::PledgeNotFound(pledge_id))
    }

    pub fn judgement(&self, judgement_id: u64) -> Result<&Judgement, PledgeError> {
        judgement_id
            .checked_sub(1)
            .and_then(|idx| self.judgements.get(idx as usize))
            .ok_or(PledgeError::JudgementNotFound(judgement_id))
    }

    fn ensure_admin(&self, caller: &Address) -> Result<(), PledgeError> {
        if *caller != self.admin {
            warn!(caller = %caller, "rejected admin-only controller call");
            return Err(PledgeError::NotAdmin { caller: *caller });
        }
        Ok(())
    }

    /// Pledges `user` created from their cursor onwards.
    fn open_created_pledges(&self, user: &Address) -> Vec<u64> {
        match self.users.get(user) {
            Some(record) => {
                let start = (record.oldest_active_created_pledge_index as usize)
                    .min(record.created_pledges.len());
                record.created_pledges[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// What a sweep of `user` would credit them in `unit` right now.
    fn expired_balance(
        &self,
        user: &Address,
        unit: Unit,
        now: Timestamp,
        period: u64,
    ) -> Result<Amount, PledgeError> {
        let mut total: Amount = 0;
        for pledge_id in self.open_created_pledges(user) {
            let pledge = self.pledge(pledge_id)?;
            if pledge.unit == unit && pledge.status(now, period) == PledgeStatus::Expired {
                total = total
                    .checked_add(pledge.balance)
                    .ok_or(PledgeError::AmountOverflow)?;
            }
        }
        Ok(total)
    }

    /// Move a user's cursors past every terminal pledge at the front of
    /// their lists.
    fn advance_cursors(&mut self, user: &Address, now: Timestamp, period: u64) {
        let Some(record) = self.users.get(user) else {
            return;
        };
        let is_terminal = |id: &u64| {
            self.pledge(*id)
                .map(|p| p.status(now, period).is_terminal())
                .unwrap_or(true)
        };

        let created = first_non_terminal(
            &record.created_pledges,
            record.oldest_active_created_pledge_index,
            is_terminal,
        );
        let judged = first_non_terminal(
            &record.judged_pledges,
            record.oldest_active_judged_pledge_index,
            is_terminal,
        );

        if let Some(record) = self.users.get_mut(user) {
            record.oldest_active_created_pledge_index = created;
            record.oldest_active_judged_pledge_index = judged;
        }
    }
}

fn first_non_terminal(ids: &[u64], from: u64, is_terminal: impl Fn(&u64) -> bool) -> u64 {
    let start = (from as usize).min(ids.len());
    let skipped = ids[start..].iter().take_while(|id| is_terminal(*id)).count();
    (start + skipped) as u64
}

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

/// Pledge engine logic. Derived reads have default implementations.
pub trait ControllerLogic: Implementation {
    fn create_pledge(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        caller: &Address,
        request: &PledgeRequest,
    ) -> Result<u64, PledgeError>;

    /// Record a vote and pay out the panel on a failing majority. Returns
    /// the judgement id.
    fn judge_pledge(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        caller: &Address,
        pledge_id: u64,
        passed: bool,
    ) -> Result<u64, PledgeError>;

    /// Credit an expired pledge's balance to its creator. Returns the
    /// amount credited.
    fn settle_pledge(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        pledge_id: u64,
    ) -> Result<Amount, PledgeError>;

    /// Settle every expired pledge `user` created and advance their
    /// cursors. Returns the ids settled.
    fn sweep_user(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        user: &Address,
    ) -> Result<Vec<u64>, PledgeError>;

    fn withdraw(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        caller: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), PledgeError>;

    fn set_locked(
        &self,
        storage: &mut ControllerStorage,
        caller: &Address,
        locked: bool,
    ) -> Result<(), PledgeError> {
        storage.ensure_admin(caller)?;
        storage.locked = locked;
        info!(locked, "controller lock changed");
        Ok(())
    }

    fn pledge_status(
        &self,
        ctx: &ControllerContext,
        storage: &ControllerStorage,
        pledge_id: u64,
    ) -> Result<PledgeStatus, PledgeError> {
        let pledge = storage.pledge(pledge_id)?;
        Ok(pledge.status(ctx.clock.now(), ctx.config.judgement_period_secs))
    }

    fn is_pledge_judgeable(
        &self,
        ctx: &ControllerContext,
        storage: &ControllerStorage,
        pledge_id: u64,
    ) -> Result<bool, PledgeError> {
        let pledge = storage.pledge(pledge_id)?;
        Ok(pledge.is_judgeable(ctx.clock.now(), ctx.config.judgement_period_secs))
    }

    fn is_pledge_withdrawable(
        &self,
        ctx: &ControllerContext,
        storage: &ControllerStorage,
        pledge_id: u64,
    ) -> Result<bool, PledgeError> {
        let pledge = storage.pledge(pledge_id)?;
        Ok(pledge.is_withdrawable(ctx.clock.now(), ctx.config.judgement_period_secs))
    }

    fn calculate_pledge_fingerprint(
        &self,
        creator: &Address,
        pot: Amount,
        unit: Unit,
        end_date: Timestamp,
        num_judges: u8,
    ) -> [u8; 32] {
        pledge_fingerprint(creator, pot, unit, end_date, num_judges)
    }
}

/// First pledge engine logic module.
#[derive(Debug, Clone)]
pub struct PledgeEngineV1 {
    address: Address,
}

impl PledgeEngineV1 {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Recover the panel from the request signatures.
    fn recover_panel(
        ctx: &ControllerContext,
        caller: &Address,
        request: &PledgeRequest,
        digest: &[u8; 32],
    ) -> Result<Vec<Address>, PledgeError> {
        let mut judges: Vec<Address> = Vec::with_capacity(request.num_judges as usize);
        for index in 0..request.num_judges as usize {
            let signature = request
                .signatures
                .get(index)
                .ok_or(PledgeError::InvalidJudgeSignature { index })?;
            let judge = ctx
                .recovery
                .recover(digest, signature)
                .map_err(|err| {
                    debug!(index, error = %err, "judge signature rejected");
                    PledgeError::InvalidJudgeSignature { index }
                })?;

            if judge == *caller {
                return Err(PledgeError::CreatorCannotBeJudge);
            }
            if judges.contains(&judge) {
                return Err(PledgeError::DuplicateJudge { judge });
            }
            judges.push(judge);
        }
        Ok(judges)
    }

    fn settle(
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        pledge_id: u64,
        now: Timestamp,
    ) -> Result<Amount, PledgeError> {
        let period = ctx.config.judgement_period_secs;
        let pledge = storage.pledge(pledge_id)?;
        if !pledge.is_withdrawable(now, period) {
            return Err(PledgeError::NotWithdrawable { pledge_id });
        }
        if pledge.is_failed() || pledge.settled_at.is_some() {
            return Err(PledgeError::AlreadySettled { pledge_id });
        }

        let (creator, amount, unit) = (pledge.creator, pledge.balance, pledge.unit);
        if amount > 0 {
            ctx.bank.lock().credit(&ctx.address, &creator, amount, unit)?;
        }

        let pledge = storage.pledge_mut(pledge_id)?;
        pledge.balance = 0;
        pledge.settled_at = Some(now);
        storage.events.emit(
            now,
            Event::PledgeSettled {
                pledge_id,
                creator,
                amount,
                unit,
            },
        );

        info!(pledge_id, creator = %creator, amount, unit = %unit, "pledge settled");
        Ok(amount)
    }
}

impl Implementation for PledgeEngineV1 {
    fn address(&self) -> Address {
        self.address
    }

    fn version(&self) -> &str {
        "v1"
    }

    fn schema_version(&self) -> u32 {
        CONTROLLER_SCHEMA_VERSION
    }
}

impl ControllerLogic for PledgeEngineV1 {
    fn create_pledge(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        caller: &Address,
        request: &PledgeRequest,
    ) -> Result<u64, PledgeError> {
        if storage.locked {
            return Err(PledgeError::ContractLocked);
        }
        if request.num_judges < MIN_JUDGES {
            return Err(PledgeError::TooFewJudges {
                requested: request.num_judges,
                min: MIN_JUDGES,
            });
        }
        if request.num_judges > MAX_JUDGES {
            return Err(PledgeError::TooManyJudges {
                requested: request.num_judges,
                max: MAX_JUDGES,
            });
        }

        let now = ctx.clock.now();
        if request.end_date <= now {
            return Err(PledgeError::EndDateNotInFuture {
                end_date: request.end_date,
                now,
            });
        }
        if request.pot < ctx.config.min_pot {
            return Err(PledgeError::PotBelowMinimum {
                pot: request.pot,
                minimum: ctx.config.min_pot,
            });
        }

        let digest = request.fingerprint(caller);
        let judges = Self::recover_panel(ctx, caller, request, &digest)?;

        let balance = ctx
            .bank
            .lock()
            .deposit(&ctx.address, caller, request.pot, request.unit)?;

        let pledge_id = storage.pledges.len() as u64 + 1;
        storage.pledges.push(Pledge {
            id: pledge_id,
            creator: *caller,
            pot: request.pot,
            unit: request.unit,
            end_date: request.end_date,
            num_judges: request.num_judges,
            judgements: vec![None; judges.len()],
            judges: judges.clone(),
            balance,
            num_judgements: 0,
            num_failed_judgements: 0,
            created_at: now,
            settled_at: None,
        });

        let creator = storage.users.entry(*caller).or_default();
        creator.num_pledges_created += 1;
        creator.created_pledges.push(pledge_id);
        for judge in &judges {
            let record = storage.users.entry(*judge).or_default();
            record.num_pledges_judged += 1;
            record.judged_pledges.push(pledge_id);
        }

        storage.events.emit(now, Event::NewPledge { pledge_id });
        info!(
            pledge_id,
            creator = %caller,
            pot = request.pot,
            balance,
            unit = %request.unit,
            end_date = request.end_date,
            num_judges = request.num_judges,
            "pledge created"
        );
        Ok(pledge_id)
    }

    fn judge_pledge(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        caller: &Address,
        pledge_id: u64,
        passed: bool,
    ) -> Result<u64, PledgeError> {
        if storage.locked {
            return Err(PledgeError::ContractLocked);
        }

        let now = ctx.clock.now();
        let pledge = storage.pledge(pledge_id)?;
        if now <= pledge.end_date {
            return Err(PledgeError::NotYetEnded { pledge_id });
        }
        if now > pledge.judgement_deadline(ctx.config.judgement_period_secs) {
            return Err(PledgeError::JudgementWindowClosed { pledge_id });
        }
        if pledge.is_failed() {
            return Err(PledgeError::AlreadyFailed { pledge_id });
        }
        let slot = pledge
            .judge_index(caller)
            .ok_or(PledgeError::NotAJudge { caller: *caller })?;
        if pledge.judgements[slot].is_some() {
            return Err(PledgeError::AlreadyJudged { judge: *caller });
        }

        let fails_now = !passed && pledge.num_failed_judgements + 1 > pledge.num_judges / 2;

        if fails_now {
            let share = pledge.balance / Amount::from(pledge.num_judges);
            let remainder = pledge.balance - share * Amount::from(pledge.num_judges);

            let mut bank = ctx.bank.lock();
            let mut payouts: Vec<(Address, Amount)> =
                pledge.judges.iter().map(|judge| (*judge, share)).collect();
            if remainder > 0 {
                payouts.push((bank.address(), remainder));
            }
            bank.credit_batch(&ctx.address, pledge.unit, &payouts)?;

            info!(
                pledge_id,
                balance = pledge.balance,
                share,
                remainder,
                unit = %pledge.unit,
                "pledge failed, panel paid"
            );
        }

        let judgement_id = storage.judgements.len() as u64 + 1;
        storage.judgements.push(Judgement {
            id: judgement_id,
            pledge_id,
            judge: *caller,
            passed,
            created_at: now,
        });

        let pledge = storage.pledge_mut(pledge_id)?;
        pledge.judgements[slot] = Some(judgement_id);
        pledge.num_judgements += 1;
        if !passed {
            pledge.num_failed_judgements += 1;
        }
        if fails_now {
            pledge.balance = 0;
        }

        storage.events.emit(
            now,
            Event::Judgement {
                judge: *caller,
                pledge_id,
                passed,
            },
        );
        debug!(pledge_id, judge = %caller, passed, judgement_id, "judgement recorded");
        Ok(judgement_id)
    }

    fn settle_pledge(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        pledge_id: u64,
    ) -> Result<Amount, PledgeError> {
        let now = ctx.clock.now();
        let amount = Self::settle(ctx, storage, pledge_id, now)?;
        let creator = storage.pledge(pledge_id)?.creator;
        storage.advance_cursors(&creator, now, ctx.config.judgement_period_secs);
        Ok(amount)
    }

    fn sweep_user(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        user: &Address,
    ) -> Result<Vec<u64>, PledgeError> {
        let now = ctx.clock.now();
        let period = ctx.config.judgement_period_secs;
        if !storage.users.contains_key(user) {
            return Ok(Vec::new());
        }

        let mut settled = Vec::new();
        for pledge_id in storage.open_created_pledges(user) {
            if storage.pledge(pledge_id)?.status(now, period) == PledgeStatus::Expired {
                Self::settle(ctx, storage, pledge_id, now)?;
                settled.push(pledge_id);
            }
        }

        storage.advance_cursors(user, now, period);
        if !settled.is_empty() {
            debug!(user = %user, count = settled.len(), "swept expired pledges");
        }
        Ok(settled)
    }

    fn withdraw(
        &self,
        ctx: &ControllerContext,
        storage: &mut ControllerStorage,
        caller: &Address,
        amount: Amount,
        unit: Unit,
    ) -> Result<(), PledgeError> {
        let now = ctx.clock.now();
        let unsettled = storage.expired_balance(caller, unit, now, ctx.config.judgement_period_secs)?;
        let available = ctx
            .bank
            .lock()
            .get_user_balance(caller, unit)
            .checked_add(unsettled)
            .ok_or(PledgeError::AmountOverflow)?;
        if available < amount {
            return Err(BankError::InsufficientBalance {
                user: *caller,
                unit,
                available,
                requested: amount,
            }
            .into());
        }

        self.sweep_user(ctx, storage, caller)?;
        ctx.bank.lock().withdraw(&ctx.address, caller, amount, unit)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller component
// ---------------------------------------------------------------------------

/// The pledge engine as deployed: proxy, storage, and resolved collaborators.
pub struct Controller {
    ctx: ControllerContext,
    proxy: Proxy<dyn ControllerLogic>,
    storage: ControllerStorage,
}

impl Controller {
    pub fn new(
        ctx: ControllerContext,
        owner: Address,
        admin: Address,
        logic: Arc<dyn ControllerLogic>,
    ) -> Result<Self, PledgeError> {
        ctx.config.validate()?;
        let storage = ControllerStorage::new(admin);
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

    pub fn admin(&self) -> Address {
        self.storage.admin
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn bank(&self) -> Arc<Mutex<Bank>> {
        self.ctx.bank.clone()
    }

    // -- Mutations ---------------------------------------------------------

    pub fn create_pledge(&mut self, caller: &Address, request: &PledgeRequest) -> Result<u64, PledgeError> {
        self.proxy
            .implementation()
            .create_pledge(&self.ctx, &mut self.storage, caller, request)
    }

    pub fn judge_pledge(&mut self, caller: &Address, pledge_id: u64, passed: bool) -> Result<u64, PledgeError> {
        self.proxy
            .implementation()
            .judge_pledge(&self.ctx, &mut self.storage, caller, pledge_id, passed)
    }

    pub fn settle_pledge(&mut self, pledge_id: u64) -> Result<Amount, PledgeError> {
        self.proxy
            .implementation()
            .settle_pledge(&self.ctx, &mut self.storage, pledge_id)
    }

    pub fn sweep_user(&mut self, user: &Address) -> Result<Vec<u64>, PledgeError> {
        self.proxy
            .implementation()
            .sweep_user(&self.ctx, &mut self.storage, user)
    }

    pub fn withdraw(&mut self, caller: &Address, amount: Amount, unit: Unit) -> Result<(), PledgeError> {
        self.proxy
            .implementation()
            .withdraw(&self.ctx, &mut self.storage, caller, amount, unit)
    }

    pub fn lock(&mut self, caller: &Address) -> Result<(), PledgeError> {
        self.proxy
            .implementation()
            .set_locked(&mut self.storage, caller, true)
    }

    pub fn unlock(&mut self, caller: &Address) -> Result<(), PledgeError> {
        self.proxy
            .implementation()
            .set_locked(&mut self.storage, caller, false)
    }

    // -- Reads -------------------------------------------------------------

    pub fn get_pledge(&self, pledge_id: u64) -> Result<&Pledge, PledgeError> {
        self.storage.pledge(pledge_id)
    }

    /// Judge at panel slot `index`, or `None` past the panel size.
    pub fn get_pledge_judge(&self, pledge_id: u64, index: usize) -> Result<Option<Address>, PledgeError> {
        Ok(self.storage.pledge(pledge_id)?.judges.get(index).copied())
    }

    /// The judgement `judge` cast on the pledge; `None` if they have not
    /// voted or are not on the panel.
    pub fn get_pledge_judgement(&self, pledge_id: u64, judge: &Address) -> Result<Option<u64>, PledgeError> {
        let pledge = self.storage.pledge(pledge_id)?;
        Ok(pledge
            .judge_index(judge)
            .and_then(|slot| pledge.judgements[slot]))
    }

    pub fn get_judgement(&self, judgement_id: u64) -> Result<&Judgement, PledgeError> {
        self.storage.judgement(judgement_id)
    }

    /// Bookkeeping for `user`; all zeros if they never took part.
    pub fn get_user(&self, user: &Address) -> User {
        self.storage.users.get(user).cloned().unwrap_or_default()
    }

    pub fn num_pledges(&self) -> u64 {
        self.storage.pledges.len() as u64
    }

    pub fn num_judgements(&self) -> u64 {
        self.storage.judgements.len() as u64
    }

    pub fn is_locked(&self) -> bool {
        self.storage.locked
    }

    pub fn pledge_status(&self, pledge_id: u64) -> Result<PledgeStatus, PledgeError> {
        self.proxy
            .implementation()
            .pledge_status(&self.ctx, &self.storage, pledge_id)
    }

    pub fn is_pledge_judgeable(&self, pledge_id: u64) -> Result<bool, PledgeError> {
        self.proxy
            .implementation()
            .is_pledge_judgeable(&self.ctx, &self.storage, pledge_id)
    }

    pub fn is_pledge_withdrawable(&self, pledge_id: u64) -> Result<bool, PledgeError> {
        self.proxy
            .implementation()
            .is_pledge_withdrawable(&self.ctx, &self.storage, pledge_id)
    }

    pub fn is_pledge_failed(&self, pledge_id: u64) -> Result<bool, PledgeError> {
        Ok(self.storage.pledge(pledge_id)?.is_failed())
    }

    pub fn calculate_pledge_fingerprint(
        &self,
        creator: &Address,
        pot: Amount,
        unit: Unit,
        end_date: Timestamp,
        num_judges: u8,
    ) -> [u8; 32] {
        self.proxy
            .implementation()
            .calculate_pledge_fingerprint(creator, pot, unit, end_date, num_judges)
    }

    pub fn get_user_balance(&self, user: &Address, unit: Unit) -> Amount {
        self.ctx.bank.lock().get_user_balance(user, unit)
    }

    pub fn events(&self) -> &EventLog {
        &self.storage.events
    }

    pub fn storage(&self) -> &ControllerStorage {
        &self.storage
    }

    // -- Administration ----------------------------------------------------

    /// Swap the engine logic; pledges, judgements, and users are kept.
    pub fn upgrade(&mut self, caller: &Address, logic: Arc<dyn ControllerLogic>) -> Result<Upgraded, PledgeError> {
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

    pub fn freeze_implementation(&mut self, caller: &Address) -> Result<(), PledgeError> {
        Ok(self.proxy.freeze_implementation(caller)?)
    }

    pub fn proxy(&self) -> &Proxy<dyn ControllerLogic> {
        &self.proxy
    }
}
