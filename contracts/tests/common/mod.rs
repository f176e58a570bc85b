//! Shared fixtures for the contracts integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use vouch_contracts::assets::{InMemoryAssets, ValueTransfer};
use vouch_contracts::controller::{Controller, PledgeRequest};
use vouch_contracts::deployment::Deployment;
use vouch_protocol::clock::{Clock, ManualClock, Timestamp};
use vouch_protocol::config::EngineConfig;
use vouch_protocol::crypto::keys::Keypair;
use vouch_protocol::crypto::signatures::{sign_digest, SignedDigest};
use vouch_protocol::identity::Address;
use vouch_protocol::logging::try_init_test_logging;
use vouch_protocol::vault::{Amount, Unit};

pub const START: Timestamp = 1_700_000_000;
pub const PLEDGE_DURATION: u64 = 10_000;
pub const INITIAL_FUNDS: Amount = 1_000_000_000_000;

/// Default config with a 1-unit minimum pot, so scenarios can use small
/// round numbers.
pub fn small_pot_config() -> EngineConfig {
    EngineConfig {
        min_pot: 1,
        ..EngineConfig::default()
    }
}

/// Deterministic keypair per index.
pub fn keypair(n: u8) -> Keypair {
    Keypair::from_seed(&[n; 32])
}

pub struct Harness {
    pub deployment: Deployment,
    pub assets: Arc<InMemoryAssets>,
    pub clock: Arc<ManualClock>,
    pub owner: Address,
    pub creator: Keypair,
    pub judges: Vec<Keypair>,
    pub outsider: Keypair,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        try_init_test_logging();

        let clock = Arc::new(ManualClock::new(START));
        let owner = keypair(200).address();
        let (deployment, assets) =
            Deployment::development(owner, config, clock.clone() as Arc<dyn Clock>).expect("deploy");

        let harness = Self {
            deployment,
            assets,
            clock,
            owner,
            creator: keypair(1),
            judges: vec![keypair(11), keypair(12), keypair(13)],
            outsider: keypair(99),
        };
        harness.fund(&harness.creator.address(), INITIAL_FUNDS);
        harness
    }

    pub fn controller(&mut self) -> &mut Controller {
        &mut self.deployment.controller
    }

    pub fn creator(&self) -> Address {
        self.creator.address()
    }

    pub fn judge(&self, i: usize) -> Address {
        self.judges[i].address()
    }

    /// Mint to `who` and approve the bank for all of it.
    pub fn fund(&self, who: &Address, amount: Amount) {
        self.assets.mint(who, Unit::Native, amount).expect("mint");
        self.assets
            .approve(who, &self.deployment.bank_address(), Unit::Native, Amount::MAX);
    }

    pub fn wallet(&self, who: &Address) -> Amount {
        self.assets.balance_of(who, Unit::Native)
    }

    pub fn ledger(&self, who: &Address) -> Amount {
        self.deployment.controller.get_user_balance(who, Unit::Native)
    }

    pub fn bank_own_balance(&self) -> Amount {
        self.deployment.bank.lock().get_own_balance(Unit::Native)
    }

    /// Build a request from `creator` signed by the first `num_judges` judges.
    pub fn request(&self, pot: Amount, num_judges: u8) -> PledgeRequest {
        let signers: Vec<&Keypair> = self.judges.iter().take(num_judges as usize).collect();
        self.request_signed_by(&self.creator.address(), pot, num_judges, &signers)
    }

    pub fn request_signed_by(
        &self,
        creator: &Address,
        pot: Amount,
        num_judges: u8,
        signers: &[&Keypair],
    ) -> PledgeRequest {
        let mut request = PledgeRequest {
            pot,
            unit: Unit::Native,
            end_date: self.clock.now() + PLEDGE_DURATION,
            num_judges,
            signatures: Vec::new(),
        };
        let digest = request.fingerprint(creator);
        request.signatures = signers.iter().map(|kp| sign_digest(kp, &digest)).collect();
        request
    }

    /// Re-sign an existing request after its parameters were edited.
    pub fn resign(&self, request: &mut PledgeRequest, signers: &[&Keypair]) {
        let digest = request.fingerprint(&self.creator());
        request.signatures = signers.iter().map(|kp| sign_digest(kp, &digest)).collect();
    }

    pub fn create(&mut self, pot: Amount, num_judges: u8) -> u64 {
        let request = self.request(pot, num_judges);
        let creator = self.creator();
        self.controller()
            .create_pledge(&creator, &request)
            .expect("create pledge")
    }

    pub fn vote(&mut self, judge: usize, pledge_id: u64, passed: bool) -> u64 {
        let addr = self.judge(judge);
        self.controller()
            .judge_pledge(&addr, pledge_id, passed)
            .expect("judge pledge")
    }

    /// Move the clock into the pledge's judgement window.
    pub fn enter_window(&self, pledge_id: u64) {
        let end = self.deployment.controller.get_pledge(pledge_id).unwrap().end_date;
        self.clock.set(end + 1);
    }

    /// Move the clock past the pledge's judgement window.
    pub fn close_window(&self, pledge_id: u64) {
        let end = self.deployment.controller.get_pledge(pledge_id).unwrap().end_date;
        let period = self.deployment.controller.config().judgement_period_secs;
        self.clock.set(end + period + 1);
    }
}

pub fn garbage_signature() -> SignedDigest {
    SignedDigest::from_bytes(vec![0x01])
}
