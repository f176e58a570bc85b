//! Integration tests for the pledge controller.
//!
//! These walk pledges through their whole lifecycle against a development
//! deployment: creation and its validation order, judging inside and
//! outside the window, majority payouts, expiry settlement, and
//! withdrawals through the bank.

mod common;

use common::{garbage_signature, keypair, small_pot_config, Harness, INITIAL_FUNDS};
use vouch_contracts::assets::{TransferError, ValueTransfer};
use vouch_contracts::bank::BankError;
use vouch_contracts::controller::{ErrorKind, PledgeError, PledgeStatus};
use vouch_contracts::deployment::DEV_YIELD_LABEL;
use vouch_contracts::events::Event;
use vouch_protocol::config::EngineConfig;
use vouch_protocol::identity::Address;
use vouch_protocol::vault::{Unit, GWEI};

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[test]
fn creation_withholds_fee_and_escrows_the_rest() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000_000, 3);

    assert_eq!(id, 1);
    let pledge = h.controller().get_pledge(id).unwrap().clone();
    assert_eq!(pledge.pot, 1_000_000);
    assert_eq!(pledge.balance, 999_000);
    assert_eq!(pledge.creator, h.creator());
    assert_eq!(pledge.judges, vec![h.judge(0), h.judge(1), h.judge(2)]);
    assert_eq!(pledge.created_at, common::START);

    assert_eq!(h.bank_own_balance(), 1_000);
    assert_eq!(h.deployment.bank.lock().get_escrowed(Unit::Native), 999_000);
    assert_eq!(h.wallet(&h.creator()), INITIAL_FUNDS - 1_000_000);
    assert_eq!(h.controller().num_pledges(), 1);
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Active);
}

#[test]
fn creation_records_users_and_panel() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 2);

    let creator_address = h.creator();
    let creator = h.controller().get_user(&creator_address);
    assert_eq!(creator.num_pledges_created, 1);
    assert_eq!(creator.created_pledges, vec![id]);

    let judge = h.judge(1);
    let record = h.controller().get_user(&judge);
    assert_eq!(record.num_pledges_judged, 1);
    assert_eq!(record.judged_pledges, vec![id]);

    assert_eq!(h.controller().get_pledge_judge(id, 1).unwrap(), Some(judge));
    assert_eq!(h.controller().get_pledge_judge(id, 2).unwrap(), None);
    assert_eq!(
        h.controller().events().last().unwrap().event,
        Event::NewPledge { pledge_id: id }
    );
}

#[test]
fn fingerprint_matches_request() {
    let h = Harness::new(small_pot_config());
    let request = h.request(5_000, 2);
    assert_eq!(
        h.deployment.controller.calculate_pledge_fingerprint(
            &h.creator(),
            request.pot,
            request.unit,
            request.end_date,
            request.num_judges
        ),
        request.fingerprint(&h.creator())
    );
}

// ---------------------------------------------------------------------------
// Creation failures (no funds may move)
// ---------------------------------------------------------------------------

fn assert_rejected(h: &mut Harness, request: &vouch_contracts::PledgeRequest, expected: PledgeError) {
    let creator = h.creator();
    let before = h.wallet(&creator);
    assert_eq!(h.controller().create_pledge(&creator, request).unwrap_err(), expected);
    assert_eq!(h.wallet(&creator), before);
    assert_eq!(h.controller().num_pledges(), 0);
    assert_eq!(h.bank_own_balance(), 0);
}

#[test]
fn locked_controller_rejects_creation() {
    let mut h = Harness::new(small_pot_config());
    let owner = h.owner;
    h.controller().lock(&owner).unwrap();
    assert!(h.controller().is_locked());

    let request = h.request(1_000, 3);
    assert_rejected(&mut h, &request, PledgeError::ContractLocked);

    h.controller().unlock(&owner).unwrap();
    let creator = h.creator();
    assert!(h.controller().create_pledge(&creator, &request).is_ok());
}

#[test]
fn only_admin_locks() {
    let mut h = Harness::new(small_pot_config());
    let outsider = h.outsider.address();
    assert_eq!(
        h.controller().lock(&outsider).unwrap_err(),
        PledgeError::NotAdmin { caller: outsider }
    );
    assert!(h.controller().unlock(&outsider).is_err());
    assert!(!h.controller().is_locked());
}

#[test]
fn panel_size_is_bounded() {
    let mut h = Harness::new(small_pot_config());

    let none = h.request(1_000, 0);
    assert_rejected(&mut h, &none, PledgeError::TooFewJudges { requested: 0, min: 1 });

    let mut four = h.request(1_000, 3);
    four.num_judges = 4;
    assert_rejected(&mut h, &four, PledgeError::TooManyJudges { requested: 4, max: 3 });
}

#[test]
fn end_date_must_be_in_future() {
    let mut h = Harness::new(small_pot_config());
    let mut request = h.request(1_000, 3);
    request.end_date = common::START;
    let expected = PledgeError::EndDateNotInFuture {
        end_date: common::START,
        now: common::START,
    };
    assert_eq!(expected.kind(), ErrorKind::Validation);
    assert_rejected(&mut h, &request, expected);
}

#[test]
fn pot_must_reach_minimum() {
    let mut h = Harness::new(EngineConfig::default());
    let request = h.request(GWEI - 1, 3);
    assert_rejected(
        &mut h,
        &request,
        PledgeError::PotBelowMinimum {
            pot: GWEI - 1,
            minimum: GWEI,
        },
    );

    let request = h.request(GWEI, 3);
    let creator = h.creator();
    assert!(h.controller().create_pledge(&creator, &request).is_ok());
}

#[test]
fn corrupted_or_missing_signature_rejected() {
    let mut h = Harness::new(small_pot_config());

    let mut corrupted = h.request(1_000, 3);
    corrupted.signatures[0] = garbage_signature();
    assert_rejected(&mut h, &corrupted, PledgeError::InvalidJudgeSignature { index: 0 });

    let mut short = h.request(1_000, 3);
    short.signatures.truncate(2);
    assert_rejected(&mut h, &short, PledgeError::InvalidJudgeSignature { index: 2 });
}

#[test]
fn signature_does_not_carry_over_to_other_parameters() {
    let mut h = Harness::new(small_pot_config());
    let mut request = h.request(1_000, 3);
    request.pot = 2_000;
    assert_rejected(&mut h, &request, PledgeError::InvalidJudgeSignature { index: 0 });
}

#[test]
fn duplicate_judge_rejected() {
    let mut h = Harness::new(small_pot_config());
    let mut request = h.request(1_000, 3);
    request.signatures[2] = request.signatures[0].clone();
    let judge = h.judge(0);
    assert_rejected(&mut h, &request, PledgeError::DuplicateJudge { judge });
}

#[test]
fn creator_cannot_judge_own_pledge() {
    let mut h = Harness::new(small_pot_config());
    let mut request = h.request(1_000, 3);
    let signers = [&h.judges[0], &h.creator, &h.judges[2]];
    h.resign(&mut request, &signers);
    assert_rejected(&mut h, &request, PledgeError::CreatorCannotBeJudge);
}

#[test]
fn unauthorized_funds_rejected() {
    let mut h = Harness::new(small_pot_config());
    let poor = keypair(50);
    h.assets.mint(&poor.address(), Unit::Native, 1_000).unwrap();

    let signers: Vec<_> = h.judges.iter().collect();
    let request = h.request_signed_by(&poor.address(), 1_000, 3, &signers);
    let err = h
        .controller()
        .create_pledge(&poor.address(), &request)
        .unwrap_err();
    assert!(matches!(
        err,
        PledgeError::Bank(BankError::Transfer(TransferError::AllowanceExceeded { .. }))
    ));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(h.wallet(&poor.address()), 1_000);
}

#[test]
fn insufficient_funds_rejected() {
    let mut h = Harness::new(small_pot_config());
    let poor = keypair(51);
    h.fund(&poor.address(), 99);

    let signers: Vec<_> = h.judges.iter().collect();
    let request = h.request_signed_by(&poor.address(), 100, 3, &signers);
    assert!(matches!(
        h.controller().create_pledge(&poor.address(), &request),
        Err(PledgeError::Bank(BankError::Transfer(TransferError::BalanceExceeded { .. })))
    ));
    assert_eq!(h.wallet(&poor.address()), 99);
    assert_eq!(h.controller().num_pledges(), 0);
}

// ---------------------------------------------------------------------------
// Judging
// ---------------------------------------------------------------------------

#[test]
fn judging_waits_for_end_date() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);
    let judge = h.judge(0);

    assert_eq!(
        h.controller().judge_pledge(&judge, id, true).unwrap_err(),
        PledgeError::NotYetEnded { pledge_id: id }
    );

    let end = h.controller().get_pledge(id).unwrap().end_date;
    h.clock.set(end);
    assert!(h.controller().judge_pledge(&judge, id, true).is_err());
    assert!(!h.controller().is_pledge_judgeable(id).unwrap());

    h.clock.set(end + 1);
    assert!(h.controller().is_pledge_judgeable(id).unwrap());
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Judgeable);
    h.controller().judge_pledge(&judge, id, true).unwrap();
}

#[test]
fn judging_closes_after_window() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);

    let end = h.controller().get_pledge(id).unwrap().end_date;
    let period = h.controller().config().judgement_period_secs;
    h.clock.set(end + period);
    h.vote(0, id, true);

    h.clock.set(end + period + 1);
    let judge = h.judge(1);
    assert_eq!(
        h.controller().judge_pledge(&judge, id, false).unwrap_err(),
        PledgeError::JudgementWindowClosed { pledge_id: id }
    );
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Expired);
}

#[test]
fn only_panel_members_vote_once() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);
    h.enter_window(id);

    let creator = h.creator();
    assert_eq!(
        h.controller().judge_pledge(&creator, id, false).unwrap_err(),
        PledgeError::NotAJudge { caller: creator }
    );
    let outsider = h.outsider.address();
    assert_eq!(
        h.controller().judge_pledge(&outsider, id, false).unwrap_err().kind(),
        ErrorKind::Authorization
    );

    h.vote(0, id, true);
    let judge = h.judge(0);
    assert_eq!(
        h.controller().judge_pledge(&judge, id, false).unwrap_err(),
        PledgeError::AlreadyJudged { judge }
    );
    assert_eq!(h.controller().num_judgements(), 1);
}

#[test]
fn unknown_pledge_and_lock_rejected() {
    let mut h = Harness::new(small_pot_config());
    let judge = h.judge(0);
    assert_eq!(
        h.controller().judge_pledge(&judge, 42, true).unwrap_err(),
        PledgeError::PledgeNotFound(42)
    );
    assert!(h.controller().get_pledge(0).is_err());

    let id = h.create(1_000, 3);
    h.enter_window(id);
    let owner = h.owner;
    h.controller().lock(&owner).unwrap();
    assert_eq!(
        h.controller().judge_pledge(&judge, id, true).unwrap_err(),
        PledgeError::ContractLocked
    );
}

#[test]
fn judgements_are_recorded_and_indexed() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);
    h.enter_window(id);

    let jid = h.vote(0, id, false);
    assert_eq!(jid, 1);

    let judgement = h.controller().get_judgement(jid).unwrap().clone();
    assert_eq!(judgement.pledge_id, id);
    assert_eq!(judgement.judge, h.judge(0));
    assert!(!judgement.passed);

    let (j0, j1, outsider) = (h.judge(0), h.judge(1), h.outsider.address());
    assert_eq!(h.controller().get_pledge_judgement(id, &j0).unwrap(), Some(jid));
    assert_eq!(h.controller().get_pledge_judgement(id, &j1).unwrap(), None);
    assert_eq!(h.controller().get_pledge_judgement(id, &outsider).unwrap(), None);
    assert_eq!(
        h.controller().get_judgement(99).unwrap_err(),
        PledgeError::JudgementNotFound(99)
    );

    assert_eq!(
        h.controller().events().last().unwrap().event,
        Event::Judgement {
            judge: j0,
            pledge_id: id,
            passed: false
        }
    );
}

// ---------------------------------------------------------------------------
// Majority and payouts
// ---------------------------------------------------------------------------

#[test]
fn two_judges_split_vote_does_not_fail() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 2);
    h.enter_window(id);

    h.vote(0, id, false);
    h.vote(1, id, true);

    assert!(!h.controller().is_pledge_failed(id).unwrap());
    assert!(!h.controller().is_pledge_judgeable(id).unwrap());
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 999);
    assert_eq!(h.ledger(&h.judge(0)), 0);
}

#[test]
fn two_judges_both_negative_fails() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(100, 2);
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 100);
    h.enter_window(id);

    h.vote(0, id, false);
    assert!(!h.controller().is_pledge_failed(id).unwrap());
    h.vote(1, id, false);

    assert!(h.controller().is_pledge_failed(id).unwrap());
    assert!(h.controller().is_pledge_withdrawable(id).unwrap());
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 0);
    assert_eq!(h.ledger(&h.judge(0)), 50);
    assert_eq!(h.ledger(&h.judge(1)), 50);
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Failed);
}

#[test]
fn remainder_goes_to_bank() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 2);
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 999);
    assert_eq!(h.bank_own_balance(), 1);
    h.enter_window(id);

    h.vote(0, id, false);
    h.vote(1, id, false);

    let (a, b) = (h.ledger(&h.judge(0)), h.ledger(&h.judge(1)));
    assert_eq!((a, b), (499, 499));
    assert_eq!(h.bank_own_balance(), 2);
    assert_eq!(a + b + 1, 999);
    assert_eq!(h.deployment.bank.lock().get_escrowed(Unit::Native), 0);
}

#[test]
fn three_judges_fail_on_second_negative() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);
    h.enter_window(id);

    h.vote(0, id, true);
    h.vote(1, id, false);
    assert!(!h.controller().is_pledge_failed(id).unwrap());
    h.vote(2, id, false);

    assert!(h.controller().is_pledge_failed(id).unwrap());
    for i in 0..3 {
        assert_eq!(h.ledger(&h.judge(i)), 333);
    }
    assert_eq!(h.bank_own_balance(), 1);
}

#[test]
fn votes_after_failure_rejected() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);
    h.enter_window(id);

    h.vote(0, id, false);
    h.vote(1, id, false);

    let judge = h.judge(2);
    assert_eq!(
        h.controller().judge_pledge(&judge, id, true).unwrap_err(),
        PledgeError::AlreadyFailed { pledge_id: id }
    );
    assert_eq!(h.ledger(&judge), 333);
}

#[test]
fn single_judge_takes_everything() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(50, 1);
    h.enter_window(id);
    h.vote(0, id, false);

    assert_eq!(h.ledger(&h.judge(0)), 50);
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 0);
}

// ---------------------------------------------------------------------------
// Expiry settlement
// ---------------------------------------------------------------------------

#[test]
fn expired_pledge_settles_to_creator() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 3);

    assert_eq!(
        h.controller().settle_pledge(id).unwrap_err(),
        PledgeError::NotWithdrawable { pledge_id: id }
    );

    h.enter_window(id);
    h.vote(0, id, false);
    assert!(h.controller().settle_pledge(id).is_err());

    h.close_window(id);
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Expired);
    // Reads alone never credit.
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 999);
    assert_eq!(h.ledger(&h.creator()), 0);

    assert_eq!(h.controller().settle_pledge(id).unwrap(), 999);
    assert_eq!(h.ledger(&h.creator()), 999);
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 0);
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Settled);
    assert_eq!(
        h.controller().settle_pledge(id).unwrap_err(),
        PledgeError::AlreadySettled { pledge_id: id }
    );

    let creator = h.creator();
    assert_eq!(
        h.controller().events().last().unwrap().event,
        Event::PledgeSettled {
            pledge_id: id,
            creator,
            amount: 999,
            unit: Unit::Native
        }
    );
}

#[test]
fn failed_pledge_cannot_be_settled_again() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 1);
    h.enter_window(id);
    h.vote(0, id, false);
    assert_eq!(
        h.controller().settle_pledge(id).unwrap_err(),
        PledgeError::AlreadySettled { pledge_id: id }
    );
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

#[test]
fn creator_withdraw_sweeps_expired_pledges() {
    let mut h = Harness::new(small_pot_config());
    let first = h.create(1_000, 1);
    let second = h.create(1_000, 2);
    h.close_window(second);

    let creator = h.creator();
    h.controller().withdraw(&creator, 1_998, Unit::Native).unwrap();

    assert_eq!(h.wallet(&creator), INITIAL_FUNDS - 2);
    assert_eq!(h.ledger(&creator), 0);
    for id in [first, second] {
        assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Settled);
    }
    assert_eq!(h.controller().get_user(&creator).oldest_active_created_pledge_index, 2);
}

#[test]
fn oversized_withdraw_settles_nothing() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 1);
    h.close_window(id);
    let creator = h.creator();
    let events_before = h.controller().events().len();

    assert_eq!(
        h.controller().withdraw(&creator, 1_000_000, Unit::Native).unwrap_err(),
        PledgeError::Bank(BankError::InsufficientBalance {
            user: creator,
            unit: Unit::Native,
            available: 999,
            requested: 1_000_000,
        })
    );
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Expired);
    assert_eq!(h.controller().get_pledge(id).unwrap().balance, 999);
    assert_eq!(h.ledger(&creator), 0);
    assert_eq!(h.controller().get_user(&creator).oldest_active_created_pledge_index, 0);
    assert_eq!(h.controller().events().len(), events_before);

    h.controller().withdraw(&creator, 999, Unit::Native).unwrap();
    assert_eq!(h.controller().pledge_status(id).unwrap(), PledgeStatus::Settled);
    assert_eq!(h.ledger(&creator), 0);
}

#[test]
fn sweep_stops_cursor_at_active_pledge() {
    let mut h = Harness::new(small_pot_config());
    let first = h.create(1_000, 1);
    h.close_window(first);
    let second = h.create(1_000, 1);

    let creator = h.creator();
    assert_eq!(h.controller().sweep_user(&creator).unwrap(), vec![first]);
    assert_eq!(h.controller().get_user(&creator).oldest_active_created_pledge_index, 1);
    assert_eq!(h.controller().pledge_status(second).unwrap(), PledgeStatus::Active);

    // Nothing new to settle.
    assert!(h.controller().sweep_user(&creator).unwrap().is_empty());
    assert!(h
        .controller()
        .sweep_user(&Address::derive("nobody"))
        .unwrap()
        .is_empty());
}

#[test]
fn judge_withdraws_winnings() {
    let mut h = Harness::new(small_pot_config());
    let id = h.create(1_000, 2);
    h.enter_window(id);
    h.vote(0, id, false);
    h.vote(1, id, false);

    let judge = h.judge(0);
    h.controller().sweep_user(&judge).unwrap();
    assert_eq!(h.controller().get_user(&judge).oldest_active_judged_pledge_index, 1);

    assert!(matches!(
        h.controller().withdraw(&judge, 500, Unit::Native),
        Err(PledgeError::Bank(BankError::InsufficientBalance { available: 499, .. }))
    ));
    h.controller().withdraw(&judge, 499, Unit::Native).unwrap();
    assert_eq!(h.wallet(&judge), 499);
    assert_eq!(h.ledger(&judge), 0);
}

#[test]
fn custody_covers_liabilities_throughout() {
    let mut h = Harness::new(small_pot_config());
    let yield_address = Address::derive(DEV_YIELD_LABEL);
    let covered = |h: &Harness| {
        let bank = h.deployment.bank.lock();
        let owed = bank.get_liabilities(Unit::Native) + bank.get_own_balance(Unit::Native);
        h.assets.balance_of(&yield_address, Unit::Native) >= owed
    };

    let failing = h.create(10_000, 3);
    let expiring = h.create(7_777, 2);
    assert!(covered(&h));

    h.enter_window(failing);
    h.vote(0, failing, false);
    h.vote(1, failing, false);
    assert!(covered(&h));

    h.close_window(expiring);
    let creator = h.creator();
    h.controller().withdraw(&creator, 5_000, Unit::Native).unwrap();
    assert!(covered(&h));
}

#[test]
fn kept_pledge_round_trip_costs_only_the_fee() -> anyhow::Result<()> {
    let mut h = Harness::new(small_pot_config());
    let creator = h.creator();
    let request = h.request(1_000, 2);
    let id = h.controller().create_pledge(&creator, &request)?;

    let judge = h.judge(0);
    h.enter_window(id);
    h.controller().judge_pledge(&judge, id, true)?;
    h.close_window(id);

    assert_eq!(h.controller().pledge_status(id)?, PledgeStatus::Expired);
    h.controller().withdraw(&creator, 999, Unit::Native)?;

    assert_eq!(h.controller().pledge_status(id)?, PledgeStatus::Settled);
    assert_eq!(h.wallet(&creator), INITIAL_FUNDS - 1);
    assert_eq!(h.ledger(&creator), 0);
    Ok(())
}
