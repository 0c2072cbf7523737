//! Unit tests for the in-process offer board: claim eligibility, refusal
//! bookkeeping, early completion, and expiry semantics.

use std::collections::HashSet;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;

use ridewire_api::dispatch::OfferBoard;
use ridewire_api::dispatch::offers::{ClaimCheck, OfferRound, RefuseOutcome};

fn round(ride_id: i64, round_no: u32, candidates: &[i64]) -> OfferRound {
    OfferRound {
        ride_id,
        round: round_no,
        radius_m: 5000.0,
        notified: candidates.to_vec(),
        pending: candidates.iter().copied().collect::<HashSet<_>>(),
        expires_at: Utc::now() + chrono::Duration::seconds(20),
    }
}

// ---------------------------------------------------------------------------
// Claim checks
// ---------------------------------------------------------------------------

#[test]
fn candidate_is_eligible_others_are_not() {
    let board = OfferBoard::new();
    board.begin_round(round(1, 1, &[7, 8]));

    assert_eq!(board.check_claim(1, 7), ClaimCheck::Eligible);
    assert_eq!(board.check_claim(1, 8), ClaimCheck::Eligible);
    assert_eq!(board.check_claim(1, 9), ClaimCheck::NotACandidate);
}

#[test]
fn claim_without_live_offer_is_rejected() {
    let board = OfferBoard::new();
    assert_eq!(board.check_claim(1, 7), ClaimCheck::NoLiveOffer);
}

#[test]
fn late_claim_after_expiry_takedown_is_rejected() {
    let board = OfferBoard::new();
    board.begin_round(round(1, 1, &[7]));

    // The round task tears the round down at the deadline...
    let expired = board.take_if_round(1, 1).expect("round should be live");
    assert_eq!(expired.pending, HashSet::from([7]));

    // ...so a driver accepting microseconds later gets an explicit
    // rejection, not a silent claim.
    assert_eq!(board.check_claim(1, 7), ClaimCheck::NoLiveOffer);
}

// ---------------------------------------------------------------------------
// Refusals
// ---------------------------------------------------------------------------

#[test]
fn refusals_remove_candidates_and_detect_exhaustion() {
    let board = OfferBoard::new();
    board.begin_round(round(1, 1, &[7, 8]));

    assert_matches!(board.refuse(1, 7), RefuseOutcome::Removed { exhausted: false });
    // A refused driver can no longer claim.
    assert_eq!(board.check_claim(1, 7), ClaimCheck::NotACandidate);
    // Refusing twice is not a candidate anymore.
    assert_matches!(board.refuse(1, 7), RefuseOutcome::NotACandidate);

    assert_matches!(board.refuse(1, 8), RefuseOutcome::Removed { exhausted: true });
    assert_matches!(board.refuse(99, 7), RefuseOutcome::NoLiveOffer);
}

#[tokio::test]
async fn exhaustion_wakes_the_round_task() {
    let board = OfferBoard::new();
    let done = board.begin_round(round(1, 1, &[7]));

    // Refusal happens before the task starts waiting; the stored permit
    // must still wake it.
    assert_eq!(board.refuse(1, 7), RefuseOutcome::Removed { exhausted: true });

    tokio::time::timeout(Duration::from_secs(1), done.notified())
        .await
        .expect("exhaustion must wake the waiter");
}

// ---------------------------------------------------------------------------
// Completion and round replacement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_removes_the_round_and_wakes_the_task() {
    let board = OfferBoard::new();
    let done = board.begin_round(round(1, 1, &[7, 8]));

    let settled = board.complete(1).expect("round should be live");
    assert_eq!(settled.notified, vec![7, 8]);

    assert_eq!(board.check_claim(1, 8), ClaimCheck::NoLiveOffer);
    assert!(board.complete(1).is_none(), "second completion finds nothing");

    tokio::time::timeout(Duration::from_secs(1), done.notified())
        .await
        .expect("completion must wake the waiter");
}

#[test]
fn stale_expiry_cannot_tear_down_a_newer_round() {
    let board = OfferBoard::new();
    board.begin_round(round(1, 1, &[7]));
    // Round 2 replaces round 1 (wider radius retry).
    board.begin_round(round(1, 2, &[7, 8]));

    assert!(board.take_if_round(1, 1).is_none(), "round 1 is gone");
    assert!(board.is_live_round(1, 2));

    let taken = board.take_if_round(1, 2).expect("round 2 should be live");
    assert_eq!(taken.round, 2);
}

#[test]
fn rounds_are_independent_per_ride() {
    let board = OfferBoard::new();
    board.begin_round(round(1, 1, &[7]));
    board.begin_round(round(2, 1, &[7]));

    board.complete(1);

    assert_eq!(board.check_claim(1, 7), ClaimCheck::NoLiveOffer);
    assert_eq!(board.check_claim(2, 7), ClaimCheck::Eligible);
}
