//! In-process offer board.
//!
//! Tracks the single live offer round per pending ride: who was notified,
//! who has not yet refused, and when the round expires. The board is
//! advisory -- claim correctness comes from the conditional update on the
//! ride row -- but it is what turns a late accept into an explicit
//! "offer expired" rejection instead of silence.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use ridewire_core::types::{DbId, Timestamp};

/// One round of broadcast-then-claim for a ride.
#[derive(Debug, Clone)]
pub struct OfferRound {
    pub ride_id: DbId,
    /// 1-based round counter; each retry widens the search radius.
    pub round: u32,
    pub radius_m: f64,
    /// Everyone notified this round (for withdrawal notices).
    pub notified: Vec<DbId>,
    /// Candidates who have not refused yet.
    pub pending: HashSet<DbId>,
    pub expires_at: Timestamp,
}

/// Result of checking whether a driver may claim a ride right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimCheck {
    /// The driver is a candidate of the live round.
    Eligible,
    /// There is a live round but this driver was not offered the ride.
    NotACandidate,
    /// No live round -- the offer expired or never existed.
    NoLiveOffer,
}

/// Result of a driver refusing an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefuseOutcome {
    /// Removed from the round. `exhausted` is true when this was the last
    /// pending candidate, which ends the round early.
    Removed { exhausted: bool },
    /// The driver was not (or no longer) a candidate.
    NotACandidate,
    /// No live round for this ride.
    NoLiveOffer,
}

struct LiveRound {
    round: OfferRound,
    /// Woken when the round finishes early (claimed, cancelled, or every
    /// candidate refused). `notify_one` stores a permit so a wake that
    /// happens before the round task starts waiting is not lost.
    done: Arc<Notify>,
}

/// All live offer rounds, keyed by ride id. At most one per ride.
pub struct OfferBoard {
    rounds: Mutex<HashMap<DbId, LiveRound>>,
}

impl OfferBoard {
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Install a new live round, replacing any previous one for the ride.
    ///
    /// Returns the handle the round task waits on for early completion.
    pub fn begin_round(&self, round: OfferRound) -> Arc<Notify> {
        let done = Arc::new(Notify::new());
        let mut rounds = self.rounds.lock().expect("offer board lock poisoned");
        rounds.insert(
            round.ride_id,
            LiveRound {
                round,
                done: Arc::clone(&done),
            },
        );
        done
    }

    /// Check a claim attempt against the live round.
    pub fn check_claim(&self, ride_id: DbId, driver_id: DbId) -> ClaimCheck {
        let rounds = self.rounds.lock().expect("offer board lock poisoned");
        match rounds.get(&ride_id) {
            None => ClaimCheck::NoLiveOffer,
            Some(live) if live.round.pending.contains(&driver_id) => ClaimCheck::Eligible,
            Some(_) => ClaimCheck::NotACandidate,
        }
    }

    /// Withdraw a driver from the live round.
    pub fn refuse(&self, ride_id: DbId, driver_id: DbId) -> RefuseOutcome {
        let mut rounds = self.rounds.lock().expect("offer board lock poisoned");
        match rounds.get_mut(&ride_id) {
            None => RefuseOutcome::NoLiveOffer,
            Some(live) => {
                if !live.round.pending.remove(&driver_id) {
                    return RefuseOutcome::NotACandidate;
                }
                let exhausted = live.round.pending.is_empty();
                if exhausted {
                    live.done.notify_one();
                }
                RefuseOutcome::Removed { exhausted }
            }
        }
    }

    /// Finish the live round (claim succeeded or the ride left `pending`).
    ///
    /// Returns the round so the caller can send withdrawal notices; wakes
    /// the round task so it stops waiting for the deadline.
    pub fn complete(&self, ride_id: DbId) -> Option<OfferRound> {
        let mut rounds = self.rounds.lock().expect("offer board lock poisoned");
        rounds.remove(&ride_id).map(|live| {
            live.done.notify_one();
            live.round
        })
    }

    /// Remove the round only if it is still round `round_no`.
    ///
    /// The expiry path uses this so a timer firing for an already-replaced
    /// round cannot tear down its successor.
    pub fn take_if_round(&self, ride_id: DbId, round_no: u32) -> Option<OfferRound> {
        let mut rounds = self.rounds.lock().expect("offer board lock poisoned");
        match rounds.get(&ride_id) {
            Some(live) if live.round.round == round_no => {
                rounds.remove(&ride_id).map(|live| live.round)
            }
            _ => None,
        }
    }

    /// Whether round `round_no` is still the live round for the ride.
    pub fn is_live_round(&self, ride_id: DbId, round_no: u32) -> bool {
        let rounds = self.rounds.lock().expect("offer board lock poisoned");
        rounds
            .get(&ride_id)
            .is_some_and(|live| live.round.round == round_no)
    }
}

impl Default for OfferBoard {
    fn default() -> Self {
        Self::new()
    }
}
