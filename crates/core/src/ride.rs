//! Ride statuses and the lifecycle state machine.
//!
//! The legal transition graph lives here as pure functions so it can be
//! unit-tested exhaustively; the repository layer enforces the same edges
//! atomically in SQL. Statuses serialize in camelCase to match the mobile
//! wire format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle status of a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RideStatus {
    Pending,
    Accepted,
    DriverArriving,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Database/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::DriverArriving => "driverArriving",
            Self::InProgress => "inProgress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// A ride with an assigned driver that has not yet finished.
    /// These are the rides the location broadcaster fans out for.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Accepted | Self::DriverArriving | Self::InProgress)
    }
}

impl FromStr for RideStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "driverArriving" => Ok(Self::DriverArriving),
            "inProgress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Internal(format!("Unknown ride status: {other}"))),
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    Client,
    Driver,
    Admin,
}

impl CancelActor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Driver => "driver",
            Self::Admin => "admin",
        }
    }
}

/// Outcome of validating a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The edge is legal and must be applied.
    Apply,
    /// The ride is already in the requested status. Retries from flaky
    /// mobile networks land here; callers treat it as success without
    /// re-firing notifications.
    NoOp,
}

pub mod state_machine {
    use super::{CancelActor, CoreError, RideStatus, Transition};

    /// Returns the set of statuses legally reachable from `from`.
    pub fn valid_transitions(from: RideStatus) -> &'static [RideStatus] {
        use RideStatus::*;
        match from {
            Pending => &[Accepted, Cancelled],
            Accepted => &[DriverArriving, Cancelled],
            DriverArriving => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is legal.
    pub fn can_transition(from: RideStatus, to: RideStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a requested transition, classifying idempotent repeats.
    pub fn validate_transition(
        from: RideStatus,
        to: RideStatus,
    ) -> Result<Transition, CoreError> {
        if from == to {
            return Ok(Transition::NoOp);
        }
        if can_transition(from, to) {
            return Ok(Transition::Apply);
        }
        Err(CoreError::Conflict(format!(
            "Invalid ride transition: {from} -> {to}"
        )))
    }

    /// Transitions gated by the pickup-proximity check.
    pub fn requires_pickup_proximity(from: RideStatus, to: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (from, to),
            (Accepted, DriverArriving) | (DriverArriving, InProgress)
        )
    }

    /// Whether `actor` may cancel a ride currently in `from`.
    ///
    /// Either party may cancel before the trip starts; an admin may
    /// cancel from any non-terminal state.
    pub fn can_cancel(actor: CancelActor, from: RideStatus) -> bool {
        use RideStatus::*;
        match actor {
            CancelActor::Admin => !from.is_terminal(),
            CancelActor::Client | CancelActor::Driver => {
                matches!(from, Pending | Accepted | DriverArriving)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    const ALL: [RideStatus; 6] = [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::DriverArriving,
        RideStatus::InProgress,
        RideStatus::Completed,
        RideStatus::Cancelled,
    ];

    // -----------------------------------------------------------------------
    // Legal edges
    // -----------------------------------------------------------------------

    #[test]
    fn happy_path_is_legal() {
        assert!(can_transition(RideStatus::Pending, RideStatus::Accepted));
        assert!(can_transition(
            RideStatus::Accepted,
            RideStatus::DriverArriving
        ));
        assert!(can_transition(
            RideStatus::DriverArriving,
            RideStatus::InProgress
        ));
        assert!(can_transition(RideStatus::InProgress, RideStatus::Completed));
    }

    #[test]
    fn cancel_reachable_from_every_non_terminal_state() {
        for from in ALL {
            assert_eq!(
                can_transition(from, RideStatus::Cancelled),
                !from.is_terminal(),
                "from {from}"
            );
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        assert!(valid_transitions(RideStatus::Completed).is_empty());
        assert!(valid_transitions(RideStatus::Cancelled).is_empty());
    }

    #[test]
    fn no_skipping_forward() {
        assert!(!can_transition(RideStatus::Pending, RideStatus::InProgress));
        assert!(!can_transition(RideStatus::Pending, RideStatus::Completed));
        assert!(!can_transition(RideStatus::Accepted, RideStatus::Completed));
    }

    #[test]
    fn no_moving_backward() {
        assert!(!can_transition(RideStatus::Accepted, RideStatus::Pending));
        assert!(!can_transition(
            RideStatus::InProgress,
            RideStatus::DriverArriving
        ));
        assert!(!can_transition(RideStatus::Completed, RideStatus::InProgress));
    }

    // -----------------------------------------------------------------------
    // validate_transition
    // -----------------------------------------------------------------------

    #[test]
    fn repeating_a_transition_is_a_noop() {
        for status in ALL {
            assert_eq!(
                validate_transition(status, status).unwrap(),
                Transition::NoOp,
                "status {status}"
            );
        }
    }

    #[test]
    fn illegal_transition_is_a_conflict() {
        let err = validate_transition(RideStatus::Completed, RideStatus::InProgress).unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[test]
    fn legal_transition_applies() {
        assert_eq!(
            validate_transition(RideStatus::Pending, RideStatus::Accepted).unwrap(),
            Transition::Apply
        );
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    #[test]
    fn proximity_gates_arrival_and_pickup_only() {
        assert!(requires_pickup_proximity(
            RideStatus::Accepted,
            RideStatus::DriverArriving
        ));
        assert!(requires_pickup_proximity(
            RideStatus::DriverArriving,
            RideStatus::InProgress
        ));
        assert!(!requires_pickup_proximity(
            RideStatus::InProgress,
            RideStatus::Completed
        ));
        assert!(!requires_pickup_proximity(
            RideStatus::Pending,
            RideStatus::Accepted
        ));
    }

    #[test]
    fn parties_cannot_cancel_once_in_progress() {
        assert!(!can_cancel(CancelActor::Client, RideStatus::InProgress));
        assert!(!can_cancel(CancelActor::Driver, RideStatus::InProgress));
        assert!(can_cancel(CancelActor::Admin, RideStatus::InProgress));
    }

    #[test]
    fn nobody_cancels_a_terminal_ride() {
        for actor in [CancelActor::Client, CancelActor::Driver, CancelActor::Admin] {
            assert!(!can_cancel(actor, RideStatus::Completed));
            assert!(!can_cancel(actor, RideStatus::Cancelled));
        }
    }

    #[test]
    fn parties_can_cancel_before_the_trip_starts() {
        for actor in [CancelActor::Client, CancelActor::Driver] {
            assert!(can_cancel(actor, RideStatus::Pending));
            assert!(can_cancel(actor, RideStatus::Accepted));
            assert!(can_cancel(actor, RideStatus::DriverArriving));
        }
    }

    // -----------------------------------------------------------------------
    // Wire format
    // -----------------------------------------------------------------------

    #[test]
    fn status_round_trips_through_strings() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<RideStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_serializes_in_camel_case() {
        let json = serde_json::to_string(&RideStatus::DriverArriving).unwrap();
        assert_eq!(json, "\"driverArriving\"");
        let json = serde_json::to_string(&RideStatus::InProgress).unwrap();
        assert_eq!(json, "\"inProgress\"");
    }
}
