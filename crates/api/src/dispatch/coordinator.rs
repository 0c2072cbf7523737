//! Dispatch coordinator.
//!
//! Converts a pending ride into an accepted ride with at-most-one driver
//! via broadcast-then-claim, drives the lifecycle state machine behind the
//! geofence gates, and fans every outcome out to the realtime rooms and
//! the event bus.
//!
//! Claim resolution is linearizable per ride: the decisive step is always
//! a conditional update on the ride row, never in-process state, so
//! multiple API instances can run side by side. The offer board is local
//! and advisory -- it exists to turn late or un-invited accepts into
//! explicit typed rejections.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use ridewire_core::error::CoreError;
use ridewire_core::geo::{self, GeoPoint};
use ridewire_core::ride::{state_machine, CancelActor, RideStatus, Transition};
use ridewire_core::types::DbId;
use ridewire_db::models::ride::Ride;
use ridewire_db::repositories::{PresenceRepo, RideRepo};
use ridewire_db::DbPool;
use ridewire_events::{EventBus, RideEvent};

use crate::config::DispatchConfig;
use crate::dispatch::offers::{ClaimCheck, OfferBoard, OfferRound};
use crate::ws::manager::{driver_room, ride_room};
use crate::ws::protocol::{RideSummary, ServerEvent};
use crate::ws::WsManager;

/// Result of a progress or cancel request, distinguishing idempotent
/// repeats so callers do not double-fire notifications.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub ride: Ride,
    pub no_op: bool,
}

/// Orchestrates offers, claims, cancellations, and progress updates.
pub struct Coordinator {
    pool: DbPool,
    config: DispatchConfig,
    ws: Arc<WsManager>,
    bus: Arc<EventBus>,
    offers: OfferBoard,
}

impl Coordinator {
    pub fn new(
        pool: DbPool,
        config: DispatchConfig,
        ws: Arc<WsManager>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            config,
            ws,
            bus,
            offers: OfferBoard::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Offers
    // -----------------------------------------------------------------------

    /// Start the offer rounds for a freshly created pending ride.
    ///
    /// Spawns a background task that owns the round loop; the caller
    /// returns to the client immediately.
    pub fn start_offer(this: &Arc<Self>, ride: Ride) {
        let coordinator = Arc::clone(this);
        tokio::spawn(async move {
            coordinator.run_offer_rounds(ride).await;
        });
    }

    /// Drive broadcast-then-claim rounds until the ride is claimed, the
    /// ride leaves `pending`, or the configured rounds are exhausted.
    async fn run_offer_rounds(self: Arc<Self>, ride: Ride) {
        let pickup = ride.pickup();
        let mut radius_m = self.config.search_radius_m;

        for round_no in 1..=self.config.max_offer_rounds {
            // The ride may have been cancelled (or manually assigned)
            // between rounds.
            match RideRepo::find_by_id(&self.pool, ride.id).await {
                Ok(Some(current)) if matches!(current.status(), Ok(RideStatus::Pending)) => {}
                Ok(_) => return,
                Err(e) => {
                    tracing::error!(ride_id = ride.id, error = %e, "Offer round ride lookup failed");
                    return;
                }
            }

            let candidates = match self.select_candidates(pickup, radius_m).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::error!(ride_id = ride.id, error = %e, "Candidate selection failed");
                    return;
                }
            };

            let expires_at =
                Utc::now() + chrono::Duration::seconds(self.config.offer_expiry_secs as i64);
            let candidate_ids: Vec<DbId> = candidates.iter().map(|(id, _)| *id).collect();
            let done = self.offers.begin_round(OfferRound {
                ride_id: ride.id,
                round: round_no,
                radius_m,
                notified: candidate_ids.clone(),
                pending: candidate_ids.iter().copied().collect::<HashSet<_>>(),
                expires_at,
            });

            tracing::info!(
                ride_id = ride.id,
                round = round_no,
                radius_m,
                candidates = candidate_ids.len(),
                "Offer round started"
            );

            // Tell the watching client the search is on, then offer the
            // ride to each candidate's driver room.
            let searching = ServerEvent::SearchingDrivers {
                ride_id: ride.id,
                drivers_notified: candidate_ids.len(),
                round: round_no,
                timestamp: Utc::now(),
            };
            self.ws
                .send_to_room(&ride_room(ride.id), searching.to_message())
                .await;

            let offer = ServerEvent::RideRequest {
                ride: RideSummary::from(&ride),
                expires_at,
                timestamp: Utc::now(),
            };
            for driver_id in &candidate_ids {
                self.ws
                    .send_to_room(&driver_room(*driver_id), offer.to_message())
                    .await;
            }

            self.bus.publish(
                RideEvent::new("ride.offer_round")
                    .with_ride(ride.id)
                    .with_client(ride.client_id)
                    .with_payload(serde_json::json!({
                        "round": round_no,
                        "radiusM": radius_m,
                        "candidateIds": candidate_ids,
                        "expiresAt": expires_at,
                    })),
            );

            // Wait for the deadline, or an early wake: claimed, cancelled,
            // or every candidate refused.
            let deadline = tokio::time::Instant::now()
                + Duration::from_secs(self.config.offer_expiry_secs);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = done.notified() => {}
            }

            // A finished round (claim or cancel) was already removed from
            // the board; nothing left to do.
            let Some(expired) = self.offers.take_if_round(ride.id, round_no) else {
                return;
            };

            // Expired or exhausted: clear the offer from the remaining
            // candidates' screens. A driver accepting microseconds from
            // now gets an explicit "offer expired", not silence.
            let withdrawn = ServerEvent::RideWithdrawn {
                ride_id: ride.id,
                timestamp: Utc::now(),
            };
            for driver_id in &expired.pending {
                self.ws
                    .send_to_room(&driver_room(*driver_id), withdrawn.to_message())
                    .await;
            }

            radius_m = (radius_m * self.config.search_radius_growth)
                .min(self.config.search_radius_max_m);
        }

        // Every round expired unanswered. The ride stays pending; the
        // client is told explicitly rather than left watching a spinner.
        tracing::info!(ride_id = ride.id, "No driver accepted within the offer windows");
        let event = ServerEvent::NoDriverAvailable {
            ride_id: ride.id,
            timestamp: Utc::now(),
        };
        self.ws
            .send_to_room(&ride_room(ride.id), event.to_message())
            .await;
        self.bus.publish(
            RideEvent::new("ride.unmatched")
                .with_ride(ride.id)
                .with_client(ride.client_id),
        );
    }

    /// Fresh available drivers within `radius_m` of `pickup`, nearest
    /// first, capped at the configured candidate limit.
    async fn select_candidates(
        &self,
        pickup: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<(DbId, f64)>, CoreError> {
        let fresh =
            PresenceRepo::list_fresh_available(&self.pool, self.config.presence_ttl_secs as f64)
                .await
                .map_err(internal)?;

        let mut ranked: Vec<(DbId, f64)> = fresh
            .iter()
            .map(|p| (p.driver_id, geo::haversine_distance_m(p.position(), pickup)))
            .filter(|(_, distance)| *distance <= radius_m)
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(self.config.max_candidates);
        Ok(ranked)
    }

    // -----------------------------------------------------------------------
    // Claim
    // -----------------------------------------------------------------------

    /// Claim a pending ride for a driver.
    ///
    /// Under N concurrent claims exactly one succeeds; every loser gets a
    /// deterministic typed error. The presence row is claimed first so a
    /// driver can never hold two rides; losing the ride CAS afterwards is
    /// compensated by releasing exactly that presence attachment.
    pub async fn claim_ride(&self, ride_id: DbId, driver_id: DbId) -> Result<Ride, CoreError> {
        match self.offers.check_claim(ride_id, driver_id) {
            ClaimCheck::Eligible => {}
            ClaimCheck::NotACandidate => {
                return Err(CoreError::Forbidden(
                    "This ride was not offered to you".into(),
                ));
            }
            ClaimCheck::NoLiveOffer => {
                // Distinguish "too late" from "never existed" / "already
                // taken" for a useful client message.
                let ride = RideRepo::find_by_id(&self.pool, ride_id)
                    .await
                    .map_err(internal)?
                    .ok_or(CoreError::NotFound {
                        entity: "Ride",
                        id: ride_id,
                    })?;
                return match ride.status()? {
                    RideStatus::Pending => Err(CoreError::StaleState(
                        "The offer for this ride has expired".into(),
                    )),
                    _ => Err(CoreError::Conflict("Ride is no longer available".into())),
                };
            }
        }

        self.claim_inner(ride_id, driver_id).await
    }

    /// Agent override: assign a driver directly, bypassing the broadcast
    /// round but going through the same atomic claim path.
    pub async fn manual_assign(&self, ride_id: DbId, driver_id: DbId) -> Result<Ride, CoreError> {
        let ride = RideRepo::find_by_id(&self.pool, ride_id)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound {
                entity: "Ride",
                id: ride_id,
            })?;
        if ride.status()? != RideStatus::Pending {
            return Err(CoreError::Conflict("Ride is no longer available".into()));
        }
        self.claim_inner(ride_id, driver_id).await
    }

    /// The shared atomic claim path: presence CAS, ride CAS, then fan-out.
    async fn claim_inner(&self, ride_id: DbId, driver_id: DbId) -> Result<Ride, CoreError> {
        // Attach the driver first. `available AND current_ride_id IS NULL`
        // is the one-ride-per-driver invariant.
        let attached = PresenceRepo::claim_for_ride(&self.pool, driver_id, ride_id)
            .await
            .map_err(internal)?;
        if attached.is_none() {
            return Err(CoreError::Conflict(
                "Driver is not available for dispatch".into(),
            ));
        }

        // Decisive step: exactly one claimant flips pending -> accepted.
        let claimed = RideRepo::claim(&self.pool, ride_id, driver_id)
            .await
            .map_err(internal)?;

        let ride = match claimed {
            Some(ride) => ride,
            None => {
                // Lost the race. Detach exactly the attachment made above.
                PresenceRepo::release_driver(&self.pool, driver_id, ride_id)
                    .await
                    .map_err(internal)?;
                return match RideRepo::find_by_id(&self.pool, ride_id)
                    .await
                    .map_err(internal)?
                {
                    None => Err(CoreError::NotFound {
                        entity: "Ride",
                        id: ride_id,
                    }),
                    Some(_) => Err(CoreError::Conflict("Ride is no longer available".into())),
                };
            }
        };

        tracing::info!(ride_id, driver_id, "Ride claimed");

        // The offer is settled: losing candidates get withdrawal notices.
        if let Some(round) = self.offers.complete(ride_id) {
            let withdrawn = ServerEvent::RideWithdrawn {
                ride_id,
                timestamp: Utc::now(),
            };
            for candidate in round.notified.iter().filter(|id| **id != driver_id) {
                self.ws
                    .send_to_room(&driver_room(*candidate), withdrawn.to_message())
                    .await;
            }
        }

        self.notify_status(&ride, RideStatus::Accepted).await;
        self.bus.publish(
            RideEvent::new("ride.claimed")
                .with_ride(ride.id)
                .with_driver(driver_id)
                .with_client(ride.client_id)
                .with_payload(serde_json::json!({ "version": ride.version })),
        );

        Ok(ride)
    }

    /// Withdraw a driver from the current offer round only.
    ///
    /// Refusing an unknown or settled offer is a quiet no-op, matching the
    /// retry behaviour of mobile clients. When the last candidate refuses,
    /// the round ends early and the next (wider) round starts immediately.
    pub async fn refuse_ride(&self, ride_id: DbId, driver_id: DbId) -> Result<(), CoreError> {
        let outcome = self.offers.refuse(ride_id, driver_id);
        tracing::debug!(ride_id, driver_id, ?outcome, "Ride refused");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    /// Cancel a ride on behalf of `actor`.
    ///
    /// Re-cancelling an already-cancelled ride is an idempotent no-op
    /// success: the outcome says so and no notifications are re-fired.
    pub async fn cancel_ride(
        &self,
        ride_id: DbId,
        actor: CancelActor,
        actor_id: DbId,
        reason: &str,
        driver_location: Option<GeoPoint>,
    ) -> Result<TransitionOutcome, CoreError> {
        if reason.trim().is_empty() {
            return Err(CoreError::Validation("A cancellation reason is required".into()));
        }

        let ride = RideRepo::find_by_id(&self.pool, ride_id)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound {
                entity: "Ride",
                id: ride_id,
            })?;

        match actor {
            CancelActor::Client if ride.client_id != actor_id => {
                return Err(CoreError::Forbidden("Not your ride".into()));
            }
            CancelActor::Driver if ride.driver_id != Some(actor_id) => {
                return Err(CoreError::Forbidden("Not your ride".into()));
            }
            _ => {}
        }

        let current = ride.status()?;
        if current == RideStatus::Cancelled {
            return Ok(TransitionOutcome { ride, no_op: true });
        }
        if !state_machine::can_cancel(actor, current) {
            return Err(match current {
                RideStatus::Completed => {
                    CoreError::Conflict("Ride is already completed".into())
                }
                _ => CoreError::Forbidden(
                    "Only an admin can cancel a ride in progress".into(),
                ),
            });
        }

        // Fraud gate: a driver abandoning a claimed ride must actually be
        // near the pickup point (no-show claims from across town fail).
        if actor == CancelActor::Driver && current != RideStatus::Pending {
            let location = driver_location.ok_or_else(|| {
                CoreError::Validation(
                    "driverLocation is required to cancel a claimed ride".into(),
                )
            })?;
            location.validate()?;
            geo::check_proximity(location, ride.pickup(), self.config.geofence_radius_m)?;
        }

        let allowed_from: &[RideStatus] = match actor {
            CancelActor::Admin => &[
                RideStatus::Pending,
                RideStatus::Accepted,
                RideStatus::DriverArriving,
                RideStatus::InProgress,
            ],
            _ => &[
                RideStatus::Pending,
                RideStatus::Accepted,
                RideStatus::DriverArriving,
            ],
        };

        let cancelled = RideRepo::cancel(&self.pool, ride_id, reason, actor.as_str(), allowed_from)
            .await
            .map_err(internal)?;

        let ride = match cancelled {
            Some(ride) => ride,
            None => {
                // Someone else moved the ride first. If they cancelled it,
                // this retry is a no-op success.
                let current = RideRepo::find_by_id(&self.pool, ride_id)
                    .await
                    .map_err(internal)?
                    .ok_or(CoreError::NotFound {
                        entity: "Ride",
                        id: ride_id,
                    })?;
                return match current.status()? {
                    RideStatus::Cancelled => Ok(TransitionOutcome {
                        ride: current,
                        no_op: true,
                    }),
                    _ => Err(CoreError::Conflict("Ride can no longer be cancelled".into())),
                };
            }
        };

        tracing::info!(ride_id, actor = actor.as_str(), reason, "Ride cancelled");

        // Release whoever is attached and withdraw any live offer.
        PresenceRepo::release_from_ride(&self.pool, ride_id)
            .await
            .map_err(internal)?;
        if let Some(round) = self.offers.complete(ride_id) {
            let withdrawn = ServerEvent::RideWithdrawn {
                ride_id,
                timestamp: Utc::now(),
            };
            for candidate in &round.notified {
                self.ws
                    .send_to_room(&driver_room(*candidate), withdrawn.to_message())
                    .await;
            }
        }

        self.notify_status(&ride, RideStatus::Cancelled).await;
        let mut event = RideEvent::new("ride.cancelled")
            .with_ride(ride.id)
            .with_client(ride.client_id);
        if let Some(driver_id) = ride.driver_id {
            event = event.with_driver(driver_id);
        }
        self.bus.publish(
            event
                .with_payload(serde_json::json!({
                    "reason": reason,
                    "cancelledBy": actor.as_str(),
                    "version": ride.version,
                })),
        );

        Ok(TransitionOutcome { ride, no_op: false })
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// Advance a ride through `driverArriving` / `inProgress` / `completed`
    /// on behalf of its assigned driver.
    ///
    /// Arrival and trip start are gated on the driver's proximity to the
    /// pickup point, measured against the location supplied in this
    /// request. Repeating an already-applied transition is a no-op
    /// success.
    pub async fn update_progress(
        &self,
        ride_id: DbId,
        driver_id: DbId,
        to: RideStatus,
        location: GeoPoint,
        final_price: Option<f64>,
    ) -> Result<TransitionOutcome, CoreError> {
        if !matches!(
            to,
            RideStatus::DriverArriving | RideStatus::InProgress | RideStatus::Completed
        ) {
            return Err(CoreError::Validation(format!(
                "'{to}' is not a progress status; use the cancel operation instead"
            )));
        }

        let ride = RideRepo::find_by_id(&self.pool, ride_id)
            .await
            .map_err(internal)?
            .ok_or(CoreError::NotFound {
                entity: "Ride",
                id: ride_id,
            })?;
        if ride.driver_id != Some(driver_id) {
            return Err(CoreError::Forbidden("Not your ride".into()));
        }

        let current = ride.status()?;
        match state_machine::validate_transition(current, to)? {
            Transition::NoOp => return Ok(TransitionOutcome { ride, no_op: true }),
            Transition::Apply => {}
        }

        if state_machine::requires_pickup_proximity(current, to) {
            location.validate()?;
            let distance_m =
                geo::check_proximity(location, ride.pickup(), self.config.geofence_radius_m)?;
            tracing::debug!(ride_id, driver_id, distance_m, "Proximity gate passed");
        }

        let updated = match to {
            RideStatus::DriverArriving => {
                RideRepo::mark_driver_arriving(&self.pool, ride_id, driver_id)
                    .await
                    .map_err(internal)?
            }
            RideStatus::InProgress => RideRepo::start_trip(&self.pool, ride_id, driver_id)
                .await
                .map_err(internal)?,
            RideStatus::Completed => {
                RideRepo::complete(&self.pool, ride_id, driver_id, final_price)
                    .await
                    .map_err(internal)?
            }
            _ => unreachable!("validated above"),
        };

        let ride = match updated {
            Some(ride) => ride,
            None => {
                // The CAS lost to a concurrent transition (e.g. an admin
                // cancellation, or this driver's own retry).
                let current = RideRepo::find_by_id(&self.pool, ride_id)
                    .await
                    .map_err(internal)?
                    .ok_or(CoreError::NotFound {
                        entity: "Ride",
                        id: ride_id,
                    })?;
                return match current.status()? {
                    status if status == to => Ok(TransitionOutcome {
                        ride: current,
                        no_op: true,
                    }),
                    status => Err(CoreError::Conflict(format!(
                        "Ride moved to '{status}' concurrently"
                    ))),
                };
            }
        };

        // Keep the presence record in step with the trip.
        match to {
            RideStatus::InProgress => {
                PresenceRepo::mark_busy(&self.pool, driver_id, ride_id)
                    .await
                    .map_err(internal)?;
            }
            RideStatus::Completed => {
                PresenceRepo::release_driver(&self.pool, driver_id, ride_id)
                    .await
                    .map_err(internal)?;
            }
            _ => {}
        }

        tracing::info!(ride_id, driver_id, status = %to, "Ride progressed");

        self.notify_status(&ride, to).await;
        self.bus.publish(
            RideEvent::new("ride.progressed")
                .with_ride(ride.id)
                .with_driver(driver_id)
                .with_client(ride.client_id)
                .with_payload(serde_json::json!({
                    "status": to,
                    "version": ride.version,
                    "finalPrice": ride.final_price,
                })),
        );

        Ok(TransitionOutcome { ride, no_op: false })
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Emit `ride:status:changed` to the ride room and, when a driver is
    /// assigned, to that driver's room (drivers are addressed individually,
    /// never through ride rooms).
    async fn notify_status(&self, ride: &Ride, status: RideStatus) {
        let event = ServerEvent::RideStatusChanged {
            ride_id: ride.id,
            status,
            driver_id: ride.driver_id,
            version: ride.version,
            timestamp: Utc::now(),
        };
        self.ws
            .send_to_room(&ride_room(ride.id), event.to_message())
            .await;
        if let Some(driver_id) = ride.driver_id {
            self.ws
                .send_to_room(&driver_room(driver_id), event.to_message())
                .await;
        }
    }
}

/// Storage faults are the only errors surfaced as fatal; everything the
/// caller can act on is a typed domain error.
fn internal(err: sqlx::Error) -> CoreError {
    tracing::error!(error = %err, "Database error");
    CoreError::Internal("Storage failure".into())
}
