//! Integration tests for `RideRepo`: claim atomicity under concurrency,
//! transition guards, and cancellation semantics.

use sqlx::PgPool;

use ridewire_core::geo::GeoPoint;
use ridewire_core::ride::RideStatus;
use ridewire_db::models::ride::NewRide;
use ridewire_db::repositories::RideRepo;

fn new_ride(client_id: i64) -> NewRide {
    NewRide {
        client_id,
        pickup: GeoPoint::new(-4.3030, 15.3000),
        pickup_address: Some("Place de la Gare".to_string()),
        dropoff: GeoPoint::new(-4.3290, 15.3370),
        dropoff_address: Some("Marché Central".to_string()),
        estimated_price: 12.50,
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn create_starts_pending_without_driver(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    assert_eq!(ride.status().unwrap(), RideStatus::Pending);
    assert!(ride.driver_id.is_none());
    assert_eq!(ride.version, 1);
    assert!(ride.accepted_at.is_none());
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn claim_sets_driver_and_status(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    let claimed = RideRepo::claim(&pool, ride.id, 7).await.unwrap().unwrap();

    assert_eq!(claimed.status().unwrap(), RideStatus::Accepted);
    assert_eq!(claimed.driver_id, Some(7));
    assert_eq!(claimed.version, 2);
    assert!(claimed.accepted_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn second_claim_loses(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    assert!(RideRepo::claim(&pool, ride.id, 7).await.unwrap().is_some());
    assert!(RideRepo::claim(&pool, ride.id, 8).await.unwrap().is_none());

    // The loser left the row untouched.
    let current = RideRepo::find_by_id(&pool, ride.id).await.unwrap().unwrap();
    assert_eq!(current.driver_id, Some(7));
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_claims_exactly_one_wins(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    let mut handles = Vec::new();
    for driver_id in 1..=8i64 {
        let pool = pool.clone();
        let ride_id = ride.id;
        handles.push(tokio::spawn(async move {
            RideRepo::claim(&pool, ride_id, driver_id).await.unwrap()
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(ride) = handle.await.unwrap() {
            winners.push(ride);
        }
    }

    assert_eq!(winners.len(), 1, "exactly one concurrent claim must win");
    let current = RideRepo::find_by_id(&pool, ride.id).await.unwrap().unwrap();
    assert_eq!(current.driver_id, winners[0].driver_id);
    assert_eq!(current.status().unwrap(), RideStatus::Accepted);
}

#[sqlx::test(migrations = "./migrations")]
async fn claim_after_cancellation_fails_cleanly(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    RideRepo::cancel(&pool, ride.id, "changed my mind", "client", &[RideStatus::Pending])
        .await
        .unwrap()
        .unwrap();

    assert!(RideRepo::claim(&pool, ride.id, 7).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Progress transitions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn happy_path_increments_version_each_step(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    let ride = RideRepo::claim(&pool, ride.id, 7).await.unwrap().unwrap();
    let ride = RideRepo::mark_driver_arriving(&pool, ride.id, 7)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ride.status().unwrap(), RideStatus::DriverArriving);

    let ride = RideRepo::start_trip(&pool, ride.id, 7).await.unwrap().unwrap();
    assert_eq!(ride.status().unwrap(), RideStatus::InProgress);
    assert!(ride.started_at.is_some());

    let ride = RideRepo::complete(&pool, ride.id, 7, Some(14.0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ride.status().unwrap(), RideStatus::Completed);
    assert_eq!(ride.final_price, Some(14.0));
    assert!(ride.completed_at.is_some());
    assert_eq!(ride.version, 5);
}

#[sqlx::test(migrations = "./migrations")]
async fn transitions_refuse_wrong_source_state(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    // Not yet accepted: no progress possible.
    assert!(RideRepo::mark_driver_arriving(&pool, ride.id, 7)
        .await
        .unwrap()
        .is_none());
    assert!(RideRepo::start_trip(&pool, ride.id, 7).await.unwrap().is_none());
    assert!(RideRepo::complete(&pool, ride.id, 7, None)
        .await
        .unwrap()
        .is_none());

    // Status unchanged throughout.
    let current = RideRepo::find_by_id(&pool, ride.id).await.unwrap().unwrap();
    assert_eq!(current.status().unwrap(), RideStatus::Pending);
    assert_eq!(current.version, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn transitions_refuse_other_drivers(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();
    RideRepo::claim(&pool, ride.id, 7).await.unwrap().unwrap();

    // Driver 8 did not win the claim and cannot advance the ride.
    assert!(RideRepo::mark_driver_arriving(&pool, ride.id, 8)
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn complete_falls_back_to_estimated_price(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();
    RideRepo::claim(&pool, ride.id, 7).await.unwrap().unwrap();
    RideRepo::mark_driver_arriving(&pool, ride.id, 7)
        .await
        .unwrap()
        .unwrap();
    RideRepo::start_trip(&pool, ride.id, 7).await.unwrap().unwrap();

    let ride = RideRepo::complete(&pool, ride.id, 7, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ride.final_price, Some(12.50));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn cancel_records_reason_and_actor(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    let cancelled = RideRepo::cancel(
        &pool,
        ride.id,
        "client no-show",
        "driver",
        &[RideStatus::Pending, RideStatus::Accepted, RideStatus::DriverArriving],
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(cancelled.status().unwrap(), RideStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("client no-show"));
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("driver"));
    assert!(cancelled.cancelled_at.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_outside_allowed_states_updates_nothing(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();
    RideRepo::claim(&pool, ride.id, 7).await.unwrap().unwrap();
    RideRepo::mark_driver_arriving(&pool, ride.id, 7)
        .await
        .unwrap()
        .unwrap();
    RideRepo::start_trip(&pool, ride.id, 7).await.unwrap().unwrap();

    // Parties may not cancel an in-progress trip.
    let result = RideRepo::cancel(
        &pool,
        ride.id,
        "too late",
        "client",
        &[RideStatus::Pending, RideStatus::Accepted, RideStatus::DriverArriving],
    )
    .await
    .unwrap();
    assert!(result.is_none());

    // An admin may.
    let result = RideRepo::cancel(
        &pool,
        ride.id,
        "operational override",
        "admin",
        &[
            RideStatus::Pending,
            RideStatus::Accepted,
            RideStatus::DriverArriving,
            RideStatus::InProgress,
        ],
    )
    .await
    .unwrap();
    assert!(result.is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn cancel_twice_second_is_a_lost_cas(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    let allowed = [RideStatus::Pending];
    assert!(RideRepo::cancel(&pool, ride.id, "changed my mind", "client", &allowed)
        .await
        .unwrap()
        .is_some());
    // The coordinator turns this None into an idempotent no-op success.
    assert!(RideRepo::cancel(&pool, ride.id, "changed my mind", "client", &allowed)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn rating_requires_completion_and_ownership(pool: PgPool) {
    let ride = RideRepo::create(&pool, &new_ride(1)).await.unwrap();

    // Not completed yet.
    assert!(RideRepo::rate(&pool, ride.id, 1, 5, Some("great"))
        .await
        .unwrap()
        .is_none());

    RideRepo::claim(&pool, ride.id, 7).await.unwrap().unwrap();
    RideRepo::mark_driver_arriving(&pool, ride.id, 7)
        .await
        .unwrap()
        .unwrap();
    RideRepo::start_trip(&pool, ride.id, 7).await.unwrap().unwrap();
    RideRepo::complete(&pool, ride.id, 7, None).await.unwrap().unwrap();

    // Wrong client.
    assert!(RideRepo::rate(&pool, ride.id, 99, 5, None).await.unwrap().is_none());

    // Owner rates once.
    let rated = RideRepo::rate(&pool, ride.id, 1, 5, Some("great"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rated.rating, Some(5));

    // Second rating refused.
    assert!(RideRepo::rate(&pool, ride.id, 1, 1, None).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Broadcaster working set
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn active_set_contains_only_claimed_unfinished_rides(pool: PgPool) {
    let pending = RideRepo::create(&pool, &new_ride(1)).await.unwrap();
    let active = RideRepo::create(&pool, &new_ride(2)).await.unwrap();
    let done = RideRepo::create(&pool, &new_ride(3)).await.unwrap();

    RideRepo::claim(&pool, active.id, 7).await.unwrap().unwrap();

    RideRepo::claim(&pool, done.id, 8).await.unwrap().unwrap();
    RideRepo::mark_driver_arriving(&pool, done.id, 8).await.unwrap().unwrap();
    RideRepo::start_trip(&pool, done.id, 8).await.unwrap().unwrap();
    RideRepo::complete(&pool, done.id, 8, None).await.unwrap().unwrap();

    let set = RideRepo::find_active_with_driver(&pool).await.unwrap();
    assert_eq!(set, vec![(active.id, 7)]);
    assert!(!set.iter().any(|(id, _)| *id == pending.id || *id == done.id));
}
