//! Driver location broadcaster.
//!
//! Runs on a fixed tick instead of pushing per report: the fan-out rate is
//! bounded whatever the reporting cadence of individual drivers, and
//! bursts coalesce naturally. Each tick reads the freshest presence for
//! every active ride's driver and emits `driver_location_update` to the
//! ride room -- only when somebody is watching, only when the position
//! moved (or the max-silence interval elapsed), and never from a stale
//! record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use ridewire_core::geo::GeoPoint;
use ridewire_core::types::DbId;
use ridewire_db::repositories::{PresenceRepo, RideRepo};
use ridewire_db::DbPool;

use crate::config::DispatchConfig;
use crate::ws::manager::ride_room;
use crate::ws::protocol::{LocationPayload, ServerEvent};
use crate::ws::WsManager;

/// What was last emitted for a ride.
#[derive(Debug, Clone, Copy)]
struct LastSent {
    position: GeoPoint,
    sent_at: tokio::time::Instant,
}

/// Decide whether this tick should emit for a ride.
///
/// Emit on first sighting, on any position change, and as a keep-alive
/// after `max_silence` of no movement.
fn should_emit(
    last: Option<&LastSent>,
    current: GeoPoint,
    now: tokio::time::Instant,
    max_silence: Duration,
) -> bool {
    match last {
        None => true,
        Some(last) => last.position != current || now.duration_since(last.sent_at) >= max_silence,
    }
}

/// Periodically fans driver positions out to watching ride rooms.
pub struct LocationBroadcaster {
    pool: DbPool,
    ws: Arc<WsManager>,
    tick: Duration,
    max_silence: Duration,
    presence_ttl_secs: f64,
    last_sent: Mutex<HashMap<DbId, LastSent>>,
}

impl LocationBroadcaster {
    pub fn new(pool: DbPool, ws: Arc<WsManager>, config: &DispatchConfig) -> Self {
        Self {
            pool,
            ws,
            tick: Duration::from_secs(config.broadcast_interval_secs),
            max_silence: Duration::from_secs(config.broadcast_max_silence_secs),
            presence_ttl_secs: config.presence_ttl_secs as f64,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn the tick loop. It stops when `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.tick_once().await {
                            tracing::error!(error = %e, "Broadcast tick failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::info!("Location broadcaster stopped");
                        return;
                    }
                }
            }
        })
    }

    /// One broadcast pass over all active rides.
    async fn tick_once(&self) -> Result<(), sqlx::Error> {
        let active = RideRepo::find_active_with_driver(&self.pool).await?;

        // Drop cache entries for rides that left the active set.
        {
            let mut last_sent = self.last_sent.lock().await;
            let active_ids: std::collections::HashSet<DbId> =
                active.iter().map(|(ride_id, _)| *ride_id).collect();
            last_sent.retain(|ride_id, _| active_ids.contains(ride_id));
        }

        let now = tokio::time::Instant::now();
        for (ride_id, driver_id) in active {
            let room = ride_room(ride_id);

            // Nobody watching: skip the presence read entirely.
            if self.ws.room_size(&room).await == 0 {
                continue;
            }

            // Missing or stale presence means "driver presence unknown";
            // suppress the broadcast rather than emit old coordinates.
            let presence =
                match PresenceRepo::get_fresh(&self.pool, driver_id, self.presence_ttl_secs)
                    .await?
                {
                    Some(presence) => presence,
                    None => {
                        tracing::debug!(ride_id, driver_id, "No fresh presence, skipping tick");
                        continue;
                    }
                };

            let position = presence.position();
            let mut last_sent = self.last_sent.lock().await;
            if !should_emit(last_sent.get(&ride_id), position, now, self.max_silence) {
                continue;
            }
            last_sent.insert(
                ride_id,
                LastSent {
                    position,
                    sent_at: now,
                },
            );
            drop(last_sent);

            let event = ServerEvent::DriverLocationUpdate {
                ride_id,
                driver_id,
                location: LocationPayload::from(&presence),
                reported_at: presence.reported_at,
                timestamp: Utc::now(),
            };
            self.ws.send_to_room(&room, event.to_message()).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POS_A: GeoPoint = GeoPoint {
        latitude: -4.30,
        longitude: 15.30,
    };
    const POS_B: GeoPoint = GeoPoint {
        latitude: -4.31,
        longitude: 15.31,
    };

    #[test]
    fn first_sighting_always_emits() {
        let now = tokio::time::Instant::now();
        assert!(should_emit(None, POS_A, now, Duration::from_secs(10)));
    }

    #[test]
    fn unchanged_position_is_suppressed_until_max_silence() {
        let sent_at = tokio::time::Instant::now();
        let last = LastSent {
            position: POS_A,
            sent_at,
        };
        let max_silence = Duration::from_secs(10);

        assert!(!should_emit(
            Some(&last),
            POS_A,
            sent_at + Duration::from_secs(2),
            max_silence
        ));
        assert!(should_emit(
            Some(&last),
            POS_A,
            sent_at + Duration::from_secs(10),
            max_silence
        ));
    }

    #[test]
    fn changed_position_emits_immediately() {
        let sent_at = tokio::time::Instant::now();
        let last = LastSent {
            position: POS_A,
            sent_at,
        };
        assert!(should_emit(
            Some(&last),
            POS_B,
            sent_at + Duration::from_millis(1),
            Duration::from_secs(10)
        ));
    }
}
