//! Wire-format tests for the realtime protocol: exact event type tags,
//! camelCase casing, and the invariants every payload must carry (ids,
//! timestamp, version).

use chrono::Utc;

use ridewire_api::ws::protocol::{ClientMessage, DriverMessage, ServerEvent};
use ridewire_core::error::CoreError;
use ridewire_core::ride::RideStatus;

fn to_json(event: &ServerEvent) -> serde_json::Value {
    serde_json::to_value(event).expect("event must serialize")
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[test]
fn status_change_carries_ids_version_and_timestamp() {
    let json = to_json(&ServerEvent::RideStatusChanged {
        ride_id: 42,
        status: RideStatus::DriverArriving,
        driver_id: Some(7),
        version: 3,
        timestamp: Utc::now(),
    });

    assert_eq!(json["type"], "ride:status:changed");
    assert_eq!(json["rideId"], 42);
    assert_eq!(json["driverId"], 7);
    assert_eq!(json["status"], "driverArriving");
    assert_eq!(json["version"], 3);
    assert!(json["timestamp"].is_string());
}

#[test]
fn withdrawal_and_no_driver_use_their_exact_tags() {
    let withdrawn = to_json(&ServerEvent::RideWithdrawn {
        ride_id: 42,
        timestamp: Utc::now(),
    });
    assert_eq!(withdrawn["type"], "ride_withdrawn");
    assert_eq!(withdrawn["rideId"], 42);

    let unmatched = to_json(&ServerEvent::NoDriverAvailable {
        ride_id: 42,
        timestamp: Utc::now(),
    });
    assert_eq!(unmatched["type"], "no_driver_available");
    assert!(unmatched["timestamp"].is_string());
}

#[test]
fn error_event_carries_the_domain_code() {
    let geofence = CoreError::Geofence {
        distance_m: 5012.3,
        max_allowed_m: 2000.0,
    };
    let json = to_json(&ServerEvent::from_error(&geofence));

    assert_eq!(json["type"], "error");
    assert_eq!(json["code"], "GEOFENCE");
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("5012"), "message carries the measured distance");
    assert!(message.contains("2000"), "message carries the allowed distance");

    let stale = CoreError::StaleState("The offer for this ride has expired".into());
    let json = to_json(&ServerEvent::from_error(&stale));
    assert_eq!(json["code"], "STALE_STATE");
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[test]
fn driver_messages_parse_from_mobile_wire_format() {
    let accept: DriverMessage =
        serde_json::from_str(r#"{"type":"ride:accept","rideId":42}"#).unwrap();
    assert!(matches!(accept, DriverMessage::Accept { ride_id: 42 }));

    let status: DriverMessage = serde_json::from_str(
        r#"{"type":"ride:status:update","rideId":42,"status":"inProgress",
            "location":{"latitude":-4.30,"longitude":15.30},"finalPrice":null}"#,
    )
    .unwrap();
    match status {
        DriverMessage::UpdateStatus {
            ride_id, status, ..
        } => {
            assert_eq!(ride_id, 42);
            assert_eq!(status, RideStatus::InProgress);
        }
        other => panic!("expected UpdateStatus, got {other:?}"),
    }

    // heading and speed default when the device omits them.
    let report: DriverMessage = serde_json::from_str(
        r#"{"type":"location:report","latitude":-4.30,"longitude":15.30}"#,
    )
    .unwrap();
    match report {
        DriverMessage::ReportLocation {
            heading, speed_kmh, ..
        } => {
            assert_eq!(heading, 0.0);
            assert_eq!(speed_kmh, 0.0);
        }
        other => panic!("expected ReportLocation, got {other:?}"),
    }
}

#[test]
fn client_messages_parse_and_reject_garbage() {
    let join: ClientMessage = serde_json::from_str(r#"{"type":"ride:join","rideId":42}"#).unwrap();
    assert!(matches!(join, ClientMessage::JoinRide { ride_id: 42 }));

    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"ride:join"}"#).is_err());
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"unknown_event"}"#).is_err());
    assert!(serde_json::from_str::<DriverMessage>("not json at all").is_err());
}
