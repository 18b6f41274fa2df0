use std::sync::Arc;
use std::time::Duration;

use chrono::{Months, Utc};
use timbang_core::error::AcquireError;
use timbang_core::mocks::{MemoryStore, ScriptedSensor};
use timbang_core::{
    Acquisition, CommitService, GrowthReference, LinkCfg, LinkState, StabilityCfg, TickStatus,
};
use timbang_traits::clock::manual::ManualClock;

const SETTLE_MS: u64 = 1000;

fn engine(sensor: ScriptedSensor, clock: &ManualClock) -> Acquisition<ScriptedSensor> {
    Acquisition::builder(sensor)
        .with_stability(StabilityCfg::default())
        .with_link(LinkCfg {
            settle_ms: SETTLE_MS,
        })
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("build engine")
}

/// Quiet pair followed by more quiet readings: stable from the second tick.
fn quiet_sensor() -> ScriptedSensor {
    ScriptedSensor::from_pairs(&[(8.50, 70.0), (8.52, 70.1), (8.51, 70.0), (8.53, 70.2)])
}

fn service_with_roster() -> (CommitService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let birth = Utc::now().date_naive() - Months::new(8);
    store.add_subject(1, "Andi Pratama", birth, true);
    store.add_operator(7, "Admin Posyandu", true);
    let service = CommitService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        GrowthReference::default(),
    );
    (service, store)
}

fn connect_and_stream(acq: &mut Acquisition<ScriptedSensor>, clock: &ManualClock) {
    acq.connect().expect("connect");
    clock.advance_ms(SETTLE_MS);
    // First reading after the settle delay; never stable on its own.
    match acq.tick().expect("tick") {
        TickStatus::Reading { stable, .. } => assert!(!stable),
        other => panic!("expected first reading, got {other:?}"),
    }
}

#[test]
fn connect_is_only_valid_while_disconnected() {
    let clock = ManualClock::new();
    let mut acq = engine(quiet_sensor(), &clock);
    acq.connect().expect("first connect");
    assert!(matches!(
        acq.connect(),
        Err(AcquireError::State(_))
    ));
    // Reconnect is disconnect() then connect().
    acq.disconnect();
    acq.connect().expect("connect after disconnect");
}

#[test]
fn tick_while_disconnected_is_offline() {
    let clock = ManualClock::new();
    let mut acq = engine(quiet_sensor(), &clock);
    assert_eq!(acq.tick().expect("tick"), TickStatus::Offline);
    assert_eq!(acq.link(), LinkState::Disconnected);
}

#[test]
fn settle_delay_gates_streaming() {
    let clock = ManualClock::new();
    let mut acq = engine(quiet_sensor(), &clock);
    acq.connect().expect("connect");

    assert_eq!(acq.tick().expect("tick"), TickStatus::Connecting);
    clock.advance_ms(SETTLE_MS - 1);
    assert_eq!(acq.tick().expect("tick"), TickStatus::Connecting);
    assert!(!acq.link().is_streaming());

    clock.advance_ms(1);
    match acq.tick().expect("tick") {
        TickStatus::Reading { .. } => {}
        other => panic!("expected streaming reading, got {other:?}"),
    }
    assert!(acq.link().is_streaming());
}

#[test]
fn capture_requires_subject_stream_and_stability() {
    let clock = ManualClock::new();
    let mut acq = engine(quiet_sensor(), &clock);

    // Not even connected yet: subject check still comes first.
    assert_eq!(acq.capture(None), Err(AcquireError::NoSubjectSelected));
    assert_eq!(acq.capture(Some(1)), Err(AcquireError::NotConnected));

    connect_and_stream(&mut acq, &clock);
    // One reading seen; not stable yet.
    assert_eq!(acq.capture(Some(1)), Err(AcquireError::NotStable));

    // Second quiet reading arms capture.
    assert!(acq.tick().expect("tick").is_stable());
    let session = acq.capture(Some(1)).expect("capture");
    assert_eq!(session.subject_id, 1);
    assert!((session.frozen.weight_kg - 8.52).abs() < 1e-4);
}

#[test]
fn second_capture_fails_while_pending() {
    let clock = ManualClock::new();
    let mut acq = engine(quiet_sensor(), &clock);
    connect_and_stream(&mut acq, &clock);
    acq.tick().expect("tick");
    acq.capture(Some(1)).expect("first capture");

    assert_eq!(acq.capture(Some(1)), Err(AcquireError::CaptureInProgress));

    // Ticks keep flowing while the capture is pending; only capture() is gated.
    assert!(matches!(
        acq.tick().expect("tick"),
        TickStatus::Reading { .. }
    ));
    assert_eq!(acq.capture(Some(2)), Err(AcquireError::CaptureInProgress));
}

#[test]
fn cancel_frees_the_slot_without_persisting() {
    let clock = ManualClock::new();
    let mut acq = engine(quiet_sensor(), &clock);
    connect_and_stream(&mut acq, &clock);
    acq.tick().expect("tick");
    acq.capture(Some(1)).expect("capture");

    assert!(acq.cancel().is_some());
    assert!(acq.pending().is_none());
    // Slot is free again.
    acq.capture(Some(1)).expect("capture after cancel");
}

#[test]
fn disconnect_cancels_pending_capture_and_later_confirm_fails() {
    let clock = ManualClock::new();
    let (service, store) = service_with_roster();
    let mut acq = engine(quiet_sensor(), &clock);
    connect_and_stream(&mut acq, &clock);
    acq.tick().expect("tick");
    acq.capture(Some(1)).expect("capture");

    let lost = acq.disconnect().expect("pending capture must be cancelled");
    assert_eq!(lost.subject_id, 1);
    assert!(acq.pending().is_none());

    let err = acq
        .confirm(&service, 7, None)
        .expect_err("confirm after disconnect must fail");
    assert!(
        err.downcast_ref::<AcquireError>()
            .is_some_and(|e| matches!(e, AcquireError::State(_))),
        "unexpected error: {err}"
    );
    assert!(store.records().is_empty(), "nothing may be persisted");
}

#[test]
fn disconnect_clears_stability_window() {
    let clock = ManualClock::new();
    // Perfectly steady stream: stable from the second reading onwards.
    let mut acq = engine(
        ScriptedSensor::from_pairs(&[(8.5, 70.0); 8]),
        &clock,
    );
    connect_and_stream(&mut acq, &clock);
    assert!(acq.tick().expect("tick").is_stable());

    acq.disconnect();
    assert!(!acq.is_stable(), "disconnect invalidates stability");

    // After reconnect the first reading must not count as stable, even
    // though its value matches the pre-disconnect stream exactly.
    acq.connect().expect("reconnect");
    clock.advance_ms(SETTLE_MS);
    match acq.tick().expect("tick") {
        TickStatus::Reading { stable, .. } => assert!(!stable),
        other => panic!("expected reading, got {other:?}"),
    }
}

#[test]
fn confirm_commits_the_frozen_reading() {
    let clock = ManualClock::new();
    let (service, store) = service_with_roster();
    let mut acq = engine(quiet_sensor(), &clock);
    connect_and_stream(&mut acq, &clock);
    acq.tick().expect("tick");
    let session = acq.capture(Some(1)).expect("capture");

    let record = acq
        .confirm(&service, 7, Some("routine visit".into()))
        .expect("confirm");
    assert_eq!(record.subject_id, 1);
    assert_eq!(record.operator_id, 7);
    assert!((record.weight_kg - session.frozen.weight_kg).abs() < 1e-6);
    assert!(acq.pending().is_none(), "confirm clears the session");
    assert_eq!(store.records().len(), 1);

    // A new capture is possible immediately after.
    acq.tick().expect("tick");
    acq.capture(Some(1)).expect("capture after confirm");
}

#[test]
fn device_error_surfaces_from_tick() {
    struct BrokenSensor;
    impl timbang_traits::Sensor for BrokenSensor {
        fn sample(
            &mut self,
            _timeout: Duration,
        ) -> Result<timbang_traits::Sample, Box<dyn std::error::Error + Send + Sync>> {
            Err("frame checksum mismatch".into())
        }
    }

    let clock = ManualClock::new();
    let mut acq = Acquisition::builder(BrokenSensor)
        .with_link(LinkCfg { settle_ms: 0 })
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("build engine");
    acq.connect().expect("connect");
    let err = acq.tick().expect_err("broken sensor must error");
    assert!(format!("{err:#}").contains("device error"), "got: {err:#}");
}
