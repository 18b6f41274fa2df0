use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Months, Utc};
use timbang_core::error::AcquireError;
use timbang_core::mocks::{MemoryStore, ScriptedSensor};
use timbang_core::runner::{SessionParams, TickMode, run_session};
use timbang_core::{AcquireCfg, CommitService, GrowthReference, LinkCfg, StabilityCfg};
use timbang_traits::clock::manual::ManualClock;

fn service() -> (CommitService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let birth = Utc::now().date_naive() - Months::new(8);
    store.add_subject(1, "Andi Pratama", birth, true);
    store.add_operator(7, "Admin Posyandu", true);
    let svc = CommitService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        GrowthReference::default(),
    );
    (svc, store)
}

fn params(mode: TickMode, max_wait_ms: u64) -> SessionParams {
    SessionParams {
        subject_id: 1,
        operator_id: 7,
        notes: None,
        max_wait_ms,
        mode,
    }
}

#[test]
fn direct_session_commits_once_stable() {
    let (svc, store) = service();
    let clock = Arc::new(ManualClock::new());
    // Jittery start, then the stream settles.
    let sensor = ScriptedSensor::from_pairs(&[
        (8.10, 70.0),
        (8.90, 72.0),
        (8.50, 70.0),
        (8.52, 70.1),
        (8.51, 70.0),
    ]);

    let record = run_session(
        sensor,
        AcquireCfg::default(),
        StabilityCfg::default(),
        LinkCfg { settle_ms: 1000 },
        &svc,
        params(TickMode::Direct, 0),
        None,
        Some(clock),
    )
    .expect("session");

    assert_eq!(record.subject_id, 1);
    assert_eq!(store.records().len(), 1);
    // The committed values come from the settled part of the stream.
    assert!(record.weight_kg > 8.4 && record.weight_kg < 8.6);
}

#[test]
fn wait_bound_disconnects_unstable_session() {
    let (svc, store) = service();
    let clock = Arc::new(ManualClock::new());

    let err = run_session(
        ScriptedJitter::new(),
        AcquireCfg::default(),
        StabilityCfg::default(),
        LinkCfg { settle_ms: 0 },
        &svc,
        params(TickMode::Direct, 3000),
        None,
        Some(clock),
    )
    .expect_err("must hit the wait bound");

    assert!(format!("{err}").contains("wait bound"), "got: {err}");
    assert!(store.records().is_empty());
}

/// Sensor adapter that alternates between two fixed samples forever.
struct ScriptedJitter {
    a: timbang_traits::Sample,
    b: timbang_traits::Sample,
    flip: bool,
}

impl ScriptedJitter {
    fn new() -> Self {
        Self {
            a: timbang_traits::Sample {
                weight_kg: 8.0,
                height_cm: 70.0,
            },
            b: timbang_traits::Sample {
                weight_kg: 9.0,
                height_cm: 72.0,
            },
            flip: false,
        }
    }
}

impl timbang_traits::Sensor for ScriptedJitter {
    fn sample(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<timbang_traits::Sample, Box<dyn std::error::Error + Send + Sync>> {
        self.flip = !self.flip;
        Ok(if self.flip { self.a } else { self.b })
    }
}

#[test]
fn shutdown_flag_cancels_deterministically() {
    let (svc, store) = service();
    let clock = Arc::new(ManualClock::new());
    let shutdown = Arc::new(AtomicBool::new(true));
    shutdown.store(true, Ordering::Relaxed);

    let err = run_session(
        ScriptedSensor::from_pairs(&[(8.5, 70.0)]),
        AcquireCfg::default(),
        StabilityCfg::default(),
        LinkCfg::default(),
        &svc,
        params(TickMode::Direct, 0),
        Some(shutdown),
        Some(clock),
    )
    .expect_err("interrupt must cancel the session");

    assert!(
        err.downcast_ref::<AcquireError>()
            .is_some_and(|e| matches!(e, AcquireError::ConnectionLost)),
        "got: {err}"
    );
    assert!(store.records().is_empty());
}

#[test]
fn ticker_session_commits_with_real_clock() {
    let (svc, store) = service();
    // Perfectly steady stream at a fast tick so the test stays quick.
    let sensor = ScriptedSensor::from_pairs(&[(8.5, 70.0)]);
    let record = run_session(
        sensor,
        AcquireCfg {
            tick_ms: 5,
            sample_timeout_ms: 50,
        },
        StabilityCfg::default(),
        LinkCfg { settle_ms: 10 },
        &svc,
        params(TickMode::Ticker, 5_000),
        None,
        None,
    )
    .expect("ticker session");
    assert_eq!(record.subject_id, 1);
    assert_eq!(store.records().len(), 1);
}
