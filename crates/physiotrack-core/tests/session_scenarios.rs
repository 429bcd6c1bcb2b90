//! Integration tests for the session controller.
//!
//! Drives the controller end to end with an in-memory transport, in-memory
//! collaborators and an explicit millisecond clock.

use physiotrack_core::audio::RecordingCuePlayer;
use physiotrack_core::session::{MemoryStore, PresetStore, Services};
use physiotrack_core::storage::{Database, TopicConfig};
use physiotrack_core::telemetry::MemoryTransport;
use physiotrack_core::{
    CueId, Event, InboundEvent, ModeTable, SessionController, SessionGating, SessionPhase,
    SessionSettings, TelemetryLink, TimerPreset,
};
use proptest::prelude::*;
use serde_json::json;

struct Harness {
    controller: SessionController<MemoryTransport>,
    store: MemoryStore,
    cues: RecordingCuePlayer,
}

fn harness(preset: TimerPreset, gating: SessionGating, mode: &str) -> Harness {
    let store = MemoryStore::new().with_patient("p1").with_device("A");
    let cues = RecordingCuePlayer::new();
    let link = TelemetryLink::new(MemoryTransport::connected(), TopicConfig::default());
    let services = Services {
        store: Box::new(store.clone()),
        samples: Box::new(store.clone()),
        cues: Box::new(cues.clone()),
    };
    let settings = SessionSettings {
        gating,
        default_preset: preset,
        ..SessionSettings::default()
    };
    let mut controller = SessionController::new(link, services, settings, ModeTable::default());
    controller.configure_session("p1", mode).unwrap();
    Harness {
        controller,
        store,
        cues,
    }
}

fn data_topic() -> String {
    format!("{}/A", TopicConfig::default().data)
}

fn start_topic() -> String {
    format!("{}/A", TopicConfig::default().start)
}

fn payload(v: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&v).unwrap()
}

/// Operator start followed by the device start signal at `at`.
fn start_running(h: &mut Harness, at: u64) {
    h.controller.operator_start_at(at).unwrap();
    h.controller
        .handle_message_at(&start_topic(), &payload(json!({"start": 1})), at);
    assert_eq!(h.controller.phase(), SessionPhase::Running);
}

#[test]
fn test_lumbar_pressure_sequence_dedups_and_warns_once() {
    let mut h = harness(TimerPreset::default(), SessionGating::Therapist, "lumbar");
    start_running(&mut h, 0);

    for (i, pressure) in [25.0, 45.0, 45.0, 60.0, 40.0].into_iter().enumerate() {
        h.controller.handle_message_at(
            &data_topic(),
            &payload(json!({ "pressure": pressure })),
            100 + i as u64 * 100,
        );
    }

    let recorded: Vec<f64> = h.controller.samples().iter().map(|s| s.pressure).collect();
    assert_eq!(recorded, vec![25.0, 45.0, 60.0, 40.0]);

    let persisted: Vec<f64> = h.store.samples().iter().map(|s| s.pressure).collect();
    assert_eq!(persisted, recorded);
    assert_eq!(h.cues.count(CueId::Warning), 1);

    let over: Vec<_> = h
        .controller
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, Event::OverPressure { .. }))
        .collect();
    assert_eq!(over.len(), 1);
    assert_eq!(h.controller.current_pressure(), 40.0);
}

#[test]
fn test_sustained_over_pressure_keeps_requesting_warning() {
    let mut h = harness(TimerPreset::default(), SessionGating::Client, "lumbar");
    h.controller.operator_start_at(0).unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Running);

    for i in 0..10u64 {
        h.controller.handle_inbound_at(InboundEvent::Data { pressure: 60.0 }, 1_000 * i);
    }

    // Stored once, warned on every reading.
    assert_eq!(h.controller.samples().len(), 1);
    assert_eq!(h.store.samples().len(), 1);
    assert_eq!(h.cues.count(CueId::Warning), 10);
    assert!(h
        .cues
        .requests()
        .iter()
        .filter(|(cue, _)| *cue == CueId::Warning)
        .all(|(_, options)| options.skip_if_playing));
}

#[test]
fn test_samples_carry_session_context() {
    let mut h = harness(TimerPreset::default(), SessionGating::Therapist, "Lumbar Flexion");
    start_running(&mut h, 5_000);
    h.controller.handle_inbound_at(InboundEvent::Data { pressure: 41.0 }, 5_250);

    let sample = &h.store.samples()[0];
    assert_eq!(sample.patient_id.as_deref(), Some("p1"));
    assert_eq!(sample.exercise_mode.as_deref(), Some("Lumbar Flexion"));
    assert_eq!(sample.session_start.map(|t| t.timestamp_millis()), Some(5_000));
    assert_eq!(sample.captured_at.timestamp_millis(), 5_250);
}

#[test]
fn test_work_rest_timeline_with_two_repetitions() {
    let preset = TimerPreset::new(20.0, 10.0, 2).unwrap();
    let mut h = harness(preset, SessionGating::Therapist, "lumbar");
    start_running(&mut h, 0);

    let mut boundaries = vec![h.controller.repetitions().remaining()];
    let mut phases = vec![h.controller.phase()];
    // 10 ms polling over the whole session
    for now in (0..=60_000).step_by(10) {
        let before = h.controller.phase();
        h.controller.tick_at(now);
        if h.controller.phase() != before {
            boundaries.push(h.controller.repetitions().remaining());
            phases.push(h.controller.phase());
        }
    }

    assert_eq!(
        phases,
        vec![
            SessionPhase::Running,
            SessionPhase::Resting,
            SessionPhase::Running,
            SessionPhase::Finished
        ]
    );
    assert_eq!(boundaries, vec![2, 2, 1, 0]);
    assert_eq!(h.cues.count(CueId::Rest), 1);
    assert_eq!(h.cues.count(CueId::Finish), 1);
    // session start + work start after the rest
    assert_eq!(h.cues.count(CueId::Start), 2);

    let summary = h.controller.last_summary().unwrap();
    assert_eq!(summary.elapsed_secs, 50.0);
}

#[test]
fn test_single_repetition_has_no_rest_phase() {
    let preset = TimerPreset::new(5.0, 10.0, 1).unwrap();
    let mut h = harness(preset, SessionGating::Client, "cervical");
    h.controller.operator_start_at(0).unwrap();
    h.controller.tick_at(5_000);
    assert_eq!(h.controller.phase(), SessionPhase::Finished);
    assert_eq!(h.cues.count(CueId::Rest), 0);
}

#[test]
fn test_stop_while_resting_finishes_immediately() {
    let preset = TimerPreset::new(2.0, 10.0, 3).unwrap();
    let mut h = harness(preset, SessionGating::Therapist, "lumbar");
    start_running(&mut h, 0);
    h.controller.handle_inbound_at(InboundEvent::Data { pressure: 47.0 }, 500);
    h.controller.tick_at(2_000);
    assert_eq!(h.controller.phase(), SessionPhase::Resting);

    h.controller.operator_stop_at(3_000);
    assert_eq!(h.controller.phase(), SessionPhase::Finished);
    assert!(!h.controller.timer().is_counting());
    assert!(!h.controller.rest().is_resting);
    assert_eq!(h.controller.current_pressure(), 25.0);

    // nothing happens once the old rest deadline passes
    h.controller.tick_at(20_000);
    assert_eq!(h.controller.phase(), SessionPhase::Finished);
}

#[test]
fn test_restart_resets_repetitions_and_samples() {
    let preset = TimerPreset::new(2.0, 1.0, 3).unwrap();
    let mut h = harness(preset, SessionGating::Client, "lumbar");
    h.controller.operator_start_at(0).unwrap();
    h.controller.handle_inbound_at(InboundEvent::Data { pressure: 40.0 }, 100);
    h.controller.tick_at(2_000);
    h.controller.tick_at(3_000);
    assert_eq!(h.controller.repetitions().remaining(), 2);
    h.controller.operator_stop_at(3_500);

    h.controller.operator_start_at(10_000).unwrap();
    assert_eq!(h.controller.repetitions().remaining(), 3);
    assert!(h.controller.samples().is_empty());
    assert_eq!(h.controller.phase(), SessionPhase::Running);
}

#[test]
fn test_start_signal_outside_waiting_is_ignored() {
    let mut h = harness(TimerPreset::default(), SessionGating::Therapist, "lumbar");
    h.controller
        .handle_message_at(&start_topic(), &payload(json!({"start": 1})), 0);
    assert_eq!(h.controller.phase(), SessionPhase::Stopped);

    h.controller.operator_start_at(0).unwrap();
    h.controller
        .handle_message_at(&start_topic(), &payload(json!({"start": 0})), 10);
    assert_eq!(h.controller.phase(), SessionPhase::WaitingForDevice);
    // data before the start signal is not recorded
    h.controller.handle_inbound_at(InboundEvent::Data { pressure: 30.0 }, 20);
    assert!(h.controller.samples().is_empty());
}

#[test]
fn test_rebinding_is_idempotent_and_drops_old_device() {
    let mut h = harness(TimerPreset::default(), SessionGating::Therapist, "lumbar");
    let subscribed = h.controller.link().transport().subscribe_calls.len();

    h.controller.request_pairing().unwrap();
    h.controller.handle_message_at(
        &TopicConfig::default().device,
        &payload(json!({"device": "A"})),
        0,
    );
    h.controller.confirm_pairing_at("A", 0).unwrap();
    assert_eq!(
        h.controller.link().transport().subscribe_calls.len(),
        subscribed
    );

    h.controller.handle_message_at(
        &TopicConfig::default().device,
        &payload(json!({"device": "B"})),
        0,
    );
    h.controller.confirm_pairing_at("B", 0).unwrap();
    assert_eq!(h.controller.link().bound_device(), Some("B"));

    h.controller.operator_start_at(0).unwrap();
    h.controller
        .handle_message_at(&start_topic(), &payload(json!({"start": 1})), 0);
    assert_eq!(h.controller.phase(), SessionPhase::WaitingForDevice);
}

#[test]
fn test_pairing_save_failure_keeps_binding_and_notifies() {
    let mut h = harness(TimerPreset::default(), SessionGating::Therapist, "lumbar");
    h.controller.request_pairing().unwrap();
    h.controller
        .handle_inbound_at(InboundEvent::DeviceAnnounce { device: "B".into() }, 0);
    h.controller.take_events();

    h.store.fail_device_save(true);
    assert!(h.controller.confirm_pairing_at("B", 0).is_err());
    assert_eq!(h.controller.link().bound_device(), Some("A"));
    assert!(h.controller.take_events().iter().any(|e| matches!(
        e,
        Event::Notification { level: physiotrack_core::NotificationLevel::Error, .. }
    )));
}

#[test]
fn test_rejected_timer_update_keeps_previous_preset() {
    let preset = TimerPreset::new(20.0, 10.0, 2).unwrap();
    let mut h = harness(preset, SessionGating::Therapist, "lumbar");
    assert!(h
        .controller
        .configure_timer_at(Some(30.0), None, Some(4), 0)
        .is_err());
    assert!(h
        .controller
        .configure_timer_at(Some(30.0), Some(0.0), Some(4), 0)
        .is_err());
    assert_eq!(h.controller.preset(), preset);
    assert_eq!(h.store.stored_preset(), Some(preset));

    h.controller
        .configure_timer_at(Some(30.0), Some(5.0), Some(4), 0)
        .unwrap();
    assert_eq!(h.controller.repetitions().total(), 4);
    assert_eq!(h.store.stored_preset(), Some(h.controller.preset()));
}

#[test]
fn test_controller_over_sqlite_collaborators() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("physiotrack.db");
    let db = Database::open_at(&path).unwrap();
    db.add_patient("P1", None).unwrap();

    let link = TelemetryLink::new(MemoryTransport::connected(), TopicConfig::default());
    let services = Services {
        store: Box::new(db),
        samples: Box::new(physiotrack_core::SampleWriter::spawn(&path).unwrap()),
        cues: Box::new(RecordingCuePlayer::new()),
    };
    let settings = SessionSettings {
        gating: SessionGating::Client,
        ..SessionSettings::default()
    };
    let mut controller =
        SessionController::new(link, services, settings, ModeTable::default());
    controller.configure_session("p1", "thoracic").unwrap();
    // no device stored yet: start turns into a pairing request
    controller.operator_start_at(0).unwrap();
    assert_eq!(controller.phase(), SessionPhase::Stopped);
    drop(controller);

    let db = Database::open_at(&path).unwrap();
    assert_eq!(db.timer_preset().unwrap(), Some(TimerPreset::default()));
}

proptest! {
    #[test]
    fn prop_stored_samples_never_repeat_consecutively(
        pressures in proptest::collection::vec(0u8..6, 1..120)
    ) {
        let preset = TimerPreset::new(3_600.0, 1.0, 1).unwrap();
        let mut h = harness(preset, SessionGating::Client, "lumbar");
        h.controller.operator_start_at(0).unwrap();
        for (i, p) in pressures.iter().enumerate() {
            let pressure = f64::from(*p) * 10.0;
            h.controller.handle_inbound_at(InboundEvent::Data { pressure }, i as u64 + 1);
        }
        let stored: Vec<f64> = h.controller.samples().iter().map(|s| s.pressure).collect();
        prop_assert!(stored.windows(2).all(|w| w[0] != w[1]));
        // every change in the input survives
        let mut expected: Vec<f64> = pressures.iter().map(|p| f64::from(*p) * 10.0).collect();
        expected.dedup();
        prop_assert_eq!(stored, expected);
    }
}
