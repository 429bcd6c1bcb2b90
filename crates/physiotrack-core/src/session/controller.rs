//! Session controller.
//!
//! Owns all session state and is only ever driven from one task: broker
//! messages, timer ticks and operator commands are applied one at a time
//! through the methods below. Every method has an `_at(now_ms)` form so the
//! clock can be supplied explicitly.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped --start--> WaitingForDevice --start signal--> Running
//! Stopped --start (client gating)---------------------> Running
//! Running --work expiry, reps left--> Resting --rest expiry--> Running
//! Running --work expiry, last rep--> Finished
//! WaitingForDevice | Running | Resting --stop--> Finished
//! Finished --start--> (as Stopped)
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::modes::{ExerciseMode, ModeTable};
use super::sample::{timestamp, Sample, SessionSummary};
use super::services::Services;
use super::state::{RepetitionState, RestState, SessionGating, SessionPhase};
use crate::audio::{CueId, PlayOptions};
use crate::error::{Result, ValidationError};
use crate::events::{Event, NotificationLevel};
use crate::storage::Config;
use crate::telemetry::{InboundEvent, TelemetryLink, Transport};
use crate::timer::{now_ms, PhaseKind, TimerEngine, TimerPreset, TimerReading};

/// Controller tuning taken from the `[session]`, `[audio]` and `[timer]`
/// config sections.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub baseline_pressure: f64,
    pub gating: SessionGating,
    pub command_offset: f64,
    pub rest_cue: CueId,
    /// Used when the preset store has nothing saved.
    pub default_preset: TimerPreset,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            baseline_pressure: config.session.baseline_pressure,
            gating: config.session.gating,
            command_offset: config.session.command_offset,
            rest_cue: config.audio.rest_cue.into(),
            default_preset: config.default_preset(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            baseline_pressure: 25.0,
            gating: SessionGating::Therapist,
            command_offset: 2.0,
            rest_cue: CueId::Rest,
            default_preset: TimerPreset::default(),
        }
    }
}

/// Point-in-time view for front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub patient_id: Option<String>,
    pub mode_label: Option<String>,
    pub mode: Option<ExerciseMode>,
    pub device: Option<String>,
    pub pressure: f64,
    /// Footer readout.
    pub pressure_label: String,
    pub repetitions_remaining: u32,
    pub repetitions_total: u32,
    pub is_resting: bool,
    pub timer: TimerReading,
    pub preset: TimerPreset,
    pub sample_count: usize,
    pub candidates: Vec<String>,
}

pub struct SessionController<T: Transport> {
    link: TelemetryLink<T>,
    services: Services,
    settings: SessionSettings,
    modes: ModeTable,
    timer: TimerEngine,
    phase: SessionPhase,
    repetitions: RepetitionState,
    rest: RestState,
    patient_id: Option<String>,
    mode_label: Option<String>,
    session_id: Option<Uuid>,
    session_start_ms: Option<u64>,
    samples: Vec<Sample>,
    current_pressure: f64,
    last_summary: Option<SessionSummary>,
    candidates: Vec<String>,
    events: Vec<Event>,
}

impl<T: Transport> SessionController<T> {
    /// Load the stored preset (saving the default when none exists) and bind
    /// the stored paired device, if any.
    pub fn new(
        link: TelemetryLink<T>,
        mut services: Services,
        settings: SessionSettings,
        modes: ModeTable,
    ) -> Self {
        let preset = match services.store.timer_preset() {
            Ok(Some(preset)) => preset,
            Ok(None) => {
                if let Err(e) = services.store.set_timer_preset(&settings.default_preset) {
                    warn!(error = %e, "failed to save default timer preset");
                }
                settings.default_preset
            }
            Err(e) => {
                warn!(error = %e, "failed to load timer preset, using default");
                settings.default_preset
            }
        };

        let paired = services.store.paired_device().unwrap_or_else(|e| {
            warn!(error = %e, "failed to load paired device");
            None
        });

        let mut controller = Self {
            link,
            services,
            current_pressure: settings.baseline_pressure,
            settings,
            modes,
            timer: TimerEngine::new(preset),
            phase: SessionPhase::Stopped,
            repetitions: RepetitionState::new(preset.repetitions),
            rest: RestState::new(preset.rest_secs),
            patient_id: None,
            mode_label: None,
            session_id: None,
            session_start_ms: None,
            samples: Vec::new(),
            last_summary: None,
            candidates: Vec::new(),
            events: Vec::new(),
        };
        if let Some(device) = paired {
            controller.link.bind_device(&device);
        }
        controller
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn repetitions(&self) -> RepetitionState {
        self.repetitions
    }

    pub fn rest(&self) -> RestState {
        self.rest
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn current_pressure(&self) -> f64 {
        self.current_pressure
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    /// Band for the active mode label.
    pub fn mode(&self) -> Option<&ExerciseMode> {
        self.mode_label.as_deref().and_then(|l| self.modes.find(l))
    }

    pub fn preset(&self) -> TimerPreset {
        *self.timer.preset()
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn link(&self) -> &TelemetryLink<T> {
        &self.link
    }

    pub fn last_summary(&self) -> Option<&SessionSummary> {
        self.last_summary.as_ref()
    }

    /// Drain the events produced since the last call.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let pressure_label = if self.phase.is_active() && self.samples.is_empty() {
            "No Data".to_string()
        } else {
            format!("{}", self.current_pressure)
        };
        SessionSnapshot {
            phase: self.phase,
            patient_id: self.patient_id.clone(),
            mode_label: self.mode_label.clone(),
            mode: self.mode().cloned(),
            device: self.link.bound_device().map(str::to_string),
            pressure: self.current_pressure,
            pressure_label,
            repetitions_remaining: self.repetitions.remaining(),
            repetitions_total: self.repetitions.total(),
            is_resting: self.rest.is_resting,
            timer: self.timer.reading(),
            preset: self.preset(),
            sample_count: self.samples.len(),
            candidates: self.candidates.clone(),
        }
    }

    // ── Setup and edits ──────────────────────────────────────────────

    /// Select the patient and exercise mode for the next session.
    ///
    /// # Errors
    /// Refused while a session is active, for unknown patients and for labels
    /// that match no mode.
    pub fn configure_session(&mut self, patient_id: &str, mode_label: &str) -> Result<()> {
        self.ensure_idle("changing the session")?;
        if !self.services.store.patient_exists(patient_id)? {
            return Err(ValidationError::PatientNotFound(patient_id.to_string()).into());
        }
        self.modes.resolve(mode_label)?;
        self.patient_id = Some(patient_id.to_string());
        self.mode_label = Some(mode_label.to_string());
        info!(patient = patient_id, mode = mode_label, "session configured");
        Ok(())
    }

    pub fn set_custom_mode(
        &mut self,
        min: Option<f64>,
        max: Option<f64>,
    ) -> std::result::Result<(), ValidationError> {
        self.set_custom_mode_at(min, max, now_ms())
    }

    /// Overwrite the custom band. Both bounds are required.
    pub fn set_custom_mode_at(
        &mut self,
        min: Option<f64>,
        max: Option<f64>,
        now_ms: u64,
    ) -> std::result::Result<(), ValidationError> {
        self.ensure_idle("editing the custom mode")?;
        self.modes.set_custom(min, max)?;
        if let Some(custom) = self.modes.custom() {
            let message = format!(
                "Custom mode set to {}-{}",
                custom.min_pressure, custom.max_pressure
            );
            self.notify(NotificationLevel::Success, message, now_ms);
        }
        Ok(())
    }

    /// Validate and persist a new preset. Takes effect on the next start.
    ///
    /// # Errors
    /// Validation errors leave the active preset untouched. A store failure is
    /// reported to the operator and also leaves it untouched.
    pub fn configure_timer(
        &mut self,
        work_secs: Option<f64>,
        rest_secs: Option<f64>,
        repetitions: Option<u32>,
    ) -> Result<()> {
        self.configure_timer_at(work_secs, rest_secs, repetitions, now_ms())
    }

    pub fn configure_timer_at(
        &mut self,
        work_secs: Option<f64>,
        rest_secs: Option<f64>,
        repetitions: Option<u32>,
        now_ms: u64,
    ) -> Result<()> {
        self.ensure_idle("changing the timer")?;
        let preset = TimerPreset::from_input(work_secs, rest_secs, repetitions)?;
        if let Err(e) = self.services.store.set_timer_preset(&preset) {
            warn!(error = %e, "failed to save timer preset");
            self.notify(NotificationLevel::Error, format!("Failed to save timer: {e}"), now_ms);
            return Err(e);
        }
        self.timer.set_preset(preset);
        self.repetitions = RepetitionState::new(preset.repetitions);
        self.rest = RestState::new(preset.rest_secs);
        self.notify(NotificationLevel::Success, "Timer updated".into(), now_ms);
        Ok(())
    }

    // ── Pairing ──────────────────────────────────────────────────────

    /// Start a pairing scan: clear candidates and ask devices to announce.
    pub fn request_pairing(&mut self) -> std::result::Result<(), ValidationError> {
        self.ensure_idle("pairing")?;
        self.candidates.clear();
        self.link.request_pairing();
        info!("pairing scan requested");
        Ok(())
    }

    pub fn confirm_pairing(&mut self, device_id: &str) -> Result<()> {
        self.confirm_pairing_at(device_id, now_ms())
    }

    /// Save `device_id` with the registry and bind to it.
    ///
    /// # Errors
    /// Refused while active or for ids that were not announced during the
    /// scan. A registry failure is reported to the operator and the current
    /// binding is kept.
    pub fn confirm_pairing_at(&mut self, device_id: &str, now_ms: u64) -> Result<()> {
        self.ensure_idle("pairing")?;
        let device = device_id.trim();
        if device.is_empty() || !self.candidates.iter().any(|c| c == device) {
            return Err(ValidationError::InvalidDevice(device.to_string()).into());
        }

        if let Err(e) = self.services.store.set_paired_device(device) {
            warn!(device, error = %e, "failed to save paired device");
            self.notify(NotificationLevel::Error, format!("Failed to save device: {e}"), now_ms);
            return Err(e);
        }

        self.link.bind_device(device);
        self.emit(Event::DeviceBound {
            device: device.to_string(),
            at: timestamp(now_ms),
        });
        self.notify(NotificationLevel::Success, format!("Paired with {device}"), now_ms);
        Ok(())
    }

    // ── Session lifecycle ────────────────────────────────────────────

    pub fn operator_start(&mut self) -> Result<()> {
        self.operator_start_at(now_ms())
    }

    /// Arm (therapist gating) or begin (client gating) a session. Without a
    /// paired device a pairing scan is issued instead and the state stays put.
    ///
    /// # Errors
    /// Refused while active and before [`configure_session`](Self::configure_session).
    pub fn operator_start_at(&mut self, now_ms: u64) -> Result<()> {
        self.ensure_idle("starting a new session")?;
        if self.patient_id.is_none() {
            return Err(ValidationError::MissingField("patient").into());
        }
        let label = self
            .mode_label
            .clone()
            .ok_or(ValidationError::MissingField("mode"))?;
        let mode = self.modes.resolve(&label)?.clone();

        if !self.link.is_initialized() {
            info!("no paired device, requesting pairing");
            self.candidates.clear();
            self.link.request_pairing();
            self.emit(Event::PairingRequired {
                at: timestamp(now_ms),
            });
            return Ok(());
        }

        self.samples.clear();
        self.last_summary = None;
        self.timer.cancel();

        match self.settings.gating {
            SessionGating::Therapist => {
                let command_pressure = (mode.min_pressure != 0.0)
                    .then(|| mode.min_pressure + self.settings.command_offset);
                if let Some(pressure) = command_pressure {
                    self.link.publish_command(pressure, &label);
                }
                self.set_phase(SessionPhase::WaitingForDevice, now_ms);
                self.emit(Event::SessionArmed {
                    mode: label,
                    command_pressure,
                    at: timestamp(now_ms),
                });
            }
            SessionGating::Client => self.begin_running(now_ms),
        }
        Ok(())
    }

    pub fn operator_stop(&mut self) {
        self.operator_stop_at(now_ms());
    }

    /// Finish the session immediately. No-op unless armed or counting.
    pub fn operator_stop_at(&mut self, now_ms: u64) {
        if !self.phase.is_active() {
            debug!(phase = ?self.phase, "stop ignored");
            return;
        }
        info!(phase = ?self.phase, "session stopped by operator");
        self.finish(now_ms);
    }

    pub fn tick(&mut self) {
        self.tick_at(now_ms());
    }

    /// Advance the countdown and act on phase expiry.
    pub fn tick_at(&mut self, now_ms: u64) {
        let Some(expired) = self.timer.tick_at(now_ms) else {
            return;
        };

        match (expired, self.phase) {
            (PhaseKind::Work, SessionPhase::Running) if self.repetitions.has_more() => {
                self.rest.is_resting = true;
                self.services
                    .cues
                    .play(self.settings.rest_cue, PlayOptions::default());
                self.timer.start_phase_at(PhaseKind::Rest, now_ms);
                self.set_phase(SessionPhase::Resting, now_ms);
            }
            (PhaseKind::Work, SessionPhase::Running) => {
                self.repetitions.complete();
                self.finish(now_ms);
            }
            (PhaseKind::Rest, SessionPhase::Resting) => {
                self.repetitions.complete();
                self.rest.is_resting = false;
                self.services.cues.play(CueId::Start, PlayOptions::default());
                self.timer.start_phase_at(PhaseKind::Work, now_ms);
                self.set_phase(SessionPhase::Running, now_ms);
            }
            (kind, phase) => debug!(expired = ?kind, phase = ?phase, "stale expiry ignored"),
        }
    }

    // ── Broker ───────────────────────────────────────────────────────

    pub fn on_broker_connected_at(&mut self, now_ms: u64) {
        self.link.on_connected();
        self.emit(Event::BrokerConnected {
            at: timestamp(now_ms),
        });
    }

    pub fn on_broker_disconnected_at(&mut self, reason: &str, now_ms: u64) {
        self.link.on_disconnected(reason);
        self.emit(Event::BrokerDisconnected {
            reason: reason.to_string(),
            at: timestamp(now_ms),
        });
    }

    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        self.handle_message_at(topic, payload, now_ms());
    }

    /// Decode a raw broker message and apply it.
    pub fn handle_message_at(&mut self, topic: &str, payload: &[u8], now_ms: u64) {
        if let Some(event) = self.link.decode(topic, payload) {
            self.handle_inbound_at(event, now_ms);
        }
    }

    pub fn handle_inbound_at(&mut self, event: InboundEvent, now_ms: u64) {
        match event {
            InboundEvent::Data { pressure } => self.ingest(pressure, now_ms),
            InboundEvent::DeviceAnnounce { device } => {
                if !self.candidates.contains(&device) {
                    debug!(device = %device, "new pairing candidate");
                    self.candidates.push(device.clone());
                    self.emit(Event::DeviceDiscovered {
                        device,
                        at: timestamp(now_ms),
                    });
                }
            }
            InboundEvent::StartSignal => match (self.settings.gating, self.phase) {
                (SessionGating::Therapist, SessionPhase::WaitingForDevice) => {
                    info!("device start signal received");
                    self.begin_running(now_ms);
                }
                (gating, phase) => debug!(gating = ?gating, phase = ?phase, "start signal ignored"),
            },
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn ensure_idle(&self, action: &'static str) -> std::result::Result<(), ValidationError> {
        if self.phase.is_active() {
            Err(ValidationError::SessionActive(action))
        } else {
            Ok(())
        }
    }

    fn begin_running(&mut self, now_ms: u64) {
        self.samples.clear();
        self.repetitions.reset();
        self.rest.is_resting = false;
        self.session_start_ms = Some(now_ms);
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);

        self.services.cues.play(CueId::Start, PlayOptions::default());
        self.timer.start_phase_at(PhaseKind::Work, now_ms);

        let preset = self.preset();
        self.emit(Event::SessionStarted {
            session_id,
            repetitions: preset.repetitions,
            work_secs: preset.work_secs,
            rest_secs: preset.rest_secs,
            at: timestamp(now_ms),
        });
        self.set_phase(SessionPhase::Running, now_ms);
    }

    fn finish(&mut self, now_ms: u64) {
        self.timer.cancel();
        self.rest.is_resting = false;
        self.current_pressure = self.settings.baseline_pressure;
        self.services.cues.play(CueId::Finish, PlayOptions::default());
        self.set_phase(SessionPhase::Finished, now_ms);

        let summary = SessionSummary::from_samples(
            &self.samples,
            self.session_start_ms.map(timestamp),
            timestamp(now_ms),
        );
        info!(
            samples = summary.sample_count,
            elapsed_secs = summary.elapsed_secs,
            "session finished"
        );
        self.emit(Event::SessionFinished {
            session_id: self.session_id,
            summary: summary.clone(),
        });
        self.last_summary = Some(summary);
    }

    fn ingest(&mut self, pressure: f64, now_ms: u64) {
        if self.phase != SessionPhase::Running {
            debug!(pressure, phase = ?self.phase, "sample outside work phase dropped");
            return;
        }
        // Repeated readings still request the warning; the player rate-limits.
        let over = self
            .mode()
            .filter(|m| m.is_over(pressure))
            .map(|m| m.max_pressure);
        if let Some(max_pressure) = over {
            self.services
                .cues
                .play(CueId::Warning, PlayOptions::skip_if_playing());
            self.emit(Event::OverPressure {
                pressure,
                max_pressure,
                at: timestamp(now_ms),
            });
        }
        if self.samples.last().is_some_and(|s| s.pressure == pressure) {
            debug!(pressure, "duplicate sample dropped");
            return;
        }

        let sample = Sample {
            pressure,
            captured_at: timestamp(now_ms),
            session_start: self.session_start_ms.map(timestamp),
            patient_id: self.patient_id.clone(),
            exercise_mode: self.mode_label.clone(),
        };
        if let Err(e) = self.services.samples.append_sample(&sample) {
            warn!(pressure, error = %e, "failed to persist sample");
        }
        self.samples.push(sample);
        self.current_pressure = pressure;
        self.emit(Event::SampleRecorded {
            pressure,
            at: timestamp(now_ms),
        });
    }

    fn set_phase(&mut self, phase: SessionPhase, now_ms: u64) {
        debug!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
        self.emit(Event::PhaseChanged {
            phase,
            repetitions_remaining: self.repetitions.remaining(),
            at: timestamp(now_ms),
        });
    }

    fn notify(&mut self, level: NotificationLevel, message: String, now_ms: u64) {
        self.emit(Event::Notification {
            level,
            message,
            at: timestamp(now_ms),
        });
    }

    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}
