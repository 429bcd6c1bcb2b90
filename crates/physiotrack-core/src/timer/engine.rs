//! Work/rest countdown engine.
//!
//! The engine is a wall-clock-based state machine. It does not use internal
//! threads - the caller invokes `tick_at()` on its polling interval. Each
//! phase captures an absolute end time when it starts, so tick jitter never
//! accumulates into the countdown.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Counting -> Expired -> (Counting | Idle)
//! ```
//!
//! The engine never starts the next phase on its own; whoever owns it
//! decides what follows an expiry.

use serde::{Deserialize, Serialize};

use super::preset::TimerPreset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Counting,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Work,
    Rest,
}

/// Countdown figures for the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerReading {
    pub phase: PhaseKind,
    pub remaining_secs: f64,
    pub elapsed_secs: f64,
    /// Remaining fraction of the phase expressed in work-phase seconds.
    /// The outer ring is always drawn against the work duration, rest included.
    pub ring_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerEngine {
    preset: TimerPreset,
    state: TimerState,
    phase: PhaseKind,
    /// Absolute end of the current phase (ms since epoch).
    target_end_ms: Option<u64>,
    remaining_ms: u64,
}

impl TimerEngine {
    pub fn new(preset: TimerPreset) -> Self {
        Self {
            remaining_ms: preset.work_ms(),
            preset,
            state: TimerState::Idle,
            phase: PhaseKind::Work,
            target_end_ms: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    pub fn preset(&self) -> &TimerPreset {
        &self.preset
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn is_counting(&self) -> bool {
        self.state == TimerState::Counting
    }

    pub fn phase_ms(&self) -> u64 {
        match self.phase {
            PhaseKind::Work => self.preset.work_ms(),
            PhaseKind::Rest => self.preset.rest_ms(),
        }
    }

    /// Figures derived from the last tick.
    pub fn reading(&self) -> TimerReading {
        let phase_ms = self.phase_ms();
        let remaining_secs = self.remaining_ms as f64 / 1000.0;
        let phase_secs = phase_ms as f64 / 1000.0;
        let ring_secs = if phase_ms == 0 {
            0.0
        } else {
            self.remaining_ms as f64 / phase_ms as f64 * self.preset.work_secs
        };
        TimerReading {
            phase: self.phase,
            remaining_secs,
            elapsed_secs: phase_secs - remaining_secs,
            ring_secs,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the preset. Only honoured while idle; returns whether it applied.
    pub fn set_preset(&mut self, preset: TimerPreset) -> bool {
        if self.state == TimerState::Counting {
            return false;
        }
        self.preset = preset;
        self.state = TimerState::Idle;
        self.phase = PhaseKind::Work;
        self.target_end_ms = None;
        self.remaining_ms = preset.work_ms();
        true
    }

    /// Begin counting down `kind` from `now_ms`.
    pub fn start_phase_at(&mut self, kind: PhaseKind, now_ms: u64) {
        self.phase = kind;
        self.state = TimerState::Counting;
        let duration = self.phase_ms();
        self.target_end_ms = Some(now_ms.saturating_add(duration));
        self.remaining_ms = duration;
    }

    /// Stop counting immediately and return to idle with a full work phase.
    pub fn cancel(&mut self) {
        self.state = TimerState::Idle;
        self.phase = PhaseKind::Work;
        self.target_end_ms = None;
        self.remaining_ms = self.preset.work_ms();
    }

    /// Call periodically. Returns `Some(phase)` on the tick that expires it.
    pub fn tick_at(&mut self, now_ms: u64) -> Option<PhaseKind> {
        if self.state != TimerState::Counting {
            return None;
        }
        let target = self.target_end_ms?;
        // Clamp so a wall clock stepping backwards never rewinds the countdown.
        let remaining = target.saturating_sub(now_ms).min(self.remaining_ms);
        self.remaining_ms = remaining;
        if remaining == 0 {
            self.state = TimerState::Expired;
            self.target_end_ms = None;
            return Some(self.phase);
        }
        None
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine(work: f64, rest: f64, reps: u32) -> TimerEngine {
        TimerEngine::new(TimerPreset::new(work, rest, reps).unwrap())
    }

    #[test]
    fn counts_down_against_target() {
        let mut engine = engine(20.0, 10.0, 2);
        engine.start_phase_at(PhaseKind::Work, 1_000);
        assert_eq!(engine.tick_at(6_000), None);
        let reading = engine.reading();
        assert_eq!(reading.remaining_secs, 15.0);
        assert_eq!(reading.elapsed_secs, 5.0);
        assert_eq!(reading.ring_secs, 15.0);
    }

    #[test]
    fn expires_once_and_does_not_restart() {
        let mut engine = engine(1.0, 1.0, 1);
        engine.start_phase_at(PhaseKind::Work, 0);
        assert_eq!(engine.tick_at(999), None);
        assert_eq!(engine.tick_at(1_000), Some(PhaseKind::Work));
        assert_eq!(engine.state(), TimerState::Expired);
        assert_eq!(engine.tick_at(5_000), None);
        assert_eq!(engine.remaining_ms(), 0);
    }

    #[test]
    fn late_tick_still_reports_zero() {
        let mut engine = engine(2.0, 1.0, 1);
        engine.start_phase_at(PhaseKind::Work, 0);
        // A stalled loop that wakes long after the deadline expires immediately.
        assert_eq!(engine.tick_at(60_000), Some(PhaseKind::Work));
        assert_eq!(engine.reading().remaining_secs, 0.0);
        assert_eq!(engine.reading().elapsed_secs, 2.0);
    }

    #[test]
    fn rest_ring_is_scaled_to_work_duration() {
        let mut engine = engine(20.0, 10.0, 2);
        engine.start_phase_at(PhaseKind::Rest, 0);
        engine.tick_at(5_000);
        let reading = engine.reading();
        assert_eq!(reading.phase, PhaseKind::Rest);
        assert_eq!(reading.remaining_secs, 5.0);
        // half of the rest phase left -> half of the work ring
        assert_eq!(reading.ring_secs, 10.0);
    }

    #[test]
    fn clock_going_backwards_does_not_rewind() {
        let mut engine = engine(10.0, 1.0, 1);
        engine.start_phase_at(PhaseKind::Work, 10_000);
        engine.tick_at(15_000);
        engine.tick_at(12_000);
        assert_eq!(engine.remaining_ms(), 5_000);
    }

    #[test]
    fn preset_change_is_refused_while_counting() {
        let mut engine = engine(10.0, 1.0, 1);
        engine.start_phase_at(PhaseKind::Work, 0);
        assert!(!engine.set_preset(TimerPreset::new(30.0, 5.0, 2).unwrap()));
        engine.cancel();
        assert!(engine.set_preset(TimerPreset::new(30.0, 5.0, 2).unwrap()));
        assert_eq!(engine.remaining_ms(), 30_000);
    }

    proptest! {
        #[test]
        fn remaining_never_increases(steps in proptest::collection::vec(0u64..50, 1..200)) {
            let mut engine = engine(3.0, 1.0, 1);
            engine.start_phase_at(PhaseKind::Work, 0);
            let mut now = 0u64;
            let mut previous = engine.remaining_ms();
            for step in steps {
                now += step;
                engine.tick_at(now);
                prop_assert!(engine.remaining_ms() <= previous);
                previous = engine.remaining_ms();
            }
        }

        #[test]
        fn reaches_zero_within_one_interval(jitter in 0u64..10) {
            let mut engine = engine(2.0, 1.0, 1);
            engine.start_phase_at(PhaseKind::Work, 0);
            let mut now = 0u64;
            let mut expired_at = None;
            while expired_at.is_none() {
                now += 10;
                if engine.tick_at(now + jitter).is_some() {
                    expired_at = Some(now + jitter);
                }
            }
            let at = expired_at.unwrap();
            prop_assert!(at >= 2_000 && at < 2_010);
        }
    }
}
