//! Maps controller state to drawing primitives.
//!
//! Pure functions only. Angles follow the gauge convention of the front-end:
//! 0 on the scale sits at 90° and each unit turns 3.6° clockwise.

use serde::Serialize;

use crate::session::{ExerciseMode, SessionPhase, SessionSnapshot};

/// Ring sweep shown while waiting for the device, in percent.
const WAITING_SWEEP_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeColor {
    Green,
    Red,
    Amber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Blue,
    Green,
    Purple,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeView {
    pub value: f64,
    pub color: GaugeColor,
    pub angle: f64,
    /// (min, max) band marks, if a mode is active.
    pub band: Option<(f64, f64)>,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RingView {
    pub label_secs: f64,
    pub sweep_deg: f64,
    pub color: StatusColor,
}

pub fn clamp_pressure(pressure: f64) -> f64 {
    if pressure.is_nan() {
        return 0.0;
    }
    pressure.clamp(0.0, 100.0)
}

/// Green inside the band, red above it, amber below it.
pub fn gauge_color(pressure: f64, mode: &ExerciseMode) -> GaugeColor {
    let value = clamp_pressure(pressure);
    if value > mode.max_pressure {
        GaugeColor::Red
    } else if value >= mode.min_pressure {
        GaugeColor::Green
    } else {
        GaugeColor::Amber
    }
}

pub fn scale_angle(value: f64) -> f64 {
    90.0 - value * 3.6
}

pub fn band_angles(mode: &ExerciseMode) -> (f64, f64) {
    (
        scale_angle(mode.min_pressure),
        scale_angle(mode.max_pressure),
    )
}

pub fn status_color(phase: SessionPhase) -> StatusColor {
    match phase {
        SessionPhase::WaitingForDevice => StatusColor::Blue,
        SessionPhase::Running => StatusColor::Green,
        SessionPhase::Resting => StatusColor::Purple,
        SessionPhase::Stopped | SessionPhase::Finished => StatusColor::Red,
    }
}

pub fn sweep_degrees(percent: f64) -> f64 {
    percent.clamp(0.0, 100.0) * 3.6
}

pub fn gauge_view(snapshot: &SessionSnapshot) -> GaugeView {
    let value = clamp_pressure(snapshot.pressure);
    GaugeView {
        value,
        color: snapshot
            .mode
            .as_ref()
            .map_or(GaugeColor::Amber, |m| gauge_color(value, m)),
        angle: scale_angle(value),
        band: snapshot.mode.as_ref().map(band_angles),
        label: snapshot.pressure_label.clone(),
    }
}

pub fn ring_view(snapshot: &SessionSnapshot) -> RingView {
    let work_secs = snapshot.preset.work_secs;
    if snapshot.phase == SessionPhase::WaitingForDevice {
        return RingView {
            label_secs: work_secs,
            sweep_deg: sweep_degrees(WAITING_SWEEP_PERCENT),
            color: StatusColor::Blue,
        };
    }
    let percent = if work_secs > 0.0 {
        snapshot.timer.ring_secs / work_secs * 100.0
    } else {
        0.0
    };
    RingView {
        label_secs: snapshot.timer.remaining_secs,
        sweep_deg: sweep_degrees(percent),
        color: status_color(snapshot.phase),
    }
}
