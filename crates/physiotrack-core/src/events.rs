use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{SessionPhase, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Every state change the controller makes produces an Event.
/// Front-ends drain them after each call into the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    BrokerConnected {
        at: DateTime<Utc>,
    },
    BrokerDisconnected {
        reason: String,
        at: DateTime<Utc>,
    },
    /// Operator start accepted; waiting for the device's start signal.
    SessionArmed {
        mode: String,
        /// Target pressure published to the device, if any.
        command_pressure: Option<f64>,
        at: DateTime<Utc>,
    },
    SessionStarted {
        session_id: Uuid,
        repetitions: u32,
        work_secs: f64,
        rest_secs: f64,
        at: DateTime<Utc>,
    },
    PhaseChanged {
        phase: SessionPhase,
        repetitions_remaining: u32,
        at: DateTime<Utc>,
    },
    SampleRecorded {
        pressure: f64,
        at: DateTime<Utc>,
    },
    OverPressure {
        pressure: f64,
        max_pressure: f64,
        at: DateTime<Utc>,
    },
    SessionFinished {
        session_id: Option<Uuid>,
        summary: SessionSummary,
    },
    /// Start was requested with no paired device; a pairing scan was issued.
    PairingRequired {
        at: DateTime<Utc>,
    },
    DeviceDiscovered {
        device: String,
        at: DateTime<Utc>,
    },
    DeviceBound {
        device: String,
        at: DateTime<Utc>,
    },
    /// Transient operator-facing message.
    Notification {
        level: NotificationLevel,
        message: String,
        at: DateTime<Utc>,
    },
}
