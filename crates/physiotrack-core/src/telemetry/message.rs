//! Broker wire format.
//!
//! Inbound payloads are decoded once, at the link boundary, into
//! [`InboundEvent`]. Anything that does not match the expected shape for its
//! topic is dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// `{pressure: number}` on the bound data topic.
    Data { pressure: f64 },
    /// `{device: string}` on the discovery topic.
    DeviceAnnounce { device: String },
    /// `{start: 1}` on the bound start-signal topic.
    StartSignal,
}

/// Command sent to the device when a session is armed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub message: String,
    pub pressure: f64,
    pub mode: String,
}

impl CommandPayload {
    pub fn new(pressure: f64, mode: &str) -> Self {
        Self {
            message: "ok".into(),
            pressure,
            mode: mode.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRequestPayload {
    pub message: String,
}

impl Default for PairRequestPayload {
    fn default() -> Self {
        Self {
            message: "Pair Request".into(),
        }
    }
}

pub(crate) fn pressure_of(payload: &Value) -> Option<f64> {
    payload.get("pressure")?.as_f64()
}

pub(crate) fn device_of(payload: &Value) -> Option<String> {
    payload.get("device")?.as_str().map(str::to_string)
}

pub(crate) fn is_start(payload: &Value) -> bool {
    payload.get("start").and_then(Value::as_f64) == Some(1.0)
}
