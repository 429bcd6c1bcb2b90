//! Broker link: topic bookkeeping and inbound decoding.
//!
//! The link never blocks and never awaits acknowledgements. Every
//! subscribe/unsubscribe/publish is handed to the [`Transport`] and failures
//! are logged.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::binding::{DeviceBinding, Reconcile};
use super::message::{self, CommandPayload, InboundEvent, PairRequestPayload};
use crate::error::TransportError;
use crate::storage::TopicConfig;

/// Fire-and-forget broker operations.
pub trait Transport {
    fn is_connected(&self) -> bool;
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;
}

pub struct TelemetryLink<T: Transport> {
    transport: T,
    topics: TopicConfig,
    binding: DeviceBinding,
}

impl<T: Transport> TelemetryLink<T> {
    pub fn new(transport: T, topics: TopicConfig) -> Self {
        Self {
            transport,
            topics,
            binding: DeviceBinding::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn bound_device(&self) -> Option<&str> {
        self.binding.device_id()
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.is_bound()
    }

    /// Called when the broker session is (re)established. Subscribes the
    /// discovery topics and restores any per-device topics.
    pub fn on_connected(&mut self) {
        info!("connected to broker");
        let pair = self.topics.pair.clone();
        let device = self.topics.device.clone();
        self.subscribe(&pair, "pair");
        self.subscribe(&device, "device");
        for topic in self.binding.resubscribe() {
            self.subscribe(&topic, "device-bound");
        }
    }

    pub fn on_disconnected(&mut self, reason: &str) {
        warn!(reason, "broker connection lost");
    }

    /// Listen to `device_id`'s topics. No-op when already bound to it.
    /// Returns whether the binding changed.
    pub fn bind_device(&mut self, device_id: &str) -> bool {
        let Some(Reconcile {
            unsubscribe,
            subscribe,
        }) = self.binding.rebind(device_id, &self.topics)
        else {
            debug!(device = device_id, "device already bound");
            return false;
        };

        for topic in &unsubscribe {
            if let Err(e) = self.transport.unsubscribe(topic) {
                warn!(topic = %topic, error = %e, "unsubscribe failed");
            }
        }
        for topic in &subscribe {
            self.subscribe(topic, "device-bound");
        }
        info!(device = device_id, "bound device topics");
        true
    }

    /// Publish the target pressure and mode to the bound device.
    pub fn publish_command(&mut self, pressure: f64, mode: &str) {
        let Some(topic) = self.binding.topics().map(|t| t.command.clone()) else {
            debug!("no device bound, command not published");
            return;
        };
        self.publish(&topic, &CommandPayload::new(pressure, mode));
    }

    pub fn request_pairing(&mut self) {
        let topic = self.topics.pair.clone();
        self.publish(&topic, &PairRequestPayload::default());
    }

    /// Decode an inbound message. Malformed or unexpected payloads are
    /// logged and dropped.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Option<InboundEvent> {
        let value: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(topic, error = %e, "failed to parse broker message");
                return None;
            }
        };

        let bound = self.binding.topics();
        if bound.is_some_and(|t| t.data == topic) {
            return message::pressure_of(&value).map(|pressure| InboundEvent::Data { pressure });
        }
        if topic == self.topics.device {
            return message::device_of(&value).map(|device| {
                debug!(device = %device, "device announced");
                InboundEvent::DeviceAnnounce { device }
            });
        }
        if bound.is_some_and(|t| t.start == topic) {
            if message::is_start(&value) {
                return Some(InboundEvent::StartSignal);
            }
            warn!(topic, payload = %value, "unexpected start-signal payload");
            return None;
        }
        None
    }

    fn subscribe(&mut self, topic: &str, name: &str) {
        match self.transport.subscribe(topic) {
            Ok(()) => debug!(topic, name, "subscribed"),
            Err(e) => warn!(topic, name, error = %e, "subscription failed"),
        }
    }

    fn publish<P: serde::Serialize>(&mut self, topic: &str, payload: &P) {
        if !self.transport.is_connected() {
            debug!(topic, "broker not connected, publish skipped");
            return;
        }
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(topic, error = %e, "failed to encode payload");
                return;
            }
        };
        if let Err(e) = self.transport.publish(topic, bytes) {
            warn!(topic, error = %e, "publish failed");
        }
    }
}

/// In-process transport that records every call. Used by tests and by
/// offline runs where no broker is configured.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pub connected: bool,
    pub subscriptions: Vec<String>,
    pub subscribe_calls: Vec<String>,
    pub unsubscribe_calls: Vec<String>,
    pub published: Vec<(String, Value)>,
}

impl MemoryTransport {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }
}

impl Transport for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.subscribe_calls.push(topic.to_string());
        if !self.subscriptions.iter().any(|t| t == topic) {
            self.subscriptions.push(topic.to_string());
        }
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.unsubscribe_calls.push(topic.to_string());
        self.subscriptions.retain(|t| t != topic);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let value = serde_json::from_slice(&payload).unwrap_or(Value::Null);
        self.published.push((topic.to_string(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link() -> TelemetryLink<MemoryTransport> {
        TelemetryLink::new(MemoryTransport::connected(), TopicConfig::default())
    }

    fn bytes(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn connect_subscribes_discovery_topics() {
        let mut link = link();
        link.on_connected();
        let t = TopicConfig::default();
        assert_eq!(link.transport().subscriptions, vec![t.pair, t.device]);
    }

    #[test]
    fn binding_same_device_twice_subscribes_once() {
        let mut link = link();
        assert!(link.bind_device("A"));
        let calls = link.transport().subscribe_calls.len();
        assert!(!link.bind_device("A"));
        assert_eq!(link.transport().subscribe_calls.len(), calls);
        assert_eq!(calls, 3);
    }

    #[test]
    fn rebinding_drops_old_device_messages() {
        let mut link = link();
        link.bind_device("A");
        let old_data = link.topics.data.clone() + "/A";
        link.bind_device("B");
        assert_eq!(link.transport().unsubscribe_calls.len(), 3);
        assert_eq!(link.decode(&old_data, &bytes(json!({"pressure": 30}))), None);
        let new_data = link.topics.data.clone() + "/B";
        assert_eq!(
            link.decode(&new_data, &bytes(json!({"pressure": 30}))),
            Some(InboundEvent::Data { pressure: 30.0 })
        );
    }

    #[test]
    fn decode_routes_by_topic() {
        let mut link = link();
        link.bind_device("A");
        let t = TopicConfig::default();
        assert_eq!(
            link.decode(&t.device, &bytes(json!({"device": "esp-9"}))),
            Some(InboundEvent::DeviceAnnounce {
                device: "esp-9".into()
            })
        );
        let start = format!("{}/A", t.start);
        assert_eq!(
            link.decode(&start, &bytes(json!({"start": 1}))),
            Some(InboundEvent::StartSignal)
        );
        assert_eq!(link.decode(&start, &bytes(json!({"start": 0}))), None);
        // command echo is ignored
        let cmd = format!("{}/A", t.command);
        assert_eq!(link.decode(&cmd, &bytes(json!({"pressure": 1}))), None);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let mut link = link();
        link.bind_device("A");
        let data = format!("{}/A", TopicConfig::default().data);
        assert_eq!(link.decode(&data, b"{not json"), None);
        assert_eq!(link.decode(&data, &bytes(json!({"value": 3}))), None);
    }

    #[test]
    fn publish_is_skipped_when_disconnected() {
        let mut link = TelemetryLink::new(MemoryTransport::default(), TopicConfig::default());
        link.bind_device("A");
        link.publish_command(40.0, "lumbar");
        link.request_pairing();
        assert!(link.transport().published.is_empty());
    }

    #[test]
    fn command_goes_to_bound_command_topic() {
        let mut link = link();
        link.publish_command(40.0, "lumbar");
        assert!(link.transport().published.is_empty());
        link.bind_device("A");
        link.publish_command(40.0, "lumbar");
        let (topic, payload) = &link.transport().published[0];
        assert_eq!(topic, &format!("{}/A", TopicConfig::default().command));
        assert_eq!(payload, &json!({"message": "ok", "pressure": 40.0, "mode": "lumbar"}));
    }
}
