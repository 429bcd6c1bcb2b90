mod binding;
mod link;
mod message;
pub mod mqtt;

pub use binding::{DeviceBinding, DeviceTopics, Reconcile};
pub use link::{MemoryTransport, TelemetryLink, Transport};
pub use message::{CommandPayload, InboundEvent, PairRequestPayload};
pub use mqtt::{BrokerEvent, MqttPump, MqttTransport};
