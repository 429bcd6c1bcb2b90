//! MQTT transport backed by rumqttc.
//!
//! [`connect`] returns the [`MqttTransport`] handed to the link and an
//! [`MqttPump`] that must be spawned to drive the connection. The pump
//! forwards connection changes and raw publishes over a channel so the
//! session loop stays the only owner of controller state.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use rand::Rng;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::link::Transport;
use crate::error::TransportError;
use crate::storage::BrokerConfig;

/// What the pump reports to the session loop.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Connected,
    Disconnected(String),
    Message { topic: String, payload: Vec<u8> },
}

pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl Transport for MqttTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client.try_unsubscribe(topic).map_err(Into::into)
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(Into::into)
    }
}

impl MqttTransport {
    pub fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "disconnect request failed");
        }
    }
}

pub struct MqttPump {
    eventloop: EventLoop,
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<BrokerEvent>,
    reconnect_delay: Duration,
}

impl MqttPump {
    /// Drive the connection until the receiving side goes away. Transport
    /// errors are reported and retried after the configured delay.
    pub async fn run(mut self) {
        loop {
            let forwarded = match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::SeqCst);
                    self.events.send(BrokerEvent::Connected).await
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.events
                        .send(BrokerEvent::Message {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        })
                        .await
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.connected.store(false, Ordering::SeqCst);
                    self.events
                        .send(BrokerEvent::Disconnected("broker closed the session".into()))
                        .await
                }
                Ok(_) => Ok(()),
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    warn!(error = %e, "MQTT connection error");
                    let sent = self
                        .events
                        .send(BrokerEvent::Disconnected(e.to_string()))
                        .await;
                    tokio::time::sleep(self.reconnect_delay).await;
                    sent
                }
            };
            if forwarded.is_err() {
                debug!("session loop closed, stopping MQTT pump");
                break;
            }
        }
    }
}

/// Randomized client id, `<prefix><0..=0xffff>`.
pub fn client_id(prefix: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..=0xffff);
    format!("{prefix}{suffix}")
}

pub fn connect(
    broker: &BrokerConfig,
    events: mpsc::Sender<BrokerEvent>,
) -> (MqttTransport, MqttPump) {
    let mut options = MqttOptions::new(
        client_id(&broker.client_id_prefix),
        broker.host.clone(),
        broker.port,
    );
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    options.set_clean_session(true);

    let (client, eventloop) = AsyncClient::new(options, 64);
    let connected = Arc::new(AtomicBool::new(false));

    (
        MqttTransport {
            client,
            connected: connected.clone(),
        },
        MqttPump {
            eventloop,
            connected,
            events,
            reconnect_delay: Duration::from_millis(broker.reconnect_delay_ms),
        },
    )
}
